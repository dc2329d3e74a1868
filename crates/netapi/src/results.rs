//! Decoded response value types.
//!
//! These are the static Rust counterparts of the descriptor wrappers in
//! [`crate::WrapperKind`]: [`Envelope`], [`NodeResult`], [`SshResult`] and
//! [`AsyncJobHandle`]. They are transient decode products owned by the caller
//! once a dispatch returns.

use std::fmt;
use std::marker::PhantomData;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::{JobId, NodeId, ReturnType, TypeDescriptor};

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// The outermost `{"return": …}` wrapper of every response.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope<T> {
    /// Contents of the `return` key.
    pub result: T,
}

impl<T> Envelope<T> {
    /// Consumes the envelope and returns its contents.
    pub fn into_result(self) -> T {
        self.result
    }
}

// ---------------------------------------------------------------------------
// Per-node outcome
// ---------------------------------------------------------------------------

/// Outcome of a function on one node.
///
/// A failed node is not a failed call: the dispatch succeeds and the failure
/// shows up here.
pub type NodeResult<T> = Result<T, NodeError>;

/// Why a node produced no usable value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NodeError {
    /// The node does not know the requested function.
    #[error("function '{function}' is not available")]
    FunctionNotAvailable {
        /// Fully qualified function name (e.g. `pkg.install`).
        function: String,
    },

    /// The execution module refused to load on the node.
    #[error("module '{module}' is not supported")]
    ModuleNotSupported {
        /// Module name as reported by the node.
        module: String,
    },

    /// The node returned an error message instead of a value.
    #[error("{message}")]
    Generic {
        /// Message returned by the node.
        message: String,
    },

    /// The node returned a value that does not match the declared type.
    #[error("unexpected node return {json}: {reason}")]
    Unexpected {
        /// The offending JSON, serialized.
        json: String,
        /// Decoder message, including the JSON path.
        reason: String,
    },
}

impl NodeError {
    /// Recognises the well-known error strings nodes return in place of a value.
    ///
    /// Returns `None` for any other message.
    pub fn classify(message: &str) -> Option<Self> {
        let rest = message.strip_prefix('\'')?;
        let (name, tail) = rest.split_once('\'')?;
        if tail.starts_with(" is not available") {
            Some(Self::FunctionNotAvailable {
                function: name.to_string(),
            })
        } else if tail.starts_with(" __virtual__ returned False") {
            Some(Self::ModuleNotSupported {
                module: name.to_string(),
            })
        } else {
            None
        }
    }

    /// Human-readable description of the failure.
    pub fn description(&self) -> String {
        self.to_string()
    }
}

// ---------------------------------------------------------------------------
// SSH
// ---------------------------------------------------------------------------

/// Per-node result of a salt-ssh run.
///
/// Carries the remote shell bookkeeping next to the decoded value; callers
/// inspect `retcode` and `stderr` to tell a failed shell from a failed
/// function.
#[derive(Debug, Clone, PartialEq)]
pub struct SshResult<T> {
    /// Decoded function return, absent when the shell failed before running it.
    pub return_value: Option<T>,
    /// Remote exit status.
    pub retcode: Option<i64>,
    /// Remote standard output.
    pub stdout: Option<String>,
    /// Remote standard error.
    pub stderr: Option<String>,
    /// Function that was run.
    pub fun: Option<String>,
    /// Arguments the function was run with.
    pub fun_args: Vec<Value>,
    /// Node id as reported by the remote side.
    pub id: Option<String>,
    /// Job id of the run.
    pub jid: Option<String>,
}

impl<T> SshResult<T> {
    /// Returns `true` if the remote side reported exit status zero (or none).
    pub fn is_success(&self) -> bool {
        self.retcode.unwrap_or(0) == 0
    }

    /// Converts the decoded value, keeping the bookkeeping fields.
    pub fn try_map<U, E>(self, f: impl FnOnce(T) -> Result<U, E>) -> Result<SshResult<U>, E> {
        Ok(SshResult {
            return_value: self.return_value.map(f).transpose()?,
            retcode: self.retcode,
            stdout: self.stdout,
            stderr: self.stderr,
            fun: self.fun,
            fun_args: self.fun_args,
            id: self.id,
            jid: self.jid,
        })
    }
}

// ---------------------------------------------------------------------------
// Async job handle
// ---------------------------------------------------------------------------

/// A job scheduled by an async dispatch.
///
/// Retains the return-type descriptor of `R` so the job's eventual results can
/// be decoded with the same fidelity as a synchronous call.
pub struct AsyncJobHandle<R> {
    jid: JobId,
    minions: Vec<NodeId>,
    return_type: TypeDescriptor,
    _returns: PhantomData<fn() -> R>,
}

impl<R: ReturnType> AsyncJobHandle<R> {
    /// Creates a handle for job `jid` scheduled on `minions`.
    pub fn new(jid: JobId, minions: Vec<NodeId>) -> Self {
        Self {
            jid,
            minions,
            return_type: R::descriptor(),
            _returns: PhantomData,
        }
    }
}

impl<R> AsyncJobHandle<R> {
    /// Backend job id.
    pub fn jid(&self) -> &JobId {
        &self.jid
    }

    /// Nodes the job was scheduled on.
    pub fn minions(&self) -> &[NodeId] {
        &self.minions
    }

    /// Descriptor of the job's per-node return type.
    pub fn return_type(&self) -> &TypeDescriptor {
        &self.return_type
    }
}

impl<R> Clone for AsyncJobHandle<R> {
    fn clone(&self) -> Self {
        Self {
            jid: self.jid.clone(),
            minions: self.minions.clone(),
            return_type: self.return_type.clone(),
            _returns: PhantomData,
        }
    }
}

impl<R> PartialEq for AsyncJobHandle<R> {
    fn eq(&self, other: &Self) -> bool {
        self.jid == other.jid
            && self.minions == other.minions
            && self.return_type == other.return_type
    }
}

impl<R> fmt::Debug for AsyncJobHandle<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncJobHandle")
            .field("jid", &self.jid)
            .field("minions", &self.minions)
            .field("return_type", &format_args!("{}", self.return_type))
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Server statistics
// ---------------------------------------------------------------------------

/// Statistics reported by `GET /stats`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    /// Per-application request statistics.
    #[serde(rename = "CherryPy Applications", default)]
    pub applications: Map<String, Value>,

    /// Remaining sections (one per HTTP server instance), untouched.
    #[serde(flatten)]
    pub servers: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_recognises_unavailable_functions() {
        assert_eq!(
            NodeError::classify("'pkg.frobnicate' is not available."),
            Some(NodeError::FunctionNotAvailable {
                function: "pkg.frobnicate".to_string()
            })
        );
    }

    #[test]
    fn classify_recognises_unsupported_modules() {
        assert_eq!(
            NodeError::classify("'zfs' __virtual__ returned False: zfs not installed"),
            Some(NodeError::ModuleNotSupported {
                module: "zfs".to_string()
            })
        );
    }

    #[test]
    fn classify_ignores_ordinary_strings() {
        assert_eq!(NodeError::classify("hello"), None);
        assert_eq!(NodeError::classify("'quoted' text"), None);
    }

    #[test]
    fn ssh_result_success_follows_retcode() {
        let mut result = SshResult::<bool> {
            return_value: Some(true),
            retcode: None,
            stdout: None,
            stderr: None,
            fun: None,
            fun_args: Vec::new(),
            id: None,
            jid: None,
        };
        assert!(result.is_success());
        result.retcode = Some(1);
        assert!(!result.is_success());
    }

    #[test]
    fn stats_splits_applications_from_servers() {
        let stats: Stats = serde_json::from_value(serde_json::json!({
            "CherryPy Applications": {"Enabled": true},
            "CherryPy HTTPServer 140": {"Threads": 10}
        }))
        .unwrap();
        assert_eq!(stats.applications["Enabled"], Value::Bool(true));
        assert!(stats.servers.contains_key("CherryPy HTTPServer 140"));
        assert!(!stats.servers.contains_key("CherryPy Applications"));
    }
}
