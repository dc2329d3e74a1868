//! Error types for call dispatch.
//!
//! Every failure that aborts a call belongs to exactly one of four kinds so
//! calling automation can branch deterministically:
//!
//! - [`ValidationError`] — rejected before any payload is built or any I/O
//!   happens.
//! - [`TransportError`] — the network or the backend failed; surfaced verbatim
//!   from the [`crate::Transport`] implementation.
//! - [`DecodeError`] — the backend answered, but the body did not match the
//!   shape composed for the call.
//! - [`AuthError`] — login was rejected.
//!
//! Per-node execution failures are *not* errors of the call. They are
//! [`crate::NodeError`] values inside the decoded per-node map.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// A call description or dispatch request that cannot be sent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The call descriptor names no function.
    #[error("function name must not be empty")]
    EmptyFunctionName,

    /// The target expression is empty (or a list target has an empty entry).
    #[error("target expression must not be empty")]
    EmptyTarget,

    /// The SSH entrypoint was used with a target that is not an SSH target.
    #[error("the ssh entrypoint requires an ssh target, got '{expr_form}'")]
    SshTargetRequired {
        /// Mode tag of the rejected target.
        expr_form: &'static str,
    },

    /// An SSH target was used outside the SSH entrypoint.
    #[error("ssh targets can only be used with the ssh entrypoint")]
    SshTargetNotAllowed,

    /// A batch size is out of range.
    #[error("invalid batch size: {reason}")]
    InvalidBatch {
        /// Why the batch size was rejected.
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// Failure reported by a [`crate::Transport`] implementation.
///
/// The dispatcher never inspects or rewraps these; they reach the caller
/// unchanged inside [`NetApiError::Transport`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The connection could not be established or was dropped (includes TLS
    /// handshake failures).
    #[error("connection to '{url}' failed: {message}")]
    Connection {
        /// The URL that was being requested.
        url: String,
        /// Underlying error message.
        message: String,
    },

    /// The request did not complete within the configured timeout.
    #[error("request to '{url}' timed out")]
    Timeout {
        /// The URL that was being requested.
        url: String,
    },

    /// The backend answered with a non-success HTTP status.
    #[error("backend returned HTTP {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly empty.
        body: String,
    },

    /// The base URL and request path do not form a valid URL.
    #[error("invalid url '{url}': {message}")]
    InvalidUrl {
        /// The offending URL text.
        url: String,
        /// Parser message.
        message: String,
    },

    /// Any other failure while building or sending the request.
    #[error("request failed: {message}")]
    Request {
        /// Underlying error message.
        message: String,
    },
}

impl TransportError {
    /// Returns the HTTP status code when the backend answered with one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// The response body does not match the shape composed for the call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The body is not valid JSON.
    #[error("malformed response body: {reason}")]
    Malformed {
        /// Parser message.
        reason: String,
    },

    /// The top-level object has no `return` key.
    #[error("response has no top-level 'return' key")]
    MissingReturn,

    /// A value has the wrong JSON kind for its position.
    #[error("at '{path}': expected {expected}, found {found}")]
    Mismatch {
        /// JSON path of the offending value (e.g. `return[0].minion1`).
        path: String,
        /// Expected type, rendered from the descriptor.
        expected: String,
        /// Kind of the value that was found.
        found: String,
    },

    /// A list has a different number of elements than the mode requires.
    #[error("at '{path}': expected {expected} element(s), found {found}")]
    UnexpectedLength {
        /// JSON path of the list.
        path: String,
        /// Required element count.
        expected: usize,
        /// Actual element count.
        found: usize,
    },
}

// ---------------------------------------------------------------------------
// Authentication
// ---------------------------------------------------------------------------

/// Login failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// The backend rejected the credentials.
    #[error("login rejected for user '{username}' (HTTP {status})")]
    Rejected {
        /// User that attempted to log in.
        username: String,
        /// HTTP status returned by the backend.
        status: u16,
    },

    /// The backend accepted the login but returned no token.
    #[error("login response contained no token")]
    NoToken,
}

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Any failure that aborts a dispatch or session operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetApiError {
    /// Rejected before dispatch; no I/O was performed.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The network or backend failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The backend answered with an unexpected shape.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Login was rejected.
    #[error(transparent)]
    Auth(#[from] AuthError),
}
