//! Runtime type descriptors and the response-type composer.
//!
//! A [`TypeDescriptor`] is a small tagged tree describing the JSON shape a
//! value must have. The [`crate::Codec`] interprets it directly, so a single
//! generic decoder can tell a number nested three maps deep from a string
//! without any per-call decoding code.
//!
//! The return type `R` of a call is only known at the call site, and the
//! number of wrapping layers around it depends on the execution mode chosen at
//! dispatch time. [`compose`] builds the full expected shape per call:
//!
//! | Mode | Composed shape |
//! |------|----------------|
//! | `Local` | `Envelope<List<Map<string, Result<R>>>>` |
//! | `LocalBatch` | same; one list element per wave |
//! | `LocalAsync` | `Envelope<List<AsyncJob<R>>>` |
//! | `Ssh` | `Envelope<List<Map<string, Result<SshResult<R>>>>>` |

use std::fmt;

use serde_json::Value;

use crate::ExecutionMode;

// ---------------------------------------------------------------------------
// Leaves
// ---------------------------------------------------------------------------

/// JSON-level kind of a primitive leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    /// `true` / `false`.
    Bool,
    /// An integral number.
    Integer,
    /// Any number.
    Float,
    /// A string.
    String,
    /// Only `null`.
    Null,
    /// Any JSON value, passed through untouched.
    Any,
}

impl PrimitiveKind {
    /// Returns `true` if `value` has this kind.
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            Self::Bool => value.is_boolean(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Float => value.is_number(),
            Self::String => value.is_string(),
            Self::Null => value.is_null(),
            Self::Any => true,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::String => "string",
            Self::Null => "null",
            Self::Any => "any",
        }
    }
}

/// A named leaf checked by serde rather than by JSON kind.
///
/// Used for caller-defined structs (see [`crate::Json`]). The check function
/// attempts a deserialization and reports the serde message on failure.
#[derive(Clone, Copy)]
pub struct Schema {
    name: &'static str,
    check: fn(&Value) -> Result<(), String>,
}

impl Schema {
    /// Creates a schema leaf.
    pub const fn new(name: &'static str, check: fn(&Value) -> Result<(), String>) -> Self {
        Self { name, check }
    }

    /// Returns the schema name (usually the Rust type name).
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Checks `value` against the schema.
    pub fn check(&self, value: &Value) -> Result<(), String> {
        (self.check)(value)
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema").field("name", &self.name).finish()
    }
}

// Schemas compare by name; function pointer identity is not stable.
impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Schema {}

// ---------------------------------------------------------------------------
// Descriptor tree
// ---------------------------------------------------------------------------

/// Named wrapper layers that the codec knows how to unwrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WrapperKind {
    /// The outermost `{"return": …}` object.
    Envelope,
    /// A per-node outcome; mismatches below it become node errors.
    Result,
    /// salt-ssh per-node object carrying `retcode`, `stdout`, `stderr`.
    SshResult,
    /// A scheduled job handle (`jid` plus `minions`).
    AsyncJob,
    /// A nullable value.
    Optional,
}

impl WrapperKind {
    fn name(self) -> &'static str {
        match self {
            Self::Envelope => "Envelope",
            Self::Result => "Result",
            Self::SshResult => "SshResult",
            Self::AsyncJob => "AsyncJob",
            Self::Optional => "Option",
        }
    }
}

/// Runtime description of an expected JSON shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeDescriptor {
    /// A primitive leaf.
    Primitive(PrimitiveKind),
    /// A serde-checked leaf.
    Structured(Schema),
    /// A JSON array whose elements all have the inner shape.
    ListOf(Box<TypeDescriptor>),
    /// A JSON object. Keys are always strings on the wire; `key` describes how
    /// they are interpreted (`string` or `integer`).
    MapOf {
        /// Key interpretation.
        key: Box<TypeDescriptor>,
        /// Shape of every value.
        value: Box<TypeDescriptor>,
    },
    /// A named wrapper around an inner shape.
    Wrapper(WrapperKind, Box<TypeDescriptor>),
}

impl TypeDescriptor {
    /// Shorthand for [`TypeDescriptor::ListOf`].
    pub fn list_of(inner: TypeDescriptor) -> Self {
        Self::ListOf(Box::new(inner))
    }

    /// Shorthand for [`TypeDescriptor::MapOf`].
    pub fn map_of(key: TypeDescriptor, value: TypeDescriptor) -> Self {
        Self::MapOf {
            key: Box::new(key),
            value: Box::new(value),
        }
    }

    /// A map keyed by node id.
    pub fn node_map(value: TypeDescriptor) -> Self {
        Self::map_of(Self::Primitive(PrimitiveKind::String), value)
    }

    /// Shorthand for [`TypeDescriptor::Wrapper`].
    pub fn wrap(kind: WrapperKind, inner: TypeDescriptor) -> Self {
        Self::Wrapper(kind, Box::new(inner))
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primitive(kind) => f.write_str(kind.name()),
            Self::Structured(schema) => f.write_str(schema.name()),
            Self::ListOf(inner) => write!(f, "List<{inner}>"),
            Self::MapOf { key, value } => write!(f, "Map<{key}, {value}>"),
            Self::Wrapper(kind, inner) => write!(f, "{}<{inner}>", kind.name()),
        }
    }
}

// ---------------------------------------------------------------------------
// Composer
// ---------------------------------------------------------------------------

/// Builds the full response shape for a call returning `returns` under `mode`.
///
/// Pure: computed before any bytes are received.
pub fn compose(mode: ExecutionMode, returns: TypeDescriptor) -> TypeDescriptor {
    use TypeDescriptor as T;
    use WrapperKind as W;

    let element = match mode {
        ExecutionMode::Local | ExecutionMode::LocalBatch => {
            T::node_map(T::wrap(W::Result, returns))
        }
        ExecutionMode::LocalAsync => T::wrap(W::AsyncJob, returns),
        ExecutionMode::Ssh => T::node_map(T::wrap(W::Result, T::wrap(W::SshResult, returns))),
    };
    T::wrap(W::Envelope, T::list_of(element))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::{AsyncJobHandle, Envelope, NodeId, NodeResult, ReturnType, SshResult};

    #[test]
    fn local_composition_matches_static_shape() {
        assert_eq!(
            compose(ExecutionMode::Local, String::descriptor()),
            Envelope::<Vec<HashMap<NodeId, NodeResult<String>>>>::descriptor()
        );
    }

    #[test]
    fn batch_composition_matches_local_shape() {
        assert_eq!(
            compose(ExecutionMode::LocalBatch, i64::descriptor()),
            compose(ExecutionMode::Local, i64::descriptor())
        );
    }

    #[test]
    fn async_composition_matches_static_shape() {
        assert_eq!(
            compose(ExecutionMode::LocalAsync, bool::descriptor()),
            Envelope::<Vec<AsyncJobHandle<bool>>>::descriptor()
        );
    }

    #[test]
    fn ssh_composition_adds_ssh_layer_inside_result() {
        let composed = compose(ExecutionMode::Ssh, Vec::<String>::descriptor());
        assert_eq!(
            composed,
            Envelope::<Vec<HashMap<NodeId, NodeResult<SshResult<Vec<String>>>>>>::descriptor()
        );
        assert_eq!(
            composed.to_string(),
            "Envelope<List<Map<string, Result<SshResult<List<string>>>>>>"
        );
    }

    #[test]
    fn integer_kind_rejects_fractions() {
        assert!(PrimitiveKind::Integer.accepts(&serde_json::json!(3)));
        assert!(!PrimitiveKind::Integer.accepts(&serde_json::json!(3.5)));
        assert!(PrimitiveKind::Float.accepts(&serde_json::json!(3)));
    }
}
