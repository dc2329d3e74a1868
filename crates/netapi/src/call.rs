//! Call descriptors: what to run, independent of where and how.
//!
//! A [`CallDescriptor`] names an execution-module function, its arguments and
//! its declared return type. It is immutable; the `with_*` methods return new
//! descriptors, so one base descriptor can be reused across dispatches with
//! different metadata.

use std::fmt;
use std::marker::PhantomData;

use serde_json::{Map, Value};

use crate::{ReturnType, TypeDescriptor};

/// Description of one function invocation returning `R` per node.
pub struct CallDescriptor<R> {
    function: String,
    args: Option<Vec<Value>>,
    kwargs: Option<Map<String, Value>>,
    metadata: Option<Value>,
    _returns: PhantomData<fn() -> R>,
}

impl<R> CallDescriptor<R> {
    /// Creates a call of `function` with no arguments and no metadata.
    ///
    /// An empty name is accepted here and rejected at dispatch.
    pub fn new(function: impl Into<String>) -> Self {
        Self {
            function: function.into(),
            args: None,
            kwargs: None,
            metadata: None,
            _returns: PhantomData,
        }
    }

    /// Returns a copy with the given positional arguments.
    #[must_use]
    pub fn with_args(&self, args: Vec<Value>) -> Self {
        Self {
            args: Some(args),
            ..self.clone()
        }
    }

    /// Returns a copy with the given keyword arguments.
    #[must_use]
    pub fn with_kwargs(&self, kwargs: Map<String, Value>) -> Self {
        Self {
            kwargs: Some(kwargs),
            ..self.clone()
        }
    }

    /// Returns a copy carrying `metadata`, which the backend attaches to the job.
    #[must_use]
    pub fn with_metadata(&self, metadata: Value) -> Self {
        Self {
            metadata: Some(metadata),
            ..self.clone()
        }
    }

    /// Returns a copy without metadata.
    #[must_use]
    pub fn without_metadata(&self) -> Self {
        Self {
            metadata: None,
            ..self.clone()
        }
    }

    /// Function name (e.g. `test.ping`).
    pub fn function(&self) -> &str {
        &self.function
    }

    /// Positional arguments, if any.
    pub fn args(&self) -> Option<&[Value]> {
        self.args.as_deref()
    }

    /// Keyword arguments, if any.
    pub fn kwargs(&self) -> Option<&Map<String, Value>> {
        self.kwargs.as_ref()
    }

    /// Attached metadata, if any.
    pub fn metadata(&self) -> Option<&Value> {
        self.metadata.as_ref()
    }

    /// Builds the call's part of the request object.
    ///
    /// Always contains `fun`; `arg`, `kwarg` and `metadata` appear only when
    /// set.
    pub fn payload(&self) -> Map<String, Value> {
        let mut payload = Map::new();
        payload.insert("fun".to_string(), Value::String(self.function.clone()));
        if let Some(args) = &self.args {
            payload.insert("arg".to_string(), Value::Array(args.clone()));
        }
        if let Some(kwargs) = &self.kwargs {
            payload.insert("kwarg".to_string(), Value::Object(kwargs.clone()));
        }
        if let Some(metadata) = &self.metadata {
            payload.insert("metadata".to_string(), metadata.clone());
        }
        payload
    }
}

impl<R: ReturnType> CallDescriptor<R> {
    /// Descriptor of the per-node return type `R`.
    pub fn return_type(&self) -> TypeDescriptor {
        R::descriptor()
    }
}

impl<R> Clone for CallDescriptor<R> {
    fn clone(&self) -> Self {
        Self {
            function: self.function.clone(),
            args: self.args.clone(),
            kwargs: self.kwargs.clone(),
            metadata: self.metadata.clone(),
            _returns: PhantomData,
        }
    }
}

impl<R> fmt::Debug for CallDescriptor<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallDescriptor")
            .field("function", &self.function)
            .field("args", &self.args)
            .field("kwargs", &self.kwargs)
            .field("metadata", &self.metadata)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn ping() -> CallDescriptor<bool> {
        CallDescriptor::new("test.ping")
    }

    #[test]
    fn payload_always_has_fun_and_nothing_absent() {
        let payload = ping().payload();
        assert_eq!(payload.len(), 1);
        assert_eq!(payload["fun"], json!("test.ping"));
        assert!(!payload.contains_key("arg"));
        assert!(!payload.contains_key("kwarg"));
        assert!(!payload.contains_key("metadata"));
    }

    #[test]
    fn payload_includes_present_arguments() {
        let mut kwargs = Map::new();
        kwargs.insert("timeout".to_string(), json!(5));
        let call = CallDescriptor::<String>::new("cmd.run")
            .with_args(vec![json!("uptime")])
            .with_kwargs(kwargs);

        let payload = call.payload();
        assert_eq!(payload["arg"], json!(["uptime"]));
        assert_eq!(payload["kwarg"], json!({"timeout": 5}));
    }

    #[test]
    fn metadata_is_added_and_removed_without_touching_the_base() {
        let base = ping();
        let tagged = base.with_metadata(json!({"trace": "abc"}));

        let mut expected = base.payload();
        expected.insert("metadata".to_string(), json!({"trace": "abc"}));
        assert_eq!(tagged.payload(), expected);

        assert_eq!(tagged.without_metadata().payload(), base.payload());
        assert!(base.metadata().is_none());
        assert_eq!(base.payload().len(), 1);
    }

    #[test]
    fn empty_argument_list_is_still_emitted() {
        let payload = ping().with_args(Vec::new()).payload();
        assert_eq!(payload["arg"], json!([]));
    }

    #[test]
    fn return_type_is_retained() {
        assert_eq!(ping().return_type().to_string(), "bool");
    }
}
