//! Ready-made call descriptors for common execution-module functions.
//!
//! Each function returns a [`CallDescriptor`] with the return type the
//! backend function is known to produce. Anything not covered here is built
//! with [`CallDescriptor::new`] directly.

use std::collections::HashMap;

use serde_json::Value;

use crate::CallDescriptor;

/// The `test` execution module.
pub mod test {
    use super::*;

    /// `test.ping`: `true` from every responding node.
    pub fn ping() -> CallDescriptor<bool> {
        CallDescriptor::new("test.ping")
    }

    /// `test.echo`: returns `text` unchanged.
    pub fn echo(text: &str) -> CallDescriptor<String> {
        CallDescriptor::new("test.echo").with_args(vec![Value::from(text)])
    }

    /// `test.version`: the node's Salt version string.
    pub fn version() -> CallDescriptor<String> {
        CallDescriptor::new("test.version")
    }
}

/// The `cmd` execution module.
pub mod cmd {
    use super::*;

    /// `cmd.run`: the command's combined output.
    pub fn run(command: &str) -> CallDescriptor<String> {
        CallDescriptor::new("cmd.run").with_args(vec![Value::from(command)])
    }

    /// `cmd.retcode`: the command's exit status.
    pub fn retcode(command: &str) -> CallDescriptor<i64> {
        CallDescriptor::new("cmd.retcode").with_args(vec![Value::from(command)])
    }
}

/// The `grains` execution module.
pub mod grains {
    use super::*;

    /// `grains.items`: all grains of the node.
    pub fn items() -> CallDescriptor<HashMap<String, Value>> {
        CallDescriptor::new("grains.items")
    }

    /// `grains.get`: a single grain, `""` when unset.
    pub fn get(key: &str) -> CallDescriptor<Value> {
        CallDescriptor::new("grains.get").with_args(vec![Value::from(key)])
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{ReturnType, TypeDescriptor};

    #[test]
    fn descriptors_carry_function_and_args() {
        let call = cmd::run("uptime");
        assert_eq!(call.function(), "cmd.run");
        assert_eq!(call.args(), Some(&[json!("uptime")][..]));
        assert_eq!(test::ping().args(), None);
    }

    #[test]
    fn return_types_match_the_backend_functions() {
        assert_eq!(test::ping().return_type(), bool::descriptor());
        assert_eq!(
            grains::items().return_type(),
            TypeDescriptor::map_of(String::descriptor(), Value::descriptor())
        );
    }
}
