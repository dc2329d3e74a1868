//! Target addressing and batch fan-out.
//!
//! A [`Target`] selects the nodes a call runs on. Each variant produces the
//! wire pair `tgt` (the expression) and `expr_form` (the selection-mode tag).
//! [`SshTarget`] is the restricted set usable over salt-ssh, reachable only
//! through [`Target::Ssh`].

use std::fmt;

use serde_json::{Map, Value};

use crate::ValidationError;

// ---------------------------------------------------------------------------
// Targets
// ---------------------------------------------------------------------------

/// A key/value match with an optional custom delimiter (grains, pillar).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyMatch {
    /// Key path (e.g. `os` or `roles:web` with a nested delimiter).
    pub key: String,
    /// Value or pattern to match.
    pub value: String,
    /// Delimiter between key and value; `:` when `None`.
    pub delimiter: Option<char>,
}

impl KeyMatch {
    /// Creates a match with the default `:` delimiter.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            delimiter: None,
        }
    }

    /// Returns a copy using `delimiter` between key and value.
    #[must_use]
    pub fn with_delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = Some(delimiter);
        self
    }

    fn expression(&self) -> String {
        format!("{}{}{}", self.key, self.delimiter.unwrap_or(':'), self.value)
    }
}

/// Node selection for a dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Shell-style glob over node ids.
    Glob(String),
    /// Perl-compatible regular expression over node ids.
    Pcre(String),
    /// Explicit list of node ids.
    List(Vec<String>),
    /// Grain value match.
    Grain(KeyMatch),
    /// Grain regular-expression match.
    GrainPcre(KeyMatch),
    /// Pillar value match.
    Pillar(KeyMatch),
    /// Pillar regular-expression match.
    PillarPcre(KeyMatch),
    /// Compound expression combining other matchers.
    Compound(String),
    /// Named nodegroup from the master configuration.
    Nodegroup(String),
    /// Range cluster expression.
    Range(String),
    /// IP address or CIDR subnet.
    Ipcidr(String),
    /// Target for the salt-ssh channel.
    Ssh(SshTarget),
}

impl Target {
    /// Shorthand for [`Target::Glob`].
    pub fn glob(expression: impl Into<String>) -> Self {
        Self::Glob(expression.into())
    }

    /// Shorthand for [`Target::List`].
    pub fn list<I, S>(nodes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::List(nodes.into_iter().map(Into::into).collect())
    }

    /// Shorthand for a [`Target::Grain`] match with the default delimiter.
    pub fn grain(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Grain(KeyMatch::new(key, value))
    }

    /// Shorthand for [`Target::Compound`].
    pub fn compound(expression: impl Into<String>) -> Self {
        Self::Compound(expression.into())
    }

    /// Selection-mode tag sent as `expr_form`.
    pub fn expr_form(&self) -> &'static str {
        match self {
            Self::Glob(_) => "glob",
            Self::Pcre(_) => "pcre",
            Self::List(_) => "list",
            Self::Grain(_) => "grain",
            Self::GrainPcre(_) => "grain_pcre",
            Self::Pillar(_) => "pillar",
            Self::PillarPcre(_) => "pillar_pcre",
            Self::Compound(_) => "compound",
            Self::Nodegroup(_) => "nodegroup",
            Self::Range(_) => "range",
            Self::Ipcidr(_) => "ipcidr",
            Self::Ssh(ssh) => ssh.expr_form(),
        }
    }

    /// Target expression sent as `tgt`: a string, or an array for list targets.
    pub fn expression(&self) -> Value {
        match self {
            Self::Glob(e)
            | Self::Pcre(e)
            | Self::Compound(e)
            | Self::Nodegroup(e)
            | Self::Range(e)
            | Self::Ipcidr(e) => Value::String(e.clone()),
            Self::List(nodes) => Value::Array(nodes.iter().cloned().map(Value::String).collect()),
            Self::Grain(m) | Self::GrainPcre(m) | Self::Pillar(m) | Self::PillarPcre(m) => {
                Value::String(m.expression())
            }
            Self::Ssh(ssh) => ssh.expression(),
        }
    }

    /// Returns `true` for [`Target::Ssh`].
    pub fn is_ssh(&self) -> bool {
        matches!(self, Self::Ssh(_))
    }

    /// Rejects empty expressions, empty lists and empty list entries.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let empty = match self {
            Self::List(nodes) => nodes.is_empty() || nodes.iter().any(String::is_empty),
            Self::Grain(m) | Self::GrainPcre(m) | Self::Pillar(m) | Self::PillarPcre(m) => {
                m.key.is_empty()
            }
            Self::Ssh(ssh) => return ssh.validate(),
            Self::Glob(e)
            | Self::Pcre(e)
            | Self::Compound(e)
            | Self::Nodegroup(e)
            | Self::Range(e)
            | Self::Ipcidr(e) => e.is_empty(),
        };
        if empty {
            Err(ValidationError::EmptyTarget)
        } else {
            Ok(())
        }
    }

    /// Writes `tgt`, `expr_form` and, for key matches with a custom
    /// delimiter, `delimiter` into `fields`.
    pub fn write_fields(&self, fields: &mut Map<String, Value>) {
        fields.insert("tgt".to_string(), self.expression());
        fields.insert(
            "expr_form".to_string(),
            Value::String(self.expr_form().to_string()),
        );
        if let Self::Grain(m) | Self::GrainPcre(m) | Self::Pillar(m) | Self::PillarPcre(m) = self {
            if let Some(delimiter) = m.delimiter {
                fields.insert(
                    "delimiter".to_string(),
                    Value::String(delimiter.to_string()),
                );
            }
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.expression() {
            Value::String(s) => write!(f, "{}:{s}", self.expr_form()),
            other => write!(f, "{}:{other}", self.expr_form()),
        }
    }
}

// ---------------------------------------------------------------------------
// SSH targets
// ---------------------------------------------------------------------------

/// Node selection understood by salt-ssh (matched against the roster).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SshTarget {
    /// Glob over roster ids.
    Glob(String),
    /// Regular expression over roster ids.
    Pcre(String),
    /// Explicit list of roster ids.
    List(Vec<String>),
    /// Range cluster expression.
    Range(String),
}

impl SshTarget {
    /// Selection-mode tag sent as `expr_form`.
    pub fn expr_form(&self) -> &'static str {
        match self {
            Self::Glob(_) => "glob",
            Self::Pcre(_) => "pcre",
            Self::List(_) => "list",
            Self::Range(_) => "range",
        }
    }

    /// Target expression sent as `tgt`.
    pub fn expression(&self) -> Value {
        match self {
            Self::Glob(e) | Self::Pcre(e) | Self::Range(e) => Value::String(e.clone()),
            Self::List(nodes) => Value::Array(nodes.iter().cloned().map(Value::String).collect()),
        }
    }

    fn validate(&self) -> Result<(), ValidationError> {
        let empty = match self {
            Self::Glob(e) | Self::Pcre(e) | Self::Range(e) => e.is_empty(),
            Self::List(nodes) => nodes.is_empty() || nodes.iter().any(String::is_empty),
        };
        if empty {
            Err(ValidationError::EmptyTarget)
        } else {
            Ok(())
        }
    }
}

impl From<SshTarget> for Target {
    fn from(target: SshTarget) -> Self {
        Self::Ssh(target)
    }
}

// ---------------------------------------------------------------------------
// Batch
// ---------------------------------------------------------------------------

/// Wave fan-out for batched execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Batch {
    /// At most this many nodes per wave.
    Count(u32),
    /// At most this percentage of the targeted nodes per wave.
    Percent(u8),
}

impl Batch {
    /// Creates a count-based batch; `count` must be at least 1.
    pub fn count(count: u32) -> Result<Self, ValidationError> {
        if count == 0 {
            return Err(ValidationError::InvalidBatch {
                reason: "batch count must be at least 1".to_string(),
            });
        }
        Ok(Self::Count(count))
    }

    /// Creates a percentage batch; `percent` must be in `1..=100`.
    pub fn percent(percent: u8) -> Result<Self, ValidationError> {
        if !(1..=100).contains(&percent) {
            return Err(ValidationError::InvalidBatch {
                reason: format!("batch percentage {percent} is outside 1..=100"),
            });
        }
        Ok(Self::Percent(percent))
    }

    /// Re-checks a batch built directly from its variants.
    pub fn validate(self) -> Result<(), ValidationError> {
        match self {
            Self::Count(count) => Self::count(count).map(drop),
            Self::Percent(percent) => Self::percent(percent).map(drop),
        }
    }
}

impl fmt::Display for Batch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Count(n) => write!(f, "{n}"),
            Self::Percent(p) => write!(f, "{p}%"),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn list_targets_serialize_as_arrays() {
        let mut fields = Map::new();
        Target::list(["a", "b"]).write_fields(&mut fields);
        assert_eq!(fields["tgt"], json!(["a", "b"]));
        assert_eq!(fields["expr_form"], json!("list"));
    }

    #[test]
    fn grain_delimiter_is_emitted_only_when_custom() {
        let mut fields = Map::new();
        Target::grain("os", "Ubuntu").write_fields(&mut fields);
        assert_eq!(fields["tgt"], json!("os:Ubuntu"));
        assert!(!fields.contains_key("delimiter"));

        let mut fields = Map::new();
        Target::Grain(KeyMatch::new("roles", "web").with_delimiter('|')).write_fields(&mut fields);
        assert_eq!(fields["tgt"], json!("roles|web"));
        assert_eq!(fields["delimiter"], json!("|"));
    }

    #[test]
    fn empty_expressions_are_rejected() {
        assert_eq!(Target::glob("").validate(), Err(ValidationError::EmptyTarget));
        assert_eq!(
            Target::List(Vec::new()).validate(),
            Err(ValidationError::EmptyTarget)
        );
        assert_eq!(
            Target::list(["a", ""]).validate(),
            Err(ValidationError::EmptyTarget)
        );
        assert_eq!(
            Target::Ssh(SshTarget::Glob(String::new())).validate(),
            Err(ValidationError::EmptyTarget)
        );
        assert!(Target::compound("G@os:Debian and web*").validate().is_ok());
    }

    #[test]
    fn ssh_targets_keep_their_own_tags() {
        let target = Target::from(SshTarget::Pcre("web-\\d+".to_string()));
        assert!(target.is_ssh());
        assert_eq!(target.expr_form(), "pcre");
    }

    #[test]
    fn batch_string_forms() {
        assert_eq!(Batch::count(10).unwrap().to_string(), "10");
        assert_eq!(Batch::percent(25).unwrap().to_string(), "25%");
    }

    #[test]
    fn batch_ranges_are_enforced() {
        assert!(Batch::count(0).is_err());
        assert!(Batch::percent(0).is_err());
        assert!(Batch::percent(101).is_err());
        assert!(Batch::percent(100).is_ok());
    }
}
