//! Descriptor-driven JSON decoding.
//!
//! [`JsonCodec`] parses a response body with `serde_json` and walks the
//! [`TypeDescriptor`] composed for the call, producing a [`Decoded`] tree
//! whose shape mirrors the descriptor. Static conversion into the caller's
//! Rust types happens afterwards through [`crate::ReturnType::from_decoded`].
//!
//! ## Failure boundaries
//!
//! A mismatch anywhere *below* a [`WrapperKind::Result`] layer is absorbed into
//! a per-node [`NodeError`]; the call itself still succeeds. A mismatch above
//! every `Result` layer (no `return` key, `return` not a list, a node map that
//! is not an object) is a [`DecodeError`] and aborts the call.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde_json::{Map, Number, Value};

use crate::{
    DecodeError, JobId, NodeError, NodeId, PrimitiveKind, SshResult, TypeDescriptor, WrapperKind,
};

// ---------------------------------------------------------------------------
// Port
// ---------------------------------------------------------------------------

/// Turns raw response text into a descriptor-shaped value.
pub trait Codec {
    /// Decodes `raw` against `descriptor`.
    fn decode(&self, raw: &str, descriptor: &TypeDescriptor) -> Result<Decoded, DecodeError>;
}

/// The default JSON codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn decode(&self, raw: &str, descriptor: &TypeDescriptor) -> Result<Decoded, DecodeError> {
        let value: Value = serde_json::from_str(raw).map_err(|err| DecodeError::Malformed {
            reason: err.to_string(),
        })?;
        decode_value(&value, descriptor)
    }
}

/// Decodes an already parsed JSON value against `descriptor`.
pub fn decode_value(value: &Value, descriptor: &TypeDescriptor) -> Result<Decoded, DecodeError> {
    decode_at(value, descriptor, &mut JsonPath::default())
}

// ---------------------------------------------------------------------------
// Decoded tree
// ---------------------------------------------------------------------------

/// Output of the codec. Each variant corresponds to one descriptor form.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// `Primitive(Null)`.
    Null,
    /// `Primitive(Bool)`.
    Bool(bool),
    /// `Primitive(Integer)` or `Primitive(Float)`.
    Number(Number),
    /// `Primitive(String)`.
    String(String),
    /// `ListOf`.
    List(Vec<Decoded>),
    /// `MapOf`; keys are the raw object keys.
    Map(BTreeMap<String, Decoded>),
    /// `Wrapper(Optional)`.
    Optional(Option<Box<Decoded>>),
    /// `Wrapper(Result)`.
    NodeResult(Result<Box<Decoded>, NodeError>),
    /// `Wrapper(SshResult)`.
    SshResult(Box<SshResult<Decoded>>),
    /// `Wrapper(AsyncJob)`.
    Job {
        /// Backend job id.
        jid: JobId,
        /// Nodes the job was scheduled on.
        minions: Vec<NodeId>,
    },
    /// `Wrapper(Envelope)`.
    Envelope(Box<Decoded>),
    /// `Primitive(Any)` and `Structured` leaves.
    Raw(Value),
}

impl Decoded {
    /// Short name of the variant, used in conversion errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::List(_) => "list",
            Self::Map(_) => "map",
            Self::Optional(_) => "optional",
            Self::NodeResult(_) => "result",
            Self::SshResult(_) => "ssh result",
            Self::Job { .. } => "job",
            Self::Envelope(_) => "envelope",
            Self::Raw(_) => "raw json",
        }
    }

    /// Renders the tree back to JSON, for error reports.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Null | Self::Optional(None) => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Number(n) => Value::Number(n.clone()),
            Self::String(s) => Value::String(s.clone()),
            Self::List(items) => Value::Array(items.iter().map(Self::to_value).collect()),
            Self::Map(entries) => Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_value()))
                    .collect(),
            ),
            Self::Optional(Some(inner)) | Self::NodeResult(Ok(inner)) => inner.to_value(),
            Self::NodeResult(Err(err)) => Value::String(err.to_string()),
            Self::SshResult(ssh) => {
                let mut obj = Map::new();
                if let Some(ret) = &ssh.return_value {
                    obj.insert("return".to_string(), ret.to_value());
                }
                if let Some(retcode) = ssh.retcode {
                    obj.insert("retcode".to_string(), Value::from(retcode));
                }
                for (key, field) in [
                    ("stdout", &ssh.stdout),
                    ("stderr", &ssh.stderr),
                    ("fun", &ssh.fun),
                    ("id", &ssh.id),
                    ("jid", &ssh.jid),
                ] {
                    if let Some(text) = field {
                        obj.insert(key.to_string(), Value::String(text.clone()));
                    }
                }
                obj.insert("fun_args".to_string(), Value::Array(ssh.fun_args.clone()));
                Value::Object(obj)
            }
            Self::Job { jid, minions } => serde_json::json!({
                "jid": jid.as_str(),
                "minions": minions.iter().map(NodeId::as_str).collect::<Vec<_>>(),
            }),
            Self::Envelope(inner) => serde_json::json!({ "return": inner.to_value() }),
            Self::Raw(value) => value.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// JSON path tracking for error messages
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct JsonPath(String);

impl JsonPath {
    /// Appends an object key and returns the mark to restore afterwards.
    fn key(&mut self, key: &str) -> usize {
        let mark = self.0.len();
        if !self.0.is_empty() {
            self.0.push('.');
        }
        self.0.push_str(key);
        mark
    }

    /// Appends an array index and returns the mark to restore afterwards.
    fn index(&mut self, index: usize) -> usize {
        let mark = self.0.len();
        let _ = write!(self.0, "[{index}]");
        mark
    }

    fn restore(&mut self, mark: usize) {
        self.0.truncate(mark);
    }

    fn render(&self) -> String {
        if self.0.is_empty() {
            "$".to_string()
        } else {
            self.0.clone()
        }
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "float",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "map",
    }
}

fn mismatch(path: &JsonPath, expected: impl ToString, found: &str) -> DecodeError {
    DecodeError::Mismatch {
        path: path.render(),
        expected: expected.to_string(),
        found: found.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Walker
// ---------------------------------------------------------------------------

fn decode_at(
    value: &Value,
    descriptor: &TypeDescriptor,
    path: &mut JsonPath,
) -> Result<Decoded, DecodeError> {
    match descriptor {
        TypeDescriptor::Primitive(kind) => decode_primitive(value, *kind, path),
        TypeDescriptor::Structured(schema) => match schema.check(value) {
            Ok(()) => Ok(Decoded::Raw(value.clone())),
            Err(reason) => Err(mismatch(
                path,
                format!("{} ({reason})", schema.name()),
                kind_of(value),
            )),
        },
        TypeDescriptor::ListOf(inner) => {
            let Value::Array(items) = value else {
                return Err(mismatch(path, descriptor, kind_of(value)));
            };
            let mut out = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                let mark = path.index(i);
                let decoded = decode_at(item, inner, path);
                path.restore(mark);
                out.push(decoded?);
            }
            Ok(Decoded::List(out))
        }
        TypeDescriptor::MapOf { key, value: inner } => {
            let Value::Object(entries) = value else {
                return Err(mismatch(path, descriptor, kind_of(value)));
            };
            let mut out = BTreeMap::new();
            for (k, v) in entries {
                let mark = path.key(k);
                let decoded = check_key(k, key, path).and_then(|()| decode_at(v, inner, path));
                path.restore(mark);
                out.insert(k.clone(), decoded?);
            }
            Ok(Decoded::Map(out))
        }
        TypeDescriptor::Wrapper(kind, inner) => decode_wrapper(value, *kind, inner, descriptor, path),
    }
}

fn decode_primitive(
    value: &Value,
    kind: PrimitiveKind,
    path: &JsonPath,
) -> Result<Decoded, DecodeError> {
    match (kind, value) {
        (PrimitiveKind::Any, v) => Ok(Decoded::Raw(v.clone())),
        (PrimitiveKind::Null, Value::Null) => Ok(Decoded::Null),
        (PrimitiveKind::Bool, Value::Bool(b)) => Ok(Decoded::Bool(*b)),
        (PrimitiveKind::Integer | PrimitiveKind::Float, Value::Number(n)) if kind.accepts(value) => {
            Ok(Decoded::Number(n.clone()))
        }
        (PrimitiveKind::String, Value::String(s)) => Ok(Decoded::String(s.clone())),
        _ => Err(mismatch(path, TypeDescriptor::Primitive(kind), kind_of(value))),
    }
}

fn check_key(key: &str, descriptor: &TypeDescriptor, path: &JsonPath) -> Result<(), DecodeError> {
    match descriptor {
        TypeDescriptor::Primitive(PrimitiveKind::String | PrimitiveKind::Any) => Ok(()),
        TypeDescriptor::Primitive(PrimitiveKind::Integer) if key.parse::<i64>().is_ok() => Ok(()),
        _ => Err(mismatch(path, format!("{descriptor} key"), "invalid key")),
    }
}

fn decode_wrapper(
    value: &Value,
    kind: WrapperKind,
    inner: &TypeDescriptor,
    descriptor: &TypeDescriptor,
    path: &mut JsonPath,
) -> Result<Decoded, DecodeError> {
    match kind {
        WrapperKind::Envelope => {
            let Value::Object(obj) = value else {
                return Err(mismatch(path, descriptor, kind_of(value)));
            };
            let ret = obj.get("return").ok_or(DecodeError::MissingReturn)?;
            let mark = path.key("return");
            let decoded = decode_at(ret, inner, path);
            path.restore(mark);
            Ok(Decoded::Envelope(Box::new(decoded?)))
        }
        WrapperKind::Result => Ok(Decoded::NodeResult(decode_node_result(value, inner, path))),
        WrapperKind::SshResult => {
            let Value::Object(obj) = value else {
                return Err(mismatch(path, descriptor, kind_of(value)));
            };
            decode_ssh_result(obj, inner, path).map(|r| Decoded::SshResult(Box::new(r)))
        }
        WrapperKind::AsyncJob => {
            let Value::Object(obj) = value else {
                return Err(mismatch(path, descriptor, kind_of(value)));
            };
            decode_job(obj, path)
        }
        WrapperKind::Optional => match value {
            Value::Null => Ok(Decoded::Optional(None)),
            other => decode_at(other, inner, path).map(|d| Decoded::Optional(Some(Box::new(d)))),
        },
    }
}

/// Decodes one node's outcome. Never fails: every mismatch becomes a
/// [`NodeError`].
fn decode_node_result(
    value: &Value,
    inner: &TypeDescriptor,
    path: &mut JsonPath,
) -> Result<Box<Decoded>, NodeError> {
    if let Value::String(message) = value {
        if let Some(err) = NodeError::classify(message) {
            return Err(err);
        }
    }

    let direct = match decode_at(value, inner, path) {
        Ok(decoded) => return Ok(Box::new(decoded)),
        Err(err) => err,
    };

    // Full-return form: {"ret": <value>, "retcode": 0, "jid": …}.
    if let Some(ret) = value.as_object().and_then(|obj| obj.get("ret")) {
        let mark = path.key("ret");
        let decoded = decode_at(ret, inner, path);
        path.restore(mark);
        if let Ok(decoded) = decoded {
            return Ok(Box::new(decoded));
        }
    }

    Err(match value {
        Value::String(message) => NodeError::Generic {
            message: message.clone(),
        },
        other => NodeError::Unexpected {
            json: other.to_string(),
            reason: direct.to_string(),
        },
    })
}

fn decode_ssh_result(
    obj: &Map<String, Value>,
    inner: &TypeDescriptor,
    path: &mut JsonPath,
) -> Result<SshResult<Decoded>, DecodeError> {
    let return_value = match obj.get("return") {
        Some(ret) => {
            let mark = path.key("return");
            let decoded = decode_at(ret, inner, path);
            path.restore(mark);
            Some(decoded?)
        }
        None => None,
    };

    let retcode = match obj.get("retcode") {
        None | Some(Value::Null) => None,
        Some(Value::Number(n)) if n.is_i64() => n.as_i64(),
        Some(other) => {
            let mark = path.key("retcode");
            let err = mismatch(path, "integer", kind_of(other));
            path.restore(mark);
            return Err(err);
        }
    };

    let fun_args = match obj.get("fun_args") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.clone(),
        Some(other) => {
            let mark = path.key("fun_args");
            let err = mismatch(path, "list", kind_of(other));
            path.restore(mark);
            return Err(err);
        }
    };

    Ok(SshResult {
        return_value,
        retcode,
        stdout: optional_string(obj, "stdout", path)?,
        stderr: optional_string(obj, "stderr", path)?,
        fun: optional_string(obj, "fun", path)?,
        fun_args,
        id: optional_string(obj, "id", path)?,
        jid: optional_string(obj, "jid", path)?,
    })
}

fn decode_job(obj: &Map<String, Value>, path: &mut JsonPath) -> Result<Decoded, DecodeError> {
    let mark = path.key("jid");
    let jid = match obj.get("jid") {
        Some(Value::String(s)) => JobId::new(s.as_str()),
        _ => None,
    };
    let Some(jid) = jid else {
        let found = obj.get("jid").map_or("nothing", kind_of);
        let err = mismatch(path, "non-empty job id string", found);
        path.restore(mark);
        return Err(err);
    };
    path.restore(mark);

    let mut minions = Vec::new();
    match obj.get("minions") {
        None | Some(Value::Null) => {}
        Some(Value::Array(items)) => {
            for (i, item) in items.iter().enumerate() {
                let node = item.as_str().and_then(NodeId::new);
                let Some(node) = node else {
                    let mark = path.key("minions");
                    path.index(i);
                    let err = mismatch(path, "node id string", kind_of(item));
                    path.restore(mark);
                    return Err(err);
                };
                minions.push(node);
            }
        }
        Some(other) => {
            let mark = path.key("minions");
            let err = mismatch(path, "list", kind_of(other));
            path.restore(mark);
            return Err(err);
        }
    }

    Ok(Decoded::Job { jid, minions })
}

fn optional_string(
    obj: &Map<String, Value>,
    key: &str,
    path: &mut JsonPath,
) -> Result<Option<String>, DecodeError> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => {
            let mark = path.key(key);
            let err = mismatch(path, "string", kind_of(other));
            path.restore(mark);
            Err(err)
        }
    }
}
