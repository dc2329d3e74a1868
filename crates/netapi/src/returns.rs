//! The [`ReturnType`] witness trait.
//!
//! A type implementing [`ReturnType`] can describe its own JSON shape at run
//! time ([`ReturnType::descriptor`]) and rebuild itself from the codec's
//! [`Decoded`] tree ([`ReturnType::from_decoded`]). Implementations compose:
//! `Vec<HashMap<NodeId, NodeResult<R>>>` describes itself by asking `R`.
//!
//! Caller-defined structs join in through the [`Json`] wrapper, which checks
//! leaves with serde.

use std::any::type_name;
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::ops::Deref;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::{
    AsyncJobHandle, DecodeError, Decoded, Envelope, NodeError, NodeId, NodeResult, PrimitiveKind,
    Schema,
    SshResult, TypeDescriptor, WrapperKind,
};

/// A type that can be the declared return type of a call, or any layer around it.
pub trait ReturnType: Sized {
    /// Runtime descriptor of this type's JSON shape.
    fn descriptor() -> TypeDescriptor;

    /// Rebuilds a value from a tree decoded against [`Self::descriptor`].
    fn from_decoded(decoded: Decoded) -> Result<Self, DecodeError>;
}

fn conversion_error<T: ReturnType>(decoded: &Decoded) -> DecodeError {
    DecodeError::Mismatch {
        path: "$".to_string(),
        expected: T::descriptor().to_string(),
        found: decoded.kind().to_string(),
    }
}

// ---------------------------------------------------------------------------
// Primitives
// ---------------------------------------------------------------------------

impl ReturnType for bool {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::Primitive(PrimitiveKind::Bool)
    }

    fn from_decoded(decoded: Decoded) -> Result<Self, DecodeError> {
        match decoded {
            Decoded::Bool(b) => Ok(b),
            other => Err(conversion_error::<Self>(&other)),
        }
    }
}

impl ReturnType for String {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::Primitive(PrimitiveKind::String)
    }

    fn from_decoded(decoded: Decoded) -> Result<Self, DecodeError> {
        match decoded {
            Decoded::String(s) => Ok(s),
            other => Err(conversion_error::<Self>(&other)),
        }
    }
}

impl ReturnType for f64 {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::Primitive(PrimitiveKind::Float)
    }

    fn from_decoded(decoded: Decoded) -> Result<Self, DecodeError> {
        match decoded {
            Decoded::Number(ref n) => n.as_f64().ok_or_else(|| conversion_error::<Self>(&decoded)),
            other => Err(conversion_error::<Self>(&other)),
        }
    }
}

// Integers go through i64/u64 and a checked narrowing.
macro_rules! integer_return_type {
    ($($ty:ty => $wide:ident),* $(,)?) => {
        $(
            impl ReturnType for $ty {
                fn descriptor() -> TypeDescriptor {
                    TypeDescriptor::Primitive(PrimitiveKind::Integer)
                }

                fn from_decoded(decoded: Decoded) -> Result<Self, DecodeError> {
                    match decoded {
                        Decoded::Number(ref n) => n
                            .$wide()
                            .and_then(|v| <$ty>::try_from(v).ok())
                            .ok_or_else(|| conversion_error::<Self>(&decoded)),
                        other => Err(conversion_error::<Self>(&other)),
                    }
                }
            }
        )*
    };
}

integer_return_type! {
    i32 => as_i64,
    i64 => as_i64,
    u32 => as_u64,
    u64 => as_u64,
}

impl ReturnType for () {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::Primitive(PrimitiveKind::Null)
    }

    fn from_decoded(decoded: Decoded) -> Result<Self, DecodeError> {
        match decoded {
            Decoded::Null => Ok(()),
            other => Err(conversion_error::<Self>(&other)),
        }
    }
}

impl ReturnType for Value {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::Primitive(PrimitiveKind::Any)
    }

    fn from_decoded(decoded: Decoded) -> Result<Self, DecodeError> {
        match decoded {
            Decoded::Raw(v) => Ok(v),
            other => Err(conversion_error::<Self>(&other)),
        }
    }
}

// ---------------------------------------------------------------------------
// Containers
// ---------------------------------------------------------------------------

impl<T: ReturnType> ReturnType for Option<T> {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::wrap(WrapperKind::Optional, T::descriptor())
    }

    fn from_decoded(decoded: Decoded) -> Result<Self, DecodeError> {
        match decoded {
            Decoded::Optional(None) => Ok(None),
            Decoded::Optional(Some(inner)) => T::from_decoded(*inner).map(Some),
            other => Err(conversion_error::<Self>(&other)),
        }
    }
}

impl<T: ReturnType> ReturnType for Vec<T> {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::list_of(T::descriptor())
    }

    fn from_decoded(decoded: Decoded) -> Result<Self, DecodeError> {
        match decoded {
            Decoded::List(items) => items.into_iter().map(T::from_decoded).collect(),
            other => Err(conversion_error::<Self>(&other)),
        }
    }
}

/// Key types usable in decoded maps.
pub trait MapKey: Sized {
    /// Descriptor of the key interpretation.
    fn key_descriptor() -> TypeDescriptor;

    /// Parses a raw object key.
    fn from_key(key: String) -> Option<Self>;
}

impl MapKey for String {
    fn key_descriptor() -> TypeDescriptor {
        TypeDescriptor::Primitive(PrimitiveKind::String)
    }

    fn from_key(key: String) -> Option<Self> {
        Some(key)
    }
}

impl MapKey for NodeId {
    fn key_descriptor() -> TypeDescriptor {
        TypeDescriptor::Primitive(PrimitiveKind::String)
    }

    fn from_key(key: String) -> Option<Self> {
        NodeId::new(key)
    }
}

impl MapKey for i64 {
    fn key_descriptor() -> TypeDescriptor {
        TypeDescriptor::Primitive(PrimitiveKind::Integer)
    }

    fn from_key(key: String) -> Option<Self> {
        key.parse().ok()
    }
}

fn convert_entries<K, T, M>(decoded: Decoded) -> Result<M, DecodeError>
where
    K: MapKey,
    T: ReturnType,
    M: ReturnType + FromIterator<(K, T)>,
{
    let Decoded::Map(entries) = decoded else {
        return Err(conversion_error::<M>(&decoded));
    };
    entries
        .into_iter()
        .map(|(k, v)| {
            let key = K::from_key(k.clone()).ok_or_else(|| DecodeError::Mismatch {
                path: k,
                expected: K::key_descriptor().to_string(),
                found: "invalid key".to_string(),
            })?;
            Ok((key, T::from_decoded(v)?))
        })
        .collect()
}

impl<K, T> ReturnType for HashMap<K, T>
where
    K: MapKey + Eq + Hash,
    T: ReturnType,
{
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::map_of(K::key_descriptor(), T::descriptor())
    }

    fn from_decoded(decoded: Decoded) -> Result<Self, DecodeError> {
        convert_entries::<K, T, Self>(decoded)
    }
}

impl<K, T> ReturnType for BTreeMap<K, T>
where
    K: MapKey + Ord,
    T: ReturnType,
{
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::map_of(K::key_descriptor(), T::descriptor())
    }

    fn from_decoded(decoded: Decoded) -> Result<Self, DecodeError> {
        convert_entries::<K, T, Self>(decoded)
    }
}

// ---------------------------------------------------------------------------
// Wrappers
// ---------------------------------------------------------------------------

impl<T: ReturnType> ReturnType for Envelope<T> {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::wrap(WrapperKind::Envelope, T::descriptor())
    }

    fn from_decoded(decoded: Decoded) -> Result<Self, DecodeError> {
        match decoded {
            Decoded::Envelope(inner) => Ok(Envelope {
                result: T::from_decoded(*inner)?,
            }),
            other => Err(conversion_error::<Self>(&other)),
        }
    }
}

impl<T: ReturnType> ReturnType for NodeResult<T> {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::wrap(WrapperKind::Result, T::descriptor())
    }

    fn from_decoded(decoded: Decoded) -> Result<Self, DecodeError> {
        match decoded {
            // Conversion can still reject what the codec accepted (integer
            // width, map keys); that stays local to the node.
            Decoded::NodeResult(Ok(inner)) => {
                let json = inner.to_value();
                Ok(T::from_decoded(*inner).map_err(|err| NodeError::Unexpected {
                    json: json.to_string(),
                    reason: err.to_string(),
                }))
            }
            Decoded::NodeResult(Err(err)) => Ok(Err(err)),
            other => Err(conversion_error::<Self>(&other)),
        }
    }
}

impl<T: ReturnType> ReturnType for SshResult<T> {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::wrap(WrapperKind::SshResult, T::descriptor())
    }

    fn from_decoded(decoded: Decoded) -> Result<Self, DecodeError> {
        match decoded {
            Decoded::SshResult(inner) => inner.try_map(T::from_decoded),
            other => Err(conversion_error::<Self>(&other)),
        }
    }
}

impl<R: ReturnType> ReturnType for AsyncJobHandle<R> {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::wrap(WrapperKind::AsyncJob, R::descriptor())
    }

    fn from_decoded(decoded: Decoded) -> Result<Self, DecodeError> {
        match decoded {
            Decoded::Job { jid, minions } => Ok(AsyncJobHandle::new(jid, minions)),
            other => Err(conversion_error::<Self>(&other)),
        }
    }
}

// ---------------------------------------------------------------------------
// Caller-defined structs
// ---------------------------------------------------------------------------

/// Declares a serde-deserializable struct as a call's return type.
///
/// ```
/// use netapi::{CallDescriptor, Json};
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct DiskUsage {
///     capacity: String,
/// }
///
/// let call = CallDescriptor::<Json<DiskUsage>>::new("disk.usage");
/// assert_eq!(call.function(), "disk.usage");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Json<T>(pub T);

impl<T> Json<T> {
    /// Returns the wrapped value.
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> Deref for Json<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

fn serde_check<T: DeserializeOwned>(value: &Value) -> Result<(), String> {
    T::deserialize(value).map(drop).map_err(|err| err.to_string())
}

impl<T: DeserializeOwned> ReturnType for Json<T> {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::Structured(Schema::new(type_name::<T>(), serde_check::<T>))
    }

    fn from_decoded(decoded: Decoded) -> Result<Self, DecodeError> {
        match decoded {
            Decoded::Raw(value) => serde_json::from_value(value)
                .map(Json)
                .map_err(|err| DecodeError::Mismatch {
                    path: "$".to_string(),
                    expected: type_name::<T>().to_string(),
                    found: err.to_string(),
                }),
            other => Err(conversion_error::<Self>(&other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{decode_value, NodeError};

    fn roundtrip<T: ReturnType>(value: serde_json::Value) -> Result<T, DecodeError> {
        T::from_decoded(decode_value(&value, &T::descriptor())?)
    }

    #[test]
    fn narrowing_out_of_range_integers_fails() {
        assert_eq!(roundtrip::<i32>(json!(12)).unwrap(), 12);
        assert!(roundtrip::<i32>(json!(i64::MAX)).is_err());
        assert!(roundtrip::<u32>(json!(-1)).is_err());
    }

    #[test]
    fn node_maps_convert_with_node_errors_intact() {
        let map: HashMap<NodeId, NodeResult<bool>> =
            roundtrip(json!({"m1": true, "m2": "'x.y' is not available."})).unwrap();
        assert_eq!(map["m1"], Ok(true));
        assert!(matches!(map["m2"], Err(NodeError::FunctionNotAvailable { .. })));
    }

    #[test]
    fn narrowing_failures_stay_inside_the_node_result() {
        let map: HashMap<NodeId, NodeResult<i32>> =
            roundtrip(json!({"m1": 7, "m2": 5_000_000_000_i64})).unwrap();
        assert_eq!(map["m1"], Ok(7));
        assert!(matches!(
            &map["m2"],
            Err(NodeError::Unexpected { json, .. }) if json == "5000000000"
        ));
    }

    #[test]
    fn json_wrapper_checks_struct_shape() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct Disk {
            capacity: String,
        }

        let ok: Json<Disk> = roundtrip(json!({"capacity": "42%"})).unwrap();
        assert_eq!(ok.capacity, "42%");
        assert!(roundtrip::<Json<Disk>>(json!({"size": 1})).is_err());
    }

    #[test]
    fn integer_keyed_maps_parse_keys() {
        let map: BTreeMap<i64, String> = roundtrip(json!({"1": "a", "20": "b"})).unwrap();
        assert_eq!(map.keys().copied().collect::<Vec<_>>(), vec![1, 20]);
    }
}
