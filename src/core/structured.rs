//! Structured values - the currency between native code and handlers
//!
//! Every argument passed to a scripted handler and every value it returns is
//! a `StructuredValue`. Handler-side objects with no native equivalent travel
//! as `Generic` values and are only unwrapped by the bridge that made them.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use super::status::Status;

/// Conversion failures from a `StructuredValue` into a typed result
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConversionError {
    #[error("Null or invalid object")]
    NullOrInvalid,

    #[error("expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("unexpected value for {expected}: {reason}")]
    Malformed {
        expected: &'static str,
        reason: String,
    },
}

/// Opaque wrapper around an object owned by a script runtime.
///
/// The payload is reference counted; the foreign object is released when the
/// last clone is dropped.
#[derive(Clone)]
pub struct GenericObject {
    inner: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl GenericObject {
    pub fn new<T: Any + Send + Sync>(object: T) -> Self {
        Self {
            inner: Arc::new(object),
            type_name: std::any::type_name::<T>(),
        }
    }

    /// Borrow the wrapped object if it is a `T`
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Whether both wrappers point at the same foreign object
    pub fn ptr_eq(&self, other: &GenericObject) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for GenericObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GenericObject<{}>", self.type_name)
    }
}

impl PartialEq for GenericObject {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

/// String-keyed mapping of structured values
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dictionary {
    items: BTreeMap<String, StructuredValue>,
}

impl Dictionary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<StructuredValue>) {
        self.items.insert(key.into(), value.into());
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: impl Into<StructuredValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn remove(&mut self, key: &str) -> Option<StructuredValue> {
        self.items.remove(key)
    }

    pub fn get(&self, key: &str) -> Option<&StructuredValue> {
        self.items.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.items.contains_key(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(StructuredValue::as_str)
    }

    pub fn get_integer(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(StructuredValue::as_integer)
    }

    pub fn get_unsigned(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(StructuredValue::as_unsigned)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(StructuredValue::as_bool)
    }

    pub fn get_dictionary(&self, key: &str) -> Option<&Dictionary> {
        self.get(key).and_then(StructuredValue::as_dictionary)
    }

    pub fn get_array(&self, key: &str) -> Option<&[StructuredValue]> {
        self.get(key).and_then(StructuredValue::as_array)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.items.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &StructuredValue)> {
        self.items.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<K: Into<String>, V: Into<StructuredValue>> FromIterator<(K, V)> for Dictionary {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            items: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl IntoIterator for Dictionary {
    type Item = (String, StructuredValue);
    type IntoIter = std::collections::btree_map::IntoIter<String, StructuredValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

/// Tagged union exchanged with scripted handlers
#[derive(Debug, Clone, Default, PartialEq)]
pub enum StructuredValue {
    /// No value could be produced
    #[default]
    Invalid,
    /// Explicit "nothing" (a script returning `None`)
    Null,
    Dictionary(Dictionary),
    Array(Vec<StructuredValue>),
    String(String),
    Integer(i64),
    /// Integer that does not fit an `i64`, or a native unsigned id
    Unsigned(u64),
    Float(f64),
    Boolean(bool),
    /// Handler-side object with no native representation
    Generic(GenericObject),
}

impl StructuredValue {
    /// Name of the variant, used in diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            StructuredValue::Invalid => "invalid",
            StructuredValue::Null => "null",
            StructuredValue::Dictionary(_) => "dictionary",
            StructuredValue::Array(_) => "array",
            StructuredValue::String(_) => "string",
            StructuredValue::Integer(_) | StructuredValue::Unsigned(_) => "integer",
            StructuredValue::Float(_) => "float",
            StructuredValue::Boolean(_) => "boolean",
            StructuredValue::Generic(_) => "generic",
        }
    }

    /// Whether the value carries data. `Invalid` and `Null` do not.
    pub fn is_valid(&self) -> bool {
        !matches!(self, StructuredValue::Invalid | StructuredValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            StructuredValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Signed view of an integer value, if it fits
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            StructuredValue::Integer(i) => Some(*i),
            StructuredValue::Unsigned(u) => i64::try_from(*u).ok(),
            _ => None,
        }
    }

    /// Unsigned view of an integer value; negative integers give `None`
    pub fn as_unsigned(&self) -> Option<u64> {
        match self {
            StructuredValue::Integer(i) => u64::try_from(*i).ok(),
            StructuredValue::Unsigned(u) => Some(*u),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            StructuredValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_dictionary(&self) -> Option<&Dictionary> {
        match self {
            StructuredValue::Dictionary(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[StructuredValue]> {
        match self {
            StructuredValue::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_generic(&self) -> Option<&GenericObject> {
        match self {
            StructuredValue::Generic(g) => Some(g),
            _ => None,
        }
    }

    /// Render as JSON. Generic objects become a descriptive string.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;

        match self {
            StructuredValue::Invalid | StructuredValue::Null => Json::Null,
            StructuredValue::Dictionary(d) => Json::Object(
                d.iter()
                    .map(|(k, v)| (k.to_string(), v.to_json()))
                    .collect(),
            ),
            StructuredValue::Array(a) => Json::Array(a.iter().map(|v| v.to_json()).collect()),
            StructuredValue::String(s) => Json::String(s.clone()),
            StructuredValue::Integer(i) => Json::from(*i),
            StructuredValue::Unsigned(u) => Json::from(*u),
            StructuredValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            StructuredValue::Boolean(b) => Json::Bool(*b),
            StructuredValue::Generic(g) => Json::String(format!("<{}>", g.type_name())),
        }
    }
}

impl From<serde_json::Value> for StructuredValue {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value as Json;

        match value {
            Json::Null => StructuredValue::Null,
            Json::Bool(b) => StructuredValue::Boolean(b),
            Json::Number(n) => match (n.as_i64(), n.as_u64()) {
                (Some(i), _) => StructuredValue::Integer(i),
                (None, Some(u)) => StructuredValue::Unsigned(u),
                (None, None) => StructuredValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Json::String(s) => StructuredValue::String(s),
            Json::Array(a) => StructuredValue::Array(a.into_iter().map(Into::into).collect()),
            Json::Object(o) => StructuredValue::Dictionary(o.into_iter().collect()),
        }
    }
}

impl From<Dictionary> for StructuredValue {
    fn from(value: Dictionary) -> Self {
        StructuredValue::Dictionary(value)
    }
}

impl From<Vec<StructuredValue>> for StructuredValue {
    fn from(value: Vec<StructuredValue>) -> Self {
        StructuredValue::Array(value)
    }
}

impl From<String> for StructuredValue {
    fn from(value: String) -> Self {
        StructuredValue::String(value)
    }
}

impl From<&str> for StructuredValue {
    fn from(value: &str) -> Self {
        StructuredValue::String(value.to_string())
    }
}

impl From<i64> for StructuredValue {
    fn from(value: i64) -> Self {
        StructuredValue::Integer(value)
    }
}

impl From<u64> for StructuredValue {
    fn from(value: u64) -> Self {
        StructuredValue::Unsigned(value)
    }
}

impl From<u32> for StructuredValue {
    fn from(value: u32) -> Self {
        StructuredValue::Integer(i64::from(value))
    }
}

impl From<f64> for StructuredValue {
    fn from(value: f64) -> Self {
        StructuredValue::Float(value)
    }
}

impl From<bool> for StructuredValue {
    fn from(value: bool) -> Self {
        StructuredValue::Boolean(value)
    }
}

impl From<GenericObject> for StructuredValue {
    fn from(value: GenericObject) -> Self {
        StructuredValue::Generic(value)
    }
}

/// Conversion from a handler's return value into a typed result
pub trait FromStructured: Sized {
    /// Human readable name of the target type
    const EXPECTED: &'static str;

    fn from_structured(value: StructuredValue) -> Result<Self, ConversionError>;
}

impl FromStructured for StructuredValue {
    const EXPECTED: &'static str = "value";

    fn from_structured(value: StructuredValue) -> Result<Self, ConversionError> {
        Ok(value)
    }
}

impl FromStructured for Dictionary {
    const EXPECTED: &'static str = "dictionary";

    fn from_structured(value: StructuredValue) -> Result<Self, ConversionError> {
        match value {
            StructuredValue::Dictionary(d) => Ok(d),
            StructuredValue::Invalid | StructuredValue::Null => Err(ConversionError::NullOrInvalid),
            other => Err(ConversionError::TypeMismatch {
                expected: Self::EXPECTED,
                found: other.kind(),
            }),
        }
    }
}

impl FromStructured for GenericObject {
    const EXPECTED: &'static str = "generic";

    fn from_structured(value: StructuredValue) -> Result<Self, ConversionError> {
        match value {
            StructuredValue::Generic(g) => Ok(g),
            StructuredValue::Invalid | StructuredValue::Null => Err(ConversionError::NullOrInvalid),
            other => Err(ConversionError::TypeMismatch {
                expected: Self::EXPECTED,
                found: other.kind(),
            }),
        }
    }
}

/// Status results accept a few shapes:
/// `None`/`True` succeed, `False` fails, and a dictionary may carry
/// `success` and `error`/`message` entries.
impl FromStructured for Status {
    const EXPECTED: &'static str = "status";

    fn from_structured(value: StructuredValue) -> Result<Self, ConversionError> {
        match value {
            StructuredValue::Null | StructuredValue::Boolean(true) => Ok(Status::success()),
            StructuredValue::Boolean(false) => Ok(Status::error("operation reported failure")),
            StructuredValue::Dictionary(d) => {
                let message = d.get_str("error").or_else(|| d.get_str("message"));
                match (d.get_bool("success"), message) {
                    (Some(true), _) | (None, None) => Ok(Status::success()),
                    (Some(false), None) => Ok(Status::error("operation reported failure")),
                    (_, Some(msg)) => Ok(Status::error(msg)),
                }
            }
            StructuredValue::Invalid => Err(ConversionError::NullOrInvalid),
            other => Err(ConversionError::TypeMismatch {
                expected: Self::EXPECTED,
                found: other.kind(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validity() {
        assert!(!StructuredValue::Invalid.is_valid());
        assert!(!StructuredValue::Null.is_valid());
        assert!(StructuredValue::Dictionary(Dictionary::new()).is_valid());
        assert!(StructuredValue::Integer(0).is_valid());
    }

    #[test]
    fn test_dictionary_accessors() {
        let dict = Dictionary::new()
            .with("name", "a.out")
            .with("pid", 1234i64)
            .with("stopped", true);

        assert_eq!(dict.get_str("name"), Some("a.out"));
        assert_eq!(dict.get_integer("pid"), Some(1234));
        assert_eq!(dict.get_bool("stopped"), Some(true));
        assert_eq!(dict.get_str("pid"), None);
        assert_eq!(dict.keys().collect::<Vec<_>>(), vec!["name", "pid", "stopped"]);
    }

    #[test]
    fn test_dictionary_conversion_rejects_null() {
        assert_eq!(
            Dictionary::from_structured(StructuredValue::Null),
            Err(ConversionError::NullOrInvalid)
        );
        assert_eq!(
            Dictionary::from_structured(StructuredValue::Integer(3)),
            Err(ConversionError::TypeMismatch {
                expected: "dictionary",
                found: "integer"
            })
        );
    }

    #[test]
    fn test_status_conversion() {
        assert!(Status::from_structured(StructuredValue::Null).unwrap().is_success());
        assert!(Status::from_structured(StructuredValue::Boolean(false)).unwrap().is_failure());

        let failed = Status::from_structured(
            Dictionary::new().with("error", "permission denied").into(),
        )
        .unwrap();
        assert_eq!(failed.message(), Some("permission denied"));

        assert!(Status::from_structured(StructuredValue::Invalid).is_err());
        assert!(Status::from_structured(StructuredValue::Integer(1)).is_err());
    }

    #[test]
    fn test_json_conversion() {
        let json: serde_json::Value =
            serde_json::from_str(r#"{"1234": {"name": "a.out", "args": ["-v"], "load": 0.5}}"#)
                .unwrap();
        let value = StructuredValue::from(json.clone());

        let entry = value.as_dictionary().unwrap().get_dictionary("1234").unwrap();
        assert_eq!(entry.get_str("name"), Some("a.out"));
        assert_eq!(entry.get_array("args").map(|a| a.len()), Some(1));
        assert_eq!(value.to_json(), json);
    }

    #[test]
    fn test_unsigned_views() {
        let big = StructuredValue::from(u64::MAX);
        assert_eq!(big.as_unsigned(), Some(u64::MAX));
        assert_eq!(big.as_integer(), None);
        assert_eq!(big.kind(), "integer");

        assert_eq!(StructuredValue::from(7u64).as_integer(), Some(7));
        assert_eq!(StructuredValue::Integer(7).as_unsigned(), Some(7));
        assert_eq!(StructuredValue::Integer(-1).as_unsigned(), None);

        let json: serde_json::Value = serde_json::from_str("18446744073709551615").unwrap();
        let value = StructuredValue::from(json.clone());
        assert_eq!(value, StructuredValue::Unsigned(u64::MAX));
        assert_eq!(value.to_json(), json);
    }

    #[test]
    fn test_generic_object() {
        let generic = GenericObject::new(42u32);
        assert_eq!(generic.downcast_ref::<u32>(), Some(&42));
        assert!(generic.downcast_ref::<String>().is_none());

        let clone = generic.clone();
        assert!(clone.ptr_eq(&generic));
        assert_ne!(GenericObject::new(42u32), generic);
    }
}
