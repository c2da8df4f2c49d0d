//! Runtime value model
//!
//! Instances, configured parameter values and expression results all travel
//! through one closed [`Value`] enum. Structured data (numbers, strings,
//! lists, maps) stays inspectable so expressions and validators can work on
//! it; anything else rides along as a type-erased [`OpaqueValue`].

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::BoxError;

/// A runtime value held by the container.
#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Map(IndexMap<String, Value>),
    /// Type-erased value produced by a factory (shared via `Arc`)
    Opaque(OpaqueValue),
    /// Escape hatch: carried value bypasses every validator it meets
    Unchecked(Box<Value>),
}

impl Value {
    /// Wrap an arbitrary `Send + Sync` value for type-erased storage.
    #[inline]
    pub fn opaque<T: Any + Send + Sync>(value: T) -> Self {
        Value::Opaque(OpaqueValue::new(value))
    }

    /// Wrap an already-shared value.
    #[inline]
    pub fn shared<T: Any + Send + Sync>(value: Arc<T>) -> Self {
        Value::Opaque(OpaqueValue::from_arc(value))
    }

    /// Mark a value so parameter and instance validators let it through unchecked.
    #[inline]
    pub fn unchecked(value: impl Into<Value>) -> Self {
        Value::Unchecked(Box::new(value.into()))
    }

    /// Strip the skip-validation wrapper, if present.
    #[inline]
    pub(crate) fn into_checked_or_inner(self) -> (Value, bool) {
        match self {
            Value::Unchecked(inner) => (*inner, true),
            other => (other, false),
        }
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    #[inline]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Float accessor; integers coerce.
    #[inline]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    #[inline]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(v) => Some(v),
            _ => None,
        }
    }

    #[inline]
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(v) => Some(v),
            _ => None,
        }
    }

    #[inline]
    pub fn as_map(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Value::Map(v) => Some(v),
            _ => None,
        }
    }

    /// Downcast an opaque value to its concrete type.
    pub fn downcast_arc<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        match self {
            Value::Opaque(opaque) => opaque.downcast(),
            _ => None,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "Null"),
            Value::Bool(v) => f.debug_tuple("Bool").field(v).finish(),
            Value::Int(v) => f.debug_tuple("Int").field(v).finish(),
            Value::Float(v) => f.debug_tuple("Float").field(v).finish(),
            Value::Str(v) => f.debug_tuple("Str").field(v).finish(),
            Value::List(v) => f.debug_tuple("List").field(v).finish(),
            Value::Map(v) => f.debug_tuple("Map").field(v).finish(),
            Value::Opaque(v) => write!(f, "Opaque(<{}>)", v.type_name()),
            Value::Unchecked(v) => f.debug_tuple("Unchecked").field(v).finish(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Str(v) => write!(f, "{v:?}"),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Map(entries) => {
                write!(f, "{{")?;
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{key:?}: {value}")?;
                }
                write!(f, "}}")
            }
            Value::Opaque(v) => write!(f, "<{}>", v.type_name()),
            Value::Unchecked(v) => write!(f, "{v}"),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Opaque(a), Value::Opaque(b)) => a == b,
            (Value::Unchecked(a), Value::Unchecked(b)) => a == b,
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v.into())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

impl From<IndexMap<String, Value>> for Value {
    fn from(v: IndexMap<String, Value>) -> Self {
        Value::Map(v)
    }
}

impl From<&serde_json::Value> for Value {
    fn from(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(v) => Value::Bool(*v),
            serde_json::Value::Number(n) => {
                if let Some(v) = n.as_i64() {
                    Value::Int(v)
                } else {
                    Value::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(v) => Value::Str(v.clone()),
            serde_json::Value::Array(items) => {
                Value::List(items.iter().map(Value::from).collect())
            }
            serde_json::Value::Object(entries) => Value::Map(
                entries
                    .iter()
                    .map(|(key, value)| (key.clone(), Value::from(value)))
                    .collect(),
            ),
        }
    }
}

// =============================================================================
// Opaque values
// =============================================================================

/// A type-erased, `Arc`-shared value with its concrete type name captured
/// for diagnostics.
#[derive(Clone)]
pub struct OpaqueValue {
    inner: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl OpaqueValue {
    #[inline]
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            inner: Arc::new(value),
            type_name: std::any::type_name::<T>(),
        }
    }

    #[inline]
    pub fn from_arc<T: Any + Send + Sync>(value: Arc<T>) -> Self {
        Self {
            inner: value,
            type_name: std::any::type_name::<T>(),
        }
    }

    #[inline]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.inner.as_ref().type_id()
    }

    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.inner).downcast::<T>().ok()
    }
}

impl PartialEq for OpaqueValue {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

// =============================================================================
// Type specifications
// =============================================================================

/// Declared type of a parameter or a `get` call's expected result.
///
/// There is no runtime reflection: factories declare parameter types
/// explicitly and the engine enforces them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TypeSpec {
    /// Accepts anything, no validation
    Any,
    Bool,
    Int,
    /// Accepts `Float` and `Int` (coerced)
    Float,
    Str,
    List,
    Map,
    /// A specific opaque Rust type
    Opaque {
        type_id: TypeId,
        type_name: &'static str,
    },
}

/// Validation failure: expected type and offending value, pre-rendered.
#[derive(Debug, Clone)]
pub struct TypeMismatch {
    pub expected: String,
    pub value: String,
}

impl TypeSpec {
    /// Type spec for a concrete opaque Rust type.
    #[inline]
    pub fn of<T: Any + Send + Sync>() -> Self {
        TypeSpec::Opaque {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
        }
    }

    /// Validate a value against this spec, coercing where allowed.
    pub fn validate(&self, value: Value) -> std::result::Result<Value, TypeMismatch> {
        let ok = match (self, &value) {
            (TypeSpec::Any, _) => true,
            (TypeSpec::Bool, Value::Bool(_)) => true,
            (TypeSpec::Int, Value::Int(_)) => true,
            (TypeSpec::Float, Value::Float(_)) => true,
            (TypeSpec::Float, Value::Int(v)) => {
                let coerced = *v as f64;
                return Ok(Value::Float(coerced));
            }
            (TypeSpec::Str, Value::Str(_)) => true,
            (TypeSpec::List, Value::List(_)) => true,
            (TypeSpec::Map, Value::Map(_)) => true,
            (TypeSpec::Opaque { type_id, .. }, Value::Opaque(opaque)) => {
                opaque.type_id() == *type_id
            }
            _ => false,
        };

        if ok {
            Ok(value)
        } else {
            Err(TypeMismatch {
                expected: self.to_string(),
                value: value.to_string(),
            })
        }
    }
}

impl fmt::Display for TypeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeSpec::Any => write!(f, "any"),
            TypeSpec::Bool => write!(f, "bool"),
            TypeSpec::Int => write!(f, "int"),
            TypeSpec::Float => write!(f, "float"),
            TypeSpec::Str => write!(f, "str"),
            TypeSpec::List => write!(f, "list"),
            TypeSpec::Map => write!(f, "map"),
            TypeSpec::Opaque { type_name, .. } => write!(f, "{type_name}"),
        }
    }
}

// =============================================================================
// Resolved parameter maps
// =============================================================================

/// Resolved parameter values handed to a factory, in declaration order.
#[derive(Clone, Debug, Default)]
pub struct Params {
    values: IndexMap<String, Value>,
}

impl Params {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    #[inline]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(name, value)| (name.as_str(), value))
    }

    fn required(&self, name: &str) -> std::result::Result<&Value, BoxError> {
        self.get(name)
            .ok_or_else(|| format!("parameter {name:?} is missing").into())
    }

    pub fn int(&self, name: &str) -> std::result::Result<i64, BoxError> {
        self.required(name)?
            .as_int()
            .ok_or_else(|| format!("parameter {name:?} is not an int").into())
    }

    pub fn float(&self, name: &str) -> std::result::Result<f64, BoxError> {
        self.required(name)?
            .as_float()
            .ok_or_else(|| format!("parameter {name:?} is not a float").into())
    }

    pub fn boolean(&self, name: &str) -> std::result::Result<bool, BoxError> {
        self.required(name)?
            .as_bool()
            .ok_or_else(|| format!("parameter {name:?} is not a bool").into())
    }

    pub fn string(&self, name: &str) -> std::result::Result<&str, BoxError> {
        self.required(name)?
            .as_str()
            .ok_or_else(|| format!("parameter {name:?} is not a string").into())
    }

    pub fn list(&self, name: &str) -> std::result::Result<&[Value], BoxError> {
        self.required(name)?
            .as_list()
            .ok_or_else(|| format!("parameter {name:?} is not a list").into())
    }

    pub fn map(&self, name: &str) -> std::result::Result<&IndexMap<String, Value>, BoxError> {
        self.required(name)?
            .as_map()
            .ok_or_else(|| format!("parameter {name:?} is not a map").into())
    }

    /// Downcast an opaque parameter to its concrete type.
    pub fn shared<T: Any + Send + Sync>(
        &self,
        name: &str,
    ) -> std::result::Result<Arc<T>, BoxError> {
        self.required(name)?.downcast_arc::<T>().ok_or_else(|| {
            format!(
                "parameter {name:?} is not a shared {}",
                std::any::type_name::<T>()
            )
            .into()
        })
    }
}

impl FromIterator<(String, Value)> for Params {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Params {
    type Item = (String, Value);
    type IntoIter = indexmap::map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_spec_coerces_int() {
        let coerced = TypeSpec::Float.validate(Value::Int(3)).unwrap();
        assert_eq!(coerced, Value::Float(3.0));
    }

    #[test]
    fn int_spec_rejects_string() {
        let err = TypeSpec::Int.validate(Value::from("two")).unwrap_err();
        assert_eq!(err.expected, "int");
        assert_eq!(err.value, "\"two\"");
    }

    #[test]
    fn opaque_spec_matches_by_type_id() {
        struct Db;
        let value = Value::opaque(Db);
        assert!(TypeSpec::of::<Db>().validate(value.clone()).is_ok());
        assert!(TypeSpec::of::<String>().validate(value).is_err());
    }

    #[test]
    fn opaque_equality_is_identity() {
        let shared = Arc::new(41_u8);
        let a = Value::shared(Arc::clone(&shared));
        let b = Value::shared(shared);
        let c = Value::opaque(41_u8);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn unchecked_round_trip() {
        let (inner, skipped) = Value::unchecked("one").into_checked_or_inner();
        assert_eq!(inner, Value::from("one"));
        assert!(skipped);

        let (inner, skipped) = Value::Int(1).into_checked_or_inner();
        assert_eq!(inner, Value::Int(1));
        assert!(!skipped);
    }

    #[test]
    fn json_conversion() {
        let json: serde_json::Value = serde_json::json!({
            "count": 3,
            "ratio": 0.5,
            "tags": ["a", "b"],
            "nested": { "on": true },
        });
        let value = Value::from(&json);
        let map = value.as_map().unwrap();
        assert_eq!(map["count"], Value::Int(3));
        assert_eq!(map["ratio"], Value::Float(0.5));
        assert_eq!(
            map["tags"],
            Value::List(vec![Value::from("a"), Value::from("b")])
        );
        assert_eq!(map["nested"].as_map().unwrap()["on"], Value::Bool(true));
    }

    #[test]
    fn params_accessors() {
        let mut params = Params::new();
        params.insert("first", Value::Int(7));
        params.insert("name", Value::from("db"));

        assert_eq!(params.int("first").unwrap(), 7);
        assert_eq!(params.string("name").unwrap(), "db");
        assert!(params.int("name").is_err());
        assert!(params.int("absent").is_err());
    }
}
