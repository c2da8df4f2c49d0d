//! Deferred configuration values
//!
//! A configured parameter is either a plain literal or a value that cannot be
//! produced until other instances exist: a reference to an instance by name,
//! an expression over instances, or a list/map containing such values.
//! Every variant exposes the set of instance names it depends on and an
//! evaluation function over already-resolved dependencies.

use std::collections::{BTreeSet, HashMap};

use indexmap::IndexMap;

use crate::error::{DiError, Result};
use crate::expr::Expression;
use crate::value::Value;

/// A configuration value whose final form may depend on other instances.
#[derive(Clone, Debug)]
pub enum Deferred {
    /// Plain literal, no dependencies
    Value(Value),
    /// The resolved value of another instance
    Ref(String),
    /// An expression over other instances
    Expr(Expression),
    /// Ordered collection; children may themselves be deferred
    List(Vec<Deferred>),
    /// Keyed collection; children may themselves be deferred
    Map(IndexMap<String, Deferred>),
}

impl Deferred {
    /// Reference to an instance by name.
    #[inline]
    pub fn reference(name: impl Into<String>) -> Self {
        Deferred::Ref(name.into())
    }

    /// Parse expression text into a deferred value.
    pub fn expr(code: &str) -> Result<Self> {
        Ok(Deferred::Expr(Expression::parse(code)?))
    }

    /// Instance names that must be resolved before [`Deferred::eval`].
    pub fn deps(&self) -> BTreeSet<String> {
        match self {
            Deferred::Value(_) => BTreeSet::new(),
            Deferred::Ref(name) => BTreeSet::from([name.clone()]),
            Deferred::Expr(expr) => expr.deps().clone(),
            Deferred::List(items) => items.iter().flat_map(Deferred::deps).collect(),
            Deferred::Map(entries) => entries.values().flat_map(Deferred::deps).collect(),
        }
    }

    /// Evaluate against resolved dependencies.
    ///
    /// `resolved` must contain every name in [`Deferred::deps`]. Dependencies
    /// are resolved at the instance level only; a composite value cannot
    /// reference its own evaluated form.
    pub fn eval(&self, resolved: &HashMap<String, Value>) -> Result<Value> {
        match self {
            Deferred::Value(value) => Ok(value.clone()),
            Deferred::Ref(name) => resolved.get(name).cloned().ok_or_else(|| {
                DiError::MissingValue {
                    stack: vec![name.clone()],
                }
            }),
            Deferred::Expr(expr) => expr.eval(resolved),
            Deferred::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(item.eval(resolved)?);
                }
                Ok(Value::List(out))
            }
            Deferred::Map(entries) => {
                let mut out = IndexMap::with_capacity(entries.len());
                for (key, value) in entries {
                    out.insert(key.clone(), value.eval(resolved)?);
                }
                Ok(Value::Map(out))
            }
        }
    }
}

impl From<Value> for Deferred {
    fn from(value: Value) -> Self {
        Deferred::Value(value)
    }
}

impl From<bool> for Deferred {
    fn from(v: bool) -> Self {
        Deferred::Value(v.into())
    }
}

impl From<i64> for Deferred {
    fn from(v: i64) -> Self {
        Deferred::Value(v.into())
    }
}

impl From<i32> for Deferred {
    fn from(v: i32) -> Self {
        Deferred::Value(v.into())
    }
}

impl From<f64> for Deferred {
    fn from(v: f64) -> Self {
        Deferred::Value(v.into())
    }
}

impl From<&str> for Deferred {
    fn from(v: &str) -> Self {
        Deferred::Value(v.into())
    }
}

impl From<String> for Deferred {
    fn from(v: String) -> Self {
        Deferred::Value(v.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolved(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs
            .iter()
            .map(|(name, value)| ((*name).to_owned(), value.clone()))
            .collect()
    }

    #[test]
    fn literal_has_no_deps() {
        let deferred = Deferred::from(42);
        assert!(deferred.deps().is_empty());
        assert_eq!(deferred.eval(&HashMap::new()).unwrap(), Value::Int(42));
    }

    #[test]
    fn reference_resolves_to_instance() {
        let deferred = Deferred::reference("a");
        assert_eq!(deferred.deps(), BTreeSet::from(["a".to_owned()]));
        assert_eq!(
            deferred.eval(&resolved(&[("a", Value::Int(7))])).unwrap(),
            Value::Int(7)
        );
    }

    #[test]
    fn list_unions_child_deps_and_substitutes() {
        let deferred = Deferred::List(vec![Deferred::reference("a"), Deferred::from(1)]);
        assert_eq!(deferred.deps(), BTreeSet::from(["a".to_owned()]));
        assert_eq!(
            deferred.eval(&resolved(&[("a", Value::from("x"))])).unwrap(),
            Value::List(vec![Value::from("x"), Value::Int(1)])
        );
    }

    #[test]
    fn map_unions_child_deps() {
        let mut entries = IndexMap::new();
        entries.insert("left".to_owned(), Deferred::reference("a"));
        entries.insert("right".to_owned(), Deferred::expr("b + 1").unwrap());
        let deferred = Deferred::Map(entries);

        assert_eq!(
            deferred.deps(),
            BTreeSet::from(["a".to_owned(), "b".to_owned()])
        );

        let result = deferred
            .eval(&resolved(&[("a", Value::Int(1)), ("b", Value::Int(2))]))
            .unwrap();
        let map = result.as_map().unwrap();
        assert_eq!(map["left"], Value::Int(1));
        assert_eq!(map["right"], Value::Int(3));
    }
}
