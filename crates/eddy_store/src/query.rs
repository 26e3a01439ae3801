//! Single-clause query types: terms, fact patterns, and binding environments.

use std::collections::BTreeMap;
use std::fmt;

use eddy_foundation::{EntityId, Value};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// One position of a [`FactPattern`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Term {
    /// A rule-local variable (stored without the leading `?`).
    Var(String),
    /// A constant that must match exactly.
    Const(Value),
    /// The wildcard `_`: matches anything, binds nothing.
    Any,
}

impl Term {
    /// Creates a variable term; a leading `?` is accepted and stripped.
    #[must_use]
    pub fn var(name: &str) -> Self {
        Self::Var(name.strip_prefix('?').unwrap_or(name).to_string())
    }

    /// Creates a constant term.
    #[must_use]
    pub fn constant(value: impl Into<Value>) -> Self {
        Self::Const(value.into())
    }

    /// Returns the variable name, if this is a variable.
    #[must_use]
    pub fn as_var(&self) -> Option<&str> {
        match self {
            Self::Var(name) => Some(name),
            _ => None,
        }
    }

    /// Resolves the term against an environment.
    ///
    /// Returns `Some(value)` for constants and bound variables, `None` when the
    /// term is free.
    #[must_use]
    pub fn resolve<'a>(&'a self, bindings: &'a Bindings) -> Option<&'a Value> {
        match self {
            Self::Const(value) => Some(value),
            Self::Var(name) => bindings.get(name),
            Self::Any => None,
        }
    }
}

/// `"?x"` is a variable, `"_"` the wildcard, anything else a string constant.
impl From<&str> for Term {
    fn from(s: &str) -> Self {
        if s == "_" {
            Self::Any
        } else if s.starts_with('?') {
            Self::var(s)
        } else {
            Self::Const(Value::from(s))
        }
    }
}

impl From<Value> for Term {
    fn from(value: Value) -> Self {
        Self::Const(value)
    }
}

impl From<EntityId> for Term {
    fn from(id: EntityId) -> Self {
        Self::Const(Value::Entity(id))
    }
}

impl From<i32> for Term {
    fn from(n: i32) -> Self {
        Self::Const(Value::Int(i64::from(n)))
    }
}

impl From<i64> for Term {
    fn from(n: i64) -> Self {
        Self::Const(Value::Int(n))
    }
}

impl From<f64> for Term {
    fn from(n: f64) -> Self {
        Self::Const(Value::Float(n))
    }
}

impl From<bool> for Term {
    fn from(b: bool) -> Self {
        Self::Const(Value::Bool(b))
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Var(name) => write!(f, "?{name}"),
            Self::Const(value) => write!(f, "{value:?}"),
            Self::Any => f.write_str("_"),
        }
    }
}

/// A single (entity, attribute, value) clause.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FactPattern {
    /// Entity position.
    pub entity: Term,
    /// Attribute position; a constant must be a string.
    pub attribute: Term,
    /// Value position.
    pub value: Term,
}

impl FactPattern {
    /// Creates a pattern from three terms.
    #[must_use]
    pub fn new(entity: impl Into<Term>, attribute: impl Into<Term>, value: impl Into<Term>) -> Self {
        Self {
            entity: entity.into(),
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    /// Returns the constant attribute name, or `None` for a variable or wildcard.
    #[must_use]
    pub fn attribute_name(&self) -> Option<&str> {
        match &self.attribute {
            Term::Const(value) => value.as_str(),
            _ => None,
        }
    }

    /// Iterates over the variables named by this pattern, in position order.
    pub fn variables(&self) -> impl Iterator<Item = &str> {
        [&self.entity, &self.attribute, &self.value]
            .into_iter()
            .filter_map(Term::as_var)
    }
}

impl fmt::Display for FactPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} {} {}]", self.entity, self.attribute, self.value)
    }
}

/// A binding environment: variable name to value.
///
/// Ordered so that environments hash, compare and print deterministically.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Bindings(BTreeMap<String, Value>);

impl Bindings {
    /// Creates an empty environment.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value bound to `var`.
    #[must_use]
    pub fn get(&self, var: &str) -> Option<&Value> {
        self.0.get(var)
    }

    /// Returns true if `var` is bound.
    #[must_use]
    pub fn contains(&self, var: &str) -> bool {
        self.0.contains_key(var)
    }

    /// Binds `var`, replacing any previous value.
    pub fn insert(&mut self, var: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(var.into(), value.into());
    }

    /// Builder form of [`Bindings::insert`].
    #[must_use]
    pub fn with(mut self, var: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(var, value);
        self
    }

    /// Binds `var` if free, or checks it against the existing value.
    ///
    /// Returns false when `var` is already bound to a different value.
    pub fn unify(&mut self, var: &str, value: &Value) -> bool {
        match self.0.get(var) {
            Some(existing) => existing == value,
            None => {
                self.0.insert(var.to_string(), value.clone());
                true
            }
        }
    }

    /// Returns a new environment holding only the named variables.
    #[must_use]
    pub fn project<'a>(&self, vars: impl IntoIterator<Item = &'a str>) -> Self {
        Self(
            vars.into_iter()
                .filter_map(|var| self.0.get(var).map(|v| (var.to_string(), v.clone())))
                .collect(),
        )
    }

    /// Returns the values of the named variables, in order (`None` for unbound).
    #[must_use]
    pub fn values_of<'a>(&self, vars: impl IntoIterator<Item = &'a str>) -> Vec<Option<Value>> {
        vars.into_iter().map(|var| self.0.get(var).cloned()).collect()
    }

    /// Iterates over (variable, value) pairs in variable order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Iterates over the bound variable names.
    pub fn vars(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Returns the number of bound variables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if nothing is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Bindings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (var, value)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "?{var}={value:?}")?;
        }
        f.write_str("}")
    }
}
