//! The evaluator contract the walker is written against.
//!
//! The walker never inspects values directly. It forces them to weak head
//! normal form through an [`Evaluator`] and looks at the resulting [`Whnf`]
//! shape. String coercion returns the string together with its [`Context`]
//! so that aggregate jobs can recover which derivations they reference.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{Error, Result};

/// Provenance tags collected while coercing a value to a string. A tag of
/// the form `!<output>!<drvPath>` refers to one output of a derivation.
pub type Context = BTreeSet<String>;

/// An ordered attribute set of unevaluated values.
#[derive(Debug, Clone)]
pub struct Attrs<V> {
    entries: Vec<(String, V)>,
}

impl<V> Attrs<V> {
    pub fn new(entries: Vec<(String, V)>) -> Self {
        Self { entries }
    }

    pub fn get(&self, name: &str) -> Option<&V> {
        self.entries
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.entries.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A value forced to weak head normal form. Lists and attribute sets hold
/// their elements unevaluated.
#[derive(Debug, Clone)]
pub enum Whnf<V> {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<V>),
    Attrs(Attrs<V>),
    Function,
}

impl<V> Whnf<V> {
    /// Type name as used in evaluation error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Whnf::Null => "null",
            Whnf::Bool(_) => "a Boolean",
            Whnf::Int(_) => "an integer",
            Whnf::Float(_) => "a float",
            Whnf::Str(_) => "a string",
            Whnf::List(_) => "a list",
            Whnf::Attrs(_) => "a set",
            Whnf::Function => "a function",
        }
    }

    /// Short rendering for diagnostics. Nested values are not forced.
    pub fn show(&self) -> String {
        match self {
            Whnf::Null => "null".to_string(),
            Whnf::Bool(b) => b.to_string(),
            Whnf::Int(n) => n.to_string(),
            Whnf::Float(x) => x.to_string(),
            Whnf::Str(s) => format!("{:?}", s),
            Whnf::List(items) => format!("[ <{} elements> ]", items.len()),
            Whnf::Attrs(attrs) => {
                let names: Vec<&str> = attrs.names().collect();
                format!("{{ {} }}", names.join("; "))
            }
            Whnf::Function => "<LAMBDA>".to_string(),
        }
    }
}

/// One binding supplied to functions found in the tree.
#[derive(Debug, Clone, PartialEq)]
pub enum AutoArg {
    /// A literal value, written as JSON or YAML.
    Expr(serde_json::Value),
    /// A plain string, never parsed.
    Str(String),
}

/// Bindings passed to every callable node before it is classified.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AutoArgs {
    bindings: BTreeMap<String, AutoArg>,
}

impl AutoArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, arg: AutoArg) {
        self.bindings.insert(name.into(), arg);
    }

    pub fn get(&self, name: &str) -> Option<&AutoArg> {
        self.bindings.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

pub trait Evaluator {
    type Value: Clone;

    /// Evaluates `value` to weak head normal form. Implementations memoize
    /// as they see fit; callers must not rely on either behaviour.
    fn force(&self, value: &Self::Value) -> Result<Whnf<Self::Value>>;

    /// Applies `value` to `args` if it is a function, otherwise returns it
    /// unchanged.
    fn auto_call(&self, value: &Self::Value, args: &AutoArgs) -> Result<Self::Value>;

    /// Coerces `value` to a string, returning the string context gathered
    /// along the way.
    fn coerce_to_string(&self, value: &Self::Value) -> Result<(String, Context)>;

    fn force_string(&self, value: &Self::Value) -> Result<String> {
        match self.force(value)? {
            Whnf::Str(s) => Ok(s),
            other => Err(type_error(&other, "a string")),
        }
    }

    fn force_bool(&self, value: &Self::Value) -> Result<bool> {
        match self.force(value)? {
            Whnf::Bool(b) => Ok(b),
            other => Err(type_error(&other, "a Boolean")),
        }
    }

    fn force_attrs(&self, value: &Self::Value) -> Result<Attrs<Self::Value>> {
        match self.force(value)? {
            Whnf::Attrs(attrs) => Ok(attrs),
            other => Err(type_error(&other, "a set")),
        }
    }
}

pub(crate) fn type_error<V>(got: &Whnf<V>, expected: &str) -> Error {
    Error::eval(format!(
        "value is {} while {} was expected",
        got.kind(),
        expected
    ))
}
