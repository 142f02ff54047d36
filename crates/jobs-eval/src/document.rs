//! Release documents: a small lazy value graph read from JSON or YAML.
//!
//! Plain JSON maps to the obvious values (objects become attribute sets,
//! `null` is the empty marker). A handful of reserved objects add laziness
//! and sharing on top:
//!
//! | Object                                         | Meaning                                  |
//! |:-----------------------------------------------|:-----------------------------------------|
//! | `{"__ref": "a.b"}`                             | reference to another attribute path      |
//! | `{"__lambda": {"args": [..], "defaults": {..}, "body": ..}}` | function over named arguments |
//! | `{"__arg": "name"}`                            | argument of the enclosing function       |
//! | `{"__throw": "message"}`                       | fails when forced                        |
//! | `{"__string": "..", "__context": [..]}`        | string carrying explicit context tags    |
//!
//! Any other key, including ones that start with `__`, is an ordinary
//! attribute.
//!
//! References are resolved against the document root and memoized, so a
//! sub-tree referenced from several places is only walked once per run. When
//! the root is itself a function, references resolve against its body once
//! it has been auto-called.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::rc::Rc;

use serde_json::{Map, Value as Json};

use crate::classify::is_derivation;
use crate::error::{Error, Result};
use crate::job::{primary_output, query_drv_path, query_outputs};
use crate::value::{Attrs, AutoArg, AutoArgs, Context, Evaluator, Whnf};

const DIRECTIVES: [&str; 6] = ["__ref", "__arg", "__throw", "__string", "__context", "__lambda"];

#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String, Context),
    List(Rc<Vec<Value>>),
    Attrs(Rc<Vec<(String, Value)>>),
    Lambda(Rc<Lambda>),
    Ref(Rc<str>),
    Arg(Rc<str>),
    Throw(Rc<str>),
}

#[derive(Debug)]
pub struct Lambda {
    formals: Vec<String>,
    defaults: BTreeMap<String, Value>,
    body: Value,
}

impl Value {
    pub fn from_json(json: &Json) -> Result<Self> {
        Ok(match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(*b),
            Json::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(
                    n.as_f64()
                        .ok_or_else(|| Error::Document(format!("number out of range: {}", n)))?,
                ),
            },
            Json::String(s) => Value::Str(s.clone(), Context::new()),
            Json::Array(items) => Value::List(Rc::new(
                items.iter().map(Value::from_json).collect::<Result<_>>()?,
            )),
            Json::Object(map) => {
                if let Some(key) = map.keys().find(|k| DIRECTIVES.contains(&k.as_str())) {
                    return directive(key, map);
                }
                let mut entries = Vec::with_capacity(map.len());
                for (name, value) in map {
                    entries.push((name.clone(), Value::from_json(value)?));
                }
                Value::Attrs(Rc::new(entries))
            }
        })
    }
}

fn directive(key: &str, map: &Map<String, Json>) -> Result<Value> {
    match key {
        "__ref" | "__arg" | "__throw" => {
            expect_keys(map, &[key])?;
            let text = map[key]
                .as_str()
                .ok_or_else(|| Error::Document(format!("‘{}’ must be a string", key)))?;
            Ok(match key {
                "__ref" => Value::Ref(text.into()),
                "__arg" => Value::Arg(text.into()),
                _ => Value::Throw(text.into()),
            })
        }
        "__string" | "__context" => {
            expect_keys(map, &["__string", "__context"])?;
            let text = map
                .get("__string")
                .and_then(Json::as_str)
                .ok_or_else(|| Error::Document("‘__string’ must be a string".to_string()))?;
            let mut context = Context::new();
            if let Some(tags) = map.get("__context") {
                let tags = tags.as_array().ok_or_else(|| {
                    Error::Document("‘__context’ must be a list of strings".to_string())
                })?;
                for tag in tags {
                    let tag = tag.as_str().ok_or_else(|| {
                        Error::Document("‘__context’ must be a list of strings".to_string())
                    })?;
                    context.insert(tag.to_string());
                }
            }
            Ok(Value::Str(text.to_string(), context))
        }
        "__lambda" => {
            expect_keys(map, &["__lambda"])?;
            lambda(&map["__lambda"])
        }
        other => Err(Error::Document(format!("unknown directive ‘{}’", other))),
    }
}

fn lambda(def: &Json) -> Result<Value> {
    let def = def
        .as_object()
        .ok_or_else(|| Error::Document("‘__lambda’ must be an object".to_string()))?;
    expect_keys(def, &["args", "defaults", "body"])?;
    let mut formals = Vec::new();
    if let Some(args) = def.get("args") {
        let args = args
            .as_array()
            .ok_or_else(|| Error::Document("lambda ‘args’ must be a list".to_string()))?;
        for arg in args {
            let name = arg
                .as_str()
                .ok_or_else(|| Error::Document("lambda ‘args’ must be strings".to_string()))?;
            formals.push(name.to_string());
        }
    }
    let mut defaults = BTreeMap::new();
    if let Some(given) = def.get("defaults") {
        let given = given
            .as_object()
            .ok_or_else(|| Error::Document("lambda ‘defaults’ must be an object".to_string()))?;
        for (name, value) in given {
            if !formals.contains(name) {
                return Err(Error::Document(format!(
                    "default given for unknown argument ‘{}’",
                    name
                )));
            }
            defaults.insert(name.clone(), Value::from_json(value)?);
        }
    }
    let body = def
        .get("body")
        .ok_or_else(|| Error::Document("lambda without ‘body’".to_string()))?;
    Ok(Value::Lambda(Rc::new(Lambda {
        formals,
        defaults,
        body: Value::from_json(body)?,
    })))
}

fn expect_keys(map: &Map<String, Json>, allowed: &[&str]) -> Result<()> {
    match map.keys().find(|k| !allowed.contains(&k.as_str())) {
        Some(extra) => Err(Error::Document(format!(
            "unexpected key ‘{}’ next to ‘{}’",
            extra, allowed[0]
        ))),
        None => Ok(()),
    }
}

/// Replaces `__arg` placeholders with bound values. Inner functions shadow
/// the names they bind themselves.
fn substitute(value: &Value, bound: &BTreeMap<&str, Value>) -> Value {
    match value {
        Value::Arg(name) => match bound.get(&**name) {
            Some(arg) => arg.clone(),
            None => value.clone(),
        },
        Value::List(items) => Value::List(Rc::new(
            items.iter().map(|item| substitute(item, bound)).collect(),
        )),
        Value::Attrs(entries) => Value::Attrs(Rc::new(
            entries
                .iter()
                .map(|(name, item)| (name.clone(), substitute(item, bound)))
                .collect(),
        )),
        Value::Lambda(inner) => {
            let visible: BTreeMap<&str, Value> = bound
                .iter()
                .filter(|(name, _)| !inner.formals.iter().any(|f| f == *name))
                .map(|(name, arg)| (*name, arg.clone()))
                .collect();
            Value::Lambda(Rc::new(Lambda {
                formals: inner.formals.clone(),
                defaults: inner
                    .defaults
                    .iter()
                    .map(|(name, d)| (name.clone(), substitute(d, &visible)))
                    .collect(),
                body: substitute(&inner.body, &visible),
            }))
        }
        _ => value.clone(),
    }
}

pub struct DocumentEvaluator {
    root: Value,
    /// The applied body of a function root, once it has been auto-called.
    scope: RefCell<Option<Value>>,
    resolved: RefCell<HashMap<String, Value>>,
    resolving: RefCell<HashSet<String>>,
}

impl DocumentEvaluator {
    pub fn from_json(doc: &Json) -> Result<Self> {
        Ok(Self {
            root: Value::from_json(doc)?,
            scope: RefCell::new(None),
            resolved: RefCell::new(HashMap::new()),
            resolving: RefCell::new(HashSet::new()),
        })
    }

    /// Loads a release document. `.yaml`/`.yml` files are read as YAML,
    /// everything else as JSON.
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|e| {
            Error::Document(format!("cannot read {}: {}", path.display(), e))
        })?;
        let doc: Json = match path.extension().and_then(|s| s.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&raw)?,
            _ => serde_json::from_str(&raw)?,
        };
        Self::from_json(&doc)
    }

    pub fn root(&self) -> &Value {
        &self.root
    }

    fn resolve_ref(&self, target: &str) -> Result<Value> {
        if let Some(value) = self.resolved.borrow().get(target) {
            return Ok(value.clone());
        }
        if !self.resolving.borrow_mut().insert(target.to_string()) {
            return Err(Error::eval("infinite recursion encountered"));
        }
        let result = self.walk_ref(target);
        self.resolving.borrow_mut().remove(target);
        let value = result?;
        self.resolved
            .borrow_mut()
            .insert(target.to_string(), value.clone());
        Ok(value)
    }

    fn walk_ref(&self, target: &str) -> Result<Value> {
        let mut current = match &*self.scope.borrow() {
            Some(body) => body.clone(),
            None => self.root.clone(),
        };
        for name in target.split('.').filter(|s| !s.is_empty()) {
            let attrs = self.force_attrs(&current)?;
            current = attrs
                .get(name)
                .cloned()
                .ok_or_else(|| Error::eval(format!("attribute ‘{}’ missing", name)))?;
        }
        self.concrete(&current)
    }

    /// Follows references until a value that is not a thunk.
    fn concrete(&self, value: &Value) -> Result<Value> {
        match value {
            Value::Ref(target) => self.resolve_ref(target),
            Value::Arg(name) => Err(Error::eval(format!("undefined variable ‘{}’", name))),
            Value::Throw(message) => Err(Error::eval(message.to_string())),
            other => Ok(other.clone()),
        }
    }

    fn coerce(&self, value: &Value, context: &mut Context) -> Result<String> {
        match self.concrete(value)? {
            Value::Str(s, tags) => {
                context.extend(tags);
                Ok(s)
            }
            Value::Int(n) => Ok(n.to_string()),
            Value::Float(x) => Ok(x.to_string()),
            Value::Bool(true) => Ok("1".to_string()),
            Value::Bool(false) | Value::Null => Ok(String::new()),
            Value::List(items) => {
                let parts = items
                    .iter()
                    .map(|item| self.coerce(item, context))
                    .collect::<Result<Vec<_>>>()?;
                Ok(parts.join(" "))
            }
            Value::Attrs(entries) => {
                let attrs = Attrs::new(entries.as_ref().clone());
                if is_derivation(self, &attrs)? {
                    let outputs = query_outputs(self, &attrs)?;
                    let (name, path) = primary_output(&outputs)
                        .ok_or_else(|| Error::eval("derivation has no outputs"))?;
                    let drv_path = query_drv_path(self, &attrs, path)?;
                    context.insert(format!("!{}!{}", name, drv_path));
                    return Ok(path.to_string());
                }
                match attrs.get("outPath") {
                    Some(out) => self.coerce(out, context),
                    None => Err(Error::eval("cannot coerce a set to a string")),
                }
            }
            Value::Lambda(_) => Err(Error::eval("cannot coerce a function to a string")),
            Value::Ref(_) | Value::Arg(_) | Value::Throw(_) => {
                unreachable!("concrete() never yields a thunk")
            }
        }
    }
}

impl Evaluator for DocumentEvaluator {
    type Value = Value;

    fn force(&self, value: &Value) -> Result<Whnf<Value>> {
        Ok(match self.concrete(value)? {
            Value::Null => Whnf::Null,
            Value::Bool(b) => Whnf::Bool(b),
            Value::Int(n) => Whnf::Int(n),
            Value::Float(x) => Whnf::Float(x),
            Value::Str(s, _) => Whnf::Str(s),
            Value::List(items) => Whnf::List(items.as_ref().clone()),
            Value::Attrs(entries) => Whnf::Attrs(Attrs::new(entries.as_ref().clone())),
            Value::Lambda(_) => Whnf::Function,
            Value::Ref(_) | Value::Arg(_) | Value::Throw(_) => {
                unreachable!("concrete() never yields a thunk")
            }
        })
    }

    fn auto_call(&self, value: &Value, args: &AutoArgs) -> Result<Value> {
        let lambda = match self.concrete(value)? {
            Value::Lambda(lambda) => lambda,
            other => return Ok(other),
        };
        let mut bound = BTreeMap::new();
        for formal in &lambda.formals {
            let arg = match args.get(formal) {
                Some(AutoArg::Expr(json)) => {
                    Value::from_json(json).map_err(|e| Error::eval(e.to_string()))?
                }
                Some(AutoArg::Str(s)) => Value::Str(s.clone(), Context::new()),
                None => lambda.defaults.get(formal).cloned().ok_or_else(|| {
                    Error::eval(format!(
                        "cannot auto-call a function that has an argument without a value ‘{}’",
                        formal
                    ))
                })?,
            };
            bound.insert(formal.as_str(), arg);
        }
        let body = substitute(&lambda.body, &bound);
        if matches!(&self.root, Value::Lambda(root) if Rc::ptr_eq(root, &lambda)) {
            *self.scope.borrow_mut() = Some(body.clone());
            self.resolved.borrow_mut().clear();
        }
        Ok(body)
    }

    fn coerce_to_string(&self, value: &Value) -> Result<(String, Context)> {
        let mut context = Context::new();
        let s = self.coerce(value, &mut context)?;
        Ok((s, context))
    }
}
