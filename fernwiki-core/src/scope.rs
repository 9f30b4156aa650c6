//! Hierarchical variable scope with dotted-path resolution.
//!
//! Values are dynamically typed: string, pre-formatted HTML, boolean, block
//! reference, ordered list, or insertion-ordered map. Dotted names (`a.b.c`)
//! traverse nested maps, auto-creating intermediate maps on write; reaching a
//! non-map mid-path is a typed error, never a silent overwrite.

use crate::tree::BlockId;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ScopeError {
    #[error("@{path} is not a map")]
    NotAMap { path: String },

    #[error("@{name} is not a {expected}")]
    WrongType { name: String, expected: &'static str },

    #[error("variable has no name")]
    EmptyName,
}

/// A dynamically typed variable value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Plain text, entity-encoded when emitted.
    Str(String),
    /// Pre-formatted HTML produced by interpolation, emitted as-is.
    Html(String),
    Bool(bool),
    /// Reference to a block stored in the page arena.
    Block(BlockId),
    List(Vec<Value>),
    Map(ValueMap),
}

impl Value {
    /// Scalar text of a `Str` or `Html` value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) | Value::Html(s) => Some(s),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Str(_) => "string",
            Value::Html(_) => "html",
            Value::Bool(_) => "boolean",
            Value::Block(_) => "block",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }
}

/// A map that remembers the order keys were first inserted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValueMap {
    keys: Vec<String>,
    map: HashMap<String, Value>,
}

impl ValueMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.map.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.map.get_mut(key)
    }

    pub fn insert(&mut self, key: &str, value: Value) {
        if !self.map.contains_key(key) {
            self.keys.push(key.to_string());
        }
        self.map.insert(key.to_string(), value);
    }

    /// Keys in first-insertion order.
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.keys
            .iter()
            .filter_map(|k| self.map.get(k).map(|v| (k.as_str(), v)))
    }
}

/// A variable scope, optionally chained to a parent scope.
///
/// Reads fall back to the parent; writes always land in this scope.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    vars: ValueMap,
    parent: Option<Box<Scope>>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    /// A scope inheriting from the given defaults.
    pub fn with_parent(parent: Scope) -> Self {
        Self {
            vars: ValueMap::new(),
            parent: Some(Box::new(parent)),
        }
    }

    /// Look up a dotted name. `Ok(None)` means absent; `Err` means the path
    /// ran into a non-map.
    pub fn get(&self, name: &str) -> Result<Option<&Value>, ScopeError> {
        match lookup(&self.vars, name)? {
            Some(v) => Ok(Some(v)),
            None => match &self.parent {
                Some(parent) => parent.get(name),
                None => Ok(None),
            },
        }
    }

    /// Like [`Scope::get`] but without consulting the parent chain. Block
    /// references are only meaningful within the scope that declared them,
    /// so block-valued reads go through this.
    pub fn get_own(&self, name: &str) -> Result<Option<&Value>, ScopeError> {
        lookup(&self.vars, name)
    }

    /// The variables declared in this scope itself, parent chain excluded.
    pub fn own_vars(&self) -> &ValueMap {
        &self.vars
    }

    /// Block reference declared in this scope itself.
    pub fn get_own_block(&self, name: &str) -> Result<Option<BlockId>, ScopeError> {
        match self.get_own(name)? {
            None => Ok(None),
            Some(Value::Block(id)) => Ok(Some(*id)),
            Some(_) => Err(ScopeError::WrongType {
                name: name.to_string(),
                expected: "block",
            }),
        }
    }

    /// String value of a variable; error if present but not a scalar.
    pub fn get_str(&self, name: &str) -> Result<Option<&str>, ScopeError> {
        match self.get(name)? {
            None => Ok(None),
            Some(v) => v.as_str().map(Some).ok_or(ScopeError::WrongType {
                name: name.to_string(),
                expected: "string",
            }),
        }
    }

    /// Boolean value of a variable; absent means false.
    pub fn get_bool(&self, name: &str) -> Result<bool, ScopeError> {
        match self.get(name)? {
            None => Ok(false),
            Some(Value::Bool(b)) => Ok(*b),
            Some(_) => Err(ScopeError::WrongType {
                name: name.to_string(),
                expected: "boolean",
            }),
        }
    }

    /// Block reference held by a variable.
    pub fn get_block(&self, name: &str) -> Result<Option<BlockId>, ScopeError> {
        match self.get(name)? {
            None => Ok(None),
            Some(Value::Block(id)) => Ok(Some(*id)),
            Some(_) => Err(ScopeError::WrongType {
                name: name.to_string(),
                expected: "block",
            }),
        }
    }

    /// Map value of a variable.
    pub fn get_map(&self, name: &str) -> Result<Option<&ValueMap>, ScopeError> {
        match self.get(name)? {
            None => Ok(None),
            Some(Value::Map(m)) => Ok(Some(m)),
            Some(_) => Err(ScopeError::WrongType {
                name: name.to_string(),
                expected: "map",
            }),
        }
    }

    /// Write a dotted name, auto-creating intermediate maps.
    pub fn set(&mut self, name: &str, value: Value) -> Result<(), ScopeError> {
        if name.is_empty() {
            return Err(ScopeError::EmptyName);
        }

        let mut current = &mut self.vars;
        let mut walked = String::new();
        let parts: Vec<&str> = name.split('.').collect();

        for part in &parts[..parts.len() - 1] {
            if !walked.is_empty() {
                walked.push('.');
            }
            walked.push_str(part);

            if current.get(part).is_none() {
                current.insert(part, Value::Map(ValueMap::new()));
            }
            current = match current.get_mut(part) {
                Some(Value::Map(m)) => m,
                _ => return Err(ScopeError::NotAMap { path: walked }),
            };
        }

        let last = parts[parts.len() - 1];
        if last.is_empty() {
            return Err(ScopeError::EmptyName);
        }
        current.insert(last, value);
        Ok(())
    }
}

fn lookup<'a>(map: &'a ValueMap, name: &str) -> Result<Option<&'a Value>, ScopeError> {
    let mut current = map;
    let mut walked = String::new();
    let parts: Vec<&str> = name.split('.').collect();

    for part in &parts[..parts.len() - 1] {
        if !walked.is_empty() {
            walked.push('.');
        }
        walked.push_str(part);

        current = match current.get(part) {
            None => return Ok(None),
            Some(Value::Map(m)) => m,
            Some(_) => return Err(ScopeError::NotAMap { path: walked }),
        };
    }

    Ok(current.get(parts[parts.len() - 1]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_flat() {
        let mut scope = Scope::new();
        scope.set("title", Value::Str("Hello".into())).unwrap();
        assert_eq!(scope.get_str("title").unwrap(), Some("Hello"));
    }

    #[test]
    fn test_dotted_auto_creates_maps() {
        let mut scope = Scope::new();
        scope.set("page.title", Value::Str("Foo".into())).unwrap();
        scope.set("page.draft", Value::Bool(true)).unwrap();

        assert_eq!(scope.get_str("page.title").unwrap(), Some("Foo"));
        assert!(scope.get_bool("page.draft").unwrap());

        let map = scope.get_map("page").unwrap().unwrap();
        assert_eq!(map.keys(), &["title".to_string(), "draft".to_string()]);
    }

    #[test]
    fn test_traversal_type_mismatch_errors() {
        let mut scope = Scope::new();
        scope.set("a", Value::Str("scalar".into())).unwrap();

        let err = scope.set("a.b", Value::Bool(true)).unwrap_err();
        assert_eq!(err, ScopeError::NotAMap { path: "a".into() });

        let err = scope.get("a.b").unwrap_err();
        assert_eq!(err, ScopeError::NotAMap { path: "a".into() });
    }

    #[test]
    fn test_wrong_type_getter() {
        let mut scope = Scope::new();
        scope.set("flag", Value::Bool(true)).unwrap();
        assert!(scope.get_str("flag").is_err());
        assert!(scope.get_bool("missing").unwrap() == false);
    }

    #[test]
    fn test_parent_chain() {
        let mut defaults = Scope::new();
        defaults
            .set("root.page", Value::Str("/page".into()))
            .unwrap();

        let mut scope = Scope::with_parent(defaults);
        assert_eq!(scope.get_str("root.page").unwrap(), Some("/page"));

        // writes land in the child and shadow the parent
        scope.set("root.page", Value::Str("/p".into())).unwrap();
        assert_eq!(scope.get_str("root.page").unwrap(), Some("/p"));
    }

    #[test]
    fn test_map_insertion_order() {
        let mut map = ValueMap::new();
        map.insert("b", Value::Bool(true));
        map.insert("a", Value::Bool(true));
        map.insert("b", Value::Bool(false));
        assert_eq!(map.keys(), &["b".to_string(), "a".to_string()]);
    }
}
