// ABOUTME: Environment module for managing variable bindings and scopes (spec 3.4)

use crate::error::LuniteError;
use crate::value::Value;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

pub type EnvRef = Rc<Environment>;

#[derive(Debug)]
pub struct Environment {
    bindings: RefCell<HashMap<String, Value>>,
    consts: RefCell<HashSet<String>>,
    parent: Option<EnvRef>,
}

impl Environment {
    /// Creates a new global environment with no parent.
    pub fn new() -> EnvRef {
        Rc::new(Environment {
            bindings: RefCell::new(HashMap::new()),
            consts: RefCell::new(HashSet::new()),
            parent: None,
        })
    }

    /// Creates a new child environment with a parent.
    pub fn with_parent(parent: EnvRef) -> EnvRef {
        Rc::new(Environment {
            bindings: RefCell::new(HashMap::new()),
            consts: RefCell::new(HashSet::new()),
            parent: Some(parent),
        })
    }

    /// Defines a mutable binding in THIS scope (doesn't walk the parent chain).
    pub fn define(&self, name: impl Into<String>, value: Value) {
        let name = name.into();
        self.consts.borrow_mut().remove(&name);
        self.bindings.borrow_mut().insert(name, value);
    }

    /// Defines a `const` binding in THIS scope (spec 3.4: later reassignment
    /// must fail).
    pub fn define_const(&self, name: impl Into<String>, value: Value) {
        let name = name.into();
        self.bindings.borrow_mut().insert(name.clone(), value);
        self.consts.borrow_mut().insert(name);
    }

    /// Looks up a symbol in this scope and parent scopes recursively.
    pub fn get(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.bindings.borrow().get(name) {
            return Some(value.clone());
        }
        self.parent.as_ref().and_then(|p| p.get(name))
    }

    /// Walks up to the frame that defines `name` and overwrites it there
    /// (spec 3.4: "assignments walk up to the defining frame and fail if the
    /// name is not found or is marked const").
    pub fn assign(&self, name: &str, value: Value) -> Result<(), LuniteError> {
        if self.bindings.borrow().contains_key(name) {
            if self.consts.borrow().contains(name) {
                return Err(LuniteError::runtime(format!(
                    "cannot assign to constant '{}'",
                    name
                )));
            }
            self.bindings.borrow_mut().insert(name.to_string(), value);
            return Ok(());
        }
        match &self.parent {
            Some(parent) => parent.assign(name, value),
            None => Err(LuniteError::runtime(format!("undefined name '{}'", name))),
        }
    }

    pub fn is_const(&self, name: &str) -> bool {
        if self.bindings.borrow().contains_key(name) {
            return self.consts.borrow().contains(name);
        }
        self.parent.as_ref().map(|p| p.is_const(name)).unwrap_or(false)
    }

    /// Snapshots this scope's own bindings, ignoring the parent chain. Used
    /// to wrap a finished module's top-level scope as a value (spec 3.6).
    pub fn own_bindings(&self) -> HashMap<String, Value> {
        self.bindings.borrow().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn define_and_get() {
        let env = Environment::new();
        env.define("x", Value::Int(42));
        assert!(matches!(env.get("x"), Some(Value::Int(42))));
    }

    #[test]
    fn undefined_symbol() {
        let env = Environment::new();
        assert!(env.get("undefined").is_none());
    }

    #[test]
    fn shadowing() {
        let parent = Environment::new();
        parent.define("x", Value::Int(42));

        let child = Environment::with_parent(parent);
        child.define("x", Value::Int(100));
        assert!(matches!(child.get("x"), Some(Value::Int(100))));
    }

    #[test]
    fn parent_lookup() {
        let parent = Environment::new();
        parent.define("x", Value::Int(42));
        let child = Environment::with_parent(parent);
        assert!(matches!(child.get("x"), Some(Value::Int(42))));
    }

    #[test]
    fn assign_walks_up_to_defining_frame() {
        let parent = Environment::new();
        parent.define("x", Value::Int(1));
        let child = Environment::with_parent(parent.clone());

        child.assign("x", Value::Int(2)).unwrap();
        assert!(matches!(parent.get("x"), Some(Value::Int(2))));
    }

    #[test]
    fn assign_to_undefined_fails() {
        let env = Environment::new();
        assert!(env.assign("nope", Value::Int(1)).is_err());
    }

    #[test]
    fn const_reassignment_fails_with_message() {
        let env = Environment::new();
        env.define_const("PI", Value::Float(3.14));
        let err = env.assign("PI", Value::Float(3.0)).unwrap_err();
        assert!(format!("{}", err).contains("constant"));
    }

    #[test]
    fn redefining_name_clears_const_flag() {
        let env = Environment::new();
        env.define_const("x", Value::Int(1));
        env.define("x", Value::Int(2));
        assert!(env.assign("x", Value::Int(3)).is_ok());
    }
}
