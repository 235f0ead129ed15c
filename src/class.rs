// ABOUTME: Class/instance model with resolved member tables (spec 3.5)

use crate::value::{FunctionValue, Value};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

pub type ClassRef = Rc<RefCell<ClassValue>>;
pub type InstanceRef = Rc<RefCell<InstanceValue>>;

/// A resolved member table: flattened `{fields, methods}` after walking the
/// superclass chain once (spec 3.5, glossary "Resolved member table").
#[derive(Debug)]
pub struct ClassValue {
    pub name: String,
    pub superclass: Option<ClassRef>,
    pub fields: HashMap<String, Value>,
    pub methods: HashMap<String, Rc<FunctionValue>>,
}

impl ClassValue {
    /// Looks up a method by name, walking the superclass chain (used for
    /// method dispatch, not for `is` -- spec 9's "is T does not walk the
    /// inheritance chain" applies only to the type-check operator).
    pub fn find_method(&self, name: &str) -> Option<Rc<FunctionValue>> {
        if let Some(m) = self.methods.get(name) {
            return Some(m.clone());
        }
        self.superclass.as_ref()?.borrow().find_method(name)
    }
}

/// An instance owns a private copy of resolved fields and shares the
/// methods table (by reference) with its class (spec 3.5).
#[derive(Debug)]
pub struct InstanceValue {
    pub class: ClassRef,
    pub fields: HashMap<String, Value>,
}

impl InstanceValue {
    pub fn new(class: ClassRef) -> InstanceRef {
        let fields = class.borrow().fields.clone();
        Rc::new(RefCell::new(InstanceValue { class, fields }))
    }

    pub fn get_field(&self, name: &str) -> Option<Value> {
        self.fields.get(name).cloned()
    }

    pub fn set_field(&mut self, name: String, value: Value) {
        self.fields.insert(name, value);
    }

    pub fn find_method(&self, name: &str) -> Option<Rc<FunctionValue>> {
        self.class.borrow().find_method(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::Environment;

    fn dummy_function(name: &str) -> Rc<FunctionValue> {
        Rc::new(FunctionValue {
            name: Some(name.to_string()),
            params: Rc::from(Vec::new()),
            body: Rc::new(crate::ast::Node::new(
                crate::ast::NodeKind::Null,
                Default::default(),
            )),
            closure: Environment::new(),
            file: Rc::from("test.luna"),
        })
    }

    #[test]
    fn subclass_method_shadows_parent() {
        let mut parent_methods = HashMap::new();
        parent_methods.insert("get".to_string(), dummy_function("parent_get"));
        let parent = Rc::new(RefCell::new(ClassValue {
            name: "A".to_string(),
            superclass: None,
            fields: HashMap::new(),
            methods: parent_methods,
        }));

        let mut child_methods = HashMap::new();
        child_methods.insert("get".to_string(), dummy_function("child_get"));
        let child = Rc::new(RefCell::new(ClassValue {
            name: "B".to_string(),
            superclass: Some(parent),
            fields: HashMap::new(),
            methods: child_methods,
        }));

        let found = child.borrow().find_method("get").unwrap();
        assert_eq!(found.name.as_deref(), Some("child_get"));
    }

    #[test]
    fn instance_inherits_method_not_defined_locally() {
        let mut parent_methods = HashMap::new();
        parent_methods.insert("shared".to_string(), dummy_function("shared_impl"));
        let parent = Rc::new(RefCell::new(ClassValue {
            name: "A".to_string(),
            superclass: None,
            fields: HashMap::new(),
            methods: parent_methods,
        }));
        let child = Rc::new(RefCell::new(ClassValue {
            name: "B".to_string(),
            superclass: Some(parent),
            fields: HashMap::new(),
            methods: HashMap::new(),
        }));

        let inst = InstanceValue::new(child);
        assert!(inst.borrow().find_method("shared").is_some());
        assert!(inst.borrow().find_method("missing").is_none());
    }

    #[test]
    fn instance_fields_are_a_private_copy() {
        let mut fields = HashMap::new();
        fields.insert("x".to_string(), Value::Int(1));
        let class = Rc::new(RefCell::new(ClassValue {
            name: "A".to_string(),
            superclass: None,
            fields,
            methods: HashMap::new(),
        }));

        let inst1 = InstanceValue::new(class.clone());
        let inst2 = InstanceValue::new(class);
        inst1.borrow_mut().set_field("x".to_string(), Value::Int(99));

        assert!(matches!(inst1.borrow().get_field("x"), Some(Value::Int(99))));
        assert!(matches!(inst2.borrow().get_field("x"), Some(Value::Int(1))));
    }
}
