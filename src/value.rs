// ABOUTME: Value types representing Lunite runtime data (spec 3.1)

use crate::ast::{FunctionDef, LambdaExpr};
use crate::class::{ClassRef, InstanceRef};
use crate::env::EnvRef;
use crate::host::{HostCallableRef, HostModuleRef};
use indexmap::IndexMap;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

pub type ListRef = Rc<RefCell<Vec<Value>>>;
pub type DictRef = Rc<RefCell<IndexMap<DictKey, Value>>>;
pub type SetRef = Rc<RefCell<indexmap::IndexSet<DictKey>>>;

/// A user-defined function or lambda, carrying its defining file (spec 3.1:
/// "Function ... carries its defining source file") and its closure
/// environment (spec 9: closures capture globals only, but we still carry a
/// pointer so module-level functions close over their module's globals).
#[derive(Debug, Clone)]
pub struct FunctionValue {
    pub name: Option<String>,
    pub params: Rc<[(String, Option<crate::ast::Node>)]>,
    pub body: Rc<crate::ast::Node>,
    pub closure: EnvRef,
    pub file: Rc<str>,
}

impl FunctionValue {
    pub fn from_def(def: &FunctionDef, closure: EnvRef, file: Rc<str>) -> Self {
        FunctionValue {
            name: Some(def.name.clone()),
            params: Rc::from(def.params.clone()),
            body: def.body.clone(),
            closure,
            file,
        }
    }

    pub fn from_lambda(def: &LambdaExpr, closure: EnvRef, file: Rc<str>) -> Self {
        FunctionValue {
            name: None,
            params: Rc::from(def.params.clone()),
            body: def.body.clone(),
            closure,
            file,
        }
    }
}

/// A value usable as a `Dict`/`Set` key: the subset of `Value` that has a
/// well-defined, stable hash (spec 3.1: "keys hashable").
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DictKey {
    Null,
    Bool(bool),
    Int(i64),
    Str(String),
    Char(char),
}

impl fmt::Display for DictKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DictKey::Null => write!(f, "null"),
            DictKey::Bool(b) => write!(f, "{}", b),
            DictKey::Int(n) => write!(f, "{}", n),
            DictKey::Str(s) => write!(f, "{}", s),
            DictKey::Char(c) => write!(f, "{}", c),
        }
    }
}

impl DictKey {
    pub fn from_value(v: &Value) -> Option<DictKey> {
        match v {
            Value::Null => Some(DictKey::Null),
            Value::Bool(b) => Some(DictKey::Bool(*b)),
            Value::Int(n) => Some(DictKey::Int(*n)),
            Value::Bit(n) => Some(DictKey::Int(*n as i64)),
            Value::Byte(n) => Some(DictKey::Int(*n as i64)),
            Value::String(s) => Some(DictKey::Str(s.clone())),
            Value::Char(c) => Some(DictKey::Char(*c)),
            _ => None,
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            DictKey::Null => Value::Null,
            DictKey::Bool(b) => Value::Bool(b),
            DictKey::Int(n) => Value::Int(n),
            DictKey::Str(s) => Value::String(s),
            DictKey::Char(c) => Value::Char(c),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Char(char),
    /// 0 or 1. A distinct tag from `Int` for `type()`/`is` purposes only
    /// (spec 3.1: "Bit ⊂ Int ... distinguished by type() and is").
    Bit(i64),
    /// 0-255.
    Byte(i64),
    List(ListRef),
    Dict(DictRef),
    Set(SetRef),
    Tuple(Rc<[Value]>),
    Instance(InstanceRef),
    Function(Rc<FunctionValue>),
    Class(ClassRef),
    HostCallable(HostCallableRef),
    HostModule(HostModuleRef),
}

impl Value {
    pub fn new_bit(n: i64) -> Option<Value> {
        if n == 0 || n == 1 {
            Some(Value::Bit(n))
        } else {
            None
        }
    }

    pub fn new_byte(n: i64) -> Option<Value> {
        if (0..=255).contains(&n) {
            Some(Value::Byte(n))
        } else {
            None
        }
    }

    pub fn new_char(s: &str) -> Option<Value> {
        let mut chars = s.chars();
        let c = chars.next()?;
        if chars.next().is_some() {
            return None;
        }
        Some(Value::Char(c))
    }

    pub fn list(items: Vec<Value>) -> Value {
        Value::List(Rc::new(RefCell::new(items)))
    }

    pub fn dict(map: IndexMap<DictKey, Value>) -> Value {
        Value::Dict(Rc::new(RefCell::new(map)))
    }

    pub fn set(items: indexmap::IndexSet<DictKey>) -> Value {
        Value::Set(Rc::new(RefCell::new(items)))
    }

    pub fn tuple(items: Vec<Value>) -> Value {
        Value::Tuple(Rc::from(items))
    }

    /// The built-in type name used by `type()` and `is` (spec 4.3).
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "str",
            Value::Char(_) => "char",
            Value::Bit(_) => "bit",
            Value::Byte(_) => "byte",
            Value::List(_) => "list",
            Value::Dict(_) => "dict",
            Value::Set(_) => "set",
            Value::Tuple(_) => "tuple",
            Value::Instance(_) => "instance",
            Value::Function(_) => "function",
            Value::Class(_) => "class",
            Value::HostCallable(_) => "host_callable",
            Value::HostModule(_) => "host_module",
        }
    }

    /// Truthiness used by `if`/`while`/`and`/`or`/ternary conditions.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Bit(n) => *n != 0,
            Value::Byte(n) => *n != 0,
            Value::Float(n) => *n != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::Char(_) => true,
            Value::List(l) => !l.borrow().is_empty(),
            Value::Dict(d) => !d.borrow().is_empty(),
            Value::Set(s) => !s.borrow().is_empty(),
            Value::Tuple(t) => !t.is_empty(),
            _ => true,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) | Value::Bit(n) | Value::Byte(n) => Some(*n),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(n) => {
                if n.fract() == 0.0 && n.is_finite() {
                    write!(f, "{:.1}", n)
                } else {
                    write!(f, "{}", n)
                }
            }
            Value::String(s) => write!(f, "{}", s),
            Value::Char(c) => write!(f, "{}", c),
            Value::Bit(n) => write!(f, "{}", n),
            Value::Byte(n) => write!(f, "{}", n),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, v) in items.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v.repr())?;
                }
                write!(f, "]")
            }
            Value::Dict(map) => {
                write!(f, "{{")?;
                for (i, (k, v)) in map.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v.repr())?;
                }
                write!(f, "}}")
            }
            Value::Set(items) => {
                write!(f, "{{")?;
                for (i, k) in items.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", k)?;
                }
                write!(f, "}}")
            }
            Value::Tuple(items) => {
                write!(f, "(")?;
                for (i, v) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v.repr())?;
                }
                if items.len() == 1 {
                    write!(f, ",")?;
                }
                write!(f, ")")
            }
            Value::Instance(inst) => write!(f, "<{} instance>", inst.borrow().class.borrow().name),
            Value::Function(func) => match &func.name {
                Some(n) => write!(f, "<function {}>", n),
                None => write!(f, "<lambda>"),
            },
            Value::Class(class) => write!(f, "<class {}>", class.borrow().name),
            Value::HostCallable(h) => write!(f, "<host function {}>", h.name()),
            Value::HostModule(_) => write!(f, "<host module>"),
        }
    }
}

impl Value {
    /// Like `Display`, but strings/chars are quoted -- used for elements
    /// nested inside list/dict/set/tuple displays.
    fn repr(&self) -> String {
        match self {
            Value::String(s) => format!("{:?}", s),
            Value::Char(c) => format!("'{}'", c),
            other => format!("{}", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_and_float_display() {
        assert_eq!(format!("{}", Value::Int(42)), "42");
        assert_eq!(format!("{}", Value::Float(2.5)), "2.5");
        assert_eq!(format!("{}", Value::Float(3.0)), "3.0");
    }

    #[test]
    fn list_display_quotes_nested_strings() {
        let v = Value::list(vec![Value::Int(1), Value::String("a".into())]);
        assert_eq!(format!("{}", v), "[1, \"a\"]");
    }

    #[test]
    fn bit_and_byte_rejects_out_of_range() {
        assert!(Value::new_bit(2).is_none());
        assert!(Value::new_byte(256).is_none());
        assert!(Value::new_byte(-1).is_none());
        assert!(matches!(Value::new_bit(1), Some(Value::Bit(1))));
    }

    #[test]
    fn char_rejects_multi_char() {
        assert!(Value::new_char("ab").is_none());
        assert!(Value::new_char("").is_none());
        assert!(matches!(Value::new_char("x"), Some(Value::Char('x'))));
    }

    #[test]
    fn truthiness_matches_spec() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert!(Value::Int(1).is_truthy());
        assert!(!Value::String(String::new()).is_truthy());
        assert!(Value::list(vec![Value::Null]).is_truthy());
        assert!(!Value::list(vec![]).is_truthy());
    }
}
