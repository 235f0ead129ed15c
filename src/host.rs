// ABOUTME: Host-interop contract for injecting native functions/modules (spec 6.3)

use crate::value::Value;
use std::fmt;
use std::rc::Rc;

pub type HostCallableRef = Rc<dyn HostCallable>;
pub type HostModuleRef = Rc<dyn HostModule>;

/// Arity a `HostCallable` accepts. Mirrors the base crate's optional-arity
/// check in `SimpleTool::call`, generalized to a range/variadic shape since
/// Lunite's own `FunctionDef` supports trailing defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    Range(usize, usize),
    Variadic,
}

impl Arity {
    pub fn accepts(&self, n: usize) -> bool {
        match self {
            Arity::Exact(k) => n == *k,
            Arity::Range(lo, hi) => n >= *lo && n <= *hi,
            Arity::Variadic => true,
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exact(k) => write!(f, "{}", k),
            Arity::Range(lo, hi) => write!(f, "{}-{}", lo, hi),
            Arity::Variadic => write!(f, "any number of"),
        }
    }
}

/// An error a host function raises to signal a user-visible failure (spec
/// 6.3). The evaluator wraps it in a located `Runtime` error at the call
/// site unless it already carries a location.
#[derive(Debug, Clone)]
pub struct HostError {
    pub message: String,
    pub located: bool,
}

impl HostError {
    pub fn new(message: impl Into<String>) -> Self {
        HostError {
            message: message.into(),
            located: false,
        }
    }
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// A function with arity and a host implementation (spec 3.1 `HostCallable`).
pub trait HostCallable {
    fn name(&self) -> &str;
    fn arity(&self) -> Arity;
    fn call(&self, args: &[Value]) -> Result<Value, HostError>;
}

/// An opaque handle to an imported external module (spec 3.1 `HostModule`):
/// supports member/method lookup by name.
pub trait HostModule {
    fn get_member(&self, name: &str) -> Option<Value>;
    fn call_method(&self, name: &str, args: &[Value]) -> Option<Result<Value, HostError>>;
}

/// Wraps a bare Rust function pointer as a `HostCallable`, mirroring the base
/// crate's `SimpleTool` convenience wrapper.
pub struct NativeFn {
    name: String,
    arity: Arity,
    func: fn(&[Value]) -> Result<Value, HostError>,
}

impl NativeFn {
    pub fn new(name: &str, arity: Arity, func: fn(&[Value]) -> Result<Value, HostError>) -> Self {
        NativeFn {
            name: name.to_string(),
            arity,
            func,
        }
    }
}

impl HostCallable for NativeFn {
    fn name(&self) -> &str {
        &self.name
    }

    fn arity(&self) -> Arity {
        self.arity
    }

    fn call(&self, args: &[Value]) -> Result<Value, HostError> {
        if !self.arity.accepts(args.len()) {
            return Err(HostError::new(format!(
                "{}: expected {} argument(s), got {}",
                self.name,
                self.arity,
                args.len()
            )));
        }
        (self.func)(args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add(args: &[Value]) -> Result<Value, HostError> {
        let mut sum = 0i64;
        for arg in args {
            match arg.as_int() {
                Some(n) => sum += n,
                None => return Err(HostError::new("add: expected int")),
            }
        }
        Ok(Value::Int(sum))
    }

    #[test]
    fn native_fn_checks_arity() {
        let tool = NativeFn::new("add", Arity::Range(1, 4), add);
        assert!(tool.call(&[]).is_err());
        assert!(tool.call(&[Value::Int(1), Value::Int(2)]).is_ok());
    }

    #[test]
    fn native_fn_calls_through() {
        let tool = NativeFn::new("add", Arity::Variadic, add);
        let result = tool.call(&[Value::Int(1), Value::Int(2), Value::Int(3)]).unwrap();
        assert!(matches!(result, Value::Int(6)));
    }
}
