// ABOUTME: Bootstrap host prelude bound into every global environment (spec 6, SPEC_FULL section F)

use crate::env::EnvRef;
use crate::host::{Arity, HostError, NativeFn};
use crate::value::Value;

pub fn register(env: &EnvRef) {
    env.define("out", Value::HostCallable(std::rc::Rc::new(NativeFn::new("out", Arity::Variadic, out))));
    env.define("str", Value::HostCallable(std::rc::Rc::new(NativeFn::new("str", Arity::Exact(1), str_fn))));
    env.define(
        "range",
        Value::HostCallable(std::rc::Rc::new(NativeFn::new("range", Arity::Range(1, 3), range))),
    );
    env.define("type", Value::HostCallable(std::rc::Rc::new(NativeFn::new("type", Arity::Exact(1), type_fn))));
    env.define("len", Value::HostCallable(std::rc::Rc::new(NativeFn::new("len", Arity::Exact(1), len))));
}

fn out(args: &[Value]) -> Result<Value, HostError> {
    let line = args
        .iter()
        .map(|v| format!("{}", v))
        .collect::<Vec<_>>()
        .join(" ");
    println!("{}", line);
    Ok(Value::Null)
}

fn str_fn(args: &[Value]) -> Result<Value, HostError> {
    Ok(Value::String(format!("{}", args[0])))
}

fn range(args: &[Value]) -> Result<Value, HostError> {
    let ints: Vec<i64> = args
        .iter()
        .map(|v| v.as_int().ok_or_else(|| HostError::new("range: arguments must be int")))
        .collect::<Result<_, _>>()?;
    let (start, end, step) = match ints.as_slice() {
        [end] => (0, *end, 1),
        [start, end] => (*start, *end, 1),
        [start, end, step] => (*start, *end, *step),
        _ => unreachable!("arity checked by NativeFn"),
    };
    if step == 0 {
        return Err(HostError::new("range: step cannot be zero"));
    }
    let mut items = Vec::new();
    let mut n = start;
    if step > 0 {
        while n < end {
            items.push(Value::Int(n));
            n += step;
        }
    } else {
        while n > end {
            items.push(Value::Int(n));
            n += step;
        }
    }
    Ok(Value::list(items))
}

fn type_fn(args: &[Value]) -> Result<Value, HostError> {
    if let Value::Instance(inst) = &args[0] {
        return Ok(Value::String(inst.borrow().class.borrow().name.clone()));
    }
    Ok(Value::String(args[0].type_name().to_string()))
}

fn len(args: &[Value]) -> Result<Value, HostError> {
    let n = match &args[0] {
        Value::String(s) => s.chars().count(),
        Value::List(l) => l.borrow().len(),
        Value::Dict(d) => d.borrow().len(),
        Value::Set(s) => s.borrow().len(),
        Value::Tuple(t) => t.len(),
        other => {
            return Err(HostError::new(format!(
                "len: unsupported type '{}'",
                other.type_name()
            )))
        }
    };
    Ok(Value::Int(n as i64))
}
