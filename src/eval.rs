// ABOUTME: Tree-walking evaluator: expression/statement/call semantics (spec 4.3)

use crate::ast::{BinOp, Node, NodeKind, UnOp};
use crate::class::{ClassValue, InstanceValue};
use crate::env::{EnvRef, Environment};
use crate::error::{EvalResult, LeapTarget, LuniteError, Signal};
use crate::interpreter::Interpreter;
use crate::value::{DictKey, FunctionValue, Value};
use indexmap::{IndexMap, IndexSet};
use std::collections::HashMap;
use std::rc::Rc;

impl Interpreter {
    /// Executes a statement list, handling `leap` restarts against labels and
    /// line numbers declared directly in this list (spec 3.3 `LeapStmt`).
    /// Returns the last statement's value, or `Null` for an empty list.
    pub fn exec_stmts(&self, stmts: &[Node], env: &EnvRef, globals: &EnvRef) -> EvalResult {
        let mut last = Value::Null;
        let mut i = 0;
        while i < stmts.len() {
            match self.eval_node(&stmts[i], env, globals) {
                Ok(v) => {
                    last = v;
                    i += 1;
                }
                Err(Signal::Leap(target)) => match find_leap_target(stmts, &target) {
                    Some(idx) => i = idx,
                    None => return Err(Signal::Leap(target)),
                },
                Err(other) => return Err(other),
            }
        }
        Ok(last)
    }

    fn eval_block(&self, node: &Node, env: &EnvRef, globals: &EnvRef) -> EvalResult {
        let stmts = block_stmts(node);
        let child = Environment::with_parent(env.clone());
        self.exec_stmts(stmts, &child, globals)
    }

    pub fn eval_node(&self, node: &Node, env: &EnvRef, globals: &EnvRef) -> EvalResult {
        let file = self.current_file();
        match &node.kind {
            NodeKind::Int(n) => Ok(Value::Int(*n)),
            NodeKind::Number(n) => Ok(Value::Float(*n)),
            NodeKind::StringLit(s) => Ok(Value::String(s.clone())),
            NodeKind::CharLit(c) => Ok(Value::Char(*c)),
            NodeKind::Boolean(b) => Ok(Value::Bool(*b)),
            NodeKind::Null => Ok(Value::Null),

            NodeKind::ListLit(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval_node(item, env, globals)?);
                }
                Ok(Value::list(values))
            }
            NodeKind::TupleLit(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval_node(item, env, globals)?);
                }
                Ok(Value::tuple(values))
            }
            NodeKind::SetLit(items) => {
                let mut set = IndexSet::new();
                for item in items {
                    let v = self.eval_node(item, env, globals)?;
                    let key = DictKey::from_value(&v)
                        .ok_or_else(|| LuniteError::key("unhashable set element").locate(&file, node.loc))?;
                    set.insert(key);
                }
                Ok(Value::set(set))
            }
            NodeKind::DictLit(pairs) => {
                let mut map = IndexMap::new();
                for (k, v) in pairs {
                    let kv = self.eval_node(k, env, globals)?;
                    let vv = self.eval_node(v, env, globals)?;
                    let key = DictKey::from_value(&kv)
                        .ok_or_else(|| LuniteError::key("unhashable dict key").locate(&file, node.loc))?;
                    map.insert(key, vv);
                }
                Ok(Value::dict(map))
            }

            NodeKind::Identifier(name) => env
                .get(name)
                .ok_or_else(|| Signal::Err(LuniteError::runtime(format!("undefined name '{}'", name)).locate(&file, node.loc))),

            NodeKind::UnaryOp { op, expr } => {
                let v = self.eval_node(expr, env, globals)?;
                eval_unary(*op, v).map_err(|m| Signal::Err(LuniteError::runtime(m).locate(&file, node.loc)))
            }

            NodeKind::BinaryOp { op, left, right } => self.eval_binary(*op, left, right, node, env, globals),

            NodeKind::TernaryOp { cond, then_branch, else_branch } => {
                let c = self.eval_node(cond, env, globals)?;
                if c.is_truthy() {
                    self.eval_node(then_branch, env, globals)
                } else {
                    self.eval_node(else_branch, env, globals)
                }
            }

            NodeKind::TypeCheck { expr, type_name } => {
                let v = self.eval_node(expr, env, globals)?;
                Ok(Value::Bool(matches_type(&v, type_name)))
            }

            NodeKind::Assign { target, value } => {
                let v = self.eval_node(value, env, globals)?;
                self.assign_to(target, v, env, globals)
            }
            NodeKind::CompoundAssign { op, target, value } => {
                let current = self.eval_node(target, env, globals)?;
                let rhs = self.eval_node(value, env, globals)?;
                let updated = eval_binary_value(*op, current, rhs)
                    .map_err(|m| Signal::Err(LuniteError::runtime(m).locate(&file, node.loc)))?;
                self.assign_to(target, updated, env, globals)
            }

            NodeKind::Block(_) => self.eval_block(node, env, globals),

            NodeKind::FunctionDef(def) => {
                let func = FunctionValue::from_def(def, globals.clone(), file.clone());
                env.define(def.name.clone(), Value::Function(Rc::new(func)));
                Ok(Value::Null)
            }
            NodeKind::LambdaExpr(def) => {
                let func = FunctionValue::from_lambda(def, globals.clone(), file.clone());
                Ok(Value::Function(Rc::new(func)))
            }
            NodeKind::ClassDef(def) => {
                let class = self.resolve_class(def, node.loc, env, globals)?;
                env.define(def.name.clone(), Value::Class(class));
                Ok(Value::Null)
            }
            NodeKind::EnumDef { name, members } => {
                let mut map = IndexMap::new();
                for (i, member) in members.iter().enumerate() {
                    map.insert(DictKey::Str(member.clone()), Value::Int(i as i64));
                }
                env.define(name.clone(), Value::dict(map));
                Ok(Value::Null)
            }

            NodeKind::IfStmt { cond, then_branch, else_branch } => {
                let c = self.eval_node(cond, env, globals)?;
                if c.is_truthy() {
                    self.eval_node(then_branch, env, globals)
                } else if let Some(else_b) = else_branch {
                    self.eval_node(else_b, env, globals)
                } else {
                    Ok(Value::Null)
                }
            }

            NodeKind::WhileStmt { cond, body } => self.eval_while(cond, body, env, globals),
            NodeKind::ForStmt { iter_name, iterable, body } => {
                self.eval_for(iter_name, iterable, body, node, env, globals)
            }

            NodeKind::TryCatchStmt { try_block, error_var, rescue_block, finally_block } => {
                self.eval_try(try_block, error_var, rescue_block, finally_block.as_deref(), env, globals)
            }

            NodeKind::ImportStmt { module, source } => {
                let wrapper = self
                    .import_module(module, source.as_deref())
                    .map_err(|e| Signal::Err(e.locate(&file, node.loc)))?;
                let alias = module_alias(module);
                env.define(alias, wrapper);
                Ok(Value::Null)
            }
            NodeKind::ImportHostStmt { module, alias, source } => {
                let handle = self
                    .import_host_module(module, source.as_deref())
                    .map_err(|e| Signal::Err(e.locate(&file, node.loc)))?;
                env.define(alias.clone(), handle);
                Ok(Value::Null)
            }

            NodeKind::FunctionCall { name, args } => {
                let callee = env
                    .get(name)
                    .ok_or_else(|| Signal::Err(LuniteError::runtime(format!("undefined name '{}'", name)).locate(&file, node.loc)))?;
                let values = self.eval_args(args, env, globals)?;
                self.call_value(callee, values, node.loc)
            }
            NodeKind::MethodCall { obj, method, args } => {
                let receiver = self.eval_node(obj, env, globals)?;
                let values = self.eval_args(args, env, globals)?;
                self.call_method(receiver, method, values, node.loc)
            }
            NodeKind::MemberAccess { obj, member } => {
                let receiver = self.eval_node(obj, env, globals)?;
                self.eval_member(receiver, member, node.loc)
            }
            NodeKind::IndexAccess { target, index } => {
                let container = self.eval_node(target, env, globals)?;
                let idx = self.eval_node(index, env, globals)?;
                eval_index(&container, &idx).map_err(|e| Signal::Err(e.locate(&file, node.loc)))
            }

            NodeKind::ReturnStmt(expr) => {
                let v = match expr {
                    Some(e) => self.eval_node(e, env, globals)?,
                    None => Value::Null,
                };
                Err(Signal::Return(v))
            }
            NodeKind::BreakStmt => Err(Signal::Break),
            NodeKind::AdvanceStmt => Err(Signal::Advance),
            NodeKind::LeapStmt(target) => Err(Signal::Leap(target.clone())),
            NodeKind::LabelDef(_) => Ok(Value::Null),

            NodeKind::MatchStmt { subject, cases, default } => self.eval_match(subject, cases, default, env, globals),

            NodeKind::VarDecl { name, value, is_const } => {
                let v = self.eval_node(value, env, globals)?;
                if *is_const {
                    env.define_const(name.clone(), v);
                } else {
                    env.define(name.clone(), v);
                }
                Ok(Value::Null)
            }
            NodeKind::DestructuringDecl { names, value, is_const } => {
                let v = self.eval_node(value, env, globals)?;
                let items = destructure(&v).map_err(|m| Signal::Err(LuniteError::destructuring(m).locate(&file, node.loc)))?;
                if items.len() < names.len() {
                    return Err(Signal::Err(
                        LuniteError::destructuring(format!(
                            "expected at least {} values, got {}",
                            names.len(),
                            items.len()
                        ))
                        .locate(&file, node.loc),
                    ));
                }
                for (name, item) in names.iter().zip(items.into_iter()) {
                    if *is_const {
                        env.define_const(name.clone(), item);
                    } else {
                        env.define(name.clone(), item);
                    }
                }
                Ok(Value::Null)
            }

            NodeKind::NewInstance { class_expr, args } => {
                let class_val = self.eval_node(class_expr, env, globals)?;
                let values = self.eval_args(args, env, globals)?;
                self.new_instance(class_val, values, node.loc)
            }
        }
    }

    fn eval_args(&self, args: &[Node], env: &EnvRef, globals: &EnvRef) -> Result<Vec<Value>, Signal> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.eval_node(arg, env, globals)?);
        }
        Ok(values)
    }

    fn eval_binary(&self, op: BinOp, left: &Node, right: &Node, node: &Node, env: &EnvRef, globals: &EnvRef) -> EvalResult {
        // `and`/`or` short-circuit and surface only a boolean (spec 9): the
        // right operand is not evaluated unless needed, and the result is
        // always a `Bool`, never either operand's raw value.
        if op == BinOp::And {
            let l = self.eval_node(left, env, globals)?;
            if !l.is_truthy() {
                return Ok(Value::Bool(false));
            }
            let r = self.eval_node(right, env, globals)?;
            return Ok(Value::Bool(r.is_truthy()));
        }
        if op == BinOp::Or {
            let l = self.eval_node(left, env, globals)?;
            if l.is_truthy() {
                return Ok(Value::Bool(true));
            }
            let r = self.eval_node(right, env, globals)?;
            return Ok(Value::Bool(r.is_truthy()));
        }

        let l = self.eval_node(left, env, globals)?;
        let r = self.eval_node(right, env, globals)?;
        eval_binary_value(op, l, r).map_err(|m| Signal::Err(LuniteError::runtime(m).locate(&self.current_file(), node.loc)))
    }

    fn eval_while(&self, cond: &Node, body: &Node, env: &EnvRef, globals: &EnvRef) -> EvalResult {
        loop {
            let c = self.eval_node(cond, env, globals)?;
            if !c.is_truthy() {
                return Ok(Value::Null);
            }
            match self.eval_node(body, env, globals) {
                Ok(_) => {}
                Err(Signal::Break) => return Ok(Value::Null),
                Err(Signal::Advance) => continue,
                Err(other) => return Err(other),
            }
        }
    }

    fn eval_for(&self, iter_name: &str, iterable: &Node, body: &Node, node: &Node, env: &EnvRef, globals: &EnvRef) -> EvalResult {
        let file = self.current_file();
        let source = self.eval_node(iterable, env, globals)?;
        let items = iterate(&source).map_err(|m| Signal::Err(LuniteError::loop_error(m).locate(&file, node.loc)))?;
        for item in items {
            let iter_env = Environment::with_parent(env.clone());
            iter_env.define(iter_name.to_string(), item);
            match self.eval_node(body, &iter_env, globals) {
                Ok(_) => {}
                Err(Signal::Break) => break,
                Err(Signal::Advance) => continue,
                Err(other) => return Err(other),
            }
        }
        Ok(Value::Null)
    }

    fn eval_try(
        &self,
        try_block: &Node,
        error_var: &str,
        rescue_block: &Node,
        finally_block: Option<&Node>,
        env: &EnvRef,
        globals: &EnvRef,
    ) -> EvalResult {
        let try_result = self.eval_node(try_block, env, globals);
        let result = match try_result {
            Err(Signal::Err(e)) => {
                let rescue_env = Environment::with_parent(env.clone());
                rescue_env.define(error_var.to_string(), Value::String(e.message.clone()));
                self.eval_node(rescue_block, &rescue_env, globals)
            }
            other => other,
        };
        if let Some(fb) = finally_block {
            // `finally` always runs; a signal it raises supersedes whatever
            // the try/rescue produced (spec 7 exception hygiene).
            if let Err(sig) = self.eval_node(fb, env, globals) {
                return Err(sig);
            }
        }
        result
    }

    /// `break` inside a matched case exits the match without propagating to
    /// an enclosing loop (spec 4.3 `match`/`other`); every other signal
    /// propagates normally.
    fn eval_match(
        &self,
        subject: &Node,
        cases: &[crate::ast::MatchCase],
        default: &Option<Vec<Node>>,
        env: &EnvRef,
        globals: &EnvRef,
    ) -> EvalResult {
        let subject_val = self.eval_node(subject, env, globals)?;
        for case in cases {
            let case_val = self.eval_node(&case.value, env, globals)?;
            if values_equal(&subject_val, &case_val) {
                let case_env = Environment::with_parent(env.clone());
                return match self.exec_stmts(&case.body, &case_env, globals) {
                    Err(Signal::Break) => Ok(Value::Null),
                    other => other,
                };
            }
        }
        if let Some(stmts) = default {
            let case_env = Environment::with_parent(env.clone());
            return match self.exec_stmts(stmts, &case_env, globals) {
                Err(Signal::Break) => Ok(Value::Null),
                other => other,
            };
        }
        Ok(Value::Null)
    }

    fn assign_to(&self, target: &Node, value: Value, env: &EnvRef, globals: &EnvRef) -> EvalResult {
        let file = self.current_file();
        match &target.kind {
            NodeKind::Identifier(name) => {
                env.assign(name, value.clone())
                    .map_err(|e| Signal::Err(e.locate(&file, target.loc)))?;
                Ok(value)
            }
            NodeKind::MemberAccess { obj, member } => {
                let receiver = self.eval_node(obj, env, globals)?;
                match receiver {
                    Value::Instance(inst) => {
                        inst.borrow_mut().set_field(member.clone(), value.clone());
                        Ok(value)
                    }
                    other => Err(Signal::Err(
                        LuniteError::member(format!("cannot set member '{}' on {}", member, other.type_name()))
                            .locate(&file, target.loc),
                    )),
                }
            }
            NodeKind::IndexAccess { target: container_node, index } => {
                let container = self.eval_node(container_node, env, globals)?;
                let idx = self.eval_node(index, env, globals)?;
                assign_index(&container, &idx, value.clone()).map_err(|e| Signal::Err(e.locate(&file, target.loc)))?;
                Ok(value)
            }
            _ => Err(Signal::Err(
                LuniteError::assignment("invalid assignment target").locate(&file, target.loc),
            )),
        }
    }

    fn eval_member(&self, receiver: Value, member: &str, loc: crate::token::Location) -> EvalResult {
        let file = self.current_file();
        match receiver {
            Value::Instance(inst) => {
                if let Some(v) = inst.borrow().get_field(member) {
                    return Ok(v);
                }
                if let Some(method) = inst.borrow().find_method(member) {
                    return Ok(Value::Function(Rc::new(bind_method(&method, Value::Instance(inst.clone())))));
                }
                Err(Signal::Err(
                    LuniteError::member(format!("no member '{}'", member)).locate(&file, loc),
                ))
            }
            Value::HostModule(module) => module
                .get_member(member)
                .ok_or_else(|| Signal::Err(LuniteError::member(format!("no member '{}'", member)).locate(&file, loc))),
            other => Err(Signal::Err(
                LuniteError::member(format!("cannot access member '{}' on {}", member, other.type_name())).locate(&file, loc),
            )),
        }
    }

    fn call_method(&self, receiver: Value, method: &str, args: Vec<Value>, loc: crate::token::Location) -> EvalResult {
        let file = self.current_file();
        match receiver {
            Value::Instance(inst) => {
                let found = inst.borrow().find_method(method);
                match found {
                    Some(func) => {
                        let bound = bind_method(&func, Value::Instance(inst));
                        self.call_user_function(Rc::new(bound), args, loc)
                    }
                    None => Err(Signal::Err(
                        LuniteError::method(format!("no method '{}'", method)).locate(&file, loc),
                    )),
                }
            }
            Value::HostModule(module) => match module.call_method(method, &args) {
                Some(Ok(v)) => Ok(v),
                Some(Err(e)) => Err(Signal::Err(LuniteError::runtime(e.message).locate(&file, loc))),
                None => Err(Signal::Err(
                    LuniteError::method(format!("no method '{}'", method)).locate(&file, loc),
                )),
            },
            other => Err(Signal::Err(
                LuniteError::method(format!("cannot call method '{}' on {}", method, other.type_name())).locate(&file, loc),
            )),
        }
    }

    pub fn call_value(&self, callee: Value, args: Vec<Value>, loc: crate::token::Location) -> EvalResult {
        let file = self.current_file();
        match callee {
            Value::Function(f) => self.call_user_function(f, args, loc),
            Value::HostCallable(h) => h
                .call(&args)
                .map_err(|e| Signal::Err(LuniteError::runtime(e.message).locate(&file, loc))),
            other => Err(Signal::Err(
                LuniteError::function(format!("'{}' is not callable", other.type_name())).locate(&file, loc),
            )),
        }
    }

    fn call_user_function(&self, func: Rc<FunctionValue>, args: Vec<Value>, loc: crate::token::Location) -> EvalResult {
        self.enter_call(loc)?;
        let result = self.call_user_function_inner(&func, args, loc);
        self.exit_call();
        result
    }

    fn call_user_function_inner(&self, func: &FunctionValue, args: Vec<Value>, loc: crate::token::Location) -> EvalResult {
        let file = self.current_file();
        if args.len() > func.params.len() {
            return Err(Signal::Err(
                LuniteError::function(format!(
                    "expected at most {} argument(s), got {}",
                    func.params.len(),
                    args.len()
                ))
                .locate(&file, loc),
            ));
        }
        let call_env = Environment::with_parent(func.closure.clone());
        for (i, (name, default)) in func.params.iter().enumerate() {
            let value = if let Some(v) = args.get(i) {
                v.clone()
            } else if let Some(default_expr) = default {
                self.eval_node(default_expr, &call_env, &func.closure)?
            } else {
                return Err(Signal::Err(
                    LuniteError::function(format!("missing argument '{}'", name)).locate(&file, loc),
                ));
            };
            call_env.define(name.clone(), value);
        }
        let body_stmts = block_stmts(&func.body);
        match self.exec_stmts(body_stmts, &call_env, &func.closure) {
            Err(Signal::Return(v)) => Ok(v),
            other => other,
        }
    }

    fn new_instance(&self, class_val: Value, args: Vec<Value>, loc: crate::token::Location) -> EvalResult {
        let file = self.current_file();
        let class = match class_val {
            Value::Class(c) => c,
            other => {
                return Err(Signal::Err(
                    LuniteError::class(format!("'{}' is not a class", other.type_name())).locate(&file, loc),
                ))
            }
        };
        let instance = InstanceValue::new(class.clone());
        if let Some(init) = class.borrow().find_method("init") {
            // init's arity must match exactly -- no default-filling, unlike
            // ordinary calls (spec 4.3).
            if args.len() != init.params.len() {
                return Err(Signal::Err(
                    LuniteError::function(format!(
                        "'init' expects {} argument(s), got {}",
                        init.params.len(),
                        args.len()
                    ))
                    .locate(&file, loc),
                ));
            }
            let bound = bind_method(&init, Value::Instance(instance.clone()));
            self.call_user_function(Rc::new(bound), args, loc)?;
        } else if !args.is_empty() {
            return Err(Signal::Err(
                LuniteError::class("class has no 'init' method to accept arguments").locate(&file, loc),
            ));
        }
        Ok(Value::Instance(instance))
    }

    /// Resolves a class's flattened member table by walking its superclass
    /// chain once (spec 3.5). Resolved eagerly at `class` definition time
    /// rather than lazily on first `new` -- see DESIGN.md.
    fn resolve_class(
        &self,
        def: &crate::ast::ClassDef,
        loc: crate::token::Location,
        env: &EnvRef,
        globals: &EnvRef,
    ) -> Result<crate::class::ClassRef, Signal> {
        let file = self.current_file();
        let superclass = match &def.superclass {
            Some(name) => match env.get(name) {
                Some(Value::Class(c)) => Some(c),
                Some(other) => {
                    return Err(Signal::Err(
                        LuniteError::class(format!("'{}' is not a class", other.type_name())).locate(&file, loc),
                    ))
                }
                None => {
                    return Err(Signal::Err(
                        LuniteError::class(format!("undefined superclass '{}'", name)).locate(&file, loc),
                    ))
                }
            },
            None => None,
        };

        let (mut fields, mut methods) = match &superclass {
            Some(c) => (c.borrow().fields.clone(), c.borrow().methods.clone()),
            None => (HashMap::new(), HashMap::new()),
        };

        let field_env = Environment::with_parent(globals.clone());
        for stmt in &def.body {
            match &stmt.kind {
                NodeKind::FunctionDef(fdef) => {
                    let func = FunctionValue::from_def(fdef, globals.clone(), file.clone());
                    methods.insert(fdef.name.clone(), Rc::new(func));
                }
                NodeKind::VarDecl { name, value, .. } => {
                    let v = self.eval_node(value, &field_env, globals)?;
                    fields.insert(name.clone(), v);
                }
                _ => {
                    self.eval_node(stmt, &field_env, globals)?;
                }
            }
        }

        Ok(Rc::new(std::cell::RefCell::new(ClassValue {
            name: def.name.clone(),
            superclass,
            fields,
            methods,
        })))
    }
}

/// Binds `this` into a fresh environment parented to the method's own
/// closure, producing an ordinary callable `FunctionValue` (spec 4.3: method
/// calls "bind `this` in a fresh environment parented to global").
fn bind_method(method: &FunctionValue, this: Value) -> FunctionValue {
    let bound_env = Environment::with_parent(method.closure.clone());
    bound_env.define("this", this);
    FunctionValue {
        name: method.name.clone(),
        params: method.params.clone(),
        body: method.body.clone(),
        closure: bound_env,
        file: method.file.clone(),
    }
}

fn block_stmts(node: &Node) -> &[Node] {
    match &node.kind {
        NodeKind::Block(stmts) => stmts,
        _ => std::slice::from_ref(node),
    }
}

fn find_leap_target(stmts: &[Node], target: &LeapTarget) -> Option<usize> {
    stmts.iter().position(|s| match target {
        LeapTarget::Label(name) => matches!(&s.kind, NodeKind::LabelDef(n) if n == name),
        LeapTarget::Line(line) => s.line() as i64 == *line,
    })
}

fn module_alias(module: &str) -> String {
    std::path::Path::new(module)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| module.to_string())
}

/// `x is T` does not walk the inheritance chain: a subclass instance is not
/// `is` its superclass's name (spec 9, documented open question/limitation).
fn matches_type(v: &Value, type_name: &str) -> bool {
    if let Value::Instance(inst) = v {
        return inst.borrow().class.borrow().name == type_name;
    }
    v.type_name() == type_name
}

fn eval_unary(op: UnOp, v: Value) -> Result<Value, String> {
    match op {
        UnOp::Not => Ok(Value::Bool(!v.is_truthy())),
        UnOp::Neg => match v {
            Value::Int(n) => Ok(Value::Int(-n)),
            Value::Float(n) => Ok(Value::Float(-n)),
            Value::Bit(n) | Value::Byte(n) => Ok(Value::Int(-n)),
            other => Err(format!("cannot negate {}", other.type_name())),
        },
        UnOp::BitNot => match v.as_int() {
            Some(n) => Ok(Value::Int(!n)),
            None => Err(format!("cannot apply ~ to {}", v.type_name())),
        },
    }
}

enum Num {
    Int(i64),
    Float(f64),
}

fn to_num(v: &Value) -> Option<Num> {
    match v {
        Value::Int(n) | Value::Bit(n) | Value::Byte(n) => Some(Num::Int(*n)),
        Value::Float(n) => Some(Num::Float(*n)),
        _ => None,
    }
}

fn num_f64(n: &Num) -> f64 {
    match n {
        Num::Int(i) => *i as f64,
        Num::Float(f) => *f,
    }
}

/// Applies a binary operator to two already-evaluated values (spec 4.3).
fn eval_binary_value(op: BinOp, l: Value, r: Value) -> Result<Value, String> {
    match op {
        BinOp::Eq => return Ok(Value::Bool(values_equal(&l, &r))),
        BinOp::NotEq => return Ok(Value::Bool(!values_equal(&l, &r))),
        _ => {}
    }

    // String concatenation is the one non-numeric `+` (needed by f-string
    // desugaring's left-fold of `str(...)` calls).
    if op == BinOp::Add {
        if let (Value::String(a), Value::String(b)) = (&l, &r) {
            return Ok(Value::String(format!("{}{}", a, b)));
        }
    }

    if matches!(op, BinOp::Gt | BinOp::Lt) {
        if let (Value::String(a), Value::String(b)) = (&l, &r) {
            return Ok(Value::Bool(if op == BinOp::Gt { a > b } else { a < b }));
        }
    }

    let (ln, rn) = match (to_num(&l), to_num(&r)) {
        (Some(a), Some(b)) => (a, b),
        _ => {
            return Err(format!(
                "unsupported operand types for {:?}: {} and {}",
                op,
                l.type_name(),
                r.type_name()
            ))
        }
    };

    match op {
        BinOp::Add => Ok(numeric_result(ln, rn, |a, b| a + b, |a, b| a.wrapping_add(b))),
        BinOp::Sub => Ok(numeric_result(ln, rn, |a, b| a - b, |a, b| a.wrapping_sub(b))),
        BinOp::Mul => Ok(numeric_result(ln, rn, |a, b| a * b, |a, b| a.wrapping_mul(b))),
        BinOp::Div => eval_div(ln, rn),
        BinOp::Mod => eval_mod(ln, rn),
        BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor | BinOp::Shl | BinOp::Shr => eval_bitwise(op, ln, rn),
        BinOp::Gt => Ok(Value::Bool(num_f64(&ln) > num_f64(&rn))),
        BinOp::Lt => Ok(Value::Bool(num_f64(&ln) < num_f64(&rn))),
        BinOp::Eq | BinOp::NotEq | BinOp::And | BinOp::Or => unreachable!("handled above or by caller"),
    }
}

fn numeric_result(l: Num, r: Num, ff: fn(f64, f64) -> f64, fi: fn(i64, i64) -> i64) -> Value {
    match (l, r) {
        (Num::Int(a), Num::Int(b)) => Value::Int(fi(a, b)),
        (a, b) => Value::Float(ff(num_f64(&a), num_f64(&b))),
    }
}

/// `/` is true division: float unless both operands are int and divide
/// evenly, in which case the result stays int (spec 4.3).
fn eval_div(l: Num, r: Num) -> Result<Value, String> {
    match (l, r) {
        (Num::Int(a), Num::Int(b)) => {
            if b == 0 {
                return Err("division by zero".to_string());
            }
            if a % b == 0 {
                Ok(Value::Int(a / b))
            } else {
                Ok(Value::Float(a as f64 / b as f64))
            }
        }
        (a, b) => {
            let bf = num_f64(&b);
            if bf == 0.0 {
                return Err("division by zero".to_string());
            }
            Ok(Value::Float(num_f64(&a) / bf))
        }
    }
}

/// `%` follows IEEE-fmod semantics: the sign of the result follows the
/// dividend (spec 4.3), which Rust's native `%` already implements for both
/// integers and floats.
fn eval_mod(l: Num, r: Num) -> Result<Value, String> {
    match (l, r) {
        (Num::Int(a), Num::Int(b)) => {
            if b == 0 {
                return Err("modulo by zero".to_string());
            }
            Ok(Value::Int(a % b))
        }
        (a, b) => {
            let bf = num_f64(&b);
            if bf == 0.0 {
                return Err("modulo by zero".to_string());
            }
            Ok(Value::Float(num_f64(&a) % bf))
        }
    }
}

fn eval_bitwise(op: BinOp, l: Num, r: Num) -> Result<Value, String> {
    let (a, b) = match (l, r) {
        (Num::Int(a), Num::Int(b)) => (a, b),
        _ => return Err(format!("{:?} requires integer operands", op)),
    };
    match op {
        BinOp::BitAnd => Ok(Value::Int(a & b)),
        BinOp::BitOr => Ok(Value::Int(a | b)),
        BinOp::BitXor => Ok(Value::Int(a ^ b)),
        BinOp::Shl | BinOp::Shr => {
            if b < 0 {
                return Err("shift amount must be non-negative".to_string());
            }
            let shift = (b as u32).min(63);
            Ok(Value::Int(if op == BinOp::Shl { a.wrapping_shl(shift) } else { a.wrapping_shr(shift) }))
        }
        _ => unreachable!(),
    }
}

/// Value equality (spec 4.3): deep for primitives/containers, identity for
/// instances (two distinct instances are never `==`, even with equal fields).
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Char(x), Value::Char(y)) => x == y,
        (Value::List(x), Value::List(y)) => {
            let (xb, yb) = (x.borrow(), y.borrow());
            xb.len() == yb.len() && xb.iter().zip(yb.iter()).all(|(a, b)| values_equal(a, b))
        }
        (Value::Tuple(x), Value::Tuple(y)) => {
            x.len() == y.len() && x.iter().zip(y.iter()).all(|(a, b)| values_equal(a, b))
        }
        (Value::Dict(x), Value::Dict(y)) => {
            let (xb, yb) = (x.borrow(), y.borrow());
            xb.len() == yb.len()
                && xb.iter().all(|(k, v)| yb.get(k).map(|v2| values_equal(v, v2)).unwrap_or(false))
        }
        (Value::Set(x), Value::Set(y)) => *x.borrow() == *y.borrow(),
        (Value::Instance(x), Value::Instance(y)) => Rc::ptr_eq(x, y),
        (Value::Class(x), Value::Class(y)) => Rc::ptr_eq(x, y),
        (Value::Function(x), Value::Function(y)) => Rc::ptr_eq(x, y),
        _ => {
            if let (Some(xn), Some(yn)) = (to_num(a), to_num(b)) {
                return num_f64(&xn) == num_f64(&yn);
            }
            false
        }
    }
}

fn eval_index(container: &Value, idx: &Value) -> Result<Value, LuniteError> {
    match container {
        Value::List(items) => {
            let items = items.borrow();
            let i = normalize_index(idx, items.len()).ok_or_else(|| LuniteError::index("list index out of range"))?;
            Ok(items[i].clone())
        }
        Value::Tuple(items) => {
            let i = normalize_index(idx, items.len()).ok_or_else(|| LuniteError::index("tuple index out of range"))?;
            Ok(items[i].clone())
        }
        Value::Dict(map) => {
            let key = DictKey::from_value(idx).ok_or_else(|| LuniteError::key("unhashable key"))?;
            map.borrow()
                .get(&key)
                .cloned()
                .ok_or_else(|| LuniteError::key(format!("key {} not found", key)))
        }
        Value::String(s) => {
            let chars: Vec<char> = s.chars().collect();
            let i = normalize_index(idx, chars.len()).ok_or_else(|| LuniteError::index("string index out of range"))?;
            Ok(Value::Char(chars[i]))
        }
        other => Err(LuniteError::index(format!("cannot index {}", other.type_name()))),
    }
}

fn assign_index(container: &Value, idx: &Value, value: Value) -> Result<(), LuniteError> {
    match container {
        Value::List(items) => {
            let mut items = items.borrow_mut();
            let i = normalize_index(idx, items.len()).ok_or_else(|| LuniteError::assignment("list index out of range"))?;
            items[i] = value;
            Ok(())
        }
        Value::Dict(map) => {
            let key = DictKey::from_value(idx).ok_or_else(|| LuniteError::key("unhashable key"))?;
            map.borrow_mut().insert(key, value);
            Ok(())
        }
        other => Err(LuniteError::assignment(format!("cannot assign into {}", other.type_name()))),
    }
}

fn normalize_index(idx: &Value, len: usize) -> Option<usize> {
    let i = idx.as_int()?;
    let i = if i < 0 { i + len as i64 } else { i };
    if i < 0 || i as usize >= len {
        None
    } else {
        Some(i as usize)
    }
}

/// Values a `for...in` loop can iterate: lists, tuples, sets, and dicts
/// (iterating a dict yields its keys, per spec 4.3's ordered-sequence rule).
fn iterate(v: &Value) -> Result<Vec<Value>, String> {
    match v {
        Value::List(items) => Ok(items.borrow().clone()),
        Value::Tuple(items) => Ok(items.to_vec()),
        Value::Set(items) => Ok(items.borrow().iter().cloned().map(DictKey::into_value).collect()),
        Value::Dict(map) => Ok(map.borrow().keys().cloned().map(DictKey::into_value).collect()),
        Value::String(s) => Ok(s.chars().map(Value::Char).collect()),
        other => Err(format!("cannot iterate over {}", other.type_name())),
    }
}

/// Values usable on the right of `let [a, b] = ...` (spec 4.2 destructuring).
fn destructure(v: &Value) -> Result<Vec<Value>, String> {
    match v {
        Value::List(items) => Ok(items.borrow().clone()),
        Value::Tuple(items) => Ok(items.to_vec()),
        other => Err(format!("cannot destructure {}", other.type_name())),
    }
}
