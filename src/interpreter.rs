// ABOUTME: Interpreter state: current environment, diagnostics label, module cache (spec 4.3)

use crate::class::{ClassValue, InstanceValue};
use crate::config::MAX_CALL_DEPTH;
use crate::env::{EnvRef, Environment};
use crate::error::{LuniteError, Signal};
use crate::host::{HostError, HostModuleRef};
use crate::parser::Parser;
use crate::prelude;
use crate::value::Value;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

type HostImporter = Box<dyn Fn(&str, Option<&str>) -> Result<HostModuleRef, HostError>>;

pub struct Interpreter {
    pub globals: EnvRef,
    current_file: RefCell<Rc<str>>,
    modules: RefCell<HashMap<PathBuf, Value>>,
    host_importer: RefCell<Option<HostImporter>>,
    call_depth: Cell<usize>,
}

impl Interpreter {
    pub fn new() -> Self {
        let globals = Environment::new();
        prelude::register(&globals);
        Interpreter {
            globals,
            current_file: RefCell::new(Rc::from("<script>")),
            modules: RefCell::new(HashMap::new()),
            host_importer: RefCell::new(None),
            call_depth: Cell::new(0),
        }
    }

    pub fn current_file(&self) -> Rc<str> {
        self.current_file.borrow().clone()
    }

    fn set_current_file(&self, file: Rc<str>) -> Rc<str> {
        self.current_file.replace(file)
    }

    /// Registers the sole host-module import extension point (spec 6's
    /// `import_py`). With none registered, `import_py` raises an `Import`
    /// error naming the module -- the documented inert default.
    pub fn register_host_importer<F>(&self, importer: F)
    where
        F: Fn(&str, Option<&str>) -> Result<HostModuleRef, HostError> + 'static,
    {
        *self.host_importer.borrow_mut() = Some(Box::new(importer));
    }

    pub fn call_depth(&self) -> usize {
        self.call_depth.get()
    }

    pub fn enter_call(&self, loc: crate::token::Location) -> Result<(), Signal> {
        if self.call_depth.get() >= MAX_CALL_DEPTH {
            return Err(Signal::Err(
                LuniteError::function("maximum call depth exceeded").locate(&self.current_file(), loc),
            ));
        }
        self.call_depth.set(self.call_depth.get() + 1);
        Ok(())
    }

    pub fn exit_call(&self) {
        self.call_depth.set(self.call_depth.get() - 1);
    }

    /// Runs a top-level source file: lexes, parses, and evaluates it against
    /// a fresh call to the interpreter's global environment.
    pub fn run_source(&self, source: &str, file: &str) -> Result<Value, LuniteError> {
        let prev = self.set_current_file(Rc::from(file));
        let result = self.run_source_inner(source);
        self.set_current_file(prev);
        result
    }

    fn run_source_inner(&self, source: &str) -> Result<Value, LuniteError> {
        let program = Parser::parse_source(source)?;
        let globals = self.globals.clone();
        match self.exec_stmts(&program, &globals, &globals) {
            Ok(v) => Ok(v),
            Err(Signal::Err(e)) => Err(e),
            // A bare top-level return/break/advance/leap has nowhere left to
            // unwind to; surface it as an internal error rather than panic.
            Err(other) => Err(LuniteError::internal(format!(
                "unhandled control signal at top level: {:?}",
                other
            ))),
        }
    }

    /// Resolves and loads a Lunite module (spec 4.3). Modules are loaded at
    /// most once per absolute path; the cached wrapper is reused and only
    /// the importer's local alias is rebound on subsequent imports.
    pub fn import_module(
        &self,
        module: &str,
        source_pkg: Option<&str>,
    ) -> Result<Value, LuniteError> {
        let path = self.resolve_module_path(module, source_pkg)?;

        if let Some(cached) = self.modules.borrow().get(&path) {
            return Ok(cached.clone());
        }

        let source = std::fs::read_to_string(&path)
            .map_err(|e| LuniteError::import(format!("cannot read module '{}': {}", path.display(), e)))?;

        let prev = self.set_current_file(Rc::from(path.to_string_lossy().as_ref()));
        let module_env = Environment::with_parent(self.globals.clone());
        let result = (|| -> Result<Value, LuniteError> {
            let program = Parser::parse_source(&source)?;
            match self.exec_stmts(&program, &module_env, &module_env) {
                Ok(_) => Ok(()),
                Err(Signal::Err(e)) => return Err(e),
                Err(_) => return Err(LuniteError::internal("unhandled control signal in module")),
            }?;
            Ok(wrap_module(&module_env))
        })();
        self.set_current_file(prev);

        let wrapper = result?;
        self.modules.borrow_mut().insert(path, wrapper.clone());
        Ok(wrapper)
    }

    pub fn import_host_module(
        &self,
        module: &str,
        source_pkg: Option<&str>,
    ) -> Result<Value, LuniteError> {
        match self.host_importer.borrow().as_ref() {
            Some(importer) => importer(module, source_pkg)
                .map(Value::HostModule)
                .map_err(|e| LuniteError::import(e.message)),
            None => Err(LuniteError::import(format!(
                "no host importer registered for '{}'",
                module
            ))),
        }
    }

    fn resolve_module_path(&self, module: &str, source_pkg: Option<&str>) -> Result<PathBuf, LuniteError> {
        let current = self.current_file();
        let base_dir = Path::new(current.as_ref())
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        let mut candidate = match source_pkg {
            Some(pkg) => base_dir.join(pkg).join(module),
            None => base_dir.join(module),
        };
        if candidate.extension().is_none() {
            candidate.set_extension(crate::config::MODULE_EXTENSION);
        }

        std::fs::canonicalize(&candidate)
            .map_err(|e| LuniteError::import(format!("module '{}' not found: {}", module, e)))
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

/// Wraps a module's top-level bindings as an instance-like value (spec 3.6,
/// spec 9 "module wrapper"): presenting module members through the same
/// member-access path as class instances avoids a second lookup path in the
/// evaluator.
fn wrap_module(env: &EnvRef) -> Value {
    let class = Rc::new(RefCell::new(ClassValue {
        name: "module".to_string(),
        superclass: None,
        fields: env.own_bindings(),
        methods: HashMap::new(),
    }));
    Value::Instance(InstanceValue::new(class))
}
