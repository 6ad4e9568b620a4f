//! Module registry, module variables and imports
//!
//! Every module is an [`ObjModule`] registered under its canonical name. A
//! new module starts with a copy of the core module's variables, so the
//! built-in classes are visible everywhere without an import.
//!
//! Imports go through the host: the resolver canonicalizes the name relative
//! to the importer, the loader supplies source (now, later, or never), and
//! the module body then runs as an ordinary call frame on the importing
//! fiber. A deferred load parks that fiber until
//! [`Vm::complete_module_load`] provides the source.

use crate::config::LoadModuleResult;
use crate::error::{ApiError, ApiResult, InterpretResult};
use crate::heap::{Heap, ObjRef};
use crate::object::{FiberState, ObjClosure, ObjKind, ObjModule};
use crate::value::Value;
use crate::vm::{CallFrame, PendingImport, Vm};
use crate::MAX_MODULE_VARS;

/// Why a module variable could not be defined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefineError {
    /// A real definition already exists at this symbol.
    AlreadyDefined(usize),
    /// The module has no room for another variable.
    TooManyVariables,
    /// A lowercase name was referenced before this definition. The value is
    /// stored anyway; the compiler reports the earlier use.
    UsedBeforeDefinition(usize),
}

/// Symbol of `name` in `module`, whether defined or only declared.
pub(crate) fn find_variable(heap: &Heap, module: ObjRef, name: &str) -> Option<usize> {
    heap.module(module).variable_names.find(heap, name)
}

/// Declare `name` implicitly, before its definition has been seen. The slot
/// holds `UNDEFINED` until a definition fills it.
pub(crate) fn declare_variable(
    heap: &mut Heap,
    module: ObjRef,
    name: &str,
) -> Result<usize, DefineError> {
    push_variable(heap, module, name, Value::UNDEFINED)
}

/// Define `name` with `value`, filling an implicit declaration if one exists.
pub(crate) fn define_variable(
    heap: &mut Heap,
    module: ObjRef,
    name: &str,
    value: Value,
) -> Result<usize, DefineError> {
    let Some(symbol) = find_variable(heap, module, name) else {
        return push_variable(heap, module, name, value);
    };

    let slot = &mut heap.module_mut(module).variables[symbol];
    if !slot.is_undefined() {
        return Err(DefineError::AlreadyDefined(symbol));
    }
    *slot = value;
    if is_lowercase(name) {
        Err(DefineError::UsedBeforeDefinition(symbol))
    } else {
        Ok(symbol)
    }
}

fn push_variable(
    heap: &mut Heap,
    module: ObjRef,
    name: &str,
    value: Value,
) -> Result<usize, DefineError> {
    if heap.module(module).variables.len() >= MAX_MODULE_VARS {
        return Err(DefineError::TooManyVariables);
    }
    let string = heap.new_string(name.as_bytes());
    let state = heap.module_mut(module);
    state.variables.push(value);
    let symbol = state.variable_names.push(string);
    heap.remeasure(module);
    Ok(symbol)
}

fn is_lowercase(name: &str) -> bool {
    name.bytes().next().is_some_and(|b| b.is_ascii_lowercase())
}

/// What an `import` statement found.
pub(crate) enum Import {
    /// Already loaded; only its variables are needed.
    Loaded(ObjRef),
    /// Freshly compiled; the closure runs the module body.
    Run(ObjRef),
    /// The host will supply the source later.
    Deferred(String),
    /// Import failed with this runtime error message.
    Failed(String),
}

impl Vm {
    /// A fresh module seeded with the core module's variables.
    pub(crate) fn new_module(&mut self, name: &str) -> ObjRef {
        let name = self.heap.new_string(name.as_bytes());
        let core = self.heap.module(self.core_module);
        let module = ObjModule {
            name: Some(name),
            variables: core.variables.clone(),
            variable_names: core.variable_names.clone(),
        };
        self.heap.insert(None, ObjKind::Module(module))
    }

    /// Name of `module`, empty for the core module.
    pub(crate) fn module_name(&self, module: ObjRef) -> String {
        match self.heap.module(module).name {
            Some(name) => self.heap.string(name).to_string_lossy().into_owned(),
            None => String::new(),
        }
    }

    /// Compile `source` into the module `name`, creating and registering the
    /// module if needed. Returns a closure that runs the module body.
    pub(crate) fn compile_in_module(&mut self, name: &str, source: &str) -> Option<ObjRef> {
        let (module, fresh) = match self.modules.get(name) {
            Some(&module) => (module, false),
            None => {
                let module = self.new_module(name);
                self.modules.insert(name.to_string(), module);
                (module, true)
            }
        };

        // The compiler holds raw references into the heap.
        self.gc_paused += 1;
        let function = crate::compiler::compile(self, module, name, source);
        self.gc_paused -= 1;

        let Some(function) = function else {
            if fresh {
                self.modules.remove(name);
            }
            return None;
        };
        tracing::debug!(module = name, bytes = source.len(), "compiled module");

        let proto = self.heap.function(function).clone();
        let closure = self.allocate(
            Some(self.core.fn_),
            ObjKind::Closure(ObjClosure {
                function,
                proto,
                upvalues: Vec::new(),
                method_class: None,
            }),
        );
        Some(closure)
    }

    /// Resolve, load and compile the module `name` imported from `importer`.
    pub(crate) fn import_module(&mut self, importer: ObjRef, name: &str) -> Import {
        let importer_name = self.module_name(importer);
        let resolved = match self.hooks.resolve_module.as_mut() {
            None => name.to_string(),
            Some(resolver) => match resolver.resolve_module(&importer_name, name) {
                Some(resolved) => resolved,
                None => {
                    return Import::Failed(format!(
                        "Could not resolve module '{name}' imported from '{importer_name}'."
                    ))
                }
            },
        };

        if let Some(&module) = self.modules.get(&resolved) {
            return Import::Loaded(module);
        }
        // Another fiber is already waiting on this module.
        if self.pending_imports.iter().any(|p| p.module == resolved) {
            return Import::Deferred(resolved);
        }

        let result = match self.hooks.load_module.as_mut() {
            Some(loader) => loader.load_module(&resolved),
            None => LoadModuleResult::NotFound,
        };
        match result {
            LoadModuleResult::NotFound => {
                Import::Failed(format!("Could not load module '{resolved}'."))
            }
            LoadModuleResult::Deferred => {
                tracing::debug!(module = %resolved, importer = %importer_name, "module load deferred");
                Import::Deferred(resolved)
            }
            LoadModuleResult::Source(source) => {
                tracing::debug!(module = %resolved, importer = %importer_name, "loading module");
                match self.compile_in_module(&resolved, &source) {
                    Some(closure) => Import::Run(closure),
                    None => Import::Failed(format!("Could not compile module '{resolved}'.")),
                }
            }
        }
    }

    /// Look up a variable imported from `module` by an `import ... for`.
    pub(crate) fn import_variable(&self, module: ObjRef, name: &str) -> Result<Value, String> {
        find_variable(&self.heap, module, name)
            .map(|symbol| self.heap.module(module).variables[symbol])
            .filter(|value| !value.is_undefined())
            .ok_or_else(|| {
                format!(
                    "Could not find a variable named '{name}' in module '{}'.",
                    self.module_name(module)
                )
            })
    }

    /// Supply the source of a module whose load the host deferred, and
    /// resume every fiber parked on it.
    ///
    /// `None` means the module could not be found after all; each waiting
    /// import fails with a runtime error.
    pub fn complete_module_load(&mut self, name: &str, source: Option<&str>) -> InterpretResult {
        if self.poisoned {
            return InterpretResult::RuntimeError;
        }
        if !self.pending_imports.iter().any(|p| p.module == name) {
            tracing::warn!(module = name, "no fiber is waiting on this module");
            return InterpretResult::Success;
        }

        // Waiting fibers stay rooted through the pending list while the
        // module compiles.
        let closure = source.and_then(|source| self.compile_in_module(name, source));
        let failure = match (source, closure) {
            (None, _) => Some((
                format!("Could not load module '{name}'."),
                InterpretResult::RuntimeError,
            )),
            (Some(_), None) => Some((
                format!("Could not compile module '{name}'."),
                InterpretResult::CompileError,
            )),
            (Some(_), Some(_)) => None,
        };

        let mut waiting = Vec::new();
        self.pending_imports.retain(|p: &PendingImport| {
            if p.module == name {
                waiting.push(p.fiber);
                false
            } else {
                true
            }
        });
        tracing::debug!(module = name, fibers = waiting.len(), "completing deferred module load");

        let roots = self.temp_roots.len();
        self.temp_roots
            .extend(waiting.iter().map(|&fiber| Value::object(fiber)));

        let mut result = InterpretResult::Success;
        for (i, &fiber) in waiting.iter().enumerate() {
            self.heap.fiber_mut(fiber).state = FiberState::Running;
            match (&failure, closure) {
                (Some((message, _)), _) => {
                    let error = self.heap.new_string(message.as_bytes());
                    self.heap.fiber_mut(fiber).error = Value::object(error);
                }
                (None, Some(closure)) if i == 0 => {
                    // The first waiter runs the module body.
                    let proto = self.heap.closure(closure).proto.clone();
                    let state = self.heap.fiber_mut(fiber);
                    state.push(Value::object(closure));
                    let stack_start = state.stack.len() - 1;
                    state.ensure_stack(stack_start, proto.max_slots);
                    state.frames.push(CallFrame {
                        closure,
                        proto,
                        ip: 0,
                        stack_start,
                    });
                    self.heap.remeasure(fiber);
                }
                (None, _) => {
                    // The rest re-run their import, which now finds the module.
                    if let Some(frame) = self.heap.fiber_mut(fiber).frames.last_mut() {
                        frame.ip -= 3;
                    }
                }
            }

            let outcome = self.run_entry(fiber);
            if result == InterpretResult::Success {
                result = match (&failure, outcome) {
                    (Some((_, kind)), _) => *kind,
                    (None, outcome) => outcome,
                };
            }
        }
        self.temp_roots.truncate(roots);
        result
    }

    /// Whether a module named `name` has been loaded.
    pub fn has_module(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    /// Whether `module` is loaded and defines a top-level variable `name`.
    pub fn has_variable(&self, module: &str, name: &str) -> bool {
        self.module_variable(module, name).is_ok()
    }

    pub(crate) fn module_variable(&self, module: &str, name: &str) -> ApiResult<Value> {
        let &module_ref = self
            .modules
            .get(module)
            .ok_or_else(|| ApiError::UnknownModule(module.to_string()))?;
        self.import_variable(module_ref, name)
            .map_err(|_| ApiError::UnknownVariable {
                module: module.to_string(),
                name: name.to_string(),
            })
    }
}
