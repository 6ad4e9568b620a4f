//! The virtual machine
//!
//! A [`Vm`] owns everything a script can reach: the object heap, the module
//! registry, the method symbol table and the fibers. Nothing is global, so
//! any number of VMs can coexist in one process, each driven from one thread
//! at a time.
//!
//! Execution always happens on a fiber. `interpret` compiles a module into a
//! closure, wraps it in a fresh fiber and runs the interpreter loop in
//! [`dispatch`] until that fiber finishes, fails, or parks on a deferred
//! import. Re-entrant runs (a host `call` from inside a foreign method, a
//! core primitive invoking a script `toString`) save the current fiber and
//! API frame on a stack and restore them afterwards.

pub(crate) mod core;
mod dispatch;
mod frame;

pub use frame::CallFrame;

pub(crate) use self::core::CoreClasses;
pub(crate) use dispatch::RunOutcome;

use crate::api::handle::HandleTable;
use crate::api::native::ForeignMethodFn;
use crate::config::{Configuration, Hooks, SystemAllocator};
use crate::error::{ErrorKind, InterpretResult};
use crate::heap::{GcStats, Heap, ObjRef};
use crate::object::{ObjFiber, ObjKind, ObjModule};
use crate::symbol::SymbolTable;
use crate::value::Value;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::time::Instant;

/// Deepest call stack a single fiber may build.
pub const MAX_FRAMES: usize = 8192;

/// Deepest nesting of re-entrant runs: host calls from foreign methods and
/// script methods invoked by core primitives.
pub const MAX_NESTED_RUNS: usize = 64;

/// The window of a fiber's stack the slot API addresses. Slot 0 is
/// `stack[base]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ApiFrame {
    pub fiber: ObjRef,
    pub base: usize,
    /// Set while a foreign method or allocator runs; clear for the
    /// host's scratch window.
    pub foreign: bool,
}

/// State saved around a re-entrant run.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SavedContext {
    pub fiber: Option<ObjRef>,
    pub api: Option<ApiFrame>,
}

/// A fiber parked on a deferred module load.
#[derive(Debug, Clone)]
pub(crate) struct PendingImport {
    pub module: String,
    pub fiber: ObjRef,
}

/// Foreign method binder cache key: module, class, static flag, signature.
pub(crate) type ForeignKey = (String, String, bool, String);

/// An embeddable script virtual machine.
pub struct Vm {
    pub(crate) heap: Heap,
    /// Every method signature ever seen, shared by all classes.
    pub(crate) method_names: SymbolTable,
    pub(crate) modules: HashMap<String, ObjRef>,
    /// Nameless module holding the built-in classes.
    pub(crate) core_module: ObjRef,
    pub(crate) core: CoreClasses,
    /// Fiber currently executing, if any.
    pub(crate) fiber: Option<ObjRef>,
    pub(crate) api: Option<ApiFrame>,
    pub(crate) nested: Vec<SavedContext>,
    pub(crate) pending_imports: Vec<PendingImport>,
    pub(crate) handles: HandleTable,
    /// Values native code holds across an allocation.
    pub(crate) temp_roots: Vec<Value>,
    /// Module of the most recent `import`, read by `ImportVariable`.
    pub(crate) last_module: Option<ObjRef>,
    /// Collection is suppressed while non-zero.
    pub(crate) gc_paused: u32,
    pub(crate) gc_stress: bool,
    pub(crate) hooks: Hooks,
    pub(crate) foreign_methods: HashMap<ForeignKey, Option<ForeignMethodFn>>,
    pub(crate) user_data: Option<Box<dyn Any + Send>>,
    pub(crate) started: Instant,
    /// Set after an out-of-memory condition; every later entry point fails.
    pub(crate) poisoned: bool,
}

impl Vm {
    /// Create a VM and load the core library into it.
    pub fn new(config: Configuration) -> Self {
        let Configuration {
            reallocator,
            resolve_module,
            load_module,
            bind_foreign_method,
            bind_foreign_class,
            write,
            error,
            heap,
            gc_stress,
            user_data,
        } = config;

        let heap = Heap::new(heap, reallocator.unwrap_or_else(|| Box::new(SystemAllocator)));
        let mut vm = Vm {
            heap,
            method_names: SymbolTable::new(),
            modules: HashMap::new(),
            core_module: ObjRef::from_index(0),
            core: CoreClasses::placeholder(),
            fiber: None,
            api: None,
            nested: Vec::new(),
            pending_imports: Vec::new(),
            handles: HandleTable::default(),
            temp_roots: Vec::new(),
            last_module: None,
            gc_paused: 0,
            gc_stress,
            hooks: Hooks {
                resolve_module,
                load_module,
                bind_foreign_method,
                bind_foreign_class,
                write,
                error,
            },
            foreign_methods: HashMap::new(),
            user_data,
            started: Instant::now(),
            poisoned: false,
        };
        vm.core_module = vm.heap.insert(None, ObjKind::Module(ObjModule::new(None)));
        self::core::bootstrap(&mut vm);
        tracing::debug!(
            bytes_allocated = vm.heap.bytes_allocated(),
            objects = vm.heap.len(),
            "core library loaded"
        );
        vm
    }

    /// Compile `source` as (or into) the module `module` and run it.
    ///
    /// Running into an existing module adds to its variables, which is how a
    /// REPL keeps state between lines.
    ///
    /// A run that parks on a deferred import also returns `Success`; the
    /// rest of the module runs from [`Vm::complete_module_load`]. Check
    /// [`Vm::has_pending_imports`] to tell the two apart.
    pub fn interpret(&mut self, module: &str, source: &str) -> InterpretResult {
        if self.poisoned {
            return InterpretResult::RuntimeError;
        }
        let closure = self.compile_in_module(module, source);
        if self.check_out_of_memory() {
            return InterpretResult::RuntimeError;
        }
        let Some(closure) = closure else {
            return InterpretResult::CompileError;
        };
        let fiber = self.new_fiber(closure);
        self.run_entry(fiber)
    }

    /// Run `fiber` as a fresh top-level or re-entrant execution.
    pub(crate) fn run_entry(&mut self, fiber: ObjRef) -> InterpretResult {
        if self.nested.len() >= MAX_NESTED_RUNS {
            let error = self.heap.new_string(b"Stack overflow.");
            self.heap.fiber_mut(fiber).error = Value::object(error);
        }
        self.enter();
        let outcome = self.run_fiber(fiber, true);
        self.leave();
        match outcome {
            RunOutcome::Finished | RunOutcome::Parked => InterpretResult::Success,
            RunOutcome::Failed => InterpretResult::RuntimeError,
        }
    }

    /// Whether any fiber is parked waiting for [`Vm::complete_module_load`].
    pub fn has_pending_imports(&self) -> bool {
        !self.pending_imports.is_empty()
    }

    /// Save the running fiber and API frame before a re-entrant run.
    pub(crate) fn enter(&mut self) {
        self.nested.push(SavedContext {
            fiber: self.fiber,
            api: self.api,
        });
        self.api = None;
    }

    pub(crate) fn leave(&mut self) {
        if let Some(saved) = self.nested.pop() {
            self.fiber = saved.fiber;
            self.api = saved.api;
        }
    }

    /// A fiber that will run `closure` from its first instruction.
    pub(crate) fn new_fiber(&mut self, closure: ObjRef) -> ObjRef {
        let proto = self.heap.closure(closure).proto.clone();
        let frame = CallFrame {
            closure,
            proto,
            ip: 0,
            stack_start: 0,
        };
        self.allocate(
            Some(self.core.fiber),
            ObjKind::Fiber(ObjFiber::with_frame(Value::object(closure), frame)),
        )
    }

    /// Report an error through the host's reporter.
    pub(crate) fn report_error(
        &mut self,
        kind: ErrorKind,
        module: Option<&str>,
        line: Option<u32>,
        message: &str,
    ) {
        if let Some(reporter) = self.hooks.error.as_mut() {
            reporter.report(kind, module, line, message);
        }
    }

    /// Send script output to the host.
    pub(crate) fn write_output(&mut self, text: &str) {
        if let Some(writer) = self.hooks.write.as_mut() {
            writer.write(text);
        }
    }

    /// Poison the VM once the allocator has refused memory. Returns whether
    /// the VM is out of memory.
    pub(crate) fn check_out_of_memory(&mut self) -> bool {
        if !self.heap.out_of_memory() {
            return false;
        }
        if !self.poisoned {
            self.poisoned = true;
            tracing::error!(
                bytes_allocated = self.heap.bytes_allocated(),
                "out of memory; the VM can no longer run code"
            );
            self.report_error(ErrorKind::Runtime, None, None, "Out of memory.");
        }
        true
    }

    /// Class used to dispatch methods on `value`.
    pub(crate) fn class_of(&self, value: Value) -> ObjRef {
        if value.is_num() {
            self.core.num
        } else if value.is_object() {
            self.heap
                .class_header(value.as_object())
                .unwrap_or(self.core.object)
        } else if value.is_bool() {
            self.core.bool
        } else {
            self.core.null
        }
    }

    /// Name of `class` as text.
    pub(crate) fn class_name(&self, class: ObjRef) -> String {
        let name = self.heap.class(class).name;
        self.heap.string(name).to_string_lossy().into_owned()
    }

    /// Allocate a string value. May collect.
    pub(crate) fn new_string_value(&mut self, text: &str) -> Value {
        self.new_bytes_value(text.as_bytes())
    }

    pub(crate) fn new_bytes_value(&mut self, bytes: &[u8]) -> Value {
        let kind = ObjKind::String(crate::object::ObjString::new(bytes));
        let class = self.heap.string_class();
        Value::object(self.allocate(class, kind))
    }

    /// Keep `value` alive across allocations until the matching `pop_root`.
    pub(crate) fn push_root(&mut self, value: Value) {
        self.temp_roots.push(value);
    }

    pub(crate) fn pop_root(&mut self) {
        self.temp_roots.pop();
    }

    /// Collector statistics.
    pub fn gc_stats(&self) -> GcStats {
        GcStats {
            bytes_allocated: self.heap.bytes_allocated(),
            next_gc: self.heap.next_gc(),
            live_objects: self.heap.len(),
            ..self.heap.stats
        }
    }

    /// Host data attached to this VM, if it has type `T`.
    pub fn user_data<T: Any>(&self) -> Option<&T> {
        self.user_data.as_ref()?.downcast_ref()
    }

    pub fn user_data_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.user_data.as_mut()?.downcast_mut()
    }

    /// Replace the host data, returning the previous value.
    pub fn set_user_data<T: Any + Send>(&mut self, data: T) -> Option<Box<dyn Any + Send>> {
        self.user_data.replace(Box::new(data))
    }
}

impl Drop for Vm {
    fn drop(&mut self) {
        tracing::debug!(objects = self.heap.len(), "freeing VM heap");
        self.heap.free_all();
    }
}

impl fmt::Debug for Vm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vm")
            .field("modules", &self.modules.keys().collect::<Vec<_>>())
            .field("objects", &self.heap.len())
            .field("bytes_allocated", &self.heap.bytes_allocated())
            .field("poisoned", &self.poisoned)
            .finish_non_exhaustive()
    }
}
