//! VM configuration and host capability traits
//!
//! A [`Configuration`] gathers everything the host supplies when creating a
//! VM. Each capability is an independent trait object and may be left out;
//! the documented default applies when it is:
//!
//! | capability            | default                                |
//! |-----------------------|----------------------------------------|
//! | [`Reallocator`]       | [`SystemAllocator`], never refuses     |
//! | [`ModuleResolver`]    | identity: the import name is canonical |
//! | [`ModuleLoader`]      | every import fails to load             |
//! | [`ForeignMethodBinder`] | no foreign methods                   |
//! | [`ForeignClassBinder`]  | no foreign classes                   |
//! | [`OutputWriter`]      | output is dropped                      |
//! | [`ErrorReporter`]     | errors are dropped                     |
//!
//! Every trait has a blanket implementation for closures of the matching
//! shape, so most hosts just pass closures to the `with_*` builders.
//!
//! # Examples
//!
//! ```
//! use heta_runtime::{Configuration, ErrorKind, Vm};
//!
//! let config = Configuration::new()
//!     .with_write(|text: &str| print!("{text}"))
//!     .with_error(|kind: ErrorKind, module: Option<&str>, line: Option<u32>, message: &str| {
//!         eprintln!("{kind:?} {module:?}:{line:?} {message}");
//!     })
//!     .with_min_heap_size(64 * 1024);
//! let vm = Vm::new(config);
//! # drop(vm);
//! ```

use crate::api::native::{ForeignClassMethods, ForeignMethodFn};
use crate::error::ErrorKind;
use heta_config::ProjectConfig;
use std::any::Any;
use std::fmt;

/// Default heap size before the first collection: 10 MiB.
pub const DEFAULT_INITIAL_HEAP_SIZE: usize = 10 * 1024 * 1024;
/// Default floor for the collection threshold: 1 MiB.
pub const DEFAULT_MIN_HEAP_SIZE: usize = 1024 * 1024;
/// Default heap growth after a collection, in percent.
pub const DEFAULT_HEAP_GROWTH_PERCENT: usize = 50;

/// Memory budget hook.
///
/// The engine reports every change in heap usage, sized in bytes. Returning
/// `false` for a request that grows (`new_size > old_size`) signals
/// out-of-memory, which is fatal for the VM. Frees (`new_size == 0`) cannot
/// fail.
pub trait Reallocator: Send {
    fn reallocate(&mut self, old_size: usize, new_size: usize) -> bool;
}

impl<F> Reallocator for F
where
    F: FnMut(usize, usize) -> bool + Send,
{
    fn reallocate(&mut self, old_size: usize, new_size: usize) -> bool {
        self(old_size, new_size)
    }
}

/// The default allocator: Rust's global allocator does the work, so every
/// request is granted.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemAllocator;

impl Reallocator for SystemAllocator {
    fn reallocate(&mut self, _old_size: usize, _new_size: usize) -> bool {
        true
    }
}

/// Maps an import name, relative to the importing module, to a canonical
/// module name. `None` means the import cannot be resolved.
pub trait ModuleResolver: Send {
    fn resolve_module(&mut self, importer: &str, name: &str) -> Option<String>;
}

impl<F> ModuleResolver for F
where
    F: FnMut(&str, &str) -> Option<String> + Send,
{
    fn resolve_module(&mut self, importer: &str, name: &str) -> Option<String> {
        self(importer, name)
    }
}

/// What a [`ModuleLoader`] has for a module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadModuleResult {
    /// The source is available now.
    Source(String),
    /// The source will arrive later through
    /// [`Vm::complete_module_load`](crate::Vm::complete_module_load). The
    /// importing fiber is parked until then.
    Deferred,
    /// No such module.
    NotFound,
}

/// Supplies module source for a canonical module name.
pub trait ModuleLoader: Send {
    fn load_module(&mut self, name: &str) -> LoadModuleResult;
}

impl<F> ModuleLoader for F
where
    F: FnMut(&str) -> LoadModuleResult + Send,
{
    fn load_module(&mut self, name: &str) -> LoadModuleResult {
        self(name)
    }
}

/// Resolves a `foreign` method declaration to host code.
///
/// `signature` is the method's full signature, such as `add(_,_)`, `count`,
/// `[_]=(_)` or `init new(_)`.
pub trait ForeignMethodBinder: Send {
    fn bind_foreign_method(
        &mut self,
        module: &str,
        class_name: &str,
        is_static: bool,
        signature: &str,
    ) -> Option<ForeignMethodFn>;
}

impl<F> ForeignMethodBinder for F
where
    F: FnMut(&str, &str, bool, &str) -> Option<ForeignMethodFn> + Send,
{
    fn bind_foreign_method(
        &mut self,
        module: &str,
        class_name: &str,
        is_static: bool,
        signature: &str,
    ) -> Option<ForeignMethodFn> {
        self(module, class_name, is_static, signature)
    }
}

/// Resolves a `foreign class` declaration to its allocate/finalize pair.
pub trait ForeignClassBinder: Send {
    fn bind_foreign_class(&mut self, module: &str, class_name: &str) -> Option<ForeignClassMethods>;
}

impl<F> ForeignClassBinder for F
where
    F: FnMut(&str, &str) -> Option<ForeignClassMethods> + Send,
{
    fn bind_foreign_class(&mut self, module: &str, class_name: &str) -> Option<ForeignClassMethods> {
        self(module, class_name)
    }
}

/// Receives text printed by `System.print` and `System.write`.
pub trait OutputWriter: Send {
    fn write(&mut self, text: &str);
}

impl<F> OutputWriter for F
where
    F: FnMut(&str) + Send,
{
    fn write(&mut self, text: &str) {
        self(text)
    }
}

/// Receives compile errors, runtime errors and stack trace lines.
///
/// `Compile` and `StackTrace` reports carry a module and line; `Runtime`
/// reports carry neither.
pub trait ErrorReporter: Send {
    fn report(&mut self, kind: ErrorKind, module: Option<&str>, line: Option<u32>, message: &str);
}

impl<F> ErrorReporter for F
where
    F: FnMut(ErrorKind, Option<&str>, Option<u32>, &str) + Send,
{
    fn report(&mut self, kind: ErrorKind, module: Option<&str>, line: Option<u32>, message: &str) {
        self(kind, module, line, message)
    }
}

/// Heap tuning knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapSettings {
    /// Bytes allocated before the first collection.
    pub initial_heap_size: usize,
    /// The collection threshold never drops below this.
    pub min_heap_size: usize,
    /// After a collection the threshold becomes live bytes plus this percent.
    pub heap_growth_percent: usize,
}

impl Default for HeapSettings {
    fn default() -> Self {
        Self {
            initial_heap_size: DEFAULT_INITIAL_HEAP_SIZE,
            min_heap_size: DEFAULT_MIN_HEAP_SIZE,
            heap_growth_percent: DEFAULT_HEAP_GROWTH_PERCENT,
        }
    }
}

/// Everything needed to create a [`Vm`](crate::Vm).
#[derive(Default)]
pub struct Configuration {
    pub reallocator: Option<Box<dyn Reallocator>>,
    pub resolve_module: Option<Box<dyn ModuleResolver>>,
    pub load_module: Option<Box<dyn ModuleLoader>>,
    pub bind_foreign_method: Option<Box<dyn ForeignMethodBinder>>,
    pub bind_foreign_class: Option<Box<dyn ForeignClassBinder>>,
    pub write: Option<Box<dyn OutputWriter>>,
    pub error: Option<Box<dyn ErrorReporter>>,
    pub heap: HeapSettings,
    /// Collect before every allocation. Slow; shakes out missing GC roots.
    pub gc_stress: bool,
    /// Arbitrary host data, reachable through `Vm::user_data`.
    pub user_data: Option<Box<dyn Any + Send>>,
}

impl Configuration {
    /// Configuration with every default.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply the `[vm]` section of a project's `heta.toml`.
    pub fn from_project(project: &ProjectConfig) -> Self {
        let mut config = Self::new();
        if let Some(vm) = &project.vm {
            if let Some(size) = vm.initial_heap_size {
                config.heap.initial_heap_size = size;
            }
            if let Some(size) = vm.min_heap_size {
                config.heap.min_heap_size = size;
            }
            if let Some(percent) = vm.heap_growth_percent {
                config.heap.heap_growth_percent = percent;
            }
            config.gc_stress = vm.gc_stress.unwrap_or(false);
        }
        config
    }

    pub fn with_reallocator(mut self, reallocator: impl Reallocator + 'static) -> Self {
        self.reallocator = Some(Box::new(reallocator));
        self
    }

    pub fn with_resolve_module<F>(mut self, resolver: F) -> Self
    where
        F: FnMut(&str, &str) -> Option<String> + Send + 'static,
    {
        self.resolve_module = Some(Box::new(resolver));
        self
    }

    pub fn with_load_module<F>(mut self, loader: F) -> Self
    where
        F: FnMut(&str) -> LoadModuleResult + Send + 'static,
    {
        self.load_module = Some(Box::new(loader));
        self
    }

    pub fn with_bind_foreign_method<F>(mut self, binder: F) -> Self
    where
        F: FnMut(&str, &str, bool, &str) -> Option<ForeignMethodFn> + Send + 'static,
    {
        self.bind_foreign_method = Some(Box::new(binder));
        self
    }

    pub fn with_bind_foreign_class<F>(mut self, binder: F) -> Self
    where
        F: FnMut(&str, &str) -> Option<ForeignClassMethods> + Send + 'static,
    {
        self.bind_foreign_class = Some(Box::new(binder));
        self
    }

    pub fn with_write<F>(mut self, writer: F) -> Self
    where
        F: FnMut(&str) + Send + 'static,
    {
        self.write = Some(Box::new(writer));
        self
    }

    pub fn with_error<F>(mut self, reporter: F) -> Self
    where
        F: FnMut(ErrorKind, Option<&str>, Option<u32>, &str) + Send + 'static,
    {
        self.error = Some(Box::new(reporter));
        self
    }

    pub fn with_initial_heap_size(mut self, bytes: usize) -> Self {
        self.heap.initial_heap_size = bytes;
        self
    }

    pub fn with_min_heap_size(mut self, bytes: usize) -> Self {
        self.heap.min_heap_size = bytes;
        self
    }

    pub fn with_heap_growth_percent(mut self, percent: usize) -> Self {
        self.heap.heap_growth_percent = percent;
        self
    }

    pub fn with_gc_stress(mut self, enabled: bool) -> Self {
        self.gc_stress = enabled;
        self
    }

    pub fn with_user_data<T: Any + Send>(mut self, data: T) -> Self {
        self.user_data = Some(Box::new(data));
        self
    }
}

impl fmt::Debug for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Configuration")
            .field("reallocator", &self.reallocator.is_some())
            .field("resolve_module", &self.resolve_module.is_some())
            .field("load_module", &self.load_module.is_some())
            .field("bind_foreign_method", &self.bind_foreign_method.is_some())
            .field("bind_foreign_class", &self.bind_foreign_class.is_some())
            .field("write", &self.write.is_some())
            .field("error", &self.error.is_some())
            .field("heap", &self.heap)
            .field("gc_stress", &self.gc_stress)
            .finish_non_exhaustive()
    }
}

/// Host capabilities as held by a running VM.
#[derive(Default)]
pub(crate) struct Hooks {
    pub resolve_module: Option<Box<dyn ModuleResolver>>,
    pub load_module: Option<Box<dyn ModuleLoader>>,
    pub bind_foreign_method: Option<Box<dyn ForeignMethodBinder>>,
    pub bind_foreign_class: Option<Box<dyn ForeignClassBinder>>,
    pub write: Option<Box<dyn OutputWriter>>,
    pub error: Option<Box<dyn ErrorReporter>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use heta_config::VmSection as VmConfig;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_avoid_thrashing() {
        let config = Configuration::new();
        assert_eq!(config.heap, HeapSettings::default());
        assert!(config.heap.heap_growth_percent >= 50);
        assert!(config.reallocator.is_none());
        assert!(!config.gc_stress);
    }

    #[test]
    fn project_vm_section_overrides_heap() {
        let project = ProjectConfig {
            vm: Some(VmConfig {
                min_heap_size: Some(4096),
                heap_growth_percent: Some(100),
                gc_stress: Some(true),
                ..VmConfig::default()
            }),
            ..ProjectConfig::default()
        };
        let config = Configuration::from_project(&project);
        assert_eq!(config.heap.min_heap_size, 4096);
        assert_eq!(config.heap.heap_growth_percent, 100);
        assert_eq!(config.heap.initial_heap_size, DEFAULT_INITIAL_HEAP_SIZE);
        assert!(config.gc_stress);
    }
}
