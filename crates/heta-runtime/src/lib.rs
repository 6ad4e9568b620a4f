//! Heta runtime - an embeddable scripting virtual machine
//!
//! This library provides the complete engine:
//! - Value representation and the object heap
//! - A mark-sweep garbage collector driven by a host reallocator
//! - A single-pass compiler from source to bytecode
//! - The fiber-based interpreter and its core library
//! - The slot API through which host code exchanges values with scripts
//! - Module loading and foreign method/class binding
//!
//! # Examples
//!
//! ```
//! use heta_runtime::{Configuration, InterpretResult, Vm};
//! use std::sync::{Arc, Mutex};
//!
//! let output = Arc::new(Mutex::new(String::new()));
//! let sink = output.clone();
//! let config = Configuration::default()
//!     .with_write(move |text: &str| sink.lock().unwrap().push_str(text));
//!
//! let mut vm = Vm::new(config);
//! let result = vm.interpret("main", "System.print(1 + 2)");
//! assert_eq!(result, InterpretResult::Success);
//! assert_eq!(*output.lock().unwrap(), "3\n");
//! ```

/// Runtime version
pub const VERSION_STRING: &str = env!("CARGO_PKG_VERSION");

const VERSION_MAJOR: u32 = 0;
const VERSION_MINOR: u32 = 1;
const VERSION_PATCH: u32 = 0;

/// Version packed as `major * 1_000_000 + minor * 1_000 + patch`, so
/// releases compare numerically.
pub fn get_version_number() -> u32 {
    VERSION_MAJOR * 1_000_000 + VERSION_MINOR * 1_000 + VERSION_PATCH
}

/// Most top-level variables one module may define.
pub const MAX_MODULE_VARS: usize = 65536;
/// Most parameters a method or function may take.
pub const MAX_PARAMETERS: usize = 16;
/// Longest method name, in bytes.
pub const MAX_METHOD_NAME: usize = 64;
/// Longest variable name, in bytes.
pub const MAX_VARIABLE_NAME: usize = 64;
/// Most fields a class may have, inherited ones included.
pub const MAX_FIELDS: usize = 255;
/// Most local variables in scope in one function.
pub const MAX_LOCALS: usize = 256;
/// Most variables one function may capture.
pub const MAX_UPVALUES: usize = 256;
/// Most constants in one function's pool.
pub const MAX_CONSTANTS: usize = 1 << 16;

pub mod api;
pub mod config;
pub mod error;
pub mod value;
pub mod vm;

pub(crate) mod buffer;
pub(crate) mod bytecode;
pub(crate) mod compiler;
pub(crate) mod gc;
pub(crate) mod heap;
pub(crate) mod lexer;
pub(crate) mod module_loader;
pub(crate) mod object;
pub(crate) mod symbol;
pub(crate) mod token;
pub(crate) mod utils;

// Re-export commonly used types
pub use api::handle::Handle;
pub use api::native::{foreign_method, FinalizerFn, ForeignClassMethods, ForeignMethodFn};
pub use config::{
    Configuration, ErrorReporter, ForeignClassBinder, ForeignMethodBinder, HeapSettings,
    LoadModuleResult, ModuleLoader, ModuleResolver, OutputWriter, Reallocator,
};
pub use error::{ApiError, ApiResult, ErrorKind, InterpretResult, SlotType};
pub use heap::GcStats;
pub use vm::Vm;
