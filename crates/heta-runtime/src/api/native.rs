//! Foreign method and foreign class callbacks
//!
//! Host code plugs into scripts in two ways:
//!
//! - A `foreign` method declared in script is bound to a [`ForeignMethodFn`].
//!   When called, the receiver sits in slot 0 and the arguments in the
//!   following slots; the method writes its result into slot 0.
//! - A `foreign class` is bound to [`ForeignClassMethods`]: an `allocate`
//!   callback run on construction (it must call
//!   [`Vm::set_slot_new_foreign`](crate::Vm::set_slot_new_foreign) to create
//!   the payload in slot 0) and an optional finalizer run when the instance
//!   is collected.
//!
//! # Examples
//!
//! ```
//! use heta_runtime::api::native::{foreign_method, ForeignClassMethods};
//!
//! let add = foreign_method(|vm| {
//!     let a = vm.get_slot_double(1)?;
//!     let b = vm.get_slot_double(2)?;
//!     vm.set_slot_double(0, a + b)
//! });
//!
//! let point = ForeignClassMethods::new(foreign_method(|vm| {
//!     vm.set_slot_new_foreign(0, 0, 16)?;
//!     Ok(())
//! }))
//! .with_finalizer(|payload: &mut [u8]| payload.fill(0));
//! # let _ = (add, point);
//! ```

use crate::error::ApiResult;
use crate::vm::Vm;
use std::fmt;
use std::sync::Arc;

/// Host implementation of a `foreign` method.
///
/// Returning `Err` aborts the calling fiber with the error's message.
pub type ForeignMethodFn = Arc<dyn Fn(&mut Vm) -> ApiResult<()> + Send + Sync>;

/// Finalizer for a foreign instance's payload.
///
/// Runs during garbage collection with only the payload bytes; it cannot
/// reach the VM.
pub type FinalizerFn = Arc<dyn Fn(&mut [u8]) + Send + Sync>;

/// Wrap a closure as a [`ForeignMethodFn`].
pub fn foreign_method<F>(f: F) -> ForeignMethodFn
where
    F: Fn(&mut Vm) -> ApiResult<()> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Callbacks bound to a foreign class.
#[derive(Clone, Default)]
pub struct ForeignClassMethods {
    /// Run when script constructs an instance.
    pub allocate: Option<ForeignMethodFn>,
    /// Run once when an instance is collected or the VM is dropped.
    pub finalize: Option<FinalizerFn>,
}

impl ForeignClassMethods {
    pub fn new(allocate: ForeignMethodFn) -> Self {
        Self {
            allocate: Some(allocate),
            finalize: None,
        }
    }

    pub fn with_finalizer<F>(mut self, finalize: F) -> Self
    where
        F: Fn(&mut [u8]) + Send + Sync + 'static,
    {
        self.finalize = Some(Arc::new(finalize));
        self
    }
}

impl fmt::Debug for ForeignClassMethods {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForeignClassMethods")
            .field("allocate", &self.allocate.is_some())
            .field("finalize", &self.finalize.is_some())
            .finish()
    }
}
