//! Classes, method tables and instances.

use crate::api::native::{FinalizerFn, ForeignClassMethods, ForeignMethodFn};
use crate::buffer::Buffer;
use crate::heap::ObjRef;
use crate::value::Value;
use crate::vm::core::Primitive;
use std::fmt;

/// One entry of a class's method table.
#[derive(Clone, Default)]
pub enum Method {
    /// No method bound for this symbol.
    #[default]
    None,
    /// Native engine code.
    Primitive(Primitive),
    /// `Fn.call(...)`: invoke the receiver closure with the arguments.
    FnCall,
    /// Host code bound through the foreign-method binder.
    Foreign(ForeignMethodFn),
    /// A closure compiled from script.
    Block(ObjRef),
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::None => f.write_str("None"),
            Method::Primitive(_) => f.write_str("Primitive"),
            Method::FnCall => f.write_str("FnCall"),
            Method::Foreign(_) => f.write_str("Foreign"),
            Method::Block(closure) => write!(f, "Block({})", closure.index()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ObjClass {
    /// Name string.
    pub name: ObjRef,
    pub superclass: Option<ObjRef>,
    /// Total field count, inherited fields included.
    pub num_fields: usize,
    /// Indexed by method symbol.
    pub methods: Buffer<Method>,
    /// Set for `foreign class` declarations.
    pub is_foreign: bool,
    pub foreign: ForeignClassMethods,
    /// Built-in classes whose instances have a native layout cannot be
    /// subclassed.
    pub sealed: bool,
}

impl ObjClass {
    pub fn new(name: ObjRef, num_fields: usize) -> Self {
        Self {
            name,
            superclass: None,
            num_fields,
            methods: Buffer::new(),
            is_foreign: false,
            foreign: ForeignClassMethods::default(),
            sealed: false,
        }
    }

    pub fn method(&self, symbol: usize) -> &Method {
        static NONE: Method = Method::None;
        self.methods.get(symbol).unwrap_or(&NONE)
    }

    /// Bind `method` at `symbol`, growing the table as needed.
    pub fn bind_method(&mut self, symbol: usize, method: Method) {
        if symbol >= self.methods.count() {
            let missing = symbol + 1 - self.methods.count();
            self.methods.fill(Method::None, missing);
        }
        self.methods[symbol] = method;
    }
}

#[derive(Debug, Clone)]
pub struct ObjInstance {
    pub fields: Box<[Value]>,
}

impl ObjInstance {
    pub fn new(num_fields: usize) -> Self {
        Self {
            fields: vec![Value::NULL; num_fields].into_boxed_slice(),
        }
    }
}

/// Instance of a foreign class: an opaque host payload.
pub struct ObjForeign {
    pub data: Box<[u8]>,
    /// Copied from the class at construction so the collector can finalize
    /// the instance even when its class dies in the same cycle.
    pub finalizer: Option<FinalizerFn>,
}

impl ObjForeign {
    pub fn new(size: usize, finalizer: Option<FinalizerFn>) -> Self {
        Self {
            data: vec![0; size].into_boxed_slice(),
            finalizer,
        }
    }

    /// Run the finalizer, at most once.
    pub fn finalize(&mut self) {
        if let Some(finalizer) = self.finalizer.take() {
            finalizer(&mut self.data);
        }
    }
}

impl fmt::Debug for ObjForeign {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjForeign")
            .field("size", &self.data.len())
            .field("has_finalizer", &self.finalizer.is_some())
            .finish()
    }
}
