//! Heap object model
//!
//! Every heap object is an [`Obj`]: a small header (runtime class, mark bit,
//! accounted size) followed by one of the [`ObjKind`] payloads. Objects refer
//! to each other by [`ObjRef`] index into the heap arena, so cycles (a list
//! containing itself, a class and its metaclass) need no special handling.

mod class;
mod fiber;
mod function;
mod map;

pub use class::{Method, ObjClass, ObjForeign, ObjInstance};
pub use fiber::{FiberState, ObjFiber};
pub use function::{FnDebug, ObjClosure, ObjFn, ObjUpvalue};
pub use map::{ObjMap, Probe};

use crate::buffer::Buffer;
use crate::heap::ObjRef;
use crate::symbol::SymbolTable;
use crate::utils::hash_bytes;
use crate::value::Value;
use std::borrow::Cow;
use std::sync::Arc;

/// Header plus payload.
#[derive(Debug)]
pub struct Obj {
    /// Runtime class used for dispatch. `None` only for objects created
    /// before the core classes exist, and for modules and upvalues, which
    /// scripts never see.
    pub class: Option<ObjRef>,
    pub marked: bool,
    /// Bytes charged to the allocator for this object.
    pub size: usize,
    pub kind: ObjKind,
}

#[derive(Debug)]
pub enum ObjKind {
    String(ObjString),
    List(ObjList),
    Map(ObjMap),
    Range(ObjRange),
    Fn(Arc<ObjFn>),
    Closure(ObjClosure),
    Upvalue(ObjUpvalue),
    Class(ObjClass),
    Instance(ObjInstance),
    Foreign(ObjForeign),
    Fiber(ObjFiber),
    Module(ObjModule),
}

impl ObjKind {
    /// Short name for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            ObjKind::String(_) => "string",
            ObjKind::List(_) => "list",
            ObjKind::Map(_) => "map",
            ObjKind::Range(_) => "range",
            ObjKind::Fn(_) => "fn",
            ObjKind::Closure(_) => "closure",
            ObjKind::Upvalue(_) => "upvalue",
            ObjKind::Class(_) => "class",
            ObjKind::Instance(_) => "instance",
            ObjKind::Foreign(_) => "foreign",
            ObjKind::Fiber(_) => "fiber",
            ObjKind::Module(_) => "module",
        }
    }

    /// Estimated bytes retained by this payload plus the header.
    pub fn estimate_size(&self) -> usize {
        let payload = match self {
            ObjKind::String(s) => s.bytes.len(),
            ObjKind::List(list) => list.elements.byte_size(),
            ObjKind::Map(map) => map.byte_size(),
            ObjKind::Range(_) | ObjKind::Upvalue(_) => 0,
            ObjKind::Fn(function) => function.byte_size(),
            ObjKind::Closure(closure) => closure.upvalues.capacity() * std::mem::size_of::<ObjRef>(),
            ObjKind::Class(class) => class.methods.byte_size(),
            ObjKind::Instance(instance) => instance.fields.len() * std::mem::size_of::<Value>(),
            ObjKind::Foreign(foreign) => foreign.data.len(),
            ObjKind::Fiber(fiber) => fiber.byte_size(),
            ObjKind::Module(module) => {
                module.variables.capacity() * std::mem::size_of::<Value>()
                    + module.variable_names.byte_size()
            }
        };
        std::mem::size_of::<Obj>() + payload
    }

    /// Push every object this payload references onto `out`.
    pub fn children(&self, out: &mut Vec<ObjRef>) {
        fn value(v: Value, out: &mut Vec<ObjRef>) {
            if let Some(r) = v.try_object() {
                out.push(r);
            }
        }

        match self {
            ObjKind::String(_) | ObjKind::Range(_) | ObjKind::Foreign(_) => {}
            ObjKind::List(list) => list.elements.iter().for_each(|&v| value(v, out)),
            ObjKind::Map(map) => map.iter().for_each(|(k, v)| {
                value(k, out);
                value(v, out);
            }),
            ObjKind::Fn(function) => {
                function.constants.iter().for_each(|&v| value(v, out));
                out.push(function.module);
            }
            ObjKind::Closure(closure) => {
                out.push(closure.function);
                out.extend(closure.upvalues.iter().copied());
                out.extend(closure.method_class);
            }
            ObjKind::Upvalue(ObjUpvalue::Open { fiber, .. }) => out.push(*fiber),
            ObjKind::Upvalue(ObjUpvalue::Closed(v)) => value(*v, out),
            ObjKind::Class(class) => {
                out.push(class.name);
                out.extend(class.superclass);
                for method in class.methods.iter() {
                    if let Method::Block(closure) = method {
                        out.push(*closure);
                    }
                }
            }
            ObjKind::Instance(instance) => instance.fields.iter().for_each(|&v| value(v, out)),
            ObjKind::Fiber(fiber) => {
                fiber.stack.iter().for_each(|&v| value(v, out));
                for frame in &fiber.frames {
                    out.push(frame.closure);
                }
                out.extend(fiber.open_upvalues.iter().map(|&(_, upvalue)| upvalue));
                out.extend(fiber.caller);
                value(fiber.error, out);
            }
            ObjKind::Module(module) => {
                out.extend(module.name);
                module.variables.iter().for_each(|&v| value(v, out));
                out.extend(module.variable_names.iter());
            }
        }
    }
}

/// Immutable byte string with a cached hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjString {
    bytes: Box<[u8]>,
    hash: u32,
}

impl ObjString {
    pub fn new(bytes: impl Into<Box<[u8]>>) -> Self {
        let bytes = bytes.into();
        let hash = hash_bytes(&bytes);
        Self { bytes, hash }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn to_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.bytes).ok()
    }

    pub fn to_string_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.bytes)
    }

    pub fn hash(&self) -> u32 {
        self.hash
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ObjList {
    pub elements: Buffer<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObjRange {
    pub from: f64,
    pub to: f64,
    pub is_inclusive: bool,
}

/// A module's top-level variable namespace.
#[derive(Debug, Default)]
pub struct ObjModule {
    /// `None` for the core module.
    pub name: Option<ObjRef>,
    pub variables: Vec<Value>,
    pub variable_names: SymbolTable,
}

impl ObjModule {
    pub fn new(name: Option<ObjRef>) -> Self {
        Self {
            name,
            ..Self::default()
        }
    }
}
