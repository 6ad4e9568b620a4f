//! The core library: built-in classes and their native methods
//!
//! Bootstrapping wires the three root classes by hand (`Object`, `Class` and
//! `Object`'s metaclass), then creates every other built-in as an ordinary
//! subclass of `Object` and binds its primitives. Subclasses copy their
//! superclass's method table when created, so primitives are bound on a
//! class before anything inherits from it.
//!
//! ```text
//!        .------------------------------------. .====.
//!        |                  .---------------. | #    #
//!        v                  |               v | v    #
//!   .---------.   .-------------------.   .-------.  #
//!   | Object  |==>| Object metaclass  |==>| Class |=="
//!   '---------'   '-------------------'   '-------'
//!        ^                                 ^ ^
//!   .---------.   .-------------------.    | |
//!   |  List   |==>|  List metaclass   |----' |
//!   '---------'   '-------------------'      |
//! ```
//!
//! Single lines point to a superclass, double lines to a metaclass.

mod fiber;
mod format;
mod list;
mod map;
mod num;
mod object;
mod range;
mod string;
mod system;

pub(crate) use list::new_list;
pub(crate) use map::new_map;

use crate::heap::ObjRef;
use crate::module_loader;
use crate::object::{Method, ObjClass, ObjKind};
use crate::utils;
use crate::value::Value;
use crate::vm::Vm;

/// Why a primitive did not produce a value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Control {
    /// Abort the current fiber with this error value.
    Error(Value),
    /// The primitive switched `vm.fiber`; the interpreter reloads its frame.
    Switch,
}

pub(crate) type PrimResult = Result<Value, Control>;

/// Native method body. `args[0]` is the receiver.
pub(crate) type Primitive = fn(&mut Vm, &[Value]) -> PrimResult;

/// The built-in classes, resolved once at bootstrap.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CoreClasses {
    pub object: ObjRef,
    pub class: ObjRef,
    pub bool: ObjRef,
    pub fiber: ObjRef,
    pub fn_: ObjRef,
    pub list: ObjRef,
    pub map: ObjRef,
    pub null: ObjRef,
    pub num: ObjRef,
    pub range: ObjRef,
    pub string: ObjRef,
}

impl CoreClasses {
    /// Stand-in used only until `bootstrap` fills the real classes in.
    pub(crate) fn placeholder() -> Self {
        let none = ObjRef::from_index(0);
        Self {
            object: none,
            class: none,
            bool: none,
            fiber: none,
            fn_: none,
            list: none,
            map: none,
            null: none,
            num: none,
            range: none,
            string: none,
        }
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = ObjRef> {
        [
            self.object,
            self.class,
            self.bool,
            self.fiber,
            self.fn_,
            self.list,
            self.map,
            self.null,
            self.num,
            self.range,
            self.string,
        ]
        .into_iter()
    }

    /// Classes whose instances have a native layout. Scripts cannot
    /// subclass them.
    fn sealed(&self) -> [ObjRef; 10] {
        [
            self.class,
            self.bool,
            self.fiber,
            self.fn_,
            self.list,
            self.map,
            self.null,
            self.num,
            self.range,
            self.string,
        ]
    }
}

/// Build the core module. Runs once per VM with collection paused.
pub(crate) fn bootstrap(vm: &mut Vm) {
    vm.gc_paused += 1;

    let object = root_class(vm, "Object");
    vm.core.object = object;
    object::bind_object(vm, object);

    let class = root_class(vm, "Class");
    vm.core.class = class;
    vm.bind_superclass(class, object);
    object::bind_class(vm, class);

    let name = vm.heap.new_string(b"Object metaclass");
    let object_metaclass = vm.heap.insert(None, ObjKind::Class(ObjClass::new(name, 0)));
    vm.heap.get_mut(object).class = Some(object_metaclass);
    vm.heap.get_mut(object_metaclass).class = Some(class);
    vm.heap.get_mut(class).class = Some(class);
    vm.bind_superclass(object_metaclass, class);
    object::bind_object_metaclass(vm, object_metaclass);

    vm.core.bool = core_class(vm, "Bool");
    vm.core.fiber = core_class(vm, "Fiber");
    vm.core.fn_ = core_class(vm, "Fn");
    vm.core.null = core_class(vm, "Null");
    vm.core.num = core_class(vm, "Num");
    vm.core.string = core_class(vm, "String");
    vm.core.list = core_class(vm, "List");
    vm.core.map = core_class(vm, "Map");
    vm.core.range = core_class(vm, "Range");
    let system = core_class(vm, "System");

    // Strings created so far had no class to point at.
    let string_class = vm.core.string;
    let orphans: Vec<ObjRef> = vm
        .heap
        .refs()
        .filter(|&r| {
            matches!(vm.heap.kind(r), ObjKind::String(_)) && vm.heap.class_header(r).is_none()
        })
        .collect();
    for string in orphans {
        vm.heap.get_mut(string).class = Some(string_class);
    }
    vm.heap.set_string_class(string_class);

    object::bind_bool(vm);
    object::bind_null(vm);
    fiber::bind_fiber(vm);
    fiber::bind_fn(vm);
    num::bind(vm);
    string::bind(vm);
    list::bind(vm);
    map::bind(vm);
    range::bind(vm);
    system::bind(vm, system);

    for class in vm.core.sealed() {
        vm.heap.class_mut(class).sealed = true;
    }
    vm.gc_paused -= 1;
}

/// A class with no superclass or metaclass yet.
fn root_class(vm: &mut Vm, name: &str) -> ObjRef {
    let name_string = vm.heap.new_string(name.as_bytes());
    let class = vm.heap.insert(None, ObjKind::Class(ObjClass::new(name_string, 0)));
    define_core_variable(vm, name, class);
    class
}

/// An ordinary subclass of `Object` defined in the core module.
fn core_class(vm: &mut Vm, name: &str) -> ObjRef {
    let name_string = vm.heap.new_string(name.as_bytes());
    let class = vm.new_class(vm.core.object, 0, name_string);
    define_core_variable(vm, name, class);
    class
}

fn define_core_variable(vm: &mut Vm, name: &str, class: ObjRef) {
    let result =
        module_loader::define_variable(&mut vm.heap, vm.core_module, name, Value::object(class));
    debug_assert!(result.is_ok(), "core class {name} defined twice");
}

/// Bind a native method on `class`.
pub(super) fn primitive(vm: &mut Vm, class: ObjRef, signature: &str, body: Primitive) {
    let symbol = vm.method_names.ensure(&mut vm.heap, signature);
    vm.heap
        .class_mut(class)
        .bind_method(symbol, Method::Primitive(body));
}

/// Bind a static native method, which lives on the metaclass.
pub(super) fn static_primitive(vm: &mut Vm, class: ObjRef, signature: &str, body: Primitive) {
    let metaclass = vm.heap.class_header(class).unwrap_or(class);
    primitive(vm, metaclass, signature, body);
}

impl Vm {
    /// Create a class and its metaclass. `name` must already be rooted.
    pub(crate) fn new_class(&mut self, superclass: ObjRef, num_fields: usize, name: ObjRef) -> ObjRef {
        let metaclass_name = format!("{} metaclass", self.heap.string(name).to_string_lossy());
        let metaclass_name = self.new_string_value(&metaclass_name).as_object();
        let metaclass = self.allocate(
            Some(self.core.class),
            ObjKind::Class(ObjClass::new(metaclass_name, 0)),
        );
        // Metaclasses all inherit Class; they do not mirror the hierarchy.
        self.bind_superclass(metaclass, self.core.class);

        let class = self.allocate(
            Some(metaclass),
            ObjKind::Class(ObjClass::new(name, num_fields)),
        );
        self.bind_superclass(class, superclass);
        class
    }

    /// Link `subclass` under `superclass`, inheriting its fields and a copy
    /// of its method table.
    pub(crate) fn bind_superclass(&mut self, subclass: ObjRef, superclass: ObjRef) {
        let parent = self.heap.class(superclass);
        let methods = parent.methods.clone();
        let inherited_fields = parent.num_fields;

        let class = self.heap.class_mut(subclass);
        class.superclass = Some(superclass);
        class.num_fields += inherited_fields;
        for (symbol, method) in methods.into_vec().into_iter().enumerate() {
            if !matches!(method, Method::None) {
                class.bind_method(symbol, method);
            }
        }
    }

    /// Abort the current primitive with an error message.
    pub(crate) fn fail<T>(&mut self, message: &str) -> Result<T, Control> {
        Err(Control::Error(self.new_string_value(message)))
    }
}

// === Argument validation ===

pub(super) fn validate_num(vm: &mut Vm, arg: Value, name: &str) -> Result<f64, Control> {
    match arg.try_num() {
        Some(n) => Ok(n),
        None => vm.fail(&format!("{name} must be a number.")),
    }
}

pub(super) fn validate_int(vm: &mut Vm, arg: Value, name: &str) -> Result<f64, Control> {
    let n = validate_num(vm, arg, name)?;
    validate_int_value(vm, n, name)
}

pub(super) fn validate_int_value(vm: &mut Vm, n: f64, name: &str) -> Result<f64, Control> {
    if n.trunc() != n {
        return vm.fail(&format!("{name} must be an integer."));
    }
    Ok(n)
}

/// A possibly negative integer index into a sequence of `count` elements.
pub(super) fn validate_index(
    vm: &mut Vm,
    arg: Value,
    count: usize,
    name: &str,
) -> Result<usize, Control> {
    let n = validate_num(vm, arg, name)?;
    validate_index_value(vm, n, count, name)
}

pub(super) fn validate_index_value(
    vm: &mut Vm,
    n: f64,
    count: usize,
    name: &str,
) -> Result<usize, Control> {
    validate_int_value(vm, n, name)?;
    match utils::validate_index(count, n as i64) {
        Some(index) => Ok(index),
        None => vm.fail(&format!("{name} out of bounds.")),
    }
}

pub(super) fn validate_string(vm: &mut Vm, arg: Value, name: &str) -> Result<ObjRef, Control> {
    if vm.heap.is_string(arg) {
        Ok(arg.as_object())
    } else {
        vm.fail(&format!("{name} must be a string."))
    }
}

pub(super) fn validate_fn(vm: &mut Vm, arg: Value, name: &str) -> Result<ObjRef, Control> {
    if vm.heap.is_closure(arg) {
        Ok(arg.as_object())
    } else {
        vm.fail(&format!("{name} must be a function."))
    }
}

/// Resolve a range used as a subscript against a sequence of `count`
/// elements. Returns `(start, length, step)`.
pub(super) fn calculate_range(
    vm: &mut Vm,
    range: ObjRef,
    count: usize,
) -> Result<(usize, usize, isize), Control> {
    let range = *vm.heap.range(range);
    let length = count as f64;

    // An empty slice at the very end is allowed, so that `list[0..-1]` and
    // `list[0...list.count]` copy even an empty list.
    let empty_end = if range.is_inclusive { -1.0 } else { length };
    if range.from == length && range.to == empty_end {
        return Ok((0, 0, 0));
    }

    let from = validate_index_value(vm, range.from, count, "Range start")?;
    let mut to = validate_int_value(vm, range.to, "Range end")?;
    if to < 0.0 {
        to += length;
    }

    if !range.is_inclusive {
        if to == from as f64 {
            return Ok((from, 0, 0));
        }
        to += if to >= from as f64 { -1.0 } else { 1.0 };
    }

    if to < 0.0 || to >= length {
        return vm.fail("Range end out of bounds.");
    }
    let to = to as usize;
    let step = if from < to { 1 } else { -1 };
    Ok((from, from.abs_diff(to) + 1, step))
}

/// Indices selected by `calculate_range`.
pub(super) fn range_indices(start: usize, length: usize, step: isize) -> impl Iterator<Item = usize> {
    (0..length).map(move |i| (start as isize + i as isize * step) as usize)
}
