//! The interpreter loop
//!
//! `run_fiber` executes bytecode on the current fiber until the chain it
//! started finishes, suspends back to the host, parks on a deferred import,
//! or fails. Hot state (closure, function body, instruction pointer, frame
//! base) lives in a [`Cursor`] and is written back to the fiber's top frame
//! whenever control may leave the loop: before calls into primitives or
//! host code, before pushing frames, and when an error is raised.

use super::core::Control;
use super::{ApiFrame, CallFrame, PendingImport, Vm, MAX_FRAMES, MAX_NESTED_RUNS};
use crate::api::native::ForeignMethodFn;
use crate::bytecode::{read_u16, Opcode};
use crate::error::ErrorKind;
use crate::heap::ObjRef;
use crate::module_loader::Import;
use crate::object::{
    FiberState, FnDebug, Method, ObjClosure, ObjFn, ObjInstance, ObjKind, ObjUpvalue,
};
use crate::value::Value;
use crate::{MAX_FIELDS, MAX_PARAMETERS};
use std::sync::Arc;

/// How a run of the interpreter ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RunOutcome {
    /// The fiber chain returned, or yielded back to the host.
    Finished,
    /// A fiber is waiting on `complete_module_load`.
    Parked,
    /// A runtime error reached the top of the chain.
    Failed,
}

/// What the loop does after an instruction.
enum Flow {
    Continue,
    /// The current frame or fiber changed.
    Reload,
    /// The run's root fiber returned.
    Done,
    Park,
}

struct Cursor {
    fiber: ObjRef,
    closure: ObjRef,
    proto: Arc<ObjFn>,
    ip: usize,
    base: usize,
}

impl Cursor {
    #[inline]
    fn byte(&mut self) -> usize {
        let byte = self.proto.code[self.ip];
        self.ip += 1;
        byte as usize
    }

    #[inline]
    fn short(&mut self) -> usize {
        let value = read_u16(&self.proto.code, self.ip);
        self.ip += 2;
        value as usize
    }

    fn constant(&self, index: usize) -> Value {
        self.proto.constants[index]
    }
}

impl Vm {
    /// Run `fiber` and whatever it switches to.
    ///
    /// With `report` unset an unhandled error stays on the failing fiber for
    /// the caller to pick up instead of going to the error reporter.
    pub(crate) fn run_fiber(&mut self, fiber: ObjRef, report: bool) -> RunOutcome {
        self.fiber = Some(fiber);
        let mut cursor = match self.resume(report) {
            Ok(cursor) => cursor,
            Err(outcome) => return outcome,
        };

        loop {
            if self.heap.out_of_memory() {
                self.check_out_of_memory();
                self.fiber = None;
                return RunOutcome::Failed;
            }

            let flow = match self.step(&mut cursor) {
                Ok(flow) => flow,
                Err(error) => {
                    self.save_ip(&cursor);
                    self.heap.fiber_mut(cursor.fiber).error = error;
                    Flow::Reload
                }
            };

            match flow {
                Flow::Continue => {}
                Flow::Reload => match self.resume(report) {
                    Ok(next) => cursor = next,
                    Err(outcome) => return outcome,
                },
                Flow::Done => return RunOutcome::Finished,
                Flow::Park => return RunOutcome::Parked,
            }
        }
    }

    /// Load the cursor for the current fiber, unwinding a pending error
    /// first.
    fn resume(&mut self, report: bool) -> Result<Cursor, RunOutcome> {
        loop {
            let Some(fiber) = self.fiber else {
                return Err(RunOutcome::Finished);
            };
            if !self.heap.fiber(fiber).has_error() {
                return self.load_cursor(fiber).ok_or(RunOutcome::Finished);
            }
            if !self.unwind(fiber) {
                if report {
                    self.report_runtime_error(fiber);
                }
                self.fiber = None;
                return Err(RunOutcome::Failed);
            }
        }
    }

    fn load_cursor(&self, fiber: ObjRef) -> Option<Cursor> {
        let frame = self.heap.fiber(fiber).frames.last()?;
        Some(Cursor {
            fiber,
            closure: frame.closure,
            proto: frame.proto.clone(),
            ip: frame.ip,
            base: frame.stack_start,
        })
    }

    fn save_ip(&mut self, cursor: &Cursor) {
        if let Some(frame) = self.heap.fiber_mut(cursor.fiber).frames.last_mut() {
            frame.ip = cursor.ip;
        }
    }

    /// Hand the error on `failed` up its chain of callers. Every fiber
    /// passed through is aborted with the same error. Returns true if a
    /// `try` caught it, in which case the catching caller is now current.
    fn unwind(&mut self, failed: ObjRef) -> bool {
        let error = self.heap.fiber(failed).error;
        let mut current = Some(failed);
        while let Some(fiber) = current {
            let state = self.heap.fiber_mut(fiber);
            state.error = error;
            let caught = state.state == FiberState::Try;
            state.state = FiberState::Done;
            let caller = state.caller.take();

            if caught {
                if let Some(caller) = caller {
                    if let Some(slot) = self.heap.fiber_mut(caller).stack.last_mut() {
                        *slot = error;
                    }
                    tracing::trace!(from = fiber.index(), to = caller.index(), "error caught by try");
                    self.fiber = Some(caller);
                    return true;
                }
            }
            current = caller;
        }
        false
    }

    fn report_runtime_error(&mut self, fiber: ObjRef) {
        let error = self.heap.fiber(fiber).error;
        let message = match self.heap.as_string(error) {
            Some(text) => text.to_string_lossy().into_owned(),
            None => "[error object]".to_string(),
        };
        self.report_error(ErrorKind::Runtime, None, None, &message);

        let trace: Vec<(String, u32, String)> = self
            .heap
            .fiber(fiber)
            .frames
            .iter()
            .rev()
            .filter_map(|frame| {
                // Frames in core code are not the user's concern.
                let name = self.heap.module(frame.proto.module).name?;
                Some((
                    self.heap.string(name).to_string_lossy().into_owned(),
                    frame.proto.debug.line_at(frame.ip),
                    frame.proto.debug.name.clone(),
                ))
            })
            .collect();
        for (module, line, function) in trace {
            self.report_error(ErrorKind::StackTrace, Some(&module), Some(line), &function);
        }
    }

    fn error_value(&mut self, message: &str) -> Value {
        self.new_string_value(message)
    }

    #[inline]
    fn push(&mut self, fiber: ObjRef, value: Value) {
        self.heap.fiber_mut(fiber).push(value);
    }

    #[inline]
    fn pop(&mut self, fiber: ObjRef) -> Value {
        self.heap.fiber_mut(fiber).pop()
    }

    #[inline]
    fn peek(&self, fiber: ObjRef, depth: usize) -> Value {
        self.heap.fiber(fiber).peek(depth)
    }

    /// Execute one instruction.
    fn step(&mut self, c: &mut Cursor) -> Result<Flow, Value> {
        let byte = c.byte() as u8;
        let op = match Opcode::try_from(byte) {
            Ok(op) => op,
            Err(byte) => return Err(self.error_value(&format!("Unknown opcode {byte:#04x}."))),
        };
        let fiber = c.fiber;

        match op {
            Opcode::Constant => {
                let index = c.short();
                self.push(fiber, c.constant(index));
            }
            Opcode::Null => self.push(fiber, Value::NULL),
            Opcode::False => self.push(fiber, Value::FALSE),
            Opcode::True => self.push(fiber, Value::TRUE),

            Opcode::LoadLocal => {
                let slot = c.base + c.byte();
                let value = self.heap.fiber(fiber).stack[slot];
                self.push(fiber, value);
            }
            Opcode::StoreLocal => {
                let slot = c.base + c.byte();
                let value = self.peek(fiber, 0);
                self.heap.fiber_mut(fiber).stack[slot] = value;
            }
            Opcode::LoadUpvalue => {
                let upvalue = self.heap.closure(c.closure).upvalues[c.byte()];
                let value = self.upvalue_get(upvalue);
                self.push(fiber, value);
            }
            Opcode::StoreUpvalue => {
                let upvalue = self.heap.closure(c.closure).upvalues[c.byte()];
                let value = self.peek(fiber, 0);
                self.upvalue_set(upvalue, value);
            }
            Opcode::LoadModuleVar => {
                let value = self.heap.module(c.proto.module).variables[c.short()];
                self.push(fiber, value);
            }
            Opcode::StoreModuleVar => {
                let slot = c.short();
                let value = self.peek(fiber, 0);
                self.heap.module_mut(c.proto.module).variables[slot] = value;
            }

            Opcode::LoadFieldThis => {
                let field = c.byte();
                let receiver = self.heap.fiber(fiber).stack[c.base];
                let index = self.field_index(c, receiver, field)?;
                let value = self.heap.instance(receiver.as_object()).fields[index];
                self.push(fiber, value);
            }
            Opcode::StoreFieldThis => {
                let field = c.byte();
                let receiver = self.heap.fiber(fiber).stack[c.base];
                let index = self.field_index(c, receiver, field)?;
                let value = self.peek(fiber, 0);
                self.heap.instance_mut(receiver.as_object()).fields[index] = value;
            }
            Opcode::LoadField => {
                let field = c.byte();
                let receiver = self.pop(fiber);
                let index = self.field_index(c, receiver, field)?;
                let value = self.heap.instance(receiver.as_object()).fields[index];
                self.push(fiber, value);
            }
            Opcode::StoreField => {
                let field = c.byte();
                let receiver = self.pop(fiber);
                let index = self.field_index(c, receiver, field)?;
                let value = self.peek(fiber, 0);
                self.heap.instance_mut(receiver.as_object()).fields[index] = value;
            }

            Opcode::Pop => {
                self.pop(fiber);
            }

            Opcode::Call | Opcode::Super => {
                let argc = c.byte();
                let symbol = c.short();
                return self.invoke(c, op == Opcode::Super, argc, symbol);
            }

            Opcode::Jump => {
                let offset = c.short();
                c.ip += offset;
            }
            Opcode::Loop => {
                let offset = c.short();
                c.ip -= offset;
            }
            Opcode::JumpIfFalse => {
                let offset = c.short();
                if self.pop(fiber).is_falsy() {
                    c.ip += offset;
                }
            }
            Opcode::And => {
                let offset = c.short();
                if self.peek(fiber, 0).is_falsy() {
                    c.ip += offset;
                } else {
                    self.pop(fiber);
                }
            }
            Opcode::Or => {
                let offset = c.short();
                if self.peek(fiber, 0).is_falsy() {
                    self.pop(fiber);
                } else {
                    c.ip += offset;
                }
            }

            Opcode::CloseUpvalue => {
                let top = self.heap.fiber(fiber).stack.len() - 1;
                self.close_upvalues(fiber, top);
                self.pop(fiber);
            }
            Opcode::Return => return Ok(self.return_from(c)),
            Opcode::Closure => {
                let index = c.short();
                self.make_closure(c, index);
            }

            Opcode::Construct => {
                let class = self.heap.fiber(fiber).stack[c.base].as_object();
                let num_fields = self.heap.class(class).num_fields;
                let instance = self.allocate(Some(class), ObjKind::Instance(ObjInstance::new(num_fields)));
                self.heap.fiber_mut(fiber).stack[c.base] = Value::object(instance);
            }
            Opcode::ForeignConstruct => self.foreign_construct(c)?,
            Opcode::Class => {
                let num_fields = c.byte();
                self.create_class(c, Some(num_fields))?;
            }
            Opcode::ForeignClass => self.create_class(c, None)?,
            Opcode::MethodInstance | Opcode::MethodStatic => {
                let symbol = c.short();
                self.bind_method_op(c, op == Opcode::MethodStatic, symbol)?;
            }

            Opcode::EndModule => {
                self.last_module = Some(c.proto.module);
                self.push(fiber, Value::NULL);
            }
            Opcode::ImportModule => {
                let index = c.short();
                let name = self.constant_text(c.constant(index));
                return self.import_op(c, &name);
            }
            Opcode::ImportVariable => {
                let index = c.short();
                let name = self.constant_text(c.constant(index));
                let Some(module) = self.last_module else {
                    return Err(self.error_value("No module has been imported."));
                };
                match self.import_variable(module, &name) {
                    Ok(value) => self.push(fiber, value),
                    Err(message) => return Err(self.error_value(&message)),
                }
            }
        }
        Ok(Flow::Continue)
    }

    fn constant_text(&self, value: Value) -> String {
        self.heap
            .as_string(value)
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Index of field `field` of the executing method's class in `receiver`.
    fn field_index(&mut self, c: &Cursor, receiver: Value, field: usize) -> Result<usize, Value> {
        if !self.heap.is_instance(receiver) {
            return Err(self.error_value("Only instances have fields."));
        }
        let inherited = self
            .heap
            .closure(c.closure)
            .method_class
            .and_then(|class| self.heap.class(class).superclass)
            .map_or(0, |superclass| self.heap.class(superclass).num_fields);
        let index = inherited + field;
        if index >= self.heap.instance(receiver.as_object()).fields.len() {
            return Err(self.error_value("Field index out of range."));
        }
        Ok(index)
    }

    fn no_method_error(&mut self, class: ObjRef, symbol: usize) -> Value {
        let signature = self.method_names.name(&self.heap, symbol).into_owned();
        let message = format!("{} does not implement '{signature}'.", self.class_name(class));
        self.error_value(&message)
    }

    fn invoke(&mut self, c: &mut Cursor, is_super: bool, argc: usize, symbol: usize) -> Result<Flow, Value> {
        let fiber = c.fiber;
        let arg_start = self.heap.fiber(fiber).stack.len() - argc - 1;
        let receiver = self.heap.fiber(fiber).stack[arg_start];

        let class = if is_super {
            self.heap
                .closure(c.closure)
                .method_class
                .and_then(|class| self.heap.class(class).superclass)
                .unwrap_or_else(|| self.class_of(receiver))
        } else {
            self.class_of(receiver)
        };

        match self.heap.class(class).method(symbol).clone() {
            Method::None => Err(self.no_method_error(class, symbol)),
            Method::Primitive(primitive) => {
                let mut args = [Value::NULL; MAX_PARAMETERS + 1];
                args[..=argc].copy_from_slice(&self.heap.fiber(fiber).stack[arg_start..]);
                self.save_ip(c);
                match primitive(self, &args[..=argc]) {
                    Ok(result) => {
                        let stack = &mut self.heap.fiber_mut(fiber).stack;
                        stack[arg_start] = result;
                        stack.truncate(arg_start + 1);
                        Ok(Flow::Continue)
                    }
                    Err(Control::Error(error)) => Err(error),
                    Err(Control::Switch) => Ok(Flow::Reload),
                }
            }
            Method::FnCall => {
                let closure = receiver.as_object();
                let proto = self.heap.closure(closure).proto.clone();
                if argc < proto.arity {
                    return Err(self.error_value("Function expects more arguments."));
                }
                // Surplus arguments are dropped.
                self.heap
                    .fiber_mut(fiber)
                    .stack
                    .truncate(arg_start + 1 + proto.arity);
                self.push_frame(c, closure, proto, arg_start)
            }
            Method::Foreign(method) => {
                self.save_ip(c);
                self.call_foreign(fiber, &method, arg_start)?;
                Ok(Flow::Continue)
            }
            Method::Block(closure) => {
                let proto = self.heap.closure(closure).proto.clone();
                self.push_frame(c, closure, proto, arg_start)
            }
        }
    }

    fn push_frame(
        &mut self,
        c: &Cursor,
        closure: ObjRef,
        proto: Arc<ObjFn>,
        stack_start: usize,
    ) -> Result<Flow, Value> {
        if self.heap.fiber(c.fiber).frames.len() >= MAX_FRAMES {
            return Err(self.error_value("Stack overflow."));
        }
        self.save_ip(c);
        let fiber = self.heap.fiber_mut(c.fiber);
        fiber.ensure_stack(stack_start, proto.max_slots);
        fiber.frames.push(CallFrame {
            closure,
            proto,
            ip: 0,
            stack_start,
        });
        self.grew(c.fiber);
        Ok(Flow::Reload)
    }

    /// Run host code with the slots starting at `base` as its API frame. The
    /// result is left in `stack[base]` with everything above it discarded.
    pub(crate) fn call_foreign(
        &mut self,
        fiber: ObjRef,
        method: &ForeignMethodFn,
        base: usize,
    ) -> Result<(), Value> {
        let saved = self.api.replace(ApiFrame {
            fiber,
            base,
            foreign: true,
        });
        let result = method(self);
        self.api = saved;

        if let Err(error) = result {
            return Err(self.error_value(&error.to_string()));
        }
        // `abort_fiber` leaves its error on the fiber.
        let error = self.heap.fiber(fiber).error;
        if !error.is_null() {
            return Err(error);
        }

        let stack = &mut self.heap.fiber_mut(fiber).stack;
        stack.truncate(base + 1);
        if stack.len() <= base {
            stack.resize(base + 1, Value::NULL);
        }
        Ok(())
    }

    fn return_from(&mut self, c: &Cursor) -> Flow {
        let fiber = c.fiber;
        let result = self.pop(fiber);
        self.close_upvalues(fiber, c.base);

        let state = self.heap.fiber_mut(fiber);
        state.frames.pop();
        if !state.frames.is_empty() {
            state.stack.truncate(c.base);
            state.push(result);
            return Flow::Reload;
        }

        state.state = FiberState::Done;
        state.stack.clear();
        match state.caller.take() {
            None => {
                // Kept in slot 0 for whoever started the run.
                state.push(result);
                Flow::Done
            }
            Some(caller) => {
                if let Some(slot) = self.heap.fiber_mut(caller).stack.last_mut() {
                    *slot = result;
                }
                tracing::trace!(from = fiber.index(), to = caller.index(), "fiber finished");
                self.fiber = Some(caller);
                Flow::Reload
            }
        }
    }

    fn upvalue_get(&self, upvalue: ObjRef) -> Value {
        match *self.heap.upvalue(upvalue) {
            ObjUpvalue::Open { fiber, slot } => self.heap.fiber(fiber).stack[slot],
            ObjUpvalue::Closed(value) => value,
        }
    }

    fn upvalue_set(&mut self, upvalue: ObjRef, value: Value) {
        match *self.heap.upvalue(upvalue) {
            ObjUpvalue::Open { fiber, slot } => self.heap.fiber_mut(fiber).stack[slot] = value,
            ObjUpvalue::Closed(_) => *self.heap.upvalue_mut(upvalue) = ObjUpvalue::Closed(value),
        }
    }

    /// The open upvalue for `slot`, created if no closure captured it yet.
    fn capture_upvalue(&mut self, fiber: ObjRef, slot: usize) -> ObjRef {
        let open = &self.heap.fiber(fiber).open_upvalues;
        match open.binary_search_by_key(&slot, |&(s, _)| s) {
            Ok(i) => open[i].1,
            Err(i) => {
                let upvalue = self.allocate(None, ObjKind::Upvalue(ObjUpvalue::Open { fiber, slot }));
                self.heap
                    .fiber_mut(fiber)
                    .open_upvalues
                    .insert(i, (slot, upvalue));
                upvalue
            }
        }
    }

    /// Close every open upvalue at or above stack slot `from`.
    fn close_upvalues(&mut self, fiber: ObjRef, from: usize) {
        let state = self.heap.fiber_mut(fiber);
        let split = state.open_upvalues.partition_point(|&(slot, _)| slot < from);
        if split == state.open_upvalues.len() {
            return;
        }
        let closing: Vec<(usize, ObjRef)> = state.open_upvalues.drain(split..).collect();
        for (slot, upvalue) in closing {
            let value = self.heap.fiber(fiber).stack[slot];
            *self.heap.upvalue_mut(upvalue) = ObjUpvalue::Closed(value);
        }
    }

    fn make_closure(&mut self, c: &mut Cursor, index: usize) {
        let function = c.constant(index).as_object();
        let proto = self.heap.function(function).clone();
        let method_class = self.heap.closure(c.closure).method_class;
        let num_upvalues = proto.num_upvalues;

        let closure = self.allocate(
            Some(self.core.fn_),
            ObjKind::Closure(ObjClosure {
                function,
                proto,
                upvalues: Vec::with_capacity(num_upvalues),
                method_class,
            }),
        );
        // On the stack before capturing so a collection cannot free it.
        self.push(c.fiber, Value::object(closure));

        for _ in 0..num_upvalues {
            let is_local = c.byte() != 0;
            let index = c.byte();
            let upvalue = if is_local {
                self.capture_upvalue(c.fiber, c.base + index)
            } else {
                self.heap.closure(c.closure).upvalues[index]
            };
            self.heap.closure_mut(closure).upvalues.push(upvalue);
        }
    }

    fn foreign_construct(&mut self, c: &Cursor) -> Result<(), Value> {
        let fiber = c.fiber;
        let class = self.heap.fiber(fiber).stack[c.base].as_object();
        let Some(allocate) = self.heap.class(class).foreign.allocate.clone() else {
            let message = format!("Foreign class '{}' has no allocator.", self.class_name(class));
            return Err(self.error_value(&message));
        };

        self.save_ip(c);
        let arity = c.proto.arity;
        let saved = self.api.replace(ApiFrame {
            fiber,
            base: c.base,
            foreign: true,
        });
        let result = allocate(self);
        self.api = saved;
        if let Err(error) = result {
            return Err(self.error_value(&error.to_string()));
        }

        let instance = self.heap.fiber(fiber).stack[c.base];
        if !self.heap.is_foreign(instance) {
            let message = format!(
                "Allocator for foreign class '{}' did not create an instance.",
                self.class_name(class)
            );
            return Err(self.error_value(&message));
        }
        // The constructor body expects exactly its receiver and arguments.
        self.heap
            .fiber_mut(fiber)
            .stack
            .truncate(c.base + arity + 1);
        Ok(())
    }

    /// `Class`/`ForeignClass`: turn `[name, superclass]` into a new class.
    fn create_class(&mut self, c: &Cursor, num_fields: Option<usize>) -> Result<(), Value> {
        let fiber = c.fiber;
        let name = self.peek(fiber, 1);
        let superclass = self.peek(fiber, 0);
        let class_name = self.constant_text(name);

        if let Some(message) = self.inheritance_error(&class_name, superclass, num_fields) {
            return Err(self.error_value(&message));
        }

        let superclass = superclass.as_object();
        let class = self.new_class(superclass, num_fields.unwrap_or(0), name.as_object());
        if num_fields.is_none() {
            let module = self.module_name(c.proto.module);
            let methods = self
                .hooks
                .bind_foreign_class
                .as_mut()
                .and_then(|binder| binder.bind_foreign_class(&module, &class_name));
            tracing::debug!(
                module = %module,
                class = %class_name,
                found = methods.is_some(),
                "bound foreign class"
            );
            let class = self.heap.class_mut(class);
            class.is_foreign = true;
            if let Some(methods) = methods {
                class.foreign = methods;
            }
        }

        let state = self.heap.fiber_mut(fiber);
        state.pop();
        state.pop();
        state.push(Value::object(class));
        Ok(())
    }

    fn inheritance_error(&self, name: &str, superclass: Value, num_fields: Option<usize>) -> Option<String> {
        if !self.heap.is_class(superclass) {
            return Some(format!("Class '{name}' cannot inherit from a non-class object."));
        }
        let parent = self.heap.class(superclass.as_object());
        let parent_name = self.class_name(superclass.as_object());
        if parent.sealed {
            return Some(format!(
                "Class '{name}' cannot inherit from built-in class '{parent_name}'."
            ));
        }
        if parent.is_foreign {
            return Some(format!(
                "Class '{name}' cannot inherit from foreign class '{parent_name}'."
            ));
        }
        match num_fields {
            None if parent.num_fields > 0 => Some(format!(
                "Foreign class '{name}' may not inherit from a class with fields."
            )),
            Some(own) if parent.num_fields + own > MAX_FIELDS => Some(format!(
                "Class '{name}' may not have more than {MAX_FIELDS} fields, including inherited ones."
            )),
            _ => None,
        }
    }

    /// `MethodInstance`/`MethodStatic`: bind `[method, class]`.
    fn bind_method_op(&mut self, c: &Cursor, is_static: bool, symbol: usize) -> Result<(), Value> {
        let fiber = c.fiber;
        let class = self.peek(fiber, 0).as_object();
        let method_value = self.peek(fiber, 1);
        let target = if is_static {
            self.heap.class_header(class).unwrap_or(class)
        } else {
            class
        };

        let method = if self.heap.is_string(method_value) {
            let signature = self.constant_text(method_value);
            let module = self.module_name(c.proto.module);
            let class_name = self.class_name(class);
            match self.find_foreign_method(&module, &class_name, is_static, &signature) {
                Some(method) => Method::Foreign(method),
                None => {
                    let message = format!(
                        "Could not find foreign method '{signature}' for class {class_name} in module '{module}'."
                    );
                    return Err(self.error_value(&message));
                }
            }
        } else {
            let closure = method_value.as_object();
            self.heap.closure_mut(closure).method_class = Some(target);
            Method::Block(closure)
        };

        self.heap.class_mut(target).bind_method(symbol, method);
        let state = self.heap.fiber_mut(fiber);
        state.pop();
        state.pop();
        Ok(())
    }

    /// Ask the host for a foreign method, remembering the answer.
    fn find_foreign_method(
        &mut self,
        module: &str,
        class: &str,
        is_static: bool,
        signature: &str,
    ) -> Option<ForeignMethodFn> {
        let key = (module.to_string(), class.to_string(), is_static, signature.to_string());
        if let Some(cached) = self.foreign_methods.get(&key) {
            return cached.clone();
        }
        let found = self
            .hooks
            .bind_foreign_method
            .as_mut()
            .and_then(|binder| binder.bind_foreign_method(module, class, is_static, signature));
        tracing::debug!(module, class, is_static, signature, found = found.is_some(), "bound foreign method");
        self.foreign_methods.insert(key, found.clone());
        found
    }

    fn import_op(&mut self, c: &mut Cursor, name: &str) -> Result<Flow, Value> {
        let fiber = c.fiber;
        match self.import_module(c.proto.module, name) {
            Import::Loaded(module) => {
                self.last_module = Some(module);
                self.push(fiber, Value::NULL);
                Ok(Flow::Continue)
            }
            Import::Run(closure) => {
                self.push(fiber, Value::object(closure));
                let proto = self.heap.closure(closure).proto.clone();
                let stack_start = self.heap.fiber(fiber).stack.len() - 1;
                self.push_frame(c, closure, proto, stack_start)
            }
            Import::Failed(message) => Err(self.error_value(&message)),
            Import::Deferred(module) => {
                if self.nested.len() > 1 {
                    let message =
                        format!("Cannot wait for module '{module}' inside a nested call.");
                    return Err(self.error_value(&message));
                }
                self.save_ip(c);
                self.heap.fiber_mut(fiber).state = FiberState::AwaitingImport;
                tracing::debug!(module = %module, fiber = fiber.index(), "fiber waiting on module load");
                self.pending_imports.push(PendingImport { module, fiber });
                self.fiber = None;
                Ok(Flow::Park)
            }
        }
    }

    /// A closure in the core module whose body is a single call of `symbol`
    /// with `argc` arguments on whatever sits in its slots.
    pub(crate) fn call_stub(&mut self, argc: usize, symbol: usize, name: &str) -> ObjRef {
        let symbol = symbol as u16;
        let code = vec![
            Opcode::Call as u8,
            argc as u8,
            (symbol >> 8) as u8,
            (symbol & 0xff) as u8,
            Opcode::Return as u8,
        ];
        let lines = vec![0u32; code.len()];
        let proto = Arc::new(ObjFn {
            code: code.into(),
            constants: Vec::new(),
            module: self.core_module,
            arity: argc,
            num_upvalues: 0,
            max_slots: argc + 1,
            debug: FnDebug {
                name: name.to_string(),
                lines: lines.into(),
            },
        });
        let function = self.allocate(None, ObjKind::Fn(proto.clone()));
        self.push_root(Value::object(function));
        let closure = self.allocate(
            Some(self.core.fn_),
            ObjKind::Closure(ObjClosure {
                function,
                proto,
                upvalues: Vec::new(),
                method_class: None,
            }),
        );
        self.pop_root();
        closure
    }

    /// Run `stub` on a fresh fiber with `slots` as its receiver and
    /// arguments, nested inside whatever is running now.
    ///
    /// Returns the result, or the error the fiber failed with.
    pub(crate) fn run_nested(&mut self, stub: ObjRef, slots: &[Value], report: bool) -> Result<Value, Value> {
        if self.nested.len() >= MAX_NESTED_RUNS {
            if report {
                self.report_error(ErrorKind::Runtime, None, None, "Stack overflow.");
            }
            return Err(self.error_value("Stack overflow."));
        }

        let roots = self.temp_roots.len();
        self.temp_roots.extend_from_slice(slots);
        self.push_root(Value::object(stub));
        let fiber = self.new_fiber(stub);
        self.temp_roots.truncate(roots);

        let state = self.heap.fiber_mut(fiber);
        state.stack.clear();
        state.stack.extend_from_slice(slots);

        self.enter();
        let outcome = self.run_fiber(fiber, report);
        self.leave();

        let state = self.heap.fiber(fiber);
        match outcome {
            RunOutcome::Failed => Err(state.error),
            RunOutcome::Finished | RunOutcome::Parked if state.state == FiberState::Done => {
                Ok(state.stack.first().copied().unwrap_or(Value::NULL))
            }
            RunOutcome::Finished | RunOutcome::Parked => Ok(Value::NULL),
        }
    }

    /// Invoke `symbol` on `receiver` from native code.
    pub(crate) fn call_method_value(
        &mut self,
        receiver: Value,
        symbol: usize,
        args: &[Value],
    ) -> Result<Value, Value> {
        let class = self.class_of(receiver);
        let mut slots = Vec::with_capacity(args.len() + 1);
        slots.push(receiver);
        slots.extend_from_slice(args);

        match self.heap.class(class).method(symbol).clone() {
            Method::None => Err(self.no_method_error(class, symbol)),
            Method::Primitive(primitive) => match primitive(self, &slots) {
                Ok(value) => Ok(value),
                Err(Control::Error(error)) => Err(error),
                Err(Control::Switch) => Err(self.error_value("Cannot switch fibers inside a nested call.")),
            },
            Method::FnCall | Method::Foreign(_) | Method::Block(_) => {
                let roots = self.temp_roots.len();
                self.temp_roots.extend_from_slice(&slots);
                let name = self.method_names.name(&self.heap, symbol).into_owned();
                let stub = self.call_stub(args.len(), symbol, &name);
                self.temp_roots.truncate(roots);
                self.run_nested(stub, &slots, false)
            }
        }
    }
}
