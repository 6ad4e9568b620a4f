//! Source to bytecode compiler
//!
//! A single-pass Pratt compiler: there is no syntax tree. Tokens are pulled
//! from the [`Lexer`] one at a time and bytecode is emitted as each construct
//! is recognized.
//! - Every function being compiled (the module body, a method, a block
//!   argument) has its own [`FnCompiler`] on a stack; the innermost receives
//!   emitted code
//! - Locals are stack slots relative to the frame start; slot 0 is the
//!   receiver
//! - Top-level variables live in the module and are addressed by symbol
//! - Fields are numbered per class; the interpreter adds the inherited field
//!   count at run time
//!
//! Errors are reported through the VM's error callback as they are found. A
//! panic flag suppresses follow-on reports until the next statement boundary.
//! Any error discards the compiled result.

mod class;
mod expr;
mod stmt;

use crate::bytecode::{Chunk, Opcode};
use crate::error::ErrorKind;
use crate::heap::ObjRef;
use crate::lexer::{LexError, Lexer};
use crate::module_loader::{self, DefineError};
use crate::object::{FnDebug, ObjFn, ObjKind};
use crate::token::{Literal, Token, TokenKind};
use crate::value::Value;
use crate::vm::Vm;
use crate::{MAX_CONSTANTS, MAX_LOCALS, MAX_UPVALUES, MAX_VARIABLE_NAME};
use class::ClassInfo;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Compile `source` as the body of `module`.
///
/// Returns the module's top-level function, or `None` after reporting at
/// least one compile error.
pub(crate) fn compile(vm: &mut Vm, module: ObjRef, module_name: &str, source: &str) -> Option<ObjRef> {
    Compiler::new(vm, module, module_name, source).compile_module()
}

#[derive(Debug, Clone)]
struct Local {
    name: String,
    /// Scope depth the local was declared at
    depth: i32,
    /// Captured by a closure; must be closed rather than popped
    is_captured: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct UpvalueRef {
    /// Captures a local of the enclosing function (else one of its upvalues)
    is_local: bool,
    index: usize,
}

#[derive(Debug)]
struct LoopState {
    /// Offset of the first instruction of the loop
    start: usize,
    /// Operand of the jump that leaves the loop when the condition fails
    exit_jump: Option<usize>,
    /// Scope depth outside the body
    scope_depth: i32,
    /// Operands of `break` jumps, patched at the end of the loop
    breaks: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ConstKey {
    Num(u64),
    Str(Vec<u8>),
}

/// Per-function compilation state
struct FnCompiler {
    chunk: Chunk,
    locals: Vec<Local>,
    upvalues: Vec<UpvalueRef>,
    /// -1 at module level, where variables are module variables
    scope_depth: i32,
    num_slots: i32,
    max_slots: i32,
    loops: Vec<LoopState>,
    /// The class whose body is being compiled directly in this function
    class: Option<ClassInfo>,
    is_initializer: bool,
    arity: usize,
    constant_ids: HashMap<ConstKey, usize>,
}

/// How a name resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Variable {
    Local(usize),
    Upvalue(usize),
    Module(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SigKind {
    Method,
    Getter,
    Setter,
    Subscript,
    SubscriptSetter,
    Initializer,
}

/// A method signature. Its string form is the name used for symbol lookup:
/// `add(_,_)`, `count`, `count=(_)`, `[_]`, `[_]=(_)`, `init new(_)`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Signature {
    name: String,
    kind: SigKind,
    arity: usize,
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn params(f: &mut fmt::Formatter<'_>, count: usize, open: char, close: char) -> fmt::Result {
            write!(f, "{open}")?;
            for i in 0..count {
                if i > 0 {
                    f.write_str(",")?;
                }
                f.write_str("_")?;
            }
            write!(f, "{close}")
        }

        match self.kind {
            SigKind::Method => {
                f.write_str(&self.name)?;
                params(f, self.arity, '(', ')')
            }
            SigKind::Getter => f.write_str(&self.name),
            SigKind::Setter => write!(f, "{}=(_)", self.name),
            SigKind::Subscript => {
                f.write_str(&self.name)?;
                params(f, self.arity, '[', ']')
            }
            SigKind::SubscriptSetter => {
                f.write_str(&self.name)?;
                params(f, self.arity.saturating_sub(1), '[', ']')?;
                f.write_str("=(_)")
            }
            SigKind::Initializer => {
                write!(f, "init {}", self.name)?;
                params(f, self.arity, '(', ')')
            }
        }
    }
}

/// Whether `name` starts lowercase: such names inside a class body are
/// implicit calls on `this`.
fn is_local_name(name: &str) -> bool {
    name.as_bytes().first().is_some_and(u8::is_ascii_lowercase)
}

pub(crate) struct Compiler<'vm> {
    vm: &'vm mut Vm,
    module: ObjRef,
    module_name: String,
    lexer: Lexer,
    previous: Token,
    current: Token,
    next: Token,
    had_error: bool,
    panic_mode: bool,
    fns: Vec<FnCompiler>,
    /// First use of module variables referenced before any definition
    implicit_lines: HashMap<usize, u32>,
}

impl<'vm> Compiler<'vm> {
    fn new(vm: &'vm mut Vm, module: ObjRef, module_name: &str, source: &str) -> Self {
        let mut compiler = Self {
            vm,
            module,
            module_name: module_name.to_string(),
            lexer: Lexer::new(source),
            previous: Token::new(TokenKind::Line, "", 1),
            current: Token::new(TokenKind::Line, "", 1),
            next: Token::new(TokenKind::Line, "", 1),
            had_error: false,
            panic_mode: false,
            fns: Vec::new(),
            implicit_lines: HashMap::new(),
        };
        compiler.current = compiler.scan();
        compiler.next = compiler.scan();
        compiler
    }

    fn compile_module(mut self) -> Option<ObjRef> {
        self.begin_fn(false);
        self.ignore_newlines();

        while !self.match_kind(TokenKind::Eof) {
            self.definition();
            if !self.match_line() {
                self.consume(TokenKind::Eof, "Expect end of file.");
                break;
            }
            self.panic_mode = false;
        }

        self.emit_op(Opcode::EndModule);
        self.emit_op(Opcode::Return);
        self.check_implicit_variables();
        self.end_fn("(script)")
    }

    /// Report every module variable that was used but never defined.
    fn check_implicit_variables(&mut self) {
        let mut pending: Vec<(usize, u32)> = self.implicit_lines.iter().map(|(&s, &l)| (s, l)).collect();
        pending.sort_by_key(|&(symbol, line)| (line, symbol));
        for (symbol, line) in pending {
            let module = self.vm.heap.module(self.module);
            if !module.variables[symbol].is_undefined() {
                continue;
            }
            let name = module.variable_names.name(&self.vm.heap, symbol).into_owned();
            self.had_error = true;
            self.report(line, &format!("Error: Variable '{name}' is used but not defined."));
        }
    }

    // === Tokens ===

    fn scan(&mut self) -> Token {
        let token = self.lexer.next_token();
        for error in self.lexer.take_errors() {
            self.lex_error(error);
        }
        token
    }

    pub(super) fn advance(&mut self) {
        let scanned = self.scan();
        let next = std::mem::replace(&mut self.next, scanned);
        let current = std::mem::replace(&mut self.current, next);
        self.previous = current;
    }

    fn peek(&self) -> TokenKind {
        self.current.kind
    }

    fn peek_next(&self) -> TokenKind {
        self.next.kind
    }

    fn match_kind(&mut self, kind: TokenKind) -> bool {
        if self.current.kind != kind {
            return false;
        }
        self.advance();
        true
    }

    /// Consume one or more newlines.
    fn match_line(&mut self) -> bool {
        if !self.match_kind(TokenKind::Line) {
            return false;
        }
        while self.match_kind(TokenKind::Line) {}
        true
    }

    fn ignore_newlines(&mut self) {
        self.match_line();
    }

    /// Advance, reporting `message` if the consumed token is not `kind`.
    fn consume(&mut self, kind: TokenKind, message: &str) {
        self.advance();
        if self.previous.kind != kind {
            self.error(message);
            // Don't swallow a line break the caller may be looking for.
            if self.current.kind == kind {
                self.advance();
            }
        }
    }

    fn consume_line(&mut self, message: &str) {
        self.consume(TokenKind::Line, message);
        self.ignore_newlines();
    }

    /// Allow a method chain to continue on the next line.
    fn allow_line_before_dot(&mut self) {
        if self.peek() == TokenKind::Line && self.peek_next() == TokenKind::Dot {
            self.advance();
        }
    }

    // === Errors ===

    fn error(&mut self, message: &str) {
        let token = self.previous.clone();
        self.error_at(&token, message);
    }

    fn error_at(&mut self, token: &Token, message: &str) {
        self.had_error = true;
        // Error tokens were already reported by the lexer.
        if token.kind == TokenKind::Error || self.panic_mode {
            return;
        }
        self.panic_mode = true;

        let label = match token.kind {
            TokenKind::Line => "Error at newline".to_string(),
            TokenKind::Eof => "Error at end of file".to_string(),
            _ => format!("Error at '{}'", token.lexeme),
        };
        self.report(token.line, &format!("{label}: {message}"));
    }

    fn lex_error(&mut self, error: LexError) {
        self.had_error = true;
        self.panic_mode = true;
        self.report(error.line, &format!("Error: {}", error.message));
    }

    fn report(&mut self, line: u32, message: &str) {
        let module = self.module_name.clone();
        self.vm
            .report_error(ErrorKind::Compile, Some(&module), Some(line), message);
    }

    // === Functions ===

    fn begin_fn(&mut self, is_method: bool) {
        let is_module = self.fns.is_empty();
        // Slot 0 holds the receiver. Methods name it "this"; functions leave
        // it nameless so `this` resolves through the enclosing method.
        let receiver = Local {
            name: if is_method { "this" } else { "" }.to_string(),
            depth: -1,
            is_captured: false,
        };
        self.fns.push(FnCompiler {
            chunk: Chunk::new(),
            locals: vec![receiver],
            upvalues: Vec::new(),
            scope_depth: if is_module { -1 } else { 0 },
            num_slots: 1,
            max_slots: 1,
            loops: Vec::new(),
            class: None,
            is_initializer: false,
            arity: 0,
            constant_ids: HashMap::new(),
        });
    }

    /// Finish the innermost function. Inside another function, emits the
    /// `Closure` instruction that creates it there.
    fn end_fn(&mut self, name: &str) -> Option<ObjRef> {
        let compiled = self.fns.pop()?;
        if self.had_error {
            return None;
        }

        let function = ObjFn {
            code: compiled.chunk.code,
            constants: compiled.chunk.constants,
            module: self.module,
            arity: compiled.arity,
            num_upvalues: compiled.upvalues.len(),
            max_slots: compiled.max_slots.max(1) as usize,
            debug: FnDebug {
                name: name.to_string(),
                lines: compiled.chunk.lines,
            },
        };
        let function = self.vm.heap.insert(None, ObjKind::Fn(Arc::new(function)));

        if !self.fns.is_empty() {
            let constant = self.add_constant(Value::object(function));
            self.emit_short_arg(Opcode::Closure, constant);
            for upvalue in &compiled.upvalues {
                self.emit_byte(u8::from(upvalue.is_local));
                self.emit_byte(upvalue.index as u8);
            }
        }
        Some(function)
    }

    fn top(&self) -> usize {
        self.fns.len() - 1
    }

    fn fn_ref(&self) -> &FnCompiler {
        &self.fns[self.top()]
    }

    fn fn_mut(&mut self) -> &mut FnCompiler {
        let top = self.top();
        &mut self.fns[top]
    }

    // === Emission ===

    fn emit_byte_in(&mut self, index: usize, byte: u8) -> usize {
        let line = self.previous.line;
        self.fns[index].chunk.emit_u8(byte, line)
    }

    fn emit_byte(&mut self, byte: u8) -> usize {
        self.emit_byte_in(self.top(), byte)
    }

    fn emit_op_in(&mut self, index: usize, op: Opcode) -> usize {
        let offset = self.emit_byte_in(index, op as u8);
        self.adjust_slots(index, op.stack_effect());
        offset
    }

    fn emit_op(&mut self, op: Opcode) -> usize {
        self.emit_op_in(self.top(), op)
    }

    fn adjust_slots(&mut self, index: usize, effect: i32) {
        let compiled = &mut self.fns[index];
        compiled.num_slots += effect;
        compiled.max_slots = compiled.max_slots.max(compiled.num_slots);
    }

    /// Emit a u16 operand, reporting values that do not fit.
    fn emit_short(&mut self, value: usize) -> usize {
        let value = match u16::try_from(value) {
            Ok(value) => value,
            Err(_) => {
                self.error("Too many symbols referenced in one function.");
                u16::MAX
            }
        };
        let line = self.previous.line;
        self.fn_mut().chunk.emit_u16(value, line)
    }

    /// Emit an instruction with a byte operand, returning the operand offset.
    fn emit_byte_arg(&mut self, op: Opcode, arg: usize) -> usize {
        self.emit_op(op);
        self.emit_byte(arg as u8)
    }

    fn emit_short_arg(&mut self, op: Opcode, arg: usize) -> usize {
        self.emit_op(op);
        self.emit_short(arg)
    }

    /// `Call`/`Super` with `argc` arguments after the receiver.
    fn emit_call(&mut self, op: Opcode, argc: usize, symbol: usize) {
        self.emit_op(op);
        self.adjust_slots(self.top(), -(argc as i32));
        self.emit_byte(argc as u8);
        self.emit_short(symbol);
    }

    /// Emit a forward jump with a placeholder offset, returning its operand
    /// position for [`Compiler::patch_jump`].
    fn emit_jump(&mut self, op: Opcode) -> usize {
        self.emit_op(op);
        self.emit_short(0xffff)
    }

    fn patch_jump(&mut self, operand: usize) {
        if !self.fn_mut().chunk.patch_jump(operand) {
            self.error("Too much code to jump over.");
        }
    }

    /// Jump back to `start`.
    fn emit_loop(&mut self, start: usize) {
        self.emit_op(Opcode::Loop);
        let distance = self.fn_ref().chunk.offset() + 2 - start;
        if distance > usize::from(u16::MAX) {
            self.error("Loop body too large.");
        }
        self.emit_short(distance);
    }

    fn add_constant(&mut self, value: Value) -> usize {
        if self.fn_ref().chunk.constants.len() >= MAX_CONSTANTS {
            self.error(&format!("A function may only contain {MAX_CONSTANTS} unique constants."));
            return 0;
        }
        self.fn_mut().chunk.add_constant(value)
    }

    /// Constant index for a literal, reusing an equal one.
    fn literal_constant(&mut self, literal: &Literal) -> usize {
        let key = match literal {
            Literal::Num(n) => ConstKey::Num(n.to_bits()),
            Literal::Str(bytes) => ConstKey::Str(bytes.clone()),
            Literal::None => return self.add_constant(Value::NULL),
        };
        if let Some(&index) = self.fn_ref().constant_ids.get(&key) {
            return index;
        }

        let value = match literal {
            Literal::Num(n) => Value::num(*n),
            Literal::Str(bytes) => Value::object(self.vm.heap.new_string(bytes)),
            Literal::None => Value::NULL,
        };
        let index = self.add_constant(value);
        self.fn_mut().constant_ids.insert(key, index);
        index
    }

    fn emit_constant(&mut self, literal: &Literal) {
        let constant = self.literal_constant(literal);
        self.emit_short_arg(Opcode::Constant, constant);
    }

    // === Scopes and variables ===

    fn push_scope(&mut self) {
        self.fn_mut().scope_depth += 1;
    }

    fn pop_scope(&mut self) {
        let depth = self.fn_ref().scope_depth;
        let popped = self.discard_locals(depth);
        let compiled = self.fn_mut();
        compiled.locals.truncate(compiled.locals.len() - popped);
        compiled.num_slots -= popped as i32;
        compiled.scope_depth -= 1;
    }

    /// Emit pops for every local at `depth` or deeper, closing captured ones.
    /// The locals stay declared; returns how many there were.
    fn discard_locals(&mut self, depth: i32) -> usize {
        let ops: Vec<Opcode> = self
            .fn_ref()
            .locals
            .iter()
            .rev()
            .take_while(|local| local.depth >= depth)
            .map(|local| {
                if local.is_captured {
                    Opcode::CloseUpvalue
                } else {
                    Opcode::Pop
                }
            })
            .collect();
        for &op in &ops {
            self.emit_byte(op as u8);
        }
        ops.len()
    }

    fn add_local(&mut self, name: &str) -> usize {
        let compiled = self.fn_mut();
        compiled.locals.push(Local {
            name: name.to_string(),
            depth: compiled.scope_depth,
            is_captured: false,
        });
        compiled.locals.len() - 1
    }

    /// Declare a variable named by `token` in the current scope: a module
    /// variable at the top level, else a local.
    fn declare_variable(&mut self, token: &Token) -> usize {
        let name = token.lexeme.as_str();
        if name.len() > MAX_VARIABLE_NAME {
            self.error_at(
                token,
                &format!("Variable name cannot be longer than {MAX_VARIABLE_NAME} characters."),
            );
        }

        if self.fn_ref().scope_depth == -1 {
            let result =
                module_loader::define_variable(&mut self.vm.heap, self.module, name, Value::NULL);
            return match result {
                Ok(symbol) => symbol,
                Err(DefineError::AlreadyDefined(symbol)) => {
                    self.error_at(token, "Module variable is already defined.");
                    symbol
                }
                Err(DefineError::TooManyVariables) => {
                    self.error_at(token, "Too many module variables defined.");
                    0
                }
                Err(DefineError::UsedBeforeDefinition(symbol)) => {
                    let line = self.implicit_lines.get(&symbol).copied().unwrap_or(token.line);
                    self.error_at(
                        token,
                        &format!(
                            "Variable '{name}' referenced before this definition (first use at line {line})."
                        ),
                    );
                    symbol
                }
            };
        }

        let compiled = self.fn_ref();
        let duplicate = compiled
            .locals
            .iter()
            .rev()
            .take_while(|local| local.depth >= compiled.scope_depth)
            .any(|local| local.name == name);
        if duplicate {
            self.error_at(token, "Variable is already declared in this scope.");
        }
        if self.fn_ref().locals.len() >= MAX_LOCALS {
            self.error_at(
                token,
                &format!("Cannot declare more than {MAX_LOCALS} variables in one scope."),
            );
            return MAX_LOCALS - 1;
        }
        self.add_local(name)
    }

    /// Consume a name token and declare it.
    fn declare_named_variable(&mut self) -> usize {
        self.consume(TokenKind::Name, "Expect variable name.");
        let token = self.previous.clone();
        self.declare_variable(&token)
    }

    /// Store the value on top of the stack into a just-declared variable.
    /// Locals need nothing: the value already sits in their slot.
    fn define_variable(&mut self, symbol: usize) {
        if self.fn_ref().scope_depth >= 0 {
            return;
        }
        self.emit_short_arg(Opcode::StoreModuleVar, symbol);
        self.emit_op(Opcode::Pop);
    }

    fn resolve_local(&self, index: usize, name: &str) -> Option<usize> {
        self.fns[index].locals.iter().rposition(|local| local.name == name)
    }

    fn add_upvalue(&mut self, index: usize, is_local: bool, slot: usize) -> usize {
        let wanted = UpvalueRef {
            is_local,
            index: slot,
        };
        if let Some(existing) = self.fns[index].upvalues.iter().position(|&u| u == wanted) {
            return existing;
        }
        if self.fns[index].upvalues.len() >= MAX_UPVALUES {
            self.error(&format!("Cannot capture more than {MAX_UPVALUES} variables in a closure."));
            return 0;
        }
        self.fns[index].upvalues.push(wanted);
        self.fns[index].upvalues.len() - 1
    }

    /// Find `name` in the functions enclosing `index`, threading an upvalue
    /// through each intermediate function.
    fn find_upvalue(&mut self, index: usize, name: &str) -> Option<usize> {
        let parent = index.checked_sub(1)?;
        // Methods do not close over the code around their class, except for
        // static fields, which are hoisted into that scope.
        if !name.starts_with('_') && self.fns[parent].class.is_some() {
            return None;
        }

        if let Some(local) = self.resolve_local(parent, name) {
            self.fns[parent].locals[local].is_captured = true;
            return Some(self.add_upvalue(index, true, local));
        }
        let upvalue = self.find_upvalue(parent, name)?;
        Some(self.add_upvalue(index, false, upvalue))
    }

    /// Resolve `name` as a local or upvalue of the current function.
    fn resolve_non_module(&mut self, name: &str) -> Option<Variable> {
        let top = self.top();
        if let Some(local) = self.resolve_local(top, name) {
            return Some(Variable::Local(local));
        }
        self.find_upvalue(top, name).map(Variable::Upvalue)
    }

    fn load_variable(&mut self, variable: Variable) {
        match variable {
            Variable::Local(slot) => self.emit_byte_arg(Opcode::LoadLocal, slot),
            Variable::Upvalue(index) => self.emit_byte_arg(Opcode::LoadUpvalue, index),
            Variable::Module(symbol) => self.emit_short_arg(Opcode::LoadModuleVar, symbol),
        };
    }

    fn load_this(&mut self) {
        if let Some(variable) = self.resolve_non_module("this") {
            self.load_variable(variable);
        }
    }

    /// Load one of the core classes, which every module starts with.
    fn load_core_variable(&mut self, name: &str) {
        match module_loader::find_variable(&self.vm.heap, self.module, name) {
            Some(symbol) => {
                self.emit_short_arg(Opcode::LoadModuleVar, symbol);
            }
            None => self.error(&format!("Core class '{name}' is not available.")),
        }
    }

    fn method_symbol(&mut self, name: &str) -> usize {
        let vm = &mut *self.vm;
        vm.method_names.ensure(&mut vm.heap, name)
    }

    fn signature_symbol(&mut self, signature: &Signature) -> usize {
        self.method_symbol(&signature.to_string())
    }

    /// Call a method with a fixed signature on the value below the arguments.
    fn call_method(&mut self, argc: usize, signature: &str) {
        let symbol = self.method_symbol(signature);
        self.emit_call(Opcode::Call, argc, symbol);
    }

    /// Index of the function compiling the innermost enclosing class body.
    fn enclosing_class_index(&self) -> Option<usize> {
        self.fns.iter().rposition(|compiled| compiled.class.is_some())
    }

    fn enclosing_class(&self) -> Option<&ClassInfo> {
        self.fns.iter().rev().find_map(|compiled| compiled.class.as_ref())
    }

    fn enclosing_class_mut(&mut self) -> Option<&mut ClassInfo> {
        self.fns
            .iter_mut()
            .rev()
            .find_map(|compiled| compiled.class.as_mut())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn sig(name: &str, kind: SigKind, arity: usize) -> String {
        Signature {
            name: name.to_string(),
            kind,
            arity,
        }
        .to_string()
    }

    #[rstest]
    #[case("add", SigKind::Method, 2, "add(_,_)")]
    #[case("clear", SigKind::Method, 0, "clear()")]
    #[case("count", SigKind::Getter, 0, "count")]
    #[case("count", SigKind::Setter, 1, "count=(_)")]
    #[case("", SigKind::Subscript, 1, "[_]")]
    #[case("", SigKind::SubscriptSetter, 3, "[_,_]=(_)")]
    #[case("new", SigKind::Initializer, 1, "init new(_)")]
    #[case("-", SigKind::Getter, 0, "-")]
    fn signature_strings(
        #[case] name: &str,
        #[case] kind: SigKind,
        #[case] arity: usize,
        #[case] expected: &str,
    ) {
        assert_eq!(sig(name, kind, arity), expected);
    }

    #[test]
    fn local_names_start_lowercase() {
        assert!(is_local_name("foo"));
        assert!(!is_local_name("Foo"));
        assert!(!is_local_name("_foo"));
        assert!(!is_local_name(""));
    }
}
