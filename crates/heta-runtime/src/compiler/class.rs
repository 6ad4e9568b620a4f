//! Class bodies, method definitions and field access

use super::expr::{rule, SignatureRule};
use super::{Compiler, Local, SigKind, Signature, Variable};
use crate::bytecode::Opcode;
use crate::token::{Literal, TokenKind};
use crate::{MAX_FIELDS, MAX_LOCALS, MAX_METHOD_NAME};
use std::collections::HashSet;

/// State for the class body being compiled
#[derive(Debug)]
pub(super) struct ClassInfo {
    pub(super) name: String,
    pub(super) is_foreign: bool,
    /// Compiling a static method
    pub(super) in_static: bool,
    /// Field names, indexed from 0 for this class's own fields
    pub(super) fields: Vec<String>,
    methods: HashSet<usize>,
    static_methods: HashSet<usize>,
    /// Signature of the method being compiled, for bare `super` calls
    pub(super) signature: Option<Signature>,
}

impl ClassInfo {
    fn new(name: String, is_foreign: bool) -> Self {
        Self {
            name,
            is_foreign,
            in_static: false,
            fields: Vec::new(),
            methods: HashSet::new(),
            static_methods: HashSet::new(),
            signature: None,
        }
    }
}

impl Compiler<'_> {
    /// `class Name is Super { ... }`, after the `class` keyword.
    pub(super) fn class_definition(&mut self, is_foreign: bool) {
        self.consume(TokenKind::Name, "Expect class name.");
        let name = self.previous.clone();
        let symbol = self.declare_variable(&name);
        let class_variable = if self.fn_ref().scope_depth == -1 {
            Variable::Module(symbol)
        } else {
            Variable::Local(symbol)
        };

        self.emit_constant(&Literal::Str(name.lexeme.clone().into_bytes()));

        if self.match_kind(TokenKind::Is) {
            self.superclass();
        } else {
            self.load_core_variable("Object");
        }

        // The field count operand is patched once the body has been seen.
        let fields_operand = if is_foreign {
            self.emit_op(Opcode::ForeignClass);
            None
        } else {
            Some(self.emit_byte_arg(Opcode::Class, 255))
        };

        self.define_variable(symbol);

        // Static fields become locals of this scope, captured by the methods
        // that use them.
        self.push_scope();
        self.fn_mut().class = Some(ClassInfo::new(name.lexeme.clone(), is_foreign));

        self.consume(TokenKind::LeftBrace, "Expect '{' after class declaration.");
        self.match_line();

        while !self.match_kind(TokenKind::RightBrace) {
            if !self.method(class_variable) {
                break;
            }
            if self.match_kind(TokenKind::RightBrace) {
                break;
            }
            self.consume_line("Expect newline after definition in class.");
            self.panic_mode = false;
        }

        let info = self.fn_mut().class.take();
        if let (Some(operand), Some(info)) = (fields_operand, info) {
            self.fn_mut().chunk.code[operand] = info.fields.len().min(MAX_FIELDS) as u8;
        }
        self.pop_scope();
    }

    /// One method definition. Returns false if no method could be parsed.
    fn method(&mut self, class_variable: Variable) -> bool {
        let is_foreign = self.match_kind(TokenKind::Foreign);
        let is_static = self.match_kind(TokenKind::Static);
        if let Some(class) = self.enclosing_class_mut() {
            class.in_static = is_static;
        }

        let signature_rule = rule(self.current.kind).signature;
        self.advance();
        let Some(signature_rule) = signature_rule else {
            self.error("Expect method definition.");
            return false;
        };

        let mut signature = self.signature_from_token(SigKind::Getter);
        self.begin_fn(true);
        self.method_signature(signature_rule, &mut signature);

        if is_static && signature.kind == SigKind::Initializer {
            self.error("A constructor cannot be static.");
        }
        self.fn_mut().is_initializer = signature.kind == SigKind::Initializer;
        self.fn_mut().arity = signature.arity;

        let class_name = match self.enclosing_class_mut() {
            Some(class) => {
                class.signature = Some(signature.clone());
                class.name.clone()
            }
            None => String::new(),
        };

        let full_signature = signature.to_string();
        let symbol = self.declare_method(&full_signature, is_static);

        if is_foreign {
            // The body lives in the host; bind it by its signature string.
            self.fns.pop();
            self.emit_constant(&Literal::Str(full_signature.into_bytes()));
        } else {
            self.consume(TokenKind::LeftBrace, "Expect '{' to begin method body.");
            self.finish_body();
            self.end_fn(&format!("{class_name}.{full_signature}"));
        }

        self.define_method(class_variable, is_static, symbol);

        if signature.kind == SigKind::Initializer {
            // The class also gets a static method that allocates the instance
            // and runs the initializer on it.
            let constructor = Signature {
                kind: SigKind::Method,
                ..signature
            };
            let constructor_symbol = self.signature_symbol(&constructor);
            self.create_constructor(&class_name, &constructor, symbol);
            self.define_method(class_variable, true, constructor_symbol);
        }
        true
    }

    fn declare_method(&mut self, full_signature: &str, is_static: bool) -> usize {
        let symbol = self.method_symbol(full_signature);
        let Some(class) = self.enclosing_class_mut() else {
            return symbol;
        };
        let seen = if is_static {
            &mut class.static_methods
        } else {
            &mut class.methods
        };
        if !seen.insert(symbol) {
            let message = format!(
                "Class {} already defines a {}method '{}'.",
                class.name,
                if is_static { "static " } else { "" },
                full_signature
            );
            self.error(&message);
        }
        symbol
    }

    /// Bind the method value on top of the stack to the class.
    fn define_method(&mut self, class_variable: Variable, is_static: bool, symbol: usize) {
        // The class is reloaded for each method; static field locals may sit
        // above its slot.
        self.load_variable(class_variable);
        let op = if is_static {
            Opcode::MethodStatic
        } else {
            Opcode::MethodInstance
        };
        self.emit_short_arg(op, symbol);
    }

    fn create_constructor(&mut self, class_name: &str, signature: &Signature, initializer: usize) {
        let is_foreign = self.enclosing_class().is_some_and(|class| class.is_foreign);

        self.begin_fn(true);
        self.emit_op(if is_foreign {
            Opcode::ForeignConstruct
        } else {
            Opcode::Construct
        });
        self.emit_call(Opcode::Call, signature.arity, initializer);
        self.emit_op(Opcode::Return);
        self.fn_mut().arity = signature.arity;
        self.end_fn(&format!("{class_name}.{signature}"));
    }

    pub(super) fn signature_from_token(&mut self, kind: SigKind) -> Signature {
        let name = self.previous.lexeme.clone();
        if name.len() > MAX_METHOD_NAME {
            self.error(&format!(
                "Method names cannot be longer than {MAX_METHOD_NAME} characters."
            ));
        }
        Signature {
            name,
            kind,
            arity: 0,
        }
    }

    /// Parse the rest of a method signature, declaring its parameters in
    /// the method's function.
    fn method_signature(&mut self, signature_rule: SignatureRule, signature: &mut Signature) {
        match signature_rule {
            SignatureRule::Named => {
                signature.kind = SigKind::Getter;
                if self.maybe_setter(signature) {
                    return;
                }
                self.parameter_list(signature);
            }
            SignatureRule::Constructor => {
                self.consume(
                    TokenKind::Name,
                    "Expect constructor name after 'construct'.",
                );
                *signature = self.signature_from_token(SigKind::Initializer);

                if self.match_kind(TokenKind::Eq) {
                    self.error("A constructor cannot be a setter.");
                }
                if !self.match_kind(TokenKind::LeftParen) {
                    self.error("A constructor cannot be a getter.");
                    return;
                }
                if self.match_kind(TokenKind::RightParen) {
                    return;
                }
                self.finish_parameter_list(signature);
                self.consume(TokenKind::RightParen, "Expect ')' after parameters.");
            }
            SignatureRule::Subscript => {
                signature.kind = SigKind::Subscript;
                signature.name.clear();
                self.finish_parameter_list(signature);
                self.consume(TokenKind::RightBracket, "Expect ']' after parameters.");
                self.maybe_setter(signature);
            }
            SignatureRule::Infix => {
                signature.kind = SigKind::Method;
                signature.arity = 1;
                self.consume(TokenKind::LeftParen, "Expect '(' after operator name.");
                self.declare_named_variable();
                self.consume(TokenKind::RightParen, "Expect ')' after parameter name.");
            }
            SignatureRule::Unary => signature.kind = SigKind::Getter,
            SignatureRule::Mixed => {
                signature.kind = SigKind::Getter;
                if self.match_kind(TokenKind::LeftParen) {
                    signature.kind = SigKind::Method;
                    signature.arity = 1;
                    self.declare_named_variable();
                    self.consume(TokenKind::RightParen, "Expect ')' after parameter name.");
                }
            }
        }
    }

    /// `name=(value)` or `[index]=(value)`
    fn maybe_setter(&mut self, signature: &mut Signature) -> bool {
        if !self.match_kind(TokenKind::Eq) {
            return false;
        }
        signature.kind = if signature.kind == SigKind::Subscript {
            SigKind::SubscriptSetter
        } else {
            SigKind::Setter
        };

        self.consume(TokenKind::LeftParen, "Expect '(' after '='.");
        self.declare_named_variable();
        self.consume(TokenKind::RightParen, "Expect ')' after parameter name.");
        signature.arity += 1;
        true
    }

    fn parameter_list(&mut self, signature: &mut Signature) {
        if !self.match_kind(TokenKind::LeftParen) {
            return;
        }
        signature.kind = SigKind::Method;
        self.ignore_newlines();
        if self.match_kind(TokenKind::RightParen) {
            return;
        }
        self.finish_parameter_list(signature);
        self.consume(TokenKind::RightParen, "Expect ')' after parameters.");
    }

    /// `_name`, read or assigned
    pub(super) fn field(&mut self, can_assign: bool) {
        let name = self.previous.lexeme.clone();
        let mut index = MAX_FIELDS;

        let problem = match self.enclosing_class() {
            None => Some("Cannot reference a field outside of a class definition."),
            Some(class) if class.is_foreign => Some("Cannot define fields in a foreign class."),
            Some(class) if class.in_static => Some("Cannot use an instance field in a static method."),
            Some(_) => None,
        };
        if let Some(problem) = problem {
            self.error(problem);
        } else if let Some(class) = self.enclosing_class_mut() {
            index = match class.fields.iter().position(|field| *field == name) {
                Some(existing) => existing,
                None => {
                    class.fields.push(name);
                    class.fields.len() - 1
                }
            };
            if index >= MAX_FIELDS {
                self.error(&format!("A class can only have {MAX_FIELDS} fields."));
            }
        }

        let is_load = !(can_assign && self.match_kind(TokenKind::Eq));
        if !is_load {
            self.expression();
        }

        // Directly inside a method, the receiver is in slot 0.
        let in_method = self.enclosing_class_index().is_some_and(|owner| owner + 2 == self.fns.len());
        if in_method {
            let op = if is_load {
                Opcode::LoadFieldThis
            } else {
                Opcode::StoreFieldThis
            };
            self.emit_byte_arg(op, index);
        } else {
            self.load_this();
            let op = if is_load {
                Opcode::LoadField
            } else {
                Opcode::StoreField
            };
            self.emit_byte_arg(op, index);
        }
        self.allow_line_before_dot();
    }

    /// `__name`: a variable shared by the class and its metaclass, declared
    /// in the scope around the class body on first use.
    pub(super) fn static_field(&mut self, can_assign: bool) {
        let Some(owner) = self.enclosing_class_index() else {
            self.error("Cannot use a static field outside of a class definition.");
            return;
        };
        let name = self.previous.lexeme.clone();

        if self.resolve_local(owner, &name).is_none() {
            if self.fns[owner].locals.len() >= MAX_LOCALS {
                self.error(&format!(
                    "Cannot declare more than {MAX_LOCALS} variables in one scope."
                ));
                return;
            }
            let depth = self.fns[owner].scope_depth;
            self.fns[owner].locals.push(Local {
                name: name.clone(),
                depth,
                is_captured: false,
            });
            // Starts out null.
            self.emit_op_in(owner, Opcode::Null);
        }

        match self.resolve_non_module(&name) {
            Some(variable) => self.bare_name(can_assign, variable),
            None => self.error("Cannot use a static field outside of a class definition."),
        }
    }
}
