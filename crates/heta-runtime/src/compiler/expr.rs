//! Expression compilation
//!
//! Pratt parsing: every token kind maps to a [`Rule`] giving its prefix
//! handler, its infix handler and the precedence it binds with as an infix
//! operator. Operators compile to ordinary method calls on the left operand.

use super::{is_local_name, Compiler, SigKind, Signature, Variable};
use crate::bytecode::Opcode;
use crate::module_loader;
use crate::token::TokenKind;
use crate::MAX_PARAMETERS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(super) enum Precedence {
    None,
    Lowest,
    Assignment,
    Conditional,
    LogicalOr,
    LogicalAnd,
    Equality,
    Is,
    Comparison,
    BitwiseOr,
    BitwiseXor,
    BitwiseAnd,
    BitwiseShift,
    Range,
    Term,
    Factor,
    Unary,
    Call,
    Primary,
}

impl Precedence {
    fn next(self) -> Self {
        use Precedence::*;
        match self {
            None => Lowest,
            Lowest => Assignment,
            Assignment => Conditional,
            Conditional => LogicalOr,
            LogicalOr => LogicalAnd,
            LogicalAnd => Equality,
            Equality => Is,
            Is => Comparison,
            Comparison => BitwiseOr,
            BitwiseOr => BitwiseXor,
            BitwiseXor => BitwiseAnd,
            BitwiseAnd => BitwiseShift,
            BitwiseShift => Range,
            Range => Term,
            Term => Factor,
            Factor => Unary,
            Unary => Call,
            Call | Primary => Primary,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Prefix {
    Grouping,
    List,
    Map,
    Unary,
    Literal,
    Interpolation,
    Null,
    Bool,
    Name,
    Field,
    StaticField,
    This,
    Super,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Infix {
    Binary,
    And,
    Or,
    Conditional,
    Subscript,
    Call,
}

/// How a token may start a method definition in a class body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum SignatureRule {
    Named,
    Constructor,
    Subscript,
    Infix,
    Unary,
    /// `-` is both a prefix and an infix operator
    Mixed,
}

#[derive(Debug, Clone, Copy)]
pub(super) struct Rule {
    pub(super) prefix: Option<Prefix>,
    pub(super) infix: Option<Infix>,
    pub(super) signature: Option<SignatureRule>,
    pub(super) precedence: Precedence,
    /// Method name for operators
    pub(super) name: &'static str,
}

impl Rule {
    const NONE: Rule = Rule {
        prefix: None,
        infix: None,
        signature: None,
        precedence: Precedence::None,
        name: "",
    };

    const fn prefix(prefix: Prefix) -> Rule {
        Rule {
            prefix: Some(prefix),
            ..Rule::NONE
        }
    }

    /// A binary operator that is also definable as a method
    const fn operator(precedence: Precedence, name: &'static str) -> Rule {
        Rule {
            prefix: None,
            infix: Some(Infix::Binary),
            signature: Some(SignatureRule::Infix),
            precedence,
            name,
        }
    }

    const fn unary(name: &'static str) -> Rule {
        Rule {
            prefix: Some(Prefix::Unary),
            infix: None,
            signature: Some(SignatureRule::Unary),
            precedence: Precedence::None,
            name,
        }
    }
}

pub(super) fn rule(kind: TokenKind) -> Rule {
    use Precedence as P;
    use TokenKind as T;

    match kind {
        T::LeftParen => Rule::prefix(Prefix::Grouping),
        T::LeftBracket => Rule {
            prefix: Some(Prefix::List),
            infix: Some(Infix::Subscript),
            signature: Some(SignatureRule::Subscript),
            precedence: P::Call,
            name: "",
        },
        T::LeftBrace => Rule::prefix(Prefix::Map),
        T::Dot => Rule {
            infix: Some(Infix::Call),
            precedence: P::Call,
            ..Rule::NONE
        },
        T::DotDot => Rule::operator(P::Range, ".."),
        T::DotDotDot => Rule::operator(P::Range, "..."),
        T::Star => Rule::operator(P::Factor, "*"),
        T::Slash => Rule::operator(P::Factor, "/"),
        T::Percent => Rule::operator(P::Factor, "%"),
        T::Plus => Rule::operator(P::Term, "+"),
        T::Minus => Rule {
            prefix: Some(Prefix::Unary),
            infix: Some(Infix::Binary),
            signature: Some(SignatureRule::Mixed),
            precedence: P::Term,
            name: "-",
        },
        T::LtLt => Rule::operator(P::BitwiseShift, "<<"),
        T::GtGt => Rule::operator(P::BitwiseShift, ">>"),
        T::Pipe => Rule::operator(P::BitwiseOr, "|"),
        T::PipePipe => Rule {
            infix: Some(Infix::Or),
            precedence: P::LogicalOr,
            ..Rule::NONE
        },
        T::Caret => Rule::operator(P::BitwiseXor, "^"),
        T::Amp => Rule::operator(P::BitwiseAnd, "&"),
        T::AmpAmp => Rule {
            infix: Some(Infix::And),
            precedence: P::LogicalAnd,
            ..Rule::NONE
        },
        T::Bang => Rule::unary("!"),
        T::Tilde => Rule::unary("~"),
        T::Question => Rule {
            infix: Some(Infix::Conditional),
            precedence: P::Assignment,
            ..Rule::NONE
        },
        T::Lt => Rule::operator(P::Comparison, "<"),
        T::Gt => Rule::operator(P::Comparison, ">"),
        T::LtEq => Rule::operator(P::Comparison, "<="),
        T::GtEq => Rule::operator(P::Comparison, ">="),
        T::EqEq => Rule::operator(P::Equality, "=="),
        T::BangEq => Rule::operator(P::Equality, "!="),
        T::Is => Rule::operator(P::Is, "is"),
        T::False | T::True => Rule::prefix(Prefix::Bool),
        T::Null => Rule::prefix(Prefix::Null),
        T::This => Rule::prefix(Prefix::This),
        T::Super => Rule::prefix(Prefix::Super),
        T::Field => Rule::prefix(Prefix::Field),
        T::StaticField => Rule::prefix(Prefix::StaticField),
        T::Name => Rule {
            prefix: Some(Prefix::Name),
            signature: Some(SignatureRule::Named),
            ..Rule::NONE
        },
        T::Number | T::String => Rule::prefix(Prefix::Literal),
        T::Interpolation => Rule::prefix(Prefix::Interpolation),
        T::Construct => Rule {
            signature: Some(SignatureRule::Constructor),
            ..Rule::NONE
        },
        _ => Rule::NONE,
    }
}

impl Compiler<'_> {
    pub(super) fn expression(&mut self) {
        self.parse_precedence(Precedence::Lowest);
    }

    pub(super) fn parse_precedence(&mut self, precedence: Precedence) {
        self.advance();
        let Some(prefix) = rule(self.previous.kind).prefix else {
            self.error("Expected expression.");
            return;
        };

        // Assignment is only allowed when the surrounding expression binds
        // no tighter than a conditional.
        let can_assign = precedence <= Precedence::Conditional;
        self.run_prefix(prefix, can_assign);

        while precedence <= rule(self.current.kind).precedence {
            self.advance();
            if let Some(infix) = rule(self.previous.kind).infix {
                self.run_infix(infix, can_assign);
            }
        }
    }

    fn run_prefix(&mut self, prefix: Prefix, can_assign: bool) {
        match prefix {
            Prefix::Grouping => self.grouping(),
            Prefix::List => self.list(),
            Prefix::Map => self.map(),
            Prefix::Unary => self.unary_op(),
            Prefix::Literal => self.literal(),
            Prefix::Interpolation => self.string_interpolation(),
            Prefix::Null => {
                self.emit_op(Opcode::Null);
            }
            Prefix::Bool => {
                let op = if self.previous.kind == TokenKind::True {
                    Opcode::True
                } else {
                    Opcode::False
                };
                self.emit_op(op);
            }
            Prefix::Name => self.name(can_assign),
            Prefix::Field => self.field(can_assign),
            Prefix::StaticField => self.static_field(can_assign),
            Prefix::This => self.this(),
            Prefix::Super => self.super_call(can_assign),
        }
    }

    fn run_infix(&mut self, infix: Infix, can_assign: bool) {
        match infix {
            Infix::Binary => self.infix_op(),
            Infix::And => self.and(),
            Infix::Or => self.or(),
            Infix::Conditional => self.conditional(),
            Infix::Subscript => self.subscript(can_assign),
            Infix::Call => self.call(can_assign),
        }
    }

    fn grouping(&mut self) {
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after expression.");
    }

    /// `[a, b]` compiles to `List.new()` followed by an `addCore_` per element.
    fn list(&mut self) {
        self.load_core_variable("List");
        self.call_method(0, "new()");

        loop {
            self.ignore_newlines();
            if self.peek() == TokenKind::RightBracket {
                break;
            }
            self.expression();
            self.call_method(1, "addCore_(_)");
            if !self.match_kind(TokenKind::Comma) {
                break;
            }
        }

        self.ignore_newlines();
        self.consume(TokenKind::RightBracket, "Expect ']' after list elements.");
    }

    fn map(&mut self) {
        self.load_core_variable("Map");
        self.call_method(0, "new()");

        loop {
            self.ignore_newlines();
            if self.peek() == TokenKind::RightBrace {
                break;
            }
            self.parse_precedence(Precedence::Unary);
            self.consume(TokenKind::Colon, "Expect ':' after map key.");
            self.ignore_newlines();
            self.expression();
            self.call_method(2, "addCore_(_,_)");
            if !self.match_kind(TokenKind::Comma) {
                break;
            }
        }

        self.ignore_newlines();
        self.consume(TokenKind::RightBrace, "Expect '}' after map entries.");
    }

    fn unary_op(&mut self) {
        let name = rule(self.previous.kind).name;
        self.ignore_newlines();
        self.parse_precedence(Precedence::Unary.next());
        self.call_method(0, name);
    }

    fn infix_op(&mut self) {
        let rule = rule(self.previous.kind);
        // An operator cannot end an expression.
        self.ignore_newlines();
        self.parse_precedence(rule.precedence.next());

        let signature = Signature {
            name: rule.name.to_string(),
            kind: SigKind::Method,
            arity: 1,
        };
        self.call_signature(Opcode::Call, &signature);
    }

    fn and(&mut self) {
        self.ignore_newlines();
        let jump = self.emit_jump(Opcode::And);
        self.parse_precedence(Precedence::LogicalAnd);
        self.patch_jump(jump);
    }

    fn or(&mut self) {
        self.ignore_newlines();
        let jump = self.emit_jump(Opcode::Or);
        self.parse_precedence(Precedence::LogicalOr);
        self.patch_jump(jump);
    }

    fn conditional(&mut self) {
        self.ignore_newlines();
        let if_jump = self.emit_jump(Opcode::JumpIfFalse);
        self.parse_precedence(Precedence::Conditional);

        self.consume(
            TokenKind::Colon,
            "Expect ':' after then branch of conditional operator.",
        );
        self.ignore_newlines();

        let else_jump = self.emit_jump(Opcode::Jump);
        self.patch_jump(if_jump);
        self.parse_precedence(Precedence::Assignment);
        self.patch_jump(else_jump);
    }

    pub(super) fn literal(&mut self) {
        let value = self.previous.value.clone();
        self.emit_constant(&value);
    }

    /// `"a %(b) c"` compiles to `"a" + (b).toString + " c"`.
    fn string_interpolation(&mut self) {
        self.literal();
        loop {
            self.ignore_newlines();
            self.expression();
            self.call_method(0, "toString");
            self.call_method(1, "+(_)");
            self.ignore_newlines();

            if !self.match_kind(TokenKind::Interpolation) {
                break;
            }
            self.literal();
            self.call_method(1, "+(_)");
        }

        self.consume(TokenKind::String, "Expect end of string interpolation.");
        self.literal();
        self.call_method(1, "+(_)");
    }

    fn name(&mut self, can_assign: bool) {
        let token = self.previous.clone();
        let name = token.lexeme.as_str();

        if let Some(variable) = self.resolve_non_module(name) {
            self.bare_name(can_assign, variable);
            return;
        }

        let existing = module_loader::find_variable(&self.vm.heap, self.module, name);
        let defined = existing.is_some_and(|symbol| {
            !self.vm.heap.module(self.module).variables[symbol].is_undefined()
        });

        // Inside a class, a lowercase name that is not a variable in scope
        // is a call on `this`.
        if !defined && is_local_name(name) && self.enclosing_class().is_some() {
            self.load_this();
            self.named_call(can_assign, Opcode::Call);
            return;
        }

        let symbol = match existing {
            Some(symbol) => symbol,
            // Implicitly declare it, hoping for a definition later.
            None => match module_loader::declare_variable(&mut self.vm.heap, self.module, name) {
                Ok(symbol) => symbol,
                Err(_) => {
                    self.error("Too many module variables defined.");
                    0
                }
            },
        };
        if !defined {
            self.implicit_lines.entry(symbol).or_insert(token.line);
        }
        self.bare_name(can_assign, Variable::Module(symbol));
    }

    /// Load or assign a variable that has been resolved.
    pub(super) fn bare_name(&mut self, can_assign: bool, variable: Variable) {
        if can_assign && self.match_kind(TokenKind::Eq) {
            self.expression();
            match variable {
                Variable::Local(slot) => self.emit_byte_arg(Opcode::StoreLocal, slot),
                Variable::Upvalue(index) => self.emit_byte_arg(Opcode::StoreUpvalue, index),
                Variable::Module(symbol) => self.emit_short_arg(Opcode::StoreModuleVar, symbol),
            };
            return;
        }

        self.load_variable(variable);
        self.allow_line_before_dot();
    }

    fn this(&mut self) {
        if self.enclosing_class().is_none() {
            self.error("Cannot use 'this' outside of a method.");
            return;
        }
        self.load_this();
    }

    fn super_call(&mut self, can_assign: bool) {
        let signature = match self.enclosing_class() {
            Some(class) => class.signature.clone(),
            None => {
                self.error("Cannot use 'super' outside of a method.");
                None
            }
        };
        self.load_this();

        if self.match_kind(TokenKind::Dot) {
            self.consume(TokenKind::Name, "Expect method name after 'super.'.");
            self.named_call(can_assign, Opcode::Super);
        } else if let Some(signature) = signature {
            // A bare `super` calls the superclass method with the same name.
            self.method_call(Opcode::Super, &signature);
        }
    }

    /// `receiver.name ...`
    fn call(&mut self, can_assign: bool) {
        self.ignore_newlines();
        self.consume(TokenKind::Name, "Expect method name after '.'.");
        self.named_call(can_assign, Opcode::Call);
    }

    fn subscript(&mut self, can_assign: bool) {
        let mut signature = Signature {
            name: String::new(),
            kind: SigKind::Subscript,
            arity: 0,
        };
        self.finish_argument_list(&mut signature);
        self.consume(TokenKind::RightBracket, "Expect ']' after arguments.");
        self.allow_line_before_dot();

        if can_assign && self.match_kind(TokenKind::Eq) {
            signature.kind = SigKind::SubscriptSetter;
            signature.arity += 1;
            self.validate_num_parameters(signature.arity);
            self.expression();
        }

        self.call_signature(Opcode::Call, &signature);
    }

    /// A call whose method name is the previous token: a getter, a setter,
    /// or a method with arguments and an optional block argument.
    pub(super) fn named_call(&mut self, can_assign: bool, op: Opcode) {
        let signature = self.signature_from_token(SigKind::Getter);

        if can_assign && self.match_kind(TokenKind::Eq) {
            self.ignore_newlines();
            let setter = Signature {
                kind: SigKind::Setter,
                arity: 1,
                ..signature
            };
            self.expression();
            self.call_signature(op, &setter);
        } else {
            self.method_call(op, &signature);
            self.allow_line_before_dot();
        }
    }

    fn method_call(&mut self, op: Opcode, signature: &Signature) {
        let mut called = Signature {
            name: signature.name.clone(),
            kind: SigKind::Getter,
            arity: 0,
        };

        if self.match_kind(TokenKind::LeftParen) {
            called.kind = SigKind::Method;
            self.ignore_newlines();
            if self.peek() != TokenKind::RightParen {
                self.finish_argument_list(&mut called);
            }
            self.consume(TokenKind::RightParen, "Expect ')' after arguments.");
        }

        if self.match_kind(TokenKind::LeftBrace) {
            called.kind = SigKind::Method;
            called.arity += 1;
            self.block_argument(&called);
        }

        if signature.kind == SigKind::Initializer {
            if called.kind != SigKind::Method {
                self.error("A superclass constructor must have an argument list.");
            }
            called.kind = SigKind::Initializer;
        }

        self.call_signature(op, &called);
    }

    /// `{ |a, b| body }` after a call: compiled as a function passed as the
    /// last argument.
    fn block_argument(&mut self, called: &Signature) {
        self.begin_fn(false);

        let mut params = Signature {
            name: String::new(),
            kind: SigKind::Method,
            arity: 0,
        };
        if self.match_kind(TokenKind::Pipe) {
            self.finish_parameter_list(&mut params);
            self.consume(TokenKind::Pipe, "Expect '|' after function parameters.");
        }
        self.fn_mut().arity = params.arity;

        self.finish_body();
        self.end_fn(&format!("{called} block argument"));
    }

    pub(super) fn call_signature(&mut self, op: Opcode, signature: &Signature) {
        let symbol = self.signature_symbol(signature);
        self.emit_call(op, signature.arity, symbol);
    }

    fn finish_argument_list(&mut self, signature: &mut Signature) {
        loop {
            self.ignore_newlines();
            signature.arity += 1;
            self.validate_num_parameters(signature.arity);
            self.expression();
            if !self.match_kind(TokenKind::Comma) {
                break;
            }
        }
        self.ignore_newlines();
    }

    /// Parameters declared as locals of the function being compiled.
    pub(super) fn finish_parameter_list(&mut self, signature: &mut Signature) {
        loop {
            self.ignore_newlines();
            signature.arity += 1;
            self.validate_num_parameters(signature.arity);
            self.declare_named_variable();
            if !self.match_kind(TokenKind::Comma) {
                break;
            }
        }
    }

    pub(super) fn validate_num_parameters(&mut self, count: usize) {
        if count == MAX_PARAMETERS + 1 {
            self.error(&format!(
                "Methods cannot have more than {MAX_PARAMETERS} parameters."
            ));
        }
    }
}
