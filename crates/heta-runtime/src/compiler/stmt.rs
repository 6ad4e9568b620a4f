//! Statement and definition compilation

use super::expr::Precedence;
use super::{Compiler, LoopState};
use crate::bytecode::Opcode;
use crate::token::{Literal, TokenKind};

impl Compiler<'_> {
    /// A statement, or a declaration that may only appear at block level.
    pub(super) fn definition(&mut self) {
        if self.match_kind(TokenKind::Class) {
            self.class_definition(false);
        } else if self.match_kind(TokenKind::Foreign) {
            self.consume(TokenKind::Class, "Expect 'class' after 'foreign'.");
            self.class_definition(true);
        } else if self.match_kind(TokenKind::Import) {
            self.import();
        } else if self.match_kind(TokenKind::Var) {
            self.var_definition();
        } else {
            self.statement();
        }
    }

    fn statement(&mut self) {
        match self.peek() {
            TokenKind::Break => {
                self.advance();
                self.break_statement();
            }
            TokenKind::Continue => {
                self.advance();
                self.continue_statement();
            }
            TokenKind::For => {
                self.advance();
                self.for_statement();
            }
            TokenKind::If => {
                self.advance();
                self.if_statement();
            }
            TokenKind::Return => {
                self.advance();
                self.return_statement();
            }
            TokenKind::While => {
                self.advance();
                self.while_statement();
            }
            TokenKind::LeftBrace => {
                self.advance();
                self.push_scope();
                if self.finish_block() {
                    // A single-expression block used as a statement.
                    self.emit_op(Opcode::Pop);
                }
                self.pop_scope();
            }
            _ => {
                self.expression();
                self.emit_op(Opcode::Pop);
            }
        }
    }

    fn var_definition(&mut self) {
        self.consume(TokenKind::Name, "Expect variable name.");
        let name = self.previous.clone();

        if self.match_kind(TokenKind::Eq) {
            self.ignore_newlines();
            self.expression();
        } else {
            self.emit_op(Opcode::Null);
        }

        // Declared after the initializer so `var a = a` sees the outer `a`.
        let symbol = self.declare_variable(&name);
        self.define_variable(symbol);
    }

    /// `import "name" for A, B as C`
    fn import(&mut self) {
        self.ignore_newlines();
        self.consume(TokenKind::String, "Expect a string after 'import'.");
        let module_name = self.previous.value.clone();
        let constant = self.literal_constant(&module_name);

        self.emit_short_arg(Opcode::ImportModule, constant);
        // Discard the module body's return value.
        self.emit_op(Opcode::Pop);

        if !self.match_kind(TokenKind::For) {
            return;
        }

        loop {
            self.ignore_newlines();
            self.consume(TokenKind::Name, "Expect variable name.");
            let source = self.previous.clone();
            let source_constant =
                self.literal_constant(&Literal::Str(source.lexeme.clone().into_bytes()));

            let slot = if self.match_kind(TokenKind::As) {
                self.declare_named_variable()
            } else {
                self.declare_variable(&source)
            };

            self.emit_short_arg(Opcode::ImportVariable, source_constant);
            self.define_variable(slot);

            if !self.match_kind(TokenKind::Comma) {
                break;
            }
        }
    }

    fn if_statement(&mut self) {
        self.consume(TokenKind::LeftParen, "Expect '(' after 'if'.");
        self.ignore_newlines();
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after if condition.");

        let if_jump = self.emit_jump(Opcode::JumpIfFalse);
        self.statement();

        if self.match_kind(TokenKind::Else) {
            let else_jump = self.emit_jump(Opcode::Jump);
            self.patch_jump(if_jump);
            self.statement();
            self.patch_jump(else_jump);
        } else {
            self.patch_jump(if_jump);
        }
    }

    fn while_statement(&mut self) {
        self.start_loop();

        self.consume(TokenKind::LeftParen, "Expect '(' after 'while'.");
        self.ignore_newlines();
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after while condition.");

        self.test_exit_loop();
        self.statement();
        self.end_loop();
    }

    /// `for (x in seq) body` desugars to the iterator protocol:
    ///
    /// ```text
    /// var seq_ = seq
    /// var iter_ = null
    /// while (iter_ = seq_.iterate(iter_)) {
    ///   var x = seq_.iteratorValue(iter_)
    ///   body
    /// }
    /// ```
    fn for_statement(&mut self) {
        // Scope for the hidden variables.
        self.push_scope();

        self.consume(TokenKind::LeftParen, "Expect '(' after 'for'.");
        self.consume(TokenKind::Name, "Expect for loop variable name.");
        let name = self.previous.clone();
        self.consume(TokenKind::In, "Expect 'in' after loop variable.");
        self.ignore_newlines();

        self.expression();

        if self.fn_ref().locals.len() + 2 > crate::MAX_LOCALS {
            self.error(&format!(
                "Cannot declare more than {} variables in one scope. (Not enough space for for-loops internal variables)",
                crate::MAX_LOCALS
            ));
            return;
        }
        // Spaces keep these names from clashing with user variables.
        let seq_slot = self.add_local("seq ");
        self.emit_op(Opcode::Null);
        let iter_slot = self.add_local("iter ");

        self.consume(TokenKind::RightParen, "Expect ')' after loop expression.");

        self.start_loop();

        self.emit_byte_arg(Opcode::LoadLocal, seq_slot);
        self.emit_byte_arg(Opcode::LoadLocal, iter_slot);
        self.call_method(1, "iterate(_)");
        self.emit_byte_arg(Opcode::StoreLocal, iter_slot);
        self.test_exit_loop();

        self.emit_byte_arg(Opcode::LoadLocal, seq_slot);
        self.emit_byte_arg(Opcode::LoadLocal, iter_slot);
        self.call_method(1, "iteratorValue(_)");

        // A fresh scope per iteration so closures capture distinct variables.
        self.push_scope();
        self.add_local(&name.lexeme);
        self.statement();
        self.pop_scope();

        self.end_loop();
        self.pop_scope();
    }

    fn break_statement(&mut self) {
        let Some(depth) = self.fn_ref().loops.last().map(|l| l.scope_depth) else {
            self.error("Cannot use 'break' outside of a loop.");
            return;
        };
        // Locals of the body are still on the stack; drop them before leaving.
        self.discard_locals(depth + 1);
        let jump = self.emit_jump(Opcode::Jump);
        if let Some(state) = self.fn_mut().loops.last_mut() {
            state.breaks.push(jump);
        }
    }

    fn continue_statement(&mut self) {
        let Some((depth, start)) = self
            .fn_ref()
            .loops
            .last()
            .map(|l| (l.scope_depth, l.start))
        else {
            self.error("Cannot use 'continue' outside of a loop.");
            return;
        };
        self.discard_locals(depth + 1);
        self.emit_loop(start);
    }

    fn return_statement(&mut self) {
        let bare = matches!(
            self.peek(),
            TokenKind::Line | TokenKind::RightBrace | TokenKind::Eof
        );
        if bare {
            // Initializers return the new instance.
            if self.fn_ref().is_initializer {
                self.emit_byte_arg(Opcode::LoadLocal, 0);
            } else {
                self.emit_op(Opcode::Null);
            }
        } else {
            if self.fn_ref().is_initializer {
                self.error("A constructor cannot return a value.");
            }
            self.expression();
        }
        self.emit_op(Opcode::Return);
    }

    fn start_loop(&mut self) {
        let start = self.fn_ref().chunk.offset();
        let scope_depth = self.fn_ref().scope_depth;
        self.fn_mut().loops.push(LoopState {
            start,
            exit_jump: None,
            scope_depth,
            breaks: Vec::new(),
        });
    }

    fn test_exit_loop(&mut self) {
        let jump = self.emit_jump(Opcode::JumpIfFalse);
        if let Some(state) = self.fn_mut().loops.last_mut() {
            state.exit_jump = Some(jump);
        }
    }

    fn end_loop(&mut self) {
        let Some(state) = self.fn_mut().loops.pop() else {
            return;
        };
        self.emit_loop(state.start);
        if let Some(exit) = state.exit_jump {
            self.patch_jump(exit);
        }
        for jump in state.breaks {
            self.patch_jump(jump);
        }
    }

    /// Compile the rest of a block after its `{`. Returns true if the block
    /// was a single expression, whose value is left on the stack.
    pub(super) fn finish_block(&mut self) -> bool {
        if self.match_kind(TokenKind::RightBrace) {
            return false;
        }

        // No newline after "{" means a single-expression body.
        if !self.match_line() {
            self.expression();
            self.consume(TokenKind::RightBrace, "Expect '}' at end of block.");
            return true;
        }

        if self.match_kind(TokenKind::RightBrace) {
            return false;
        }

        loop {
            self.definition();
            self.consume_line("Expect newline after statement.");
            self.panic_mode = false;
            if matches!(self.peek(), TokenKind::RightBrace | TokenKind::Eof) {
                break;
            }
        }
        self.consume(TokenKind::RightBrace, "Expect '}' at end of block.");
        false
    }

    /// Body of a method or function, including the implicit return.
    pub(super) fn finish_body(&mut self) {
        let is_expression = self.finish_block();

        if self.fn_ref().is_initializer {
            if is_expression {
                self.emit_op(Opcode::Pop);
            }
            self.emit_byte_arg(Opcode::LoadLocal, 0);
        } else if !is_expression {
            self.emit_op(Opcode::Null);
        }
        self.emit_op(Opcode::Return);
    }

    /// Superclass expression of a class definition
    pub(super) fn superclass(&mut self) {
        self.parse_precedence(Precedence::Call);
    }
}
