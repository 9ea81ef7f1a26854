//! Statement forms.

use std::io::Write;

use crate::ast::{Node, Op, Payload};
use crate::lexer::TokenKind;
use crate::parser::{ParseError, Parser};
use crate::symbols::Storage;
use crate::types::{mutate_type, Mutation, Type};

/// Statement trees that must be followed by a `;` inside a compound.
fn needs_semicolon(op: Op) -> bool {
    matches!(
        op,
        Op::Print
            | Op::Assign
            | Op::Return
            | Op::Call
            | Op::PreIncrement
            | Op::PreDecrement
            | Op::PostIncrement
            | Op::PostDecrement
    )
}

impl<'a, W: Write> Parser<'a, W> {
    /// `{ statement* }`, glued left-to-right into a sequencing chain.
    /// Local declarations produce no tree.
    pub(super) fn parse_compound(&mut self) -> Result<Option<Node>, ParseError> {
        self.expect(TokenKind::LeftBrace, "'{'")?;
        let mut chain: Option<Node> = None;
        loop {
            if self.current.kind == TokenKind::RightBrace {
                self.advance()?;
                return Ok(chain);
            }
            if let Some(tree) = self.parse_statement()? {
                if needs_semicolon(tree.op) {
                    self.expect(TokenKind::Semicolon, "';'")?;
                }
                chain = Some(match chain {
                    None => tree,
                    Some(left) => Node::new(
                        Op::Glue,
                        Type::NONE,
                        Some(left),
                        None,
                        Some(tree),
                        None,
                        Payload::None,
                    ),
                });
            }
        }
    }

    fn parse_statement(&mut self) -> Result<Option<Node>, ParseError> {
        match self.current.kind {
            TokenKind::Char | TokenKind::Int | TokenKind::Long => {
                let (ty, composite) = self.parse_type()?;
                let name = self.expect_identifier()?;
                self.declare_variable(ty, composite, Storage::Local, &name)?;
                self.expect(TokenKind::Semicolon, "';'")?;
                Ok(None)
            }
            TokenKind::If => self.if_statement().map(Some),
            TokenKind::While => self.while_statement().map(Some),
            TokenKind::For => self.for_statement().map(Some),
            TokenKind::Return => self.return_statement().map(Some),
            TokenKind::Print => self.print_statement().map(Some),
            _ => self.parse_expression(0).map(Some),
        }
    }

    /// A condition expression; anything that is not already a comparison
    /// gets collapsed to a truth value.
    fn boolean_condition(&mut self) -> Result<Node, ParseError> {
        let condition = self.parse_expression(0)?;
        if condition.op.is_comparison() {
            return Ok(condition);
        }
        let ty = condition.ty;
        Ok(Node::branch(Op::BoolConvert, ty, condition, None, Payload::None))
    }

    fn if_statement(&mut self) -> Result<Node, ParseError> {
        self.expect(TokenKind::If, "'if'")?;
        self.expect(TokenKind::LeftParen, "'('")?;
        let condition = self.boolean_condition()?;
        self.expect(TokenKind::RightParen, "')'")?;
        let then_block = self.parse_compound()?;
        let else_block = if self.current.kind == TokenKind::Else {
            self.advance()?;
            self.parse_compound()?
        } else {
            None
        };
        Ok(Node::new(
            Op::If,
            Type::NONE,
            Some(condition),
            then_block,
            else_block,
            None,
            Payload::None,
        ))
    }

    fn while_statement(&mut self) -> Result<Node, ParseError> {
        self.expect(TokenKind::While, "'while'")?;
        self.expect(TokenKind::LeftParen, "'('")?;
        let condition = self.boolean_condition()?;
        self.expect(TokenKind::RightParen, "')'")?;
        let body = self.parse_compound()?;
        Ok(Node::new(Op::Loop, Type::NONE, Some(condition), None, body, None, Payload::None))
    }

    /// `for` is sugar: the initialiser is sequenced before a loop whose
    /// body is the block sequenced with the post-statement.
    fn for_statement(&mut self) -> Result<Node, ParseError> {
        self.expect(TokenKind::For, "'for'")?;
        self.expect(TokenKind::LeftParen, "'('")?;
        let init = self.parse_statement()?;
        self.expect(TokenKind::Semicolon, "';'")?;
        let condition = self.boolean_condition()?;
        self.expect(TokenKind::Semicolon, "';'")?;
        let post = self.parse_statement()?;
        self.expect(TokenKind::RightParen, "')'")?;
        let body = self.parse_compound()?;

        let body_and_post =
            Node::new(Op::Glue, Type::NONE, body, None, post, None, Payload::None);
        let repeat = Node::new(
            Op::Loop,
            Type::NONE,
            Some(condition),
            None,
            Some(body_and_post),
            None,
            Payload::None,
        );
        Ok(Node::new(Op::Glue, Type::NONE, init, None, Some(repeat), None, Payload::None))
    }

    /// `return ( expr )`; the value must fit the function's declared type.
    fn return_statement(&mut self) -> Result<Node, ParseError> {
        let line = self.line();
        let function = self
            .table
            .active_function()
            .ok_or(ParseError::ReturnOutsideFunction { line })?;
        let function_ty = self.table.get(function).ty;
        if function_ty == Type::VOID {
            return Err(ParseError::ReturnFromVoid { line });
        }
        self.expect(TokenKind::Return, "'return'")?;
        self.expect(TokenKind::LeftParen, "'('")?;
        let value = self.parse_expression(0)?;
        let value = match mutate_type(value, function_ty, None) {
            Mutation::Fit(node) => node,
            Mutation::Incompatible(node) => {
                return Err(ParseError::BadReturnType {
                    found: node.ty,
                    expected: function_ty,
                    line: self.line(),
                })
            }
        };
        self.expect(TokenKind::RightParen, "')'")?;
        Ok(Node::branch(Op::Return, Type::NONE, value, Some(function), Payload::None))
    }

    fn print_statement(&mut self) -> Result<Node, ParseError> {
        self.expect(TokenKind::Print, "'print'")?;
        let value = self.parse_expression(0)?;
        Ok(Node::branch(Op::Print, Type::NONE, value, None, Payload::None))
    }
}
