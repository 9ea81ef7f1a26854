//! Expression parsing by precedence climbing.

use std::io::Write;

use crate::ast::{Node, Op, Payload};
use crate::lexer::TokenKind;
use crate::parser::{ParseError, Parser};
use crate::symbols::Structure;
use crate::types::{mutate_type, Mutation, Type};

/// The explicit token-to-operation table, with each operator's binding
/// power. Assignment is the one right-associative operator.
fn binary_operator(kind: &TokenKind) -> Option<(Op, u8)> {
    let entry = match kind {
        TokenKind::Assign => (Op::Assign, 10),
        TokenKind::BoolOr => (Op::BoolOr, 20),
        TokenKind::BoolAnd => (Op::BoolAnd, 30),
        TokenKind::BitOr => (Op::BitOr, 40),
        TokenKind::BitXor => (Op::BitXor, 50),
        TokenKind::BitAnd => (Op::BitAnd, 60),
        TokenKind::Equal => (Op::Equal, 70),
        TokenKind::NotEqual => (Op::NotEqual, 70),
        TokenKind::Less => (Op::Less, 80),
        TokenKind::Greater => (Op::Greater, 80),
        TokenKind::LessEqual => (Op::LessEqual, 80),
        TokenKind::GreaterEqual => (Op::GreaterEqual, 80),
        TokenKind::ShiftLeft => (Op::ShiftLeft, 90),
        TokenKind::ShiftRight => (Op::ShiftRight, 90),
        TokenKind::Plus => (Op::Add, 100),
        TokenKind::Minus => (Op::Subtract, 100),
        TokenKind::Star => (Op::Multiply, 110),
        TokenKind::Slash => (Op::Divide, 110),
        _ => return None,
    };
    Some(entry)
}

impl<'a, W: Write> Parser<'a, W> {
    /// A token that legitimately ends an expression.
    fn at_expression_end(&self) -> bool {
        matches!(
            self.current.kind,
            TokenKind::Semicolon | TokenKind::RightParen | TokenKind::RightBracket | TokenKind::Comma
        )
    }

    fn operator(&self) -> Result<(Op, u8), ParseError> {
        binary_operator(&self.current.kind).ok_or(ParseError::NotAnOperator {
            found: self.current.kind.to_string(),
            line: self.line(),
        })
    }

    /// Precedence climbing: fold operators stronger than `min_precedence`
    /// onto the tree. For a binary operator each side is reshaped toward
    /// the *other side's original type*; if neither fits, the operands are
    /// incompatible. Assignment reshapes only its value toward the target
    /// and then swaps the children, so the store happens after the value
    /// is ready.
    pub(super) fn parse_expression(&mut self, min_precedence: u8) -> Result<Node, ParseError> {
        let mut left = self.parse_prefix()?;
        if self.at_expression_end() {
            left.rvalue = true;
            return Ok(left);
        }

        let (mut op, mut precedence) = self.operator()?;
        while precedence > min_precedence || (op == Op::Assign && precedence == min_precedence) {
            self.advance()?;
            let mut right = self.parse_expression(precedence)?;
            let line = self.line();

            if op == Op::Assign {
                right.rvalue = true;
                left.rvalue = false;
                let target_ty = left.ty;
                right = match mutate_type(right, target_ty, None) {
                    Mutation::Fit(node) => node,
                    Mutation::Incompatible(node) => {
                        return Err(ParseError::IncompatibleAssignment {
                            value: node.ty,
                            target: target_ty,
                            line,
                        })
                    }
                };
                std::mem::swap(&mut left, &mut right);
            } else {
                left.rvalue = true;
                right.rvalue = true;
                let left_ty = left.ty;
                let right_ty = right.ty;
                let (fitted_left, left_fits) = match mutate_type(left, right_ty, Some(op)) {
                    Mutation::Fit(node) => (node, true),
                    Mutation::Incompatible(node) => (node, false),
                };
                let (fitted_right, right_fits) = match mutate_type(right, left_ty, Some(op)) {
                    Mutation::Fit(node) => (node, true),
                    Mutation::Incompatible(node) => (node, false),
                };
                if !left_fits && !right_fits {
                    return Err(ParseError::IncompatibleTypes {
                        left: left_ty,
                        right: right_ty,
                        line,
                    });
                }
                left = fitted_left;
                right = fitted_right;
            }

            let ty = left.ty;
            left = Node::new(op, ty, Some(left), None, Some(right), None, Payload::None);
            if self.at_expression_end() {
                left.rvalue = true;
                return Ok(left);
            }
            (op, precedence) = self.operator()?;
        }

        left.rvalue = true;
        Ok(left)
    }

    fn parse_prefix(&mut self) -> Result<Node, ParseError> {
        let line = self.line();
        match self.current.kind {
            TokenKind::BoolNot => {
                self.advance()?;
                let mut operand = self.parse_prefix()?;
                operand.rvalue = true;
                let ty = operand.ty;
                Ok(Node::branch(Op::BoolNot, ty, operand, None, Payload::None))
            }
            TokenKind::BitNot => {
                self.advance()?;
                let mut operand = self.parse_prefix()?;
                operand.rvalue = true;
                let ty = operand.ty;
                Ok(Node::branch(Op::BitNot, ty, operand, None, Payload::None))
            }
            TokenKind::Minus => {
                self.advance()?;
                let mut operand = self.parse_prefix()?;
                operand.rvalue = true;
                let ty = operand.ty;
                Ok(Node::branch(Op::Negate, ty, operand, None, Payload::None))
            }
            TokenKind::Increment => {
                self.advance()?;
                let operand = self.parse_prefix()?;
                if operand.op != Op::Ident {
                    return Err(ParseError::PrefixNeedsIdentifier { op: "++", line });
                }
                let (ty, symbol) = (operand.ty, operand.symbol);
                Ok(Node::branch(Op::PreIncrement, ty, operand, symbol, Payload::None))
            }
            TokenKind::Decrement => {
                self.advance()?;
                let operand = self.parse_prefix()?;
                if operand.op != Op::Ident {
                    return Err(ParseError::PrefixNeedsIdentifier { op: "--", line });
                }
                let (ty, symbol) = (operand.ty, operand.symbol);
                Ok(Node::branch(Op::PreDecrement, ty, operand, symbol, Payload::None))
            }
            TokenKind::BitAnd => {
                // Address-of: morph the identifier leaf in place.
                self.advance()?;
                let mut operand = self.parse_prefix()?;
                if operand.op != Op::Ident {
                    return Err(ParseError::PrefixNeedsIdentifier { op: "&", line });
                }
                operand.op = Op::Address;
                operand.ty = operand.ty.pointer_to().map_err(|e| self.type_error(e))?;
                Ok(operand)
            }
            TokenKind::Star => {
                self.advance()?;
                let operand = self.parse_prefix()?;
                if operand.op != Op::Ident && operand.op != Op::Dereference {
                    return Err(ParseError::DereferenceNeedsIdentifier { line });
                }
                let ty = operand.ty.value_at().map_err(|e| self.type_error(e))?;
                Ok(Node::branch(Op::Dereference, ty, operand, None, Payload::None))
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> Result<Node, ParseError> {
        let line = self.line();
        match self.current.kind.clone() {
            TokenKind::IntLiteral(value) => {
                self.advance()?;
                // Small literals fit a char, so they widen toward anything.
                let ty = if (0..256).contains(&value) { Type::CHAR } else { Type::INT };
                Ok(Node::leaf(Op::IntLiteral, ty, None, Payload::Int(value)))
            }
            TokenKind::StrLiteral(text) => {
                self.advance()?;
                let label = self.gen.new_string(&text)?;
                let ty = Type::CHAR.pointer_to().map_err(|e| self.type_error(e))?;
                Ok(Node::leaf(Op::StrLiteral, ty, None, Payload::StringLabel(label)))
            }
            TokenKind::Identifier(_) => self.parse_postfix(),
            TokenKind::LeftParen => {
                self.advance()?;
                let inner = self.parse_expression(0)?;
                self.expect(TokenKind::RightParen, "')'")?;
                Ok(inner)
            }
            other => Err(ParseError::UnexpectedToken { found: other.to_string(), line }),
        }
    }

    /// An identifier and whatever rides on it: a call, an index, or a
    /// postfix increment/decrement.
    fn parse_postfix(&mut self) -> Result<Node, ParseError> {
        let line = self.line();
        let name = self.expect_identifier()?;
        if self.current.kind == TokenKind::LeftParen {
            return self.call_function(&name, line);
        }
        if self.current.kind == TokenKind::LeftBracket {
            return self.access_array(&name, line);
        }

        let id = self
            .table
            .find(&name)
            .ok_or_else(|| ParseError::UnknownVariable { name: name.clone(), line })?;
        let entry = self.table.get(id);
        if !matches!(entry.structure, Structure::Variable { .. }) {
            return Err(ParseError::UnknownVariable { name, line });
        }
        let ty = entry.ty;
        match self.current.kind {
            TokenKind::Increment => {
                self.advance()?;
                Ok(Node::leaf(Op::PostIncrement, ty, Some(id), Payload::None))
            }
            TokenKind::Decrement => {
                self.advance()?;
                Ok(Node::leaf(Op::PostDecrement, ty, Some(id), Payload::None))
            }
            _ => Ok(Node::leaf(Op::Ident, ty, Some(id), Payload::None)),
        }
    }

    fn call_function(&mut self, name: &str, line: usize) -> Result<Node, ParseError> {
        let id = self
            .table
            .find(name)
            .filter(|&id| matches!(self.table.get(id).structure, Structure::Function { .. }))
            .ok_or_else(|| ParseError::UndeclaredFunction { name: name.to_string(), line })?;
        let ty = self.table.get(id).ty;
        self.expect(TokenKind::LeftParen, "'('")?;
        let arguments = self.parse_expression_list()?;
        self.expect(TokenKind::RightParen, "')'")?;
        Ok(Node::new(Op::Call, ty, arguments, None, None, Some(id), Payload::None))
    }

    /// Call arguments, chained into glue nodes whose payloads carry each
    /// argument's 1-based position. The chain's head holds the last
    /// argument, so the generator sees the count first.
    fn parse_expression_list(&mut self) -> Result<Option<Node>, ParseError> {
        let mut chain: Option<Node> = None;
        let mut count = 0;
        while self.current.kind != TokenKind::RightParen {
            let argument = self.parse_expression(0)?;
            count += 1;
            chain = Some(Node::new(
                Op::Glue,
                Type::VOID_PTR,
                chain,
                None,
                Some(argument),
                None,
                Payload::Position(count),
            ));
            if self.current.kind == TokenKind::Comma {
                self.advance()?;
            } else if self.current.kind != TokenKind::RightParen {
                return Err(ParseError::Expected {
                    what: "',' or ')'",
                    line: self.line(),
                });
            }
        }
        Ok(chain)
    }

    /// `name[index]`, lowered to `*(&name + scaled-index)`.
    fn access_array(&mut self, name: &str, line: usize) -> Result<Node, ParseError> {
        let id = self
            .table
            .find(name)
            .filter(|&id| matches!(self.table.get(id).structure, Structure::Array { .. }))
            .ok_or_else(|| ParseError::UndeclaredArray { name: name.to_string(), line })?;
        let base_ty = self.table.get(id).ty;
        let base = Node::leaf(Op::Address, base_ty, Some(id), Payload::None);

        self.expect(TokenKind::LeftBracket, "'['")?;
        let mut index = self.parse_expression(0)?;
        self.expect(TokenKind::RightBracket, "']'")?;
        index.rvalue = true;
        if !index.ty.is_integer() {
            return Err(ParseError::ArrayIndexNotInteger { line });
        }
        let index = match mutate_type(index, base_ty, Some(Op::Add)) {
            Mutation::Fit(node) => node,
            Mutation::Incompatible(node) => {
                return Err(ParseError::IncompatibleTypes {
                    left: base_ty,
                    right: node.ty,
                    line,
                })
            }
        };

        let sum = Node::new(Op::Add, base_ty, Some(base), None, Some(index), None, Payload::None);
        let value_ty = base_ty.value_at().map_err(|e| self.type_error(e))?;
        Ok(Node::branch(Op::Dereference, value_ty, sum, None, Payload::None))
    }
}
