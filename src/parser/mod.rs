//! The parser.
//!
//! A single pass over the token stream: global declarations are entered
//! into the symbol table as they appear, and every completed function body
//! is handed straight to the code generator, so by the time the last token
//! is consumed the assembly is written. Split across three files:
//! declarations here, statement forms in [`statements`], expression
//! climbing in [`expressions`].

mod error;
mod expressions;
mod statements;

pub use error::ParseError;

use std::io::Write;

use log::debug;

use crate::ast;
use crate::codegen::{self, CodeGen};
use crate::lexer::{Lexer, Token, TokenKind};
use crate::symbols::{Storage, Structure, SymbolId, SymbolTable};
use crate::types::{BaseKind, Type, TypeError};

pub struct Parser<'a, W: Write> {
    lexer: Lexer<'a>,
    current: Token,
    pub table: SymbolTable,
    pub gen: CodeGen<W>,
    /// Dump each function's tree to stderr before generating it.
    pub dump_tree: bool,
}

impl<'a, W: Write> Parser<'a, W> {
    pub fn new(source: &'a str, gen: CodeGen<W>) -> Result<Parser<'a, W>, ParseError> {
        let mut lexer = Lexer::new(source);
        let current = lexer.next_token()?;
        Ok(Parser {
            lexer,
            current,
            table: SymbolTable::new(),
            gen,
            dump_tree: false,
        })
    }

    /// Compile the whole source: file header, then every global
    /// declaration, then flush.
    pub fn run(&mut self) -> Result<(), ParseError> {
        self.gen.preamble()?;
        self.parse_globals()?;
        self.gen.flush()?;
        Ok(())
    }

    /// Give the output writer back (test entry point).
    pub fn into_output(self) -> W {
        self.gen.into_inner()
    }

    fn line(&self) -> usize {
        self.current.line
    }

    fn advance(&mut self) -> Result<(), ParseError> {
        self.current = self.lexer.next_token()?;
        Ok(())
    }

    fn expect(&mut self, kind: TokenKind, what: &'static str) -> Result<(), ParseError> {
        if self.current.kind == kind {
            return self.advance();
        }
        Err(ParseError::Expected { what, line: self.line() })
    }

    fn expect_identifier(&mut self) -> Result<String, ParseError> {
        if let TokenKind::Identifier(name) = &self.current.kind {
            let name = name.clone();
            self.advance()?;
            return Ok(name);
        }
        Err(ParseError::Expected { what: "an identifier", line: self.line() })
    }

    fn type_error(&self, source: TypeError) -> ParseError {
        ParseError::Type { source, line: self.line() }
    }

    /// Top-level loop: functions (`name :: type (...)`), global variables
    /// and arrays, and struct definitions, until end of file.
    fn parse_globals(&mut self) -> Result<(), ParseError> {
        loop {
            match &self.current.kind {
                TokenKind::Eof => return Ok(()),
                TokenKind::Identifier(_) => {
                    let name = self.expect_identifier()?;
                    self.expect(TokenKind::Func, "'::'")?;
                    let (ty, _) = self.parse_type()?;
                    self.parse_function(&name, ty)?;
                }
                TokenKind::Char
                | TokenKind::Int
                | TokenKind::Long
                | TokenKind::Void
                | TokenKind::Struct => {
                    let (ty, composite) = self.parse_type()?;
                    // A bare struct definition needs no variable.
                    if ty.base() == BaseKind::Struct && self.current.kind == TokenKind::Semicolon {
                        self.advance()?;
                        continue;
                    }
                    let name = self.expect_identifier()?;
                    self.declare_variable(ty, composite, Storage::Global, &name)?;
                    self.expect(TokenKind::Semicolon, "';'")?;
                }
                other => {
                    return Err(ParseError::UnexpectedToken {
                        found: other.to_string(),
                        line: self.line(),
                    })
                }
            }
        }
    }

    /// A type keyword (or struct reference/definition) followed by any
    /// number of `*`s.
    fn parse_type(&mut self) -> Result<(Type, Option<SymbolId>), ParseError> {
        let (mut ty, composite) = match self.current.kind {
            TokenKind::Char => {
                self.advance()?;
                (Type::CHAR, None)
            }
            TokenKind::Int => {
                self.advance()?;
                (Type::INT, None)
            }
            TokenKind::Long => {
                self.advance()?;
                (Type::LONG, None)
            }
            TokenKind::Void => {
                self.advance()?;
                (Type::VOID, None)
            }
            TokenKind::Struct => {
                let definition = self.parse_struct_declaration()?;
                (Type::STRUCT, Some(definition))
            }
            _ => return Err(ParseError::Expected { what: "a type", line: self.line() }),
        };
        while self.current.kind == TokenKind::Star {
            ty = ty.pointer_to().map_err(|e| self.type_error(e))?;
            self.advance()?;
        }
        Ok((ty, composite))
    }

    /// `struct Name` referring to an existing definition, or
    /// `struct Name { members }` introducing one. Member offsets are laid
    /// out here: each non-char member starts on a 4-byte boundary.
    fn parse_struct_declaration(&mut self) -> Result<SymbolId, ParseError> {
        self.expect(TokenKind::Struct, "'struct'")?;
        let line = self.line();
        let name = self.expect_identifier()?;
        let existing = self.table.find_struct(&name);

        if self.current.kind != TokenKind::LeftBrace {
            return existing.ok_or(ParseError::UnknownStruct { name, line });
        }
        if existing.is_some() {
            return Err(ParseError::RedefinedStruct { name, line });
        }
        debug!("defining struct '{}'", name);
        let definition = self
            .table
            .add(&name, Type::STRUCT, Structure::Composite { size: 0 }, Storage::Struct, None)
            .map_err(|_| ParseError::Redeclaration { name: name.clone(), line })?;
        self.advance()?;
        self.parse_declaration_list(None, Storage::Member, TokenKind::RightBrace)?;
        self.expect(TokenKind::RightBrace, "'}'")?;

        let members = self.table.take_members();
        let mut offset = 0u32;
        for &member in &members {
            let entry = self.table.get(member);
            let (ty, composite) = (entry.ty, entry.composite);
            let size = self.table.type_size(ty, composite).map_err(|e| self.type_error(e))?;
            offset = codegen::align_memory(ty, offset)?;
            if let Structure::Variable { offset: slot } = &mut self.table.get_mut(member).structure {
                *slot = offset as i32;
            }
            offset += size;
        }
        self.table.get_mut(definition).members = members;
        if let Structure::Composite { size } = &mut self.table.get_mut(definition).structure {
            *size = offset;
        }
        Ok(definition)
    }

    /// A comma-separated declaration list ending at `end`: struct members,
    /// or a function's parameters. At the definition of a prototyped
    /// function the list only checks each type against the prototype's,
    /// positionally; nothing is declared (the prototype's entries serve as
    /// the parameters).
    fn parse_declaration_list(
        &mut self,
        prototype: Option<SymbolId>,
        storage: Storage,
        end: TokenKind,
    ) -> Result<usize, ParseError> {
        let prototype_params: Vec<SymbolId> = prototype
            .map(|id| self.table.get(id).members.iter().copied().collect())
            .unwrap_or_default();
        let mut count = 0;
        while self.current.kind != end {
            let (ty, composite) = self.parse_type()?;
            let name = self.expect_identifier()?;
            if let Some(&declared) = prototype_params.get(count) {
                if self.table.get(declared).ty != ty {
                    return Err(ParseError::ParameterTypeMismatch {
                        index: count + 1,
                        line: self.line(),
                    });
                }
            } else if prototype.is_none() {
                self.declare_variable(ty, composite, storage, &name)?;
            }
            count += 1;
            if self.current.kind == TokenKind::Comma {
                self.advance()?;
            } else if self.current.kind != end {
                return Err(ParseError::Expected {
                    what: "',' or the end of the list",
                    line: self.line(),
                });
            }
        }
        if let Some(id) = prototype {
            let declared = match self.table.get(id).structure {
                Structure::Function { param_count, .. } => param_count,
                _ => 0,
            };
            if count != declared {
                return Err(ParseError::PrototypeArityMismatch {
                    name: self.table.get(id).name.clone(),
                    line: self.line(),
                });
            }
        }
        Ok(count)
    }

    /// Declare one variable (scalar or, for globals, an array). The
    /// zero-initialised data block for a global is emitted immediately.
    fn declare_variable(
        &mut self,
        ty: Type,
        composite: Option<SymbolId>,
        storage: Storage,
        name: &str,
    ) -> Result<SymbolId, ParseError> {
        let line = self.line();
        let id = if self.current.kind == TokenKind::LeftBracket {
            self.advance()?;
            if storage != Storage::Global {
                return Err(ParseError::LocalArraysUnsupported { line });
            }
            let elements = match self.current.kind {
                TokenKind::IntLiteral(elements) => elements as usize,
                _ => return Err(ParseError::Expected { what: "an array size", line }),
            };
            self.advance()?;
            self.expect(TokenKind::RightBracket, "']'")?;
            let element_ptr = ty.pointer_to().map_err(|e| self.type_error(e))?;
            self.table
                .add(name, element_ptr, Structure::Array { elements }, storage, composite)
                .map_err(|_| ParseError::Redeclaration { name: name.to_string(), line })?
        } else {
            self.table
                .add(name, ty, Structure::Variable { offset: 0 }, storage, composite)
                .map_err(|_| ParseError::Redeclaration { name: name.to_string(), line })?
        };
        if storage == Storage::Global {
            self.gen.global_symbol(&self.table, id)?;
        }
        Ok(id)
    }

    /// A function declaration after `name :: type` has been consumed:
    /// parameter list, then either `;` for a prototype or a body, which is
    /// generated on the spot.
    fn parse_function(&mut self, name: &str, ty: Type) -> Result<(), ParseError> {
        let line = self.line();
        debug!("parsing function '{}'", name);
        let old = self
            .table
            .find(name)
            .filter(|&id| matches!(self.table.get(id).structure, Structure::Function { .. }));
        let function = match old {
            Some(id) => id,
            None => {
                let exit_label = self.gen.new_label();
                self.table
                    .add(
                        name,
                        ty,
                        Structure::Function { exit_label, param_count: 0 },
                        Storage::Global,
                        None,
                    )
                    .map_err(|_| ParseError::Redeclaration { name: name.to_string(), line })?
            }
        };

        self.expect(TokenKind::LeftParen, "'('")?;
        let count = self.parse_declaration_list(old, Storage::Param, TokenKind::RightParen)?;
        self.expect(TokenKind::RightParen, "')'")?;
        let params = self.table.take_params();
        if old.is_none() {
            let entry = self.table.get_mut(function);
            entry.members = params;
            if let Structure::Function { param_count, .. } = &mut entry.structure {
                *param_count = count;
            }
        }

        if self.current.kind == TokenKind::Semicolon {
            // A prototype; the body may follow in a later declaration.
            self.advance()?;
            return Ok(());
        }

        self.table.set_active_function(Some(function));
        let body = self.parse_compound()?;

        let function_ty = self.table.get(function).ty;
        if function_ty != Type::VOID {
            let ends_in_return = match &body {
                Some(node) if node.op == ast::Op::Glue => {
                    node.right.as_ref().map(|last| last.op == ast::Op::Return).unwrap_or(false)
                }
                Some(node) => node.op == ast::Op::Return,
                None => false,
            };
            if !ends_in_return {
                return Err(ParseError::MissingReturn {
                    name: name.to_string(),
                    line: self.line(),
                });
            }
        }

        let body_ty = body.as_ref().map(|node| node.ty).unwrap_or(Type::NONE);
        let tree = ast::Node::new(
            ast::Op::Function,
            body_ty,
            body,
            None,
            None,
            Some(function),
            ast::Payload::None,
        );
        if self.dump_tree {
            eprintln!("{}", ast::dump_tree(&tree, &self.table));
        }
        self.gen.generate(&tree, &mut self.table)?;
        self.table.free_locals();
        Ok(())
    }
}
