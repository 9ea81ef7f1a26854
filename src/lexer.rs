//! The tokenizer.
//!
//! Scans source text a byte at a time and yields one [`Token`] per call.
//! The language spells equality `=?` and greater-or-equal `=>`, and uses
//! `::` to introduce a function's return type.

use hashbrown::HashMap;
use thiserror::Error;

/// Longest accepted identifier or string literal.
const TEXT_LIMIT: usize = 512;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LexError {
    #[error("unrecognised character '{ch}' on line {line}")]
    UnknownCharacter { ch: char, line: usize },
    #[error("unrecognised escape '\\{ch}' on line {line}")]
    UnknownEscape { ch: char, line: usize },
    #[error("unterminated character literal on line {line}")]
    UnterminatedCharacter { line: usize },
    #[error("unterminated string literal on line {line}")]
    UnterminatedString { line: usize },
    #[error("identifier too long on line {line}")]
    IdentifierTooLong { line: usize },
    #[error("string literal too long on line {line}")]
    StringTooLong { line: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Eof,
    Assign,
    BoolOr,
    BoolAnd,
    BitOr,
    BitXor,
    BitAnd,
    /// `=?`
    Equal,
    NotEqual,
    Less,
    Greater,
    LessEqual,
    /// `=>`
    GreaterEqual,
    ShiftLeft,
    ShiftRight,
    Plus,
    Minus,
    Star,
    Slash,
    Increment,
    Decrement,
    BoolNot,
    BitNot,
    IntLiteral(i64),
    StrLiteral(String),
    Semicolon,
    Comma,
    LeftBrace,
    RightBrace,
    LeftBracket,
    RightBracket,
    LeftParen,
    RightParen,
    Identifier(String),
    Char,
    Int,
    Long,
    Void,
    /// `::`
    Func,
    Print,
    If,
    Else,
    While,
    For,
    Return,
    Struct,
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            TokenKind::Eof => "end of file",
            TokenKind::Assign => "'='",
            TokenKind::BoolOr => "'||'",
            TokenKind::BoolAnd => "'&&'",
            TokenKind::BitOr => "'|'",
            TokenKind::BitXor => "'^'",
            TokenKind::BitAnd => "'&'",
            TokenKind::Equal => "'=?'",
            TokenKind::NotEqual => "'!='",
            TokenKind::Less => "'<'",
            TokenKind::Greater => "'>'",
            TokenKind::LessEqual => "'<='",
            TokenKind::GreaterEqual => "'=>'",
            TokenKind::ShiftLeft => "'<<'",
            TokenKind::ShiftRight => "'>>'",
            TokenKind::Plus => "'+'",
            TokenKind::Minus => "'-'",
            TokenKind::Star => "'*'",
            TokenKind::Slash => "'/'",
            TokenKind::Increment => "'++'",
            TokenKind::Decrement => "'--'",
            TokenKind::BoolNot => "'!'",
            TokenKind::BitNot => "'~'",
            TokenKind::IntLiteral(_) => "integer literal",
            TokenKind::StrLiteral(_) => "string literal",
            TokenKind::Semicolon => "';'",
            TokenKind::Comma => "','",
            TokenKind::LeftBrace => "'{'",
            TokenKind::RightBrace => "'}'",
            TokenKind::LeftBracket => "'['",
            TokenKind::RightBracket => "']'",
            TokenKind::LeftParen => "'('",
            TokenKind::RightParen => "')'",
            TokenKind::Identifier(_) => "identifier",
            TokenKind::Char => "'char'",
            TokenKind::Int => "'int'",
            TokenKind::Long => "'long'",
            TokenKind::Void => "'void'",
            TokenKind::Func => "'::'",
            TokenKind::Print => "'print'",
            TokenKind::If => "'if'",
            TokenKind::Else => "'else'",
            TokenKind::While => "'while'",
            TokenKind::For => "'for'",
            TokenKind::Return => "'return'",
            TokenKind::Struct => "'struct'",
        };
        write!(f, "{}", text)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Line the token started on (1-based).
    pub line: usize,
}

pub struct Lexer<'a> {
    src: &'a [u8],
    pos: usize,
    line: usize,
    keywords: HashMap<&'static str, TokenKind>,
}

fn keyword_table() -> HashMap<&'static str, TokenKind> {
    let mut keywords = HashMap::new();
    keywords.insert("char", TokenKind::Char);
    keywords.insert("i8", TokenKind::Char);
    keywords.insert("int", TokenKind::Int);
    keywords.insert("i32", TokenKind::Int);
    keywords.insert("long", TokenKind::Long);
    keywords.insert("i64", TokenKind::Long);
    keywords.insert("void", TokenKind::Void);
    keywords.insert("print", TokenKind::Print);
    keywords.insert("if", TokenKind::If);
    keywords.insert("else", TokenKind::Else);
    keywords.insert("while", TokenKind::While);
    keywords.insert("for", TokenKind::For);
    keywords.insert("return", TokenKind::Return);
    keywords.insert("struct", TokenKind::Struct);
    keywords
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Lexer<'a> {
        Lexer {
            src: source.as_bytes(),
            pos: 0,
            line: 1,
            keywords: keyword_table(),
        }
    }

    pub fn line(&self) -> usize {
        self.line
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let ch = self.peek()?;
        self.pos += 1;
        if ch == b'\n' {
            self.line += 1;
        }
        Some(ch)
    }

    /// Consume the next byte if it matches.
    fn eat(&mut self, expected: u8) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\n' | b'\r')) {
            self.bump();
        }
    }

    fn escape(&mut self) -> Result<u8, LexError> {
        let ch = self.bump().ok_or(LexError::UnterminatedCharacter { line: self.line })?;
        match ch {
            b'n' => Ok(b'\n'),
            b't' => Ok(b'\t'),
            b'r' => Ok(b'\r'),
            b'0' => Ok(0),
            b'\\' | b'\'' | b'"' => Ok(ch),
            other => Err(LexError::UnknownEscape { ch: other as char, line: self.line }),
        }
    }

    fn character_literal(&mut self) -> Result<i64, LexError> {
        let ch = self.bump().ok_or(LexError::UnterminatedCharacter { line: self.line })?;
        let value = if ch == b'\\' { self.escape()? } else { ch };
        if !self.eat(b'\'') {
            return Err(LexError::UnterminatedCharacter { line: self.line });
        }
        Ok(value as i64)
    }

    fn string_literal(&mut self) -> Result<String, LexError> {
        let mut text = Vec::new();
        loop {
            let ch = self.bump().ok_or(LexError::UnterminatedString { line: self.line })?;
            match ch {
                b'"' => break,
                b'\\' => text.push(self.escape()?),
                other => text.push(other),
            }
            if text.len() > TEXT_LIMIT {
                return Err(LexError::StringTooLong { line: self.line });
            }
        }
        Ok(String::from_utf8_lossy(&text).into_owned())
    }

    fn identifier(&mut self, first: u8) -> Result<TokenKind, LexError> {
        let mut name = String::new();
        name.push(first as char);
        while let Some(ch) = self.peek() {
            if ch.is_ascii_alphanumeric() || ch == b'_' {
                name.push(ch as char);
                self.pos += 1;
                if name.len() > TEXT_LIMIT {
                    return Err(LexError::IdentifierTooLong { line: self.line });
                }
            } else {
                break;
            }
        }
        if let Some(keyword) = self.keywords.get(name.as_str()) {
            return Ok(keyword.clone());
        }
        Ok(TokenKind::Identifier(name))
    }

    fn number(&mut self, first: u8) -> i64 {
        let mut value = (first - b'0') as i64;
        while let Some(ch) = self.peek() {
            if ch.is_ascii_digit() {
                value = value * 10 + (ch - b'0') as i64;
                self.pos += 1;
            } else {
                break;
            }
        }
        value
    }

    pub fn next_token(&mut self) -> Result<Token, LexError> {
        self.skip_whitespace();
        let line = self.line;
        let Some(ch) = self.bump() else {
            return Ok(Token { kind: TokenKind::Eof, line });
        };

        let kind = match ch {
            b'+' => {
                if self.eat(b'+') {
                    TokenKind::Increment
                } else {
                    TokenKind::Plus
                }
            }
            b'-' => {
                if self.eat(b'-') {
                    TokenKind::Decrement
                } else {
                    TokenKind::Minus
                }
            }
            b'*' => TokenKind::Star,
            b'/' => TokenKind::Slash,
            b'^' => TokenKind::BitXor,
            b'~' => TokenKind::BitNot,
            b';' => TokenKind::Semicolon,
            b',' => TokenKind::Comma,
            b'{' => TokenKind::LeftBrace,
            b'}' => TokenKind::RightBrace,
            b'[' => TokenKind::LeftBracket,
            b']' => TokenKind::RightBracket,
            b'(' => TokenKind::LeftParen,
            b')' => TokenKind::RightParen,
            b'=' => {
                if self.eat(b'?') {
                    TokenKind::Equal
                } else if self.eat(b'>') {
                    TokenKind::GreaterEqual
                } else {
                    TokenKind::Assign
                }
            }
            b'!' => {
                if self.eat(b'=') {
                    TokenKind::NotEqual
                } else {
                    TokenKind::BoolNot
                }
            }
            b'<' => {
                if self.eat(b'=') {
                    TokenKind::LessEqual
                } else if self.eat(b'<') {
                    TokenKind::ShiftLeft
                } else {
                    TokenKind::Less
                }
            }
            b'>' => {
                if self.eat(b'>') {
                    TokenKind::ShiftRight
                } else {
                    TokenKind::Greater
                }
            }
            b'&' => {
                if self.eat(b'&') {
                    TokenKind::BoolAnd
                } else {
                    TokenKind::BitAnd
                }
            }
            b'|' => {
                if self.eat(b'|') {
                    TokenKind::BoolOr
                } else {
                    TokenKind::BitOr
                }
            }
            b':' => {
                if self.eat(b':') {
                    TokenKind::Func
                } else {
                    return Err(LexError::UnknownCharacter { ch: ':', line });
                }
            }
            b'\'' => TokenKind::IntLiteral(self.character_literal()?),
            b'"' => TokenKind::StrLiteral(self.string_literal()?),
            b'0'..=b'9' => TokenKind::IntLiteral(self.number(ch)),
            ch if ch.is_ascii_alphabetic() || ch == b'_' => self.identifier(ch)?,
            other => return Err(LexError::UnknownCharacter { ch: other as char, line }),
        };
        Ok(Token { kind, line })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        let mut lexer = Lexer::new(source);
        let mut out = Vec::new();
        loop {
            let token = lexer.next_token().unwrap();
            let done = token.kind == TokenKind::Eof;
            out.push(token.kind);
            if done {
                break;
            }
        }
        out
    }

    #[test]
    fn comparison_spellings() {
        assert_eq!(
            kinds("=? => = <= << !="),
            vec![
                TokenKind::Equal,
                TokenKind::GreaterEqual,
                TokenKind::Assign,
                TokenKind::LessEqual,
                TokenKind::ShiftLeft,
                TokenKind::NotEqual,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn function_marker_and_keywords() {
        assert_eq!(
            kinds("main :: i32"),
            vec![
                TokenKind::Identifier("main".to_string()),
                TokenKind::Func,
                TokenKind::Int,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn width_aliases_map_to_primitives() {
        assert_eq!(kinds("i8 i32 i64")[..3], [TokenKind::Char, TokenKind::Int, TokenKind::Long]);
    }

    #[test]
    fn literals() {
        assert_eq!(
            kinds("12 'a' '\\n' \"hi\\t\"")[..4],
            [
                TokenKind::IntLiteral(12),
                TokenKind::IntLiteral('a' as i64),
                TokenKind::IntLiteral('\n' as i64),
                TokenKind::StrLiteral("hi\t".to_string()),
            ]
        );
    }

    #[test]
    fn lines_are_tracked() {
        let mut lexer = Lexer::new("a\nb");
        assert_eq!(lexer.next_token().unwrap().line, 1);
        assert_eq!(lexer.next_token().unwrap().line, 2);
    }

    #[test]
    fn lone_colon_is_rejected() {
        let mut lexer = Lexer::new(": a");
        assert_eq!(
            lexer.next_token(),
            Err(LexError::UnknownCharacter { ch: ':', line: 1 })
        );
    }

    #[test]
    fn oversized_identifiers_are_rejected() {
        let long = "x".repeat(600);
        let mut lexer = Lexer::new(&long);
        assert_eq!(lexer.next_token(), Err(LexError::IdentifierTooLong { line: 1 }));
    }

    #[test]
    fn unterminated_string() {
        let mut lexer = Lexer::new("\"oops");
        assert!(matches!(
            lexer.next_token(),
            Err(LexError::UnterminatedString { .. })
        ));
    }
}
