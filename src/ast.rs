//! Syntax tree nodes.
//!
//! Trees are built bottom-up by the parser and handed to the code
//! generator one declaration at a time, then dropped. Nodes own their
//! children; there is no pooling.

use crate::symbols::{SymbolId, SymbolTable};
use crate::types::Type;

/// Every operation a tree node can denote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Assign,
    BoolOr,
    BoolAnd,
    BitOr,
    BitXor,
    BitAnd,
    Equal,
    NotEqual,
    Less,
    Greater,
    LessEqual,
    GreaterEqual,
    ShiftLeft,
    ShiftRight,
    Add,
    Subtract,
    Multiply,
    Divide,
    PreIncrement,
    PreDecrement,
    PostIncrement,
    PostDecrement,
    BitNot,
    BoolNot,
    Negate,
    /// Collapse a value to a 0/1 truth value (loop and branch conditions).
    BoolConvert,
    Address,
    Dereference,
    IntLiteral,
    StrLiteral,
    Ident,
    /// Promote a narrower integer child to the node's own type.
    Widen,
    /// Multiply an index by the pointee size carried in the payload.
    Scale,
    Call,
    Return,
    /// Sequencing: evaluate left, then right. Also chains call arguments,
    /// where the payload carries the 1-based argument position.
    Glue,
    If,
    Loop,
    Print,
    Function,
}

impl Op {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            Op::Equal | Op::NotEqual | Op::Less | Op::Greater | Op::LessEqual | Op::GreaterEqual
        )
    }
}

/// Per-operation data a node carries besides its children.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Payload {
    None,
    /// Literal integer value.
    Int(i64),
    /// Label of an emitted string literal.
    StringLabel(usize),
    /// Pointee byte size for index scaling.
    Scale(u32),
    /// 1-based argument position on a call glue node.
    Position(usize),
}

/// A syntax tree node: operation, expression type and up to three owned
/// children. `rvalue` marks nodes whose value (rather than location) is
/// wanted.
#[derive(Debug, Clone)]
pub struct Node {
    pub op: Op,
    pub ty: Type,
    pub rvalue: bool,
    pub left: Option<Box<Node>>,
    pub middle: Option<Box<Node>>,
    pub right: Option<Box<Node>>,
    pub symbol: Option<SymbolId>,
    pub payload: Payload,
}

impl Node {
    pub fn new(
        op: Op,
        ty: Type,
        left: Option<Node>,
        middle: Option<Node>,
        right: Option<Node>,
        symbol: Option<SymbolId>,
        payload: Payload,
    ) -> Node {
        Node {
            op,
            ty,
            rvalue: false,
            left: left.map(Box::new),
            middle: middle.map(Box::new),
            right: right.map(Box::new),
            symbol,
            payload,
        }
    }

    /// A node with a single (left) child.
    pub fn branch(op: Op, ty: Type, left: Node, symbol: Option<SymbolId>, payload: Payload) -> Node {
        Node::new(op, ty, Some(left), None, None, symbol, payload)
    }

    /// A childless node.
    pub fn leaf(op: Op, ty: Type, symbol: Option<SymbolId>, payload: Payload) -> Node {
        Node::new(op, ty, None, None, None, symbol, payload)
    }
}

/// Render a tree for `-T` output.
pub fn dump_tree(node: &Node, table: &SymbolTable) -> String {
    let mut out = String::new();
    dump_into(node, table, 0, &mut out);
    out
}

fn dump_into(node: &Node, table: &SymbolTable, depth: usize, out: &mut String) {
    for _ in 0..depth {
        out.push_str("  ");
    }
    out.push_str(&format!("{:?} <{}>", node.op, node.ty));
    if node.rvalue {
        out.push_str(" rvalue");
    }
    if let Some(id) = node.symbol {
        out.push_str(&format!(" '{}'", table.get(id).name));
    }
    match node.payload {
        Payload::None => {}
        Payload::Int(value) => out.push_str(&format!(" {}", value)),
        Payload::StringLabel(label) => out.push_str(&format!(" L{}", label)),
        Payload::Scale(size) => out.push_str(&format!(" x{}", size)),
        Payload::Position(pos) => out.push_str(&format!(" #{}", pos)),
    }
    out.push('\n');
    for child in [&node.left, &node.middle, &node.right].into_iter().flatten() {
        dump_into(child, table, depth + 1, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comparison_classification() {
        assert!(Op::Equal.is_comparison());
        assert!(Op::GreaterEqual.is_comparison());
        assert!(!Op::Add.is_comparison());
        assert!(!Op::Assign.is_comparison());
    }

    #[test]
    fn constructors_wire_children() {
        let lhs = Node::leaf(Op::IntLiteral, Type::INT, None, Payload::Int(2));
        let rhs = Node::leaf(Op::IntLiteral, Type::INT, None, Payload::Int(3));
        let sum = Node::new(Op::Add, Type::INT, Some(lhs), None, Some(rhs), None, Payload::None);
        assert_eq!(sum.left.as_ref().unwrap().payload, Payload::Int(2));
        assert_eq!(sum.right.as_ref().unwrap().payload, Payload::Int(3));
        assert!(sum.middle.is_none());
        assert!(!sum.rvalue);
    }
}
