//! Type values and implicit conversions.
//!
//! A [`Type`] packs a base kind and a pointer indirection depth into a
//! single integer: the low four bits hold the depth (so at most fifteen
//! levels of indirection), the remaining bits hold the base-kind tag.

use std::fmt;

use log::debug;
use thiserror::Error;

use crate::ast::{Node, Op, Payload};

/// Errors raised by type manipulation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("too many levels of indirection on {0}")]
    IndirectionOverflow(Type),
    #[error("dereference of non-pointer type {0}")]
    NotAPointer(Type),
    #[error("type {0} has no primitive size")]
    NoSize(Type),
}

/// The base kind of a type, before any pointer levels are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseKind {
    None,
    Char,
    Int,
    Long,
    Void,
    Struct,
    Union,
}

/// A type value: base kind plus pointer indirection depth.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Type(u32);

impl Type {
    pub const NONE: Type = Type::from_parts(BaseKind::None, 0);
    pub const CHAR: Type = Type::from_parts(BaseKind::Char, 0);
    pub const INT: Type = Type::from_parts(BaseKind::Int, 0);
    pub const LONG: Type = Type::from_parts(BaseKind::Long, 0);
    pub const VOID: Type = Type::from_parts(BaseKind::Void, 0);
    pub const STRUCT: Type = Type::from_parts(BaseKind::Struct, 0);
    pub const UNION: Type = Type::from_parts(BaseKind::Union, 0);
    /// Argument-list glue nodes are typed as an anonymous pointer.
    pub const VOID_PTR: Type = Type::from_parts(BaseKind::Void, 1);

    const MAX_INDIRECTION: u32 = 0xF;

    pub const fn from_parts(base: BaseKind, indirection: u32) -> Type {
        Type(((base as u32) << 4) | (indirection & Self::MAX_INDIRECTION))
    }

    /// How many pointer levels this type carries (0 for plain values).
    pub const fn indirection(self) -> u32 {
        self.0 & Self::MAX_INDIRECTION
    }

    pub fn base(self) -> BaseKind {
        match self.0 >> 4 {
            1 => BaseKind::Char,
            2 => BaseKind::Int,
            3 => BaseKind::Long,
            4 => BaseKind::Void,
            5 => BaseKind::Struct,
            6 => BaseKind::Union,
            _ => BaseKind::None,
        }
    }

    pub const fn is_pointer(self) -> bool {
        self.indirection() != 0
    }

    /// True for plain `char`, `int` and `long` values.
    pub fn is_integer(self) -> bool {
        !self.is_pointer() && matches!(self.base(), BaseKind::Char | BaseKind::Int | BaseKind::Long)
    }

    /// The type with one more level of indirection.
    pub fn pointer_to(self) -> Result<Type, TypeError> {
        if self.indirection() == Self::MAX_INDIRECTION {
            return Err(TypeError::IndirectionOverflow(self));
        }
        debug!("pointerising {}", self);
        Ok(Type(self.0 + 1))
    }

    /// The type with one level of indirection removed.
    pub fn value_at(self) -> Result<Type, TypeError> {
        if !self.is_pointer() {
            return Err(TypeError::NotAPointer(self));
        }
        Ok(Type(self.0 - 1))
    }

    /// Size of the type in bytes. Pointers are always 8 bytes; void and
    /// bare composites have no primitive size.
    pub fn primitive_size(self) -> Result<u32, TypeError> {
        if self.is_pointer() {
            return Ok(8);
        }
        match self.base() {
            BaseKind::Char => Ok(1),
            BaseKind::Int => Ok(4),
            BaseKind::Long => Ok(8),
            _ => Err(TypeError::NoSize(self)),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let base = match self.base() {
            BaseKind::None => "none",
            BaseKind::Char => "char",
            BaseKind::Int => "int",
            BaseKind::Long => "long",
            BaseKind::Void => "void",
            BaseKind::Struct => "struct",
            BaseKind::Union => "union",
        };
        write!(f, "{}", base)?;
        for _ in 0..self.indirection() {
            write!(f, "*")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Which operand a [`compatible`] check wants widened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Widen {
    Neither,
    Left,
    Right,
}

/// Whether two integer types can meet in an expression, and which side
/// needs widening if so. With `strict` set, a larger left side is refused
/// (assignment-style narrowing).
pub fn compatible(left: Type, right: Type, strict: bool) -> Option<Widen> {
    if left == right {
        return Some(Widen::Neither);
    }
    let left_size = left.primitive_size().ok()?;
    let right_size = right.primitive_size().ok()?;
    if left_size < right_size {
        return Some(Widen::Left);
    }
    if left_size > right_size {
        if strict {
            return None;
        }
        return Some(Widen::Right);
    }
    Some(Widen::Neither)
}

/// Outcome of [`mutate_type`]: the node, adjusted or returned untouched.
pub enum Mutation {
    Fit(Node),
    Incompatible(Node),
}

fn integer_size(ty: Type) -> u32 {
    match ty.base() {
        BaseKind::Char => 1,
        BaseKind::Int => 4,
        BaseKind::Long => 8,
        _ => 0,
    }
}

/// Reshape `node` so its value can meet an operand of type `desired`
/// under `op` (`None` for plain assignment or return):
///
/// * equal integer types pass through; a smaller integer is wrapped in a
///   widening node; a larger one does not fit;
/// * identical pointers fit for plain assignment;
/// * an integer added to or subtracted from a pointer is wrapped in a
///   scaling node carrying the pointee size (byte pointees need none).
///
/// Anything else is incompatible and handed back for the caller to report.
pub fn mutate_type(node: Node, desired: Type, op: Option<Op>) -> Mutation {
    let actual = node.ty;

    if actual.is_integer() && desired.is_integer() {
        if actual == desired {
            return Mutation::Fit(node);
        }
        let actual_size = integer_size(actual);
        let desired_size = integer_size(desired);
        if actual_size > desired_size {
            return Mutation::Incompatible(node);
        }
        debug!("widening {} to {}", actual, desired);
        return Mutation::Fit(Node::branch(Op::Widen, desired, node, None, Payload::None));
    }

    if actual.is_pointer() && op.is_none() && actual == desired {
        return Mutation::Fit(node);
    }

    if matches!(op, Some(Op::Add) | Some(Op::Subtract)) && actual.is_integer() && desired.is_pointer() {
        if let Ok(pointee) = desired.value_at() {
            if let Ok(size) = pointee.primitive_size() {
                if size > 1 {
                    debug!("scaling index by {} for {}", size, desired);
                    return Mutation::Fit(Node::branch(
                        Op::Scale,
                        desired,
                        node,
                        None,
                        Payload::Scale(size),
                    ));
                }
                return Mutation::Fit(node);
            }
        }
    }

    Mutation::Incompatible(node)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pointer_round_trip_at_every_legal_depth() {
        for base in [Type::CHAR, Type::INT, Type::LONG, Type::VOID] {
            let mut ty = base;
            for depth in 0..15 {
                assert_eq!(ty.indirection(), depth);
                let deeper = ty.pointer_to().unwrap();
                assert_eq!(deeper.value_at().unwrap(), ty);
                ty = deeper;
            }
        }
    }

    #[test]
    fn indirection_overflows_at_fifteen() {
        let mut ty = Type::INT;
        for _ in 0..15 {
            ty = ty.pointer_to().unwrap();
        }
        assert_eq!(ty.pointer_to(), Err(TypeError::IndirectionOverflow(ty)));
    }

    #[test]
    fn value_at_rejects_non_pointers() {
        assert_eq!(Type::INT.value_at(), Err(TypeError::NotAPointer(Type::INT)));
    }

    #[test]
    fn primitive_sizes() {
        assert_eq!(Type::CHAR.primitive_size(), Ok(1));
        assert_eq!(Type::INT.primitive_size(), Ok(4));
        assert_eq!(Type::LONG.primitive_size(), Ok(8));
        assert_eq!(Type::CHAR.pointer_to().unwrap().primitive_size(), Ok(8));
        assert!(Type::VOID.primitive_size().is_err());
        assert!(Type::STRUCT.primitive_size().is_err());
    }

    fn int_leaf(ty: Type) -> Node {
        Node::leaf(Op::IntLiteral, ty, None, Payload::Int(1))
    }

    #[test]
    fn widening_wraps_the_smaller_side() {
        match mutate_type(int_leaf(Type::CHAR), Type::LONG, Some(Op::Add)) {
            Mutation::Fit(node) => {
                assert_eq!(node.op, Op::Widen);
                assert_eq!(node.ty, Type::LONG);
                assert_eq!(node.left.as_ref().unwrap().ty, Type::CHAR);
            }
            Mutation::Incompatible(_) => panic!("char should widen to long"),
        }
    }

    #[test]
    fn equal_integers_pass_through_unchanged() {
        match mutate_type(int_leaf(Type::INT), Type::INT, Some(Op::Add)) {
            Mutation::Fit(node) => assert_eq!(node.op, Op::IntLiteral),
            Mutation::Incompatible(_) => panic!("int should fit int"),
        }
    }

    #[test]
    fn narrowing_is_refused() {
        assert!(matches!(
            mutate_type(int_leaf(Type::LONG), Type::CHAR, None),
            Mutation::Incompatible(_)
        ));
    }

    #[test]
    fn pointer_assignment_of_identical_types() {
        let ptr = Type::INT.pointer_to().unwrap();
        match mutate_type(int_leaf(ptr), ptr, None) {
            Mutation::Fit(node) => assert_eq!(node.op, Op::IntLiteral),
            Mutation::Incompatible(_) => panic!("int* should assign to int*"),
        }
    }

    #[test]
    fn pointer_arithmetic_scales_the_integer_side() {
        let long_ptr = Type::LONG.pointer_to().unwrap();
        match mutate_type(int_leaf(Type::INT), long_ptr, Some(Op::Add)) {
            Mutation::Fit(node) => {
                assert_eq!(node.op, Op::Scale);
                assert_eq!(node.ty, long_ptr);
                assert_eq!(node.payload, Payload::Scale(8));
            }
            Mutation::Incompatible(_) => panic!("int + long* should scale"),
        }
    }

    #[test]
    fn byte_pointees_need_no_scaling() {
        let char_ptr = Type::CHAR.pointer_to().unwrap();
        match mutate_type(int_leaf(Type::INT), char_ptr, Some(Op::Add)) {
            Mutation::Fit(node) => assert_eq!(node.op, Op::IntLiteral),
            Mutation::Incompatible(_) => panic!("int + char* should fit"),
        }
    }

    #[test]
    fn mismatched_pointers_are_incompatible() {
        let int_ptr = Type::INT.pointer_to().unwrap();
        let char_ptr = Type::CHAR.pointer_to().unwrap();
        assert!(matches!(
            mutate_type(int_leaf(char_ptr), int_ptr, None),
            Mutation::Incompatible(_)
        ));
    }

    #[test]
    fn compatibility_reports_the_side_to_widen() {
        assert_eq!(compatible(Type::CHAR, Type::INT, false), Some(Widen::Left));
        assert_eq!(compatible(Type::LONG, Type::INT, false), Some(Widen::Right));
        assert_eq!(compatible(Type::LONG, Type::INT, true), None);
        assert_eq!(compatible(Type::INT, Type::INT, true), Some(Widen::Neither));
        assert_eq!(compatible(Type::VOID, Type::INT, false), None);
    }
}
