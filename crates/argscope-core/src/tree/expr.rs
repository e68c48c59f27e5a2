//! DWARF location expression decoding.
//!
//! We only need to recognise the shapes compilers emit for function
//! arguments and struct members, so this is a tiny stack evaluator rather
//! than a full DWARF expression machine: registers, frame-base and CFA
//! relative offsets, and constant arithmetic on top of them. Anything else
//! decodes to [`LocationExpr::Other`] (present, but not interpretable).

use gimli::{Encoding, Expression, Operation, Reader};

/// A decoded `DW_AT_location`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LocationExpr
{
    /// `DW_OP_regN` / `DW_OP_regx`: the value lives in a register.
    Register(u16),
    /// `DW_OP_bregN offset`: memory at register + offset.
    RegisterOffset
    {
        register: u16, offset: i64
    },
    /// `DW_OP_fbreg offset`: memory at frame base + offset.
    FrameOffset(i64),
    /// `DW_OP_call_frame_cfa` plus a constant: memory at CFA + offset.
    CfaOffset(i64),
    /// `DW_OP_addr`: static storage.
    Address(u64),
    /// A location list; valid, but the location depends on the pc.
    List,
    /// Decodable, but not a shape we interpret.
    Other,
}

impl LocationExpr
{
    /// Offset from the stack-argument base, for frame- or CFA-relative forms.
    #[must_use]
    pub fn stack_offset(self) -> Option<i64>
    {
        match self {
            LocationExpr::FrameOffset(offset) | LocationExpr::CfaOffset(offset) => Some(offset),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Term
{
    Loc(LocationExpr),
    Const(i64),
}

impl Term
{
    fn add(self, value: i64) -> Term
    {
        match self {
            Term::Const(base) => Term::Const(base.wrapping_add(value)),
            Term::Loc(LocationExpr::FrameOffset(offset)) => Term::Loc(LocationExpr::FrameOffset(offset.wrapping_add(value))),
            Term::Loc(LocationExpr::CfaOffset(offset)) => Term::Loc(LocationExpr::CfaOffset(offset.wrapping_add(value))),
            Term::Loc(LocationExpr::RegisterOffset { register, offset }) => Term::Loc(LocationExpr::RegisterOffset {
                register,
                offset: offset.wrapping_add(value),
            }),
            Term::Loc(_) => Term::Loc(LocationExpr::Other),
        }
    }
}

/// Decode a location expression into the first location it describes.
///
/// For composite (`DW_OP_piece`) locations the first piece wins; a
/// probe reads an argument from where it starts.
pub(crate) fn decode_location<R: Reader>(expr: Expression<R>, encoding: Encoding) -> gimli::Result<LocationExpr>
{
    let mut stack: Vec<Term> = Vec::new();
    let mut first_piece = None;
    let mut ops = expr.operations(encoding);

    while let Some(op) = ops.next()? {
        match op {
            Operation::Nop => {}
            Operation::Register { register } => stack.push(Term::Loc(LocationExpr::Register(register.0))),
            Operation::RegisterOffset { register, offset, .. } => {
                stack.push(Term::Loc(LocationExpr::RegisterOffset {
                    register: register.0,
                    offset,
                }));
            }
            Operation::FrameOffset { offset } => stack.push(Term::Loc(LocationExpr::FrameOffset(offset))),
            Operation::CallFrameCFA => stack.push(Term::Loc(LocationExpr::CfaOffset(0))),
            Operation::Address { address } => stack.push(Term::Loc(LocationExpr::Address(address))),
            Operation::UnsignedConstant { value } => stack.push(Term::Const(value as i64)),
            Operation::SignedConstant { value } => stack.push(Term::Const(value)),
            Operation::PlusConstant { value } => {
                let Some(top) = stack.pop() else {
                    return Ok(LocationExpr::Other);
                };
                stack.push(top.add(value as i64));
            }
            Operation::Plus | Operation::Minus => {
                let (Some(rhs), Some(lhs)) = (stack.pop(), stack.pop()) else {
                    return Ok(LocationExpr::Other);
                };
                let negate = matches!(op, Operation::Minus);
                let combined = match (lhs, rhs) {
                    (term, Term::Const(value)) => term.add(if negate { value.wrapping_neg() } else { value }),
                    (Term::Const(value), term) if !negate => term.add(value),
                    _ => Term::Loc(LocationExpr::Other),
                };
                stack.push(combined);
            }
            Operation::Piece { .. } => {
                if first_piece.is_none() {
                    first_piece = stack.pop();
                }
                stack.clear();
            }
            _ => return Ok(LocationExpr::Other),
        }
    }

    Ok(match first_piece.or_else(|| stack.pop()) {
        Some(Term::Loc(location)) => location,
        Some(Term::Const(_)) | None => LocationExpr::Other,
    })
}

/// Decode an expression-form `DW_AT_data_member_location`.
///
/// The struct's base address is implicitly on the stack, so the member
/// offset is whatever constant gets added to it.
pub(crate) fn decode_member_offset<R: Reader>(expr: Expression<R>, encoding: Encoding) -> gimli::Result<Option<u64>>
{
    let mut offset: u64 = 0;
    let mut pending: Option<u64> = None;
    let mut ops = expr.operations(encoding);

    while let Some(op) = ops.next()? {
        match op {
            Operation::Nop => {}
            Operation::PlusConstant { value } => offset = offset.wrapping_add(value),
            Operation::UnsignedConstant { value } => pending = Some(value),
            Operation::Plus => match pending.take() {
                Some(value) => offset = offset.wrapping_add(value),
                None => return Ok(None),
            },
            _ => return Ok(None),
        }
    }

    Ok(Some(offset))
}
