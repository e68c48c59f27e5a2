//! # ABI Location Resolver
//!
//! Places a function's formal parameters into the slots a probe reads
//! them from.
//!
//! Two conventions are supported, chosen by the function's source language:
//!
//! - **Register** (C, C++, Rust): arguments are numbered into 8-byte
//!   slots of a spilled register block. A formal's offset is the sum of
//!   its predecessors' sizes, each rounded up to 8. A formal whose DIE has
//!   no location (optimized out) cannot be probed.
//! - **Stack** (Go): every argument and result lives in the caller's frame.
//!   A decodable `DW_AT_location` (`DW_OP_call_frame_cfa` plus a constant,
//!   or `DW_OP_fbreg`) gives the offset directly; otherwise formals are laid
//!   out one after another at their natural alignment, and the first
//!   result starts on a pointer-width boundary.
//!
//! Not modelled: variadic tails and aggregates returned through a hidden
//! pointer in the first register.

use tracing::trace;

use crate::error::{DwarfError, Result};
use crate::resolve::TypeResolver;
use crate::tree::{DieTree, NodeId, NodeKind};
use crate::types::{ArgLocation, LocationType};

/// Slot width of the spilled register block.
pub const REGISTER_SLOT_SIZE: u64 = 8;

fn align_up(value: u64, align: u64) -> Result<u64>
{
    let align = align.max(1);
    value.div_ceil(align).checked_mul(align).ok_or_else(overflow)
}

fn overflow() -> DwarfError
{
    DwarfError::Corrupt("argument layout overflows the frame".to_string())
}

fn to_offset(value: u64) -> Result<i64>
{
    i64::try_from(value).map_err(|_| overflow())
}

/// Running state while walking formals in declaration order.
#[derive(Debug)]
pub struct SlotCursor
{
    convention: LocationType,
    pointer_width: u64,
    next: u64,
    in_results: bool,
}

impl SlotCursor
{
    #[must_use]
    pub fn new(convention: LocationType, pointer_width: u64) -> Self
    {
        Self {
            convention,
            pointer_width: pointer_width.max(1),
            next: 0,
            in_results: false,
        }
    }

    /// Assign the next formal a slot and advance past it.
    ///
    /// `explicit` is a decoded stack offset and only matters for the stack
    /// convention.
    ///
    /// ## Errors
    ///
    /// `Corrupt` if the sizes involved overflow the offset range.
    pub fn place(&mut self, size: u64, align: u64, is_retval: bool, explicit: Option<i64>) -> Result<ArgLocation>
    {
        match self.convention {
            LocationType::Register => {
                let offset = self.next;
                self.next = offset
                    .checked_add(align_up(size, REGISTER_SLOT_SIZE)?)
                    .ok_or_else(overflow)?;
                Ok(ArgLocation::register(to_offset(offset)?))
            }
            LocationType::Stack => {
                if is_retval && !self.in_results {
                    self.in_results = true;
                    self.next = align_up(self.next, self.pointer_width)?;
                }
                let offset = match explicit.map(u64::try_from) {
                    Some(Ok(offset)) => offset,
                    _ => align_up(self.next, align)?,
                };
                self.next = offset.checked_add(size).ok_or_else(overflow)?;
                Ok(ArgLocation::stack(to_offset(offset)?))
            }
        }
    }
}

/// A placed formal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Slot
{
    pub(crate) formal: NodeId,
    pub(crate) name: String,
    pub(crate) location: ArgLocation,
    pub(crate) is_retval: bool,
    /// Register convention only: the DIE had no location to read from.
    pub(crate) optimized_out: bool,
}

pub(crate) struct AbiResolver<'a>
{
    tree: &'a DieTree,
    types: &'a TypeResolver<'a>,
}

impl<'a> AbiResolver<'a>
{
    pub(crate) fn new(tree: &'a DieTree, types: &'a TypeResolver<'a>) -> Self
    {
        Self { tree, types }
    }

    /// Formal parameters of `function`, with their probe names.
    ///
    /// Unnamed results are called `~r{n}` and other unnamed formals
    /// `~a{n}`, with `n` the zero-based position among all formals. A Go
    /// method receiver is not counted for `~r{n}`, matching the toolchain.
    pub(crate) fn formals(&self, function: NodeId, convention: LocationType) -> Vec<(NodeId, String)>
    {
        let receivers = usize::from(convention == LocationType::Stack && self.has_receiver(function));
        self.tree
            .children_of_kind(function, NodeKind::Parameter)
            .enumerate()
            .map(|(ordinal, id)| {
                let name = match self.tree.node(id).name() {
                    Some(name) => name.to_string(),
                    None if self.is_retval(id, convention) => format!("~r{}", ordinal.saturating_sub(receivers)),
                    None => format!("~a{ordinal}"),
                };
                (id, name)
            })
            .collect()
    }

    /// `pkg.T.M` and `pkg.(*T).M` take a receiver of type `pkg.T` (or a
    /// pointer to it) as their first formal.
    fn has_receiver(&self, function: NodeId) -> bool
    {
        let Some(owner) = self.tree.node(function).name().and_then(receiver_type_name) else {
            return false;
        };
        let Some(first) = self.tree.children_of_kind(function, NodeKind::Parameter).next() else {
            return false;
        };
        if self.tree.node(first).is_retval() {
            return false;
        }

        let mut type_ref = self.tree.node(first).type_ref;
        for _ in 0..2 {
            let Some(id) = type_ref else {
                return false;
            };
            let node = self.tree.node(id);
            if node.name() == Some(owner.as_str()) {
                return true;
            }
            if node.kind() != NodeKind::Pointer {
                return false;
            }
            type_ref = node.type_ref;
        }
        false
    }

    /// `DW_AT_variable_parameter` only means "result" under the stack
    /// convention; Fortran and Ada use it for by-reference parameters.
    pub(crate) fn is_retval(&self, formal: NodeId, convention: LocationType) -> bool
    {
        convention == LocationType::Stack && self.tree.node(formal).is_retval()
    }

    /// Lay out every formal of `function` in one pass.
    pub(crate) fn layout(&self, function: NodeId, convention: LocationType) -> Result<Vec<Slot>>
    {
        let mut cursor = self.cursor(function, convention);
        let mut slots = Vec::new();
        for (formal, name) in self.formals(function, convention) {
            let location = self.advance(&mut cursor, formal, convention)?;
            slots.push(Slot {
                formal,
                name,
                location,
                is_retval: self.is_retval(formal, convention),
                optimized_out: convention == LocationType::Register && self.tree.node(formal).location().is_none(),
            });
        }
        Ok(slots)
    }

    /// Location of a single formal.
    ///
    /// Returns `None` when a register-convention formal has no location.
    pub(crate) fn location_of(&self, function: NodeId, formal: NodeId, convention: LocationType) -> Result<Option<ArgLocation>>
    {
        let node = self.tree.node(formal);
        if convention == LocationType::Register && node.location().is_none() {
            return Ok(None);
        }
        if convention == LocationType::Stack {
            match node.location().and_then(|location| location.stack_offset()) {
                Some(offset) if offset >= 0 => {
                    trace!(formal = %formal, offset, "stack offset from location expression");
                    return Ok(Some(ArgLocation::stack(offset)));
                }
                _ => {}
            }
        }

        // Replay the predecessors to find where this formal lands.
        let mut cursor = self.cursor(function, convention);
        for id in self.tree.children_of_kind(function, NodeKind::Parameter) {
            let location = self.advance(&mut cursor, id, convention)?;
            if id == formal {
                return Ok(Some(location));
            }
        }
        Ok(None)
    }

    fn cursor(&self, function: NodeId, convention: LocationType) -> SlotCursor
    {
        let pointer_width = u64::from(self.tree.unit_of(function).address_size());
        SlotCursor::new(convention, pointer_width)
    }

    fn advance(&self, cursor: &mut SlotCursor, formal: NodeId, convention: LocationType) -> Result<ArgLocation>
    {
        let node = self.tree.node(formal);
        let size = self.types.resolve(node.type_ref())?.byte_size;
        let (align, explicit) = match convention {
            LocationType::Register => (1, None),
            LocationType::Stack => (
                self.types.alignment(node.type_ref())?,
                node.location().and_then(|location| location.stack_offset()),
            ),
        };
        cursor.place(size, align, self.is_retval(formal, convention), explicit)
    }
}

/// Receiver type named by a Go method symbol: `main.(*Vertex).Scale` and
/// `main.Vertex.Abs` both give `main.Vertex`.
fn receiver_type_name(function_name: &str) -> Option<String>
{
    let (owner, _) = function_name.rsplit_once('.')?;
    match owner.split_once("(*") {
        Some((package, rest)) => Some(format!("{package}{}", rest.strip_suffix(')')?)),
        None => Some(owner.to_string()),
    }
}
