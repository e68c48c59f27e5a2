//! Type classification and sizing.
//!
//! Follows a `DW_AT_type` chain to something with a byte size and
//! classifies it into a [`VarType`]. Typedefs and cv-qualifiers are
//! transparent; pointers stop the walk (their size never depends on the
//! pointee).

use crate::error::{DwarfError, Result};
use crate::index::Lookup;
use crate::tree::{DieTree, NodeId, NodeKind};
use crate::types::VarType;

const MAX_TYPE_REF_DEPTH: usize = 32;

/// Outcome of resolving a type reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedType
{
    pub var_type: VarType,
    pub type_name: String,
    pub byte_size: u64,
}

impl ResolvedType
{
    fn void() -> Self
    {
        Self {
            var_type: VarType::Void,
            type_name: String::new(),
            byte_size: 0,
        }
    }
}

pub(crate) struct TypeResolver<'a>
{
    tree: &'a DieTree,
    lookup: &'a Lookup,
}

impl<'a> TypeResolver<'a>
{
    pub(crate) fn new(tree: &'a DieTree, lookup: &'a Lookup) -> Self
    {
        Self { tree, lookup }
    }

    /// Resolve an optional type reference; `None` is `void`.
    pub(crate) fn resolve(&self, type_ref: Option<NodeId>) -> Result<ResolvedType>
    {
        match type_ref {
            Some(id) => self.resolve_at(id, 0),
            None => Ok(ResolvedType::void()),
        }
    }

    fn resolve_at(&self, id: NodeId, depth: usize) -> Result<ResolvedType>
    {
        if depth >= MAX_TYPE_REF_DEPTH {
            return Err(DwarfError::IncompleteType(format!("type reference chain too deep at {id}")));
        }

        let node = self.tree.node(id);
        match node.kind() {
            NodeKind::Typedef | NodeKind::Qualifier => match node.type_ref {
                Some(inner) => self.resolve_at(inner, depth + 1),
                None => Ok(ResolvedType::void()),
            },
            NodeKind::Pointer => Ok(ResolvedType {
                var_type: VarType::Pointer,
                type_name: self.display_name(node.type_ref, depth + 1),
                byte_size: u64::from(self.tree.unit_of(id).address_size()),
            }),
            NodeKind::Struct => {
                let definition = self.definition_of(id);
                let byte_size = self.declared_size(definition)?;
                Ok(ResolvedType {
                    var_type: VarType::Struct,
                    type_name: node.name.clone().unwrap_or_default(),
                    byte_size,
                })
            }
            NodeKind::BaseType => Ok(ResolvedType {
                var_type: VarType::BaseType,
                type_name: node.name.clone().unwrap_or_default(),
                byte_size: self.declared_size(id)?,
            }),
            NodeKind::Enumeration => {
                // Enums without DW_AT_byte_size take their underlying type's size.
                let byte_size = match (node.byte_size, node.type_ref) {
                    (Some(size), _) => size,
                    (None, Some(underlying)) => self.resolve_at(underlying, depth + 1)?.byte_size,
                    (None, None) => return Err(self.incomplete(id)),
                };
                Ok(ResolvedType {
                    var_type: VarType::BaseType,
                    type_name: node.name.clone().unwrap_or_default(),
                    byte_size,
                })
            }
            NodeKind::Array => Ok(ResolvedType {
                var_type: VarType::Unknown,
                type_name: self.display_name(Some(id), depth),
                byte_size: self.array_size(id, depth)?,
            }),
            _ => Ok(ResolvedType {
                var_type: VarType::Unknown,
                type_name: node.name.clone().unwrap_or_default(),
                byte_size: self.declared_size(id)?,
            }),
        }
    }

    /// Natural alignment of a type, used to lay out stack arguments.
    pub(crate) fn alignment(&self, type_ref: Option<NodeId>) -> Result<u64>
    {
        match type_ref {
            Some(id) => self.alignment_at(id, 0),
            None => Ok(1),
        }
    }

    fn alignment_at(&self, id: NodeId, depth: usize) -> Result<u64>
    {
        if depth >= MAX_TYPE_REF_DEPTH {
            return Err(DwarfError::IncompleteType(format!("type reference chain too deep at {id}")));
        }

        let node = self.tree.node(id);
        let pointer_width = u64::from(self.tree.unit_of(id).address_size()).max(1);
        match node.kind() {
            NodeKind::Typedef | NodeKind::Qualifier => match node.type_ref {
                Some(inner) => self.alignment_at(inner, depth + 1),
                None => Ok(1),
            },
            NodeKind::Pointer => Ok(pointer_width),
            NodeKind::BaseType | NodeKind::Enumeration => {
                let size = self.resolve_at(id, depth)?.byte_size;
                Ok(scalar_alignment(size, pointer_width))
            }
            NodeKind::Struct => {
                let definition = self.definition_of(id);
                let mut alignment = 1;
                for member in self.tree.children_of_kind(definition, NodeKind::Member) {
                    let member_type = self.tree.node(member).type_ref;
                    if let Some(member_type) = member_type {
                        alignment = alignment.max(self.alignment_at(member_type, depth + 1)?);
                    }
                }
                Ok(alignment)
            }
            NodeKind::Array => match node.type_ref {
                Some(element) => self.alignment_at(element, depth + 1),
                None => Ok(1),
            },
            _ => Ok(1),
        }
    }

    /// Name for diagnostics; never fails.
    pub(crate) fn display_name(&self, type_ref: Option<NodeId>, depth: usize) -> String
    {
        let Some(id) = type_ref else {
            return "void".to_string();
        };
        if depth >= MAX_TYPE_REF_DEPTH {
            return String::new();
        }

        let node = self.tree.node(id);
        match node.kind() {
            NodeKind::Typedef | NodeKind::Qualifier => self.display_name(node.type_ref, depth + 1),
            NodeKind::Pointer => format!("{}*", self.display_name(node.type_ref, depth + 1)),
            NodeKind::Array => {
                let element = self.display_name(node.type_ref, depth + 1);
                let dims: String = self
                    .tree
                    .children_of_kind(id, NodeKind::Subrange)
                    .map(|subrange| match self.tree.node(subrange).count {
                        Some(count) => format!("[{count}]"),
                        None => "[]".to_string(),
                    })
                    .collect();
                format!("{element}{dims}")
            }
            _ => node.name.clone().unwrap_or_default(),
        }
    }

    fn array_size(&self, id: NodeId, depth: usize) -> Result<u64>
    {
        let node = self.tree.node(id);
        if let Some(size) = node.byte_size {
            return Ok(size);
        }

        let element = node.type_ref.ok_or_else(|| self.incomplete(id))?;
        let element_size = self.resolve_at(element, depth + 1)?.byte_size;
        let mut total = element_size;
        let mut dimensions = 0;
        for subrange in self.tree.children_of_kind(id, NodeKind::Subrange) {
            let count = self.tree.node(subrange).count.ok_or_else(|| self.incomplete(id))?;
            total = total.saturating_mul(count);
            dimensions += 1;
        }
        if dimensions == 0 {
            return Err(self.incomplete(id));
        }
        Ok(total)
    }

    fn declared_size(&self, id: NodeId) -> Result<u64>
    {
        self.tree.node(id).byte_size.ok_or_else(|| self.incomplete(id))
    }

    /// A struct declaration stands in for a definition elsewhere; find it.
    pub(crate) fn definition_of(&self, id: NodeId) -> NodeId
    {
        let node = self.tree.node(id);
        if !node.declaration {
            return id;
        }
        let Some(name) = node.name.as_deref() else {
            return id;
        };
        self.lookup
            .find(self.tree, name, Some(NodeKind::Struct))
            .into_iter()
            .find(|candidate| !self.tree.node(*candidate).declaration)
            .unwrap_or(id)
    }

    fn incomplete(&self, id: NodeId) -> DwarfError
    {
        let node = self.tree.node(id);
        DwarfError::IncompleteType(format!(
            "{} {} has no byte size",
            node.kind(),
            node.name().unwrap_or("<anonymous>")
        ))
    }
}

/// Scalars align to their size, capped at the pointer width.
fn scalar_alignment(size: u64, pointer_width: u64) -> u64
{
    let capped = size.clamp(1, pointer_width);
    // Round down to a power of two (e.g. a 12-byte long double aligns to 8 on 64-bit).
    1 << (63 - capped.leading_zeros())
}
