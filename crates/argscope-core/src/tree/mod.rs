//! # Debug-Info Tree
//!
//! An owned, read-only copy of a binary's DWARF DIE forest.
//!
//! gimli hands out DIEs that borrow the section buffers and the unit being
//! walked, which makes them awkward to keep around or share between
//! threads. At load time we copy the handful of attributes the resolvers
//! need into an arena of [`Node`]s addressed by [`NodeId`]. Every reference
//! attribute (`DW_AT_type`, `DW_AT_specification`, `DW_AT_abstract_origin`),
//! including cross-unit `DW_FORM_ref_addr` references, is resolved to a
//! `NodeId` once, so the query layer never touches gimli again.
//!
//! The arena is built once and never mutated, which is what lets a
//! `DwarfReader` answer queries from any number of threads without locking.

use std::fmt;

use gimli::{constants, DwTag};

pub(crate) mod expr;
pub(crate) mod loader;

pub use expr::LocationExpr;

use crate::types::SourceLanguage;

/// Index of a node in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u32);

impl NodeId
{
    pub(crate) fn from_index(index: usize) -> Self
    {
        // The arena never holds more than u32::MAX DIEs; the loader checks.
        NodeId(u32::try_from(index).unwrap_or(u32::MAX))
    }

    #[must_use]
    pub fn index(self) -> usize
    {
        self.0 as usize
    }
}

impl fmt::Display for NodeId
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "#{}", self.0)
    }
}

/// Index of a compile unit in [`DieTree::units`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UnitId(usize);

impl UnitId
{
    #[must_use]
    pub fn index(self) -> usize
    {
        self.0
    }
}

/// The structural role of a node, derived from its DWARF tag.
///
/// The set of tags the resolvers care about is small and closed; everything
/// else is [`NodeKind::Other`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind
{
    CompileUnit,
    Namespace,
    /// `DW_TAG_subprogram`
    Function,
    /// `DW_TAG_formal_parameter`
    Parameter,
    Variable,
    /// Structures, classes and unions.
    Struct,
    Member,
    BaseType,
    /// Pointers and (rvalue) references.
    Pointer,
    Typedef,
    /// `const`, `volatile`, `restrict` and `_Atomic` wrappers.
    Qualifier,
    Array,
    Subrange,
    Enumeration,
    SubroutineType,
    Other,
}

impl NodeKind
{
    #[must_use]
    pub fn from_tag(tag: DwTag) -> Self
    {
        match tag {
            constants::DW_TAG_compile_unit | constants::DW_TAG_partial_unit => NodeKind::CompileUnit,
            constants::DW_TAG_namespace => NodeKind::Namespace,
            constants::DW_TAG_subprogram => NodeKind::Function,
            constants::DW_TAG_formal_parameter => NodeKind::Parameter,
            constants::DW_TAG_variable => NodeKind::Variable,
            constants::DW_TAG_structure_type | constants::DW_TAG_class_type | constants::DW_TAG_union_type => {
                NodeKind::Struct
            }
            constants::DW_TAG_member => NodeKind::Member,
            constants::DW_TAG_base_type | constants::DW_TAG_unspecified_type => NodeKind::BaseType,
            constants::DW_TAG_pointer_type | constants::DW_TAG_reference_type | constants::DW_TAG_rvalue_reference_type => {
                NodeKind::Pointer
            }
            constants::DW_TAG_typedef => NodeKind::Typedef,
            constants::DW_TAG_const_type
            | constants::DW_TAG_volatile_type
            | constants::DW_TAG_restrict_type
            | constants::DW_TAG_atomic_type => NodeKind::Qualifier,
            constants::DW_TAG_array_type => NodeKind::Array,
            constants::DW_TAG_subrange_type => NodeKind::Subrange,
            constants::DW_TAG_enumeration_type => NodeKind::Enumeration,
            constants::DW_TAG_subroutine_type => NodeKind::SubroutineType,
            _ => NodeKind::Other,
        }
    }

    /// Kinds that name a scope in a C++ qualified name.
    fn is_scope(self) -> bool
    {
        matches!(self, NodeKind::Namespace | NodeKind::Struct)
    }

    /// Kinds that get a qualified name registered in the index.
    fn is_qualifiable(self) -> bool
    {
        matches!(
            self,
            NodeKind::Function | NodeKind::Struct | NodeKind::Variable | NodeKind::Typedef | NodeKind::Enumeration
        )
    }
}

impl fmt::Display for NodeKind
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let label = match self {
            NodeKind::CompileUnit => "compile_unit",
            NodeKind::Namespace => "namespace",
            NodeKind::Function => "function",
            NodeKind::Parameter => "parameter",
            NodeKind::Variable => "variable",
            NodeKind::Struct => "struct",
            NodeKind::Member => "member",
            NodeKind::BaseType => "base_type",
            NodeKind::Pointer => "pointer",
            NodeKind::Typedef => "typedef",
            NodeKind::Qualifier => "qualifier",
            NodeKind::Array => "array",
            NodeKind::Subrange => "subrange",
            NodeKind::Enumeration => "enumeration",
            NodeKind::SubroutineType => "subroutine_type",
            NodeKind::Other => "other",
        };
        write!(f, "{label}")
    }
}

/// One DIE, with the attributes the resolvers use.
#[derive(Debug, Clone)]
pub struct Node
{
    pub(crate) tag: DwTag,
    pub(crate) unit: UnitId,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) name: Option<String>,
    pub(crate) linkage_name: Option<String>,
    pub(crate) qualified_name: Option<String>,
    pub(crate) type_ref: Option<NodeId>,
    /// `DW_AT_specification` or `DW_AT_abstract_origin`.
    pub(crate) origin: Option<NodeId>,
    pub(crate) byte_size: Option<u64>,
    pub(crate) member_offset: Option<u64>,
    pub(crate) location: Option<LocationExpr>,
    /// Element count of a subrange.
    pub(crate) count: Option<u64>,
    pub(crate) declaration: bool,
    pub(crate) artificial: bool,
    /// Go marks result parameters with `DW_AT_variable_parameter`.
    pub(crate) variable_parameter: bool,
    pub(crate) has_code: bool,
}

impl Node
{
    pub(crate) fn new(tag: DwTag, unit: UnitId, parent: Option<NodeId>) -> Self
    {
        Self {
            tag,
            unit,
            parent,
            children: Vec::new(),
            name: None,
            linkage_name: None,
            qualified_name: None,
            type_ref: None,
            origin: None,
            byte_size: None,
            member_offset: None,
            location: None,
            count: None,
            declaration: false,
            artificial: false,
            variable_parameter: false,
            has_code: false,
        }
    }

    #[must_use]
    pub fn tag(&self) -> DwTag
    {
        self.tag
    }

    #[must_use]
    pub fn kind(&self) -> NodeKind
    {
        NodeKind::from_tag(self.tag)
    }

    #[must_use]
    pub fn unit(&self) -> UnitId
    {
        self.unit
    }

    #[must_use]
    pub fn parent(&self) -> Option<NodeId>
    {
        self.parent
    }

    #[must_use]
    pub fn children(&self) -> &[NodeId]
    {
        &self.children
    }

    /// Short name (`DW_AT_name`), possibly inherited from a specification.
    #[must_use]
    pub fn name(&self) -> Option<&str>
    {
        self.name.as_deref()
    }

    /// Mangled name (`DW_AT_linkage_name`).
    #[must_use]
    pub fn linkage_name(&self) -> Option<&str>
    {
        self.linkage_name.as_deref()
    }

    /// `ns::Class::name` path for C++ and Rust units.
    #[must_use]
    pub fn qualified_name(&self) -> Option<&str>
    {
        self.qualified_name.as_deref()
    }

    /// Every distinct name this node answers to.
    pub fn names(&self) -> impl Iterator<Item = &str>
    {
        let name = self.name();
        let linkage = self.linkage_name().filter(|linkage| Some(*linkage) != name);
        let qualified = self
            .qualified_name()
            .filter(|qualified| Some(*qualified) != name && Some(*qualified) != linkage);
        name.into_iter().chain(linkage).chain(qualified)
    }

    #[must_use]
    pub fn answers_to(&self, wanted: &str) -> bool
    {
        self.name() == Some(wanted) || self.linkage_name() == Some(wanted) || self.qualified_name() == Some(wanted)
    }

    #[must_use]
    pub fn type_ref(&self) -> Option<NodeId>
    {
        self.type_ref
    }

    #[must_use]
    pub fn byte_size(&self) -> Option<u64>
    {
        self.byte_size
    }

    #[must_use]
    pub fn member_offset(&self) -> Option<u64>
    {
        self.member_offset
    }

    #[must_use]
    pub fn location(&self) -> Option<LocationExpr>
    {
        self.location
    }

    #[must_use]
    pub fn is_declaration(&self) -> bool
    {
        self.declaration
    }

    #[must_use]
    pub fn is_artificial(&self) -> bool
    {
        self.artificial
    }

    /// Result parameter of a stack-convention function.
    #[must_use]
    pub fn is_retval(&self) -> bool
    {
        self.variable_parameter
    }

    /// Whether the function has machine code (`DW_AT_low_pc` / `DW_AT_ranges`).
    #[must_use]
    pub fn has_code(&self) -> bool
    {
        self.has_code
    }
}

/// Per compile unit facts.
#[derive(Debug, Clone)]
pub struct UnitInfo
{
    pub(crate) root: NodeId,
    pub(crate) name: Option<String>,
    pub(crate) language: Option<SourceLanguage>,
    pub(crate) address_size: u8,
}

impl UnitInfo
{
    #[must_use]
    pub fn root(&self) -> NodeId
    {
        self.root
    }

    #[must_use]
    pub fn name(&self) -> Option<&str>
    {
        self.name.as_deref()
    }

    #[must_use]
    pub fn language(&self) -> Option<SourceLanguage>
    {
        self.language
    }

    /// Pointer width in bytes.
    #[must_use]
    pub fn address_size(&self) -> u8
    {
        self.address_size
    }
}

/// The arena: every node of every compile unit.
#[derive(Debug, Default)]
pub struct DieTree
{
    pub(crate) nodes: Vec<Node>,
    pub(crate) units: Vec<UnitInfo>,
}

impl DieTree
{
    #[must_use]
    pub fn len(&self) -> usize
    {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool
    {
        self.nodes.is_empty()
    }

    /// Look up a node. Ids only come from this tree, so indexing cannot miss.
    #[must_use]
    pub fn node(&self, id: NodeId) -> &Node
    {
        &self.nodes[id.index()]
    }

    /// All nodes, in depth-first order per unit.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)>
    {
        self.nodes
            .iter()
            .enumerate()
            .map(|(index, node)| (NodeId::from_index(index), node))
    }

    #[must_use]
    pub fn units(&self) -> &[UnitInfo]
    {
        &self.units
    }

    #[must_use]
    pub fn unit(&self, id: UnitId) -> &UnitInfo
    {
        &self.units[id.0]
    }

    /// Unit owning `id`.
    #[must_use]
    pub fn unit_of(&self, id: NodeId) -> &UnitInfo
    {
        self.unit(self.node(id).unit)
    }

    /// Children of `id` with the given kind, in declaration order.
    pub fn children_of_kind(&self, id: NodeId, kind: NodeKind) -> impl Iterator<Item = NodeId> + '_
    {
        self.node(id)
            .children
            .iter()
            .copied()
            .filter(move |child| self.node(*child).kind() == kind)
    }

    pub(crate) fn push(&mut self, node: Node) -> NodeId
    {
        let id = NodeId::from_index(self.nodes.len());
        if let Some(parent) = node.parent {
            self.nodes[parent.index()].children.push(id);
        }
        self.nodes.push(node);
        id
    }

    pub(crate) fn push_unit(&mut self, info: UnitInfo) -> UnitId
    {
        self.units.push(info);
        UnitId(self.units.len() - 1)
    }

    pub(crate) fn next_unit_id(&self) -> UnitId
    {
        UnitId(self.units.len())
    }

    /// Copy names and types from specification / abstract-origin targets
    /// into nodes that lack them, then compute qualified names.
    pub(crate) fn finish(&mut self)
    {
        for index in 0..self.nodes.len() {
            let Some(mut origin) = self.nodes[index].origin else {
                continue;
            };
            // Origins can chain (concrete -> abstract -> declaration).
            for _ in 0..MAX_ORIGIN_DEPTH {
                let source = &self.nodes[origin.index()];
                let (name, linkage, ty, next) =
                    (source.name.clone(), source.linkage_name.clone(), source.type_ref, source.origin);
                let node = &mut self.nodes[index];
                if node.name.is_none() {
                    node.name = name;
                }
                if node.linkage_name.is_none() {
                    node.linkage_name = linkage;
                }
                if node.type_ref.is_none() {
                    node.type_ref = ty;
                }
                match next {
                    Some(next) if next != origin => origin = next,
                    _ => break,
                }
            }
        }

        for index in 0..self.nodes.len() {
            let qualified = self.qualify(NodeId::from_index(index));
            self.nodes[index].qualified_name = qualified;
        }
    }

    fn qualify(&self, id: NodeId) -> Option<String>
    {
        let node = self.node(id);
        if !node.kind().is_qualifiable() {
            return None;
        }
        let language = self.unit_of(id).language?;
        if !language.scopes_names() {
            return None;
        }
        let name = node.name.as_deref()?;

        // Member functions defined out of line keep their scope on the declaration.
        let anchor = node.origin.unwrap_or(id);
        let mut scopes = Vec::new();
        let mut cursor = self.node(anchor).parent;
        while let Some(parent) = cursor {
            let scope = self.node(parent);
            if !scope.kind().is_scope() {
                break;
            }
            if let Some(scope_name) = scope.name.as_deref() {
                scopes.push(scope_name);
            }
            cursor = scope.parent;
        }
        if scopes.is_empty() {
            return None;
        }
        scopes.reverse();
        scopes.push(name);
        Some(scopes.join("::"))
    }
}

const MAX_ORIGIN_DEPTH: usize = 8;
