//! # Debug-Info Reader
//!
//! The query façade: open a binary once, then ask layout questions by name.
//!
//! ```rust,no_run
//! use argscope_core::DwarfReader;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>>
//! {
//!     let reader = DwarfReader::open("/path/to/binary", true)?;
//!
//!     for (name, arg) in reader.function_arg_info("main.(*Vertex).Scale")? {
//!         println!("{name}: {} {} at {}", arg.var_type, arg.type_name, arg.location);
//!     }
//!
//!     let goid = reader.struct_member_offset("runtime.g", "goid")?;
//!     println!("goid at +{goid}");
//!     Ok(())
//! }
//! ```
//!
//! ## Thread Safety
//!
//! A `DwarfReader` is immutable after `open` returns and is `Send + Sync`.
//! Share it behind an `Arc` and query from as many threads as needed.

use std::collections::BTreeMap;
use std::{fs, io};
use std::ops::Deref;
use std::path::{Path, PathBuf};

use tracing::{debug, trace};

use crate::abi::{AbiResolver, Slot};
use crate::error::{DwarfError, Missing, Result};
use crate::index::Lookup;
use crate::resolve::TypeResolver;
use crate::tree::loader::load_tree;
use crate::tree::{DieTree, Node, NodeId, NodeKind};
use crate::types::{ArgInfo, ArgLocation, LocationType, RetValInfo, SourceLanguage};

/// Options fixed at open time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderOptions
{
    /// Build the name index eagerly. Costs one pass and some memory at open
    /// time; makes each lookup a hash probe instead of a full scan.
    pub build_index: bool,
}

impl Default for ReaderOptions
{
    fn default() -> Self
    {
        Self { build_index: true }
    }
}

impl ReaderOptions
{
    #[must_use]
    pub fn with_index(mut self, build_index: bool) -> Self
    {
        self.build_index = build_index;
        self
    }
}

/// A node of the debug-info tree, paired with its id.
#[derive(Debug, Clone, Copy)]
pub struct NodeRef<'a>
{
    id: NodeId,
    node: &'a Node,
}

impl NodeRef<'_>
{
    #[must_use]
    pub fn id(&self) -> NodeId
    {
        self.id
    }
}

impl Deref for NodeRef<'_>
{
    type Target = Node;

    fn deref(&self) -> &Node
    {
        self.node
    }
}

/// Read-only view over one binary's DWARF.
#[derive(Debug)]
pub struct DwarfReader
{
    path: PathBuf,
    tree: DieTree,
    lookup: Lookup,
}

impl DwarfReader
{
    /// Open a binary and load its debug info.
    ///
    /// ## Errors
    ///
    /// - `NotFound` if `path` is not a readable file
    /// - `Io` if reading fails for another reason
    /// - `NoDebugInfo` if the binary has no `.debug_info` (e.g. stripped)
    /// - `Corrupt` if the container or DWARF cannot be decoded
    pub fn open(path: impl AsRef<Path>, build_index: bool) -> Result<Self>
    {
        Self::open_with(path, ReaderOptions::default().with_index(build_index))
    }

    pub fn open_with(path: impl AsRef<Path>, options: ReaderOptions) -> Result<Self>
    {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(DwarfError::NotFound(Missing::Path(path.to_path_buf())));
        }
        let data = fs::read(path).map_err(|err| read_error(path, err))?;
        Self::load(&data, path.to_path_buf(), options)
    }

    /// Load from an in-memory object file.
    pub fn parse(data: &[u8], options: ReaderOptions) -> Result<Self>
    {
        Self::load(data, PathBuf::from("<memory>"), options)
    }

    fn load(data: &[u8], path: PathBuf, options: ReaderOptions) -> Result<Self>
    {
        let tree = load_tree(data, &path)?;
        let lookup = Lookup::new(&tree, options.build_index);
        debug!(
            path = %path.display(),
            units = tree.units().len(),
            nodes = tree.len(),
            indexed = lookup.is_indexed(),
            "opened debug info"
        );
        Ok(Self { path, tree, lookup })
    }

    #[must_use]
    pub fn path(&self) -> &Path
    {
        &self.path
    }

    #[must_use]
    pub fn tree(&self) -> &DieTree
    {
        &self.tree
    }

    #[must_use]
    pub fn unit_count(&self) -> usize
    {
        self.tree.units().len()
    }

    #[must_use]
    pub fn node_count(&self) -> usize
    {
        self.tree.len()
    }

    #[must_use]
    pub fn is_indexed(&self) -> bool
    {
        self.lookup.is_indexed()
    }

    #[must_use]
    pub fn node(&self, id: NodeId) -> NodeRef<'_>
    {
        NodeRef {
            id,
            node: self.tree.node(id),
        }
    }

    /// The binary's predominant language.
    ///
    /// The first unit in a recognised language family wins; failing that,
    /// the first unit that declares any language. Runtime units written in
    /// assembly therefore never mask the program's own language.
    #[must_use]
    pub fn source_language(&self) -> Option<SourceLanguage>
    {
        let mut languages = self.tree.units().iter().filter_map(|unit| unit.language());
        let first = languages.next()?;
        if first.is_known() {
            return Some(first);
        }
        languages.find(|language| language.is_known()).or(Some(first))
    }

    /// Language of the unit that defines `function_name`.
    pub fn function_language(&self, function_name: &str) -> Result<Option<SourceLanguage>>
    {
        let function = self.find_function(function_name)?;
        Ok(self.tree.unit_of(function).language())
    }

    /// Every node answering to `name`, in tree order.
    ///
    /// Short, linkage and qualified names all match. Pass a kind to narrow
    /// the search, e.g. `Some(NodeKind::Function)`.
    #[must_use]
    pub fn matching_nodes(&self, name: &str, kind: Option<NodeKind>) -> Vec<NodeRef<'_>>
    {
        self.lookup
            .find(&self.tree, name, kind)
            .into_iter()
            .map(|id| self.node(id))
            .collect()
    }

    /// Byte offset of `member_name` within the struct `struct_name`.
    ///
    /// Members of unions sit at offset 0 even without
    /// `DW_AT_data_member_location`.
    pub fn struct_member_offset(&self, struct_name: &str, member_name: &str) -> Result<u64>
    {
        let definition = self.find_struct(struct_name)?;
        let is_union = self.tree.node(definition).tag() == gimli::DW_TAG_union_type;
        let member = self
            .tree
            .children_of_kind(definition, NodeKind::Member)
            .find(|member| self.tree.node(*member).name() == Some(member_name))
            .ok_or_else(|| {
                DwarfError::NotFound(Missing::Member {
                    struct_name: struct_name.to_string(),
                    member: member_name.to_string(),
                })
            })?;

        match self.tree.node(member).member_offset() {
            Some(offset) => Ok(offset),
            None if is_union => Ok(0),
            None => Err(DwarfError::IncompleteType(format!(
                "member {member_name} of {struct_name} has no data member location"
            ))),
        }
    }

    /// Byte size of the resolved type of one formal parameter.
    pub fn argument_byte_size(&self, function_name: &str, arg_name: &str) -> Result<u64>
    {
        let function = self.find_function(function_name)?;
        let convention = self.convention_of(function);
        let formal = self.find_formal(function, function_name, arg_name, convention)?;
        let types = self.types();
        Ok(types.resolve(self.tree.node(formal).type_ref())?.byte_size)
    }

    /// Where a probe reads one formal parameter at function entry.
    ///
    /// Return slots of stack-convention functions are accepted by their
    /// declared or synthetic (`~r{n}`) name.
    pub fn argument_location(&self, function_name: &str, arg_name: &str) -> Result<ArgLocation>
    {
        let function = self.find_function(function_name)?;
        let convention = self.convention_of(function);
        let formal = self.find_formal(function, function_name, arg_name, convention)?;

        let types = self.types();
        let abi = AbiResolver::new(&self.tree, &types);
        let location = abi.location_of(function, formal, convention)?.ok_or_else(|| {
            DwarfError::NotFound(Missing::Location {
                function: function_name.to_string(),
                argument: arg_name.to_string(),
            })
        })?;
        trace!(function = function_name, argument = arg_name, %location, "resolved argument location");
        Ok(location)
    }

    /// Every formal parameter and return slot of `function_name`.
    ///
    /// Keys are the declared names, or the synthetic `~r{n}` / `~a{n}`
    /// names for unnamed results and parameters.
    pub fn function_arg_info(&self, function_name: &str) -> Result<BTreeMap<String, ArgInfo>>
    {
        let function = self.find_function(function_name)?;
        let convention = self.convention_of(function);
        let types = self.types();
        let abi = AbiResolver::new(&self.tree, &types);

        let mut args = BTreeMap::new();
        for Slot {
            formal,
            name,
            location,
            is_retval,
            optimized_out,
        } in abi.layout(function, convention)?
        {
            if optimized_out {
                return Err(DwarfError::NotFound(Missing::Location {
                    function: function_name.to_string(),
                    argument: name,
                }));
            }
            let resolved = types.resolve(self.tree.node(formal).type_ref())?;
            let mut info = ArgInfo::new(resolved.var_type, resolved.type_name, location);
            if is_retval {
                info = info.retval();
            }
            args.insert(name, info);
        }
        debug!(function = function_name, args = args.len(), %convention, "resolved argument layout");
        Ok(args)
    }

    /// The declared return type of `function_name`.
    ///
    /// Functions without `DW_AT_type` return [`RetValInfo::void`]. Go
    /// functions declare results as formals instead; see
    /// [`function_arg_info`](Self::function_arg_info).
    pub fn function_retval_info(&self, function_name: &str) -> Result<RetValInfo>
    {
        let function = self.find_function(function_name)?;
        let resolved = self.types().resolve(self.tree.node(function).type_ref())?;
        Ok(RetValInfo {
            var_type: resolved.var_type,
            type_name: resolved.type_name,
            byte_size: resolved.byte_size,
        })
    }

    fn types(&self) -> TypeResolver<'_>
    {
        TypeResolver::new(&self.tree, &self.lookup)
    }

    /// Conventions follow the function's own unit, then the binary's.
    fn convention_of(&self, function: NodeId) -> LocationType
    {
        self.tree
            .unit_of(function)
            .language()
            .or_else(|| self.source_language())
            .map_or(LocationType::Register, SourceLanguage::convention)
    }

    /// Pick the one subprogram a name refers to.
    ///
    /// Definitions with code beat declarations and abstract inline
    /// instances; if nothing has code, non-declarations are kept.
    fn find_function(&self, name: &str) -> Result<NodeId>
    {
        let candidates = self.lookup.find(&self.tree, name, Some(NodeKind::Function));
        if candidates.is_empty() {
            return Err(DwarfError::function(name));
        }

        let with_code: Vec<NodeId> = candidates.iter().copied().filter(|id| self.tree.node(*id).has_code()).collect();
        let chosen = if with_code.is_empty() {
            candidates
                .iter()
                .copied()
                .filter(|id| !self.tree.node(*id).is_declaration())
                .collect()
        } else {
            with_code
        };
        unique(name, &chosen, || DwarfError::function(name))
    }

    fn find_struct(&self, name: &str) -> Result<NodeId>
    {
        let definitions: Vec<NodeId> = self
            .lookup
            .find(&self.tree, name, Some(NodeKind::Struct))
            .into_iter()
            .filter(|id| !self.tree.node(*id).is_declaration())
            .collect();
        unique(name, &definitions, || DwarfError::NotFound(Missing::Struct(name.to_string())))
    }

    fn find_formal(&self, function: NodeId, function_name: &str, arg_name: &str, convention: LocationType) -> Result<NodeId>
    {
        let types = self.types();
        AbiResolver::new(&self.tree, &types)
            .formals(function, convention)
            .into_iter()
            .find(|(_, name)| name == arg_name)
            .map(|(id, _)| id)
            .ok_or_else(|| DwarfError::argument(function_name, arg_name))
    }
}

fn unique(name: &str, ids: &[NodeId], missing: impl FnOnce() -> DwarfError) -> Result<NodeId>
{
    match ids {
        [] => Err(missing()),
        [id] => Ok(*id),
        _ => Err(DwarfError::Ambiguous {
            name: name.to_string(),
            count: ids.len(),
        }),
    }
}

/// Unreadable files are treated like missing ones.
fn read_error(path: &Path, err: io::Error) -> DwarfError
{
    match err.kind() {
        io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => {
            DwarfError::NotFound(Missing::Path(path.to_path_buf()))
        }
        _ => DwarfError::Io(err),
    }
}
