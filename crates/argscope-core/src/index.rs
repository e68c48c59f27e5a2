//! # Name Index
//!
//! Name to node lookup over a [`DieTree`].
//!
//! Building the index costs one pass over the arena and a map entry per
//! distinct name; after that each lookup is a hash probe instead of a scan
//! of every node. Whether to pay that up front is the caller's choice at
//! `open` time. Both paths answer through [`Lookup::find`] and return the
//! same ids in the same (ascending) order.

use std::collections::HashMap;

use smallvec::SmallVec;
use tracing::debug;

use crate::tree::{DieTree, NodeId, NodeKind};

/// Most names map to one node; duplicated inline copies add a second.
pub type Matches = SmallVec<[NodeId; 2]>;

/// Name → nodes, covering short, linkage and qualified names.
#[derive(Debug, Default)]
pub struct NameIndex
{
    entries: HashMap<String, Matches>,
}

impl NameIndex
{
    #[must_use]
    pub fn build(tree: &DieTree) -> Self
    {
        let mut entries: HashMap<String, Matches> = HashMap::new();
        for (id, node) in tree.iter() {
            for name in node.names() {
                entries.entry(name.to_string()).or_default().push(id);
            }
        }
        debug!(names = entries.len(), "built name index");
        Self { entries }
    }

    /// Ids registered under `name`, ascending.
    #[must_use]
    pub fn get(&self, name: &str) -> &[NodeId]
    {
        self.entries.get(name).map_or(&[], |matches| matches.as_slice())
    }

    #[must_use]
    pub fn len(&self) -> usize
    {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool
    {
        self.entries.is_empty()
    }
}

/// The single lookup path used by every query.
///
/// Holds an index when one was built at open time, and scans the tree
/// otherwise.
#[derive(Debug, Default)]
pub struct Lookup
{
    index: Option<NameIndex>,
}

impl Lookup
{
    #[must_use]
    pub fn new(tree: &DieTree, build_index: bool) -> Self
    {
        Self {
            index: build_index.then(|| NameIndex::build(tree)),
        }
    }

    #[must_use]
    pub fn is_indexed(&self) -> bool
    {
        self.index.is_some()
    }

    #[must_use]
    pub fn index(&self) -> Option<&NameIndex>
    {
        self.index.as_ref()
    }

    /// Every node answering to `name`, optionally narrowed to one kind.
    #[must_use]
    pub fn find(&self, tree: &DieTree, name: &str, kind: Option<NodeKind>) -> Matches
    {
        let wanted = |id: &NodeId| kind.is_none_or(|kind| tree.node(*id).kind() == kind);
        match &self.index {
            Some(index) => index.get(name).iter().copied().filter(wanted).collect(),
            None => tree
                .iter()
                .filter(|(_, node)| node.answers_to(name))
                .map(|(id, _)| id)
                .filter(wanted)
                .collect(),
        }
    }
}
