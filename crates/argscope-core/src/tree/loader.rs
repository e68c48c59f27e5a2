//! Binary loading and DWARF-to-arena conversion.
//!
//! `object` parses the container (ELF or Mach-O), we copy the DWARF
//! sections out, and `gimli` walks every compile unit. Each DIE becomes a
//! [`Node`]; reference attributes are collected as pending fix-ups and
//! patched to `NodeId`s once every unit has been walked, since
//! `DW_FORM_ref_addr` may point forward into a later unit.

use std::borrow::Cow;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use gimli::{
    constants, AttributeValue, DebuggingInformationEntry, Dwarf, DwAt, EndianArcSlice, EntriesTreeNode, Reader,
    RunTimeEndian, SectionId, Unit, UnitOffset, UnitSectionOffset,
};
use object::{Object, ObjectSection};
use tracing::{debug, warn};

use super::expr::{decode_location, decode_member_offset};
use super::{DieTree, LocationExpr, Node, NodeId, UnitId, UnitInfo};
use crate::error::{map_dwarf_error, DwarfError, Result};
use crate::types::SourceLanguage;

type OwnedReader = EndianArcSlice<RunTimeEndian>;
type OwnedDwarf = Dwarf<OwnedReader>;

const DWARF_SECTIONS: &[(&str, &[&str])] = &[
    (".debug_abbrev", &[".debug_abbrev", "__debug_abbrev"]),
    (".debug_addr", &[".debug_addr", "__debug_addr"]),
    (".debug_info", &[".debug_info", "__debug_info"]),
    (".debug_line", &[".debug_line", "__debug_line"]),
    (".debug_line_str", &[".debug_line_str", "__debug_line_str"]),
    (".debug_ranges", &[".debug_ranges", "__debug_ranges"]),
    (".debug_rnglists", &[".debug_rnglists", "__debug_rnglists"]),
    (".debug_str", &[".debug_str", "__debug_str"]),
    (".debug_str_offsets", &[".debug_str_offsets", "__debug_str_offsets"]),
    (".debug_loc", &[".debug_loc", "__debug_loc"]),
    (".debug_loclists", &[".debug_loclists", "__debug_loclists"]),
];

/// A reference attribute waiting for its target's `NodeId`.
struct Fixup
{
    from: NodeId,
    slot: RefSlot,
    unit: usize,
    offset: UnitOffset<usize>,
}

#[derive(Clone, Copy)]
enum RefSlot
{
    Type,
    Origin,
}

/// Parse an object file image and build the arena.
///
/// `origin` is only used to label `NoDebugInfo` errors.
pub(crate) fn load_tree(data: &[u8], origin: &Path) -> Result<DieTree>
{
    let file = object::File::parse(data)
        .map_err(|err| DwarfError::Corrupt(format!("failed to parse {}: {err}", origin.display())))?;

    let endian = if file.is_little_endian() {
        RunTimeEndian::Little
    } else {
        RunTimeEndian::Big
    };

    let mut sections = HashMap::new();
    for (canonical, aliases) in DWARF_SECTIONS {
        sections.insert(*canonical, load_section_bytes(&file, aliases)?);
    }

    if sections.get(".debug_info").is_none_or(|info| info.is_empty()) {
        return Err(DwarfError::NoDebugInfo(origin.to_path_buf()));
    }

    let dwarf = Dwarf::load(|section| Ok::<_, gimli::Error>(section_reader(&sections, endian, section)))
        .map_err(|err| map_dwarf_error("failed to load DWARF", err))?;

    let units = collect_units(&dwarf)?;
    if units.is_empty() {
        return Err(DwarfError::NoDebugInfo(origin.to_path_buf()));
    }

    let mut builder = TreeBuilder {
        dwarf: &dwarf,
        units: &units,
        tree: DieTree::default(),
        offsets: HashMap::new(),
        fixups: Vec::new(),
    };
    for index in 0..units.len() {
        builder.walk_unit(index)?;
    }
    let tree = builder.finish();

    debug!(
        units = tree.units().len(),
        nodes = tree.len(),
        "loaded debug info from {}",
        origin.display()
    );
    Ok(tree)
}

fn load_section_bytes(file: &object::File<'_>, names: &[&str]) -> Result<Arc<[u8]>>
{
    for name in names {
        if let Some(section) = file.section_by_name(name) {
            let data = section
                .uncompressed_data()
                .map_err(|err| DwarfError::Corrupt(format!("failed to read {name}: {err}")))?;
            return Ok(match data {
                Cow::Borrowed(bytes) => Arc::<[u8]>::from(bytes.to_vec()),
                Cow::Owned(vec) => vec.into(),
            });
        }
    }

    Ok(Arc::<[u8]>::from(Vec::new()))
}

fn section_reader(sections: &HashMap<&'static str, Arc<[u8]>>, endian: RunTimeEndian, id: SectionId) -> OwnedReader
{
    let key = match id {
        SectionId::DebugAbbrev => ".debug_abbrev",
        SectionId::DebugAddr => ".debug_addr",
        SectionId::DebugInfo => ".debug_info",
        SectionId::DebugLine => ".debug_line",
        SectionId::DebugLineStr => ".debug_line_str",
        SectionId::DebugRanges => ".debug_ranges",
        SectionId::DebugRngLists => ".debug_rnglists",
        SectionId::DebugStr => ".debug_str",
        SectionId::DebugStrOffsets => ".debug_str_offsets",
        SectionId::DebugLoc => ".debug_loc",
        SectionId::DebugLocLists => ".debug_loclists",
        _ => "",
    };

    let data = sections
        .get(key)
        .cloned()
        .unwrap_or_else(|| Arc::<[u8]>::from(Vec::new()));
    EndianArcSlice::new(data, endian)
}

fn collect_units(dwarf: &OwnedDwarf) -> Result<Vec<Unit<OwnedReader>>>
{
    let mut units = Vec::new();
    let mut headers = dwarf.units();
    while let Some(header) = headers
        .next()
        .map_err(|err| map_dwarf_error("reading .debug_info unit header", err))?
    {
        units.push(
            dwarf
                .unit(header)
                .map_err(|err| map_dwarf_error("parsing compilation unit", err))?,
        );
    }
    Ok(units)
}

struct TreeBuilder<'a>
{
    dwarf: &'a OwnedDwarf,
    units: &'a [Unit<OwnedReader>],
    tree: DieTree,
    /// (unit index, offset within unit) -> node
    offsets: HashMap<(usize, usize), NodeId>,
    fixups: Vec<Fixup>,
}

impl TreeBuilder<'_>
{
    fn walk_unit(&mut self, index: usize) -> Result<()>
    {
        let units = self.units;
        let unit = &units[index];
        let unit_id = self.tree.next_unit_id();
        let mut entries = unit
            .entries_tree(None)
            .map_err(|err| map_dwarf_error("building unit tree", err))?;
        let root = entries.root().map_err(|err| map_dwarf_error("navigating unit root", err))?;

        let language = match root
            .entry()
            .attr(constants::DW_AT_language)
            .map_err(|err| map_dwarf_error("reading DW_AT_language", err))?
            .map(|attr| attr.value())
        {
            Some(AttributeValue::Language(lang)) => Some(SourceLanguage::new(lang)),
            _ => None,
        };
        let name = self.entry_string(unit, root.entry(), constants::DW_AT_name)?;

        let root_id = self.walk_node(index, unit_id, root, None)?;
        self.tree.push_unit(UnitInfo {
            root: root_id,
            name,
            language,
            address_size: unit.encoding().address_size,
        });
        Ok(())
    }

    fn walk_node(
        &mut self,
        index: usize,
        unit_id: UnitId,
        node: EntriesTreeNode<'_, '_, '_, OwnedReader>,
        parent: Option<NodeId>,
    ) -> Result<NodeId>
    {
        let id = self.add_entry(index, unit_id, node.entry(), parent)?;
        let mut children = node.children();
        while let Some(child) = children.next().map_err(|err| map_dwarf_error("iterating DIE children", err))? {
            self.walk_node(index, unit_id, child, Some(id))?;
        }
        Ok(id)
    }

    fn add_entry(
        &mut self,
        index: usize,
        unit_id: UnitId,
        entry: &DebuggingInformationEntry<'_, '_, OwnedReader>,
        parent: Option<NodeId>,
    ) -> Result<NodeId>
    {
        if self.tree.len() >= u32::MAX as usize {
            return Err(DwarfError::Corrupt("too many debug info entries".to_string()));
        }

        let units = self.units;
        let unit = &units[index];
        let mut node = Node::new(entry.tag(), unit_id, parent);
        node.name = self.entry_string(unit, entry, constants::DW_AT_name)?;
        node.linkage_name = match self.entry_string(unit, entry, constants::DW_AT_linkage_name)? {
            Some(linkage) => Some(linkage),
            None => self.entry_string(unit, entry, constants::DW_AT_MIPS_linkage_name)?,
        };
        node.byte_size = udata(entry, constants::DW_AT_byte_size)?;
        node.member_offset = member_offset(unit, entry)?;
        node.location = location(unit, entry)?;
        node.count = match udata(entry, constants::DW_AT_count)? {
            Some(count) => Some(count),
            None => udata(entry, constants::DW_AT_upper_bound)?.map(|upper| upper.saturating_add(1)),
        };
        node.declaration = flag(entry, constants::DW_AT_declaration)?;
        node.artificial = flag(entry, constants::DW_AT_artificial)?;
        node.variable_parameter = flag(entry, constants::DW_AT_variable_parameter)?;
        node.has_code = has_attr(entry, constants::DW_AT_low_pc)? || has_attr(entry, constants::DW_AT_ranges)?;

        let type_ref = self.reference(index, entry, constants::DW_AT_type)?;
        let origin = match self.reference(index, entry, constants::DW_AT_specification)? {
            Some(target) => Some(target),
            None => self.reference(index, entry, constants::DW_AT_abstract_origin)?,
        };

        let id = self.tree.push(node);
        self.offsets.insert((index, entry.offset().0), id);
        if let Some((unit, offset)) = type_ref {
            self.fixups.push(Fixup {
                from: id,
                slot: RefSlot::Type,
                unit,
                offset,
            });
        }
        if let Some((unit, offset)) = origin {
            self.fixups.push(Fixup {
                from: id,
                slot: RefSlot::Origin,
                unit,
                offset,
            });
        }
        Ok(id)
    }

    /// Resolve a reference attribute to (unit index, offset within unit).
    fn reference(
        &self,
        index: usize,
        entry: &DebuggingInformationEntry<'_, '_, OwnedReader>,
        name: DwAt,
    ) -> Result<Option<(usize, UnitOffset<usize>)>>
    {
        let Some(attr) = entry
            .attr(name)
            .map_err(|err| map_dwarf_error("reading reference attribute", err))?
        else {
            return Ok(None);
        };

        match attr.value() {
            AttributeValue::UnitRef(offset) => Ok(Some((index, offset))),
            AttributeValue::DebugInfoRef(offset) => {
                let target = UnitSectionOffset::from(offset);
                Ok(self
                    .units
                    .iter()
                    .enumerate()
                    .find_map(|(unit_index, unit)| target.to_unit_offset(unit).map(|offset| (unit_index, offset))))
            }
            other => {
                warn!("skipping unsupported {name} form {other:?} at {:?}", entry.offset());
                Ok(None)
            }
        }
    }

    fn entry_string(
        &self,
        unit: &Unit<OwnedReader>,
        entry: &DebuggingInformationEntry<'_, '_, OwnedReader>,
        name: DwAt,
    ) -> Result<Option<String>>
    {
        let Some(attr) = entry
            .attr(name)
            .map_err(|err| map_dwarf_error("reading string attribute", err))?
        else {
            return Ok(None);
        };

        let reader = self
            .dwarf
            .attr_string(unit, attr.value())
            .map_err(|err| map_dwarf_error("resolving DWARF string", err))?;
        let owned = match reader.to_string() {
            Ok(cow) => cow.into_owned(),
            Err(_) => reader
                .to_string_lossy()
                .map_err(|err| map_dwarf_error("decoding DWARF string", err))?
                .into_owned(),
        };
        Ok(Some(owned))
    }

    fn finish(mut self) -> DieTree
    {
        for fixup in &self.fixups {
            let Some(&target) = self.offsets.get(&(fixup.unit, fixup.offset.0)) else {
                warn!("dangling DIE reference from {} to offset {:#x}", fixup.from, fixup.offset.0);
                continue;
            };
            let node = &mut self.tree.nodes[fixup.from.index()];
            match fixup.slot {
                RefSlot::Type => node.type_ref = Some(target),
                RefSlot::Origin => node.origin = Some(target),
            }
        }
        self.tree.finish();
        self.tree
    }
}

fn udata(entry: &DebuggingInformationEntry<'_, '_, OwnedReader>, name: DwAt) -> Result<Option<u64>>
{
    Ok(entry
        .attr(name)
        .map_err(|err| map_dwarf_error("reading constant attribute", err))?
        .and_then(|attr| attr.udata_value()))
}

fn flag(entry: &DebuggingInformationEntry<'_, '_, OwnedReader>, name: DwAt) -> Result<bool>
{
    Ok(matches!(
        entry
            .attr(name)
            .map_err(|err| map_dwarf_error("reading flag attribute", err))?
            .map(|attr| attr.value()),
        Some(AttributeValue::Flag(true))
    ))
}

fn has_attr(entry: &DebuggingInformationEntry<'_, '_, OwnedReader>, name: DwAt) -> Result<bool>
{
    Ok(entry
        .attr(name)
        .map_err(|err| map_dwarf_error("reading attribute", err))?
        .is_some())
}

fn member_offset(unit: &Unit<OwnedReader>, entry: &DebuggingInformationEntry<'_, '_, OwnedReader>) -> Result<Option<u64>>
{
    if let Some(attr) = entry
        .attr(constants::DW_AT_data_member_location)
        .map_err(|err| map_dwarf_error("reading DW_AT_data_member_location", err))?
    {
        if let AttributeValue::Exprloc(expr) = attr.value() {
            return decode_member_offset(expr, unit.encoding())
                .map_err(|err| map_dwarf_error("decoding DW_AT_data_member_location", err));
        }
        if let Some(bytes) = attr.udata_value() {
            return Ok(Some(bytes));
        }
        // DWARF 2/3 reads data4/data8 here as a location list pointer.
        if unit.header.version() < 4 {
            if let Some(bytes) = attr.raw_value().udata_value() {
                return Ok(Some(bytes));
            }
        }
    }

    Ok(udata(entry, constants::DW_AT_data_bit_offset)?.map(|bits| bits / 8))
}

fn location(unit: &Unit<OwnedReader>, entry: &DebuggingInformationEntry<'_, '_, OwnedReader>) -> Result<Option<LocationExpr>>
{
    let Some(attr) = entry
        .attr(constants::DW_AT_location)
        .map_err(|err| map_dwarf_error("reading DW_AT_location", err))?
    else {
        return Ok(None);
    };

    match attr.value() {
        AttributeValue::Exprloc(expr) => match decode_location(expr, unit.encoding()) {
            Ok(location) => Ok(Some(location)),
            Err(err) => {
                warn!("undecodable location expression at {:?}: {err}", entry.offset());
                Ok(None)
            }
        },
        AttributeValue::LocationListsRef(_) | AttributeValue::DebugLocListsIndex(_) | AttributeValue::SecOffset(_) => {
            Ok(Some(LocationExpr::List))
        }
        other => {
            warn!("unexpected DW_AT_location form {other:?} at {:?}", entry.offset());
            Ok(None)
        }
    }
}
