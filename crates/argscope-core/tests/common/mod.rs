//! Synthetic fixture binaries.
//!
//! DWARF is written with gimli's writer and wrapped in an ELF relocatable
//! with `object`, so the tests need no compiler toolchain. The units mirror
//! what clang and the Go toolchain emit for the same sources.

#![allow(dead_code)]

use std::io::Write as _;
use std::sync::OnceLock;

use argscope_core::{DwarfReader, ReaderOptions};
use gimli::write::{
    Address, AttributeValue, Dwarf, EndianVec, Expression, LineProgram, Reference, Sections, Unit, UnitEntryId, UnitId,
};
use gimli::{constants, DwAt, DwLang, DwTag, Encoding, Format, LittleEndian, Register};
use object::write::Object;
use object::{Architecture, BinaryFormat, Endianness, SectionKind};
use tempfile::NamedTempFile;

const ENCODING: Encoding = Encoding {
    format: Format::Dwarf32,
    version: 4,
    address_size: 8,
};

/// Open `bytes` twice: with the name index and with scan lookups.
pub fn readers(bytes: &[u8]) -> [DwarfReader; 2]
{
    [
        DwarfReader::parse(bytes, ReaderOptions::default()).expect("indexed reader"),
        DwarfReader::parse(bytes, ReaderOptions::default().with_index(false)).expect("scanning reader"),
    ]
}

/// C++, C and Go units in one binary.
pub fn mixed_binary() -> &'static [u8]
{
    static BYTES: OnceLock<Vec<u8>> = OnceLock::new();
    BYTES.get_or_init(|| {
        let mut dwarf = Dwarf::new();
        let cpp = add_unit(&mut dwarf, "abc.cc", constants::DW_LANG_C_plus_plus_14);
        let cpp_types = write_cpp_unit(&mut UnitWriter::new(dwarf.units.get_mut(cpp), 0x1000));
        let c = add_unit(&mut dwarf, "util.c", constants::DW_LANG_C99);
        write_c_unit(&mut UnitWriter::new(dwarf.units.get_mut(c), 0x2000), cpp, &cpp_types);
        let go = add_unit(&mut dwarf, "main", constants::DW_LANG_Go);
        write_go_unit(&mut UnitWriter::new(dwarf.units.get_mut(go), 0x3000));
        to_elf(&mut dwarf)
    })
}

/// A Go binary whose first unit is runtime assembly.
pub fn go_binary_with_asm_prelude() -> Vec<u8>
{
    let mut dwarf = Dwarf::new();
    let asm = add_unit(&mut dwarf, "asm_amd64.s", constants::DW_LANG_Mips_Assembler);
    {
        let mut w = UnitWriter::new(dwarf.units.get_mut(asm), 0x1000);
        let root = w.root();
        w.function(root, "runtime.rt0_go", None);
    }
    let go = add_unit(&mut dwarf, "main", constants::DW_LANG_Go);
    write_go_unit(&mut UnitWriter::new(dwarf.units.get_mut(go), 0x3000));
    to_elf(&mut dwarf)
}

/// Only an assembly unit: no recognised language family.
pub fn asm_only_binary() -> Vec<u8>
{
    let mut dwarf = Dwarf::new();
    let asm = add_unit(&mut dwarf, "start.s", constants::DW_LANG_Mips_Assembler);
    let mut w = UnitWriter::new(dwarf.units.get_mut(asm), 0x1000);
    let root = w.root();
    w.function(root, "_start", None);
    to_elf(&mut dwarf)
}

/// A valid ELF with code but no DWARF, like a stripped binary.
pub fn stripped_binary() -> Vec<u8>
{
    let mut object = Object::new(BinaryFormat::Elf, Architecture::X86_64, Endianness::Little);
    let text = object.add_section(Vec::new(), b".text".to_vec(), SectionKind::Text);
    object.append_section_data(text, &[0xc3], 1);
    object.write().expect("write ELF")
}

/// A C++ unit and a Go unit, each passing a struct whose byte size cannot
/// be laid out, followed by an `int`.
pub fn oversized_binary() -> Vec<u8>
{
    let mut dwarf = Dwarf::new();
    let cpp = add_unit(&mut dwarf, "big.cc", constants::DW_LANG_C_plus_plus);
    {
        let mut w = UnitWriter::new(dwarf.units.get_mut(cpp), 0x1000);
        let root = w.root();
        let int = w.base("int", 4);
        let big = w.structure(root, "Huge", u64::MAX, &[]);
        let f = w.function(root, "BigReg", None);
        w.param(f, Some("h"), AttributeValue::UnitRef(big), Some(reg(5)));
        w.param(f, Some("c"), AttributeValue::UnitRef(int), Some(reg(4)));
    }
    let go = add_unit(&mut dwarf, "main", constants::DW_LANG_Go);
    {
        let mut w = UnitWriter::new(dwarf.units.get_mut(go), 0x2000);
        let root = w.root();
        let int = w.base("int", 8);
        let big = w.structure(root, "main.Huge", u64::MAX, &[]);
        let f = w.function(root, "main.BigArg", None);
        w.param(f, Some("h"), AttributeValue::UnitRef(big), None);
        w.param(f, Some("c"), AttributeValue::UnitRef(int), None);
    }
    to_elf(&mut dwarf)
}

/// A DWARF 3 unit whose member offsets use `data1`, `data4` and `data8`.
pub fn dwarf3_binary() -> Vec<u8>
{
    let mut dwarf = Dwarf::new();
    let unit = dwarf.units.add(Unit::new(
        Encoding {
            version: 3,
            ..ENCODING
        },
        LineProgram::none(),
    ));
    {
        let root = dwarf.units.get_mut(unit).root();
        let entry = dwarf.units.get_mut(unit).get_mut(root);
        entry.set(constants::DW_AT_name, string("legacy.c"));
        entry.set(constants::DW_AT_language, AttributeValue::Language(constants::DW_LANG_C89));
    }
    let mut w = UnitWriter::new(dwarf.units.get_mut(unit), 0x1000);
    let root = w.root();
    let long = w.base("long", 8);
    let header = w.structure(root, "Header", 24, &[]);
    for (name, offset) in [
        ("magic", AttributeValue::Data1(0)),
        ("length", AttributeValue::Data4(8)),
        ("checksum", AttributeValue::Data8(16)),
    ] {
        w.add(
            header,
            constants::DW_TAG_member,
            vec![
                (constants::DW_AT_name, string(name)),
                (constants::DW_AT_type, AttributeValue::UnitRef(long)),
                (constants::DW_AT_data_member_location, offset),
            ],
        );
    }
    to_elf(&mut dwarf)
}

/// Write `bytes` to a temporary file for `DwarfReader::open`.
pub fn write_temp(bytes: &[u8]) -> NamedTempFile
{
    let mut file = NamedTempFile::new().expect("create temp file");
    file.write_all(bytes).expect("write temp file");
    file.flush().expect("flush temp file");
    file
}

fn add_unit(dwarf: &mut Dwarf, name: &str, language: DwLang) -> UnitId
{
    let unit = dwarf.units.add(Unit::new(ENCODING, LineProgram::none()));
    let root = dwarf.units.get_mut(unit).root();
    let entry = dwarf.units.get_mut(unit).get_mut(root);
    entry.set(constants::DW_AT_name, string(name));
    entry.set(constants::DW_AT_language, AttributeValue::Language(language));
    unit
}

fn to_elf(dwarf: &mut Dwarf) -> Vec<u8>
{
    let mut sections = Sections::new(EndianVec::new(LittleEndian));
    dwarf.write(&mut sections).expect("write DWARF");

    let mut object = Object::new(BinaryFormat::Elf, Architecture::X86_64, Endianness::Little);
    sections
        .for_each(|id, data| {
            if !data.slice().is_empty() {
                let section = object.add_section(Vec::new(), id.name().as_bytes().to_vec(), SectionKind::Debug);
                object.append_section_data(section, data.slice(), 1);
            }
            Ok::<(), gimli::write::Error>(())
        })
        .expect("collect DWARF sections");
    object.write().expect("write ELF")
}

fn string(value: &str) -> AttributeValue
{
    AttributeValue::String(value.as_bytes().to_vec())
}

fn reg(register: u16) -> Expression
{
    let mut expr = Expression::new();
    expr.op_reg(Register(register));
    expr
}

fn fbreg(offset: i64) -> Expression
{
    let mut expr = Expression::new();
    expr.op_fbreg(offset);
    expr
}

/// `DW_OP_call_frame_cfa`, plus `DW_OP_consts n; DW_OP_plus` when n > 0,
/// the shape the Go linker emits.
fn cfa(offset: i64) -> Expression
{
    let mut expr = Expression::new();
    expr.op(constants::DW_OP_call_frame_cfa);
    if offset != 0 {
        expr.op_consts(offset);
        expr.op(constants::DW_OP_plus);
    }
    expr
}

struct UnitWriter<'a>
{
    unit: &'a mut Unit,
    next_pc: u64,
}

impl<'a> UnitWriter<'a>
{
    fn new(unit: &'a mut Unit, next_pc: u64) -> Self
    {
        Self { unit, next_pc }
    }

    fn root(&self) -> UnitEntryId
    {
        self.unit.root()
    }

    fn add(&mut self, parent: UnitEntryId, tag: DwTag, attrs: Vec<(DwAt, AttributeValue)>) -> UnitEntryId
    {
        let id = self.unit.add(parent, tag);
        let entry = self.unit.get_mut(id);
        for (name, value) in attrs {
            entry.set(name, value);
        }
        id
    }

    fn base(&mut self, name: &str, size: u64) -> UnitEntryId
    {
        let root = self.root();
        self.add(
            root,
            constants::DW_TAG_base_type,
            vec![
                (constants::DW_AT_name, string(name)),
                (constants::DW_AT_byte_size, AttributeValue::Udata(size)),
            ],
        )
    }

    fn structure(&mut self, parent: UnitEntryId, name: &str, size: u64, members: &[(&str, UnitEntryId, u64)]) -> UnitEntryId
    {
        self.aggregate(parent, constants::DW_TAG_structure_type, name, size, members)
    }

    fn aggregate(
        &mut self,
        parent: UnitEntryId,
        tag: DwTag,
        name: &str,
        size: u64,
        members: &[(&str, UnitEntryId, u64)],
    ) -> UnitEntryId
    {
        let id = self.add(
            parent,
            tag,
            vec![
                (constants::DW_AT_name, string(name)),
                (constants::DW_AT_byte_size, AttributeValue::Udata(size)),
            ],
        );
        for (member, ty, offset) in members {
            self.add(
                id,
                constants::DW_TAG_member,
                vec![
                    (constants::DW_AT_name, string(member)),
                    (constants::DW_AT_type, AttributeValue::UnitRef(*ty)),
                    (constants::DW_AT_data_member_location, AttributeValue::Udata(*offset)),
                ],
            );
        }
        id
    }

    fn declaration(&mut self, name: &str) -> UnitEntryId
    {
        let root = self.root();
        self.add(
            root,
            constants::DW_TAG_structure_type,
            vec![
                (constants::DW_AT_name, string(name)),
                (constants::DW_AT_declaration, AttributeValue::Flag(true)),
            ],
        )
    }

    fn pointer(&mut self, name: Option<&str>, to: UnitEntryId) -> UnitEntryId
    {
        let root = self.root();
        let mut attrs = vec![
            (constants::DW_AT_byte_size, AttributeValue::Udata(8)),
            (constants::DW_AT_type, AttributeValue::UnitRef(to)),
        ];
        if let Some(name) = name {
            attrs.push((constants::DW_AT_name, string(name)));
        }
        self.add(root, constants::DW_TAG_pointer_type, attrs)
    }

    fn wrapper(&mut self, tag: DwTag, name: Option<&str>, to: UnitEntryId) -> UnitEntryId
    {
        let root = self.root();
        let mut attrs = vec![(constants::DW_AT_type, AttributeValue::UnitRef(to))];
        if let Some(name) = name {
            attrs.push((constants::DW_AT_name, string(name)));
        }
        self.add(root, tag, attrs)
    }

    /// A subprogram with machine code.
    fn function(&mut self, parent: UnitEntryId, name: &str, ret: Option<UnitEntryId>) -> UnitEntryId
    {
        let pc = self.next_pc;
        self.next_pc += 0x40;
        let mut attrs = vec![
            (constants::DW_AT_name, string(name)),
            (constants::DW_AT_low_pc, AttributeValue::Address(Address::Constant(pc))),
            (constants::DW_AT_high_pc, AttributeValue::Udata(0x40)),
            (constants::DW_AT_external, AttributeValue::Flag(true)),
        ];
        if let Some(ret) = ret {
            attrs.push((constants::DW_AT_type, AttributeValue::UnitRef(ret)));
        }
        self.add(parent, constants::DW_TAG_subprogram, attrs)
    }

    fn param(&mut self, function: UnitEntryId, name: Option<&str>, ty: AttributeValue, location: Option<Expression>) -> UnitEntryId
    {
        let mut attrs = vec![(constants::DW_AT_type, ty)];
        if let Some(name) = name {
            attrs.push((constants::DW_AT_name, string(name)));
        }
        if let Some(location) = location {
            attrs.push((constants::DW_AT_location, AttributeValue::Exprloc(location)));
        }
        self.add(function, constants::DW_TAG_formal_parameter, attrs)
    }

    fn result(&mut self, function: UnitEntryId, name: Option<&str>, ty: UnitEntryId) -> UnitEntryId
    {
        let id = self.param(function, name, AttributeValue::UnitRef(ty), None);
        self.unit
            .get_mut(id)
            .set(constants::DW_AT_variable_parameter, AttributeValue::Flag(true));
        id
    }
}

/// Types the C unit refers to across units.
pub struct CppTypes
{
    int: UnitEntryId,
}

fn write_cpp_unit(w: &mut UnitWriter<'_>) -> CppTypes
{
    let root = w.root();
    let int = w.base("int", 4);
    let char_ = w.base("char", 1);
    let double = w.base("double", 8);

    let abc = w.structure(root, "ABCStruct32", 12, &[("a", int, 0), ("b", int, 4), ("c", int, 8)]);
    let int_ptr = w.pointer(None, int);
    let abc_ptr = w.pointer(None, abc);

    // int CanYouFindThis(int a, int b)
    let f = w.function(root, "CanYouFindThis", Some(int));
    w.param(f, Some("a"), AttributeValue::UnitRef(int), Some(reg(5)));
    w.param(f, Some("b"), AttributeValue::UnitRef(int), Some(reg(4)));

    // ABCStruct32 ABCSum32(ABCStruct32 x, ABCStruct32 y)
    let f = w.function(root, "ABCSum32", Some(abc));
    w.param(f, Some("x"), AttributeValue::UnitRef(abc), Some(fbreg(-40)));
    w.param(f, Some("y"), AttributeValue::UnitRef(abc), Some(fbreg(-28)));

    // void SomeFunctionWithPointerArgs(int* a, ABCStruct32* x)
    let f = w.function(root, "SomeFunctionWithPointerArgs", None);
    w.param(f, Some("a"), AttributeValue::UnitRef(int_ptr), Some(reg(5)));
    w.param(f, Some("x"), AttributeValue::UnitRef(abc_ptr), Some(reg(4)));

    // namespace pl::testing { class Foo { int Bar(int i) const; }; }
    let pl = w.add(root, constants::DW_TAG_namespace, vec![(constants::DW_AT_name, string("pl"))]);
    let testing = w.add(pl, constants::DW_TAG_namespace, vec![(constants::DW_AT_name, string("testing"))]);
    let foo_class = w.aggregate(testing, constants::DW_TAG_class_type, "Foo", 4, &[("x", int, 0)]);
    let bar_decl = w.add(
        foo_class,
        constants::DW_TAG_subprogram,
        vec![
            (constants::DW_AT_name, string("Bar")),
            (constants::DW_AT_linkage_name, string("_ZNK2pl7testing3Foo3BarEi")),
            (constants::DW_AT_type, AttributeValue::UnitRef(int)),
            (constants::DW_AT_declaration, AttributeValue::Flag(true)),
        ],
    );
    let foo_ptr = w.pointer(None, foo_class);
    // Out-of-line definition: no name of its own, only DW_AT_specification.
    let bar = w.add(
        root,
        constants::DW_TAG_subprogram,
        vec![
            (constants::DW_AT_specification, AttributeValue::UnitRef(bar_decl)),
            (constants::DW_AT_low_pc, AttributeValue::Address(Address::Constant(0x1800))),
            (constants::DW_AT_high_pc, AttributeValue::Udata(0x40)),
        ],
    );
    let this = w.param(bar, Some("this"), AttributeValue::UnitRef(foo_ptr), Some(reg(5)));
    w.unit
        .get_mut(this)
        .set(constants::DW_AT_artificial, AttributeValue::Flag(true));
    w.param(bar, Some("i"), AttributeValue::UnitRef(int), Some(reg(4)));

    // pl::testing::Foo foo;
    w.add(
        root,
        constants::DW_TAG_variable,
        vec![
            (constants::DW_AT_name, string("foo")),
            (constants::DW_AT_type, AttributeValue::UnitRef(foo_class)),
        ],
    );

    // union Number { int i; double d; };
    let number = w.add(
        root,
        constants::DW_TAG_union_type,
        vec![
            (constants::DW_AT_name, string("Number")),
            (constants::DW_AT_byte_size, AttributeValue::Udata(8)),
        ],
    );
    for (member, ty) in [("i", int), ("d", double)] {
        w.add(
            number,
            constants::DW_TAG_member,
            vec![
                (constants::DW_AT_name, string(member)),
                (constants::DW_AT_type, AttributeValue::UnitRef(ty)),
            ],
        );
    }

    // void FillBuffer(char buf[16], int n) with buf by value (as in a struct copy)
    let char_16 = w.wrapper(constants::DW_TAG_array_type, None, char_);
    w.add(
        char_16,
        constants::DW_TAG_subrange_type,
        vec![(constants::DW_AT_count, AttributeValue::Udata(16))],
    );
    let f = w.function(root, "FillBuffer", None);
    w.param(f, Some("buf"), AttributeValue::UnitRef(char_16), Some(fbreg(-32)));
    w.param(f, Some("n"), AttributeValue::UnitRef(int), Some(reg(4)));

    // typedef ABCStruct32 ABC; void UsesTypedef(ABC t, const ABC* cp)
    let abc_typedef = w.wrapper(constants::DW_TAG_typedef, Some("ABC"), abc);
    let const_abc = w.wrapper(constants::DW_TAG_const_type, None, abc_typedef);
    let const_abc_ptr = w.pointer(None, const_abc);
    let f = w.function(root, "UsesTypedef", None);
    w.param(f, Some("t"), AttributeValue::UnitRef(abc_typedef), Some(fbreg(-24)));
    w.param(f, Some("cp"), AttributeValue::UnitRef(const_abc_ptr), Some(reg(4)));

    // enum Color : int { ... }; void Paint(Color c)
    let color = w.add(
        root,
        constants::DW_TAG_enumeration_type,
        vec![
            (constants::DW_AT_name, string("Color")),
            (constants::DW_AT_type, AttributeValue::UnitRef(int)),
        ],
    );
    let f = w.function(root, "Paint", None);
    w.param(f, Some("c"), AttributeValue::UnitRef(color), Some(reg(5)));

    // int OptimizedOut(int a, int b) with `a` optimized away
    let f = w.function(root, "OptimizedOut", Some(int));
    w.param(f, Some("a"), AttributeValue::UnitRef(int), None);
    w.param(f, Some("b"), AttributeValue::UnitRef(int), Some(reg(4)));

    // struct Opaque; void TakesOpaque(Opaque o)
    let opaque = w.declaration("Opaque");
    let f = w.function(root, "TakesOpaque", None);
    w.param(f, Some("o"), AttributeValue::UnitRef(opaque), Some(fbreg(-16)));

    // Two file-local definitions with the same name
    for _ in 0..2 {
        let f = w.function(root, "helper", Some(int));
        w.param(f, Some("v"), AttributeValue::UnitRef(int), Some(reg(5)));
    }

    CppTypes { int }
}

fn write_c_unit(w: &mut UnitWriter<'_>, cpp: UnitId, cpp_types: &CppTypes)
{
    let root = w.root();
    // `int` lives in the C++ unit; reach it through DW_FORM_ref_addr.
    let int = AttributeValue::DebugInfoRef(Reference::Entry(cpp, cpp_types.int));
    let f = w.function(root, "c_add", None);
    w.unit.get_mut(f).set(constants::DW_AT_type, int.clone());
    w.param(f, Some("a"), int.clone(), Some(reg(5)));
    w.param(f, Some("b"), int, Some(reg(4)));

    // struct ABCStruct32; is only forward-declared here.
    let abc = w.declaration("ABCStruct32");
    let f = w.function(root, "c_first", None);
    w.param(f, Some("s"), AttributeValue::UnitRef(abc), Some(fbreg(-24)));
}

fn write_go_unit(w: &mut UnitWriter<'_>)
{
    let root = w.root();
    let int = w.base("int", 8);
    let float64 = w.base("float64", 8);
    let boolean = w.base("bool", 1);

    let vertex = w.structure(root, "main.Vertex", 16, &[("X", float64, 0), ("Y", float64, 8)]);
    let vertex_ptr = w.pointer(Some("*main.Vertex"), vertex);
    let bool_wrapper = w.structure(root, "main.BoolWrapper", 1, &[("B", boolean, 0)]);

    // type g struct { stack int; ...; goid int64 @192 }
    let g = w.structure(root, "runtime.g", 440, &[("stack", int, 0)]);
    let mut goid_offset = Expression::new();
    goid_offset.op_plus_uconst(192);
    w.add(
        g,
        constants::DW_TAG_member,
        vec![
            (constants::DW_AT_name, string("goid")),
            (constants::DW_AT_type, AttributeValue::UnitRef(int)),
            (constants::DW_AT_data_member_location, AttributeValue::Exprloc(goid_offset)),
        ],
    );

    // func (v *Vertex) Scale(f float64)
    let f = w.function(root, "main.(*Vertex).Scale", None);
    w.param(f, Some("v"), AttributeValue::UnitRef(vertex_ptr), Some(cfa(0)));
    w.param(f, Some("f"), AttributeValue::UnitRef(float64), Some(cfa(8)));

    // func (v *Vertex) CrossScale(v2 Vertex, f float64); no locations, laid out by type
    let f = w.function(root, "main.(*Vertex).CrossScale", None);
    w.param(f, Some("v"), AttributeValue::UnitRef(vertex_ptr), None);
    w.param(f, Some("v2"), AttributeValue::UnitRef(vertex), None);
    w.param(f, Some("f"), AttributeValue::UnitRef(float64), None);

    // func (v Vertex) Abs() float64
    let f = w.function(root, "main.Vertex.Abs", None);
    w.param(f, Some("v"), AttributeValue::UnitRef(vertex), Some(cfa(0)));
    w.result(f, None, float64);

    // func (v *Vertex) Norm() float64
    let f = w.function(root, "main.(*Vertex).Norm", None);
    w.param(f, Some("v"), AttributeValue::UnitRef(vertex_ptr), None);
    w.result(f, None, float64);

    // func MixedArgTypes(i1 int, b1 bool, b2 BoolWrapper, i2 int, i3 int, b3 BoolWrapper) (int, BoolWrapper)
    let f = w.function(root, "main.MixedArgTypes", None);
    for (name, ty) in [
        ("i1", int),
        ("b1", boolean),
        ("b2", bool_wrapper),
        ("i2", int),
        ("i3", int),
        ("b3", bool_wrapper),
    ] {
        w.param(f, Some(name), AttributeValue::UnitRef(ty), None);
    }
    w.result(f, None, int);
    w.result(f, None, bool_wrapper);

    // func GoHasNamedReturns() (retfoo int, retbar bool)
    let f = w.function(root, "main.GoHasNamedReturns", None);
    w.result(f, Some("retfoo"), int);
    w.result(f, Some("retbar"), boolean);
}
