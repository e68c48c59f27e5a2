//! Source language of a compile unit.

use std::fmt;

use gimli::{constants, DwLang};

use super::args::LocationType;

// Newer DWARF 5 language codes; spelled out so older gimli constant tables are not required.
const DW_LANG_C_PLUS_PLUS_17: DwLang = DwLang(0x002a);
const DW_LANG_C_PLUS_PLUS_20: DwLang = DwLang(0x002b);
const DW_LANG_C17: DwLang = DwLang(0x002c);

/// Language family, the level at which calling conventions differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LanguageFamily
{
    /// Any C dialect.
    C,
    /// Any C++ dialect.
    Cpp,
    /// Go (stack-based argument passing).
    Go,
    /// Rust.
    Rust,
    /// Assembler, Fortran, or anything we do not classify.
    Other,
}

impl fmt::Display for LanguageFamily
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let label = match self {
            LanguageFamily::C => "c",
            LanguageFamily::Cpp => "c++",
            LanguageFamily::Go => "go",
            LanguageFamily::Rust => "rust",
            LanguageFamily::Other => "other",
        };
        write!(f, "{label}")
    }
}

/// The `DW_AT_language` of a compile unit.
///
/// Keeps the exact dialect (e.g. `DW_LANG_C_plus_plus_14`) for diagnostics
/// while exposing the coarser [`LanguageFamily`] used for ABI selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceLanguage(DwLang);

impl SourceLanguage
{
    #[must_use]
    pub const fn new(lang: DwLang) -> Self
    {
        Self(lang)
    }

    /// Raw DWARF language code.
    #[must_use]
    pub const fn dw_lang(self) -> DwLang
    {
        self.0
    }

    #[must_use]
    pub fn family(self) -> LanguageFamily
    {
        match self.0 {
            constants::DW_LANG_C89 | constants::DW_LANG_C | constants::DW_LANG_C99 | constants::DW_LANG_C11 | DW_LANG_C17 => {
                LanguageFamily::C
            }
            constants::DW_LANG_C_plus_plus
            | constants::DW_LANG_C_plus_plus_03
            | constants::DW_LANG_C_plus_plus_11
            | constants::DW_LANG_C_plus_plus_14
            | DW_LANG_C_PLUS_PLUS_17
            | DW_LANG_C_PLUS_PLUS_20 => LanguageFamily::Cpp,
            constants::DW_LANG_Go => LanguageFamily::Go,
            constants::DW_LANG_Rust => LanguageFamily::Rust,
            _ => LanguageFamily::Other,
        }
    }

    /// Whether the family is one whose conventions we model explicitly.
    #[must_use]
    pub fn is_known(self) -> bool
    {
        self.family() != LanguageFamily::Other
    }

    /// Where this language's compiler passes arguments.
    ///
    /// Go binaries built with the stack ABI lay every argument and result
    /// out on the caller's stack; everything else is treated as register
    /// passing.
    #[must_use]
    pub fn convention(self) -> LocationType
    {
        match self.family() {
            LanguageFamily::Go => LocationType::Stack,
            LanguageFamily::C | LanguageFamily::Cpp | LanguageFamily::Rust | LanguageFamily::Other => LocationType::Register,
        }
    }

    /// Whether enclosing namespaces and classes form a `a::b::name` path.
    pub(crate) fn scopes_names(self) -> bool
    {
        matches!(self.family(), LanguageFamily::Cpp | LanguageFamily::Rust)
    }
}

impl From<DwLang> for SourceLanguage
{
    fn from(lang: DwLang) -> Self
    {
        Self(lang)
    }
}

impl fmt::Display for SourceLanguage
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self.0.static_string() {
            Some(name) => write!(f, "{name}"),
            None => write!(f, "DW_LANG_unknown(0x{:04x})", self.0 .0),
        }
    }
}
