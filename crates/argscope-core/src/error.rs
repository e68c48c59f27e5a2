//! # Error Types
//!
//! Error handling for debug-info queries.
//!
//! We use `thiserror` to automatically generate `Error` trait implementations
//! and nice error messages.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// What a lookup was searching for when it came back empty.
///
/// Each variant carries the names involved so that a caller probing many
/// functions in a batch can report exactly which one was skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Missing
{
    /// The binary path does not resolve to a readable file.
    Path(PathBuf),
    /// No subprogram with this name.
    Function(String),
    /// No struct, class or union definition with this name.
    Struct(String),
    /// The struct exists but has no member with this name.
    Member
    {
        struct_name: String,
        member: String,
    },
    /// The function exists but has no formal parameter with this name.
    Argument
    {
        function: String,
        argument: String,
    },
    /// The argument exists but carries no decodable location expression.
    Location
    {
        function: String,
        argument: String,
    },
}

impl fmt::Display for Missing
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            Missing::Path(path) => write!(f, "path {}", path.display()),
            Missing::Function(name) => write!(f, "function {name}"),
            Missing::Struct(name) => write!(f, "struct {name}"),
            Missing::Member { struct_name, member } => write!(f, "member {member} of struct {struct_name}"),
            Missing::Argument { function, argument } => write!(f, "argument {argument} of function {function}"),
            Missing::Location { function, argument } => {
                write!(f, "location of argument {argument} of function {function}")
            }
        }
    }
}

/// Main error type for debug-info queries
///
/// Missing names, ambiguity and absent debug info are routine outcomes when
/// querying arbitrary binaries, so every public operation reports them
/// through this enum instead of panicking.
///
/// ## Error Categories
///
/// 1. **Lookup errors**: NotFound, Ambiguous
/// 2. **Binary errors**: NoDebugInfo, Corrupt
/// 3. **Type errors**: IncompleteType
/// 4. **I/O errors**: Io
#[derive(Error, Debug)]
pub enum DwarfError
{
    /// A path, function, struct, member or argument is absent
    #[error("Not found: {0}")]
    NotFound(Missing),

    /// A name resolves to several nodes where a unique one was required
    ///
    /// This happens when multiple compile units define a same-named symbol,
    /// e.g. static functions or struct definitions duplicated per unit.
    /// Use `DwarfReader::matching_nodes` to inspect every candidate.
    #[error("Ambiguous name {name}: {count} matching entries")]
    Ambiguous
    {
        /// The name that was looked up
        name: String,
        /// How many candidates survived filtering
        count: usize,
    },

    /// The binary parsed but carries no usable `.debug_info`
    ///
    /// Typically a stripped binary.
    #[error("No debug info in {}", .0.display())]
    NoDebugInfo(PathBuf),

    /// The object container or its DWARF sections could not be decoded
    #[error("Corrupt debug info: {0}")]
    Corrupt(String),

    /// A type chain does not resolve to a concrete byte size
    #[error("Incomplete type information: {0}")]
    IncompleteType(String),

    /// I/O error other than a missing file
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DwarfError
{
    /// `true` for every `NotFound` flavour.
    #[must_use]
    pub fn is_not_found(&self) -> bool
    {
        matches!(self, DwarfError::NotFound(_))
    }

    #[must_use]
    pub fn is_ambiguous(&self) -> bool
    {
        matches!(self, DwarfError::Ambiguous { .. })
    }

    pub(crate) fn function(name: &str) -> Self
    {
        DwarfError::NotFound(Missing::Function(name.to_string()))
    }

    pub(crate) fn argument(function: &str, argument: &str) -> Self
    {
        DwarfError::NotFound(Missing::Argument {
            function: function.to_string(),
            argument: argument.to_string(),
        })
    }
}

/// Convenience type alias for `Result<T, DwarfError>`
///
/// ```rust
/// use argscope_core::error::Result;
/// fn foo() -> Result<()>
/// {
///     Ok(())
/// }
/// ```
pub type Result<T> = std::result::Result<T, DwarfError>;

/// Wrap a gimli error with a description of what was being decoded.
pub(crate) fn map_dwarf_error(context: &str, err: gimli::Error) -> DwarfError
{
    DwarfError::Corrupt(format!("{context}: {err}"))
}
