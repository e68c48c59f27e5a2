//! Argument and return-value layout types.
//!
//! These are the values handed to a probe generator: enough to emit a read
//! of a live argument at function entry without touching DWARF again.

use std::fmt;

/// How a value's storage should be interpreted.
///
/// Not a type system: just enough to size the value and know whether it is
/// passed as an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VarType
{
    /// No value (functions without a return type).
    Void,
    /// Scalars: integers, floats, bools, enums.
    BaseType,
    /// Pointers and references; always pointer-width.
    Pointer,
    /// Structs, classes, unions, and language composites such as Go slices.
    Struct,
    /// Arrays, function types and anything else.
    Unknown,
}

impl fmt::Display for VarType
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let label = match self {
            VarType::Void => "void",
            VarType::BaseType => "base",
            VarType::Pointer => "pointer",
            VarType::Struct => "struct",
            VarType::Unknown => "unknown",
        };
        write!(f, "{label}")
    }
}

/// Where a calling convention places arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LocationType
{
    Register,
    Stack,
}

impl fmt::Display for LocationType
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            LocationType::Register => write!(f, "register"),
            LocationType::Stack => write!(f, "stack"),
        }
    }
}

/// Location of one argument or return slot.
///
/// For [`LocationType::Register`] the offset is a logical register-slot
/// byte offset (slot ordinal times the register stride), not a physical
/// register number. For [`LocationType::Stack`] it is the byte offset from
/// the stack-argument base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArgLocation
{
    pub loc_type: LocationType,
    pub offset: i64,
}

impl ArgLocation
{
    #[must_use]
    pub const fn register(offset: i64) -> Self
    {
        Self {
            loc_type: LocationType::Register,
            offset,
        }
    }

    #[must_use]
    pub const fn stack(offset: i64) -> Self
    {
        Self {
            loc_type: LocationType::Stack,
            offset,
        }
    }
}

impl fmt::Display for ArgLocation
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}+{}", self.loc_type, self.offset)
    }
}

/// One formal parameter or return slot of a function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgInfo
{
    pub var_type: VarType,
    /// Human-readable resolved type name (the pointee's name for pointers).
    pub type_name: String,
    pub location: ArgLocation,
    /// `true` for return slots of stack-convention languages.
    pub is_retval: bool,
}

impl ArgInfo
{
    #[must_use]
    pub fn new(var_type: VarType, type_name: impl Into<String>, location: ArgLocation) -> Self
    {
        Self {
            var_type,
            type_name: type_name.into(),
            location,
            is_retval: false,
        }
    }

    /// Mark this entry as a return slot.
    #[must_use]
    pub fn retval(mut self) -> Self
    {
        self.is_retval = true;
        self
    }
}

/// The single unnamed return value of a register-convention function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetValInfo
{
    pub var_type: VarType,
    pub type_name: String,
    pub byte_size: u64,
}

impl RetValInfo
{
    /// The "no return value" answer.
    #[must_use]
    pub fn void() -> Self
    {
        Self {
            var_type: VarType::Void,
            type_name: String::new(),
            byte_size: 0,
        }
    }
}
