//! # Types
//!
//! Values produced by the query layer. They are plain data, detached from
//! the reader that computed them.

pub mod args;
pub mod language;

pub use args::{ArgInfo, ArgLocation, LocationType, RetValInfo, VarType};
pub use language::{LanguageFamily, SourceLanguage};
