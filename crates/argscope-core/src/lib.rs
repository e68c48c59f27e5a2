//! # argscope-core
//!
//! Answer layout questions about a compiled binary from its DWARF debug
//! info: where a function's arguments live at entry, what type and size
//! they have, what a function returns, and where a struct member sits.
//!
//! These are the facts a dynamic-tracing probe generator needs to read a
//! live argument without a debugger attached.
//!
//! ## Layers
//!
//! - [`tree`]: an owned copy of the DIE forest, with references resolved
//! - [`index`]: name → node lookup, eager or by scan
//! - [`resolve`]: type classification and sizing
//! - [`abi`]: register vs stack argument placement
//! - [`reader`]: the by-name query façade ([`DwarfReader`])
//!
//! ## Example
//!
//! ```rust,no_run
//! use argscope_core::{DwarfReader, LocationType};
//!
//! fn main() -> argscope_core::Result<()>
//! {
//!     let reader = DwarfReader::open("./server", true)?;
//!     let location = reader.argument_location("ABCSum32", "y")?;
//!     assert_eq!(location.loc_type, LocationType::Register);
//!     Ok(())
//! }
//! ```

pub mod abi;
pub mod error;
pub mod index;
pub mod reader;
pub mod resolve;
pub mod tree;
pub mod types;

pub use error::{DwarfError, Missing, Result};
pub use reader::{DwarfReader, NodeRef, ReaderOptions};
pub use resolve::ResolvedType;
pub use tree::{NodeId, NodeKind};
pub use types::{ArgInfo, ArgLocation, LanguageFamily, LocationType, RetValInfo, SourceLanguage, VarType};
