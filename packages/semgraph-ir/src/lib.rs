//! Source extraction and typed property-graph entity model.
//!
//! `shared` carries ID/location utilities and the hand-rolled error type
//! (`spec.md` §4.1); `model` is the entity/relationship data model
//! (`spec.md` §3); `extractor` walks one file's AST into that model
//! (`spec.md` §4.2).

pub mod extractor;
pub mod model;
pub mod shared;

pub use extractor::{module_qualified_name, parse_directory, parse_file, parse_source, ExtractResult};
pub use model::*;
pub use shared::{format_location, parse_location, CodegraphError, ErrorKind, Result};
