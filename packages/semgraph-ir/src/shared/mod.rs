pub mod error;
pub mod id;
pub mod scope_stack;
pub mod span;

pub use error::{CodegraphError, ErrorKind, Result};
pub use id::{id, IdGenerator};
pub use scope_stack::ScopeStack;
pub use span::{format_location, parse_location, Location, Span};
