//! Builder, validator, and incremental driver, `spec.md` §4.4–4.7: the
//! layer that wires `semgraph-ir`'s extractor and `semgraph-storage`'s
//! graph store together into the full indexing and validation pipeline.

pub mod builder;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod incremental;
pub mod ports;
pub mod validator;

pub use builder::{BuildSummary, Builder};
pub use config::Config;
pub use error::{OrchestrationError, Result};
pub use incremental::{IncrementalDriver, IncrementalResult};
pub use validator::{Severity, ValidationReport, Validator, Violation, ViolationKind};
