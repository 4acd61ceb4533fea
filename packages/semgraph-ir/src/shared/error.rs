//! Hand-rolled error type for the extraction pipeline.
//!
//! Deliberately not `thiserror`-derived: `semgraph-storage` and
//! `semgraph-orchestration` use `thiserror` instead. Both styles occur in
//! the codebase this crate follows.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    Parse,
    Resolution,
    Config,
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Parse => "parse",
            ErrorKind::Resolution => "resolution",
            ErrorKind::Config => "config",
            ErrorKind::Internal => "internal",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug)]
pub struct CodegraphError {
    pub kind: ErrorKind,
    pub message: String,
    pub file_path: Option<String>,
    pub line: Option<u32>,
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl CodegraphError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            file_path: None,
            line: None,
            source: None,
        }
    }

    pub fn with_file(mut self, file_path: impl Into<String>) -> Self {
        self.file_path = Some(file_path.into());
        self
    }

    pub fn with_line(mut self, line: u32) -> Self {
        self.line = Some(line);
        self
    }

    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Parse, message)
    }

    pub fn resolution(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Resolution, message)
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }
}

impl fmt::Display for CodegraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)?;
        if let Some(path) = &self.file_path {
            write!(f, " ({path}")?;
            if let Some(line) = self.line {
                write!(f, ":{line}")?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}

impl std::error::Error for CodegraphError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl From<serde_json::Error> for CodegraphError {
    fn from(e: serde_json::Error) -> Self {
        CodegraphError::internal(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CodegraphError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CodegraphError::parse("unexpected token").with_file("a.py").with_line(3);
        let rendered = err.to_string();
        assert!(rendered.contains("parse"));
        assert!(rendered.contains("a.py"));
        assert!(rendered.contains('3'));
    }
}
