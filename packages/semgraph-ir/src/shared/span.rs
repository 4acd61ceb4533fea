//! Source positions and ranges.

use serde::{Deserialize, Serialize};

/// A single point in a source file: 1-based line, 0-based column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub line: u32,
    pub column: u32,
}

impl Location {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }

    pub fn zero() -> Self {
        Self { line: 0, column: 0 }
    }
}

impl Default for Location {
    fn default() -> Self {
        Self::zero()
    }
}

/// A half-open range of source positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start_line: u32,
    pub start_col: u32,
    pub end_line: u32,
    pub end_col: u32,
}

impl Span {
    pub fn new(start_line: u32, start_col: u32, end_line: u32, end_col: u32) -> Self {
        Self {
            start_line,
            start_col,
            end_line,
            end_col,
        }
    }

    pub fn zero() -> Self {
        Self::new(0, 0, 0, 0)
    }

    pub fn start(&self) -> Location {
        Location::new(self.start_line, self.start_col)
    }

    pub fn contains_line(&self, line: u32) -> bool {
        line >= self.start_line && line <= self.end_line
    }

    pub fn contains(&self, loc: Location) -> bool {
        if loc.line < self.start_line || loc.line > self.end_line {
            return false;
        }
        if loc.line == self.start_line && loc.column < self.start_col {
            return false;
        }
        if loc.line == self.end_line && loc.column > self.end_col {
            return false;
        }
        true
    }

    pub fn line_count(&self) -> u32 {
        self.end_line.saturating_sub(self.start_line) + 1
    }
}

impl Default for Span {
    fn default() -> Self {
        Self::zero()
    }
}

/// Render `<absolute path>:<lineno>:<col_offset>` per `spec.md` §4.1.
pub fn format_location(path: &str, line: u32, col: u32) -> String {
    format!("{path}:{line}:{col}")
}

/// Parse a `path:line:col` string. Failure yields whatever prefix was
/// parseable, per the spec's strict-but-partial parser contract.
pub fn parse_location(s: &str) -> (Option<String>, Option<u32>, Option<u32>) {
    let mut parts = s.rsplitn(3, ':');
    let col = parts.next().and_then(|p| p.parse::<u32>().ok());
    let line = parts.next().and_then(|p| p.parse::<u32>().ok());
    let path = parts.next().map(|p| p.to_string());

    match (path, line, col) {
        (Some(p), Some(l), Some(c)) => (Some(p), Some(l), Some(c)),
        _ => {
            // Not a well-formed `path:line:col` string; best-effort: treat
            // the whole input as a path with no parseable position.
            if s.is_empty() {
                (None, None, None)
            } else {
                (Some(s.to_string()), None, None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_contains_line() {
        let span = Span::new(10, 0, 15, 4);
        assert!(span.contains_line(10));
        assert!(span.contains_line(12));
        assert!(span.contains_line(15));
        assert!(!span.contains_line(9));
        assert!(!span.contains_line(16));
    }

    #[test]
    fn test_span_line_count() {
        assert_eq!(Span::new(1, 0, 1, 5).line_count(), 1);
        assert_eq!(Span::new(1, 0, 5, 0).line_count(), 5);
    }

    #[test]
    fn test_format_and_parse_location_roundtrip() {
        let s = format_location("/repo/app.py", 12, 4);
        assert_eq!(s, "/repo/app.py:12:4");
        let (path, line, col) = parse_location(&s);
        assert_eq!(path.as_deref(), Some("/repo/app.py"));
        assert_eq!(line, Some(12));
        assert_eq!(col, Some(4));
    }

    #[test]
    fn test_parse_location_malformed() {
        let (path, line, col) = parse_location("not-a-location");
        assert_eq!(path.as_deref(), Some("not-a-location"));
        assert_eq!(line, None);
        assert_eq!(col, None);
    }

    #[test]
    fn test_parse_location_empty() {
        assert_eq!(parse_location(""), (None, None, None));
    }
}
