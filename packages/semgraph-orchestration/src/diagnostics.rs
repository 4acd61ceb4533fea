//! The diagnostic-stream message shapes of `spec.md` §6: violation
//! records serialized for JSON consumers, and the real-time
//! `file_changed` update envelope. Envelope field names grounded on
//! `examples/original_source/backend/app/services/realtime.py`.

use serde::{Deserialize, Serialize};

use crate::validator::{Severity, Violation};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReindexingSummary {
    pub nodes_written: usize,
    pub edges_written: usize,
    pub nodes_deleted: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PropagationSummary {
    pub newly_marked: usize,
    pub iterations: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationSummary {
    pub is_valid: bool,
    pub errors: usize,
    pub warnings: usize,
    /// Capped at 10 per `spec.md` §6.
    pub violations: Vec<Violation>,
}

impl ValidationSummary {
    pub fn from_violations(all: &[Violation]) -> Self {
        let errors = all.iter().filter(|v| v.severity == Severity::Error).count();
        let warnings = all.iter().filter(|v| v.severity == Severity::Warning).count();
        Self {
            is_valid: errors == 0,
            errors,
            warnings,
            violations: all.iter().take(10).cloned().collect(),
        }
    }
}

/// `{type: "file_changed", file_path, timestamp, reindexing, propagation,
/// validation, changed_node_ids[≤100]}`, `spec.md` §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileChangedMessage {
    #[serde(rename = "type")]
    pub message_type: String,
    pub file_path: String,
    pub timestamp: String,
    pub reindexing: ReindexingSummary,
    pub propagation: PropagationSummary,
    pub validation: ValidationSummary,
    pub changed_node_ids: Vec<String>,
}

impl FileChangedMessage {
    pub fn new(
        file_path: impl Into<String>,
        timestamp: impl Into<String>,
        reindexing: ReindexingSummary,
        propagation: PropagationSummary,
        violations: &[Violation],
        mut changed_node_ids: Vec<String>,
    ) -> Self {
        changed_node_ids.truncate(100);
        Self {
            message_type: "file_changed".to_string(),
            file_path: file_path.into(),
            timestamp: timestamp.into(),
            reindexing,
            propagation,
            validation: ValidationSummary::from_violations(violations),
            changed_node_ids,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator::ViolationKind;

    fn violation(severity: Severity) -> Violation {
        Violation {
            kind: ViolationKind::ReferenceBroken,
            severity,
            entity_id: "abc".to_string(),
            message: "test".to_string(),
            details: Default::default(),
            file_path: None,
            line_number: None,
            column_number: None,
            old_value: None,
            new_value: None,
            code_snippet: None,
        }
    }

    #[test]
    fn test_validation_summary_caps_violations_at_ten() {
        let all: Vec<_> = (0..15).map(|_| violation(Severity::Warning)).collect();
        let summary = ValidationSummary::from_violations(&all);
        assert_eq!(summary.violations.len(), 10);
        assert_eq!(summary.warnings, 15);
    }

    #[test]
    fn test_file_changed_message_caps_changed_ids_at_hundred() {
        let ids: Vec<String> = (0..150).map(|i| i.to_string()).collect();
        let msg = FileChangedMessage::new(
            "/repo/a.py",
            "2026-07-31T00:00:00Z",
            ReindexingSummary::default(),
            PropagationSummary::default(),
            &[],
            ids,
        );
        assert_eq!(msg.changed_node_ids.len(), 100);
        assert_eq!(msg.message_type, "file_changed");
    }
}
