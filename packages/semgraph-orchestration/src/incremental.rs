//! The incremental driver, `spec.md` §4.7: file-change → delete slice →
//! re-extract → re-build → mark-changed → propagate → incremental
//! validate → clear flags.

use semgraph_ir::parse_file;
use semgraph_storage::GraphStore;

use crate::builder::{BuildSummary, Builder};
use crate::config::ValidatorConfig;
use crate::error::Result;
use crate::validator::{ValidationReport, Validator};

#[derive(Debug, Clone, Default)]
pub struct IncrementalResult {
    pub build: BuildSummary,
    pub newly_marked: Vec<String>,
    pub propagation_iterations: usize,
    pub report: ValidationReport,
}

pub struct IncrementalDriver<'a> {
    store: &'a dyn GraphStore,
    validator_config: &'a ValidatorConfig,
}

impl<'a> IncrementalDriver<'a> {
    pub fn new(store: &'a dyn GraphStore, validator_config: &'a ValidatorConfig) -> Self {
        Self { store, validator_config }
    }

    /// Steps 1–6 of `spec.md` §4.7, executed in strict order for one
    /// "file X changed" event.
    pub async fn on_file_changed(&self, path: &str) -> Result<IncrementalResult> {
        let builder = Builder::new(self.store);

        // Step 1 happens inside build_file (delete-then-rebuild is the
        // same atomic slice-replace the idempotent-rebuild protocol uses).
        let extracted = parse_file(path)?;
        let build = builder.build_file(path, extracted).await?;

        // Step 3.
        self.store.mark_file_nodes_changed(path).await?;

        // Step 4.
        let propagation = self.store.propagate_changed_flag().await?;

        // Step 5.
        let validator = Validator::new(self.store, self.validator_config);
        let report = validator.validate_incremental().await?;

        // Step 6.
        self.store.clear_changed_flags().await?;

        tracing::info!(
            path,
            newly_marked = propagation.newly_marked.len(),
            iterations = propagation.iterations,
            violations = report.violations.len(),
            "incremental.on_file_changed done"
        );

        Ok(IncrementalResult {
            build,
            newly_marked: propagation.newly_marked,
            propagation_iterations: propagation.iterations,
            report,
        })
    }

    /// Re-extracts and rebuilds `path` without touching change-tracking or
    /// re-validating; used by scenario 4 (idempotent rebuild) where a
    /// caller checks the build output alone.
    pub async fn reindex_file(&self, path: &str) -> Result<BuildSummary> {
        let builder = Builder::new(self.store);
        let extracted = parse_file(path)?;
        builder.build_file(path, extracted).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use semgraph_storage::SqliteGraphStore;
    use std::io::Write;

    #[tokio::test]
    async fn test_idempotent_rebuild_marks_nothing_scenario_4() {
        let store = SqliteGraphStore::new_in_memory().unwrap();
        store.initialize_schema().await.unwrap();
        let config = ValidatorConfig::default();
        let driver = IncrementalDriver::new(&store, &config);

        let mut file = tempfile::NamedTempFile::with_suffix(".py").unwrap();
        writeln!(file, "def f(x):\n    return x\n").unwrap();
        let path = file.path().to_str().unwrap();

        let first = driver.on_file_changed(path).await.unwrap();
        let second = driver.on_file_changed(path).await.unwrap();

        assert_eq!(first.build.nodes_written, second.build.nodes_written);
        assert_eq!(first.build.edges_written, second.build.edges_written);
        // changed flags are cleared at the end of each pass, so the second
        // pass's propagation starts from the same re-stamped file slice
        // and marks no additional cross-file dependents.
        assert_eq!(second.newly_marked.len(), 0);
    }
}
