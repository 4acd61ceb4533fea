//! The extractor, `spec.md` §4.2: turns one source file into entities,
//! relationships, and a local symbol table. Pure function of source text
//! and virtual path.

mod type_infer;
mod walker;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tree_sitter::Parser;

use crate::model::{Node, Relationship};
use crate::shared::{CodegraphError, Result};

/// Directory names ignored by `parse_directory`, per `spec.md` §4.2.
const IGNORED_DIRS: &[&str] = &[".git", "__pycache__", "venv", ".venv", ".cache"];

/// The result of extracting one file: the entity map and relationship
/// list the builder will later consume, plus any non-fatal errors.
#[derive(Debug, Default)]
pub struct ExtractResult {
    pub entities: HashMap<String, Node>,
    pub relationships: Vec<Relationship>,
    pub errors: Vec<CodegraphError>,
}

impl ExtractResult {
    fn empty_with_error(err: CodegraphError) -> Self {
        Self {
            entities: HashMap::new(),
            relationships: Vec::new(),
            errors: vec![err],
        }
    }
}

/// Derive a dotted qualified name from a file path, per `spec.md` §4.2
/// step 1: directory separators become dots, the `.py` suffix is dropped.
/// `__init__.py` collapses to its containing package name.
pub fn module_qualified_name(path: &str) -> String {
    let p = Path::new(path);
    let stem = p.file_stem().and_then(|s| s.to_str()).unwrap_or("module");
    let parent_components: Vec<&str> = p
        .parent()
        .map(|parent| {
            parent
                .components()
                .filter_map(|c| c.as_os_str().to_str())
                .filter(|c| !c.is_empty() && *c != "/" && *c != ".")
                .collect()
        })
        .unwrap_or_default();

    if stem == "__init__" {
        if parent_components.is_empty() {
            return "__init__".to_string();
        }
        return parent_components.join(".");
    }

    let mut parts = parent_components;
    parts.push(stem);
    parts.join(".")
}

/// Parse one file's source text into entities and relationships.
/// Syntax errors are logged and produce an empty result so sibling files
/// still index successfully (`spec.md` §4.2 "Fails with").
pub fn parse_source(text: &str, path: &str) -> ExtractResult {
    let mut parser = Parser::new();
    if parser.set_language(&tree_sitter_python::language()).is_err() {
        return ExtractResult::empty_with_error(CodegraphError::internal("failed to initialize tree-sitter grammar"));
    }
    let Some(tree) = parser.parse(text, None) else {
        tracing::warn!(path, "failed to parse source text");
        return ExtractResult::empty_with_error(CodegraphError::parse("failed to parse source").with_file(path));
    };

    let root = tree.root_node();
    if root.has_error() {
        tracing::warn!(path, "source contains syntax errors; file contributes no entities");
        return ExtractResult::empty_with_error(CodegraphError::parse("source contains syntax errors").with_file(path));
    }

    let qualified_name = module_qualified_name(path);
    let walk_out = walker::Walker::new(text, path, &qualified_name).walk_module(root);

    tracing::debug!(
        path,
        entity_count = walk_out.entities.len(),
        relationship_count = walk_out.relationships.len(),
        "extractor.parse_file"
    );

    ExtractResult {
        entities: walk_out.entities,
        relationships: walk_out.relationships,
        errors: walk_out.errors,
    }
}

/// Read and parse a file from disk.
pub fn parse_file(path: &str) -> Result<ExtractResult> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        CodegraphError::parse(format!("failed to read file: {e}")).with_file(path)
    })?;
    Ok(parse_source(&text, path))
}

/// Walk `root` recursively, extracting every `.py`/`.pyi` file found,
/// skipping the fixed set of ignored directory names. Files are processed
/// in parallel; each worker's extraction is independent and file-local.
pub fn parse_directory(root: &str) -> Vec<(String, ExtractResult)> {
    let files = collect_source_files(Path::new(root));
    files
        .par_iter()
        .map(|path| {
            let path_str = path.to_string_lossy().to_string();
            match parse_file(&path_str) {
                Ok(result) => (path_str, result),
                Err(e) => (path_str.clone(), ExtractResult::empty_with_error(e)),
            }
        })
        .collect()
}

fn collect_source_files(root: &Path) -> Vec<PathBuf> {
    walkdir::WalkDir::new(root)
        .into_iter()
        .filter_entry(|entry| {
            if entry.file_type().is_dir() {
                let name = entry.file_name().to_string_lossy();
                return !IGNORED_DIRS.contains(&name.as_ref());
            }
            true
        })
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            matches!(
                e.path().extension().and_then(|ext| ext.to_str()),
                Some("py") | Some("pyi")
            )
        })
        .map(|e| e.path().to_path_buf())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_qualified_name_simple() {
        assert_eq!(module_qualified_name("pkg/sub/mod.py"), "pkg.sub.mod");
    }

    #[test]
    fn test_module_qualified_name_init() {
        assert_eq!(module_qualified_name("pkg/sub/__init__.py"), "pkg.sub");
    }

    #[test]
    fn test_parse_source_empty_file_b1() {
        let result = parse_source("", "empty.py");
        assert_eq!(result.entities.len(), 1);
        assert!(result.relationships.is_empty());
        assert!(result.errors.is_empty());
    }

    #[test]
    fn test_parse_source_syntax_error_yields_empty_result() {
        let result = parse_source("def f(:\n", "broken.py");
        assert!(result.entities.is_empty());
        assert!(result.relationships.is_empty());
        assert_eq!(result.errors.len(), 1);
    }

    #[test]
    fn test_parse_source_idempotent_ids_r1() {
        let src = "def f(x):\n    return x\n";
        let a = parse_source(src, "m.py");
        let b = parse_source(src, "m.py");
        let mut ids_a: Vec<_> = a.entities.keys().cloned().collect();
        let mut ids_b: Vec<_> = b.entities.keys().cloned().collect();
        ids_a.sort();
        ids_b.sort();
        assert_eq!(ids_a, ids_b);
    }
}
