//! Stable identifier generation.
//!
//! `id(parts...) = first 16 hex of MD5("parts[0]:parts[1]:...")`, per
//! `spec.md` §4.1. Uniqueness in practice comes from callers including
//! enough discriminators (position, line, col) in `parts`.

/// Compute the 16-hex-digit id for a sequence of canonical key fragments.
pub fn id(parts: &[&str]) -> String {
    let joined = parts.join(":");
    let digest = md5::compute(joined.as_bytes());
    let hex = format!("{digest:x}");
    hex[..16].to_string()
}

/// Convenience constructors for the id shapes named in `spec.md` §3.
pub struct IdGenerator;

impl IdGenerator {
    /// Module / Class / Function / Variable ids: keyed by qualified name.
    pub fn entity_id(qualified_name: &str) -> String {
        id(&[qualified_name])
    }

    /// Parameter ids: owner function + name + position.
    pub fn parameter_id(owner_qualified_name: &str, name: &str, position: usize) -> String {
        let pos = position.to_string();
        id(&[owner_qualified_name, name, &pos])
    }

    /// CallSite ids: caller qualified name + line + column.
    pub fn call_site_id(caller_qualified_name: &str, line: u32, col: u32) -> String {
        let l = line.to_string();
        let c = col.to_string();
        id(&[caller_qualified_name, &l, &c])
    }

    /// Type ids: keyed by the full textual annotation, so distinct
    /// generic/union/optional spellings intern as distinct Type nodes.
    pub fn type_id(annotation: &str) -> String {
        id(&["type", annotation])
    }

    /// Decorator ids: keyed by name + the id of the node it decorates.
    pub fn decorator_id(name: &str, target_id: &str) -> String {
        id(&["decorator", name, target_id])
    }

    /// Unresolved-reference placeholder ids.
    pub fn unresolved_id(source_id: &str, reference_kind: &str, name: &str) -> String {
        id(&["unresolved", source_id, reference_kind, name])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_id_is_16_hex_chars() {
        let got = id(&["a", "b", "c"]);
        assert_eq!(got.len(), 16);
        assert!(got.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_id_is_deterministic() {
        assert_eq!(id(&["pkg.mod.Foo"]), id(&["pkg.mod.Foo"]));
    }

    #[test]
    fn test_id_distinguishes_discriminators() {
        let a = IdGenerator::parameter_id("pkg.mod.f", "x", 0);
        let b = IdGenerator::parameter_id("pkg.mod.f", "x", 1);
        assert_ne!(a, b);
    }

    #[test]
    fn test_type_id_distinguishes_generics() {
        let a = IdGenerator::type_id("List[int]");
        let b = IdGenerator::type_id("List[str]");
        assert_ne!(a, b);
    }

    proptest! {
        #[test]
        fn prop_id_deterministic(a in "[a-zA-Z0-9_.]{1,40}", b in "[a-zA-Z0-9_.]{1,40}") {
            let first = id(&[&a, &b]);
            let second = id(&[&a, &b]);
            prop_assert_eq!(first, second);
        }
    }
}
