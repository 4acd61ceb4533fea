//! Best-effort local type inference, `spec.md` §4.2 "Local type inference".
//!
//! No constraints or unification: every helper here either returns a type
//! name or gives up silently. Ambiguity is information, not an error.

/// Numeric widening lattice: bool <= int <= float <= complex.
const NUMERIC_LATTICE: &[&str] = &["bool", "int", "float", "complex"];

/// Promote two numeric type names to their common supertype in the
/// lattice. Returns `None` if either side is not in the lattice.
pub fn promote_numeric(a: &str, b: &str) -> Option<String> {
    let ia = NUMERIC_LATTICE.iter().position(|t| *t == a)?;
    let ib = NUMERIC_LATTICE.iter().position(|t| *t == b)?;
    Some(NUMERIC_LATTICE[ia.max(ib)].to_string())
}

/// Type name for a tree-sitter Python literal node kind, or `None` if the
/// raw kind isn't a literal this function recognizes.
pub fn literal_type_name(raw_kind: &str) -> Option<&'static str> {
    match raw_kind {
        "string" | "concatenated_string" => Some("str"),
        "integer" => Some("int"),
        "float" => Some("float"),
        "true" | "false" => Some("bool"),
        "none" => Some("NoneType"),
        "list" => Some("list"),
        "set" => Some("set"),
        "tuple" => Some("tuple"),
        "dictionary" => Some("dict"),
        _ => None,
    }
}

/// A small whitelist of builtin constructors and the type name calling
/// them produces, per `spec.md` §4.2.
pub fn builtin_constructor_return(callee: &str) -> Option<&'static str> {
    match callee {
        "int" => Some("int"),
        "str" => Some("str"),
        "float" => Some("float"),
        "bool" => Some("bool"),
        "list" => Some("list"),
        "dict" => Some("dict"),
        "set" => Some("set"),
        "tuple" => Some("tuple"),
        "frozenset" => Some("frozenset"),
        "bytes" => Some("bytes"),
        _ => None,
    }
}

/// Homogeneous-element container type name, e.g. `List[int]`, given the
/// container kind and a single shared element type. `None` if the
/// elements aren't homogeneous (caller's responsibility to check).
pub fn homogeneous_container_type(container: &str, element_type: &str) -> String {
    let wrapper = match container {
        "list" => "List",
        "set" => "Set",
        "tuple" => "Tuple",
        other => other,
    };
    format!("{wrapper}[{element_type}]")
}

pub fn dict_type(key_type: &str, value_type: &str) -> String {
    format!("Dict[{key_type},{value_type}]")
}

/// Element type of a `List[T]`/`Set[T]`/`Tuple[T]` container, or the key
/// type of a bare `Dict[K, V]` (default iteration yields keys). `None` for
/// anything else, including a type name with no `[...]` parameterization.
pub fn container_element_type(container_type: &str) -> Option<String> {
    let (wrapper, inner) = container_type.split_once('[')?;
    let inner = inner.strip_suffix(']')?;
    match wrapper {
        "List" | "Set" | "Tuple" => Some(inner.to_string()),
        "Dict" => inner.split_once(',').map(|(k, _)| k.trim().to_string()),
        _ => None,
    }
}

/// Splits a `Dict[K, V]` type name into its `(K, V)` pair.
pub fn dict_kv_types(container_type: &str) -> Option<(String, String)> {
    let inner = container_type.strip_prefix("Dict[")?.strip_suffix(']')?;
    let (k, v) = inner.split_once(',')?;
    Some((k.trim().to_string(), v.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_promote_numeric_lattice() {
        assert_eq!(promote_numeric("bool", "int").as_deref(), Some("int"));
        assert_eq!(promote_numeric("int", "float").as_deref(), Some("float"));
        assert_eq!(promote_numeric("float", "complex").as_deref(), Some("complex"));
        assert_eq!(promote_numeric("int", "str"), None);
    }

    #[test]
    fn test_literal_type_name() {
        assert_eq!(literal_type_name("string"), Some("str"));
        assert_eq!(literal_type_name("integer"), Some("int"));
        assert_eq!(literal_type_name("not_a_kind"), None);
    }

    #[test]
    fn test_builtin_constructor_return() {
        assert_eq!(builtin_constructor_return("int"), Some("int"));
        assert_eq!(builtin_constructor_return("SomeClass"), None);
    }

    #[test]
    fn test_homogeneous_container_type() {
        assert_eq!(homogeneous_container_type("list", "int"), "List[int]");
        assert_eq!(dict_type("str", "int"), "Dict[str,int]");
    }

    #[test]
    fn test_container_element_type() {
        assert_eq!(container_element_type("List[int]").as_deref(), Some("int"));
        assert_eq!(container_element_type("Dict[str,int]").as_deref(), Some("str"));
        assert_eq!(container_element_type("int"), None);
    }

    #[test]
    fn test_dict_kv_types() {
        assert_eq!(dict_kv_types("Dict[str,int]"), Some(("str".to_string(), "int".to_string())));
        assert_eq!(dict_kv_types("List[int]"), None);
    }
}
