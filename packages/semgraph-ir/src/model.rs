//! The typed labeled property multigraph entity model, `spec.md` §3.
//!
//! Sum-typed entities are modeled as a tagged variant (`NodeKind`) wrapped
//! in a shared common header (`id`, `name`, `location`, and the variant
//! itself standing in for `node_type`), per the design note in `spec.md`
//! §9. The store adapter translates each variant to a label plus a flat
//! property bag at the boundary (`Node::label`, `Node::to_property_bag`).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::shared::Location;

/// A scalar or small-list value in a flattened property bag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropValue {
    Str(String),
    Int(i64),
    Bool(bool),
    Float(f64),
    StrList(Vec<String>),
}

impl From<&str> for PropValue {
    fn from(v: &str) -> Self {
        PropValue::Str(v.to_string())
    }
}
impl From<String> for PropValue {
    fn from(v: String) -> Self {
        PropValue::Str(v)
    }
}
impl From<i64> for PropValue {
    fn from(v: i64) -> Self {
        PropValue::Int(v)
    }
}
impl From<usize> for PropValue {
    fn from(v: usize) -> Self {
        PropValue::Int(v as i64)
    }
}
impl From<u32> for PropValue {
    fn from(v: u32) -> Self {
        PropValue::Int(v as i64)
    }
}
impl From<bool> for PropValue {
    fn from(v: bool) -> Self {
        PropValue::Bool(v)
    }
}
impl From<Vec<String>> for PropValue {
    fn from(v: Vec<String>) -> Self {
        PropValue::StrList(v)
    }
}

pub type PropertyBag = BTreeMap<String, PropValue>;

/// Builds a `PropertyBag`, dropping `None` values. Mirrors how the builder
/// is specified to drop unknown/absent properties rather than null them.
#[derive(Default)]
pub struct PropertyBagBuilder(PropertyBag);

impl PropertyBagBuilder {
    pub fn new() -> Self {
        Self(PropertyBag::new())
    }

    pub fn set(mut self, key: &str, value: impl Into<PropValue>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    pub fn set_opt(mut self, key: &str, value: Option<impl Into<PropValue>>) -> Self {
        if let Some(v) = value {
            self.0.insert(key.to_string(), v.into());
        }
        self
    }

    pub fn build(self) -> PropertyBag {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Visibility {
    Public,
    Private,
}

impl Visibility {
    pub fn of(name: &str) -> Self {
        if name.starts_with("__") && name.ends_with("__") {
            Visibility::Public // dunder methods are conventionally public
        } else if name.starts_with('_') {
            Visibility::Private
        } else {
            Visibility::Public
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Private => "private",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParamKind {
    Positional,
    VarPositional,
    VarKeyword,
}

impl ParamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamKind::Positional => "positional",
            ParamKind::VarPositional => "var_positional",
            ParamKind::VarKeyword => "var_keyword",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VarScope {
    Module,
    Class,
    Function,
}

impl VarScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            VarScope::Module => "module",
            VarScope::Class => "class",
            VarScope::Function => "function",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolutionStatus {
    Resolved,
    Unresolved,
    Pending,
}

impl ResolutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionStatus::Resolved => "resolved",
            ResolutionStatus::Unresolved => "unresolved",
            ResolutionStatus::Pending => "pending",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeKind {
    Builtin,
    Class,
    Generic,
    Union,
    Callable,
}

impl TypeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TypeKind::Builtin => "builtin",
            TypeKind::Class => "class",
            TypeKind::Generic => "generic",
            TypeKind::Union => "union",
            TypeKind::Callable => "callable",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecoratorTarget {
    Function,
    Class,
}

impl DecoratorTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecoratorTarget::Function => "Function",
            DecoratorTarget::Class => "Class",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleNode {
    pub qualified_name: String,
    pub path: String,
    pub is_external: bool,
    pub docstring: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassNode {
    pub qualified_name: String,
    pub bases: Vec<String>,
    pub visibility: Visibility,
    pub decorators: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionNode {
    pub qualified_name: String,
    pub signature: String,
    pub return_type: Option<String>,
    pub visibility: Visibility,
    pub is_async: bool,
    pub is_generator: bool,
    pub is_staticmethod: bool,
    pub is_classmethod: bool,
    pub is_property: bool,
    pub decorators: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterNode {
    pub name: String,
    pub position: usize,
    pub kind: ParamKind,
    pub type_annotation: Option<String>,
    pub default_value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableNode {
    pub name: String,
    pub scope: VarScope,
    pub type_annotation: Option<String>,
    pub inferred_types: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallSiteNode {
    pub caller_id: String,
    pub arg_count: usize,
    pub has_args: bool,
    pub has_kwargs: bool,
    pub lineno: u32,
    pub col_offset: u32,
    pub arg_types: Vec<String>,
    pub resolution_status: ResolutionStatus,
    pub unresolved_callee: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeNode {
    pub name: String,
    pub module: Option<String>,
    pub kind: TypeKind,
    pub base_types: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecoratorNode {
    pub name: String,
    pub target_id: String,
    pub target_type: DecoratorTarget,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnresolvedNode {
    pub reference_kind: String,
    pub source_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeKind {
    Module(ModuleNode),
    Class(ClassNode),
    Function(FunctionNode),
    Parameter(ParameterNode),
    Variable(VariableNode),
    CallSite(CallSiteNode),
    Type(TypeNode),
    Decorator(DecoratorNode),
    Unresolved(UnresolvedNode),
}

impl NodeKind {
    pub fn label(&self) -> &'static str {
        match self {
            NodeKind::Module(_) => "Module",
            NodeKind::Class(_) => "Class",
            NodeKind::Function(_) => "Function",
            NodeKind::Parameter(_) => "Parameter",
            NodeKind::Variable(_) => "Variable",
            NodeKind::CallSite(_) => "CallSite",
            NodeKind::Type(_) => "Type",
            NodeKind::Decorator(_) => "Decorator",
            NodeKind::Unresolved(_) => "Unresolved",
        }
    }
}

/// One graph node: shared header plus the per-variant payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub name: String,
    pub location: Option<String>,
    pub kind: NodeKind,
}

impl Node {
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            location: None,
            kind,
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_location_at(mut self, path: &str, loc: Location) -> Self {
        self.location = Some(crate::shared::format_location(path, loc.line, loc.column));
        self
    }

    pub fn label(&self) -> &'static str {
        self.kind.label()
    }

    /// Flatten this node's per-variant payload into a property bag, as
    /// required by `spec.md` §6's wire representation ("all fields of §3
    /// flattened to scalars; list fields kept as primitive arrays").
    pub fn to_property_bag(&self) -> PropertyBag {
        let mut b = PropertyBagBuilder::new().set("id", self.id.clone()).set("name", self.name.clone());
        if let Some(loc) = &self.location {
            b = b.set("location", loc.clone());
        }
        let b = match &self.kind {
            NodeKind::Module(m) => b
                .set("qualified_name", m.qualified_name.clone())
                .set("path", m.path.clone())
                .set("is_external", m.is_external)
                .set_opt("docstring", m.docstring.clone()),
            NodeKind::Class(c) => b
                .set("qualified_name", c.qualified_name.clone())
                .set("bases", c.bases.clone())
                .set("visibility", c.visibility.as_str().to_string())
                .set("decorators", c.decorators.clone()),
            NodeKind::Function(f) => b
                .set("qualified_name", f.qualified_name.clone())
                .set("signature", f.signature.clone())
                .set_opt("return_type", f.return_type.clone())
                .set("visibility", f.visibility.as_str().to_string())
                .set("is_async", f.is_async)
                .set("is_generator", f.is_generator)
                .set("is_staticmethod", f.is_staticmethod)
                .set("is_classmethod", f.is_classmethod)
                .set("is_property", f.is_property)
                .set("decorators", f.decorators.clone()),
            NodeKind::Parameter(p) => b
                .set("name", p.name.clone())
                .set("position", p.position)
                .set("kind", p.kind.as_str().to_string())
                .set_opt("type_annotation", p.type_annotation.clone())
                .set_opt("default_value", p.default_value.clone()),
            NodeKind::Variable(v) => b
                .set("name", v.name.clone())
                .set("scope", v.scope.as_str().to_string())
                .set_opt("type_annotation", v.type_annotation.clone())
                .set("inferred_types", v.inferred_types.clone()),
            NodeKind::CallSite(c) => {
                let b = b
                    .set("caller_id", c.caller_id.clone())
                    .set("arg_count", c.arg_count)
                    .set("has_args", c.has_args)
                    .set("has_kwargs", c.has_kwargs)
                    .set("lineno", c.lineno)
                    .set("col_offset", c.col_offset)
                    .set("arg_types", c.arg_types.clone())
                    .set("resolution_status", c.resolution_status.as_str().to_string());
                b.set_opt("unresolved_callee", c.unresolved_callee.clone())
            }
            NodeKind::Type(t) => b
                .set("name", t.name.clone())
                .set_opt("module", t.module.clone())
                .set("kind", t.kind.as_str().to_string())
                .set("base_types", t.base_types.clone()),
            NodeKind::Decorator(d) => b
                .set("name", d.name.clone())
                .set("target_id", d.target_id.clone())
                .set("target_type", d.target_type.as_str().to_string()),
            NodeKind::Unresolved(u) => b
                .set("reference_kind", u.reference_kind.clone())
                .set("source_id", u.source_id.clone()),
        };
        b.build()
    }
}

/// Edge labels, per the table in `spec.md` §3. `Calls` is emitted
/// alongside `ResolvesTo` by the builder (`spec.md` §4.4) though it is not
/// itself in the primary edge table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EdgeKind {
    Declares,
    HasParameter,
    HasCallsite,
    ResolvesTo,
    Calls,
    Inherits,
    Imports,
    HasType,
    ReturnsType,
    AssignedType,
    IsSubtypeOf,
    HasDecorator,
    Decorates,
    AssignsTo,
    ReadsFrom,
    References,
    UnresolvedReference,
}

impl EdgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeKind::Declares => "DECLARES",
            EdgeKind::HasParameter => "HAS_PARAMETER",
            EdgeKind::HasCallsite => "HAS_CALLSITE",
            EdgeKind::ResolvesTo => "RESOLVES_TO",
            EdgeKind::Calls => "CALLS",
            EdgeKind::Inherits => "INHERITS",
            EdgeKind::Imports => "IMPORTS",
            EdgeKind::HasType => "HAS_TYPE",
            EdgeKind::ReturnsType => "RETURNS_TYPE",
            EdgeKind::AssignedType => "ASSIGNED_TYPE",
            EdgeKind::IsSubtypeOf => "IS_SUBTYPE_OF",
            EdgeKind::HasDecorator => "HAS_DECORATOR",
            EdgeKind::Decorates => "DECORATES",
            EdgeKind::AssignsTo => "ASSIGNS_TO",
            EdgeKind::ReadsFrom => "READS_FROM",
            EdgeKind::References => "REFERENCES",
            EdgeKind::UnresolvedReference => "UNRESOLVED_REFERENCE",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "DECLARES" => EdgeKind::Declares,
            "HAS_PARAMETER" => EdgeKind::HasParameter,
            "HAS_CALLSITE" => EdgeKind::HasCallsite,
            "RESOLVES_TO" => EdgeKind::ResolvesTo,
            "CALLS" => EdgeKind::Calls,
            "INHERITS" => EdgeKind::Inherits,
            "IMPORTS" => EdgeKind::Imports,
            "HAS_TYPE" => EdgeKind::HasType,
            "RETURNS_TYPE" => EdgeKind::ReturnsType,
            "ASSIGNED_TYPE" => EdgeKind::AssignedType,
            "IS_SUBTYPE_OF" => EdgeKind::IsSubtypeOf,
            "HAS_DECORATOR" => EdgeKind::HasDecorator,
            "DECORATES" => EdgeKind::Decorates,
            "ASSIGNS_TO" => EdgeKind::AssignsTo,
            "READS_FROM" => EdgeKind::ReadsFrom,
            "REFERENCES" => EdgeKind::References,
            "UNRESOLVED_REFERENCE" => EdgeKind::UnresolvedReference,
            _ => return None,
        })
    }

    /// Admissible `(from_label, to_label)` pairs per the `spec.md` §3 edge
    /// table. Used by the validator's Structural law (P4).
    pub fn admissible_endpoints(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            EdgeKind::Declares => &[
                ("Module", "Class"),
                ("Module", "Function"),
                ("Module", "Variable"),
                ("Class", "Class"),
                ("Class", "Function"),
                ("Class", "Variable"),
            ],
            EdgeKind::HasParameter => &[("Function", "Parameter")],
            EdgeKind::HasCallsite => &[("Function", "CallSite")],
            EdgeKind::ResolvesTo => &[("CallSite", "Function")],
            EdgeKind::Calls => &[("CallSite", "Function")],
            EdgeKind::Inherits => &[("Class", "Class")],
            EdgeKind::Imports => &[("Module", "Module")],
            EdgeKind::HasType => &[("Parameter", "Type"), ("Variable", "Type")],
            EdgeKind::ReturnsType => &[("Function", "Type")],
            EdgeKind::AssignedType => &[("Variable", "Type")],
            EdgeKind::IsSubtypeOf => &[("Type", "Type")],
            EdgeKind::HasDecorator => &[("Function", "Decorator"), ("Class", "Decorator")],
            EdgeKind::Decorates => &[("Decorator", "Function"), ("Decorator", "Class")],
            EdgeKind::AssignsTo => &[("Function", "Variable")],
            EdgeKind::ReadsFrom => &[("Function", "Variable")],
            EdgeKind::References => &[], // any -> any resolvable entity; no static restriction
            EdgeKind::UnresolvedReference => &[
                ("Function", "Unresolved"),
                ("Class", "Unresolved"),
                ("Module", "Unresolved"),
            ],
        }
    }

    pub fn endpoints_admissible(&self, from_label: &str, to_label: &str) -> bool {
        let allowed = self.admissible_endpoints();
        allowed.is_empty() || allowed.iter().any(|(f, t)| *f == from_label && *t == to_label)
    }
}

/// A materialized edge: both endpoints are known ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub from_id: String,
    pub to_id: String,
    pub kind: EdgeKind,
    pub properties: PropertyBag,
}

impl Edge {
    pub fn new(from_id: impl Into<String>, to_id: impl Into<String>, kind: EdgeKind) -> Self {
        Self {
            from_id: from_id.into(),
            to_id: to_id.into(),
            kind,
            properties: PropertyBag::new(),
        }
    }

    pub fn with_properties(mut self, properties: PropertyBag) -> Self {
        self.properties = properties;
        self
    }
}

/// An extractor-local relationship: either a fully-resolved `Edge`, or a
/// deferred `CALLS_UNRESOLVED` placeholder carrying a textual callee name
/// in place of a target id (`spec.md` §4.2 step 5, §9 "Placeholder
/// edges"). The builder (`semgraph-orchestration`) resolves the latter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Relationship {
    Edge(Edge),
    CallsUnresolved {
        call_site_id: String,
        caller_function_id: String,
        callee_name: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_to_property_bag_drops_none() {
        let node = Node::new(
            "abc",
            "f",
            NodeKind::Function(FunctionNode {
                qualified_name: "pkg.f".into(),
                signature: "f()".into(),
                return_type: None,
                visibility: Visibility::Public,
                is_async: false,
                is_generator: false,
                is_staticmethod: false,
                is_classmethod: false,
                is_property: false,
                decorators: vec![],
            }),
        );
        let bag = node.to_property_bag();
        assert!(!bag.contains_key("return_type"));
        assert_eq!(bag.get("qualified_name"), Some(&PropValue::Str("pkg.f".into())));
    }

    #[test]
    fn test_edge_kind_admissible_endpoints() {
        assert!(EdgeKind::HasParameter.endpoints_admissible("Function", "Parameter"));
        assert!(!EdgeKind::HasParameter.endpoints_admissible("Module", "Parameter"));
        // REFERENCES has no static restriction.
        assert!(EdgeKind::References.endpoints_admissible("Variable", "Function"));
    }

    #[test]
    fn test_edge_kind_round_trips_through_str() {
        for kind in [EdgeKind::Declares, EdgeKind::IsSubtypeOf, EdgeKind::UnresolvedReference] {
            let s = kind.as_str();
            assert_eq!(EdgeKind::from_str(s), Some(kind));
        }
    }

    #[test]
    fn test_visibility_of_dunder_is_public() {
        assert_eq!(Visibility::of("__init__"), Visibility::Public);
        assert_eq!(Visibility::of("_private"), Visibility::Private);
        assert_eq!(Visibility::of("public"), Visibility::Public);
    }
}
