//! The single-pass AST walker, `spec.md` §4.2.
//!
//! Grounded on `tree_sitter::Node` child-iteration in the style of the
//! teacher's `features/parsing/infrastructure/extractors/function.rs` —
//! direct `node.child_by_field_name`/kind matching rather than a
//! generalized visitor abstraction.

use std::collections::HashMap;

use tree_sitter::Node as TsNode;

use crate::model::*;
use crate::shared::{id::IdGenerator, format_location, CodegraphError, Location, ScopeStack};

use super::type_infer;

const BUILTIN_WHITELIST: &[&str] = &[
    "print", "len", "range", "enumerate", "zip", "map", "filter", "sorted", "reversed", "super",
    "isinstance", "issubclass", "hasattr", "getattr", "setattr", "open", "input", "type", "id",
    "repr", "format", "iter", "next", "min", "max", "sum", "abs", "all", "any", "int", "str",
    "float", "bool", "list", "dict", "set", "tuple", "frozenset", "bytes", "object", "Exception",
    "ValueError", "TypeError", "KeyError", "IndexError", "StopIteration", "self", "cls",
];

/// A deferred request to link a textual annotation to a Type node, created
/// during the main walk and resolved in a final type-linking pass
/// (`spec.md` §4.2 step 8).
struct TypeLinkRequest {
    owner_id: String,
    edge_kind: EdgeKind,
    annotation: String,
}

#[derive(Default)]
struct FunctionScope {
    id: String,
    qualified_name: String,
    locals: HashMap<String, String>,
}

#[derive(Default)]
struct ClassScope {
    id: String,
    qualified_name: String,
    members: HashMap<String, String>,
}

pub struct Walker<'a> {
    source: &'a str,
    path: String,
    module_id: String,
    module_qualified_name: String,
    scope: ScopeStack,
    function_stack: Vec<FunctionScope>,
    class_stack: Vec<ClassScope>,
    module_vars: HashMap<String, String>,
    /// every entity created in this file, keyed by simple name and by
    /// qualified name, for the file-local fallback lookups §4.2 step 3
    /// describes ("an indexed name table of all created entities").
    indexed_names: HashMap<String, String>,
    entities: HashMap<String, Node>,
    relationships: Vec<Relationship>,
    type_link_requests: Vec<TypeLinkRequest>,
    errors: Vec<CodegraphError>,
    module_level_fn_id: Option<String>,
}

pub struct WalkOutput {
    pub entities: HashMap<String, Node>,
    pub relationships: Vec<Relationship>,
    pub errors: Vec<CodegraphError>,
}

impl<'a> Walker<'a> {
    pub fn new(source: &'a str, path: &str, module_qualified_name: &str) -> Self {
        let module_id = IdGenerator::entity_id(module_qualified_name);
        let mut w = Self {
            source,
            path: path.to_string(),
            module_id: module_id.clone(),
            module_qualified_name: module_qualified_name.to_string(),
            scope: ScopeStack::new(),
            function_stack: Vec::new(),
            class_stack: Vec::new(),
            module_vars: HashMap::new(),
            indexed_names: HashMap::new(),
            entities: HashMap::new(),
            relationships: Vec::new(),
            type_link_requests: Vec::new(),
            errors: Vec::new(),
            module_level_fn_id: None,
        };
        w.scope.push(module_qualified_name.to_string());
        w
    }

    fn text(&self, node: &TsNode) -> &'a str {
        self.source.get(node.byte_range()).unwrap_or("")
    }

    fn loc(&self, node: &TsNode) -> Location {
        Location::new(node.start_position().row as u32 + 1, node.start_position().column as u32)
    }

    fn location_string(&self, node: &TsNode) -> String {
        let l = self.loc(node);
        format_location(&self.path, l.line, l.column)
    }

    fn insert_entity(&mut self, node: Node) {
        self.indexed_names.insert(node.name.clone(), node.id.clone());
        if let Some(q) = qualified_name_of(&node.kind) {
            self.indexed_names.insert(q.to_string(), node.id.clone());
        }
        self.entities.insert(node.id.clone(), node);
    }

    fn emit_edge(&mut self, from: &str, to: &str, kind: EdgeKind) {
        self.relationships.push(Relationship::Edge(Edge::new(from, to, kind)));
    }

    fn emit_edge_props(&mut self, from: &str, to: &str, kind: EdgeKind, props: PropertyBag) {
        self.relationships.push(Relationship::Edge(Edge::new(from, to, kind).with_properties(props)));
    }

    /// The id of the function-like scope statements at the current nesting
    /// level attach to: the innermost real function, else a lazily-created
    /// `<module>`/`<classbody>` pseudo-function so CallSite/ASSIGNS_TO/
    /// READS_FROM edges always have a Function owner per `spec.md` §3's
    /// CallSite invariant.
    fn enclosing_function_id(&mut self) -> String {
        if let Some(f) = self.function_stack.last() {
            return f.id.clone();
        }
        if let Some(c) = self.class_stack.last() {
            let qn = format!("{}.<classbody>", c.qualified_name);
            let id = IdGenerator::entity_id(&qn);
            if !self.entities.contains_key(&id) {
                let node = Node::new(
                    id.clone(),
                    "<classbody>",
                    NodeKind::Function(FunctionNode {
                        qualified_name: qn,
                        signature: "<classbody>()".into(),
                        return_type: None,
                        visibility: Visibility::Private,
                        is_async: false,
                        is_generator: false,
                        is_staticmethod: false,
                        is_classmethod: false,
                        is_property: false,
                        decorators: vec![],
                    }),
                );
                let class_id = c.id.clone();
                self.insert_entity(node);
                self.emit_edge(&class_id, &id, EdgeKind::Declares);
            }
            return id;
        }
        if let Some(id) = &self.module_level_fn_id {
            return id.clone();
        }
        let qn = format!("{}.<module>", self.module_qualified_name);
        let id = IdGenerator::entity_id(&qn);
        let node = Node::new(
            id.clone(),
            "<module>",
            NodeKind::Function(FunctionNode {
                qualified_name: qn,
                signature: "<module>()".into(),
                return_type: None,
                visibility: Visibility::Private,
                is_async: false,
                is_generator: false,
                is_staticmethod: false,
                is_classmethod: false,
                is_property: false,
                decorators: vec![],
            }),
        );
        self.insert_entity(node);
        self.emit_edge(&self.module_id.clone(), &id, EdgeKind::Declares);
        self.module_level_fn_id = Some(id.clone());
        id
    }

    /// Resolve a simple name via the scope chain described in `spec.md`
    /// §4.2 step 3: function scope, then class, then module, then the
    /// file's indexed-name table, then the builtin whitelist.
    fn resolve_name(&self, name: &str) -> Option<(String, &'static str)> {
        if let Some(f) = self.function_stack.last() {
            if let Some(id) = f.locals.get(name) {
                return Some((id.clone(), "Variable"));
            }
        }
        if let Some(c) = self.class_stack.last() {
            if let Some(id) = c.members.get(name) {
                return self.entities.get(id).map(|n| (id.clone(), n.label()));
            }
        }
        if let Some(id) = self.module_vars.get(name) {
            return Some((id.clone(), "Variable"));
        }
        if let Some(id) = self.indexed_names.get(name) {
            return self.entities.get(id).map(|n| (id.clone(), n.label()));
        }
        if BUILTIN_WHITELIST.contains(&name) {
            return None;
        }
        None
    }

    pub fn walk_module(mut self, root: TsNode<'a>) -> WalkOutput {
        let docstring = module_docstring(&root, self.source);
        let module_node = Node::new(
            self.module_id.clone(),
            module_name_from_qualified(&self.module_qualified_name),
            NodeKind::Module(ModuleNode {
                qualified_name: self.module_qualified_name.clone(),
                path: self.path.clone(),
                is_external: false,
                docstring,
            }),
        )
        .with_location(format_location(&self.path, 1, 0));
        self.insert_entity(module_node);

        let mut cursor = root.walk();
        for child in root.children(&mut cursor) {
            self.walk_statement(child);
        }
        self.finish_type_links();

        WalkOutput {
            entities: self.entities,
            relationships: self.relationships,
            errors: self.errors,
        }
    }

    fn walk_block(&mut self, block: TsNode<'a>) {
        let mut cursor = block.walk();
        for child in block.children(&mut cursor) {
            self.walk_statement(child);
        }
    }

    fn walk_statement(&mut self, node: TsNode<'a>) {
        match node.kind() {
            "function_definition" => self.walk_function_def(node, &[]),
            "class_definition" => self.walk_class_def(node, &[]),
            "decorated_definition" => self.walk_decorated_def(node),
            "import_statement" => self.walk_import_statement(node),
            "import_from_statement" => self.walk_import_from_statement(node),
            "assignment" | "augmented_assignment" => self.walk_assignment(node),
            "expression_statement" => {
                let mut cursor = node.walk();
                for child in node.children(&mut cursor) {
                    self.scan_expr(child);
                }
            }
            "return_statement" => {
                let mut cursor = node.walk();
                for child in node.children(&mut cursor) {
                    self.scan_expr(child);
                }
            }
            "if_statement" | "while_statement" | "try_statement" => self.walk_compound(node),
            "with_statement" => self.walk_with_statement(node),
            "for_statement" => self.walk_for(node),
            "block" => self.walk_block(node),
            _ => {
                // Statement kinds we don't specially model (pass, break,
                // continue, raise, global, nonlocal, ...) still need their
                // nested expressions scanned for call sites / references.
                let mut cursor = node.walk();
                for child in node.children(&mut cursor) {
                    if child.is_named() {
                        self.scan_expr(child);
                    }
                }
            }
        }
    }

    fn walk_compound(&mut self, node: TsNode<'a>) {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            match child.kind() {
                "block" => self.walk_block(child),
                _ if child.is_named() => self.scan_expr(child),
                _ => {}
            }
        }
    }

    fn walk_for(&mut self, node: TsNode<'a>) {
        let right = node.child_by_field_name("right");
        if let Some(left) = node.child_by_field_name("left") {
            let targets = self.for_target_names(left);
            let elem_types = right.map(|r| self.infer_for_element_types(r, targets.len())).unwrap_or_default();
            for (i, (name, target_node)) in targets.into_iter().enumerate() {
                let types = elem_types.get(i).cloned().into_iter().collect();
                self.bind_variable(&name, &target_node, types);
            }
        }
        if let Some(right_node) = right {
            self.scan_expr(right_node);
        }
        if let Some(body) = node.child_by_field_name("body") {
            self.walk_block(body);
        }
    }

    /// Flattens a `for` target into `(name, node)` pairs: a bare
    /// identifier is one target; a tuple target (`for k, v in ...`) is
    /// each of its identifier children, left-to-right.
    fn for_target_names(&self, left: TsNode<'a>) -> Vec<(String, TsNode<'a>)> {
        if left.kind() == "identifier" {
            return vec![(self.text(&left).to_string(), left)];
        }
        let mut cursor = left.walk();
        left.named_children(&mut cursor)
            .filter(|c| c.kind() == "identifier")
            .map(|c| (self.text(&c).to_string(), c))
            .collect()
    }

    /// Element type(s) for a `for` target of `arity` names over `right`,
    /// `spec.md` §4.2: a `Dict[K, V].items()` call unpacks to `(K, V)`
    /// for a two-element target tuple; a `List[T]`/`Set[T]`/`Tuple[T]`
    /// (or a bare `Dict[K, V]`, whose default iteration yields keys)
    /// binds `T` to a single bare target.
    fn infer_for_element_types(&mut self, right: TsNode<'a>, arity: usize) -> Vec<String> {
        if arity == 2 {
            let is_items_call = right.kind() == "call"
                && right
                    .child_by_field_name("function")
                    .filter(|f| f.kind() == "attribute")
                    .and_then(|f| f.child_by_field_name("attribute"))
                    .map(|a| self.text(&a) == "items")
                    .unwrap_or(false);
            if is_items_call {
                if let Some(obj) = right
                    .child_by_field_name("function")
                    .and_then(|f| f.child_by_field_name("object"))
                {
                    if let Some(t) = self.infer_expr_type(obj) {
                        if let Some((k, v)) = type_infer::dict_kv_types(&t) {
                            return vec![k, v];
                        }
                    }
                }
            }
            return vec![];
        }
        if arity == 1 {
            if let Some(t) = self.infer_expr_type(right) {
                if let Some(elem) = type_infer::container_element_type(&t) {
                    return vec![elem];
                }
            }
        }
        vec![]
    }

    /// `with obj as x:` binds `x` as a Variable, inferred from `obj`'s
    /// type when available. `spec.md` §4.2.
    fn walk_with_statement(&mut self, node: TsNode<'a>) {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            match child.kind() {
                "with_item" => self.walk_with_item(child),
                "block" => self.walk_block(child),
                _ if child.is_named() => self.scan_expr(child),
                _ => {}
            }
        }
    }

    fn walk_with_item(&mut self, node: TsNode<'a>) {
        let value = node.child_by_field_name("value");
        if let Some(v) = value {
            self.scan_expr(v);
        }
        if let Some(alias) = node.child_by_field_name("alias") {
            if alias.kind() == "identifier" {
                let name = self.text(&alias).to_string();
                let inferred = value.and_then(|v| self.infer_expr_type(v));
                self.bind_variable(&name, &alias, inferred.into_iter().collect());
            }
        }
    }

    fn walk_decorated_def(&mut self, node: TsNode<'a>) {
        let mut decorator_texts = Vec::new();
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            if child.kind() == "decorator" {
                if let Some(expr) = child.named_child(0) {
                    decorator_texts.push(self.text(&expr).to_string());
                }
            }
        }
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            match child.kind() {
                "function_definition" => self.walk_function_def(child, &decorator_texts),
                "class_definition" => self.walk_class_def(child, &decorator_texts),
                _ => {}
            }
        }
    }

    fn walk_function_def(&mut self, node: TsNode<'a>, decorators: &[String]) {
        let Some(name_node) = node.child_by_field_name("name") else { return };
        let name = self.text(&name_node).to_string();
        let qualified_name = self.scope.fqn_with(&name);
        let id = IdGenerator::entity_id(&qualified_name);

        let is_staticmethod = decorators.iter().any(|d| d == "staticmethod");
        let is_classmethod = decorators.iter().any(|d| d == "classmethod");
        let is_property = decorators.iter().any(|d| d == "property");
        let is_async = node
            .child(0)
            .map(|c| self.text(&c) == "async")
            .unwrap_or(false);

        let params_node = node.child_by_field_name("parameters");
        let (param_nodes, is_generator) = {
            let body = node.child_by_field_name("body");
            let has_yield = body.map(|b| subtree_contains_kind(b, "yield")).unwrap_or(false);
            (self.collect_params(params_node), has_yield)
        };

        let return_type = node
            .child_by_field_name("return_type")
            .map(|n| self.text(&n).to_string());

        let signature = render_signature(&name, &param_nodes, return_type.as_deref());

        let func_node = FunctionNode {
            qualified_name: qualified_name.clone(),
            signature,
            return_type: return_type.clone(),
            visibility: Visibility::of(&name),
            is_async,
            is_generator,
            is_staticmethod,
            is_classmethod,
            is_property,
            decorators: decorators.to_vec(),
        };
        let node_obj = Node::new(id.clone(), name.clone(), NodeKind::Function(func_node))
            .with_location_at(&self.path, self.loc(&node));
        self.insert_entity(node_obj);

        let owner_id = self.current_owner_id();
        self.emit_edge(&owner_id, &id, EdgeKind::Declares);
        self.bind_in_enclosing_scope(&name, &id);

        if let Some(rt) = &return_type {
            self.type_link_requests.push(TypeLinkRequest {
                owner_id: id.clone(),
                edge_kind: EdgeKind::ReturnsType,
                annotation: rt.clone(),
            });
        }

        for d in decorators {
            self.materialize_decorator(d, &id, DecoratorTarget::Function);
        }

        self.function_stack.push(FunctionScope {
            id: id.clone(),
            qualified_name: qualified_name.clone(),
            locals: HashMap::new(),
        });

        for (i, p) in param_nodes.iter().enumerate() {
            let param_qn = format!("{qualified_name}.{}", p.name);
            let param_id = IdGenerator::parameter_id(&qualified_name, &p.name, i);
            let param_node = Node::new(
                param_id.clone(),
                p.name.clone(),
                NodeKind::Parameter(ParameterNode {
                    name: p.name.clone(),
                    position: i,
                    kind: p.kind,
                    type_annotation: p.type_annotation.clone(),
                    default_value: p.default_value.clone(),
                }),
            );
            let _ = &param_qn;
            self.insert_entity(param_node);
            self.emit_edge_props(
                &id,
                &param_id,
                EdgeKind::HasParameter,
                PropertyBagBuilder::new().set("position", i).build(),
            );
            if let Some(scope) = self.function_stack.last_mut() {
                scope.locals.insert(p.name.clone(), param_id.clone());
            }
            if let Some(ann) = &p.type_annotation {
                self.type_link_requests.push(TypeLinkRequest {
                    owner_id: param_id,
                    edge_kind: EdgeKind::HasType,
                    annotation: ann.clone(),
                });
            }
        }

        self.scope.push(name);
        if let Some(body) = node.child_by_field_name("body") {
            self.walk_block(body);
        }
        self.scope.pop();
        self.function_stack.pop();
    }

    fn current_owner_id(&self) -> String {
        if let Some(c) = self.class_stack.last() {
            c.id.clone()
        } else {
            self.module_id.clone()
        }
    }

    fn bind_in_enclosing_scope(&mut self, name: &str, id: &str) {
        if let Some(c) = self.class_stack.last_mut() {
            c.members.insert(name.to_string(), id.to_string());
        } else {
            self.module_vars.insert(name.to_string(), id.to_string());
        }
    }

    fn materialize_decorator(&mut self, decorator_text: &str, target_id: &str, target_type: DecoratorTarget) {
        let dec_id = IdGenerator::decorator_id(decorator_text, target_id);
        let dec_node = Node::new(
            dec_id.clone(),
            decorator_text.to_string(),
            NodeKind::Decorator(DecoratorNode {
                name: decorator_text.to_string(),
                target_id: target_id.to_string(),
                target_type,
            }),
        );
        self.insert_entity(dec_node);
        self.emit_edge(target_id, &dec_id, EdgeKind::HasDecorator);
        self.emit_edge(&dec_id, target_id, EdgeKind::Decorates);

        let simple = decorator_text.split('(').next().unwrap_or(decorator_text);
        let simple = simple.split('.').last().unwrap_or(simple).trim();
        if let Some((resolved_id, _label)) = self.resolve_name(simple) {
            self.emit_edge(&dec_id, &resolved_id, EdgeKind::References);
        }
    }

    fn walk_class_def(&mut self, node: TsNode<'a>, decorators: &[String]) {
        let Some(name_node) = node.child_by_field_name("name") else { return };
        let name = self.text(&name_node).to_string();
        let qualified_name = self.scope.fqn_with(&name);
        let id = IdGenerator::entity_id(&qualified_name);

        let mut bases = Vec::new();
        if let Some(superclasses) = node.child_by_field_name("superclasses") {
            let mut cursor = superclasses.walk();
            for arg in superclasses.named_children(&mut cursor) {
                if arg.kind() != "keyword_argument" {
                    bases.push(self.text(&arg).to_string());
                }
            }
        }

        let class_node = ClassNode {
            qualified_name: qualified_name.clone(),
            bases: bases.clone(),
            visibility: Visibility::of(&name),
            decorators: decorators.to_vec(),
        };
        let node_obj = Node::new(id.clone(), name.clone(), NodeKind::Class(class_node))
            .with_location_at(&self.path, self.loc(&node));
        self.insert_entity(node_obj);

        let owner_id = self.current_owner_id();
        self.emit_edge(&owner_id, &id, EdgeKind::Declares);
        self.bind_in_enclosing_scope(&name, &id);

        for d in decorators {
            self.materialize_decorator(d, &id, DecoratorTarget::Class);
        }

        for base in &bases {
            let simple = base.split('[').next().unwrap_or(base).trim();
            match self.indexed_names.get(simple).cloned() {
                Some(base_id) if matches!(self.entities.get(&base_id).map(|n| &n.kind), Some(NodeKind::Class(_))) => {
                    self.emit_edge(&id, &base_id, EdgeKind::Inherits);
                }
                _ => {
                    // B3: base matches no known class in the file — record
                    // an Unresolved node rather than crashing or silently
                    // dropping the relationship.
                    let unresolved_id = IdGenerator::unresolved_id(&id, "base_class", simple);
                    let unresolved_node = Node::new(
                        unresolved_id.clone(),
                        simple.to_string(),
                        NodeKind::Unresolved(UnresolvedNode {
                            reference_kind: "base_class".to_string(),
                            source_id: id.clone(),
                        }),
                    );
                    self.entities.entry(unresolved_id.clone()).or_insert(unresolved_node);
                    self.emit_edge(&id, &unresolved_id, EdgeKind::UnresolvedReference);
                }
            }
        }

        self.class_stack.push(ClassScope {
            id: id.clone(),
            qualified_name: qualified_name.clone(),
            members: HashMap::new(),
        });
        self.scope.push(name);
        if let Some(body) = node.child_by_field_name("body") {
            self.walk_block(body);
        }
        self.scope.pop();
        self.class_stack.pop();
    }

    fn walk_import_statement(&mut self, node: TsNode<'a>) {
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            match child.kind() {
                "dotted_name" => {
                    let dotted = self.text(&child).to_string();
                    self.import_module(&dotted, &dotted, None);
                }
                "aliased_import" => {
                    if let Some(name_part) = child.child_by_field_name("name") {
                        let dotted = self.text(&name_part).to_string();
                        let alias = child
                            .child_by_field_name("alias")
                            .map(|a| self.text(&a).to_string());
                        self.import_module(&dotted, &dotted, alias);
                    }
                }
                _ => {}
            }
        }
    }

    fn walk_import_from_statement(&mut self, node: TsNode<'a>) {
        let module_name = node
            .child_by_field_name("module_name")
            .map(|n| self.text(&n).to_string())
            .unwrap_or_default();
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            match child.kind() {
                "dotted_name" | "identifier" => {
                    let name = self.text(&child).to_string();
                    if name == module_name {
                        continue;
                    }
                    self.import_module(&module_name, &name, None);
                }
                "aliased_import" => {
                    if let Some(name_part) = child.child_by_field_name("name") {
                        let import_name = self.text(&name_part).to_string();
                        let alias = child
                            .child_by_field_name("alias")
                            .map(|a| self.text(&a).to_string());
                        self.import_module(&module_name, &import_name, alias);
                    }
                }
                "wildcard_import" => {
                    self.import_module(&module_name, "*", None);
                }
                _ => {}
            }
        }
    }

    fn import_module(&mut self, module_path: &str, import_name: &str, alias: Option<String>) {
        let ext_id = IdGenerator::entity_id(module_path);
        self.entities.entry(ext_id.clone()).or_insert_with(|| {
            Node::new(
                ext_id.clone(),
                module_path.to_string(),
                NodeKind::Module(ModuleNode {
                    qualified_name: module_path.to_string(),
                    path: String::new(),
                    is_external: true,
                    docstring: None,
                }),
            )
        });
        let mut props = PropertyBagBuilder::new().set("import_name", import_name.to_string());
        if let Some(a) = &alias {
            props = props.set("alias", a.clone());
        }
        self.emit_edge_props(&self.module_id.clone(), &ext_id, EdgeKind::Imports, props.build());
        let binding_name = alias.unwrap_or_else(|| import_name.split('.').next().unwrap_or(import_name).to_string());
        self.bind_in_enclosing_scope(&binding_name, &ext_id);
    }

    fn walk_assignment(&mut self, node: TsNode<'a>) {
        let Some(left) = node.child_by_field_name("left") else { return };
        let right = node.child_by_field_name("right");
        let annotation = node.child_by_field_name("type").map(|n| self.text(&n).to_string());

        if let Some(right_node) = right {
            self.scan_expr(right_node);
        }

        if left.kind() != "identifier" {
            // Tuple/attribute/subscript targets: best-effort skip, per
            // `spec.md` §4.2's "any ambiguity leaves the type absent".
            return;
        }
        let name = self.text(&left).to_string();
        let inferred = right.and_then(|r| self.infer_expr_type(r));
        let mut types = Vec::new();
        if let Some(a) = &annotation {
            types.push(a.clone());
        } else if let Some(t) = &inferred {
            types.push(t.clone());
        }
        self.bind_variable(&name, &left, types);

        let var_id = self.resolve_name(&name).map(|(id, _)| id);
        if let Some(var_id) = var_id {
            if let Some(ann) = annotation {
                self.type_link_requests.push(TypeLinkRequest {
                    owner_id: var_id.clone(),
                    edge_kind: EdgeKind::HasType,
                    annotation: ann,
                });
            } else if let Some(t) = inferred {
                self.type_link_requests.push(TypeLinkRequest {
                    owner_id: var_id,
                    edge_kind: EdgeKind::AssignedType,
                    annotation: t,
                });
            }
        }
    }

    fn bind_variable(&mut self, name: &str, _left: &TsNode<'a>, mut inferred_types: Vec<String>) {
        let scope_kind = if !self.function_stack.is_empty() {
            VarScope::Function
        } else if !self.class_stack.is_empty() {
            VarScope::Class
        } else {
            VarScope::Module
        };

        let existing_id = self.resolve_name(name).map(|(id, label)| (id, label));
        let var_id = match &existing_id {
            Some((id, "Variable")) => id.clone(),
            _ => {
                let owner_qn = match scope_kind {
                    VarScope::Function => self.function_stack.last().map(|f| f.qualified_name.clone()),
                    _ => None,
                }
                .unwrap_or_else(|| self.scope.fqn());
                IdGenerator::entity_id(&format!("{owner_qn}.var.{name}"))
            }
        };

        if let Some(existing) = self.entities.get_mut(&var_id) {
            if let NodeKind::Variable(v) = &mut existing.kind {
                for t in inferred_types.drain(..) {
                    if !v.inferred_types.contains(&t) {
                        v.inferred_types.push(t);
                    }
                }
            }
        } else {
            let var_node = Node::new(
                var_id.clone(),
                name.to_string(),
                NodeKind::Variable(VariableNode {
                    name: name.to_string(),
                    scope: scope_kind,
                    type_annotation: None,
                    inferred_types,
                }),
            );
            self.insert_entity(var_node);
        }

        match scope_kind {
            VarScope::Function => {
                if let Some(f) = self.function_stack.last_mut() {
                    f.locals.insert(name.to_string(), var_id.clone());
                }
            }
            VarScope::Class => {
                if let Some(c) = self.class_stack.last_mut() {
                    c.members.insert(name.to_string(), var_id.clone());
                }
            }
            VarScope::Module => {
                self.module_vars.insert(name.to_string(), var_id.clone());
            }
        }

        let owner = self.enclosing_function_id();
        self.emit_edge(&owner, &var_id, EdgeKind::AssignsTo);
    }

    /// Recursively scans an expression for call sites and name-load
    /// references, per `spec.md` §4.2 steps 3 and 5.
    fn scan_expr(&mut self, node: TsNode<'a>) {
        match node.kind() {
            "call" => self.walk_call(node),
            "identifier" => {
                let name = self.text(&node).to_string();
                if let Some((resolved_id, label)) = self.resolve_name(&name) {
                    let owner = self.enclosing_function_id();
                    match label {
                        "Variable" => self.emit_edge(&owner, &resolved_id, EdgeKind::ReadsFrom),
                        _ => self.emit_edge(&owner, &resolved_id, EdgeKind::References),
                    }
                }
            }
            "attribute" => {
                // Only scan the base of an attribute chain (`obj` in
                // `obj.attr`); the attribute name itself isn't a standalone
                // reference target in this file-local model.
                if let Some(obj) = node.child_by_field_name("object") {
                    self.scan_expr(obj);
                }
            }
            _ => {
                let mut cursor = node.walk();
                for child in node.named_children(&mut cursor) {
                    self.scan_expr(child);
                }
            }
        }
    }

    fn walk_call(&mut self, node: TsNode<'a>) {
        let caller_id = self.enclosing_function_id();
        let loc = self.loc(&node);
        let callee_text = node
            .child_by_field_name("function")
            .map(|n| self.text(&n).to_string())
            .unwrap_or_default();

        let mut arg_count = 0usize;
        let mut has_kwargs = false;
        let mut arg_types = Vec::new();
        if let Some(args) = node.child_by_field_name("arguments") {
            let mut cursor = args.walk();
            for arg in args.named_children(&mut cursor) {
                if arg.kind() == "keyword_argument" {
                    has_kwargs = true;
                    if let Some(v) = arg.child_by_field_name("value") {
                        self.scan_expr(v);
                    }
                } else {
                    arg_count += 1;
                    if let Some(t) = self.infer_expr_type(arg) {
                        arg_types.push(t);
                    }
                    self.scan_expr(arg);
                }
            }
        }
        if let Some(func) = node.child_by_field_name("function") {
            if func.kind() == "attribute" {
                self.scan_expr(func);
            }
        }

        let call_id = IdGenerator::call_site_id(&caller_id, loc.line, loc.column);
        let call_node = Node::new(
            call_id.clone(),
            callee_text.clone(),
            NodeKind::CallSite(CallSiteNode {
                caller_id: caller_id.clone(),
                arg_count,
                has_args: arg_count > 0,
                has_kwargs,
                lineno: loc.line,
                col_offset: loc.column,
                arg_types,
                resolution_status: ResolutionStatus::Pending,
                unresolved_callee: None,
            }),
        )
        .with_location_at(&self.path, loc);
        self.entities.insert(call_id.clone(), call_node);
        self.emit_edge(&caller_id, &call_id, EdgeKind::HasCallsite);
        self.relationships.push(Relationship::CallsUnresolved {
            call_site_id: call_id,
            caller_function_id: caller_id,
            callee_name: callee_text,
        });
    }

    /// Best-effort expression type inference, `spec.md` §4.2.
    fn infer_expr_type(&mut self, node: TsNode<'a>) -> Option<String> {
        if let Some(t) = type_infer::literal_type_name(node.kind()) {
            if node.kind() == "list" || node.kind() == "set" || node.kind() == "tuple" {
                return self.infer_homogeneous_container(node, t);
            }
            if node.kind() == "dictionary" {
                return self.infer_dict_type(node);
            }
            return Some(t.to_string());
        }
        match node.kind() {
            "identifier" => {
                let name = self.text(&node).to_string();
                match self.resolve_name(&name) {
                    Some((id, "Variable")) => self.entities.get(&id).and_then(|n| match &n.kind {
                        NodeKind::Variable(v) => v
                            .type_annotation
                            .clone()
                            .or_else(|| v.inferred_types.last().cloned()),
                        _ => None,
                    }),
                    _ => None,
                }
            }
            "call" => {
                let callee = node
                    .child_by_field_name("function")
                    .map(|n| self.text(&n).to_string())
                    .unwrap_or_default();
                if let Some(t) = type_infer::builtin_constructor_return(&callee) {
                    return Some(t.to_string());
                }
                match self.resolve_name(&callee) {
                    Some((id, "Class")) => self
                        .entities
                        .get(&id)
                        .and_then(|n| match &n.kind {
                            NodeKind::Class(c) => Some(c.qualified_name.clone()),
                            _ => None,
                        }),
                    Some((id, "Function")) => self.entities.get(&id).and_then(|n| match &n.kind {
                        NodeKind::Function(f) => f.return_type.clone(),
                        _ => None,
                    }),
                    _ => None,
                }
            }
            "binary_operator" | "comparison_operator" | "boolean_operator" => {
                let left = node.child_by_field_name("left").and_then(|n| self.infer_expr_type(n));
                let right = node.child_by_field_name("right").and_then(|n| self.infer_expr_type(n));
                match (left, right) {
                    (Some(l), Some(r)) => type_infer::promote_numeric(&l, &r).or(Some(l)),
                    (Some(l), None) => Some(l),
                    (None, Some(r)) => Some(r),
                    (None, None) => None,
                }
            }
            "unary_operator" | "not_operator" => node.named_child(0).and_then(|n| self.infer_expr_type(n)),
            "parenthesized_expression" => node.named_child(0).and_then(|n| self.infer_expr_type(n)),
            _ => None,
        }
    }

    fn infer_homogeneous_container(&mut self, node: TsNode<'a>, container: &str) -> Option<String> {
        let mut cursor = node.walk();
        let mut elem_type: Option<String> = None;
        for child in node.named_children(&mut cursor) {
            let t = self.infer_expr_type(child);
            match (&elem_type, t) {
                (None, Some(t)) => elem_type = Some(t),
                (Some(prev), Some(t)) if *prev != t => return Some(container.to_string()),
                _ => {}
            }
        }
        elem_type.map(|t| type_infer::homogeneous_container_type(container, &t))
    }

    fn infer_dict_type(&mut self, node: TsNode<'a>) -> Option<String> {
        let mut cursor = node.walk();
        let mut key_type: Option<String> = None;
        let mut value_type: Option<String> = None;
        for pair in node.named_children(&mut cursor) {
            if pair.kind() != "pair" {
                continue;
            }
            if let Some(k) = pair.child_by_field_name("key") {
                key_type = self.infer_expr_type(k);
            }
            if let Some(v) = pair.child_by_field_name("value") {
                value_type = self.infer_expr_type(v);
            }
        }
        match (key_type, value_type) {
            (Some(k), Some(v)) => Some(type_infer::dict_type(&k, &v)),
            _ => Some("dict".to_string()),
        }
    }

    fn collect_params(&self, params_node: Option<TsNode<'a>>) -> Vec<ParamInfo> {
        let mut out = Vec::new();
        let Some(params_node) = params_node else { return out };
        let mut cursor = params_node.walk();
        for child in params_node.named_children(&mut cursor) {
            match child.kind() {
                "identifier" => {
                    out.push(ParamInfo {
                        name: self.text(&child).to_string(),
                        kind: ParamKind::Positional,
                        type_annotation: None,
                        default_value: None,
                    });
                }
                "typed_parameter" => {
                    let inner = child.named_child(0);
                    let name = inner.map(|n| self.text(&n).to_string()).unwrap_or_default();
                    let ann = child.child_by_field_name("type").map(|n| self.text(&n).to_string());
                    out.push(ParamInfo {
                        name,
                        kind: ParamKind::Positional,
                        type_annotation: ann,
                        default_value: None,
                    });
                }
                "default_parameter" => {
                    let name = child
                        .child_by_field_name("name")
                        .map(|n| self.text(&n).to_string())
                        .unwrap_or_default();
                    let default_value = child.child_by_field_name("value").map(|n| self.text(&n).to_string());
                    out.push(ParamInfo {
                        name,
                        kind: ParamKind::Positional,
                        type_annotation: None,
                        default_value,
                    });
                }
                "typed_default_parameter" => {
                    let name = child
                        .child_by_field_name("name")
                        .map(|n| self.text(&n).to_string())
                        .unwrap_or_default();
                    let ann = child.child_by_field_name("type").map(|n| self.text(&n).to_string());
                    let default_value = child.child_by_field_name("value").map(|n| self.text(&n).to_string());
                    out.push(ParamInfo {
                        name,
                        kind: ParamKind::Positional,
                        type_annotation: ann,
                        default_value,
                    });
                }
                "list_splat_pattern" => {
                    let name = child.named_child(0).map(|n| self.text(&n).to_string()).unwrap_or_default();
                    out.push(ParamInfo {
                        name,
                        kind: ParamKind::VarPositional,
                        type_annotation: None,
                        default_value: None,
                    });
                }
                "dictionary_splat_pattern" => {
                    let name = child.named_child(0).map(|n| self.text(&n).to_string()).unwrap_or_default();
                    out.push(ParamInfo {
                        name,
                        kind: ParamKind::VarKeyword,
                        type_annotation: None,
                        default_value: None,
                    });
                }
                _ => {}
            }
        }
        out
    }

    /// Final pass: intern Type nodes from every collected annotation and
    /// emit the deferred `HAS_TYPE`/`RETURNS_TYPE`/`ASSIGNED_TYPE` edges.
    fn finish_type_links(&mut self) {
        let requests = std::mem::take(&mut self.type_link_requests);
        for req in requests {
            let type_id = IdGenerator::type_id(&req.annotation);
            self.entities.entry(type_id.clone()).or_insert_with(|| {
                Node::new(type_id.clone(), req.annotation.clone(), NodeKind::Type(classify_type(&req.annotation)))
            });
            self.emit_edge(&req.owner_id, &type_id, req.edge_kind);
        }
    }
}

fn qualified_name_of(kind: &NodeKind) -> Option<&str> {
    match kind {
        NodeKind::Module(m) => Some(&m.qualified_name),
        NodeKind::Class(c) => Some(&c.qualified_name),
        NodeKind::Function(f) => Some(&f.qualified_name),
        _ => None,
    }
}

fn module_name_from_qualified(qn: &str) -> &str {
    qn.rsplit('.').next().unwrap_or(qn)
}

fn module_docstring(root: &TsNode, source: &str) -> Option<String> {
    let first = root.named_child(0)?;
    if first.kind() == "expression_statement" {
        let expr = first.named_child(0)?;
        if expr.kind() == "string" {
            return Some(source.get(expr.byte_range()).unwrap_or("").to_string());
        }
    }
    None
}

fn subtree_contains_kind(node: TsNode, kind: &str) -> bool {
    if node.kind() == kind {
        return true;
    }
    // Don't descend into nested function/lambda bodies: a yield there
    // belongs to the nested function, not this one.
    if node.kind() == "function_definition" || node.kind() == "lambda" {
        return false;
    }
    let mut cursor = node.walk();
    node.children(&mut cursor).any(|c| subtree_contains_kind(c, kind))
}

const BUILTIN_TYPE_NAMES: &[&str] = &[
    "int", "str", "float", "bool", "bytes", "list", "dict", "set", "tuple", "frozenset",
    "NoneType", "None", "object", "complex",
];

fn classify_type(annotation: &str) -> TypeNode {
    let trimmed = annotation.trim();
    let kind = if BUILTIN_TYPE_NAMES.contains(&trimmed) {
        TypeKind::Builtin
    } else if trimmed.contains("Union") || trimmed.contains('|') {
        TypeKind::Union
    } else if trimmed.contains("Callable") {
        TypeKind::Callable
    } else if trimmed.contains('[') {
        TypeKind::Generic
    } else {
        TypeKind::Class
    };
    TypeNode {
        name: trimmed.to_string(),
        module: None,
        kind,
        base_types: vec![],
    }
}

fn render_signature(name: &str, params: &[ParamInfo], return_type: Option<&str>) -> String {
    let rendered_params: Vec<String> = params
        .iter()
        .map(|p| {
            let prefix = match p.kind {
                ParamKind::VarPositional => "*",
                ParamKind::VarKeyword => "**",
                ParamKind::Positional => "",
            };
            let mut s = format!("{prefix}{}", p.name);
            if let Some(ann) = &p.type_annotation {
                s.push_str(&format!(": {ann}"));
            }
            if let Some(def) = &p.default_value {
                s.push_str(&format!(" = {def}"));
            }
            s
        })
        .collect();
    let mut sig = format!("{name}({})", rendered_params.join(", "));
    if let Some(rt) = return_type {
        sig.push_str(&format!(" -> {rt}"));
    }
    sig
}

pub(crate) struct ParamInfo {
    pub name: String,
    pub kind: ParamKind,
    pub type_annotation: Option<String>,
    pub default_value: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tree_sitter::Parser;

    fn extract(source: &str) -> WalkOutput {
        let mut parser = Parser::new();
        parser.set_language(&tree_sitter_python::language()).unwrap();
        let tree = parser.parse(source, None).unwrap();
        let walker = Walker::new(source, "test.py", "test");
        walker.walk_module(tree.root_node())
    }

    #[test]
    fn test_function_and_call_site() {
        let out = extract("def greet(name, greeting):\n    pass\n\ngreet(\"Alice\")\n");
        let functions: Vec<_> = out
            .entities
            .values()
            .filter(|n| matches!(n.kind, NodeKind::Function(_)) && n.name == "greet")
            .collect();
        assert_eq!(functions.len(), 1);
        let call_sites: Vec<_> = out
            .entities
            .values()
            .filter(|n| matches!(n.kind, NodeKind::CallSite(_)))
            .collect();
        assert_eq!(call_sites.len(), 1);
        if let NodeKind::CallSite(cs) = &call_sites[0].kind {
            assert_eq!(cs.arg_count, 1);
        }
    }

    #[test]
    fn test_class_with_bases_and_diamond() {
        let src = "class A: pass\nclass B(A): pass\nclass C(A): pass\nclass D(B, C): pass\n";
        let out = extract(src);
        let inherits: Vec<_> = out
            .relationships
            .iter()
            .filter_map(|r| match r {
                Relationship::Edge(e) if e.kind == EdgeKind::Inherits => Some(e),
                _ => None,
            })
            .collect();
        assert_eq!(inherits.len(), 3);
    }

    #[test]
    fn test_unresolved_call() {
        let out = extract("result = undefined_function(42)\n");
        let calls_unresolved: Vec<_> = out
            .relationships
            .iter()
            .filter(|r| matches!(r, Relationship::CallsUnresolved { callee_name, .. } if callee_name == "undefined_function"))
            .collect();
        assert_eq!(calls_unresolved.len(), 1);
    }

    #[test]
    fn test_empty_file_yields_one_module_node() {
        let out = extract("");
        assert_eq!(out.entities.len(), 1);
        assert!(matches!(out.entities.values().next().unwrap().kind, NodeKind::Module(_)));
    }
}
