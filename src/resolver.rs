//! Semantic resolution.
//!
//! Two passes over the parsed document. The registration pass fills the
//! global symbol map (templates, customs, variable groups, origins,
//! namespaces, configurations) and ingests imports through the host
//! resolver. The resolution pass detects inheritance cycles with DFS
//! colouring, validates references, propagates `except` constraints, and
//! performs selector auto-attachment on local style blocks.
//!
//! The inheritance-merging queries at the bottom (`resolved_style_props`,
//! `resolved_element_children`, `var_value`) are pure functions over the
//! symbol map; the generator calls them when materialising uses.

use crate::ast::*;
use crate::error::{DiagnosticKind, Diagnostics};
use crate::imports::{ImportCache, ImportResolver};
use crate::lexer::Lexer;
use crate::parser::Parser;
use crate::scanner::UnifiedScanner;
use crate::state::{ScopeKind, ScopeStack};
use crate::symbols::{qualify, ConfigRecord, GlobalMap, ImportRecord, NamespaceRecord, VarGroup};
use std::collections::{HashMap, HashSet};

const MAX_IMPORT_DEPTH: usize = 16;

pub struct Resolver<'a> {
    map: &'a mut GlobalMap,
    importer: &'a dyn ImportResolver,
    cache: ImportCache,
    import_depth: usize,
}

impl<'a> Resolver<'a> {
    pub fn new(map: &'a mut GlobalMap, importer: &'a dyn ImportResolver) -> Self {
        Self {
            map,
            importer,
            cache: ImportCache::new(),
            import_depth: 0,
        }
    }

    pub fn run(&mut self, document: &mut Document, diags: &mut Diagnostics) {
        self.register_nodes(&document.children, "", diags);
        self.check_inheritance_cycles(diags);
        let mut scopes = ScopeStack::new();
        self.resolve_nodes(&mut document.children, "", &mut scopes, diags);
    }

    // ───────────────────────────────────────────────────────────────────
    // Registration pre-pass
    // ───────────────────────────────────────────────────────────────────

    fn register_nodes(&mut self, nodes: &[Node], namespace: &str, diags: &mut Diagnostics) {
        for node in nodes {
            match node {
                Node::Template(def) => self.register_template(def, namespace, diags),
                Node::Custom(def) if !def.is_specialization => {
                    self.register_custom(def, namespace, diags)
                }
                Node::Origin(origin) if !origin.is_reference => {
                    if let Some(name) = &origin.name {
                        if let Err(msg) =
                            self.map
                                .register_origin(&origin.kind.key(), name, origin.content.clone())
                        {
                            diags.error(DiagnosticKind::Semantic, msg, origin.loc);
                        }
                    }
                }
                Node::Import(import) => self.ingest_import(import, namespace, diags),
                Node::Configuration(config) => self.register_configuration(config, diags),
                Node::Element(el) => {
                    // Named origins (and other registrations) may sit inside
                    // element bodies.
                    self.register_nodes(&el.children, namespace, diags);
                }
                Node::Namespace(ns) => {
                    let path = qualify(namespace, &ns.name);
                    let mut record = NamespaceRecord::default();
                    for child in &ns.children {
                        match child {
                            Node::Template(t) if t.kind == DefKind::Var => {
                                record.vars.push(t.name.clone())
                            }
                            Node::Template(t) => record.templates.push(t.name.clone()),
                            Node::Custom(c) if !c.is_specialization => {
                                record.customs.push(c.name.clone())
                            }
                            Node::Namespace(n) => record.nested.push(n.name.clone()),
                            _ => {}
                        }
                    }
                    self.map.register_namespace(&path, record);
                    self.register_nodes(&ns.children, &path, diags);
                }
                _ => {}
            }
        }
    }

    fn register_template(&mut self, def: &TemplateDef, namespace: &str, diags: &mut Diagnostics) {
        let full = qualify(namespace, &def.name);
        if def.kind == DefKind::Var {
            let group = var_group_from_body(&def.body);
            if let Err(msg) = self.map.register_var_group(&full, group) {
                diags.error(DiagnosticKind::Semantic, msg, def.loc);
            }
        }
        if let Err(msg) = self.map.register_template(&full, def.clone()) {
            diags.error(DiagnosticKind::Semantic, msg, def.loc);
        }
    }

    fn register_custom(&mut self, def: &CustomDef, namespace: &str, diags: &mut Diagnostics) {
        let full = qualify(namespace, &def.name);
        if def.kind == DefKind::Var {
            let group = var_group_from_body(&def.body);
            if let Err(msg) = self.map.register_var_group(&full, group) {
                diags.error(DiagnosticKind::Semantic, msg, def.loc);
            }
        }
        if let Err(msg) = self.map.register_custom(&full, def.clone()) {
            diags.error(DiagnosticKind::Semantic, msg, def.loc);
        }
    }

    fn register_configuration(&mut self, config: &Configuration, diags: &mut Diagnostics) {
        let key = config.name.as_deref().unwrap_or("");
        if self.map.configuration(key).is_some() {
            diags.error(
                DiagnosticKind::Configuration,
                format!(
                    "configuration '{}' is already defined",
                    if key.is_empty() { "(unnamed)" } else { key }
                ),
                config.loc,
            );
            return;
        }
        let mut record = ConfigRecord::default();
        for (k, v) in &config.entries {
            if record.entries.insert(k.clone(), v.clone()).is_some() {
                diags.warning(
                    DiagnosticKind::Configuration,
                    format!("configuration key '{}' set twice", k),
                    config.loc,
                );
            }
        }
        for (k, aliases) in &config.name_overrides {
            record.name_overrides.insert(k.clone(), aliases.clone());
        }
        for (alias, canonical) in &config.origin_aliases {
            record
                .origin_aliases
                .insert(alias.clone(), canonical.clone());
        }
        self.map.register_configuration(config.name.as_deref(), record);
    }

    /// Resolve an import through the host, parse the module, and register
    /// its definitions. `as Alias` namespaces everything under the alias.
    fn ingest_import(&mut self, import: &Import, namespace: &str, diags: &mut Diagnostics) {
        let record = ImportRecord {
            kind: import.kind,
            alias: import.alias.clone(),
            items: import.items.clone(),
        };
        if !self.map.register_import(&import.path, record) {
            // Already ingested in this pipeline.
            return;
        }
        if import.kind == ImportKind::CJmod {
            // Native extensions are loaded by an external collaborator; the
            // core only records the directive.
            return;
        }
        if self.import_depth >= MAX_IMPORT_DEPTH {
            diags.error(
                DiagnosticKind::ImportResolution,
                format!("import nesting too deep at '{}'", import.path),
                import.loc,
            );
            return;
        }

        let source = match self.importer.resolve(&import.path, import.kind) {
            Ok(s) => s,
            Err(msg) => {
                diags.error(DiagnosticKind::ImportResolution, msg, import.loc);
                return;
            }
        };

        let target_ns = match &import.alias {
            Some(alias) => qualify(namespace, alias),
            None => namespace.to_string(),
        };

        // Raw asset imports become named origin records.
        let origin_key = match import.kind {
            ImportKind::Html => Some("@Html"),
            ImportKind::Style => Some("@Style"),
            ImportKind::JavaScript => Some("@JavaScript"),
            _ => None,
        };
        if let Some(key) = origin_key {
            let name = import
                .alias
                .clone()
                .unwrap_or_else(|| file_stem(&import.path));
            if let Err(msg) = self.map.register_origin(key, &name, source) {
                diags.error(DiagnosticKind::Semantic, msg, import.loc);
            }
            return;
        }

        if self.cache.insert(&import.path, source.clone()).is_some() {
            // Identical content already ingested under another path.
            return;
        }

        let mut module_diags = Diagnostics::new(&import.path);
        let mut scanner = UnifiedScanner::new(&source);
        let fragments = match scanner.scan(&module_diags) {
            Ok(f) => f,
            Err(fatal) => {
                module_diags.push(fatal);
                diags.absorb(module_diags);
                return;
            }
        };
        let tokens = Lexer::new(&source, &fragments).tokenize(&mut module_diags, false);
        let mut parser = Parser::new(&source, tokens);
        let module = parser.parse_document(&mut module_diags);

        self.import_depth += 1;
        self.register_nodes(&module.children, &target_ns, &mut module_diags);
        self.import_depth -= 1;
        diags.absorb(module_diags);
    }

    // ───────────────────────────────────────────────────────────────────
    // Inheritance cycles (DFS colouring)
    // ───────────────────────────────────────────────────────────────────

    fn check_inheritance_cycles(&mut self, diags: &mut Diagnostics) {
        #[derive(Clone, Copy, PartialEq)]
        enum Colour {
            White,
            Gray,
            Black,
        }

        let defs = self.map.all_definitions();
        let mut colours: HashMap<(DefKind, String), Colour> = defs
            .iter()
            .map(|(k, n, _)| ((*k, n.to_string()), Colour::White))
            .collect();
        let bodies: HashMap<(DefKind, String), Vec<(String, crate::token::SourceLocation)>> = defs
            .iter()
            .map(|(kind, name, body)| {
                ((*kind, name.to_string()), direct_bases(body))
            })
            .collect();

        fn visit(
            key: &(DefKind, String),
            map: &GlobalMap,
            colours: &mut HashMap<(DefKind, String), Colour>,
            bodies: &HashMap<(DefKind, String), Vec<(String, crate::token::SourceLocation)>>,
            diags: &mut Diagnostics,
        ) {
            colours.insert(key.clone(), Colour::Gray);
            if let Some(bases) = bodies.get(key) {
                let declaring_ns = namespace_of(&key.1);
                for (base, loc) in bases {
                    let full = map
                        .lookup_template_entry(key.0, base, declaring_ns)
                        .map(|(n, _)| n.to_string())
                        .or_else(|| {
                            map.lookup_custom_entry(key.0, base, declaring_ns)
                                .map(|(n, _)| n.to_string())
                        });
                    let Some(full) = full else { continue };
                    let base_key = (key.0, full);
                    match colours.get(&base_key).copied() {
                        Some(Colour::Gray) => {
                            diags.error(
                                DiagnosticKind::Semantic,
                                format!(
                                    "inheritance cycle through {} {}",
                                    key.0.as_str(),
                                    base_key.1
                                ),
                                *loc,
                            );
                        }
                        Some(Colour::White) => {
                            visit(&base_key, map, colours, bodies, diags);
                        }
                        _ => {}
                    }
                }
            }
            colours.insert(key.clone(), Colour::Black);
        }

        let keys: Vec<(DefKind, String)> = colours.keys().cloned().collect();
        for key in keys {
            if colours.get(&key) == Some(&Colour::White) {
                visit(&key, self.map, &mut colours, &bodies, diags);
            }
        }
    }

    // ───────────────────────────────────────────────────────────────────
    // Resolution walk
    // ───────────────────────────────────────────────────────────────────

    fn resolve_nodes(
        &mut self,
        nodes: &mut Vec<Node>,
        namespace: &str,
        scopes: &mut ScopeStack,
        diags: &mut Diagnostics,
    ) {
        // Constraints are lexical over the whole scope, so collect them
        // before validating any sibling.
        for node in nodes.iter() {
            if let Node::Except(except) = node {
                for target in &except.targets {
                    scopes.forbid(target.clone());
                }
            }
        }

        let mut i = 0;
        while i < nodes.len() {
            let remove = match &mut nodes[i] {
                Node::Element(el) => {
                    if let Some(reason) = forbidden_reason(scopes, &el.tag) {
                        diags.error(
                            DiagnosticKind::Semantic,
                            format!("element '{}' is forbidden by 'except {}'", el.tag, reason),
                            el.loc,
                        );
                        true
                    } else {
                        auto_attach(el);
                        self.validate_element_refs(el, namespace, diags);
                        scopes.push(el.tag.clone(), ScopeKind::Element, el.loc);
                        self.resolve_nodes(&mut el.children, namespace, scopes, diags);
                        scopes.pop();
                        false
                    }
                }
                Node::Inherit(inherit) => {
                    if let Some(reason) = forbidden_reason(scopes, &inherit.base) {
                        diags.error(
                            DiagnosticKind::Semantic,
                            format!(
                                "'{}' is forbidden here by 'except {}'",
                                inherit.base, reason
                            ),
                            inherit.loc,
                        );
                        true
                    } else {
                        self.validate_inherit(inherit, namespace, diags);
                        false
                    }
                }
                Node::Custom(custom) if custom.is_specialization => {
                    if let Some(reason) = forbidden_reason(scopes, &custom.name) {
                        diags.error(
                            DiagnosticKind::Semantic,
                            format!(
                                "'{}' is forbidden here by 'except {}'",
                                custom.name, reason
                            ),
                            custom.loc,
                        );
                        true
                    } else {
                        self.validate_spec_base(custom, namespace, diags);
                        scopes.push(custom.name.clone(), ScopeKind::Specialization, custom.loc);
                        let mut body = std::mem::take(&mut custom.body);
                        self.resolve_nodes(&mut body, namespace, scopes, diags);
                        scopes.pop();
                        if let Node::Custom(custom) = &mut nodes[i] {
                            custom.body = body;
                        }
                        false
                    }
                }
                Node::Namespace(ns) => {
                    let path = qualify(namespace, &ns.name);
                    scopes.push(ns.name.clone(), ScopeKind::Namespace, ns.loc);
                    let mut children = std::mem::take(&mut ns.children);
                    self.resolve_nodes(&mut children, &path, scopes, diags);
                    scopes.pop();
                    if let Node::Namespace(ns) = &mut nodes[i] {
                        ns.children = children;
                    }
                    false
                }
                Node::Origin(origin) if origin.is_reference => {
                    self.validate_origin_reference(origin, diags);
                    false
                }
                Node::Style(style) => {
                    self.validate_style_refs(style, namespace, diags);
                    false
                }
                Node::VarCall(call) => {
                    self.validate_var_call(call, namespace, diags);
                    false
                }
                _ => false,
            };
            if remove {
                nodes.remove(i);
            } else {
                i += 1;
            }
        }
    }

    fn validate_element_refs(&self, el: &Element, namespace: &str, diags: &mut Diagnostics) {
        for child in &el.children {
            if let Node::Style(style) = child {
                self.validate_style_refs(style, namespace, diags);
            }
        }
    }

    fn validate_style_refs(&self, style: &StyleBlock, namespace: &str, diags: &mut Diagnostics) {
        for prop in &style.props {
            if let Value::VarCall(call) = &prop.value {
                self.validate_var_call(call, namespace, diags);
            }
        }
        for item in &style.items {
            match item {
                Node::Inherit(inherit) => self.validate_inherit(inherit, namespace, diags),
                Node::VarCall(call) => self.validate_var_call(call, namespace, diags),
                _ => {}
            }
        }
    }

    fn validate_inherit(&self, inherit: &Inherit, namespace: &str, diags: &mut Diagnostics) {
        let kind = inherit.kind.unwrap_or(DefKind::Style);
        let template = match kind {
            DefKind::Var => None,
            _ => self.map.lookup_template(kind, &inherit.base, namespace),
        };
        let found = match kind {
            DefKind::Var => self.map.lookup_var_group(&inherit.base, namespace).is_some(),
            _ => {
                template.is_some()
                    || self.map.lookup_custom(kind, &inherit.base, namespace).is_some()
            }
        };
        if !found {
            diags.error(
                DiagnosticKind::Semantic,
                format!("unknown {} '{}'", kind.as_str(), inherit.base),
                inherit.loc,
            );
            return;
        }
        if !inherit.args.is_empty() {
            let arity = template.map(|t| t.params.len()).unwrap_or(0);
            if inherit.args.len() > arity {
                diags.error(
                    DiagnosticKind::Semantic,
                    format!(
                        "'{}' takes {} parameter(s), {} argument(s) given",
                        inherit.base,
                        arity,
                        inherit.args.len()
                    ),
                    inherit.loc,
                );
            }
        }
    }

    fn validate_spec_base(&self, custom: &CustomDef, namespace: &str, diags: &mut Diagnostics) {
        let found = self
            .map
            .lookup_template(custom.kind, &custom.name, namespace)
            .is_some()
            || self
                .map
                .lookup_custom(custom.kind, &custom.name, namespace)
                .is_some();
        if !found {
            diags.error(
                DiagnosticKind::Semantic,
                format!(
                    "specialization of unknown {} '{}'",
                    custom.kind.as_str(),
                    custom.name
                ),
                custom.loc,
            );
        }
    }

    fn validate_var_call(&self, call: &VarCall, namespace: &str, diags: &mut Diagnostics) {
        match self.map.lookup_var_group(&call.group, namespace) {
            None => diags.error(
                DiagnosticKind::Semantic,
                format!("unknown variable group '{}'", call.group),
                call.loc,
            ),
            Some(_) if call.override_value.is_some() => {}
            Some(_) => {
                if var_value(self.map, &call.group, &call.name, namespace).is_none() {
                    diags.error(
                        DiagnosticKind::Semantic,
                        format!("variable '{}' not defined in group '{}'", call.name, call.group),
                        call.loc,
                    );
                }
            }
        }
    }

    fn validate_origin_reference(&self, origin: &Origin, diags: &mut Diagnostics) {
        let Some(name) = &origin.name else { return };
        let mut key = origin.kind.key();
        if let OriginKind::Custom(alias) = &origin.kind {
            if let Some(canonical) = self.map.resolve_origin_alias(alias) {
                key = canonical;
            }
        }
        if self.map.lookup_origin(&key, name).is_none() {
            diags.error(
                DiagnosticKind::Semantic,
                format!("unknown origin {} '{}'", key, name),
                origin.loc,
            );
        }
    }
}

/// Why `name` is forbidden in the current scope chain, if it is.
fn forbidden_reason(scopes: &ScopeStack, name: &str) -> Option<String> {
    if let Some(frame) = scopes.forbidden_by(name) {
        return Some(if frame.name.is_empty() {
            name.to_string()
        } else {
            format!("{} (in {})", name, frame.name)
        });
    }
    // Type-level constraint: `except @Html` forbids every plain HTML tag.
    if name
        .chars()
        .next()
        .map_or(false, |c| c.is_ascii_lowercase())
        && scopes.forbidden_by("@Html").is_some()
    {
        return Some("@Html".to_string());
    }
    None
}

/// Selector auto-attachment for an element's local style blocks: the first
/// class/id selector names the auto class/id, `&` rewrites to it, and the
/// element gains the attribute when it does not already carry one.
pub fn auto_attach(element: &mut Element) {
    let mut auto_class: Option<String> = None;
    let mut auto_id: Option<String> = None;

    for child in &mut element.children {
        let Node::Style(style) = child else { continue };
        if style.scope != StyleScope::Local {
            continue;
        }
        for rule in &style.rules {
            let selector = rule.selector.trim();
            if let Some(rest) = selector.strip_prefix('.') {
                let name = head_of_selector(rest);
                if !name.is_empty() && auto_class.is_none() {
                    auto_class = Some(name.to_string());
                }
            } else if let Some(rest) = selector.strip_prefix('#') {
                let name = head_of_selector(rest);
                if !name.is_empty() && auto_id.is_none() {
                    auto_id = Some(name.to_string());
                }
            }
        }
        // `&` refers to the auto class when there is one, else the auto id.
        let replacement = auto_class
            .as_ref()
            .map(|c| format!(".{}", c))
            .or_else(|| auto_id.as_ref().map(|i| format!("#{}", i)));
        if let Some(replacement) = replacement {
            for rule in &mut style.rules {
                if rule.selector.contains('&') {
                    rule.selector = rule.selector.replace('&', &replacement);
                }
            }
        }
        style.auto_class = auto_class.clone();
        style.auto_id = auto_id.clone();
    }

    if let Some(class) = &auto_class {
        if element.attribute("class").is_none() {
            element.set_attribute("class", class);
        }
    }
    if let Some(id) = &auto_id {
        if element.attribute("id").is_none() {
            element.set_attribute("id", id);
        }
    }
}

/// `box:hover` → `box`; stops at pseudo-classes, combinators, attribute
/// brackets.
fn head_of_selector(rest: &str) -> &str {
    let end = rest
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '-'))
        .unwrap_or(rest.len());
    &rest[..end]
}

fn namespace_of(full_name: &str) -> &str {
    full_name.rsplit_once('.').map(|(ns, _)| ns).unwrap_or("")
}

fn file_stem(path: &str) -> String {
    std::path::Path::new(path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(path)
        .to_string()
}

/// Direct inheritance edges of a definition body: plain inherits plus
/// specialization bases.
fn direct_bases(body: &[Node]) -> Vec<(String, crate::token::SourceLocation)> {
    let mut out = Vec::new();
    for node in body {
        match node {
            Node::Inherit(i) => out.push((i.base.clone(), i.loc)),
            Node::Custom(c) if c.is_specialization => out.push((c.name.clone(), c.loc)),
            Node::Style(sb) => {
                for item in &sb.items {
                    if let Node::Inherit(i) = item {
                        out.push((i.base.clone(), i.loc));
                    }
                }
            }
            _ => {}
        }
    }
    out
}

/// Build a variable group from a `[Template]/[Custom] @Var` body.
fn var_group_from_body(body: &[Node]) -> VarGroup {
    let mut group = VarGroup::default();
    for node in body {
        match node {
            Node::VarDef(def) => group.values.push((def.name.clone(), def.value.clone())),
            Node::Inherit(i) => group.inherits.push(i.base.clone()),
            _ => {}
        }
    }
    group
}

// ───────────────────────────────────────────────────────────────────────
// Pure resolution queries over the symbol map
// ───────────────────────────────────────────────────────────────────────

/// Resolve a style template/custom to its flat property set: parents merge
/// first in declaration order, the definition's own properties override.
pub fn resolved_style_props(
    map: &GlobalMap,
    name: &str,
    namespace: &str,
) -> Option<Vec<(String, String)>> {
    let mut visited = HashSet::new();
    collect_style_props(map, name, namespace, &mut visited)
}

fn collect_style_props(
    map: &GlobalMap,
    name: &str,
    namespace: &str,
    visited: &mut HashSet<String>,
) -> Option<Vec<(String, String)>> {
    let (full, body, def_ns) =
        if let Some((full, def)) = map.lookup_template_entry(DefKind::Style, name, namespace) {
            (full.to_string(), def.body.clone(), namespace_of(full).to_string())
        } else if let Some((full, def)) = map.lookup_custom_entry(DefKind::Style, name, namespace) {
            (full.to_string(), def.body.clone(), namespace_of(full).to_string())
        } else {
            return None;
        };
    if !visited.insert(full) {
        // Cycle: reported by the DFS pass, stop merging here.
        return Some(Vec::new());
    }
    Some(style_props_of_body(map, &body, &def_ns, visited))
}

/// Flatten one style body (definition or specialization) into properties.
fn style_props_of_body(
    map: &GlobalMap,
    body: &[Node],
    def_ns: &str,
    visited: &mut HashSet<String>,
) -> Vec<(String, String)> {
    let mut inherits: Vec<(String, Option<Vec<Node>>)> = Vec::new();
    let mut deletes: Vec<DeleteTarget> = Vec::new();
    let mut own_props: Vec<(String, String)> = Vec::new();
    let mut no_value: Vec<String> = Vec::new();

    let mut scan_items = |items: &[Node],
                          inherits: &mut Vec<(String, Option<Vec<Node>>)>,
                          deletes: &mut Vec<DeleteTarget>| {
        for item in items {
            match item {
                Node::Inherit(i) => inherits.push((i.base.clone(), None)),
                Node::Custom(c) if c.is_specialization => {
                    inherits.push((c.name.clone(), Some(c.body.clone())))
                }
                Node::Delete(d) => deletes.extend(d.targets.iter().cloned()),
                _ => {}
            }
        }
    };

    for node in body {
        match node {
            Node::Style(sb) => {
                for prop in &sb.props {
                    own_props.push((prop.name.clone(), value_string(map, &prop.value, def_ns)));
                }
                no_value.extend(sb.no_value_props.iter().cloned());
                scan_items(&sb.items, &mut inherits, &mut deletes);
            }
            Node::Inherit(i) => inherits.push((i.base.clone(), None)),
            Node::Custom(c) if c.is_specialization => {
                inherits.push((c.name.clone(), Some(c.body.clone())))
            }
            Node::Delete(d) => deletes.extend(d.targets.iter().cloned()),
            _ => {}
        }
    }

    // `delete @Style Base;` removes the base from the inheritance list; the
    // merged set is recomputed from the surviving parents.
    inherits.retain(|(base, _)| {
        !deletes
            .iter()
            .any(|t| t.kind == DeleteKind::Inheritance && names_match(&t.name, base))
    });

    let mut merged: Vec<(String, String)> = Vec::new();
    for (base, spec_body) in &inherits {
        if let Some(parent) = collect_style_props(map, base, def_ns, visited) {
            for (k, v) in parent {
                upsert(&mut merged, k, v);
            }
        }
        if let Some(spec) = spec_body {
            // Specialization edits: the spec's own properties override what
            // the base contributed, its deletes strike keys from it.
            for (k, v) in style_props_of_body(map, spec, def_ns, visited) {
                upsert(&mut merged, k, v);
            }
            for target in spec_property_deletes(spec) {
                merged.retain(|(k, _)| *k != target);
            }
        }
    }
    for (k, v) in own_props {
        upsert(&mut merged, k, v);
    }
    for name in no_value {
        if !merged.iter().any(|(k, _)| *k == name) {
            merged.push((name, String::new()));
        }
    }
    for target in deletes
        .iter()
        .filter(|t| matches!(t.kind, DeleteKind::Precise | DeleteKind::Property))
    {
        merged.retain(|(k, _)| *k != target.name);
    }
    merged
}

/// Merged inline properties for one element: local style blocks plus
/// element-level `@Style` uses, in source order, inherited sets first and
/// the element's own declarations winning.
pub fn inline_style_props(
    map: &GlobalMap,
    element: &Element,
    namespace: &str,
) -> Vec<(String, String)> {
    let relevant: Vec<Node> = element
        .children
        .iter()
        .filter(|node| match node {
            Node::Style(sb) => sb.scope == StyleScope::Local,
            Node::Inherit(i) => i.kind == Some(DefKind::Style),
            Node::Custom(c) => c.is_specialization && c.kind == DefKind::Style,
            _ => false,
        })
        .cloned()
        .collect();
    let mut visited = HashSet::new();
    style_props_of_body(map, &relevant, namespace, &mut visited)
}

/// Property-delete targets of a specialization body, at either nesting
/// level the parser leaves them at.
fn spec_property_deletes(body: &[Node]) -> Vec<String> {
    let mut out = Vec::new();
    for node in body {
        match node {
            Node::Delete(d) => {
                for target in &d.targets {
                    if matches!(target.kind, DeleteKind::Precise | DeleteKind::Property) {
                        out.push(target.name.clone());
                    }
                }
            }
            Node::Style(sb) => {
                for item in &sb.items {
                    if let Node::Delete(d) = item {
                        for target in &d.targets {
                            if matches!(target.kind, DeleteKind::Precise | DeleteKind::Property) {
                                out.push(target.name.clone());
                            }
                        }
                    }
                }
            }
            _ => {}
        }
    }
    out
}

/// Resolve an element template/custom to its flat, ordered child list.
pub fn resolved_element_children(
    map: &GlobalMap,
    name: &str,
    namespace: &str,
) -> Option<Vec<Node>> {
    let mut visited = HashSet::new();
    collect_element_children(map, name, namespace, &mut visited)
}

fn collect_element_children(
    map: &GlobalMap,
    name: &str,
    namespace: &str,
    visited: &mut HashSet<String>,
) -> Option<Vec<Node>> {
    let (full, body, def_ns) =
        if let Some((full, def)) = map.lookup_template_entry(DefKind::Element, name, namespace) {
            (full.to_string(), def.body.clone(), namespace_of(full).to_string())
        } else if let Some((full, def)) = map.lookup_custom_entry(DefKind::Element, name, namespace)
        {
            (full.to_string(), def.body.clone(), namespace_of(full).to_string())
        } else {
            return None;
        };
    if !visited.insert(full) {
        return Some(Vec::new());
    }
    Some(element_children_of_body(map, &body, &def_ns, visited))
}

fn element_children_of_body(
    map: &GlobalMap,
    body: &[Node],
    def_ns: &str,
    visited: &mut HashSet<String>,
) -> Vec<Node> {
    let mut out: Vec<Node> = Vec::new();
    for node in body {
        match node {
            Node::Inherit(i) if matches!(i.kind, None | Some(DefKind::Element)) => {
                if let Some(children) = collect_element_children(map, &i.base, def_ns, visited) {
                    out.extend(children);
                }
            }
            Node::Custom(c) if c.is_specialization && c.kind == DefKind::Element => {
                if let Some(base) = collect_element_children(map, &c.name, def_ns, visited) {
                    out.extend(apply_element_edits(map, base, &c.body, def_ns));
                }
            }
            Node::Delete(d) => apply_element_deletes(&mut out, &d.targets),
            Node::Insert(ins) => apply_element_insert(&mut out, ins),
            other => out.push(other.clone()),
        }
    }
    out
}

/// Apply a specialization body's ordered edits to a base child list:
/// deletes remove by tag (and index), inserts position new children, and a
/// same-tag element merges its attributes into the first match.
pub fn apply_element_edits(
    map: &GlobalMap,
    base: Vec<Node>,
    edits: &[Node],
    namespace: &str,
) -> Vec<Node> {
    let _ = (map, namespace);
    let mut out = base;
    for edit in edits {
        match edit {
            Node::Delete(d) => apply_element_deletes(&mut out, &d.targets),
            Node::Insert(ins) => apply_element_insert(&mut out, ins),
            Node::Element(el) => {
                let merged = out.iter_mut().find_map(|n| match n {
                    Node::Element(existing) if existing.tag == el.tag => Some(existing),
                    _ => None,
                });
                match merged {
                    Some(existing) => {
                        for (name, value) in &el.attributes {
                            existing.set_attribute(name, value);
                        }
                        existing.children.extend(el.children.iter().cloned());
                    }
                    None => out.push(Node::Element(el.clone())),
                }
            }
            other => out.push(other.clone()),
        }
    }
    out
}

fn apply_element_deletes(children: &mut Vec<Node>, targets: &[DeleteTarget]) {
    for target in targets {
        if target.kind == DeleteKind::Inheritance {
            continue;
        }
        match target.index {
            Some(wanted) => {
                let mut seen = 0usize;
                let mut idx = None;
                for (i, node) in children.iter().enumerate() {
                    if let Node::Element(el) = node {
                        if el.tag == target.name {
                            if seen == wanted {
                                idx = Some(i);
                                break;
                            }
                            seen += 1;
                        }
                    }
                }
                if let Some(i) = idx {
                    children.remove(i);
                }
            }
            None => {
                children.retain(|n| !matches!(n, Node::Element(el) if el.tag == target.name));
            }
        }
    }
}

fn apply_element_insert(children: &mut Vec<Node>, insert: &Insert) {
    let new_nodes = insert.children.clone();
    let position_of = |children: &[Node], target: &Option<(String, Option<usize>)>| {
        let (tag, index) = match target {
            Some((t, i)) => (t.as_str(), i.unwrap_or(0)),
            None => return None,
        };
        let mut seen = 0usize;
        for (i, node) in children.iter().enumerate() {
            if let Node::Element(el) = node {
                if el.tag == tag {
                    if seen == index {
                        return Some(i);
                    }
                    seen += 1;
                }
            }
        }
        None
    };

    match &insert.position {
        InsertPos::AtTop => {
            children.splice(0..0, new_nodes);
        }
        InsertPos::AtBottom => children.extend(new_nodes),
        InsertPos::AtIndex(n) => {
            let at = (*n).min(children.len());
            children.splice(at..at, new_nodes);
        }
        InsertPos::Before => match position_of(children, &insert.target) {
            Some(i) => {
                children.splice(i..i, new_nodes);
            }
            None => children.extend(new_nodes),
        },
        InsertPos::After => match position_of(children, &insert.target) {
            Some(i) => {
                children.splice(i + 1..i + 1, new_nodes);
            }
            None => children.extend(new_nodes),
        },
        InsertPos::Replace => match position_of(children, &insert.target) {
            Some(i) => {
                children.remove(i);
                children.splice(i..i, new_nodes);
            }
            None => children.extend(new_nodes),
        },
    }
}

/// Look a variable up through its group, following group inheritance.
pub fn var_value(map: &GlobalMap, group: &str, name: &str, namespace: &str) -> Option<String> {
    let mut visited = HashSet::new();
    lookup_var(map, group, name, namespace, &mut visited)
}

fn lookup_var(
    map: &GlobalMap,
    group: &str,
    name: &str,
    namespace: &str,
    visited: &mut HashSet<String>,
) -> Option<String> {
    let (full, record) = map.lookup_var_group_entry(group, namespace)?;
    if !visited.insert(full.to_string()) {
        return None;
    }
    if let Some(v) = record.value(name) {
        return Some(v.to_string());
    }
    let def_ns = namespace_of(full).to_string();
    let inherits = record.inherits.clone();
    for base in inherits {
        if let Some(v) = lookup_var(map, &base, name, &def_ns, visited) {
            return Some(v);
        }
    }
    None
}

/// Final string for a property value: the literal itself, or the var-call
/// substitution (override first, then the group value).
pub fn value_string(map: &GlobalMap, value: &Value, namespace: &str) -> String {
    match value {
        Value::Literal(s) => s.clone(),
        Value::VarCall(call) => {
            if let Some(v) = &call.override_value {
                v.clone()
            } else {
                var_value(map, &call.group, &call.name, namespace).unwrap_or_default()
            }
        }
    }
}

fn upsert(props: &mut Vec<(String, String)>, key: String, value: String) {
    if let Some(slot) = props.iter_mut().find(|(k, _)| *k == key) {
        slot.1 = value;
    } else {
        props.push((key, value));
    }
}

fn names_match(target: &str, base: &str) -> bool {
    target == base
        || base.ends_with(&format!(".{}", target))
        || target.ends_with(&format!(".{}", base))
}
