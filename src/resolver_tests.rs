#[cfg(test)]
mod tests {
    use crate::ast::*;
    use crate::error::{DiagnosticKind, Diagnostics};
    use crate::imports::{ImportResolver, NullResolver};
    use crate::lexer::Lexer;
    use crate::parser::Parser;
    use crate::resolver::{
        resolved_element_children, resolved_style_props, var_value, Resolver,
    };
    use crate::scanner::UnifiedScanner;
    use crate::symbols::GlobalMap;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn resolve(source: &str) -> (Document, GlobalMap, Diagnostics) {
        resolve_with(source, &NullResolver)
    }

    fn resolve_with(
        source: &str,
        importer: &dyn ImportResolver,
    ) -> (Document, GlobalMap, Diagnostics) {
        let mut diags = Diagnostics::new("test.chtl");
        let mut scanner = UnifiedScanner::new(source);
        let fragments = scanner.scan(&diags).expect("scan");
        let tokens = Lexer::new(source, &fragments).tokenize(&mut diags, false);
        let mut parser = Parser::new(source, tokens);
        let mut document = parser.parse_document(&mut diags);
        let mut map = GlobalMap::new();
        let mut resolver = Resolver::new(&mut map, importer);
        resolver.run(&mut document, &mut diags);
        (document, map, diags)
    }

    fn semantic_errors(diags: &Diagnostics) -> Vec<String> {
        diags
            .list()
            .iter()
            .filter(|d| d.kind == DiagnosticKind::Semantic)
            .map(|d| d.message.clone())
            .collect()
    }

    #[test]
    fn registers_templates_and_var_groups() {
        let (_, map, diags) = resolve(
            "[Template] @Style Base { color: red; }\n\
             [Template] @Var Theme { primary: \"blue\"; }",
        );
        assert!(!diags.has_errors());
        assert!(map.lookup_template(DefKind::Style, "Base", "").is_some());
        assert!(map.lookup_var_group("Theme", "").is_some());
    }

    #[test]
    fn duplicate_registration_is_an_error() {
        let (_, _, diags) = resolve(
            "[Template] @Style Base { color: red; }\n\
             [Template] @Style Base { color: blue; }",
        );
        assert!(semantic_errors(&diags)
            .iter()
            .any(|m| m.contains("duplicate template")));
    }

    #[test]
    fn same_name_different_kind_is_fine() {
        let (_, _, diags) = resolve(
            "[Template] @Style Card { color: red; }\n\
             [Template] @Element Card { div { } }",
        );
        assert!(!diags.has_errors());
    }

    #[test]
    fn inheritance_merges_parent_then_child() {
        let (_, map, diags) = resolve(
            "[Template] @Style Base { color: red; margin: 0; }\n\
             [Template] @Style Big { @Style Base; font-size: 20px; color: green; }",
        );
        assert!(!diags.has_errors());
        let props = resolved_style_props(&map, "Big", "").unwrap();
        assert_eq!(
            props,
            vec![
                ("color".to_string(), "green".to_string()),
                ("margin".to_string(), "0".to_string()),
                ("font-size".to_string(), "20px".to_string()),
            ]
        );
    }

    #[test]
    fn inheritance_cycle_is_reported() {
        let (_, _, diags) = resolve(
            "[Template] @Style A { @Style B; }\n\
             [Template] @Style B { @Style A; }",
        );
        assert!(semantic_errors(&diags)
            .iter()
            .any(|m| m.contains("inheritance cycle")));
    }

    #[test]
    fn self_inheritance_is_a_cycle() {
        let (_, _, diags) = resolve("[Template] @Style A { @Style A; }");
        assert!(semantic_errors(&diags)
            .iter()
            .any(|m| m.contains("inheritance cycle")));
    }

    #[test]
    fn unknown_inherit_base_is_reported() {
        let (_, _, diags) = resolve("div { style { @Style Missing; } }");
        assert!(semantic_errors(&diags)
            .iter()
            .any(|m| m.contains("unknown @Style 'Missing'")));
    }

    #[test]
    fn delete_inheritance_recomputes_from_surviving_parents() {
        let (_, map, diags) = resolve(
            "[Template] @Style A { color: red; padding: 1px; }\n\
             [Template] @Style B { color: blue; }\n\
             [Custom] @Style C { @Style A; @Style B; delete @Style A; }",
        );
        assert!(!diags.has_errors());
        let props = resolved_style_props(&map, "C", "").unwrap();
        // A's contribution is gone entirely; B still supplies color.
        assert_eq!(props, vec![("color".to_string(), "blue".to_string())]);
    }

    #[test]
    fn delete_property_removes_key() {
        let (_, map, _) = resolve(
            "[Template] @Style A { color: red; margin: 0; }\n\
             [Custom] @Style B { @Style A; delete color; }",
        );
        let props = resolved_style_props(&map, "B", "").unwrap();
        assert_eq!(props, vec![("margin".to_string(), "0".to_string())]);
    }

    #[test]
    fn element_template_children_concatenate() {
        let (_, map, diags) = resolve(
            "[Template] @Element Header { h1 { } }\n\
             [Template] @Element Page { @Element Header; p { } }",
        );
        assert!(!diags.has_errors());
        let children = resolved_element_children(&map, "Page", "").unwrap();
        let tags: Vec<&str> = children
            .iter()
            .filter_map(|n| match n {
                Node::Element(el) => Some(el.tag.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(tags, vec!["h1", "p"]);
    }

    #[test]
    fn element_specialization_edits_apply_in_order() {
        let (_, map, diags) = resolve(
            "[Template] @Element List { li { } li { } li { } }\n\
             [Custom] @Element Short { @Element List { delete li[1]; insert at top { header { } } } }",
        );
        assert!(!diags.has_errors());
        let children = resolved_element_children(&map, "Short", "").unwrap();
        let tags: Vec<&str> = children
            .iter()
            .filter_map(|n| match n {
                Node::Element(el) => Some(el.tag.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(tags, vec!["header", "li", "li"]);
    }

    #[test]
    fn var_lookup_and_group_inheritance() {
        let (_, map, diags) = resolve(
            "[Template] @Var Base { primary: \"blue\"; }\n\
             [Template] @Var Theme { @Var Base; accent: \"red\"; }",
        );
        assert!(!diags.has_errors());
        assert_eq!(var_value(&map, "Theme", "accent", ""), Some("red".into()));
        assert_eq!(var_value(&map, "Theme", "primary", ""), Some("blue".into()));
        assert_eq!(var_value(&map, "Theme", "missing", ""), None);
    }

    #[test]
    fn missing_variable_is_an_error() {
        let (_, _, diags) = resolve(
            "[Template] @Var Theme { primary: \"blue\"; }\n\
             div { style { background: Theme(nope); } }",
        );
        assert!(semantic_errors(&diags)
            .iter()
            .any(|m| m.contains("variable 'nope' not defined")));
    }

    #[test]
    fn override_skips_variable_existence_check() {
        let (_, _, diags) = resolve(
            "[Template] @Var Theme { primary: \"blue\"; }\n\
             div { style { background: Theme(nope = \"red\"); } }",
        );
        assert!(!diags.has_errors());
    }

    #[test]
    fn unknown_variable_group_is_an_error() {
        let (_, _, diags) = resolve("div { style { background: Nowhere(primary); } }");
        assert!(semantic_errors(&diags)
            .iter()
            .any(|m| m.contains("unknown variable group 'Nowhere'")));
    }

    #[test]
    fn template_arity_mismatch_is_reported() {
        let (_, _, diags) = resolve(
            "[Template] @Style Sized(width) { margin: 0; }\n\
             div { style { @Style Sized(10px, 20px, 30px); } }",
        );
        assert!(semantic_errors(&diags)
            .iter()
            .any(|m| m.contains("argument(s) given")));
    }

    #[test]
    fn matching_arity_is_accepted() {
        let (_, _, diags) = resolve(
            "[Template] @Style Sized(width) { margin: 0; }\n\
             div { style { @Style Sized(10px); } }",
        );
        assert!(!diags.has_errors(), "{:?}", diags.list());
    }

    #[test]
    fn auto_class_attaches_and_rewrites_ampersand() {
        let (document, _, diags) =
            resolve("div { style { .box { width: 10px; } &:hover { width: 20px; } } }");
        assert!(!diags.has_errors());
        let el = match &document.children[0] {
            Node::Element(el) => el,
            other => panic!("expected element, got {:?}", other),
        };
        assert_eq!(el.attribute("class"), Some("box"));
        let style = el
            .children
            .iter()
            .find_map(|n| match n {
                Node::Style(s) => Some(s),
                _ => None,
            })
            .unwrap();
        assert_eq!(style.auto_class.as_deref(), Some("box"));
        assert_eq!(style.rules[1].selector, ".box:hover");
    }

    #[test]
    fn auto_id_attaches_when_selector_is_an_id() {
        let (document, _, _) = resolve("div { style { #main { width: 10px; } } }");
        let el = match &document.children[0] {
            Node::Element(el) => el,
            other => panic!("expected element, got {:?}", other),
        };
        assert_eq!(el.attribute("id"), Some("main"));
    }

    #[test]
    fn existing_class_attribute_is_kept() {
        let (document, _, _) =
            resolve("div { class: already; style { .box { width: 10px; } } }");
        let el = match &document.children[0] {
            Node::Element(el) => el,
            other => panic!("expected element, got {:?}", other),
        };
        assert_eq!(el.attribute("class"), Some("already"));
    }

    #[test]
    fn except_removes_forbidden_child_and_reports() {
        let (document, _, diags) = resolve("div { except span; span { text { no } } }");
        assert!(semantic_errors(&diags)
            .iter()
            .any(|m| m.contains("forbidden")));
        let el = match &document.children[0] {
            Node::Element(el) => el,
            other => panic!("expected element, got {:?}", other),
        };
        assert!(!el
            .children
            .iter()
            .any(|n| matches!(n, Node::Element(e) if e.tag == "span")));
    }

    #[test]
    fn except_constraints_compose_down_the_tree() {
        let (document, _, diags) = resolve("div { except b; section { b { } } }");
        assert!(semantic_errors(&diags)
            .iter()
            .any(|m| m.contains("forbidden")));
        let div = match &document.children[0] {
            Node::Element(el) => el,
            other => panic!("expected element, got {:?}", other),
        };
        let section = div
            .children
            .iter()
            .find_map(|n| match n {
                Node::Element(e) if e.tag == "section" => Some(e),
                _ => None,
            })
            .unwrap();
        assert!(section.children.is_empty());
    }

    #[test]
    fn namespaced_lookup_is_relative_first() {
        let (_, map, diags) = resolve(
            "[Template] @Style Box { color: global; }\n\
             [Namespace] space {\n\
               [Template] @Style Box { color: local; }\n\
               [Template] @Style User { @Style Box; }\n\
             }",
        );
        assert!(!diags.has_errors());
        let props = resolved_style_props(&map, "User", "space").unwrap();
        assert_eq!(props, vec![("color".to_string(), "local".to_string())]);
        let global = resolved_style_props(&map, "Box", "").unwrap();
        assert_eq!(global, vec![("color".to_string(), "global".to_string())]);
    }

    #[test]
    fn qualified_name_reaches_into_namespace() {
        let (_, map, diags) = resolve(
            "[Namespace] space { [Template] @Style Box { color: red; } }\n\
             [Custom] @Style User { @Style space.Box; }",
        );
        assert!(!diags.has_errors());
        let props = resolved_style_props(&map, "User", "").unwrap();
        assert_eq!(props, vec![("color".to_string(), "red".to_string())]);
    }

    #[test]
    fn named_origin_registers_and_reference_resolves() {
        let (_, map, diags) =
            resolve("[Origin] @Html box { <b>hi</b> } body { [Origin] @Html box; }");
        assert!(!diags.has_errors());
        assert_eq!(map.lookup_origin("@Html", "box"), Some("<b>hi</b>"));
    }

    #[test]
    fn unknown_origin_reference_is_an_error() {
        let (_, _, diags) = resolve("body { [Origin] @Html ghost; }");
        assert!(semantic_errors(&diags)
            .iter()
            .any(|m| m.contains("unknown origin @Html 'ghost'")));
    }

    #[test]
    fn unnamed_configuration_becomes_active() {
        let (_, map, diags) = resolve("[Configuration] { DEBUG_MODE: true; }");
        assert!(!diags.has_errors());
        assert_eq!(map.config_value("DEBUG_MODE"), Some("true".into()));
        // Defaults still answer for unset keys.
        assert_eq!(map.config_value("INDEX_INITIAL_COUNT"), Some("0".into()));
    }

    #[test]
    fn duplicate_configuration_is_reported() {
        let (_, _, diags) = resolve(
            "[Configuration] { DEBUG_MODE: true; }\n\
             [Configuration] { DEBUG_MODE: false; }",
        );
        assert!(diags
            .list()
            .iter()
            .any(|d| d.kind == DiagnosticKind::Configuration && d.message.contains("already defined")));
    }

    /// In-memory host resolver backed by a path → source map.
    struct MapResolver(HashMap<String, String>);

    impl ImportResolver for MapResolver {
        fn resolve(&self, path: &str, _kind: ImportKind) -> Result<String, String> {
            self.0
                .get(path)
                .cloned()
                .ok_or_else(|| format!("module '{}' not found", path))
        }
    }

    #[test]
    fn import_registers_module_symbols() {
        let mut modules = HashMap::new();
        modules.insert(
            "widgets.chtl".to_string(),
            "[Template] @Style Fancy { color: pink; }".to_string(),
        );
        let importer = MapResolver(modules);
        let (_, map, diags) = resolve_with(
            "[Import] @Chtl from \"widgets.chtl\";\n\
             div { style { @Style Fancy; } }",
            &importer,
        );
        assert!(!diags.has_errors(), "{:?}", diags.list());
        assert!(map.lookup_template(DefKind::Style, "Fancy", "").is_some());
    }

    #[test]
    fn import_alias_namespaces_module_symbols() {
        let mut modules = HashMap::new();
        modules.insert(
            "widgets.chtl".to_string(),
            "[Template] @Style Fancy { color: pink; }".to_string(),
        );
        let importer = MapResolver(modules);
        let (_, map, diags) = resolve_with(
            "[Import] @Chtl from \"widgets.chtl\" as ui;",
            &importer,
        );
        assert!(!diags.has_errors());
        assert!(map.lookup_template(DefKind::Style, "ui.Fancy", "").is_some());
        assert!(map.lookup_template(DefKind::Style, "Fancy", "").is_none());
    }

    #[test]
    fn unresolved_import_is_reported() {
        let (_, _, diags) = resolve_with(
            "[Import] @Chtl from \"nowhere.chtl\";",
            &MapResolver(HashMap::new()),
        );
        assert!(diags
            .list()
            .iter()
            .any(|d| d.kind == DiagnosticKind::ImportResolution));
    }

    #[test]
    fn import_is_ingested_once() {
        let mut modules = HashMap::new();
        modules.insert(
            "widgets.chtl".to_string(),
            "[Template] @Style Fancy { color: pink; }".to_string(),
        );
        let importer = MapResolver(modules);
        let (_, _, diags) = resolve_with(
            "[Import] @Chtl from \"widgets.chtl\";\n\
             [Import] @Chtl from \"widgets.chtl\";",
            &importer,
        );
        // A second ingestion would trip the duplicate-template check.
        assert!(!diags.has_errors(), "{:?}", diags.list());
    }

    #[test]
    fn cjmod_import_is_recorded_without_loading() {
        let (_, map, diags) = resolve_with(
            "[Import] @CJmod from native-ext;",
            &MapResolver(HashMap::new()),
        );
        assert!(!diags.has_errors());
        assert!(map.import("native-ext").is_some());
    }
}
