#[cfg(test)]
mod tests {
    use crate::ast::*;
    use crate::error::Diagnostics;
    use crate::lexer::Lexer;
    use crate::parser::{split_css_rules, Parser};
    use crate::scanner::UnifiedScanner;
    use pretty_assertions::assert_eq;

    fn parse(source: &str) -> (Document, Diagnostics) {
        let mut diags = Diagnostics::new("test.chtl");
        let mut scanner = UnifiedScanner::new(source);
        let fragments = scanner.scan(&diags).expect("scan");
        let tokens = Lexer::new(source, &fragments).tokenize(&mut diags, false);
        let mut parser = Parser::new(source, tokens);
        let document = parser.parse_document(&mut diags);
        assert!(
            parser.states().is_balanced(),
            "state stack unbalanced: {} pushes, {} pops",
            parser.states().pushes(),
            parser.states().pops()
        );
        assert!(parser.scopes().is_balanced(), "scope stack unbalanced");
        (document, diags)
    }

    fn parse_ok(source: &str) -> Document {
        let (document, diags) = parse(source);
        assert!(!diags.has_errors(), "unexpected errors: {:?}", diags.list());
        document
    }

    fn first_element(document: &Document) -> &Element {
        document
            .children
            .iter()
            .find_map(|n| match n {
                Node::Element(el) => Some(el),
                _ => None,
            })
            .expect("no element in document")
    }

    #[test]
    fn element_with_attributes_and_text() {
        let document = parse_ok("div { id: main; class: box; text { Hello } }");
        let el = first_element(&document);
        assert_eq!(el.tag, "div");
        assert_eq!(el.attribute("id"), Some("main"));
        assert_eq!(el.attribute("class"), Some("box"));
        match &el.children[0] {
            Node::Text(t) => assert_eq!(t.content, "Hello"),
            other => panic!("expected text child, got {:?}", other),
        }
    }

    #[test]
    fn ce_equivalence_attributes_produce_identical_ast() {
        let (colon, _) = parse("div { id: main; span { class: x; } }");
        let (equals, _) = parse("div { id = main; span { class = x; } }");
        let left = serde_json::to_string(&colon).unwrap();
        let right = serde_json::to_string(&equals).unwrap();
        assert_eq!(left, right);
    }

    #[test]
    fn nested_elements() {
        let document = parse_ok("div { span { text { a } } p { } }");
        let el = first_element(&document);
        assert_eq!(el.children.len(), 2);
        assert!(matches!(&el.children[0], Node::Element(e) if e.tag == "span"));
        assert!(matches!(&el.children[1], Node::Element(e) if e.tag == "p"));
    }

    #[test]
    fn text_block_whitespace_normalisation() {
        let document = parse_ok("div { text { Hello   big    world } }");
        let el = first_element(&document);
        match &el.children[0] {
            Node::Text(t) => assert_eq!(t.content, "Hello big world"),
            other => panic!("expected text, got {:?}", other),
        }
    }

    #[test]
    fn text_block_keeps_quoted_strings_verbatim() {
        let document = parse_ok(r#"div { text { say "a  b" now } }"#);
        let el = first_element(&document);
        match &el.children[0] {
            Node::Text(t) => assert_eq!(t.content, "say a  b now"),
            other => panic!("expected text, got {:?}", other),
        }
    }

    #[test]
    fn local_style_props_and_rules() {
        let document =
            parse_ok("div { style { width: 10px; .box { color: red; } &:hover { color: blue; } } }");
        let el = first_element(&document);
        let style = el
            .children
            .iter()
            .find_map(|n| match n {
                Node::Style(s) => Some(s),
                _ => None,
            })
            .expect("style block");
        assert_eq!(style.scope, StyleScope::Local);
        assert_eq!(style.props.len(), 1);
        assert_eq!(style.props[0].name, "width");
        assert!(matches!(&style.props[0].value, Value::Literal(v) if v == "10px"));
        assert_eq!(style.rules.len(), 2);
        assert_eq!(style.rules[0].selector, ".box");
        assert_eq!(style.rules[0].body, "color: red;");
        assert_eq!(style.rules[1].selector, "&:hover");
    }

    #[test]
    fn no_value_properties() {
        let document = parse_ok("[Custom] @Style Flexible { width, height; color: red; }");
        match &document.children[0] {
            Node::Custom(custom) => {
                assert!(custom.has_no_value_props);
                let style = custom
                    .body
                    .iter()
                    .find_map(|n| match n {
                        Node::Style(s) => Some(s),
                        _ => None,
                    })
                    .expect("style body");
                assert_eq!(style.no_value_props, vec!["width", "height"]);
            }
            other => panic!("expected custom, got {:?}", other),
        }
    }

    #[test]
    fn template_style_with_inheritance() {
        let document = parse_ok(
            "[Template] @Style Base { color: red; }\n\
             [Template] @Style Big { @Style Base; font-size: 20px; }",
        );
        match &document.children[1] {
            Node::Template(t) => {
                assert_eq!(t.kind, DefKind::Style);
                assert_eq!(t.name, "Big");
                assert!(t
                    .body
                    .iter()
                    .any(|n| matches!(n, Node::Inherit(i) if i.base == "Base")));
            }
            other => panic!("expected template, got {:?}", other),
        }
    }

    #[test]
    fn template_with_parameters() {
        let document = parse_ok("[Template] @Element Card(title, width = \"100px\") { div { } }");
        match &document.children[0] {
            Node::Template(t) => {
                assert_eq!(t.params.len(), 2);
                assert_eq!(t.params[0].name, "title");
                assert_eq!(t.params[1].default.as_deref(), Some("100px"));
            }
            other => panic!("expected template, got {:?}", other),
        }
    }

    #[test]
    fn template_var_group() {
        let document = parse_ok("[Template] @Var Theme { primary: \"blue\"; accent: \"red\"; }");
        match &document.children[0] {
            Node::Template(t) => {
                assert_eq!(t.kind, DefKind::Var);
                let defs: Vec<_> = t
                    .body
                    .iter()
                    .filter_map(|n| match n {
                        Node::VarDef(v) => Some((v.name.as_str(), v.value.as_str())),
                        _ => None,
                    })
                    .collect();
                assert_eq!(defs, vec![("primary", "blue"), ("accent", "red")]);
            }
            other => panic!("expected template, got {:?}", other),
        }
    }

    #[test]
    fn specialization_site_is_marked() {
        let document = parse_ok(
            "[Template] @Element List { ul { } }\n\
             div { @Element List { delete ul[0]; insert at top { li { } } } }",
        );
        let el = first_element(&document);
        let spec = el
            .children
            .iter()
            .find_map(|n| match n {
                Node::Custom(c) => Some(c),
                _ => None,
            })
            .expect("specialization node");
        assert!(spec.is_specialization);
        assert_eq!(spec.name, "List");
        assert!(spec.body.iter().any(|n| matches!(n, Node::Delete(_))));
        assert!(spec
            .body
            .iter()
            .any(|n| matches!(n, Node::Insert(i) if i.position == InsertPos::AtTop)));
    }

    #[test]
    fn delete_targets_with_index_and_inheritance() {
        let document = parse_ok(
            "[Custom] @Element Page { delete div[1], span; delete @Style Base; }",
        );
        match &document.children[0] {
            Node::Custom(custom) => {
                let deletes: Vec<&Delete> = custom
                    .body
                    .iter()
                    .filter_map(|n| match n {
                        Node::Delete(d) => Some(d),
                        _ => None,
                    })
                    .collect();
                assert_eq!(deletes.len(), 2);
                assert_eq!(deletes[0].targets[0].name, "div");
                assert_eq!(deletes[0].targets[0].index, Some(1));
                assert_eq!(deletes[0].targets[0].kind, DeleteKind::Element);
                assert_eq!(deletes[0].targets[1].name, "span");
                assert_eq!(deletes[1].targets[0].kind, DeleteKind::Inheritance);
                assert_eq!(deletes[1].targets[0].name, "Base");
            }
            other => panic!("expected custom, got {:?}", other),
        }
    }

    #[test]
    fn insert_positions() {
        let document = parse_ok(
            "[Custom] @Element Page {\n\
               insert before div[0] { span { } }\n\
               insert after div { p { } }\n\
               insert replace span { b { } }\n\
               insert at top { header { } }\n\
               insert at bottom { footer { } }\n\
               insert at 2 { hr { } }\n\
             }",
        );
        match &document.children[0] {
            Node::Custom(custom) => {
                let positions: Vec<&InsertPos> = custom
                    .body
                    .iter()
                    .filter_map(|n| match n {
                        Node::Insert(i) => Some(&i.position),
                        _ => None,
                    })
                    .collect();
                assert_eq!(
                    positions,
                    vec![
                        &InsertPos::Before,
                        &InsertPos::After,
                        &InsertPos::Replace,
                        &InsertPos::AtTop,
                        &InsertPos::AtBottom,
                        &InsertPos::AtIndex(2),
                    ]
                );
            }
            other => panic!("expected custom, got {:?}", other),
        }
    }

    #[test]
    fn origin_block_body_is_verbatim() {
        let document = parse_ok("[Origin] @Html box { <b>hi</b> }");
        match &document.children[0] {
            Node::Origin(origin) => {
                assert_eq!(origin.kind, OriginKind::Html);
                assert_eq!(origin.name.as_deref(), Some("box"));
                assert_eq!(origin.content, "<b>hi</b>");
                assert!(!origin.is_reference);
            }
            other => panic!("expected origin, got {:?}", other),
        }
    }

    #[test]
    fn origin_reference() {
        let document = parse_ok("[Origin] @Html box { <b>hi</b> } body { [Origin] @Html box; }");
        let el = first_element(&document);
        match &el.children[0] {
            Node::Origin(origin) => {
                assert!(origin.is_reference);
                assert_eq!(origin.name.as_deref(), Some("box"));
            }
            other => panic!("expected origin reference, got {:?}", other),
        }
    }

    #[test]
    fn custom_origin_type() {
        let document = parse_ok("[Origin] @Vue widget { <widget /> }");
        match &document.children[0] {
            Node::Origin(origin) => {
                assert_eq!(origin.kind, OriginKind::Custom("Vue".into()));
            }
            other => panic!("expected origin, got {:?}", other),
        }
    }

    #[test]
    fn import_forms() {
        let document = parse_ok(
            "[Import] @Chtl from \"widgets.chtl\";\n\
             [Import] @Style Box, Card from lib.styles as ui;\n\
             [Import] @CJmod from mymod;",
        );
        let imports: Vec<&Import> = document
            .children
            .iter()
            .filter_map(|n| match n {
                Node::Import(i) => Some(i),
                _ => None,
            })
            .collect();
        assert_eq!(imports.len(), 3);
        assert_eq!(imports[0].kind, ImportKind::Chtl);
        assert_eq!(imports[0].path, "widgets.chtl");
        assert_eq!(imports[1].items, vec!["Box", "Card"]);
        assert_eq!(imports[1].path, "lib.styles");
        assert_eq!(imports[1].alias.as_deref(), Some("ui"));
        assert_eq!(imports[2].kind, ImportKind::CJmod);
    }

    #[test]
    fn namespace_nesting() {
        let document = parse_ok(
            "[Namespace] space { [Template] @Style A { color: red; } [Namespace] inner { } }",
        );
        match &document.children[0] {
            Node::Namespace(ns) => {
                assert_eq!(ns.name, "space");
                assert!(ns.children.iter().any(|n| matches!(n, Node::Template(_))));
                assert!(ns
                    .children
                    .iter()
                    .any(|n| matches!(n, Node::Namespace(inner) if inner.name == "inner")));
            }
            other => panic!("expected namespace, got {:?}", other),
        }
    }

    #[test]
    fn configuration_entries_and_blocks() {
        let document = parse_ok(
            "[Configuration] @Config Fancy {\n\
               INDEX_INITIAL_COUNT: 1;\n\
               DEBUG_MODE = true;\n\
               name: { KEYWORD_TEXT: txt, content; }\n\
               origin: { @Vue: @Html; }\n\
             }",
        );
        match &document.children[0] {
            Node::Configuration(config) => {
                assert_eq!(config.name.as_deref(), Some("Fancy"));
                assert!(config
                    .entries
                    .iter()
                    .any(|(k, v)| k == "INDEX_INITIAL_COUNT" && v == "1"));
                assert!(config.entries.iter().any(|(k, v)| k == "DEBUG_MODE" && v == "true"));
                assert_eq!(config.name_overrides.len(), 1);
                assert_eq!(config.name_overrides[0].0, "KEYWORD_TEXT");
                assert_eq!(config.name_overrides[0].1, vec!["txt", "content"]);
                assert_eq!(config.origin_aliases, vec![("Vue".into(), "@Html".into())]);
            }
            other => panic!("expected configuration, got {:?}", other),
        }
    }

    #[test]
    fn except_scopes() {
        let document = parse_ok("except script; div { except span, p; }");
        match &document.children[0] {
            Node::Except(e) => assert_eq!(e.scope, ExceptScope::Global),
            other => panic!("expected except, got {:?}", other),
        }
        let el = first_element(&document);
        match &el.children[0] {
            Node::Except(e) => {
                assert_eq!(e.scope, ExceptScope::Precise);
                assert_eq!(e.targets, vec!["span", "p"]);
            }
            other => panic!("expected except, got {:?}", other),
        }
    }

    #[test]
    fn var_call_forms() {
        let document = parse_ok(
            "[Template] @Var Theme { primary: \"blue\"; }\n\
             div { style { background: Theme(primary); border: Theme(primary = \"red\"); } }",
        );
        let el = first_element(&document);
        let style = el
            .children
            .iter()
            .find_map(|n| match n {
                Node::Style(s) => Some(s),
                _ => None,
            })
            .expect("style");
        match &style.props[0].value {
            Value::VarCall(call) => {
                assert_eq!(call.group, "Theme");
                assert_eq!(call.name, "primary");
                assert!(call.override_value.is_none());
            }
            other => panic!("expected var call, got {:?}", other),
        }
        match &style.props[1].value {
            Value::VarCall(call) => {
                assert_eq!(call.override_value.as_deref(), Some("red"));
            }
            other => panic!("expected var call, got {:?}", other),
        }
    }

    #[test]
    fn script_block_captures_raw_text_and_chtljs_flag() {
        let document = parse_ok("div { script { const a = {{.box}}; if (a) { a.focus(); } } }");
        let el = first_element(&document);
        let script = el
            .children
            .iter()
            .find_map(|n| match n {
                Node::Script(s) => Some(s),
                _ => None,
            })
            .expect("script");
        assert_eq!(script.scope, ScriptScope::Local);
        assert!(script.contains_chtljs);
        assert!(script.content.contains("a.focus();"));
    }

    #[test]
    fn global_style_rules_come_from_raw_css() {
        let document = parse_ok("style { body { margin: 0; } p.note { color: gray; } }");
        match &document.children[0] {
            Node::Style(style) => {
                assert_eq!(style.scope, StyleScope::Global);
                assert_eq!(style.rules.len(), 2);
                assert_eq!(style.rules[0].selector, "body");
                assert_eq!(style.rules[1].selector, "p.note");
            }
            other => panic!("expected style, got {:?}", other),
        }
    }

    #[test]
    fn error_recovery_keeps_later_nodes() {
        let (document, diags) = parse("div { id: main; } ] span { }");
        assert!(diags.has_errors());
        let tags: Vec<&str> = document
            .children
            .iter()
            .filter_map(|n| match n {
                Node::Element(el) => Some(el.tag.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(tags, vec!["div", "span"]);
    }

    #[test]
    fn unexpected_eof_names_unclosed_construct() {
        let mut diags = Diagnostics::new("test.chtl");
        // Bypass the scanner (which would reject the unbalanced brace
        // earlier) to exercise the parser's own EOF handling.
        let source = "div { id: main;";
        let fragments = vec![crate::scanner::Fragment {
            kind: crate::scanner::FragmentKind::Chtl,
            text: source.to_string(),
            loc: crate::token::SourceLocation::new(1, 1, 0, source.len()),
            in_script: false,
            verbatim: false,
        }];
        let tokens = Lexer::new(source, &fragments).tokenize(&mut diags, false);
        let mut parser = Parser::new(source, tokens);
        parser.parse_document(&mut diags);
        assert!(diags
            .list()
            .iter()
            .any(|d| d.message.contains("unclosed element")));
    }

    #[test]
    fn split_css_rules_handles_nesting_and_tails() {
        let rules = split_css_rules("a { x: 1; } @media screen { b { y: 2; } } color: red;");
        assert_eq!(rules.len(), 3);
        assert_eq!(rules[0].0, "a");
        assert_eq!(rules[1].0, "@media screen");
        assert!(rules[1].1.contains("b { y: 2; }"));
        assert_eq!(rules[2].0, "");
        assert_eq!(rules[2].1, "color: red;");
    }
}
