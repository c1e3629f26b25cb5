#[cfg(test)]
mod tests {
    use crate::error::DiagnosticKind;
    use crate::{compile, compile_units, CompileOptions, Compiler};
    use pretty_assertions::assert_eq;

    fn compile_ok(source: &str) -> String {
        let result = compile(source, "test.chtl", CompileOptions::default());
        assert!(result.success, "diagnostics: {:?}", result.diagnostics);
        result.output
    }

    // Spec scenarios, end to end.

    #[test]
    fn scenario_minimal_element() {
        let html = compile_ok("div { id: main; text { Hello } }");
        assert!(html.contains("<div id=\"main\">Hello</div>"), "{}", html);
        assert!(html.starts_with("<!DOCTYPE html>"));
    }

    #[test]
    fn scenario_auto_class_and_ampersand() {
        let html = compile_ok("div { style { .box { width: 10px; } &:hover { width: 20px; } } }");
        assert!(html.contains(".box { width: 10px; }"), "{}", html);
        assert!(html.contains(".box:hover { width: 20px; }"), "{}", html);
        assert!(html.contains("<div class=\"box\"></div>"), "{}", html);
    }

    #[test]
    fn scenario_template_inheritance() {
        let html = compile_ok(
            "[Template] @Style Base { color: red; }\n\
             [Template] @Style Big  { @Style Base; font-size: 20px; }\n\
             div { style { @Style Big; } }",
        );
        assert!(
            html.contains("style=\"color: red; font-size: 20px;\""),
            "{}",
            html
        );
    }

    #[test]
    fn scenario_variable_group_override() {
        let html = compile_ok(
            "[Template] @Var Theme { primary: \"blue\"; }\n\
             div { style { background: Theme(primary); } }\n\
             div { style { background: Theme(primary = \"red\"); } }",
        );
        let blue = html.find("background: blue").expect("blue div");
        let red = html.find("background: red").expect("red div");
        assert!(blue < red, "{}", html);
    }

    #[test]
    fn scenario_except_constraint() {
        let result = compile(
            "div { except span; span { text { no } } }",
            "test.chtl",
            CompileOptions::default(),
        );
        assert!(!result.success);
        let violation = result
            .diagnostics
            .iter()
            .find(|d| d.kind == DiagnosticKind::Semantic)
            .expect("semantic diagnostic");
        assert!(violation.message.contains("span"));
        // Located at the offending child, not at the except itself.
        assert_eq!(violation.location.line, 1);
        assert!(violation.location.column > 1);
        assert!(!result.output.contains("<span>no</span>"));
        assert!(!result.output.contains(">no<"));
    }

    #[test]
    fn scenario_origin_embedding() {
        let html = compile_ok(
            "[Origin] @Html box { <b>hi</b> }\n\
             body { [Origin] @Html box; }",
        );
        assert!(html.contains("<b>hi</b>"), "{}", html);
    }

    // Laws.

    #[test]
    fn law_compiling_own_output_is_an_error() {
        let html = compile_ok("div { text { Hello } }");
        let result = compile(&html, "generated.html", CompileOptions::default());
        assert!(!result.success, "HTML must not silently round-trip");
        assert!(!result.diagnostics.is_empty());
    }

    #[test]
    fn law_ce_equivalence_end_to_end() {
        let colon = compile_ok("div { id: main; style { color: red; } }");
        let equals = compile_ok("div { id = main; style { color = red; } }");
        assert_eq!(colon, equals);
    }

    #[test]
    fn law_comment_transparency() {
        let with_comments = compile_ok(
            "// build note\ndiv { /* inner */ id: main; style { color: red; // why\n } }",
        );
        let without = compile_ok("div { id: main; style { color: red; } }");
        assert_eq!(with_comments, without);
    }

    // Invariants surfaced through the public API.

    #[test]
    fn empty_source_yields_bare_shell() {
        let html = compile_ok("");
        assert!(html.contains("<!DOCTYPE html>"));
        assert!(html.contains("<body>"));
        assert!(!html.contains("<style>"));
        assert!(!html.contains("<script>"));
    }

    #[test]
    fn failed_scan_reports_fatal_and_no_output() {
        let result = compile("div { ", "test.chtl", CompileOptions::default());
        assert!(!result.success);
        assert!(result.output.is_empty());
        assert!(result
            .diagnostics
            .iter()
            .any(|d| d.severity == crate::Severity::Fatal));
    }

    #[test]
    fn strict_mode_promotes_warnings() {
        let source = "[Configuration] { DEBUG_MODE: true; DEBUG_MODE: false; }";
        let strict = compile(source, "test.chtl", CompileOptions::default());
        assert!(!strict.success, "{:?}", strict.diagnostics);
        let lax = compile(
            source,
            "test.chtl",
            CompileOptions {
                strict: false,
                ..Default::default()
            },
        );
        assert!(lax.success, "{:?}", lax.diagnostics);
    }

    #[test]
    fn errors_recover_and_keep_compiling() {
        let result = compile(
            "div { id: main; } ] span { text { alive } }",
            "test.chtl",
            CompileOptions::default(),
        );
        assert!(!result.success);
        assert!(result.output.contains("alive"), "{}", result.output);
    }

    #[test]
    fn diagnostics_carry_locations() {
        let result = compile(
            "div {\n  style { @Style Missing; }\n}",
            "test.chtl",
            CompileOptions::default(),
        );
        let diag = result
            .diagnostics
            .iter()
            .find(|d| d.kind == DiagnosticKind::Semantic)
            .expect("semantic diagnostic");
        assert_eq!(diag.file, "test.chtl");
        assert_eq!(diag.location.line, 2);
    }

    #[test]
    fn ast_dump_is_valid_json() {
        let compiler = Compiler::new(CompileOptions::default());
        let (json, diagnostics) = compiler.parse_to_json("div { id: main; }", "test.chtl");
        assert!(diagnostics.is_empty());
        let value: serde_json::Value = serde_json::from_str(&json.unwrap()).unwrap();
        assert_eq!(value["children"][0]["type"], "element");
        assert_eq!(value["children"][0]["tag"], "div");
    }

    #[test]
    fn units_compile_independently_in_parallel() {
        let units: Vec<(String, String)> = (0..8)
            .map(|i| {
                (
                    format!(
                        "[Template] @Style Local {{ color: c{i}; }} div {{ style {{ @Style Local; }} }}"
                    ),
                    format!("unit{i}.chtl"),
                )
            })
            .collect();
        let results = compile_units(&units, &CompileOptions::default());
        assert_eq!(results.len(), 8);
        for (i, result) in results.iter().enumerate() {
            assert!(result.success, "unit {}: {:?}", i, result.diagnostics);
            assert!(result.output.contains(&format!("color: c{}", i)));
        }
    }

    #[test]
    fn namespaced_template_use_compiles() {
        let html = compile_ok(
            "[Namespace] ui { [Template] @Style Chip { color: teal; } }\n\
             div { style { @Style ui.Chip; } }",
        );
        assert!(html.contains("style=\"color: teal;\""), "{}", html);
    }

    #[test]
    fn custom_element_specialization_end_to_end() {
        let html = compile_ok(
            "[Template] @Element Nav { a { href: \"/one\"; text { one } } a { href: \"/two\"; text { two } } }\n\
             nav { @Element Nav { delete a[0]; } }",
        );
        assert!(!html.contains("/one"), "{}", html);
        assert!(html.contains("/two"), "{}", html);
    }

    #[test]
    fn script_passes_through_verbatim() {
        let html = compile_ok("div { script { if (x) { y(); } } }");
        assert!(html.contains("if (x) { y(); }"), "{}", html);
    }
}
