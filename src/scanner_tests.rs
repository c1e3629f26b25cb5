#[cfg(test)]
mod tests {
    use crate::error::Diagnostics;
    use crate::scanner::{scan_source, FragmentKind, UnifiedScanner};
    use pretty_assertions::assert_eq;

    #[test]
    fn plain_element_is_one_chtl_fragment() {
        let fragments = scan_source("div { id: main; }", "test.chtl").unwrap();
        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0].kind, FragmentKind::Chtl);
        assert!(!fragments[0].in_script);
        assert!(!fragments[0].verbatim);
    }

    #[test]
    fn global_style_body_is_css() {
        let source = "style { body { color: red; } }";
        let fragments = scan_source(source, "test.chtl").unwrap();
        let css: Vec<_> = fragments
            .iter()
            .filter(|f| f.kind == FragmentKind::Css)
            .collect();
        assert_eq!(css.len(), 1);
        assert!(css[0].text.contains("color: red"));
    }

    #[test]
    fn local_style_body_stays_chtl() {
        let source = "div { style { width: 10px; } }";
        let fragments = scan_source(source, "test.chtl").unwrap();
        assert!(fragments.iter().all(|f| f.kind == FragmentKind::Chtl));
    }

    #[test]
    fn script_body_is_flagged() {
        let source = "div { script { console.log(1); } }";
        let fragments = scan_source(source, "test.chtl").unwrap();
        let script: Vec<_> = fragments.iter().filter(|f| f.in_script).collect();
        assert_eq!(script.len(), 1);
        assert!(script[0].text.contains("console.log(1);"));
    }

    #[test]
    fn origin_javascript_body_is_js() {
        let source = "[Origin] @JavaScript { alert('hi'); }";
        let fragments = scan_source(source, "test.chtl").unwrap();
        let js: Vec<_> = fragments
            .iter()
            .filter(|f| f.kind == FragmentKind::Js)
            .collect();
        assert_eq!(js.len(), 1);
        assert!(js[0].text.contains("alert('hi');"));
    }

    #[test]
    fn origin_html_body_is_verbatim_chtl() {
        let source = "[Origin] @Html box { <b>hi</b> }";
        let fragments = scan_source(source, "test.chtl").unwrap();
        let verbatim: Vec<_> = fragments.iter().filter(|f| f.verbatim).collect();
        assert_eq!(verbatim.len(), 1);
        assert!(verbatim[0].text.contains("<b>hi</b>"));
    }

    #[test]
    fn origin_reference_without_brace_is_not_a_raw_block() {
        let source = "body { [Origin] @Html box; }";
        let fragments = scan_source(source, "test.chtl").unwrap();
        assert!(fragments.iter().all(|f| !f.verbatim));
    }

    #[test]
    fn unbalanced_open_brace_is_fatal() {
        let err = scan_source("div { span {", "test.chtl").unwrap_err();
        assert!(err.message.contains("unclosed"));
    }

    #[test]
    fn stray_close_brace_is_fatal() {
        let err = scan_source("div { } }", "test.chtl").unwrap_err();
        assert!(err.message.contains("unbalanced"));
    }

    #[test]
    fn unterminated_string_is_fatal() {
        let err = scan_source("div { id: \"oops", "test.chtl").unwrap_err();
        assert!(err.message.contains("unterminated string"));
    }

    #[test]
    fn unterminated_block_comment_is_fatal() {
        let err = scan_source("/* never closed", "test.chtl").unwrap_err();
        assert!(err.message.contains("unterminated block comment"));
    }

    #[test]
    fn leading_bom_is_rejected() {
        let err = scan_source("\u{FEFF}div {}", "test.chtl").unwrap_err();
        assert!(err.message.contains("byte-order mark"));
    }

    #[test]
    fn braces_in_strings_do_not_count() {
        let fragments = scan_source("div { id: \"{not a block}\"; }", "test.chtl").unwrap();
        assert_eq!(fragments.len(), 1);
    }

    #[test]
    fn braces_in_comments_do_not_count() {
        let source = "div { // open {\n /* } close */ }";
        let fragments = scan_source(source, "test.chtl").unwrap();
        assert_eq!(fragments[0].kind, FragmentKind::Chtl);
    }

    #[test]
    fn fragment_coverage_is_contiguous() {
        let source = "div { style { a: b; } }\nstyle { p { c: d; } }\nspan { }";
        let fragments = scan_source(source, "test.chtl").unwrap();
        for pair in fragments.windows(2) {
            assert_eq!(pair[0].loc.end, pair[1].loc.offset);
        }
        assert_eq!(fragments.last().unwrap().loc.end, source.len());
    }

    #[test]
    fn statistics_count_fragment_kinds() {
        let source = "style { a { b: c; } }\n[Origin] @JavaScript { x(); }\ndiv { }";
        let diags = Diagnostics::new("test.chtl");
        let mut scanner = UnifiedScanner::new(source);
        scanner.scan(&diags).unwrap();
        let stats = scanner.stats();
        assert!(stats.css_fragments >= 1);
        assert!(stats.js_fragments >= 1);
        assert!(stats.chtl_fragments >= 1);
        assert_eq!(
            stats.total_fragments,
            stats.css_fragments + stats.js_fragments + stats.chtl_fragments
        );
    }
}
