//! HTML generator: resolved AST → one HTML document string.
//!
//! Emission runs in three streams that the final assembly concatenates: the
//! head stylesheet (global styles, `[Origin] @Style` bodies and lifted local
//! rules, in source order), the body markup, and the trailing script tag
//! (local and global scripts plus `[Origin] @JavaScript`, in source order).
//! Definitions, imports and configurations produce no output; `@Element`
//! uses expand to their resolved child list at the call site.

use crate::ast::*;
use crate::resolver::{
    apply_element_edits, auto_attach, inline_style_props, resolved_element_children, value_string,
};
use crate::symbols::GlobalMap;
use lazy_static::lazy_static;
use std::collections::HashSet;

#[derive(Debug, Clone)]
pub struct GeneratorOptions {
    pub pretty_print: bool,
    pub minify: bool,
    pub fragment_only: bool,
    pub debug: bool,
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        Self {
            pretty_print: true,
            minify: false,
            fragment_only: false,
            debug: false,
        }
    }
}

lazy_static! {
    /// HTML void element set: rendered self-closing, never given children.
    static ref VOID_TAGS: HashSet<&'static str> = [
        "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
        "source", "track", "wbr",
    ]
    .into_iter()
    .collect();
    static ref INLINE_TAGS: HashSet<&'static str> = [
        "span", "a", "strong", "em", "b", "i", "u", "code", "small", "sub", "sup", "mark", "del",
        "ins", "cite", "q", "abbr", "time", "var", "samp", "kbd",
    ]
    .into_iter()
    .collect();
}

pub struct Generator<'a> {
    map: &'a GlobalMap,
    options: GeneratorOptions,
    body: String,
    styles: String,
    scripts: String,
    indent: usize,
}

impl<'a> Generator<'a> {
    pub fn new(map: &'a GlobalMap, options: GeneratorOptions) -> Self {
        Self {
            map,
            options,
            body: String::new(),
            styles: String::new(),
            scripts: String::new(),
            indent: 0,
        }
    }

    pub fn generate(mut self, document: &Document) -> String {
        self.emit_nodes(&document.children, "");
        self.assemble()
    }

    fn emit_nodes(&mut self, nodes: &[Node], namespace: &str) {
        for node in nodes {
            self.emit_node(node, namespace);
        }
    }

    fn emit_node(&mut self, node: &Node, namespace: &str) {
        match node {
            Node::Element(el) => self.emit_element(el, namespace, false),
            Node::Text(text) => {
                self.write_indent();
                let escaped = escape_html(&text.content);
                self.body.push_str(&escaped);
                self.newline();
            }
            Node::Comment(comment) => {
                if comment.kind == CommentKind::Generator {
                    self.write_indent();
                    self.body
                        .push_str(&format!("<!-- {} -->", comment.content));
                    self.newline();
                }
            }
            Node::Style(style) => self.emit_style_block(style, namespace),
            Node::Script(script) => {
                push_stream_line(&mut self.scripts, script.content.trim());
            }
            Node::Origin(origin) => self.emit_origin(origin),
            Node::Inherit(inherit)
                if matches!(inherit.kind, None | Some(DefKind::Element)) =>
            {
                if let Some(children) =
                    resolved_element_children(self.map, &inherit.base, namespace)
                {
                    self.emit_expanded(children, namespace);
                }
            }
            Node::Custom(custom) if custom.is_specialization => {
                if custom.kind == DefKind::Element {
                    if let Some(base) =
                        resolved_element_children(self.map, &custom.name, namespace)
                    {
                        let edited =
                            apply_element_edits(self.map, base, &custom.body, namespace);
                        self.emit_expanded(edited, namespace);
                    }
                }
                // Style specializations are merged into inline properties at
                // the enclosing element.
            }
            Node::VarCall(call) => {
                let value = value_string(self.map, &Value::VarCall(call.clone()), namespace);
                if !value.is_empty() {
                    self.write_indent();
                    let escaped = escape_html(&value);
                    self.body.push_str(&escaped);
                    self.newline();
                }
            }
            Node::Namespace(ns) => {
                let path = crate::symbols::qualify(namespace, &ns.name);
                self.emit_nodes(&ns.children, &path);
            }
            // Definitions and directives generate nothing.
            Node::Template(_)
            | Node::Custom(_)
            | Node::Import(_)
            | Node::Configuration(_)
            | Node::Except(_)
            | Node::Delete(_)
            | Node::Insert(_)
            | Node::Inherit(_)
            | Node::VarDef(_) => {}
        }
    }

    /// Expanded template/custom children: auto-attachment runs here because
    /// definition bodies were registered before the resolver's walk.
    fn emit_expanded(&mut self, children: Vec<Node>, namespace: &str) {
        for mut node in children {
            if let Node::Element(el) = &mut node {
                auto_attach(el);
            }
            self.emit_node(&node, namespace);
        }
    }

    fn emit_element(&mut self, el: &Element, namespace: &str, inline: bool) {
        let is_void = VOID_TAGS.contains(el.tag.as_str());

        if !inline {
            self.write_indent();
        }
        self.body.push('<');
        self.body.push_str(&el.tag);
        for (name, value) in &el.attributes {
            self.body.push(' ');
            self.body.push_str(name);
            if !value.is_empty() {
                self.body.push_str("=\"");
                self.body.push_str(&escape_html(value));
                self.body.push('"');
            }
        }

        // Inline style from local style blocks and element-level @Style uses.
        let props = inline_style_props(self.map, el, namespace);
        let style_attr: Vec<String> = props
            .iter()
            .filter(|(_, v)| !v.is_empty())
            .map(|(k, v)| format!("{}: {};", k, v))
            .collect();
        if !style_attr.is_empty() {
            self.body.push_str(" style=\"");
            self.body.push_str(&escape_html(&style_attr.join(" ")));
            self.body.push('"');
        }

        // Lift local style rules and scripts into their streams.
        for child in &el.children {
            match child {
                Node::Style(style) if style.scope == StyleScope::Local => {
                    self.lift_local_style(style, namespace);
                }
                Node::Script(script) if script.scope == ScriptScope::Local => {
                    push_stream_line(&mut self.scripts, script.content.trim());
                }
                _ => {}
            }
        }

        let visible: Vec<&Node> = el
            .children
            .iter()
            .filter(|child| is_visible_in_body(child))
            .collect();

        if is_void && visible.is_empty() {
            self.body.push_str(" />");
            if !inline {
                self.newline();
            }
            return;
        }
        self.body.push('>');

        if visible.is_empty() {
            self.close_tag(&el.tag, inline);
            return;
        }

        let render_inline = self.options.minify
            || !self.options.pretty_print
            || visible.iter().all(|n| is_inline_renderable(n));
        if render_inline {
            for child in &visible {
                self.emit_child_inline(child, namespace);
            }
            self.close_tag(&el.tag, inline);
            return;
        }

        self.newline();
        self.indent += 1;
        for child in &visible {
            self.emit_node(child, namespace);
        }
        self.indent -= 1;
        self.write_indent();
        self.close_tag(&el.tag, inline);
    }

    fn close_tag(&mut self, tag: &str, inline: bool) {
        self.body.push_str("</");
        self.body.push_str(tag);
        self.body.push('>');
        if !inline {
            self.newline();
        }
    }

    fn emit_child_inline(&mut self, child: &Node, namespace: &str) {
        match child {
            Node::Text(text) => {
                let escaped = escape_html(&text.content);
                self.body.push_str(&escaped);
            }
            Node::Element(el) => self.emit_element(el, namespace, true),
            Node::VarCall(call) => {
                let value = value_string(self.map, &Value::VarCall(call.clone()), namespace);
                let escaped = escape_html(&value);
                self.body.push_str(&escaped);
            }
            Node::Comment(comment) if comment.kind == CommentKind::Generator => {
                self.body
                    .push_str(&format!("<!-- {} -->", comment.content));
            }
            Node::Origin(origin) => self.emit_origin(origin),
            other => self.emit_node(other, namespace),
        }
    }

    /// Local rules lift into the head stylesheet; `&` was rewritten by the
    /// resolver. Generator comments inside style blocks become CSS comments.
    fn lift_local_style(&mut self, style: &StyleBlock, _namespace: &str) {
        for item in &style.items {
            if let Node::Comment(comment) = item {
                if comment.kind == CommentKind::Generator {
                    push_stream_line(&mut self.styles, &format!("/* {} */", comment.content));
                }
            }
        }
        for rule in &style.rules {
            push_stream_line(
                &mut self.styles,
                &format!("{} {{ {} }}", rule.selector, rule.body),
            );
        }
    }

    fn emit_style_block(&mut self, style: &StyleBlock, namespace: &str) {
        // Global style blocks: inherited/own declarations first, then rules.
        let props = {
            let mut local = style.clone();
            local.scope = StyleScope::Local;
            let el = Element {
                tag: String::new(),
                attributes: Vec::new(),
                children: vec![Node::Style(local)],
                loc: style.loc,
            };
            inline_style_props(self.map, &el, namespace)
        };
        for (name, value) in props.iter().filter(|(_, v)| !v.is_empty()) {
            push_stream_line(&mut self.styles, &format!("{}: {};", name, value));
        }
        for item in &style.items {
            if let Node::Comment(comment) = item {
                if comment.kind == CommentKind::Generator {
                    push_stream_line(&mut self.styles, &format!("/* {} */", comment.content));
                }
            }
        }
        for rule in &style.rules {
            if rule.selector.is_empty() {
                push_stream_line(&mut self.styles, &rule.body);
            } else {
                push_stream_line(
                    &mut self.styles,
                    &format!("{} {{ {} }}", rule.selector, rule.body),
                );
            }
        }
    }

    fn emit_origin(&mut self, origin: &Origin) {
        // A named definition only stores its block; output happens at
        // reference sites.
        if !origin.is_reference && origin.name.is_some() {
            return;
        }
        let mut kind = origin.kind.clone();
        if let OriginKind::Custom(alias) = &kind {
            if let Some(canonical) = self.map.resolve_origin_alias(alias) {
                kind = match canonical.as_str() {
                    "@Html" => OriginKind::Html,
                    "@Style" => OriginKind::Style,
                    "@JavaScript" => OriginKind::JavaScript,
                    other => OriginKind::Custom(other.trim_start_matches('@').to_string()),
                };
            }
        }
        let content = if origin.is_reference {
            match origin
                .name
                .as_ref()
                .and_then(|n| self.map.lookup_origin(&kind.key(), n))
            {
                Some(c) => c.to_string(),
                None => return,
            }
        } else {
            origin.content.clone()
        };
        let content = content.trim();
        if content.is_empty() {
            return;
        }
        match kind {
            OriginKind::Html | OriginKind::Custom(_) => {
                self.write_indent();
                self.body.push_str(content);
                self.newline();
            }
            OriginKind::Style => push_stream_line(&mut self.styles, content),
            OriginKind::JavaScript => push_stream_line(&mut self.scripts, content),
        }
    }

    // ───────────────────────────────────────────────────────────────────
    // Output assembly
    // ───────────────────────────────────────────────────────────────────

    fn assemble(self) -> String {
        let Generator {
            options,
            body,
            styles,
            scripts,
            ..
        } = self;

        if options.fragment_only {
            return body;
        }

        let mut out = String::new();
        let pretty = options.pretty_print && !options.minify;
        if pretty {
            out.push_str("<!DOCTYPE html>\n<html>\n<head>\n");
            out.push_str("    <meta charset=\"UTF-8\">\n");
            out.push_str(
                "    <meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n",
            );
            out.push_str("    <title>CHTL Generated Page</title>\n");
            if !styles.trim().is_empty() {
                out.push_str("    <style>\n");
                for line in styles.lines() {
                    if !line.is_empty() {
                        out.push_str("        ");
                        out.push_str(line);
                        out.push('\n');
                    }
                }
                out.push_str("    </style>\n");
            }
            out.push_str("</head>\n<body>\n");
            if options.debug {
                out.push_str("    <!-- chtlc debug build -->\n");
            }
            for line in body.lines() {
                if !line.is_empty() {
                    out.push_str("    ");
                    out.push_str(line);
                    out.push('\n');
                }
            }
            if !scripts.trim().is_empty() {
                out.push_str("    <script>\n");
                for line in scripts.lines() {
                    if !line.is_empty() {
                        out.push_str("        ");
                        out.push_str(line);
                        out.push('\n');
                    }
                }
                out.push_str("    </script>\n");
            }
            out.push_str("</body>\n</html>\n");
        } else {
            out.push_str("<!DOCTYPE html><html><head>");
            out.push_str("<meta charset=\"UTF-8\">");
            out.push_str(
                "<meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">",
            );
            out.push_str("<title>CHTL Generated Page</title>");
            if !styles.trim().is_empty() {
                out.push_str("<style>");
                out.push_str(&collapse_whitespace(&styles));
                out.push_str("</style>");
            }
            out.push_str("</head><body>");
            out.push_str(&collapse_whitespace(&body));
            if !scripts.trim().is_empty() {
                out.push_str("<script>");
                out.push_str(scripts.trim());
                out.push_str("</script>");
            }
            out.push_str("</body></html>");
        }
        out
    }

    fn write_indent(&mut self) {
        if !self.options.pretty_print || self.options.minify {
            return;
        }
        for _ in 0..self.indent {
            self.body.push_str("    ");
        }
    }

    fn newline(&mut self) {
        if self.options.pretty_print && !self.options.minify {
            self.body.push('\n');
        }
    }
}

/// Children that render into the body markup (local styles, scripts and
/// directives are diverted to the other streams or dropped).
fn is_visible_in_body(node: &Node) -> bool {
    match node {
        Node::Element(_) | Node::Text(_) | Node::VarCall(_) => true,
        Node::Comment(c) => c.kind == CommentKind::Generator,
        Node::Origin(origin) => {
            matches!(origin.kind, OriginKind::Html | OriginKind::Custom(_))
        }
        Node::Inherit(i) => matches!(i.kind, None | Some(DefKind::Element)),
        Node::Custom(c) => c.is_specialization && c.kind == DefKind::Element,
        _ => false,
    }
}

fn is_inline_renderable(node: &Node) -> bool {
    match node {
        Node::Text(_) | Node::VarCall(_) => true,
        Node::Element(el) => {
            INLINE_TAGS.contains(el.tag.as_str())
                && el
                    .children
                    .iter()
                    .filter(|c| is_visible_in_body(c))
                    .all(is_inline_renderable)
        }
        _ => false,
    }
}

fn push_stream_line(stream: &mut String, line: &str) {
    if line.is_empty() {
        return;
    }
    stream.push_str(line);
    stream.push('\n');
}

/// Minified emission: drop newlines and runs of indentation between tags.
fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for line in text.lines() {
        out.push_str(line.trim());
    }
    out
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
