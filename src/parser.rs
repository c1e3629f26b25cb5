//! Recursive-descent parser: token stream → `Document`.
//!
//! The parser keeps the syntactic-context stack and the scope stack from
//! `state.rs` balanced by construction: each production that consumes a `{`
//! pushes before its body loop and pops on every exit path. Error recovery
//! skips to a structural anchor (`}`, `;`, or a top-level keyword) and keeps
//! the AST built so far.

use crate::ast::*;
use crate::error::{DiagnosticKind, Diagnostics};
use crate::state::{ParserState, ScopeKind, ScopeStack, StateStack};
use crate::token::{BracketKw, SoftKw, SourceLocation, Token, TokenKind, TypeKw};

pub struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    states: StateStack,
    scopes: ScopeStack,
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a str, tokens: Vec<Token>) -> Self {
        Self {
            source,
            tokens,
            pos: 0,
            states: StateStack::new(),
            scopes: ScopeStack::new(),
        }
    }

    pub fn states(&self) -> &StateStack {
        &self.states
    }

    pub fn scopes(&self) -> &ScopeStack {
        &self.scopes
    }

    pub fn parse_document(&mut self, diags: &mut Diagnostics) -> Document {
        let mut document = Document::default();
        self.push_state(ParserState::Global, SourceLocation::default(), diags);
        while !self.at_end() {
            if let Some(node) = self.parse_top_level(diags) {
                document.children.push(node);
            }
        }
        self.pop_state();
        if !self.states.is_balanced() {
            if let Some(frame) = self.states.innermost() {
                diags.error(
                    DiagnosticKind::Syntactic,
                    format!("unclosed {:?} at end of input", frame.state),
                    frame.loc,
                );
            }
        }
        document
    }

    fn parse_top_level(&mut self, diags: &mut Diagnostics) -> Option<Node> {
        let tok = self.peek().clone();
        match tok.kind {
            TokenKind::CommentLine | TokenKind::CommentBlock | TokenKind::CommentGenerator => {
                Some(self.parse_comment())
            }
            TokenKind::Bracket(BracketKw::Template) => self.parse_template(diags),
            TokenKind::Bracket(BracketKw::Custom) => self.parse_custom(diags),
            TokenKind::Bracket(BracketKw::Origin) => self.parse_origin(diags),
            TokenKind::Bracket(BracketKw::Import) => self.parse_import(diags),
            TokenKind::Bracket(BracketKw::Namespace) => self.parse_namespace(diags),
            TokenKind::Bracket(BracketKw::Configuration) => self.parse_configuration(diags),
            TokenKind::Bracket(BracketKw::Info) | TokenKind::Bracket(BracketKw::Export) => {
                // Module metadata blocks carry nothing the generator uses.
                self.advance();
                self.skip_balanced_block(diags);
                None
            }
            TokenKind::Soft(SoftKw::Style) => self.parse_global_style(diags),
            TokenKind::Soft(SoftKw::Script) => self.parse_script(ScriptScope::Global, diags),
            TokenKind::Soft(SoftKw::Text) => self.parse_text_block(diags),
            TokenKind::Soft(SoftKw::Except) => Some(self.parse_except(diags)),
            TokenKind::StringDouble | TokenKind::StringSingle => {
                let tok = self.advance();
                Some(Node::Text(Text {
                    content: tok.text,
                    loc: tok.loc,
                }))
            }
            TokenKind::Identifier => self.parse_element(diags),
            TokenKind::Eof => {
                self.advance();
                None
            }
            _ => {
                diags.error(
                    DiagnosticKind::Syntactic,
                    format!("unexpected token '{}' at top level", tok.text),
                    tok.loc,
                );
                // Skip just the offending token; whatever follows may still
                // be a valid top-level production.
                self.advance();
                None
            }
        }
    }

    // ───────────────────────────────────────────────────────────────────
    // Elements
    // ───────────────────────────────────────────────────────────────────

    fn parse_element(&mut self, diags: &mut Diagnostics) -> Option<Node> {
        let name = self.advance();
        let mut element = Element::new(name.text.clone(), name.loc);

        if !self.match_kind(TokenKind::LBrace) {
            // `br;` — an element with no body.
            self.match_kind(TokenKind::Semicolon);
            return Some(Node::Element(element));
        }
        self.push_state(ParserState::InElement, name.loc, diags);
        self.scopes.push(name.text, ScopeKind::Element, name.loc);

        while !self.at_end() && !self.check(TokenKind::RBrace) {
            let tok = self.peek().clone();
            match tok.kind {
                TokenKind::CommentLine
                | TokenKind::CommentBlock
                | TokenKind::CommentGenerator => {
                    let node = self.parse_comment();
                    element.children.push(node);
                }
                TokenKind::Soft(SoftKw::Text) => {
                    if let Some(node) = self.parse_text_block(diags) {
                        element.children.push(node);
                    }
                }
                TokenKind::Soft(SoftKw::Style) => {
                    if let Some(node) = self.parse_local_style(diags) {
                        element.children.push(node);
                    }
                }
                TokenKind::Soft(SoftKw::Script) => {
                    if let Some(node) = self.parse_script(ScriptScope::Local, diags) {
                        element.children.push(node);
                    }
                }
                TokenKind::Soft(SoftKw::Except) => {
                    let node = self.parse_except(diags);
                    element.children.push(node);
                }
                TokenKind::Soft(SoftKw::Inherit) => {
                    if let Some(node) = self.parse_explicit_inherit(diags) {
                        element.children.push(node);
                    }
                }
                TokenKind::Soft(SoftKw::Delete) => {
                    let node = self.parse_delete(diags);
                    element.children.push(node);
                }
                TokenKind::Soft(SoftKw::Insert) => {
                    if let Some(node) = self.parse_insert(diags) {
                        element.children.push(node);
                    }
                }
                TokenKind::Bracket(BracketKw::Origin) => {
                    if let Some(node) = self.parse_origin(diags) {
                        element.children.push(node);
                    }
                }
                TokenKind::Type(TypeKw::Style) => {
                    if let Some(node) = self.parse_use_or_specialization(DefKind::Style, diags) {
                        element.children.push(node);
                    }
                }
                TokenKind::Type(TypeKw::Element) => {
                    if let Some(node) = self.parse_use_or_specialization(DefKind::Element, diags) {
                        element.children.push(node);
                    }
                }
                TokenKind::Type(TypeKw::Var) => {
                    if let Some(node) = self.parse_var_call(diags) {
                        element.children.push(node);
                    }
                }
                TokenKind::StringDouble | TokenKind::StringSingle => {
                    let tok = self.advance();
                    element.children.push(Node::Text(Text {
                        content: tok.text,
                        loc: tok.loc,
                    }));
                }
                TokenKind::Identifier => {
                    // Attribute, child element, or variable call — one token
                    // of lookahead decides; rewind is implicit because
                    // nothing is consumed until the decision is made.
                    match self.peek_at(1).kind {
                        TokenKind::Colon | TokenKind::Equals => {
                            self.parse_attribute(&mut element, diags);
                        }
                        TokenKind::LParen => {
                            if let Some(node) = self.parse_bare_var_call(diags) {
                                element.children.push(node);
                            }
                        }
                        _ => {
                            if let Some(node) = self.parse_element(diags) {
                                element.children.push(node);
                            }
                        }
                    }
                }
                _ => {
                    diags.error(
                        DiagnosticKind::Syntactic,
                        format!("unexpected token '{}' in element body", tok.text),
                        tok.loc,
                    );
                    self.advance();
                }
            }
        }

        self.scopes.pop();
        self.pop_state();
        self.expect_closing_brace("element", name.loc, diags);
        Some(Node::Element(element))
    }

    fn parse_attribute(&mut self, element: &mut Element, diags: &mut Diagnostics) {
        let name = self.advance();
        self.match_separator();
        let value = self.parse_literal(diags);
        element.attributes.push((name.text, value));
        self.match_kind(TokenKind::Semicolon);
    }

    // ───────────────────────────────────────────────────────────────────
    // Text blocks
    // ───────────────────────────────────────────────────────────────────

    fn parse_text_block(&mut self, diags: &mut Diagnostics) -> Option<Node> {
        let kw = self.advance();
        if !self.match_kind(TokenKind::LBrace) {
            diags.error(DiagnosticKind::Syntactic, "expected '{' after 'text'", kw.loc);
            return None;
        }
        self.push_state(ParserState::InTextNode, kw.loc, diags);

        let mut content = String::new();
        let mut prev_wordlike = false;
        let mut depth = 0usize;
        while !self.at_end() {
            let tok = self.peek().clone();
            match tok.kind {
                TokenKind::LBrace => depth += 1,
                TokenKind::RBrace => {
                    if depth == 0 {
                        break;
                    }
                    depth -= 1;
                }
                _ => {}
            }
            self.advance();
            let wordlike = is_wordlike(tok.kind);
            if wordlike && prev_wordlike {
                content.push(' ');
            }
            content.push_str(&tok.text);
            prev_wordlike = wordlike;
        }
        self.pop_state();
        self.expect_closing_brace("text block", kw.loc, diags);
        Some(Node::Text(Text {
            content,
            loc: kw.loc,
        }))
    }

    // ───────────────────────────────────────────────────────────────────
    // Style blocks
    // ───────────────────────────────────────────────────────────────────

    fn parse_local_style(&mut self, diags: &mut Diagnostics) -> Option<Node> {
        let kw = self.advance();
        if !self.match_kind(TokenKind::LBrace) {
            diags.error(DiagnosticKind::Syntactic, "expected '{' after 'style'", kw.loc);
            return None;
        }
        self.push_state(ParserState::InLocalStyle, kw.loc, diags);
        let mut block = StyleBlock::new(StyleScope::Local, kw.loc);
        self.parse_style_entries(&mut block, diags);
        self.pop_state();
        self.expect_closing_brace("style block", kw.loc, diags);
        Some(Node::Style(block))
    }

    fn parse_global_style(&mut self, diags: &mut Diagnostics) -> Option<Node> {
        let kw = self.advance();
        if !self.match_kind(TokenKind::LBrace) {
            diags.error(DiagnosticKind::Syntactic, "expected '{' after 'style'", kw.loc);
            return None;
        }
        self.push_state(ParserState::InGlobalStyle, kw.loc, diags);
        let mut block = StyleBlock::new(StyleScope::Global, kw.loc);
        while !self.at_end() && !self.check(TokenKind::RBrace) {
            if self.check(TokenKind::RawCss) {
                let raw = self.advance();
                for (selector, body) in split_css_rules(&raw.text) {
                    block.rules.push(StyleRule {
                        selector,
                        body,
                        loc: raw.loc,
                    });
                }
            } else {
                // The scanner only leaves tokens here when the style block
                // was nested somewhere it could not classify; fall back to
                // the local grammar.
                self.parse_style_entries(&mut block, diags);
                break;
            }
        }
        self.pop_state();
        self.expect_closing_brace("style block", kw.loc, diags);
        Some(Node::Style(block))
    }

    /// Shared body grammar for local styles, `[Template] @Style` and
    /// `[Custom] @Style` bodies.
    fn parse_style_entries(&mut self, block: &mut StyleBlock, diags: &mut Diagnostics) {
        while !self.at_end() && !self.check(TokenKind::RBrace) {
            let tok = self.peek().clone();
            match tok.kind {
                TokenKind::CommentLine
                | TokenKind::CommentBlock
                | TokenKind::CommentGenerator => {
                    let node = self.parse_comment();
                    block.items.push(node);
                }
                TokenKind::Soft(SoftKw::Inherit) => {
                    if let Some(node) = self.parse_explicit_inherit(diags) {
                        block.items.push(node);
                    }
                }
                TokenKind::Soft(SoftKw::Delete) => {
                    let node = self.parse_delete(diags);
                    block.items.push(node);
                }
                TokenKind::Type(TypeKw::Style) => {
                    if let Some(node) = self.parse_use_or_specialization(DefKind::Style, diags) {
                        block.items.push(node);
                    }
                }
                TokenKind::Type(TypeKw::Var) => {
                    if let Some(node) = self.parse_var_call(diags) {
                        block.items.push(node);
                    }
                }
                TokenKind::Identifier if self.is_declaration_ahead() => {
                    self.parse_style_declaration(block, diags);
                }
                TokenKind::Identifier
                | TokenKind::Dot
                | TokenKind::Ampersand
                | TokenKind::Colon
                | TokenKind::UnquotedLiteral
                | TokenKind::LBracket => {
                    if let Some(rule) = self.parse_style_rule(diags) {
                        block.rules.push(rule);
                    }
                }
                _ => {
                    diags.error(
                        DiagnosticKind::Syntactic,
                        format!("unexpected token '{}' in style block", tok.text),
                        tok.loc,
                    );
                    self.advance();
                }
            }
        }
    }

    /// `name: value;`, `name = value;`, or the no-value form `name, other;`.
    fn parse_style_declaration(&mut self, block: &mut StyleBlock, diags: &mut Diagnostics) {
        let name = self.advance();
        if self.match_separator() {
            let value = self.parse_style_value(diags);
            block.props.push(StyleProp {
                name: name.text,
                value,
                loc: name.loc,
            });
            self.match_kind(TokenKind::Semicolon);
            return;
        }
        // No-value properties: `width, height;` — values are supplied at the
        // specialization site.
        block.no_value_props.push(name.text);
        while self.match_kind(TokenKind::Comma) {
            if self.check(TokenKind::Identifier) {
                let next = self.advance();
                block.no_value_props.push(next.text);
            }
        }
        self.match_kind(TokenKind::Semicolon);
    }

    fn parse_style_value(&mut self, diags: &mut Diagnostics) -> Value {
        // `Group(name)` / `Group(name = "v")` as the whole value.
        if self.check(TokenKind::Identifier) && self.peek_at(1).kind == TokenKind::LParen {
            let saved = self.pos;
            if let Some(call) = self.try_parse_group_call(diags) {
                let next = self.peek().kind;
                if matches!(
                    next,
                    TokenKind::Semicolon | TokenKind::RBrace | TokenKind::Comma | TokenKind::Eof
                ) {
                    return Value::VarCall(call);
                }
            }
            self.pos = saved;
        }

        let mut text = String::new();
        let mut prev_wordlike = false;
        while !self.at_end()
            && !self.check(TokenKind::Semicolon)
            && !self.check(TokenKind::RBrace)
        {
            let tok = self.advance();
            let wordlike = is_wordlike(tok.kind);
            if wordlike && prev_wordlike {
                text.push(' ');
            }
            match tok.kind {
                TokenKind::StringDouble | TokenKind::StringSingle => text.push_str(&tok.text),
                _ => text.push_str(&tok.text),
            }
            prev_wordlike = wordlike;
        }
        Value::Literal(text)
    }

    /// `Group(name)` with optional `= literal` override. Returns `None`
    /// without consuming past a malformed call; the caller rewinds.
    fn try_parse_group_call(&mut self, diags: &mut Diagnostics) -> Option<VarCall> {
        let group = self.advance();
        if !self.match_kind(TokenKind::LParen) {
            return None;
        }
        if !self.check(TokenKind::Identifier) {
            return None;
        }
        let name = self.advance();
        let mut override_value = None;
        if self.match_kind(TokenKind::Equals) || self.match_kind(TokenKind::Colon) {
            override_value = Some(self.parse_literal(diags));
        }
        if !self.match_kind(TokenKind::RParen) {
            return None;
        }
        Some(VarCall {
            group: group.text,
            name: name.text,
            override_value,
            loc: group.loc,
        })
    }

    fn parse_style_rule(&mut self, diags: &mut Diagnostics) -> Option<StyleRule> {
        let start = self.peek().loc;
        let mut selector = String::new();
        let mut prev_wordlike = false;
        while !self.at_end()
            && !self.check(TokenKind::LBrace)
            && !self.check(TokenKind::RBrace)
        {
            let tok = self.advance();
            let wordlike = is_wordlike(tok.kind);
            if wordlike && prev_wordlike {
                selector.push(' ');
            }
            selector.push_str(&tok.text);
            prev_wordlike = wordlike;
        }
        if !self.check(TokenKind::LBrace) {
            diags.error(
                DiagnosticKind::Syntactic,
                format!("expected '{{' after selector '{}'", selector),
                start,
            );
            return None;
        }
        let lbrace = self.advance();
        self.push_state(ParserState::InStyleRule, lbrace.loc, diags);
        let body = self.consume_raw_body(&lbrace, diags);
        self.pop_state();
        Some(StyleRule {
            selector,
            body,
            loc: start,
        })
    }

    // ───────────────────────────────────────────────────────────────────
    // Scripts
    // ───────────────────────────────────────────────────────────────────

    fn parse_script(&mut self, scope: ScriptScope, diags: &mut Diagnostics) -> Option<Node> {
        let kw = self.advance();
        if !self.match_kind(TokenKind::LBrace) {
            diags.error(DiagnosticKind::Syntactic, "expected '{' after 'script'", kw.loc);
            return None;
        }
        let state = match scope {
            ScriptScope::Local => ParserState::InLocalScript,
            ScriptScope::Global => ParserState::InGlobalScript,
        };
        let lbrace_end = self.tokens[self.pos - 1].loc.end;
        self.push_state(state, kw.loc, diags);

        let mut contains_chtljs = false;
        let mut depth = 0usize;
        let mut body_end = lbrace_end;
        while !self.at_end() {
            let tok = self.peek().clone();
            match tok.kind {
                TokenKind::EnhancedSelector => contains_chtljs = true,
                TokenKind::LBrace => depth += 1,
                TokenKind::RBrace => {
                    if depth == 0 {
                        body_end = tok.loc.offset;
                        break;
                    }
                    depth -= 1;
                }
                _ => {}
            }
            self.advance();
        }
        let content = self.source[lbrace_end..body_end].to_string();
        self.pop_state();
        self.expect_closing_brace("script block", kw.loc, diags);
        Some(Node::Script(ScriptBlock {
            scope,
            content,
            contains_chtljs,
            loc: kw.loc,
        }))
    }

    // ───────────────────────────────────────────────────────────────────
    // Templates and customs
    // ───────────────────────────────────────────────────────────────────

    fn parse_template(&mut self, diags: &mut Diagnostics) -> Option<Node> {
        let kw = self.advance();
        let kind = match self.parse_def_kind(diags, "[Template]") {
            Some(k) => k,
            None => {
                self.synchronize();
                return None;
            }
        };
        let name = match self.expect_identifier("template name", diags) {
            Some(n) => n,
            None => {
                self.synchronize();
                return None;
            }
        };

        let mut params = Vec::new();
        if self.match_kind(TokenKind::LParen) {
            while !self.at_end() && !self.check(TokenKind::RParen) {
                if let Some(p) = self.expect_identifier("parameter name", diags) {
                    let default = if self.match_kind(TokenKind::Equals) {
                        Some(self.parse_literal(diags))
                    } else {
                        None
                    };
                    params.push(Param {
                        name: p.text,
                        default,
                    });
                } else {
                    break;
                }
                if !self.check(TokenKind::RParen) && !self.match_kind(TokenKind::Comma) {
                    break;
                }
            }
            self.match_kind(TokenKind::RParen);
        }

        if !self.match_kind(TokenKind::LBrace) {
            diags.error(
                DiagnosticKind::Syntactic,
                "expected '{' after template declaration",
                kw.loc,
            );
            return None;
        }
        let state = match kind {
            DefKind::Style => ParserState::InTemplateStyle,
            DefKind::Element => ParserState::InTemplateElement,
            DefKind::Var => ParserState::InTemplateVar,
        };
        self.push_state(state, kw.loc, diags);
        self.scopes.push(name.text.clone(), ScopeKind::Template, name.loc);
        let body = self.parse_definition_body(kind, diags);
        self.scopes.pop();
        self.pop_state();
        self.expect_closing_brace("template", kw.loc, diags);
        Some(Node::Template(TemplateDef {
            kind,
            name: name.text,
            params,
            body,
            loc: kw.loc,
        }))
    }

    fn parse_custom(&mut self, diags: &mut Diagnostics) -> Option<Node> {
        let kw = self.advance();
        let kind = match self.parse_def_kind(diags, "[Custom]") {
            Some(k) => k,
            None => {
                self.synchronize();
                return None;
            }
        };
        let name = match self.expect_identifier("custom name", diags) {
            Some(n) => n,
            None => {
                self.synchronize();
                return None;
            }
        };
        if !self.match_kind(TokenKind::LBrace) {
            diags.error(
                DiagnosticKind::Syntactic,
                "expected '{' after custom declaration",
                kw.loc,
            );
            return None;
        }
        let state = match kind {
            DefKind::Style => ParserState::InCustomStyle,
            DefKind::Element => ParserState::InCustomElement,
            DefKind::Var => ParserState::InCustomVar,
        };
        self.push_state(state, kw.loc, diags);
        self.scopes.push(name.text.clone(), ScopeKind::Custom, name.loc);
        let body = self.parse_definition_body(kind, diags);
        let has_no_value_props = body.iter().any(|n| match n {
            Node::Style(s) => !s.no_value_props.is_empty(),
            _ => false,
        });
        self.scopes.pop();
        self.pop_state();
        self.expect_closing_brace("custom", kw.loc, diags);
        Some(Node::Custom(CustomDef {
            kind,
            name: name.text,
            body,
            is_specialization: false,
            has_no_value_props,
            loc: kw.loc,
        }))
    }

    /// Body of a `[Template]`/`[Custom]` definition or a specialization use,
    /// dispatched on the definition kind.
    fn parse_definition_body(&mut self, kind: DefKind, diags: &mut Diagnostics) -> Vec<Node> {
        let mut body = Vec::new();
        match kind {
            DefKind::Style => {
                let loc = self.peek().loc;
                let mut block = StyleBlock::new(StyleScope::Local, loc);
                self.parse_style_entries(&mut block, diags);
                // Hoist inherits/uses/deletes so specialization edits stay
                // visible as body items.
                body.append(&mut block.items);
                if !block.props.is_empty() || !block.no_value_props.is_empty() {
                    body.push(Node::Style(block));
                }
            }
            DefKind::Element => {
                while !self.at_end() && !self.check(TokenKind::RBrace) {
                    let tok = self.peek().clone();
                    match tok.kind {
                        TokenKind::Soft(SoftKw::Delete) => {
                            let node = self.parse_delete(diags);
                            body.push(node);
                        }
                        TokenKind::Soft(SoftKw::Insert) => {
                            if let Some(node) = self.parse_insert(diags) {
                                body.push(node);
                            }
                        }
                        TokenKind::Soft(SoftKw::Inherit) => {
                            if let Some(node) = self.parse_explicit_inherit(diags) {
                                body.push(node);
                            }
                        }
                        TokenKind::Type(TypeKw::Element) => {
                            if let Some(node) =
                                self.parse_use_or_specialization(DefKind::Element, diags)
                            {
                                body.push(node);
                            }
                        }
                        _ => {
                            if let Some(node) = self.parse_top_level(diags) {
                                body.push(node);
                            }
                        }
                    }
                }
            }
            DefKind::Var => {
                while !self.at_end() && !self.check(TokenKind::RBrace) {
                    let tok = self.peek().clone();
                    match tok.kind {
                        TokenKind::Identifier
                            if matches!(
                                self.peek_at(1).kind,
                                TokenKind::Colon | TokenKind::Equals
                            ) =>
                        {
                            let name = self.advance();
                            self.match_separator();
                            let value = self.parse_literal(diags);
                            self.match_kind(TokenKind::Semicolon);
                            body.push(Node::VarDef(VarDef {
                                name: name.text,
                                value,
                                loc: name.loc,
                            }));
                        }
                        TokenKind::Type(TypeKw::Var) => {
                            if let Some(node) = self.parse_var_use(diags) {
                                body.push(node);
                            }
                        }
                        TokenKind::Soft(SoftKw::Inherit) => {
                            if let Some(node) = self.parse_explicit_inherit(diags) {
                                body.push(node);
                            }
                        }
                        TokenKind::Soft(SoftKw::Delete) => {
                            let node = self.parse_delete(diags);
                            body.push(node);
                        }
                        TokenKind::CommentLine
                        | TokenKind::CommentBlock
                        | TokenKind::CommentGenerator => {
                            let node = self.parse_comment();
                            body.push(node);
                        }
                        _ => {
                            diags.error(
                                DiagnosticKind::Syntactic,
                                format!("unexpected token '{}' in variable group", tok.text),
                                tok.loc,
                            );
                            self.advance();
                        }
                    }
                }
            }
        }
        body
    }

    /// `@Style Name;` plain use / inheritance, or `@Style Name { … }`
    /// specialization with delete/insert/override edits.
    fn parse_use_or_specialization(
        &mut self,
        kind: DefKind,
        diags: &mut Diagnostics,
    ) -> Option<Node> {
        let type_tok = self.advance();
        let name = self.parse_qualified_name(diags)?;

        // Call-site arguments for parameterised templates. A var call is
        // never routed here: `Group(name)` has no type keyword in front.
        let mut args = Vec::new();
        if self.match_kind(TokenKind::LParen) {
            while !self.at_end() && !self.check(TokenKind::RParen) {
                args.push(self.parse_literal(diags));
                if !self.match_kind(TokenKind::Comma) {
                    break;
                }
            }
            self.match_kind(TokenKind::RParen);
        }

        if self.match_kind(TokenKind::LBrace) {
            self.push_state(ParserState::InSpecialization, type_tok.loc, diags);
            self.scopes
                .push(name.clone(), ScopeKind::Specialization, type_tok.loc);
            let body = self.parse_definition_body(kind, diags);
            self.scopes.pop();
            self.pop_state();
            self.expect_closing_brace("specialization", type_tok.loc, diags);
            return Some(Node::Custom(CustomDef {
                kind,
                name,
                body,
                is_specialization: true,
                has_no_value_props: false,
                loc: type_tok.loc,
            }));
        }

        self.match_kind(TokenKind::Semicolon);
        Some(Node::Inherit(Inherit {
            base: name,
            kind: Some(kind),
            explicit: false,
            args,
            loc: type_tok.loc,
        }))
    }

    /// `inherit @Kind Name;`
    fn parse_explicit_inherit(&mut self, diags: &mut Diagnostics) -> Option<Node> {
        let kw = self.advance();
        let kind = match self.peek().kind {
            TokenKind::Type(TypeKw::Style) => {
                self.advance();
                Some(DefKind::Style)
            }
            TokenKind::Type(TypeKw::Element) => {
                self.advance();
                Some(DefKind::Element)
            }
            TokenKind::Type(TypeKw::Var) => {
                self.advance();
                Some(DefKind::Var)
            }
            _ => None,
        };
        let name = self.parse_qualified_name(diags)?;
        self.match_kind(TokenKind::Semicolon);
        Some(Node::Inherit(Inherit {
            base: name,
            kind,
            explicit: true,
            args: Vec::new(),
            loc: kw.loc,
        }))
    }

    /// `@Var Group(name)` call, or `@Var Base;` inheritance inside a var
    /// group body.
    fn parse_var_use(&mut self, diags: &mut Diagnostics) -> Option<Node> {
        if self.peek_at(2).kind == TokenKind::LParen {
            return self.parse_var_call(diags);
        }
        let type_tok = self.advance();
        let name = self.parse_qualified_name(diags)?;
        self.match_kind(TokenKind::Semicolon);
        Some(Node::Inherit(Inherit {
            base: name,
            kind: Some(DefKind::Var),
            explicit: false,
            args: Vec::new(),
            loc: type_tok.loc,
        }))
    }

    /// `@Var Group(name)` / `@Var Group(name = "override")`.
    fn parse_var_call(&mut self, diags: &mut Diagnostics) -> Option<Node> {
        let type_tok = self.advance();
        if !self.check(TokenKind::Identifier) {
            diags.error(
                DiagnosticKind::Syntactic,
                "expected variable group name after '@Var'",
                type_tok.loc,
            );
            return None;
        }
        if self.peek_at(1).kind != TokenKind::LParen {
            // `@Var Base;` — group inheritance handled by parse_var_use;
            // reaching here means a bare reference.
            let name = self.parse_qualified_name(diags)?;
            self.match_kind(TokenKind::Semicolon);
            return Some(Node::Inherit(Inherit {
                base: name,
                kind: Some(DefKind::Var),
                explicit: false,
                args: Vec::new(),
                loc: type_tok.loc,
            }));
        }
        let call = self.try_parse_group_call(diags)?;
        self.match_kind(TokenKind::Semicolon);
        Some(Node::VarCall(call))
    }

    /// `Group(name)` without the `@Var` prefix, in element bodies.
    fn parse_bare_var_call(&mut self, diags: &mut Diagnostics) -> Option<Node> {
        let saved = self.pos;
        if let Some(call) = self.try_parse_group_call(diags) {
            self.match_kind(TokenKind::Semicolon);
            return Some(Node::VarCall(call));
        }
        self.pos = saved;
        let tok = self.advance();
        diags.error(
            DiagnosticKind::Syntactic,
            format!("malformed variable call at '{}'", tok.text),
            tok.loc,
        );
        self.synchronize();
        None
    }

    // ───────────────────────────────────────────────────────────────────
    // delete / insert
    // ───────────────────────────────────────────────────────────────────

    fn parse_delete(&mut self, diags: &mut Diagnostics) -> Node {
        let kw = self.advance();
        let mut targets = Vec::new();
        loop {
            match self.peek().kind {
                TokenKind::Type(TypeKw::Style)
                | TokenKind::Type(TypeKw::Element)
                | TokenKind::Type(TypeKw::Var) => {
                    self.advance();
                    if let Some(name) = self.parse_qualified_name(diags) {
                        targets.push(DeleteTarget {
                            kind: DeleteKind::Inheritance,
                            name,
                            index: None,
                        });
                    }
                }
                TokenKind::Identifier => {
                    let name = self.advance();
                    let mut index = None;
                    let mut kind = DeleteKind::Precise;
                    if self.match_kind(TokenKind::LBracket) {
                        if self.check(TokenKind::Number) {
                            let num = self.advance();
                            index = num.text.parse::<usize>().ok();
                            kind = DeleteKind::Element;
                        }
                        self.match_kind(TokenKind::RBracket);
                    }
                    targets.push(DeleteTarget {
                        kind,
                        name: name.text,
                        index,
                    });
                }
                _ => {
                    diags.error(
                        DiagnosticKind::Syntactic,
                        "expected delete target",
                        self.peek().loc,
                    );
                    break;
                }
            }
            if !self.match_kind(TokenKind::Comma) {
                break;
            }
        }
        self.match_kind(TokenKind::Semicolon);
        Node::Delete(Delete {
            targets,
            loc: kw.loc,
        })
    }

    fn parse_insert(&mut self, diags: &mut Diagnostics) -> Option<Node> {
        let kw = self.advance();
        let mut target = None;
        let position = match self.peek().kind {
            TokenKind::Soft(SoftKw::Before) => {
                self.advance();
                target = self.parse_insert_target(diags);
                InsertPos::Before
            }
            TokenKind::Soft(SoftKw::After) => {
                self.advance();
                target = self.parse_insert_target(diags);
                InsertPos::After
            }
            TokenKind::Soft(SoftKw::Replace) => {
                self.advance();
                target = self.parse_insert_target(diags);
                InsertPos::Replace
            }
            TokenKind::Soft(SoftKw::AtTop) => {
                self.advance();
                InsertPos::AtTop
            }
            TokenKind::Soft(SoftKw::AtBottom) => {
                self.advance();
                InsertPos::AtBottom
            }
            TokenKind::Identifier if self.peek().text == "at" => {
                self.advance();
                if self.check(TokenKind::Number) {
                    let num = self.advance();
                    InsertPos::AtIndex(num.text.parse::<usize>().unwrap_or(0))
                } else {
                    diags.error(
                        DiagnosticKind::Syntactic,
                        "expected index after 'at'",
                        kw.loc,
                    );
                    InsertPos::AtBottom
                }
            }
            _ => {
                diags.error(
                    DiagnosticKind::Syntactic,
                    "expected insert position (before/after/replace/at top/at bottom/at N)",
                    self.peek().loc,
                );
                InsertPos::AtBottom
            }
        };

        if !self.match_kind(TokenKind::LBrace) {
            diags.error(DiagnosticKind::Syntactic, "expected '{' after insert", kw.loc);
            return None;
        }
        self.push_state(ParserState::InSpecialization, kw.loc, diags);
        let mut children = Vec::new();
        while !self.at_end() && !self.check(TokenKind::RBrace) {
            if let Some(node) = self.parse_top_level(diags) {
                children.push(node);
            }
        }
        self.pop_state();
        self.expect_closing_brace("insert block", kw.loc, diags);
        Some(Node::Insert(Insert {
            position,
            target,
            children,
            loc: kw.loc,
        }))
    }

    fn parse_insert_target(
        &mut self,
        diags: &mut Diagnostics,
    ) -> Option<(String, Option<usize>)> {
        if !self.check(TokenKind::Identifier) {
            diags.error(
                DiagnosticKind::Syntactic,
                "expected insert target",
                self.peek().loc,
            );
            return None;
        }
        let name = self.advance();
        let mut index = None;
        if self.match_kind(TokenKind::LBracket) {
            if self.check(TokenKind::Number) {
                let num = self.advance();
                index = num.text.parse::<usize>().ok();
            }
            self.match_kind(TokenKind::RBracket);
        }
        Some((name.text, index))
    }

    // ───────────────────────────────────────────────────────────────────
    // Origins
    // ───────────────────────────────────────────────────────────────────

    fn parse_origin(&mut self, diags: &mut Diagnostics) -> Option<Node> {
        let kw = self.advance();
        let kind = match self.peek().kind {
            TokenKind::Type(TypeKw::Html) => {
                self.advance();
                OriginKind::Html
            }
            TokenKind::Type(TypeKw::Style) => {
                self.advance();
                OriginKind::Style
            }
            TokenKind::Type(TypeKw::JavaScript) => {
                self.advance();
                OriginKind::JavaScript
            }
            TokenKind::Identifier if self.peek().text.starts_with('@') => {
                let tok = self.advance();
                OriginKind::Custom(tok.text.trim_start_matches('@').to_string())
            }
            _ => {
                diags.error(
                    DiagnosticKind::Syntactic,
                    "expected origin type after '[Origin]'",
                    kw.loc,
                );
                self.synchronize();
                return None;
            }
        };
        let name = if self.check(TokenKind::Identifier) {
            Some(self.advance().text)
        } else {
            None
        };

        if !self.check(TokenKind::LBrace) {
            // `[Origin] @Html box;` — reference to a previously stored block.
            self.match_kind(TokenKind::Semicolon);
            if name.is_none() {
                diags.error(
                    DiagnosticKind::Syntactic,
                    "origin reference requires a name",
                    kw.loc,
                );
            }
            return Some(Node::Origin(Origin {
                kind,
                name,
                content: String::new(),
                is_reference: true,
                loc: kw.loc,
            }));
        }

        let lbrace = self.advance();
        let state = match kind {
            OriginKind::Html => ParserState::InOriginHtml,
            OriginKind::Style => ParserState::InOriginStyle,
            OriginKind::JavaScript => ParserState::InOriginScript,
            OriginKind::Custom(_) => ParserState::InOriginCustom,
        };
        self.push_state(state, kw.loc, diags);
        let content = self.consume_raw_body(&lbrace, diags);
        self.pop_state();
        Some(Node::Origin(Origin {
            kind,
            name,
            content,
            is_reference: false,
            loc: kw.loc,
        }))
    }

    // ───────────────────────────────────────────────────────────────────
    // Imports, namespaces, configuration, except
    // ───────────────────────────────────────────────────────────────────

    fn parse_import(&mut self, diags: &mut Diagnostics) -> Option<Node> {
        let kw = self.advance();
        let kind = match self.peek().kind {
            TokenKind::Type(TypeKw::Style) => {
                self.advance();
                ImportKind::Style
            }
            TokenKind::Type(TypeKw::Element) => {
                self.advance();
                ImportKind::Element
            }
            TokenKind::Type(TypeKw::Var) => {
                self.advance();
                ImportKind::Var
            }
            TokenKind::Type(TypeKw::Html) => {
                self.advance();
                ImportKind::Html
            }
            TokenKind::Type(TypeKw::JavaScript) => {
                self.advance();
                ImportKind::JavaScript
            }
            TokenKind::Type(TypeKw::Chtl) => {
                self.advance();
                ImportKind::Chtl
            }
            TokenKind::Type(TypeKw::CJmod) => {
                self.advance();
                ImportKind::CJmod
            }
            TokenKind::Type(TypeKw::Config) => {
                self.advance();
                ImportKind::Config
            }
            _ => ImportKind::Auto,
        };

        let mut items = Vec::new();
        while self.check(TokenKind::Identifier) {
            items.push(self.advance().text);
            if !self.match_kind(TokenKind::Comma) {
                break;
            }
        }

        if !self.match_kind(TokenKind::Soft(SoftKw::From)) {
            diags.error(
                DiagnosticKind::Syntactic,
                "expected 'from' in import statement",
                kw.loc,
            );
            self.synchronize();
            return None;
        }

        let path = self.parse_import_path(diags);
        let alias = if self.match_kind(TokenKind::Soft(SoftKw::As)) {
            self.expect_identifier("alias after 'as'", diags)
                .map(|t| t.text)
        } else {
            None
        };

        // Optional `{ item, item }` selection block.
        if self.match_kind(TokenKind::LBrace) {
            self.push_state(ParserState::InImport, kw.loc, diags);
            while !self.at_end() && !self.check(TokenKind::RBrace) {
                if self.check(TokenKind::Identifier) {
                    items.push(self.advance().text);
                    self.match_kind(TokenKind::Comma);
                } else {
                    self.advance();
                }
            }
            self.pop_state();
            self.expect_closing_brace("import block", kw.loc, diags);
        }
        self.match_kind(TokenKind::Semicolon);

        Some(Node::Import(Import {
            kind,
            path,
            alias,
            items,
            loc: kw.loc,
        }))
    }

    fn parse_import_path(&mut self, diags: &mut Diagnostics) -> String {
        if self.check(TokenKind::StringDouble) || self.check(TokenKind::StringSingle) {
            return self.advance().text;
        }
        let mut path = String::new();
        loop {
            match self.peek().kind {
                TokenKind::Identifier | TokenKind::UnquotedLiteral | TokenKind::Number => {
                    path.push_str(&self.advance().text);
                }
                TokenKind::Dot => {
                    self.advance();
                    path.push('.');
                }
                _ => break,
            }
        }
        if path.is_empty() {
            diags.error(
                DiagnosticKind::Syntactic,
                "expected import path",
                self.peek().loc,
            );
        }
        path
    }

    fn parse_namespace(&mut self, diags: &mut Diagnostics) -> Option<Node> {
        let kw = self.advance();
        let name = match self.parse_qualified_name(diags) {
            Some(n) => n,
            None => {
                self.synchronize();
                return None;
            }
        };
        let from = if self.match_kind(TokenKind::Soft(SoftKw::From)) {
            Some(self.parse_import_path(diags))
        } else {
            None
        };
        if !self.match_kind(TokenKind::LBrace) {
            // Namespace declaration without a body is a pure alias record.
            self.match_kind(TokenKind::Semicolon);
            return Some(Node::Namespace(NamespaceDef {
                name,
                from,
                children: Vec::new(),
                loc: kw.loc,
            }));
        }
        self.push_state(ParserState::InNamespace, kw.loc, diags);
        self.scopes.push(name.clone(), ScopeKind::Namespace, kw.loc);
        let mut children = Vec::new();
        while !self.at_end() && !self.check(TokenKind::RBrace) {
            if let Some(node) = self.parse_top_level(diags) {
                children.push(node);
            }
        }
        self.scopes.pop();
        self.pop_state();
        self.expect_closing_brace("namespace", kw.loc, diags);
        Some(Node::Namespace(NamespaceDef {
            name,
            from,
            children,
            loc: kw.loc,
        }))
    }

    fn parse_configuration(&mut self, diags: &mut Diagnostics) -> Option<Node> {
        let kw = self.advance();
        let name = if self.match_kind(TokenKind::Type(TypeKw::Config)) {
            self.expect_identifier("configuration name", diags)
                .map(|t| t.text)
        } else {
            None
        };
        if !self.match_kind(TokenKind::LBrace) {
            diags.error(
                DiagnosticKind::Syntactic,
                "expected '{' after configuration declaration",
                kw.loc,
            );
            return None;
        }
        self.push_state(ParserState::InConfiguration, kw.loc, diags);

        let mut config = Configuration {
            name,
            entries: Vec::new(),
            name_overrides: Vec::new(),
            origin_aliases: Vec::new(),
            loc: kw.loc,
        };
        while !self.at_end() && !self.check(TokenKind::RBrace) {
            if !self.check(TokenKind::Identifier) {
                diags.error(
                    DiagnosticKind::Configuration,
                    format!("expected configuration key, found '{}'", self.peek().text),
                    self.peek().loc,
                );
                self.advance();
                continue;
            }
            let key = self.advance();
            if !self.match_separator() {
                diags.error(
                    DiagnosticKind::Configuration,
                    format!("expected ':' or '=' after '{}'", key.text),
                    key.loc,
                );
                continue;
            }
            match key.text.as_str() {
                "name" if self.check(TokenKind::LBrace) => {
                    self.parse_name_override_block(&mut config, diags);
                }
                "origin" if self.check(TokenKind::LBrace) => {
                    self.parse_origin_alias_block(&mut config, diags);
                }
                _ => {
                    let value = self.parse_literal(diags);
                    config.entries.push((key.text, value));
                    self.match_kind(TokenKind::Semicolon);
                }
            }
        }
        self.pop_state();
        self.expect_closing_brace("configuration", kw.loc, diags);
        Some(Node::Configuration(config))
    }

    /// `name: { KEYWORD_TEXT: txt, content; … }` keyword alias overrides.
    fn parse_name_override_block(&mut self, config: &mut Configuration, diags: &mut Diagnostics) {
        let lbrace = self.advance();
        self.push_state(ParserState::InConfiguration, lbrace.loc, diags);
        while !self.at_end() && !self.check(TokenKind::RBrace) {
            if !self.check(TokenKind::Identifier) {
                self.advance();
                continue;
            }
            let key = self.advance();
            if !self.match_separator() {
                continue;
            }
            let mut aliases = Vec::new();
            loop {
                match self.peek().kind {
                    TokenKind::Identifier
                    | TokenKind::UnquotedLiteral
                    | TokenKind::StringDouble
                    | TokenKind::StringSingle => aliases.push(self.advance().text),
                    _ => break,
                }
                if !self.match_kind(TokenKind::Comma) {
                    break;
                }
            }
            config.name_overrides.push((key.text, aliases));
            self.match_kind(TokenKind::Semicolon);
        }
        self.pop_state();
        self.expect_closing_brace("name override block", lbrace.loc, diags);
        self.match_kind(TokenKind::Semicolon);
    }

    /// `origin: { @Alias: @Canonical; … }` custom origin-type aliases.
    fn parse_origin_alias_block(&mut self, config: &mut Configuration, diags: &mut Diagnostics) {
        let lbrace = self.advance();
        self.push_state(ParserState::InConfiguration, lbrace.loc, diags);
        while !self.at_end() && !self.check(TokenKind::RBrace) {
            let key = match self.peek().kind {
                TokenKind::Identifier | TokenKind::Type(_) => self.advance().text,
                _ => {
                    self.advance();
                    continue;
                }
            };
            if !self.match_separator() {
                continue;
            }
            let value = match self.peek().kind {
                TokenKind::Identifier | TokenKind::Type(_) => self.advance().text,
                _ => {
                    self.parse_literal(diags)
                }
            };
            config
                .origin_aliases
                .push((key.trim_start_matches('@').to_string(), value));
            self.match_kind(TokenKind::Semicolon);
        }
        self.pop_state();
        self.expect_closing_brace("origin alias block", lbrace.loc, diags);
        self.match_kind(TokenKind::Semicolon);
    }

    fn parse_except(&mut self, diags: &mut Diagnostics) -> Node {
        let kw = self.advance();
        let mut targets = Vec::new();
        let mut all_types = true;
        loop {
            match self.peek().kind {
                TokenKind::Type(_) => {
                    targets.push(self.advance().text);
                }
                // `except script;` forbids the keyword construct itself, so
                // soft keywords are legal targets.
                TokenKind::Identifier | TokenKind::Soft(_) => {
                    all_types = false;
                    targets.push(self.advance().text);
                }
                _ => break,
            }
            if !self.match_kind(TokenKind::Comma) {
                break;
            }
        }
        if targets.is_empty() {
            diags.error(DiagnosticKind::Syntactic, "expected except target", kw.loc);
        }
        self.match_kind(TokenKind::Semicolon);
        let scope = if self.states.current() == ParserState::Global {
            ExceptScope::Global
        } else if all_types && !targets.is_empty() {
            ExceptScope::Type
        } else {
            ExceptScope::Precise
        };
        for target in &targets {
            self.scopes.forbid(target.clone());
        }
        Node::Except(Except {
            scope,
            targets,
            loc: kw.loc,
        })
    }

    // ───────────────────────────────────────────────────────────────────
    // Shared helpers
    // ───────────────────────────────────────────────────────────────────

    fn parse_comment(&mut self) -> Node {
        let tok = self.advance();
        let kind = match tok.kind {
            TokenKind::CommentLine => CommentKind::Line,
            TokenKind::CommentBlock => CommentKind::Block,
            _ => CommentKind::Generator,
        };
        Node::Comment(Comment {
            kind,
            content: tok.text,
            loc: tok.loc,
        })
    }

    fn parse_def_kind(&mut self, diags: &mut Diagnostics, context: &str) -> Option<DefKind> {
        match self.peek().kind {
            TokenKind::Type(TypeKw::Style) => {
                self.advance();
                Some(DefKind::Style)
            }
            TokenKind::Type(TypeKw::Element) => {
                self.advance();
                Some(DefKind::Element)
            }
            TokenKind::Type(TypeKw::Var) => {
                self.advance();
                Some(DefKind::Var)
            }
            _ => {
                diags.error(
                    DiagnosticKind::Syntactic,
                    format!("expected @Style, @Element or @Var after {}", context),
                    self.peek().loc,
                );
                None
            }
        }
    }

    fn parse_qualified_name(&mut self, diags: &mut Diagnostics) -> Option<String> {
        if !self.check(TokenKind::Identifier) {
            diags.error(
                DiagnosticKind::Syntactic,
                format!("expected name, found '{}'", self.peek().text),
                self.peek().loc,
            );
            return None;
        }
        let mut name = self.advance().text;
        while self.check(TokenKind::Dot) && self.peek_at(1).kind == TokenKind::Identifier {
            self.advance();
            name.push('.');
            name.push_str(&self.advance().text);
        }
        Some(name)
    }

    fn parse_literal(&mut self, diags: &mut Diagnostics) -> String {
        match self.peek().kind {
            TokenKind::StringDouble | TokenKind::StringSingle => self.advance().text,
            TokenKind::Number | TokenKind::UnquotedLiteral | TokenKind::Identifier => {
                // Unquoted values like `x.png` or `a/b.chtl` lex as several
                // tokens; adjacent ones (no whitespace between) re-join.
                let first = self.advance();
                let mut text = first.text;
                let mut end = first.loc.end;
                loop {
                    let next = self.peek();
                    let joinable = matches!(
                        next.kind,
                        TokenKind::Dot
                            | TokenKind::Number
                            | TokenKind::UnquotedLiteral
                            | TokenKind::Identifier
                    );
                    if !joinable || next.loc.offset != end {
                        break;
                    }
                    let next = self.advance();
                    text.push_str(&next.text);
                    end = next.loc.end;
                }
                text
            }
            _ => {
                diags.error(
                    DiagnosticKind::Syntactic,
                    format!("expected literal value, found '{}'", self.peek().text),
                    self.peek().loc,
                );
                String::new()
            }
        }
    }

    /// Verbatim body between an already-consumed `{` and its matching `}`,
    /// sliced from the original source. Consumes the closing brace.
    fn consume_raw_body(&mut self, lbrace: &Token, diags: &mut Diagnostics) -> String {
        let start = lbrace.loc.end;
        let mut depth = 0usize;
        let mut end = start;
        while !self.at_end() {
            let tok = self.peek().clone();
            match tok.kind {
                TokenKind::LBrace => depth += 1,
                TokenKind::RBrace => {
                    if depth == 0 {
                        end = tok.loc.offset;
                        self.advance();
                        return self.source[start..end].trim().to_string();
                    }
                    depth -= 1;
                }
                _ => {}
            }
            self.advance();
        }
        diags.error(
            DiagnosticKind::Syntactic,
            "unclosed '{' at end of input",
            lbrace.loc,
        );
        self.source[start..end].trim().to_string()
    }

    fn skip_balanced_block(&mut self, diags: &mut Diagnostics) {
        if !self.match_kind(TokenKind::LBrace) {
            self.match_kind(TokenKind::Semicolon);
            return;
        }
        let lbrace = self.tokens[self.pos - 1].clone();
        self.consume_raw_body(&lbrace, diags);
    }

    /// Does a declaration (`name: value;`) rather than a rule (`sel { … }`)
    /// start here? Decided by whichever of `;`, `{`, `}` comes first.
    fn is_declaration_ahead(&self) -> bool {
        if !matches!(
            self.peek_at(1).kind,
            TokenKind::Colon | TokenKind::Equals | TokenKind::Comma | TokenKind::Semicolon
        ) {
            return false;
        }
        let mut i = self.pos;
        while let Some(tok) = self.tokens.get(i) {
            match tok.kind {
                TokenKind::Semicolon | TokenKind::RBrace | TokenKind::Eof => return true,
                TokenKind::LBrace => return false,
                _ => i += 1,
            }
        }
        true
    }

    fn push_state(&mut self, state: ParserState, loc: SourceLocation, diags: &mut Diagnostics) {
        if !self.states.push(state, loc) {
            diags.error(
                DiagnosticKind::Syntactic,
                format!("{:?} is not valid in this context", state),
                loc,
            );
        }
    }

    fn pop_state(&mut self) {
        self.states.pop();
    }

    fn expect_closing_brace(
        &mut self,
        what: &str,
        open_loc: SourceLocation,
        diags: &mut Diagnostics,
    ) {
        if !self.match_kind(TokenKind::RBrace) {
            diags.error(
                DiagnosticKind::Syntactic,
                format!("unclosed {} (opened here)", what),
                open_loc,
            );
        }
    }

    fn expect_identifier(&mut self, what: &str, diags: &mut Diagnostics) -> Option<Token> {
        if self.check(TokenKind::Identifier) {
            Some(self.advance())
        } else {
            diags.error(
                DiagnosticKind::Syntactic,
                format!("expected {}", what),
                self.peek().loc,
            );
            None
        }
    }

    /// Skip to the next structural anchor after a syntax error.
    fn synchronize(&mut self) {
        while !self.at_end() {
            if self.peek().kind.is_anchor() {
                if self.peek().kind == TokenKind::Semicolon {
                    self.advance();
                }
                return;
            }
            self.advance();
        }
    }

    fn match_separator(&mut self) -> bool {
        self.match_kind(TokenKind::Colon) || self.match_kind(TokenKind::Equals)
    }

    fn match_kind(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    fn peek(&self) -> &Token {
        self.tokens
            .get(self.pos)
            .unwrap_or_else(|| self.tokens.last().expect("token stream ends with EOF"))
    }

    fn peek_at(&self, offset: usize) -> &Token {
        self.tokens
            .get(self.pos + offset)
            .unwrap_or_else(|| self.tokens.last().expect("token stream ends with EOF"))
    }

    fn advance(&mut self) -> Token {
        let tok = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        } else {
            self.pos = self.tokens.len();
        }
        tok
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len() || self.peek().kind == TokenKind::Eof
    }
}

fn is_wordlike(kind: TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Identifier
            | TokenKind::Number
            | TokenKind::UnquotedLiteral
            | TokenKind::StringDouble
            | TokenKind::StringSingle
            | TokenKind::Soft(_)
            | TokenKind::Type(_)
    )
}

/// Split a raw CSS fragment into `(selector, declarations)` rules. Bare
/// declarations with no selector come back with an empty selector string.
pub fn split_css_rules(raw: &str) -> Vec<(String, String)> {
    let mut rules = Vec::new();
    let bytes = raw.as_bytes();
    let mut i = 0usize;
    let mut seg_start = 0usize;
    while i < bytes.len() {
        match bytes[i] {
            b'"' | b'\'' => {
                let quote = bytes[i];
                i += 1;
                while i < bytes.len() && bytes[i] != quote {
                    if bytes[i] == b'\\' {
                        i += 1;
                    }
                    i += 1;
                }
                i += 1;
            }
            b'{' => {
                let selector = raw[seg_start..i].trim().to_string();
                let mut depth = 0usize;
                let body_start = i + 1;
                i += 1;
                while i < bytes.len() {
                    match bytes[i] {
                        b'{' => depth += 1,
                        b'}' => {
                            if depth == 0 {
                                break;
                            }
                            depth -= 1;
                        }
                        _ => {}
                    }
                    i += 1;
                }
                let body = raw[body_start..i.min(raw.len())].trim().to_string();
                rules.push((selector, body));
                i += 1;
                seg_start = i;
            }
            _ => i += 1,
        }
    }
    let tail = raw[seg_start.min(raw.len())..].trim();
    if !tail.is_empty() {
        rules.push((String::new(), tail.to_string()));
    }
    rules
}
