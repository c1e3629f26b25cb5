//! CHTL lexer: fragment stream → token stream.
//!
//! Single pass, O(n) over fragment text. CSS and JS fragments (and verbatim
//! origin bodies) are re-emitted as single raw tokens; CHTL fragments are
//! tokenized with the keyword tables from `token.rs`. The compound keywords
//! `at top` / `at bottom` are recognised by lookahead with rewind, and
//! `{{ … }}` is a single enhanced-selector token inside script fragments.

use crate::error::{DiagnosticKind, Diagnostics};
use crate::scanner::{Fragment, FragmentKind};
use crate::token::{
    SoftKw, SourceLocation, Token, TokenKind, BRACKET_KEYWORDS, SOFT_KEYWORDS, TYPE_KEYWORDS,
};
use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct LexerStats {
    pub tokens: usize,
    pub identifiers: usize,
    pub comments: usize,
}

pub struct Lexer<'a> {
    source: &'a str,
    bytes: &'a [u8],
    fragments: &'a [Fragment],
    frag: usize,
    pos: usize,
    line: u32,
    column: u32,
    stats: LexerStats,
    quiet: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str, fragments: &'a [Fragment]) -> Self {
        let pos = fragments.first().map(|f| f.loc.offset).unwrap_or(0);
        Self {
            source,
            bytes: source.as_bytes(),
            fragments,
            frag: 0,
            pos,
            line: 1,
            column: 1,
            stats: LexerStats::default(),
            quiet: false,
        }
    }

    pub fn stats(&self) -> LexerStats {
        self.stats
    }

    /// Tokenize everything. Line and block comments are dropped unless
    /// `preserve_comments`; generator comments always survive.
    pub fn tokenize(&mut self, diags: &mut Diagnostics, preserve_comments: bool) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            let tok = self.next_token(diags);
            match tok.kind {
                TokenKind::Eof => {
                    tokens.push(tok);
                    break;
                }
                TokenKind::CommentLine | TokenKind::CommentBlock if !preserve_comments => {}
                _ => tokens.push(tok),
            }
        }
        tokens
    }

    /// Bounded lookahead: the k-th upcoming token (k = 1 is the next one).
    /// Position, line, column and fragment state are saved and restored, and
    /// no diagnostics or statistics are recorded while peeking.
    pub fn peek_token(&mut self, k: usize, diags: &mut Diagnostics) -> Token {
        let saved = (self.frag, self.pos, self.line, self.column, self.stats);
        self.quiet = true;
        let mut tok = Token::eof(self.mark());
        for _ in 0..k.max(1) {
            tok = self.next_token(diags);
            if tok.kind == TokenKind::Eof {
                break;
            }
        }
        self.quiet = false;
        (self.frag, self.pos, self.line, self.column, self.stats) = saved;
        tok
    }

    pub fn next_token(&mut self, diags: &mut Diagnostics) -> Token {
        loop {
            // Advance past exhausted fragments; raw fragments are re-emitted
            // as a single token each.
            let frag = loop {
                match self.fragments.get(self.frag) {
                    None => return self.count(Token::eof(self.mark())),
                    Some(f) if self.pos >= f.loc.end => {
                        self.frag += 1;
                    }
                    Some(f) => break f,
                }
            };
            let raw_kind = match (frag.kind, frag.verbatim) {
                (FragmentKind::Css, _) => Some(TokenKind::RawCss),
                (FragmentKind::Js, _) => Some(TokenKind::RawJs),
                (FragmentKind::Chtl, true) => Some(TokenKind::RawChtl),
                _ => None,
            };
            if let Some(kind) = raw_kind {
                let mut loc = self.mark();
                loc.end = frag.loc.end;
                let text = self.source[self.pos..frag.loc.end].to_string();
                self.advance_to(frag.loc.end);
                return self.count(Token::new(kind, text, loc));
            }

            let in_script = frag.in_script;
            let frag_end = frag.loc.end;
            self.skip_whitespace(frag_end);
            if self.pos >= frag_end {
                continue;
            }
            if let Some(tok) = self.scan_in_fragment(frag_end, in_script, diags) {
                return self.count(tok);
            }
            // Unlexable byte outside a script fragment: reported, skipped.
        }
    }

    fn scan_in_fragment(
        &mut self,
        end: usize,
        in_script: bool,
        diags: &mut Diagnostics,
    ) -> Option<Token> {
        let start = self.mark();
        let c = self.bytes[self.pos];

        // Comments
        if c == b'/' && self.peek_byte(1, end) == Some(b'/') {
            return Some(self.scan_line_comment(TokenKind::CommentLine, end, start));
        }
        if c == b'-' && self.peek_byte(1, end) == Some(b'-') {
            return Some(self.scan_line_comment(TokenKind::CommentGenerator, end, start));
        }
        if c == b'/' && self.peek_byte(1, end) == Some(b'*') {
            return Some(self.scan_block_comment(end, start));
        }

        // Strings
        if c == b'"' || c == b'\'' {
            return Some(self.scan_string(c, end, start, diags));
        }

        // Enhanced selector, script fragments only
        if c == b'{' && self.peek_byte(1, end) == Some(b'{') {
            if in_script {
                return Some(self.scan_enhanced_selector(end, start, diags));
            }
            if !self.quiet {
                diags.error(
                    DiagnosticKind::Lexical,
                    "'{{' enhanced selector is only valid inside script blocks",
                    start,
                );
            }
            self.advance();
            self.advance();
            return None;
        }

        // Bracket keywords
        if c == b'[' {
            if let Some(tok) = self.scan_bracket_keyword(end, start) {
                return Some(tok);
            }
            self.advance();
            return Some(self.token_from(TokenKind::LBracket, start));
        }

        // @ keywords
        if c == b'@' {
            return Some(self.scan_at_keyword(end, start));
        }

        // Numbers (possibly growing into an unquoted literal: `10px`, `1.5em`)
        if c.is_ascii_digit() {
            return Some(self.scan_number(end, start));
        }

        // Identifiers and soft keywords
        if c.is_ascii_alphabetic() || c == b'_' {
            return Some(self.scan_identifier(end, start));
        }

        let structural = match c {
            b'{' => Some(TokenKind::LBrace),
            b'}' => Some(TokenKind::RBrace),
            b']' => Some(TokenKind::RBracket),
            b'(' => Some(TokenKind::LParen),
            b')' => Some(TokenKind::RParen),
            b';' => Some(TokenKind::Semicolon),
            b',' => Some(TokenKind::Comma),
            b'.' => Some(TokenKind::Dot),
            b':' => Some(TokenKind::Colon),
            b'=' => Some(TokenKind::Equals),
            b'&' => Some(TokenKind::Ampersand),
            _ => None,
        };
        if let Some(kind) = structural {
            self.advance();
            return Some(self.token_from(kind, start));
        }

        if is_unquoted_byte(c) {
            return Some(self.scan_unquoted(end, start));
        }

        if in_script {
            // Arbitrary script text: keep every byte as literal content.
            self.advance();
            return Some(self.token_from(TokenKind::UnquotedLiteral, start));
        }

        if !self.quiet {
            diags.error(
                DiagnosticKind::Lexical,
                format!("unexpected character '{}'", self.source[self.pos..].chars().next().unwrap_or('?')),
                start,
            );
        }
        self.advance_char();
        None
    }

    fn scan_line_comment(&mut self, kind: TokenKind, end: usize, start: SourceLocation) -> Token {
        self.advance();
        self.advance();
        let text_start = self.pos;
        while self.pos < end && self.bytes[self.pos] != b'\n' {
            self.advance();
        }
        let text = self.source[text_start..self.pos].trim().to_string();
        self.stats.comments += 1;
        self.finish(kind, text, start)
    }

    fn scan_block_comment(&mut self, end: usize, start: SourceLocation) -> Token {
        self.advance();
        self.advance();
        let text_start = self.pos;
        let mut text_end = self.pos;
        while self.pos < end {
            if self.bytes[self.pos] == b'*' && self.peek_byte(1, end) == Some(b'/') {
                text_end = self.pos;
                self.advance();
                self.advance();
                break;
            }
            self.advance();
            text_end = self.pos;
        }
        let text = self.source[text_start..text_end].trim().to_string();
        self.stats.comments += 1;
        self.finish(TokenKind::CommentBlock, text, start)
    }

    fn scan_string(
        &mut self,
        quote: u8,
        end: usize,
        start: SourceLocation,
        diags: &mut Diagnostics,
    ) -> Token {
        self.advance();
        let mut value = String::new();
        let mut terminated = false;
        while self.pos < end {
            let c = self.bytes[self.pos];
            if c == quote {
                self.advance();
                terminated = true;
                break;
            }
            if c == b'\\' {
                self.advance();
                if self.pos < end {
                    let esc = self.bytes[self.pos];
                    value.push(match esc {
                        b'n' => '\n',
                        b't' => '\t',
                        b'r' => '\r',
                        b'\\' => '\\',
                        b'\'' => '\'',
                        b'"' => '"',
                        other => other as char,
                    });
                    self.advance();
                }
                continue;
            }
            let ch = self.source[self.pos..].chars().next().unwrap();
            value.push(ch);
            self.advance_char();
        }
        if !terminated && !self.quiet {
            diags.error(DiagnosticKind::Lexical, "unterminated string", start);
        }
        let kind = if quote == b'"' {
            TokenKind::StringDouble
        } else {
            TokenKind::StringSingle
        };
        self.finish(kind, value, start)
    }

    fn scan_enhanced_selector(
        &mut self,
        end: usize,
        start: SourceLocation,
        diags: &mut Diagnostics,
    ) -> Token {
        self.advance();
        self.advance();
        let text_start = self.pos;
        let mut text_end = self.pos;
        let mut closed = false;
        while self.pos < end {
            if self.bytes[self.pos] == b'}' && self.peek_byte(1, end) == Some(b'}') {
                text_end = self.pos;
                self.advance();
                self.advance();
                closed = true;
                break;
            }
            self.advance();
        }
        if !closed {
            if !self.quiet {
                diags.error(DiagnosticKind::Lexical, "unterminated '{{' selector", start);
            }
            text_end = self.pos;
        }
        let text = self.source[text_start..text_end].trim().to_string();
        self.finish(TokenKind::EnhancedSelector, text, start)
    }

    /// `[Template]` and friends. Returns `None` (without consuming) when the
    /// identifier inside the brackets is not in the known set, so the `[`
    /// falls back to a structural token.
    fn scan_bracket_keyword(&mut self, end: usize, start: SourceLocation) -> Option<Token> {
        let mut i = self.pos + 1;
        let word_start = i;
        while i < end && (self.bytes[i] as char).is_ascii_alphabetic() {
            i += 1;
        }
        if i >= end || self.bytes[i] != b']' || i == word_start {
            return None;
        }
        let word = &self.source[word_start..i];
        let kw = *BRACKET_KEYWORDS.get(word)?;
        self.advance_to(i + 1);
        Some(self.finish(
            TokenKind::Bracket(kw),
            format!("[{}]", word),
            start,
        ))
    }

    fn scan_at_keyword(&mut self, end: usize, start: SourceLocation) -> Token {
        let mut i = self.pos + 1;
        let word_start = i;
        while i < end && (self.bytes[i] as char).is_ascii_alphanumeric() {
            i += 1;
        }
        let word = &self.source[word_start..i];
        if let Some(kw) = TYPE_KEYWORDS.get(word) {
            let kw = *kw;
            self.advance_to(i);
            return self.finish(TokenKind::Type(kw), format!("@{}", word), start);
        }
        if word.is_empty() {
            self.advance();
            return self.token_from(TokenKind::At, start);
        }
        // Not in the known set: custom origin types (`[Origin] @Vue`) reach
        // the parser as plain identifiers carrying their `@` spelling.
        self.advance_to(i);
        self.finish(TokenKind::Identifier, format!("@{}", word), start)
    }

    fn scan_number(&mut self, end: usize, start: SourceLocation) -> Token {
        while self.pos < end && self.bytes[self.pos].is_ascii_digit() {
            self.advance();
        }
        if self.pos < end
            && self.bytes[self.pos] == b'.'
            && self.peek_byte(1, end).map_or(false, |c| c.is_ascii_digit())
        {
            self.advance();
            while self.pos < end && self.bytes[self.pos].is_ascii_digit() {
                self.advance();
            }
        }
        // `10px`, `100%`: a trailing unquoted run turns the whole lexeme
        // into an unquoted literal.
        if self.pos < end && is_unquoted_continue(self.bytes[self.pos]) {
            while self.pos < end && is_unquoted_continue(self.bytes[self.pos]) {
                self.advance();
            }
            return self.token_from(TokenKind::UnquotedLiteral, start);
        }
        self.token_from(TokenKind::Number, start)
    }

    fn scan_identifier(&mut self, end: usize, start: SourceLocation) -> Token {
        while self.pos < end && is_ident_byte(self.bytes[self.pos]) {
            self.advance();
        }
        let text = &self.source[start.offset..self.pos];

        // Compound keywords `at top` / `at bottom`: lookahead past
        // whitespace, rewind if the next word is anything else.
        if text == "at" {
            let saved = (self.pos, self.line, self.column);
            self.skip_whitespace(end);
            let word_start = self.pos;
            while self.pos < end && is_ident_byte(self.bytes[self.pos]) {
                self.advance();
            }
            match &self.source[word_start..self.pos] {
                "top" => return self.finish(TokenKind::Soft(SoftKw::AtTop), "at top", start),
                "bottom" => {
                    return self.finish(TokenKind::Soft(SoftKw::AtBottom), "at bottom", start)
                }
                _ => (self.pos, self.line, self.column) = saved,
            }
        }

        self.stats.identifiers += 1;
        if let Some(kw) = SOFT_KEYWORDS.get(text) {
            let kw = *kw;
            return self.token_from(TokenKind::Soft(kw), start);
        }
        self.token_from(TokenKind::Identifier, start)
    }

    fn scan_unquoted(&mut self, end: usize, start: SourceLocation) -> Token {
        // The opening byte always belongs to the literal, even when it is
        // not in the continue set (`<`, `>`, `*`, …).
        self.advance_char();
        while self.pos < end && is_unquoted_continue(self.bytes[self.pos]) {
            self.advance();
        }
        self.token_from(TokenKind::UnquotedLiteral, start)
    }

    // Cursor helpers

    fn mark(&self) -> SourceLocation {
        SourceLocation::new(self.line, self.column, self.pos, self.pos)
    }

    fn token_from(&mut self, kind: TokenKind, start: SourceLocation) -> Token {
        let text = self.source[start.offset..self.pos].to_string();
        self.finish(kind, text, start)
    }

    fn finish(&mut self, kind: TokenKind, text: impl Into<String>, start: SourceLocation) -> Token {
        let mut loc = start;
        loc.end = self.pos;
        Token::new(kind, text, loc)
    }

    fn count(&mut self, tok: Token) -> Token {
        if !self.quiet {
            self.stats.tokens += 1;
        }
        tok
    }

    fn peek_byte(&self, n: usize, end: usize) -> Option<u8> {
        if self.pos + n < end {
            Some(self.bytes[self.pos + n])
        } else {
            None
        }
    }

    fn skip_whitespace(&mut self, end: usize) {
        while self.pos < end && (self.bytes[self.pos] as char).is_whitespace() {
            self.advance();
        }
    }

    fn advance(&mut self) {
        if self.pos >= self.bytes.len() {
            return;
        }
        if self.bytes[self.pos] == b'\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        self.pos += 1;
    }

    /// Advance over one full (possibly multi-byte) character.
    fn advance_char(&mut self) {
        let ch = match self.source[self.pos..].chars().next() {
            Some(c) => c,
            None => return,
        };
        for _ in 0..ch.len_utf8() {
            self.pos += 1;
        }
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
    }

    fn advance_to(&mut self, target: usize) {
        while self.pos < target {
            self.advance();
        }
    }
}

fn is_ident_byte(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_' || c == b'-'
}

fn is_unquoted_byte(c: u8) -> bool {
    matches!(
        c,
        b'/' | b'%' | b'#' | b'!' | b'+' | b'-' | b'*' | b'?' | b'<' | b'>'
    ) || c >= 128
}

fn is_unquoted_continue(c: u8) -> bool {
    c.is_ascii_alphanumeric()
        || matches!(c, b'_' | b'-' | b'.' | b'/' | b'%' | b'#' | b'!')
        || c >= 128
}
