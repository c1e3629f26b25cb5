//! Unified scanner: partitions raw CHTL source into CHTL / CSS / JS
//! fragments before lexing.
//!
//! The scanner walks the source once, tracking brace depth and a stack of
//! open block kinds. Strings and comments suppress every other transition.
//! Three block forms delimit raw regions that the CHTL lexer must not
//! tokenize structurally:
//!
//! - a global `style { … }` body is CSS,
//! - an `[Origin] @Style { … }` body is CSS and `[Origin] @JavaScript { … }`
//!   is JS; other origin bodies are verbatim CHTL,
//! - a `script { … }` body stays CHTL but is flagged `in_script` so the
//!   lexer recognises `{{ … }}` enhanced selectors inside it.
//!
//! Unbalanced braces, unterminated strings and unterminated block comments
//! are fatal and abort the pipeline with a located error.

use crate::error::{Diagnostic, DiagnosticKind, Diagnostics};
use crate::token::SourceLocation;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

/// Combined length under which adjacent same-kind fragments are merged.
const MERGE_LIMIT: usize = 10_000;

/// How far ahead the scanner looks when matching a block header.
const HEADER_WINDOW: usize = 160;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FragmentKind {
    Chtl,
    Css,
    Js,
}

#[derive(Debug, Clone, Serialize)]
pub struct Fragment {
    pub kind: FragmentKind,
    pub text: String,
    pub loc: SourceLocation,
    /// Body of a `script { … }` block; the lexer recognises `{{ … }}` here.
    pub in_script: bool,
    /// Origin body: lexed as a single raw token, no keyword recognition.
    pub verbatim: bool,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ScannerStats {
    pub chtl_fragments: usize,
    pub css_fragments: usize,
    pub js_fragments: usize,
    pub total_fragments: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Block {
    Element,
    LocalStyle,
    Definition,
    Text,
    Other,
}

lazy_static! {
    /// `[Origin] @Type name? {` header, matched at a `[`.
    static ref ORIGIN_HEADER: Regex =
        Regex::new(r"^\[Origin\]\s*@([A-Za-z][A-Za-z0-9]*)\s*([A-Za-z_][A-Za-z0-9_-]*)?\s*\{")
            .unwrap();
}

pub struct UnifiedScanner<'a> {
    source: &'a str,
    bytes: &'a [u8],
    pos: usize,
    line: u32,
    column: u32,
    stats: ScannerStats,
}

impl<'a> UnifiedScanner<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            bytes: source.as_bytes(),
            pos: 0,
            line: 1,
            column: 1,
            stats: ScannerStats::default(),
        }
    }

    pub fn stats(&self) -> ScannerStats {
        self.stats
    }

    /// Partition the source. Fatal scan failures abort the whole pipeline.
    pub fn scan(&mut self, diags: &Diagnostics) -> Result<Vec<Fragment>, Diagnostic> {
        if self.source.starts_with('\u{FEFF}') {
            return Err(diags.fatal(
                DiagnosticKind::Lexical,
                "leading byte-order mark is not accepted",
                SourceLocation::new(1, 1, 0, 3),
            ));
        }

        let mut fragments = Vec::new();
        let mut blocks: Vec<(Block, SourceLocation)> = Vec::new();
        let mut frag_start = self.mark();
        // Header recognition state: the kind the next `{` opens.
        let mut pending: Option<Block> = None;
        let mut last_ident: Option<(usize, usize)> = None;

        while self.pos < self.bytes.len() {
            let c = self.bytes[self.pos];
            match c {
                b'/' if self.peek(1) == Some(b'/') => {
                    self.skip_line_comment();
                    continue;
                }
                b'-' if self.peek(1) == Some(b'-') => {
                    self.skip_line_comment();
                    continue;
                }
                b'/' if self.peek(1) == Some(b'*') => {
                    self.skip_block_comment(diags)?;
                    continue;
                }
                b'"' | b'\'' => {
                    self.skip_string(c, diags)?;
                    last_ident = None;
                    continue;
                }
                b'[' => {
                    if let Some((frag, after)) =
                        self.try_origin_block(&mut fragments, frag_start, diags)?
                    {
                        blocks.push((Block::Other, frag.loc));
                        fragments.push(frag);
                        frag_start = after;
                        pending = None;
                        last_ident = None;
                        continue;
                    }
                    pending = Some(Block::Definition);
                    self.advance();
                    continue;
                }
                b';' => {
                    pending = None;
                    last_ident = None;
                    self.advance();
                    continue;
                }
                b'@' => {
                    // `@Type Name {` opens a definition/use body, not an element.
                    pending = Some(Block::Definition);
                    self.advance();
                    continue;
                }
                b'{' => {
                    let open_loc = self.mark();
                    let ident = last_ident.map(|(s, e)| &self.source[s..e]);
                    let element_depth =
                        blocks.iter().filter(|(b, _)| *b == Block::Element).count();
                    let block = match (pending.take(), ident) {
                        (Some(Block::Definition), _) => Block::Definition,
                        (_, Some("style")) if element_depth == 0 => {
                            // Global style body: raw CSS region.
                            self.advance();
                            self.flush(&mut fragments, frag_start, self.mark(), false, false);
                            let frag =
                                self.consume_raw(FragmentKind::Css, false, false, open_loc, diags)?;
                            fragments.push(frag);
                            frag_start = self.mark();
                            last_ident = None;
                            blocks.push((Block::Other, open_loc));
                            continue;
                        }
                        (_, Some("style")) => Block::LocalStyle,
                        (_, Some("script")) => {
                            // Script body: CHTL-tagged fragment of its own.
                            self.advance();
                            self.flush(&mut fragments, frag_start, self.mark(), false, false);
                            let frag =
                                self.consume_raw(FragmentKind::Chtl, true, false, open_loc, diags)?;
                            fragments.push(frag);
                            frag_start = self.mark();
                            last_ident = None;
                            blocks.push((Block::Other, open_loc));
                            continue;
                        }
                        (_, Some("text")) => Block::Text,
                        (_, Some(_)) => Block::Element,
                        _ => Block::Other,
                    };
                    blocks.push((block, open_loc));
                    last_ident = None;
                    self.advance();
                    continue;
                }
                b'}' => {
                    if blocks.pop().is_none() {
                        return Err(diags.fatal(
                            DiagnosticKind::Syntactic,
                            "unbalanced '}' with no open block",
                            self.mark(),
                        ));
                    }
                    last_ident = None;
                    self.advance();
                    continue;
                }
                _ => {}
            }

            if c.is_ascii_alphabetic() || c == b'_' {
                let start = self.pos;
                while self.pos < self.bytes.len() && is_ident_byte(self.bytes[self.pos]) {
                    self.advance();
                }
                last_ident = Some((start, self.pos));
                continue;
            }
            if !(c as char).is_whitespace() {
                last_ident = None;
            }
            self.advance();
        }

        if let Some((_, open)) = blocks.last() {
            return Err(diags.fatal(
                DiagnosticKind::Syntactic,
                "unclosed '{' at end of input",
                *open,
            ));
        }

        self.flush(&mut fragments, frag_start, self.mark(), false, false);
        let merged = merge_fragments(fragments);
        for frag in &merged {
            match frag.kind {
                FragmentKind::Chtl => self.stats.chtl_fragments += 1,
                FragmentKind::Css => self.stats.css_fragments += 1,
                FragmentKind::Js => self.stats.js_fragments += 1,
            }
        }
        self.stats.total_fragments = merged.len();
        Ok(merged)
    }

    /// Attempt to consume an `[Origin] @Type name? { … }` block starting at
    /// the current `[`. Returns the body fragment plus the location where the
    /// following CHTL fragment resumes (the closing brace).
    fn try_origin_block(
        &mut self,
        fragments: &mut Vec<Fragment>,
        frag_start: SourceLocation,
        diags: &Diagnostics,
    ) -> Result<Option<(Fragment, SourceLocation)>, Diagnostic> {
        let mut window_end = (self.pos + HEADER_WINDOW).min(self.source.len());
        while !self.source.is_char_boundary(window_end) {
            window_end -= 1;
        }
        let window = &self.source[self.pos..window_end];
        let caps = match ORIGIN_HEADER.captures(window) {
            Some(c) => c,
            None => return Ok(None),
        };
        let kind = match caps.get(1).map(|m| m.as_str()) {
            Some("Style") => FragmentKind::Css,
            Some("JavaScript") => FragmentKind::Js,
            _ => FragmentKind::Chtl,
        };
        let verbatim = kind == FragmentKind::Chtl;
        // Advance over the whole header including its `{`.
        let header_len = caps.get(0).unwrap().end();
        for _ in 0..header_len {
            self.advance();
        }
        self.flush(fragments, frag_start, self.mark(), false, false);
        let open_loc = self.mark();
        let frag = self.consume_raw(kind, false, verbatim, open_loc, diags)?;
        Ok(Some((frag, self.mark())))
    }

    /// Consume a raw region up to (not including) the brace matching an
    /// already-consumed `{`. Strings and comments suppress brace counting.
    fn consume_raw(
        &mut self,
        kind: FragmentKind,
        in_script: bool,
        verbatim: bool,
        open_loc: SourceLocation,
        diags: &Diagnostics,
    ) -> Result<Fragment, Diagnostic> {
        let start = self.mark();
        let mut depth = 0usize;
        while self.pos < self.bytes.len() {
            let c = self.bytes[self.pos];
            match c {
                b'"' | b'\'' => {
                    self.skip_string(c, diags)?;
                    continue;
                }
                b'/' if self.peek(1) == Some(b'/') => {
                    self.skip_line_comment();
                    continue;
                }
                b'/' if self.peek(1) == Some(b'*') => {
                    self.skip_block_comment(diags)?;
                    continue;
                }
                b'{' => depth += 1,
                b'}' => {
                    if depth == 0 {
                        let mut loc = start;
                        loc.end = self.pos;
                        return Ok(Fragment {
                            kind,
                            text: self.source[start.offset..self.pos].to_string(),
                            loc,
                            in_script,
                            verbatim,
                        });
                    }
                    depth -= 1;
                }
                _ => {}
            }
            self.advance();
        }
        Err(diags.fatal(
            DiagnosticKind::Syntactic,
            "unclosed '{' at end of input",
            open_loc,
        ))
    }

    fn flush(
        &self,
        fragments: &mut Vec<Fragment>,
        start: SourceLocation,
        end: SourceLocation,
        in_script: bool,
        verbatim: bool,
    ) {
        if end.offset <= start.offset {
            return;
        }
        let mut loc = start;
        loc.end = end.offset;
        fragments.push(Fragment {
            kind: FragmentKind::Chtl,
            text: self.source[start.offset..end.offset].to_string(),
            loc,
            in_script,
            verbatim,
        });
    }

    fn mark(&self) -> SourceLocation {
        SourceLocation::new(self.line, self.column, self.pos, self.pos)
    }

    fn peek(&self, n: usize) -> Option<u8> {
        self.bytes.get(self.pos + n).copied()
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

    fn skip_line_comment(&mut self) {
        while self.pos < self.bytes.len() && self.bytes[self.pos] != b'\n' {
            self.advance();
        }
    }

    fn skip_block_comment(&mut self, diags: &Diagnostics) -> Result<(), Diagnostic> {
        let open = self.mark();
        self.advance();
        self.advance();
        while self.pos < self.bytes.len() {
            if self.bytes[self.pos] == b'*' && self.peek(1) == Some(b'/') {
                self.advance();
                self.advance();
                return Ok(());
            }
            self.advance();
        }
        Err(diags.fatal(DiagnosticKind::Lexical, "unterminated block comment", open))
    }

    fn skip_string(&mut self, quote: u8, diags: &Diagnostics) -> Result<(), Diagnostic> {
        let open = self.mark();
        self.advance();
        while self.pos < self.bytes.len() {
            let c = self.bytes[self.pos];
            if c == b'\\' {
                self.advance();
                self.advance();
                continue;
            }
            if c == quote {
                self.advance();
                return Ok(());
            }
            if c == b'\n' {
                break;
            }
            self.advance();
        }
        Err(diags.fatal(DiagnosticKind::Lexical, "unterminated string", open))
    }
}

fn is_ident_byte(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_' || c == b'-'
}

/// Merge adjacent same-kind fragments while the combined length stays under
/// the implementation limit. Raw and script fragments never merge.
fn merge_fragments(fragments: Vec<Fragment>) -> Vec<Fragment> {
    let mut merged: Vec<Fragment> = Vec::with_capacity(fragments.len());
    for frag in fragments {
        if let Some(last) = merged.last_mut() {
            let contiguous = last.loc.end == frag.loc.offset;
            if contiguous
                && last.kind == frag.kind
                && last.kind == FragmentKind::Chtl
                && !last.in_script
                && !last.verbatim
                && !frag.in_script
                && !frag.verbatim
                && last.text.len() + frag.text.len() <= MERGE_LIMIT
            {
                last.text.push_str(&frag.text);
                last.loc.end = frag.loc.end;
                continue;
            }
        }
        merged.push(frag);
    }
    merged
}

/// Convenience wrapper: scan a source string with a throwaway diagnostic
/// context. Used by tests and debug tooling.
pub fn scan_source(source: &str, file: &str) -> Result<Vec<Fragment>, Diagnostic> {
    let diags = Diagnostics::new(file);
    UnifiedScanner::new(source).scan(&diags)
}
