//! Token model for the CHTL lexer.
//!
//! Tokens are tagged values carrying their decoded text plus a source
//! location. Keyword classification is table-driven: plain soft keywords,
//! `[Bracket]` keywords and `@Type` keywords each have their own map, and an
//! identifier only becomes a keyword when the enclosing form matches the
//! known set.

use lazy_static::lazy_static;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

/// Position of a token or node in the original source text.
///
/// `offset` is the byte offset of the first byte; `end` is one past the last
/// byte, so `&source[offset..end]` is the exact original spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SourceLocation {
    pub line: u32,
    pub column: u32,
    pub offset: usize,
    pub end: usize,
}

impl SourceLocation {
    pub fn new(line: u32, column: u32, offset: usize, end: usize) -> Self {
        Self {
            line,
            column,
            offset,
            end,
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// `[Bracket]` keywords.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum BracketKw {
    Template,
    Custom,
    Origin,
    Import,
    Configuration,
    Namespace,
    Info,
    Export,
}

/// `@Type` keywords.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TypeKw {
    Style,
    Element,
    Var,
    Html,
    JavaScript,
    Chtl,
    CJmod,
    Config,
}

/// Soft keywords: ordinary identifiers that act as keywords in position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SoftKw {
    Text,
    Style,
    Script,
    Inherit,
    Delete,
    Insert,
    Before,
    After,
    Replace,
    AtTop,
    AtBottom,
    From,
    As,
    Except,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TokenKind {
    // Structural
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Semicolon,
    Comma,
    Dot,
    Colon,
    Equals,
    At,
    Ampersand,
    // Literals
    StringDouble,
    StringSingle,
    Number,
    UnquotedLiteral,
    Identifier,
    // Comments
    CommentLine,
    CommentBlock,
    CommentGenerator,
    // Keywords
    Bracket(BracketKw),
    Type(TypeKw),
    Soft(SoftKw),
    // `{{ … }}` enhanced selector, only inside script fragments
    EnhancedSelector,
    // Whole-fragment raw regions produced by the unified scanner
    RawCss,
    RawJs,
    RawChtl,
    Eof,
}

impl TokenKind {
    pub fn is_comment(&self) -> bool {
        matches!(
            self,
            TokenKind::CommentLine | TokenKind::CommentBlock | TokenKind::CommentGenerator
        )
    }

    /// Tokens the parser resynchronises on after an error.
    pub fn is_anchor(&self) -> bool {
        matches!(
            self,
            TokenKind::RBrace | TokenKind::Semicolon | TokenKind::Bracket(_) | TokenKind::Eof
        )
    }
}

/// A single lexed token. `text` holds the decoded value for strings and the
/// raw spelling for everything else.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub loc: SourceLocation,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>, loc: SourceLocation) -> Self {
        Self {
            kind,
            text: text.into(),
            loc,
        }
    }

    pub fn eof(loc: SourceLocation) -> Self {
        Self::new(TokenKind::Eof, "", loc)
    }
}

lazy_static! {
    pub static ref SOFT_KEYWORDS: HashMap<&'static str, SoftKw> = {
        let mut m = HashMap::new();
        m.insert("text", SoftKw::Text);
        m.insert("style", SoftKw::Style);
        m.insert("script", SoftKw::Script);
        m.insert("inherit", SoftKw::Inherit);
        m.insert("delete", SoftKw::Delete);
        m.insert("insert", SoftKw::Insert);
        m.insert("before", SoftKw::Before);
        m.insert("after", SoftKw::After);
        m.insert("replace", SoftKw::Replace);
        m.insert("from", SoftKw::From);
        m.insert("as", SoftKw::As);
        m.insert("except", SoftKw::Except);
        m
    };
    pub static ref BRACKET_KEYWORDS: HashMap<&'static str, BracketKw> = {
        let mut m = HashMap::new();
        m.insert("Template", BracketKw::Template);
        m.insert("Custom", BracketKw::Custom);
        m.insert("Origin", BracketKw::Origin);
        m.insert("Import", BracketKw::Import);
        m.insert("Configuration", BracketKw::Configuration);
        m.insert("Namespace", BracketKw::Namespace);
        m.insert("Info", BracketKw::Info);
        m.insert("Export", BracketKw::Export);
        m
    };
    pub static ref TYPE_KEYWORDS: HashMap<&'static str, TypeKw> = {
        let mut m = HashMap::new();
        m.insert("Style", TypeKw::Style);
        m.insert("Element", TypeKw::Element);
        m.insert("Var", TypeKw::Var);
        m.insert("Html", TypeKw::Html);
        m.insert("JavaScript", TypeKw::JavaScript);
        m.insert("Chtl", TypeKw::Chtl);
        m.insert("CJmod", TypeKw::CJmod);
        m.insert("Config", TypeKw::Config);
        m
    };
}
