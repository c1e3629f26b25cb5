//! AST node types.
//!
//! One sum type rooted at `Document`. Parents own their children; every
//! cross-reference (inheritance base, variable group, named origin) is a
//! name resolved through the global symbol map, never a pointer, so the
//! ownership graph is a strict tree. All nodes serialize for `--ast` dumps.

use crate::token::SourceLocation;
use serde::Serialize;

#[derive(Debug, Clone, Default, Serialize)]
pub struct Document {
    pub children: Vec<Node>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Node {
    Element(Element),
    Text(Text),
    Comment(Comment),
    Style(StyleBlock),
    Script(ScriptBlock),
    Template(TemplateDef),
    Custom(CustomDef),
    Inherit(Inherit),
    Delete(Delete),
    Insert(Insert),
    Origin(Origin),
    Import(Import),
    Namespace(NamespaceDef),
    Configuration(Configuration),
    Except(Except),
    VarCall(VarCall),
    VarDef(VarDef),
}

impl Node {
    pub fn location(&self) -> SourceLocation {
        match self {
            Node::Element(n) => n.loc,
            Node::Text(n) => n.loc,
            Node::Comment(n) => n.loc,
            Node::Style(n) => n.loc,
            Node::Script(n) => n.loc,
            Node::Template(n) => n.loc,
            Node::Custom(n) => n.loc,
            Node::Inherit(n) => n.loc,
            Node::Delete(n) => n.loc,
            Node::Insert(n) => n.loc,
            Node::Origin(n) => n.loc,
            Node::Import(n) => n.loc,
            Node::Namespace(n) => n.loc,
            Node::Configuration(n) => n.loc,
            Node::Except(n) => n.loc,
            Node::VarCall(n) => n.loc,
            Node::VarDef(n) => n.loc,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Element {
    pub tag: String,
    /// Attribute order is emission order.
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Node>,
    pub loc: SourceLocation,
}

impl Element {
    pub fn new(tag: impl Into<String>, loc: SourceLocation) -> Self {
        Self {
            tag: tag.into(),
            attributes: Vec::new(),
            children: Vec::new(),
            loc,
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn set_attribute(&mut self, name: &str, value: &str) {
        if let Some(slot) = self.attributes.iter_mut().find(|(n, _)| n == name) {
            slot.1 = value.to_string();
        } else {
            self.attributes.push((name.to_string(), value.to_string()));
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Text {
    pub content: String,
    pub loc: SourceLocation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CommentKind {
    Line,
    Block,
    Generator,
}

#[derive(Debug, Clone, Serialize)]
pub struct Comment {
    pub kind: CommentKind,
    pub content: String,
    pub loc: SourceLocation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StyleScope {
    Global,
    Local,
}

/// One `selector { declarations }` rule inside a style block.
#[derive(Debug, Clone, Serialize)]
pub struct StyleRule {
    pub selector: String,
    pub body: String,
    pub loc: SourceLocation,
}

/// A property value: a literal, or a variable-group call.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Value {
    Literal(String),
    VarCall(VarCall),
}

#[derive(Debug, Clone, Serialize)]
pub struct StyleProp {
    pub name: String,
    pub value: Value,
    pub loc: SourceLocation,
}

#[derive(Debug, Clone, Serialize)]
pub struct StyleBlock {
    pub scope: StyleScope,
    pub rules: Vec<StyleRule>,
    pub props: Vec<StyleProp>,
    pub no_value_props: Vec<String>,
    /// Inherits and template/custom uses inside the block, in source order.
    pub items: Vec<Node>,
    pub auto_class: Option<String>,
    pub auto_id: Option<String>,
    pub loc: SourceLocation,
}

impl StyleBlock {
    pub fn new(scope: StyleScope, loc: SourceLocation) -> Self {
        Self {
            scope,
            rules: Vec::new(),
            props: Vec::new(),
            no_value_props: Vec::new(),
            items: Vec::new(),
            auto_class: None,
            auto_id: None,
            loc,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ScriptScope {
    Global,
    Local,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScriptBlock {
    pub scope: ScriptScope,
    pub content: String,
    pub contains_chtljs: bool,
    pub loc: SourceLocation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DefKind {
    Style,
    Element,
    Var,
}

impl DefKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DefKind::Style => "@Style",
            DefKind::Element => "@Element",
            DefKind::Var => "@Var",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Param {
    pub name: String,
    pub default: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TemplateDef {
    pub kind: DefKind,
    pub name: String,
    pub params: Vec<Param>,
    pub body: Vec<Node>,
    pub loc: SourceLocation,
}

/// A `[Custom]` definition, or a specialization use site (`@Style Name {…}`
/// inside a body), distinguished by `is_specialization`.
#[derive(Debug, Clone, Serialize)]
pub struct CustomDef {
    pub kind: DefKind,
    pub name: String,
    pub body: Vec<Node>,
    pub is_specialization: bool,
    pub has_no_value_props: bool,
    pub loc: SourceLocation,
}

/// `@Style Name;` / `inherit @Element Name;` — inheritance or plain use,
/// depending on context. `explicit` records the `inherit` keyword; `args`
/// carries call-site arguments for parameterised templates.
#[derive(Debug, Clone, Serialize)]
pub struct Inherit {
    pub base: String,
    pub kind: Option<DefKind>,
    pub explicit: bool,
    pub args: Vec<String>,
    pub loc: SourceLocation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DeleteKind {
    Property,
    Inheritance,
    Element,
    Precise,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteTarget {
    pub kind: DeleteKind,
    pub name: String,
    pub index: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Delete {
    pub targets: Vec<DeleteTarget>,
    pub loc: SourceLocation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum InsertPos {
    Before,
    After,
    Replace,
    AtTop,
    AtBottom,
    AtIndex(usize),
}

#[derive(Debug, Clone, Serialize)]
pub struct Insert {
    pub position: InsertPos,
    pub target: Option<(String, Option<usize>)>,
    pub children: Vec<Node>,
    pub loc: SourceLocation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum OriginKind {
    Html,
    Style,
    JavaScript,
    Custom(String),
}

impl OriginKind {
    /// Stable key for the symbol map.
    pub fn key(&self) -> String {
        match self {
            OriginKind::Html => "@Html".to_string(),
            OriginKind::Style => "@Style".to_string(),
            OriginKind::JavaScript => "@JavaScript".to_string(),
            OriginKind::Custom(name) => format!("@{}", name),
        }
    }
}

/// `[Origin] @Kind name? { raw }`, or a reference to a named origin when
/// `content` is empty and `name` is set.
#[derive(Debug, Clone, Serialize)]
pub struct Origin {
    pub kind: OriginKind,
    pub name: Option<String>,
    pub content: String,
    pub is_reference: bool,
    pub loc: SourceLocation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ImportKind {
    Auto,
    Style,
    Element,
    Var,
    Html,
    JavaScript,
    Chtl,
    CJmod,
    Config,
}

#[derive(Debug, Clone, Serialize)]
pub struct Import {
    pub kind: ImportKind,
    pub path: String,
    pub alias: Option<String>,
    pub items: Vec<String>,
    pub loc: SourceLocation,
}

#[derive(Debug, Clone, Serialize)]
pub struct NamespaceDef {
    pub name: String,
    pub from: Option<String>,
    pub children: Vec<Node>,
    pub loc: SourceLocation,
}

#[derive(Debug, Clone, Serialize)]
pub struct Configuration {
    pub name: Option<String>,
    pub entries: Vec<(String, String)>,
    /// `name { KEYWORD_X: alias1, alias2; }` keyword overrides.
    pub name_overrides: Vec<(String, Vec<String>)>,
    /// `origin { @Alias: @Canonical; }` custom origin-type aliases.
    pub origin_aliases: Vec<(String, String)>,
    pub loc: SourceLocation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExceptScope {
    Precise,
    Type,
    Global,
}

#[derive(Debug, Clone, Serialize)]
pub struct Except {
    pub scope: ExceptScope,
    pub targets: Vec<String>,
    pub loc: SourceLocation,
}

/// `Group(name)` / `Group(name = "override")` — also reachable as
/// `@Var Group(name)`.
#[derive(Debug, Clone, Serialize)]
pub struct VarCall {
    pub group: String,
    pub name: String,
    pub override_value: Option<String>,
    pub loc: SourceLocation,
}

/// A `key: value;` pair inside a `[Template]/[Custom] @Var` body.
#[derive(Debug, Clone, Serialize)]
pub struct VarDef {
    pub name: String,
    pub value: String,
    pub loc: SourceLocation,
}
