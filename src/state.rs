//! Syntactic-context and scope tracking for the parser.
//!
//! Both stacks are balanced across any complete parse: every production that
//! opens a `{` pushes, the matching `}` pops, on every exit path. Push and
//! pop counters let tests assert the balance invariant directly. State
//! transitions are validated against a closed table; `Error` is reachable
//! from every state.

use crate::token::SourceLocation;
use lazy_static::lazy_static;
use serde::Serialize;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ParserState {
    Initial,
    Global,
    InElement,
    InElementAttributes,
    InTextNode,
    InLocalStyle,
    InGlobalStyle,
    InStyleRule,
    InLocalScript,
    InGlobalScript,
    InTemplateStyle,
    InTemplateElement,
    InTemplateVar,
    InCustomStyle,
    InCustomElement,
    InCustomVar,
    InSpecialization,
    InOriginHtml,
    InOriginStyle,
    InOriginScript,
    InOriginCustom,
    InImport,
    InConfiguration,
    InNamespace,
    InLineComment,
    InBlockComment,
    InGeneratorComment,
    InString,
    Error,
}

/// States legal at the top level of a document or namespace body.
const TOP_LEVEL: &[ParserState] = &[
    ParserState::InElement,
    ParserState::InTextNode,
    ParserState::InGlobalStyle,
    ParserState::InGlobalScript,
    ParserState::InTemplateStyle,
    ParserState::InTemplateElement,
    ParserState::InTemplateVar,
    ParserState::InCustomStyle,
    ParserState::InCustomElement,
    ParserState::InCustomVar,
    ParserState::InOriginHtml,
    ParserState::InOriginStyle,
    ParserState::InOriginScript,
    ParserState::InOriginCustom,
    ParserState::InImport,
    ParserState::InConfiguration,
    ParserState::InNamespace,
    ParserState::InLineComment,
    ParserState::InBlockComment,
    ParserState::InGeneratorComment,
];

lazy_static! {
    static ref TRANSITIONS: HashMap<ParserState, HashSet<ParserState>> = {
        use ParserState::*;
        let mut m: HashMap<ParserState, HashSet<ParserState>> = HashMap::new();
        let mut allow = |from: ParserState, to: &[ParserState]| {
            m.entry(from).or_default().extend(to.iter().copied());
        };

        allow(Initial, &[Global]);
        allow(Global, TOP_LEVEL);
        allow(
            InElement,
            &[
                InElement,
                InElementAttributes,
                InTextNode,
                InLocalStyle,
                InLocalScript,
                InOriginHtml,
                InOriginStyle,
                InOriginScript,
                InOriginCustom,
                InSpecialization,
                InLineComment,
                InBlockComment,
                InGeneratorComment,
                InString,
            ],
        );
        allow(InElementAttributes, &[InString]);
        allow(InTextNode, &[InString, InLineComment, InBlockComment, InGeneratorComment]);
        allow(
            InLocalStyle,
            &[InStyleRule, InSpecialization, InString, InLineComment, InBlockComment, InGeneratorComment],
        );
        allow(InGlobalStyle, &[InStyleRule, InString]);
        allow(InStyleRule, &[InStyleRule, InString]);
        allow(InLocalScript, &[InString]);
        allow(InGlobalScript, &[InString]);
        allow(InTemplateStyle, &[InString, InLineComment, InBlockComment, InGeneratorComment]);
        allow(InTemplateElement, TOP_LEVEL);
        allow(InTemplateElement, &[InSpecialization, InString]);
        allow(InTemplateVar, &[InString]);
        allow(InCustomStyle, &[InSpecialization, InString, InLineComment, InBlockComment, InGeneratorComment]);
        allow(InCustomElement, TOP_LEVEL);
        allow(InCustomElement, &[InSpecialization, InString]);
        allow(InCustomVar, &[InString]);
        allow(
            InSpecialization,
            &[InElement, InTextNode, InSpecialization, InString, InLineComment, InBlockComment, InGeneratorComment],
        );
        allow(InNamespace, TOP_LEVEL);
        allow(InConfiguration, &[InConfiguration, InString]);
        allow(InImport, &[InString]);

        // Error is reachable from every state.
        let states = [
            Initial, Global, InElement, InElementAttributes, InTextNode, InLocalStyle,
            InGlobalStyle, InStyleRule, InLocalScript, InGlobalScript, InTemplateStyle,
            InTemplateElement, InTemplateVar, InCustomStyle, InCustomElement, InCustomVar,
            InSpecialization, InOriginHtml, InOriginStyle, InOriginScript, InOriginCustom,
            InImport, InConfiguration, InNamespace, InLineComment, InBlockComment,
            InGeneratorComment, InString, Error,
        ];
        for s in states {
            m.entry(s).or_default().insert(Error);
        }
        m
    };
}

pub fn is_valid_transition(from: ParserState, to: ParserState) -> bool {
    TRANSITIONS
        .get(&from)
        .map(|set| set.contains(&to))
        .unwrap_or(false)
}

#[derive(Debug, Clone)]
pub struct StateFrame {
    pub state: ParserState,
    pub loc: SourceLocation,
}

/// Stack of syntactic-context frames with push/pop accounting.
#[derive(Debug)]
pub struct StateStack {
    frames: Vec<StateFrame>,
    pushes: usize,
    pops: usize,
}

impl StateStack {
    pub fn new() -> Self {
        Self {
            frames: vec![StateFrame {
                state: ParserState::Initial,
                loc: SourceLocation::default(),
            }],
            pushes: 0,
            pops: 0,
        }
    }

    pub fn current(&self) -> ParserState {
        self.frames.last().map(|f| f.state).unwrap_or(ParserState::Initial)
    }

    /// Push a state. Returns false when the transition is not in the closed
    /// table; the state is pushed regardless so the stacks stay balanced.
    pub fn push(&mut self, state: ParserState, loc: SourceLocation) -> bool {
        let legal = is_valid_transition(self.current(), state);
        self.frames.push(StateFrame { state, loc });
        self.pushes += 1;
        legal
    }

    pub fn pop(&mut self) -> Option<StateFrame> {
        if self.frames.len() <= 1 {
            return None;
        }
        self.pops += 1;
        self.frames.pop()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn pushes(&self) -> usize {
        self.pushes
    }

    pub fn pops(&self) -> usize {
        self.pops
    }

    pub fn is_balanced(&self) -> bool {
        self.frames.len() == 1 && self.pushes == self.pops
    }

    /// Innermost unclosed frame, for end-of-file error messages.
    pub fn innermost(&self) -> Option<&StateFrame> {
        if self.frames.len() > 1 {
            self.frames.last()
        } else {
            None
        }
    }

    pub fn is_in_element(&self) -> bool {
        self.frames
            .iter()
            .any(|f| matches!(f.state, ParserState::InElement | ParserState::InSpecialization))
    }
}

impl Default for StateStack {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ScopeKind {
    Global,
    Element,
    Template,
    Custom,
    Namespace,
    Specialization,
}

/// A lexical scope frame. `forbidden` holds `except` targets declared in
/// this scope; a target is forbidden if any enclosing frame forbids it.
#[derive(Debug, Clone)]
pub struct ScopeFrame {
    pub name: String,
    pub kind: ScopeKind,
    pub forbidden: Vec<String>,
    pub loc: SourceLocation,
}

#[derive(Debug)]
pub struct ScopeStack {
    frames: Vec<ScopeFrame>,
    pushes: usize,
    pops: usize,
}

impl ScopeStack {
    pub fn new() -> Self {
        Self {
            frames: vec![ScopeFrame {
                name: String::new(),
                kind: ScopeKind::Global,
                forbidden: Vec::new(),
                loc: SourceLocation::default(),
            }],
            pushes: 0,
            pops: 0,
        }
    }

    pub fn push(&mut self, name: impl Into<String>, kind: ScopeKind, loc: SourceLocation) {
        self.frames.push(ScopeFrame {
            name: name.into(),
            kind,
            forbidden: Vec::new(),
            loc,
        });
        self.pushes += 1;
    }

    pub fn pop(&mut self) -> Option<ScopeFrame> {
        if self.frames.len() <= 1 {
            return None;
        }
        self.pops += 1;
        self.frames.pop()
    }

    pub fn forbid(&mut self, target: impl Into<String>) {
        if let Some(frame) = self.frames.last_mut() {
            frame.forbidden.push(target.into());
        }
    }

    /// Constraint lookup across the whole chain: innermost match wins.
    pub fn forbidden_by(&self, target: &str) -> Option<&ScopeFrame> {
        self.frames
            .iter()
            .rev()
            .find(|f| f.forbidden.iter().any(|t| t == target))
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn pushes(&self) -> usize {
        self.pushes
    }

    pub fn pops(&self) -> usize {
        self.pops
    }

    pub fn is_balanced(&self) -> bool {
        self.frames.len() == 1 && self.pushes == self.pops
    }
}

impl Default for ScopeStack {
    fn default() -> Self {
        Self::new()
    }
}
