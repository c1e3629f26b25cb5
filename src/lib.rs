//! # chtlc — CHTL to HTML compiler
//!
//! CHTL is a brace-delimited authoring language that compiles to a single
//! HTML document with inlined CSS and JavaScript. The pipeline is strictly
//! sequential, one owned instance per compilation unit:
//!
//! ```text
//! source ─▶ UnifiedScanner ─▶ fragments
//! fragments ─▶ Lexer ─▶ tokens
//! tokens ─▶ Parser ─▶ AST
//! AST ─▶ Resolver ─▶ AST + symbol map
//! AST ─▶ Generator ─▶ HTML string
//! ```
//!
//! ## Invariants
//!
//! 1. The parser's scope and state stacks are balanced across any complete
//!    parse; a dangling push is an error.
//! 2. Names are unique per `(kind, namespace)`; re-registration is an error.
//! 3. Inheritance chains are acyclic (checked by DFS colouring).
//! 4. The symbol map is written during parse/resolve only; the generator
//!    reads it immutably.
//! 5. No I/O happens inside the core: sources come in as strings, imports go
//!    through the host's `ImportResolver`, output comes back as a string.

pub mod ast;
pub mod error;
pub mod generator;
pub mod imports;
pub mod lexer;
pub mod parser;
pub mod resolver;
pub mod scanner;
pub mod state;
pub mod symbols;
pub mod token;

#[cfg(test)]
mod scanner_tests;
#[cfg(test)]
mod parser_tests;
#[cfg(test)]
mod resolver_tests;
#[cfg(test)]
mod pipeline_tests;

use rayon::prelude::*;

pub use crate::error::{Diagnostic, DiagnosticKind, Diagnostics, Severity};
pub use crate::generator::{Generator, GeneratorOptions};
pub use crate::imports::{FileResolver, ImportResolver, NullResolver};
pub use crate::symbols::GlobalMap;

use crate::lexer::Lexer;
use crate::parser::Parser;
use crate::resolver::Resolver;
use crate::scanner::UnifiedScanner;

/// Options for one compilation unit. `minify` and `pretty_print` are
/// mutually exclusive; enabling both is a `Configuration` error.
#[derive(Debug, Clone)]
pub struct CompileOptions {
    pub pretty_print: bool,
    pub minify: bool,
    pub fragment_only: bool,
    pub debug: bool,
    pub import_paths: Vec<String>,
    pub strict: bool,
    /// Keep line/block comments in the AST for debugging dumps.
    pub preserve_comments: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            pretty_print: true,
            minify: false,
            fragment_only: false,
            debug: false,
            import_paths: Vec::new(),
            strict: true,
            preserve_comments: false,
        }
    }
}

#[derive(Debug)]
pub struct CompileResult {
    pub output: String,
    pub diagnostics: Vec<Diagnostic>,
    pub success: bool,
}

/// One compilation pipeline. Owns its symbol map; nothing is shared between
/// instances, so independent units may run on separate threads.
pub struct Compiler {
    options: CompileOptions,
}

impl Compiler {
    pub fn new(options: CompileOptions) -> Self {
        Self { options }
    }

    pub fn compile(&self, source: &str, filename: &str) -> CompileResult {
        let importer = FileResolver::new(&self.options.import_paths);
        self.compile_with_resolver(source, filename, &importer)
    }

    pub fn compile_with_resolver(
        &self,
        source: &str,
        filename: &str,
        importer: &dyn ImportResolver,
    ) -> CompileResult {
        let mut diags = Diagnostics::new(filename);

        if self.options.minify && self.options.pretty_print {
            diags.error(
                DiagnosticKind::Configuration,
                "'minify' and 'pretty-print' are mutually exclusive",
                Default::default(),
            );
        }

        let mut scanner = UnifiedScanner::new(source);
        let fragments = match scanner.scan(&diags) {
            Ok(f) => f,
            Err(fatal) => {
                diags.push(fatal);
                let success = diags.success(self.options.strict);
                return CompileResult {
                    output: String::new(),
                    diagnostics: diags.into_list(),
                    success,
                };
            }
        };

        let mut lexer = Lexer::new(source, &fragments);
        let tokens = lexer.tokenize(&mut diags, self.options.preserve_comments);

        let mut parser = Parser::new(source, tokens);
        let mut document = parser.parse_document(&mut diags);

        let mut map = GlobalMap::new();
        let mut resolver = Resolver::new(&mut map, importer);
        resolver.run(&mut document, &mut diags);

        let gen_options = GeneratorOptions {
            pretty_print: self.options.pretty_print && !self.options.minify,
            minify: self.options.minify,
            fragment_only: self.options.fragment_only,
            debug: self.options.debug,
        };
        let output = Generator::new(&map, gen_options).generate(&document);

        let success = diags.success(self.options.strict);
        CompileResult {
            output,
            diagnostics: diags.into_list(),
            success,
        }
    }

    /// Parse only, returning the AST as JSON (the `--ast` dump).
    pub fn parse_to_json(&self, source: &str, filename: &str) -> (Option<String>, Vec<Diagnostic>) {
        let mut diags = Diagnostics::new(filename);
        let mut scanner = UnifiedScanner::new(source);
        let fragments = match scanner.scan(&diags) {
            Ok(f) => f,
            Err(fatal) => {
                diags.push(fatal);
                return (None, diags.into_list());
            }
        };
        let mut lexer = Lexer::new(source, &fragments);
        let tokens = lexer.tokenize(&mut diags, self.options.preserve_comments);
        let mut parser = Parser::new(source, tokens);
        let document = parser.parse_document(&mut diags);
        let json = serde_json::to_string_pretty(&document).ok();
        (json, diags.into_list())
    }
}

/// Compile a single unit with the given options.
pub fn compile(source: &str, filename: &str, options: CompileOptions) -> CompileResult {
    Compiler::new(options).compile(source, filename)
}

/// Compile independent units in parallel. Each unit gets its own pipeline
/// instance; no symbol map, scope stack or AST crosses a thread boundary.
pub fn compile_units(units: &[(String, String)], options: &CompileOptions) -> Vec<CompileResult> {
    units
        .par_iter()
        .map(|(source, filename)| Compiler::new(options.clone()).compile(source, filename))
        .collect()
}
