//! Import resolution.
//!
//! The core never touches the filesystem on its own: it consumes an
//! `ImportResolver` supplied by the host and caches resolved contents by
//! path. `FileResolver` is the reference host implementation with the
//! standard search order for bare module names.

use crate::ast::ImportKind;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Host-supplied source loader for `[Import]` directives.
pub trait ImportResolver {
    /// Resolve `path` to CHTL source text. Errors are reported verbatim as
    /// `ImportResolution` diagnostics.
    fn resolve(&self, path: &str, kind: ImportKind) -> Result<String, String>;
}

/// Content cache keyed by resolved path, with a content-hash index so the
/// same module text reached through two paths is only ingested once.
#[derive(Debug, Default)]
pub struct ImportCache {
    contents: HashMap<String, String>,
    seen_hashes: HashMap<String, String>,
}

impl ImportCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hash_of(source: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(source.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.contents.get(path).map(|s| s.as_str())
    }

    /// Store resolved content. Returns the path of a previous ingestion with
    /// identical content, if any; callers skip re-registration in that case.
    pub fn insert(&mut self, path: &str, content: String) -> Option<String> {
        let hash = Self::hash_of(&content);
        let duplicate = self.seen_hashes.get(&hash).cloned();
        if duplicate.is_none() {
            self.seen_hashes.insert(hash, path.to_string());
        }
        self.contents.insert(path.to_string(), content);
        duplicate
    }
}

/// Filesystem resolver. Bare names (no extension) are searched as
/// `<root>/module/<name>.cmod`, `<root>/module/<name>.chtl`, then the same
/// pair under `./module/` and `./`.
#[derive(Debug, Clone, Default)]
pub struct FileResolver {
    roots: Vec<PathBuf>,
}

impl FileResolver {
    pub fn new(import_paths: &[String]) -> Self {
        Self {
            roots: import_paths.iter().map(PathBuf::from).collect(),
        }
    }

    pub fn with_roots(roots: Vec<PathBuf>) -> Self {
        Self { roots }
    }

    fn candidates(&self, path: &str) -> Vec<PathBuf> {
        let has_extension = Path::new(path).extension().is_some();
        let mut out = Vec::new();
        if has_extension {
            for root in &self.roots {
                out.push(root.join(path));
            }
            out.push(PathBuf::from(path));
            return out;
        }
        for root in &self.roots {
            out.push(root.join("module").join(format!("{}.cmod", path)));
            out.push(root.join("module").join(format!("{}.chtl", path)));
        }
        out.push(PathBuf::from("./module").join(format!("{}.cmod", path)));
        out.push(PathBuf::from("./module").join(format!("{}.chtl", path)));
        out.push(PathBuf::from(format!("./{}.cmod", path)));
        out.push(PathBuf::from(format!("./{}.chtl", path)));
        out
    }

    /// Every module file visible under the configured roots. Drives the
    /// fallback search for bare names and the CLI's debug listing.
    pub fn discover_modules(&self) -> Vec<PathBuf> {
        let mut found = Vec::new();
        for root in &self.roots {
            let module_dir = root.join("module");
            if !module_dir.is_dir() {
                continue;
            }
            for entry in WalkDir::new(&module_dir)
                .max_depth(2)
                .into_iter()
                .filter_map(|e| e.ok())
            {
                let path = entry.path();
                if path
                    .extension()
                    .map_or(false, |ext| ext == "chtl" || ext == "cmod")
                {
                    found.push(path.to_path_buf());
                }
            }
        }
        found
    }
}

impl ImportResolver for FileResolver {
    fn resolve(&self, path: &str, _kind: ImportKind) -> Result<String, String> {
        for candidate in self.candidates(path) {
            if candidate.is_file() {
                return fs::read_to_string(&candidate)
                    .map_err(|e| format!("cannot read {}: {}", candidate.display(), e));
            }
        }
        // Fall back to a module scan: a bare name may live one directory
        // deeper than the fixed search order, e.g. module/space/Box.chtl.
        let stem = Path::new(path)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(path);
        for candidate in self.discover_modules() {
            if candidate.file_stem().and_then(|s| s.to_str()) == Some(stem) {
                return fs::read_to_string(&candidate)
                    .map_err(|e| format!("cannot read {}: {}", candidate.display(), e));
            }
        }
        Err(format!("module '{}' not found", path))
    }
}

/// Resolver that never finds anything; the default when the host does not
/// supply one.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullResolver;

impl ImportResolver for NullResolver {
    fn resolve(&self, path: &str, _kind: ImportKind) -> Result<String, String> {
        Err(format!("no import resolver configured (import '{}')", path))
    }
}
