// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Import scanning.
//!
//! Walk a source tree and discover the set of distinct top-level packages its
//! source files import. Each supported language supplies an
//! [`ImportGrammar`] that parses source text with the language's own syntax
//! rules, so imports mentioned inside comments or strings never count.
//!
//! A file that fails to parse is skipped with a warning. The rest of the scan
//! carries on regardless. Notebook formats are reduced to their code cells
//! before parsing.
//!
//! # See Also
//!
//! - [`tree-sitter`](https://tree-sitter.github.io/tree-sitter/)
//! - [`ignore::WalkBuilder`](https://docs.rs/ignore/latest/ignore/struct.WalkBuilder.html)

mod matlab;
mod notebook;
mod python;
mod r;
mod stata;

pub use matlab::MatlabGrammar;
pub use python::PythonGrammar;
pub use r::RGrammar;
pub use stata::StataGrammar;

use crate::{config::Language, path::relative_posix};

use ignore::WalkBuilder;
use std::{
    collections::{BTreeSet, HashSet},
    fs::read,
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument, warn};

/// Directories that are never walked.
pub const SKIP_DIRS: &[&str] = &[
    "renv",
    ".git",
    "__pycache__",
    ".ipynb_checkpoints",
    "node_modules",
];

/// Extract import statements from source text of one language.
pub trait ImportGrammar {
    /// Language this grammar understands.
    fn language(&self) -> Language;

    /// Extract raw imported module paths from source text.
    ///
    /// Returned paths may be dotted submodule paths. Reduction to the
    /// top-level package is done by the caller.
    ///
    /// # Errors
    ///
    /// - Return [`ParseError`] if source text is not syntactically valid.
    fn extract_imports(&self, source: &str) -> Result<Vec<String>, ParseError>;
}

/// Membership test for the standard library of a language runtime.
pub trait StandardLibrary {
    /// Check if module name belongs to the standard library.
    fn contains(&self, name: &str) -> bool;
}

impl StandardLibrary for HashSet<String> {
    fn contains(&self, name: &str) -> bool {
        HashSet::contains(self, name)
    }
}

impl StandardLibrary for BTreeSet<String> {
    fn contains(&self, name: &str) -> bool {
        BTreeSet::contains(self, name)
    }
}

/// Select import grammar for target language.
pub fn grammar_for(language: Language) -> Box<dyn ImportGrammar> {
    match language {
        Language::Python => Box::new(PythonGrammar),
        Language::R => Box::new(RGrammar),
        Language::Matlab => Box::new(MatlabGrammar),
        Language::Stata => Box::new(StataGrammar),
    }
}

/// Reduce dotted module path to its top-level package.
pub fn top_level(module: &str) -> &str {
    module.split('.').next().unwrap_or(module).trim()
}

/// Source file that was visited during a scan.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ScannedFile {
    /// Path relative to scan root, with forward slashes.
    pub path: String,

    /// Whether the file failed to parse.
    pub parse_error: bool,
}

/// Result of scanning a source tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Every visited file, sorted by path.
    pub files: Vec<ScannedFile>,

    /// Distinct top-level external packages.
    pub packages: BTreeSet<String>,

    /// Human readable warnings for files that were skipped.
    pub warnings: Vec<String>,
}

/// Scan source tree for imported packages.
///
/// Only files belonging to target language are visited. Standard library
/// modules are filtered out through `stdlib`. Package names matching the
/// stem of a scanned file, or the name of a directory holding an
/// `__init__` file, are treated as local modules and excluded. Other
/// directory names never hide a package.
///
/// # Errors
///
/// - Return [`ScanError::MissingRoot`] if root is not a directory.
/// - Return [`ScanError::Walk`] if source tree cannot be walked.
/// - Return [`ScanError::ReadSource`] if a matching file cannot be read.
#[instrument(skip(root, stdlib), level = "debug")]
pub fn scan<S>(root: impl AsRef<Path>, language: Language, stdlib: &S) -> Result<ScanReport>
where
    S: StandardLibrary + ?Sized,
{
    let root = root.as_ref();
    if !root.is_dir() {
        return Err(ScanError::MissingRoot {
            path: root.to_path_buf(),
        });
    }

    let grammar = grammar_for(language);
    let mut report = ScanReport::default();
    let mut imports = BTreeSet::new();
    let mut local = HashSet::new();

    for path in source_files(root, language)? {
        let relative = relative_posix(&path, root);
        local_names(&relative, &mut local);

        let bytes = read(&path).map_err(|err| ScanError::ReadSource {
            source: err,
            path: path.clone(),
        })?;

        let result = String::from_utf8(bytes)
            .map_err(|_| ParseError::Utf8)
            .and_then(|text| notebook::code_of(&path, language, text))
            .and_then(|code| grammar.extract_imports(&code));

        match result {
            Ok(found) => {
                debug!("found {} imports in {relative:?}", found.len());
                imports.extend(found.iter().map(|module| top_level(module).to_string()));
                report.files.push(ScannedFile {
                    path: relative,
                    parse_error: false,
                });
            }
            Err(error) => {
                warn!("skipping {relative:?}: {error}");
                report.warnings.push(format!("{relative}: {error}"));
                report.files.push(ScannedFile {
                    path: relative,
                    parse_error: true,
                });
            }
        }
    }

    report.files.sort();
    report.packages = imports
        .into_iter()
        .filter(|name| !name.is_empty())
        .filter(|name| !stdlib.contains(name))
        .filter(|name| !local.contains(name))
        .collect();

    info!(
        "scanned {} {language} files, found {} packages",
        report.files.len(),
        report.packages.len()
    );

    Ok(report)
}

fn source_files(root: &Path, language: Language) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let walker = WalkBuilder::new(root)
        .require_git(false)
        .filter_entry(|entry| {
            let skipped = entry.file_type().is_some_and(|kind| kind.is_dir())
                && entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| SKIP_DIRS.contains(&name));
            !skipped
        })
        .build();

    for entry in walker {
        let entry = entry?;
        if entry.file_type().is_some_and(|kind| kind.is_file()) && language.matches(entry.path()) {
            files.push(entry.into_path());
        }
    }

    files.sort();
    Ok(files)
}

fn local_names(relative: &str, local: &mut HashSet<String>) {
    let path = Path::new(relative);
    let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
        return;
    };

    // INVARIANT: A plain folder is not a module, only a package marked by `__init__`.
    if stem == "__init__" {
        if let Some(package) = path
            .parent()
            .and_then(Path::file_name)
            .and_then(|name| name.to_str())
        {
            local.insert(package.to_string());
        }
        return;
    }

    local.insert(stem.to_string());
}

/// Parse source text with tree-sitter grammar.
///
/// Any error or missing node in the resulting tree is a parse failure.
pub(crate) fn parse_tree(
    language: &tree_sitter::Language,
    source: &str,
) -> Result<tree_sitter::Tree, ParseError> {
    let mut parser = tree_sitter::Parser::new();
    parser.set_language(language)?;
    let tree = parser.parse(source, None).ok_or(ParseError::NoTree)?;

    let root = tree.root_node();
    if root.has_error() {
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            if node.is_error() || node.is_missing() {
                let point = node.start_position();
                return Err(ParseError::Syntax {
                    line: point.row + 1,
                    column: point.column + 1,
                });
            }

            let mut cursor = node.walk();
            stack.extend(node.children(&mut cursor).filter(|child| child.has_error()));
        }

        return Err(ParseError::Syntax { line: 1, column: 1 });
    }

    Ok(tree)
}

/// Source parsing error types.
///
/// These never abort a scan. They only mark a single file as skipped.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// Source text contains a syntax error.
    #[error("syntax error at line {line}, column {column}")]
    Syntax { line: usize, column: usize },

    /// Parser gave up without producing a tree.
    #[error("parser produced no syntax tree")]
    NoTree,

    /// Grammar is incompatible with linked tree-sitter runtime.
    #[error(transparent)]
    Grammar(#[from] tree_sitter::LanguageError),

    /// Source text is not valid UTF-8.
    #[error("source is not valid UTF-8")]
    Utf8,

    /// Notebook document is malformed.
    #[error("malformed notebook: {0}")]
    Notebook(String),

    /// Block comment or string runs past end of input.
    #[error("unterminated {what} starting at line {line}")]
    Unterminated { what: &'static str, line: usize },
}

/// Scanning error types.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    /// Scan root does not exist or is not a directory.
    #[error("source directory {:?} does not exist", path.display())]
    MissingRoot { path: PathBuf },

    /// Failed to walk source tree.
    #[error(transparent)]
    Walk(#[from] ignore::Error),

    /// Failed to read source file.
    #[error("failed to read source file at {:?}", path.display())]
    ReadSource {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = ScanError> = std::result::Result<T, E>;
