// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Notebook code cell extraction.
//!
//! Jupyter notebooks are JSON documents whose code cells hold the source.
//! R Markdown and Quarto documents hold their source in fenced chunks whose
//! info string names the engine, e.g., ```` ```{r setup} ````. Everything
//! else in these documents is prose, and must never reach a grammar.

use super::ParseError;
use crate::config::Language;

use serde::Deserialize;
use serde_json::Value;
use std::path::Path;

/// Cell magics whose body is still Python.
const PYTHON_CELL_MAGICS: &[&str] = &["capture", "prun", "python", "python3", "time", "timeit"];

#[derive(Debug, Deserialize)]
struct Notebook {
    #[serde(default)]
    cells: Vec<Cell>,
}

#[derive(Debug, Deserialize)]
struct Cell {
    cell_type: String,

    #[serde(default)]
    source: Value,
}

/// Reduce file content to the code a grammar should parse.
///
/// Plain source files pass through untouched.
pub(super) fn code_of(path: &Path, language: Language, text: String) -> Result<String, ParseError> {
    let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or_default();
    if !language.notebook_extensions().contains(&extension) {
        return Ok(text);
    }

    match extension {
        "ipynb" => jupyter_code(&text),
        _ => fenced_code(&text, "r"),
    }
}

/// Join code cells of Jupyter notebook.
///
/// IPython magics and shell escapes are dropped. Cells run through a cell
/// magic like `%%bash` hold another language entirely, and are skipped.
pub(super) fn jupyter_code(text: &str) -> Result<String, ParseError> {
    let notebook: Notebook =
        serde_json::from_str(text).map_err(|err| ParseError::Notebook(err.to_string()))?;

    let mut cells = Vec::new();
    for cell in notebook.cells.iter().filter(|cell| cell.cell_type == "code") {
        let source = match &cell.source {
            Value::String(source) => source.clone(),
            Value::Array(lines) => lines.iter().filter_map(Value::as_str).collect::<String>(),
            Value::Null => String::new(),
            _ => return Err(ParseError::Notebook("cell source is not text".into())),
        };

        if foreign_cell_magic(&source) {
            continue;
        }

        let code = source
            .lines()
            .filter(|line| {
                let line = line.trim_start();
                !line.starts_with('%') && !line.starts_with('!')
            })
            .collect::<Vec<_>>()
            .join("\n");
        cells.push(code);
    }

    Ok(cells.join("\n"))
}

fn foreign_cell_magic(source: &str) -> bool {
    let Some(magic) = source
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .and_then(|line| line.strip_prefix("%%"))
    else {
        return false;
    };

    let name = magic.split_whitespace().next().unwrap_or_default();
    !PYTHON_CELL_MAGICS.contains(&name)
}

/// Join fenced code chunks that run on target engine.
pub(super) fn fenced_code(text: &str, engine: &str) -> Result<String, ParseError> {
    let mut code = Vec::new();
    let mut open: Option<(usize, bool)> = None;

    for (index, line) in text.lines().enumerate() {
        let trimmed = line.trim_start();
        match open {
            None => {
                if let Some(info) = trimmed.strip_prefix("```") {
                    open = Some((index + 1, runs_on(info, engine)));
                }
            }
            Some((_, keep)) => {
                if trimmed.starts_with("```") && trimmed.trim_end() == "```" {
                    open = None;
                } else if keep {
                    code.push(line);
                }
            }
        }
    }

    if let Some((line, _)) = open {
        return Err(ParseError::Unterminated {
            what: "code chunk",
            line,
        });
    }

    Ok(code.join("\n"))
}

fn runs_on(info: &str, engine: &str) -> bool {
    let info = info.trim();
    let Some(inner) = info.strip_prefix('{') else {
        return false;
    };

    inner
        .trim_end_matches('}')
        .split([' ', ',', '}'])
        .next()
        .is_some_and(|name| name.eq_ignore_ascii_case(engine))
}
