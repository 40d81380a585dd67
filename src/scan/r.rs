// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use super::{parse_tree, ImportGrammar, ParseError};
use crate::config::Language;

use tree_sitter::Node;

/// Calls whose first positional (or `package`) argument names a package.
const ATTACH_CALLS: &[&str] = &["library", "require", "requireNamespace", "loadNamespace"];

/// Calls whose positional arguments each name a package.
const BULK_CALLS: &[&str] = &["p_load"];

/// R import grammar.
///
/// Recognizes `library(pkg)`, `require(pkg)`, `requireNamespace("pkg")`,
/// `loadNamespace("pkg")`, `pacman::p_load(a, b)`, and any `pkg::fn` or
/// `pkg:::fn` namespace reference. Calls passing `character.only = TRUE`
/// hold a variable instead of a package name, so they are skipped.
#[derive(Debug, Default, Clone, Copy)]
pub struct RGrammar;

impl ImportGrammar for RGrammar {
    fn language(&self) -> Language {
        Language::R
    }

    fn extract_imports(&self, source: &str) -> Result<Vec<String>, ParseError> {
        let tree = parse_tree(&tree_sitter_r::LANGUAGE.into(), source)?;
        let bytes = source.as_bytes();
        let mut imports = Vec::new();

        let mut stack = vec![tree.root_node()];
        while let Some(node) = stack.pop() {
            match node.kind() {
                "call" => imports.extend(call_imports(node, bytes)),
                "namespace_operator" => {
                    if let Some(text) = node
                        .child_by_field_name("lhs")
                        .and_then(|lhs| name_of(lhs, bytes))
                    {
                        imports.push(text);
                    }
                }
                _ => {}
            }

            let mut cursor = node.walk();
            stack.extend(node.named_children(&mut cursor));
        }

        Ok(imports)
    }
}

fn call_imports(call: Node<'_>, bytes: &[u8]) -> Vec<String> {
    let Some(function) = call.child_by_field_name("function") else {
        return Vec::new();
    };

    let callee = match function.kind() {
        "namespace_operator" => function.child_by_field_name("rhs"),
        _ => Some(function),
    };
    let Some(callee) = callee.and_then(|node| node.utf8_text(bytes).ok()) else {
        return Vec::new();
    };

    let is_attach = ATTACH_CALLS.contains(&callee);
    let is_bulk = BULK_CALLS.contains(&callee);
    if !is_attach && !is_bulk {
        return Vec::new();
    }

    let Some(arguments) = call.child_by_field_name("arguments") else {
        return Vec::new();
    };

    let mut positional = Vec::new();
    let mut named_package = None;
    let mut cursor = arguments.walk();
    for argument in arguments
        .named_children(&mut cursor)
        .filter(|node| node.kind() == "argument")
    {
        let name = argument
            .child_by_field_name("name")
            .and_then(|name| name.utf8_text(bytes).ok());
        let value = argument.child_by_field_name("value");

        match name {
            Some("character.only") => {
                let literal = value.and_then(|value| value.utf8_text(bytes).ok());
                if matches!(literal, Some("TRUE") | Some("T")) {
                    return Vec::new();
                }
            }
            Some("package") => named_package = value.and_then(|value| name_of(value, bytes)),
            Some(_) => {}
            None => positional.extend(value.and_then(|value| name_of(value, bytes))),
        }
    }

    if is_attach {
        named_package
            .or_else(|| positional.into_iter().next())
            .into_iter()
            .collect()
    } else {
        positional
    }
}

/// Package name held by identifier or string literal.
fn name_of(node: Node<'_>, bytes: &[u8]) -> Option<String> {
    let text = node.utf8_text(bytes).ok()?;
    let name = match node.kind() {
        "identifier" => text.trim_matches('`'),
        "string" => text.trim_matches(|c| c == '"' || c == '\''),
        _ => return None,
    };

    (!name.is_empty()).then(|| name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    fn sorted(mut imports: Vec<String>) -> Vec<String> {
        imports.sort();
        imports.dedup();
        imports
    }

    #[test]
    fn extract_attach_and_namespace_forms() -> anyhow::Result<()> {
        let source = indoc! {r#"
            library(dplyr)
            require("tidyr")
            if (!requireNamespace("here", quietly = TRUE)) stop("missing")
            loadNamespace(package = "jsonlite")
            pacman::p_load(readr, stringr)
            df <- data.table::fread("data.csv")
            # library(commented)
            msg <- "library(quoted)"
        "#};

        let result = sorted(RGrammar.extract_imports(source)?);
        assert_eq!(
            result,
            vec![
                "data.table",
                "dplyr",
                "here",
                "jsonlite",
                "pacman",
                "readr",
                "stringr",
                "tidyr"
            ]
        );

        Ok(())
    }

    #[test]
    fn skip_character_only_calls() -> anyhow::Result<()> {
        let source = indoc! {r#"
            for (pkg in pkgs) library(pkg, character.only = TRUE)
            library(ggplot2)
        "#};

        assert_eq!(RGrammar.extract_imports(source)?, vec!["ggplot2"]);

        Ok(())
    }

    #[test]
    fn syntax_error_is_reported() {
        let result = RGrammar.extract_imports("library(dplyr\nx <- )\n");
        assert!(matches!(result, Err(ParseError::Syntax { .. })));
    }
}
