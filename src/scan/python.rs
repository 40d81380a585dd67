// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use super::{parse_tree, ImportGrammar, ParseError};
use crate::config::Language;

/// Python import grammar.
///
/// Recognizes `import a.b`, `import a as x`, and `from a.b import c`
/// anywhere in a module, including inside function bodies and `try` blocks.
/// Relative imports and `from __future__` imports are never dependencies.
#[derive(Debug, Default, Clone, Copy)]
pub struct PythonGrammar;

impl ImportGrammar for PythonGrammar {
    fn language(&self) -> Language {
        Language::Python
    }

    fn extract_imports(&self, source: &str) -> Result<Vec<String>, ParseError> {
        let tree = parse_tree(&tree_sitter_python::LANGUAGE.into(), source)?;
        let bytes = source.as_bytes();
        let mut imports = Vec::new();

        let mut stack = vec![tree.root_node()];
        while let Some(node) = stack.pop() {
            match node.kind() {
                "import_statement" => {
                    let mut cursor = node.walk();
                    for name in node.children_by_field_name("name", &mut cursor) {
                        let dotted = match name.kind() {
                            "aliased_import" => name.child_by_field_name("name"),
                            _ => Some(name),
                        };

                        if let Some(text) = dotted.and_then(|node| node.utf8_text(bytes).ok()) {
                            imports.push(text.to_string());
                        }
                    }
                }
                "import_from_statement" => {
                    // INVARIANT: Relative imports always refer to local modules.
                    let module = node
                        .child_by_field_name("module_name")
                        .filter(|module| module.kind() == "dotted_name");
                    if let Some(text) = module.and_then(|node| node.utf8_text(bytes).ok()) {
                        imports.push(text.to_string());
                    }
                }
                "future_import_statement" => {}
                _ => {
                    let mut cursor = node.walk();
                    stack.extend(node.named_children(&mut cursor));
                }
            }
        }

        Ok(imports)
    }
}
