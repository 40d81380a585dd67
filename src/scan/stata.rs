// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use super::{ImportGrammar, ParseError};
use crate::config::Language;

/// Command prefixes that can precede an install command.
const PREFIXES: &[&str] = &["capture", "cap", "quietly", "qui", "noisily", "noi"];

/// Stata import grammar.
///
/// User-written Stata packages are pulled in by `ssc install pkg` or
/// `net install pkg`, so those commands are the import statements. Comments
/// in all three Stata forms are stripped first: `*` at the start of a line,
/// `//` to end of line, and nestable `/* */` blocks. The `///` line
/// continuation joins two physical lines.
#[derive(Debug, Default, Clone, Copy)]
pub struct StataGrammar;

impl ImportGrammar for StataGrammar {
    fn language(&self) -> Language {
        Language::Stata
    }

    fn extract_imports(&self, source: &str) -> Result<Vec<String>, ParseError> {
        let mut imports = Vec::new();
        for command in commands(source)? {
            let mut words = command
                .split_whitespace()
                .map(|word| word.trim_end_matches(':'))
                .skip_while(|word| PREFIXES.contains(word));

            let (Some(tool), Some(verb), Some(name)) = (words.next(), words.next(), words.next())
            else {
                continue;
            };

            let is_installer = matches!(tool, "ssc" | "net");
            let is_install = verb.len() >= 4 && "install".starts_with(verb);
            if is_installer && is_install {
                let name = name.split(',').next().unwrap_or_default().trim();
                if !name.is_empty() {
                    imports.push(name.to_string());
                }
            }
        }

        Ok(imports)
    }
}

/// Strip comments and join continued lines into logical commands.
fn commands(source: &str) -> Result<Vec<String>, ParseError> {
    let mut commands = Vec::new();
    let mut current = String::new();
    let mut block_depth = 0usize;
    let mut block_start = 0usize;

    for (index, line) in source.lines().enumerate() {
        let number = index + 1;
        if block_depth == 0 && current.is_empty() && line.trim_start().starts_with('*') {
            continue;
        }

        let mut chars = line.chars().peekable();
        let mut in_string = false;
        let mut continued = false;
        let mut previous = ' ';
        while let Some(c) = chars.next() {
            if block_depth > 0 {
                match (c, chars.peek()) {
                    ('*', Some('/')) => {
                        chars.next();
                        block_depth -= 1;
                    }
                    ('/', Some('*')) => {
                        chars.next();
                        block_depth += 1;
                    }
                    _ => {}
                }
                previous = ' ';
                continue;
            }

            match (c, chars.peek()) {
                ('"', _) => {
                    in_string = !in_string;
                    current.push(c);
                }
                _ if in_string => current.push(c),
                ('/', Some('*')) => {
                    chars.next();
                    block_depth += 1;
                    block_start = number;
                }
                ('/', Some('/')) if previous.is_whitespace() => {
                    continued = chars.clone().nth(1) == Some('/');
                    break;
                }
                _ => current.push(c),
            }
            previous = c;
        }

        if continued || block_depth > 0 {
            current.push(' ');
            continue;
        }

        commands.push(std::mem::take(&mut current));
    }

    if block_depth > 0 {
        return Err(ParseError::Unterminated {
            what: "block comment",
            line: block_start,
        });
    }

    if !current.trim().is_empty() {
        commands.push(current);
    }

    Ok(commands)
}
