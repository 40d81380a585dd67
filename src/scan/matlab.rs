// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use super::{ImportGrammar, ParseError};
use crate::config::Language;

/// MATLAB import grammar.
///
/// Recognizes command syntax `import pkg.sub.*` and function syntax
/// `import('pkg.sub')`. A small lexer strips line comments, block comments,
/// and string literals first, so none of them can produce an import.
#[derive(Debug, Default, Clone, Copy)]
pub struct MatlabGrammar;

impl ImportGrammar for MatlabGrammar {
    fn language(&self) -> Language {
        Language::Matlab
    }

    fn extract_imports(&self, source: &str) -> Result<Vec<String>, ParseError> {
        let mut imports = Vec::new();
        for statement in statements(&lex(source)?) {
            let [Token::Word(keyword), rest @ ..] = statement else {
                continue;
            };
            if keyword != "import" {
                continue;
            }

            match rest {
                [Token::Punct('('), args @ ..] => {
                    imports.extend(args.iter().filter_map(|token| match token {
                        Token::Str(text) => Some(text.trim_end_matches(".*").to_string()),
                        _ => None,
                    }));
                }
                words => {
                    for token in words {
                        match token {
                            Token::Word(word) => imports.push(word.trim_end_matches(".*").to_string()),
                            _ => break,
                        }
                    }
                }
            }
        }

        Ok(imports)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Word(String),
    Str(String),
    Punct(char),
    Newline,
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '.' | '*')
}

fn lex(source: &str) -> Result<Vec<Token>, ParseError> {
    let mut tokens = Vec::new();
    let mut block_start: Option<usize> = None;
    let mut block_depth = 0usize;

    for (index, line) in source.lines().enumerate() {
        let number = index + 1;
        let trimmed = line.trim();

        // INVARIANT: Block comment markers must sit alone on their line.
        if trimmed == "%{" {
            block_depth += 1;
            block_start.get_or_insert(number);
            continue;
        }
        if block_depth > 0 {
            if trimmed == "%}" {
                block_depth -= 1;
                if block_depth == 0 {
                    block_start = None;
                }
            }
            continue;
        }

        let mut chars = line.chars().peekable();
        let mut continued = false;
        while let Some(c) = chars.next() {
            match c {
                '%' => break,
                '.' if line_rest_starts_with(&chars, "..") => {
                    continued = true;
                    break;
                }
                '"' => tokens.push(Token::Str(string_literal(&mut chars, '"', number)?)),
                '\'' if !is_transpose(tokens.last()) => {
                    tokens.push(Token::Str(string_literal(&mut chars, '\'', number)?))
                }
                c if is_word_char(c) => {
                    let mut word = String::from(c);
                    while let Some(&next) = chars.peek() {
                        if !is_word_char(next) || (next == '.' && line_rest_starts_with(&chars, "...")) {
                            break;
                        }
                        word.push(next);
                        chars.next();
                    }
                    tokens.push(Token::Word(word));
                }
                c if c.is_whitespace() => {}
                c => tokens.push(Token::Punct(c)),
            }
        }

        if !continued {
            tokens.push(Token::Newline);
        }
    }

    if let Some(line) = block_start {
        return Err(ParseError::Unterminated {
            what: "block comment",
            line,
        });
    }

    Ok(tokens)
}

fn line_rest_starts_with(chars: &std::iter::Peekable<std::str::Chars<'_>>, prefix: &str) -> bool {
    chars.clone().take(prefix.len()).eq(prefix.chars())
}

fn is_transpose(previous: Option<&Token>) -> bool {
    matches!(
        previous,
        Some(Token::Word(_)) | Some(Token::Str(_)) | Some(Token::Punct(')' | ']' | '}' | '\''))
    )
}

fn string_literal(
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
    quote: char,
    line: usize,
) -> Result<String, ParseError> {
    let mut text = String::new();
    while let Some(c) = chars.next() {
        if c == quote {
            // INVARIANT: Doubled quote is an escaped quote.
            if chars.peek() == Some(&quote) {
                chars.next();
                text.push(quote);
                continue;
            }
            return Ok(text);
        }
        text.push(c);
    }

    Err(ParseError::Unterminated {
        what: "string literal",
        line,
    })
}

/// Split token stream into statements on newlines, semicolons, and commas
/// outside of brackets.
fn statements(tokens: &[Token]) -> Vec<&[Token]> {
    let mut statements = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;

    for (index, token) in tokens.iter().enumerate() {
        match token {
            Token::Punct('(' | '[' | '{') => depth += 1,
            Token::Punct(')' | ']' | '}') => depth = depth.saturating_sub(1),
            Token::Newline | Token::Punct(';') => {
                statements.push(&tokens[start..index]);
                start = index + 1;
                depth = 0;
            }
            Token::Punct(',') if depth == 0 => {
                statements.push(&tokens[start..index]);
                start = index + 1;
            }
            _ => {}
        }
    }
    statements.push(&tokens[start..]);

    statements
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    #[test]
    fn extract_command_and_function_forms() -> anyhow::Result<()> {
        let source = indoc! {r#"
            import matlab.io.*
            import mlreportgen.dom.* mlreportgen.report.*
            x = 1; import('parallel.pool.*');
            % import commented.*
            %{
            import blocked.*
            %}
            msg = 'import quoted.*';
            y = x';
        "#};

        let result = MatlabGrammar.extract_imports(source)?;
        assert_eq!(
            result,
            vec![
                "matlab.io",
                "mlreportgen.dom",
                "mlreportgen.report",
                "parallel.pool"
            ]
        );

        Ok(())
    }

    #[test]
    fn unterminated_block_comment_fails() {
        let result = MatlabGrammar.extract_imports("%{\nimport x.*\n");
        assert!(matches!(
            result,
            Err(ParseError::Unterminated { line: 1, .. })
        ));
    }

    #[test]
    fn unterminated_string_fails() {
        let result = MatlabGrammar.extract_imports("disp('oops\n");
        assert!(matches!(result, Err(ParseError::Unterminated { .. })));
    }
}
