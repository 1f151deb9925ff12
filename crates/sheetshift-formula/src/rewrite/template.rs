//! Replacement templates for incompatibility rules
//!
//! Placeholders:
//!
//! - `{name}`: the matched function name as written (already in target spelling)
//! - `{sep}`: the call's argument separator
//! - `{argN}`: tokens of argument N (1-based), copied verbatim
//! - `{argN.text}`: content of string-literal argument N, without quotes
//! - `{argN.sheet}`: like `.text`, renamed through the job's sheet renames and quoted as a
//!   sheet name when the name needs it
//! - `{args:A..B}`, `{args:A..}`: arguments A through B (or the last), original separators kept
//!
//! `{{` and `}}` produce literal braces.

use super::call::CallNode;
use crate::error::TemplateError;
use crate::lexer::{tokenize, tokenize_fragment, LexOptions};
use crate::sheets::SheetRenames;
use crate::token::Token;
use sheetshift_core::sheet_name_needs_quotes;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Literal(String),
    Name,
    Separator,
    Arg(usize),
    ArgText(usize),
    ArgSheet(usize),
    Args { first: usize, last: Option<usize> },
}

/// A parsed, validated replacement template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
    parts: Vec<Part>,
}

impl Template {
    /// Parse a template and check that it expands to a well-formed formula
    pub fn parse(text: &str) -> Result<Self, TemplateError> {
        let mut parts = Vec::new();
        let mut literal = String::new();
        let mut chars = text.char_indices().peekable();

        while let Some((idx, c)) = chars.next() {
            let doubled = chars.peek().map(|&(_, next)| next) == Some(c);
            match c {
                '{' | '}' if doubled => {
                    chars.next();
                    literal.push(c);
                }
                '{' => {
                    let len = text[idx + 1..]
                        .find('}')
                        .ok_or(TemplateError::UnclosedPlaceholder(idx))?;
                    let end = idx + 1 + len;
                    if !literal.is_empty() {
                        parts.push(Part::Literal(std::mem::take(&mut literal)));
                    }
                    parts.push(parse_placeholder(&text[idx + 1..end])?);
                    while chars.peek().map_or(false, |&(j, _)| j <= end) {
                        chars.next();
                    }
                }
                '}' => return Err(TemplateError::StrayBrace(idx)),
                _ => literal.push(c),
            }
        }
        if !literal.is_empty() {
            parts.push(Part::Literal(literal));
        }

        let template = Self {
            source: text.to_string(),
            parts,
        };
        tokenize(&template.sample())?;
        Ok(template)
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Highest argument position the template reads
    pub fn max_argument(&self) -> usize {
        self.parts
            .iter()
            .map(|part| match part {
                Part::Arg(n) | Part::ArgText(n) | Part::ArgSheet(n) => *n,
                // An open-ended list may be empty
                Part::Args { last, .. } => last.unwrap_or(0),
                _ => 0,
            })
            .max()
            .unwrap_or(0)
    }

    /// Positions whose string-literal content is read
    pub fn text_arguments(&self) -> Vec<usize> {
        self.parts
            .iter()
            .filter_map(|part| match part {
                Part::ArgText(n) | Part::ArgSheet(n) => Some(*n),
                _ => None,
            })
            .collect()
    }

    /// Text with placeholders replaced by neutral stand-ins
    fn sample(&self) -> String {
        self.parts
            .iter()
            .map(|part| match part {
                Part::Literal(text) => text.as_str(),
                Part::Name => "F",
                Part::Separator => ",",
                Part::ArgText(_) | Part::ArgSheet(_) => "x",
                Part::Arg(_) | Part::Args { .. } => "0",
            })
            .collect()
    }

    /// Expand for one call. `None` when the call lacks an argument the template reads.
    pub(crate) fn instantiate(
        &self,
        call: &CallNode,
        tokens: &[Token],
        fallback_separator: &Token,
        renames: &SheetRenames,
    ) -> Option<Vec<Token>> {
        let separator = call.separator(tokens).unwrap_or(fallback_separator);
        let sep_char = separator.text().chars().next()?;
        let options = LexOptions {
            arg_separator: sep_char,
            decimal_separator: if sep_char == ',' { '.' } else { ',' },
            ..LexOptions::default()
        };

        let mut out = Vec::new();
        let mut pending = String::new();
        for part in &self.parts {
            match part {
                Part::Literal(text) => pending.push_str(text),
                Part::Name => pending.push_str(tokens[call.name].text()),
                Part::Separator => pending.push_str(separator.text()),
                Part::ArgText(n) => pending.push_str(raw_string_content(call, tokens, *n)?),
                Part::ArgSheet(n) => {
                    let sheet = string_argument(call, tokens, *n)?;
                    let sheet = renames.resolve(&sheet).to_string();
                    let sheet = if sheet_name_needs_quotes(&sheet) {
                        format!("'{}'", sheet.replace('\'', "''"))
                    } else {
                        sheet
                    };
                    pending.push_str(&sheet.replace('"', "\"\""));
                }
                Part::Arg(n) => {
                    flush(&mut pending, &mut out, &options)?;
                    out.extend_from_slice(call.argument(tokens, *n)?);
                }
                Part::Args { first, last } => {
                    flush(&mut pending, &mut out, &options)?;
                    let last = last.unwrap_or(call.arity());
                    if last >= *first {
                        out.extend_from_slice(call.argument_span(tokens, *first, last)?);
                    }
                }
            }
        }
        flush(&mut pending, &mut out, &options)?;
        Some(out)
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn flush(pending: &mut String, out: &mut Vec<Token>, options: &LexOptions) -> Option<()> {
    if pending.is_empty() {
        return Some(());
    }
    match tokenize_fragment(pending, options) {
        Ok(tokens) => {
            out.extend(tokens);
            pending.clear();
            Some(())
        }
        Err(err) => {
            tracing::warn!(fragment = %pending, error = %err, "template fragment does not tokenize");
            None
        }
    }
}

/// Inner text of a string-literal argument, escapes kept
fn raw_string_content<'t>(call: &CallNode, tokens: &'t [Token], position: usize) -> Option<&'t str> {
    match call.argument(tokens, position)? {
        [token] => {
            token.string_content()?;
            token.text().get(1..token.text().len() - 1)
        }
        _ => None,
    }
}

fn string_argument(call: &CallNode, tokens: &[Token], position: usize) -> Option<String> {
    match call.argument(tokens, position)? {
        [token] => token.string_content(),
        _ => None,
    }
}

fn parse_placeholder(body: &str) -> Result<Part, TemplateError> {
    let body = body.trim();
    let unknown = || TemplateError::UnknownPlaceholder(body.to_string());
    let position = |digits: &str| -> Result<usize, TemplateError> {
        match digits.trim().parse::<usize>() {
            Ok(0) => Err(TemplateError::ZeroArgument(body.to_string())),
            Ok(n) => Ok(n),
            Err(_) => Err(unknown()),
        }
    };

    match body {
        "name" => return Ok(Part::Name),
        "sep" => return Ok(Part::Separator),
        _ => {}
    }

    if let Some(range) = body.strip_prefix("args:") {
        let (first, last) = range.split_once("..").ok_or_else(unknown)?;
        let first = position(first)?;
        let last = if last.trim().is_empty() {
            None
        } else {
            Some(position(last)?)
        };
        if last.map_or(false, |last| last < first) {
            return Err(unknown());
        }
        return Ok(Part::Args { first, last });
    }

    if let Some(rest) = body.strip_prefix("arg") {
        return match rest.split_once('.') {
            None => Ok(Part::Arg(position(rest)?)),
            Some((n, "text")) => Ok(Part::ArgText(position(n)?)),
            Some((n, "sheet")) => Ok(Part::ArgSheet(position(n)?)),
            Some(_) => Err(unknown()),
        };
    }

    Err(unknown())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LexError;
    use crate::rewrite::call::find_calls;
    use crate::token::TokenKind;
    use pretty_assertions::assert_eq;

    fn expand(template: &str, formula: &str) -> Option<String> {
        expand_renamed(template, formula, &SheetRenames::new())
    }

    fn expand_renamed(template: &str, formula: &str, renames: &SheetRenames) -> Option<String> {
        let template = Template::parse(template).unwrap();
        let tokens = tokenize(formula).unwrap();
        let calls = find_calls(tokens.as_slice());
        let fallback = Token::new(TokenKind::ArgumentSeparator, ",");
        template
            .instantiate(&calls[0], tokens.as_slice(), &fallback, renames)
            .map(|t| t.iter().map(Token::text).collect())
    }

    #[test]
    fn test_parse_parts() {
        let template = Template::parse("\"{arg5.text}.\" & {name}({args:1..4})").unwrap();
        assert_eq!(template.max_argument(), 5);
        assert_eq!(template.text_arguments(), vec![5]);
        assert_eq!(template.as_str(), "\"{arg5.text}.\" & {name}({args:1..4})");
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            Template::parse("F({arg1)"),
            Err(TemplateError::UnclosedPlaceholder(2))
        );
        assert_eq!(Template::parse("F(1})"), Err(TemplateError::StrayBrace(3)));
        assert_eq!(
            Template::parse("{bogus}"),
            Err(TemplateError::UnknownPlaceholder("bogus".into()))
        );
        assert_eq!(
            Template::parse("{arg0}"),
            Err(TemplateError::ZeroArgument("arg0".into()))
        );
        assert_eq!(
            Template::parse("{args:3..1}"),
            Err(TemplateError::UnknownPlaceholder("args:3..1".into()))
        );
        assert_eq!(
            Template::parse("{name}({arg1}"),
            Err(TemplateError::Malformed(LexError::UnbalancedDelimiter {
                offset: 1
            }))
        );
        assert!(Template::parse("{{1,2}}").is_ok());
    }

    #[test]
    fn test_expand_address_rule() {
        assert_eq!(
            expand(
                "\"{arg5.text}.\" & {name}({args:1..4})",
                "ADDRESS(10,5,1,1,\"Sheet1\")"
            )
            .unwrap(),
            "\"Sheet1.\" & ADDRESS(10,5,1,1)"
        );
    }

    #[test]
    fn test_expand_sheet_quoting() {
        assert_eq!(
            expand(
                "\"{arg2.sheet}.\" & {arg1}",
                "F(A1,\"Q1 Data\")"
            )
            .unwrap(),
            "\"'Q1 Data'.\" & A1"
        );
    }

    #[test]
    fn test_expand_renamed_sheet() {
        let renames: SheetRenames = [("sheet1", "Q1 Data"), ("Old", "New")].into_iter().collect();
        assert_eq!(
            expand_renamed(
                "\"{arg5.sheet}.\" & {name}({args:1..4})",
                "ADDRESS(10,5,1,1,\"Sheet1\")",
                &renames
            )
            .unwrap(),
            "\"'Q1 Data'.\" & ADDRESS(10,5,1,1)"
        );
        // .text is the literal content, never renamed
        assert_eq!(
            expand_renamed("\"{arg1.text}\"", "F(\"Old\")", &renames).unwrap(),
            "\"Old\""
        );
    }

    #[test]
    fn test_expand_open_ended_args() {
        assert_eq!(
            expand("G({args:2..})", "F(1, 2 ,3)").unwrap(),
            "G(2 ,3)"
        );
        assert_eq!(expand("G({args:3..})", "F(1)").unwrap(), "G()");
        assert_eq!(
            expand("G({arg2}{sep}{arg1})", "F(A1;B2)"),
            None,
            "';' is not a separator under en-US conventions"
        );
        assert_eq!(expand("G({arg1}{sep}0)", "F(A1)").unwrap(), "G(A1,0)");
    }

    #[test]
    fn test_missing_argument_does_not_expand() {
        assert_eq!(expand("G({arg3})", "F(1,2)"), None);
        assert_eq!(expand("G({arg1.text})", "F(1)"), None);
    }
}
