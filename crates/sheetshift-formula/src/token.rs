//! Formula tokens
//!
//! A [`TokenStream`] keeps every character of the formula it was lexed from, whitespace
//! included, so joining the token texts gives back the original text.

use std::collections::BTreeSet;
use std::fmt;

/// Token categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// Identifier directly followed by `(`
    FunctionName,
    /// Named range or other bare name
    Identifier,
    /// `A1`, `$B$2`, `Sheet1!C3`
    CellReference,
    /// `A1:B2`, `A:C`, `1:3`
    RangeReference,
    /// `Table[Col]`, `[@Col]`, `Table[[#This Row],[Col]]`
    StructuredReference,
    StringLiteral,
    NumberLiteral,
    BooleanLiteral,
    /// `#N/A`, `#DIV/0!`, ...
    ErrorLiteral,
    Operator,
    /// Argument separator, or array column/row separator inside `{}`
    ArgumentSeparator,
    OpenParen,
    CloseParen,
    OpenArray,
    CloseArray,
    Whitespace,
}

/// A single token. Tokens are never mutated; [`Token::with_text`] builds a replacement.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Token {
    kind: TokenKind,
    text: String,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
        }
    }

    pub fn kind(&self) -> TokenKind {
        self.kind
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Same kind, different text
    pub fn with_text(&self, text: impl Into<String>) -> Self {
        Self::new(self.kind, text)
    }

    pub fn is_whitespace(&self) -> bool {
        self.kind == TokenKind::Whitespace
    }

    /// Content of a string literal with the outer quotes removed and `""` unescaped
    pub fn string_content(&self) -> Option<String> {
        if self.kind != TokenKind::StringLiteral {
            return None;
        }
        let inner = self
            .text
            .strip_prefix('"')
            .and_then(|t| t.strip_suffix('"'))?;
        Some(inner.replace("\"\"", "\""))
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Ordered tokens of one formula
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct TokenStream {
    tokens: Vec<Token>,
}

impl TokenStream {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens }
    }

    pub fn as_slice(&self) -> &[Token] {
        &self.tokens
    }

    pub fn into_vec(self) -> Vec<Token> {
        self.tokens
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Token> {
        self.tokens.iter()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Whether any token has the given kind
    pub fn contains_kind(&self, kind: TokenKind) -> bool {
        self.tokens.iter().any(|t| t.kind == kind)
    }

    /// Upper-cased names of every function called in the formula, without any
    /// `_xlfn.`/`_xlws.` prefix
    ///
    /// ```
    /// use sheetshift_formula::tokenize;
    ///
    /// let tokens = tokenize("SUM(A1:A3)+_xlfn.XLOOKUP(1,B:B,C:C)+sum(1)").unwrap();
    /// let names: Vec<_> = tokens.function_names().into_iter().collect();
    /// assert_eq!(names, ["SUM", "XLOOKUP"]);
    /// ```
    pub fn function_names(&self) -> BTreeSet<String> {
        self.tokens
            .iter()
            .filter(|t| t.kind == TokenKind::FunctionName)
            .map(|t| crate::functions::strip_future_prefix(&t.text).to_uppercase())
            .collect()
    }

    /// Concatenated token texts
    pub fn to_formula_string(&self) -> String {
        let mut out = String::with_capacity(self.tokens.iter().map(|t| t.text.len()).sum());
        for token in &self.tokens {
            out.push_str(&token.text);
        }
        out
    }
}

impl fmt::Display for TokenStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for token in &self.tokens {
            f.write_str(&token.text)?;
        }
        Ok(())
    }
}

impl FromIterator<Token> for TokenStream {
    fn from_iter<I: IntoIterator<Item = Token>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl IntoIterator for TokenStream {
    type Item = Token;
    type IntoIter = std::vec::IntoIter<Token>;

    fn into_iter(self) -> Self::IntoIter {
        self.tokens.into_iter()
    }
}

impl<'a> IntoIterator for &'a TokenStream {
    type Item = &'a Token;
    type IntoIter = std::slice::Iter<'a, Token>;

    fn into_iter(self) -> Self::IntoIter {
        self.tokens.iter()
    }
}
