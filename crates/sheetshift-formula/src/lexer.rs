//! Formula tokenizer
//!
//! Splits formula text (without the leading `=`) into a lossless [`TokenStream`].
//! Separator characters depend on the source locale, so `1,5` is a single number under
//! German conventions and two arguments under English ones.

use crate::error::LexError;
use crate::locale::Locale;
use crate::token::{Token, TokenKind, TokenStream};
use lazy_regex::{regex_find, regex_is_match};
use sheetshift_core::CellAddress;

/// Separator conventions the tokenizer lexes with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LexOptions {
    pub arg_separator: char,
    pub decimal_separator: char,
    pub array_column_separator: char,
    pub array_row_separator: char,
}

impl Default for LexOptions {
    fn default() -> Self {
        Self {
            arg_separator: ',',
            decimal_separator: '.',
            array_column_separator: ',',
            array_row_separator: ';',
        }
    }
}

impl From<&Locale> for LexOptions {
    fn from(locale: &Locale) -> Self {
        Self {
            arg_separator: locale.arg_separator,
            decimal_separator: locale.decimal_separator,
            array_column_separator: locale.array_column_separator,
            array_row_separator: locale.array_row_separator,
        }
    }
}

/// Tokenize with en-US separators
///
/// # Example
/// ```rust
/// use sheetshift_formula::{tokenize, TokenKind};
///
/// let tokens = tokenize("SUM(A1, 2.5)").unwrap();
/// assert_eq!(tokens.as_slice()[0].kind(), TokenKind::FunctionName);
/// assert_eq!(tokens.to_string(), "SUM(A1, 2.5)");
/// ```
pub fn tokenize(text: &str) -> Result<TokenStream, LexError> {
    tokenize_with(text, &LexOptions::default())
}

/// Tokenize with explicit separator conventions
pub fn tokenize_with(text: &str, options: &LexOptions) -> Result<TokenStream, LexError> {
    Lexer::new(text, options, true).run()
}

/// Tokenize a piece of a formula. Delimiters need not balance; literals must still close.
pub(crate) fn tokenize_fragment(text: &str, options: &LexOptions) -> Result<TokenStream, LexError> {
    Lexer::new(text, options, false).run()
}

const ERROR_LITERALS: &[&str] = &[
    "#GETTING_DATA",
    "#CONNECT!",
    "#BLOCKED!",
    "#UNKNOWN!",
    "#DIV/0!",
    "#SPILL!",
    "#VALUE!",
    "#FIELD!",
    "#CALC!",
    "#NULL!",
    "#BUSY!",
    "#NAME?",
    "#NUM!",
    "#REF!",
    "#N/A",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delimiter {
    Paren,
    Array,
}

#[derive(Debug, Clone, Copy)]
enum RefShape {
    Cell,
    Column,
    Row,
}

struct Lexer<'a> {
    input: &'a str,
    pos: usize,
    options: &'a LexOptions,
    strict: bool,
    delimiters: Vec<(Delimiter, usize)>,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str, options: &'a LexOptions, strict: bool) -> Self {
        Self {
            input,
            pos: 0,
            options,
            strict,
            delimiters: Vec::new(),
            tokens: Vec::new(),
        }
    }

    fn run(mut self) -> Result<TokenStream, LexError> {
        while let Some(c) = self.peek_char() {
            let start = self.pos;
            let kind = self.scan_token(c, start)?;
            self.tokens
                .push(Token::new(kind, &self.input[start..self.pos]));
        }

        if self.strict {
            if let Some(&(_, offset)) = self.delimiters.last() {
                return Err(LexError::UnbalancedDelimiter { offset });
            }
        }
        Ok(TokenStream::new(self.tokens))
    }

    // === Token scanning ===

    fn scan_token(&mut self, c: char, start: usize) -> Result<TokenKind, LexError> {
        if c.is_whitespace() {
            while self.peek_char().map_or(false, char::is_whitespace) {
                self.advance();
            }
            return Ok(TokenKind::Whitespace);
        }

        match c {
            '"' => return self.scan_string(start),
            '\'' => return self.scan_quoted_sheet(start),
            '(' => {
                self.advance();
                self.delimiters.push((Delimiter::Paren, start));
                return Ok(TokenKind::OpenParen);
            }
            ')' => {
                self.advance();
                self.close(Delimiter::Paren, start)?;
                return Ok(TokenKind::CloseParen);
            }
            '{' => {
                self.advance();
                self.delimiters.push((Delimiter::Array, start));
                return Ok(TokenKind::OpenArray);
            }
            '}' => {
                self.advance();
                self.close(Delimiter::Array, start)?;
                return Ok(TokenKind::CloseArray);
            }
            '[' => {
                self.scan_brackets(start)?;
                return Ok(TokenKind::StructuredReference);
            }
            '#' => return Ok(self.scan_error_literal()),
            _ => {}
        }

        if self.is_separator(c) {
            self.advance();
            return Ok(TokenKind::ArgumentSeparator);
        }

        if c.is_ascii_digit()
            || (c == self.options.decimal_separator
                && self.peek_char_at(1).map_or(false, |d| d.is_ascii_digit()))
        {
            return Ok(self.scan_number());
        }

        if c.is_alphabetic() || c == '_' || c == '$' {
            return self.scan_word(start);
        }

        Ok(self.scan_operator(c))
    }

    fn scan_string(&mut self, start: usize) -> Result<TokenKind, LexError> {
        self.advance(); // opening quote
        loop {
            match self.peek_char() {
                None => return Err(LexError::UnterminatedLiteral { offset: start }),
                Some('"') => {
                    self.advance();
                    // "" is an escaped quote
                    if self.peek_char() == Some('"') {
                        self.advance();
                    } else {
                        return Ok(TokenKind::StringLiteral);
                    }
                }
                Some(_) => self.advance(),
            }
        }
    }

    fn scan_quoted_sheet(&mut self, start: usize) -> Result<TokenKind, LexError> {
        self.advance(); // opening quote
        loop {
            match self.peek_char() {
                None => return Err(LexError::UnterminatedLiteral { offset: start }),
                Some('\'') => {
                    self.advance();
                    if self.peek_char() == Some('\'') {
                        self.advance();
                    } else {
                        break;
                    }
                }
                Some(_) => self.advance(),
            }
        }

        if self.peek_char() == Some('!') {
            self.advance();
            return Ok(self.scan_sheet_target());
        }
        Ok(TokenKind::Identifier)
    }

    /// Whatever follows `Sheet!`
    fn scan_sheet_target(&mut self) -> TokenKind {
        if self.peek_char() == Some('#') {
            return self.scan_error_literal();
        }

        let start = self.pos;
        while self.peek_char().map_or(false, is_word_char) {
            self.advance();
        }
        let input = self.input;
        let target = &input[start..self.pos];
        self.classify_reference(target)
            .unwrap_or(TokenKind::Identifier)
    }

    fn scan_number(&mut self) -> TokenKind {
        // Whole-row range such as 1:3
        if let Some(rows) = regex_find!(r"^[0-9]+:\$?[0-9]+", self.rest()) {
            self.pos += rows.len();
            return TokenKind::RangeReference;
        }

        self.skip_digits();

        let decimal = self.options.decimal_separator;
        if self.peek_char() == Some(decimal) && !self.is_separator(decimal) {
            self.advance();
            self.skip_digits();
        }

        if matches!(self.peek_char(), Some('e' | 'E')) {
            let digits_at = match self.peek_char_at(1) {
                Some('+' | '-') => 2,
                _ => 1,
            };
            if self.peek_char_at(digits_at).map_or(false, |c| c.is_ascii_digit()) {
                for _ in 0..digits_at {
                    self.advance();
                }
                self.skip_digits();
            }
        }

        TokenKind::NumberLiteral
    }

    fn scan_word(&mut self, start: usize) -> Result<TokenKind, LexError> {
        while self.peek_char().map_or(false, is_word_char) {
            self.advance();
        }
        let input = self.input;
        let word = &input[start..self.pos];

        match self.peek_char() {
            Some('!') => {
                self.advance();
                return Ok(self.scan_sheet_target());
            }
            Some('(') => return Ok(TokenKind::FunctionName),
            Some('[') => {
                self.scan_brackets(self.pos)?;
                return Ok(TokenKind::StructuredReference);
            }
            _ => {}
        }

        if let Some(kind) = self.classify_reference(word) {
            return Ok(kind);
        }

        // LOG10 (1) is a call, A1 (1) is not
        let rest = self.rest();
        let after_space = rest.trim_start();
        if after_space.len() < rest.len() && after_space.starts_with('(') {
            return Ok(TokenKind::FunctionName);
        }

        if word.eq_ignore_ascii_case("TRUE") || word.eq_ignore_ascii_case("FALSE") {
            return Ok(TokenKind::BooleanLiteral);
        }

        Ok(TokenKind::Identifier)
    }

    /// Classify `text` as a reference, consuming a `:end` tail when it forms a range
    fn classify_reference(&mut self, text: &str) -> Option<TokenKind> {
        if is_cell_reference(text) {
            return Some(if self.consume_range_tail(RefShape::Cell) {
                TokenKind::RangeReference
            } else {
                TokenKind::CellReference
            });
        }
        if is_column_reference(text) && self.consume_range_tail(RefShape::Column) {
            return Some(TokenKind::RangeReference);
        }
        if is_row_reference(text) && self.consume_range_tail(RefShape::Row) {
            return Some(TokenKind::RangeReference);
        }
        None
    }

    fn consume_range_tail(&mut self, shape: RefShape) -> bool {
        let Some(tail) = self.rest().strip_prefix(':') else {
            return false;
        };
        let len = tail
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '$'))
            .unwrap_or(tail.len());
        let part = &tail[..len];
        let matches = match shape {
            RefShape::Cell => is_cell_reference(part),
            RefShape::Column => is_column_reference(part),
            RefShape::Row => is_row_reference(part),
        };
        if matches {
            self.pos += 1 + len;
        }
        matches
    }

    /// `[...]` with nesting; `'` escapes the next character
    fn scan_brackets(&mut self, open: usize) -> Result<(), LexError> {
        let mut depth = 0usize;
        while let Some(c) = self.peek_char() {
            match c {
                '\'' => {
                    self.advance();
                    self.advance();
                    continue;
                }
                '[' => depth += 1,
                ']' => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        self.advance();
                        return Ok(());
                    }
                }
                _ => {}
            }
            self.advance();
        }
        Err(LexError::UnbalancedDelimiter { offset: open })
    }

    fn scan_error_literal(&mut self) -> TokenKind {
        let rest = self.rest();
        for literal in ERROR_LITERALS {
            if rest
                .get(..literal.len())
                .map_or(false, |p| p.eq_ignore_ascii_case(literal))
            {
                self.pos += literal.len();
                return TokenKind::ErrorLiteral;
            }
        }
        // Spill operator or stray '#'
        self.advance();
        TokenKind::Operator
    }

    fn scan_operator(&mut self, c: char) -> TokenKind {
        self.advance();
        if matches!(
            (c, self.peek_char()),
            ('<', Some('=')) | ('>', Some('=')) | ('<', Some('>'))
        ) {
            self.advance();
        }
        TokenKind::Operator
    }

    // === Helper methods ===

    fn is_separator(&self, c: char) -> bool {
        match self.delimiters.last() {
            Some((Delimiter::Array, _)) => {
                c == self.options.array_column_separator || c == self.options.array_row_separator
            }
            _ => c == self.options.arg_separator,
        }
    }

    fn close(&mut self, delimiter: Delimiter, offset: usize) -> Result<(), LexError> {
        match self.delimiters.last() {
            Some(&(open, _)) if open == delimiter => {
                self.delimiters.pop();
                Ok(())
            }
            _ if self.strict => Err(LexError::UnbalancedDelimiter { offset }),
            _ => Ok(()),
        }
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek_char(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn peek_char_at(&self, offset: usize) -> Option<char> {
        self.input[self.pos..].chars().nth(offset)
    }

    fn advance(&mut self) {
        if let Some(c) = self.peek_char() {
            self.pos += c.len_utf8();
        }
    }

    fn skip_digits(&mut self) {
        while self.peek_char().map_or(false, |c| c.is_ascii_digit()) {
            self.advance();
        }
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '.' || c == '$'
}

/// `A1`, `$B$2`, within worksheet bounds
pub(crate) fn is_cell_reference(text: &str) -> bool {
    regex_is_match!(r"^\$?[A-Za-z]{1,3}\$?[0-9]{1,7}$", text) && CellAddress::parse(text).is_ok()
}

fn is_column_reference(text: &str) -> bool {
    regex_is_match!(r"^\$?[A-Za-z]{1,3}$", text)
        && CellAddress::letters_to_column(text.trim_start_matches('$')).is_ok()
}

fn is_row_reference(text: &str) -> bool {
    regex_is_match!(r"^\$?[1-9][0-9]{0,6}$", text)
}
