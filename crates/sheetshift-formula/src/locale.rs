//! Locale conventions and separator normalization

use crate::token::{TokenKind, TokenStream};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Punctuation conventions of one spreadsheet locale
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Locale {
    pub id: String,
    pub arg_separator: char,
    pub decimal_separator: char,
    pub array_column_separator: char,
    pub array_row_separator: char,
}

impl Locale {
    pub fn new(
        id: impl Into<String>,
        arg_separator: char,
        decimal_separator: char,
        array_column_separator: char,
        array_row_separator: char,
    ) -> Self {
        Self {
            id: normalize_locale_id(&id.into()),
            arg_separator,
            decimal_separator,
            array_column_separator,
            array_row_separator,
        }
    }

    pub fn en_us() -> Self {
        Self::new("en-US", ',', '.', ',', ';')
    }

    pub fn de_de() -> Self {
        Self::new("de-DE", ';', ',', '\\', ';')
    }

    pub fn fr_fr() -> Self {
        Self::new("fr-FR", ';', ',', '\\', ';')
    }

    pub fn es_es() -> Self {
        Self::new("es-ES", ';', ',', '\\', ';')
    }

    /// Locales known without any rule data
    pub fn builtin() -> [Locale; 4] {
        [Self::en_us(), Self::de_de(), Self::fr_fr(), Self::es_es()]
    }

    /// Argument and decimal separators collide, so numbers cannot be told apart from
    /// argument lists
    pub fn is_ambiguous(&self) -> bool {
        self.arg_separator == self.decimal_separator
    }

    /// Separator characters must be distinct where they can appear in the same context
    pub fn validate(&self) -> Result<(), String> {
        if self.id.is_empty() {
            return Err("locale id must not be empty".into());
        }
        if self.array_column_separator == self.array_row_separator {
            return Err("array column and row separators must differ".into());
        }
        if self.array_column_separator == self.decimal_separator
            || self.array_row_separator == self.decimal_separator
        {
            return Err("array separators must differ from the decimal separator".into());
        }
        let reserved = ['"', '\'', '(', ')', '{', '}', '[', ']'];
        for c in [
            self.arg_separator,
            self.decimal_separator,
            self.array_column_separator,
            self.array_row_separator,
        ] {
            if reserved.contains(&c) || c.is_alphanumeric() || c.is_whitespace() {
                return Err(format!("'{c}' cannot be used as a separator"));
            }
        }
        Ok(())
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// Canonical `ll-RR` form: `de_de` and `DE-de` both become `de-DE`
pub fn normalize_locale_id(id: &str) -> String {
    let id = id.trim().replace('_', "-");
    match id.split_once('-') {
        Some((lang, region)) => format!(
            "{}-{}",
            lang.to_ascii_lowercase(),
            region.to_ascii_uppercase()
        ),
        None => id.to_ascii_lowercase(),
    }
}

/// Source and target conventions of one translation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocalePair {
    pub source: Locale,
    pub target: Locale,
}

impl LocalePair {
    pub fn new(source: Locale, target: Locale) -> Self {
        Self { source, target }
    }

    pub fn is_ambiguous(&self) -> bool {
        self.source.is_ambiguous() || self.target.is_ambiguous()
    }
}

impl fmt::Display for LocalePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.source.id, self.target.id)
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Scope {
    Paren,
    Array,
}

/// Rewrite argument, array and decimal separators from source to target conventions.
///
/// Token count and kinds never change. A number whose text does not follow the source
/// grammar exactly is left alone and reported in the returned notes.
///
/// ```
/// use sheetshift_formula::{normalize_separators, tokenize, Locale, LocalePair};
///
/// let pair = LocalePair::new(Locale::en_us(), Locale::de_de());
/// let (tokens, notes) = normalize_separators(&tokenize("ROUND(1.5,0)").unwrap(), &pair);
/// assert_eq!(tokens.to_string(), "ROUND(1,5;0)");
/// assert!(notes.is_empty());
/// ```
pub fn normalize_separators(tokens: &TokenStream, pair: &LocalePair) -> (TokenStream, Vec<String>) {
    let mut notes = Vec::new();
    if pair.is_ambiguous() {
        notes.push(format!(
            "separators left unchanged: {pair} uses the same character for arguments and decimals"
        ));
        return (tokens.clone(), notes);
    }

    let (source, target) = (&pair.source, &pair.target);
    let mut scopes: Vec<Scope> = Vec::new();
    let normalized = tokens
        .iter()
        .map(|token| match token.kind() {
            TokenKind::OpenParen => {
                scopes.push(Scope::Paren);
                token.clone()
            }
            TokenKind::OpenArray => {
                scopes.push(Scope::Array);
                token.clone()
            }
            TokenKind::CloseParen | TokenKind::CloseArray => {
                scopes.pop();
                token.clone()
            }
            TokenKind::ArgumentSeparator => {
                let replacement = if scopes.last() == Some(&Scope::Array) {
                    map_char(
                        token.text(),
                        &[
                            (source.array_column_separator, target.array_column_separator),
                            (source.array_row_separator, target.array_row_separator),
                        ],
                    )
                } else {
                    map_char(token.text(), &[(source.arg_separator, target.arg_separator)])
                };
                replacement.map_or_else(|| token.clone(), |text| token.with_text(text))
            }
            TokenKind::NumberLiteral if source.decimal_separator != target.decimal_separator => {
                let text = token.text();
                if !text.contains(source.decimal_separator) {
                    token.clone()
                } else if matches_number_grammar(text, source.decimal_separator) {
                    token.with_text(text.replace(
                        source.decimal_separator,
                        &target.decimal_separator.to_string(),
                    ))
                } else {
                    notes.push(format!("number {text} left unchanged"));
                    token.clone()
                }
            }
            _ => token.clone(),
        })
        .collect();

    (normalized, notes)
}

fn map_char(text: &str, table: &[(char, char)]) -> Option<String> {
    let mut chars = text.chars();
    let c = chars.next()?;
    if chars.next().is_some() {
        return None;
    }
    table
        .iter()
        .find(|(from, _)| *from == c)
        .map(|(_, to)| to.to_string())
}

/// `digits [decimal digits] [e [+-] digits]`, with at least one digit before the exponent
fn matches_number_grammar(text: &str, decimal: char) -> bool {
    let (mantissa, exponent) = match text.find(|c: char| c == 'e' || c == 'E') {
        Some(idx) => (&text[..idx], Some(&text[idx + 1..])),
        None => (text, None),
    };

    let (int_part, frac_part) = match mantissa.split_once(decimal) {
        Some((i, f)) => (i, f),
        None => (mantissa, ""),
    };
    let all_digits = |s: &str| s.chars().all(|c| c.is_ascii_digit());
    if !all_digits(int_part) || !all_digits(frac_part) || int_part.len() + frac_part.len() == 0 {
        return false;
    }

    match exponent {
        None => true,
        Some(exp) => {
            let digits = exp.strip_prefix(&['+', '-'][..]).unwrap_or(exp);
            !digits.is_empty() && all_digits(digits)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::{tokenize, tokenize_with, LexOptions};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn en_de() -> LocalePair {
        LocalePair::new(Locale::en_us(), Locale::de_de())
    }

    fn normalize(text: &str, pair: &LocalePair) -> String {
        let tokens = tokenize_with(text, &LexOptions::from(&pair.source)).unwrap();
        normalize_separators(&tokens, pair).0.to_string()
    }

    #[test]
    fn test_argument_separators() {
        assert_eq!(normalize("SUM(A1,A2)", &en_de()), "SUM(A1;A2)");
        assert_eq!(
            normalize("IF(A1>10,\"a,b\",2.5)", &en_de()),
            "IF(A1>10;\"a,b\";2,5)"
        );
    }

    #[test]
    fn test_array_separators() {
        assert_eq!(normalize("{1,2;3,4}", &en_de()), "{1\\2;3\\4}");
        let de_en = LocalePair::new(Locale::de_de(), Locale::en_us());
        assert_eq!(normalize("{1,5\\2;3\\4}", &de_en), "{1.5,2;3,4}");
        assert_eq!(normalize("SUMME({1\\2};3)", &de_en), "SUMME({1,2},3)");
    }

    #[test]
    fn test_number_grammar() {
        assert!(matches_number_grammar("1.5", '.'));
        assert!(matches_number_grammar(".5", '.'));
        assert!(matches_number_grammar("1.5E-3", '.'));
        assert!(matches_number_grammar("42", '.'));
        assert!(!matches_number_grammar("1.2.3", '.'));
        assert!(!matches_number_grammar("1e", '.'));
        assert!(!matches_number_grammar(".", '.'));
    }

    #[test]
    fn test_token_shape_preserved() {
        let tokens = tokenize("IF(A1,{1,2},3.5)").unwrap();
        let (normalized, _) = normalize_separators(&tokens, &en_de());
        assert_eq!(tokens.len(), normalized.len());
        for (a, b) in tokens.iter().zip(normalized.iter()) {
            assert_eq!(a.kind(), b.kind());
        }
    }

    #[test]
    fn test_ambiguous_locale_is_noop() {
        let odd = Locale::new("xx-XX", ',', ',', '\\', ';');
        let pair = LocalePair::new(Locale::en_us(), odd);
        let tokens = tokenize("SUM(1.5,2)").unwrap();
        let (normalized, notes) = normalize_separators(&tokens, &pair);
        assert_eq!(normalized, tokens);
        assert_eq!(notes.len(), 1);
    }

    #[test]
    fn test_same_locale_is_identity() {
        let pair = LocalePair::new(Locale::de_de(), Locale::fr_fr());
        assert_eq!(normalize("SOMME(1,5;{1\\2})", &pair), "SOMME(1,5;{1\\2})");
    }

    #[test]
    fn test_locale_ids() {
        assert_eq!(normalize_locale_id("de_de"), "de-DE");
        assert_eq!(normalize_locale_id("EN-us"), "en-US");
        assert_eq!(Locale::new("fr_FR", ';', ',', '\\', ';').id, "fr-FR");
    }

    #[test]
    fn test_validate() {
        assert!(Locale::en_us().validate().is_ok());
        assert!(Locale::de_de().validate().is_ok());
        assert!(Locale::new("x", ';', ',', ';', ';').validate().is_err());
        assert!(Locale::new("x", '(', '.', ',', ';').validate().is_err());
    }

    fn formula() -> impl Strategy<Value = String> {
        let leaf = prop_oneof![
            "[A-C][1-9]",
            "[0-9]{1,3}(\\.[0-9]{1,2})?",
            "\"[a-z,;]{0,4}\"",
        ];
        leaf.prop_recursive(4, 24, 4, |inner| {
            prop_oneof![
                ("[A-Z]{2,5}", prop::collection::vec(inner.clone(), 1..4))
                    .prop_map(|(name, args)| format!("{name}({})", args.join(","))),
                prop::collection::vec(inner, 1..3)
                    .prop_map(|items| format!("({})", items.join("+"))),
            ]
        })
    }

    proptest! {
        #[test]
        fn prop_normalization_is_idempotent(text in formula()) {
            let pair = en_de();
            let tokens = tokenize(&text).unwrap();
            let (once, _) = normalize_separators(&tokens, &pair);
            let (twice, _) = normalize_separators(&once, &pair);
            prop_assert_eq!(once, twice);
        }
    }
}
