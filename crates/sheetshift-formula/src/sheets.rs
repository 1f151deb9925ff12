//! Sheet renames
//!
//! Converting a workbook can change sheet names. [`SheetRenames`] maps source names to
//! target names; [`rename_sheets`] rewrites the `Sheet!` prefix of every qualified
//! reference, and `{argN.sheet}` template placeholders read through the same map.

use crate::token::{TokenKind, TokenStream};
use serde::{Deserialize, Serialize};
use sheetshift_core::qualify_with_sheet;
use std::collections::BTreeMap;

/// Source sheet name to target sheet name. Lookups ignore case.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, String>", into = "BTreeMap<String, String>")]
pub struct SheetRenames {
    // upper-cased source name -> (source name, target name)
    by_name: BTreeMap<String, (String, String)>,
}

impl SheetRenames {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, from: impl Into<String>, to: impl Into<String>) {
        let from = from.into();
        self.by_name.insert(from.to_uppercase(), (from, to.into()));
    }

    /// Target name of `sheet`, if it was renamed
    pub fn get(&self, sheet: &str) -> Option<&str> {
        self.by_name
            .get(&sheet.to_uppercase())
            .map(|(_, to)| to.as_str())
    }

    /// Target name of `sheet`, or `sheet` itself
    pub fn resolve<'s>(&'s self, sheet: &'s str) -> &'s str {
        self.get(sheet).unwrap_or(sheet)
    }

    /// `(source, target)` pairs in source-name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.by_name
            .values()
            .map(|(from, to)| (from.as_str(), to.as_str()))
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for SheetRenames {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut renames = Self::new();
        for (from, to) in iter {
            renames.insert(from, to);
        }
        renames
    }
}

impl From<BTreeMap<String, String>> for SheetRenames {
    fn from(map: BTreeMap<String, String>) -> Self {
        map.into_iter().collect()
    }
}

impl From<SheetRenames> for BTreeMap<String, String> {
    fn from(renames: SheetRenames) -> Self {
        renames.by_name.into_values().collect()
    }
}

/// Rewrite the sheet prefix of every qualified reference whose sheet was renamed
///
/// ```
/// use sheetshift_formula::{rename_sheets, tokenize, SheetRenames};
///
/// let renames: SheetRenames = [("Data", "Q1 Data")].into_iter().collect();
/// let tokens = tokenize("SUM(Data!A1:A3)+Other!B2").unwrap();
/// assert_eq!(
///     rename_sheets(&tokens, &renames).to_string(),
///     "SUM('Q1 Data'!A1:A3)+Other!B2"
/// );
/// ```
pub fn rename_sheets(tokens: &TokenStream, renames: &SheetRenames) -> TokenStream {
    if renames.is_empty() {
        return tokens.clone();
    }
    tokens
        .iter()
        .map(|token| {
            let qualified = matches!(
                token.kind(),
                TokenKind::CellReference
                    | TokenKind::RangeReference
                    | TokenKind::ErrorLiteral
                    | TokenKind::Identifier
            );
            match split_sheet_prefix(token.text()).filter(|_| qualified) {
                Some((sheet, target)) => match renames.get(&sheet) {
                    Some(renamed) => token.with_text(qualify_with_sheet(renamed, target)),
                    None => token.clone(),
                },
                None => token.clone(),
            }
        })
        .collect()
}

/// Split `Sheet!A1` or `'My Sheet'!A1` into the unquoted sheet name and the rest
fn split_sheet_prefix(text: &str) -> Option<(String, &str)> {
    if let Some(quoted) = text.strip_prefix('\'') {
        let mut chars = quoted.char_indices().peekable();
        while let Some((idx, c)) = chars.next() {
            if c != '\'' {
                continue;
            }
            if chars.peek().map(|&(_, next)| next) == Some('\'') {
                chars.next();
                continue;
            }
            let rest = quoted[idx + 1..].strip_prefix('!')?;
            return Some((quoted[..idx].replace("''", "'"), rest));
        }
        return None;
    }

    let (sheet, rest) = text.split_once('!')?;
    if sheet.is_empty() || sheet.starts_with('#') {
        return None;
    }
    Some((sheet.to_string(), rest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;
    use pretty_assertions::assert_eq;

    fn renames() -> SheetRenames {
        [("Sheet1", "Tabelle1"), ("Bob's", "Q1 Data"), ("Old", "New")]
            .into_iter()
            .collect()
    }

    fn rename(text: &str) -> String {
        rename_sheets(&tokenize(text).unwrap(), &renames()).to_string()
    }

    #[test]
    fn test_rename_qualified_references() {
        assert_eq!(rename("sheet1!A1+Other!A1"), "Tabelle1!A1+Other!A1");
        assert_eq!(rename("SUM('Bob''s'!$A$1:B2)"), "SUM('Q1 Data'!$A$1:B2)");
        assert_eq!(rename("Old!#REF!"), "New!#REF!");
        assert_eq!(rename("Old!MyName"), "New!MyName");
    }

    #[test]
    fn test_unqualified_text_is_untouched() {
        assert_eq!(rename("A1+#REF!+\"Sheet1!A1\""), "A1+#REF!+\"Sheet1!A1\"");
        let tokens = tokenize("Sheet1!A1").unwrap();
        assert_eq!(rename_sheets(&tokens, &SheetRenames::new()), tokens);
    }

    #[test]
    fn test_split_sheet_prefix() {
        assert_eq!(split_sheet_prefix("Data!B2"), Some(("Data".to_string(), "B2")));
        assert_eq!(
            split_sheet_prefix("'It''s'!A:A"),
            Some(("It's".to_string(), "A:A"))
        );
        assert_eq!(split_sheet_prefix("#REF!"), None);
        assert_eq!(split_sheet_prefix("'open!A1"), None);
        assert_eq!(split_sheet_prefix("B2"), None);
    }

    #[test]
    fn test_lookup_and_serde() {
        let renames = renames();
        assert_eq!(renames.resolve("OLD"), "New");
        assert_eq!(renames.resolve("Unchanged"), "Unchanged");
        assert_eq!(renames.len(), 3);

        let json = serde_json::to_string(&renames).unwrap();
        let back: SheetRenames = serde_json::from_str(&json).unwrap();
        assert_eq!(back, renames);
        let from_json: SheetRenames = serde_json::from_str(r#"{"Data": "Daten"}"#).unwrap();
        assert_eq!(from_json.get("data"), Some("Daten"));
    }
}
