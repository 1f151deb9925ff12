//! Function-name mapping between locales

use crate::locale::{normalize_locale_id, Locale};
use crate::token::{TokenKind, TokenStream};
use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Prefixes Excel writes in front of functions newer than the file format
const FUTURE_PREFIXES: &[&str] = &["_xlfn.", "_xlws."];

/// One source-name to target-name mapping for a target locale
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionMapEntry {
    pub source_name: String,
    pub target_name: String,
    pub locale_scope: String,
}

/// Per-target-locale function name tables. Built once, read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct FunctionMapTable {
    by_locale: AHashMap<String, AHashMap<String, String>>,
}

impl FunctionMapTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: impl IntoIterator<Item = FunctionMapEntry>) -> Self {
        let mut table = Self::new();
        for entry in entries {
            table.insert(entry);
        }
        table
    }

    /// Add or replace a mapping. Source names are matched case-insensitively.
    pub fn insert(&mut self, entry: FunctionMapEntry) {
        self.by_locale
            .entry(normalize_locale_id(&entry.locale_scope))
            .or_default()
            .insert(entry.source_name.to_uppercase(), entry.target_name);
    }

    /// Target name of `name` in `locale_id`, ignoring any future-function prefix
    pub fn lookup(&self, name: &str, locale_id: &str) -> Option<&str> {
        self.by_locale
            .get(locale_id)?
            .get(&strip_future_prefix(name).to_uppercase())
            .map(String::as_str)
    }

    pub fn supports(&self, name: &str, locale_id: &str) -> bool {
        self.lookup(name, locale_id).is_some()
    }

    /// Every name `source_name` may carry after mapping, including itself
    pub fn target_names(&self, source_name: &str) -> BTreeSet<String> {
        let key = strip_future_prefix(source_name).to_uppercase();
        let mut names: BTreeSet<String> = self
            .by_locale
            .values()
            .filter_map(|m| m.get(&key))
            .map(|n| n.to_uppercase())
            .collect();
        names.insert(key);
        names
    }

    /// Locale ids that have a table
    pub fn locales(&self) -> impl Iterator<Item = &str> {
        self.by_locale.keys().map(String::as_str)
    }

    /// Number of mappings for one locale
    pub fn len_for(&self, locale_id: &str) -> usize {
        self.by_locale.get(locale_id).map_or(0, |names| names.len())
    }

    pub fn len(&self) -> usize {
        self.by_locale.values().map(|names| names.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Drop an `_xlfn.`/`_xlws.` prefix
pub fn strip_future_prefix(name: &str) -> &str {
    for prefix in FUTURE_PREFIXES {
        if name.len() >= prefix.len()
            && name.is_char_boundary(prefix.len())
            && name[..prefix.len()].eq_ignore_ascii_case(prefix)
        {
            return &name[prefix.len()..];
        }
    }
    name
}

/// Replace every function name with its target-locale spelling.
///
/// Names without a mapping are kept verbatim and returned upper-cased.
///
/// ```
/// use sheetshift_formula::{map_function_names, tokenize, FunctionMapEntry, FunctionMapTable, Locale};
///
/// let table = FunctionMapTable::from_entries([FunctionMapEntry {
///     source_name: "SUM".into(),
///     target_name: "SUMME".into(),
///     locale_scope: "de-DE".into(),
/// }]);
/// let tokens = tokenize("sum(A1)+FOO(1)").unwrap();
/// let (mapped, unmapped) = map_function_names(&tokens, &Locale::de_de(), &table);
/// assert_eq!(mapped.to_string(), "SUMME(A1)+FOO(1)");
/// assert!(unmapped.contains("FOO"));
/// ```
pub fn map_function_names(
    tokens: &TokenStream,
    target: &Locale,
    table: &FunctionMapTable,
) -> (TokenStream, BTreeSet<String>) {
    let mut unmapped = BTreeSet::new();
    let mapped = tokens
        .iter()
        .map(|token| {
            if token.kind() != TokenKind::FunctionName {
                return token.clone();
            }
            match table.lookup(token.text(), &target.id) {
                Some(name) => token.with_text(name),
                None => {
                    unmapped.insert(strip_future_prefix(token.text()).to_uppercase());
                    token.clone()
                }
            }
        })
        .collect();
    (mapped, unmapped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;
    use pretty_assertions::assert_eq;

    fn entry(source: &str, target: &str, locale: &str) -> FunctionMapEntry {
        FunctionMapEntry {
            source_name: source.into(),
            target_name: target.into(),
            locale_scope: locale.into(),
        }
    }

    fn table() -> FunctionMapTable {
        FunctionMapTable::from_entries([
            entry("SUM", "SUMME", "de-DE"),
            entry("IF", "WENN", "de-DE"),
            entry("XLOOKUP", "XVERWEIS", "de-DE"),
            entry("SUM", "SOMME", "fr_fr"),
        ])
    }

    #[test]
    fn test_map_names() {
        let tokens = tokenize("IF(SUM(A1:A3)>1,sum(B1),0)").unwrap();
        let (mapped, unmapped) = map_function_names(&tokens, &Locale::de_de(), &table());
        assert_eq!(mapped.to_string(), "WENN(SUMME(A1:A3)>1,SUMME(B1),0)");
        assert!(unmapped.is_empty());
    }

    #[test]
    fn test_unmapped_reported_once() {
        let tokens = tokenize("FOO(1)+foo(2)+Bar(3)").unwrap();
        let (mapped, unmapped) = map_function_names(&tokens, &Locale::de_de(), &table());
        assert_eq!(mapped, tokens);
        assert_eq!(
            unmapped.into_iter().collect::<Vec<_>>(),
            vec!["BAR".to_string(), "FOO".to_string()]
        );
    }

    #[test]
    fn test_future_prefix() {
        let tokens = tokenize("_xlfn.XLOOKUP(1,A:A,B:B)+_xlfn.LET(x,1,x)").unwrap();
        let (mapped, unmapped) = map_function_names(&tokens, &Locale::de_de(), &table());
        assert_eq!(mapped.to_string(), "XVERWEIS(1,A:A,B:B)+_xlfn.LET(x,1,x)");
        assert!(unmapped.contains("LET"));
        assert_eq!(strip_future_prefix("_XLWS.SORT"), "SORT");
    }

    #[test]
    fn test_mapping_is_deterministic() {
        let tokens = tokenize("IF(A1,SUM(1),MAX(2))").unwrap();
        let first = map_function_names(&tokens, &Locale::de_de(), &table());
        let second = map_function_names(&tokens, &Locale::de_de(), &table());
        assert_eq!(first, second);
    }

    #[test]
    fn test_lookup_helpers() {
        let table = table();
        assert!(table.supports("sum", "de-DE"));
        assert!(table.supports("SUM", "fr-FR"));
        assert!(!table.supports("SUM", "es-ES"));
        assert_eq!(table.len(), 4);
        assert_eq!(table.len_for("de-DE"), 3);
        assert_eq!(table.len_for("es-ES"), 0);
        assert!(!table.is_empty());
        assert_eq!(
            table.target_names("sum").into_iter().collect::<Vec<_>>(),
            vec!["SOMME", "SUM", "SUMME"]
        );
    }
}
