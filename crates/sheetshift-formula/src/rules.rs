//! Declarative rule tables
//!
//! Rule data is a JSON document:
//!
//! ```json
//! {
//!   "locales": [
//!     { "id": "nl-NL", "arg_separator": ";", "decimal_separator": ",",
//!       "array_column_separator": "\\", "array_row_separator": ";" }
//!   ],
//!   "functions": { "SUM": { "de-DE": "SUMME", "nl-NL": "SOM" } },
//!   "incompatibilities": {
//!     "max_passes": 16,
//!     "rules": [
//!       { "name": "address-sheet-argument", "description": "...",
//!         "function": "ADDRESS", "enclosing": "INDIRECT", "min_args": 5, "max_args": 5,
//!         "arguments": [{ "position": 5, "kind": "string" }],
//!         "template": "\"{arg5.sheet}.\" & {name}({args:1..4})" }
//!     ]
//!   }
//! }
//! ```
//!
//! en-US, de-DE, fr-FR and es-ES are always declared. Every record is validated when
//! loaded; a bad record rejects the whole document.

use crate::error::RuleLoadError;
use crate::functions::{FunctionMapEntry, FunctionMapTable};
use crate::locale::{normalize_locale_id, Locale, LocalePair};
use crate::rewrite::{
    ArgumentPredicate, CallMatcher, IncompatibilityRule, IncompatibilityRules, DEFAULT_MAX_PASSES,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Rule data compiled into the crate
pub const BUILTIN_RULES: &str = include_str!("../rules/default.json");

/// Where rule data comes from
#[derive(Debug, Clone)]
pub enum RuleSource {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

impl From<PathBuf> for RuleSource {
    fn from(path: PathBuf) -> Self {
        RuleSource::Path(path)
    }
}

impl From<&Path> for RuleSource {
    fn from(path: &Path) -> Self {
        RuleSource::Path(path.to_path_buf())
    }
}

impl From<Vec<u8>> for RuleSource {
    fn from(bytes: Vec<u8>) -> Self {
        RuleSource::Bytes(bytes)
    }
}

impl From<&[u8]> for RuleSource {
    fn from(bytes: &[u8]) -> Self {
        RuleSource::Bytes(bytes.to_vec())
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RuleDocument {
    #[serde(default)]
    locales: Vec<Locale>,
    #[serde(default)]
    functions: BTreeMap<String, BTreeMap<String, String>>,
    #[serde(default)]
    incompatibilities: IncompatibilitySection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct IncompatibilitySection {
    #[serde(default)]
    max_passes: Option<usize>,
    #[serde(default)]
    rules: Vec<RuleRecord>,
}

// Matcher fields are spelled out so misspelled keys are rejected
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RuleRecord {
    name: String,
    #[serde(default)]
    description: String,
    function: String,
    #[serde(default)]
    enclosing: Option<String>,
    #[serde(default)]
    min_args: Option<usize>,
    #[serde(default)]
    max_args: Option<usize>,
    #[serde(default)]
    arguments: Vec<ArgumentPredicate>,
    template: String,
}

impl RuleRecord {
    fn into_rule(self) -> Result<IncompatibilityRule, RuleLoadError> {
        let matcher = CallMatcher {
            function: self.function,
            enclosing: self.enclosing,
            min_args: self.min_args,
            max_args: self.max_args,
            arguments: self.arguments,
        };
        IncompatibilityRule::new(self.name, self.description, matcher, &self.template)
    }
}

/// Locales, function tables and incompatibility rules, immutable once loaded
#[derive(Debug, Clone)]
pub struct RuleSet {
    locales: BTreeMap<String, Locale>,
    functions: FunctionMapTable,
    incompatibilities: IncompatibilityRules,
}

impl RuleSet {
    /// The rule data shipped with the crate
    pub fn builtin() -> Result<Self, RuleLoadError> {
        parse_rules(BUILTIN_RULES.as_bytes())
    }

    /// Locale by id, in any `ll-RR`/`ll_rr` spelling
    pub fn locale(&self, id: &str) -> Option<&Locale> {
        self.locales.get(&normalize_locale_id(id))
    }

    pub fn locale_pair(&self, source: &str, target: &str) -> Option<LocalePair> {
        Some(LocalePair::new(
            self.locale(source)?.clone(),
            self.locale(target)?.clone(),
        ))
    }

    pub fn locales(&self) -> impl Iterator<Item = &Locale> {
        self.locales.values()
    }

    pub fn functions(&self) -> &FunctionMapTable {
        &self.functions
    }

    pub fn incompatibilities(&self) -> &IncompatibilityRules {
        &self.incompatibilities
    }

    /// Override the rewrite pass bound
    pub fn with_max_passes(mut self, max_passes: usize) -> Self {
        self.incompatibilities = self.incompatibilities.with_max_passes(max_passes);
        self
    }
}

/// Load and validate rule data
pub fn load_rules(source: impl Into<RuleSource>) -> Result<RuleSet, RuleLoadError> {
    match source.into() {
        RuleSource::Path(path) => {
            let bytes = std::fs::read(&path).map_err(|source| RuleLoadError::Io {
                path: path.clone(),
                source,
            })?;
            let rules = parse_rules(&bytes)?;
            tracing::info!(path = %path.display(), "loaded rule file");
            Ok(rules)
        }
        RuleSource::Bytes(bytes) => parse_rules(&bytes),
    }
}

fn parse_rules(bytes: &[u8]) -> Result<RuleSet, RuleLoadError> {
    let document: RuleDocument = serde_json::from_slice(bytes)?;

    let mut locales: BTreeMap<String, Locale> = Locale::builtin()
        .into_iter()
        .map(|l| (l.id.clone(), l))
        .collect();
    for record in document.locales {
        let locale = Locale::new(
            record.id.clone(),
            record.arg_separator,
            record.decimal_separator,
            record.array_column_separator,
            record.array_row_separator,
        );
        locale
            .validate()
            .map_err(|reason| RuleLoadError::InvalidLocale {
                id: record.id,
                reason,
            })?;
        locales.insert(locale.id.clone(), locale);
    }

    let mut functions = FunctionMapTable::new();
    for (source_name, targets) in document.functions {
        if source_name.trim().is_empty() {
            return Err(RuleLoadError::EmptyName(source_name));
        }
        for (locale_id, target_name) in targets {
            let locale_id = normalize_locale_id(&locale_id);
            if !locales.contains_key(&locale_id) {
                return Err(RuleLoadError::UnknownLocale {
                    function: source_name,
                    locale: locale_id,
                });
            }
            if target_name.trim().is_empty() {
                return Err(RuleLoadError::EmptyName(source_name));
            }
            functions.insert(FunctionMapEntry {
                source_name: source_name.clone(),
                target_name,
                locale_scope: locale_id,
            });
        }
    }

    let section = document.incompatibilities;
    let rules = section
        .rules
        .into_iter()
        .map(RuleRecord::into_rule)
        .collect::<Result<Vec<_>, _>>()?;
    let max_passes = section.max_passes.unwrap_or(DEFAULT_MAX_PASSES);
    if max_passes == 0 {
        return Err(RuleLoadError::InvalidPredicate {
            rule: "incompatibilities".into(),
            reason: "max_passes must be at least 1".into(),
        });
    }
    let incompatibilities = IncompatibilityRules::new(rules)
        .with_max_passes(max_passes)
        .with_function_names(&functions);

    tracing::debug!(
        locales = locales.len(),
        functions = functions.len(),
        rules = incompatibilities.len(),
        "parsed rule data"
    );
    Ok(RuleSet {
        locales,
        functions,
        incompatibilities,
    })
}
