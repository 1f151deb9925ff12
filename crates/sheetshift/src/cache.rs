//! Concurrent translation cache
//!
//! Keys are the normalized source text and locale pair. Formulas whose translation
//! depends on where they sit (structured references) also carry the cell as an anchor,
//! so a result is never reused for another row. Anything else the result depends on
//! (addressing mode, table geometry, sheet renames) goes into the key's context.

use crate::error::Result;
use crate::job::{LocaleIds, TranslationResult};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sheetshift_core::{qualify_with_sheet, CellAddress};
use sheetshift_formula::strip_formula_prefix;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey {
    pub source: String,
    pub locale_pair: LocaleIds,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl CacheKey {
    pub fn new(source_formula_text: &str, locale_pair: &LocaleIds) -> Self {
        Self {
            source: normalize_source(source_formula_text),
            locale_pair: locale_pair.normalized(),
            anchor: None,
            context: None,
        }
    }

    /// Pin the key to one cell
    pub fn anchored(mut self, sheet: &str, cell: &CellAddress) -> Self {
        self.anchor = Some(qualify_with_sheet(sheet, &cell.relative().to_a1_string()));
        self
    }

    /// Pin the key to the inputs besides the text that shaped the result.
    /// An empty context leaves the key unchanged.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        let context = context.into();
        self.context = (!context.is_empty()).then_some(context);
        self
    }
}

/// Source text as cached: no leading `=`, no surrounding whitespace
pub fn normalize_source(text: &str) -> String {
    strip_formula_prefix(text).trim().to_string()
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheRecord {
    key: CacheKey,
    result: TranslationResult,
}

/// Hit and miss counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

/// Successful translations shared between jobs and threads
#[derive(Debug, Default)]
pub struct TranslationCache {
    entries: DashMap<CacheKey, TranslationResult>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl TranslationCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &CacheKey) -> Option<TranslationResult> {
        let found = self.entries.get(key).map(|entry| entry.value().clone());
        let counter = if found.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    /// Store `result` unless the key already has a value, returning the stored value.
    /// Only successful results are stored.
    pub fn insert_or_get(&self, key: CacheKey, result: TranslationResult) -> TranslationResult {
        if !result.status.is_success() {
            return result;
        }
        self.entries.entry(key).or_insert(result).value().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// JSON list of key/result records, sorted by key
    pub fn export(&self) -> Result<Vec<u8>> {
        let mut records: Vec<CacheRecord> = self
            .entries
            .iter()
            .map(|entry| CacheRecord {
                key: entry.key().clone(),
                result: entry.value().clone(),
            })
            .collect();
        records.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(serde_json::to_vec_pretty(&records)?)
    }

    /// Merge exported records. Existing entries win; unsuccessful results are skipped.
    /// Returns how many records were added.
    pub fn import(&self, bytes: &[u8]) -> Result<usize> {
        let records: Vec<CacheRecord> = serde_json::from_slice(bytes)?;
        let mut added = 0;
        for record in records {
            if !record.result.status.is_success() {
                tracing::warn!(source = %record.key.source, "skipping unsuccessful cache record");
                continue;
            }
            if let dashmap::mapref::entry::Entry::Vacant(slot) = self.entries.entry(record.key) {
                slot.insert(record.result);
                added += 1;
            }
        }
        tracing::debug!(added, entries = self.entries.len(), "imported cache records");
        Ok(added)
    }
}
