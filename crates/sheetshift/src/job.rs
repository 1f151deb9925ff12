//! Jobs, results and batch reports

use serde::{Deserialize, Serialize};
use sheetshift_core::{qualify_with_sheet, CellAddress, TableGeometry};
use sheetshift_formula::{normalize_locale_id, AddressMode, SheetRenames};
use std::collections::BTreeSet;
use std::fmt;

/// Source and target locale ids of a job, e.g. `en-US` to `de-DE`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LocaleIds {
    pub source: String,
    pub target: String,
}

impl LocaleIds {
    /// Ids are stored in canonical `ll-RR` form
    pub fn new(source: &str, target: &str) -> Self {
        Self {
            source: normalize_locale_id(source),
            target: normalize_locale_id(target),
        }
    }

    pub(crate) fn normalized(&self) -> Self {
        Self::new(&self.source, &self.target)
    }
}

impl fmt::Display for LocaleIds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.source, self.target)
    }
}

/// The sheet a formula lives on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetContext {
    pub sheet: String,
    /// Overrides the engine's addressing for structured references
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_mode: Option<AddressMode>,
    /// Sheets renamed by the conversion, source name to target name
    #[serde(default, skip_serializing_if = "SheetRenames::is_empty")]
    pub sheet_renames: SheetRenames,
}

impl SheetContext {
    pub fn new(sheet: impl Into<String>) -> Self {
        Self {
            sheet: sheet.into(),
            address_mode: None,
            sheet_renames: SheetRenames::new(),
        }
    }
}

/// One formula cell to translate
///
/// ```json
/// {
///   "cell": "C5",
///   "source_formula_text": "=[@Amount]*2",
///   "locale_pair": { "source": "en-US", "target": "de-DE" },
///   "sheet_context": { "sheet": "Data", "sheet_renames": { "Data": "Daten" } },
///   "tables": [{ "table_name": "Sales", "anchor_sheet": "Data", "header_row": 1,
///                "first_data_row": 2, "last_data_row": 9, "first_column": 1,
///                "column_names": ["Amount", "Date"] }]
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormulaJob {
    pub cell: CellAddress,
    /// Formula text, with or without the leading `=`
    pub source_formula_text: String,
    pub locale_pair: LocaleIds,
    /// Tables visible to structured references
    #[serde(default)]
    pub tables: Vec<TableGeometry>,
    pub sheet_context: SheetContext,
}

impl FormulaJob {
    pub fn new(
        sheet: impl Into<String>,
        cell: CellAddress,
        source_formula_text: impl Into<String>,
        locale_pair: LocaleIds,
    ) -> Self {
        Self {
            cell,
            source_formula_text: source_formula_text.into(),
            locale_pair,
            tables: Vec::new(),
            sheet_context: SheetContext::new(sheet),
        }
    }

    pub fn with_tables(mut self, tables: Vec<TableGeometry>) -> Self {
        self.tables = tables;
        self
    }

    pub fn with_address_mode(mut self, mode: AddressMode) -> Self {
        self.sheet_context.address_mode = Some(mode);
        self
    }

    pub fn with_sheet_renames(mut self, renames: SheetRenames) -> Self {
        self.sheet_context.sheet_renames = renames;
        self
    }

    /// `Sheet!B5`
    pub fn location(&self) -> String {
        qualify_with_sheet(&self.sheet_context.sheet, &self.cell.to_a1_string())
    }
}

/// Outcome class of a translation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranslationStatus {
    Translated,
    /// The LLM supplied the final text
    TranslatedWithFallback,
    /// No trustworthy translation; the target text is the best available fallback
    Unsupported,
}

impl TranslationStatus {
    pub fn is_success(self) -> bool {
        !matches!(self, TranslationStatus::Unsupported)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TranslationStatus::Translated => "translated",
            TranslationStatus::TranslatedWithFallback => "translated_with_fallback",
            TranslationStatus::Unsupported => "unsupported",
        }
    }
}

impl fmt::Display for TranslationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Translated formula text plus what the writer should surface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationResult {
    /// Formula text without the leading `=`
    pub target_formula_text: String,
    pub status: TranslationStatus,
    #[serde(default)]
    pub notes: Vec<String>,
    #[serde(default)]
    pub unmapped_functions: BTreeSet<String>,
}

impl TranslationResult {
    pub(crate) fn unsupported(
        target_formula_text: impl Into<String>,
        notes: Vec<String>,
        unmapped_functions: BTreeSet<String>,
    ) -> Self {
        Self {
            target_formula_text: target_formula_text.into(),
            status: TranslationStatus::Unsupported,
            notes,
            unmapped_functions,
        }
    }
}

/// How a job reached its result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranslationPath {
    CacheHit,
    Deterministic,
    DeterministicWithFallback,
    Failed,
}

/// Record handed to the document writer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslatedCell {
    pub sheet: String,
    pub cell: CellAddress,
    pub result: TranslationResult,
    pub path: TranslationPath,
}

/// Counts over a batch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub translated: usize,
    pub translated_with_fallback: usize,
    pub unsupported: usize,
    pub cache_hits: usize,
    pub deterministic: usize,
    pub deterministic_with_fallback: usize,
    pub failed: usize,
    /// Every unmapped function name seen in the batch
    pub unmapped_functions: BTreeSet<String>,
}

impl BatchSummary {
    pub fn record(&mut self, cell: &TranslatedCell) {
        self.total += 1;
        match cell.result.status {
            TranslationStatus::Translated => self.translated += 1,
            TranslationStatus::TranslatedWithFallback => self.translated_with_fallback += 1,
            TranslationStatus::Unsupported => self.unsupported += 1,
        }
        match cell.path {
            TranslationPath::CacheHit => self.cache_hits += 1,
            TranslationPath::Deterministic => self.deterministic += 1,
            TranslationPath::DeterministicWithFallback => self.deterministic_with_fallback += 1,
            TranslationPath::Failed => self.failed += 1,
        }
        self.unmapped_functions
            .extend(cell.result.unmapped_functions.iter().cloned());
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} formulas: {} translated, {} translated with fallback, {} unsupported",
            self.total, self.translated, self.translated_with_fallback, self.unsupported
        )?;
        write!(
            f,
            "paths: {} cache hits, {} deterministic, {} with fallback, {} failed",
            self.cache_hits, self.deterministic, self.deterministic_with_fallback, self.failed
        )?;
        if !self.unmapped_functions.is_empty() {
            let names: Vec<&str> = self.unmapped_functions.iter().map(String::as_str).collect();
            write!(f, "\nunmapped functions: {}", names.join(", "))?;
        }
        Ok(())
    }
}

/// Results of a batch in job order, plus a summary
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub cells: Vec<TranslatedCell>,
    pub summary: BatchSummary,
}

impl BatchReport {
    pub fn from_cells(cells: Vec<TranslatedCell>) -> Self {
        let mut summary = BatchSummary::default();
        for cell in &cells {
            summary.record(cell);
        }
        Self { cells, summary }
    }

    /// Result for one cell; sheet names compare case-insensitively
    pub fn get(&self, sheet: &str, cell: &CellAddress) -> Option<&TranslatedCell> {
        self.cells.iter().find(|c| {
            c.sheet.eq_ignore_ascii_case(sheet) && c.cell.row == cell.row && c.cell.col == cell.col
        })
    }
}
