//! # sheetshift
//!
//! Translates spreadsheet formulas between engines and locales, for example from Excel
//! en-US to LibreOffice Calc de-DE. Function names are remapped, separators rewritten,
//! structured table references resolved to A1 references, and declared dialect
//! incompatibilities repaired. Formulas the deterministic pipeline cannot fully handle can
//! be passed to an optional LLM collaborator.
//!
//! ## Example
//!
//! ```rust
//! use sheetshift::prelude::*;
//!
//! let engine = TranslationEngine::new().unwrap();
//! let job = FormulaJob::new(
//!     "Sheet1",
//!     CellAddress::parse("B5").unwrap(),
//!     "=IF(A1>10,\"Yes\",\"No\")",
//!     LocaleIds::new("en-US", "de-DE"),
//! );
//! let result = engine.translate(job);
//! assert_eq!(result.target_formula_text, "WENN(A1>10;\"Yes\";\"No\")");
//! assert_eq!(result.status, TranslationStatus::Translated);
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod job;
pub mod llm;
pub mod prelude;
pub mod translation;

pub use cache::{CacheKey, CacheStats, TranslationCache};
pub use config::TranslationOptions;
pub use error::{Error, Result};
pub use job::{
    BatchReport, BatchSummary, FormulaJob, LocaleIds, SheetContext, TranslatedCell,
    TranslationPath, TranslationResult, TranslationStatus,
};
pub use llm::{
    CancellationToken, LlmCallError, LlmRequest, LlmResponse, LlmTranslator, MAX_PENDING_CALLS,
};
pub use translation::{TranslationEngine, TranslationEngineBuilder};

// Re-export the layers below
pub use sheetshift_core::{CellAddress, CellRange, TableError, TableGeometry, TableSet};
pub use sheetshift_formula::{
    load_rules, AddressMode, RuleLoadError, RuleSet, RuleSource, SheetRenames,
};
