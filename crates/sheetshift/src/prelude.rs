//! Prelude module - common imports for sheetshift users
//!
//! ```rust
//! use sheetshift::prelude::*;
//! ```

pub use crate::{
    // Addressing
    AddressMode,
    // Batches
    BatchReport,
    BatchSummary,
    CellAddress,
    // Errors
    Error,
    // Jobs and results
    FormulaJob,
    LlmCallError,
    LlmRequest,
    LlmResponse,
    // LLM boundary
    LlmTranslator,
    LocaleIds,
    Result,
    RuleSet,
    SheetContext,
    SheetRenames,
    TableGeometry,
    TranslatedCell,
    TranslationCache,
    // Engine
    TranslationEngine,
    TranslationOptions,
    TranslationPath,
    TranslationResult,
    TranslationStatus,
};
