//! Translation orchestration
//!
//! Per job: cache lookup, then the deterministic pipeline, then (only where the pipeline
//! left something unsolved) the LLM collaborator. Per-formula failures become
//! [`TranslationStatus::Unsupported`] results with a note; they never abort a batch.
//!
//! | Situation | Status |
//! |-----------|--------|
//! | pipeline ok, no unmapped functions | `Translated` |
//! | pipeline ok, unmapped functions, no LLM | `Translated`, with a note |
//! | pipeline ok or unresolvable table reference, LLM answer accepted | `TranslatedWithFallback` |
//! | LLM failed, timed out, was cancelled or answered garbage | `Unsupported`, deterministic text kept |
//! | lex error, rewrite limit, bad tables, unknown locale, or unresolvable reference without LLM | `Unsupported`, source text kept |

use crate::cache::{normalize_source, CacheKey, CacheStats, TranslationCache};
use crate::config::TranslationOptions;
use crate::error::Result;
use crate::job::{
    BatchReport, FormulaJob, LocaleIds, TranslatedCell, TranslationPath, TranslationResult, TranslationStatus,
};
use crate::llm::{
    call_with_deadline, CallSlots, CancellationToken, LlmCallError, LlmRequest, LlmTranslator,
};
use rayon::prelude::*;
use sheetshift_core::TableSet;
use sheetshift_formula::{
    run_pipeline, tokenize_with, LexOptions, LocalePair, PipelineError, ResolveContext, RuleSet,
    TokenKind,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

/// Builder for [`TranslationEngine`]
#[derive(Default)]
pub struct TranslationEngineBuilder {
    rules: Option<RuleSet>,
    cache: Option<Arc<TranslationCache>>,
    llm: Option<Arc<dyn LlmTranslator>>,
    options: Option<TranslationOptions>,
}

impl TranslationEngineBuilder {
    /// Rule data to use instead of the built-in tables
    pub fn rules(mut self, rules: RuleSet) -> Self {
        self.rules = Some(rules);
        self
    }

    /// Share a cache between engines
    pub fn cache(mut self, cache: Arc<TranslationCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn llm(mut self, translator: Arc<dyn LlmTranslator>) -> Self {
        self.llm = Some(translator);
        self
    }

    pub fn options(mut self, options: TranslationOptions) -> Self {
        self.options = Some(options);
        self
    }

    pub fn build(self) -> Result<TranslationEngine> {
        let options = self.options.unwrap_or_default();
        options.validate()?;

        let mut rules = match self.rules {
            Some(rules) => rules,
            None => RuleSet::builtin()?,
        };
        if let Some(passes) = options.max_rewrite_passes {
            rules = rules.with_max_passes(passes);
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(options.concurrency)
            .thread_name(|i| format!("sheetshift-{i}"))
            .build()?;

        let llm = if options.llm_enabled { self.llm } else { None };
        tracing::debug!(
            concurrency = options.concurrency,
            llm = llm.is_some(),
            functions = rules.functions().len(),
            "translation engine ready"
        );
        Ok(TranslationEngine {
            rules: Arc::new(rules),
            cache: self.cache.unwrap_or_default(),
            llm,
            options,
            cancel: CancellationToken::new(),
            llm_slots: CallSlots::default(),
            pool,
        })
    }
}

/// Translates formula jobs. Safe to share across threads.
pub struct TranslationEngine {
    rules: Arc<RuleSet>,
    cache: Arc<TranslationCache>,
    llm: Option<Arc<dyn LlmTranslator>>,
    options: TranslationOptions,
    cancel: CancellationToken,
    llm_slots: CallSlots,
    pool: rayon::ThreadPool,
}

impl TranslationEngine {
    pub fn builder() -> TranslationEngineBuilder {
        TranslationEngineBuilder::default()
    }

    /// Built-in rules, default options, no LLM
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn options(&self) -> &TranslationOptions {
        &self.options
    }

    pub fn cache(&self) -> &Arc<TranslationCache> {
        &self.cache
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn export_cache(&self) -> Result<Vec<u8>> {
        self.cache.export()
    }

    pub fn import_cache(&self, bytes: &[u8]) -> Result<usize> {
        self.cache.import(bytes)
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Token that cancels pending and future LLM calls of this engine
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn translate(&self, job: FormulaJob) -> TranslationResult {
        self.translate_cell(job).result
    }

    /// Translate one job and report how the result was reached
    pub fn translate_cell(&self, job: FormulaJob) -> TranslatedCell {
        let FormulaJob {
            cell,
            source_formula_text,
            locale_pair,
            tables,
            sheet_context,
        } = job;
        let source = normalize_source(&source_formula_text);
        let done = |result: TranslationResult, path: TranslationPath| TranslatedCell {
            sheet: sheet_context.sheet.clone(),
            cell,
            result,
            path,
        };
        let failed = |note: String| {
            done(
                TranslationResult::unsupported(source.clone(), vec![note], BTreeSet::new()),
                TranslationPath::Failed,
            )
        };

        let Some(pair) = self.rules.locale_pair(&locale_pair.source, &locale_pair.target) else {
            return failed(format!("unknown locale pair {locale_pair}"));
        };
        let tables = match TableSet::new(tables) {
            Ok(tables) => tables,
            Err(e) => return failed(format!("table geometry rejected: {e}")),
        };

        let mode = sheet_context
            .address_mode
            .unwrap_or(self.options.address_mode);
        let renames = &sheet_context.sheet_renames;

        // Only formulas that lex can be cached; the pipeline reports the error otherwise
        let key = tokenize_with(&source, &LexOptions::from(&pair.source))
            .ok()
            .map(|tokens| {
                let key = CacheKey::new(&source, &locale_pair);
                let mut context = Vec::new();
                let key = if tokens.contains_kind(TokenKind::StructuredReference) {
                    context.push(format!("mode={mode:?}"));
                    context.push(format!("tables={}", tables.fingerprint()));
                    key.anchored(&sheet_context.sheet, &cell)
                } else {
                    key
                };
                if !renames.is_empty() {
                    let pairs: Vec<String> = renames
                        .iter()
                        .map(|(from, to)| format!("{from:?}>{to:?}"))
                        .collect();
                    context.push(format!("sheets={}", pairs.join(",")));
                }
                key.with_context(context.join(";"))
            });
        if let Some(hit) = key.as_ref().and_then(|k| self.cache.get(k)) {
            tracing::debug!(cell = %cell, "cache hit");
            return done(hit, TranslationPath::CacheHit);
        }

        let ctx = ResolveContext::new(&sheet_context.sheet, cell)
            .with_mode(mode)
            .with_sheet_renames(renames);
        let (result, path) = self.run(&source, &pair, &locale_pair, &tables, &ctx);

        let result = match key {
            Some(key) if result.status.is_success() => self.cache.insert_or_get(key, result),
            _ => result,
        };
        done(result, path)
    }

    fn run(
        &self,
        source: &str,
        pair: &LocalePair,
        ids: &LocaleIds,
        tables: &TableSet,
        ctx: &ResolveContext<'_>,
    ) -> (TranslationResult, TranslationPath) {
        match run_pipeline(source, pair, &self.rules, tables, ctx) {
            Ok(output) => match &self.llm {
                Some(llm) if !output.unmapped.is_empty() => self.enrich(
                    llm,
                    ctx,
                    source,
                    pair,
                    ids,
                    output.text(),
                    output.notes,
                    output.unmapped,
                ),
                _ => (
                    TranslationResult {
                        target_formula_text: output.text(),
                        status: TranslationStatus::Translated,
                        notes: output.notes,
                        unmapped_functions: output.unmapped,
                    },
                    TranslationPath::Deterministic,
                ),
            },
            Err(failure) => {
                let note = format!("{}: {}", failure_kind(&failure.error), failure.error);
                let mut notes = failure.notes;
                notes.push(note);
                match (&failure.error, &self.llm) {
                    (PipelineError::Resolve(_), Some(llm)) => self.enrich(
                        llm,
                        ctx,
                        source,
                        pair,
                        ids,
                        source.to_string(),
                        notes,
                        failure.unmapped,
                    ),
                    _ => (
                        TranslationResult::unsupported(source, notes, failure.unmapped),
                        TranslationPath::Failed,
                    ),
                }
            }
        }
    }

    /// Ask the LLM for a translation. `fallback` is what the job keeps if the answer is
    /// not usable.
    #[allow(clippy::too_many_arguments)]
    fn enrich(
        &self,
        llm: &Arc<dyn LlmTranslator>,
        ctx: &ResolveContext<'_>,
        source: &str,
        pair: &LocalePair,
        ids: &LocaleIds,
        fallback: String,
        mut notes: Vec<String>,
        unmapped: BTreeSet<String>,
    ) -> (TranslationResult, TranslationPath) {
        let mut hints = notes.clone();
        hints.extend(
            self.rules
                .incompatibilities()
                .rules()
                .iter()
                .filter(|rule| !rule.description.is_empty())
                .map(|rule| rule.description.clone()),
        );
        if let Some(renames) = ctx.sheet_renames {
            hints.extend(
                renames
                    .iter()
                    .map(|(from, to)| format!("sheet \"{from}\" is now \"{to}\"")),
            );
        }
        let request = LlmRequest {
            source_formula_text: source.to_string(),
            locale_pair: ids.normalized(),
            known_incompatibility_hints: hints,
        };

        let started = Instant::now();
        let answer = call_with_deadline(
            llm,
            request,
            self.options.llm_timeout,
            &self.cancel,
            &self.llm_slots,
        )
        .and_then(|response| validate_answer(&response.target_formula_text, pair));
        match answer {
            Ok(text) => {
                tracing::debug!(elapsed = ?started.elapsed(), "LLM translation accepted");
                notes.push("translated by LLM fallback".into());
                (
                    TranslationResult {
                        target_formula_text: text,
                        status: TranslationStatus::TranslatedWithFallback,
                        notes,
                        unmapped_functions: unmapped,
                    },
                    TranslationPath::DeterministicWithFallback,
                )
            }
            Err(e) => {
                tracing::warn!(error = %e, "LLM fallback failed");
                notes.push(e.to_string());
                (
                    TranslationResult::unsupported(fallback, notes, unmapped),
                    TranslationPath::Failed,
                )
            }
        }
    }

    /// Translate every job on the engine's worker pool. Results keep job order.
    pub fn translate_batch(&self, jobs: Vec<FormulaJob>) -> BatchReport {
        let started = Instant::now();
        let cells: Vec<TranslatedCell> = self
            .pool
            .install(|| jobs.into_par_iter().map(|job| self.translate_cell(job)).collect());
        let report = BatchReport::from_cells(cells);
        tracing::info!(
            total = report.summary.total,
            unsupported = report.summary.unsupported,
            cache_hits = report.summary.cache_hits,
            elapsed = ?started.elapsed(),
            "batch translated"
        );
        report
    }
}

impl std::fmt::Debug for TranslationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranslationEngine")
            .field("options", &self.options)
            .field("llm", &self.llm.is_some())
            .field("cache", &self.cache.stats())
            .finish()
    }
}

fn failure_kind(error: &PipelineError) -> &'static str {
    match error {
        PipelineError::Lex(_) => "lex error",
        PipelineError::Resolve(_) => "structured reference error",
        PipelineError::RewriteLimit(_) => "rewrite error",
    }
}

/// LLM answers must at least tokenize under the target locale
fn validate_answer(text: &str, pair: &LocalePair) -> std::result::Result<String, LlmCallError> {
    let text = normalize_source(text);
    if text.is_empty() {
        return Err(LlmCallError::InvalidResponse("empty formula".into()));
    }
    tokenize_with(&text, &LexOptions::from(&pair.target))
        .map_err(|e| LlmCallError::InvalidResponse(e.to_string()))?;
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmResponse;
    use pretty_assertions::assert_eq;
    use sheetshift_core::CellAddress;
    use std::time::Duration;

    fn job(formula: &str) -> FormulaJob {
        FormulaJob::new(
            "Sheet1",
            CellAddress::new(0, 0),
            formula,
            LocaleIds::new("en-US", "de-DE"),
        )
    }

    fn engine_with(answer: &'static str) -> TranslationEngine {
        let llm: Arc<dyn LlmTranslator> = Arc::new(move |_: &LlmRequest, _: Duration| -> std::result::Result<LlmResponse, LlmCallError> {
            Ok(LlmResponse {
                target_formula_text: answer.to_string(),
            })
        });
        TranslationEngine::builder()
            .llm(llm)
            .options(TranslationOptions::default().with_concurrency(2))
            .build()
            .unwrap()
    }

    #[test]
    fn test_unknown_locale_is_unsupported() {
        let engine = TranslationEngine::new().unwrap();
        let mut job = job("SUM(1)");
        job.locale_pair = LocaleIds::new("en-US", "xx-XX");
        let cell = engine.translate_cell(job);
        assert_eq!(cell.path, TranslationPath::Failed);
        assert_eq!(cell.result.status, TranslationStatus::Unsupported);
        assert_eq!(cell.result.target_formula_text, "SUM(1)");
        assert_eq!(cell.result.notes, vec!["unknown locale pair en-US->xx-XX".to_string()]);
    }

    #[test]
    fn test_llm_answer_must_tokenize() {
        let engine = engine_with("=SUMME(FOO(1;2)");
        let result = engine.translate(job("SUM(FOO(1,2))"));
        assert_eq!(result.status, TranslationStatus::Unsupported);
        assert_eq!(result.target_formula_text, "SUMME(FOO(1;2))");
        assert!(result.notes.last().unwrap().starts_with("LLM response rejected"));
        assert!(engine.cache().is_empty());
    }

    #[test]
    fn test_llm_disabled_by_options() {
        let llm: Arc<dyn LlmTranslator> = Arc::new(|_: &LlmRequest, _: Duration| -> std::result::Result<LlmResponse, LlmCallError> {
            Err(LlmCallError::Failed("must not be called".into()))
        });
        let engine = TranslationEngine::builder()
            .llm(llm)
            .options(TranslationOptions::default().with_llm_enabled(false))
            .build()
            .unwrap();
        let result = engine.translate(job("FOO(1,2)"));
        assert_eq!(result.status, TranslationStatus::Translated);
        assert_eq!(result.target_formula_text, "FOO(1;2)");
    }

    #[test]
    fn test_cancelled_engine_skips_llm() {
        let engine = engine_with("BAR(1)");
        engine.cancel();
        let result = engine.translate(job("FOO(1)"));
        assert_eq!(result.status, TranslationStatus::Unsupported);
        assert_eq!(result.notes.last().unwrap(), "LLM call cancelled");
        assert!(engine.cancellation_token().is_cancelled());
    }

    #[test]
    fn test_invalid_options_are_rejected() {
        let err = TranslationEngine::builder()
            .options(TranslationOptions::default().with_concurrency(0))
            .build()
            .unwrap_err();
        assert!(matches!(err, crate::Error::Config(_)));
    }

    #[test]
    fn test_pass_override_applies_to_rules() {
        let engine = TranslationEngine::builder()
            .options(TranslationOptions::default().with_max_rewrite_passes(2))
            .build()
            .unwrap();
        assert_eq!(engine.rules().incompatibilities().max_passes(), 2);
    }
}
