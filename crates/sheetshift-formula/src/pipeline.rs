//! The deterministic translation pipeline
//!
//! lex → normalize separators → map function names → resolve structured references →
//! rename sheets → rewrite incompatibilities. Every stage is pure; the first failing stage
//! ends the run.

use crate::error::PipelineError;
use crate::functions::map_function_names;
use crate::lexer::{tokenize_with, LexOptions};
use crate::locale::{normalize_separators, LocalePair};
use crate::rewrite::rewrite_with_renames;
use crate::rules::RuleSet;
use crate::sheets::{rename_sheets, SheetRenames};
use crate::structured::{has_this_row_reference, resolve_structured_refs, ResolveContext};
use crate::token::{TokenKind, TokenStream};
use sheetshift_core::TableSet;
use std::collections::BTreeSet;

/// Result of a successful run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOutput {
    pub tokens: TokenStream,
    /// Function names with no mapping for the target locale, upper-cased
    pub unmapped: BTreeSet<String>,
    pub notes: Vec<String>,
    /// The formula refers to the current table row
    pub position_dependent: bool,
}

impl PipelineOutput {
    /// Target formula text, without a leading `=`
    pub fn text(&self) -> String {
        self.tokens.to_formula_string()
    }
}

/// A failed run, with what the stages before the failure found
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineFailure {
    pub error: PipelineError,
    pub unmapped: BTreeSet<String>,
    pub notes: Vec<String>,
    /// Output of the last stage that succeeded, when lexing did
    pub partial: Option<TokenStream>,
}

impl PipelineFailure {
    fn new(error: impl Into<PipelineError>) -> Self {
        Self {
            error: error.into(),
            unmapped: BTreeSet::new(),
            notes: Vec::new(),
            partial: None,
        }
    }
}

/// Strip the leading `=` a cell formula carries
pub fn strip_formula_prefix(text: &str) -> &str {
    text.trim_start().strip_prefix('=').unwrap_or(text)
}

/// Run every stage over one formula.
///
/// ```
/// use sheetshift_core::{CellAddress, TableSet};
/// use sheetshift_formula::{run_pipeline, ResolveContext, RuleSet};
///
/// let rules = RuleSet::builtin().unwrap();
/// let pair = rules.locale_pair("en-US", "de-DE").unwrap();
/// let cell = CellAddress::parse("A1").unwrap();
/// let ctx = ResolveContext::new("Sheet1", cell);
/// let out = run_pipeline("=SUM(A1,A2)", &pair, &rules, &TableSet::default(), &ctx).unwrap();
/// assert_eq!(out.text(), "SUMME(A1;A2)");
/// ```
pub fn run_pipeline(
    text: &str,
    pair: &LocalePair,
    rules: &RuleSet,
    tables: &TableSet,
    ctx: &ResolveContext<'_>,
) -> Result<PipelineOutput, PipelineFailure> {
    let text = strip_formula_prefix(text);
    let lexed = tokenize_with(text, &LexOptions::from(&pair.source)).map_err(PipelineFailure::new)?;
    let position_dependent = has_this_row_reference(&lexed);

    let (normalized, mut notes) = normalize_separators(&lexed, pair);
    let (mapped, unmapped) = map_function_names(&normalized, &pair.target, rules.functions());
    if !unmapped.is_empty() {
        notes.push(format!(
            "no {} mapping for: {}",
            pair.target.id,
            unmapped.iter().cloned().collect::<Vec<_>>().join(", ")
        ));
    }

    let fail = |error: PipelineError, notes: Vec<String>, partial: &TokenStream| PipelineFailure {
        error,
        unmapped: unmapped.clone(),
        notes,
        partial: Some(partial.clone()),
    };

    let resolved = if mapped.contains_kind(TokenKind::StructuredReference) {
        resolve_structured_refs(&mapped, tables, ctx)
            .map_err(|e| fail(e.into(), notes.clone(), &mapped))?
    } else {
        mapped
    };

    let no_renames = SheetRenames::new();
    let renames = ctx.sheet_renames.unwrap_or(&no_renames);
    let renamed = rename_sheets(&resolved, renames);

    let (tokens, applied) = rewrite_with_renames(&renamed, rules.incompatibilities(), renames)
        .map_err(|e| fail(e.into(), notes.clone(), &renamed))?;
    for rewrite in &applied {
        notes.push(format!(
            "{}: {} -> {}",
            rewrite.rule, rewrite.original, rewrite.replacement
        ));
    }

    tracing::trace!(
        source = text,
        target = %tokens,
        unmapped = unmapped.len(),
        rewrites = applied.len(),
        "pipeline run"
    );
    Ok(PipelineOutput {
        tokens,
        unmapped,
        notes,
        position_dependent,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{LexError, ResolveError, RewriteLimitExceeded};
    use crate::structured::AddressMode;
    use pretty_assertions::assert_eq;
    use sheetshift_core::{CellAddress, TableGeometry};

    fn rules() -> RuleSet {
        RuleSet::builtin().unwrap()
    }

    fn run(text: &str, from: &str, to: &str) -> Result<PipelineOutput, PipelineFailure> {
        let rules = rules();
        let pair = rules.locale_pair(from, to).unwrap();
        let ctx = ResolveContext::new("Sheet1", CellAddress::new(0, 0));
        run_pipeline(text, &pair, &rules, &TableSet::default(), &ctx)
    }

    fn tables() -> TableSet {
        let table = TableGeometry::from_header(
            "Sales",
            "Data",
            CellAddress::parse("B2").unwrap(),
            10,
            ["Amount", "Date"],
        );
        TableSet::new([table]).unwrap()
    }

    #[test]
    fn test_sum_en_to_de() {
        let out = run("SUM(A1,A2)", "en-US", "de-DE").unwrap();
        assert_eq!(out.text(), "SUMME(A1;A2)");
        assert!(out.unmapped.is_empty());
        assert!(out.notes.is_empty());
        assert!(!out.position_dependent);
    }

    #[test]
    fn test_if_en_to_de() {
        let out = run("=IF(A1>10,\"Yes\",\"No\")", "en-US", "de-DE").unwrap();
        assert_eq!(out.text(), "WENN(A1>10;\"Yes\";\"No\")");
    }

    #[test]
    fn test_decimal_numbers_en_to_fr() {
        let out = run("ROUND(A1*1.5,2)", "en-US", "fr-FR").unwrap();
        assert_eq!(out.text(), "ARRONDI(A1*1,5;2)");
    }

    #[test]
    fn test_de_source_is_lexed_with_de_separators() {
        let out = run("SUM(1,5;A1)", "de-DE", "en-US").unwrap();
        assert_eq!(out.text(), "SUM(1.5,A1)");
    }

    #[test]
    fn test_address_rewrite() {
        let out = run("INDIRECT(ADDRESS(10,5,1,1,\"Sheet1\"))", "en-US", "en-US").unwrap();
        assert_eq!(out.text(), "INDIRECT(\"Sheet1.\" & ADDRESS(10,5,1,1))");
        assert_eq!(out.notes.len(), 1);
        assert!(out.notes[0].starts_with("address-sheet-argument: "));

        let out = run("INDIRECT(ADDRESS(10,5,1,1,\"Sheet1\"))", "en-US", "de-DE").unwrap();
        assert_eq!(out.text(), "INDIREKT(\"Sheet1.\" & ADRESSE(10;5;1;1))");
    }

    #[test]
    fn test_unmapped_functions_are_reported() {
        let out = run("SUM(MYUDF(A1),_xlfn.FOOBAR(2))", "en-US", "de-DE").unwrap();
        assert_eq!(out.text(), "SUMME(MYUDF(A1);_xlfn.FOOBAR(2))");
        assert_eq!(
            out.unmapped.iter().cloned().collect::<Vec<_>>(),
            vec!["FOOBAR".to_string(), "MYUDF".to_string()]
        );
        assert_eq!(out.notes, vec!["no de-DE mapping for: FOOBAR, MYUDF".to_string()]);
    }

    #[test]
    fn test_structured_reference_modes() {
        let rules = rules();
        let pair = rules.locale_pair("en-US", "de-DE").unwrap();
        let cell = CellAddress::parse("C5").unwrap();
        let ctx = ResolveContext::new("Data", cell);

        let out = run_pipeline("[@Amount]*2", &pair, &rules, &tables(), &ctx).unwrap();
        assert_eq!(out.text(), "$B5*2");
        assert!(out.position_dependent);

        let ctx = ctx.with_mode(AddressMode::Relative);
        let out = run_pipeline("[@Amount]*2", &pair, &rules, &tables(), &ctx).unwrap();
        assert_eq!(out.text(), "B5*2");
    }

    #[test]
    fn test_sheet_renames_reach_every_reference() {
        let rules = rules();
        let pair = rules.locale_pair("en-US", "de-DE").unwrap();
        let renames: SheetRenames = [("Data", "Daten 2024")].into_iter().collect();
        let ctx = ResolveContext::new("Summary", CellAddress::new(0, 0)).with_sheet_renames(&renames);

        let out = run_pipeline(
            "SUM(Sales[Amount])+INDIRECT(ADDRESS(1,1,1,1,\"Data\"))+Data!A1+Other!A1",
            &pair,
            &rules,
            &tables(),
            &ctx,
        )
        .unwrap();
        assert_eq!(
            out.text(),
            "SUMME('Daten 2024'!$B3:$B12)+INDIREKT(\"'Daten 2024'.\" & ADRESSE(1;1;1;1))\
             +'Daten 2024'!A1+Other!A1"
        );

        let unrenamed = ResolveContext::new("Summary", CellAddress::new(0, 0));
        let out = run_pipeline("Data!A1", &pair, &rules, &tables(), &unrenamed).unwrap();
        assert_eq!(out.text(), "Data!A1");
    }

    #[test]
    fn test_failures_keep_stage_context() {
        let err = run("IF(A1=\"open,0)", "en-US", "de-DE").unwrap_err();
        assert_eq!(
            err.error,
            PipelineError::Lex(LexError::UnterminatedLiteral { offset: 6 })
        );
        assert_eq!(err.partial, None);

        let rules = rules();
        let pair = rules.locale_pair("en-US", "de-DE").unwrap();
        let ctx = ResolveContext::new("Data", CellAddress::parse("C5").unwrap());
        let err = run_pipeline("MYUDF(Nope[Amount])", &pair, &rules, &tables(), &ctx).unwrap_err();
        assert_eq!(
            err.error,
            PipelineError::Resolve(ResolveError::UnknownTable("Nope".into()))
        );
        assert!(err.unmapped.contains("MYUDF"));
        assert_eq!(err.partial.unwrap().to_string(), "MYUDF(Nope[Amount])");
    }

    #[test]
    fn test_rewrite_limit_is_a_failure() {
        use crate::rewrite::{CallMatcher, IncompatibilityRule, IncompatibilityRules};

        let swap = IncompatibilityRule::new(
            "swap",
            "",
            CallMatcher::new("F").arity(2),
            "{name}({arg2}{sep}{arg1})",
        )
        .unwrap();
        let json = br#"{"incompatibilities": {"max_passes": 3, "rules": [
            {"name": "swap", "function": "F", "min_args": 2, "max_args": 2,
             "template": "{name}({arg2}{sep}{arg1})"}]}}"#;
        let rules = crate::rules::load_rules(&json[..]).unwrap();
        assert_eq!(rules.incompatibilities().rules()[0], swap);
        assert_eq!(IncompatibilityRules::new(vec![swap]).len(), 1);

        let pair = rules.locale_pair("en-US", "en-US").unwrap();
        let ctx = ResolveContext::new("Sheet1", CellAddress::new(0, 0));
        let err = run_pipeline("F(1,2)", &pair, &rules, &TableSet::default(), &ctx).unwrap_err();
        assert_eq!(
            err.error,
            PipelineError::RewriteLimit(RewriteLimitExceeded { passes: 3 })
        );
    }
}
