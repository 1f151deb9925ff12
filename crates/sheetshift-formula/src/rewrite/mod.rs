//! Incompatibility rewriting
//!
//! Constructs that exist in the source dialect but not in the target are rewritten by
//! declarative [`IncompatibilityRule`]s. Each pass finds the outermost non-overlapping
//! matching calls, expands their templates and splices the results back right-to-left.
//! Passes repeat until nothing changes, up to a fixed bound.

mod call;
mod rule;
mod template;

pub use rule::{ArgumentKind, ArgumentPredicate, CallMatcher, IncompatibilityRule};
pub use template::Template;

use crate::error::RewriteLimitExceeded;
use crate::functions::{strip_future_prefix, FunctionMapTable};
use crate::sheets::SheetRenames;
use crate::token::{Token, TokenKind, TokenStream};
use ahash::AHashMap;
use call::{find_calls, CallNode};
use std::collections::BTreeSet;
use std::ops::Range;

/// Pass bound used when rule data does not set one
pub const DEFAULT_MAX_PASSES: usize = 16;

/// Alternative spellings of the function names rules mention
#[derive(Debug, Clone, Default)]
pub(crate) struct NameAliases {
    by_name: AHashMap<String, BTreeSet<String>>,
}

impl NameAliases {
    pub(crate) fn matches(&self, written: &str, wanted: &str) -> bool {
        let written = strip_future_prefix(written).to_uppercase();
        let wanted = strip_future_prefix(wanted).to_uppercase();
        written == wanted
            || self
                .by_name
                .get(&wanted)
                .map_or(false, |names| names.contains(&written))
    }
}

/// An ordered rule list plus its pass bound
#[derive(Debug, Clone)]
pub struct IncompatibilityRules {
    rules: Vec<IncompatibilityRule>,
    max_passes: usize,
    aliases: NameAliases,
}

impl Default for IncompatibilityRules {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl IncompatibilityRules {
    pub fn new(rules: Vec<IncompatibilityRule>) -> Self {
        Self {
            rules,
            max_passes: DEFAULT_MAX_PASSES,
            aliases: NameAliases::default(),
        }
    }

    pub fn with_max_passes(mut self, max_passes: usize) -> Self {
        self.max_passes = max_passes.max(1);
        self
    }

    /// Let rules match the target-locale spellings of the functions they name
    pub fn with_function_names(mut self, table: &FunctionMapTable) -> Self {
        let mut aliases = NameAliases::default();
        for rule in &self.rules {
            let matcher = &rule.matcher;
            let mentioned = std::iter::once(&matcher.function)
                .chain(matcher.enclosing.iter())
                .chain(matcher.arguments.iter().filter_map(|p| p.function.as_ref()));
            for name in mentioned {
                let key = strip_future_prefix(name).to_uppercase();
                aliases
                    .by_name
                    .entry(key)
                    .or_default()
                    .extend(table.target_names(name));
            }
        }
        self.aliases = aliases;
        self
    }

    pub fn rules(&self) -> &[IncompatibilityRule] {
        &self.rules
    }

    pub fn max_passes(&self) -> usize {
        self.max_passes
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Record of one template expansion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedRewrite {
    pub rule: String,
    pub original: String,
    pub replacement: String,
}

/// Rewrite until a fixed point is reached.
///
/// ```
/// use sheetshift_formula::{rewrite_incompatibilities, tokenize, RuleSet};
///
/// let rules = RuleSet::builtin().unwrap();
/// let tokens = tokenize("INDIRECT(ADDRESS(10,5,1,1,\"Sheet1\"))").unwrap();
/// let rewritten = rewrite_incompatibilities(&tokens, rules.incompatibilities()).unwrap();
/// assert_eq!(rewritten.to_string(), "INDIRECT(\"Sheet1.\" & ADDRESS(10,5,1,1))");
/// ```
pub fn rewrite_incompatibilities(
    tokens: &TokenStream,
    rules: &IncompatibilityRules,
) -> Result<TokenStream, RewriteLimitExceeded> {
    rewrite_with_report(tokens, rules).map(|(tokens, _)| tokens)
}

/// Like [`rewrite_incompatibilities`], also returning every expansion performed
pub fn rewrite_with_report(
    tokens: &TokenStream,
    rules: &IncompatibilityRules,
) -> Result<(TokenStream, Vec<AppliedRewrite>), RewriteLimitExceeded> {
    rewrite_with_renames(tokens, rules, &SheetRenames::new())
}

/// Like [`rewrite_with_report`], with `{argN.sheet}` placeholders read through `renames`
pub fn rewrite_with_renames(
    tokens: &TokenStream,
    rules: &IncompatibilityRules,
    renames: &SheetRenames,
) -> Result<(TokenStream, Vec<AppliedRewrite>), RewriteLimitExceeded> {
    let mut applied = Vec::new();
    if rules.is_empty() {
        return Ok((tokens.clone(), applied));
    }

    let mut current = tokens.as_slice().to_vec();
    for pass in 0..rules.max_passes {
        match rewrite_pass(&current, rules, renames) {
            None => return Ok((TokenStream::new(current), applied)),
            Some((next, mut rewrites)) => {
                tracing::debug!(pass, rewrites = rewrites.len(), "rewrite pass");
                current = next;
                applied.append(&mut rewrites);
            }
        }
    }

    if rewrite_pass(&current, rules, renames).is_none() {
        Ok((TokenStream::new(current), applied))
    } else {
        tracing::warn!(
            passes = rules.max_passes,
            "incompatibility rewrites did not reach a fixed point"
        );
        Err(RewriteLimitExceeded {
            passes: rules.max_passes,
        })
    }
}

fn rewrite_pass(
    tokens: &[Token],
    rules: &IncompatibilityRules,
    renames: &SheetRenames,
) -> Option<(Vec<Token>, Vec<AppliedRewrite>)> {
    let calls = find_calls(tokens);
    if calls.is_empty() {
        return None;
    }
    let fallback = fallback_separator(&calls, tokens);

    let mut splices: Vec<(Range<usize>, Vec<Token>)> = Vec::new();
    let mut applied = Vec::new();
    let mut covered = 0;
    for (index, call) in calls.iter().enumerate() {
        // Calls nested in an already-matched call wait for the next pass
        if call.name < covered {
            continue;
        }
        for rule in &rules.rules {
            if !rule.matches(&calls, index, tokens, &rules.aliases) {
                continue;
            }
            let Some(replacement) = rule.template.instantiate(call, tokens, &fallback, renames) else {
                continue;
            };
            let span = call.span();
            let original = join(&tokens[span.clone()]);
            let expanded = join(&replacement);
            if original == expanded {
                continue;
            }
            applied.push(AppliedRewrite {
                rule: rule.name.clone(),
                original,
                replacement: expanded,
            });
            covered = span.end;
            splices.push((span, replacement));
            break;
        }
    }

    if splices.is_empty() {
        return None;
    }
    let mut out = tokens.to_vec();
    for (span, replacement) in splices.into_iter().rev() {
        out.splice(span, replacement);
    }
    Some((out, applied))
}

/// Separator for calls that have none of their own: the first one any call uses
fn fallback_separator(calls: &[CallNode], tokens: &[Token]) -> Token {
    calls
        .iter()
        .filter_map(|call| call.separators.first())
        .min()
        .map(|&idx| tokens[idx].clone())
        .unwrap_or_else(|| Token::new(TokenKind::ArgumentSeparator, ","))
}

fn join(tokens: &[Token]) -> String {
    tokens.iter().map(Token::text).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RuleLoadError;
    use crate::functions::FunctionMapEntry;
    use crate::lexer::{tokenize, tokenize_with, LexOptions};
    use crate::locale::Locale;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn address_rule() -> IncompatibilityRule {
        IncompatibilityRule::new(
            "address-sheet-argument",
            "ADDRESS with a sheet argument inside INDIRECT",
            CallMatcher::new("ADDRESS")
                .inside("INDIRECT")
                .arity(5)
                .argument(5, ArgumentKind::String),
            "\"{arg5.sheet}.\" & {name}({args:1..4})",
        )
        .unwrap()
    }

    fn rules() -> IncompatibilityRules {
        IncompatibilityRules::new(vec![address_rule()])
    }

    fn rewrite(text: &str) -> String {
        rewrite_incompatibilities(&tokenize(text).unwrap(), &rules())
            .unwrap()
            .to_string()
    }

    #[test]
    fn test_address_rewrite() {
        assert_eq!(
            rewrite("INDIRECT(ADDRESS(10,5,1,1,\"Sheet1\"))"),
            "INDIRECT(\"Sheet1.\" & ADDRESS(10,5,1,1))"
        );
        assert_eq!(
            rewrite("SUM(INDIRECT(ADDRESS(1,1,4,TRUE,\"My Data\")),1)"),
            "SUM(INDIRECT(\"'My Data'.\" & ADDRESS(1,1,4,TRUE)),1)"
        );
    }

    #[test]
    fn test_non_matching_calls_untouched() {
        for text in [
            "ADDRESS(10,5,1,1,\"Sheet1\")",
            "INDIRECT(ADDRESS(10,5,1,1))",
            "INDIRECT(ADDRESS(10,5,1,1,A1))",
            "INDIRECT(ADDRESS(10,5,1,1,\"S\"&A1))",
        ] {
            assert_eq!(rewrite(text), text);
        }
    }

    #[test]
    fn test_every_occurrence_rewritten() {
        assert_eq!(
            rewrite("INDIRECT(ADDRESS(1,1,1,1,\"A\"))+INDIRECT(ADDRESS(2,2,1,1,\"B\"))"),
            "INDIRECT(\"A.\" & ADDRESS(1,1,1,1))+INDIRECT(\"B.\" & ADDRESS(2,2,1,1))"
        );
    }

    #[test]
    fn test_mapped_names_match() {
        let table = FunctionMapTable::from_entries([
            FunctionMapEntry {
                source_name: "ADDRESS".into(),
                target_name: "ADRESSE".into(),
                locale_scope: "de-DE".into(),
            },
            FunctionMapEntry {
                source_name: "INDIRECT".into(),
                target_name: "INDIREKT".into(),
                locale_scope: "de-DE".into(),
            },
        ]);
        let rules = rules().with_function_names(&table);
        let tokens = tokenize_with(
            "INDIREKT(ADRESSE(10;5;1;1;\"Tabelle1\"))",
            &LexOptions::from(&Locale::de_de()),
        )
        .unwrap();
        let (rewritten, applied) = rewrite_with_report(&tokens, &rules).unwrap();
        assert_eq!(
            rewritten.to_string(),
            "INDIREKT(\"Tabelle1.\" & ADRESSE(10;5;1;1))"
        );
        assert_eq!(applied.len(), 1);
        assert_eq!(applied[0].rule, "address-sheet-argument");
        assert_eq!(applied[0].original, "ADRESSE(10;5;1;1;\"Tabelle1\")");
    }

    #[test]
    fn test_self_reproducing_rule_hits_limit() {
        let swap = IncompatibilityRule::new(
            "swap",
            "",
            CallMatcher::new("F").arity(2),
            "{name}({arg2}{sep}{arg1})",
        )
        .unwrap();
        let rules = IncompatibilityRules::new(vec![swap]).with_max_passes(5);
        let err = rewrite_incompatibilities(&tokenize("F(1,2)").unwrap(), &rules).unwrap_err();
        assert_eq!(err, RewriteLimitExceeded { passes: 5 });

        // Swapping equal arguments changes nothing and terminates at once
        assert_eq!(
            rewrite_incompatibilities(&tokenize("F(1,1)").unwrap(), &rules)
                .unwrap()
                .to_string(),
            "F(1,1)"
        );
    }

    #[test]
    fn test_growing_rule_hits_limit() {
        let wrap = IncompatibilityRule::new("wrap", "", CallMatcher::new("G"), "{name}(G({args:1..}))")
            .unwrap();
        let rules = IncompatibilityRules::new(vec![wrap]);
        assert!(rewrite_incompatibilities(&tokenize("G(1)").unwrap(), &rules).is_err());
    }

    #[test]
    fn test_rule_validation() {
        let err = IncompatibilityRule::new(
            "bad",
            "",
            CallMatcher::new("ADDRESS").min_args(4),
            "{arg5}",
        )
        .unwrap_err();
        assert!(matches!(err, RuleLoadError::InvalidPredicate { .. }));

        let err = IncompatibilityRule::new(
            "bad",
            "",
            CallMatcher::new("ADDRESS").arity(5),
            "{arg5.text}",
        )
        .unwrap_err();
        assert!(matches!(err, RuleLoadError::InvalidPredicate { .. }));

        let err = IncompatibilityRule::new("bad", "", CallMatcher::new("F"), "{oops}").unwrap_err();
        assert!(matches!(err, RuleLoadError::InvalidTemplate { .. }));
    }

    #[test]
    fn test_call_predicate() {
        let rule = IncompatibilityRule::new(
            "unwrap-value",
            "",
            CallMatcher::new("VALUE").arity(1).argument(1, ArgumentKind::Call),
            "{arg1}",
        )
        .unwrap();
        let rules = IncompatibilityRules::new(vec![rule]);
        let out = |text: &str| {
            rewrite_incompatibilities(&tokenize(text).unwrap(), &rules)
                .unwrap()
                .to_string()
        };
        assert_eq!(out("VALUE(TRIM(A1))"), "TRIM(A1)");
        assert_eq!(out("VALUE(TRIM(A1)&\"\")"), "VALUE(TRIM(A1)&\"\")");
        assert_eq!(out("VALUE(A1)"), "VALUE(A1)");
    }

    fn nested_shape() -> impl Strategy<Value = String> {
        let leaf = prop_oneof![
            Just("INDIRECT(ADDRESS(1,2,1,1,\"S\"))".to_string()),
            Just("A1".to_string()),
            Just("3".to_string()),
        ];
        leaf.prop_recursive(4, 32, 3, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 1..4)
                    .prop_map(|args| format!("SUM({})", args.join(","))),
                inner
                    .clone()
                    .prop_map(|arg| format!("INDIRECT(ADDRESS(1,2,1,1,\"S\"&{arg}))")),
                inner.prop_map(|arg| format!("INDIRECT(ADDRESS({arg},2,1,1,\"S\"))")),
            ]
        })
    }

    proptest! {
        #[test]
        fn prop_rewrite_terminates_at_fixed_point(text in nested_shape()) {
            let rules = rules();
            let once = rewrite_incompatibilities(&tokenize(&text).unwrap(), &rules).unwrap();
            let twice = rewrite_incompatibilities(&once, &rules).unwrap();
            prop_assert_eq!(&once, &twice);
            prop_assert!(tokenize(&once.to_string()).is_ok());
            prop_assert!(!once.to_string().contains(",\"S\")"));
        }
    }
}
