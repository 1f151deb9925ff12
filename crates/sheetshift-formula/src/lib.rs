//! # sheetshift-formula
//!
//! Formula language processing for sheetshift: a lossless tokenizer, locale separator
//! normalization, function-name mapping, structured-reference resolution, sheet renaming and
//! declarative incompatibility rewriting.
//!
//! ## Example
//!
//! ```rust
//! use sheetshift_formula::{map_function_names, normalize_separators, tokenize, RuleSet};
//!
//! let rules = RuleSet::builtin().unwrap();
//! let pair = rules.locale_pair("en-US", "de-DE").unwrap();
//!
//! let tokens = tokenize("IF(A1>10,\"Yes\",\"No\")").unwrap();
//! let (tokens, _) = normalize_separators(&tokens, &pair);
//! let (tokens, unmapped) = map_function_names(&tokens, &pair.target, rules.functions());
//! assert_eq!(tokens.to_string(), "WENN(A1>10;\"Yes\";\"No\")");
//! assert!(unmapped.is_empty());
//! ```

pub mod error;
pub mod functions;
pub mod lexer;
pub mod locale;
pub mod pipeline;
pub mod rewrite;
pub mod rules;
pub mod sheets;
pub mod structured;
pub mod token;

pub use error::{
    LexError, PipelineError, ResolveError, RewriteLimitExceeded, RuleLoadError, TemplateError,
};
pub use functions::{map_function_names, strip_future_prefix, FunctionMapEntry, FunctionMapTable};
pub use lexer::{tokenize, tokenize_with, LexOptions};
pub use locale::{normalize_locale_id, normalize_separators, Locale, LocalePair};
pub use pipeline::{run_pipeline, strip_formula_prefix, PipelineFailure, PipelineOutput};
pub use rewrite::{
    rewrite_incompatibilities, rewrite_with_renames, rewrite_with_report, AppliedRewrite,
    ArgumentKind, ArgumentPredicate, CallMatcher, IncompatibilityRule, IncompatibilityRules,
    Template, DEFAULT_MAX_PASSES,
};
pub use rules::{load_rules, RuleSet, RuleSource, BUILTIN_RULES};
pub use sheets::{rename_sheets, SheetRenames};
pub use structured::{
    has_this_row_reference, resolve_structured_refs, AddressMode, ResolveContext,
};
pub use token::{Token, TokenKind, TokenStream};
