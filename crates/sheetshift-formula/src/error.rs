//! Formula error types

use std::path::PathBuf;
use thiserror::Error;

/// Tokenizer failures. Offsets are byte positions in the input text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LexError {
    /// A string literal or quoted sheet name without its closing quote
    #[error("unterminated literal starting at offset {offset}")]
    UnterminatedLiteral { offset: usize },

    /// A closing delimiter without its opener, or an opener that is never closed
    #[error("unbalanced delimiter at offset {offset}")]
    UnbalancedDelimiter { offset: usize },
}

/// Structured-reference resolution failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("unknown table '{0}'")]
    UnknownTable(String),

    #[error("table '{table}' has no column '{column}'")]
    UnknownColumn { table: String, column: String },

    #[error("no table encloses {sheet}!{cell}")]
    NoEnclosingTable { sheet: String, cell: String },

    #[error("cannot resolve structured reference {0}")]
    Malformed(String),
}

/// The rewriter did not reach a fixed point within its pass bound
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("incompatibility rewrites did not settle within {passes} passes")]
pub struct RewriteLimitExceeded {
    pub passes: usize,
}

/// Problems with a rewrite template
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("unclosed placeholder at offset {0}")]
    UnclosedPlaceholder(usize),

    #[error("unmatched '}}' at offset {0}")]
    StrayBrace(usize),

    #[error("unknown placeholder {{{0}}}")]
    UnknownPlaceholder(String),

    #[error("argument positions are 1-based, got {{{0}}}")]
    ZeroArgument(String),

    #[error("template does not produce a well-formed formula: {0}")]
    Malformed(#[from] LexError),
}

/// Errors raised while loading rule tables. All of them are fatal at startup.
#[derive(Debug, Error)]
pub enum RuleLoadError {
    #[error("failed to read rule file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed rule data: {0}")]
    Json(#[from] serde_json::Error),

    #[error("function '{function}' is mapped for undeclared locale '{locale}'")]
    UnknownLocale { function: String, locale: String },

    #[error("locale '{id}' is invalid: {reason}")]
    InvalidLocale { id: String, reason: String },

    #[error("function mapping has an empty name (source '{0}')")]
    EmptyName(String),

    #[error("rule '{rule}' has an invalid template: {source}")]
    InvalidTemplate {
        rule: String,
        #[source]
        source: TemplateError,
    },

    #[error("rule '{rule}' has an invalid matcher: {reason}")]
    InvalidPredicate { rule: String, reason: String },
}

/// Per-formula failure of the deterministic pipeline
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Lex(#[from] LexError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    RewriteLimit(#[from] RewriteLimitExceeded),
}
