//! Incompatibility rules: which calls to rewrite and how

use super::call::CallNode;
use super::NameAliases;
use super::template::Template;
use crate::error::RuleLoadError;
use crate::token::{Token, TokenKind};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Shape an argument must have
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArgumentKind {
    String,
    Number,
    Boolean,
    /// Cell, range, resolved structured reference or named range
    Reference,
    /// A nested call spanning the whole argument
    Call,
    Empty,
    Any,
}

/// Constraint on the argument at a 1-based position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArgumentPredicate {
    pub position: usize,
    pub kind: ArgumentKind,
    /// Required function name when `kind` is `call`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
}

/// Which calls a rule applies to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CallMatcher {
    pub function: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enclosing: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_args: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_args: Option<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arguments: Vec<ArgumentPredicate>,
}

impl CallMatcher {
    pub fn new(function: impl Into<String>) -> Self {
        Self {
            function: function.into(),
            enclosing: None,
            min_args: None,
            max_args: None,
            arguments: Vec::new(),
        }
    }

    pub fn inside(mut self, enclosing: impl Into<String>) -> Self {
        self.enclosing = Some(enclosing.into());
        self
    }

    pub fn arity(mut self, count: usize) -> Self {
        self.min_args = Some(count);
        self.max_args = Some(count);
        self
    }

    pub fn min_args(mut self, count: usize) -> Self {
        self.min_args = Some(count);
        self
    }

    pub fn argument(mut self, position: usize, kind: ArgumentKind) -> Self {
        self.arguments.push(ArgumentPredicate {
            position,
            kind,
            function: None,
        });
        self
    }

    /// Fewest arguments a matching call can have
    fn guaranteed_arity(&self) -> usize {
        let by_predicate = self.arguments.iter().map(|p| p.position).max().unwrap_or(0);
        self.min_args.unwrap_or(0).max(by_predicate)
    }
}

/// A declared dialect incompatibility and its semantics-preserving rewrite
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncompatibilityRule {
    pub name: String,
    pub description: String,
    pub matcher: CallMatcher,
    pub template: Template,
}

impl IncompatibilityRule {
    /// Validate a rule record
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        matcher: CallMatcher,
        template: &str,
    ) -> Result<Self, RuleLoadError> {
        let name = name.into();
        let invalid = |reason: String| RuleLoadError::InvalidPredicate {
            rule: name.clone(),
            reason,
        };

        if name.trim().is_empty() {
            return Err(invalid("rule name must not be empty".into()));
        }
        if matcher.function.trim().is_empty() {
            return Err(invalid("function name must not be empty".into()));
        }
        if let (Some(min), Some(max)) = (matcher.min_args, matcher.max_args) {
            if min > max {
                return Err(invalid(format!("min_args {min} exceeds max_args {max}")));
            }
        }
        for predicate in &matcher.arguments {
            if predicate.position == 0 {
                return Err(invalid("argument positions are 1-based".into()));
            }
            if matcher.max_args.map_or(false, |max| predicate.position > max) {
                return Err(invalid(format!(
                    "argument {} is beyond max_args",
                    predicate.position
                )));
            }
            if predicate.function.is_some() && predicate.kind != ArgumentKind::Call {
                return Err(invalid(format!(
                    "argument {} names a function but is not a call",
                    predicate.position
                )));
            }
        }

        let template = Template::parse(template).map_err(|source| {
            RuleLoadError::InvalidTemplate {
                rule: name.clone(),
                source,
            }
        })?;

        let guaranteed = matcher.guaranteed_arity();
        if template.max_argument() > guaranteed {
            return Err(invalid(format!(
                "template reads argument {} but matching calls may have only {guaranteed}",
                template.max_argument()
            )));
        }
        for position in template.text_arguments() {
            let is_string = matcher
                .arguments
                .iter()
                .any(|p| p.position == position && p.kind == ArgumentKind::String);
            if !is_string {
                return Err(invalid(format!(
                    "template reads the text of argument {position}, which is not required to be a string"
                )));
            }
        }

        Ok(Self {
            name,
            description: description.into(),
            matcher,
            template,
        })
    }

    /// Whether `calls[index]` matches. Function names are compared through `aliases` so
    /// rules written with source names still match mapped calls.
    pub(crate) fn matches(
        &self,
        calls: &[CallNode],
        index: usize,
        tokens: &[Token],
        aliases: &NameAliases,
    ) -> bool {
        let call = &calls[index];
        let matcher = &self.matcher;

        if !aliases.matches(tokens[call.name].text(), &matcher.function) {
            return false;
        }
        let arity = call.arity();
        if matcher.min_args.map_or(false, |min| arity < min)
            || matcher.max_args.map_or(false, |max| arity > max)
        {
            return false;
        }
        if let Some(enclosing) = &matcher.enclosing {
            let parent_matches = call.parent.map_or(false, |parent| {
                aliases.matches(tokens[calls[parent].name].text(), enclosing)
            });
            if !parent_matches {
                return false;
            }
        }

        matcher.arguments.iter().all(|predicate| {
            call.argument_range(tokens, predicate.position)
                .map_or(false, |range| argument_matches(range, predicate, calls, tokens, aliases))
        })
    }
}

fn argument_matches(
    range: Range<usize>,
    predicate: &ArgumentPredicate,
    calls: &[CallNode],
    tokens: &[Token],
    aliases: &NameAliases,
) -> bool {
    use TokenKind::*;
    let arg = &tokens[range.clone()];
    match predicate.kind {
        ArgumentKind::Any => true,
        ArgumentKind::Empty => arg.is_empty(),
        ArgumentKind::String => matches!(arg, [t] if t.kind() == StringLiteral),
        ArgumentKind::Boolean => matches!(arg, [t] if t.kind() == BooleanLiteral),
        ArgumentKind::Number => match arg {
            [t] => t.kind() == NumberLiteral,
            [sign, t] => {
                sign.kind() == Operator
                    && matches!(sign.text(), "-" | "+")
                    && t.kind() == NumberLiteral
            }
            _ => false,
        },
        ArgumentKind::Reference => matches!(
            arg,
            [t] if matches!(
                t.kind(),
                CellReference | RangeReference | StructuredReference | Identifier
            )
        ),
        ArgumentKind::Call => calls.iter().any(|call| {
            call.span() == range
                && predicate
                    .function
                    .as_deref()
                    .map_or(true, |f| aliases.matches(tokens[call.name].text(), f))
        }),
    }
}
