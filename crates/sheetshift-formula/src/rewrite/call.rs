//! Shallow call nodes over a token slice

use crate::token::{Token, TokenKind};
use std::ops::Range;

/// One function invocation. Indices point into the token slice the node was built from;
/// nested calls inside an argument are separate nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CallNode {
    pub name: usize,
    pub open: usize,
    pub close: usize,
    /// Token ranges of each top-level argument, surrounding whitespace included
    pub args: Vec<Range<usize>>,
    pub separators: Vec<usize>,
    /// Index of the innermost enclosing call
    pub parent: Option<usize>,
}

impl CallNode {
    /// Tokens from the function name through the closing paren
    pub fn span(&self) -> Range<usize> {
        self.name..self.close + 1
    }

    pub fn arity(&self) -> usize {
        self.args.len()
    }

    /// Argument at 1-based `position`, without surrounding whitespace
    pub fn argument<'t>(&self, tokens: &'t [Token], position: usize) -> Option<&'t [Token]> {
        self.argument_range(tokens, position)
            .map(|range| &tokens[range])
    }

    /// Token range of the argument at 1-based `position`, without surrounding whitespace
    pub fn argument_range(&self, tokens: &[Token], position: usize) -> Option<Range<usize>> {
        let range = self.args.get(position.checked_sub(1)?)?;
        let slice = &tokens[range.clone()];
        let start = slice
            .iter()
            .position(|t| !t.is_whitespace())
            .map_or(range.end, |idx| range.start + idx);
        let end = slice
            .iter()
            .rposition(|t| !t.is_whitespace())
            .map_or(start, |idx| range.start + idx + 1);
        Some(start..end)
    }

    /// Arguments `first..=last` (1-based) as one contiguous slice, original separators kept
    pub fn argument_span<'t>(
        &self,
        tokens: &'t [Token],
        first: usize,
        last: usize,
    ) -> Option<&'t [Token]> {
        if first == 0 || first > last {
            return None;
        }
        let start = self.args.get(first - 1)?.start;
        let end = self.args.get(last - 1)?.end;
        Some(trim(&tokens[start..end]))
    }

    /// Separator token of this call, if it has more than one argument
    pub fn separator<'t>(&self, tokens: &'t [Token]) -> Option<&'t Token> {
        self.separators.first().map(|&idx| &tokens[idx])
    }
}

fn trim(tokens: &[Token]) -> &[Token] {
    let start = tokens
        .iter()
        .position(|t| !t.is_whitespace())
        .unwrap_or(tokens.len());
    let end = tokens
        .iter()
        .rposition(|t| !t.is_whitespace())
        .map_or(start, |idx| idx + 1);
    &tokens[start..end]
}

enum Frame {
    Call { call: usize, arg_start: usize },
    Group,
    Array,
}

struct PartialCall {
    name: usize,
    open: usize,
    close: Option<usize>,
    args: Vec<Range<usize>>,
    separators: Vec<usize>,
    parent: Option<usize>,
}

/// Collect every complete call in source order of the function name
pub(crate) fn find_calls(tokens: &[Token]) -> Vec<CallNode> {
    let mut partial: Vec<PartialCall> = Vec::new();
    let mut frames: Vec<Frame> = Vec::new();
    let mut pending: Option<(usize, usize)> = None;

    for (idx, token) in tokens.iter().enumerate() {
        match token.kind() {
            TokenKind::FunctionName => {
                pending = tokens[idx + 1..]
                    .iter()
                    .position(|t| !t.is_whitespace())
                    .map(|offset| idx + 1 + offset)
                    .filter(|&open| tokens[open].kind() == TokenKind::OpenParen)
                    .map(|open| (idx, open));
            }
            TokenKind::OpenParen => match pending.take() {
                Some((name, open)) if open == idx => {
                    let parent = innermost_call(&frames);
                    partial.push(PartialCall {
                        name,
                        open,
                        close: None,
                        args: Vec::new(),
                        separators: Vec::new(),
                        parent,
                    });
                    frames.push(Frame::Call {
                        call: partial.len() - 1,
                        arg_start: idx + 1,
                    });
                }
                _ => frames.push(Frame::Group),
            },
            TokenKind::OpenArray => frames.push(Frame::Array),
            TokenKind::ArgumentSeparator => {
                if let Some(Frame::Call { call, arg_start }) = frames.last_mut() {
                    let call = &mut partial[*call];
                    call.args.push(*arg_start..idx);
                    call.separators.push(idx);
                    *arg_start = idx + 1;
                }
            }
            TokenKind::CloseParen => {
                if let Some(Frame::Call { call, arg_start }) = frames.pop() {
                    let call = &mut partial[call];
                    let last = arg_start..idx;
                    // NOW() has no arguments, F(1,) has an empty second one
                    if !call.separators.is_empty() || !trim(&tokens[last.clone()]).is_empty() {
                        call.args.push(last);
                    }
                    call.close = Some(idx);
                }
            }
            TokenKind::CloseArray => {
                frames.pop();
            }
            _ => {}
        }
    }

    // Drop unclosed calls and renumber parents
    let mut remap = vec![None; partial.len()];
    let mut calls = Vec::with_capacity(partial.len());
    for (old, call) in partial.into_iter().enumerate() {
        if let Some(close) = call.close {
            remap[old] = Some(calls.len());
            calls.push(CallNode {
                name: call.name,
                open: call.open,
                close,
                args: call.args,
                separators: call.separators,
                parent: call.parent,
            });
        }
    }
    for call in &mut calls {
        call.parent = call.parent.and_then(|p| remap[p]);
    }
    calls
}

fn innermost_call(frames: &[Frame]) -> Option<usize> {
    frames.iter().rev().find_map(|frame| match frame {
        Frame::Call { call, .. } => Some(*call),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;
    use pretty_assertions::assert_eq;

    fn text(tokens: &[Token]) -> String {
        tokens.iter().map(Token::text).collect()
    }

    #[test]
    fn test_nested_calls() {
        let tokens = tokenize("INDIRECT(ADDRESS(10, 5,1,1,\"Sheet1\"))").unwrap();
        let tokens = tokens.as_slice();
        let calls = find_calls(tokens);
        assert_eq!(calls.len(), 2);

        let outer = &calls[0];
        assert_eq!(tokens[outer.name].text(), "INDIRECT");
        assert_eq!(outer.arity(), 1);
        assert_eq!(outer.parent, None);

        let inner = &calls[1];
        assert_eq!(tokens[inner.name].text(), "ADDRESS");
        assert_eq!(inner.arity(), 5);
        assert_eq!(inner.parent, Some(0));
        assert_eq!(text(inner.argument(tokens, 2).unwrap()), "5");
        assert_eq!(text(inner.argument(tokens, 5).unwrap()), "\"Sheet1\"");
        assert_eq!(text(inner.argument_span(tokens, 1, 4).unwrap()), "10, 5,1,1");
        assert!(inner.argument(tokens, 6).is_none());
        assert!(inner.argument(tokens, 0).is_none());
        assert_eq!(text(&tokens[inner.span()]), "ADDRESS(10, 5,1,1,\"Sheet1\")");
    }

    #[test]
    fn test_arity_edge_cases() {
        let tokens = tokenize("NOW()+F( )+G(1,)+H(,)").unwrap();
        let calls = find_calls(tokens.as_slice());
        let arities: Vec<_> = calls.iter().map(CallNode::arity).collect();
        assert_eq!(arities, vec![0, 0, 2, 2]);
    }

    #[test]
    fn test_grouping_and_arrays_are_not_arguments() {
        let tokens = tokenize("SUM((1,2),{3,4},5)").unwrap();
        let calls = find_calls(tokens.as_slice());
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].arity(), 3);
    }

    #[test]
    fn test_parent_skips_grouping_parens() {
        let tokens = tokenize("A((B(1)))").unwrap();
        let calls = find_calls(tokens.as_slice());
        assert_eq!(calls[1].parent, Some(0));
    }
}
