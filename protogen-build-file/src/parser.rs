//! Turns a token stream into top-level statements.
//!
//! We only need to understand `load(...)` statements and rule calls. Anything else is kept as
//! [`Node::Raw`] so it can be written back out untouched.

use compact_str::CompactString;
use smallvec::SmallVec;

use crate::lexer::{LexError, Lexer, Token, TokenKind};
use crate::rule::{Arg, Comments, Expr, Load, LoadSymbol, Rule};
use crate::{Node, Stmt};

/// Identifiers that start a statement which can't be a rule call.
static KEYWORDS: &[&str] = &[
    "def", "if", "elif", "else", "for", "while", "with", "try", "return", "load", "pass",
];

/// Keywords that start a statement with an indented body.
static BLOCK_KEYWORDS: &[&str] = &["def", "if", "for", "while", "with", "try"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SyntaxError {
    pub line: usize,
    pub col: usize,
    pub message: &'static str,
}

impl From<LexError> for SyntaxError {
    fn from(err: LexError) -> Self {
        SyntaxError {
            line: err.line,
            col: err.col,
            message: err.message,
        }
    }
}

pub(crate) fn parse(src: &str) -> Result<Vec<Stmt>, SyntaxError> {
    let tokens = Lexer::new(src).tokenize()?;
    let mut stmts = Vec::new();
    let mut prev_end_line: Option<usize> = None;
    let blank_before = |prev: Option<usize>, line: usize| prev.is_some_and(|prev| line > prev + 1);

    let mut i = 0;
    while i < tokens.len() {
        // Full-line comments either attach to the statement directly below them or stand alone.
        let mut attached: Vec<CompactString> = Vec::new();
        let first_line = tokens[i].line;
        if tokens[i].is_comment() {
            let mut j = i + 1;
            while j < tokens.len() && tokens[j].is_comment() && tokens[j].line == tokens[j - 1].line + 1 {
                j += 1;
            }
            let last_line = tokens[j - 1].line;
            let lines: Vec<_> = tokens[i..j].iter().map(comment_text).collect();

            let attaches = tokens
                .get(j)
                .is_some_and(|next| !next.is_comment() && next.line == last_line + 1);
            if !attaches {
                stmts.push(Stmt {
                    node: Node::Comment(lines),
                    blank_before: blank_before(prev_end_line, first_line),
                });
                prev_end_line = Some(last_line);
                i = j;
                continue;
            }
            attached = lines;
            i = j;
        }

        // Find the extent of this statement.
        let start = i;
        let is_block = tokens[start]
            .ident()
            .is_some_and(|ident| BLOCK_KEYWORDS.contains(&ident));
        let mut depth: i32 = 0;
        let mut j = i;
        loop {
            depth += tokens[j].depth_delta();
            if depth < 0 {
                return Err(SyntaxError {
                    line: tokens[j].line,
                    col: tokens[j].col,
                    message: "unexpected closing bracket",
                });
            }
            j += 1;

            let Some(next) = tokens.get(j) else {
                break;
            };
            let new_line = next.line > tokens[j - 1].end_line;
            if depth == 0 && new_line && (next.col == 0 || (next.is_comment() && !is_block)) {
                break;
            }
        }
        if depth != 0 {
            return Err(SyntaxError {
                line: tokens[start].line,
                col: tokens[start].col,
                message: "unclosed bracket",
            });
        }

        let span = &tokens[start..j];
        let (body, suffix) = match span.split_last() {
            Some((last, body)) if last.is_comment() && !last.own_line && !body.is_empty() => {
                (body, Some(comment_text(last)))
            }
            _ => (span, None),
        };
        let comments = Comments {
            before: attached,
            suffix,
        };

        let node = match parse_load(body).or_else(|| parse_rule(body, src)) {
            Some(Node::Load(mut load)) => {
                *load.comments_mut() = comments;
                Node::Load(load)
            }
            Some(Node::Rule(mut rule)) => {
                *rule.comments_mut() = comments;
                Node::Rule(rule)
            }
            _ => Node::Raw {
                text: source_text(body, src).to_string(),
                comments,
            },
        };

        stmts.push(Stmt {
            node,
            blank_before: blank_before(prev_end_line, first_line),
        });
        prev_end_line = span.last().map(|tok| tok.end_line);
        i = j;
    }

    Ok(stmts)
}

fn comment_text(token: &Token) -> CompactString {
    match &token.kind {
        TokenKind::Comment(text) => text.clone(),
        other => unreachable!("expected comment, found {other:?}"),
    }
}

/// Source text spanning `tokens`.
fn source_text<'a>(tokens: &[Token], src: &'a str) -> &'a str {
    match (tokens.first(), tokens.last()) {
        (Some(first), Some(last)) => &src[first.start..last.end],
        _ => "",
    }
}

/// `load("<module>", "<symbol>", alias = "<symbol>")`
fn parse_load(body: &[Token]) -> Option<Node> {
    if body.first()?.ident() != Some("load") || !body.get(1)?.is_punct("(") {
        return None;
    }
    if !body.last()?.is_punct(")") {
        return None;
    }

    let (items, end_comments) = split_items(&body[2..body.len() - 1])?;
    let mut items = items.into_iter();

    let module = items.next()?;
    if module.key.is_some() {
        return None;
    }
    let module_comments = module.comments;
    let module = string_literal(module.value)?;

    let mut symbols: SmallVec<[LoadSymbol; 4]> = SmallVec::new();
    for item in items {
        let exported = string_literal(item.value)?;
        symbols.push(LoadSymbol {
            local: item.key.unwrap_or_else(|| exported.clone()),
            exported,
            comments: item.comments,
        });
    }

    Some(Node::Load(Load::from_parts(
        module,
        module_comments,
        symbols,
        end_comments,
    )))
}

/// `value` if it's a single string literal we can re-emit from its value.
fn string_literal(tokens: &[Token]) -> Option<CompactString> {
    match tokens {
        [
            Token {
                kind: TokenKind::Str {
                    value,
                    verbatim: false,
                },
                ..
            },
        ] => Some(CompactString::new(value)),
        _ => None,
    }
}

/// `<kind>(<args>)`
fn parse_rule(body: &[Token], src: &str) -> Option<Node> {
    let kind = body.first()?.ident()?;
    if KEYWORDS.contains(&kind) || !body.get(1)?.is_punct("(") || !body.last()?.is_punct(")") {
        return None;
    }
    // The closing paren of the call must be the last token, e.g. not `foo() + bar()`.
    let mut depth = 0;
    for tok in &body[1..body.len() - 1] {
        depth += tok.depth_delta();
        if depth == 0 {
            return None;
        }
    }

    let (items, end_comments) = split_items(&body[2..body.len() - 1])?;
    let args = items
        .into_iter()
        .map(|item| Arg {
            key: item.key,
            value: parse_value(item.value, src),
            comments: item.comments,
        })
        .collect();

    Some(Node::Rule(Rule::from_parts(
        CompactString::new(kind),
        args,
        end_comments,
    )))
}

/// One comma separated argument of a call.
struct Item<'t> {
    key: Option<CompactString>,
    value: &'t [Token],
    comments: Comments,
}

/// Split the tokens between the parens of a call into arguments.
///
/// Full-line comments attach to the argument below them, end-of-line comments to the argument on
/// their line. Returns the arguments along with the comments after the last one.
fn split_items(inner: &[Token]) -> Option<(Vec<Item<'_>>, Vec<CompactString>)> {
    let mut items: Vec<Item<'_>> = Vec::new();
    let mut pending: Vec<CompactString> = Vec::new();

    let mut k = 0;
    while k < inner.len() {
        let tok = &inner[k];
        if tok.is_comment() {
            if !tok.own_line {
                if let Some(last) = items.last_mut().filter(|item| item.comments.suffix.is_none()) {
                    last.comments.suffix = Some(comment_text(tok));
                    k += 1;
                    continue;
                }
            }
            pending.push(comment_text(tok));
            k += 1;
            continue;
        }

        let keyword = inner.get(k + 1).is_some_and(|next| next.is_punct("="));
        let (key, value_start) = match tok.ident() {
            Some(key) if keyword => (Some(CompactString::new(key)), k + 2),
            _ => (None, k),
        };

        // Find the comma that ends this argument.
        let mut depth = 0;
        let mut end = value_start;
        while end < inner.len() {
            let tok = &inner[end];
            if depth == 0 && tok.is_punct(",") {
                break;
            }
            depth += tok.depth_delta();
            end += 1;
        }

        // Comments between the value and the comma belong to the argument, not the value.
        let mut value_end = end;
        let mut suffix = None;
        let mut trailing = Vec::new();
        while value_end > value_start && inner[value_end - 1].is_comment() {
            let comment = &inner[value_end - 1];
            if comment.own_line {
                trailing.push(comment_text(comment));
            } else {
                suffix = Some(comment_text(comment));
            }
            value_end -= 1;
        }
        if value_end == value_start {
            return None;
        }
        trailing.reverse();

        items.push(Item {
            key,
            value: &inner[value_start..value_end],
            comments: Comments {
                before: std::mem::take(&mut pending),
                suffix,
            },
        });
        pending.extend(trailing);

        // Skip the comma.
        k = end + 1;
    }

    Some((items, pending))
}

/// Parse the value of an argument, falling back to the raw source text.
fn parse_value(tokens: &[Token], src: &str) -> Expr {
    let raw = || Expr::Raw(source_text(tokens, src).to_string());
    if tokens.iter().any(Token::is_comment) {
        return raw();
    }

    let mut pos = 0;
    match simple_expr(tokens, &mut pos) {
        Some(expr) if pos == tokens.len() => expr,
        _ => raw(),
    }
}

fn simple_expr(tokens: &[Token], pos: &mut usize) -> Option<Expr> {
    let tok = tokens.get(*pos)?;
    *pos += 1;

    match &tok.kind {
        TokenKind::Str {
            value,
            verbatim: false,
        } => Some(Expr::String(CompactString::new(value))),
        TokenKind::Number(text) => text.parse().ok().map(Expr::Int),
        TokenKind::Punct(p) if p == "-" => {
            let TokenKind::Number(text) = &tokens.get(*pos)?.kind else {
                return None;
            };
            *pos += 1;
            text.parse::<i64>().ok().map(|val| Expr::Int(-val))
        }
        TokenKind::Ident(ident) => {
            // Calls and attribute access are kept raw.
            let followed_by_call = tokens
                .get(*pos)
                .is_some_and(|next| next.is_punct("(") || next.is_punct("."));
            (!followed_by_call).then(|| Expr::Ident(ident.clone()))
        }
        TokenKind::Punct(p) if p == "[" => {
            let mut items = Vec::new();
            loop {
                if tokens.get(*pos)?.is_punct("]") {
                    *pos += 1;
                    break;
                }
                items.push(simple_expr(tokens, pos)?);
                let sep = tokens.get(*pos)?;
                if sep.is_punct(",") {
                    *pos += 1;
                } else if !sep.is_punct("]") {
                    return None;
                }
            }
            Some(Expr::List(items))
        }
        TokenKind::Punct(p) if p == "{" => {
            let mut entries = Vec::new();
            loop {
                if tokens.get(*pos)?.is_punct("}") {
                    *pos += 1;
                    break;
                }
                let key = simple_expr(tokens, pos)?;
                if !tokens.get(*pos)?.is_punct(":") {
                    return None;
                }
                *pos += 1;
                let value = simple_expr(tokens, pos)?;
                entries.push((key, value));
                let sep = tokens.get(*pos)?;
                if sep.is_punct(",") {
                    *pos += 1;
                } else if !sep.is_punct("}") {
                    return None;
                }
            }
            Some(Expr::Dict(entries))
        }
        _ => None,
    }
}
