// SPDX-License-Identifier: MIT OR Apache-2.0
//! Parses lexed actions into an expression/node tree.

use crate::lexer::{lex_action, split_pieces, Piece, Pos, Token};

/// An expression appearing inside an action.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// `.` or `.a.b.c`.
    Field(Vec<String>),
    /// A string literal.
    Str(String),
    /// A number literal.
    Num(f64),
    /// A bare `true`/`false` literal.
    Bool(bool),
    /// A function call: name plus positional arguments.
    Call(String, Vec<Expr>),
}

/// A node in the parsed template body.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Literal text, copied verbatim.
    Text(String),
    /// `{{ expr }}` — evaluate and print.
    Print(Expr, Pos),
    /// `{{ if cond }}...{{ else }}...{{ end }}`.
    If {
        /// The branch condition.
        cond: Expr,
        /// Source location of the `if`.
        pos: Pos,
        /// Body executed when `cond` is truthy.
        then_body: Vec<Node>,
        /// Body executed otherwise, if an `else` was present.
        else_body: Option<Vec<Node>>,
    },
    /// `{{ range expr }}...{{ end }}`.
    Range {
        /// The list or map expression to iterate.
        expr: Expr,
        /// Source location of the `range`.
        pos: Pos,
        /// Body executed once per element, with `.` rebound to it.
        body: Vec<Node>,
    },
}

enum Item {
    Text(String),
    Expr(Expr, Pos),
    If(Expr, Pos),
    Range(Expr, Pos),
    Else,
    End,
}

/// Parse `src` into a node tree.
///
/// # Errors
///
/// Returns `(message, line, column)` describing the first problem found.
pub fn parse(src: &str) -> Result<Vec<Node>, (String, usize, usize)> {
    let (pieces, unterminated) = split_pieces(src);
    if let Some(pos) = unterminated {
        return Err(("unterminated action".to_string(), pos.line, pos.column));
    }

    let mut items = Vec::with_capacity(pieces.len());
    for piece in pieces {
        match piece {
            Piece::Text(t) => items.push(Item::Text(t)),
            Piece::Action(raw, pos) => items.push(parse_item(&raw, pos)?),
        }
    }

    let (nodes, rest) = parse_block(&items)?;
    if !rest.is_empty() {
        return Err(("unexpected 'end' or 'else' without matching block".to_string(), 0, 0));
    }
    Ok(nodes)
}

fn parse_item(raw: &str, pos: Pos) -> Result<Item, (String, usize, usize)> {
    let trimmed = raw.trim();
    if trimmed == "end" {
        return Ok(Item::End);
    }
    if trimmed == "else" {
        return Ok(Item::Else);
    }

    let tokens = lex_action(trimmed).map_err(|e| (e, pos.line, pos.column))?;

    if let Some(Token::Ident(word)) = tokens.first() {
        if word == "if" {
            let cond = parse_pipeline(&tokens[1..]).map_err(|e| (e, pos.line, pos.column))?;
            return Ok(Item::If(cond, pos));
        }
        if word == "range" {
            let expr = parse_pipeline(&tokens[1..]).map_err(|e| (e, pos.line, pos.column))?;
            return Ok(Item::Range(expr, pos));
        }
    }

    let expr = parse_pipeline(&tokens).map_err(|e| (e, pos.line, pos.column))?;
    Ok(Item::Expr(expr, pos))
}

fn parse_block(items: &[Item]) -> Result<(Vec<Node>, &[Item]), (String, usize, usize)> {
    let mut nodes = Vec::new();
    let mut rest = items;

    loop {
        match rest.first() {
            None => return Ok((nodes, rest)),
            Some(Item::End) | Some(Item::Else) => return Ok((nodes, rest)),
            Some(Item::Text(t)) => {
                nodes.push(Node::Text(t.clone()));
                rest = &rest[1..];
            }
            Some(Item::Expr(expr, pos)) => {
                nodes.push(Node::Print(expr.clone(), *pos));
                rest = &rest[1..];
            }
            Some(Item::If(cond, pos)) => {
                let cond = cond.clone();
                let pos = *pos;
                let (then_body, after_then) = parse_block(&rest[1..])?;
                let (else_body, after) = match after_then.first() {
                    Some(Item::Else) => {
                        let (eb, after_else) = parse_block(&after_then[1..])?;
                        (Some(eb), after_else)
                    }
                    _ => (None, after_then),
                };
                rest = expect_end(after, pos)?;
                nodes.push(Node::If {
                    cond,
                    pos,
                    then_body,
                    else_body,
                });
            }
            Some(Item::Range(expr, pos)) => {
                let expr = expr.clone();
                let pos = *pos;
                let (body, after) = parse_block(&rest[1..])?;
                rest = expect_end(after, pos)?;
                nodes.push(Node::Range { expr, pos, body });
            }
        }
    }
}

fn expect_end(items: &[Item], pos: Pos) -> Result<&[Item], (String, usize, usize)> {
    match items.first() {
        Some(Item::End) => Ok(&items[1..]),
        _ => Err(("missing 'end' for block".to_string(), pos.line, pos.column)),
    }
}

const BUILTINS: &[&str] = &[
    "upper", "lower", "eq", "ne", "and", "or", "not", "default", "index", "printf", "hasPrefix",
    "hasSuffix", "contains", "len", "trim",
];

fn parse_pipeline(tokens: &[Token]) -> Result<Expr, String> {
    let stages = split_on_pipe(tokens);
    let mut result: Option<Expr> = None;
    for stage in stages {
        let expr = parse_stage(stage, result.take())?;
        result = Some(expr);
    }
    result.ok_or_else(|| "empty expression".to_string())
}

fn split_on_pipe(tokens: &[Token]) -> Vec<&[Token]> {
    let mut stages = Vec::new();
    let mut start = 0;
    let mut depth = 0i32;
    for (i, tok) in tokens.iter().enumerate() {
        match tok {
            Token::LParen => depth += 1,
            Token::RParen => depth -= 1,
            Token::Pipe if depth == 0 => {
                stages.push(&tokens[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    stages.push(&tokens[start..]);
    stages
}

/// Parse one pipeline stage. If `piped` is `Some`, it is appended as the
/// final argument of a call stage (Go's pipe semantics).
fn parse_stage(tokens: &[Token], piped: Option<Expr>) -> Result<Expr, String> {
    if tokens.is_empty() {
        return piped.ok_or_else(|| "empty pipeline stage".to_string());
    }

    match &tokens[0] {
        Token::Ident(name) if BUILTINS.contains(&name.as_str()) => {
            let mut args = parse_terms(&tokens[1..])?;
            if let Some(p) = piped {
                args.push(p);
            }
            Ok(Expr::Call(name.clone(), args))
        }
        Token::Ident(name) if name == "true" => Ok(Expr::Bool(true)),
        Token::Ident(name) if name == "false" => Ok(Expr::Bool(false)),
        Token::Ident(name) => Err(format!("unknown function: {name}")),
        _ => {
            let (expr, remainder) = parse_term(tokens)?;
            if !remainder.is_empty() {
                return Err("unexpected tokens after expression".to_string());
            }
            Ok(expr)
        }
    }
}

/// Parse zero or more whitespace-separated terms (field paths, literals,
/// or parenthesized sub-pipelines) used as call arguments.
fn parse_terms(mut tokens: &[Token]) -> Result<Vec<Expr>, String> {
    let mut args = Vec::new();
    while !tokens.is_empty() {
        let (expr, rest) = parse_term(tokens)?;
        args.push(expr);
        tokens = rest;
    }
    Ok(args)
}

fn parse_term(tokens: &[Token]) -> Result<(Expr, &[Token]), String> {
    match tokens.first() {
        Some(Token::DotPath(path)) => Ok((Expr::Field(path.clone()), &tokens[1..])),
        Some(Token::Str(s)) => Ok((Expr::Str(s.clone()), &tokens[1..])),
        Some(Token::Num(n)) => Ok((Expr::Num(*n), &tokens[1..])),
        Some(Token::Ident(name)) if name == "true" => Ok((Expr::Bool(true), &tokens[1..])),
        Some(Token::Ident(name)) if name == "false" => Ok((Expr::Bool(false), &tokens[1..])),
        Some(Token::Ident(name)) if BUILTINS.contains(&name.as_str()) => {
            // A nested call without parens consumes the rest of the
            // current term list as its arguments.
            let args = parse_terms(&tokens[1..])?;
            Ok((Expr::Call(name.clone(), args), &[]))
        }
        Some(Token::LParen) => {
            let mut depth = 1;
            let mut end = 1;
            while end < tokens.len() && depth > 0 {
                match tokens[end] {
                    Token::LParen => depth += 1,
                    Token::RParen => depth -= 1,
                    _ => {}
                }
                end += 1;
            }
            if depth != 0 {
                return Err("unbalanced parentheses".to_string());
            }
            let inner = &tokens[1..end - 1];
            let expr = parse_pipeline(inner)?;
            Ok((expr, &tokens[end..]))
        }
        other => Err(format!("unexpected token: {other:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_field_print() {
        let nodes = parse("hi {{ .Name }}").unwrap();
        assert_eq!(nodes.len(), 2);
        assert!(matches!(nodes[1], Node::Print(Expr::Field(ref p), _) if p == &vec!["Name".to_string()]));
    }

    #[test]
    fn parses_pipeline_with_default() {
        let nodes = parse(r#"{{ .Name | default "anon" }}"#).unwrap();
        match &nodes[0] {
            Node::Print(Expr::Call(name, args), _) => {
                assert_eq!(name, "default");
                assert_eq!(args.len(), 2);
            }
            other => panic!("unexpected node: {other:?}"),
        }
    }

    #[test]
    fn parses_if_else_end() {
        let nodes = parse("{{ if .Ok }}yes{{ else }}no{{ end }}").unwrap();
        match &nodes[0] {
            Node::If { then_body, else_body, .. } => {
                assert_eq!(then_body, &vec![Node::Text("yes".to_string())]);
                assert_eq!(else_body, &Some(vec![Node::Text("no".to_string())]));
            }
            other => panic!("unexpected node: {other:?}"),
        }
    }

    #[test]
    fn parses_range() {
        let nodes = parse("{{ range .Items }}-{{ . }}{{ end }}").unwrap();
        assert!(matches!(nodes[0], Node::Range { .. }));
    }

    #[test]
    fn missing_end_is_a_parse_error() {
        let err = parse("{{ if .Ok }}yes").unwrap_err();
        assert!(err.0.contains("end"));
    }

    #[test]
    fn eq_call_with_field_and_literal_args() {
        let nodes = parse(r#"{{ if eq .Env "prod" }}x{{ end }}"#).unwrap();
        match &nodes[0] {
            Node::If { cond, .. } => match cond {
                Expr::Call(name, args) => {
                    assert_eq!(name, "eq");
                    assert_eq!(args.len(), 2);
                }
                other => panic!("unexpected cond: {other:?}"),
            },
            other => panic!("unexpected node: {other:?}"),
        }
    }
}
