// SPDX-License-Identifier: MIT OR Apache-2.0
//! Evaluates a parsed node tree against a root [`Value`].

use crate::lexer::Pos;
use crate::parser::{Expr, Node};
use crate::value::Value;
use rb_core::{ErrorCode, ErrorInfo};

/// Render `nodes` against `root`, producing the final text.
///
/// # Errors
///
/// Returns [`ErrorCode::TemplateExec`] on undefined field access, a
/// builtin called with the wrong argument count or types, or an
/// out-of-range index. The error carries `template`, `line`, and
/// `column` context.
pub fn render(nodes: &[Node], root: &Value, template_name: &str) -> Result<String, ErrorInfo> {
    let mut stack = vec![root.clone()];
    let mut out = String::new();
    eval_nodes(nodes, &mut stack, template_name, &mut out)?;
    Ok(out)
}

fn eval_nodes(
    nodes: &[Node],
    stack: &mut Vec<Value>,
    template: &str,
    out: &mut String,
) -> Result<(), ErrorInfo> {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Print(expr, pos) => {
                let value = eval_expr(expr, stack, template, *pos)?;
                out.push_str(&value.display());
            }
            Node::If {
                cond,
                pos,
                then_body,
                else_body,
            } => {
                let value = eval_expr(cond, stack, template, *pos)?;
                if value.is_truthy() {
                    eval_nodes(then_body, stack, template, out)?;
                } else if let Some(else_body) = else_body {
                    eval_nodes(else_body, stack, template, out)?;
                }
            }
            Node::Range { expr, pos, body } => {
                let value = eval_expr(expr, stack, template, *pos)?;
                for item in value.iter_range() {
                    stack.push(item);
                    let result = eval_nodes(body, stack, template, out);
                    stack.pop();
                    result?;
                }
            }
        }
    }
    Ok(())
}

fn eval_expr(expr: &Expr, stack: &mut Vec<Value>, template: &str, pos: Pos) -> Result<Value, ErrorInfo> {
    match expr {
        Expr::Field(path) => eval_field(path, stack, template, pos),
        Expr::Str(s) => Ok(Value::String(s.clone())),
        Expr::Num(n) => Ok(Value::Number(*n)),
        Expr::Bool(b) => Ok(Value::Bool(*b)),
        Expr::Call(name, args) => {
            let values = args
                .iter()
                .map(|a| eval_expr(a, stack, template, pos))
                .collect::<Result<Vec<_>, _>>()?;
            eval_call(name, &values, template, pos)
        }
    }
}

fn eval_field(path: &[String], stack: &[Value], template: &str, pos: Pos) -> Result<Value, ErrorInfo> {
    let mut current = stack.last().cloned().unwrap_or(Value::Null);
    if path.is_empty() {
        return Ok(current);
    }
    for segment in path {
        current = current
            .field(segment)
            .cloned()
            .ok_or_else(|| exec_error(template, pos, format!("undefined variable: {segment}")))?;
    }
    Ok(current)
}

fn eval_call(name: &str, args: &[Value], template: &str, pos: Pos) -> Result<Value, ErrorInfo> {
    match name {
        "upper" => Ok(Value::String(arg_str(args, 0, template, pos)?.to_uppercase())),
        "lower" => Ok(Value::String(arg_str(args, 0, template, pos)?.to_lowercase())),
        "trim" => Ok(Value::String(arg_str(args, 0, template, pos)?.trim().to_string())),
        "len" => Ok(Value::Number(value_len(args.first()) as f64)),
        "not" => Ok(Value::Bool(!args.first().is_some_and(Value::is_truthy))),
        "and" => Ok(Value::Bool(!args.is_empty() && args.iter().all(Value::is_truthy))),
        "or" => Ok(Value::Bool(args.iter().any(Value::is_truthy))),
        "eq" => Ok(Value::Bool(args.first() == args.get(1))),
        "ne" => Ok(Value::Bool(args.first() != args.get(1))),
        "default" => {
            let fallback = args.first().cloned().unwrap_or(Value::Null);
            let given = args.get(1).cloned().unwrap_or(Value::Null);
            Ok(if given.is_truthy() { given } else { fallback })
        }
        "index" => {
            let list = args.first().ok_or_else(|| {
                exec_error(template, pos, "index: missing list argument".to_string())
            })?;
            let idx = args
                .get(1)
                .and_then(|v| match v {
                    Value::Number(n) => Some(*n as usize),
                    _ => None,
                })
                .ok_or_else(|| exec_error(template, pos, "index: missing numeric index".to_string()))?;
            list.index(idx)
                .cloned()
                .ok_or_else(|| exec_error(template, pos, format!("index {idx} out of range")))
        }
        "hasPrefix" => {
            let s = arg_str(args, 0, template, pos)?;
            let prefix = arg_str(args, 1, template, pos)?;
            Ok(Value::Bool(s.starts_with(prefix.as_str())))
        }
        "hasSuffix" => {
            let s = arg_str(args, 0, template, pos)?;
            let suffix = arg_str(args, 1, template, pos)?;
            Ok(Value::Bool(s.ends_with(suffix.as_str())))
        }
        "contains" => {
            let s = arg_str(args, 0, template, pos)?;
            let needle = arg_str(args, 1, template, pos)?;
            Ok(Value::Bool(s.contains(needle.as_str())))
        }
        "printf" => {
            let format = arg_str(args, 0, template, pos)?;
            Ok(Value::String(sprintf(&format, &args[1.min(args.len())..])))
        }
        other => Err(exec_error(template, pos, format!("unknown function: {other}"))),
    }
}

fn arg_str(args: &[Value], idx: usize, template: &str, pos: Pos) -> Result<String, ErrorInfo> {
    args.get(idx)
        .map(Value::display)
        .ok_or_else(|| exec_error(template, pos, format!("missing argument at position {idx}")))
}

fn value_len(value: Option<&Value>) -> usize {
    match value {
        Some(Value::String(s)) => s.chars().count(),
        Some(Value::List(items)) => items.len(),
        Some(Value::Map(map)) => map.len(),
        _ => 0,
    }
}

fn sprintf(format: &str, args: &[Value]) -> String {
    let mut out = String::new();
    let mut arg_iter = args.iter();
    let mut chars = format.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '%' {
            match chars.next() {
                Some('%') => out.push('%'),
                Some('s' | 'v' | 'd') => {
                    if let Some(arg) = arg_iter.next() {
                        out.push_str(&arg.display());
                    }
                }
                Some(other) => {
                    out.push('%');
                    out.push(other);
                }
                None => out.push('%'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn exec_error(template: &str, pos: Pos, message: String) -> ErrorInfo {
    ErrorInfo::new(ErrorCode::TemplateExec, message)
        .with_context("template", template)
        .with_context("line", pos.line.to_string())
        .with_context("column", pos.column.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use std::collections::BTreeMap;

    fn root_with(pairs: &[(&str, Value)]) -> Value {
        let mut map = BTreeMap::new();
        for (k, v) in pairs {
            map.insert((*k).to_string(), v.clone());
        }
        Value::Map(map)
    }

    #[test]
    fn prints_a_field() {
        let nodes = parse("Hello {{ .Name }}!").unwrap();
        let root = root_with(&[("Name", Value::String("Ada".into()))]);
        let out = render(&nodes, &root, "t").unwrap();
        assert_eq!(out, "Hello Ada!");
    }

    #[test]
    fn undefined_field_is_an_error() {
        let nodes = parse("{{ .Missing }}").unwrap();
        let root = root_with(&[]);
        let err = render(&nodes, &root, "t").unwrap_err();
        assert_eq!(err.code, ErrorCode::TemplateExec);
    }

    #[test]
    fn if_else_picks_the_right_branch() {
        let nodes = parse("{{ if .Flag }}yes{{ else }}no{{ end }}").unwrap();
        let root = root_with(&[("Flag", Value::Bool(false))]);
        assert_eq!(render(&nodes, &root, "t").unwrap(), "no");
    }

    #[test]
    fn range_rebinds_dot_per_item() {
        let nodes = parse("{{ range .Items }}[{{ . }}]{{ end }}").unwrap();
        let root = root_with(&[(
            "Items",
            Value::List(vec![Value::String("a".into()), Value::String("b".into())]),
        )]);
        assert_eq!(render(&nodes, &root, "t").unwrap(), "[a][b]");
    }

    #[test]
    fn pipeline_upper_transforms_field() {
        let nodes = parse("{{ .Name | upper }}").unwrap();
        let root = root_with(&[("Name", Value::String("ada".into()))]);
        assert_eq!(render(&nodes, &root, "t").unwrap(), "ADA");
    }

    #[test]
    fn default_falls_back_on_falsy_value() {
        let nodes = parse(r#"{{ .Missing | default "fallback" }}"#).unwrap();
        let root = root_with(&[("Missing", Value::String(String::new()))]);
        assert_eq!(render(&nodes, &root, "t").unwrap(), "fallback");
    }

    #[test]
    fn eq_drives_an_if_condition() {
        let nodes = parse(r#"{{ if eq .Env "prod" }}P{{ else }}N{{ end }}"#).unwrap();
        let root = root_with(&[("Env", Value::String("prod".into()))]);
        assert_eq!(render(&nodes, &root, "t").unwrap(), "P");
    }

    #[test]
    fn blocks_namespace_is_reachable_by_dotted_path() {
        let nodes = parse("{{ ._blocks.check.outputs.STATUS }}").unwrap();
        let mut inner = BTreeMap::new();
        inner.insert("STATUS".to_string(), Value::String("ok".into()));
        let mut values = BTreeMap::new();
        values.insert("outputs".to_string(), Value::Map(inner));
        let mut blocks = BTreeMap::new();
        blocks.insert("check".to_string(), Value::Map(values));
        let root = root_with(&[("_blocks", Value::Map(blocks))]);
        assert_eq!(render(&nodes, &root, "t").unwrap(), "ok");
    }
}
