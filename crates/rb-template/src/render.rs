// SPDX-License-Identifier: MIT OR Apache-2.0
//! Directory-mode and inline-mode rendering entry points.

use crate::eval;
use crate::parser::parse;
use crate::value::Value;
use rb_core::{language_for_filename, BlockRecord, ErrorCode, ErrorInfo, FileTreeNode, RenderedFile};
use rb_pathsafe::RootFs;
use std::collections::BTreeMap;
use walkdir::WalkDir;

/// The schema file basename substring that marks a directory-mode source
/// file as schema-only: consumed, never templated or written.
pub const SCHEMA_MARKER: &str = "boilerplate.yml";

/// Render a single named template against `values` and a `_blocks`
/// snapshot.
///
/// # Errors
///
/// Returns [`ErrorCode::TemplateParse`] on a syntax error or
/// [`ErrorCode::TemplateExec`] on a runtime error (undefined variable,
/// builtin misuse). Both carry `template`, `line`, and `column` context.
pub fn render_text(
    name: &str,
    source: &str,
    values: &BTreeMap<String, serde_json::Value>,
    blocks: &BTreeMap<String, BlockRecord>,
) -> Result<String, ErrorInfo> {
    let nodes = parse(source).map_err(|(message, line, column)| {
        ErrorInfo::new(ErrorCode::TemplateParse, message)
            .with_context("template", name)
            .with_context("line", line.to_string())
            .with_context("column", column.to_string())
    })?;
    let root = build_root(values, blocks);
    eval::render(&nodes, &root, name)
}

/// Inline mode: render a map of `filename -> source` against a shared
/// values map, producing `filename -> RenderedFile`. No disk I/O.
///
/// # Errors
///
/// See [`render_text`].
pub fn render_inline(
    sources: &BTreeMap<String, String>,
    values: &BTreeMap<String, serde_json::Value>,
    blocks: &BTreeMap<String, BlockRecord>,
) -> Result<BTreeMap<String, RenderedFile>, ErrorInfo> {
    let mut out = BTreeMap::new();
    for (name, source) in sources {
        let rendered = render_text(name, source, values, blocks)?;
        let size = rendered.len() as u64;
        out.insert(
            name.clone(),
            RenderedFile {
                name: name.clone(),
                relative_path: name.clone(),
                language: language_for_filename(name),
                content_hash: None,
                size,
                content: Some(rendered),
            },
        );
    }
    Ok(out)
}

/// Directory mode: template every file under `source_dir_rel` (both
/// filename and content), writing the result under `out_dir_rel`. Files
/// whose name contains [`SCHEMA_MARKER`] are skipped.
///
/// # Errors
///
/// Returns [`ErrorCode::Io`] for filesystem failures, or the template
/// errors from [`render_text`].
pub fn render_directory(
    root: &RootFs,
    source_dir_rel: &str,
    out_dir_rel: &str,
    values: &BTreeMap<String, serde_json::Value>,
    blocks: &BTreeMap<String, BlockRecord>,
) -> Result<FileTreeNode, ErrorInfo> {
    let source_dir = root.resolve(source_dir_rel)?;
    let out_dir = root.resolve(out_dir_rel)?;
    std::fs::create_dir_all(&out_dir).map_err(|e| io_error(&out_dir, e))?;

    for entry in WalkDir::new(&source_dir) {
        let entry = entry.map_err(|e| {
            ErrorInfo::new(ErrorCode::Io, "failed to walk template source directory")
                .with_source(std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let file_name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        if file_name.contains(SCHEMA_MARKER) {
            continue;
        }

        let relative = path.strip_prefix(&source_dir).unwrap_or(path);
        let source = std::fs::read_to_string(path).map_err(|e| io_error(path, e))?;

        let relative_str = relative.to_string_lossy();
        let rendered_name = render_text(&relative_str, &relative_str, values, blocks)?;
        let rendered_content = render_text(&relative_str, &source, values, blocks)?;

        let dest_relative = replace_basename(relative, &rendered_name);
        let dest_path = out_dir.join(&dest_relative);
        if let Some(parent) = dest_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
        }
        std::fs::write(&dest_path, &rendered_content).map_err(|e| io_error(&dest_path, e))?;
    }

    let out_root = RootFs::new(&out_dir)?;
    rb_fs::walk(&out_root, u64::MAX)
}

/// Load a directory-mode schema, if a [`SCHEMA_MARKER`] file is present
/// directly under `source_dir_rel`.
///
/// # Errors
///
/// Returns [`ErrorCode::Io`] on read failure, or
/// [`ErrorCode::SchemaInvalid`] if the file exists but fails to parse.
pub fn load_directory_schema(
    root: &RootFs,
    source_dir_rel: &str,
) -> Result<Option<rb_schema::Schema>, ErrorInfo> {
    let source_dir = root.resolve(source_dir_rel)?;
    for entry in WalkDir::new(&source_dir).max_depth(1) {
        let entry = entry.map_err(|e| {
            ErrorInfo::new(ErrorCode::Io, "failed to walk template source directory")
                .with_source(std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
        })?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if entry.file_type().is_file() && name.contains(SCHEMA_MARKER) {
            let raw = std::fs::read_to_string(entry.path()).map_err(|e| io_error(entry.path(), e))?;
            return rb_schema::parse_yaml(&raw).map(Some);
        }
    }
    Ok(None)
}

fn replace_basename(relative: &std::path::Path, new_basename: &str) -> std::path::PathBuf {
    match relative.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.join(new_basename),
        _ => std::path::PathBuf::from(new_basename),
    }
}

fn io_error(path: &std::path::Path, source: std::io::Error) -> ErrorInfo {
    ErrorInfo::new(ErrorCode::Io, "filesystem operation failed")
        .with_context("path", path.display().to_string())
        .with_source(source)
}

fn build_root(values: &BTreeMap<String, serde_json::Value>, blocks: &BTreeMap<String, BlockRecord>) -> Value {
    let mut map = BTreeMap::new();
    for (key, value) in values {
        if key == "_blocks" {
            continue;
        }
        map.insert(key.clone(), Value::from_json(value));
    }
    map.insert("_blocks".to_string(), blocks_to_value(blocks));
    Value::Map(map)
}

fn blocks_to_value(blocks: &BTreeMap<String, BlockRecord>) -> Value {
    let mut out = BTreeMap::new();
    for (component_id, record) in blocks {
        let mut values_map = BTreeMap::new();
        for (key, value) in &record.values {
            values_map.insert(key.clone(), Value::String(value.clone()));
        }
        let mut record_map = BTreeMap::new();
        record_map.insert("outputs".to_string(), Value::Map(values_map));
        record_map.insert("timestamp".to_string(), Value::String(record.timestamp.to_rfc3339()));
        out.insert(component_id.clone(), Value::Map(record_map));
    }
    Value::Map(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use std::fs;

    #[test]
    fn inline_mode_renders_each_named_source() {
        let mut sources = BTreeMap::new();
        sources.insert("hello.sh".to_string(), "echo {{ .Name }}".to_string());
        let mut values = BTreeMap::new();
        values.insert("Name".to_string(), json!("world"));

        let rendered = render_inline(&sources, &values, &BTreeMap::new()).unwrap();
        assert_eq!(rendered["hello.sh"].content.as_deref(), Some("echo world"));
    }

    #[test]
    fn user_supplied_blocks_key_is_ignored() {
        let mut sources = BTreeMap::new();
        sources.insert("a".to_string(), "{{ ._blocks | len }}".to_string());
        let mut values = BTreeMap::new();
        values.insert("_blocks".to_string(), json!("not a map"));

        let rendered = render_inline(&sources, &values, &BTreeMap::new()).unwrap();
        assert_eq!(rendered["a"].content.as_deref(), Some("0"));
    }

    #[test]
    fn directory_mode_templates_filenames_and_content_and_skips_schema() {
        let src = tempfile::tempdir().unwrap();
        fs::write(src.path().join("{{.Name}}.txt"), "hi {{ .Name }}").unwrap();
        fs::write(src.path().join("boilerplate.yml"), "variables: []").unwrap();

        let workspace = tempfile::tempdir().unwrap();
        let root = RootFs::new(workspace.path()).unwrap();
        std::fs::create_dir_all(workspace.path().join("src")).unwrap();
        for entry in walkdir::WalkDir::new(src.path()).min_depth(1) {
            let entry = entry.unwrap();
            let dest = workspace.path().join("src").join(entry.file_name());
            fs::copy(entry.path(), &dest).unwrap();
        }

        let mut values = BTreeMap::new();
        values.insert("Name".to_string(), json!("Ada"));

        let tree = render_directory(&root, "src", "out", &values, &BTreeMap::new()).unwrap();
        let rendered_path = workspace.path().join("out/Ada.txt");
        assert!(rendered_path.exists());
        assert_eq!(fs::read_to_string(rendered_path).unwrap(), "hi Ada");
        assert!(!workspace.path().join("out/boilerplate.yml").exists());
        assert!(tree.file_count() >= 1);
    }

    #[test]
    fn blocks_snapshot_round_trips_into_template_root() {
        let mut values_map = BTreeMap::new();
        values_map.insert("STATUS".to_string(), "ok".to_string());
        let mut blocks = BTreeMap::new();
        blocks.insert(
            "check".to_string(),
            BlockRecord {
                values: values_map,
                timestamp: Utc::now(),
            },
        );
        let mut sources = BTreeMap::new();
        sources.insert("a".to_string(), "{{ ._blocks.check.outputs.STATUS }}".to_string());
        let rendered = render_inline(&sources, &BTreeMap::new(), &blocks).unwrap();
        assert_eq!(rendered["a"].content.as_deref(), Some("ok"));
    }
}
