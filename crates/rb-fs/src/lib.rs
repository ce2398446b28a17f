// SPDX-License-Identifier: MIT OR Apache-2.0
//! Workspace file tree and single-file reads.
//!
//! [`walk`] produces the recursive [`FileTreeNode`] tree served to the
//! browser UI; [`get_file`] serves a single file's full content on demand.
//! Both resolve every path through a [`RootFs`] first, so neither can be
//! used to read outside the workspace root.
#![deny(unsafe_code)]
#![warn(missing_docs)]

use rb_core::{ErrorCode, ErrorInfo, FileTreeNode, RenderedFile};
use rb_pathsafe::RootFs;
use sha2::{Digest, Sha256};
use std::path::Path;
use walkdir::WalkDir;

/// Directory names skipped while walking the workspace.
const SKIPPED_DIRS: &[&str] = &[".git", "node_modules"];

/// Walk the workspace rooted at `root`, building a recursive file tree.
///
/// Files larger than `max_inline_bytes` are included in the tree (so the
/// UI can still show them) but without their `content` populated, per
/// spec: oversized files are listed, not hidden.
///
/// # Errors
///
/// Returns [`ErrorCode::Io`] if the root or any entry cannot be read.
pub fn walk(root: &RootFs, max_inline_bytes: u64) -> Result<FileTreeNode, ErrorInfo> {
    build_node(root.root(), root.root(), max_inline_bytes)
}

fn build_node(root: &Path, dir: &Path, max_inline_bytes: u64) -> Result<FileTreeNode, ErrorInfo> {
    let name = node_name(root, dir);
    let mut children = Vec::new();

    let entries = std::fs::read_dir(dir).map_err(|e| io_error(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| io_error(dir, e))?;
        let path = entry.path();
        let file_name = entry.file_name();
        let file_name = file_name.to_string_lossy();

        if SKIPPED_DIRS.contains(&file_name.as_ref()) {
            continue;
        }

        let file_type = entry.file_type().map_err(|e| io_error(&path, e))?;
        if file_type.is_dir() {
            children.push(build_node(root, &path, max_inline_bytes)?);
        } else if file_type.is_file() {
            children.push(build_file_node(root, &path, max_inline_bytes)?);
        }
        // Symlinks and other special files are omitted from the tree.
    }

    let id = relative_id(root, dir);
    Ok(FileTreeNode::folder(id, name, children))
}

fn build_file_node(root: &Path, path: &Path, max_inline_bytes: u64) -> Result<FileTreeNode, ErrorInfo> {
    let name = node_name(root, path);
    let id = relative_id(root, path);
    let metadata = std::fs::metadata(path).map_err(|e| io_error(path, e))?;
    let size = metadata.len();

    let (content, content_hash) = if size <= max_inline_bytes {
        let bytes = std::fs::read(path).map_err(|e| io_error(path, e))?;
        (
            Some(String::from_utf8_lossy(&bytes).into_owned()),
            Some(sha256_hex(&bytes)),
        )
    } else {
        (None, None)
    };

    let language = rb_core::language_for_filename(&name);
    let relative_path = relative_path_string(root, path);

    Ok(FileTreeNode::file(
        id,
        name,
        Some(RenderedFile {
            name: relative_path_basename(path),
            relative_path,
            content,
            content_hash,
            language,
            size,
        }),
    ))
}

/// Read a single file's full content, regardless of size.
///
/// # Errors
///
/// Returns [`ErrorCode::NotFound`] if `relative` does not name a regular
/// file, [`ErrorCode::PathEscape`] if it escapes the root, or
/// [`ErrorCode::Io`] on any other read failure.
pub fn get_file(root: &RootFs, relative: &str) -> Result<RenderedFile, ErrorInfo> {
    let path = root.resolve(relative)?;
    let metadata = std::fs::metadata(&path).map_err(|_| {
        ErrorInfo::new(ErrorCode::NotFound, "file not found").with_context("path", relative)
    })?;

    if !metadata.is_file() {
        return Err(ErrorInfo::new(ErrorCode::NotFound, "not a regular file")
            .with_context("path", relative));
    }

    let bytes = std::fs::read(&path).map_err(|e| io_error(&path, e))?;
    let content = String::from_utf8_lossy(&bytes).into_owned();
    let name = relative_path_basename(&path);

    Ok(RenderedFile {
        name: name.clone(),
        relative_path: relative.to_string(),
        language: rb_core::language_for_filename(&name),
        size: bytes.len() as u64,
        content_hash: Some(sha256_hex(&bytes)),
        content: Some(content),
    })
}

/// Compute the SHA-256 content hash of a file, e.g. for change detection.
///
/// # Errors
///
/// Returns [`ErrorCode::Io`] if the file cannot be read.
pub fn hash_file(root: &RootFs, relative: &str) -> Result<String, ErrorInfo> {
    let path = root.resolve(relative)?;
    let bytes = std::fs::read(&path).map_err(|e| io_error(&path, e))?;
    Ok(sha256_hex(&bytes))
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

fn io_error(path: &Path, source: std::io::Error) -> ErrorInfo {
    ErrorInfo::new(ErrorCode::Io, "filesystem operation failed")
        .with_context("path", path.display().to_string())
        .with_source(source)
}

fn node_name(root: &Path, path: &Path) -> String {
    if path == root {
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "/".to_string())
    } else {
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

fn relative_path_basename(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn relative_id(root: &Path, path: &Path) -> String {
    if path == root {
        ".".to_string()
    } else {
        relative_path_string(root, path)
    }
}

fn relative_path_string(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}
