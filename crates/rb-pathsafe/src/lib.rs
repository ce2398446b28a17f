// SPDX-License-Identifier: MIT OR Apache-2.0
//! Root-confined path resolution.
//!
//! [`RootFs`] canonicalizes a root directory once at construction, then
//! resolves caller-supplied relative paths against it, rejecting anything
//! that would escape the root — whether via `..` segments, an absolute
//! path, or a symlink that points outside.
#![deny(unsafe_code)]
#![warn(missing_docs)]

use rb_core::{ErrorCode, ErrorInfo};
use std::path::{Component, Path, PathBuf};

/// A directory root that relative paths are resolved against.
#[derive(Debug, Clone)]
pub struct RootFs {
    root: PathBuf,
}

impl RootFs {
    /// Canonicalize `root` and build a resolver confined to it.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorCode::Io`] if `root` does not exist or cannot be
    /// canonicalized.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, ErrorInfo> {
        let root = root.as_ref();
        let canonical = root.canonicalize().map_err(|e| {
            ErrorInfo::new(ErrorCode::Io, "failed to canonicalize workspace root")
                .with_context("path", root.display().to_string())
                .with_source(e)
        })?;
        Ok(Self { root: canonical })
    }

    /// The canonicalized root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a caller-supplied relative path against the root.
    ///
    /// The path is lexically cleaned first (`.` segments dropped, `..`
    /// segments popped against what has been seen so far; a `..` that
    /// would pop past the root is rejected immediately, before any
    /// filesystem access). The deepest existing ancestor of the result is
    /// then canonicalized and re-checked against the root, which catches
    /// symlinks that would otherwise smuggle the resolved path outside.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorCode::PathEscape`] if the path is absolute, escapes
    /// the root via `..`, or resolves through a symlink to outside the
    /// root. Returns [`ErrorCode::Io`] if an ancestor cannot be
    /// canonicalized for a reason other than not existing.
    pub fn resolve(&self, relative: impl AsRef<Path>) -> Result<PathBuf, ErrorInfo> {
        let relative = relative.as_ref();
        let cleaned = clean_relative(relative).ok_or_else(|| {
            ErrorInfo::new(ErrorCode::PathEscape, "path escapes the workspace root")
                .with_context("path", relative.display().to_string())
        })?;

        let candidate = self.root.join(&cleaned);
        self.verify_confined(&candidate, relative)?;
        Ok(candidate)
    }

    /// Verify that `candidate` (absolute, but possibly not yet existing)
    /// stays within the root once symlinks are resolved.
    fn verify_confined(&self, candidate: &Path, original: &Path) -> Result<(), ErrorInfo> {
        let mut probe = candidate.to_path_buf();
        let mut trailing = Vec::new();

        loop {
            match probe.canonicalize() {
                Ok(existing) => {
                    let mut rebuilt = existing;
                    for component in trailing.into_iter().rev() {
                        rebuilt.push(component);
                    }
                    if rebuilt.starts_with(&self.root) {
                        return Ok(());
                    }
                    return Err(path_escape(original));
                }
                Err(_) => {
                    let Some(file_name) = probe.file_name().map(ToOwned::to_owned) else {
                        // Exhausted ancestors without finding an existing one;
                        // the root itself is always canonical, so this is
                        // unreachable in practice.
                        return Err(path_escape(original));
                    };
                    trailing.push(file_name);
                    if !probe.pop() {
                        return Err(path_escape(original));
                    }
                }
            }
        }
    }
}

fn path_escape(original: &Path) -> ErrorInfo {
    ErrorInfo::new(ErrorCode::PathEscape, "path escapes the workspace root")
        .with_context("path", original.display().to_string())
}

/// Lexically clean a relative path, returning `None` if it is absolute or
/// its `..` segments would pop past the start.
fn clean_relative(path: &Path) -> Option<PathBuf> {
    let mut stack: Vec<Component> = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(_) => stack.push(component),
            Component::CurDir => {}
            Component::ParentDir => {
                if stack.pop().is_none() {
                    return None;
                }
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(stack.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn make_root() -> tempfile::TempDir {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::create_dir_all(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/file.txt"), b"hi").unwrap();
        dir
    }

    #[test]
    fn resolves_a_plain_relative_path() {
        let dir = make_root();
        let fs = RootFs::new(dir.path()).unwrap();
        let resolved = fs.resolve("sub/file.txt").unwrap();
        assert_eq!(resolved, fs.root().join("sub/file.txt"));
    }

    #[test]
    fn rejects_parent_dir_escape() {
        let dir = make_root();
        let fs = RootFs::new(dir.path()).unwrap();
        let err = fs.resolve("../etc/passwd").unwrap_err();
        assert_eq!(err.code, ErrorCode::PathEscape);
    }

    #[test]
    fn rejects_absolute_path() {
        let dir = make_root();
        let fs = RootFs::new(dir.path()).unwrap();
        let err = fs.resolve("/etc/passwd").unwrap_err();
        assert_eq!(err.code, ErrorCode::PathEscape);
    }

    #[test]
    fn allows_internal_dot_dot_that_stays_inside() {
        let dir = make_root();
        let fs = RootFs::new(dir.path()).unwrap();
        let resolved = fs.resolve("sub/../sub/file.txt").unwrap();
        assert_eq!(resolved, fs.root().join("sub/file.txt"));
    }

    #[test]
    fn allows_a_not_yet_existing_path_under_an_existing_directory() {
        let dir = make_root();
        let fs = RootFs::new(dir.path()).unwrap();
        let resolved = fs.resolve("sub/new-file.txt").unwrap();
        assert_eq!(resolved, fs.root().join("sub/new-file.txt"));
    }

    #[cfg(unix)]
    #[test]
    fn rejects_symlink_pointing_outside_root() {
        use std::os::unix::fs::symlink;

        let outside = tempfile::tempdir().unwrap();
        fs::write(outside.path().join("secret.txt"), b"nope").unwrap();

        let dir = make_root();
        symlink(outside.path(), dir.path().join("escape")).unwrap();

        let fs = RootFs::new(dir.path()).unwrap();
        let err = fs.resolve("escape/secret.txt").unwrap_err();
        assert_eq!(err.code, ErrorCode::PathEscape);
    }

    proptest::proptest! {
        #[test]
        fn never_panics_on_arbitrary_relative_strings(s in "[a-zA-Z0-9/._-]{0,64}") {
            let dir = make_root();
            let fs = RootFs::new(dir.path()).unwrap();
            let _ = fs.resolve(&s);
        }
    }
}
