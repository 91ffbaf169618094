// SPDX-FileCopyrightText: 2026 Coreclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Workspace path containment.
//!
//! Every tool-supplied path resolves against the workspace root. The check
//! canonicalizes the nearest existing ancestor so symlinks cannot escape the
//! sandbox even when the leaf does not exist yet.

use std::path::{Component, Path, PathBuf};

use coreclaw_core::CoreclawError;
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};

/// Resolve a tool-supplied path under `workspace_root`.
///
/// Returns the absolute path to operate on. Fails with `WorkspaceEscape`
/// when the canonical result would land outside the canonical workspace
/// root, including through symlinked ancestors.
pub fn resolve_in_workspace(
    workspace_root: &Path,
    user_path: &str,
) -> Result<PathBuf, CoreclawError> {
    let canonical_root = workspace_root.canonicalize().map_err(|e| {
        CoreclawError::Internal(format!(
            "workspace root {} is not accessible: {e}",
            workspace_root.display()
        ))
    })?;

    let supplied = Path::new(user_path);
    let joined = if supplied.is_absolute() {
        supplied.to_path_buf()
    } else {
        canonical_root.join(supplied)
    };

    // Normalize away `.` and resolve `..` lexically so the ancestor walk
    // below sees the path the filesystem would.
    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    return Err(CoreclawError::WorkspaceEscape(user_path.to_string()));
                }
            }
            other => normalized.push(other.as_os_str()),
        }
    }

    // Find the nearest existing ancestor, canonicalize it, and re-attach the
    // not-yet-existing remainder. A symlinked ancestor pointing outside the
    // workspace canonicalizes outside the root and fails the prefix check.
    let mut existing = normalized.as_path();
    let mut remainder: Vec<&std::ffi::OsStr> = Vec::new();
    while !existing.exists() {
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                remainder.push(name);
                existing = parent;
            }
            _ => return Err(CoreclawError::WorkspaceEscape(user_path.to_string())),
        }
    }

    let mut resolved = existing
        .canonicalize()
        .map_err(|_| CoreclawError::WorkspaceEscape(user_path.to_string()))?;
    for name in remainder.iter().rev() {
        resolved.push(name);
    }

    if resolved == canonical_root || resolved.starts_with(&canonical_root) {
        Ok(resolved)
    } else {
        Err(CoreclawError::WorkspaceEscape(user_path.to_string()))
    }
}

/// Characters percent-encoded out of chat ids.
const UNSAFE_CHARS: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'/')
    .add(b'\\')
    .add(b':')
    .add(b'%')
    .add(b'?')
    .add(b'#')
    .add(b'[')
    .add(b']')
    .add(b'@')
    .add(b'!')
    .add(b'$')
    .add(b'&')
    .add(b'\'')
    .add(b'(')
    .add(b')')
    .add(b'*')
    .add(b'+')
    .add(b',')
    .add(b';')
    .add(b'=')
    .add(b'<')
    .add(b'>')
    .add(b'"')
    .add(b'|')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Sanitize a chat id for use inside a memory filename.
///
/// Percent-encodes unsafe characters, rewrites `%` to `_`, strips any
/// remaining separators and control characters, and caps the result at 120
/// characters.
pub fn sanitize_chat_id(chat_id: &str) -> String {
    let encoded = utf8_percent_encode(chat_id, UNSAFE_CHARS).to_string();
    let cleaned: String = encoded
        .replace('%', "_")
        .chars()
        .filter(|c| !c.is_control() && *c != '/' && *c != '\\')
        .collect();
    cleaned.chars().take(120).collect()
}

/// Relative path of a chat's memory file inside the workspace.
///
/// A legacy unsanitized filename is honored when it already exists on disk.
pub fn chat_memory_rel_path(workspace_root: &Path, channel: &str, chat_id: &str) -> PathBuf {
    let legacy = PathBuf::from("memory").join(format!("{channel}_{chat_id}.md"));
    if workspace_root.join(&legacy).is_file() {
        return legacy;
    }
    PathBuf::from("memory").join(format!("{channel}_{}.md", sanitize_chat_id(chat_id)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_simple_relative_path() {
        let dir = tempfile::tempdir().unwrap();
        let resolved = resolve_in_workspace(dir.path(), "notes/today.md").unwrap();
        assert!(resolved.starts_with(dir.path().canonicalize().unwrap()));
        assert!(resolved.ends_with("notes/today.md"));
    }

    #[test]
    fn rejects_dotdot_escape() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve_in_workspace(dir.path(), "../outside.txt").unwrap_err();
        assert!(err.to_string().contains("outside workspace"));
    }

    #[test]
    fn rejects_absolute_path_outside() {
        let dir = tempfile::tempdir().unwrap();
        assert!(resolve_in_workspace(dir.path(), "/etc/passwd").is_err());
    }

    #[test]
    fn dotdot_inside_workspace_is_fine() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let resolved = resolve_in_workspace(dir.path(), "sub/../file.txt").unwrap();
        assert!(resolved.ends_with("file.txt"));
        assert!(resolved.starts_with(dir.path().canonicalize().unwrap()));
    }

    #[cfg(unix)]
    #[test]
    fn rejects_symlink_escape_for_nonexistent_leaf() {
        let outside = tempfile::tempdir().unwrap();
        let dir = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("link-outside")).unwrap();

        let err = resolve_in_workspace(dir.path(), "link-outside/new.txt").unwrap_err();
        assert!(err.to_string().contains("outside workspace"));
    }

    #[cfg(unix)]
    #[test]
    fn symlink_within_workspace_is_allowed() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("real")).unwrap();
        std::os::unix::fs::symlink(dir.path().join("real"), dir.path().join("alias")).unwrap();

        let resolved = resolve_in_workspace(dir.path(), "alias/file.txt").unwrap();
        assert!(resolved.starts_with(dir.path().canonicalize().unwrap()));
    }

    #[test]
    fn sanitize_replaces_unsafe_characters() {
        let id = "user/123:456?x=1";
        let sanitized = sanitize_chat_id(id);
        assert!(!sanitized.contains('/'));
        assert!(!sanitized.contains(':'));
        assert!(!sanitized.contains('%'));
        assert!(sanitized.contains('_'));
    }

    #[test]
    fn sanitize_caps_length() {
        let long = "x".repeat(500);
        assert_eq!(sanitize_chat_id(&long).chars().count(), 120);
    }

    #[test]
    fn sanitize_keeps_plain_ids_readable() {
        assert_eq!(sanitize_chat_id("alice-42"), "alice-42");
    }

    #[test]
    fn memory_path_prefers_legacy_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("memory")).unwrap();
        let legacy_name = "cli_user:1.md";
        std::fs::write(dir.path().join("memory").join(legacy_name), "x").unwrap();

        let path = chat_memory_rel_path(dir.path(), "cli", "user:1");
        assert_eq!(path, PathBuf::from("memory").join(legacy_name));
    }

    #[test]
    fn memory_path_sanitizes_when_no_legacy() {
        let dir = tempfile::tempdir().unwrap();
        let path = chat_memory_rel_path(dir.path(), "cli", "user:1");
        assert_eq!(path, PathBuf::from("memory/cli_user_3A1.md"));
    }
}
