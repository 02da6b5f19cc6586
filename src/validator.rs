//! The heart of the security model.
//!
//! Path handling here never touches the filesystem: entry paths are held as
//! raw byte sequences until they've been proven safe, then bound to a
//! [`PathBuf`] rooted at the extraction jail. This keeps the validator
//! portable and testable without a filesystem: validating the same raw
//! path twice, on any platform, with any filesystem state, yields the
//! same result.

use std::path::{Path, PathBuf};

use crate::entry::{EntryKind, ValidatedEntry};
use crate::error::{ArchiveError, Result};
use crate::policy::SecurityPolicy;

const RESERVED_WINDOWS_NAMES: &[&str] = &[
    "CON", "PRN", "NUL", "AUX", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

fn is_reserved_component(name: &str) -> bool {
    let base = name.split('.').next().unwrap_or(name);
    RESERVED_WINDOWS_NAMES
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(base))
}

fn looks_absolute(raw: &str) -> bool {
    if raw.starts_with('/') || raw.starts_with('\\') {
        return true;
    }
    // Drive letter (`C:\...` or `C:/...`) or UNC prefix (`\\server\share`).
    let bytes = raw.as_bytes();
    if bytes.len() >= 2 && bytes[1] == b':' && bytes[0].is_ascii_alphabetic() {
        return true;
    }
    false
}

/// Rejects null bytes, rejects absolute paths, rejects reserved device
/// names, then lexically normalizes `.`/`..` components,
/// raising [`ArchiveError::PathTraversal`] the moment a `..` would pop past
/// the root. Purely lexical: takes no filesystem locks, makes no syscalls.
fn normalize_relative(raw: &[u8]) -> Result<PathBuf> {
    let raw_str = String::from_utf8_lossy(raw);

    if raw.contains(&0) {
        return Err(ArchiveError::InvalidPath {
            path: raw_str.into_owned(),
            reason: "contains a null byte",
        });
    }

    if looks_absolute(&raw_str) {
        return Err(ArchiveError::PathTraversal {
            path: raw_str.into_owned(),
        });
    }

    let mut stack: Vec<&str> = Vec::new();
    for component in raw_str.split(['/', '\\']) {
        match component {
            "" | "." => continue,
            ".." => {
                if stack.pop().is_none() {
                    return Err(ArchiveError::PathTraversal {
                        path: raw_str.into_owned(),
                    });
                }
            }
            normal => {
                if is_reserved_component(normal) {
                    return Err(ArchiveError::InvalidPath {
                        path: raw_str.into_owned(),
                        reason: "uses a reserved device name",
                    });
                }
                stack.push(normal);
            }
        }
    }

    Ok(stack.into_iter().collect())
}

fn check_depth_and_length(
    rel: &Path,
    raw_display: &str,
    policy: &SecurityPolicy,
) -> Result<()> {
    let depth = rel.components().count();
    if depth > policy.max_path_depth {
        return Err(ArchiveError::PathTraversal {
            path: raw_display.to_string(),
        });
    }
    if raw_display.chars().count() > policy.max_path_length {
        return Err(ArchiveError::PathTraversal {
            path: raw_display.to_string(),
        });
    }
    Ok(())
}

fn check_extension(rel: &Path, raw_display: &str, policy: &SecurityPolicy) -> Result<()> {
    let extension = rel.extension().and_then(|ext| ext.to_str());
    if !policy.extension_allowed(extension) {
        return Err(ArchiveError::DisallowedExtension {
            path: raw_display.to_string(),
        });
    }
    Ok(())
}

/// Full validation of the entry's own path: normalize, check depth/length,
/// check the extension allow-list, then join onto `root`.
/// The result is guaranteed lexically inside the jail.
pub(crate) fn validate_entry_path(
    raw_path: &[u8],
    root: &Path,
    policy: &SecurityPolicy,
) -> Result<PathBuf> {
    let raw_display = String::from_utf8_lossy(raw_path).into_owned();
    let rel = normalize_relative(raw_path)?;
    check_depth_and_length(&rel, &raw_display, policy)?;
    check_extension(&rel, &raw_display, policy)?;
    Ok(root.join(rel))
}

/// Validates a symlink or hardlink target: resolved relative to the link's
/// *own parent directory* (not the extraction root), then re-anchored
/// at `root`. Absolute targets, `..`-escape targets, and targets that
/// traverse above `root` raise `kind_escape_err`. Does not require the
/// target to exist.
///
/// Returns both the resolved absolute path (used for containment checks
/// and, for hardlinks, to locate the target file) and the target text
/// exactly as declared in the archive (used to materialize a symlink that
/// preserves its original relative form).
fn validate_link_target(
    raw_target: &[u8],
    link_resolved_path: &Path,
    root: &Path,
    kind_escape_err: impl FnOnce(String, String) -> ArchiveError,
) -> Result<(PathBuf, PathBuf)> {
    let raw_display = String::from_utf8_lossy(raw_target).into_owned();
    let link_parent_rel = link_resolved_path
        .strip_prefix(root)
        .unwrap_or(link_resolved_path)
        .parent()
        .unwrap_or_else(|| Path::new(""));

    let raw_target_str = String::from_utf8_lossy(raw_target);
    if raw_target.contains(&0) || looks_absolute(&raw_target_str) {
        return Err(kind_escape_err(
            String::from_utf8_lossy(link_resolved_path.as_os_str().to_string_lossy().as_bytes())
                .into_owned(),
            raw_display,
        ));
    }

    let mut stack: Vec<&str> = link_parent_rel
        .components()
        .filter_map(|c| c.as_os_str().to_str())
        .collect();

    for component in raw_target_str.split(['/', '\\']) {
        match component {
            "" | "." => continue,
            ".." => {
                if stack.pop().is_none() {
                    return Err(kind_escape_err(
                        link_resolved_path.display().to_string(),
                        raw_display,
                    ));
                }
            }
            normal => stack.push(normal),
        }
    }

    let resolved_rel: PathBuf = stack.into_iter().collect();
    Ok((root.join(resolved_rel), PathBuf::from(raw_display)))
}

/// Full validation of one raw entry, producing a [`ValidatedEntry`] or the
/// specific error the entry violates.
#[allow(clippy::too_many_arguments)]
pub(crate) fn validate_entry(
    kind: EntryKind,
    raw_path: &[u8],
    raw_link_target: Option<&[u8]>,
    declared_size: u64,
    declared_mode: Option<u32>,
    root: &Path,
    policy: &SecurityPolicy,
) -> Result<ValidatedEntry> {
    let resolved_path = validate_entry_path(raw_path, root, policy)?;

    let mut symlink_target_text = None;
    let resolved_link_target = match kind {
        EntryKind::Symlink => {
            if !policy.allow_symlinks {
                return Err(ArchiveError::SecurityViolation {
                    kind: "symlink",
                    path: String::from_utf8_lossy(raw_path).into_owned(),
                });
            }
            let target = raw_link_target.unwrap_or_default();
            let (resolved, declared_text) = validate_link_target(
                target,
                &resolved_path,
                root,
                |link, target| ArchiveError::SymlinkEscape { link, target },
            )?;
            symlink_target_text = Some(declared_text);
            Some(resolved)
        }
        EntryKind::Hardlink => {
            if !policy.allow_hardlinks {
                return Err(ArchiveError::SecurityViolation {
                    kind: "hardlink",
                    path: String::from_utf8_lossy(raw_path).into_owned(),
                });
            }
            let target = raw_link_target.unwrap_or_default();
            let (resolved, _declared_text) = validate_link_target(
                target,
                &resolved_path,
                root,
                |link, target| ArchiveError::HardlinkEscape { link, target },
            )?;
            Some(resolved)
        }
        EntryKind::File | EntryKind::Directory => None,
    };

    Ok(ValidatedEntry {
        kind,
        resolved_path,
        resolved_link_target,
        symlink_target_text,
        declared_size,
        declared_mode,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> SecurityPolicy {
        SecurityPolicy::default()
    }

    #[test]
    fn plain_relative_path_accepted() {
        let root = Path::new("/jail");
        let resolved = validate_entry_path(b"foo/bar.txt", root, &policy()).unwrap();
        assert_eq!(resolved, Path::new("/jail/foo/bar.txt"));
    }

    #[test]
    fn dot_components_are_collapsed() {
        let root = Path::new("/jail");
        let resolved = validate_entry_path(b"./foo/./bar.txt", root, &policy()).unwrap();
        assert_eq!(resolved, Path::new("/jail/foo/bar.txt"));
    }

    #[test]
    fn inner_parent_dir_that_stays_within_bounds_is_allowed() {
        let root = Path::new("/jail");
        let resolved = validate_entry_path(b"foo/../bar.txt", root, &policy()).unwrap();
        assert_eq!(resolved, Path::new("/jail/bar.txt"));
    }

    #[test]
    fn parent_dir_underflow_is_path_traversal() {
        let root = Path::new("/jail");
        let err = validate_entry_path(b"../../../etc/passwd", root, &policy());
        assert!(matches!(err, Err(ArchiveError::PathTraversal { .. })));
    }

    #[test]
    fn absolute_unix_path_is_path_traversal() {
        let root = Path::new("/jail");
        let err = validate_entry_path(b"/etc/passwd", root, &policy());
        assert!(matches!(err, Err(ArchiveError::PathTraversal { .. })));
    }

    #[test]
    fn absolute_windows_path_is_path_traversal() {
        let root = Path::new("/jail");
        let err = validate_entry_path(b"C:\\Windows\\System32", root, &policy());
        assert!(matches!(err, Err(ArchiveError::PathTraversal { .. })));
    }

    #[test]
    fn null_byte_is_invalid_path() {
        let root = Path::new("/jail");
        let err = validate_entry_path(b"foo\0bar", root, &policy());
        assert!(matches!(err, Err(ArchiveError::InvalidPath { .. })));
    }

    #[test]
    fn reserved_device_name_is_invalid_path() {
        let root = Path::new("/jail");
        let err = validate_entry_path(b"CON.txt", root, &policy());
        assert!(matches!(err, Err(ArchiveError::InvalidPath { .. })));
    }

    #[test]
    fn depth_limit_is_enforced() {
        let root = Path::new("/jail");
        let strict = SecurityPolicy::builder().max_path_depth(2).build().unwrap();
        let err = validate_entry_path(b"a/b/c", root, &strict);
        assert!(matches!(err, Err(ArchiveError::PathTraversal { .. })));
    }

    #[test]
    fn disallowed_extension_is_rejected() {
        let root = Path::new("/jail");
        let restricted = SecurityPolicy::builder()
            .allowed_extensions(vec!["txt".to_string()])
            .build()
            .unwrap();
        let err = validate_entry_path(b"payload.exe", root, &restricted);
        assert!(matches!(err, Err(ArchiveError::DisallowedExtension { .. })));
        assert!(validate_entry_path(b"readme.txt", root, &restricted).is_ok());
    }

    #[test]
    fn lexical_validation_is_idempotent() {
        let root = Path::new("/jail");
        let raw: &[u8] = b"a/../b/./c";
        let first = validate_entry_path(raw, root, &policy());
        let second = validate_entry_path(raw, root, &policy());
        assert_eq!(first.unwrap(), second.unwrap());
    }

    #[test]
    fn symlink_without_policy_is_security_violation() {
        let root = Path::new("/jail");
        let err = validate_entry(
            EntryKind::Symlink,
            b"link.txt",
            Some(b"target.txt"),
            0,
            None,
            root,
            &policy(),
        );
        assert!(matches!(err, Err(ArchiveError::SecurityViolation { .. })));
    }

    #[test]
    fn symlink_escape_detected_when_allowed() {
        let root = Path::new("/jail");
        let allow_symlinks = SecurityPolicy::builder().allow_symlinks(true).build().unwrap();
        let err = validate_entry(
            EntryKind::Symlink,
            b"evil",
            Some(b"/etc/passwd"),
            0,
            None,
            root,
            &allow_symlinks,
        );
        assert!(matches!(err, Err(ArchiveError::SymlinkEscape { .. })));
    }

    #[test]
    fn safe_symlink_is_validated() {
        let root = Path::new("/jail");
        let allow_symlinks = SecurityPolicy::builder().allow_symlinks(true).build().unwrap();
        let validated = validate_entry(
            EntryKind::Symlink,
            b"link.txt",
            Some(b"target.txt"),
            0,
            None,
            root,
            &allow_symlinks,
        )
        .unwrap();
        assert_eq!(
            validated.resolved_link_target.unwrap(),
            Path::new("/jail/target.txt")
        );
        // The materialized symlink should preserve the declared relative
        // target rather than being rewritten to an absolute jail path.
        assert_eq!(
            validated.symlink_target_text.unwrap(),
            Path::new("target.txt")
        );
    }

    #[test]
    fn symlink_target_text_stays_relative_through_dotdot() {
        let root = Path::new("/jail");
        let allow_symlinks = SecurityPolicy::builder().allow_symlinks(true).build().unwrap();
        let validated = validate_entry(
            EntryKind::Symlink,
            b"nested/link",
            Some(b"../sibling/target.txt"),
            0,
            None,
            root,
            &allow_symlinks,
        )
        .unwrap();
        assert_eq!(
            validated.symlink_target_text.unwrap(),
            Path::new("../sibling/target.txt")
        );
    }

    #[test]
    fn hardlink_escape_via_parent_traversal_is_detected() {
        let root = Path::new("/jail");
        let allow_hardlinks = SecurityPolicy::builder()
            .allow_hardlinks(true)
            .build()
            .unwrap();
        let err = validate_entry(
            EntryKind::Hardlink,
            b"nested/evil",
            Some(b"../../../etc/passwd"),
            0,
            None,
            root,
            &allow_hardlinks,
        );
        assert!(matches!(err, Err(ArchiveError::HardlinkEscape { .. })));
    }

    #[test]
    fn path_traversal_is_raised_under_every_preset() {
        for policy in [
            SecurityPolicy::default(),
            SecurityPolicy::permissive(),
            SecurityPolicy::strict(),
        ] {
            let root = Path::new("/jail");
            let err = validate_entry_path(b"../../../etc/passwd", root, &policy);
            assert!(matches!(err, Err(ArchiveError::PathTraversal { .. })));
        }
    }
}
