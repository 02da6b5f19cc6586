//! Performs filesystem mutation for one [`ValidatedEntry`] and updates the
//! running [`Budget`].
//!
//! The destination directory is treated as adversarial: another process
//! may plant a symlink at a path we're about to write through between
//! validation and materialization. Mitigations live here: no-follow
//! opens on the final path component, re-validation of link targets at
//! materialize time, and never traversing through an existing symlink
//! while creating ancestor directories.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::Path;

use scopeguard::guard;

use crate::budget::Budget;
use crate::entry::{EntryKind, ValidatedEntry};
use crate::error::{ArchiveError, Result};
use crate::policy::SecurityPolicy;
use crate::report::ReportBuilder;

const SECURE_DIR_MODE: u32 = 0o755;

/// Creates `path` and any missing ancestors, mirroring "make parents as
/// needed" for entries whose parent directory was never itself an
/// explicit archive entry. Never follows an existing symlink: if a
/// component already exists and is not a directory, that's a [`Conflict`](ArchiveError::Conflict).
fn ensure_dir_all_secure(path: &Path) -> Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => return Ok(()),
        Ok(_) => {
            return Err(ArchiveError::Conflict {
                path: path.to_path_buf(),
            })
        }
        Err(_) => {}
    }

    if let Some(parent) = path.parent() {
        ensure_dir_all_secure(parent)?;
    }

    match fs::create_dir(path) {
        Ok(()) => {
            set_mode(path, SECURE_DIR_MODE)?;
            Ok(())
        }
        Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => Ok(()),
        Err(err) => Err(ArchiveError::io(path, err)),
    }
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode)).map_err(|e| ArchiveError::io(path, e))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

/// Strips set-uid/set-gid/sticky bits unconditionally, regardless of what
/// the archive declared.
fn sanitize_mode(mode: u32) -> u32 {
    mode & 0o777
}

/// Opens `path` for writing with no-follow semantics on the final
/// component, so a symlink planted between validation and materialization
/// cannot redirect the write outside the jail.
fn open_no_follow(path: &Path) -> std::io::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.custom_flags(libc::O_NOFOLLOW);
        return options.open(path);
    }

    #[cfg(not(unix))]
    {
        // No portable no-follow primitive: create then verify it isn't a
        // symlink, narrowing but not eliminating the race window.
        let file = options.open(path)?;
        if fs::symlink_metadata(path)?.file_type().is_symlink() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::Other,
                "refusing to write through a symlink",
            ));
        }
        Ok(file)
    }
}

pub(crate) fn materialize_directory(
    entry: &ValidatedEntry,
    policy: &SecurityPolicy,
    report: &mut ReportBuilder,
) -> Result<()> {
    ensure_dir_all_secure(&entry.resolved_path)?;
    if policy.preserve_permissions {
        if let Some(mode) = entry.declared_mode {
            set_mode(&entry.resolved_path, sanitize_mode(mode) | 0o700)?;
        }
    }
    report.directories_created += 1;
    Ok(())
}

/// Streams `content` into the resolved path, chunk by chunk, checking
/// `max_file_size`, `max_total_size` and `max_compression_ratio` after
/// every chunk. On any limit breach the partial file is removed before
/// the error propagates, via a `scopeguard` disarmed only on a clean
/// finish, in the same style as a `scopeguard`-wrapped output file
/// elsewhere in this crate's lineage.
pub(crate) fn materialize_file(
    entry: &ValidatedEntry,
    raw_path_display: &str,
    mut content: impl Read,
    policy: &SecurityPolicy,
    budget: &mut Budget,
    report: &mut ReportBuilder,
    mut sample_compressed_consumed: impl FnMut(&mut Budget),
) -> Result<()> {
    if let Some(parent) = entry.resolved_path.parent() {
        ensure_dir_all_secure(parent)?;
    }

    let file = open_no_follow(&entry.resolved_path).map_err(|e| ArchiveError::io(&entry.resolved_path, e))?;
    let mut writer = guard(file, |_| {
        let _ = fs::remove_file(&entry.resolved_path);
    });

    let mut buf = [0u8; 64 * 1024];
    let mut entry_bytes: u64 = 0;

    loop {
        let n = content
            .read(&mut buf)
            .map_err(|e| ArchiveError::io(&entry.resolved_path, e))?;
        if n == 0 {
            break;
        }

        writer
            .write_all(&buf[..n])
            .map_err(|e| ArchiveError::io(&entry.resolved_path, e))?;

        entry_bytes += n as u64;
        budget.check_file_size(raw_path_display, policy, entry_bytes)?;
        budget.add_bytes(policy, n as u64)?;
        sample_compressed_consumed(budget);
        budget.check_compression_ratio(raw_path_display, policy, entry_bytes)?;
    }

    writer
        .flush()
        .map_err(|e| ArchiveError::io(&entry.resolved_path, e))?;

    if policy.preserve_permissions {
        if let Some(mode) = entry.declared_mode {
            set_mode(&entry.resolved_path, sanitize_mode(mode) | 0o400)?;
        }
    }

    // Clean finish: disarm the removal guard.
    scopeguard::ScopeGuard::into_inner(writer);
    report.files_extracted += 1;
    Ok(())
}

/// Creates a symlink at `entry.resolved_path` pointing at
/// `entry.symlink_target_text` (the declared target, preserved verbatim),
/// after a second lexical containment check of `entry.resolved_link_target`
/// performed *at materialize time* (guarding against another process
/// racing the filesystem between validation and now).
pub(crate) fn materialize_symlink(
    entry: &ValidatedEntry,
    root: &Path,
    report: &mut ReportBuilder,
) -> Result<()> {
    let resolved_target = entry
        .resolved_link_target
        .as_ref()
        .expect("symlink entry must carry a resolved target");

    reverify_contained(
        resolved_target,
        root,
        |link, target| ArchiveError::SymlinkEscape { link, target },
        &entry.resolved_path,
    )?;

    if let Some(parent) = entry.resolved_path.parent() {
        ensure_dir_all_secure(parent)?;
    }

    #[cfg(unix)]
    {
        // Written with the declared target text, not the resolved
        // absolute path, so a relative archived link stays relative on
        // disk: `reverify_contained` above already proved it resolves
        // inside the jail regardless of which form is stored.
        let target_text = entry
            .symlink_target_text
            .as_ref()
            .expect("symlink entry must carry its declared target text");
        std::os::unix::fs::symlink(target_text, &entry.resolved_path)
            .map_err(|e| ArchiveError::io(&entry.resolved_path, e))?;
    }
    #[cfg(not(unix))]
    {
        return Err(ArchiveError::UnsupportedOperation(
            "symlink creation is not supported on this platform",
        ));
    }

    report.symlinks_created += 1;
    Ok(())
}

/// Hard-links `entry.resolved_path` to `entry.resolved_link_target`,
/// which must already be a materialized regular file inside the jail.
pub(crate) fn materialize_hardlink(
    entry: &ValidatedEntry,
    root: &Path,
    report: &mut ReportBuilder,
) -> Result<()> {
    let target = entry
        .resolved_link_target
        .as_ref()
        .expect("hardlink entry must carry a resolved target");

    reverify_contained(
        target,
        root,
        |link, target| ArchiveError::HardlinkEscape { link, target },
        &entry.resolved_path,
    )?;

    match fs::symlink_metadata(target) {
        Ok(meta) if meta.is_file() => {}
        _ => {
            return Err(ArchiveError::HardlinkTargetMissing {
                link: entry.resolved_path.display().to_string(),
                target: target.display().to_string(),
            })
        }
    }

    if let Some(parent) = entry.resolved_path.parent() {
        ensure_dir_all_secure(parent)?;
    }

    fs::hard_link(target, &entry.resolved_path).map_err(|e| ArchiveError::io(&entry.resolved_path, e))?;
    report.hardlinks_created += 1;
    Ok(())
}

fn reverify_contained(
    target: &Path,
    root: &Path,
    escape_err: impl FnOnce(String, String) -> ArchiveError,
    link_path: &Path,
) -> Result<()> {
    if !target.starts_with(root) {
        return Err(escape_err(
            link_path.display().to_string(),
            target.display().to_string(),
        ));
    }
    Ok(())
}
