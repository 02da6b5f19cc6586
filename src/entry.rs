use std::path::PathBuf;

/// The four entry kinds a TAR or ZIP archive can carry.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
    Hardlink,
}

/// An [`EntryKind`] paired with a resolved, jail-contained destination
/// path, and (for link variants) a resolved, jail-contained link target.
///
/// No filesystem access has occurred by the time a `ValidatedEntry`
/// exists; it is the output of [`crate::validator`] and the input to
/// [`crate::materializer`].
#[derive(Debug, Clone)]
pub struct ValidatedEntry {
    pub kind: EntryKind,
    pub resolved_path: PathBuf,
    /// Absolute, root-joined form of the link target, proven to resolve
    /// inside the jail. Used for containment checks (including the
    /// materialize-time re-verification) and, for hardlinks, to locate the
    /// already-materialized target file. Never written to disk as-is.
    pub resolved_link_target: Option<PathBuf>,
    /// For symlinks only: the target text as declared in the archive,
    /// preserved verbatim so the materialized symlink stays relative (or
    /// absolute) exactly as authored, instead of being rewritten to an
    /// absolute path under the extraction root.
    pub symlink_target_text: Option<PathBuf>,
    pub declared_size: u64,
    pub declared_mode: Option<u32>,
}
