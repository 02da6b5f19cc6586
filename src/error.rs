use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

/// The flat, discriminated error taxonomy of the extraction core.
///
/// Each variant corresponds to a distinct failure mode a caller may want to
/// catch individually; none of them are ever downgraded to a warning and
/// retried, the first error returned aborts the whole extraction.
#[derive(Error, Diagnostic, Debug)]
#[diagnostic(url(docsrs))]
#[non_exhaustive]
pub enum ArchiveError {
    /// Lexical path escape, absolute path, or `..` underflow.
    #[error("path escapes the extraction root: {path}")]
    #[diagnostic(code(archex::path_traversal))]
    PathTraversal { path: String },

    /// A symlink's target, once resolved, leaves the jail.
    #[error("symlink target escapes the extraction root: {link} -> {target}")]
    #[diagnostic(code(archex::symlink_escape))]
    SymlinkEscape { link: String, target: String },

    /// A hardlink's target, once resolved, leaves the jail.
    #[error("hardlink target escapes the extraction root: {link} -> {target}")]
    #[diagnostic(code(archex::hardlink_escape))]
    HardlinkEscape { link: String, target: String },

    /// A hardlink's target is not yet a materialized regular file.
    #[error("hardlink target does not exist yet: {link} -> {target}")]
    #[diagnostic(code(archex::hardlink_target_missing))]
    HardlinkTargetMissing { link: String, target: String },

    /// A symlink or hardlink entry was present but disallowed by policy.
    #[error("{kind} entries are disallowed by the active security policy: {path}")]
    #[diagnostic(code(archex::security_violation))]
    SecurityViolation { kind: &'static str, path: String },

    /// Compression-ratio limit exceeded for a single entry.
    #[error("entry '{path}' exceeds the maximum compression ratio ({ratio:.1} > {limit:.1})")]
    #[diagnostic(code(archex::zip_bomb))]
    ZipBomb {
        path: String,
        ratio: f64,
        limit: f64,
    },

    /// Single-entry uncompressed size limit exceeded.
    #[error("entry '{path}' exceeds the maximum file size ({size} > {limit} bytes)")]
    #[diagnostic(code(archex::file_too_large))]
    FileTooLarge { path: String, size: u64, limit: u64 },

    /// Cumulative uncompressed size limit exceeded.
    #[error("total extracted size exceeds the maximum total size ({size} > {limit} bytes)")]
    #[diagnostic(code(archex::total_size_exceeded))]
    TotalSizeExceeded { size: u64, limit: u64 },

    /// Entry-count limit exceeded.
    #[error("archive contains more entries than the maximum allowed ({count} > {limit})")]
    #[diagnostic(code(archex::file_count_exceeded))]
    FileCountExceeded { count: u64, limit: u64 },

    /// Entry's extension is not in the allow-list.
    #[error("entry '{path}' has a disallowed extension")]
    #[diagnostic(code(archex::disallowed_extension))]
    DisallowedExtension { path: String },

    /// Null bytes, reserved device names, or otherwise malformed path.
    #[error("invalid path: {reason} ({path})")]
    #[diagnostic(code(archex::invalid_path))]
    InvalidPath { path: String, reason: &'static str },

    /// TAR typeflag outside the supported set (char/block device, FIFO, ...).
    #[error("unsupported entry type in {path}: {typeflag}")]
    #[diagnostic(code(archex::unsupported_entry_type))]
    UnsupportedEntryType { path: String, typeflag: &'static str },

    /// ZIP method other than STORE/DEFLATE, or an encrypted entry.
    #[error("unsupported compression method for '{path}': {method}")]
    #[diagnostic(code(archex::unsupported_compression_method))]
    UnsupportedCompressionMethod { path: String, method: String },

    /// Parse error, checksum mismatch, or truncation.
    #[error("archive is corrupt: {0}")]
    #[diagnostic(code(archex::corrupt))]
    Corrupt(String),

    /// A wrapped underlying filesystem/stream error, with path context.
    #[error("I/O error at {path}: {source}")]
    #[diagnostic(code(archex::io))]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Platform lacks a primitive required to materialize this entry.
    #[error("unsupported operation on this platform: {0}")]
    #[diagnostic(code(archex::unsupported_operation))]
    UnsupportedOperation(&'static str),

    /// An existing non-directory sits at the path a directory must occupy.
    #[error("path already exists and is not a directory: {path}")]
    #[diagnostic(code(archex::conflict))]
    Conflict { path: PathBuf },

    /// A `SecurityPolicy` setting failed validation at construction time.
    #[error("invalid security policy: {0}")]
    #[diagnostic(code(archex::invalid_policy))]
    InvalidPolicy(&'static str),
}

impl ArchiveError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ArchiveError::IoError {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, ArchiveError>;
