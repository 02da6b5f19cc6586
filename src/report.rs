use std::time::Duration;

use strum_macros::Display;

/// Archive container format, detected from the source filename.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Display)]
#[strum(serialize_all = "UPPERCASE")]
pub enum ArchiveFormat {
    Tar,
    Zip,
}

/// Streaming decoder wrapped around the raw archive bytes, if any.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Decompressor {
    None,
    Gzip,
    Bzip2,
    Xz,
    Zstd,
}

/// Immutable summary of a fully completed extraction. An aborted run never
/// produces one of these — the pipeline's first [`ArchiveError`](crate::ArchiveError)
/// is propagated to the caller instead; see [`crate::extract_archive`].
#[derive(Debug, Clone)]
pub struct ExtractionReport {
    pub files_extracted: u64,
    pub directories_created: u64,
    pub symlinks_created: u64,
    pub hardlinks_created: u64,
    pub bytes_written: u64,
    pub elapsed: Duration,
    pub archive_format: ArchiveFormat,
    pub decompressor: Decompressor,
}

/// Accumulates counts during a run; consumed into an [`ExtractionReport`]
/// once the pipeline finishes or aborts.
#[derive(Debug, Default)]
pub(crate) struct ReportBuilder {
    pub(crate) files_extracted: u64,
    pub(crate) directories_created: u64,
    pub(crate) symlinks_created: u64,
    pub(crate) hardlinks_created: u64,
}

impl ReportBuilder {
    pub(crate) fn finish(
        self,
        bytes_written: u64,
        elapsed: Duration,
        archive_format: ArchiveFormat,
        decompressor: Decompressor,
    ) -> ExtractionReport {
        ExtractionReport {
            files_extracted: self.files_extracted,
            directories_created: self.directories_created,
            symlinks_created: self.symlinks_created,
            hardlinks_created: self.hardlinks_created,
            bytes_written,
            elapsed,
            archive_format,
            decompressor,
        }
    }
}
