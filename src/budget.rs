use crate::error::{ArchiveError, Result};
use crate::policy::SecurityPolicy;

/// Mutable running tally enforced against a [`SecurityPolicy`] across one
/// extraction. Local to a single `extract_archive` call; never shared
/// across extractions.
///
/// Enforcement is lossless: every byte written and every entry accepted is
/// counted before the corresponding limit is tested, so `bytes_written`
/// never decreases and the count at the moment of abort is exact.
#[derive(Debug, Default)]
pub(crate) struct Budget {
    pub(crate) bytes_written: u64,
    pub(crate) entries_materialized: u64,
    pub(crate) compressed_bytes_consumed: u64,
}

/// Below this many compressed bytes consumed for an entry, the
/// compression-ratio check is skipped to avoid divide-by-zero and spurious
/// trips on tiny entries. 1 KiB comfortably covers header overhead on
/// legitimately tiny files while still catching a zip bomb within its
/// first few chunks.
pub(crate) const RATIO_CHECK_THRESHOLD_BYTES: u64 = 1024;

impl Budget {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Called once per accepted entry, before any filesystem action.
    pub(crate) fn check_file_count(&mut self, policy: &SecurityPolicy) -> Result<()> {
        if self.entries_materialized >= policy.max_file_count {
            return Err(ArchiveError::FileCountExceeded {
                count: self.entries_materialized + 1,
                limit: policy.max_file_count,
            });
        }
        self.entries_materialized += 1;
        Ok(())
    }

    /// Called after each chunk of a file entry is written, with the
    /// cumulative size of that single entry so far.
    pub(crate) fn check_file_size(
        &self,
        path: &str,
        policy: &SecurityPolicy,
        entry_bytes_so_far: u64,
    ) -> Result<()> {
        if entry_bytes_so_far > policy.max_file_size {
            return Err(ArchiveError::FileTooLarge {
                path: path.to_string(),
                size: entry_bytes_so_far,
                limit: policy.max_file_size,
            });
        }
        Ok(())
    }

    pub(crate) fn add_bytes(&mut self, policy: &SecurityPolicy, n: u64) -> Result<()> {
        self.bytes_written += n;
        if self.bytes_written > policy.max_total_size {
            return Err(ArchiveError::TotalSizeExceeded {
                size: self.bytes_written,
                limit: policy.max_total_size,
            });
        }
        Ok(())
    }

    /// Used by the ZIP reader, where each entry's compressed size is
    /// known upfront from the central directory: accumulates it onto the
    /// running total.
    pub(crate) fn add_compressed_bytes(&mut self, n: u64) {
        self.compressed_bytes_consumed += n;
    }

    /// Used by the TAR reader, where a `CountingReader` wraps the raw
    /// `Source` and already reports a cumulative total: overwrites the
    /// running total with that sample rather than adding to it.
    pub(crate) fn set_compressed_bytes(&mut self, total: u64) {
        self.compressed_bytes_consumed = total;
    }

    /// Evaluated only once `compressed_bytes_consumed >=
    /// RATIO_CHECK_THRESHOLD_BYTES`.
    pub(crate) fn check_compression_ratio(
        &self,
        path: &str,
        policy: &SecurityPolicy,
        uncompressed_so_far: u64,
    ) -> Result<()> {
        if self.compressed_bytes_consumed < RATIO_CHECK_THRESHOLD_BYTES {
            return Ok(());
        }
        let ratio = uncompressed_so_far as f64 / self.compressed_bytes_consumed as f64;
        if ratio > policy.max_compression_ratio {
            return Err(ArchiveError::ZipBomb {
                path: path.to_string(),
                ratio,
                limit: policy.max_compression_ratio,
            });
        }
        Ok(())
    }
}
