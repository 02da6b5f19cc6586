//! The primary entry point: opens an archive, detects its format, drives
//! the reader/validator/materializer pipeline, and produces a report on
//! a clean finish or propagates the first pipeline error otherwise.

use std::fs;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::budget::Budget;
use crate::decompress::detect_format;
use crate::error::{ArchiveError, Result};
use crate::format;
use crate::policy::SecurityPolicy;
use crate::report::{ExtractionReport, ReportBuilder};
use crate::source::Source;

const MAGIC_SNIFF_LEN: usize = 8;

/// Extracts `archive_path` into `destination_path` under `policy`.
///
/// `destination_path` must already exist and be a directory, or this
/// returns an error before anything is read. Any violation raised by the
/// validator or materializer — path traversal, a disallowed link, a
/// blown budget, a corrupt entry — aborts the extraction and is
/// propagated as `Err`; the caller can match on the returned
/// [`ArchiveError`] variant. Partially-extracted content already on disk
/// is left in place — callers wanting all-or-nothing semantics should
/// extract into a staging directory and rename it into place only after
/// this call returns `Ok`.
pub fn extract_archive(
    archive_path: impl AsRef<Path>,
    destination_path: impl AsRef<Path>,
    policy: SecurityPolicy,
) -> Result<ExtractionReport> {
    let archive_path = archive_path.as_ref();
    let destination_path = destination_path.as_ref();

    let root =
        fs::canonicalize(destination_path).map_err(|e| ArchiveError::io(destination_path, e))?;
    if !root.is_dir() {
        return Err(ArchiveError::Conflict { path: root });
    }

    let started = Instant::now();
    debug!("opening archive at {}", archive_path.display());

    let mut source = Source::open_file(archive_path)?;
    let leading_bytes = sniff_leading_bytes(&mut source, archive_path)?;
    let detected = detect_format(archive_path, &leading_bytes)?;

    debug!(
        "detected {:?} archive, decompressor {:?}",
        detected.archive_format(),
        detected.decompressor()
    );

    let mut budget = Budget::new();
    let mut builder = ReportBuilder::default();

    let outcome = format::run(source, detected, &root, &policy, &mut budget, &mut builder);
    let elapsed = started.elapsed();

    let err = match outcome {
        Ok(()) => {
            return Ok(builder.finish(
                budget.bytes_written,
                elapsed,
                detected.archive_format(),
                detected.decompressor(),
            ))
        }
        Err(err) => err,
    };

    warn!(
        "extraction aborted after {:?}: {err}",
        elapsed_rounded(elapsed)
    );
    Err(err)
}

/// Rounds elapsed time to whole milliseconds for log lines; the report
/// itself carries full precision.
fn elapsed_rounded(elapsed: Duration) -> Duration {
    Duration::from_millis(elapsed.as_millis() as u64)
}

fn sniff_leading_bytes(source: &mut Source, archive_path: &Path) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; MAGIC_SNIFF_LEN];
    let mut filled = 0;
    loop {
        let n = source
            .read(&mut buf[filled..])
            .map_err(|e| ArchiveError::io(archive_path, e))?;
        if n == 0 {
            break;
        }
        filled += n;
        if filled == buf.len() {
            break;
        }
    }
    buf.truncate(filled);
    source
        .seek(SeekFrom::Start(0))
        .map_err(|e| ArchiveError::io(archive_path, e))?;
    Ok(buf)
}
