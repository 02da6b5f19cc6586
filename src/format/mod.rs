//! The polymorphic-over-{TAR, ZIP} reader: drives one archive from a
//! [`Source`](crate::source) through validation and materialization, in
//! strict archive order (required for hardlink targets, which must
//! already exist on disk by the time a later entry links to them).

mod tar_reader;
mod zip_reader;

use std::path::Path;

use crate::budget::Budget;
use crate::decompress::{CountingReader, DetectedFormat};
use crate::error::Result;
use crate::policy::SecurityPolicy;
use crate::report::ReportBuilder;
use crate::source::Source;

/// Runs the whole entry stream of one archive, mutating `budget` and
/// `report` as it goes. On error, whatever was already materialized stays
/// on disk; the caller decides whether that counts as success.
pub(crate) fn run(
    source: Source,
    format: DetectedFormat,
    root: &Path,
    policy: &SecurityPolicy,
    budget: &mut Budget,
    report: &mut ReportBuilder,
) -> Result<()> {
    match format {
        DetectedFormat::Tar(tar_fmt) => {
            // Counts bytes pulled from the *compressed* stream, before the
            // decoder inflates them, so the shared cell is always the
            // compression-ratio denominator regardless of which decoder
            // (if any) sits on top of it.
            let (counted, compressed_so_far) = CountingReader::new(source);
            let decoder = crate::decompress::create_tar_decoder(counted, tar_fmt)
                .map_err(crate::decompress::map_io_corrupt)?;
            tar_reader::run(decoder, compressed_so_far, root, policy, budget, report)
        }
        DetectedFormat::Zip => zip_reader::run(source, root, policy, budget, report),
    }
}
