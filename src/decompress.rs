//! Picks, from the archive's filename suffix, which streaming decoder
//! wraps the raw [`Source`](crate::source) bytes. Exactly one decoder
//! deep — nested compression such as `.tar.gz.gz` is not auto-detected.

use std::io::{self, Read};
use std::path::Path;

use bzip2::read::BzDecoder;
use flate2::read::GzDecoder;
use xz2::read::XzDecoder;
use zstd::stream::Decoder as ZstdDecoder;

use crate::error::{ArchiveError, Result};
use crate::report::{ArchiveFormat, Decompressor};

/// The archive's container format plus, for TAR, which decoder (if any)
/// the outer stream is wrapped in. ZIP entries carry their own per-entry
/// codec and are never wrapped in an outer decoder here.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum DetectedFormat {
    Tar(TarBasedFmt),
    Zip,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum TarBasedFmt {
    Tar,
    Tgz,
    Tbz2,
    Txz,
    Tzstd,
}

impl DetectedFormat {
    pub(crate) fn archive_format(self) -> ArchiveFormat {
        match self {
            DetectedFormat::Tar(_) => ArchiveFormat::Tar,
            DetectedFormat::Zip => ArchiveFormat::Zip,
        }
    }

    pub(crate) fn decompressor(self) -> Decompressor {
        match self {
            DetectedFormat::Tar(TarBasedFmt::Tar) => Decompressor::None,
            DetectedFormat::Tar(TarBasedFmt::Tgz) => Decompressor::Gzip,
            DetectedFormat::Tar(TarBasedFmt::Tbz2) => Decompressor::Bzip2,
            DetectedFormat::Tar(TarBasedFmt::Txz) => Decompressor::Xz,
            DetectedFormat::Tar(TarBasedFmt::Tzstd) => Decompressor::Zstd,
            DetectedFormat::Zip => Decompressor::None,
        }
    }
}

/// Infers the format from the filename suffix. When the suffix is absent
/// or unrecognized, falls back to sniffing the leading magic bytes; this
/// fallback only ever chooses *which decoder*, never TAR vs ZIP, since
/// ZIP's local-file-header magic and gzip/bzip2/xz/zstd magics are
/// disjoint in practice but a bare `.tar` has none at all.
pub(crate) fn detect_format(path: &Path, leading_bytes: &[u8]) -> Result<DetectedFormat> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();

    if name.ends_with(".zip") {
        return Ok(DetectedFormat::Zip);
    }
    if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        return Ok(DetectedFormat::Tar(TarBasedFmt::Tgz));
    }
    if name.ends_with(".tar.bz2") || name.ends_with(".tbz2") {
        return Ok(DetectedFormat::Tar(TarBasedFmt::Tbz2));
    }
    if name.ends_with(".tar.xz") || name.ends_with(".txz") {
        return Ok(DetectedFormat::Tar(TarBasedFmt::Txz));
    }
    if name.ends_with(".tar.zst") || name.ends_with(".tzst") || name.ends_with(".tzstd") {
        return Ok(DetectedFormat::Tar(TarBasedFmt::Tzstd));
    }
    if name.ends_with(".tar") {
        return Ok(DetectedFormat::Tar(TarBasedFmt::Tar));
    }

    detect_from_magic(leading_bytes)
}

fn detect_from_magic(leading_bytes: &[u8]) -> Result<DetectedFormat> {
    // ZIP local file header / empty archive / spanned archive signatures.
    if leading_bytes.starts_with(b"PK\x03\x04")
        || leading_bytes.starts_with(b"PK\x05\x06")
        || leading_bytes.starts_with(b"PK\x07\x08")
    {
        return Ok(DetectedFormat::Zip);
    }
    if leading_bytes.starts_with(&[0x1f, 0x8b]) {
        return Ok(DetectedFormat::Tar(TarBasedFmt::Tgz));
    }
    if leading_bytes.starts_with(b"BZh") {
        return Ok(DetectedFormat::Tar(TarBasedFmt::Tbz2));
    }
    if leading_bytes.starts_with(&[0xfd, b'7', b'z', b'X', b'Z', 0x00]) {
        return Ok(DetectedFormat::Tar(TarBasedFmt::Txz));
    }
    if leading_bytes.starts_with(&[0x28, 0xb5, 0x2f, 0xfd]) {
        return Ok(DetectedFormat::Tar(TarBasedFmt::Tzstd));
    }
    // A ustar header has "ustar" at offset 257; a plain/GNU tar has no
    // reliable magic at offset 0, so an uncompressed tar is the fallback
    // once everything else has been ruled out.
    Ok(DetectedFormat::Tar(TarBasedFmt::Tar))
}

/// Wraps `dat` in the decoder appropriate for `fmt`: exactly one decoder
/// deep, never buffering the whole decompressed archive.
pub(crate) fn create_tar_decoder(
    dat: impl Read + 'static,
    fmt: TarBasedFmt,
) -> io::Result<Box<dyn Read>> {
    Ok(match fmt {
        TarBasedFmt::Tar => Box::new(dat),
        TarBasedFmt::Tbz2 => Box::new(BzDecoder::new(dat)),
        TarBasedFmt::Tgz => Box::new(GzDecoder::new(dat)),
        TarBasedFmt::Txz => Box::new(XzDecoder::new(dat)),
        TarBasedFmt::Tzstd => {
            // The only fallible path in ZstdDecoder::new as of this
            // version comes from a dictionary argument we never supply.
            Box::new(ZstdDecoder::new(dat)?)
        }
    })
}

/// Wraps a reader to track how many bytes have been pulled from it,
/// shared via an interior cell so the pipeline can sample it on demand —
/// this is the denominator in compression-ratio checks.
pub(crate) struct CountingReader<R> {
    inner: R,
    count: std::rc::Rc<std::cell::Cell<u64>>,
}

impl<R: Read> CountingReader<R> {
    pub(crate) fn new(inner: R) -> (Self, std::rc::Rc<std::cell::Cell<u64>>) {
        let count = std::rc::Rc::new(std::cell::Cell::new(0));
        (
            Self {
                inner,
                count: count.clone(),
            },
            count,
        )
    }
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.count.set(self.count.get() + n as u64);
        Ok(n)
    }
}

pub(crate) fn map_io_corrupt(err: io::Error) -> ArchiveError {
    ArchiveError::Corrupt(err.to_string())
}
