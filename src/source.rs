//! A byte stream over the archive on disk, kept behind a named type rather
//! than a bare `File` so the rest of the pipeline is insulated from how the
//! archive is opened. `Read + Seek` uniformly, since the ZIP reader must
//! seek to the end-of-central-directory record and back to each local file
//! header, while the TAR reader only ever reads forward.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use crate::error::{ArchiveError, Result};

pub(crate) struct Source(File);

impl Source {
    pub(crate) fn open_file(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| ArchiveError::io(path, e))?;
        Ok(Source(file))
    }
}

impl Read for Source {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

impl Seek for Source {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.0.seek(pos)
    }
}
