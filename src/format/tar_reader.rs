//! Drives a `tar::Archive` over an already-decompressed stream: TAR is
//! purely sequential, so every entry is validated and materialized the
//! moment it's yielded, in archive order, generalized from an
//! unpack-trustingly pass to validate-every-entry-before-it-touches-disk.

use std::cell::Cell;
use std::io::Read;
use std::path::Path;
use std::rc::Rc;

use tar::{Archive, EntryType};

use crate::budget::Budget;
use crate::entry::EntryKind;
use crate::error::{ArchiveError, Result};
use crate::materializer;
use crate::policy::SecurityPolicy;
use crate::report::ReportBuilder;
use crate::validator;

pub(crate) fn run(
    decoder: Box<dyn Read>,
    compressed_so_far: Rc<Cell<u64>>,
    root: &Path,
    policy: &SecurityPolicy,
    budget: &mut Budget,
    report: &mut ReportBuilder,
) -> Result<()> {
    let mut archive = Archive::new(decoder);
    let entries = archive
        .entries()
        .map_err(crate::decompress::map_io_corrupt)?;

    for entry in entries {
        let mut entry = entry.map_err(crate::decompress::map_io_corrupt)?;
        let header = entry.header();

        let entry_type = header.entry_type();
        let kind = match classify(entry_type) {
            Some(kind) => kind,
            None => {
                return Err(ArchiveError::UnsupportedEntryType {
                    path: String::from_utf8_lossy(&entry.path_bytes()).into_owned(),
                    typeflag: entry_type_name(entry_type),
                })
            }
        };

        budget.check_file_count(policy)?;

        let raw_path = entry.path_bytes().into_owned();
        let raw_path_display = String::from_utf8_lossy(&raw_path).into_owned();
        let raw_link_target = entry.link_name_bytes().map(|c| c.into_owned());
        let declared_size = header.size().unwrap_or(0);
        let declared_mode = header.mode().ok();

        let validated = validator::validate_entry(
            kind,
            &raw_path,
            raw_link_target.as_deref(),
            declared_size,
            declared_mode,
            root,
            policy,
        )?;

        match kind {
            EntryKind::Directory => {
                materializer::materialize_directory(&validated, policy, report)?;
            }
            EntryKind::File => {
                materializer::materialize_file(
                    &validated,
                    &raw_path_display,
                    &mut entry,
                    policy,
                    budget,
                    report,
                    |budget| budget.set_compressed_bytes(compressed_so_far.get()),
                )?;
            }
            EntryKind::Symlink => {
                materializer::materialize_symlink(&validated, root, report)?;
            }
            EntryKind::Hardlink => {
                materializer::materialize_hardlink(&validated, root, report)?;
            }
        }
    }

    Ok(())
}

fn classify(entry_type: EntryType) -> Option<EntryKind> {
    if entry_type.is_dir() {
        Some(EntryKind::Directory)
    } else if entry_type.is_symlink() {
        Some(EntryKind::Symlink)
    } else if entry_type.is_hard_link() {
        Some(EntryKind::Hardlink)
    } else if entry_type.is_file() {
        Some(EntryKind::File)
    } else {
        None
    }
}

fn entry_type_name(entry_type: EntryType) -> &'static str {
    if entry_type.is_character_special() {
        "character device"
    } else if entry_type.is_block_special() {
        "block device"
    } else if entry_type.is_fifo() {
        "fifo"
    } else if entry_type.is_pax_global_extensions() || entry_type.is_pax_local_extensions() {
        "pax extension header"
    } else if entry_type.is_gnu_longname() || entry_type.is_gnu_longlink() {
        "gnu long-name header"
    } else {
        "unknown"
    }
}
