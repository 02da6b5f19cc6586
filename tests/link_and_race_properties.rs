//! Coverage for the two spec-level properties the CVE regression suite
//! doesn't exercise directly: that no hardlink is ever materialized
//! whose target isn't already a regular file inside the jail, and that
//! a symlink planted at an entry's destination between validation and
//! write can't redirect that write outside the jail.

use std::fs;
use std::io::Cursor;

use archex::{ArchiveError, SecurityPolicy};
use tar::{Builder, EntryType, Header};

fn file_header(path: &str, content: &[u8]) -> (Header, Vec<u8>) {
    let mut header = Header::new_gnu();
    header.set_path(path).unwrap();
    header.set_size(content.len() as u64);
    header.set_entry_type(EntryType::Regular);
    header.set_mode(0o644);
    header.set_cksum();
    (header, content.to_vec())
}

fn link_header(link_path: &str, target: &str, entry_type: EntryType) -> Header {
    let mut header = Header::new_gnu();
    header.set_path(link_path).unwrap();
    header.set_size(0);
    header.set_entry_type(entry_type);
    header.set_link_name(target).unwrap();
    header.set_cksum();
    header
}

fn write_archive(dir: &std::path::Path, name: &str, bytes: &[u8]) -> std::path::PathBuf {
    let path = dir.join(name);
    fs::write(&path, bytes).unwrap();
    path
}

#[test]
fn hardlink_to_missing_target_is_rejected() {
    let workdir = tempfile::tempdir().unwrap();
    let out = workdir.path().join("out");
    fs::create_dir(&out).unwrap();

    // No `original.txt` entry precedes this hardlink, so its target is
    // never materialized before the link is attempted.
    let mut builder = Builder::new(Vec::new());
    let header = link_header("alias.txt", "original.txt", EntryType::Link);
    builder.append(&header, &[][..]).unwrap();
    let bytes = builder.into_inner().unwrap();
    let archive = write_archive(workdir.path(), "dangling.tar", &bytes);

    let policy = SecurityPolicy::builder().allow_hardlinks(true).build().unwrap();
    let err = archex::extract_archive(&archive, &out, policy).unwrap_err();

    assert!(matches!(err, ArchiveError::HardlinkTargetMissing { .. }));
    assert!(!out.join("alias.txt").exists());
}

#[test]
fn hardlink_to_already_materialized_file_succeeds() {
    let workdir = tempfile::tempdir().unwrap();
    let out = workdir.path().join("out");
    fs::create_dir(&out).unwrap();

    let mut builder = Builder::new(Vec::new());
    let (file_hdr, content) = file_header("original.txt", b"hardlinked content");
    builder.append(&file_hdr, &content[..]).unwrap();
    let link_hdr = link_header("alias.txt", "original.txt", EntryType::Link);
    builder.append(&link_hdr, &[][..]).unwrap();
    let bytes = builder.into_inner().unwrap();
    let archive = write_archive(workdir.path(), "linked.tar", &bytes);

    let policy = SecurityPolicy::builder().allow_hardlinks(true).build().unwrap();
    let report = archex::extract_archive(&archive, &out, policy).unwrap();

    assert_eq!(report.files_extracted, 1);
    assert_eq!(report.hardlinks_created, 1);
    assert_eq!(
        fs::read(out.join("alias.txt")).unwrap(),
        fs::read(out.join("original.txt")).unwrap()
    );
}

#[cfg(unix)]
#[test]
fn planted_symlink_cannot_redirect_a_file_write_outside_the_jail() {
    let workdir = tempfile::tempdir().unwrap();
    let out = workdir.path().join("out");
    fs::create_dir(&out).unwrap();

    // A location outside the jail that a malicious symlink will aim at.
    let outside = workdir.path().join("outside.txt");

    // Plant the symlink at the exact path this entry will resolve to,
    // simulating another process winning a race between validation and
    // materialization.
    std::os::unix::fs::symlink(&outside, out.join("payload.txt")).unwrap();

    let mut builder = Builder::new(Vec::new());
    let (header, content) = file_header("payload.txt", b"should not leave the jail");
    builder.append(&header, &content[..]).unwrap();
    let bytes = builder.into_inner().unwrap();
    let archive = write_archive(workdir.path(), "race.tar", &bytes);

    let err = archex::extract_archive(&archive, &out, SecurityPolicy::default()).unwrap_err();

    // The no-follow open must refuse to write through the planted
    // symlink; this surfaces as an IoError, not a silent write-through.
    assert!(matches!(err, ArchiveError::IoError { .. }));
    assert!(!outside.exists(), "write escaped the jail via a planted symlink");
}

#[test]
fn zip_directory_entries_without_nested_files_are_still_created() {
    use zip::write::FileOptions;
    use zip::ZipWriter;

    let workdir = tempfile::tempdir().unwrap();
    let out = workdir.path().join("out");
    fs::create_dir(&out).unwrap();

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    zip.add_directory("empty_dir/", FileOptions::default()).unwrap();
    let bytes = zip.finish().unwrap().into_inner();
    let archive = write_archive(workdir.path(), "emptydir.zip", &bytes);

    let report = archex::extract_archive(&archive, &out, SecurityPolicy::default()).unwrap();

    assert_eq!(report.directories_created, 1);
    assert!(out.join("empty_dir").is_dir());
}
