//! Idempotent directory/file creation, atomic writes, and tar.gz extraction.

use std::fs;
use std::io::Read as _;
use std::os::unix::fs::PermissionsExt as _;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;

use crate::error::{Error, Result};

/// Succeeds if `p` exists as a directory or is created; fails if `p` exists
/// as a non-directory.
pub fn ensure_dir(p: &Path) -> Result<()> {
    match fs::metadata(p) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(Error::Filesystem(format!(
            "{} exists and is not a directory",
            p.display()
        ))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            fs::create_dir_all(p)?;
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Creates parent directories then an empty file at `p` if absent; fails if
/// `p` exists as a directory.
pub fn ensure_file(p: &Path) -> Result<()> {
    match fs::metadata(p) {
        Ok(meta) if meta.is_dir() => Err(Error::Filesystem(format!(
            "{} exists and is a directory",
            p.display()
        ))),
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            if let Some(parent) = p.parent() {
                ensure_dir(parent)?;
            }
            fs::File::create(p)?;
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Creates parents, writes `p.tmp`, renames to `p`, then sets mode 0444.
///
/// Any reader that sees `p` at all sees the complete payload: the write
/// lands on a sibling temp path and only becomes visible at `p` via a single
/// atomic rename.
pub fn atomic_save(p: &Path, bytes: &[u8]) -> Result<()> {
    let parent = p
        .parent()
        .ok_or_else(|| Error::Filesystem(format!("{} has no parent directory", p.display())))?;
    ensure_dir(parent)?;
    let tmp = p.with_extension("tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, p)?;
    fs::set_permissions(p, fs::Permissions::from_mode(0o444))?;
    Ok(())
}

/// If `layer_dir/hex` exists, returns it; else creates it by extracting
/// `blob_dir/hex` into it. Idempotent.
pub fn ensure_layer_extracted(blob_dir: &Path, layer_dir: &Path, hex: &str) -> Result<PathBuf> {
    let dest = layer_dir.join(hex);
    if dest.is_dir() {
        return Ok(dest);
    }
    let archive = blob_dir.join(hex);
    ensure_dir(&dest)?;
    extract_tar_gz(&archive, &dest)?;
    Ok(dest)
}

/// Streams a gzipped tar and materializes entries under `dest`.
///
/// Supported entry types: directory (created with its stored mode), regular
/// file (parents created, written, mode set), symlink (parents created,
/// link created, "already exists" ignored). Every other entry type is
/// silently skipped. Every entry's cleaned target path is required to stay
/// under `dest`; an entry that would escape is rejected rather than
/// skipped, since that is a corruption signal worth failing loudly on.
pub fn extract_tar_gz(archive: &Path, dest: &Path) -> Result<()> {
    let file = fs::File::open(archive)?;
    let mut tar = tar::Archive::new(GzDecoder::new(file));

    for entry in tar.entries()? {
        let mut entry = entry?;
        let name = entry.path()?.into_owned();
        let target = safe_join(dest, &name)?;

        match entry.header().entry_type() {
            tar::EntryType::Directory => {
                fs::create_dir_all(&target)?;
                if let Ok(mode) = entry.header().mode() {
                    fs::set_permissions(&target, fs::Permissions::from_mode(mode))?;
                }
            }
            tar::EntryType::Regular => {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)?;
                }
                let mut buf = Vec::new();
                entry.read_to_end(&mut buf)?;
                fs::write(&target, &buf)?;
                if let Ok(mode) = entry.header().mode() {
                    fs::set_permissions(&target, fs::Permissions::from_mode(mode))?;
                }
            }
            tar::EntryType::Symlink => {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)?;
                }
                if let Some(link_name) = entry.link_name()? {
                    match std::os::unix::fs::symlink(link_name, &target) {
                        Ok(()) => {}
                        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
                        Err(e) => return Err(e.into()),
                    }
                }
            }
            _ => {}
        }
    }
    Ok(())
}

/// Joins `dest` with a tar entry's path after cleaning it, rejecting any
/// result that would escape `dest` (symlink and `..` traversal attacks).
fn safe_join(dest: &Path, entry_path: &Path) -> Result<PathBuf> {
    let mut cleaned = PathBuf::new();
    for component in entry_path.components() {
        match component {
            std::path::Component::Normal(part) => cleaned.push(part),
            std::path::Component::CurDir => {}
            std::path::Component::ParentDir => {
                if !cleaned.pop() {
                    return Err(Error::Filesystem(format!(
                        "tar entry {} escapes extraction root",
                        entry_path.display()
                    )));
                }
            }
            std::path::Component::RootDir | std::path::Component::Prefix(_) => {
                return Err(Error::Filesystem(format!(
                    "tar entry {} has an absolute path",
                    entry_path.display()
                )));
            }
        }
    }
    Ok(dest.join(cleaned))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_dir_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let p = tmp.path().join("a/b/c");
        ensure_dir(&p).unwrap();
        ensure_dir(&p).unwrap();
        assert!(p.is_dir());
    }

    #[test]
    fn ensure_dir_rejects_non_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let p = tmp.path().join("f");
        fs::write(&p, b"x").unwrap();
        assert!(ensure_dir(&p).is_err());
    }

    #[test]
    fn ensure_file_creates_parents() {
        let tmp = tempfile::tempdir().unwrap();
        let p = tmp.path().join("a/b/f");
        ensure_file(&p).unwrap();
        assert!(p.is_file());
    }

    #[test]
    fn atomic_save_writes_and_locks_mode() {
        let tmp = tempfile::tempdir().unwrap();
        let p = tmp.path().join("x/y.json");
        atomic_save(&p, b"hello").unwrap();
        assert_eq!(fs::read(&p).unwrap(), b"hello");
        let mode = fs::metadata(&p).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o444);
        assert!(!p.with_extension("tmp").exists());
    }

    #[test]
    fn safe_join_rejects_traversal() {
        let dest = Path::new("/tmp/dest");
        assert!(safe_join(dest, Path::new("../../etc/passwd")).is_err());
        assert!(safe_join(dest, Path::new("/etc/passwd")).is_err());
        assert_eq!(
            safe_join(dest, Path::new("a/b/c")).unwrap(),
            dest.join("a/b/c")
        );
    }

    #[test]
    fn extract_tar_gz_roundtrips_regular_file() {
        let tmp = tempfile::tempdir().unwrap();
        let archive_path = tmp.path().join("layer.tar.gz");
        {
            let file = fs::File::create(&archive_path).unwrap();
            let enc = flate2::write::GzEncoder::new(file, flate2::Compression::default());
            let mut builder = tar::Builder::new(enc);
            let data = b"payload";
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, "a/b.txt", &data[..])
                .unwrap();
            builder.finish().unwrap();
        }
        let dest = tmp.path().join("out");
        fs::create_dir_all(&dest).unwrap();
        extract_tar_gz(&archive_path, &dest).unwrap();
        assert_eq!(fs::read(dest.join("a/b.txt")).unwrap(), b"payload");

        // idempotent re-extraction
        extract_tar_gz(&archive_path, &dest).unwrap();
        assert_eq!(fs::read(dest.join("a/b.txt")).unwrap(), b"payload");
    }

    #[test]
    fn ensure_layer_extracted_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let blob_dir = tmp.path().join("blobs");
        let layer_dir = tmp.path().join("layers");
        fs::create_dir_all(&blob_dir).unwrap();
        let archive_path = blob_dir.join("deadbeef");
        {
            let file = fs::File::create(&archive_path).unwrap();
            let mut enc = flate2::write::GzEncoder::new(file, flate2::Compression::default());
            let mut builder = tar::Builder::new(&mut enc);
            builder.finish().unwrap();
            drop(builder);
            enc.finish().unwrap();
        }
        let first = ensure_layer_extracted(&blob_dir, &layer_dir, "deadbeef").unwrap();
        assert!(first.is_dir());
        let second = ensure_layer_extracted(&blob_dir, &layer_dir, "deadbeef").unwrap();
        assert_eq!(first, second);
    }
}
