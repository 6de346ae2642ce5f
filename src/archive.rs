use std::fs::{self, File};
use std::io::{self, ErrorKind};
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use tracing::debug;

use crate::error::ArchiveError;

/// Extracts an archive into `destination`, dispatching on the file
/// extension. Supported: `.zip`, `.tar.gz`/`.tgz` and (on Windows)
/// `.msi` via an administrative install.
///
/// Every entry path is validated against the canonicalized destination
/// before anything is written; an entry that would land outside it fails
/// the extraction with [`ArchiveError::Traversal`]. Partial extraction on
/// failure is fine, installers extract into a scratch directory and
/// re-extract on retry.
pub fn extract(archive: &Path, destination: &Path) -> Result<(), ArchiveError> {
    let name = archive
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    fs::create_dir_all(destination).map_err(|e| io_error(archive, e))?;

    if name.ends_with(".zip") {
        extract_zip(archive, destination)
    } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        extract_tar_gz(archive, destination)
    } else if name.ends_with(".msi") {
        extract_msi(archive, destination)
    } else {
        Err(ArchiveError::Unsupported(archive.to_path_buf()))
    }
}

fn extract_tar_gz(archive: &Path, destination: &Path) -> Result<(), ArchiveError> {
    let file = File::open(archive).map_err(|e| io_error(archive, e))?;
    let mut tar = tar::Archive::new(GzDecoder::new(file));
    tar.set_preserve_permissions(true);

    let root = destination
        .canonicalize()
        .map_err(|e| io_error(archive, e))?;

    let entries = tar
        .entries()
        .map_err(|e| classify_io(archive, e))?;
    for entry in entries {
        let mut entry = entry.map_err(|e| classify_io(archive, e))?;
        let entry_path = entry
            .path()
            .map_err(|e| classify_io(archive, e))?
            .into_owned();
        let dest = secured_entry_path(&root, destination, &entry_path)?;

        if entry.header().entry_type().is_dir() {
            fs::create_dir_all(&dest).map_err(|e| io_error(archive, e))?;
            continue;
        }
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| io_error(archive, e))?;
        }
        // unpack() materializes regular files, symlinks and hardlinks and
        // propagates the unix mode bits from the tar header.
        entry
            .unpack(&dest)
            .map_err(|e| classify_io(archive, e))?;
    }
    Ok(())
}

fn extract_zip(archive: &Path, destination: &Path) -> Result<(), ArchiveError> {
    let file = File::open(archive).map_err(|e| io_error(archive, e))?;
    let mut zip = zip::ZipArchive::new(file).map_err(|e| classify_zip(archive, e))?;

    let root = destination
        .canonicalize()
        .map_err(|e| io_error(archive, e))?;

    for index in 0..zip.len() {
        let mut entry = zip.by_index(index).map_err(|e| classify_zip(archive, e))?;
        let entry_path = PathBuf::from(entry.name());
        let dest = secured_entry_path(&root, destination, &entry_path)?;

        if entry.is_dir() {
            fs::create_dir_all(&dest).map_err(|e| io_error(archive, e))?;
            continue;
        }
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| io_error(archive, e))?;
        }
        let mut out = File::create(&dest).map_err(|e| io_error(archive, e))?;
        io::copy(&mut entry, &mut out).map_err(|e| classify_io(archive, e))?;

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&dest, fs::Permissions::from_mode(mode))
                .map_err(|e| io_error(archive, e))?;
        }
    }
    Ok(())
}

#[cfg(windows)]
fn extract_msi(archive: &Path, destination: &Path) -> Result<(), ArchiveError> {
    // An administrative install unpacks the MSI payload without touching
    // the machine-wide installer database.
    let status = std::process::Command::new("msiexec")
        .arg("/a")
        .arg(archive)
        .arg("/qn")
        .arg(format!("TARGETDIR={}", destination.display()))
        .status()
        .map_err(|e| io_error(archive, e))?;
    if !status.success() {
        return Err(ArchiveError::MsiFailed(status.code()));
    }
    Ok(())
}

#[cfg(not(windows))]
fn extract_msi(_archive: &Path, _destination: &Path) -> Result<(), ArchiveError> {
    Err(ArchiveError::MsiUnsupportedPlatform)
}

/// Resolves an entry's destination and proves it stays inside the
/// destination root. `root` must already be canonicalized.
fn secured_entry_path(
    root: &Path,
    destination: &Path,
    entry_path: &Path,
) -> Result<PathBuf, ArchiveError> {
    let traversal = || ArchiveError::Traversal {
        entry: entry_path.display().to_string(),
        destination: destination.to_path_buf(),
    };

    let mut relative = PathBuf::new();
    for component in entry_path.components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            // absolute entries and `..` segments never leave the archive
            Component::RootDir | Component::Prefix(_) | Component::ParentDir => {
                return Err(traversal());
            }
        }
    }
    if relative.as_os_str().is_empty() {
        return Err(traversal());
    }

    let dest = root.join(&relative);

    // Canonicalize the closest existing ancestor; if it resolves outside
    // the root (a symlinked directory, for instance), refuse to write.
    let mut ancestor = dest.parent();
    while let Some(dir) = ancestor {
        if dir.exists() {
            let canonical = dir.canonicalize().map_err(|e| ArchiveError::Io {
                archive: dest.clone(),
                source: e,
            })?;
            if !canonical.starts_with(root) {
                return Err(traversal());
            }
            break;
        }
        ancestor = dir.parent();
    }

    // On case-insensitive filesystems an entry can alias an existing path
    // with different casing; reject instead of silently merging.
    if dest.exists() {
        if let (Ok(canonical), Some(expected)) = (dest.canonicalize(), dest.file_name()) {
            if let Some(actual) = canonical.file_name() {
                if actual != expected
                    && actual.to_string_lossy().to_lowercase()
                        == expected.to_string_lossy().to_lowercase()
                {
                    debug!(
                        "entry '{}' differs only by case from existing '{}'",
                        expected.to_string_lossy(),
                        actual.to_string_lossy()
                    );
                    return Err(traversal());
                }
            }
        }
    }

    Ok(dest)
}

/// Premature end-of-stream means the cached archive is truncated, which
/// installers treat differently (evict and re-download) from plain I/O
/// failures.
fn classify_io(archive: &Path, source: io::Error) -> ArchiveError {
    // flate2 reports corrupt deflate streams as InvalidInput
    match source.kind() {
        ErrorKind::UnexpectedEof | ErrorKind::InvalidData | ErrorKind::InvalidInput => {
            ArchiveError::Corrupt(archive.to_path_buf())
        }
        _ => io_error(archive, source),
    }
}

fn classify_zip(archive: &Path, source: zip::result::ZipError) -> ArchiveError {
    match source {
        zip::result::ZipError::Io(io) => classify_io(archive, io),
        zip::result::ZipError::InvalidArchive(_) => ArchiveError::Corrupt(archive.to_path_buf()),
        other => io_error(archive, io::Error::other(other)),
    }
}

fn io_error(archive: &Path, source: io::Error) -> ArchiveError {
    ArchiveError::Io {
        archive: archive.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tempfile::tempdir;

    fn write_tar_gz(path: &Path, entries: &[(&str, &[u8], u32)]) {
        let file = File::create(path).unwrap();
        let encoder = GzEncoder::new(file, Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (name, contents, mode) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(contents.len() as u64);
            header.set_mode(*mode);
            header.set_cksum();
            builder.append_data(&mut header, name, *contents).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();
    }

    /// `append_data` refuses `..` in entry names, so hostile fixtures
    /// write the header's name bytes directly.
    fn write_hostile_tar_gz(path: &Path, name: &[u8], contents: &[u8]) {
        let file = File::create(path).unwrap();
        let encoder = GzEncoder::new(file, Compression::default());
        let mut builder = tar::Builder::new(encoder);
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.as_old_mut().name[..name.len()].copy_from_slice(name);
        header.set_cksum();
        builder.append(&header, contents).unwrap();
        builder.into_inner().unwrap().finish().unwrap();
    }

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();
        for (name, contents) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(contents).unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn tar_gz_roundtrip_reproduces_the_file_set() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("tool.tar.gz");
        write_tar_gz(
            &archive,
            &[
                ("tool-v1.0.0/bin/tool", b"#!/bin/sh\necho ok\n", 0o755),
                ("tool-v1.0.0/README.md", b"docs", 0o644),
            ],
        );

        let dest = dir.path().join("out");
        extract(&archive, &dest).unwrap();

        let binary = dest.join("tool-v1.0.0").join("bin").join("tool");
        assert_eq!(fs::read(&binary).unwrap(), b"#!/bin/sh\necho ok\n");
        assert_eq!(
            fs::read(dest.join("tool-v1.0.0").join("README.md")).unwrap(),
            b"docs"
        );

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&binary).unwrap().permissions().mode();
            assert_ne!(mode & 0o111, 0, "executable bit should be propagated");
        }
    }

    #[test]
    fn zip_roundtrip_reproduces_the_file_set() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("tool.zip");
        write_zip(&archive, &[("tool/tool.txt", b"zipped")]);

        let dest = dir.path().join("out");
        extract(&archive, &dest).unwrap();
        assert_eq!(fs::read(dest.join("tool").join("tool.txt")).unwrap(), b"zipped");
    }

    #[test]
    fn parent_traversal_entries_are_rejected() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("evil.tar.gz");
        write_hostile_tar_gz(&archive, b"../../evil", b"boom");

        let dest = dir.path().join("sandbox");
        let err = extract(&archive, &dest).unwrap_err();
        assert!(matches!(err, ArchiveError::Traversal { .. }), "{err:?}");
        assert!(!dir.path().join("evil").exists());
        assert!(!dir.path().parent().unwrap().join("evil").exists());
    }

    #[test]
    fn absolute_zip_entries_are_rejected() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("evil.zip");
        write_zip(&archive, &[("/tmp/evil", b"boom")]);

        let dest = dir.path().join("sandbox");
        let err = extract(&archive, &dest).unwrap_err();
        assert!(matches!(err, ArchiveError::Traversal { .. }), "{err:?}");
        assert!(!Path::new("/tmp/evil").exists());
    }

    #[test]
    fn truncated_tar_gz_is_reported_as_corrupt() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("tool.tar.gz");
        write_tar_gz(&archive, &[("tool/file.txt", &[0u8; 4096], 0o644)]);

        let bytes = fs::read(&archive).unwrap();
        let truncated = dir.path().join("truncated.tar.gz");
        fs::write(&truncated, &bytes[..bytes.len() / 2]).unwrap();

        let dest = dir.path().join("out");
        let err = extract(&truncated, &dest).unwrap_err();
        assert!(matches!(err, ArchiveError::Corrupt(_)), "{err:?}");
    }

    #[test]
    fn unknown_extensions_are_unsupported() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("tool.rar");
        fs::write(&archive, b"not really").unwrap();

        let err = extract(&archive, &dir.path().join("out")).unwrap_err();
        assert!(matches!(err, ArchiveError::Unsupported(_)));
    }

    #[cfg(unix)]
    #[test]
    fn entries_behind_a_symlinked_directory_cannot_escape() {
        let dir = tempdir().unwrap();
        let outside = dir.path().join("outside");
        fs::create_dir_all(&outside).unwrap();

        let dest = dir.path().join("sandbox");
        fs::create_dir_all(&dest).unwrap();
        std::os::unix::fs::symlink(&outside, dest.join("link")).unwrap();

        let archive = dir.path().join("evil.tar.gz");
        write_tar_gz(&archive, &[("link/escape.txt", b"boom", 0o644)]);

        let err = extract(&archive, &dest).unwrap_err();
        assert!(matches!(err, ArchiveError::Traversal { .. }), "{err:?}");
        assert!(!outside.join("escape.txt").exists());
    }
}
