use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::ChecksumError;

/// Verifies a downloaded file against a published `SHASUMS256.txt`-style
/// manifest of `<sha256hex>  <filename>` lines.
///
/// A file whose name has no manifest entry is a packaging error and is
/// reported as such instead of silently failing verification.
pub fn is_checksum_valid(file: &Path, manifest: &str) -> Result<bool, ChecksumError> {
    let required = required_checksum_for(file, manifest)?;
    let actual = sha256_of(file)?;
    Ok(required == actual)
}

fn required_checksum_for(file: &Path, manifest: &str) -> Result<Vec<u8>, ChecksumError> {
    let file_name = file
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    // Some manifests name the artifact `node-v1.2.3-...` while the cache
    // file is `node-1.2.3-...` (or the other way round), so fall back to
    // the name with the `v` toggled.
    let variant = if file_name.contains("-v") {
        file_name.replacen("-v", "-", 1)
    } else {
        file_name.replacen('-', "-v", 1)
    };

    let hex_digest = manifest
        .lines()
        .find(|line| line.contains(&file_name) || line.contains(&variant))
        .and_then(|line| line.split("  ").next())
        .map(str::trim)
        .ok_or_else(|| ChecksumError::MissingEntry(file_name.clone()))?;

    hex::decode(hex_digest).map_err(|source| ChecksumError::BadHex {
        file: file_name,
        source,
    })
}

fn sha256_of(file: &Path) -> Result<Vec<u8>, ChecksumError> {
    let handle = File::open(file).map_err(|e| ChecksumError::Io(file.to_path_buf(), e))?;
    let mut reader = BufReader::new(handle);
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];
    loop {
        let read = reader
            .read(&mut buffer)
            .map_err(|e| ChecksumError::Io(file.to_path_buf(), e))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hasher.finalize().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    // sha256 of "hello world\n"
    const HELLO_SHA: &str = "a948904f2f0f479b8f8197694b30184b0d2ed1c1cd2a1ec0fb85d299a192a447";

    #[test]
    fn matching_bytes_verify_true() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("node-v22.9.0-linux-x64.tar.gz");
        std::fs::write(&file, b"hello world\n").unwrap();

        let manifest = format!("{HELLO_SHA}  node-v22.9.0-linux-x64.tar.gz\n");
        assert!(is_checksum_valid(&file, &manifest).unwrap());
    }

    #[test]
    fn flipping_one_byte_verifies_false() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("node-v22.9.0-linux-x64.tar.gz");
        std::fs::write(&file, b"hello world!").unwrap();

        let manifest = format!("{HELLO_SHA}  node-v22.9.0-linux-x64.tar.gz\n");
        assert!(!is_checksum_valid(&file, &manifest).unwrap());
    }

    #[test]
    fn missing_manifest_entry_is_an_error() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("node-v22.9.0-linux-x64.tar.gz");
        std::fs::write(&file, b"hello world\n").unwrap();

        let manifest = format!("{HELLO_SHA}  some-other-file.tar.gz\n");
        let err = is_checksum_valid(&file, &manifest).unwrap_err();
        assert!(matches!(err, ChecksumError::MissingEntry(_)));
    }

    #[test]
    fn tolerates_v_prefix_variance_in_the_manifest() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("node-v22.9.0-linux-x64.tar.gz");
        std::fs::write(&file, b"hello world\n").unwrap();

        // Manifest names the artifact without the leading `v`.
        let manifest = format!("{HELLO_SHA}  node-22.9.0-linux-x64.tar.gz\n");
        assert!(is_checksum_valid(&file, &manifest).unwrap());
    }

    #[test]
    fn picks_the_right_line_from_a_full_manifest() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("node-v22.9.0-linux-x64.tar.gz");
        std::fs::write(&file, b"hello world\n").unwrap();

        let manifest = format!(
            "{zeros}  node-v22.9.0-darwin-arm64.tar.gz\n\
             {HELLO_SHA}  node-v22.9.0-linux-x64.tar.gz\n\
             {zeros}  node-v22.9.0-win-x64.zip\n",
            zeros = "0".repeat(64)
        );
        assert!(is_checksum_valid(&file, &manifest).unwrap());
    }
}
