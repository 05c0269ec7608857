//! SHA-256 verification against a `SHA2-256SUMS` listing

use crate::error::{Result, UpdateError};
use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::io::AsyncReadExt;

/// Name of the checksum listing published with each release
pub const SUMS_ASSET: &str = "SHA2-256SUMS";

/// Expected digest for `asset` in a `sha256sum`-style listing
pub fn expected_digest(listing: &str, asset: &str) -> Option<String> {
    listing.lines().find_map(|line| {
        let mut parts = line.split_whitespace();
        let digest = parts.next()?;
        let name = parts.next()?.trim_start_matches('*');
        (name == asset).then(|| digest.to_ascii_lowercase())
    })
}

/// Hex SHA-256 of a file's contents
pub async fn file_digest(path: &Path) -> Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex(&hasher.finalize()))
}

/// Fail with [`UpdateError::ChecksumMismatch`] unless `path` hashes to `expected`
pub async fn verify(path: &Path, asset: &str, expected: &str) -> Result<()> {
    let actual = file_digest(path).await?;
    if actual.eq_ignore_ascii_case(expected) {
        Ok(())
    } else {
        Err(UpdateError::ChecksumMismatch {
            asset: asset.to_string(),
            expected: expected.to_string(),
            actual,
        }
        .into())
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
