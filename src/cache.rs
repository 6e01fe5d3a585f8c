use sha2::{Digest, Sha256};
use std::io;
use std::path::Path;

pub fn compute_hash(source: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source);
    format!("{:x}", hasher.finalize())
}

/// True when the file at `path` already holds exactly `code`.
/// A missing file is never current.
pub async fn is_current(path: &Path, code: &str) -> io::Result<bool> {
    match tokio::fs::read(path).await {
        Ok(existing) => Ok(compute_hash(&existing) == compute_hash(code.as_bytes())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}
