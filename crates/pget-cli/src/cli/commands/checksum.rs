//! `pget checksum <path>` – compute SHA-256 of a file.

use anyhow::Result;
use pget_core::checksum;
use std::path::Path;

/// Compute and print SHA-256 of the given file.
pub async fn run_checksum(path: &Path) -> Result<()> {
    let path = path.to_path_buf();
    let (digest, path) = tokio::task::spawn_blocking(move || {
        checksum::sha256_path(&path).map(|digest| (digest, path))
    })
    .await??;
    println!("{}  {}", digest, path.display());
    Ok(())
}
