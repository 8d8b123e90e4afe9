// src/storage.rs
use crate::error::Result;
use crate::types::PositionState;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::Path;
use tracing::info;

/// Per-symbol balances as written to disk.
pub type Snapshot = HashMap<String, PositionState>;

/// Reads a snapshot file. A missing file is an empty snapshot.
pub async fn load_snapshot(path: impl AsRef<Path>) -> Result<Snapshot> {
    let path = path.as_ref();
    let data = match tokio::fs::read_to_string(path).await {
        Ok(data) => data,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Snapshot::new()),
        Err(e) => return Err(e.into()),
    };
    let snapshot: Snapshot = serde_json::from_str(&data)?;
    info!("Restored {} positions from {}", snapshot.len(), path.display());
    Ok(snapshot)
}

pub async fn save_snapshot(path: impl AsRef<Path>, snapshot: &Snapshot) -> Result<()> {
    let data = serde_json::to_string_pretty(snapshot)?;
    tokio::fs::write(path.as_ref(), data).await?;
    Ok(())
}
