//! Play-by-play loading

use crate::{PlayRecord, Result, TotalsError};
use std::path::Path;

/// Read one JSON array of plays
pub fn load_play_file(path: impl AsRef<Path>) -> Result<Vec<PlayRecord>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| {
        TotalsError::Parse(format!("Failed to read plays from {}: {}", path.display(), e))
    })?;
    let plays: Vec<PlayRecord> = serde_json::from_str(&content)
        .map_err(|e| TotalsError::Parse(format!("Invalid plays in {}: {}", path.display(), e)))?;

    log::info!("Loaded {} plays from {}", plays.len(), path.display());
    Ok(plays)
}

/// Read and concatenate every configured play file, in order
pub fn load_plays<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<PlayRecord>> {
    if paths.is_empty() {
        return Err(TotalsError::Config("no play files configured".to_string()));
    }

    let mut plays = Vec::new();
    for path in paths {
        plays.extend(load_play_file(path)?);
    }
    Ok(plays)
}
