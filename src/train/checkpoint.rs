//! Checkpoint writing: state dicts as JSON files, one per interval.

use crate::autograd::Tensor;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Host-side copy of one parameter tensor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TensorRecord {
    pub name: String,
    pub shape: Vec<usize>,
    pub values: Vec<f32>,
}

impl TensorRecord {
    pub fn from_tensor(name: &str, tensor: &Tensor) -> Self {
        Self {
            name: name.to_string(),
            shape: tensor.shape(),
            values: tensor.data().iter().copied().collect(),
        }
    }
}

/// Path of the checkpoint written after finishing iteration `iteration`
/// (zero-based): `{save_dir}/iter_{iteration + 1}.json`.
pub fn checkpoint_path(save_dir: &Path, iteration: u64) -> PathBuf {
    save_dir.join(format!("iter_{}.json", iteration + 1))
}

/// Serialize a state dict to the interval's checkpoint file, creating
/// the save directory on first use.
pub fn save_checkpoint(
    save_dir: &Path,
    iteration: u64,
    state_dict: &[(String, Tensor)],
) -> Result<PathBuf> {
    fs::create_dir_all(save_dir)?;
    let records: Vec<TensorRecord> = state_dict
        .iter()
        .map(|(name, tensor)| TensorRecord::from_tensor(name, tensor))
        .collect();
    let json = serde_json::to_string_pretty(&records)
        .map_err(|e| Error::Serialization(format!("checkpoint serialization failed: {e}")))?;
    let path = checkpoint_path(save_dir, iteration);
    fs::write(&path, json)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_checkpoint_name_uses_one_based_iteration() {
        let path = checkpoint_path(Path::new("/tmp/run"), 9_999);
        assert_eq!(path, PathBuf::from("/tmp/run/iter_10000.json"));
    }

    #[test]
    fn test_save_and_reload_round_trip() {
        let dir = TempDir::new().unwrap();
        let state = vec![
            (
                "gain".to_string(),
                Tensor::from_vec(vec![1.0, 2.0, 3.0], true),
            ),
            ("bias".to_string(), Tensor::from_vec(vec![0.5], true)),
        ];
        let path = save_checkpoint(dir.path(), 0, &state).unwrap();
        assert!(path.ends_with("iter_1.json"));

        let json = std::fs::read_to_string(&path).unwrap();
        let records: Vec<TensorRecord> = serde_json::from_str(&json).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, "gain");
        assert_eq!(records[0].shape, vec![3]);
        assert_eq!(records[0].values, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_save_creates_missing_directory() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("runs/a");
        let state = vec![("w".to_string(), Tensor::from_vec(vec![0.0], true))];
        let path = save_checkpoint(&nested, 49, &state).unwrap();
        assert!(path.exists());
        assert!(path.ends_with("iter_50.json"));
    }
}
