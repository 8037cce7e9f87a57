//! Checkpoint persistence
//!
//! Model state is encoded with burn's named MessagePack recorder at full
//! precision and written to `{dir}/epoch_{n}.ckpt`, one file per saved epoch.
//! Bytes go to `epoch_{n}.ckpt.tmp` first and are renamed into place once
//! complete, so listing never sees a partial checkpoint.

use std::fs;
use std::path::{Path, PathBuf};

use burn::record::{FullPrecisionSettings, NamedMpkBytesRecorder, Record, Recorder};
use burn::tensor::backend::Backend;

use crate::{PretrainError, Result};

type StateRecorder = NamedMpkBytesRecorder<FullPrecisionSettings>;

/// A checkpoint written to disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointRecord {
    pub epoch: usize,
    pub path: PathBuf,
}

/// Saves and restores model state keyed by epoch number
#[derive(Debug, Clone)]
pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    /// Create a manager, creating the checkpoint directory if needed
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Deterministic file name for an epoch
    pub fn file_name(epoch: usize) -> String {
        format!("epoch_{}.ckpt", epoch)
    }

    /// Epoch encoded in a checkpoint file name
    pub fn parse_epoch(file_name: &str) -> Option<usize> {
        file_name
            .strip_prefix("epoch_")?
            .strip_suffix(".ckpt")?
            .parse()
            .ok()
    }

    /// Encode model state without touching disk
    pub fn snapshot_bytes<B: Backend, R: Record<B>>(state: R) -> Result<Vec<u8>> {
        <StateRecorder as Recorder<B>>::record(&StateRecorder::new(), state, ()).map_err(|e| {
            PretrainError::Checkpoint {
                path: PathBuf::new(),
                message: format!("Failed to encode model state: {}", e),
            }
        })
    }

    /// Persist the state for an epoch
    pub fn save<B: Backend, R: Record<B>>(&self, state: R, epoch: usize) -> Result<CheckpointRecord> {
        let path = self.dir.join(Self::file_name(epoch));
        let partial = path.with_extension("ckpt.tmp");
        let bytes = Self::snapshot_bytes::<B, R>(state)?;

        // Only a fully written file ever carries the final name
        fs::write(&partial, bytes)
            .and_then(|_| fs::rename(&partial, &path))
            .map_err(|e| {
                let _ = fs::remove_file(&partial);
                PretrainError::Checkpoint {
                    path: path.clone(),
                    message: format!("Failed to write checkpoint: {}", e),
                }
            })?;

        log::debug!("Saved checkpoint: {}", path.display());
        Ok(CheckpointRecord { epoch, path })
    }

    /// Restore state written by [`CheckpointManager::save`]
    pub fn load<B: Backend, R: Record<B>>(path: &Path, device: &B::Device) -> Result<R> {
        let bytes = fs::read(path).map_err(|e| PretrainError::Checkpoint {
            path: path.to_path_buf(),
            message: format!("Cannot read checkpoint: {}", e),
        })?;

        <StateRecorder as Recorder<B>>::load(&StateRecorder::new(), bytes, device).map_err(|e| {
            PretrainError::Checkpoint {
                path: path.to_path_buf(),
                message: format!("Cannot decode checkpoint: {}", e),
            }
        })
    }

    /// Every checkpoint in the directory, ordered by epoch
    pub fn checkpoints(&self) -> Result<Vec<CheckpointRecord>> {
        let mut records = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            if let Some(epoch) = Self::parse_epoch(&name.to_string_lossy()) {
                records.push(CheckpointRecord {
                    epoch,
                    path: entry.path(),
                });
            }
        }
        records.sort_by_key(|r| r.epoch);
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::multitask_cnn::MultitaskCnnRecord;
    use crate::model::{MultitaskCnn, MultitaskCnnConfig, MultitaskModel};
    use burn::backend::NdArray;
    use burn::module::Module;
    use burn::tensor::Tensor;

    type TestBackend = NdArray<f32>;

    fn small_model() -> MultitaskCnn<TestBackend> {
        MultitaskCnn::new(&Default::default(), MultitaskCnnConfig { num_classes: 4 })
    }

    #[test]
    fn test_file_name_convention() {
        assert_eq!(CheckpointManager::file_name(1), "epoch_1.ckpt");
        assert_eq!(CheckpointManager::file_name(12), "epoch_12.ckpt");
        assert_eq!(CheckpointManager::parse_epoch("epoch_12.ckpt"), Some(12));
        assert_eq!(CheckpointManager::parse_epoch("epoch_x.ckpt"), None);
        assert_eq!(CheckpointManager::parse_epoch("scalars.csv"), None);
        assert_eq!(CheckpointManager::parse_epoch("epoch_12.ckpt.tmp"), None);
    }

    #[test]
    fn test_save_load_restores_identical_state() {
        let dir = tempfile::tempdir().unwrap();
        let manager = CheckpointManager::new(dir.path()).unwrap();
        let model = small_model();

        let record = manager
            .save::<TestBackend, _>(model.clone().into_record(), 3)
            .unwrap();
        assert_eq!(record.epoch, 3);
        assert_eq!(record.path, dir.path().join("epoch_3.ckpt"));

        let device = Default::default();
        let state = CheckpointManager::load::<TestBackend, _>(&record.path, &device).unwrap();
        let restored = small_model().load_record(state);

        let rgb = Tensor::<TestBackend, 4>::random(
            [1, 3, 16, 16],
            burn::tensor::Distribution::Uniform(0.0, 1.0),
            &device,
        );
        let expected = model.forward(rgb.clone()).segmentation.into_data();
        let actual = restored.forward(rgb).segmentation.into_data();
        assert_eq!(expected, actual);
    }

    #[test]
    fn test_load_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = CheckpointManager::load::<TestBackend, MultitaskCnnRecord<TestBackend>>(
            &dir.path().join("epoch_9.ckpt"),
            &Default::default(),
        );
        assert!(matches!(result, Err(PretrainError::Checkpoint { .. })));
    }

    #[test]
    fn test_load_corrupt_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("epoch_1.ckpt");
        fs::write(&path, b"not a checkpoint").unwrap();

        let result = CheckpointManager::load::<TestBackend, MultitaskCnnRecord<TestBackend>>(
            &path,
            &Default::default(),
        );
        assert!(matches!(result, Err(PretrainError::Checkpoint { .. })));
    }

    #[test]
    fn test_checkpoints_sorted_by_epoch() {
        let dir = tempfile::tempdir().unwrap();
        let manager = CheckpointManager::new(dir.path()).unwrap();
        let model = small_model();

        for epoch in [10, 2, 4] {
            manager
                .save::<TestBackend, _>(model.clone().into_record(), epoch)
                .unwrap();
        }
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let epochs: Vec<usize> = manager.checkpoints().unwrap().iter().map(|r| r.epoch).collect();
        assert_eq!(epochs, vec![2, 4, 10]);
    }

    #[test]
    fn test_interrupted_save_is_not_listed() {
        let dir = tempfile::tempdir().unwrap();
        let manager = CheckpointManager::new(dir.path()).unwrap();

        let saved = manager
            .save::<TestBackend, _>(small_model().into_record(), 1)
            .unwrap();
        assert!(!dir.path().join("epoch_1.ckpt.tmp").exists());
        assert!(saved.path.exists());

        // Truncated leftover of a save that never reached the rename
        fs::write(dir.path().join("epoch_2.ckpt.tmp"), b"\x81\xa4").unwrap();

        let listed = manager.checkpoints().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].epoch, 1);
    }

    #[test]
    fn test_save_overwrites_existing_epoch() {
        let dir = tempfile::tempdir().unwrap();
        let manager = CheckpointManager::new(dir.path()).unwrap();
        let model = small_model();

        manager.save::<TestBackend, _>(model.clone().into_record(), 1).unwrap();
        let record = manager.save::<TestBackend, _>(model.clone().into_record(), 1).unwrap();

        assert_eq!(
            fs::read(&record.path).unwrap(),
            CheckpointManager::snapshot_bytes::<TestBackend, _>(model.into_record()).unwrap()
        );
        assert_eq!(manager.checkpoints().unwrap().len(), 1);
    }
}
