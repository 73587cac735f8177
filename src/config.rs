use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::activation::activation::ActivationFunction;
use crate::error::{Result, SegError};
use crate::loss::loss_type::LossType;
use crate::network::spec::UNetConfig;
use crate::optim::optimizer::OptimizerKind;
use crate::train::checkpoint::CheckpointMode;
use crate::train::train_config::TrainConfig;

/// Application configuration loaded from `segmed.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub training: TrainingSection,
    pub model: ModelSection,
    pub data: DataSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingSection {
    pub epochs: usize,
    pub batch_size: usize,
    pub steps_per_epoch: usize,
    /// Omitted means "same as steps_per_epoch".
    pub validation_steps: Option<usize>,
    pub val_split: f64,
    /// "adam" or "sgd".
    pub optimizer: String,
    pub learning_rate: f64,
    pub loss: LossType,
    pub monitor: String,
    pub checkpoint_mode: CheckpointMode,
    pub seed: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSection {
    pub depth: usize,
    pub base_filters: usize,
    pub out_channels: usize,
    pub activation: ActivationFunction,
    pub init_seed: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSection {
    pub image_dir: String,
    pub mask_dir: String,
    pub model_file: String,
    /// `[height, width]` images and masks are resized to.
    pub target_size: [u32; 2],
    pub horizontal_flip: bool,
    pub vertical_flip: bool,
    pub show: bool,
    pub preview_dir: String,
}

impl Default for TrainingSection {
    fn default() -> Self {
        let defaults = TrainConfig::default();
        TrainingSection {
            epochs: defaults.epochs,
            batch_size: defaults.batch_size,
            steps_per_epoch: defaults.steps_per_epoch,
            validation_steps: defaults.validation_steps,
            val_split: defaults.val_split,
            optimizer: defaults.optimizer.name().to_string(),
            learning_rate: defaults.optimizer.learning_rate(),
            loss: defaults.loss,
            monitor: defaults.monitor,
            checkpoint_mode: defaults.checkpoint_mode,
            seed: defaults.seed,
        }
    }
}

impl Default for ModelSection {
    fn default() -> Self {
        let defaults = UNetConfig::default();
        ModelSection {
            depth: defaults.depth,
            base_filters: defaults.base_filters,
            out_channels: defaults.out_channels,
            activation: defaults.activation,
            init_seed: defaults.init_seed,
        }
    }
}

impl Default for DataSection {
    fn default() -> Self {
        DataSection {
            image_dir: "data/images".to_string(),
            mask_dir: "data/masks".to_string(),
            model_file: "unet.json".to_string(),
            target_size: [256, 256],
            horizontal_flip: false,
            vertical_flip: false,
            show: false,
            preview_dir: ".".to_string(),
        }
    }
}

impl AppConfig {
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| SegError::io(path, e))?;
        toml::from_str(&content)
            .map_err(|e| SegError::Config(format!("Failed to parse config {path}: {e}")))
    }

    pub fn save(&self, path: &str) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| SegError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(path, content).map_err(|e| SegError::io(path, e))?;
        Ok(())
    }

    pub fn optimizer(&self) -> Result<OptimizerKind> {
        let lr = self.training.learning_rate;
        match self.training.optimizer.to_ascii_lowercase().as_str() {
            "adam" => Ok(OptimizerKind::default().with_learning_rate(lr)),
            "sgd" => Ok(OptimizerKind::Sgd { learning_rate: lr }),
            other => Err(SegError::Config(format!("unknown optimizer '{other}'"))),
        }
    }

    /// Training parameters; channels and the stop flag are left unset.
    pub fn to_train_config(&self) -> Result<TrainConfig> {
        let t = &self.training;
        let d = &self.data;
        Ok(TrainConfig {
            batch_size: t.batch_size,
            epochs: t.epochs,
            steps_per_epoch: t.steps_per_epoch,
            validation_steps: t.validation_steps,
            val_split: t.val_split,
            optimizer: self.optimizer()?,
            loss: t.loss,
            monitor: t.monitor.clone(),
            checkpoint_mode: t.checkpoint_mode,
            model_file: PathBuf::from(&d.model_file),
            seed: t.seed,
            show: d.show,
            preview_dir: PathBuf::from(&d.preview_dir),
            target_size: (d.target_size[0], d.target_size[1]),
            horizontal_flip: d.horizontal_flip,
            vertical_flip: d.vertical_flip,
            progress_tx: None,
            stop_flag: None,
        })
    }

    pub fn to_unet_config(&self) -> UNetConfig {
        let m = &self.model;
        UNetConfig {
            input_size: None,
            out_channels: m.out_channels,
            depth: m.depth,
            base_filters: m.base_filters,
            activation: m.activation,
            init_seed: m.init_seed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_round_trips_through_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("segmed.toml");
        let path = path.to_str().unwrap();
        let cfg = AppConfig::default();
        cfg.save(path).unwrap();
        assert_eq!(AppConfig::load(path).unwrap(), cfg);
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let cfg: AppConfig = toml::from_str(
            r#"
            [training]
            epochs = 3
            optimizer = "sgd"
            learning_rate = 0.05

            [model]
            depth = 2
            "#,
        )
        .unwrap();
        assert_eq!(cfg.training.epochs, 3);
        assert_eq!(cfg.training.batch_size, 16);
        assert_eq!(cfg.model.depth, 2);
        assert_eq!(cfg.model.base_filters, 16);

        let train = cfg.to_train_config().unwrap();
        assert_eq!(train.optimizer, OptimizerKind::Sgd { learning_rate: 0.05 });
        assert_eq!(train.monitor, "val_jaccard_index");
        assert_eq!(cfg.to_unet_config().depth, 2);
    }

    #[test]
    fn unknown_optimizer_is_a_config_error() {
        let mut cfg = AppConfig::default();
        cfg.training.optimizer = "rmsprop".into();
        assert!(matches!(cfg.to_train_config(), Err(SegError::Config(_))));
    }
}
