use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::network::metadata::ModelMetadata;
use crate::network::unet::UNet;
use crate::train::history::EpochLogs;

/// Direction in which the monitored quantity improves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointMode {
    Min,
    #[default]
    Max,
    /// `Min` for keys containing "loss", `Max` otherwise.
    Auto,
}

impl CheckpointMode {
    pub fn resolve(self, monitor: &str) -> CheckpointMode {
        match self {
            CheckpointMode::Auto if monitor.contains("loss") => CheckpointMode::Min,
            CheckpointMode::Auto => CheckpointMode::Max,
            other => other,
        }
    }
}

/// Writes the model to `filepath` at the end of an epoch, by default only
/// when the monitored value beats the best one seen so far.
#[derive(Debug, Clone)]
pub struct ModelCheckpoint {
    filepath: PathBuf,
    monitor: String,
    mode: CheckpointMode,
    save_best_only: bool,
    best: Option<f64>,
}

impl ModelCheckpoint {
    pub fn new(filepath: impl Into<PathBuf>, monitor: &str, mode: CheckpointMode, save_best_only: bool) -> Self {
        ModelCheckpoint {
            filepath: filepath.into(),
            monitor: monitor.to_string(),
            mode: mode.resolve(monitor),
            save_best_only,
            best: None,
        }
    }

    pub fn monitor(&self) -> &str {
        &self.monitor
    }

    /// Resolved mode; never `Auto`.
    pub fn mode(&self) -> CheckpointMode {
        self.mode
    }

    pub fn best(&self) -> Option<f64> {
        self.best
    }

    fn improves(&self, value: f64) -> bool {
        match self.best {
            None => true,
            Some(best) if self.mode == CheckpointMode::Min => value < best,
            Some(best) => value > best,
        }
    }

    /// Called once per epoch with that epoch's logs. Returns whether the
    /// model was written.
    pub fn on_epoch_end(&mut self, epoch: usize, logs: &EpochLogs, model: &UNet) -> Result<bool> {
        let value = logs.get(&self.monitor).copied();

        if self.save_best_only {
            let Some(value) = value else {
                log::warn!(
                    "Can save best model only with {} available, skipping (logged keys: {:?})",
                    self.monitor,
                    logs.keys().collect::<Vec<_>>()
                );
                return Ok(false);
            };
            if !value.is_finite() {
                log::warn!("Epoch {epoch}: {} is {value}, not saving", self.monitor);
                return Ok(false);
            }
            if !self.improves(value) {
                log::info!(
                    "Epoch {epoch}: {} did not improve from {:.5}",
                    self.monitor,
                    self.best.unwrap_or(f64::NAN)
                );
                return Ok(false);
            }
            match self.best {
                Some(best) => log::info!(
                    "Epoch {epoch}: {} improved from {best:.5} to {value:.5}, saving model to {}",
                    self.monitor,
                    self.filepath.display()
                ),
                None => log::info!(
                    "Epoch {epoch}: {} improved from {} to {value:.5}, saving model to {}",
                    self.monitor,
                    if self.mode == CheckpointMode::Min { "inf" } else { "-inf" },
                    self.filepath.display()
                ),
            }
            self.best = Some(value);
        } else {
            log::info!("Epoch {epoch}: saving model to {}", self.filepath.display());
        }

        let metadata = ModelMetadata {
            description: Some("U-Net segmentation checkpoint".to_string()),
            input_size: model.config.input_size,
            epoch: Some(epoch),
            monitor: Some(self.monitor.clone()),
            monitor_value: value,
        };
        model.save_json(&self.filepath, &metadata)?;
        Ok(true)
    }
}
