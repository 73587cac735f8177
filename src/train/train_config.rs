use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::{Arc, atomic::AtomicBool};

use crate::error::{Result, SegError};
use crate::loss::loss_type::LossType;
use crate::optim::optimizer::OptimizerKind;
use crate::train::checkpoint::CheckpointMode;
use crate::train::epoch_stats::EpochStats;

/// Configuration for a `train_unet` run.
///
/// # Fields
/// - `batch_size`        — samples per mini-batch
/// - `epochs`            — number of epochs
/// - `steps_per_epoch`   — training batches drawn per epoch; the data flow is
///                         endless, so this may exceed one pass over the files
/// - `validation_steps`  — validation batches per epoch; `None` reuses
///                         `steps_per_epoch`
/// - `val_split`         — fraction of each directory held out, in [0, 1)
/// - `optimizer`         — optimizer family and hyperparameters
/// - `loss`              — training loss
/// - `monitor`           — history key watched by the checkpoint
/// - `checkpoint_mode`   — whether larger or smaller `monitor` is better
/// - `model_file`        — where the best model is written
/// - `seed`              — seed shared by the image and mask flows
/// - `show`              — write a preview of the first training pair into
///                         `preview_dir` before training
/// - `target_size`       — `(height, width)` every image and mask is resized to
/// - `progress_tx`       — optional channel; one `EpochStats` per epoch. If the
///                         receiver is dropped the loop stops early.
/// - `stop_flag`         — optional atomic flag; when set the loop stops after
///                         the current epoch.
#[derive(Debug, Clone)]
pub struct TrainConfig {
    pub batch_size: usize,
    pub epochs: usize,
    pub steps_per_epoch: usize,
    pub validation_steps: Option<usize>,
    pub val_split: f64,
    pub optimizer: OptimizerKind,
    pub loss: LossType,
    pub monitor: String,
    pub checkpoint_mode: CheckpointMode,
    pub model_file: PathBuf,
    pub seed: u64,
    pub show: bool,
    pub preview_dir: PathBuf,
    pub target_size: (u32, u32),
    pub horizontal_flip: bool,
    pub vertical_flip: bool,
    pub progress_tx: Option<mpsc::Sender<EpochStats>>,
    pub stop_flag: Option<Arc<AtomicBool>>,
}

impl Default for TrainConfig {
    fn default() -> Self {
        TrainConfig {
            batch_size: 16,
            epochs: 25,
            steps_per_epoch: 3125,
            validation_steps: None,
            val_split: 0.2,
            optimizer: OptimizerKind::default(),
            loss: LossType::BinaryCrossEntropy,
            monitor: "val_jaccard_index".to_string(),
            checkpoint_mode: CheckpointMode::Max,
            model_file: PathBuf::from("unet.json"),
            seed: 1,
            show: false,
            preview_dir: PathBuf::from("."),
            target_size: (256, 256),
            horizontal_flip: false,
            vertical_flip: false,
            progress_tx: None,
            stop_flag: None,
        }
    }
}

impl TrainConfig {
    pub fn validation_steps(&self) -> usize {
        self.validation_steps.unwrap_or(self.steps_per_epoch)
    }

    /// Whether a validation flow is built at all.
    pub fn has_validation(&self) -> bool {
        self.val_split > 0.0
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(SegError::InvalidArgument("batch_size must be at least 1".into()));
        }
        if self.epochs == 0 {
            return Err(SegError::InvalidArgument("epochs must be at least 1".into()));
        }
        if self.steps_per_epoch == 0 {
            return Err(SegError::InvalidArgument("steps_per_epoch must be at least 1".into()));
        }
        if self.has_validation() && self.validation_steps() == 0 {
            return Err(SegError::InvalidArgument("validation_steps must be at least 1".into()));
        }
        if !(0.0..1.0).contains(&self.val_split) {
            return Err(SegError::InvalidArgument(format!(
                "val_split must be in [0, 1), got {}",
                self.val_split
            )));
        }
        if self.optimizer.learning_rate() <= 0.0 {
            return Err(SegError::InvalidArgument("learning rate must be positive".into()));
        }
        if self.monitor.is_empty() {
            return Err(SegError::InvalidArgument("monitor must name a history key".into()));
        }
        Ok(())
    }
}
