use serde::{Serialize, Deserialize};

/// Per-epoch training statistics emitted by `fit`.
///
/// When a `progress_tx` channel is configured in `TrainConfig`, the loop sends
/// one `EpochStats` at the end of every completed epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochStats {
    /// 1-based epoch number.
    pub epoch: usize,
    pub total_epochs: usize,
    /// Mean training loss over the epoch's batches.
    pub loss: f64,
    pub jaccard_index: f64,
    pub dice_coef: f64,
    /// Validation values; `None` when no validation flow exists.
    pub val_loss: Option<f64>,
    pub val_jaccard_index: Option<f64>,
    pub val_dice_coef: Option<f64>,
    /// Whether the checkpoint was written at the end of this epoch.
    pub saved: bool,
    /// Wall-clock duration of the epoch in milliseconds.
    pub elapsed_ms: u64,
}
