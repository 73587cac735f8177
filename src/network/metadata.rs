use serde::{Deserialize, Serialize};

use crate::network::unet::UNet;

/// Annotations stored next to the weights in a checkpoint file.
/// All fields are optional so hand-written checkpoints still load.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ModelMetadata {
    pub description: Option<String>,
    /// `(height, width, channels)` the network was built for.
    pub input_size: Option<(usize, usize, usize)>,
    /// 1-based epoch at which the checkpoint was written.
    pub epoch: Option<usize>,
    /// Name and value of the monitored quantity at save time.
    pub monitor: Option<String>,
    pub monitor_value: Option<f64>,
}

/// On-disk checkpoint layout.
#[derive(Debug, Serialize, Deserialize)]
pub struct SavedModel {
    #[serde(default)]
    pub metadata: ModelMetadata,
    pub model: UNet,
}

/// Borrowing twin of `SavedModel` so saving does not clone the weights.
#[derive(Serialize)]
pub(crate) struct SavedModelRef<'a> {
    pub metadata: &'a ModelMetadata,
    pub model: &'a UNet,
}
