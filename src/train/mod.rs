pub mod checkpoint;
pub mod epoch_stats;
pub mod history;
pub mod loop_fn;
pub mod train_config;
pub mod trainer;

pub use checkpoint::{CheckpointMode, ModelCheckpoint};
pub use epoch_stats::EpochStats;
pub use history::{EpochLogs, History};
pub use loop_fn::{evaluate, fit, test_on_batch, train_on_batch};
pub use train_config::TrainConfig;
pub use trainer::train_unet;
