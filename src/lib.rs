pub mod error;
pub mod config;
pub mod math;
pub mod activation;
pub mod layers;
pub mod network;
pub mod loss;
pub mod metrics;
pub mod optim;
pub mod data;
pub mod train;

// Convenience re-exports
pub use error::{Result, SegError};
pub use config::AppConfig;
pub use math::tensor::Tensor;
pub use activation::activation::ActivationFunction;
pub use network::{UNet, UNetConfig};
pub use loss::loss_type::LossType;
pub use metrics::segmentation::{dice_coef, jaccard_index, Metric};
pub use optim::optimizer::{Optimizer, OptimizerKind};
pub use data::{ImageDataGenerator, PairedGenerator};
pub use train::{train_unet, History, TrainConfig};
