pub mod gradients;
pub mod metadata;
pub mod spec;
pub mod unet;

pub use gradients::Gradients;
pub use metadata::{ModelMetadata, SavedModel};
pub use spec::UNetConfig;
pub use unet::UNet;
