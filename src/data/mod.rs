pub mod codec;
pub mod directory_iterator;
pub mod image_gen;
pub mod paired;
pub mod preview;

pub use codec::ColorMode;
pub use directory_iterator::{Batch, DirectoryIterator};
pub use image_gen::{DataGenConfig, FlowOptions, ImageDataGenerator, Subset};
pub use paired::PairedGenerator;
