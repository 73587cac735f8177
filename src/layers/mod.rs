pub mod conv2d;
pub mod conv_transpose;
pub mod max_pool;

pub use conv2d::Conv2d;
pub use conv_transpose::ConvTranspose2d;
pub use max_pool::MaxPool2d;

/// Parameter gradients produced by one layer's backward pass.
#[derive(Debug, Clone)]
pub struct LayerGrads {
    pub weights: Vec<f64>,
    pub biases: Vec<f64>,
}
