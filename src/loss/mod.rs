pub mod bce;
pub mod dice;
pub mod loss_type;
pub mod mse;

pub use bce::BceLoss;
pub use dice::DiceLoss;
pub use loss_type::LossType;
pub use mse::MseLoss;
