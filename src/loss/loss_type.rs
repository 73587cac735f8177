use serde::{Serialize, Deserialize};

use crate::loss::{BceLoss, DiceLoss, MseLoss};

/// Selects which loss function the training loop uses.
///
/// - `BinaryCrossEntropy` — pixel-wise BCE against the sigmoid head; the default.
/// - `Mse`                — mean-squared error per pixel.
/// - `Dice`               — soft Dice loss over the whole mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LossType {
    #[default]
    BinaryCrossEntropy,
    Mse,
    Dice,
}

impl LossType {
    /// Scalar loss for one sample.
    pub fn loss(&self, predicted: &[f64], expected: &[f64]) -> f64 {
        match self {
            LossType::BinaryCrossEntropy => BceLoss::loss(predicted, expected),
            LossType::Mse                => MseLoss::loss(predicted, expected),
            LossType::Dice               => DiceLoss::loss(predicted, expected),
        }
    }

    /// ∂loss/∂predicted for one sample.
    pub fn derivative(&self, predicted: &[f64], expected: &[f64]) -> Vec<f64> {
        match self {
            LossType::BinaryCrossEntropy => BceLoss::derivative(predicted, expected),
            LossType::Mse                => MseLoss::derivative(predicted, expected),
            LossType::Dice               => DiceLoss::derivative(predicted, expected),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            LossType::BinaryCrossEntropy => "binary_crossentropy",
            LossType::Mse                => "mse",
            LossType::Dice               => "dice",
        }
    }
}
