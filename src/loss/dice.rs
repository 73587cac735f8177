use crate::metrics::segmentation::SMOOTH;

/// Soft Dice loss: 1 - dice_coef, differentiable in the predicted map.
pub struct DiceLoss;

impl DiceLoss {
    pub fn loss(predicted: &[f64], expected: &[f64]) -> f64 {
        1.0 - crate::metrics::segmentation::dice_coef(expected, predicted)
    }

    /// With I = Σ y·p and S = Σ y + Σ p:
    ///   ∂L/∂p_i = -(2·y_i·(S + s) - (2·I + s)) / (S + s)²
    pub fn derivative(predicted: &[f64], expected: &[f64]) -> Vec<f64> {
        let intersection: f64 = predicted.iter().zip(expected.iter()).map(|(p, y)| p * y).sum();
        let total: f64 = predicted.iter().sum::<f64>() + expected.iter().sum::<f64>();
        let denom = total + SMOOTH;
        let numer = 2.0 * intersection + SMOOTH;
        expected.iter()
            .map(|y| -(2.0 * y * denom - numer) / (denom * denom))
            .collect()
    }
}
