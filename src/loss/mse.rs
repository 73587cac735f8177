/// Pixel-wise squared error between a predicted probability map and its mask.
pub struct MseLoss;

impl MseLoss {
    /// mean((p - y)²) over every pixel of the map.
    pub fn loss(predicted: &[f64], expected: &[f64]) -> f64 {
        debug_assert_eq!(predicted.len(), expected.len());
        let sum_sq: f64 = predicted.iter().zip(expected)
            .map(|(p, y)| (p - y) * (p - y))
            .sum();
        sum_sq / predicted.len().max(1) as f64
    }

    /// ∂/∂p of the mean: 2·(p - y) / n
    pub fn derivative(predicted: &[f64], expected: &[f64]) -> Vec<f64> {
        let scale = 2.0 / predicted.len().max(1) as f64;
        predicted.iter().zip(expected)
            .map(|(p, y)| scale * (p - y))
            .collect()
    }
}
