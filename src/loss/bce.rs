/// Binary cross-entropy over a flattened probability map.
pub struct BceLoss;

/// Probabilities are clamped to [EPS, 1 - EPS] before taking logs.
const EPS: f64 = 1e-7;

impl BceLoss {
    /// Scalar BCE: -mean(y·log(p) + (1-y)·log(1-p))
    pub fn loss(predicted: &[f64], expected: &[f64]) -> f64 {
        let n = predicted.len() as f64;
        predicted.iter().zip(expected.iter())
            .map(|(p, y)| {
                let p = p.clamp(EPS, 1.0 - EPS);
                -(y * p.ln() + (1.0 - y) * (1.0 - p).ln())
            })
            .sum::<f64>() / n
    }

    /// Per-output gradient of the mean: (p - y) / (p · (1 - p) · n)
    pub fn derivative(predicted: &[f64], expected: &[f64]) -> Vec<f64> {
        let n = predicted.len() as f64;
        predicted.iter().zip(expected.iter())
            .map(|(p, y)| {
                let p = p.clamp(EPS, 1.0 - EPS);
                (p - y) / (p * (1.0 - p) * n)
            })
            .collect()
    }
}
