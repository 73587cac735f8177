use serde::{Deserialize, Serialize};

/// Additive smoothing for the overlap metrics; keeps them defined (and equal
/// to 1) when both masks are empty.
pub const SMOOTH: f64 = 1.0;

/// Intersection over union of two soft masks:
///   (Σ y·ŷ + s) / (Σ y + Σ ŷ - Σ y·ŷ + s)
pub fn jaccard_index(y_true: &[f64], y_pred: &[f64]) -> f64 {
    let (intersection, sum_true, sum_pred) = overlap(y_true, y_pred);
    (intersection + SMOOTH) / (sum_true + sum_pred - intersection + SMOOTH)
}

/// Sørensen-Dice coefficient of two soft masks:
///   (2·Σ y·ŷ + s) / (Σ y + Σ ŷ + s)
pub fn dice_coef(y_true: &[f64], y_pred: &[f64]) -> f64 {
    let (intersection, sum_true, sum_pred) = overlap(y_true, y_pred);
    (2.0 * intersection + SMOOTH) / (sum_true + sum_pred + SMOOTH)
}

fn overlap(y_true: &[f64], y_pred: &[f64]) -> (f64, f64, f64) {
    assert_eq!(y_true.len(), y_pred.len(), "mask lengths differ");
    y_true
        .iter()
        .zip(y_pred.iter())
        .fold((0.0, 0.0, 0.0), |(i, t, p), (&y, &yh)| (i + y * yh, t + y, p + yh))
}

/// Evaluation metric attached to a training run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    JaccardIndex,
    DiceCoef,
}

impl Metric {
    /// Key used in logs and in the training history.
    pub fn name(&self) -> &'static str {
        match self {
            Metric::JaccardIndex => "jaccard_index",
            Metric::DiceCoef => "dice_coef",
        }
    }

    pub fn compute(&self, y_true: &[f64], y_pred: &[f64]) -> f64 {
        match self {
            Metric::JaccardIndex => jaccard_index(y_true, y_pred),
            Metric::DiceCoef => dice_coef(y_true, y_pred),
        }
    }
}

/// The metrics every segmentation run is compiled with.
pub const SEGMENTATION_METRICS: [Metric; 2] = [Metric::JaccardIndex, Metric::DiceCoef];
