use std::collections::BTreeMap;

use crate::metrics::segmentation::Metric;

/// Loss and metric values for one batch, in the order of the compiled metrics.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchLogs {
    pub loss: f64,
    pub metrics: Vec<f64>,
    /// Samples in the batch; the weight of its values in the epoch mean.
    pub samples: usize,
}

/// Sample-weighted running mean of per-batch loss and metric values over an
/// epoch, so the short last batch of a pass counts only for what it holds.
#[derive(Debug, Clone)]
pub struct MetricAccumulator {
    metrics: Vec<Metric>,
    loss_sum: f64,
    metric_sums: Vec<f64>,
    batches: usize,
    samples: usize,
}

impl MetricAccumulator {
    pub fn new(metrics: &[Metric]) -> Self {
        MetricAccumulator {
            metrics: metrics.to_vec(),
            loss_sum: 0.0,
            metric_sums: vec![0.0; metrics.len()],
            batches: 0,
            samples: 0,
        }
    }

    pub fn update(&mut self, batch: &BatchLogs) {
        assert_eq!(batch.metrics.len(), self.metrics.len(), "metric count mismatch");
        let weight = batch.samples as f64;
        self.loss_sum += batch.loss * weight;
        for (sum, v) in self.metric_sums.iter_mut().zip(batch.metrics.iter()) {
            *sum += v * weight;
        }
        self.batches += 1;
        self.samples += batch.samples;
    }

    pub fn batches(&self) -> usize {
        self.batches
    }

    pub fn samples(&self) -> usize {
        self.samples
    }

    /// Mean values keyed by `prefix + name` (`"loss"`, `"val_dice_coef"`, ...).
    pub fn logs(&self, prefix: &str) -> BTreeMap<String, f64> {
        let n = self.samples.max(1) as f64;
        let mut out = BTreeMap::new();
        out.insert(format!("{prefix}loss"), self.loss_sum / n);
        for (metric, sum) in self.metrics.iter().zip(self.metric_sums.iter()) {
            out.insert(format!("{prefix}{}", metric.name()), sum / n);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::segmentation::SEGMENTATION_METRICS;

    #[test]
    fn averages_over_batches_with_prefix() {
        let mut acc = MetricAccumulator::new(&SEGMENTATION_METRICS);
        acc.update(&BatchLogs { loss: 1.0, metrics: vec![0.2, 0.4], samples: 2 });
        acc.update(&BatchLogs { loss: 0.5, metrics: vec![0.4, 0.6], samples: 2 });
        let logs = acc.logs("val_");
        assert_eq!(logs["val_loss"], 0.75);
        assert!((logs["val_jaccard_index"] - 0.3).abs() < 1e-12);
        assert!((logs["val_dice_coef"] - 0.5).abs() < 1e-12);
        assert_eq!(acc.batches(), 2);
    }

    #[test]
    fn short_batches_weigh_by_sample_count() {
        let mut acc = MetricAccumulator::new(&SEGMENTATION_METRICS);
        acc.update(&BatchLogs { loss: 0.2, metrics: vec![0.6, 0.8], samples: 3 });
        acc.update(&BatchLogs { loss: 1.0, metrics: vec![0.2, 0.4], samples: 1 });
        let logs = acc.logs("");
        assert!((logs["loss"] - 0.4).abs() < 1e-12);
        assert!((logs["jaccard_index"] - 0.5).abs() < 1e-12);
        assert!((logs["dice_coef"] - 0.7).abs() < 1e-12);
        assert_eq!(acc.samples(), 4);
    }
}
