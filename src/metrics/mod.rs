pub mod accumulator;
pub mod segmentation;

pub use accumulator::{BatchLogs, MetricAccumulator};
pub use segmentation::{dice_coef, jaccard_index, Metric, SEGMENTATION_METRICS};
