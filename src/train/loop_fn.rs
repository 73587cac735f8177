use std::sync::atomic::Ordering;
use std::time::Instant;

use crate::data::directory_iterator::Batch;
use crate::data::paired::PairedGenerator;
use crate::error::{Result, SegError};
use crate::loss::loss_type::LossType;
use crate::math::tensor::Tensor;
use crate::metrics::accumulator::{BatchLogs, MetricAccumulator};
use crate::metrics::segmentation::Metric;
use crate::network::unet::UNet;
use crate::optim::optimizer::Optimizer;
use crate::train::checkpoint::ModelCheckpoint;
use crate::train::epoch_stats::EpochStats;
use crate::train::history::{EpochLogs, History};
use crate::train::train_config::TrainConfig;

// ---------------------------------------------------------------------------
// Public entry points
// ---------------------------------------------------------------------------

/// Runs `config.epochs` epochs over the endless `train` flow and returns the
/// history of every completed epoch.
///
/// Each epoch draws `config.steps_per_epoch` batches from `train`, applying
/// one optimizer step per batch, then `config.validation_steps()` batches from
/// `val` (when present) without updates. Logs are recorded in the history and
/// handed to `checkpoint`.
///
/// # Early termination
/// The loop stops after the current epoch if:
/// - the `progress_tx` receiver has been dropped, **or**
/// - `config.stop_flag` is set to `true`.
#[allow(clippy::too_many_arguments)]
pub fn fit(
    model: &mut UNet,
    train: &mut PairedGenerator,
    mut val: Option<&mut PairedGenerator>,
    optimizer: &mut dyn Optimizer,
    loss: LossType,
    metrics: &[Metric],
    mut checkpoint: Option<&mut ModelCheckpoint>,
    config: &TrainConfig,
) -> Result<History> {
    config.validate()?;
    let mut history = History::new();

    log::info!(
        "Training {} parameters for {} epochs ({} steps/epoch, optimizer {}, lr {})",
        model.parameter_count(),
        config.epochs,
        config.steps_per_epoch,
        optimizer.name(),
        optimizer.learning_rate()
    );

    for epoch in 1..=config.epochs {
        if stop_requested(config) {
            log::info!("Stop requested, ending before epoch {epoch}");
            break;
        }

        let t_start = Instant::now();

        // ── Training pass ─────────────────────────────────────────────────
        let mut acc = MetricAccumulator::new(metrics);
        for step in 1..=config.steps_per_epoch {
            let (images, masks) = train.next_pair()?;
            let batch = train_on_batch(model, &images, &masks, optimizer, loss, metrics)?;
            log::debug!(
                "epoch {epoch} step {step}/{}: loss {:.5}",
                config.steps_per_epoch,
                batch.loss
            );
            acc.update(&batch);
        }
        let mut logs = acc.logs("");

        // ── Validation ────────────────────────────────────────────────────
        if let Some(val) = val.as_deref_mut() {
            let val_logs = evaluate(model, val, config.validation_steps(), loss, metrics)?;
            logs.extend(val_logs.into_iter().map(|(k, v)| (format!("val_{k}"), v)));
        }

        let elapsed_ms = t_start.elapsed().as_millis() as u64;
        log::info!("Epoch {epoch}/{} - {}ms - {}", config.epochs, elapsed_ms, format_logs(&logs));

        history.record(epoch, &logs);

        let saved = match checkpoint.as_deref_mut() {
            Some(ckpt) => ckpt.on_epoch_end(epoch, &logs, model)?,
            None => false,
        };

        // ── Emit progress ─────────────────────────────────────────────────
        if let Some(ref tx) = config.progress_tx {
            let stats = epoch_stats(epoch, config.epochs, &logs, saved, elapsed_ms);
            if tx.send(stats).is_err() {
                log::info!("Progress receiver dropped, stopping after epoch {epoch}");
                break;
            }
        }
    }

    Ok(history)
}

/// One optimizer step over a batch. Gradients are computed per sample and
/// averaged; metrics are computed over the whole batch at once.
pub fn train_on_batch(
    model: &mut UNet,
    images: &Batch,
    masks: &Batch,
    optimizer: &mut dyn Optimizer,
    loss: LossType,
    metrics: &[Metric],
) -> Result<BatchLogs> {
    check_batch(model, images, masks)?;

    let mut grads = model.zero_gradients();
    let mut total_loss = 0.0;
    let mut y_true = Vec::new();
    let mut y_pred = Vec::new();

    for (x, y) in images.samples.iter().zip(masks.samples.iter()) {
        let out = model.forward(x);
        total_loss += loss.loss(&out.data, &y.data);
        let delta = loss.derivative(&out.data, &y.data);
        let delta = Tensor::from_data(out.channels, out.height, out.width, delta);
        grads.accumulate(&model.backward(&delta));
        y_true.extend_from_slice(&y.data);
        y_pred.extend_from_slice(&out.data);
    }

    let n = images.len() as f64;
    grads.scale(1.0 / n);
    optimizer.step(model.parameters_mut(), &grads);

    Ok(BatchLogs {
        loss: total_loss / n,
        metrics: metrics.iter().map(|m| m.compute(&y_true, &y_pred)).collect(),
        samples: images.len(),
    })
}

/// Mean loss and metrics over `steps` batches of `generator`, with no weight
/// updates. Keys are unprefixed (`loss`, `jaccard_index`, ...).
pub fn evaluate(
    model: &mut UNet,
    generator: &mut PairedGenerator,
    steps: usize,
    loss: LossType,
    metrics: &[Metric],
) -> Result<EpochLogs> {
    if steps == 0 {
        return Err(SegError::InvalidArgument("evaluate needs at least one step".into()));
    }
    let mut acc = MetricAccumulator::new(metrics);
    for _ in 0..steps {
        let (images, masks) = generator.next_pair()?;
        acc.update(&test_on_batch(model, &images, &masks, loss, metrics)?);
    }
    Ok(acc.logs(""))
}

/// Loss and metrics for one batch without touching the weights.
pub fn test_on_batch(
    model: &mut UNet,
    images: &Batch,
    masks: &Batch,
    loss: LossType,
    metrics: &[Metric],
) -> Result<BatchLogs> {
    check_batch(model, images, masks)?;

    let mut total_loss = 0.0;
    let mut y_true = Vec::new();
    let mut y_pred = Vec::new();
    for (x, y) in images.samples.iter().zip(masks.samples.iter()) {
        let out = model.predict(x);
        total_loss += loss.loss(&out.data, &y.data);
        y_true.extend_from_slice(&y.data);
        y_pred.extend_from_slice(&out.data);
    }

    Ok(BatchLogs {
        loss: total_loss / images.len() as f64,
        metrics: metrics.iter().map(|m| m.compute(&y_true, &y_pred)).collect(),
        samples: images.len(),
    })
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn stop_requested(config: &TrainConfig) -> bool {
    config
        .stop_flag
        .as_ref()
        .is_some_and(|flag| flag.load(Ordering::Relaxed))
}

/// Rejects empty batches and input/target shapes the model cannot consume.
fn check_batch(model: &UNet, images: &Batch, masks: &Batch) -> Result<()> {
    if images.is_empty() || images.len() != masks.len() {
        return Err(SegError::Shape(format!(
            "batch holds {} images and {} masks",
            images.len(),
            masks.len()
        )));
    }
    let (h, w, c) = model
        .config
        .input_size
        .ok_or_else(|| SegError::Config("model has no input size".into()))?;
    let expected_out = (model.config.out_channels, h, w);
    for (x, y) in images.samples.iter().zip(masks.samples.iter()) {
        if x.shape() != (c, h, w) {
            return Err(SegError::Shape(format!(
                "image shape {:?} does not match model input {:?}",
                x.shape(),
                (c, h, w)
            )));
        }
        if y.shape() != expected_out {
            return Err(SegError::Shape(format!(
                "mask shape {:?} does not match model output {:?}",
                y.shape(),
                expected_out
            )));
        }
    }
    Ok(())
}

fn format_logs(logs: &EpochLogs) -> String {
    logs.iter()
        .map(|(k, v)| format!("{k}: {v:.4}"))
        .collect::<Vec<_>>()
        .join(" - ")
}

fn epoch_stats(epoch: usize, total_epochs: usize, logs: &EpochLogs, saved: bool, elapsed_ms: u64) -> EpochStats {
    let get = |key: &str| logs.get(key).copied();
    EpochStats {
        epoch,
        total_epochs,
        loss: get("loss").unwrap_or(f64::NAN),
        jaccard_index: get("jaccard_index").unwrap_or(f64::NAN),
        dice_coef: get("dice_coef").unwrap_or(f64::NAN),
        val_loss: get("val_loss"),
        val_jaccard_index: get("val_jaccard_index"),
        val_dice_coef: get("val_dice_coef"),
        saved,
        elapsed_ms,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::segmentation::SEGMENTATION_METRICS;
    use crate::network::spec::UNetConfig;
    use crate::optim::optimizer::OptimizerKind;

    fn tiny_model() -> UNet {
        UNetConfig {
            input_size: Some((4, 4, 1)),
            depth: 1,
            base_filters: 2,
            init_seed: Some(3),
            ..UNetConfig::default()
        }
        .collect()
        .unwrap()
    }

    fn batch(samples: Vec<Tensor>) -> Batch {
        let indices = (0..samples.len()).collect();
        Batch { samples, indices }
    }

    fn square_pair() -> (Batch, Batch) {
        let mut image = Tensor::zeros(1, 4, 4);
        let mut mask = Tensor::zeros(1, 4, 4);
        for y in 1..3 {
            for x in 1..3 {
                image.set(0, y, x, 1.0);
                mask.set(0, y, x, 1.0);
            }
        }
        (batch(vec![image]), batch(vec![mask]))
    }

    #[test]
    fn repeated_steps_reduce_loss_on_one_batch() {
        let mut model = tiny_model();
        let mut opt = OptimizerKind::default().with_learning_rate(1e-2).build();
        let (images, masks) = square_pair();
        let first = test_on_batch(&mut model, &images, &masks, LossType::BinaryCrossEntropy, &SEGMENTATION_METRICS)
            .unwrap()
            .loss;
        for _ in 0..50 {
            train_on_batch(&mut model, &images, &masks, opt.as_mut(), LossType::BinaryCrossEntropy, &SEGMENTATION_METRICS)
                .unwrap();
        }
        let last = test_on_batch(&mut model, &images, &masks, LossType::BinaryCrossEntropy, &SEGMENTATION_METRICS)
            .unwrap()
            .loss;
        assert!(last < first, "loss went from {first} to {last}");
    }

    #[test]
    fn test_on_batch_leaves_weights_alone() {
        let mut model = tiny_model();
        let before: Vec<Vec<f64>> = model.parameters().into_iter().cloned().collect();
        let (images, masks) = square_pair();
        test_on_batch(&mut model, &images, &masks, LossType::Dice, &SEGMENTATION_METRICS).unwrap();
        let after: Vec<Vec<f64>> = model.parameters().into_iter().cloned().collect();
        assert_eq!(before, after);
    }

    #[test]
    fn wrong_mask_shape_is_a_shape_error() {
        let mut model = tiny_model();
        let mut opt = OptimizerKind::default().build();
        let (images, _) = square_pair();
        let masks = batch(vec![Tensor::zeros(3, 4, 4)]);
        let err = train_on_batch(&mut model, &images, &masks, opt.as_mut(), LossType::Mse, &SEGMENTATION_METRICS);
        assert!(matches!(err, Err(SegError::Shape(_))));
    }

    #[test]
    fn epoch_stats_pull_values_from_logs() {
        let logs: EpochLogs = [("loss", 0.5), ("jaccard_index", 0.25), ("val_dice_coef", 0.75)]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        let stats = epoch_stats(2, 5, &logs, true, 10);
        assert_eq!(stats.loss, 0.5);
        assert_eq!(stats.jaccard_index, 0.25);
        assert!(stats.dice_coef.is_nan());
        assert_eq!(stats.val_dice_coef, Some(0.75));
        assert_eq!(stats.val_loss, None);
        assert!(stats.saved);
    }
}
