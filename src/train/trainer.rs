use std::path::Path;

use crate::data::codec::ColorMode;
use crate::data::image_gen::{DataGenConfig, FlowOptions, ImageDataGenerator, Subset};
use crate::data::paired::PairedGenerator;
use crate::data::preview;
use crate::error::{Result, SegError};
use crate::metrics::segmentation::SEGMENTATION_METRICS;
use crate::network::spec::UNetConfig;
use crate::train::checkpoint::ModelCheckpoint;
use crate::train::history::History;
use crate::train::loop_fn::fit;
use crate::train::train_config::TrainConfig;

/// Pixel values are read as 0..=255 and scaled into [0, 1].
pub const RESCALE: f64 = 1.0 / 255.0;

/// Trains a U-Net on the image/mask directory pair and returns its history.
///
/// `img_path` and `mask_path` must follow the `root/<class>/<files>` layout
/// with one mask per image in the same sorted order. Images are read as RGB
/// and masks as grayscale; both are scaled by `RESCALE` and split with
/// `config.val_split`. The input size of `segmodel` is taken from the image
/// flow, so any value it carries is overwritten. Without an explicit
/// `init_seed` the weights are seeded from `config.seed`, so a fixed seed
/// reproduces the whole run.
///
/// The best model by `config.monitor` is written to `config.model_file`.
pub fn train_unet(
    mut segmodel: UNetConfig,
    img_path: impl AsRef<Path>,
    mask_path: impl AsRef<Path>,
    config: &TrainConfig,
) -> Result<History> {
    let (img_path, mask_path) = (img_path.as_ref(), mask_path.as_ref());
    config.validate()?;

    if segmodel.out_channels != ColorMode::Grayscale.channels() {
        return Err(SegError::Config(format!(
            "masks are read as single-channel images but the model predicts {} channels",
            segmodel.out_channels
        )));
    }

    let data_config = DataGenConfig {
        rescale: RESCALE,
        validation_split: config.val_split,
        horizontal_flip: config.horizontal_flip,
        vertical_flip: config.vertical_flip,
    };
    let image_datagen = ImageDataGenerator::new(data_config.clone())?;
    let mask_datagen = ImageDataGenerator::new(data_config)?;

    let flow = |datagen: &ImageDataGenerator, dir: &Path, color_mode: ColorMode, subset: Subset| {
        datagen.flow_from_directory(
            dir,
            FlowOptions {
                color_mode,
                target_size: config.target_size,
                batch_size: config.batch_size,
                seed: config.seed,
                subset,
                shuffle: true,
            },
        )
    };
    let pair = |subset: Subset| -> Result<PairedGenerator> {
        PairedGenerator::new(
            flow(&image_datagen, img_path, ColorMode::Rgb, subset)?,
            flow(&mask_datagen, mask_path, ColorMode::Grayscale, subset)?,
        )
    };

    let mut train_generator = pair(Subset::Training)?;
    let mut val_generator = if config.has_validation() {
        Some(pair(Subset::Validation)?)
    } else {
        None
    };
    log::info!(
        "{} training pairs, {} validation pairs",
        train_generator.len(),
        val_generator.as_ref().map_or(0, |g| g.len())
    );

    if config.show {
        // A clone keeps the training flow at its first batch.
        let (images, masks) = train_generator.clone().next_pair()?;
        preview::save_pair(&images, &masks, &config.preview_dir)?;
    }

    segmodel.input_size = Some(train_generator.images().sample_shape());
    segmodel.init_seed.get_or_insert(config.seed);
    let mut model = segmodel.collect()?;

    let mut checkpoint = ModelCheckpoint::new(
        &config.model_file,
        &config.monitor,
        config.checkpoint_mode,
        true,
    );
    let mut optimizer = config.optimizer.build();

    fit(
        &mut model,
        &mut train_generator,
        val_generator.as_mut(),
        optimizer.as_mut(),
        config.loss,
        &SEGMENTATION_METRICS,
        Some(&mut checkpoint),
        config,
    )
}
