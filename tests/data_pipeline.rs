mod common;

use std::collections::BTreeSet;

use segmed::data::{ColorMode, DataGenConfig, FlowOptions, ImageDataGenerator, PairedGenerator, Subset};

fn flows(
    images: &std::path::Path,
    masks: &std::path::Path,
    config: DataGenConfig,
    subset: Subset,
    batch_size: usize,
) -> PairedGenerator {
    let datagen = ImageDataGenerator::new(config).unwrap();
    let options = |color_mode| FlowOptions {
        color_mode,
        target_size: (6, 6),
        batch_size,
        seed: 42,
        subset,
        shuffle: true,
    };
    PairedGenerator::new(
        datagen.flow_from_directory(images, options(ColorMode::Rgb)).unwrap(),
        datagen.flow_from_directory(masks, options(ColorMode::Grayscale)).unwrap(),
    )
    .unwrap()
}

#[test]
fn shuffled_and_flipped_pairs_stay_aligned() {
    let dir = tempfile::tempdir().unwrap();
    let (images, masks) = common::mirrored_dataset(dir.path(), 7, 6);
    let config = DataGenConfig {
        rescale: 1.0 / 255.0,
        validation_split: 0.0,
        horizontal_flip: true,
        vertical_flip: true,
    };
    let mut pairs = flows(&images, &masks, config, Subset::All, 3);

    for _ in 0..8 {
        let (x, y) = pairs.next_pair().unwrap();
        assert_eq!(x.indices, y.indices);
        for (image, mask) in x.samples.iter().zip(y.samples.iter()) {
            assert_eq!(image.shape(), (3, 6, 6));
            assert_eq!(mask.shape(), (1, 6, 6));
            assert_eq!(image.split_channels(1).0, *mask);
        }
    }
}

#[test]
fn every_pass_visits_each_sample_once() {
    let dir = tempfile::tempdir().unwrap();
    let (images, masks) = common::mirrored_dataset(dir.path(), 7, 6);
    let mut pairs = flows(&images, &masks, DataGenConfig::default(), Subset::All, 3);
    assert_eq!(pairs.batches_per_pass(), 3);

    for _ in 0..2 {
        let mut seen = BTreeSet::new();
        let mut sizes = Vec::new();
        for _ in 0..pairs.batches_per_pass() {
            let (x, _) = pairs.next_pair().unwrap();
            sizes.push(x.len());
            seen.extend(x.indices);
        }
        assert_eq!(sizes, vec![3, 3, 1]);
        assert_eq!(seen, (0..7).collect());
    }
}

#[test]
fn validation_subset_takes_the_head_of_each_class() {
    let dir = tempfile::tempdir().unwrap();
    let (images, masks) = common::mirrored_dataset(dir.path(), 10, 6);
    let config = DataGenConfig { validation_split: 0.3, ..DataGenConfig::default() };

    let train = flows(&images, &masks, config.clone(), Subset::Training, 4);
    let val = flows(&images, &masks, config, Subset::Validation, 4);
    assert_eq!(train.len(), 7);
    assert_eq!(val.len(), 3);

    let names = |paths: &[std::path::PathBuf]| {
        paths
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
    };
    assert_eq!(names(val.images().filenames()), vec!["sample_000.png", "sample_001.png", "sample_002.png"]);
    assert_eq!(names(train.masks().filenames())[0], "sample_003.png");
}

#[test]
fn stray_files_are_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let (images, masks) = common::mirrored_dataset(dir.path(), 4, 6);
    std::fs::write(images.join("all").join("notes.txt"), "not an image").unwrap();
    std::fs::write(images.join("all").join(".hidden.png"), "").unwrap();
    std::fs::copy(
        images.join("all").join("sample_000.png"),
        images.join("top_level.png"),
    )
    .unwrap();

    let pairs = flows(&images, &masks, DataGenConfig::default(), Subset::All, 2);
    assert_eq!(pairs.len(), 4);
}
