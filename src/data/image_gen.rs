use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::data::codec::ColorMode;
use crate::data::directory_iterator::DirectoryIterator;
use crate::error::{Result, SegError};

/// File extensions picked up by `flow_from_directory` (compared case-insensitively).
pub const IMAGE_EXTENSIONS: [&str; 7] = ["png", "jpg", "jpeg", "bmp", "ppm", "tif", "tiff"];

/// Per-pixel transformations and the train/validation split shared by every
/// flow created from one generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataGenConfig {
    /// Multiplier applied to raw 0..=255 pixel values.
    pub rescale: f64,
    /// Fraction of every class directory reserved for validation, in [0, 1).
    pub validation_split: f64,
    pub horizontal_flip: bool,
    pub vertical_flip: bool,
}

impl Default for DataGenConfig {
    fn default() -> Self {
        DataGenConfig {
            rescale: 1.0,
            validation_split: 0.0,
            horizontal_flip: false,
            vertical_flip: false,
        }
    }
}

/// Which part of the split a flow reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Subset {
    Training,
    Validation,
    All,
}

/// Options for one directory flow.
#[derive(Debug, Clone)]
pub struct FlowOptions {
    pub color_mode: ColorMode,
    /// `(height, width)` every image is resized to.
    pub target_size: (u32, u32),
    pub batch_size: usize,
    pub seed: u64,
    pub subset: Subset,
    pub shuffle: bool,
}

impl Default for FlowOptions {
    fn default() -> Self {
        FlowOptions {
            color_mode: ColorMode::Rgb,
            target_size: (256, 256),
            batch_size: 32,
            seed: 0,
            subset: Subset::All,
            shuffle: true,
        }
    }
}

/// Builds batch iterators over image directories.
///
/// Directories follow the `root/<class>/<image files>` convention: only
/// files inside sub-directories of `root` are read, class directories and
/// the files in each are visited in name order, so two directories with
/// matching layouts yield matching sample orders.
#[derive(Debug, Clone)]
pub struct ImageDataGenerator {
    config: DataGenConfig,
}

impl ImageDataGenerator {
    pub fn new(config: DataGenConfig) -> Result<Self> {
        if !(0.0..1.0).contains(&config.validation_split) {
            return Err(SegError::InvalidArgument(format!(
                "validation_split must be in [0, 1), got {}",
                config.validation_split
            )));
        }
        if !config.rescale.is_finite() || config.rescale <= 0.0 {
            return Err(SegError::InvalidArgument(format!(
                "rescale must be a positive number, got {}",
                config.rescale
            )));
        }
        Ok(ImageDataGenerator { config })
    }

    pub fn config(&self) -> &DataGenConfig {
        &self.config
    }

    /// Lists the files of `dir` that belong to `subset`.
    ///
    /// For every class directory with `n` files the first
    /// `floor(validation_split · n)` form the validation subset and the rest
    /// the training subset.
    pub fn list_files(&self, dir: &Path, subset: Subset) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for class_dir in sorted_entries(dir)?.into_iter().filter(|p| p.is_dir()) {
            let class_files: Vec<PathBuf> = sorted_entries(&class_dir)?
                .into_iter()
                .filter(|p| p.is_file() && is_image_file(p))
                .collect();
            let n = class_files.len();
            let cut = (self.config.validation_split * n as f64).floor() as usize;
            let range = match subset {
                Subset::Training => cut..n,
                Subset::Validation => 0..cut,
                Subset::All => 0..n,
            };
            files.extend_from_slice(&class_files[range]);
        }
        Ok(files)
    }

    /// Creates an endless batch iterator over the images of `dir`.
    pub fn flow_from_directory(&self, dir: impl AsRef<Path>, options: FlowOptions) -> Result<DirectoryIterator> {
        let dir = dir.as_ref();
        if options.batch_size == 0 {
            return Err(SegError::InvalidArgument("batch_size must be at least 1".into()));
        }
        if options.target_size.0 == 0 || options.target_size.1 == 0 {
            return Err(SegError::InvalidArgument("target_size must be non-zero".into()));
        }
        let files = self.list_files(dir, options.subset)?;
        if files.is_empty() {
            return Err(SegError::EmptyDirectory { path: dir.to_path_buf() });
        }
        log::info!(
            "Found {} images under {} ({:?} subset)",
            files.len(),
            dir.display(),
            options.subset
        );
        Ok(DirectoryIterator::new(files, &self.config, options))
    }
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| SegError::io(dir, e))? {
        let path = entry.map_err(|e| SegError::io(dir, e))?.path();
        let hidden = path
            .file_name()
            .and_then(|n| n.to_str())
            .map_or(false, |n| n.starts_with('.'));
        if !hidden {
            entries.push(path);
        }
    }
    entries.sort();
    Ok(entries)
}

fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .map_or(false, |e| IMAGE_EXTENSIONS.contains(&e.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch_images(dir: &Path, class: &str, names: &[&str]) {
        let class_dir = dir.join(class);
        fs::create_dir_all(&class_dir).unwrap();
        for name in names {
            image::GrayImage::new(2, 2).save(class_dir.join(name)).unwrap();
        }
    }

    #[test]
    fn split_takes_leading_files_for_validation() {
        let tmp = tempfile::tempdir().unwrap();
        touch_images(tmp.path(), "a", &["3.png", "1.png", "2.png", "4.png", "5.png"]);
        let gen = ImageDataGenerator::new(DataGenConfig { validation_split: 0.4, ..Default::default() }).unwrap();

        let names = |subset| {
            gen.list_files(tmp.path(), subset)
                .unwrap()
                .iter()
                .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
        };
        assert_eq!(names(Subset::Validation), vec!["1.png", "2.png"]);
        assert_eq!(names(Subset::Training), vec!["3.png", "4.png", "5.png"]);
        assert_eq!(names(Subset::All).len(), 5);
    }

    #[test]
    fn ignores_top_level_files_hidden_files_and_other_extensions() {
        let tmp = tempfile::tempdir().unwrap();
        touch_images(tmp.path(), "cls", &["a.PNG", "b.jpg"]);
        fs::write(tmp.path().join("cls").join("notes.txt"), "x").unwrap();
        fs::write(tmp.path().join("cls").join(".hidden.png"), "x").unwrap();
        image::GrayImage::new(2, 2).save(tmp.path().join("top.png")).unwrap();

        let gen = ImageDataGenerator::new(DataGenConfig::default()).unwrap();
        assert_eq!(gen.list_files(tmp.path(), Subset::All).unwrap().len(), 2);
    }

    #[test]
    fn empty_flow_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("empty_class")).unwrap();
        let gen = ImageDataGenerator::new(DataGenConfig::default()).unwrap();
        let err = gen.flow_from_directory(tmp.path(), FlowOptions::default()).unwrap_err();
        assert!(matches!(err, SegError::EmptyDirectory { .. }));
    }

    #[test]
    fn rejects_out_of_range_split() {
        let bad = DataGenConfig { validation_split: 1.0, ..Default::default() };
        assert!(ImageDataGenerator::new(bad).is_err());
    }
}
