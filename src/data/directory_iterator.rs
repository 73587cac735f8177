use std::path::PathBuf;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::data::codec::{load_tensor, ColorMode};
use crate::data::image_gen::{DataGenConfig, FlowOptions};
use crate::error::Result;
use crate::math::tensor::Tensor;

/// One batch of decoded samples plus their positions in the file list.
#[derive(Debug, Clone)]
pub struct Batch {
    pub samples: Vec<Tensor>,
    pub indices: Vec<usize>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Endless batch iterator over a fixed list of image files.
///
/// Each pass over the files visits every sample once; the final batch of a
/// pass may be short. With shuffling on, the order of a pass is drawn from
/// an RNG seeded with `seed + batches_seen`, and random flips are drawn per
/// sample from `(seed, pass, index)`. Two iterators built with the same seed
/// over the same number of files therefore produce identical orders and
/// identical flips, which is what keeps image and mask streams paired.
#[derive(Debug, Clone)]
pub struct DirectoryIterator {
    files: Vec<PathBuf>,
    color_mode: ColorMode,
    target_size: (u32, u32),
    rescale: f64,
    horizontal_flip: bool,
    vertical_flip: bool,
    batch_size: usize,
    seed: u64,
    shuffle: bool,
    index_array: Vec<usize>,
    batch_index: usize,
    batches_seen: u64,
    pass: u64,
}

impl DirectoryIterator {
    pub(crate) fn new(files: Vec<PathBuf>, config: &DataGenConfig, options: FlowOptions) -> Self {
        DirectoryIterator {
            files,
            color_mode: options.color_mode,
            target_size: options.target_size,
            rescale: config.rescale,
            horizontal_flip: config.horizontal_flip,
            vertical_flip: config.vertical_flip,
            batch_size: options.batch_size,
            seed: options.seed,
            shuffle: options.shuffle,
            index_array: Vec::new(),
            batch_index: 0,
            batches_seen: 0,
            pass: 0,
        }
    }

    /// Number of samples in one pass.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn batches_per_pass(&self) -> usize {
        self.files.len().div_ceil(self.batch_size)
    }

    pub fn filenames(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn color_mode(&self) -> ColorMode {
        self.color_mode
    }

    /// `(height, width, channels)` of every sample this iterator yields.
    pub fn sample_shape(&self) -> (usize, usize, usize) {
        (
            self.target_size.0 as usize,
            self.target_size.1 as usize,
            self.color_mode.channels(),
        )
    }

    /// Restarts at the beginning of a pass; the batch counter keeps running
    /// so the next order is freshly drawn.
    pub fn reset(&mut self) {
        self.batch_index = 0;
    }

    fn set_index_array(&mut self) {
        self.index_array = (0..self.files.len()).collect();
        if self.shuffle {
            let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(self.batches_seen));
            self.index_array.shuffle(&mut rng);
        }
    }

    /// Decodes and returns the next batch.
    pub fn next_batch(&mut self) -> Result<Batch> {
        if self.batch_index == 0 {
            self.set_index_array();
        }
        let pass = self.pass;
        let start = self.batch_index * self.batch_size;
        let end = start.saturating_add(self.batch_size).min(self.files.len());
        let indices = self.index_array[start..end].to_vec();

        self.batch_index += 1;
        self.batches_seen += 1;
        if self.batch_index >= self.batches_per_pass() {
            self.batch_index = 0;
            self.pass += 1;
        }

        let mut samples = Vec::with_capacity(indices.len());
        for &idx in &indices {
            samples.push(self.load_sample(idx, pass)?);
        }
        Ok(Batch { samples, indices })
    }

    fn load_sample(&self, idx: usize, pass: u64) -> Result<Tensor> {
        let mut t = load_tensor(&self.files[idx], self.color_mode, self.target_size, self.rescale)?;
        if self.horizontal_flip || self.vertical_flip {
            let mut rng = StdRng::seed_from_u64(
                self.seed
                    .wrapping_mul(0x9E37_79B9_7F4A_7C15)
                    .wrapping_add(pass << 32)
                    .wrapping_add(idx as u64),
            );
            if self.horizontal_flip && rng.gen_bool(0.5) {
                t = t.flip_horizontal();
            }
            if self.vertical_flip && rng.gen_bool(0.5) {
                t = t.flip_vertical();
            }
        }
        Ok(t)
    }
}

impl Iterator for DirectoryIterator {
    type Item = Result<Batch>;

    /// Never returns `None`; every pass restarts transparently.
    fn next(&mut self) -> Option<Self::Item> {
        Some(self.next_batch())
    }
}
