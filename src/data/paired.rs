use crate::data::directory_iterator::{Batch, DirectoryIterator};
use crate::error::{Result, SegError};

/// Zips an image flow with a mask flow so that every step yields aligned
/// `(images, masks)` batches.
///
/// Alignment relies on both flows sharing a seed, a batch size and a sample
/// count; the constructor rejects flows whose counts differ.
#[derive(Debug, Clone)]
pub struct PairedGenerator {
    images: DirectoryIterator,
    masks: DirectoryIterator,
}

impl PairedGenerator {
    pub fn new(images: DirectoryIterator, masks: DirectoryIterator) -> Result<Self> {
        if images.len() != masks.len() {
            return Err(SegError::PairMismatch { images: images.len(), masks: masks.len() });
        }
        if images.batch_size() != masks.batch_size() {
            return Err(SegError::InvalidArgument(format!(
                "image batch size {} differs from mask batch size {}",
                images.batch_size(),
                masks.batch_size()
            )));
        }

        let mismatched = images
            .filenames()
            .iter()
            .zip(masks.filenames())
            .filter(|(i, m)| i.file_stem() != m.file_stem())
            .count();
        if mismatched > 0 {
            log::warn!(
                "{mismatched} image/mask pairs have different file names; pairing follows sorted order"
            );
        }

        Ok(PairedGenerator { images, masks })
    }

    /// Samples per pass.
    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn batches_per_pass(&self) -> usize {
        self.images.batches_per_pass()
    }

    pub fn images(&self) -> &DirectoryIterator {
        &self.images
    }

    pub fn masks(&self) -> &DirectoryIterator {
        &self.masks
    }

    pub fn next_pair(&mut self) -> Result<(Batch, Batch)> {
        let images = self.images.next_batch()?;
        let masks = self.masks.next_batch()?;
        debug_assert_eq!(images.indices, masks.indices);
        Ok((images, masks))
    }
}

impl Iterator for PairedGenerator {
    type Item = Result<(Batch, Batch)>;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.next_pair())
    }
}
