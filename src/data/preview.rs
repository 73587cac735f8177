use std::path::{Path, PathBuf};

use crate::data::codec::save_tensor;
use crate::data::directory_iterator::Batch;
use crate::error::{Result, SegError};

/// Debugging aid: writes the first image and mask of a batch pair to
/// `dir/preview_image.png` and `dir/preview_mask.png` so their alignment can
/// be checked by eye.
pub fn save_pair(images: &Batch, masks: &Batch, dir: &Path) -> Result<(PathBuf, PathBuf)> {
    let (image, mask) = images
        .samples
        .first()
        .zip(masks.samples.first())
        .ok_or_else(|| SegError::InvalidArgument("cannot preview an empty batch".into()))?;

    let image_path = dir.join("preview_image.png");
    let mask_path = dir.join("preview_mask.png");
    save_tensor(image, &image_path)?;
    save_tensor(mask, &mask_path)?;
    log::info!(
        "Wrote preview pair to {} and {}",
        image_path.display(),
        mask_path.display()
    );
    Ok((image_path, mask_path))
}
