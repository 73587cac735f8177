use std::path::Path;

use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, RgbImage};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SegError};
use crate::math::tensor::Tensor;

/// How decoded images are converted before entering the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorMode {
    Rgb,
    Grayscale,
}

impl ColorMode {
    pub fn channels(&self) -> usize {
        match self {
            ColorMode::Rgb => 3,
            ColorMode::Grayscale => 1,
        }
    }
}

/// Decodes the image at `path`, resizes it to `(height, width)` with
/// nearest-neighbour sampling and returns a CHW tensor scaled by `rescale`.
pub fn load_tensor(
    path: &Path,
    color_mode: ColorMode,
    target_size: (u32, u32),
    rescale: f64,
) -> Result<Tensor> {
    let img = image::open(path).map_err(|e| SegError::image(path, e))?;
    Ok(image_to_tensor(&img, color_mode, target_size, rescale))
}

pub fn image_to_tensor(
    img: &DynamicImage,
    color_mode: ColorMode,
    target_size: (u32, u32),
    rescale: f64,
) -> Tensor {
    let (height, width) = target_size;
    let resized = if img.width() == width && img.height() == height {
        img.clone()
    } else {
        img.resize_exact(width, height, FilterType::Nearest)
    };
    let (h, w) = (height as usize, width as usize);

    match color_mode {
        ColorMode::Grayscale => {
            let gray = resized.to_luma8();
            let data = gray.pixels().map(|p| p.0[0] as f64 * rescale).collect();
            Tensor::from_data(1, h, w, data)
        }
        ColorMode::Rgb => {
            let rgb = resized.to_rgb8();
            let mut t = Tensor::zeros(3, h, w);
            for (x, y, p) in rgb.enumerate_pixels() {
                for c in 0..3 {
                    t.set(c, y as usize, x as usize, p.0[c] as f64 * rescale);
                }
            }
            t
        }
    }
}

/// Converts a 1- or 3-channel tensor with values in [0, 1] back to an image.
pub fn tensor_to_image(t: &Tensor) -> Result<DynamicImage> {
    let to_u8 = |v: f64| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
    let (w, h) = (t.width as u32, t.height as u32);
    match t.channels {
        1 => {
            let img = GrayImage::from_fn(w, h, |x, y| {
                image::Luma([to_u8(t.get(0, y as usize, x as usize))])
            });
            Ok(DynamicImage::ImageLuma8(img))
        }
        3 => {
            let img = RgbImage::from_fn(w, h, |x, y| {
                let (x, y) = (x as usize, y as usize);
                image::Rgb([to_u8(t.get(0, y, x)), to_u8(t.get(1, y, x)), to_u8(t.get(2, y, x))])
            });
            Ok(DynamicImage::ImageRgb8(img))
        }
        c => Err(SegError::Shape(format!("cannot encode a {c}-channel tensor as an image"))),
    }
}

/// Writes `t` (values in [0, 1]) to `path`; the format follows the extension.
pub fn save_tensor(t: &Tensor, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| SegError::io(parent, e))?;
    }
    tensor_to_image(t)?
        .save(path)
        .map_err(|e| SegError::image(path, e))
}
