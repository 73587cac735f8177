#![allow(dead_code)]

use std::path::{Path, PathBuf};

use image::{GrayImage, Luma, Rgb, RgbImage};

/// Writes `n` RGB images and matching grayscale masks under
/// `root/images/all` and `root/masks/all`. Sample `i` has a bright square
/// whose position depends on `i`; the mask marks the same square.
pub fn synth_dataset(root: &Path, n: usize, size: u32) -> (PathBuf, PathBuf) {
    let images = root.join("images");
    let masks = root.join("masks");
    std::fs::create_dir_all(images.join("all")).unwrap();
    std::fs::create_dir_all(masks.join("all")).unwrap();

    for i in 0..n {
        let offset = (i as u32) % (size / 2);
        let inside = |x: u32, y: u32| x >= offset && x < offset + size / 2 && y >= offset / 2 && y < offset / 2 + size / 2;
        let img = RgbImage::from_fn(size, size, |x, y| {
            if inside(x, y) { Rgb([230, 220, 210]) } else { Rgb([20, 30, 40]) }
        });
        let mask = GrayImage::from_fn(size, size, |x, y| {
            if inside(x, y) { Luma([255]) } else { Luma([0]) }
        });
        let name = format!("sample_{i:03}.png");
        img.save(images.join("all").join(&name)).unwrap();
        mask.save(masks.join("all").join(&name)).unwrap();
    }
    (images, masks)
}

/// Like `synth_dataset`, but every pixel of image `i` is gray level
/// `value(i, x, y)` on all channels and the mask carries the same level, so
/// an aligned pair satisfies `image[0] == mask[0]` after rescaling.
pub fn mirrored_dataset(root: &Path, n: usize, size: u32) -> (PathBuf, PathBuf) {
    let images = root.join("images");
    let masks = root.join("masks");
    std::fs::create_dir_all(images.join("all")).unwrap();
    std::fs::create_dir_all(masks.join("all")).unwrap();

    for i in 0..n {
        let value = |x: u32, y: u32| ((i as u32 * 17 + x * 5 + y * 3) % 256) as u8;
        let img = RgbImage::from_fn(size, size, |x, y| {
            let v = value(x, y);
            Rgb([v, v, v])
        });
        let mask = GrayImage::from_fn(size, size, |x, y| Luma([value(x, y)]));
        let name = format!("sample_{i:03}.png");
        img.save(images.join("all").join(&name)).unwrap();
        mask.save(masks.join("all").join(&name)).unwrap();
    }
    (images, masks)
}
