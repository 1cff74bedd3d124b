use image::GenericImageView;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::CropResize;

/// Fixed seed used for every augmentation run; the same image and config
/// must always produce byte-identical output.
pub const AUGMENTATION_SEED: u64 = 42;

const JPEG_QUALITY: u8 = 90;

#[derive(Debug, thiserror::Error)]
pub enum AugmentError {
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}

/// Random-sized crop followed by a resize: a square window with side length
/// drawn from [min_height, max_height] (clamped to the image) is cut at a
/// random position, then scaled to the configured output size. The RNG is
/// seeded per call, so the transform is a pure function of
/// (bytes, params, seed).
pub fn augment(bytes: &[u8], params: &CropResize, seed: u64) -> Result<Vec<u8>, AugmentError> {
    let img = image::load_from_memory(bytes)?;
    let mut rng = StdRng::seed_from_u64(seed);

    let max_square = img.width().min(img.height());
    let lo = params.min_height.min(max_square);
    let hi = params.max_height.min(max_square);
    let side = rng.random_range(lo..=hi);
    let x = if img.width() > side {
        rng.random_range(0..=img.width() - side)
    } else {
        0
    };
    let y = if img.height() > side {
        rng.random_range(0..=img.height() - side)
    } else {
        0
    };

    let cropped = img.crop_imm(x, y, side, side);
    let resized = cropped
        .resize_exact(params.width, params.height, FilterType::Triangle)
        .to_rgb8();

    let mut out = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY);
    resized.write_with_encoder(encoder)?;
    Ok(out)
}
