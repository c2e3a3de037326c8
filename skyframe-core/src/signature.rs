//! Signature engine: cryptographic content hash plus perceptual fingerprints.
//!
//! Every stored image carries three values computed from the exact byte
//! stream that is persisted (after watermarking, not before):
//!
//! - `sha256`: SHA-256 digest of the bytes, for exact provenance matches.
//! - `phash`: 64-bit frequency-domain fingerprint (32x32 DCT, median split).
//! - `dhash`: 64-bit horizontal-gradient fingerprint (9x8 grid).
//!
//! Similarity between fingerprints is their Hamming distance; the bit layout
//! is fixed (row-major, first bit most significant) so fingerprints computed
//! by any implementation remain comparable.

use std::f64::consts::PI;

use image::imageops::{self, FilterType};
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Result, SkyFrameError};

/// Side length of the grid the phash DCT runs over.
const PHASH_GRID: usize = 32;
/// Side length of the low-frequency block kept from the DCT.
const PHASH_BLOCK: usize = 8;

/// The signature triple stored on an image record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSignature {
    /// SHA-256 of the stored bytes, lowercase hex.
    pub sha256: String,
    /// Frequency-domain fingerprint, 16 lowercase hex chars.
    pub phash: String,
    /// Gradient fingerprint, 16 lowercase hex chars.
    pub dhash: String,
}

impl ImageSignature {
    /// Compute all three signature values from raw image bytes.
    ///
    /// The caller must pass the final stored bytes; hashing the pre-watermark
    /// upload would authenticate content that is never persisted. Undecodable
    /// bytes fail with [`SkyFrameError::InvalidImage`] and produce no partial
    /// result.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let image = image::load_from_memory(bytes)
            .map_err(|e| SkyFrameError::InvalidImage(e.to_string()))?;
        Ok(Self {
            sha256: sha256_hex(bytes),
            phash: format!("{:016x}", phash64(&image)),
            dhash: format!("{:016x}", dhash64(&image)),
        })
    }
}

/// SHA-256 of arbitrary bytes as lowercase hex.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// 64-bit frequency-domain fingerprint.
///
/// Grayscale, resize to 32x32 with Lanczos3, 2-D DCT, keep the top-left 8x8
/// low-frequency block. The median is taken over the 63 coefficients
/// excluding the DC term; each of the 64 coefficients (DC included) then
/// contributes one bit, set when the coefficient exceeds the median.
pub fn phash64(image: &DynamicImage) -> u64 {
    let gray = image.to_luma8();
    let resized = imageops::resize(
        &gray,
        PHASH_GRID as u32,
        PHASH_GRID as u32,
        FilterType::Lanczos3,
    );

    let mut grid = [[0f64; PHASH_GRID]; PHASH_GRID];
    for (y, row) in grid.iter_mut().enumerate() {
        for (x, value) in row.iter_mut().enumerate() {
            *value = f64::from(resized.get_pixel(x as u32, y as u32)[0]);
        }
    }
    let transformed = dct_2d(&grid);

    let mut block = [0f64; PHASH_BLOCK * PHASH_BLOCK];
    for y in 0..PHASH_BLOCK {
        for x in 0..PHASH_BLOCK {
            block[y * PHASH_BLOCK + x] = transformed[y][x];
        }
    }

    // Median of the 63 AC coefficients; the DC term at [0,0] would dominate.
    let mut ac: Vec<f64> = block[1..].to_vec();
    ac.sort_by(f64::total_cmp);
    let median = ac[ac.len() / 2];

    let mut bits = 0u64;
    for value in block {
        bits = (bits << 1) | u64::from(value > median);
    }
    bits
}

/// 64-bit gradient fingerprint.
///
/// Grayscale, resize to 9x8 with Lanczos3; each bit is set when the pixel at
/// column `c` is brighter than its right neighbor, row-major.
pub fn dhash64(image: &DynamicImage) -> u64 {
    let gray = image.to_luma8();
    let resized = imageops::resize(&gray, 9, 8, FilterType::Lanczos3);

    let mut bits = 0u64;
    for y in 0..8 {
        for x in 0..8 {
            let left = resized.get_pixel(x, y)[0];
            let right = resized.get_pixel(x + 1, y)[0];
            bits = (bits << 1) | u64::from(left > right);
        }
    }
    bits
}

/// Hamming distance between two 16-hex-char fingerprints.
///
/// Returns `None` when either side is empty or not valid hex, mirroring how
/// records without fingerprints are skipped rather than treated as errors.
pub fn hamming_distance(left: &str, right: &str) -> Option<u32> {
    if left.is_empty() || right.is_empty() {
        return None;
    }
    let left = u64::from_str_radix(left, 16).ok()?;
    let right = u64::from_str_radix(right, 16).ok()?;
    Some((left ^ right).count_ones())
}

/// Unnormalized DCT-II over rows, then columns.
fn dct_2d(grid: &[[f64; PHASH_GRID]; PHASH_GRID]) -> [[f64; PHASH_GRID]; PHASH_GRID] {
    let mut rows = [[0f64; PHASH_GRID]; PHASH_GRID];
    for (y, row) in grid.iter().enumerate() {
        rows[y] = dct_1d(row);
    }

    let mut out = [[0f64; PHASH_GRID]; PHASH_GRID];
    for x in 0..PHASH_GRID {
        let mut column = [0f64; PHASH_GRID];
        for y in 0..PHASH_GRID {
            column[y] = rows[y][x];
        }
        let transformed = dct_1d(&column);
        for y in 0..PHASH_GRID {
            out[y][x] = transformed[y];
        }
    }
    out
}

fn dct_1d(input: &[f64; PHASH_GRID]) -> [f64; PHASH_GRID] {
    let n = PHASH_GRID as f64;
    let mut output = [0f64; PHASH_GRID];
    for (k, out) in output.iter_mut().enumerate() {
        let mut sum = 0.0;
        for (i, &value) in input.iter().enumerate() {
            sum += value * (PI * (i as f64 + 0.5) * k as f64 / n).cos();
        }
        *out = 2.0 * sum;
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, ImageBuffer, Rgb, RgbImage};
    use std::io::Cursor;

    fn gradient_image(width: u32, height: u32) -> RgbImage {
        let mut img = ImageBuffer::new(width, height);
        for (x, y, pixel) in img.enumerate_pixels_mut() {
            let r = ((x as f32 / width as f32) * 255.0) as u8;
            let g = ((y as f32 / height as f32) * 255.0) as u8;
            let b = (((x + y) as f32 / (width + height) as f32) * 200.0) as u8;
            *pixel = Rgb([r, g, b]);
        }
        img
    }

    fn png_bytes(img: &RgbImage) -> Vec<u8> {
        let mut buffer = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img.clone())
            .write_to(&mut buffer, image::ImageFormat::Png)
            .expect("PNG encoding failed");
        buffer.into_inner()
    }

    #[test]
    fn signature_is_deterministic() {
        let bytes = png_bytes(&gradient_image(64, 48));
        let first = ImageSignature::from_bytes(&bytes).unwrap();
        let second = ImageSignature::from_bytes(&bytes).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.sha256.len(), 64);
        assert_eq!(first.phash.len(), 16);
        assert_eq!(first.dhash.len(), 16);
    }

    #[test]
    fn malformed_bytes_fail_with_invalid_image() {
        let result = ImageSignature::from_bytes(b"definitely not an image");
        assert!(matches!(result, Err(SkyFrameError::InvalidImage(_))));
    }

    #[test]
    fn dhash_of_descending_gradient_is_all_ones() {
        // Brightness strictly decreases left to right, so every comparison
        // "left brighter than right" holds.
        let img = GrayImage::from_fn(9, 8, |x, _| image::Luma([(255 - x * 20) as u8]));
        let hash = dhash64(&DynamicImage::ImageLuma8(img));
        assert_eq!(hash, u64::MAX);
    }

    #[test]
    fn dhash_of_ascending_gradient_is_all_zeros() {
        let img = GrayImage::from_fn(9, 8, |x, _| image::Luma([(x * 20) as u8]));
        let hash = dhash64(&DynamicImage::ImageLuma8(img));
        assert_eq!(hash, 0);
    }

    #[test]
    fn phash_separates_structurally_different_images() {
        let gradient = DynamicImage::ImageRgb8(gradient_image(128, 128));
        let checker = DynamicImage::ImageLuma8(GrayImage::from_fn(128, 128, |x, y| {
            if (x / 16 + y / 16) % 2 == 0 {
                image::Luma([255])
            } else {
                image::Luma([0])
            }
        }));
        let distance = (phash64(&gradient) ^ phash64(&checker)).count_ones();
        assert!(distance > 10, "distance {distance} should exceed threshold");
    }

    #[test]
    fn phash_median_split_sets_about_half_the_bits() {
        // 31 of the 63 AC coefficients sit strictly above the median, so with
        // distinct values the popcount lands at 31 or 32 plus the DC bit.
        let hash = phash64(&DynamicImage::ImageRgb8(gradient_image(96, 96)));
        let ones = hash.count_ones();
        assert!((30..=34).contains(&ones), "unexpected popcount {ones}");
    }

    #[test]
    fn hamming_distance_is_symmetric_and_zero_on_self() {
        assert_eq!(hamming_distance("deadbeefcafebabe", "deadbeefcafebabe"), Some(0));
        assert_eq!(
            hamming_distance("deadbeefcafebabe", "0000000000000000"),
            hamming_distance("0000000000000000", "deadbeefcafebabe"),
        );
        assert_eq!(hamming_distance("ff00000000000000", "0000000000000000"), Some(8));
    }

    #[test]
    fn hamming_distance_rejects_empty_and_non_hex() {
        assert_eq!(hamming_distance("", "deadbeefcafebabe"), None);
        assert_eq!(hamming_distance("deadbeefcafebabe", ""), None);
        assert_eq!(hamming_distance("not-hex-not-hex!", "deadbeefcafebabe"), None);
    }
}
