use image::{GenericImageView, Rgb, RgbImage};
use particle_scan_common::roi::Roi;

/// Rec. 601 luma of an 8-bit RGB pixel, in 14-bit fixed point with rounding.
///
/// These are the weights of the common BGR-to-gray conversion the default
/// threshold was tuned on. The `image` crate's own `to_luma` uses Rec. 709,
/// which weighs green more heavily and shifts the signal on colour footage.
pub fn luma(pixel: &Rgb<u8>) -> u8 {
    const R: u32 = 4899;
    const G: u32 = 9617;
    const B: u32 = 1868;
    let [r, g, b] = pixel.0;
    ((u32::from(r) * R + u32::from(g) * G + u32::from(b) * B + (1 << 13)) >> 14) as u8
}

/// Mean grayscale intensity (0-255) of `roi` within `image`.
///
/// Each RGB sample is reduced to [`luma`] before averaging. The caller must
/// have checked that `roi` is non-empty and fits the image.
pub fn roi_mean(image: &RgbImage, roi: &Roi) -> f64 {
    let crop = image.view(roi.x, roi.y, roi.width, roi.height);
    let sum: u64 = crop
        .pixels()
        .map(|(_, _, pixel)| u64::from(luma(&pixel)))
        .sum();
    sum as f64 / roi.area() as f64
}
