//! Resampling primitives: perspective warps and pixel-centred resizes.
//!
//! All warps use inverse mapping: every destination pixel is pulled from
//! `H⁻¹ · [x, y, 1]` in the source. A source location is valid when it lies
//! within half a pixel of the source grid; valid locations near the border
//! are clamped onto the outermost pixels.

use image::{Rgb, RgbImage};
use nalgebra::Matrix3;

use crate::error::InpaintError;
use crate::grid::Grid;
use crate::homography::{invert, project};

#[inline]
fn inside(v: f64, len: u32) -> bool {
    v >= -0.5 && v <= len as f64 - 0.5
}

/// Bilinear sample of an RGB image at a real-valued location.
///
/// Returns `None` if `(x, y)` lies outside the image.
pub fn sample_bilinear(img: &RgbImage, x: f64, y: f64) -> Option<[f32; 3]> {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 || !inside(x, w) || !inside(y, h) {
        return None;
    }
    let x = x.clamp(0.0, (w - 1) as f64);
    let y = y.clamp(0.0, (h - 1) as f64);
    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);
    let fx = (x - x0 as f64) as f32;
    let fy = (y - y0 as f64) as f32;

    let p00 = img.get_pixel(x0, y0).0;
    let p10 = img.get_pixel(x1, y0).0;
    let p01 = img.get_pixel(x0, y1).0;
    let p11 = img.get_pixel(x1, y1).0;
    let mut out = [0.0f32; 3];
    for c in 0..3 {
        let top = p00[c] as f32 * (1.0 - fx) + p10[c] as f32 * fx;
        let bottom = p01[c] as f32 * (1.0 - fx) + p11[c] as f32 * fx;
        out[c] = top * (1.0 - fy) + bottom * fy;
    }
    Some(out)
}

#[inline]
pub(crate) fn to_rgb8(v: [f32; 3]) -> Rgb<u8> {
    Rgb(v.map(|c| c.round().clamp(0.0, 255.0) as u8))
}

/// Warp an RGB image by `h` (source → destination) with bilinear sampling.
///
/// Destination pixels that pull from outside the source are black.
pub fn warp_perspective_rgb(
    src: &RgbImage,
    h: &Matrix3<f64>,
    width: u32,
    height: u32,
) -> Result<RgbImage, InpaintError> {
    let h_inv = invert(h)?;
    let mut out = RgbImage::new(width, height);
    for (x, y, px) in out.enumerate_pixels_mut() {
        let s = project(&h_inv, x as f64, y as f64);
        if let Some(v) = sample_bilinear(src, s[0], s[1]) {
            *px = to_rgb8(v);
        }
    }
    Ok(out)
}

/// Warp a grid by `h` (source → destination) with nearest-neighbor sampling.
///
/// Destination cells that pull from outside the source get `fill`.
pub fn warp_perspective_nearest<T: Clone>(
    src: &Grid<T>,
    h: &Matrix3<f64>,
    width: u32,
    height: u32,
    fill: T,
) -> Result<Grid<T>, InpaintError> {
    let h_inv = invert(h)?;
    let (sw, sh) = src.dimensions();
    Ok(Grid::from_fn(width, height, |x, y| {
        let s = project(&h_inv, x as f64, y as f64);
        if sw == 0 || sh == 0 || !inside(s[0], sw) || !inside(s[1], sh) {
            return fill.clone();
        }
        let sx = (s[0].round().max(0.0) as u32).min(sw - 1);
        let sy = (s[1].round().max(0.0) as u32).min(sh - 1);
        src.get(sx, sy).clone()
    }))
}

/// Pixel-centred bilinear resize (`src = (dst + 0.5)·scale − 0.5`).
pub fn resize_bilinear(src: &RgbImage, width: u32, height: u32) -> RgbImage {
    let (sw, sh) = src.dimensions();
    if (sw, sh) == (width, height) {
        return src.clone();
    }
    let sx = sw as f64 / width.max(1) as f64;
    let sy = sh as f64 / height.max(1) as f64;
    RgbImage::from_fn(width, height, |x, y| {
        let fx = ((x as f64 + 0.5) * sx - 0.5).clamp(0.0, (sw.max(1) - 1) as f64);
        let fy = ((y as f64 + 0.5) * sy - 0.5).clamp(0.0, (sh.max(1) - 1) as f64);
        sample_bilinear(src, fx, fy).map_or(Rgb([0, 0, 0]), to_rgb8)
    })
}

/// Nearest-neighbor resize of a grid (`src = floor(dst · src_len / dst_len)`).
pub fn resize_nearest<T: Clone>(src: &Grid<T>, width: u32, height: u32) -> Grid<T> {
    let (sw, sh) = src.dimensions();
    Grid::from_fn(width, height, |x, y| {
        let sx = ((x as u64 * sw as u64) / width.max(1) as u64) as u32;
        let sy = ((y as u64 * sh as u64) / height.max(1) as u64) as u32;
        src.get(sx.min(sw - 1), sy.min(sh - 1)).clone()
    })
}
