//! Synthetic frames and masks shared by the unit tests.

use image::{GrayImage, Luma, Rgb, RgbImage};
use rand::Rng;

use crate::quad::{HOLE, KNOWN};

/// Smooth RGB ramp: red follows x, green follows y, blue their sum.
pub(crate) fn gradient_frame(w: u32, h: u32) -> RgbImage {
    let sx = 255.0 / (w.max(2) - 1) as f32;
    let sy = 255.0 / (h.max(2) - 1) as f32;
    RgbImage::from_fn(w, h, |x, y| {
        Rgb([
            (x as f32 * sx).round() as u8,
            (y as f32 * sy).round() as u8,
            ((x + y) % 256) as u8,
        ])
    })
}

/// Texture periodic in both axes with `period` pixels.
pub(crate) fn stripe_frame(w: u32, h: u32, period: u32) -> RgbImage {
    let p = period.max(1);
    let step = 255 / p;
    RgbImage::from_fn(w, h, |x, y| {
        Rgb([((x % p) * step) as u8, ((y % p) * step) as u8, 128])
    })
}

/// All-known mask with one axis-aligned rectangular hole.
pub(crate) fn rect_hole_mask(w: u32, h: u32, x0: u32, y0: u32, rw: u32, rh: u32) -> GrayImage {
    GrayImage::from_fn(w, h, |x, y| {
        if x >= x0 && x < x0 + rw && y >= y0 && y < y0 + rh {
            Luma([HOLE])
        } else {
            Luma([KNOWN])
        }
    })
}

/// One to three random rectangular holes, each at most a third of the frame
/// per axis, so at least a third of the frame stays known.
pub(crate) fn random_blob_mask(w: u32, h: u32, rng: &mut impl Rng) -> GrayImage {
    let mut mask = GrayImage::from_pixel(w, h, Luma([KNOWN]));
    let blobs = rng.gen_range(1..=3);
    for _ in 0..blobs {
        let rw = rng.gen_range(1..=(w / 3).max(1));
        let rh = rng.gen_range(1..=(h / 3).max(1));
        let x0 = rng.gen_range(0..=w - rw);
        let y0 = rng.gen_range(0..=h - rh);
        for y in y0..y0 + rh {
            for x in x0..x0 + rw {
                mask.put_pixel(x, y, Luma([HOLE]));
            }
        }
    }
    mask
}
