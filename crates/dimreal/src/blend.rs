//! Gradient-domain ("normal clone") blending.
//!
//! Inside the cloned region the output keeps the Laplacian of the source;
//! on the region boundary it equals the destination. The Poisson system is
//! solved per channel with successive over-relaxation on the region's
//! bounding box.

use image::{GrayImage, Rgb, RgbImage};

use crate::error::{ensure_extent, InpaintError};

/// Over-relaxation factor of the SOR sweeps.
const SOR_OMEGA: f32 = 1.9;

/// Inclusive bounding box `[x0, y0, x1, y1]` of the non-zero mask pixels.
pub fn mask_bbox(mask: &GrayImage) -> Option<[u32; 4]> {
    let mut bbox: Option<[u32; 4]> = None;
    for (x, y, m) in mask.enumerate_pixels() {
        if m[0] == 0 {
            continue;
        }
        bbox = Some(match bbox {
            None => [x, y, x, y],
            Some([x0, y0, x1, y1]) => [x0.min(x), y0.min(y), x1.max(x), y1.max(y)],
        });
    }
    bbox
}

/// Clone the non-zero `src_mask` region of `src` into `dst`, placing the
/// centre of the mask's bounding box at `anchor`.
///
/// Parts of the region that land outside `dst` or on its outermost pixel
/// ring are dropped. An empty mask returns `dst` unchanged.
pub fn seamless_clone(
    src: &RgbImage,
    src_mask: &GrayImage,
    dst: &RgbImage,
    anchor: [f64; 2],
    iterations: usize,
) -> Result<RgbImage, InpaintError> {
    ensure_extent("clone mask", src.dimensions(), src_mask.dimensions())?;
    let mut out = dst.clone();
    let Some([x0, y0, x1, y1]) = mask_bbox(src_mask) else {
        return Ok(out);
    };
    let (sw, sh) = src.dimensions();
    let (dw, dh) = dst.dimensions();
    if dw < 3 || dh < 3 || !anchor[0].is_finite() || !anchor[1].is_finite() {
        return Ok(out);
    }

    let ox = anchor[0].round() as i64 - (x0 as i64 + x1 as i64) / 2;
    let oy = anchor[1].round() as i64 - (y0 as i64 + y1 as i64) / 2;
    let rx0 = (x0 as i64 + ox).max(1);
    let ry0 = (y0 as i64 + oy).max(1);
    let rx1 = (x1 as i64 + ox).min(dw as i64 - 2);
    let ry1 = (y1 as i64 + oy).min(dh as i64 - 2);
    if rx0 > rx1 || ry0 > ry1 {
        return Ok(out);
    }
    let bw = (rx1 - rx0 + 1) as usize;
    let bh = (ry1 - ry0 + 1) as usize;

    let src_at = |x: i64, y: i64| -> [f32; 3] {
        let x = x.clamp(0, sw as i64 - 1) as u32;
        let y = y.clamp(0, sh as i64 - 1) as u32;
        src.get_pixel(x, y).0.map(f32::from)
    };
    let dst_at =
        |x: i64, y: i64| -> [f32; 3] { dst.get_pixel(x as u32, y as u32).0.map(f32::from) };

    let mut inside = vec![false; bw * bh];
    let mut value = vec![[0.0f32; 3]; bw * bh];
    let mut guide = vec![[0.0f32; 3]; bw * bh];
    for j in 0..bh {
        for i in 0..bw {
            let (qx, qy) = (rx0 + i as i64, ry0 + j as i64);
            let (px, py) = (qx - ox, qy - oy);
            if src_mask.get_pixel(px as u32, py as u32)[0] == 0 {
                continue;
            }
            let k = j * bw + i;
            inside[k] = true;
            let c = src_at(px, py);
            let n = [
                src_at(px - 1, py),
                src_at(px + 1, py),
                src_at(px, py - 1),
                src_at(px, py + 1),
            ];
            value[k] = c;
            guide[k] = std::array::from_fn(|ch| {
                4.0 * c[ch] - n[0][ch] - n[1][ch] - n[2][ch] - n[3][ch]
            });
        }
    }

    for _ in 0..iterations {
        for j in 0..bh {
            for i in 0..bw {
                let k = j * bw + i;
                if !inside[k] {
                    continue;
                }
                let (qx, qy) = (rx0 + i as i64, ry0 + j as i64);
                let mut sum = guide[k];
                for (di, dj) in [(-1i64, 0i64), (1, 0), (0, -1), (0, 1)] {
                    let (ni, nj) = (i as i64 + di, j as i64 + dj);
                    let nb = if ni >= 0 && nj >= 0 && (ni as usize) < bw && (nj as usize) < bh
                        && inside[nj as usize * bw + ni as usize]
                    {
                        value[nj as usize * bw + ni as usize]
                    } else {
                        dst_at(qx + di, qy + dj)
                    };
                    for ch in 0..3 {
                        sum[ch] += nb[ch];
                    }
                }
                for ch in 0..3 {
                    let gs = sum[ch] / 4.0;
                    value[k][ch] += SOR_OMEGA * (gs - value[k][ch]);
                }
            }
        }
    }

    for j in 0..bh {
        for i in 0..bw {
            let k = j * bw + i;
            if inside[k] {
                let px = Rgb(value[k].map(|v| v.round().clamp(0.0, 255.0) as u8));
                out.put_pixel((rx0 + i as i64) as u32, (ry0 + j as i64) as u32, px);
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{gradient_frame, rect_hole_mask};
    use image::Luma;

    fn square_mask(w: u32, h: u32, x0: u32, y0: u32, side: u32) -> GrayImage {
        // rect_hole_mask marks the square 0; invert it.
        let mut m = rect_hole_mask(w, h, x0, y0, side, side);
        for p in m.pixels_mut() {
            *p = Luma([255 - p[0]]);
        }
        m
    }

    #[test]
    fn bbox_of_empty_mask_is_none() {
        assert_eq!(mask_bbox(&GrayImage::new(4, 4)), None);
        let m = square_mask(10, 10, 2, 3, 4);
        assert_eq!(mask_bbox(&m), Some([2, 3, 5, 6]));
    }

    #[test]
    fn cloning_an_image_onto_itself_is_a_noop() {
        let img = gradient_frame(32, 32);
        let mask = square_mask(32, 32, 8, 8, 12);
        let out = seamless_clone(&img, &mask, &img, [13.0, 13.0], 50).unwrap();
        assert_eq!(out, img);
    }

    #[test]
    fn constant_offset_is_removed() {
        let dst = gradient_frame(24, 24);
        let src = RgbImage::from_fn(24, 24, |x, y| {
            Rgb(dst.get_pixel(x, y).0.map(|v| v.saturating_add(40).min(215)))
        });
        let dst = RgbImage::from_fn(24, 24, |x, y| {
            Rgb(dst.get_pixel(x, y).0.map(|v| v.min(175)))
        });
        let mask = square_mask(24, 24, 9, 9, 6);
        let out = seamless_clone(&src, &mask, &dst, [11.0, 11.0], 400).unwrap();
        for y in 9..15 {
            for x in 9..15 {
                for c in 0..3 {
                    let d = out.get_pixel(x, y)[c] as i32 - dst.get_pixel(x, y)[c] as i32;
                    assert!(d.abs() <= 2, "({x},{y})[{c}] off by {d}");
                }
            }
        }
        assert_eq!(out.get_pixel(2, 2), dst.get_pixel(2, 2));
    }

    #[test]
    fn region_is_translated_to_anchor() {
        let mut src = RgbImage::from_pixel(20, 20, Rgb([0, 0, 0]));
        src.put_pixel(4, 4, Rgb([255, 255, 255]));
        let dst = RgbImage::from_pixel(40, 40, Rgb([100, 100, 100]));
        // Bounding box centre (4, 4) lands on (30, 30).
        let mask = square_mask(20, 20, 2, 2, 5);
        let out = seamless_clone(&src, &mask, &dst, [30.0, 30.0], 100).unwrap();
        assert!(out.get_pixel(30, 30)[0] > 150);
        assert_eq!(out.get_pixel(4, 4), dst.get_pixel(4, 4));
        assert_eq!(out.get_pixel(34, 34), dst.get_pixel(34, 34));
        let same = seamless_clone(&src, &mask, &dst, [f64::NAN, 0.0], 10).unwrap();
        assert_eq!(same, dst);
    }
}
