//! Coarse-to-fine orchestration of [`PatchSearch`].
//!
//! Level 0 is the input resolution; level `l + 1` halves both sides of level
//! `l` (2×2 box average for color, box average followed by a strict threshold
//! for the mask: a coarse pixel is known only if all four fine pixels are).
//! The coarsest level is solved from a random initialization. Each finer level
//! is seeded in its hole pixels from the coarser result: bilinear color, and
//! nearest NNF scaled by two plus the sub-pixel parity of the fine location.
//! Known fine pixels always keep their native data.

use image::{GrayImage, Luma, Rgb, RgbImage};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{ensure_extent, InpaintError};
use crate::grid::{CostMap, NnfField};
use crate::params::InpaintParams;
use crate::patch_search::PatchSearch;
use crate::quad::{hole_pixel_count, HOLE, KNOWN};
use crate::warm_start::WarmStart;
use crate::warp::resize_bilinear;

/// Shorter side a pyramid level may not drop below.
pub const MIN_LEVEL_SIDE: u32 = 5;

/// Number of levels for a `width × height` input: the largest count not above
/// `max_levels` whose coarsest shorter side is still `>= MIN_LEVEL_SIDE`.
pub fn level_count(width: u32, height: u32, max_levels: usize) -> usize {
    let mut levels = 1;
    let mut side = width.min(height);
    while side / 2 >= MIN_LEVEL_SIDE {
        side /= 2;
        levels += 1;
    }
    levels.min(max_levels.max(1))
}

/// One resolution of the pyramid.
#[derive(Debug, Clone)]
pub struct Level {
    pub color: RgbImage,
    pub mask: GrayImage,
}

/// Color + mask pyramid, finest level first.
#[derive(Debug, Clone)]
pub struct Pyramid {
    levels: Vec<Level>,
}

impl Pyramid {
    /// Build up to `max_levels` levels. A level without a single known pixel
    /// is never added; the pyramid stops one level earlier instead.
    pub fn build(
        color: &RgbImage,
        mask: &GrayImage,
        max_levels: usize,
    ) -> Result<Self, InpaintError> {
        let (w, h) = color.dimensions();
        if w == 0 || h == 0 {
            return Err(InpaintError::EmptyImage);
        }
        ensure_extent("mask", (w, h), mask.dimensions())?;
        if hole_pixel_count(mask) == mask.as_raw().len() {
            return Err(InpaintError::NoKnownPixels);
        }

        let count = level_count(w, h, max_levels);
        let mut levels = Vec::with_capacity(count);
        levels.push(Level {
            color: color.clone(),
            mask: mask.clone(),
        });
        for _ in 1..count {
            let Some(prev) = levels.last() else { break };
            let next = Level {
                color: downsample_color(&prev.color),
                mask: downsample_mask(&prev.mask),
            };
            if hole_pixel_count(&next.mask) == next.mask.as_raw().len() {
                break;
            }
            levels.push(next);
        }
        Ok(Self { levels })
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn levels(&self) -> &[Level] {
        &self.levels
    }

    pub fn into_levels(self) -> Vec<Level> {
        self.levels
    }
}

/// 2× box downsample (floor of each side).
fn downsample_color(src: &RgbImage) -> RgbImage {
    let (w, h) = src.dimensions();
    RgbImage::from_fn(w / 2, h / 2, |x, y| {
        let mut acc = [0u32; 3];
        for (dx, dy) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
            let p = src.get_pixel(2 * x + dx, 2 * y + dy).0;
            for c in 0..3 {
                acc[c] += p[c] as u32;
            }
        }
        Rgb(acc.map(|v| ((v + 2) / 4) as u8))
    })
}

/// 2× box downsample of a mask; anything short of fully known becomes hole.
fn downsample_mask(src: &GrayImage) -> GrayImage {
    let (w, h) = src.dimensions();
    GrayImage::from_fn(w / 2, h / 2, |x, y| {
        let sum: u32 = [(0, 0), (1, 0), (0, 1), (1, 1)]
            .iter()
            .map(|&(dx, dy)| src.get_pixel(2 * x + dx, 2 * y + dy)[0] as u32)
            .sum();
        if sum / 4 < KNOWN as u32 {
            Luma([HOLE])
        } else {
            Luma([KNOWN])
        }
    })
}

/// Upsample a coarse NNF onto a `width × height` grid: nearest lookup, then
/// each coordinate doubled and offset by the fine pixel's parity.
pub fn upsample_nnf(coarse: &NnfField, width: u32, height: u32) -> NnfField {
    let (cw, ch) = coarse.dimensions();
    NnfField::from_fn(width, height, |x, y| {
        let f = coarse.get((x / 2).min(cw - 1), (y / 2).min(ch - 1));
        [f[0] * 2 + (x % 2) as i32, f[1] * 2 + (y % 2) as i32]
    })
}

/// Feather the hole boundary: `alpha = box_blur(mask) / 255`,
/// `out = alpha · original + (1 − alpha) · solved`.
pub fn blend_border(
    original: &RgbImage,
    mask: &GrayImage,
    solved: &RgbImage,
    blur_size: u32,
) -> Result<RgbImage, InpaintError> {
    let dims = original.dimensions();
    ensure_extent("mask", dims, mask.dimensions())?;
    ensure_extent("solved", dims, solved.dimensions())?;
    let radius = blur_size / 2;
    let matte = imageproc::filter::box_filter(mask, radius, radius);
    Ok(RgbImage::from_fn(dims.0, dims.1, |x, y| {
        let a = matte.get_pixel(x, y)[0] as f32 / 255.0;
        let o = original.get_pixel(x, y).0;
        let s = solved.get_pixel(x, y).0;
        Rgb(std::array::from_fn(|c| {
            (a * o[c] as f32 + (1.0 - a) * s[c] as f32)
                .round()
                .clamp(0.0, 255.0) as u8
        }))
    }))
}

/// Result of a solve at input resolution.
#[derive(Debug, Clone)]
pub struct Solve {
    /// Inpainted, border-blended color.
    pub color: RgbImage,
    pub nnf: NnfField,
    pub cost: CostMap,
}

/// Hooks into a running pyramid solve.
///
/// `is_cancelled` is polled once before every level; a level that has started
/// always finishes.
pub trait SolveObserver {
    fn is_cancelled(&self) -> bool {
        false
    }

    /// Called after `level` finished, with that level's composite.
    fn level_done(&self, _level: usize, _color: &RgbImage) {}
}

impl SolveObserver for () {}

/// Multi-resolution inpainting solver.
#[derive(Debug, Clone, Default)]
pub struct PyramidSolver {
    params: InpaintParams,
}

impl PyramidSolver {
    pub fn new(params: InpaintParams) -> Self {
        Self {
            params: params.sanitized(),
        }
    }

    pub fn params(&self) -> &InpaintParams {
        &self.params
    }

    /// Full coarse-to-fine solve of `color` with hole `mask`.
    pub fn solve(&self, color: &RgbImage, mask: &GrayImage) -> Result<Solve, InpaintError> {
        self.solve_observed(color, mask, &())?
            .ok_or_else(|| InpaintError::Worker("solve cancelled".to_string()))
    }

    /// Full solve reporting progress to `observer`.
    ///
    /// Returns `Ok(None)` if the observer cancelled before level 0 ran.
    pub fn solve_observed(
        &self,
        color: &RgbImage,
        mask: &GrayImage,
        observer: &dyn SolveObserver,
    ) -> Result<Option<Solve>, InpaintError> {
        let p = &self.params;
        let pyramid = Pyramid::build(color, mask, p.max_pyramid_level)?;
        let n_levels = pyramid.len();
        tracing::info!(
            width = color.width(),
            height = color.height(),
            levels = n_levels,
            holes = hole_pixel_count(mask),
            "pyramid solve started"
        );

        let mut rng = p.rng();
        let mut coarser: Option<(RgbImage, NnfField)> = None;
        for (lv, level) in pyramid.into_levels().into_iter().enumerate().rev() {
            if observer.is_cancelled() {
                tracing::info!(level = lv, "pyramid solve cancelled");
                return Ok(None);
            }
            let (w, h) = level.color.dimensions();
            let mut search = PatchSearch::new(
                level.color,
                level.mask,
                p.patch_radius,
                StdRng::seed_from_u64(rng.gen()),
            )?;
            match coarser.take() {
                None => search.init_random(),
                Some((color, nnf)) => {
                    search.seed(&resize_bilinear(&color, w, h), &upsample_nnf(&nnf, w, h))?
                }
            }
            let max_itr = if lv == 0 {
                p.max_itr.min(InpaintParams::FINEST_LEVEL_MAX_ITR)
            } else {
                p.max_itr
            };
            search.run(max_itr, p.max_rand_search_itr);
            tracing::debug!(
                level = lv,
                width = w,
                height = h,
                sweeps = max_itr,
                hole_cost = search.hole_cost_sum(),
                "pyramid level solved"
            );
            observer.level_done(lv, search.color());

            let (level_color, nnf, cost) = search.into_parts();
            if lv == 0 {
                let blended = blend_border(color, mask, &level_color, p.blur_size)?;
                tracing::info!("pyramid solve finished");
                return Ok(Some(Solve {
                    color: blended,
                    nnf,
                    cost,
                }));
            }
            coarser = Some((level_color, nnf));
        }
        // `Pyramid::build` always yields level 0.
        Err(InpaintError::EmptyImage)
    }

    /// Level-0 refinement of a warm-started state, then border blending
    /// against `frame`.
    pub fn refine(
        &self,
        frame: &RgbImage,
        seed: WarmStart,
    ) -> Result<Solve, InpaintError> {
        let p = &self.params;
        let mask = seed.mask.clone();
        let mut search = PatchSearch::from_warm_start(
            seed.color,
            seed.mask,
            seed.nnf,
            seed.cost,
            p.alpha,
            p.patch_radius,
            p.rng(),
        )?;
        let sweeps = p.max_itr.min(InpaintParams::FINEST_LEVEL_MAX_ITR);
        search.run(sweeps, p.max_rand_search_itr);
        tracing::debug!(
            sweeps,
            hole_cost = search.hole_cost_sum(),
            "warm-start refinement finished"
        );
        let (color, nnf, cost) = search.into_parts();
        Ok(Solve {
            color: blend_border(frame, &mask, &color, p.blur_size)?,
            nnf,
            cost,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{rect_hole_mask, stripe_frame};
    use std::cell::RefCell;

    #[test]
    fn level_count_for_512_is_bounded() {
        // 512 → 256 → 128 → 64 → 32 → 16 → 8 (4 would be below 5).
        assert_eq!(level_count(512, 512, 10), 7);
        assert_eq!(level_count(512, 512, 3), 3);
        assert!(level_count(512, 512, 10) as f64 <= (512.0f64 / 5.0).log2().ceil());
        assert_eq!(level_count(9, 200, 10), 1);
        assert_eq!(level_count(10, 10, 10), 2);
        assert_eq!(level_count(10, 10, 0), 1);
    }

    #[test]
    fn mask_downsample_is_strict() {
        let mut mask = GrayImage::from_pixel(4, 4, Luma([KNOWN]));
        mask.put_pixel(1, 1, Luma([HOLE]));
        let down = downsample_mask(&mask);
        assert_eq!(down.dimensions(), (2, 2));
        assert_eq!(down.get_pixel(0, 0)[0], HOLE);
        assert_eq!(down.get_pixel(1, 0)[0], KNOWN);
    }

    #[test]
    fn color_downsample_averages_blocks() {
        let img = RgbImage::from_fn(2, 2, |x, y| Rgb([(x * 100) as u8, (y * 40) as u8, 7]));
        let down = downsample_color(&img);
        assert_eq!(down.get_pixel(0, 0).0, [50, 20, 7]);
    }

    #[test]
    fn pyramid_stops_before_all_hole_level() {
        let color = stripe_frame(40, 40, 4);
        // Known ring one pixel wide: gone after one downsample step.
        let mask = GrayImage::from_fn(40, 40, |x, y| {
            if x == 0 || y == 0 {
                Luma([KNOWN])
            } else {
                Luma([HOLE])
            }
        });
        let pyr = Pyramid::build(&color, &mask, 5).unwrap();
        assert_eq!(pyr.len(), 1);
    }

    #[test]
    fn no_known_pixels_is_rejected() {
        let color = stripe_frame(16, 16, 4);
        let mask = GrayImage::new(16, 16);
        assert_eq!(
            PyramidSolver::default().solve(&color, &mask).unwrap_err(),
            InpaintError::NoKnownPixels
        );
    }

    #[test]
    fn nnf_upsampling_uses_parity() {
        let coarse = NnfField::from_fn(2, 2, |_, _| [3, 5]);
        let fine = upsample_nnf(&coarse, 5, 4);
        assert_eq!(*fine.get(0, 0), [6, 10]);
        assert_eq!(*fine.get(1, 1), [7, 11]);
        assert_eq!(*fine.get(4, 3), [6, 11]);
    }

    #[test]
    fn blend_keeps_interiors() {
        let original = RgbImage::from_pixel(20, 20, Rgb([200, 0, 0]));
        let solved = RgbImage::from_pixel(20, 20, Rgb([0, 0, 200]));
        let mask = rect_hole_mask(20, 20, 5, 5, 10, 10);
        let out = blend_border(&original, &mask, &solved, 5).unwrap();
        assert_eq!(out.get_pixel(10, 10).0, [0, 0, 200]);
        assert_eq!(out.get_pixel(1, 1).0, [200, 0, 0]);
        let edge = out.get_pixel(5, 10).0;
        assert!(edge[0] > 0 && edge[2] > 0);
    }

    #[test]
    fn solve_keeps_known_region_and_bounds() {
        let color = stripe_frame(48, 40, 6);
        let mask = rect_hole_mask(48, 40, 18, 14, 12, 10);
        let solver = PyramidSolver::new(InpaintParams::keyframe().with_seed(4));
        let solve = solver.solve(&color, &mask).unwrap();
        for y in 0..40 {
            for x in 0..48 {
                let f = *solve.nnf.get(x, y);
                assert!(solve.nnf.contains(f));
                if mask.get_pixel(x, y)[0] == KNOWN {
                    assert_eq!(f, [x as i32, y as i32]);
                    assert_eq!(*solve.cost.get(x, y), 0.0);
                } else {
                    assert_eq!(mask.get_pixel(f[0] as u32, f[1] as u32)[0], KNOWN);
                }
            }
        }
    }

    #[test]
    fn seeded_solves_are_reproducible() {
        let color = stripe_frame(32, 32, 4);
        let mask = rect_hole_mask(32, 32, 10, 10, 8, 8);
        let solver = PyramidSolver::new(InpaintParams::default().with_seed(21));
        let a = solver.solve(&color, &mask).unwrap();
        let b = solver.solve(&color, &mask).unwrap();
        assert_eq!(a.color, b.color);
        assert_eq!(a.nnf, b.nnf);
    }

    #[test]
    fn finest_level_sweeps_are_capped_without_coarser_levels() {
        let color = stripe_frame(9, 9, 3);
        let mask = rect_hole_mask(9, 9, 3, 3, 3, 3);
        assert_eq!(level_count(9, 9, 7), 1);
        for seed in 0..5 {
            let solve = |max_itr| {
                let params = InpaintParams {
                    max_itr,
                    max_rand_search_itr: 4,
                    ..InpaintParams::default()
                }
                .with_seed(seed);
                PyramidSolver::new(params).solve(&color, &mask).unwrap()
            };
            let (two, ten) = (solve(2), solve(10));
            assert_eq!(two.nnf, ten.nnf);
            assert_eq!(two.color, ten.color);
            assert_eq!(two.cost, ten.cost);
        }
    }

    struct Recorder {
        levels: RefCell<Vec<usize>>,
        cancel_after: usize,
    }

    impl SolveObserver for Recorder {
        fn is_cancelled(&self) -> bool {
            self.levels.borrow().len() >= self.cancel_after
        }

        fn level_done(&self, level: usize, _color: &RgbImage) {
            self.levels.borrow_mut().push(level);
        }
    }

    #[test]
    fn observer_sees_levels_coarse_to_fine_and_can_cancel() {
        let color = stripe_frame(64, 64, 8);
        let mask = rect_hole_mask(64, 64, 24, 24, 16, 16);
        let solver = PyramidSolver::new(InpaintParams::default().with_seed(2));

        let all = Recorder {
            levels: RefCell::new(Vec::new()),
            cancel_after: usize::MAX,
        };
        assert!(solver.solve_observed(&color, &mask, &all).unwrap().is_some());
        let n = level_count(64, 64, InpaintParams::default().max_pyramid_level);
        assert_eq!(*all.levels.borrow(), (0..n).rev().collect::<Vec<_>>());

        let cut = Recorder {
            levels: RefCell::new(Vec::new()),
            cancel_after: 1,
        };
        assert!(solver.solve_observed(&color, &mask, &cut).unwrap().is_none());
        assert_eq!(cut.levels.borrow().len(), 1);
    }
}
