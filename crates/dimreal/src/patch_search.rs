//! Single-resolution randomized correspondence search (PatchMatch family).
//!
//! Every hole pixel `p` carries a source coordinate `f(p)` in the known
//! region. The cost of an assignment is the mean squared RGB distance between
//! the patch around `p` (in the current composite) and the patch around
//! `f(p)`. Each sweep runs, per hole pixel in scan order:
//!
//! 1. **Propagation** – the assignments of the two already-visited neighbors,
//!    shifted by the neighbor offset, are tried as candidates.
//! 2. **Random search** – candidates are drawn around the current best in a
//!    window whose radius starts at the level's longer side and halves after
//!    every probe.
//!
//! A candidate replaces the current assignment only if it strictly lowers the
//! cost, so the summed hole cost never increases from one sweep to the next.
//! Scan direction alternates between sweeps. Accepted costs are measured
//! against the composite at acceptance time; [`PatchSearch::run`] refreshes
//! them once the final colors are in place.

use image::{GrayImage, RgbImage};
use rand::rngs::StdRng;
use rand::Rng;

use crate::error::{ensure_extent, InpaintError};
use crate::grid::{CostMap, NnfField};
use crate::quad::{HOLE, KNOWN};

/// Solver state for one resolution level.
#[derive(Debug, Clone)]
pub struct PatchSearch {
    color: RgbImage,
    mask: GrayImage,
    nnf: NnfField,
    cost: CostMap,
    /// Every known coordinate, for uniform random draws.
    known: Vec<[i32; 2]>,
    patch_radius: u32,
    rng: StdRng,
}

impl PatchSearch {
    /// Wrap a color + mask pair. Known pixels map to themselves with zero
    /// cost; hole pixels still need [`init_random`](Self::init_random) or a
    /// seed before searching.
    pub fn new(
        color: RgbImage,
        mask: GrayImage,
        patch_radius: u32,
        rng: StdRng,
    ) -> Result<Self, InpaintError> {
        let (w, h) = color.dimensions();
        if w == 0 || h == 0 {
            return Err(InpaintError::EmptyImage);
        }
        ensure_extent("mask", (w, h), mask.dimensions())?;

        let known: Vec<[i32; 2]> = mask
            .enumerate_pixels()
            .filter(|(_, _, m)| m[0] != HOLE)
            .map(|(x, y, _)| [x as i32, y as i32])
            .collect();
        if known.is_empty() {
            return Err(InpaintError::NoKnownPixels);
        }
        // Anything that is not exactly a hole is treated as known.
        let mask = GrayImage::from_fn(w, h, |x, y| {
            if mask.get_pixel(x, y)[0] == HOLE {
                image::Luma([HOLE])
            } else {
                image::Luma([KNOWN])
            }
        });

        Ok(Self {
            color,
            mask,
            nnf: NnfField::identity(w, h),
            cost: CostMap::new(w, h, 0.0),
            known,
            patch_radius,
            rng,
        })
    }

    /// Warm-started state: adopt a prior color/NNF/cost and sanitize it.
    ///
    /// Known pixels are forced to identity with zero cost. Hole entries that
    /// are out of bounds or point into the hole are redrawn uniformly from the
    /// known region. Kept entries with a finite prior cost start from
    /// `alpha · prior + (1 − alpha) · fresh`; all others start from the fresh
    /// cost.
    pub fn from_warm_start(
        color: RgbImage,
        mask: GrayImage,
        nnf: NnfField,
        cost: CostMap,
        alpha: f32,
        patch_radius: u32,
        rng: StdRng,
    ) -> Result<Self, InpaintError> {
        let dims = color.dimensions();
        ensure_extent("nnf", dims, nnf.dimensions())?;
        ensure_extent("cost", dims, cost.dimensions())?;
        let mut s = Self::new(color, mask, patch_radius, rng)?;

        let alpha = alpha.clamp(0.0, 1.0);
        let (w, h) = dims;
        let mut prior = vec![None; w as usize * h as usize];
        for y in 0..h {
            for x in 0..w {
                if !s.is_hole(x, y) {
                    continue;
                }
                let f = *nnf.get(x, y);
                let c = *cost.get(x, y);
                if s.is_valid_source(f) {
                    s.nnf.set(x, y, f);
                    if c.is_finite() {
                        prior[(y * w + x) as usize] = Some(c);
                    }
                } else {
                    let f = s.random_known();
                    s.assign(x, y, f);
                }
            }
        }
        s.evaluate_holes();
        for y in 0..h {
            for x in 0..w {
                if let Some(c) = prior[(y * w + x) as usize] {
                    let fresh = *s.cost.get(x, y);
                    s.cost.set(x, y, alpha * c + (1.0 - alpha) * fresh);
                }
            }
        }
        Ok(s)
    }

    /// Assign every hole pixel a uniformly random known source.
    pub fn init_random(&mut self) {
        let (w, h) = self.color.dimensions();
        for y in 0..h {
            for x in 0..w {
                if self.is_hole(x, y) {
                    let f = self.random_known();
                    self.assign(x, y, f);
                }
            }
        }
        self.evaluate_holes();
    }

    /// Seed hole pixels from an upsampled coarser level.
    ///
    /// Known pixels keep their own data. Seeds that do not land on a known
    /// pixel are clamped into bounds and, if still in the hole, redrawn.
    pub fn seed(&mut self, color: &RgbImage, nnf: &NnfField) -> Result<(), InpaintError> {
        let dims = self.color.dimensions();
        ensure_extent("seed color", dims, color.dimensions())?;
        ensure_extent("seed nnf", dims, nnf.dimensions())?;
        let (w, h) = dims;
        for y in 0..h {
            for x in 0..w {
                if !self.is_hole(x, y) {
                    continue;
                }
                let f = self.clamp_to_known(*nnf.get(x, y));
                self.nnf.set(x, y, f);
                self.color.put_pixel(x, y, *color.get_pixel(x, y));
            }
        }
        self.evaluate_holes();
        Ok(())
    }

    /// Run `max_itr` sweeps with alternating scan direction, then composite
    /// and re-evaluate every hole cost against the final colors.
    pub fn run(&mut self, max_itr: usize, max_rand_search_itr: usize) {
        for itr in 0..max_itr {
            self.sweep(itr % 2 == 0, max_rand_search_itr);
        }
        self.composite();
        self.evaluate_holes();
    }

    /// One propagation + random-search pass over all hole pixels.
    pub fn sweep(&mut self, forward: bool, max_rand_search_itr: usize) {
        let (w, h) = self.color.dimensions();
        let step: i32 = if forward { 1 } else { -1 };
        let max_radius = w.max(h) as f32;

        for j in 0..h {
            let y = if forward { j } else { h - 1 - j };
            for i in 0..w {
                let x = if forward { i } else { w - 1 - i };
                if !self.is_hole(x, y) {
                    continue;
                }
                let p = [x as i32, y as i32];
                let current = *self.nnf.get(x, y);
                let mut best = current;
                let mut best_cost = *self.cost.get(x, y);

                // Propagation from the already-visited neighbors.
                for n in [[p[0] - step, p[1]], [p[0], p[1] - step]] {
                    if !self.nnf.contains(n) {
                        continue;
                    }
                    let nf = *self.nnf.get(n[0] as u32, n[1] as u32);
                    let cand = [nf[0] + p[0] - n[0], nf[1] + p[1] - n[1]];
                    self.try_candidate(p, cand, &mut best, &mut best_cost);
                }

                // Random search around the current best.
                let mut radius = max_radius;
                let mut probes = 0;
                while radius >= 1.0 && probes < max_rand_search_itr {
                    let r = radius as i32;
                    let cand = [
                        (best[0] + self.rng.gen_range(-r..=r)).clamp(0, w as i32 - 1),
                        (best[1] + self.rng.gen_range(-r..=r)).clamp(0, h as i32 - 1),
                    ];
                    self.try_candidate(p, cand, &mut best, &mut best_cost);
                    radius *= 0.5;
                    probes += 1;
                }

                if best != current {
                    self.assign(x, y, best);
                    self.cost.set(x, y, best_cost);
                }
            }
        }
    }

    /// Replace every hole pixel by its source pixel's color.
    pub fn composite(&mut self) {
        let (w, h) = self.color.dimensions();
        for y in 0..h {
            for x in 0..w {
                if self.is_hole(x, y) {
                    let f = *self.nnf.get(x, y);
                    let c = *self.color.get_pixel(f[0] as u32, f[1] as u32);
                    self.color.put_pixel(x, y, c);
                }
            }
        }
    }

    /// Sum of the cost map over hole pixels.
    pub fn hole_cost_sum(&self) -> f64 {
        self.cost
            .as_slice()
            .iter()
            .zip(self.mask.as_raw())
            .filter(|&(_, &m)| m == HOLE)
            .map(|(&c, _)| c as f64)
            .sum()
    }

    /// Cost of assigning source `f` to pixel `p` against the current composite.
    pub fn patch_cost(&self, p: [i32; 2], f: [i32; 2]) -> f32 {
        patch_cost(&self.color, p, f, self.patch_radius)
    }

    pub fn color(&self) -> &RgbImage {
        &self.color
    }

    pub fn mask(&self) -> &GrayImage {
        &self.mask
    }

    pub fn nnf(&self) -> &NnfField {
        &self.nnf
    }

    pub fn cost(&self) -> &CostMap {
        &self.cost
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.color.dimensions()
    }

    pub fn into_parts(self) -> (RgbImage, NnfField, CostMap) {
        (self.color, self.nnf, self.cost)
    }

    #[inline]
    fn is_hole(&self, x: u32, y: u32) -> bool {
        self.mask.get_pixel(x, y)[0] == HOLE
    }

    #[inline]
    fn is_valid_source(&self, f: [i32; 2]) -> bool {
        self.nnf.contains(f) && !self.is_hole(f[0] as u32, f[1] as u32)
    }

    fn random_known(&mut self) -> [i32; 2] {
        self.known[self.rng.gen_range(0..self.known.len())]
    }

    fn clamp_to_known(&mut self, f: [i32; 2]) -> [i32; 2] {
        let (w, h) = self.color.dimensions();
        let c = [f[0].clamp(0, w as i32 - 1), f[1].clamp(0, h as i32 - 1)];
        if self.is_hole(c[0] as u32, c[1] as u32) {
            self.random_known()
        } else {
            c
        }
    }

    /// Point `(x, y)` at source `f` and copy the source color.
    fn assign(&mut self, x: u32, y: u32, f: [i32; 2]) {
        self.nnf.set(x, y, f);
        let c = *self.color.get_pixel(f[0] as u32, f[1] as u32);
        self.color.put_pixel(x, y, c);
    }

    fn evaluate_holes(&mut self) {
        let (w, h) = self.color.dimensions();
        for y in 0..h {
            for x in 0..w {
                if self.is_hole(x, y) {
                    let f = *self.nnf.get(x, y);
                    let c = self.patch_cost([x as i32, y as i32], f);
                    self.cost.set(x, y, c);
                }
            }
        }
    }

    fn try_candidate(
        &self,
        p: [i32; 2],
        cand: [i32; 2],
        best: &mut [i32; 2],
        best_cost: &mut f32,
    ) {
        if cand == *best || !self.is_valid_source(cand) {
            return;
        }
        let c = self.patch_cost(p, cand);
        if c < *best_cost {
            *best = cand;
            *best_cost = c;
        }
    }
}

/// Mean squared RGB distance between the patches centred on `p` and `f`.
///
/// Window offsets where either patch leaves the image are skipped. Returns
/// `f32::INFINITY` when no offset is usable.
pub fn patch_cost(color: &RgbImage, p: [i32; 2], f: [i32; 2], radius: u32) -> f32 {
    let (w, h) = color.dimensions();
    let (w, h) = (w as i32, h as i32);
    let r = radius as i32;
    let mut sum = 0u64;
    let mut n = 0u32;
    for dy in -r..=r {
        let (py, fy) = (p[1] + dy, f[1] + dy);
        if py < 0 || py >= h || fy < 0 || fy >= h {
            continue;
        }
        for dx in -r..=r {
            let (px, fx) = (p[0] + dx, f[0] + dx);
            if px < 0 || px >= w || fx < 0 || fx >= w {
                continue;
            }
            let a = color.get_pixel(px as u32, py as u32).0;
            let b = color.get_pixel(fx as u32, fy as u32).0;
            for ch in 0..3 {
                let d = a[ch] as i32 - b[ch] as i32;
                sum += (d * d) as u64;
            }
            n += 1;
        }
    }
    if n == 0 {
        f32::INFINITY
    } else {
        (sum as f64 / n as f64) as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{gradient_frame, random_blob_mask, rect_hole_mask, stripe_frame};
    use rand::SeedableRng;

    fn assert_field_invariants(s: &PatchSearch) {
        let (w, h) = s.dimensions();
        for y in 0..h {
            for x in 0..w {
                let f = *s.nnf().get(x, y);
                assert!(s.nnf().contains(f), "({x},{y}) -> {f:?} out of bounds");
                if s.mask().get_pixel(x, y)[0] == KNOWN {
                    assert_eq!(f, [x as i32, y as i32]);
                    assert_eq!(*s.cost().get(x, y), 0.0);
                } else {
                    assert_eq!(s.mask().get_pixel(f[0] as u32, f[1] as u32)[0], KNOWN);
                    assert!(*s.cost().get(x, y) >= 0.0);
                }
            }
        }
    }

    #[test]
    fn all_hole_mask_is_rejected() {
        let color = stripe_frame(8, 8, 4);
        let mask = GrayImage::new(8, 8);
        let err = PatchSearch::new(color, mask, 2, StdRng::seed_from_u64(0)).unwrap_err();
        assert_eq!(err, InpaintError::NoKnownPixels);
    }

    #[test]
    fn mismatched_mask_is_rejected() {
        let color = stripe_frame(8, 8, 4);
        let mask = GrayImage::from_pixel(8, 7, image::Luma([KNOWN]));
        assert!(matches!(
            PatchSearch::new(color, mask, 2, StdRng::seed_from_u64(0)),
            Err(InpaintError::ExtentMismatch { .. })
        ));
    }

    #[test]
    fn random_masks_keep_field_invariants() {
        let mut rng = StdRng::seed_from_u64(11);
        for trial in 0..8 {
            let color = stripe_frame(40, 32, 5);
            let mask = random_blob_mask(40, 32, &mut rng);
            let mut s =
                PatchSearch::new(color, mask, 2, StdRng::seed_from_u64(trial)).unwrap();
            s.init_random();
            assert_field_invariants(&s);
            s.run(3, 4);
            assert_field_invariants(&s);
        }
    }

    #[test]
    fn hole_cost_is_non_increasing_across_sweeps() {
        let mut rng = StdRng::seed_from_u64(5);
        for trial in 0..6 {
            let color = stripe_frame(48, 40, 6);
            let mask = random_blob_mask(48, 40, &mut rng);
            let mut s =
                PatchSearch::new(color, mask, 2, StdRng::seed_from_u64(100 + trial)).unwrap();
            s.init_random();
            let mut prev = s.hole_cost_sum();
            for itr in 0..6 {
                s.sweep(itr % 2 == 0, 5);
                let now = s.hole_cost_sum();
                assert!(now <= prev, "trial {trial} sweep {itr}: {now} > {prev}");
                prev = now;
            }
        }
    }

    #[test]
    fn composite_copies_source_colors() {
        let color = stripe_frame(32, 32, 4);
        let mask = rect_hole_mask(32, 32, 12, 12, 8, 8);
        let mut s = PatchSearch::new(color, mask, 1, StdRng::seed_from_u64(3)).unwrap();
        s.init_random();
        s.run(2, 3);
        for y in 12..20 {
            for x in 12..20 {
                let f = *s.nnf().get(x, y);
                assert_eq!(
                    s.color().get_pixel(x, y),
                    s.color().get_pixel(f[0] as u32, f[1] as u32)
                );
            }
        }
    }

    #[test]
    fn run_leaves_costs_matching_final_composite() {
        let color = gradient_frame(48, 48);
        let mask = rect_hole_mask(48, 48, 16, 16, 16, 16);
        let mut s = PatchSearch::new(color, mask, 2, StdRng::seed_from_u64(8)).unwrap();
        s.init_random();
        s.run(4, 4);
        for y in 16..32 {
            for x in 16..32 {
                let p = [x as i32, y as i32];
                let f = *s.nnf().get(x, y);
                assert_eq!(*s.cost().get(x, y), patch_cost(s.color(), p, f, 2));
            }
        }
    }

    #[test]
    fn periodic_texture_converges_to_low_cost() {
        let color = stripe_frame(64, 64, 8);
        let mask = rect_hole_mask(64, 64, 24, 24, 12, 12);
        let mut s = PatchSearch::new(color, mask, 2, StdRng::seed_from_u64(9)).unwrap();
        s.init_random();
        let initial = s.hole_cost_sum();
        s.run(8, 8);
        assert!(s.hole_cost_sum() < initial);
    }

    #[test]
    fn warm_start_repairs_invalid_entries() {
        let color = stripe_frame(24, 24, 4);
        let mask = rect_hole_mask(24, 24, 8, 8, 6, 6);
        let mut nnf = NnfField::identity(24, 24);
        // Out of bounds, inside the hole, and a valid seed.
        nnf.set(8, 8, [-5, 40]);
        nnf.set(9, 8, [10, 10]);
        nnf.set(10, 8, [2, 2]);
        let cost = CostMap::new(24, 24, 0.0);
        let s = PatchSearch::from_warm_start(
            color,
            mask,
            nnf,
            cost,
            1.0,
            2,
            StdRng::seed_from_u64(1),
        )
        .unwrap();
        assert_field_invariants(&s);
        assert_eq!(*s.nnf().get(10, 8), [2, 2]);
        // alpha = 1 keeps the prior cost of the valid seed.
        assert_eq!(*s.cost().get(10, 8), 0.0);
    }

    #[test]
    fn patch_cost_of_identical_patches_is_zero() {
        let color = stripe_frame(20, 20, 5);
        assert_eq!(patch_cost(&color, [7, 7], [12, 2], 2), 0.0);
        assert!(patch_cost(&color, [7, 7], [8, 7], 2) > 0.0);
    }
}
