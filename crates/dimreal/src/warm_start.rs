//! Turn a reprojected keyframe into a valid initial state for the current
//! frame.

use image::{GrayImage, RgbImage};
use rand::Rng;

use crate::error::{ensure_extent, InpaintError};
use crate::grid::{CostMap, NnfField};
use crate::keyframe::WarpedKeyframe;
use crate::patch_search::patch_cost;
use crate::quad::HOLE;

/// Repaired state ready for [`PyramidSolver::refine`](crate::PyramidSolver::refine).
#[derive(Debug, Clone)]
pub struct WarmStart {
    pub color: RgbImage,
    pub mask: GrayImage,
    pub nnf: NnfField,
    pub cost: CostMap,
    /// Hole pixels whose warped correspondence had to be redrawn.
    pub repaired: usize,
}

/// Reconcile `warped` with the current `frame` and its hole `mask`.
///
/// - Known pixels take the frame color, identity NNF and zero cost, whatever
///   the warp produced there.
/// - Hole pixels whose warped NNF is out of bounds or lands in the current
///   hole get a uniformly random known source, that source's color, and a
///   freshly evaluated cost.
/// - Remaining hole pixels keep the warped color, NNF and cost.
pub fn repair(
    warped: WarpedKeyframe,
    frame: &RgbImage,
    mask: &GrayImage,
    patch_radius: u32,
    rng: &mut impl Rng,
) -> Result<WarmStart, InpaintError> {
    let (w, h) = frame.dimensions();
    if w == 0 || h == 0 {
        return Err(InpaintError::EmptyImage);
    }
    ensure_extent("mask", (w, h), mask.dimensions())?;
    ensure_extent("warped color", (w, h), warped.color.dimensions())?;
    ensure_extent("warped nnf", (w, h), warped.nnf.dimensions())?;
    ensure_extent("warped cost", (w, h), warped.cost.dimensions())?;

    let is_hole = |x: u32, y: u32| mask.get_pixel(x, y)[0] == HOLE;
    let known: Vec<[i32; 2]> = mask
        .enumerate_pixels()
        .filter(|(_, _, m)| m[0] != HOLE)
        .map(|(x, y, _)| [x as i32, y as i32])
        .collect();
    if known.is_empty() {
        return Err(InpaintError::NoKnownPixels);
    }

    let WarpedKeyframe {
        mut color,
        mut nnf,
        mut cost,
        ..
    } = warped;
    let mut redrawn = Vec::new();
    for y in 0..h {
        for x in 0..w {
            if !is_hole(x, y) {
                color.put_pixel(x, y, *frame.get_pixel(x, y));
                nnf.set(x, y, [x as i32, y as i32]);
                cost.set(x, y, 0.0);
                continue;
            }
            let f = *nnf.get(x, y);
            if nnf.contains(f) && !is_hole(f[0] as u32, f[1] as u32) {
                continue;
            }
            let f = known[rng.gen_range(0..known.len())];
            nnf.set(x, y, f);
            color.put_pixel(x, y, *frame.get_pixel(f[0] as u32, f[1] as u32));
            redrawn.push([x as i32, y as i32]);
        }
    }
    // Costs of redrawn pixels need the complete composite.
    for p in &redrawn {
        let f = *nnf.get(p[0] as u32, p[1] as u32);
        cost.set(p[0] as u32, p[1] as u32, patch_cost(&color, *p, f, patch_radius));
    }
    if !redrawn.is_empty() {
        tracing::debug!(repaired = redrawn.len(), "warm start redrew stale correspondences");
    }

    Ok(WarmStart {
        color,
        mask: mask.clone(),
        nnf,
        cost,
        repaired: redrawn.len(),
    })
}
