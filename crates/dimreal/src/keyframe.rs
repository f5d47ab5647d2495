//! A stored full solve, bound to the quadrilateral it was computed for.
//!
//! Reprojecting into a new quadrilateral warps color bilinearly and the cost
//! map by nearest neighbor. The NNF is warped by nearest neighbor as well, but
//! its entries are image coordinates, not offsets: each stored coordinate is
//! itself pushed through the same homography and rounded after the
//! perspective divide.

use image::{GrayImage, RgbImage};
use nalgebra::Matrix3;

use crate::error::{ensure_extent, InpaintError};
use crate::grid::{CostMap, Grid, NnfField};
use crate::homography::project;
use crate::pyramid::Solve;
use crate::quad::Quad;
use crate::warp::{warp_perspective_nearest, warp_perspective_rgb};

/// NNF value of a warped pixel with no source sample.
pub const INVALID_NNF: [i32; 2] = [-1, -1];

/// Immutable snapshot of one full solve.
#[derive(Debug, Clone)]
pub struct Keyframe {
    color: RgbImage,
    mask: GrayImage,
    nnf: NnfField,
    cost: CostMap,
    quad: Quad,
}

/// A keyframe resampled into a new pose.
#[derive(Debug, Clone)]
pub struct WarpedKeyframe {
    pub color: RgbImage,
    /// Out-of-source pixels hold [`INVALID_NNF`].
    pub nnf: NnfField,
    /// Out-of-source pixels hold zero.
    pub cost: CostMap,
    /// Keyframe quad → requested quad.
    pub homography: Matrix3<f64>,
}

impl Keyframe {
    pub fn new(solve: Solve, mask: GrayImage, quad: Quad) -> Result<Self, InpaintError> {
        let dims = solve.color.dimensions();
        if dims.0 == 0 || dims.1 == 0 {
            return Err(InpaintError::EmptyImage);
        }
        ensure_extent("mask", dims, mask.dimensions())?;
        ensure_extent("nnf", dims, solve.nnf.dimensions())?;
        ensure_extent("cost", dims, solve.cost.dimensions())?;
        if quad.is_degenerate() {
            return Err(InpaintError::DegenerateQuad);
        }
        Ok(Self {
            color: solve.color,
            mask,
            nnf: solve.nnf,
            cost: solve.cost,
            quad,
        })
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

    pub fn quad(&self) -> &Quad {
        &self.quad
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.color.dimensions()
    }

    /// Reproject into `quad`, keeping the keyframe's extent.
    pub fn warped(&self, quad: &Quad) -> Result<WarpedKeyframe, InpaintError> {
        let h = self.quad.homography_to(quad)?;
        let (w, ht) = self.dimensions();

        let color = warp_perspective_rgb(&self.color, &h, w, ht)?;
        let cost = warp_perspective_nearest(&self.cost, &h, w, ht, 0.0)?;
        let moved: NnfField = Grid::from_fn(w, ht, |x, y| {
            let f = self.nnf.get(x, y);
            let p = project(&h, f[0] as f64, f[1] as f64);
            if p[0].is_finite() && p[1].is_finite() {
                [p[0].round() as i32, p[1].round() as i32]
            } else {
                INVALID_NNF
            }
        });
        let nnf = warp_perspective_nearest(&moved, &h, w, ht, INVALID_NNF)?;

        Ok(WarpedKeyframe {
            color,
            nnf,
            cost,
            homography: h,
        })
    }
}
