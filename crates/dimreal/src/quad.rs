//! Ordered four-point footprints and their hole masks.

use image::{GrayImage, Luma};
use imageproc::drawing::draw_polygon_mut;
use imageproc::point::Point;
use nalgebra::Matrix3;

use crate::error::InpaintError;
use crate::homography::{self, estimate_homography_dlt};

/// Mask value of a pixel that must be synthesized.
pub const HOLE: u8 = 0;
/// Mask value of a known, trusted pixel.
pub const KNOWN: u8 = 255;

/// Four ordered 2D points, `[x, y]` in pixel (or board) units.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Quad(pub [[f64; 2]; 4]);

impl Quad {
    pub const N_POINTS: usize = 4;

    /// Build from a point list, rejecting any count other than four.
    pub fn from_points(points: &[[f64; 2]]) -> Result<Self, InpaintError> {
        if points.len() != Self::N_POINTS {
            return Err(InpaintError::QuadPointCount {
                expected: Self::N_POINTS,
                got: points.len(),
            });
        }
        Ok(Self([points[0], points[1], points[2], points[3]]))
    }

    /// Axis-aligned square `[(x0+s, y0), (x0+s, y0+s), (x0, y0+s), (x0, y0)]`,
    /// the same corner order the marker tracker reports.
    pub fn square(x0: f64, y0: f64, side: f64) -> Self {
        Self([
            [x0 + side, y0],
            [x0 + side, y0 + side],
            [x0, y0 + side],
            [x0, y0],
        ])
    }

    pub fn points(&self) -> &[[f64; 2]; 4] {
        &self.0
    }

    pub fn is_degenerate(&self) -> bool {
        homography::is_degenerate(&self.0)
    }

    /// Arithmetic mean of the four corners.
    pub fn centroid(&self) -> [f64; 2] {
        let sx: f64 = self.0.iter().map(|p| p[0]).sum();
        let sy: f64 = self.0.iter().map(|p| p[1]).sum();
        [sx / 4.0, sy / 4.0]
    }

    /// Homography mapping `self` onto `other` corner by corner.
    pub fn homography_to(&self, other: &Quad) -> Result<Matrix3<f64>, InpaintError> {
        Ok(estimate_homography_dlt(&self.0, &other.0)?)
    }

    /// Push every corner through `h`.
    pub fn transformed(&self, h: &Matrix3<f64>) -> Self {
        Self(self.0.map(|p| homography::project(h, p[0], p[1])))
    }

    /// Rasterize the quad as a hole (0) on a known (255) background.
    pub fn hole_mask(&self, width: u32, height: u32) -> Result<GrayImage, InpaintError> {
        self.rasterize(width, height, Luma([KNOWN]), Luma([HOLE]))
    }

    /// Rasterize the quad as 255 on a 0 background (compositing region).
    pub fn region_mask(&self, width: u32, height: u32) -> Result<GrayImage, InpaintError> {
        self.rasterize(width, height, Luma([0]), Luma([255]))
    }

    fn rasterize(
        &self,
        width: u32,
        height: u32,
        background: Luma<u8>,
        fill: Luma<u8>,
    ) -> Result<GrayImage, InpaintError> {
        if width == 0 || height == 0 {
            return Err(InpaintError::EmptyImage);
        }
        if self.is_degenerate() {
            return Err(InpaintError::DegenerateQuad);
        }
        let mut poly: Vec<Point<i32>> = Vec::with_capacity(Self::N_POINTS);
        for p in &self.0 {
            let q = Point::new(p[0].round() as i32, p[1].round() as i32);
            if poly.last() != Some(&q) {
                poly.push(q);
            }
        }
        while poly.len() > 1 && poly.first() == poly.last() {
            poly.pop();
        }
        let mut mask = GrayImage::from_pixel(width, height, background);
        if poly.len() < 3 {
            return Err(InpaintError::DegenerateQuad);
        }
        draw_polygon_mut(&mut mask, &poly, fill);
        Ok(mask)
    }
}

/// Count mask pixels equal to [`HOLE`].
pub fn hole_pixel_count(mask: &GrayImage) -> usize {
    mask.as_raw().iter().filter(|&&v| v == HOLE).count()
}
