//! Marker pose from its four corners, and an axis overlay for debugging.
//!
//! The marker plane is `z = 0` with the canonical square of
//! [`Marker::canonical_quad`]. With `H` the plane → ideal-pixel homography,
//! `K⁻¹ H ∝ [r1 r2 t]`; the scale comes from the unit norm of the rotation
//! columns and the rotation is re-orthonormalized through an SVD.

use image::{Rgb, RgbImage};
use imageproc::drawing::draw_line_segment_mut;
use nalgebra::{Matrix3, Vector3};

use crate::camera::CameraModel;
use crate::error::InpaintError;
use crate::marker::Marker;
use crate::quad::Quad;

/// Rigid transform marker plane → camera.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlanarPose {
    pub rotation: Matrix3<f64>,
    pub translation: Vector3<f64>,
}

impl PlanarPose {
    pub fn from_corners(
        marker: &Marker,
        corners: &Quad,
        camera: &CameraModel,
    ) -> Result<Self, InpaintError> {
        let mut ideal = [[0.0; 2]; 4];
        for (dst, src) in ideal.iter_mut().zip(corners.points()) {
            *dst = camera
                .undistort_pixel(*src)
                .ok_or(InpaintError::DegenerateQuad)?;
        }
        let h = marker.canonical_quad().homography_to(&Quad(ideal))?;
        let k_inv = camera
            .intrinsics
            .matrix()
            .try_inverse()
            .ok_or(InpaintError::DegenerateQuad)?;
        let m = k_inv * h;

        let (c1, c2, c3) = (m.column(0), m.column(1), m.column(2));
        let norm = 0.5 * (c1.norm() + c2.norm());
        if !norm.is_finite() || norm < 1e-12 {
            return Err(InpaintError::DegenerateQuad);
        }
        // The plane must lie in front of the camera.
        let s = if c3[2] < 0.0 { -1.0 / norm } else { 1.0 / norm };
        let r1 = c1 * s;
        let r2 = c2 * s;
        let r3 = r1.cross(&r2);
        let translation = c3 * s;

        let approx = Matrix3::from_columns(&[r1, r2, r3]);
        let svd = approx.svd(true, true);
        let (Some(u), Some(v_t)) = (svd.u, svd.v_t) else {
            return Err(InpaintError::DegenerateQuad);
        };
        let mut rotation = u * v_t;
        if rotation.determinant() < 0.0 {
            let mut u = u;
            u.column_mut(2).neg_mut();
            rotation = u * v_t;
        }
        Ok(Self {
            rotation,
            translation,
        })
    }

    /// Marker-plane point → camera frame.
    pub fn transform(&self, p: [f64; 3]) -> [f64; 3] {
        let q = self.rotation * Vector3::new(p[0], p[1], p[2]) + self.translation;
        [q[0], q[1], q[2]]
    }

    /// Marker-plane point → observed pixel.
    pub fn project(&self, camera: &CameraModel, p: [f64; 3]) -> Option<[f64; 2]> {
        camera.project_point(self.transform(p))
    }
}

/// Draw the marker's x (red), y (green) and out-of-plane (blue) axes of
/// `length` marker units, starting at the marker origin.
pub fn draw_axes(image: &mut RgbImage, pose: &PlanarPose, camera: &CameraModel, length: f64) {
    let Some(origin) = pose.project(camera, [0.0, 0.0, 0.0]) else {
        return;
    };
    let axes = [
        ([length, 0.0, 0.0], Rgb([255, 0, 0])),
        ([0.0, length, 0.0], Rgb([0, 255, 0])),
        // z = x × y points into the marker; draw towards the viewer.
        ([0.0, 0.0, -length], Rgb([0, 0, 255])),
    ];
    for (end, color) in axes {
        if let Some(e) = pose.project(camera, end) {
            draw_line_segment_mut(
                image,
                (origin[0] as f32, origin[1] as f32),
                (e[0] as f32, e[1] as f32),
                color,
            );
        }
    }
}
