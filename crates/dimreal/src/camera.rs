//! Camera calibration document and the pinhole + Brown–Conrady model built
//! from it. Only the pose overlay uses this; inpainting works in raw pixels.

use std::path::Path;

use nalgebra::Matrix3;
use serde::{Deserialize, Serialize};

/// Pinhole intrinsics in pixels.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Intrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
}

impl Intrinsics {
    pub fn is_valid(self) -> bool {
        [self.fx, self.fy, self.cx, self.cy]
            .iter()
            .all(|v| v.is_finite())
            && self.fx.abs() > 1e-12
            && self.fy.abs() > 1e-12
    }

    /// Upper-triangular camera matrix `K`.
    pub fn matrix(self) -> Matrix3<f64> {
        Matrix3::new(self.fx, 0.0, self.cx, 0.0, self.fy, self.cy, 0.0, 0.0, 1.0)
    }

    pub fn to_normalized(self, px: [f64; 2]) -> Option<[f64; 2]> {
        if !self.is_valid() {
            return None;
        }
        let n = [(px[0] - self.cx) / self.fx, (px[1] - self.cy) / self.fy];
        (n[0].is_finite() && n[1].is_finite()).then_some(n)
    }

    pub fn to_pixel(self, n: [f64; 2]) -> [f64; 2] {
        [self.fx * n[0] + self.cx, self.fy * n[1] + self.cy]
    }
}

/// Brown–Conrady coefficients in OpenCV order `k1 k2 p1 p2 k3`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct BrownConrady {
    pub k1: f64,
    pub k2: f64,
    pub p1: f64,
    pub p2: f64,
    pub k3: f64,
}

impl BrownConrady {
    /// Coefficients from a flat list; missing trailing terms are zero and
    /// extra terms (rational / thin-prism models) are ignored.
    pub fn from_coeffs(c: &[f64]) -> Self {
        let at = |i: usize| c.get(i).copied().unwrap_or(0.0);
        Self {
            k1: at(0),
            k2: at(1),
            p1: at(2),
            p2: at(3),
            k3: at(4),
        }
    }

    fn radial(self, r2: f64) -> f64 {
        1.0 + r2 * (self.k1 + r2 * (self.k2 + r2 * self.k3))
    }

    fn tangential(self, x: f64, y: f64, r2: f64) -> [f64; 2] {
        [
            2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x),
            self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y,
        ]
    }

    pub fn distort(self, n: [f64; 2]) -> [f64; 2] {
        let (x, y) = (n[0], n[1]);
        let r2 = x * x + y * y;
        let k = self.radial(r2);
        let t = self.tangential(x, y, r2);
        [x * k + t[0], y * k + t[1]]
    }

    /// Fixed-point inversion of [`distort`](Self::distort).
    pub fn undistort(self, d: [f64; 2], max_iters: usize, eps: f64) -> Option<[f64; 2]> {
        let (mut x, mut y) = (d[0], d[1]);
        for _ in 0..max_iters.max(1) {
            let r2 = x * x + y * y;
            let k = self.radial(r2);
            if !k.is_finite() || k.abs() < 1e-12 {
                return None;
            }
            let t = self.tangential(x, y, r2);
            let (nx, ny) = ((d[0] - t[0]) / k, (d[1] - t[1]) / k);
            if !nx.is_finite() || !ny.is_finite() {
                return None;
            }
            let step = (nx - x).hypot(ny - y);
            x = nx;
            y = ny;
            if step <= eps {
                break;
            }
        }
        Some([x, y])
    }
}

/// Intrinsics plus lens distortion.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CameraModel {
    pub intrinsics: Intrinsics,
    pub distortion: BrownConrady,
}

impl CameraModel {
    const UNDISTORT_ITERS: usize = 20;
    const UNDISTORT_EPS: f64 = 1e-12;

    /// Ideal (undistorted) pixel → observed pixel.
    pub fn distort_pixel(self, px: [f64; 2]) -> Option<[f64; 2]> {
        let n = self.intrinsics.to_normalized(px)?;
        let p = self.intrinsics.to_pixel(self.distortion.distort(n));
        (p[0].is_finite() && p[1].is_finite()).then_some(p)
    }

    /// Observed pixel → ideal (undistorted) pixel.
    pub fn undistort_pixel(self, px: [f64; 2]) -> Option<[f64; 2]> {
        let d = self.intrinsics.to_normalized(px)?;
        let n = self
            .distortion
            .undistort(d, Self::UNDISTORT_ITERS, Self::UNDISTORT_EPS)?;
        Some(self.intrinsics.to_pixel(n))
    }

    /// Camera-frame point → observed pixel; `None` behind the camera.
    pub fn project_point(self, p: [f64; 3]) -> Option<[f64; 2]> {
        if p[2].is_nan() || p[2] <= 1e-12 {
            return None;
        }
        let n = self.distortion.distort([p[0] / p[2], p[1] / p[2]]);
        let px = self.intrinsics.to_pixel(n);
        (px[0].is_finite() && px[1].is_finite()).then_some(px)
    }
}

/// Error reading a calibration document.
#[derive(Debug)]
pub enum CalibrationError {
    Io(std::io::Error),
    Json(serde_json::Error),
    /// Camera matrix is not a valid pinhole matrix.
    InvalidMatrix,
}

impl std::fmt::Display for CalibrationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "calibration read failed: {}", e),
            Self::Json(e) => write!(f, "calibration parse failed: {}", e),
            Self::InvalidMatrix => write!(f, "camera matrix is not a pinhole matrix"),
        }
    }
}

impl std::error::Error for CalibrationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Json(e) => Some(e),
            Self::InvalidMatrix => None,
        }
    }
}

/// Persisted calibration: image size, 3×3 camera matrix (row-major) and
/// distortion coefficients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    pub image_size: [u32; 2],
    pub camera_matrix: [[f64; 3]; 3],
    #[serde(default)]
    pub dist_coeffs: Vec<f64>,
}

impl Calibration {
    pub fn from_json_file(path: &Path) -> Result<Self, CalibrationError> {
        let data = std::fs::read_to_string(path).map_err(CalibrationError::Io)?;
        let calib: Self = serde_json::from_str(&data).map_err(CalibrationError::Json)?;
        calib.camera_model()?;
        Ok(calib)
    }

    pub fn camera_model(&self) -> Result<CameraModel, CalibrationError> {
        let k = &self.camera_matrix;
        let intrinsics = Intrinsics {
            fx: k[0][0],
            fy: k[1][1],
            cx: k[0][2],
            cy: k[1][2],
        };
        let skew_free = k[0][1].abs() < 1e-9 && k[1][0].abs() < 1e-9;
        let last_row = k[2] == [0.0, 0.0, 1.0];
        if !intrinsics.is_valid() || !skew_free || !last_row {
            return Err(CalibrationError::InvalidMatrix);
        }
        Ok(CameraModel {
            intrinsics,
            distortion: BrownConrady::from_coeffs(&self.dist_coeffs),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn sample_camera() -> CameraModel {
        CameraModel {
            intrinsics: Intrinsics {
                fx: 900.0,
                fy: 920.0,
                cx: 640.0,
                cy: 480.0,
            },
            distortion: BrownConrady {
                k1: -0.12,
                k2: 0.03,
                p1: 0.001,
                p2: -0.0008,
                k3: 0.0,
            },
        }
    }

    #[test]
    fn distortion_roundtrip_is_stable() {
        let cam = sample_camera();
        let p = [250.0, 180.0];
        let u = cam.undistort_pixel(cam.distort_pixel(p).unwrap()).unwrap();
        assert_abs_diff_eq!(u[0], p[0], epsilon = 1e-5);
        assert_abs_diff_eq!(u[1], p[1], epsilon = 1e-5);
    }

    #[test]
    fn project_point_on_axis_hits_principal_point() {
        let cam = sample_camera();
        let px = cam.project_point([0.0, 0.0, 2.0]).unwrap();
        assert_abs_diff_eq!(px[0], 640.0, epsilon = 1e-12);
        assert_abs_diff_eq!(px[1], 480.0, epsilon = 1e-12);
        assert!(cam.project_point([0.0, 0.0, -1.0]).is_none());
    }

    #[test]
    fn calibration_document_parses() {
        let json = r#"{
            "image_size": [1280, 720],
            "camera_matrix": [[900, 0, 640], [0, 905, 360], [0, 0, 1]],
            "dist_coeffs": [-0.1, 0.02, 0.0, 0.0]
        }"#;
        let calib: Calibration = serde_json::from_str(json).unwrap();
        let cam = calib.camera_model().unwrap();
        assert_eq!(cam.intrinsics.fy, 905.0);
        assert_eq!(cam.distortion.k1, -0.1);
        assert_eq!(cam.distortion.k3, 0.0);
    }

    #[test]
    fn skewed_matrix_is_rejected() {
        let calib = Calibration {
            image_size: [10, 10],
            camera_matrix: [[900.0, 3.0, 5.0], [0.0, 900.0, 5.0], [0.0, 0.0, 1.0]],
            dist_coeffs: vec![],
        };
        assert!(matches!(
            calib.camera_model(),
            Err(CalibrationError::InvalidMatrix)
        ));
    }
}
