//! Plane-to-plane homographies between tracked quadrilaterals.
//!
//! Estimation fixes `h33 = 1` in a conditioned frame and solves the
//! remaining eight unknowns in the least-squares sense, so four
//! correspondences give the exact map and more give a best fit. Both point
//! sets are first moved to their centroid and scaled to an RMS radius of √2.

use nalgebra::{DMatrix, DVector, Matrix3, Vector3};

#[derive(Debug, Clone, PartialEq)]
pub enum HomographyError {
    TooFewPoints { got: usize },
    CountMismatch { src: usize, dst: usize },
    /// Three corners are (nearly) collinear, or a coordinate is not finite.
    Degenerate,
    /// The linear system or the resulting matrix is singular.
    Singular,
}

impl std::fmt::Display for HomographyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooFewPoints { got } => write!(f, "need at least 4 points, got {}", got),
            Self::CountMismatch { src, dst } => {
                write!(f, "{} source points but {} destination points", src, dst)
            }
            Self::Degenerate => write!(f, "corner configuration is degenerate"),
            Self::Singular => write!(f, "homography is singular"),
        }
    }
}

impl std::error::Error for HomographyError {}

/// Twice the smallest corner-triangle area accepted in the conditioned frame.
const MIN_CONDITIONED_AREA: f64 = 2e-3;

/// Map `(x, y)` through `h`. A point sent to infinity comes back as NaN.
pub fn project(h: &Matrix3<f64>, x: f64, y: f64) -> [f64; 2] {
    let q = h * Vector3::new(x, y, 1.0);
    if q.z.abs() < 1e-15 {
        [f64::NAN, f64::NAN]
    } else {
        [q.x / q.z, q.y / q.z]
    }
}

/// Distance between `h(src)` and `dst`.
pub fn reprojection_error(h: &Matrix3<f64>, src: &[f64; 2], dst: &[f64; 2]) -> f64 {
    let p = project(h, src[0], src[1]);
    (p[0] - dst[0]).hypot(p[1] - dst[1])
}

pub fn invert(h: &Matrix3<f64>) -> Result<Matrix3<f64>, HomographyError> {
    match h.try_inverse() {
        Some(inv) if inv.iter().all(|v| v.is_finite()) => Ok(inv),
        _ => Err(HomographyError::Singular),
    }
}

/// Similarity that centres a point set and scales it to RMS radius √2.
struct Conditioner {
    center: [f64; 2],
    scale: f64,
}

impl Conditioner {
    fn fit(pts: &[[f64; 2]]) -> Self {
        let n = pts.len() as f64;
        let center = [
            pts.iter().map(|p| p[0]).sum::<f64>() / n,
            pts.iter().map(|p| p[1]).sum::<f64>() / n,
        ];
        let ms = pts
            .iter()
            .map(|p| (p[0] - center[0]).powi(2) + (p[1] - center[1]).powi(2))
            .sum::<f64>()
            / n;
        let scale = if ms > 1e-30 { (2.0 / ms).sqrt() } else { 1.0 };
        Self { center, scale }
    }

    fn apply(&self, p: [f64; 2]) -> [f64; 2] {
        [
            (p[0] - self.center[0]) * self.scale,
            (p[1] - self.center[1]) * self.scale,
        ]
    }

    fn matrix(&self) -> Matrix3<f64> {
        let s = self.scale;
        Matrix3::new(
            s,
            0.0,
            -s * self.center[0],
            0.0,
            s,
            -s * self.center[1],
            0.0,
            0.0,
            1.0,
        )
    }

    fn inverse_matrix(&self) -> Matrix3<f64> {
        let s = 1.0 / self.scale;
        Matrix3::new(s, 0.0, self.center[0], 0.0, s, self.center[1], 0.0, 0.0, 1.0)
    }
}

/// `true` when the first four points cannot support a stable fit: a
/// non-finite coordinate, or a corner triangle `(i-1, i, i+1)` that is
/// (nearly) flat once conditioned.
pub fn is_degenerate(pts: &[[f64; 2]]) -> bool {
    if pts.len() < 4 || pts.iter().any(|p| !p[0].is_finite() || !p[1].is_finite()) {
        return true;
    }
    let cond = Conditioner::fit(&pts[..4]);
    let q: Vec<[f64; 2]> = pts[..4].iter().map(|&p| cond.apply(p)).collect();
    (0..4).any(|i| {
        let (a, b, c) = (q[(i + 3) % 4], q[i], q[(i + 1) % 4]);
        let cross = (a[0] - b[0]) * (c[1] - b[1]) - (a[1] - b[1]) * (c[0] - b[0]);
        cross.abs() < MIN_CONDITIONED_AREA
    })
}

/// Homography `H` with `dst ≈ project(H, src)`, from four or more pairs.
pub fn estimate_homography_dlt(
    src: &[[f64; 2]],
    dst: &[[f64; 2]],
) -> Result<Matrix3<f64>, HomographyError> {
    if src.len() != dst.len() {
        return Err(HomographyError::CountMismatch {
            src: src.len(),
            dst: dst.len(),
        });
    }
    let n = src.len();
    if n < 4 {
        return Err(HomographyError::TooFewPoints { got: n });
    }
    if is_degenerate(src) || is_degenerate(dst) {
        return Err(HomographyError::Degenerate);
    }

    let cs = Conditioner::fit(src);
    let cd = Conditioner::fit(dst);
    let mut a = DMatrix::<f64>::zeros(2 * n, 8);
    let mut b = DVector::<f64>::zeros(2 * n);
    for (i, (s, d)) in src.iter().zip(dst).enumerate() {
        let [x, y] = cs.apply(*s);
        let [u, v] = cd.apply(*d);
        let (r0, r1) = (2 * i, 2 * i + 1);
        // u · (h31 x + h32 y + 1) = h11 x + h12 y + h13, same for v.
        a[(r0, 0)] = x;
        a[(r0, 1)] = y;
        a[(r0, 2)] = 1.0;
        a[(r0, 6)] = -u * x;
        a[(r0, 7)] = -u * y;
        b[r0] = u;
        a[(r1, 3)] = x;
        a[(r1, 4)] = y;
        a[(r1, 5)] = 1.0;
        a[(r1, 6)] = -v * x;
        a[(r1, 7)] = -v * y;
        b[r1] = v;
    }
    let sol = a
        .svd(true, true)
        .solve(&b, 1e-12)
        .map_err(|_| HomographyError::Singular)?;
    let conditioned = Matrix3::new(
        sol[0], sol[1], sol[2], sol[3], sol[4], sol[5], sol[6], sol[7], 1.0,
    );

    let h = cd.inverse_matrix() * conditioned * cs.matrix();
    let h33 = h[(2, 2)];
    if !h33.is_finite() || h33.abs() < 1e-15 {
        return Err(HomographyError::Singular);
    }
    let h = h / h33;
    if h.iter().any(|v| !v.is_finite()) || h.determinant().abs() < 1e-15 {
        return Err(HomographyError::Singular);
    }
    Ok(h)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn perspective() -> Matrix3<f64> {
        Matrix3::new(1.2, 0.15, 30.0, -0.1, 0.9, 12.0, 4e-4, -2e-4, 1.0)
    }

    #[test]
    fn four_corners_are_mapped_exactly() {
        let h_true = perspective();
        let src = [[0.0, 0.0], [64.0, 0.0], [64.0, 64.0], [0.0, 64.0]];
        let dst = src.map(|s| project(&h_true, s[0], s[1]));
        let h = estimate_homography_dlt(&src, &dst).unwrap();
        for (s, d) in src.iter().zip(&dst) {
            assert!(reprojection_error(&h, s, d) < 1e-8);
        }
        for (a, b) in h.iter().zip(h_true.iter()) {
            assert_relative_eq!(*a, *b, epsilon = 1e-8, max_relative = 1e-8);
        }
    }

    #[test]
    fn extra_points_are_fit_consistently() {
        let h_true = perspective();
        let src = [
            [0.0, 0.0],
            [50.0, 5.0],
            [55.0, 60.0],
            [3.0, 48.0],
            [25.0, 25.0],
            [40.0, 12.0],
        ];
        let dst: Vec<[f64; 2]> = src.iter().map(|s| project(&h_true, s[0], s[1])).collect();
        let h = estimate_homography_dlt(&src, &dst).unwrap();
        for (s, d) in src.iter().zip(&dst) {
            assert!(reprojection_error(&h, s, d) < 1e-7);
        }
    }

    #[test]
    fn same_quad_gives_identity() {
        let q = [[10.0, 12.0], [90.0, 8.0], [95.0, 70.0], [5.0, 80.0]];
        let h = estimate_homography_dlt(&q, &q).unwrap();
        for (a, b) in h.iter().zip(Matrix3::<f64>::identity().iter()) {
            assert_relative_eq!(*a, *b, epsilon = 1e-9);
        }
    }

    #[test]
    fn inverse_undoes_projection() {
        let h = perspective();
        let inv = invert(&h).unwrap();
        let q = project(&h, 17.0, 41.0);
        let p = project(&inv, q[0], q[1]);
        assert_relative_eq!(p[0], 17.0, epsilon = 1e-9);
        assert_relative_eq!(p[1], 41.0, epsilon = 1e-9);
        assert_eq!(invert(&Matrix3::zeros()), Err(HomographyError::Singular));
    }

    #[test]
    fn bad_inputs_are_rejected() {
        let three = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0]];
        assert_eq!(
            estimate_homography_dlt(&three, &three),
            Err(HomographyError::TooFewPoints { got: 3 })
        );
        let sq = [[0.0, 0.0], [10.0, 0.0], [10.0, 10.0], [0.0, 10.0]];
        assert!(matches!(
            estimate_homography_dlt(&sq, &sq[..3]),
            Err(HomographyError::CountMismatch { src: 4, dst: 3 })
        ));
        let flat = [[0.0, 0.0], [10.0, 0.0], [20.0, 0.0], [30.0, 0.001]];
        assert!(is_degenerate(&flat));
        assert_eq!(
            estimate_homography_dlt(&flat, &sq),
            Err(HomographyError::Degenerate)
        );
        let nan = [[0.0, 0.0], [f64::NAN, 0.0], [1.0, 1.0], [0.0, 1.0]];
        assert!(is_degenerate(&nan));
    }
}
