//! Error taxonomy shared by the inpainting engine.
//!
//! Every failure is local and recoverable: malformed input is rejected before
//! any solver state is touched, degenerate geometry skips the current frame.

use crate::homography::HomographyError;

#[derive(Debug, Clone, PartialEq)]
pub enum InpaintError {
    /// Two buffers that must share an extent do not.
    ExtentMismatch {
        what: &'static str,
        expected: [u32; 2],
        got: [u32; 2],
    },
    /// Input image has zero width or height.
    EmptyImage,
    /// A quadrilateral was built from the wrong number of points.
    QuadPointCount { expected: usize, got: usize },
    /// The quadrilateral is (nearly) collinear or contains non-finite points.
    DegenerateQuad,
    /// Homography estimation failed.
    Homography(HomographyError),
    /// The mask marks every pixel as hole; there is nothing to copy from.
    NoKnownPixels,
    /// The background worker could not be spawned or panicked.
    Worker(String),
}

impl std::fmt::Display for InpaintError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ExtentMismatch {
                what,
                expected,
                got,
            } => write!(
                f,
                "{} extent mismatch: expected {}x{}, got {}x{}",
                what, expected[0], expected[1], got[0], got[1]
            ),
            Self::EmptyImage => write!(f, "image has zero extent"),
            Self::QuadPointCount { expected, got } => {
                write!(f, "quadrilateral needs {} points, got {}", expected, got)
            }
            Self::DegenerateQuad => write!(f, "quadrilateral is degenerate"),
            Self::Homography(e) => write!(f, "homography: {}", e),
            Self::NoKnownPixels => write!(f, "mask has no known pixels"),
            Self::Worker(msg) => write!(f, "background worker: {}", msg),
        }
    }
}

impl std::error::Error for InpaintError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Homography(e) => Some(e),
            _ => None,
        }
    }
}

impl From<HomographyError> for InpaintError {
    fn from(e: HomographyError) -> Self {
        match e {
            HomographyError::Degenerate => Self::DegenerateQuad,
            other => Self::Homography(other),
        }
    }
}

/// Check that `got` matches `expected`, naming the offending buffer.
pub(crate) fn ensure_extent(
    what: &'static str,
    expected: (u32, u32),
    got: (u32, u32),
) -> Result<(), InpaintError> {
    if expected == got {
        Ok(())
    } else {
        Err(InpaintError::ExtentMismatch {
            what,
            expected: [expected.0, expected.1],
            got: [got.0, got.1],
        })
    }
}
