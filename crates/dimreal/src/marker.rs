//! Tracked marker description and per-frame tracking records.

use std::path::{Path, PathBuf};

use crate::error::InpaintError;
use crate::quad::Quad;

/// Physical description of the marker being hidden.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Marker {
    pub id: i32,
    /// Side length (metres or any consistent unit).
    pub size: f64,
    /// Extra band hidden around the marker, same unit as `size`.
    #[serde(default)]
    pub margin: f64,
}

impl Marker {
    pub fn new(id: i32, size: f64, margin: f64) -> Self {
        Self { id, size, margin }
    }

    /// Marker square in its own plane, in detector corner order.
    pub fn canonical_quad(&self) -> Quad {
        Quad::square(0.0, 0.0, self.size)
    }

    /// Canonical square grown by `margin` on every side.
    pub fn canonical_hole_quad(&self) -> Quad {
        Quad::square(-self.margin, -self.margin, self.size + 2.0 * self.margin)
    }

    /// Image-space quad to hide: the detected corners pushed outward by the
    /// margin through the plane homography.
    pub fn hole_quad(&self, corners: &Quad) -> Result<Quad, InpaintError> {
        if !(self.size.is_finite() && self.size > 0.0) {
            return Err(InpaintError::DegenerateQuad);
        }
        let h = self.canonical_quad().homography_to(corners)?;
        Ok(self.canonical_hole_quad().transformed(&h))
    }
}

/// One frame of a tracking log.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TrackedFrame {
    pub image: PathBuf,
    /// Detected corners, `None` (or empty) when the marker was not found.
    #[serde(default)]
    pub corners: Option<Vec<[f64; 2]>>,
}

impl TrackedFrame {
    /// Corners of a tracked frame; `None` for absent or empty detections.
    pub fn tracked_corners(&self) -> Option<&[[f64; 2]]> {
        self.corners.as_deref().filter(|c| !c.is_empty())
    }
}

/// Marker description plus per-frame detections.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TrackLog {
    pub marker: Marker,
    pub frames: Vec<TrackedFrame>,
}

impl TrackLog {
    /// Load a tracking log; relative image paths resolve against the log's
    /// directory.
    pub fn from_json_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let data = std::fs::read_to_string(path)?;
        let mut log: Self = serde_json::from_str(&data)?;
        if let Some(dir) = path.parent() {
            for frame in &mut log.frames {
                if frame.image.is_relative() {
                    frame.image = dir.join(&frame.image);
                }
            }
        }
        Ok(log)
    }

    pub fn tracked_count(&self) -> usize {
        self.frames
            .iter()
            .filter(|f| f.tracked_corners().is_some())
            .count()
    }
}
