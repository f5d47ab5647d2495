//! Marker hiding on a rectified canvas solved in the background.
//!
//! The frame is warped so that the marker becomes an axis-aligned square in
//! the middle of a square canvas:
//!
//! ```text
//! +---------------------------+
//! | vicinity                  |
//! |   +-------------------+   |
//! |   | margin            |   |
//! |   |   +-----------+   |   |
//! |   |   |  marker   |   |   |
//! |   |   +-----------+   |   |
//! |   |                   |   |
//! |   +-------------------+   |
//! |                           |
//! +---------------------------+
//! ```
//!
//! The marker plus margin (the ROI) is the hole; the vicinity band is the
//! source region. Each displayed frame warps the latest preview back into
//! camera space and Poisson-clones the ROI into the live frame.

use std::sync::{Arc, Mutex};

use image::RgbImage;

use crate::background::{BackgroundSolver, SolverState};
use crate::blend::seamless_clone;
use crate::error::InpaintError;
use crate::marker::Marker;
use crate::params::InpaintParams;
use crate::quad::Quad;
use crate::warp::warp_perspective_rgb;

/// Canvas sizing and compositing options.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct CanvasConfig {
    /// Marker side length on the canvas.
    pub marker_size_px: u32,
    /// Upper bound on the canvas side length.
    pub max_canvas_size: u32,
    /// SOR sweeps of the seamless clone.
    pub clone_iterations: usize,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            marker_size_px: 128,
            max_canvas_size: 768,
            clone_iterations: 100,
        }
    }
}

/// Pixel geometry of the canvas.
#[derive(Debug, Clone, PartialEq)]
pub struct CanvasLayout {
    pub canvas_size: u32,
    pub margin_px: u32,
    pub vicinity_px: u32,
    /// Marker square, detector corner order.
    pub marker_quad: Quad,
    /// Marker + margin square with inclusive pixel extents.
    pub roi_quad: Quad,
}

impl CanvasLayout {
    pub fn new(marker: &Marker, config: &CanvasConfig) -> Result<Self, InpaintError> {
        if !(marker.size.is_finite() && marker.size > 0.0) || config.marker_size_px == 0 {
            return Err(InpaintError::EmptyImage);
        }
        let marker_px = config.marker_size_px as i64;
        let ratio = config.marker_size_px as f64 / marker.size;
        let margin_px = (marker.margin.max(0.0) * ratio) as i64;
        // At least one known pixel ring around the ROI.
        let vicinity_px = ((config.max_canvas_size as i64 - marker_px - 2 * margin_px) / 2).max(1);
        let canvas_size = marker_px + 2 * (vicinity_px + margin_px);

        let marker_origin = (vicinity_px + margin_px) as f64;
        let roi_side = marker_px + 2 * margin_px;
        Ok(Self {
            canvas_size: canvas_size as u32,
            margin_px: margin_px as u32,
            vicinity_px: vicinity_px as u32,
            marker_quad: Quad::square(marker_origin, marker_origin, marker_px as f64),
            roi_quad: Quad::square(vicinity_px as f64, vicinity_px as f64, (roi_side - 1) as f64),
        })
    }
}

/// Background-solved marker hider.
pub struct CanvasHider {
    layout: CanvasLayout,
    config: CanvasConfig,
    solver: BackgroundSolver,
}

impl CanvasHider {
    pub fn new(marker: &Marker, config: CanvasConfig) -> Result<Self, InpaintError> {
        Ok(Self {
            layout: CanvasLayout::new(marker, &config)?,
            config,
            solver: BackgroundSolver::new(),
        })
    }

    /// Same as [`new`](Self::new), with workers serialized on `lock`.
    pub fn with_exclusive_lock(
        marker: &Marker,
        config: CanvasConfig,
        lock: Arc<Mutex<()>>,
    ) -> Result<Self, InpaintError> {
        Ok(Self {
            layout: CanvasLayout::new(marker, &config)?,
            config,
            solver: BackgroundSolver::with_exclusive_lock(lock),
        })
    }

    pub fn layout(&self) -> &CanvasLayout {
        &self.layout
    }

    /// Rectify `frame` onto the canvas and start a background solve.
    ///
    /// Returns `Ok(false)` when the frame is untracked.
    pub fn start(
        &mut self,
        frame: &RgbImage,
        corners: Option<&[[f64; 2]]>,
        params: &InpaintParams,
    ) -> Result<bool, InpaintError> {
        let Some(corners) = corners.filter(|c| !c.is_empty()) else {
            return Ok(false);
        };
        let quad = Quad::from_points(corners)?;
        let size = self.layout.canvas_size;
        let h = quad.homography_to(&self.layout.marker_quad)?;
        let canvas = warp_perspective_rgb(frame, &h, size, size)?;
        let mask = self.layout.roi_quad.hole_mask(size, size)?;
        self.solver.start(&canvas, &mask, params)?;
        tracing::info!(canvas = size, "canvas solve started");
        Ok(true)
    }

    /// Latest canvas preview, rectified.
    pub fn preview(&self) -> Option<RgbImage> {
        self.solver.poll_preview()
    }

    /// Blend the latest preview into `frame` at the marker's current pose.
    ///
    /// `Ok(None)` when untracked or before the first preview.
    pub fn composite(
        &self,
        frame: &RgbImage,
        corners: Option<&[[f64; 2]]>,
    ) -> Result<Option<RgbImage>, InpaintError> {
        let Some(corners) = corners.filter(|c| !c.is_empty()) else {
            return Ok(None);
        };
        let quad = Quad::from_points(corners)?;
        let (w, h) = frame.dimensions();
        if w == 0 || h == 0 {
            return Err(InpaintError::EmptyImage);
        }
        let Some(preview) = self.solver.poll_preview() else {
            return Ok(None);
        };

        let back = self.layout.marker_quad.homography_to(&quad)?;
        let warped = warp_perspective_rgb(&preview, &back, w, h)?;
        let roi = self.layout.roi_quad.transformed(&back);
        let region = roi.region_mask(w, h)?;
        let out = seamless_clone(
            &warped,
            &region,
            frame,
            roi.centroid(),
            self.config.clone_iterations,
        )?;
        Ok(Some(out))
    }

    pub fn is_done(&self) -> bool {
        self.solver.is_done()
    }

    pub fn state(&self) -> SolverState {
        self.solver.state()
    }

    pub fn cancel(&self) {
        self.solver.cancel();
    }

    /// Cancel and join the background solve.
    pub fn stop(&mut self) -> Result<(), InpaintError> {
        self.solver.stop()
    }

    /// Wait for the background solve without cancelling it.
    pub fn join(&mut self) -> Result<(), InpaintError> {
        self.solver.join()
    }
}
