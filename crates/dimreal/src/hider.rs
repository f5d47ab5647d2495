//! Synchronous frame-loop driver: full keyframe solves plus cheap
//! warm-started updates in between.

use image::{GrayImage, RgbImage};

use crate::error::InpaintError;
use crate::keyframe::Keyframe;
use crate::marker::Marker;
use crate::params::InpaintParams;
use crate::pyramid::{PyramidSolver, Solve};
use crate::quad::Quad;
use crate::warm_start;

/// Hides one marker across a frame sequence.
///
/// `reset` runs the full pyramid and stores the result as the keyframe;
/// `run` reprojects the keyframe into the current pose and refines it. Both
/// treat absent corners as "no update this frame". On error nothing is
/// mutated, so the previous keyframe stays usable.
#[derive(Debug, Clone)]
pub struct MarkerHider {
    marker: Marker,
    keyframe: Option<Keyframe>,
}

impl MarkerHider {
    pub fn new(marker: Marker) -> Self {
        Self {
            marker,
            keyframe: None,
        }
    }

    pub fn marker(&self) -> &Marker {
        &self.marker
    }

    pub fn is_initialized(&self) -> bool {
        self.keyframe.is_some()
    }

    pub fn keyframe(&self) -> Option<&Keyframe> {
        self.keyframe.as_ref()
    }

    /// Drop the keyframe; the next `run` is a no-op until a `reset`.
    pub fn clear(&mut self) {
        self.keyframe = None;
    }

    /// Full solve of `frame`, replacing the keyframe.
    pub fn reset(
        &mut self,
        frame: &RgbImage,
        corners: Option<&[[f64; 2]]>,
        params: &InpaintParams,
    ) -> Result<Option<Solve>, InpaintError> {
        let Some(corners) = corners.filter(|c| !c.is_empty()) else {
            return Ok(None);
        };
        let (quad, mask) = self.hole_for(frame, corners).map_err(log_skip)?;
        let solve = PyramidSolver::new(params.clone()).solve(frame, &mask)?;
        self.keyframe = Some(Keyframe::new(solve.clone(), mask, quad)?);
        tracing::info!(marker = self.marker.id, "keyframe replaced");
        Ok(Some(solve))
    }

    /// Warm-started update of `frame` from the stored keyframe.
    ///
    /// `Ok(None)` when untracked or before the first `reset`.
    pub fn run(
        &self,
        frame: &RgbImage,
        corners: Option<&[[f64; 2]]>,
        params: &InpaintParams,
    ) -> Result<Option<Solve>, InpaintError> {
        let corners = corners.filter(|c| !c.is_empty());
        let (Some(corners), Some(keyframe)) = (corners, self.keyframe.as_ref()) else {
            return Ok(None);
        };
        let (quad, mask) = self.hole_for(frame, corners).map_err(log_skip)?;
        let solver = PyramidSolver::new(params.clone());
        let warped = keyframe.warped(&quad).map_err(log_skip)?;
        let mut rng = solver.params().rng();
        let radius = solver.params().patch_radius;
        let seed = warm_start::repair(warped, frame, &mask, radius, &mut rng)?;
        solver.refine(frame, seed).map(Some)
    }

    fn hole_for(
        &self,
        frame: &RgbImage,
        corners: &[[f64; 2]],
    ) -> Result<(Quad, GrayImage), InpaintError> {
        let (w, h) = frame.dimensions();
        if w == 0 || h == 0 {
            return Err(InpaintError::EmptyImage);
        }
        let quad = Quad::from_points(corners)?;
        let mask = self.marker.hole_quad(&quad)?.hole_mask(w, h)?;
        Ok((quad, mask))
    }
}

fn log_skip(e: InpaintError) -> InpaintError {
    tracing::warn!(error = %e, "frame update skipped");
    e
}
