//! dimreal — diminished reality for tracked planar markers.
//!
//! Removes a marker from video frames and fills the vacated region with
//! plausible background using an exemplar-based, PatchMatch-family solver.
//! The pieces, leaves first:
//!
//! 1. **Patch search** – randomized nearest-neighbor-field search on a single
//!    resolution ([`PatchSearch`]).
//! 2. **Pyramid** – coarse-to-fine orchestration plus hole-boundary
//!    feathering ([`PyramidSolver`]).
//! 3. **Keyframe** – a stored full solve that can be reprojected into a new
//!    marker pose through a homography ([`Keyframe`]).
//! 4. **Warm start** – repairs a reprojected keyframe against the current
//!    mask so it can seed a cheap refinement ([`warm_start::repair`]).
//! 5. **Background** – a cancellable worker-thread solve with live previews
//!    ([`BackgroundSolver`]).
//! 6. **Compositing** – rectified-canvas solving and Poisson cloning back into
//!    the live frame ([`CanvasHider`], [`seamless_clone`]).
//!
//! [`MarkerHider`] drives 1–4 from a frame loop: `reset` builds a keyframe,
//! `run` reuses it.

pub mod background;
pub mod blend;
pub mod camera;
pub mod canvas;
mod error;
pub mod grid;
pub mod hider;
pub mod homography;
pub mod keyframe;
pub mod marker;
mod params;
pub mod patch_search;
pub mod pose;
pub mod pyramid;
pub mod quad;
pub mod warm_start;
pub mod warp;

#[cfg(test)]
pub(crate) mod test_utils;

pub use background::{BackgroundSolver, SolverState};
pub use blend::seamless_clone;
pub use camera::{BrownConrady, Calibration, CalibrationError, CameraModel, Intrinsics};
pub use canvas::{CanvasConfig, CanvasHider, CanvasLayout};
pub use error::InpaintError;
pub use grid::{CostMap, Grid, NnfField};
pub use hider::MarkerHider;
pub use homography::HomographyError;
pub use keyframe::{Keyframe, WarpedKeyframe};
pub use marker::{Marker, TrackLog, TrackedFrame};
pub use params::InpaintParams;
pub use patch_search::PatchSearch;
pub use pose::{draw_axes, PlanarPose};
pub use pyramid::{PyramidSolver, Solve, SolveObserver};
pub use quad::{Quad, HOLE, KNOWN};
pub use warm_start::WarmStart;
