//! Solver configuration.

use std::path::Path;

use rand::rngs::StdRng;
use rand::SeedableRng;

/// Tuning knobs for one inpainting solve.
///
/// Deserializes from partial JSON: absent fields keep their default.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct InpaintParams {
    /// Warm-start trust in [0, 1].
    ///
    /// A warm-started pixel begins with cost
    /// `alpha · warped_cost + (1 − alpha) · fresh_cost`. `0` evaluates every
    /// seed afresh; larger values make stale seeds harder to displace.
    pub alpha: f32,
    /// Propagation + random-search sweeps per pyramid level.
    pub max_itr: usize,
    /// Random-search probes per pixel and sweep.
    pub max_rand_search_itr: usize,
    /// Upper bound on the number of pyramid levels (level 0 included).
    pub max_pyramid_level: usize,
    /// Box-filter width used to feather the hole boundary.
    pub blur_size: u32,
    /// Half width of the square patch window.
    pub patch_radius: u32,
    /// Fixed RNG seed; `None` draws from OS entropy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for InpaintParams {
    fn default() -> Self {
        Self {
            alpha: 0.5,
            max_itr: 1,
            max_rand_search_itr: 1,
            max_pyramid_level: 7,
            blur_size: 5,
            patch_radius: 2,
            seed: None,
        }
    }
}

impl InpaintParams {
    /// Sweep cap applied at the finest level; the coarser levels already
    /// deliver a near-converged field.
    pub const FINEST_LEVEL_MAX_ITR: usize = 2;

    /// Budget for building a fresh keyframe.
    pub fn keyframe() -> Self {
        Self {
            alpha: 0.5,
            max_itr: 10,
            ..Self::default()
        }
    }

    /// Budget for a warm-started per-frame refinement.
    pub fn incremental() -> Self {
        Self {
            alpha: 0.0,
            max_itr: 1,
            ..Self::default()
        }
    }

    /// Budget for the background (canvas) solve.
    pub fn background() -> Self {
        Self {
            alpha: 0.5,
            max_itr: 20,
            max_rand_search_itr: 20,
            ..Self::default()
        }
    }

    /// Same parameters with a fixed seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Load parameters from a JSON file; missing fields keep their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let data = std::fs::read_to_string(path)?;
        let params: Self = serde_json::from_str(&data)?;
        Ok(params.sanitized())
    }

    /// Master RNG for one solve: seeded if `seed` is set, else from entropy.
    pub fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }

    /// Clamp values into their meaningful ranges.
    pub fn sanitized(mut self) -> Self {
        self.alpha = if self.alpha.is_finite() {
            self.alpha.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self.max_pyramid_level = self.max_pyramid_level.max(1);
        self.blur_size = self.blur_size.max(1);
        self
    }
}
