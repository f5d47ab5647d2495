//! dimreal CLI — hide tracked planar markers in image sequences.

use clap::{Args, Parser, Subcommand};
use dimreal::{
    draw_axes, Calibration, CameraModel, CanvasConfig, CanvasHider, InpaintParams, Marker,
    MarkerHider, NnfField, PlanarPose, PyramidSolver, Quad, TrackLog,
};
use image::{Rgb, RgbImage};
use std::path::{Path, PathBuf};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "dimreal")]
#[command(about = "Remove tracked planar markers from images by exemplar-based inpainting")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inpaint a single image with an explicit hole mask.
    Inpaint(CliInpaintArgs),

    /// Hide a marker across a tracked frame sequence (keyframe + warm start).
    Hide(CliHideArgs),

    /// Hide a marker using a background solve on a rectified canvas.
    HideAsync(CliHideAsyncArgs),

    /// Print a calibration document.
    CalibInfo {
        /// Calibration JSON.
        #[arg(long)]
        calibration: PathBuf,
    },
}

#[derive(Debug, Clone, Args, Default)]
struct CliParamsArgs {
    /// JSON file with solver parameters; replaces the command's preset.
    #[arg(long)]
    params: Option<PathBuf>,
    /// Warm-start trust in [0, 1].
    #[arg(long)]
    alpha: Option<f32>,
    /// Sweeps per pyramid level.
    #[arg(long)]
    max_itr: Option<usize>,
    /// Random-search probes per pixel and sweep.
    #[arg(long)]
    max_rand_search_itr: Option<usize>,
    /// Maximum number of pyramid levels.
    #[arg(long)]
    max_pyramid_level: Option<usize>,
    /// Box-filter width for hole-boundary feathering.
    #[arg(long)]
    blur_size: Option<u32>,
    /// Patch half width.
    #[arg(long)]
    patch_radius: Option<u32>,
    /// RNG seed for reproducible output.
    #[arg(long)]
    seed: Option<u64>,
}

impl CliParamsArgs {
    fn resolve(&self, preset: InpaintParams) -> CliResult<InpaintParams> {
        let mut p = match &self.params {
            Some(path) => InpaintParams::from_json_file(path)?,
            None => preset,
        };
        if let Some(v) = self.alpha {
            p.alpha = v;
        }
        if let Some(v) = self.max_itr {
            p.max_itr = v;
        }
        if let Some(v) = self.max_rand_search_itr {
            p.max_rand_search_itr = v;
        }
        if let Some(v) = self.max_pyramid_level {
            p.max_pyramid_level = v;
        }
        if let Some(v) = self.blur_size {
            p.blur_size = v;
        }
        if let Some(v) = self.patch_radius {
            p.patch_radius = v;
        }
        if self.seed.is_some() {
            p.seed = self.seed;
        }
        Ok(p.sanitized())
    }
}

#[derive(Debug, Clone, Args)]
struct CliInpaintArgs {
    /// Input image.
    #[arg(long)]
    image: PathBuf,
    /// Mask image: 0 = hole, 255 = known.
    #[arg(long)]
    mask: PathBuf,
    /// Output image.
    #[arg(long)]
    out: PathBuf,
    /// Optional color-coded NNF visualization.
    #[arg(long)]
    nnf_viz: Option<PathBuf>,
    #[command(flatten)]
    params: CliParamsArgs,
}

#[derive(Debug, Clone, Args)]
struct CliHideArgs {
    /// Tracking log JSON (marker + per-frame corners).
    #[arg(long)]
    track: PathBuf,
    /// Directory for the output frames.
    #[arg(long)]
    out_dir: PathBuf,
    /// Rebuild the keyframe every N tracked frames (0 = only on the first).
    #[arg(long, default_value_t = 0)]
    reset_every: usize,
    /// Calibration JSON, required by --draw-axes.
    #[arg(long)]
    calibration: Option<PathBuf>,
    /// Overlay the marker's pose axes.
    #[arg(long, requires = "calibration")]
    draw_axes: bool,
    /// Keyframe solver parameters (the per-frame update uses the incremental preset).
    #[command(flatten)]
    params: CliParamsArgs,
}

#[derive(Debug, Clone, Args)]
struct CliHideAsyncArgs {
    /// Tracking log JSON (marker + per-frame corners).
    #[arg(long)]
    track: PathBuf,
    /// Directory for the output frames.
    #[arg(long)]
    out_dir: PathBuf,
    /// Canvas configuration JSON.
    #[arg(long)]
    canvas: Option<PathBuf>,
    /// Marker side length on the canvas (overrides --canvas).
    #[arg(long)]
    marker_size_px: Option<u32>,
    /// Canvas side length cap (overrides --canvas).
    #[arg(long)]
    max_canvas_size: Option<u32>,
    /// Start a new background solve whenever the previous one has finished.
    #[arg(long)]
    restart_when_done: bool,
    /// Block on the first solve before compositing.
    #[arg(long)]
    wait_first: bool,
    #[command(flatten)]
    params: CliParamsArgs,
}

fn main() -> CliResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Inpaint(args) => run_inpaint(&args),
        Commands::Hide(args) => run_hide(&args),
        Commands::HideAsync(args) => run_hide_async(&args),
        Commands::CalibInfo { calibration } => run_calib_info(&calibration),
    }
}

fn load_rgb(path: &Path) -> CliResult<RgbImage> {
    let img = image::open(path).map_err(|e| -> CliError {
        format!("Failed to open image {}: {}", path.display(), e).into()
    })?;
    Ok(img.to_rgb8())
}

fn frame_path(dir: &Path, index: usize) -> PathBuf {
    dir.join(format!("frame_{:05}.png", index))
}

/// NNF as color: red 255, green follows the source row, blue the column.
fn nnf_visualization(nnf: &NnfField) -> RgbImage {
    let (w, h) = nnf.dimensions();
    let sx = 255.0 / (w.max(2) - 1) as f32;
    let sy = 255.0 / (h.max(2) - 1) as f32;
    RgbImage::from_fn(w, h, |x, y| {
        let f = nnf.get(x, y);
        Rgb([
            255,
            (f[1] as f32 * sy).round().clamp(0.0, 255.0) as u8,
            (f[0] as f32 * sx).round().clamp(0.0, 255.0) as u8,
        ])
    })
}

// ── inpaint ────────────────────────────────────────────────────────────

fn run_inpaint(args: &CliInpaintArgs) -> CliResult<()> {
    tracing::info!("Loading image: {}", args.image.display());
    let image = load_rgb(&args.image)?;
    let mask = image::open(&args.mask)
        .map_err(|e| -> CliError {
            format!("Failed to open mask {}: {}", args.mask.display(), e).into()
        })?
        .to_luma8();
    let (w, h) = image.dimensions();
    tracing::info!("Image size: {}x{}", w, h);

    let params = args.params.resolve(InpaintParams::keyframe())?;
    let solve = PyramidSolver::new(params).solve(&image, &mask)?;
    solve.color.save(&args.out)?;
    tracing::info!("Result written to {}", args.out.display());

    if let Some(path) = &args.nnf_viz {
        nnf_visualization(&solve.nnf).save(path)?;
        tracing::info!("NNF visualization written to {}", path.display());
    }
    Ok(())
}

// ── hide ───────────────────────────────────────────────────────────────

fn load_camera(path: Option<&Path>) -> CliResult<Option<CameraModel>> {
    match path {
        Some(p) => Ok(Some(Calibration::from_json_file(p)?.camera_model()?)),
        None => Ok(None),
    }
}

fn overlay_axes(
    out: &mut RgbImage,
    marker: &Marker,
    corners: &[[f64; 2]],
    camera: &CameraModel,
) {
    let pose = Quad::from_points(corners)
        .and_then(|quad| PlanarPose::from_corners(marker, &quad, camera));
    match pose {
        Ok(pose) => draw_axes(out, &pose, camera, marker.size * 0.5),
        Err(e) => tracing::warn!("Pose estimation failed: {}", e),
    }
}

fn run_hide(args: &CliHideArgs) -> CliResult<()> {
    let log = TrackLog::from_json_file(&args.track)?;
    std::fs::create_dir_all(&args.out_dir)?;
    let camera = load_camera(args.calibration.as_deref())?;
    let reset_params = args.params.resolve(InpaintParams::keyframe())?;
    let mut run_params = InpaintParams::incremental();
    run_params.seed = reset_params.seed;

    tracing::info!(
        "Marker {} (size {}, margin {}), {} frames, {} tracked",
        log.marker.id,
        log.marker.size,
        log.marker.margin,
        log.frames.len(),
        log.tracked_count()
    );

    let mut hider = MarkerHider::new(log.marker);
    let mut tracked = 0usize;
    for (i, frame) in log.frames.iter().enumerate() {
        let image = load_rgb(&frame.image)?;
        let corners = frame.tracked_corners();

        let wants_reset = !hider.is_initialized()
            || (args.reset_every > 0 && tracked % args.reset_every == 0);
        let solved = if corners.is_none() {
            Ok(None)
        } else if wants_reset {
            hider.reset(&image, corners, &reset_params)
        } else {
            hider.run(&image, corners, &run_params)
        };
        if corners.is_some() {
            tracked += 1;
        }

        let mut out = match solved {
            Ok(Some(solve)) => solve.color,
            Ok(None) => {
                tracing::debug!("Frame {}: no update", i);
                image
            }
            Err(e) => {
                tracing::warn!("Frame {}: skipped ({})", i, e);
                image
            }
        };
        if let (true, Some(cam), Some(c)) = (args.draw_axes, camera.as_ref(), corners) {
            overlay_axes(&mut out, &log.marker, c, cam);
        }
        out.save(frame_path(&args.out_dir, i))?;
    }
    tracing::info!("Frames written to {}", args.out_dir.display());
    Ok(())
}

// ── hide-async ─────────────────────────────────────────────────────────

fn run_hide_async(args: &CliHideAsyncArgs) -> CliResult<()> {
    let log = TrackLog::from_json_file(&args.track)?;
    std::fs::create_dir_all(&args.out_dir)?;

    let mut config = match &args.canvas {
        Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
        None => CanvasConfig::default(),
    };
    if let Some(v) = args.marker_size_px {
        config.marker_size_px = v;
    }
    if let Some(v) = args.max_canvas_size {
        config.max_canvas_size = v;
    }
    let params = args.params.resolve(InpaintParams::background())?;

    let mut hider = CanvasHider::new(&log.marker, config)?;
    tracing::info!("Canvas size: {}", hider.layout().canvas_size);
    let mut started = false;
    for (i, frame) in log.frames.iter().enumerate() {
        let image = load_rgb(&frame.image)?;
        let corners = frame.tracked_corners();

        let restart = args.restart_when_done && hider.is_done();
        if corners.is_some() && (!started || restart) {
            match hider.start(&image, corners, &params) {
                Ok(true) => {
                    started = true;
                    if args.wait_first {
                        hider.join()?;
                    }
                }
                Ok(false) => {}
                Err(e) => tracing::warn!("Frame {}: solve not started ({})", i, e),
            }
        }

        let out = match hider.composite(&image, corners) {
            Ok(Some(out)) => out,
            Ok(None) => image,
            Err(e) => {
                tracing::warn!("Frame {}: composite skipped ({})", i, e);
                image
            }
        };
        out.save(frame_path(&args.out_dir, i))?;
    }
    hider.stop()?;
    tracing::info!("Frames written to {}", args.out_dir.display());
    Ok(())
}

// ── calib-info ─────────────────────────────────────────────────────────

fn run_calib_info(path: &Path) -> CliResult<()> {
    let calib = Calibration::from_json_file(path)?;
    let cam = calib.camera_model()?;
    println!("dimreal calibration");
    println!("  image size:  {}x{}", calib.image_size[0], calib.image_size[1]);
    println!(
        "  focal:       fx={:.3} fy={:.3}",
        cam.intrinsics.fx, cam.intrinsics.fy
    );
    println!(
        "  principal:   cx={:.3} cy={:.3}",
        cam.intrinsics.cx, cam.intrinsics.cy
    );
    let d = cam.distortion;
    println!(
        "  distortion:  k1={:.6} k2={:.6} p1={:.6} p2={:.6} k3={:.6}",
        d.k1, d.k2, d.p1, d.p2, d.k3
    );
    if calib.dist_coeffs.len() > 5 {
        println!(
            "  ({} extra coefficients ignored)",
            calib.dist_coeffs.len() - 5
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_apply_on_top_of_preset() {
        let args = CliParamsArgs {
            max_itr: Some(3),
            alpha: Some(2.0),
            seed: Some(9),
            ..Default::default()
        };
        let p = args.resolve(InpaintParams::keyframe()).unwrap();
        assert_eq!(p.max_itr, 3);
        assert_eq!(p.alpha, 1.0);
        assert_eq!(p.seed, Some(9));
        assert_eq!(p.max_rand_search_itr, InpaintParams::keyframe().max_rand_search_itr);
    }

    #[test]
    fn nnf_visualization_encodes_coordinates() {
        let nnf = NnfField::identity(3, 5);
        let viz = nnf_visualization(&nnf);
        assert_eq!(viz.get_pixel(0, 0).0, [255, 0, 0]);
        assert_eq!(viz.get_pixel(2, 4).0, [255, 255, 255]);
    }

    #[test]
    fn cli_parses_hide_flags() {
        let cli = Cli::try_parse_from([
            "dimreal",
            "hide",
            "--track",
            "t.json",
            "--out-dir",
            "out",
            "--reset-every",
            "10",
            "--max-itr",
            "4",
        ])
        .unwrap();
        match cli.command {
            Commands::Hide(args) => {
                assert_eq!(args.reset_every, 10);
                assert_eq!(args.params.max_itr, Some(4));
                assert!(!args.draw_axes);
            }
            _ => panic!("expected hide"),
        }
    }
}
