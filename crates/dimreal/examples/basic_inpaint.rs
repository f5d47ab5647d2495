use dimreal::{InpaintParams, PyramidSolver, Quad};
use image::ImageReader;
use std::error::Error;
use std::path::Path;

fn main() -> Result<(), Box<dyn Error>> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 6 {
        eprintln!(
            "Usage: {} <image.png> <x0> <y0> <side_px> <out.png> [params.json]",
            args[0]
        );
        std::process::exit(2);
    }

    let image = ImageReader::open(&args[1])?.decode()?.to_rgb8();
    let x0: f64 = args[2].parse()?;
    let y0: f64 = args[3].parse()?;
    let side: f64 = args[4].parse()?;
    let params = match args.get(6) {
        Some(path) => InpaintParams::from_json_file(Path::new(path))?,
        None => InpaintParams::keyframe(),
    };

    let (w, h) = image.dimensions();
    let mask = Quad::square(x0, y0, side).hole_mask(w, h)?;
    let solve = PyramidSolver::new(params).solve(&image, &mask)?;

    let hole: Vec<f32> = solve
        .cost
        .as_slice()
        .iter()
        .zip(mask.as_raw())
        .filter(|&(_, &m)| m == dimreal::HOLE)
        .map(|(&c, _)| c)
        .collect();
    let mean = hole.iter().sum::<f32>() / hole.len().max(1) as f32;
    println!("Filled {} pixels, mean patch cost {:.1}.", hole.len(), mean);

    solve.color.save(&args[5])?;
    println!("Wrote {}", args[5]);
    Ok(())
}
