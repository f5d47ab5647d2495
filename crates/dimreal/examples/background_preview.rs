use dimreal::{BackgroundSolver, InpaintParams, Quad};
use image::ImageReader;
use std::error::Error;
use std::time::Duration;

fn main() -> Result<(), Box<dyn Error>> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 6 {
        eprintln!("Usage: {} <image.png> <x0> <y0> <side_px> <out_prefix>", args[0]);
        std::process::exit(2);
    }

    let image = ImageReader::open(&args[1])?.decode()?.to_rgb8();
    let x0: f64 = args[2].parse()?;
    let y0: f64 = args[3].parse()?;
    let side: f64 = args[4].parse()?;
    let (w, h) = image.dimensions();
    let mask = Quad::square(x0, y0, side).hole_mask(w, h)?;

    let mut solver = BackgroundSolver::new();
    solver.start(&image, &mask, &InpaintParams::background())?;

    // Save every distinct preview until the worker finishes.
    let mut saved = 0usize;
    let mut last = None;
    loop {
        let done = solver.is_done();
        if let Some(preview) = solver.poll_preview() {
            if last.as_ref() != Some(&preview) {
                let path = format!("{}_{:02}.png", args[5], saved);
                preview.save(&path)?;
                println!("Wrote {path}");
                saved += 1;
                last = Some(preview);
            }
        }
        if done {
            break;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    solver.join()?;
    Ok(())
}
