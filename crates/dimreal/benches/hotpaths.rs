use criterion::{black_box, criterion_group, criterion_main, Criterion};
use image::{GrayImage, Luma, Rgb, RgbImage};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use dimreal::patch_search::PatchSearch;
use dimreal::warm_start;
use dimreal::{InpaintParams, Marker, MarkerHider, PyramidSolver, Quad, KNOWN};

fn make_frame(w: u32, h: u32, seed: u64) -> RgbImage {
    let mut rng = StdRng::seed_from_u64(seed);
    let noise: Vec<u8> = (0..w * h).map(|_| rng.gen_range(0..24)).collect();
    RgbImage::from_fn(w, h, |x, y| {
        let n = noise[(y * w + x) as usize];
        Rgb([
            ((x % 16) * 12) as u8 + n,
            ((y % 12) * 16) as u8 + n,
            (((x / 4 + y / 4) % 8) * 24) as u8,
        ])
    })
}

fn centered_mask(w: u32, h: u32, side: u32) -> GrayImage {
    let (x0, y0) = ((w - side) / 2, (h - side) / 2);
    GrayImage::from_fn(w, h, |x, y| {
        let inside = x >= x0 && x < x0 + side && y >= y0 && y < y0 + side;
        Luma([if inside { 0 } else { KNOWN }])
    })
}

fn bench_sweep(c: &mut Criterion) {
    let frame = make_frame(160, 120, 3);
    let mask = centered_mask(160, 120, 40);
    let mut base = PatchSearch::new(frame, mask, 2, StdRng::seed_from_u64(1)).unwrap_or_else(|e| {
        panic!("fixture: {e}");
    });
    base.init_random();

    c.bench_function("patch_sweep_160x120_hole40", |b| {
        b.iter(|| {
            let mut s = base.clone();
            s.sweep(true, 4);
            black_box(s.hole_cost_sum())
        })
    });
}

fn bench_pyramid(c: &mut Criterion) {
    let frame = make_frame(320, 240, 5);
    let mask = centered_mask(320, 240, 64);
    let solver = PyramidSolver::new(InpaintParams::keyframe().with_seed(9));

    c.bench_function("pyramid_keyframe_320x240_hole64", |b| {
        b.iter(|| {
            let solve = solver.solve(black_box(&frame), black_box(&mask));
            black_box(solve.is_ok())
        })
    });
}

fn bench_warm_run(c: &mut Criterion) {
    let frame = make_frame(320, 240, 7);
    let marker = Marker::new(0, 1.0, 0.1);
    let corners = Quad::square(130.0, 90.0, 56.0).0;
    let moved = Quad::square(134.0, 92.0, 56.0).0;
    let mut hider = MarkerHider::new(marker);
    let _ = hider.reset(&frame, Some(&corners), &InpaintParams::keyframe().with_seed(1));
    let params = InpaintParams::incremental().with_seed(2);

    c.bench_function("warm_run_320x240", |b| {
        b.iter(|| {
            let out = hider.run(black_box(&frame), Some(&moved), &params);
            black_box(out.is_ok())
        })
    });

    let Some(keyframe) = hider.keyframe() else {
        return;
    };
    let target = Quad(moved);
    let mask = marker
        .hole_quad(&target)
        .and_then(|q| q.hole_mask(320, 240))
        .unwrap_or_else(|_| centered_mask(320, 240, 56));
    c.bench_function("reproject_and_repair_320x240", |b| {
        let mut rng = StdRng::seed_from_u64(4);
        b.iter(|| {
            let repaired = keyframe
                .warped(&target)
                .and_then(|w| warm_start::repair(w, &frame, &mask, 2, &mut rng));
            black_box(repaired.map(|r| r.repaired).unwrap_or(0))
        })
    });
}

criterion_group!(hotpaths, bench_sweep, bench_pyramid, bench_warm_run);
criterion_main!(hotpaths);
