//! Demo driver: builds a synthetic multi-echo (MEMS) phantom acquisition,
//! runs the full pipeline, and writes theoretical images for a set of
//! requested TE values.
//!
//! Usage: cargo run --release --bin synthesize [out_dir]
//!
//! Raw-instrument parsing is an external collaborator of the pipeline, so the
//! demo synthesizes its own raw echo data by encoding a disc phantom back
//! into k-space through the inverse of the reconstruction chain.

use std::path::PathBuf;
use std::time::Instant;

use num_complex::Complex64;
use rustfft::{FftDirection, FftPlanner};

use relaxometry::kspace::RawEchoSet;
use relaxometry::{run, AcquisitionMeta, PipelineConfig, Retention};

const N: usize = 32;

/// Encode a square target image into the k-space that reconstructs to it:
/// undo the flip + transpose, undo the fftshift (self-inverse for even n),
/// then inverse 2-D FFT.
fn kspace_for_image(target: &[f64], n: usize) -> Vec<Complex64> {
    assert!(n % 2 == 0, "encoding assumes even dimensions");

    let mut shifted = vec![Complex64::new(0.0, 0.0); n * n];
    for y in 0..n {
        for x in 0..n {
            shifted[y * n + x] = Complex64::new(target[(n - 1 - x) * n + (n - 1 - y)], 0.0);
        }
    }

    let h = n / 2;
    let mut spectrum = vec![Complex64::new(0.0, 0.0); n * n];
    for y in 0..n {
        for x in 0..n {
            spectrum[((y + h) % n) * n + (x + h) % n] = shifted[y * n + x];
        }
    }

    let mut planner = FftPlanner::new();
    let ifft = planner.plan_fft(n, FftDirection::Inverse);
    for row in spectrum.chunks_exact_mut(n) {
        ifft.process(row);
    }
    let mut column = vec![Complex64::new(0.0, 0.0); n];
    for x in 0..n {
        for y in 0..n {
            column[y] = spectrum[y * n + x];
        }
        ifft.process(&mut column);
        for y in 0..n {
            spectrum[y * n + x] = column[y];
        }
    }
    let norm = (n * n) as f64;
    for v in spectrum.iter_mut() {
        *v /= norm;
    }
    spectrum
}

/// Disc phantom: background air, an outer ring and an inner core with
/// distinct T2 values. Returns (t2_map, mo_map).
fn phantom(slice: usize, n: usize) -> (Vec<f64>, Vec<f64>) {
    let mut t2 = vec![0.0; n * n];
    let mut mo = vec![0.0; n * n];
    let center = (n as f64 - 1.0) / 2.0;
    let core_t2 = 60.0 + 40.0 * slice as f64;

    for y in 0..n {
        for x in 0..n {
            let r = ((y as f64 - center).powi(2) + (x as f64 - center).powi(2)).sqrt();
            let at = y * n + x;
            if r < n as f64 * 0.18 {
                t2[at] = core_t2;
                mo[at] = 1000.0;
            } else if r < n as f64 * 0.4 {
                t2[at] = 150.0;
                mo[at] = 700.0;
            }
        }
    }
    (t2, mo)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let total = Instant::now();

    let out_dir: PathBuf = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "theoretical_mri".to_string())
        .into();

    let te_train = vec![20.0, 40.0, 80.0, 160.0];
    let slices = 2;
    let image_count = slices * te_train.len();

    // one k-space per (slice, echo), then interleave rows the way the
    // scanner emits them: round-robin across images per phase encode
    let mut kspaces: Vec<Vec<Complex64>> = Vec::with_capacity(image_count);
    for slice in 0..slices {
        let (t2, mo) = phantom(slice, N);
        for &te in &te_train {
            let image: Vec<f64> = t2
                .iter()
                .zip(&mo)
                .map(|(&t, &m)| if t > 0.0 { m * (-te / t).exp() } else { 0.0 })
                .collect();
            kspaces.push(kspace_for_image(&image, N));
        }
    }

    let mut raw = Vec::with_capacity(image_count * N * N);
    for row in 0..N {
        for kspace in &kspaces {
            raw.extend_from_slice(&kspace[row * N..(row + 1) * N]);
        }
    }
    let echoes = RawEchoSet::new(raw, N);

    let meta = AcquisitionMeta {
        layout: "mems".into(),
        inversion_recovery: false,
        train: te_train,
        traces: image_count,
    };
    let config = PipelineConfig {
        out_dir,
        requested_times_ms: vec![1.0, 10.0, 50.0, 120.0, 300.0],
        retention: Retention::Images,
    };

    println!("[INFO] Running pipeline on {} synthetic echo rows...", echoes.rows);
    let output = run(&meta, echoes, &config)?;

    let images = output.images.unwrap_or_default();
    println!(
        "[INFO] Synthesized {} image(s) in {:.2?} -> {}",
        images.len(),
        total.elapsed(),
        config.out_dir.display()
    );
    Ok(())
}
