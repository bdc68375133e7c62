//! Common test utilities for relaxometry integration tests

use num_complex::Complex64;
use rustfft::{FftDirection, FftPlanner};

use relaxometry::kspace::RawEchoSet;

/// Compute RMSE between two arrays
pub fn rmse(a: &[f64], b: &[f64]) -> f64 {
    assert_eq!(a.len(), b.len());
    if a.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = a.iter().zip(b).map(|(&x, &y)| (x - y) * (x - y)).sum();
    (sum_sq / a.len() as f64).sqrt()
}

/// Encode a square target image into the k-space that reconstructs to it.
///
/// Runs the reconstruction chain backwards: undo the flip + transpose, undo
/// the fftshift (self-inverse for even `n`), then inverse 2-D FFT. Feeding
/// the result through the pipeline reproduces `target` up to FFT rounding.
pub fn kspace_for_image(target: &[f64], n: usize) -> Vec<Complex64> {
    assert!(n % 2 == 0, "encoding assumes even dimensions");
    assert_eq!(target.len(), n * n);

    // undo out(i, j) = in(n-1-j, n-1-i)
    let mut shifted = vec![Complex64::new(0.0, 0.0); n * n];
    for y in 0..n {
        for x in 0..n {
            shifted[y * n + x] = Complex64::new(target[(n - 1 - x) * n + (n - 1 - y)], 0.0);
        }
    }

    // undo the centering shift
    let h = n / 2;
    let mut spectrum = vec![Complex64::new(0.0, 0.0); n * n];
    for y in 0..n {
        for x in 0..n {
            spectrum[((y + h) % n) * n + (x + h) % n] = shifted[y * n + x];
        }
    }

    // inverse 2-D FFT with 1/(n*n) normalization
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

/// Interleave per-image k-spaces into the flat acquisition row order the
/// partitioner expects: round-robin across images for each phase encode.
pub fn interleave(kspaces: &[Vec<Complex64>], n: usize) -> RawEchoSet {
    let mut raw = Vec::with_capacity(kspaces.len() * n * n);
    for row in 0..n {
        for kspace in kspaces {
            raw.extend_from_slice(&kspace[row * n..(row + 1) * n]);
        }
    }
    RawEchoSet::new(raw, n)
}
