//! 2-D FFT image reconstruction and inversion-recovery reordering.
//!
//! Reconstruction follows a fixed geometric contract: forward 2-D FFT,
//! zero-frequency centering shift, flip along both axes followed by a
//! transpose to match the scanner software's display orientation, then
//! complex magnitude. Downstream parametric maps index pixels by anatomical
//! position, so these steps must not be reordered.

use std::sync::Arc;

use num_complex::Complex64;
use rustfft::{Fft, FftDirection, FftPlanner};

use crate::error::ReconError;
use crate::kspace::KSpace;

/// Index into a 2-D row-major array
#[inline(always)]
fn idx2d(row: usize, col: usize, cols: usize) -> usize {
    row * cols + col
}

/// Reconstructed magnitude image, row-major, non-negative.
#[derive(Debug, Clone)]
pub struct MagnitudeImage {
    pub data: Vec<f64>,
    pub rows: usize,
    pub cols: usize,
}

/// FFT workspace that caches plans and scratch buffers for one k-space shape
pub struct Fft2dWorkspace {
    rows: usize,
    cols: usize,
    fft_row: Arc<dyn Fft<f64>>,
    fft_col: Arc<dyn Fft<f64>>,
    scratch_row: Vec<Complex64>,
    scratch_col: Vec<Complex64>,
    buffer_col: Vec<Complex64>,
}

impl Fft2dWorkspace {
    /// Create a new FFT workspace for the given k-space dimensions
    pub fn new(rows: usize, cols: usize) -> Self {
        let mut planner = FftPlanner::new();
        let fft_row = planner.plan_fft(cols, FftDirection::Forward);
        let fft_col = planner.plan_fft(rows, FftDirection::Forward);

        let scratch_row = vec![Complex64::new(0.0, 0.0); fft_row.get_inplace_scratch_len()];
        let scratch_col = vec![Complex64::new(0.0, 0.0); fft_col.get_inplace_scratch_len()];

        Self {
            rows,
            cols,
            fft_row,
            fft_col,
            scratch_row,
            scratch_col,
            buffer_col: vec![Complex64::new(0.0, 0.0); rows],
        }
    }

    /// In-place forward 2-D FFT over a row-major buffer
    pub fn fft2d(&mut self, data: &mut [Complex64]) {
        let (rows, cols) = (self.rows, self.cols);

        // Transform along each row (contiguous)
        for r in 0..rows {
            let start = idx2d(r, 0, cols);
            self.fft_row
                .process_with_scratch(&mut data[start..start + cols], &mut self.scratch_row);
        }

        // Transform along each column (gather/scatter)
        for c in 0..cols {
            for r in 0..rows {
                self.buffer_col[r] = data[idx2d(r, c, cols)];
            }
            self.fft_col
                .process_with_scratch(&mut self.buffer_col, &mut self.scratch_col);
            for r in 0..rows {
                data[idx2d(r, c, cols)] = self.buffer_col[r];
            }
        }
    }
}

/// 2-D FFT shift: move the zero-frequency component to the array center
pub fn fftshift2(data: &[Complex64], rows: usize, cols: usize) -> Vec<Complex64> {
    let hr = rows / 2;
    let hc = cols / 2;
    let mut out = vec![Complex64::new(0.0, 0.0); data.len()];

    for r in 0..rows {
        for c in 0..cols {
            out[idx2d((r + hr) % rows, (c + hc) % cols, cols)] = data[idx2d(r, c, cols)];
        }
    }

    out
}

/// Reconstruct one k-space into a magnitude image.
///
/// Applies the geometric contract from the module docs; the output shape is
/// the transpose of the input shape.
pub fn reconstruct(kspace: KSpace, ws: &mut Fft2dWorkspace) -> MagnitudeImage {
    let KSpace { mut data, rows, cols } = kspace;

    ws.fft2d(&mut data);
    let shifted = fftshift2(&data, rows, cols);

    // flip both axes, then transpose: out(i, j) = |in(rows-1-j, cols-1-i)|
    let mut out = vec![0.0; rows * cols];
    for i in 0..cols {
        for j in 0..rows {
            out[idx2d(i, j, rows)] = shifted[idx2d(rows - 1 - j, cols - 1 - i, cols)].norm();
        }
    }

    MagnitudeImage {
        data: out,
        rows: cols,
        cols: rows,
    }
}

/// Reconstruct a whole k-space stack, reusing one set of FFT plans.
pub fn reconstruct_stack(kspaces: Vec<KSpace>) -> Vec<MagnitudeImage> {
    let mut ws = match kspaces.first() {
        Some(k) => Fft2dWorkspace::new(k.rows, k.cols),
        None => return Vec::new(),
    };
    kspaces.into_iter().map(|k| reconstruct(k, &mut ws)).collect()
}

/// Reorder an inversion-recovery stack from inversion-major to slice-major.
///
/// SEMS-IR acquires all slices at TI_1, then all slices at TI_2, and so on.
/// The fitter wants runs of consecutive images spanning the full TI train for
/// one slice, so image (ti, slice) moves from index `ti * slices + slice` to
/// `slice * n_inversion_times + ti`.
pub fn reorder_inversion_recovery(
    images: Vec<MagnitudeImage>,
    n_inversion_times: usize,
) -> Result<Vec<MagnitudeImage>, ReconError> {
    let total = images.len();
    if n_inversion_times == 0 || total % n_inversion_times != 0 {
        return Err(ReconError::ReorderMismatch {
            images: total,
            inversion_times: n_inversion_times,
        });
    }

    let slices = total / n_inversion_times;
    let placeholder = MagnitudeImage {
        data: Vec::new(),
        rows: 0,
        cols: 0,
    };
    let mut out = vec![placeholder; total];

    // the index maps are a bijection, so every placeholder is overwritten
    for (src, img) in images.into_iter().enumerate() {
        let ti = src / slices;
        let s = src % slices;
        out[s * n_inversion_times + ti] = img;
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constant_kspace(rows: usize, cols: usize, value: f64) -> KSpace {
        KSpace {
            data: vec![Complex64::new(value, 0.0); rows * cols],
            rows,
            cols,
        }
    }

    fn constant_image(rows: usize, cols: usize, value: f64) -> MagnitudeImage {
        MagnitudeImage {
            data: vec![value; rows * cols],
            rows,
            cols,
        }
    }

    #[test]
    fn uniform_kspace_concentrates_into_one_pixel() {
        // fft2 of a constant puts all energy in the DC bin; the shift moves it
        // to (n/2, n/2) and the flip + transpose then lands it at
        // (n/2 - 1, n/2 - 1) for even n
        let n = 4;
        let mut ws = Fft2dWorkspace::new(n, n);
        let img = reconstruct(constant_kspace(n, n, 1.0), &mut ws);

        assert_eq!(img.rows, n);
        assert_eq!(img.cols, n);
        let bright = idx2d(n / 2 - 1, n / 2 - 1, n);
        assert!((img.data[bright] - (n * n) as f64).abs() < 1e-10);
        for (i, &v) in img.data.iter().enumerate() {
            if i != bright {
                assert!(v.abs() < 1e-10, "pixel {} should be empty, got {}", i, v);
            }
        }
    }

    #[test]
    fn delta_kspace_gives_flat_magnitude() {
        let n = 4;
        let mut kspace = constant_kspace(n, n, 0.0);
        kspace.data[0] = Complex64::new(1.0, 0.0);

        let mut ws = Fft2dWorkspace::new(n, n);
        let img = reconstruct(kspace, &mut ws);

        for &v in &img.data {
            assert!((v - 1.0).abs() < 1e-12, "expected |1| everywhere, got {}", v);
        }
    }

    #[test]
    fn reconstruction_scales_linearly_with_input() {
        let rows = 4;
        let cols = 8;
        let mut kspace = constant_kspace(rows, cols, 0.0);
        for (i, v) in kspace.data.iter_mut().enumerate() {
            *v = Complex64::new((i % 7) as f64 - 3.0, (i % 5) as f64);
        }
        let mut scaled = kspace.clone();
        for v in scaled.data.iter_mut() {
            *v *= 2.5;
        }

        let mut ws = Fft2dWorkspace::new(rows, cols);
        let base = reconstruct(kspace, &mut ws);
        let big = reconstruct(scaled, &mut ws);

        assert_eq!(base.rows, cols);
        assert_eq!(base.cols, rows);
        for (a, b) in base.data.iter().zip(&big.data) {
            assert!((b - 2.5 * a).abs() < 1e-9 * (1.0 + a.abs()));
        }
    }

    #[test]
    fn reorder_turns_inversion_major_into_slice_major() {
        // 2 inversion times x 3 slices; image (ti, s) tagged with 10*ti + s
        let images: Vec<MagnitudeImage> = (0..2)
            .flat_map(|ti| (0..3).map(move |s| constant_image(2, 2, (10 * ti + s) as f64)))
            .collect();

        let out = reorder_inversion_recovery(images, 2).unwrap();

        let tags: Vec<f64> = out.iter().map(|img| img.data[0]).collect();
        // slice-major: all TIs for slice 0, then slice 1, then slice 2
        assert_eq!(tags, vec![0.0, 10.0, 1.0, 11.0, 2.0, 12.0]);
    }

    #[test]
    fn reorder_is_its_own_structural_inverse() {
        let images: Vec<MagnitudeImage> =
            (0..6).map(|i| constant_image(2, 2, i as f64)).collect();

        // reorder over 2 TIs, then reorder back treating the 3 slices as the
        // new interleave
        let once = reorder_inversion_recovery(images, 2).unwrap();
        let twice = reorder_inversion_recovery(once, 3).unwrap();

        let tags: Vec<f64> = twice.iter().map(|img| img.data[0]).collect();
        assert_eq!(tags, vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn reorder_rejects_indivisible_stack() {
        let images: Vec<MagnitudeImage> =
            (0..5).map(|i| constant_image(2, 2, i as f64)).collect();
        let err = reorder_inversion_recovery(images, 2).unwrap_err();
        assert!(matches!(
            err,
            ReconError::ReorderMismatch {
                images: 5,
                inversion_times: 2
            }
        ));
    }
}
