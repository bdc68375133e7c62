//! Per-pixel parametric map fitting.
//!
//! Images are grouped into runs of `train.len()` consecutive images, each run
//! covering the full relaxation train at one slice position. Every pixel in a
//! run is one bounded least-squares problem; columns within a row are
//! independent, so they become parallel work items and are merged back by
//! column index, never by completion order.

use log::debug;
use rayon::prelude::*;

use crate::error::ReconError;
use crate::model::RelaxationModel;
use crate::recon::MagnitudeImage;
use crate::solvers::levmar::curve_fit;

/// Fitted parameter maps for one run (slice), image-shaped, row-major.
/// Never mutated after creation.
#[derive(Debug, Clone)]
pub struct RunMaps {
    pub rows: usize,
    pub cols: usize,
    /// Relaxation time (T1 or T2) per pixel, ms.
    pub t: Vec<f64>,
    /// Equilibrium magnetization per pixel.
    pub mo: Vec<f64>,
    /// Baseline offset per pixel.
    pub c: Vec<f64>,
}

/// One pixel's regression problem: a column position and the signal samples
/// across the run's relaxation train.
struct PixelTask {
    col: usize,
    samples: Vec<f64>,
}

impl PixelTask {
    /// Fit the model to this pixel's samples: one bounded fit per seed the
    /// model proposes, keeping whichever lands at the smallest residual.
    /// Non-convergence of every start is absorbed into the model's sentinel
    /// parameters so one unfittable pixel never aborts the map.
    fn solve(&self, model: RelaxationModel, train: &[f64]) -> Vec<f64> {
        let signal_max = self
            .samples
            .iter()
            .cloned()
            .filter(|v| v.is_finite())
            .fold(0.0f64, f64::max);

        let (lower, upper) = model.bounds(signal_max);
        let mut best: Option<(f64, Vec<f64>)> = None;

        for seed in model.time_seeds(&self.samples, train) {
            let guess = model.initial_guess(signal_max, seed);
            let fit = curve_fit(
                |t, p| model.evaluate(t, p),
                train,
                &self.samples,
                &guess,
                &lower,
                &upper,
                RelaxationModel::EVAL_BUDGET,
            );
            if let Ok(params) = fit {
                let cost = residual_sum_sq(model, train, &self.samples, &params);
                if best.as_ref().map_or(true, |(c, _)| cost < *c) {
                    best = Some((cost, params));
                }
            }
        }

        match best {
            Some((_, params)) => params,
            None => model.fallback_params(signal_max),
        }
    }
}

fn residual_sum_sq(model: RelaxationModel, train: &[f64], samples: &[f64], p: &[f64]) -> f64 {
    train
        .iter()
        .zip(samples)
        .map(|(&t, &y)| {
            let d = model.evaluate(t, p) - y;
            d * d
        })
        .sum()
}

/// Fit parametric maps for every run in the image stack.
///
/// # Arguments
/// * `images` - Slice-major magnitude images, `runs * train.len()` of them
/// * `train` - Acquired relaxation times, ms
/// * `model` - Relaxation model matching the acquisition family
///
/// # Returns
/// One `RunMaps` per run of `train.len()` consecutive images.
pub fn fit_maps(
    images: &[MagnitudeImage],
    train: &[f64],
    model: RelaxationModel,
) -> Result<Vec<RunMaps>, ReconError> {
    if train.is_empty() {
        return Err(ReconError::EmptyTrain);
    }
    let m = train.len();
    if images.len() % m != 0 {
        return Err(ReconError::RunMismatch {
            images: images.len(),
            train_len: m,
        });
    }
    let (rows, cols) = match images.first() {
        Some(img) => (img.rows, img.cols),
        None => return Ok(Vec::new()),
    };
    for img in images {
        if img.rows != rows || img.cols != cols {
            return Err(ReconError::ShapeMismatch {
                expected_rows: rows,
                expected_cols: cols,
                found_rows: img.rows,
                found_cols: img.cols,
            });
        }
    }

    let n_runs = images.len() / m;
    let mut maps = Vec::with_capacity(n_runs);

    for run in 0..n_runs {
        let slab = &images[run * m..(run + 1) * m];
        let mut t_map = vec![0.0; rows * cols];
        let mut mo_map = vec![0.0; rows * cols];
        let mut c_map = vec![0.0; rows * cols];

        for row in 0..rows {
            let tasks: Vec<PixelTask> = (0..cols)
                .map(|col| PixelTask {
                    col,
                    samples: slab.iter().map(|img| img.data[row * cols + col]).collect(),
                })
                .collect();

            let fitted: Vec<(usize, Vec<f64>)> = tasks
                .par_iter()
                .map(|task| (task.col, task.solve(model, train)))
                .collect();

            // merge by the task's own column index so the mapping does not
            // depend on completion order
            for (col, params) in fitted {
                let at = row * cols + col;
                t_map[at] = params[0];
                mo_map[at] = params[1];
                c_map[at] = params[2];
            }
        }

        debug!("fitted run {}/{} ({}x{} pixels)", run + 1, n_runs, rows, cols);
        maps.push(RunMaps {
            rows,
            cols,
            t: t_map,
            mo: mo_map,
            c: c_map,
        });
    }

    Ok(maps)
}
