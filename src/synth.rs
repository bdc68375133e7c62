//! Theoretical image synthesis and persistence.
//!
//! Evaluates the fitted relaxation model at caller-requested times, rescales
//! each image to [0, 255] by its own maximum and writes it as an 8-bit
//! grayscale PNG; retained images carry the rescaled data. The output
//! ordering is part of the contract: outer loop over requested times, inner
//! loop over runs. The
//! output directory is cleared and recreated on every invocation, so a
//! previous run's images are never mixed with the current one.

use std::fs;
use std::path::Path;

use image::{GrayImage, Luma};
use log::info;

use crate::error::ReconError;
use crate::fitting::RunMaps;
use crate::model::RelaxationModel;

/// A synthesized image for one (requested time, run) pair.
#[derive(Debug, Clone)]
pub struct TheoreticalImage {
    /// Zero-based run (slice) index.
    pub run: usize,
    /// Requested relaxation time, ms.
    pub time_ms: f64,
    pub rows: usize,
    pub cols: usize,
    /// Pixel data rescaled to [0, 255] by this image's own maximum, exactly
    /// the values persisted to PNG. Two images are not intensity-comparable
    /// across the rescale.
    pub data: Vec<f64>,
}

/// Evaluate `model` over one run's maps at a single requested time.
///
/// T1 synthesis uses the ideal inversion efficiency; the fitted window only
/// absorbs acquisition imperfections and is not part of the synthetic signal.
fn evaluate_maps(model: RelaxationModel, time_ms: f64, maps: &RunMaps) -> Vec<f64> {
    let mut params = vec![0.0; model.param_count()];
    if model == RelaxationModel::T1InversionRecovery {
        params[3] = RelaxationModel::IDEAL_INVERSION;
    }

    maps.t
        .iter()
        .zip(maps.mo.iter().zip(&maps.c))
        .map(|(&t, (&mo, &c))| {
            params[0] = t;
            params[1] = mo;
            params[2] = c;
            model.evaluate(time_ms, &params)
        })
        .collect()
}

/// Synthesize one image per (requested time, run) pair and persist each as a
/// grayscale PNG.
///
/// # Arguments
/// * `model` - Relaxation model the maps were fitted with
/// * `requested_times_ms` - TI or TE values to synthesize at
/// * `maps` - Fitted maps, one entry per run
/// * `out_dir` - Destination directory, cleared and recreated here
///
/// # Returns
/// The synthesized images, times-major then run order. Filenames follow
/// `slice_{run}_{TI|TE}_{time}ms.png` with a 1-based run index.
pub fn synthesize(
    model: RelaxationModel,
    requested_times_ms: &[f64],
    maps: &[RunMaps],
    out_dir: &Path,
) -> Result<Vec<TheoreticalImage>, ReconError> {
    // drop whatever a previous invocation left behind
    let _ = fs::remove_dir_all(out_dir);
    fs::create_dir_all(out_dir)?;

    let label = model.weighting_label();
    let mut out = Vec::with_capacity(requested_times_ms.len() * maps.len());

    for &time in requested_times_ms {
        for (run, run_maps) in maps.iter().enumerate() {
            let mut data = evaluate_maps(model, time, run_maps);
            rescale_to_255(&mut data);
            let path = out_dir.join(format!("slice_{}_{}_{}ms.png", run + 1, label, time));
            write_grayscale(&data, run_maps.rows, run_maps.cols, &path)?;
            out.push(TheoreticalImage {
                run,
                time_ms: time,
                rows: run_maps.rows,
                cols: run_maps.cols,
                data,
            });
        }
    }

    info!(
        "wrote {} theoretical image(s) to {}",
        out.len(),
        out_dir.display()
    );
    Ok(out)
}

/// Rescale in place to [0, 255] by the image's own maximum. An all-zero
/// image is left untouched.
fn rescale_to_255(data: &mut [f64]) {
    let max = data.iter().cloned().fold(0.0f64, f64::max);
    if max > 0.0 {
        let scale = 255.0 / max;
        for v in data.iter_mut() {
            *v *= scale;
        }
    }
}

/// Write already-rescaled [0, 255] pixel data as an 8-bit grayscale PNG.
fn write_grayscale(data: &[f64], rows: usize, cols: usize, path: &Path) -> Result<(), ReconError> {
    let mut img = GrayImage::new(cols as u32, rows as u32);
    for r in 0..rows {
        for c in 0..cols {
            let v = data[r * cols + c].round().clamp(0.0, 255.0) as u8;
            img.put_pixel(c as u32, r as u32, Luma([v]));
        }
    }
    img.save(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform_maps(rows: usize, cols: usize, t: f64, mo: f64, c: f64) -> RunMaps {
        RunMaps {
            rows,
            cols,
            t: vec![t; rows * cols],
            mo: vec![mo; rows * cols],
            c: vec![c; rows * cols],
        }
    }

    #[test]
    fn output_count_and_unique_filenames() {
        let dir = tempfile::tempdir().unwrap();
        let maps = vec![
            uniform_maps(4, 4, 100.0, 1000.0, 0.0),
            uniform_maps(4, 4, 200.0, 800.0, 1.0),
        ];
        let times = [1.0, 30.0, 500.0];

        let images =
            synthesize(RelaxationModel::T2Decay, &times, &maps, dir.path()).unwrap();

        assert_eq!(images.len(), times.len() * maps.len());

        let mut names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names.len(), 6);
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 6, "filenames must be unique");
        assert!(names.contains(&"slice_1_TE_30ms.png".to_string()));
        assert!(names.contains(&"slice_2_TE_500ms.png".to_string()));
    }

    #[test]
    fn ordering_is_times_major_then_runs() {
        let dir = tempfile::tempdir().unwrap();
        let maps = vec![
            uniform_maps(1, 1, 100.0, 1000.0, 0.0),
            uniform_maps(1, 1, 100.0, 1000.0, 0.0),
        ];
        let images =
            synthesize(RelaxationModel::T2Decay, &[10.0, 20.0], &maps, dir.path()).unwrap();

        let order: Vec<(f64, usize)> = images.iter().map(|i| (i.time_ms, i.run)).collect();
        assert_eq!(order, vec![(10.0, 0), (10.0, 1), (20.0, 0), (20.0, 1)]);
    }

    #[test]
    fn previous_outputs_are_cleared() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("theoretical");
        fs::create_dir_all(&out).unwrap();
        fs::write(out.join("stale.png"), b"old").unwrap();

        let maps = vec![uniform_maps(1, 1, 100.0, 1000.0, 0.0)];
        synthesize(RelaxationModel::T2Decay, &[10.0], &maps, &out).unwrap();

        assert!(!out.join("stale.png").exists());
        assert!(out.join("slice_1_TE_10ms.png").exists());
    }

    #[test]
    fn t1_synthesis_uses_ideal_inversion() {
        let maps = uniform_maps(1, 1, 800.0, 1000.0, 0.0);
        let data = evaluate_maps(RelaxationModel::T1InversionRecovery, 500.0, &maps);
        let want = RelaxationModel::T1InversionRecovery
            .evaluate(500.0, &[800.0, 1000.0, 0.0, 2.0]);
        assert!((data[0] - want).abs() < 1e-12);
    }

    #[test]
    fn retained_images_carry_the_persisted_rescale() {
        let dir = tempfile::tempdir().unwrap();
        let mut maps = uniform_maps(1, 2, 100.0, 1000.0, 0.0);
        maps.mo[1] = 500.0;
        let images =
            synthesize(RelaxationModel::T2Decay, &[100.0], &[maps], dir.path()).unwrap();

        // brightest pixel lands on 255, the rest keep their ratio to it
        let data = &images[0].data;
        assert!((data[0] - 255.0).abs() < 1e-9);
        assert!((data[1] - 127.5).abs() < 1e-9);
    }
}
