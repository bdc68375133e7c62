//! Top-level pipeline: acquisition dispatch, stage sequencing, retention.
//!
//! The only branch point is the acquisition-family dispatch made once from
//! metadata; everything after runs as the linear sequence
//! partition -> reconstruct -> (reorder, T1 only) -> fit -> synthesize.
//! Each stage consumes its input by value and releases it on return, so no
//! stage's working set outlives its call.

use std::path::PathBuf;

use log::info;

use crate::error::ReconError;
use crate::fitting::{fit_maps, RunMaps};
use crate::kspace::{partition, RawEchoSet};
use crate::model::RelaxationModel;
use crate::recon::{reconstruct_stack, reorder_inversion_recovery};
use crate::synth::{synthesize, TheoreticalImage};

/// Acquisition metadata extracted by the instrument-file parser, an external
/// collaborator. This crate never reads raw scanner files itself.
#[derive(Debug, Clone)]
pub struct AcquisitionMeta {
    /// Sequence family tag, e.g. "sems" or "mems".
    pub layout: String,
    /// Whether the sequence ran with inversion recovery.
    pub inversion_recovery: bool,
    /// Relaxation train in native units: TI in seconds for SEMS-IR, TE in
    /// milliseconds for MEMS, in acquisition order.
    pub train: Vec<f64>,
    /// Trace count from the instrument header: images per inversion time for
    /// SEMS-IR, total images for MEMS.
    pub traces: usize,
}

/// How much of the computation is handed back in memory. PNGs are always
/// persisted; nothing is retained unless asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retention {
    /// Persist PNGs only.
    PersistOnly,
    /// Also return the theoretical images.
    Images,
    /// Also return the fitted parametric maps.
    ImagesAndMaps,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Directory the synthesized PNGs are written to (cleared per run).
    pub out_dir: PathBuf,
    /// Requested relaxation times, ms.
    pub requested_times_ms: Vec<f64>,
    pub retention: Retention,
}

/// In-memory results, populated according to [`Retention`].
#[derive(Debug, Default)]
pub struct PipelineOutput {
    pub images: Option<Vec<TheoreticalImage>>,
    pub maps: Option<Vec<RunMaps>>,
}

/// Run the full reconstruction-and-synthesis pipeline on one dataset.
///
/// Either the whole pipeline completes and writes its output, or it fails
/// before anything is written; there is no partial-results mode.
pub fn run(
    meta: &AcquisitionMeta,
    echoes: RawEchoSet,
    config: &PipelineConfig,
) -> Result<PipelineOutput, ReconError> {
    let (model, train, image_count) = match (meta.layout.as_str(), meta.inversion_recovery) {
        ("sems", true) => {
            // TI values arrive in seconds
            let train: Vec<f64> = meta.train.iter().map(|&ti| ti * 1000.0).collect();
            let image_count = meta.traces * train.len();
            (RelaxationModel::T1InversionRecovery, train, image_count)
        }
        ("mems", false) => (RelaxationModel::T2Decay, meta.train.clone(), meta.traces),
        _ => {
            return Err(ReconError::UnsupportedAcquisition {
                layout: meta.layout.clone(),
                inversion_recovery: meta.inversion_recovery,
            })
        }
    };

    info!(
        "recognised {}-weighted acquisition: {} images over {} relaxation times",
        match model {
            RelaxationModel::T1InversionRecovery => "T1",
            RelaxationModel::T2Decay => "T2",
        },
        image_count,
        train.len()
    );

    let kspaces = partition(echoes, image_count)?;
    let mut images = reconstruct_stack(kspaces);
    if model == RelaxationModel::T1InversionRecovery {
        images = reorder_inversion_recovery(images, train.len())?;
    }
    info!("reconstructed {} magnitude image(s)", images.len());

    let maps = fit_maps(&images, &train, model)?;
    info!("fitted {} parametric map set(s)", maps.len());

    let theoretical = synthesize(model, &config.requested_times_ms, &maps, &config.out_dir)?;

    Ok(match config.retention {
        Retention::PersistOnly => PipelineOutput::default(),
        Retention::Images => PipelineOutput {
            images: Some(theoretical),
            maps: None,
        },
        Retention::ImagesAndMaps => PipelineOutput {
            images: Some(theoretical),
            maps: Some(maps),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_complex::Complex64;

    fn dummy_echoes(rows: usize, cols: usize) -> RawEchoSet {
        RawEchoSet::new(vec![Complex64::new(1.0, 0.0); rows * cols], cols)
    }

    fn config() -> PipelineConfig {
        PipelineConfig {
            out_dir: std::env::temp_dir().join("relaxometry-dispatch-test"),
            requested_times_ms: vec![10.0],
            retention: Retention::PersistOnly,
        }
    }

    #[test]
    fn rejects_unknown_sequence_family() {
        let meta = AcquisitionMeta {
            layout: "epi".into(),
            inversion_recovery: false,
            train: vec![0.1],
            traces: 2,
        };
        let err = run(&meta, dummy_echoes(4, 4), &config()).unwrap_err();
        assert!(matches!(err, ReconError::UnsupportedAcquisition { .. }));
    }

    #[test]
    fn rejects_sems_without_inversion() {
        let meta = AcquisitionMeta {
            layout: "sems".into(),
            inversion_recovery: false,
            train: vec![0.1],
            traces: 2,
        };
        let err = run(&meta, dummy_echoes(4, 4), &config()).unwrap_err();
        assert!(matches!(err, ReconError::UnsupportedAcquisition { .. }));
    }

    #[test]
    fn rejects_mems_with_inversion() {
        let meta = AcquisitionMeta {
            layout: "mems".into(),
            inversion_recovery: true,
            train: vec![10.0],
            traces: 2,
        };
        let err = run(&meta, dummy_echoes(4, 4), &config()).unwrap_err();
        assert!(matches!(err, ReconError::UnsupportedAcquisition { .. }));
    }

    #[test]
    fn malformed_partition_fails_before_output() {
        // 5 rows cannot split into 2 images
        let meta = AcquisitionMeta {
            layout: "mems".into(),
            inversion_recovery: false,
            train: vec![10.0, 20.0],
            traces: 2,
        };
        let err = run(&meta, dummy_echoes(5, 4), &config()).unwrap_err();
        assert!(matches!(err, ReconError::MalformedPartition { .. }));
    }
}
