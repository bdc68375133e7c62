//! Error taxonomy for the reconstruction pipeline.
//!
//! Only the top-level acquisition dispatch and the structural preconditions
//! are user-visible failures. Per-pixel fit non-convergence is absorbed
//! locally with sentinel parameters and never surfaces here.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconError {
    /// Metadata matched neither SEMS-IR nor MEMS.
    #[error("unsupported acquisition: layout '{layout}', inversion recovery: {inversion_recovery}")]
    UnsupportedAcquisition {
        layout: String,
        inversion_recovery: bool,
    },

    /// Raw echo rows cannot be de-interleaved into the requested image count.
    #[error("echo row count {rows} is not divisible by image count {image_count}")]
    MalformedPartition { rows: usize, image_count: usize },

    /// Inversion-recovery stack cannot be regrouped by inversion time.
    #[error("{images} images cannot be reordered over {inversion_times} inversion times")]
    ReorderMismatch {
        images: usize,
        inversion_times: usize,
    },

    /// Image stack does not split into whole runs of the relaxation train.
    #[error("{images} images do not divide into runs of {train_len} relaxation times")]
    RunMismatch { images: usize, train_len: usize },

    /// No relaxation times to fit against.
    #[error("relaxation train is empty")]
    EmptyTrain,

    /// Images in one stack must share a single spatial shape.
    #[error("image stack is not shape-uniform: expected {expected_rows}x{expected_cols}, found {found_rows}x{found_cols}")]
    ShapeMismatch {
        expected_rows: usize,
        expected_cols: usize,
        found_rows: usize,
        found_cols: usize,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("failed to write raster: {0}")]
    Raster(#[from] image::ImageError),
}
