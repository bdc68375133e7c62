//! Reconstruction of multi-echo MR acquisitions and synthesis of theoretical
//! images at arbitrary relaxation times.
//!
//! One multi-inversion (SEMS-IR) or multi-echo (MEMS) dataset is partitioned
//! into per-image k-spaces, Fourier-reconstructed into magnitude images,
//! fitted pixel-by-pixel against the matching relaxation model, and
//! re-evaluated at requested TI or TE values never actually scanned.
//!
//! # Modules
//! - `kspace`: echo de-interleaving into per-image k-spaces
//! - `recon`: 2-D FFT reconstruction and inversion-recovery reordering
//! - `model`: T1/T2 signal equations, bounds policy, fit fallback
//! - `solvers`: bounded Levenberg-Marquardt least squares
//! - `fitting`: parallel per-pixel parametric map fitting
//! - `synth`: theoretical image synthesis and PNG persistence
//! - `pipeline`: acquisition dispatch and stage sequencing

// Core data path
pub mod error;
pub mod kspace;
pub mod model;
pub mod recon;

// Fitting
pub mod fitting;
pub mod solvers;

// Output
pub mod synth;

// Orchestration
pub mod pipeline;

pub use error::ReconError;
pub use model::RelaxationModel;
pub use pipeline::{run, AcquisitionMeta, PipelineConfig, PipelineOutput, Retention};
