//! Echo partitioning: splitting interleaved raw echo rows into per-image
//! k-spaces.
//!
//! The scanner acquires echo lines round-robin across all images before
//! advancing the phase encode, so consecutive raw rows belong to consecutive
//! images. Row `n` of k-space `k` is therefore raw row `k + image_count * n`.

use num_complex::Complex64;

use crate::error::ReconError;

/// Flat, time-ordered raw echo rows handed over by the instrument-file
/// parser. The pipeline consumes this once; it is not retained past
/// partitioning.
#[derive(Debug, Clone)]
pub struct RawEchoSet {
    /// Row-major complex samples, `rows * cols` long.
    pub data: Vec<Complex64>,
    /// Number of acquired echo lines.
    pub rows: usize,
    /// Frequency-encoded points per line.
    pub cols: usize,
}

impl RawEchoSet {
    /// Wrap a flat sample buffer as `data.len() / cols` echo rows.
    ///
    /// Panics if the buffer length is not a whole number of rows; that is a
    /// caller bug, not an acquisition property.
    pub fn new(data: Vec<Complex64>, cols: usize) -> Self {
        assert!(
            cols > 0 && data.len() % cols == 0,
            "echo buffer length {} is not a multiple of row width {}",
            data.len(),
            cols
        );
        let rows = data.len() / cols;
        Self { data, rows, cols }
    }
}

/// A single k-space: phase encodes x frequency encodes, row-major.
#[derive(Debug, Clone)]
pub struct KSpace {
    pub data: Vec<Complex64>,
    pub rows: usize,
    pub cols: usize,
}

/// De-interleave raw echo rows into `image_count` k-spaces.
///
/// # Arguments
/// * `echoes` - Time-ordered echo rows from the acquisition
/// * `image_count` - Number of distinct images (= interleave stride)
///
/// # Returns
/// `image_count` k-spaces of `echoes.rows / image_count` rows each, or
/// `MalformedPartition` if the row count does not divide evenly. The check
/// runs before any numeric work.
pub fn partition(echoes: RawEchoSet, image_count: usize) -> Result<Vec<KSpace>, ReconError> {
    if image_count == 0 || echoes.rows % image_count != 0 {
        return Err(ReconError::MalformedPartition {
            rows: echoes.rows,
            image_count,
        });
    }

    let rows_per_image = echoes.rows / image_count;
    let cols = echoes.cols;
    let mut stack = Vec::with_capacity(image_count);

    for k in 0..image_count {
        let mut data = Vec::with_capacity(rows_per_image * cols);
        for n in 0..rows_per_image {
            let src = (k + image_count * n) * cols;
            data.extend_from_slice(&echoes.data[src..src + cols]);
        }
        stack.push(KSpace {
            data,
            rows: rows_per_image,
            cols,
        });
    }

    Ok(stack)
}
