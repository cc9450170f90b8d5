//! Parallel computation implementations for statistical reductions
//!
//! This module contains the actual parallel computation logic used by the
//! climatology functions.

use crate::errors::{Result, UnseenError};
use ndarray::{ArrayD, IxDyn};
use rayon::prelude::*;
use tracing::debug;

/// Computes the mean jointly over several axes using parallel processing
///
/// Data is converted to f64 for accumulation to avoid precision loss. NaN and
/// infinite values are skipped; an output element with no valid values is
/// NaN. The reduced axes are removed from the result.
///
/// # Errors
///
/// Returns an error if an axis is out of bounds or repeated.
pub fn parallel_mean_axes(data: &ArrayD<f32>, axes: &[usize]) -> Result<ArrayD<f32>> {
    let ndim = data.ndim();
    for (i, &axis) in axes.iter().enumerate() {
        if axis >= ndim {
            return Err(UnseenError::InvalidArgument(format!(
                "Axis {axis} is out of bounds for array with {ndim} dimensions"
            )));
        }
        if axes[..i].contains(&axis) {
            return Err(UnseenError::InvalidArgument(format!(
                "Axis {axis} repeated in reduction"
            )));
        }
    }

    // Kept axes first, reduced axes last, so each output element owns a
    // contiguous run of the standard-layout buffer
    let kept: Vec<usize> = (0..ndim).filter(|a| !axes.contains(a)).collect();
    let order: Vec<usize> = kept.iter().chain(axes).copied().collect();
    let out_shape: Vec<usize> = kept.iter().map(|&a| data.shape()[a]).collect();
    let output_size: usize = out_shape.iter().product();
    let group_size: usize = axes.iter().map(|&a| data.shape()[a]).product();

    if group_size == 0 {
        return Ok(ArrayD::from_elem(IxDyn(&out_shape), f32::NAN));
    }

    let permuted = data.view().permuted_axes(order);
    let contiguous = permuted.as_standard_layout();
    let values = contiguous.as_slice().ok_or_else(|| {
        UnseenError::InvalidArgument("array is not contiguous after reordering".to_string())
    })?;

    debug!(
        "Processing {output_size} elements across {} CPU cores",
        rayon::current_num_threads()
    );

    let result: Vec<f32> = values
        .par_chunks(group_size)
        .map(|group| {
            let mut sum = 0.0_f64;
            let mut count = 0_usize;
            for &value in group {
                // Skip NaN and infinite values
                if value.is_finite() {
                    sum += f64::from(value);
                    count += 1;
                }
            }
            if count > 0 {
                (sum / count as f64) as f32
            } else {
                f32::NAN
            }
        })
        .collect();

    Ok(ArrayD::from_shape_vec(IxDyn(&out_shape), result)?)
}
