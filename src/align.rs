//! Element-wise arithmetic between labelled arrays
//!
//! Operands are matched by dimension name rather than axis position.
//! Dimensions both operands index with a 1-D coordinate are inner-joined on
//! their labels before the operation is applied.

use crate::array::{broadcast_dims, DataArray, Label};
use crate::errors::{Result, UnseenError};
use ndarray::{ArrayD, IxDyn, Zip};
use tracing::trace;

/// Options controlling how results of computations are assembled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComputeOptions {
    /// Carry the left operand's attributes onto the result
    pub keep_attrs: bool,
}

impl Default for ComputeOptions {
    fn default() -> Self {
        Self { keep_attrs: true }
    }
}

impl ComputeOptions {
    pub fn keep_attrs(keep_attrs: bool) -> Self {
        Self { keep_attrs }
    }
}

/// Integer and float labels compare by value
fn labels_match(a: &Label, b: &Label) -> bool {
    match (a, b) {
        (Label::Int(x), Label::Float(y)) | (Label::Float(y), Label::Int(x)) => *x as f64 == *y,
        _ => a == b,
    }
}

/// Positions of the labels shared by both sides, in left-hand order
fn inner_join(lhs: &[Option<Label>], rhs: &[Option<Label>]) -> (Vec<usize>, Vec<usize>) {
    let mut left = Vec::new();
    let mut right = Vec::new();
    for (i, label) in lhs.iter().enumerate() {
        let Some(label) = label else { continue };
        let found = rhs
            .iter()
            .position(|other| other.as_ref().is_some_and(|o| labels_match(label, o)));
        if let Some(j) = found {
            left.push(i);
            right.push(j);
        }
    }
    (left, right)
}

fn index_labels(da: &DataArray, dim: &str) -> Option<Vec<Option<Label>>> {
    da.coords
        .get(dim)
        .filter(|c| c.is_index_of(dim))
        .map(|c| c.labels())
}

/// Apply `op` element-wise to two arrays aligned by dimension name.
///
/// The result has the left operand's dimensions followed by any dimensions
/// only the right operand has. Coordinates are the union of both sides, the
/// left side winning on name clashes.
///
/// # Errors
///
/// Returns [`UnseenError::ShapeMismatch`] when a shared dimension without
/// labels on both sides has different lengths.
pub fn binary_op(
    lhs: &DataArray,
    rhs: &DataArray,
    op: fn(f32, f32) -> f32,
    options: ComputeOptions,
) -> Result<DataArray> {
    let mut lhs = lhs.clone();
    let mut rhs = rhs.clone();

    let shared: Vec<String> = lhs
        .dims
        .iter()
        .filter(|d| rhs.has_dim(d))
        .cloned()
        .collect();
    for dim in &shared {
        match (index_labels(&lhs, dim), index_labels(&rhs, dim)) {
            (Some(left_labels), Some(right_labels)) => {
                let (left, right) = inner_join(&left_labels, &right_labels);
                if left.len() != left_labels.len() || right.len() != right_labels.len() {
                    trace!(
                        dim = %dim,
                        left = left_labels.len(),
                        right = right_labels.len(),
                        joined = left.len(),
                        "inner join dropped labels"
                    );
                }
                lhs = lhs.isel(dim, &left)?;
                rhs = rhs.isel(dim, &right)?;
            }
            _ => {
                let (l, r) = (lhs.len_of(dim)?, rhs.len_of(dim)?);
                if l != r {
                    return Err(UnseenError::ShapeMismatch {
                        message: format!(
                            "dimension '{dim}' has length {l} in '{}' but {r} in '{}'",
                            lhs.name, rhs.name
                        ),
                    });
                }
            }
        }
    }

    let mut dims = lhs.dims.clone();
    let mut shape = lhs.data.shape().to_vec();
    for (dim, &len) in rhs.dims.iter().zip(rhs.data.shape()) {
        if !lhs.has_dim(dim) {
            dims.push(dim.clone());
            shape.push(len);
        }
    }

    let left = broadcast_dims(lhs.data.view(), &lhs.dims, &dims, &shape)?;
    let right = broadcast_dims(rhs.data.view(), &rhs.dims, &dims, &shape)?;
    let mut data = ArrayD::<f32>::zeros(IxDyn(&shape));
    Zip::from(&mut data)
        .and(&left)
        .and(&right)
        .for_each(|out, &a, &b| *out = op(a, b));

    let mut out = DataArray::new(&lhs.name, data, dims)?;
    for (name, coord) in rhs.coords.iter().chain(&lhs.coords) {
        out.set_coord(name, coord.clone())?;
    }
    if options.keep_attrs {
        out.attrs = lhs.attrs;
    }
    Ok(out)
}

pub fn subtract(lhs: &DataArray, rhs: &DataArray, options: ComputeOptions) -> Result<DataArray> {
    binary_op(lhs, rhs, |a, b| a - b, options)
}

pub fn divide(lhs: &DataArray, rhs: &DataArray, options: ComputeOptions) -> Result<DataArray> {
    binary_op(lhs, rhs, |a, b| a / b, options)
}
