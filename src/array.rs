//! Labelled N-dimensional arrays
//!
//! [`DataArray`] pairs an `ndarray::ArrayD<f32>` with dimension names,
//! coordinates and attributes. Missing data is NaN in the values and NaN or
//! `None` in coordinates. The operations here are the building blocks the
//! region selector, the stacker and the bias engine are written in terms of.

use crate::errors::{Result, UnseenError};
use chrono::NaiveDateTime;
use ndarray::{Array1, ArrayD, ArrayViewD, Axis, IxDyn};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// Attribute map shared by arrays, coordinates and datasets
pub type Attributes = BTreeMap<String, JsonValue>;

/// A single coordinate label, used when aligning or concatenating arrays
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub enum Label {
    Int(i64),
    Float(f64),
    Time(NaiveDateTime),
}

/// Typed storage for coordinate values
#[derive(Debug, Clone, PartialEq)]
pub enum CoordValues {
    /// Floating point values, NaN marks missing entries
    Float(ArrayD<f64>),
    /// Integer values, never missing
    Int(ArrayD<i64>),
    /// Timestamps, `None` marks missing entries
    Time(ArrayD<Option<NaiveDateTime>>),
}

impl CoordValues {
    pub fn shape(&self) -> &[usize] {
        match self {
            Self::Float(a) => a.shape(),
            Self::Int(a) => a.shape(),
            Self::Time(a) => a.shape(),
        }
    }

    fn select(&self, axis: Axis, indices: &[usize]) -> Self {
        match self {
            Self::Float(a) => Self::Float(a.select(axis, indices)),
            Self::Int(a) => Self::Int(a.select(axis, indices)),
            Self::Time(a) => Self::Time(a.select(axis, indices)),
        }
    }

    fn index_axis(&self, axis: Axis, index: usize) -> Self {
        match self {
            Self::Float(a) => Self::Float(a.index_axis(axis, index).to_owned()),
            Self::Int(a) => Self::Int(a.index_axis(axis, index).to_owned()),
            Self::Time(a) => Self::Time(a.index_axis(axis, index).to_owned()),
        }
    }

    /// Mask that is `true` wherever a value is missing
    pub fn missing_mask(&self) -> ArrayD<bool> {
        match self {
            Self::Float(a) => a.mapv(f64::is_nan),
            Self::Int(a) => a.mapv(|_| false),
            Self::Time(a) => a.mapv(|t| t.is_none()),
        }
    }

    /// Value at a multi-index as a [`Label`], `None` if missing
    pub fn label_at(&self, index: &[usize]) -> Option<Label> {
        match self {
            Self::Float(a) => a
                .get(IxDyn(index))
                .copied()
                .filter(|v| !v.is_nan())
                .map(Label::Float),
            Self::Int(a) => a.get(IxDyn(index)).copied().map(Label::Int),
            Self::Time(a) => a.get(IxDyn(index)).copied().flatten().map(Label::Time),
        }
    }
}

/// Named values laid out over zero or more dimensions
#[derive(Debug, Clone, PartialEq)]
pub struct Coordinate {
    pub dims: Vec<String>,
    pub values: CoordValues,
    pub attrs: Attributes,
}

impl Coordinate {
    pub fn new(dims: Vec<String>, values: CoordValues) -> Self {
        Self {
            dims,
            values,
            attrs: Attributes::new(),
        }
    }

    /// 1-D timestamp coordinate along `dim`
    pub fn from_times(dim: &str, times: &[NaiveDateTime]) -> Self {
        let values = Array1::from_iter(times.iter().copied().map(Some)).into_dyn();
        Self::new(vec![dim.to_string()], CoordValues::Time(values))
    }

    /// 1-D integer coordinate along `dim`
    pub fn from_ints(dim: &str, values: Vec<i64>) -> Self {
        Self::new(
            vec![dim.to_string()],
            CoordValues::Int(Array1::from_vec(values).into_dyn()),
        )
    }

    /// 1-D float coordinate along `dim`
    pub fn from_floats(dim: &str, values: Vec<f64>) -> Self {
        Self::new(
            vec![dim.to_string()],
            CoordValues::Float(Array1::from_vec(values).into_dyn()),
        )
    }

    pub fn with_attr(mut self, key: &str, value: impl Into<JsonValue>) -> Self {
        self.attrs.insert(key.to_string(), value.into());
        self
    }

    /// Values as floats, converting integers. `None` for timestamps.
    pub fn as_f64(&self) -> Option<ArrayD<f64>> {
        match &self.values {
            CoordValues::Float(a) => Some(a.clone()),
            CoordValues::Int(a) => Some(a.mapv(|v| v as f64)),
            CoordValues::Time(_) => None,
        }
    }

    pub fn times(&self) -> Option<&ArrayD<Option<NaiveDateTime>>> {
        match &self.values {
            CoordValues::Time(a) => Some(a),
            _ => None,
        }
    }

    /// Labels of a 1-D coordinate in index order
    pub fn labels(&self) -> Vec<Option<Label>> {
        (0..self.values.shape().iter().product::<usize>())
            .map(|i| self.values.label_at(&[i]))
            .collect()
    }

    /// True when this coordinate indexes exactly the dimension of the same name
    pub fn is_index_of(&self, dim: &str) -> bool {
        self.dims.len() == 1 && self.dims[0] == dim
    }

    fn isel(&self, dim: &str, indices: &[usize]) -> Self {
        match self.dims.iter().position(|d| d == dim) {
            Some(pos) => Self {
                dims: self.dims.clone(),
                values: self.values.select(Axis(pos), indices),
                attrs: self.attrs.clone(),
            },
            None => self.clone(),
        }
    }

    fn index_dim(&self, dim: &str, index: usize) -> Self {
        match self.dims.iter().position(|d| d == dim) {
            Some(pos) => {
                let mut dims = self.dims.clone();
                dims.remove(pos);
                Self {
                    dims,
                    values: self.values.index_axis(Axis(pos), index),
                    attrs: self.attrs.clone(),
                }
            }
            None => self.clone(),
        }
    }

    pub fn rename_dim(&mut self, old: &str, new: &str) {
        for d in self.dims.iter_mut().filter(|d| d.as_str() == old) {
            *d = new.to_string();
        }
    }
}

/// A labelled N-dimensional array of f32 values
#[derive(Debug, Clone, PartialEq)]
pub struct DataArray {
    pub name: String,
    pub data: ArrayD<f32>,
    pub dims: Vec<String>,
    pub coords: BTreeMap<String, Coordinate>,
    pub attrs: Attributes,
}

impl DataArray {
    /// Create an array without coordinates
    ///
    /// # Errors
    ///
    /// Returns an error if the number of dimension names does not match the
    /// array rank or a dimension name is repeated.
    pub fn new(name: &str, data: ArrayD<f32>, dims: Vec<String>) -> Result<Self> {
        if data.ndim() != dims.len() {
            return Err(UnseenError::ShapeMismatch {
                message: format!(
                    "array '{name}' has {} axes but {} dimension names",
                    data.ndim(),
                    dims.len()
                ),
            });
        }
        for (i, dim) in dims.iter().enumerate() {
            if dims[..i].contains(dim) {
                return Err(UnseenError::InvalidArgument(format!(
                    "dimension '{dim}' repeated in array '{name}'"
                )));
            }
        }
        Ok(Self {
            name: name.to_string(),
            data,
            dims,
            coords: BTreeMap::new(),
            attrs: Attributes::new(),
        })
    }

    /// Builder form of [`DataArray::set_coord`]
    pub fn with_coord(mut self, name: &str, coord: Coordinate) -> Result<Self> {
        self.set_coord(name, coord)?;
        Ok(self)
    }

    pub fn with_attr(mut self, key: &str, value: impl Into<JsonValue>) -> Self {
        self.attrs.insert(key.to_string(), value.into());
        self
    }

    /// Attach or replace a coordinate, checking it fits the array's dimensions
    pub fn set_coord(&mut self, name: &str, coord: Coordinate) -> Result<()> {
        if coord.dims.len() != coord.values.shape().len() {
            return Err(UnseenError::ShapeMismatch {
                message: format!("coordinate '{name}' rank does not match its dimensions"),
            });
        }
        for (dim, &len) in coord.dims.iter().zip(coord.values.shape()) {
            let expected = self.len_of(dim)?;
            if expected != len {
                return Err(UnseenError::ShapeMismatch {
                    message: format!(
                        "coordinate '{name}' has length {len} along '{dim}', expected {expected}"
                    ),
                });
            }
        }
        self.coords.insert(name.to_string(), coord);
        Ok(())
    }

    pub fn drop_coord(&mut self, name: &str) -> Option<Coordinate> {
        self.coords.remove(name)
    }

    pub fn has_dim(&self, dim: &str) -> bool {
        self.dims.iter().any(|d| d == dim)
    }

    pub fn axis_of(&self, dim: &str) -> Result<usize> {
        self.dims
            .iter()
            .position(|d| d == dim)
            .ok_or_else(|| UnseenError::DimensionNotFound {
                var: self.name.clone(),
                dim: dim.to_string(),
            })
    }

    pub fn len_of(&self, dim: &str) -> Result<usize> {
        Ok(self.data.len_of(Axis(self.axis_of(dim)?)))
    }

    pub fn coord(&self, name: &str) -> Result<&Coordinate> {
        self.coords
            .get(name)
            .ok_or_else(|| UnseenError::CoordinateNotFound {
                var: self.name.clone(),
                coord: name.to_string(),
            })
    }

    /// Values of a 1-D timestamp coordinate, failing on missing entries
    pub fn time_values(&self, name: &str) -> Result<Vec<NaiveDateTime>> {
        let coord = self.coord(name)?;
        let times = coord.times().filter(|_| coord.dims.len() == 1).ok_or_else(|| {
            UnseenError::InvalidArgument(format!(
                "coordinate '{name}' of '{}' is not a 1-D time coordinate",
                self.name
            ))
        })?;
        times
            .iter()
            .map(|t| {
                t.ok_or_else(|| {
                    UnseenError::InvalidArgument(format!(
                        "coordinate '{name}' of '{}' contains missing times",
                        self.name
                    ))
                })
            })
            .collect()
    }

    /// Select positions along one dimension, keeping it
    pub fn isel(&self, dim: &str, indices: &[usize]) -> Result<Self> {
        let axis = self.axis_of(dim)?;
        let len = self.data.len_of(Axis(axis));
        if let Some(&bad) = indices.iter().find(|&&i| i >= len) {
            return Err(UnseenError::InvalidArgument(format!(
                "index {bad} out of bounds for dimension '{dim}' of length {len}"
            )));
        }
        Ok(Self {
            name: self.name.clone(),
            data: self.data.select(Axis(axis), indices),
            dims: self.dims.clone(),
            coords: self
                .coords
                .iter()
                .map(|(k, c)| (k.clone(), c.isel(dim, indices)))
                .collect(),
            attrs: self.attrs.clone(),
        })
    }

    /// Select a single position along a dimension, dropping it.
    /// Coordinates along only that dimension become scalars.
    pub fn index_dim(&self, dim: &str, index: usize) -> Result<Self> {
        let axis = self.axis_of(dim)?;
        let len = self.data.len_of(Axis(axis));
        if index >= len {
            return Err(UnseenError::InvalidArgument(format!(
                "index {index} out of bounds for dimension '{dim}' of length {len}"
            )));
        }
        let mut dims = self.dims.clone();
        dims.remove(axis);
        Ok(Self {
            name: self.name.clone(),
            data: self.data.index_axis(Axis(axis), index).to_owned(),
            dims,
            coords: self
                .coords
                .iter()
                .map(|(k, c)| (k.clone(), c.index_dim(dim, index)))
                .collect(),
            attrs: self.attrs.clone(),
        })
    }

    /// Rename a dimension on the array and on every coordinate using it
    pub fn rename_dim(&mut self, old: &str, new: &str) -> Result<()> {
        let axis = self.axis_of(old)?;
        if old != new && self.has_dim(new) {
            return Err(UnseenError::InvalidArgument(format!(
                "cannot rename '{old}' to existing dimension '{new}'"
            )));
        }
        self.dims[axis] = new.to_string();
        for coord in self.coords.values_mut() {
            coord.rename_dim(old, new);
        }
        Ok(())
    }

    /// Drop, along every dimension, the positions whose values are all NaN
    pub fn dropna_all(&self) -> Result<Self> {
        let keep: Vec<(String, Vec<usize>)> = self
            .dims
            .iter()
            .enumerate()
            .map(|(axis, dim)| {
                let indices = self
                    .data
                    .axis_iter(Axis(axis))
                    .enumerate()
                    .filter(|(_, lane)| lane.iter().any(|v| !v.is_nan()))
                    .map(|(i, _)| i)
                    .collect();
                (dim.clone(), indices)
            })
            .collect();

        let mut out = self.clone();
        for (dim, indices) in &keep {
            out = out.isel(dim, indices)?;
        }
        Ok(out)
    }

    /// Shape keyed by dimension name
    pub fn sizes(&self) -> BTreeMap<String, usize> {
        self.dims
            .iter()
            .cloned()
            .zip(self.data.shape().iter().copied())
            .collect()
    }
}

/// Lay `values` (over `from_dims`) out over `to_dims` with shape `to_shape`,
/// repeating along dimensions it does not have
///
/// # Errors
///
/// Returns [`UnseenError::ShapeMismatch`] if `from_dims` has a dimension
/// missing from `to_dims` or the lengths disagree.
pub fn broadcast_dims<A: Clone>(
    values: ArrayViewD<'_, A>,
    from_dims: &[String],
    to_dims: &[String],
    to_shape: &[usize],
) -> Result<ArrayD<A>> {
    let mismatch = || UnseenError::ShapeMismatch {
        message: format!("cannot broadcast dimensions {from_dims:?} to {to_dims:?}"),
    };
    let mut view = values;
    let mut order = from_dims.to_vec();
    for dim in to_dims {
        if !from_dims.contains(dim) {
            let axis = view.ndim();
            view = view.insert_axis(Axis(axis));
            order.push(dim.clone());
        }
    }
    let permutation = to_dims
        .iter()
        .map(|d| order.iter().position(|o| o == d))
        .collect::<Option<Vec<usize>>>()
        .filter(|p| p.len() == order.len())
        .ok_or_else(mismatch)?;
    let view = view.permuted_axes(permutation);
    view.broadcast(IxDyn(to_shape))
        .map(|b| b.to_owned())
        .ok_or_else(mismatch)
}

/// Named data variables with global attributes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    pub data_vars: BTreeMap<String, DataArray>,
    pub attrs: Attributes,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, array: DataArray) {
        self.data_vars.insert(array.name.clone(), array);
    }

    pub fn get(&self, name: &str) -> Result<&DataArray> {
        self.data_vars
            .get(name)
            .ok_or_else(|| UnseenError::VariableNotFound {
                var: name.to_string(),
            })
    }

    /// String value of a global attribute, if present
    pub fn attr_str(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).and_then(JsonValue::as_str)
    }
}

impl From<DataArray> for Dataset {
    fn from(array: DataArray) -> Self {
        let mut ds = Self::new();
        ds.insert(array);
        ds
    }
}
