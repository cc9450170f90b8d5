//! Geographic sub-region selection
//!
//! Grid points strictly inside a lat/lon box are kept; everything outside is
//! set to NaN and rows/columns with no selected point are trimmed away.

use crate::array::{CoordValues, Coordinate, DataArray};
use crate::errors::{Result, UnseenError};
use ndarray::{ArrayD, Axis, IxDyn, Zip};
use tracing::debug;

/// Latitude/longitude box given as south, north, east and west bounds.
///
/// The "east" bound is where the box starts when moving eastwards from the
/// prime meridian and "west" is where it ends, so `east >= west` describes a
/// box that crosses the 0/360 seam.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    south: f64,
    north: f64,
    east: f64,
    west: f64,
}

impl BoundingBox {
    /// Australian region
    pub const AUSTRALIA: Self = Self {
        south: -44.0,
        north: -11.0,
        east: 113.0,
        west: 154.0,
    };

    /// Create a validated bounding box
    ///
    /// # Errors
    ///
    /// Returns [`UnseenError::InvalidBoundingBox`] if a latitude lies outside
    /// [-90, 90], the south bound is not below the north bound, or a
    /// longitude lies outside [0, 360).
    pub fn new(south: f64, north: f64, east: f64, west: f64) -> Result<Self> {
        let invalid = |message: &str| {
            Err(UnseenError::InvalidBoundingBox {
                message: message.to_string(),
            })
        };
        if !(-90.0..=90.0).contains(&south) || !(-90.0..=90.0).contains(&north) {
            return invalid("Valid latitude range is [-90, 90]");
        }
        if south >= north {
            return invalid("South bound greater than north bound");
        }
        if !(0.0..360.0).contains(&east) || !(0.0..360.0).contains(&west) {
            return invalid("Valid longitude range is [0, 360)");
        }
        Ok(Self {
            south,
            north,
            east,
            west,
        })
    }

    pub fn south(&self) -> f64 {
        self.south
    }

    pub fn north(&self) -> f64 {
        self.north
    }

    pub fn east(&self) -> f64 {
        self.east
    }

    pub fn west(&self) -> f64 {
        self.west
    }

    /// True when the box wraps across the 0/360 meridian
    pub fn crosses_seam(&self) -> bool {
        self.east >= self.west
    }

    /// Strictly between the south and north bounds
    pub fn contains_lat(&self, lat: f64) -> bool {
        lat > self.south && lat < self.north
    }

    /// Strictly inside the longitude range; `lon` must already be in [0, 360)
    pub fn contains_lon(&self, lon: f64) -> bool {
        if self.crosses_seam() {
            lon > self.east || lon < self.west
        } else {
            lon > self.east && lon < self.west
        }
    }
}

/// Map a longitude into [0, 360)
pub fn normalize_lon(lon: f64) -> f64 {
    (lon + 360.0).rem_euclid(360.0)
}

/// Select the grid points of `da` that fall within `bbox`.
///
/// Works with 1-D `lat`/`lon` dimension coordinates as well as 2-D
/// (curvilinear) ones. The returned array has its `lon` coordinate
/// normalized to [0, 360).
///
/// # Errors
///
/// Returns an error if `da` has no numeric `lat` or `lon` coordinate.
pub fn select_region(da: &DataArray, bbox: &BoundingBox) -> Result<DataArray> {
    let numeric = |name: &str| -> Result<(Coordinate, ArrayD<f64>)> {
        let coord = da.coord(name)?;
        let values = coord.as_f64().ok_or_else(|| {
            UnseenError::InvalidArgument(format!(
                "coordinate '{name}' of '{}' is not numeric",
                da.name
            ))
        })?;
        Ok((coord.clone(), values))
    };
    let (lat, lat_values) = numeric("lat")?;
    let (mut lon, lon_values) = numeric("lon")?;
    let lon_values = lon_values.mapv(normalize_lon);

    let mut out = da.clone();
    lon.values = CoordValues::Float(lon_values.clone());
    out.set_coord("lon", lon.clone())?;

    // Mask over the data dimensions spanned by lat and lon, in data order
    let mask_dims: Vec<String> = out
        .dims
        .iter()
        .filter(|d| lat.dims.contains(d) || lon.dims.contains(d))
        .cloned()
        .collect();
    let mask_shape = mask_dims
        .iter()
        .map(|d| out.len_of(d))
        .collect::<Result<Vec<_>>>()?;
    let positions = |dims: &[String]| -> Vec<usize> {
        dims.iter()
            .filter_map(|d| mask_dims.iter().position(|m| m == d))
            .collect()
    };
    let lat_pos = positions(&lat.dims);
    let lon_pos = positions(&lon.dims);

    let mask = ArrayD::from_shape_fn(IxDyn(&mask_shape), |idx| {
        let lat_idx: Vec<usize> = lat_pos.iter().map(|&p| idx[p]).collect();
        let lon_idx: Vec<usize> = lon_pos.iter().map(|&p| idx[p]).collect();
        bbox.contains_lat(lat_values[IxDyn(&lat_idx)])
            && bbox.contains_lon(lon_values[IxDyn(&lon_idx)])
    });

    let mut trimmed_mask = mask.clone();
    for (axis, dim) in mask_dims.iter().enumerate() {
        let keep: Vec<usize> = mask
            .axis_iter(Axis(axis))
            .enumerate()
            .filter(|(_, lane)| lane.iter().any(|&m| m))
            .map(|(i, _)| i)
            .collect();
        trimmed_mask = trimmed_mask.select(Axis(axis), &keep);
        out = out.isel(dim, &keep)?;
    }

    // Points inside the trimmed rectangle but outside the box become missing
    let mut broadcast_mask = trimmed_mask;
    for (axis, dim) in out.dims.iter().enumerate() {
        if !mask_dims.contains(dim) {
            broadcast_mask = broadcast_mask.insert_axis(Axis(axis));
        }
    }
    let mask_view = broadcast_mask
        .broadcast(out.data.raw_dim())
        .ok_or_else(|| UnseenError::ShapeMismatch {
            message: "region mask cannot be broadcast to the data".to_string(),
        })?;
    Zip::from(&mut out.data).and(&mask_view).for_each(|v, &inside| {
        if !inside {
            *v = f32::NAN;
        }
    });

    debug!(
        variable = %out.name,
        shape = ?out.data.shape(),
        "selected region"
    );
    Ok(out)
}
