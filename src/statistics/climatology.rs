//! Climatologies: means over grouping dimensions, optionally per initial
//! month and restricted to a baseline period

use super::parallel::parallel_mean_axes;
use crate::array::{broadcast_dims, Coordinate, DataArray};
use crate::errors::{Result, UnseenError};
use crate::stacking::{INIT_DIM, TIME_DIM};
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use ndarray::{Axis, Zip};
use std::fmt;
use tracing::debug;

/// Name of the dimension produced by grouping on initial month
pub const MONTH_DIM: &str = "month";

/// Inclusive range of dates used as a baseline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimePeriod {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl TimePeriod {
    /// # Errors
    ///
    /// Returns an error if `start` is after `end`.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(UnseenError::InvalidArgument(format!(
                "time period start {start} is after end {end}"
            )));
        }
        Ok(Self { start, end })
    }

    /// Parse start and end dates in YYYY-MM-DD format
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        let parse = |s: &str| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| {
                UnseenError::InvalidArgument(format!("invalid date '{s}' (expected YYYY-MM-DD): {e}"))
            })
        };
        Self::new(parse(start)?, parse(end)?)
    }

    pub fn contains(&self, time: NaiveDateTime) -> bool {
        let date = time.date();
        date >= self.start && date <= self.end
    }
}

impl fmt::Display for TimePeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}",
            self.start.format("%Y-%m-%d"),
            self.end.format("%Y-%m-%d")
        )
    }
}

/// Restrict an array to a time period.
///
/// With a `time` dimension the matching positions are selected. With a
/// `time` coordinate that is not a dimension (stacked forecasts), cells
/// outside the period are set to NaN.
///
/// # Errors
///
/// Returns an error if the array has no `time` coordinate.
pub fn select_time_period(da: &DataArray, period: &TimePeriod) -> Result<DataArray> {
    if da.has_dim(TIME_DIM) {
        let keep: Vec<usize> = da
            .time_values(TIME_DIM)?
            .iter()
            .enumerate()
            .filter(|(_, t)| period.contains(**t))
            .map(|(i, _)| i)
            .collect();
        return da.isel(TIME_DIM, &keep);
    }

    let coord = da.coord(TIME_DIM)?;
    let times = coord.times().ok_or_else(|| {
        UnseenError::InvalidArgument(format!(
            "coordinate '{TIME_DIM}' of '{}' does not hold timestamps",
            da.name
        ))
    })?;
    let inside = times.mapv(|t| t.is_some_and(|t| period.contains(t)));
    let mask = broadcast_dims(inside.view(), &coord.dims, &da.dims, da.data.shape())?;

    let mut out = da.clone();
    Zip::from(&mut out.data).and(&mask).for_each(|v, &keep| {
        if !keep {
            *v = f32::NAN;
        }
    });
    Ok(out)
}

/// Mean over `dims`, dropping coordinates that span a reduced dimension
fn reduce_mean(da: &DataArray, dims: &[&str]) -> Result<DataArray> {
    let axes = dims
        .iter()
        .map(|d| da.axis_of(d))
        .collect::<Result<Vec<_>>>()?;
    let data = parallel_mean_axes(&da.data, &axes)?;
    let kept_dims: Vec<String> = da
        .dims
        .iter()
        .filter(|d| !dims.contains(&d.as_str()))
        .cloned()
        .collect();

    let mut out = DataArray::new(&da.name, data, kept_dims)?;
    out.attrs = da.attrs.clone();
    for (name, coord) in &da.coords {
        if coord.dims.iter().all(|d| !dims.contains(&d.as_str())) {
            out.set_coord(name, coord.clone())?;
        }
    }
    Ok(out)
}

/// Calculate a climatology.
///
/// Takes the NaN-skipping mean over `dims`, after restricting the data to
/// `time_period` if given. With `groupby_init_month` the mean is taken
/// separately for each calendar month of `init_date` (which must be one of
/// `dims`), and the result gains a leading `month` dimension holding the
/// sorted months present.
///
/// # Errors
///
/// Returns an error if a dimension in `dims` is missing, or grouping is
/// requested without an `init_date` coordinate among the reduced dims.
pub fn get_clim(
    da: &DataArray,
    dims: &[&str],
    time_period: Option<&TimePeriod>,
    groupby_init_month: bool,
) -> Result<DataArray> {
    let da = match time_period {
        Some(period) => select_time_period(da, period)?,
        None => da.clone(),
    };
    let mut unique: Vec<&str> = Vec::with_capacity(dims.len());
    for &dim in dims {
        if !unique.contains(&dim) {
            unique.push(dim);
        }
    }
    let dims = unique;
    for dim in &dims {
        da.axis_of(dim)?;
    }

    if !groupby_init_month {
        return reduce_mean(&da, &dims);
    }

    if !dims.contains(&INIT_DIM) {
        return Err(UnseenError::InvalidArgument(format!(
            "grouping by initial month requires reducing over '{INIT_DIM}'"
        )));
    }
    let init_months: Vec<u32> = da
        .time_values(INIT_DIM)?
        .iter()
        .map(|t| t.month())
        .collect();
    let mut months = init_months.clone();
    months.sort_unstable();
    months.dedup();
    if months.is_empty() {
        return Err(UnseenError::InvalidArgument(format!(
            "'{}' has no initial dates to group",
            da.name
        )));
    }

    let mut groups = Vec::with_capacity(months.len());
    for &month in &months {
        let indices: Vec<usize> = init_months
            .iter()
            .enumerate()
            .filter(|(_, m)| **m == month)
            .map(|(i, _)| i)
            .collect();
        groups.push(reduce_mean(&da.isel(INIT_DIM, &indices)?, &dims)?);
    }

    let views: Vec<_> = groups.iter().map(|g| g.data.view()).collect();
    let data = ndarray::stack(Axis(0), &views)?;
    let template = &groups[0];
    let mut out_dims = vec![MONTH_DIM.to_string()];
    out_dims.extend(template.dims.iter().cloned());

    let mut out = DataArray::new(&da.name, data, out_dims)?;
    out.attrs = da.attrs.clone();
    for (name, coord) in &template.coords {
        out.set_coord(name, coord.clone())?;
    }
    out.set_coord(
        MONTH_DIM,
        Coordinate::from_ints(MONTH_DIM, months.iter().map(|&m| i64::from(m)).collect()),
    )?;

    debug!(
        variable = %out.name,
        months = ?months,
        reduced = ?dims,
        "computed climatology"
    );
    Ok(out)
}
