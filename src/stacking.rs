//! Initial date / lead time restructuring
//!
//! [`stack_by_init_date`] turns a time series into a 2-D
//! (`init_date`, `lead_time`) forecast layout and [`reindex_forecast`]
//! swaps between that layout and a per-forecast `time` axis.

use crate::array::{CoordValues, Coordinate, DataArray, Label};
use crate::calendar::{strip_leap_days, Freq};
use crate::errors::{Result, UnseenError};
use chrono::NaiveDateTime;
use ndarray::{Array2, ArrayD, ArrayViewD, Axis, IxDyn};
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::{debug, warn};

pub const INIT_DIM: &str = "init_date";
pub const LEAD_DIM: &str = "lead_time";
pub const TIME_DIM: &str = "time";

/// Rolling window view along one axis.
///
/// Each window is labelled by its last element, so the window with label
/// `j` covers positions `j + 1 - len ..= j`. Positions before the start of
/// the axis are NaN. Windows are only materialised when requested.
struct RollingWindow<'a> {
    data: ArrayViewD<'a, f32>,
    axis: usize,
    len: usize,
}

impl<'a> RollingWindow<'a> {
    fn new(data: ArrayViewD<'a, f32>, axis: usize, len: usize) -> Self {
        Self { data, axis, len }
    }

    /// Window values with the window position as the trailing axis
    fn window(&self, label: usize) -> ArrayD<f32> {
        let mut shape = self.data.shape().to_vec();
        shape.remove(self.axis);
        shape.push(self.len);
        let position_axis = shape.len() - 1;

        let mut out = ArrayD::from_elem(IxDyn(&shape), f32::NAN);
        for k in 0..self.len {
            if label + k + 1 < self.len {
                continue;
            }
            let source = label + k + 1 - self.len;
            out.index_axis_mut(Axis(position_axis), k)
                .assign(&self.data.index_axis(Axis(self.axis), source));
        }
        out
    }
}

/// Stack a time series into initial date / lead time format.
///
/// Leap days are removed first, so lead times count non-leap steps. For each
/// entry of `init_dates` the first timestamp that floors (at `freq`) to that
/// date starts a window of `n_lead_steps` values. The result has the `time`
/// dimension replaced by `init_date`, a trailing `lead_time` dimension
/// (`0..n_lead_steps`, `units` = `freq`) and a 2-D `time` coordinate holding
/// the timestamp of every cell.
///
/// # Errors
///
/// - [`UnseenError::InitDateNotFound`] if an initial date does not occur
/// - [`UnseenError::WindowOutOfRange`] if a window runs past the data
/// - [`UnseenError::InvalidArgument`] if `n_lead_steps` is zero
pub fn stack_by_init_date(
    da: &DataArray,
    init_dates: &[NaiveDateTime],
    n_lead_steps: usize,
    freq: Freq,
) -> Result<DataArray> {
    if n_lead_steps == 0 {
        return Err(UnseenError::InvalidArgument(
            "number of lead steps must be positive".to_string(),
        ));
    }

    let series = strip_leap_days(da)?;
    let times = series.time_values(TIME_DIM)?;
    let rounded_times: Vec<NaiveDateTime> = times.iter().map(|&t| freq.floor(t)).collect();

    let mut first_index: HashMap<NaiveDateTime, usize> = HashMap::with_capacity(times.len());
    for (i, &t) in rounded_times.iter().enumerate() {
        first_index.entry(t).or_insert(i);
    }
    if first_index.len() < rounded_times.len() {
        warn!(
            variable = %da.name,
            duplicates = rounded_times.len() - first_index.len(),
            "time axis has duplicate floored timestamps, using the first match"
        );
    }

    let offset = n_lead_steps - 1;
    let mut starts = Vec::with_capacity(init_dates.len());
    let mut labels = Vec::with_capacity(init_dates.len());
    for &date in init_dates {
        let start = *first_index
            .get(&date)
            .ok_or(UnseenError::InitDateNotFound { date })?;
        if start + n_lead_steps > times.len() {
            return Err(UnseenError::WindowOutOfRange {
                date,
                n_lead_steps,
                available: times.len() - start,
            });
        }
        starts.push(start);
        labels.push(start + offset);
    }

    let time2d = Array2::from_shape_fn((starts.len(), n_lead_steps), |(row, k)| {
        Some(times[starts[row] + k])
    })
    .into_dyn();

    let time_axis = series.axis_of(TIME_DIM)?;
    let rolling = RollingWindow::new(series.data.view(), time_axis, n_lead_steps);

    let mut shape = series.data.shape().to_vec();
    shape[time_axis] = labels.len();
    shape.push(n_lead_steps);
    let mut stacked = ArrayD::from_elem(IxDyn(&shape), f32::NAN);
    for (row, &label) in labels.iter().enumerate() {
        stacked
            .index_axis_mut(Axis(time_axis), row)
            .assign(&rolling.window(label));
    }

    let mut dims = series.dims.clone();
    dims[time_axis] = INIT_DIM.to_string();
    dims.push(LEAD_DIM.to_string());

    let mut out = DataArray::new(&series.name, stacked, dims)?;
    out.attrs = series.attrs.clone();

    let selected = series.isel(TIME_DIM, &labels)?;
    for (name, mut coord) in selected.coords {
        if name == TIME_DIM {
            continue;
        }
        coord.rename_dim(TIME_DIM, INIT_DIM);
        out.set_coord(&name, coord)?;
    }

    let init_values: Vec<NaiveDateTime> = starts.iter().map(|&s| times[s]).collect();
    out.set_coord(INIT_DIM, Coordinate::from_times(INIT_DIM, &init_values))?;
    out.set_coord(
        LEAD_DIM,
        Coordinate::from_ints(LEAD_DIM, (0..n_lead_steps as i64).collect())
            .with_attr("units", freq.as_str()),
    )?;
    out.set_coord(
        TIME_DIM,
        Coordinate::new(
            vec![INIT_DIM.to_string(), LEAD_DIM.to_string()],
            CoordValues::Time(time2d),
        ),
    )?;

    debug!(
        variable = %out.name,
        init_dates = init_values.len(),
        n_lead_steps,
        "stacked by initial date"
    );
    Ok(out)
}

fn label_cmp(a: &Label, b: &Label) -> Ordering {
    a.partial_cmp(b).unwrap_or(Ordering::Equal)
}

/// Lead times are integers even when stored as floats with NaN gaps
fn as_lead(label: Label) -> Label {
    match label {
        Label::Float(v) => Label::Int(v.round() as i64),
        other => other,
    }
}

/// Switch out the `lead_time` axis for a `time` axis, or vice versa.
///
/// Every `init_date` is handled independently: cells whose swapped-in
/// coordinate is missing are dropped, then the two coordinates trade places.
/// The forecasts are joined back along `init_date` on the sorted union of
/// the new axis labels, with NaN where a forecast has no value and the
/// demoted coordinate becoming 2-D over (`init_date`, new axis). With
/// `drop_missing`, labels that are all-NaN along any dimension are removed.
///
/// # Errors
///
/// - [`UnseenError::MissingDimension`] if neither `lead_time` nor `time` is
///   a dimension
/// - [`UnseenError::InvalidArgument`] if a forecast has repeated labels on
///   the new axis
pub fn reindex_forecast(ds: &DataArray, drop_missing: bool) -> Result<DataArray> {
    let (index_dim, reindex_dim) = if ds.has_dim(LEAD_DIM) {
        (LEAD_DIM, TIME_DIM)
    } else if ds.has_dim(TIME_DIM) {
        (TIME_DIM, LEAD_DIM)
    } else {
        return Err(UnseenError::MissingDimension {
            first: TIME_DIM.to_string(),
            second: LEAD_DIM.to_string(),
        });
    };
    let normalize = |label: Label| {
        if reindex_dim == LEAD_DIM {
            as_lead(label)
        } else {
            label
        }
    };

    let init_axis = ds.axis_of(INIT_DIM)?;
    let n_init = ds.len_of(INIT_DIM)?;

    // Per forecast: the data slice, the new axis labels and the demoted values
    let mut forecasts = Vec::with_capacity(n_init);
    for i in 0..n_init {
        let fcst = ds.index_dim(INIT_DIM, i)?;
        let target = fcst.coord(reindex_dim)?;
        if !target.dims.iter().all(|d| d == index_dim) {
            return Err(UnseenError::InvalidArgument(format!(
                "coordinate '{reindex_dim}' must vary only along '{index_dim}' for each {INIT_DIM}"
            )));
        }
        let keep: Vec<usize> = target
            .labels()
            .iter()
            .enumerate()
            .filter(|(_, l)| l.is_some())
            .map(|(p, _)| p)
            .collect();
        let fcst = fcst.isel(index_dim, &keep)?;

        let new_labels: Vec<Label> = fcst
            .coord(reindex_dim)?
            .labels()
            .into_iter()
            .flatten()
            .map(normalize)
            .collect();
        let mut sorted = new_labels.clone();
        sorted.sort_by(label_cmp);
        if sorted.windows(2).any(|w| w[0] == w[1]) {
            return Err(UnseenError::InvalidArgument(format!(
                "forecast {i} has repeated '{reindex_dim}' values"
            )));
        }

        let demoted: Vec<Option<Label>> = fcst
            .coord(index_dim)?
            .labels()
            .into_iter()
            .map(|l| l.map(|l| if index_dim == LEAD_DIM { as_lead(l) } else { l }))
            .collect();
        forecasts.push((fcst, new_labels, demoted));
    }

    let mut union: Vec<Label> = forecasts
        .iter()
        .flat_map(|(_, labels, _)| labels.iter().copied())
        .collect();
    union.sort_by(label_cmp);
    union.dedup();

    let index_axis = ds.axis_of(index_dim)?;
    let mut dims = ds.dims.clone();
    dims[index_axis] = reindex_dim.to_string();
    let mut shape = ds.data.shape().to_vec();
    shape[index_axis] = union.len();

    let mut data = ArrayD::from_elem(IxDyn(&shape), f32::NAN);
    let mut demoted_entries = Vec::new();
    for (i, (fcst, labels, demoted)) in forecasts.iter().enumerate() {
        let slice_axis = fcst.axis_of(index_dim)?;
        let mut target = data.index_axis_mut(Axis(init_axis), i);
        for (p, label) in labels.iter().enumerate() {
            let u = union
                .binary_search_by(|x| label_cmp(x, label))
                .map_err(|_| {
                    UnseenError::InvalidArgument(format!("label {label:?} missing from union"))
                })?;
            target
                .index_axis_mut(Axis(slice_axis), u)
                .assign(&fcst.data.index_axis(Axis(slice_axis), p));
            if let Some(value) = demoted[p] {
                demoted_entries.push((i, u, value));
            }
        }
    }

    let mut out = DataArray::new(&ds.name, data, dims)?;
    out.attrs = ds.attrs.clone();

    for (name, coord) in &ds.coords {
        let on_index = coord.dims.iter().any(|d| d == index_dim);
        if !on_index && name != reindex_dim {
            out.set_coord(name, coord.clone())?;
        } else if name != index_dim && name != reindex_dim {
            debug!(coordinate = %name, "dropping coordinate along {index_dim}");
        }
    }

    let new_axis = if reindex_dim == TIME_DIM {
        let times: Vec<Option<NaiveDateTime>> = union
            .iter()
            .map(|l| match l {
                Label::Time(t) => Some(*t),
                _ => None,
            })
            .collect();
        CoordValues::Time(ndarray::Array1::from_vec(times).into_dyn())
    } else {
        let leads: Vec<i64> = union
            .iter()
            .map(|l| match l {
                Label::Int(v) => *v,
                Label::Float(v) => v.round() as i64,
                Label::Time(_) => 0,
            })
            .collect();
        CoordValues::Int(ndarray::Array1::from_vec(leads).into_dyn())
    };
    let mut new_coord = Coordinate::new(vec![reindex_dim.to_string()], new_axis);
    if let Some(original) = ds.coords.get(reindex_dim) {
        new_coord.attrs = original.attrs.clone();
    }
    out.set_coord(reindex_dim, new_coord)?;

    let aux_shape = (n_init, union.len());
    let aux_values = if index_dim == TIME_DIM {
        let mut aux = Array2::from_elem(aux_shape, None);
        for &(i, u, label) in &demoted_entries {
            if let Label::Time(t) = label {
                aux[[i, u]] = Some(t);
            }
        }
        CoordValues::Time(aux.into_dyn())
    } else {
        let mut aux = Array2::from_elem(aux_shape, f64::NAN);
        for &(i, u, label) in &demoted_entries {
            aux[[i, u]] = match label {
                Label::Int(v) => v as f64,
                Label::Float(v) => v,
                Label::Time(_) => f64::NAN,
            };
        }
        CoordValues::Float(aux.into_dyn())
    };
    let mut aux_coord = Coordinate::new(
        vec![INIT_DIM.to_string(), reindex_dim.to_string()],
        aux_values,
    );
    if let Some(original) = ds.coords.get(index_dim) {
        aux_coord.attrs = original.attrs.clone();
    }
    out.set_coord(index_dim, aux_coord)?;

    debug!(
        variable = %out.name,
        from = index_dim,
        to = reindex_dim,
        labels = union.len(),
        "reindexed forecast"
    );

    if drop_missing {
        out.dropna_all()
    } else {
        Ok(out)
    }
}
