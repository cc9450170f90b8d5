//! Forecast bias calculation and removal
//!
//! The bias is the difference (or ratio) between the forecast climatology
//! and the observed climatology, both grouped by the calendar month of the
//! forecast initial date.

use crate::align::{divide, subtract, ComputeOptions};
use crate::array::{Coordinate, DataArray, Label};
use crate::calendar::Freq;
use crate::errors::{Result, UnseenError};
use crate::stacking::{stack_by_init_date, INIT_DIM, LEAD_DIM};
use crate::statistics::{get_clim, TimePeriod, MONTH_DIM};
use chrono::Datelike;
use std::fmt;
use std::str::FromStr;
use tracing::info;

pub const METHOD_ATTR: &str = "bias_correction_method";
pub const PERIOD_ATTR: &str = "bias_correction_period";

const ENSEMBLE_DIM: &str = "ensemble";

/// How a bias is defined and removed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BiasMethod {
    /// `fcst - obs`, removed by subtraction
    Additive,
    /// `fcst / obs`, removed by division
    Multiplicative,
}

impl BiasMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Additive => "additive",
            Self::Multiplicative => "multiplicative",
        }
    }

    fn combine(
        self,
        lhs: &DataArray,
        rhs: &DataArray,
        options: ComputeOptions,
    ) -> Result<DataArray> {
        match self {
            Self::Additive => subtract(lhs, rhs, options),
            Self::Multiplicative => divide(lhs, rhs, options),
        }
    }
}

impl FromStr for BiasMethod {
    type Err = UnseenError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "additive" => Ok(Self::Additive),
            "multiplicative" => Ok(Self::Multiplicative),
            other => Err(UnseenError::UnrecognisedMethod {
                method: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for BiasMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Calculate the forecast bias against observations.
///
/// The forecast is reduced over `ensemble` and `init_date`. Observations are
/// stacked onto the forecast's initial dates and lead times (daily steps)
/// before being reduced over `init_date`. Both climatologies are grouped by
/// initial month and optionally restricted to `time_period`.
///
/// # Errors
///
/// Returns [`UnseenError::UnrecognisedMethod`] for a method other than
/// `additive` or `multiplicative`, and propagates stacking and
/// climatology failures.
pub fn compute_bias(
    fcst: &DataArray,
    obs: &DataArray,
    method: &str,
    time_period: Option<&TimePeriod>,
    options: ComputeOptions,
) -> Result<DataArray> {
    let method: BiasMethod = method.parse()?;

    let fcst_clim = get_clim(fcst, &[ENSEMBLE_DIM, INIT_DIM], time_period, true)?;

    let init_dates = fcst.time_values(INIT_DIM)?;
    let n_lead_steps = fcst.len_of(LEAD_DIM)?;
    let obs_stacked = stack_by_init_date(obs, &init_dates, n_lead_steps, Freq::Day)?;
    let obs_clim = get_clim(&obs_stacked, &[INIT_DIM], time_period, true)?;

    let mut bias = method.combine(&fcst_clim, &obs_clim, options)?;
    bias.attrs.insert(METHOD_ATTR.to_string(), method.as_str().into());
    if let Some(period) = time_period {
        bias.attrs.insert(PERIOD_ATTR.to_string(), period.to_string().into());
    }

    info!(
        variable = %bias.name,
        method = %method,
        period = ?time_period.map(ToString::to_string),
        "computed bias"
    );
    Ok(bias)
}

/// Remove a bias from a forecast.
///
/// Each initial date is corrected with the bias for its calendar month.
///
/// # Errors
///
/// Returns [`UnseenError::UnrecognisedMethod`] for an unknown method,
/// [`UnseenError::MissingBiasMonth`] when a forecast month has no bias, and
/// [`UnseenError::MissingAttribute`] when the bias does not record its
/// correction method.
pub fn apply_bias(
    fcst: &DataArray,
    bias: &DataArray,
    method: &str,
    options: ComputeOptions,
) -> Result<DataArray> {
    let method: BiasMethod = method.parse()?;

    let bias_months: Vec<Option<i64>> = bias
        .coord(MONTH_DIM)?
        .labels()
        .into_iter()
        .map(|label| match label {
            Some(Label::Int(m)) => Some(m),
            Some(Label::Float(m)) => Some(m as i64),
            _ => None,
        })
        .collect();
    let init_dates = fcst.time_values(INIT_DIM)?;
    let indices = init_dates
        .iter()
        .map(|date| {
            let month = date.month();
            bias_months
                .iter()
                .position(|&m| m == Some(i64::from(month)))
                .ok_or(UnseenError::MissingBiasMonth { month })
        })
        .collect::<Result<Vec<usize>>>()?;

    // One bias slice per initial date, laid out along init_date
    let mut matched = bias.isel(MONTH_DIM, &indices)?;
    matched.drop_coord(MONTH_DIM);
    matched.rename_dim(MONTH_DIM, INIT_DIM)?;
    let mut init_coord = Coordinate::from_times(INIT_DIM, &init_dates);
    if let Ok(original) = fcst.coord(INIT_DIM) {
        init_coord.attrs = original.attrs.clone();
    }
    matched.set_coord(INIT_DIM, init_coord)?;

    let mut corrected = method.combine(fcst, &matched, options)?;
    corrected.drop_coord(MONTH_DIM);

    let method_attr = bias
        .attrs
        .get(METHOD_ATTR)
        .cloned()
        .ok_or_else(|| UnseenError::MissingAttribute {
            var: bias.name.clone(),
            attr: METHOD_ATTR.to_string(),
        })?;
    corrected.attrs.insert(METHOD_ATTR.to_string(), method_attr);
    if let Some(period) = bias.attrs.get(PERIOD_ATTR) {
        corrected
            .attrs
            .insert(PERIOD_ATTR.to_string(), period.clone());
    }

    info!(
        variable = %corrected.name,
        method = %method,
        "removed bias"
    );
    Ok(corrected)
}
