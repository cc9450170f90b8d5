//! Calendar handling: flooring frequencies, leap day removal and CF time units

use crate::array::{Attributes, DataArray};
use crate::errors::{Result, UnseenError};
use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Timelike};
use ndarray::ArrayD;
use serde_json::Value as JsonValue;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Granularity that timestamps are floored to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Freq {
    #[default]
    Day,
    Hour,
    Minute,
    Second,
}

impl Freq {
    /// Length of one step in seconds
    #[must_use]
    pub const fn seconds(self) -> u32 {
        match self {
            Self::Day => 86_400,
            Self::Hour => 3_600,
            Self::Minute => 60,
            Self::Second => 1,
        }
    }

    /// Alias written to the `units` attribute of a lead time coordinate
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Day => "D",
            Self::Hour => "h",
            Self::Minute => "min",
            Self::Second => "s",
        }
    }

    /// Truncate a timestamp to the start of its step
    #[must_use]
    pub fn floor(self, time: NaiveDateTime) -> NaiveDateTime {
        let secs = time.num_seconds_from_midnight();
        let floored = secs - secs % self.seconds();
        let time_of_day =
            NaiveTime::from_num_seconds_from_midnight_opt(floored, 0).unwrap_or(NaiveTime::MIN);
        time.date().and_time(time_of_day)
    }
}

impl FromStr for Freq {
    type Err = UnseenError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "D" | "d" => Ok(Self::Day),
            "H" | "h" => Ok(Self::Hour),
            "T" | "min" => Ok(Self::Minute),
            "S" | "s" => Ok(Self::Second),
            _ => Err(UnseenError::InvalidFrequency {
                freq: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for Freq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// True for timestamps falling on February 29
#[must_use]
pub fn is_leap_day(time: NaiveDateTime) -> bool {
    time.month() == 2 && time.day() == 29
}

/// Remove every element whose timestamp falls on February 29.
///
/// Order along `time` is preserved and nothing else is changed.
///
/// # Errors
///
/// Returns an error if the array has no 1-D `time` coordinate along a
/// `time` dimension.
pub fn strip_leap_days(da: &DataArray) -> Result<DataArray> {
    let coord = da.coord("time")?;
    if !coord.is_index_of("time") {
        return Err(UnseenError::DimensionNotFound {
            var: da.name.clone(),
            dim: "time".to_string(),
        });
    }
    let times = da.time_values("time")?;
    let keep: Vec<usize> = times
        .iter()
        .enumerate()
        .filter(|(_, t)| !is_leap_day(**t))
        .map(|(i, _)| i)
        .collect();

    if keep.len() < times.len() {
        debug!(
            variable = %da.name,
            removed = times.len() - keep.len(),
            "dropped leap day timestamps"
        );
    }
    da.isel("time", &keep)
}

const MILLIS_PER_DAY: i64 = 86_400_000;

/// Days before the first of each month in a 365 day year
const DAYS_BEFORE_MONTH: [u32; 12] = [0, 31, 59, 90, 120, 151, 181, 212, 243, 273, 304, 334];

/// CF calendars that time coordinates can be decoded in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Calendar {
    /// `standard`, `gregorian` and `proleptic_gregorian`
    #[default]
    Gregorian,
    /// `noleap` and `365_day`: no year has a February 29
    NoLeap,
    /// `julian`, counted like Gregorian from references after the 1582 switch
    Julian,
}

impl Calendar {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Gregorian => "proleptic_gregorian",
            Self::NoLeap => "noleap",
            Self::Julian => "julian",
        }
    }
}

impl FromStr for Calendar {
    type Err = UnseenError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "standard" | "gregorian" | "proleptic_gregorian" => Ok(Self::Gregorian),
            "noleap" | "365_day" => Ok(Self::NoLeap),
            "julian" => Ok(Self::Julian),
            _ => Err(UnseenError::InvalidArgument(format!(
                "unsupported calendar '{s}'"
            ))),
        }
    }
}

impl fmt::Display for Calendar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Day count of `date` in a calendar of 365 day years.
///
/// February 29 shares its number with March 1.
fn noleap_day_number(date: NaiveDate) -> i64 {
    let day_of_year = DAYS_BEFORE_MONTH[date.month0() as usize] + date.day0();
    i64::from(date.year()) * 365 + i64::from(day_of_year)
}

fn noleap_date(day_number: i64) -> Option<NaiveDate> {
    let year = i32::try_from(day_number.div_euclid(365)).ok()?;
    let day_of_year = u32::try_from(day_number.rem_euclid(365)).ok()?;
    let month0 = DAYS_BEFORE_MONTH.iter().rposition(|&d| d <= day_of_year)?;
    let day = day_of_year - DAYS_BEFORE_MONTH[month0] + 1;
    NaiveDate::from_ymd_opt(year, month0 as u32 + 1, day)
}

fn millis_of_day(time: NaiveDateTime) -> i64 {
    i64::from(time.num_seconds_from_midnight()) * 1000 + i64::from(time.nanosecond() / 1_000_000)
}

/// CF-convention time encoding, e.g. `days since 1850-01-01 00:00:00`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeUnits {
    unit_seconds: f64,
    unit_name: &'static str,
    reference: NaiveDateTime,
    calendar: Calendar,
}

impl TimeUnits {
    /// Encoding used for times written by this crate
    #[must_use]
    pub fn days_since_epoch() -> Self {
        Self {
            unit_seconds: 86_400.0,
            unit_name: "days",
            reference: NaiveDate::from_ymd_opt(1970, 1, 1)
                .unwrap_or_default()
                .and_time(NaiveTime::MIN),
            calendar: Calendar::Gregorian,
        }
    }

    /// Parse a `"<unit> since <reference>"` string
    ///
    /// # Errors
    ///
    /// Returns [`UnseenError::InvalidTimeUnits`] for units other than
    /// days, hours, minutes or seconds, or an unreadable reference date.
    pub fn parse(units: &str) -> Result<Self> {
        let invalid = || UnseenError::InvalidTimeUnits {
            units: units.to_string(),
        };
        let (unit, reference) = units.split_once(" since ").ok_or_else(invalid)?;
        let (unit_seconds, unit_name) = match unit.trim().to_lowercase().as_str() {
            "days" | "day" | "d" => (86_400.0, "days"),
            "hours" | "hour" | "hr" | "h" => (3_600.0, "hours"),
            "minutes" | "minute" | "min" => (60.0, "minutes"),
            "seconds" | "second" | "sec" | "s" => (1.0, "seconds"),
            _ => return Err(invalid()),
        };
        let reference = parse_reference(reference).ok_or_else(invalid)?;
        Ok(Self {
            unit_seconds,
            unit_name,
            reference,
            calendar: Calendar::Gregorian,
        })
    }

    /// Count in `calendar` instead of the proleptic Gregorian calendar
    ///
    /// # Errors
    ///
    /// Returns [`UnseenError::InvalidTimeUnits`] for a reference date that
    /// does not exist in `calendar`, or a Julian reference before the
    /// Gregorian switch on 1582-10-15.
    pub fn with_calendar(self, calendar: Calendar) -> Result<Self> {
        let valid = match calendar {
            Calendar::Gregorian => true,
            Calendar::NoLeap => !is_leap_day(self.reference),
            Calendar::Julian => {
                self.reference.date() >= NaiveDate::from_ymd_opt(1582, 10, 15).unwrap_or_default()
            }
        };
        if !valid {
            return Err(UnseenError::InvalidTimeUnits {
                units: format!("{self} in the {calendar} calendar"),
            });
        }
        Ok(Self { calendar, ..self })
    }

    #[must_use]
    pub const fn calendar(&self) -> Calendar {
        self.calendar
    }

    /// Convert an encoded value to a timestamp, `None` for NaN
    #[must_use]
    pub fn decode(&self, value: f64) -> Option<NaiveDateTime> {
        if !value.is_finite() {
            return None;
        }
        let millis = (value * self.unit_seconds * 1000.0).round() as i64;
        match self.calendar {
            Calendar::Gregorian | Calendar::Julian => self
                .reference
                .checked_add_signed(TimeDelta::milliseconds(millis)),
            Calendar::NoLeap => {
                let total = millis.checked_add(millis_of_day(self.reference))?;
                let day = noleap_day_number(self.reference.date())
                    .checked_add(total.div_euclid(MILLIS_PER_DAY))?;
                noleap_date(day)?
                    .and_time(NaiveTime::MIN)
                    .checked_add_signed(TimeDelta::milliseconds(total.rem_euclid(MILLIS_PER_DAY)))
            }
        }
    }

    /// Convert a timestamp to its encoded value, NaN for missing
    #[must_use]
    pub fn encode(&self, time: Option<NaiveDateTime>) -> f64 {
        time.map_or(f64::NAN, |t| {
            let millis = match self.calendar {
                Calendar::Gregorian | Calendar::Julian => (t - self.reference).num_milliseconds(),
                Calendar::NoLeap => {
                    let days = noleap_day_number(t.date())
                        - noleap_day_number(self.reference.date());
                    days * MILLIS_PER_DAY + millis_of_day(t) - millis_of_day(self.reference)
                }
            };
            millis as f64 / 1000.0 / self.unit_seconds
        })
    }
}

impl fmt::Display for TimeUnits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} since {}",
            self.unit_name,
            self.reference.format("%Y-%m-%d %H:%M:%S")
        )
    }
}

fn parse_reference(reference: &str) -> Option<NaiveDateTime> {
    let cleaned = reference
        .trim()
        .trim_end_matches("UTC")
        .trim_end_matches('Z')
        .trim();

    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"] {
        if let Ok(t) = NaiveDateTime::parse_from_str(cleaned, format) {
            return Some(t);
        }
    }
    NaiveDate::parse_from_str(cleaned, "%Y-%m-%d")
        .ok()
        .map(|d| d.and_time(NaiveTime::MIN))
}

/// Decode a CF time coordinate.
///
/// Returns `None` when `attrs` has no `"<unit> since <reference>"` units,
/// leaving the values numeric. On success the `units` and `calendar`
/// attributes are removed, since they describe the on-disk encoding.
///
/// # Errors
///
/// Returns an error for unreadable units or a calendar other than the
/// Gregorian, no-leap and Julian ones.
pub fn decode_cf_times(
    values: &ArrayD<f64>,
    attrs: &mut Attributes,
) -> Result<Option<ArrayD<Option<NaiveDateTime>>>> {
    let Some(units) = attrs
        .get("units")
        .and_then(JsonValue::as_str)
        .filter(|u| u.contains(" since "))
    else {
        return Ok(None);
    };
    let calendar = match attrs.get("calendar").and_then(JsonValue::as_str) {
        Some(name) => name.parse::<Calendar>()?,
        None => Calendar::Gregorian,
    };
    let units = TimeUnits::parse(units)?.with_calendar(calendar)?;
    if calendar != Calendar::Gregorian {
        debug!(units = %units, calendar = %calendar, "decoding non-Gregorian times");
    }
    attrs.remove("units");
    attrs.remove("calendar");
    Ok(Some(values.mapv(|v| units.decode(v))))
}
