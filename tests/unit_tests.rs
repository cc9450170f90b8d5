//! Unit tests for the array, region, calendar, arithmetic and climatology modules

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use ndarray::{Array1, Array2, ArrayD, IxDyn};
use unseen::align::{binary_op, subtract, ComputeOptions};
use unseen::calendar::{
    decode_cf_times, is_leap_day, strip_leap_days, Calendar, Freq, TimeUnits,
};
use unseen::parallel::ParallelConfig;
use unseen::region::{normalize_lon, select_region, BoundingBox};
use unseen::statistics::{get_clim, parallel_mean_axes, select_time_period, TimePeriod};
use unseen::{Attributes, CoordValues, Coordinate, DataArray, UnseenError};

fn date(y: i32, m: u32, d: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

fn grid(lats: Vec<f64>, lons: Vec<f64>) -> DataArray {
    let (ny, nx) = (lats.len(), lons.len());
    let data = Array2::from_shape_fn((ny, nx), |(j, i)| (j * nx + i) as f32).into_dyn();
    DataArray::new("pr", data, vec!["lat".to_string(), "lon".to_string()])
        .unwrap()
        .with_coord("lat", Coordinate::from_floats("lat", lats))
        .unwrap()
        .with_coord("lon", Coordinate::from_floats("lon", lons))
        .unwrap()
}

fn coord_floats(da: &DataArray, name: &str) -> Vec<f64> {
    da.coord(name).unwrap().as_f64().unwrap().iter().copied().collect()
}

#[test]
fn test_error_messages() {
    let err = UnseenError::UnrecognisedMethod {
        method: "xyz".to_string(),
    };
    assert_eq!(format!("{err}"), "Unrecognised bias removal method xyz");

    let err = UnseenError::MissingDimension {
        first: "time".to_string(),
        second: "lead_time".to_string(),
    };
    assert_eq!(
        format!("{err}"),
        "Neither a time nor lead_time dimension can be found"
    );

    let err = UnseenError::DimensionNotFound {
        var: "pr".to_string(),
        dim: "time".to_string(),
    };
    assert!(format!("{err}").contains("Dimension 'time' not found in variable 'pr'"));
}

#[test]
fn test_parallel_config() {
    let default_config = ParallelConfig::default();
    assert!(default_config.num_threads.is_none());

    let config_4 = ParallelConfig::with_threads(4);
    assert_eq!(config_4.num_threads, Some(4));

    let all_cores_config = ParallelConfig::all_cores();
    assert!(all_cores_config.num_threads.unwrap() > 0);
    assert!(default_config.current_threads() > 0);

    let zero = ParallelConfig::with_threads(0).setup_global_pool();
    assert!(matches!(zero, Err(UnseenError::ThreadPoolError(_))));
}

#[test]
fn test_data_array_rejects_bad_shapes() {
    let data = ArrayD::<f32>::zeros(IxDyn(&[2, 3]));
    assert!(DataArray::new("x", data.clone(), vec!["a".to_string()]).is_err());
    assert!(DataArray::new("x", data.clone(), vec!["a".to_string(), "a".to_string()]).is_err());

    let mut da = DataArray::new("x", data, vec!["a".to_string(), "b".to_string()]).unwrap();
    assert!(da.set_coord("a", Coordinate::from_ints("a", vec![1, 2, 3])).is_err());
    assert!(da.set_coord("c", Coordinate::from_ints("c", vec![1])).is_err());
    assert!(da.set_coord("a", Coordinate::from_ints("a", vec![1, 2])).is_ok());
}

#[test]
fn test_dropna_all_removes_empty_labels() {
    let data = Array2::from_shape_vec(
        (3, 3),
        vec![1.0, f32::NAN, 2.0, f32::NAN, f32::NAN, f32::NAN, 3.0, f32::NAN, 4.0],
    )
    .unwrap()
    .into_dyn();
    let da = DataArray::new("x", data, vec!["a".to_string(), "b".to_string()])
        .unwrap()
        .with_coord("a", Coordinate::from_ints("a", vec![10, 20, 30]))
        .unwrap();

    let dropped = da.dropna_all().unwrap();
    assert_eq!(dropped.data.shape(), &[2, 2]);
    assert_eq!(
        dropped.coord("a").unwrap().values,
        CoordValues::Int(Array1::from_vec(vec![10, 30]).into_dyn())
    );
}

#[test]
fn test_bounding_box_validation() {
    assert!(BoundingBox::new(-44.0, -11.0, 113.0, 154.0).is_ok());
    assert!(matches!(
        BoundingBox::new(-95.0, 10.0, 0.0, 10.0),
        Err(UnseenError::InvalidBoundingBox { .. })
    ));
    assert!(matches!(
        BoundingBox::new(10.0, -10.0, 0.0, 10.0),
        Err(UnseenError::InvalidBoundingBox { .. })
    ));
    assert!(matches!(
        BoundingBox::new(-10.0, 10.0, 0.0, 360.0),
        Err(UnseenError::InvalidBoundingBox { .. })
    ));
    assert_eq!(
        BoundingBox::new(-44.0, -11.0, 113.0, 154.0).unwrap(),
        BoundingBox::AUSTRALIA
    );
}

#[test]
fn test_normalize_lon() {
    assert_eq!(normalize_lon(-5.0), 355.0);
    assert_eq!(normalize_lon(0.0), 0.0);
    assert_eq!(normalize_lon(360.0), 0.0);
    assert_eq!(normalize_lon(190.0), 190.0);
}

#[test]
fn test_select_region_is_strict() {
    let da = grid(
        vec![-50.0, -44.0, -40.0, -20.0, -11.0, 0.0],
        vec![100.0, 113.0, 120.0, 150.0, 154.0, 160.0],
    );
    let region = select_region(&da, &BoundingBox::AUSTRALIA).unwrap();

    // Points on the bounds are excluded
    assert_eq!(coord_floats(&region, "lat"), vec![-40.0, -20.0]);
    assert_eq!(coord_floats(&region, "lon"), vec![120.0, 150.0]);
    assert_eq!(region.data.shape(), &[2, 2]);
    assert!(region.data.iter().all(|v| !v.is_nan()));
    // lat index 2, lon index 2 of the 6x6 grid
    assert_eq!(region.data[IxDyn(&[0, 0])], 14.0);
}

#[test]
fn test_select_region_across_seam() {
    let da = grid(vec![-5.0, 5.0], vec![-5.0, 0.0, 5.0, 20.0, 180.0, 359.0]);
    let bbox = BoundingBox::new(-10.0, 10.0, 350.0, 10.0).unwrap();
    assert!(bbox.crosses_seam());

    let region = select_region(&da, &bbox).unwrap();
    assert_eq!(coord_floats(&region, "lon"), vec![355.0, 0.0, 5.0, 359.0]);
    assert_eq!(region.data.shape(), &[2, 4]);
}

#[test]
fn test_select_region_full_sphere_is_identity() {
    let da = grid(vec![-60.0, 0.0, 60.0], vec![10.0, 100.0, 200.0, 300.0]);
    let bbox = BoundingBox::new(-90.0, 90.0, 0.0, 359.99).unwrap();
    let region = select_region(&da, &bbox).unwrap();
    assert_eq!(region.data, da.data);
    assert_eq!(coord_floats(&region, "lat"), coord_floats(&da, "lat"));
}

#[test]
fn test_select_region_curvilinear_masks_outside_points() {
    // 2-D lat/lon over (y, x)
    let lat = Array2::from_shape_vec((2, 2), vec![-30.0, -30.0, -20.0, 10.0]).unwrap();
    let lon = Array2::from_shape_vec((2, 2), vec![120.0, 130.0, 120.0, 130.0]).unwrap();
    let data = Array2::from_shape_vec((2, 2), vec![1.0_f32, 2.0, 3.0, 4.0]).unwrap();
    let dims = vec!["y".to_string(), "x".to_string()];
    let da = DataArray::new("pr", data.into_dyn(), dims.clone())
        .unwrap()
        .with_coord("lat", Coordinate::new(dims.clone(), CoordValues::Float(lat.into_dyn())))
        .unwrap()
        .with_coord("lon", Coordinate::new(dims, CoordValues::Float(lon.into_dyn())))
        .unwrap();

    let region = select_region(&da, &BoundingBox::AUSTRALIA).unwrap();
    assert_eq!(region.data.shape(), &[2, 2]);
    assert!(region.data[IxDyn(&[1, 1])].is_nan());
    assert_eq!(region.data[IxDyn(&[0, 0])], 1.0);
}

#[test]
fn test_select_region_requires_coordinates() {
    let da = DataArray::new("pr", ArrayD::zeros(IxDyn(&[2])), vec!["lat".to_string()]).unwrap();
    assert!(matches!(
        select_region(&da, &BoundingBox::AUSTRALIA),
        Err(UnseenError::CoordinateNotFound { .. })
    ));
}

#[test]
fn test_freq_parse_and_floor() {
    assert_eq!("D".parse::<Freq>().unwrap(), Freq::Day);
    assert_eq!("H".parse::<Freq>().unwrap(), Freq::Hour);
    assert_eq!("min".parse::<Freq>().unwrap(), Freq::Minute);
    assert!(matches!(
        "fortnight".parse::<Freq>(),
        Err(UnseenError::InvalidFrequency { .. })
    ));

    let t = date(2000, 1, 1) + TimeDelta::minutes(13 * 60 + 47);
    assert_eq!(Freq::Day.floor(t), date(2000, 1, 1));
    assert_eq!(Freq::Hour.floor(t), date(2000, 1, 1) + TimeDelta::hours(13));
}

#[test]
fn test_strip_leap_days() {
    let times: Vec<NaiveDateTime> = (0..6)
        .map(|i| date(2004, 2, 26) + TimeDelta::days(i))
        .collect();
    let data = Array1::from_iter((0..6).map(|i| i as f32)).into_dyn();
    let da = DataArray::new("tas", data, vec!["time".to_string()])
        .unwrap()
        .with_coord("time", Coordinate::from_times("time", &times))
        .unwrap();

    let stripped = strip_leap_days(&da).unwrap();
    let kept = stripped.time_values("time").unwrap();
    assert!(kept.iter().all(|&t| !is_leap_day(t)));
    assert_eq!(kept.len(), 5);
    assert!(kept.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(
        stripped.data.iter().copied().collect::<Vec<_>>(),
        vec![0.0, 1.0, 2.0, 4.0, 5.0]
    );
}

#[test]
fn test_time_units_decode_encode() {
    let units = TimeUnits::parse("hours since 2000-01-01 00:00:00").unwrap();
    assert_eq!(units.decode(36.0), Some(date(2000, 1, 2) + TimeDelta::hours(12)));
    assert_eq!(units.decode(f64::NAN), None);
    assert_eq!(units.encode(Some(date(2000, 1, 3))), 48.0);
    assert!(units.encode(None).is_nan());

    assert!(matches!(
        TimeUnits::parse("fortnights since 2000-01-01"),
        Err(UnseenError::InvalidTimeUnits { .. })
    ));

    let mut attrs = Attributes::new();
    attrs.insert("units".to_string(), "days since 1970-01-01".into());
    attrs.insert("calendar".to_string(), "360_day".into());
    let values = Array1::from_vec(vec![0.0]).into_dyn();
    assert!(decode_cf_times(&values, &mut attrs).is_err());
}

fn cf_attrs(units: &str, calendar: &str) -> Attributes {
    let mut attrs = Attributes::new();
    attrs.insert("units".to_string(), units.into());
    attrs.insert("calendar".to_string(), calendar.into());
    attrs
}

#[test]
fn test_noleap_times_skip_february_29() {
    let values = Array1::from_vec(vec![0.5, 58.0, 59.0, 365.0, f64::NAN]).into_dyn();
    for calendar in ["noleap", "365_day"] {
        let mut attrs = cf_attrs("days since 2000-01-01", calendar);
        let times = decode_cf_times(&values, &mut attrs).unwrap().unwrap();
        assert_eq!(
            times.iter().copied().collect::<Vec<_>>(),
            vec![
                Some(date(2000, 1, 1) + TimeDelta::hours(12)),
                Some(date(2000, 2, 28)),
                Some(date(2000, 3, 1)),
                Some(date(2001, 1, 1)),
                None,
            ]
        );
        assert!(attrs.get("calendar").is_none());
    }

    // Time of day carries across the missing leap day
    let units = TimeUnits::parse("hours since 2004-02-28 12:00:00")
        .unwrap()
        .with_calendar(Calendar::NoLeap)
        .unwrap();
    assert_eq!(units.calendar(), Calendar::NoLeap);
    assert_eq!(units.decode(12.0), Some(date(2004, 3, 1)));
    assert_eq!(units.decode(-12.0), Some(date(2004, 2, 28)));
    assert_eq!(units.encode(Some(date(2004, 3, 1))), 12.0);

    let leap_reference = TimeUnits::parse("days since 2004-02-29").unwrap();
    assert!(matches!(
        leap_reference.with_calendar(Calendar::NoLeap),
        Err(UnseenError::InvalidTimeUnits { .. })
    ));
}

#[test]
fn test_julian_times_decode_like_gregorian() {
    let values = Array1::from_vec(vec![0.0, 1.0, 31.0]).into_dyn();
    let mut attrs = cf_attrs("days since 1900-02-28", "julian");
    let times = decode_cf_times(&values, &mut attrs).unwrap().unwrap();
    assert_eq!(
        times.iter().copied().collect::<Vec<_>>(),
        vec![Some(date(1900, 2, 28)), Some(date(1900, 3, 1)), Some(date(1900, 3, 31))]
    );

    let mut early = cf_attrs("days since 1500-01-01", "julian");
    assert!(matches!(
        decode_cf_times(&values, &mut early),
        Err(UnseenError::InvalidTimeUnits { .. })
    ));
    assert_eq!("Julian".parse::<Calendar>().unwrap(), Calendar::Julian);
    assert_eq!(Calendar::NoLeap.to_string(), "noleap");
}

#[test]
fn test_binary_op_inner_joins_labels() {
    let lhs = DataArray::new(
        "a",
        Array1::from_vec(vec![1.0_f32, 2.0, 3.0]).into_dyn(),
        vec!["x".to_string()],
    )
    .unwrap()
    .with_coord("x", Coordinate::from_ints("x", vec![1, 2, 3]))
    .unwrap()
    .with_attr("units", "mm");
    let rhs = DataArray::new(
        "b",
        Array1::from_vec(vec![10.0_f32, 20.0, 30.0]).into_dyn(),
        vec!["x".to_string()],
    )
    .unwrap()
    .with_coord("x", Coordinate::from_floats("x", vec![2.0, 3.0, 4.0]))
    .unwrap();

    let out = subtract(&lhs, &rhs, ComputeOptions::default()).unwrap();
    assert_eq!(out.data.iter().copied().collect::<Vec<_>>(), vec![-8.0, -17.0]);
    assert_eq!(
        out.coord("x").unwrap().values,
        CoordValues::Int(Array1::from_vec(vec![2, 3]).into_dyn())
    );
    assert_eq!(out.attrs.get("units").and_then(|u| u.as_str()), Some("mm"));

    let no_attrs = subtract(&lhs, &rhs, ComputeOptions::keep_attrs(false)).unwrap();
    assert!(no_attrs.attrs.is_empty());
}

#[test]
fn test_binary_op_broadcasts_by_name() {
    let lhs = DataArray::new(
        "a",
        Array2::from_shape_vec((2, 3), vec![1.0_f32, 2.0, 3.0, 4.0, 5.0, 6.0])
            .unwrap()
            .into_dyn(),
        vec!["y".to_string(), "x".to_string()],
    )
    .unwrap();
    let rhs = DataArray::new(
        "b",
        Array2::from_shape_vec((3, 2), vec![1.0_f32, 10.0, 1.0, 10.0, 1.0, 10.0])
            .unwrap()
            .into_dyn(),
        vec!["x".to_string(), "z".to_string()],
    )
    .unwrap();

    let out = binary_op(&lhs, &rhs, |a, b| a * b, ComputeOptions::default()).unwrap();
    assert_eq!(out.dims, vec!["y", "x", "z"]);
    assert_eq!(out.data.shape(), &[2, 3, 2]);
    assert_eq!(out.data[IxDyn(&[1, 2, 1])], 60.0);

    let short = DataArray::new("c", ArrayD::zeros(IxDyn(&[2])), vec!["x".to_string()]).unwrap();
    assert!(matches!(
        subtract(&lhs, &short, ComputeOptions::default()),
        Err(UnseenError::ShapeMismatch { .. })
    ));
}

fn monthly_forecast() -> DataArray {
    let init_dates = [date(2000, 1, 1), date(2000, 1, 15), date(2000, 2, 1)];
    let data = Array2::from_shape_vec((3, 2), vec![1.0_f32, 2.0, 3.0, f32::NAN, 10.0, 20.0])
        .unwrap()
        .into_dyn();
    let time2d = Array2::from_shape_fn((3, 2), |(i, k)| {
        Some(init_dates[i] + TimeDelta::days(k as i64))
    });
    DataArray::new("pr", data, vec!["init_date".to_string(), "lead_time".to_string()])
        .unwrap()
        .with_coord("init_date", Coordinate::from_times("init_date", &init_dates))
        .unwrap()
        .with_coord("lead_time", Coordinate::from_ints("lead_time", vec![0, 1]))
        .unwrap()
        .with_coord(
            "time",
            Coordinate::new(
                vec!["init_date".to_string(), "lead_time".to_string()],
                CoordValues::Time(time2d.into_dyn()),
            ),
        )
        .unwrap()
        .with_attr("units", "mm")
}

#[test]
fn test_parallel_mean_skips_nan() {
    let data = Array2::from_shape_vec(
        (2, 3),
        vec![1.0_f32, f32::NAN, 3.0, f32::NAN, f32::NAN, f32::NAN],
    )
    .unwrap()
    .into_dyn();
    let mean = parallel_mean_axes(&data, &[1]).unwrap();
    assert_eq!(mean[IxDyn(&[0])], 2.0);
    assert!(mean[IxDyn(&[1])].is_nan());

    let all = parallel_mean_axes(&data, &[0, 1]).unwrap();
    assert_eq!(all.ndim(), 0);
    assert_eq!(all[IxDyn(&[])], 2.0);

    assert!(parallel_mean_axes(&data, &[2]).is_err());
}

#[test]
fn test_climatology_grouped_by_init_month() {
    let clim = get_clim(&monthly_forecast(), &["init_date"], None, true).unwrap();

    assert_eq!(clim.dims, vec!["month", "lead_time"]);
    assert_eq!(
        clim.coord("month").unwrap().values,
        CoordValues::Int(Array1::from_vec(vec![1, 2]).into_dyn())
    );
    let values = clim.data.into_dimensionality::<ndarray::Ix2>().unwrap();
    assert_eq!(values, Array2::from_shape_vec((2, 2), vec![2.0, 2.0, 10.0, 20.0]).unwrap());
    assert!(clim.coords.get("time").is_none());
    assert_eq!(clim.attrs.get("units").and_then(|u| u.as_str()), Some("mm"));
}

#[test]
fn test_climatology_restricted_to_period() {
    let period = TimePeriod::parse("2000-01-01", "2000-01-15").unwrap();
    let clim = get_clim(
        &monthly_forecast(),
        &["init_date", "lead_time"],
        Some(&period),
        false,
    )
    .unwrap();

    // Only cells dated 2000-01-01, 01-02 and 01-15 fall in the period
    assert_eq!(clim.data.ndim(), 0);
    assert_eq!(clim.data[IxDyn(&[])], 2.0);
    assert_eq!(period.to_string(), "2000-01-01-2000-01-15");
}

#[test]
fn test_climatology_missing_dimension_fails() {
    assert!(matches!(
        get_clim(&monthly_forecast(), &["ensemble", "init_date"], None, true),
        Err(UnseenError::DimensionNotFound { .. })
    ));
    assert!(TimePeriod::parse("2001-01-01", "2000-01-01").is_err());
}

#[test]
fn test_select_time_period_on_time_dimension() {
    let times: Vec<NaiveDateTime> = (0..10)
        .map(|i| date(2000, 1, 1) + TimeDelta::days(i))
        .collect();
    let da = DataArray::new(
        "tas",
        Array1::from_iter((0..10).map(|i| i as f32)).into_dyn(),
        vec!["time".to_string()],
    )
    .unwrap()
    .with_coord("time", Coordinate::from_times("time", &times))
    .unwrap();
    let period = TimePeriod::parse("2000-01-03", "2000-01-05").unwrap();
    let selected = select_time_period(&da, &period).unwrap();
    assert_eq!(selected.time_values("time").unwrap(), times[2..5].to_vec());
}
