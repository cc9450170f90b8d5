use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use ndarray::{Array1, Array2};
use unseen::calendar::Freq;
use unseen::stacking::{reindex_forecast, stack_by_init_date, INIT_DIM, LEAD_DIM, TIME_DIM};
use unseen::{CoordValues, Coordinate, DataArray, UnseenError};

fn date(y: i32, m: u32, d: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

/// Daily series whose value is the index of each day
fn daily_series(start: NaiveDateTime, n: usize) -> DataArray {
    let times: Vec<NaiveDateTime> = (0..n)
        .map(|i| start + TimeDelta::days(i as i64))
        .collect();
    let data = Array1::from_iter((0..n).map(|i| i as f32)).into_dyn();
    DataArray::new("tas", data, vec![TIME_DIM.to_string()])
        .unwrap()
        .with_coord(TIME_DIM, Coordinate::from_times(TIME_DIM, &times))
        .unwrap()
}

fn time_grid(da: &DataArray) -> Vec<Vec<Option<NaiveDateTime>>> {
    let times = da.coord(TIME_DIM).unwrap().times().unwrap().clone();
    let times = times.into_dimensionality::<ndarray::Ix2>().unwrap();
    times.outer_iter().map(|row| row.to_vec()).collect()
}

#[test]
fn test_stack_single_init_date() {
    let series = daily_series(date(2000, 1, 1), 10);
    let stacked = stack_by_init_date(&series, &[date(2000, 1, 3)], 3, Freq::Day).unwrap();

    assert_eq!(stacked.dims, vec![INIT_DIM, LEAD_DIM]);
    assert_eq!(stacked.data.shape(), &[1, 3]);

    // Row 0 holds the values of 2000-01-03, 01-04 and 01-05
    let row: Vec<f32> = stacked.data.iter().copied().collect();
    assert_eq!(row, vec![2.0, 3.0, 4.0]);

    let lead = stacked.coord(LEAD_DIM).unwrap();
    assert_eq!(lead.values, CoordValues::Int(Array1::from_vec(vec![0, 1, 2]).into_dyn()));
    assert_eq!(lead.attrs.get("units").and_then(|u| u.as_str()), Some("D"));

    assert_eq!(stacked.time_values(INIT_DIM).unwrap(), vec![date(2000, 1, 3)]);
    assert_eq!(
        time_grid(&stacked),
        vec![vec![
            Some(date(2000, 1, 3)),
            Some(date(2000, 1, 4)),
            Some(date(2000, 1, 5))
        ]]
    );
}

#[test]
fn test_stack_preserves_init_date_order() {
    let series = daily_series(date(2000, 1, 1), 10);
    let init_dates = [date(2000, 1, 6), date(2000, 1, 2)];
    let stacked = stack_by_init_date(&series, &init_dates, 2, Freq::Day).unwrap();

    assert_eq!(stacked.time_values(INIT_DIM).unwrap(), init_dates.to_vec());
    assert_eq!(
        stacked.data.clone().into_dimensionality::<ndarray::Ix2>().unwrap(),
        Array2::from_shape_vec((2, 2), vec![5.0, 6.0, 1.0, 2.0]).unwrap()
    );
}

#[test]
fn test_stack_skips_leap_days() {
    let series = daily_series(date(2000, 2, 27), 6);
    let stacked = stack_by_init_date(&series, &[date(2000, 2, 28)], 2, Freq::Day).unwrap();

    // 2000-02-29 (value 2) is removed, so the second lead is 2000-03-01
    let row: Vec<f32> = stacked.data.iter().copied().collect();
    assert_eq!(row, vec![1.0, 3.0]);
    assert_eq!(
        time_grid(&stacked),
        vec![vec![Some(date(2000, 2, 28)), Some(date(2000, 3, 1))]]
    );
}

#[test]
fn test_stack_floors_timestamps() {
    let series = daily_series(date(2000, 1, 1) + TimeDelta::hours(12), 5);
    let stacked = stack_by_init_date(&series, &[date(2000, 1, 2)], 2, Freq::Day).unwrap();

    let row: Vec<f32> = stacked.data.iter().copied().collect();
    assert_eq!(row, vec![1.0, 2.0]);
    // Coordinates keep the input timestamps, not the floored ones
    assert_eq!(
        stacked.time_values(INIT_DIM).unwrap(),
        vec![date(2000, 1, 2) + TimeDelta::hours(12)]
    );
}

#[test]
fn test_stack_duplicate_floored_timestamps_use_first_match() {
    // 00:00 and 12:00 on 2000-01-01 both floor to the same day
    let times = vec![
        date(2000, 1, 1),
        date(2000, 1, 1) + TimeDelta::hours(12),
        date(2000, 1, 2),
        date(2000, 1, 3),
    ];
    let data = Array1::from_iter((0..times.len()).map(|i| i as f32)).into_dyn();
    let series = DataArray::new("tas", data, vec![TIME_DIM.to_string()])
        .unwrap()
        .with_coord(TIME_DIM, Coordinate::from_times(TIME_DIM, &times))
        .unwrap();

    let stacked = stack_by_init_date(&series, &[date(2000, 1, 1)], 2, Freq::Day).unwrap();
    let row: Vec<f32> = stacked.data.iter().copied().collect();
    assert_eq!(row, vec![0.0, 1.0]);
    assert_eq!(stacked.time_values(INIT_DIM).unwrap(), vec![date(2000, 1, 1)]);
    assert_eq!(
        time_grid(&stacked),
        vec![vec![Some(times[0]), Some(times[1])]]
    );
}

#[test]
fn test_stack_missing_init_date_fails() {
    let series = daily_series(date(2000, 1, 1), 10);
    let result = stack_by_init_date(&series, &[date(2000, 2, 1)], 3, Freq::Day);
    assert!(matches!(result, Err(UnseenError::InitDateNotFound { .. })));
}

#[test]
fn test_stack_window_past_end_fails() {
    let series = daily_series(date(2000, 1, 1), 10);
    let result = stack_by_init_date(&series, &[date(2000, 1, 9)], 3, Freq::Day);
    assert!(matches!(
        result,
        Err(UnseenError::WindowOutOfRange {
            n_lead_steps: 3,
            available: 2,
            ..
        })
    ));
}

#[test]
fn test_stack_zero_lead_steps_fails() {
    let series = daily_series(date(2000, 1, 1), 10);
    let result = stack_by_init_date(&series, &[date(2000, 1, 1)], 0, Freq::Day);
    assert!(matches!(result, Err(UnseenError::InvalidArgument(_))));
}

#[test]
fn test_stack_then_reindex_recovers_series() {
    let n = 10;
    let k = 3;
    let series = daily_series(date(2001, 1, 1), n);
    let times = series.time_values(TIME_DIM).unwrap();
    let init_dates: Vec<NaiveDateTime> = times[..=n - k].to_vec();

    let stacked = stack_by_init_date(&series, &init_dates, k, Freq::Day).unwrap();
    let reindexed = reindex_forecast(&stacked, true).unwrap();

    assert_eq!(reindexed.dims, vec![INIT_DIM, TIME_DIM]);
    assert_eq!(reindexed.time_values(TIME_DIM).unwrap(), times);
    assert_eq!(reindexed.time_values(INIT_DIM).unwrap(), init_dates);

    // Every non-missing cell in a time column is the series value at that time
    for (t, column) in reindexed.data.axis_iter(ndarray::Axis(1)).enumerate() {
        let values: Vec<f32> = column.iter().copied().filter(|v| !v.is_nan()).collect();
        assert!(!values.is_empty());
        assert!(values.iter().all(|&v| v == series.data[ndarray::IxDyn(&[t])]));
    }

    // lead_time is demoted to a 2-D coordinate over (init_date, time)
    let lead = reindexed.coord(LEAD_DIM).unwrap();
    assert_eq!(lead.dims, vec![INIT_DIM, TIME_DIM]);
    let lead = lead.as_f64().unwrap().into_dimensionality::<ndarray::Ix2>().unwrap();
    assert_eq!(lead[[0, 0]], 0.0);
    assert_eq!(lead[[0, 2]], 2.0);
    assert!(lead[[0, 3]].is_nan());
    assert_eq!(lead[[1, 1]], 0.0);
}

#[test]
fn test_reindex_twice_restores_lead_layout() {
    let series = daily_series(date(2001, 3, 1), 8);
    let init_dates = [date(2001, 3, 1), date(2001, 3, 4)];
    let stacked = stack_by_init_date(&series, &init_dates, 3, Freq::Day).unwrap();

    let by_time = reindex_forecast(&stacked, false).unwrap();
    assert_eq!(by_time.data.shape(), &[2, 6]);

    let by_lead = reindex_forecast(&by_time, false).unwrap();
    assert_eq!(by_lead.dims, vec![INIT_DIM, LEAD_DIM]);
    assert_eq!(by_lead.data, stacked.data);
    assert_eq!(time_grid(&by_lead), time_grid(&stacked));

    let lead = by_lead.coord(LEAD_DIM).unwrap();
    assert_eq!(lead.values, CoordValues::Int(Array1::from_vec(vec![0, 1, 2]).into_dyn()));
    assert_eq!(lead.attrs.get("units").and_then(|u| u.as_str()), Some("D"));
}

#[test]
fn test_reindex_without_structural_dimension_fails() {
    let da = DataArray::new(
        "tas",
        Array1::from_vec(vec![1.0_f32, 2.0]).into_dyn(),
        vec!["x".to_string()],
    )
    .unwrap();
    let result = reindex_forecast(&da, true);
    assert!(matches!(result, Err(UnseenError::MissingDimension { .. })));
}
