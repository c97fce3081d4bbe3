//! Conversion between spreadsheet serial numbers and calendar values

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// Convert a serial day number to a date and time
///
/// The 1900 system counts the fictitious 1900-02-29 as day 60, so serials
/// below 60 are shifted by one day. Returns `None` for negative or absurdly
/// large serials.
pub fn serial_to_datetime(serial: f64, date_1904: bool) -> Option<NaiveDateTime> {
    if !serial.is_finite() || serial < 0.0 {
        return None;
    }

    let epoch = if date_1904 {
        NaiveDate::from_ymd_opt(1904, 1, 1)?
    } else if serial < 60.0 {
        NaiveDate::from_ymd_opt(1899, 12, 31)?
    } else {
        NaiveDate::from_ymd_opt(1899, 12, 30)?
    };

    let millis = (serial * MILLIS_PER_DAY).round();
    if millis > i64::MAX as f64 {
        return None;
    }

    epoch
        .and_hms_opt(0, 0, 0)?
        .checked_add_signed(Duration::milliseconds(millis as i64))
        .map(round_to_second)
}

/// Convert the fractional part of a serial number to a time of day
pub fn serial_to_time(serial: f64) -> Option<NaiveTime> {
    if !serial.is_finite() || serial < 0.0 {
        return None;
    }

    let millis = (serial.fract() * MILLIS_PER_DAY).round() as i64;
    let secs = ((millis + 500) / 1000).min(86_399) as u32;
    NaiveTime::from_num_seconds_from_midnight_opt(secs, 0)
}

/// Convert a date and time to a serial day number (1900 system)
pub fn datetime_to_serial(dt: NaiveDateTime) -> f64 {
    let leap_bug_start = NaiveDate::from_ymd_opt(1900, 3, 1).unwrap_or_default();
    let epoch = if dt.date() < leap_bug_start {
        NaiveDate::from_ymd_opt(1899, 12, 31)
    } else {
        NaiveDate::from_ymd_opt(1899, 12, 30)
    };

    let epoch = epoch
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default();
    (dt - epoch).num_milliseconds() as f64 / MILLIS_PER_DAY
}

/// Convert a time of day to a day fraction
pub fn time_to_serial(t: NaiveTime) -> f64 {
    t.num_seconds_from_midnight() as f64 / 86_400.0
}

fn round_to_second(dt: NaiveDateTime) -> NaiveDateTime {
    let nanos = dt.nanosecond();
    let truncated = dt.with_nanosecond(0).unwrap_or(dt);
    if nanos >= 500_000_000 {
        truncated + Duration::seconds(1)
    } else {
        truncated
    }
}
