//! Pure scheduling rules: working hours, mandatory breaks and the slot grid
//! used when listing availability.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Weekday};

use crate::constants::{break_duration, work_end, work_start, SLOT_STEP_MINUTES, WORK_END_HOUR, WORK_START_HOUR};
use crate::domain::Booking;

const TIME_FORMAT: &str = "%H:%M";

pub fn is_friday(date: NaiveDate) -> bool {
    date.weekday() == Weekday::Fri
}

/// Widen a booking window by the break a cleaner needs before and after it.
pub fn padded_window(start: NaiveDateTime, end: NaiveDateTime) -> (NaiveDateTime, NaiveDateTime) {
    (start - break_duration(), end + break_duration())
}

/// Half-open interval overlap; touching windows do not overlap.
pub fn overlaps(
    a_start: NaiveDateTime,
    a_end: NaiveDateTime,
    b_start: NaiveDateTime,
    b_end: NaiveDateTime,
) -> bool {
    a_start < b_end && a_end > b_start
}

/// The booking window for a start time and duration, or `None` when the end
/// is not representable.
pub fn window(date: NaiveDate, start_time: NaiveTime, duration_hours: u32) -> Option<(NaiveDateTime, NaiveDateTime)> {
    let start = date.and_time(start_time);
    let end = Duration::try_hours(i64::from(duration_hours)).and_then(|length| start.checked_add_signed(length))?;
    Some((start, end))
}

/// First and last second of `date`.
pub fn day_bounds(date: NaiveDate) -> (NaiveDateTime, NaiveDateTime) {
    let last_second = NaiveTime::MIN + (Duration::days(1) - Duration::seconds(1));
    (date.and_time(NaiveTime::MIN), date.and_time(last_second))
}

/// Compared as date-times so a window running past midnight is rejected
/// instead of wrapping around to an early time of day.
pub fn within_working_hours(date: NaiveDate, start_time: NaiveTime, duration_hours: u32) -> bool {
    match window(date, start_time, duration_hours) {
        Some((_, end)) => start_time >= work_start() && end <= date.and_time(work_end()),
        None => false,
    }
}

pub fn is_available(bookings: &[Booking], date: NaiveDate, start_time: NaiveTime, duration_hours: u32) -> bool {
    if !within_working_hours(date, start_time, duration_hours) {
        return false;
    }
    let Some((start, end)) = window(date, start_time, duration_hours) else {
        return false;
    };

    !bookings.iter().any(|booking| {
        let (busy_start, busy_end) = padded_window(booking.start, booking.end);
        overlaps(start, end, busy_start, busy_end)
    })
}

/// Every free 2h and 4h slot on the half-hour grid, labelled `"HH:MM (2h)"`.
pub fn free_slots(bookings: &[Booking], date: NaiveDate) -> Vec<String> {
    // Walked as minutes of the day so the last representable date cannot overflow.
    let day_end = WORK_END_HOUR * 60;

    let mut slots = Vec::new();
    let mut minute = WORK_START_HOUR * 60;
    while minute + 2 * 60 <= day_end {
        let time = NaiveTime::MIN + Duration::minutes(minute);
        if is_available(bookings, date, time, 2) {
            slots.push(format!("{} (2h)", time.format(TIME_FORMAT)));
        }
        if minute + 4 * 60 <= day_end && is_available(bookings, date, time, 4) {
            slots.push(format!("{} (4h)", time.format(TIME_FORMAT)));
        }
        minute += SLOT_STEP_MINUTES;
    }
    slots
}

/// `"10:00 - 12:00"` style label for a single requested slot.
pub fn slot_label(start_time: NaiveTime, duration_hours: u32) -> String {
    let end_time = start_time + Duration::hours(i64::from(duration_hours));
    format!("{} - {}", start_time.format(TIME_FORMAT), end_time.format(TIME_FORMAT))
}
