//! Scheduling constants shared by the booking rules and the API documentation.

use chrono::{Duration, NaiveTime};

pub const WORK_START_HOUR: i64 = 8;
pub const WORK_END_HOUR: i64 = 22;

/// Minimum gap a cleaner needs between two bookings, applied on both sides.
pub const BREAK_MINUTES: i64 = 30;

/// Spacing of candidate start times when listing free slots.
pub const SLOT_STEP_MINUTES: i64 = 30;

pub const ALLOWED_DURATIONS: [u32; 2] = [2, 4];

pub const MIN_CLEANERS: u32 = 1;
pub const MAX_CLEANERS: u32 = 3;

pub const SERVICE_NAME: &str = "cleaning-service";

pub fn work_start() -> NaiveTime {
    NaiveTime::MIN + Duration::hours(WORK_START_HOUR)
}

pub fn work_end() -> NaiveTime {
    NaiveTime::MIN + Duration::hours(WORK_END_HOUR)
}

pub fn break_duration() -> Duration {
    Duration::minutes(BREAK_MINUTES)
}
