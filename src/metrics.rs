//! Booking metrics recorded through the `metrics` facade and rendered by an
//! in-process Prometheus recorder.

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Instant;
use tracing::{info, warn};

pub const BOOKINGS_CREATED: &str = "cleaning_bookings_created_total";
pub const BOOKINGS_REJECTED: &str = "cleaning_bookings_rejected_total";
pub const BOOKINGS_UPDATED: &str = "cleaning_bookings_updated_total";
pub const AVAILABILITY_QUERIES: &str = "cleaning_availability_queries_total";
pub const CLEANERS_ASSIGNED: &str = "cleaning_cleaners_assigned";
pub const OPERATION_DURATION: &str = "cleaning_operation_duration_seconds";

static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder once. Later calls return the same handle.
pub fn init_metrics() -> Option<PrometheusHandle> {
    if let Some(handle) = HANDLE.get() {
        return Some(handle.clone());
    }

    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            BookingMetrics::register();
            let _ = HANDLE.set(handle.clone());
            info!("Prometheus recorder installed");
            Some(handle)
        }
        Err(e) => {
            warn!("Failed to install Prometheus recorder: {}", e);
            None
        }
    }
}

pub struct BookingMetrics;

impl BookingMetrics {
    pub fn record_created(cleaner_count: usize) {
        ::metrics::counter!(BOOKINGS_CREATED).increment(1);
        ::metrics::histogram!(CLEANERS_ASSIGNED).record(cleaner_count as f64);
    }

    pub fn record_rejected(reason: &'static str) {
        ::metrics::counter!(BOOKINGS_REJECTED, "reason" => reason).increment(1);
    }

    pub fn record_updated() {
        ::metrics::counter!(BOOKINGS_UPDATED).increment(1);
    }

    pub fn record_availability_query() {
        ::metrics::counter!(AVAILABILITY_QUERIES).increment(1);
    }

    fn register() {
        describe_counter!(BOOKINGS_CREATED, "Total number of bookings created");
        describe_counter!(
            BOOKINGS_REJECTED,
            "Total number of booking requests rejected, by reason"
        );
        describe_counter!(BOOKINGS_UPDATED, "Total number of bookings rescheduled");
        describe_counter!(AVAILABILITY_QUERIES, "Total number of availability checks");
        describe_histogram!(CLEANERS_ASSIGNED, "Cleaners assigned per created booking");
        describe_histogram!(
            OPERATION_DURATION,
            "Duration of booking service operations in seconds"
        );
    }
}

/// Records the elapsed time of a service operation when dropped.
pub struct TimingGuard {
    start: Instant,
    operation: &'static str,
}

impl Drop for TimingGuard {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        ::metrics::histogram!(OPERATION_DURATION, "operation" => self.operation).record(duration);
    }
}

pub fn time_operation(operation: &'static str) -> TimingGuard {
    TimingGuard {
        start: Instant::now(),
        operation,
    }
}
