//! Persistence boundary for the fleet and its bookings.

pub mod sqlite;

use async_trait::async_trait;
use chrono::NaiveDateTime;

use crate::domain::{Booking, Cleaner, NewBooking, NewVehicle, Vehicle};
use crate::error::Result;

pub use sqlite::SqliteStorage;

/// Storage trait for persisting vehicles, cleaners and bookings
#[async_trait]
pub trait Storage: Send + Sync {
    // Fleet operations
    async fn count_vehicles(&self) -> Result<u64>;
    async fn create_vehicle(&self, licence_plate: &str) -> Result<Vehicle>;
    async fn create_cleaner(&self, vehicle_id: i64, name: &str) -> Result<Cleaner>;
    /// Inserts every vehicle with its cleaners in one transaction; nothing is
    /// kept if any insert fails.
    async fn create_fleet(&self, fleet: &[NewVehicle]) -> Result<Vec<Vehicle>>;
    async fn list_cleaners(&self) -> Result<Vec<Cleaner>>;
    /// Vehicles ordered by id, each carrying its cleaners ordered by id.
    async fn list_vehicles_with_cleaners(&self) -> Result<Vec<Vehicle>>;

    // Booking operations
    /// Bookings of any of `cleaner_ids` lying entirely inside `[start, end]`.
    async fn find_bookings_within(
        &self,
        cleaner_ids: &[i64],
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<Booking>>;
    /// Bookings of any of `cleaner_ids` that overlap `[start, end)`.
    async fn find_conflicting_bookings(
        &self,
        cleaner_ids: &[i64],
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<Booking>>;
    async fn get_booking(&self, id: i64) -> Result<Option<Booking>>;
    async fn create_booking(&self, booking: &NewBooking) -> Result<Booking>;
    async fn update_booking_times(&self, id: i64, start: NaiveDateTime, end: NaiveDateTime) -> Result<()>;
}
