//! Core entities: vehicles, the cleaners assigned to them, and bookings.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cleaner {
    pub id: i64,
    pub name: String,
    pub vehicle_id: i64,
}

/// A vehicle and the team that travels in it. A booking never mixes cleaners
/// from different vehicles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: i64,
    pub licence_plate: String,
    pub cleaners: Vec<Cleaner>,
}

/// A vehicle and the names of its cleaners, inserted together when the fleet
/// is seeded.
#[derive(Debug, Clone)]
pub struct NewVehicle {
    pub licence_plate: String,
    pub cleaner_names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: i64,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub duration_hours: u32,
    pub customer_name: String,
    pub customer_phone: Option<String>,
    pub cleaners: Vec<Cleaner>,
}

impl Booking {
    pub fn cleaner_ids(&self) -> Vec<i64> {
        self.cleaners.iter().map(|c| c.id).collect()
    }
}

/// A booking that has passed validation and cleaner selection but has not
/// been persisted yet.
#[derive(Debug, Clone)]
pub struct NewBooking {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub duration_hours: u32,
    pub customer_name: String,
    pub customer_phone: Option<String>,
    pub cleaner_ids: Vec<i64>,
}
