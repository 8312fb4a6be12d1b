use async_trait::async_trait;
use chrono::NaiveDateTime;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};

use super::Storage;
use crate::domain::{Booking, Cleaner, NewBooking, NewVehicle, Vehicle};
use crate::error::{Result, ServiceError};

/// ISO-8601 without offset; lexicographic order matches chronological order.
const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

pub const IN_MEMORY: &str = ":memory:";

const SCHEMA: &str = r#"
    PRAGMA foreign_keys = ON;
    CREATE TABLE IF NOT EXISTS vehicle (
        id             INTEGER PRIMARY KEY AUTOINCREMENT,
        licence_plate  TEXT NOT NULL UNIQUE
    );
    CREATE TABLE IF NOT EXISTS cleaner (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        name        TEXT NOT NULL,
        vehicle_id  INTEGER NOT NULL REFERENCES vehicle(id)
    );
    CREATE INDEX IF NOT EXISTS idx_cleaner_vehicle_id ON cleaner(vehicle_id);
    CREATE TABLE IF NOT EXISTS booking (
        id               INTEGER PRIMARY KEY AUTOINCREMENT,
        start_date_time  TEXT NOT NULL,
        end_date_time    TEXT NOT NULL,
        duration_hours   INTEGER NOT NULL,
        customer_name    TEXT NOT NULL,
        customer_phone   TEXT
    );
    CREATE TABLE IF NOT EXISTS booking_cleaner (
        booking_id  INTEGER NOT NULL REFERENCES booking(id),
        cleaner_id  INTEGER NOT NULL REFERENCES cleaner(id),
        PRIMARY KEY (booking_id, cleaner_id)
    );
    CREATE INDEX IF NOT EXISTS idx_booking_cleaner_cleaner_id ON booking_cleaner(cleaner_id);
"#;

/// SQLite-backed storage. A single connection is shared behind a mutex; no
/// lock is ever held across an await point.
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Open (or create) the database at `path`. `":memory:"` gives a private
    /// in-memory database, which is what the tests use.
    pub fn open(path: &str) -> Result<Self> {
        let conn = if path == IN_MEMORY {
            Connection::open_in_memory()?
        } else {
            if let Some(parent) = Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            let conn = Connection::open(path)?;
            conn.execute_batch("PRAGMA journal_mode=WAL;")?;
            conn
        };

        conn.execute_batch(SCHEMA)?;
        info!("Opened booking database at {}", path);
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::open(IN_MEMORY)
    }
}

fn format_datetime(value: NaiveDateTime) -> String {
    value.format(DATETIME_FORMAT).to_string()
}

fn parse_datetime(raw: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, DATETIME_FORMAT)
        .map_err(|e| ServiceError::Storage(format!("invalid stored date-time '{raw}': {e}")))
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

/// Load full bookings (with their cleaners) for `ids`, ordered by start then id.
fn load_bookings(conn: &Connection, ids: &[i64]) -> Result<Vec<Booking>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let id_values: Vec<Value> = ids.iter().map(|id| Value::Integer(*id)).collect();

    let mut cleaners_by_booking: BTreeMap<i64, Vec<Cleaner>> = BTreeMap::new();
    let mut stmt = conn.prepare(&format!(
        "SELECT bc.booking_id, c.id, c.name, c.vehicle_id
         FROM booking_cleaner bc
         JOIN cleaner c ON c.id = bc.cleaner_id
         WHERE bc.booking_id IN ({})
         ORDER BY c.id",
        placeholders(ids.len())
    ))?;
    let rows = stmt.query_map(params_from_iter(id_values.iter()), |row| {
        Ok((
            row.get::<_, i64>(0)?,
            Cleaner {
                id: row.get(1)?,
                name: row.get(2)?,
                vehicle_id: row.get(3)?,
            },
        ))
    })?;
    for row in rows {
        let (booking_id, cleaner) = row?;
        cleaners_by_booking.entry(booking_id).or_default().push(cleaner);
    }

    let mut stmt = conn.prepare(&format!(
        "SELECT id, start_date_time, end_date_time, duration_hours, customer_name, customer_phone
         FROM booking
         WHERE id IN ({})
         ORDER BY start_date_time, id",
        placeholders(ids.len())
    ))?;
    let rows = stmt.query_map(params_from_iter(id_values.iter()), |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, u32>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, Option<String>>(5)?,
        ))
    })?;

    let mut bookings = Vec::new();
    for row in rows {
        let (id, start, end, duration_hours, customer_name, customer_phone) = row?;
        bookings.push(Booking {
            id,
            start: parse_datetime(&start)?,
            end: parse_datetime(&end)?,
            duration_hours,
            customer_name,
            customer_phone,
            cleaners: cleaners_by_booking.remove(&id).unwrap_or_default(),
        });
    }
    Ok(bookings)
}

/// Run a booking-id query whose leading placeholders are `bounds` followed by
/// the cleaner id list, then hydrate the matching bookings.
fn query_booking_ids(conn: &Connection, sql: &str, bounds: [String; 2], cleaner_ids: &[i64]) -> Result<Vec<Booking>> {
    let mut values: Vec<Value> = bounds.into_iter().map(Value::Text).collect();
    values.extend(cleaner_ids.iter().map(|id| Value::Integer(*id)));

    let mut stmt = conn.prepare(sql)?;
    let ids = stmt
        .query_map(params_from_iter(values.iter()), |row| row.get::<_, i64>(0))?
        .collect::<std::result::Result<Vec<i64>, _>>()?;

    load_bookings(conn, &ids)
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn count_vehicles(&self) -> Result<u64> {
        let conn = self.conn.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM vehicle", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    async fn create_vehicle(&self, licence_plate: &str) -> Result<Vehicle> {
        let conn = self.conn.lock()?;
        conn.execute(
            "INSERT INTO vehicle (licence_plate) VALUES (?1)",
            params![licence_plate],
        )?;
        let id = conn.last_insert_rowid();

        debug!("Created vehicle {} with id {}", licence_plate, id);
        Ok(Vehicle {
            id,
            licence_plate: licence_plate.to_string(),
            cleaners: Vec::new(),
        })
    }

    async fn create_cleaner(&self, vehicle_id: i64, name: &str) -> Result<Cleaner> {
        let conn = self.conn.lock()?;
        conn.execute(
            "INSERT INTO cleaner (name, vehicle_id) VALUES (?1, ?2)",
            params![name, vehicle_id],
        )?;
        let id = conn.last_insert_rowid();

        debug!("Created cleaner {} with id {} in vehicle {}", name, id, vehicle_id);
        Ok(Cleaner {
            id,
            name: name.to_string(),
            vehicle_id,
        })
    }

    async fn create_fleet(&self, fleet: &[NewVehicle]) -> Result<Vec<Vehicle>> {
        let mut conn = self.conn.lock()?;

        let tx = conn.transaction()?;
        let mut vehicles = Vec::with_capacity(fleet.len());
        for new_vehicle in fleet {
            tx.execute(
                "INSERT INTO vehicle (licence_plate) VALUES (?1)",
                params![new_vehicle.licence_plate],
            )?;
            let vehicle_id = tx.last_insert_rowid();

            let mut cleaners = Vec::with_capacity(new_vehicle.cleaner_names.len());
            for name in &new_vehicle.cleaner_names {
                tx.execute(
                    "INSERT INTO cleaner (name, vehicle_id) VALUES (?1, ?2)",
                    params![name, vehicle_id],
                )?;
                cleaners.push(Cleaner {
                    id: tx.last_insert_rowid(),
                    name: name.clone(),
                    vehicle_id,
                });
            }
            vehicles.push(Vehicle {
                id: vehicle_id,
                licence_plate: new_vehicle.licence_plate.clone(),
                cleaners,
            });
        }
        tx.commit()?;

        debug!("Created fleet of {} vehicles", vehicles.len());
        Ok(vehicles)
    }

    async fn list_cleaners(&self) -> Result<Vec<Cleaner>> {
        let conn = self.conn.lock()?;
        let mut stmt = conn.prepare("SELECT id, name, vehicle_id FROM cleaner ORDER BY id")?;
        let cleaners = stmt
            .query_map([], |row| {
                Ok(Cleaner {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    vehicle_id: row.get(2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(cleaners)
    }

    async fn list_vehicles_with_cleaners(&self) -> Result<Vec<Vehicle>> {
        let conn = self.conn.lock()?;

        let mut stmt = conn.prepare("SELECT id, licence_plate FROM vehicle ORDER BY id")?;
        let mut vehicles = stmt
            .query_map([], |row| {
                Ok(Vehicle {
                    id: row.get(0)?,
                    licence_plate: row.get(1)?,
                    cleaners: Vec::new(),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut stmt = conn.prepare("SELECT id, name, vehicle_id FROM cleaner ORDER BY id")?;
        let cleaners = stmt.query_map([], |row| {
            Ok(Cleaner {
                id: row.get(0)?,
                name: row.get(1)?,
                vehicle_id: row.get(2)?,
            })
        })?;

        let mut by_vehicle: BTreeMap<i64, Vec<Cleaner>> = BTreeMap::new();
        for cleaner in cleaners {
            let cleaner = cleaner?;
            by_vehicle.entry(cleaner.vehicle_id).or_default().push(cleaner);
        }
        for vehicle in &mut vehicles {
            vehicle.cleaners = by_vehicle.remove(&vehicle.id).unwrap_or_default();
        }
        Ok(vehicles)
    }

    async fn find_bookings_within(
        &self,
        cleaner_ids: &[i64],
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<Booking>> {
        if cleaner_ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn.lock()?;
        let sql = format!(
            "SELECT DISTINCT b.id FROM booking b
             JOIN booking_cleaner bc ON bc.booking_id = b.id
             WHERE b.start_date_time >= ? AND b.end_date_time <= ?
               AND bc.cleaner_id IN ({})",
            placeholders(cleaner_ids.len())
        );
        query_booking_ids(&conn, &sql, [format_datetime(start), format_datetime(end)], cleaner_ids)
    }

    async fn find_conflicting_bookings(
        &self,
        cleaner_ids: &[i64],
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<Booking>> {
        if cleaner_ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn.lock()?;
        // b.start < end AND b.end > start, with the bounds bound in that order
        let sql = format!(
            "SELECT DISTINCT b.id FROM booking b
             JOIN booking_cleaner bc ON bc.booking_id = b.id
             WHERE b.start_date_time < ? AND b.end_date_time > ?
               AND bc.cleaner_id IN ({})",
            placeholders(cleaner_ids.len())
        );
        query_booking_ids(&conn, &sql, [format_datetime(end), format_datetime(start)], cleaner_ids)
    }

    async fn get_booking(&self, id: i64) -> Result<Option<Booking>> {
        let conn = self.conn.lock()?;
        Ok(load_bookings(&conn, &[id])?.pop())
    }

    async fn create_booking(&self, booking: &NewBooking) -> Result<Booking> {
        let mut conn = self.conn.lock()?;

        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO booking (start_date_time, end_date_time, duration_hours, customer_name, customer_phone)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                format_datetime(booking.start),
                format_datetime(booking.end),
                booking.duration_hours,
                booking.customer_name,
                booking.customer_phone,
            ],
        )?;
        let id = tx.last_insert_rowid();
        for cleaner_id in &booking.cleaner_ids {
            tx.execute(
                "INSERT INTO booking_cleaner (booking_id, cleaner_id) VALUES (?1, ?2)",
                params![id, cleaner_id],
            )?;
        }
        // Read back before committing so a failed read leaves nothing behind.
        let created = load_bookings(&tx, &[id])?
            .pop()
            .ok_or_else(|| ServiceError::Storage(format!("booking {id} missing after insert")))?;
        tx.commit()?;

        debug!("Created booking {} for {}", id, booking.customer_name);
        Ok(created)
    }

    async fn update_booking_times(&self, id: i64, start: NaiveDateTime, end: NaiveDateTime) -> Result<()> {
        let conn = self.conn.lock()?;
        let changed = conn.execute(
            "UPDATE booking SET start_date_time = ?1, end_date_time = ?2 WHERE id = ?3",
            params![format_datetime(start), format_datetime(end), id],
        )?;
        if changed == 0 {
            return Err(ServiceError::not_found("Booking not found"));
        }

        debug!("Moved booking {} to {}", id, start);
        Ok(())
    }
}
