//! Booking rules: availability lookup, cleaner selection and rescheduling.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::constants::{work_end, work_start, ALLOWED_DURATIONS, MAX_CLEANERS, MIN_CLEANERS};
use crate::domain::{Booking, NewBooking};
use crate::error::{Result, ServiceError};
use crate::metrics::{time_operation, BookingMetrics};
use crate::schedule::{day_bounds, free_slots, is_available, is_friday, padded_window, slot_label, window};
use crate::storage::Storage;
use crate::types::{AvailabilityRequest, BookingRequest, BookingResponse, BookingUpdateRequest, CleanerAvailability};

const NO_CLEANERS_AVAILABLE: &str = "No available cleaners found for the requested time and count constraint.";
const CLEANERS_BUSY: &str = "Selected cleaners are not available at the new time.";
const BOOKING_NOT_FOUND: &str = "Booking not found";

pub struct BookingService {
    storage: Arc<dyn Storage>,
    /// Serializes create/update so the conflict check and the write that
    /// follows it cannot interleave with another write.
    write_lock: Mutex<()>,
}

impl BookingService {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            write_lock: Mutex::new(()),
        }
    }

    /// List cleaners free on `request.date`. With both a start time and a
    /// duration only that slot is checked; otherwise every free slot is listed.
    /// Cleaners without any free slot are left out.
    pub async fn check_availability(&self, request: &AvailabilityRequest) -> Result<Vec<CleanerAvailability>> {
        let _timing = time_operation("check_availability");
        BookingMetrics::record_availability_query();

        let date = request.date;
        if is_friday(date) {
            return Err(reject("friday", "We do not work on Fridays."));
        }
        if let Some(duration) = request.duration {
            validate_duration(duration)?;
        }

        let cleaners = self.storage.list_cleaners().await?;
        let cleaner_ids: Vec<i64> = cleaners.iter().map(|c| c.id).collect();
        let (day_start, day_end) = day_bounds(date);
        let bookings = self
            .storage
            .find_bookings_within(&cleaner_ids, day_start, day_end)
            .await?;

        let mut by_cleaner: HashMap<i64, Vec<Booking>> = HashMap::new();
        for booking in bookings {
            for cleaner in &booking.cleaners {
                by_cleaner.entry(cleaner.id).or_default().push(booking.clone());
            }
        }

        let mut availability = Vec::new();
        for cleaner in cleaners {
            let own = by_cleaner.remove(&cleaner.id).unwrap_or_default();
            let slots = match (request.start_time, request.duration) {
                (Some(start_time), Some(duration)) => {
                    if is_available(&own, date, start_time, duration) {
                        vec![slot_label(start_time, duration)]
                    } else {
                        Vec::new()
                    }
                }
                _ => free_slots(&own, date),
            };

            if !slots.is_empty() {
                availability.push(CleanerAvailability {
                    cleaner_id: cleaner.id,
                    name: cleaner.name,
                    vehicle_id: cleaner.vehicle_id,
                    available_time_slots: slots,
                });
            }
        }

        info!(%date, available = availability.len(), "Checked availability");
        Ok(availability)
    }

    /// Book `cleaner_count` cleaners from the first vehicle (by id) that has
    /// that many free for the requested window plus breaks.
    pub async fn create_booking(&self, request: &BookingRequest) -> Result<BookingResponse> {
        let _timing = time_operation("create_booking");

        let (start, end) = validate_schedule(request.date, request.start_time, request.duration, request.cleaner_count)?;
        let customer_name = request.customer_name.trim();
        if customer_name.is_empty() {
            return Err(reject("customer_name", "Customer name is required"));
        }
        let customer_phone = request
            .customer_phone
            .as_deref()
            .map(str::trim)
            .filter(|phone| !phone.is_empty())
            .map(str::to_string);

        let (busy_start, busy_end) = padded_window(start, end);
        let wanted = request.cleaner_count as usize;

        let _guard = self.write_lock.lock().await;

        let vehicles = self.storage.list_vehicles_with_cleaners().await?;
        let all_cleaner_ids: Vec<i64> = vehicles
            .iter()
            .flat_map(|v| v.cleaners.iter().map(|c| c.id))
            .collect();
        let busy: HashSet<i64> = self
            .storage
            .find_conflicting_bookings(&all_cleaner_ids, busy_start, busy_end)
            .await?
            .iter()
            .flat_map(Booking::cleaner_ids)
            .collect();

        let selected = vehicles.iter().find_map(|vehicle| {
            let free: Vec<i64> = vehicle
                .cleaners
                .iter()
                .filter(|c| !busy.contains(&c.id))
                .map(|c| c.id)
                .take(wanted)
                .collect();
            (free.len() == wanted).then_some(free)
        });
        let Some(cleaner_ids) = selected else {
            return Err(reject("no_cleaners", NO_CLEANERS_AVAILABLE));
        };

        let booking = self
            .storage
            .create_booking(&NewBooking {
                start,
                end,
                duration_hours: request.duration,
                customer_name: customer_name.to_string(),
                customer_phone,
                cleaner_ids,
            })
            .await?;

        BookingMetrics::record_created(booking.cleaners.len());
        info!(
            booking_id = booking.id,
            %start,
            cleaners = booking.cleaners.len(),
            "Created booking"
        );
        Ok(booking.into())
    }

    /// Move a booking to a new date and start time, keeping its duration and
    /// its cleaners.
    pub async fn update_booking(&self, id: i64, request: &BookingUpdateRequest) -> Result<BookingResponse> {
        let _timing = time_operation("update_booking");
        let _guard = self.write_lock.lock().await;

        let booking = self
            .storage
            .get_booking(id)
            .await?
            .ok_or_else(|| ServiceError::not_found(BOOKING_NOT_FOUND))?;

        let (start, end) = validate_schedule(
            request.date,
            request.start_time,
            booking.duration_hours,
            booking.cleaners.len() as u32,
        )?;

        let (busy_start, busy_end) = padded_window(start, end);
        let conflicts = self
            .storage
            .find_conflicting_bookings(&booking.cleaner_ids(), busy_start, busy_end)
            .await?;
        if conflicts.iter().any(|other| other.id != id) {
            return Err(reject("cleaners_unavailable", CLEANERS_BUSY));
        }

        self.storage.update_booking_times(id, start, end).await?;

        BookingMetrics::record_updated();
        info!(booking_id = id, %start, "Rescheduled booking");
        Ok(Booking { start, end, ..booking }.into())
    }

    pub async fn get_booking(&self, id: i64) -> Result<BookingResponse> {
        self.storage
            .get_booking(id)
            .await?
            .map(BookingResponse::from)
            .ok_or_else(|| ServiceError::not_found(BOOKING_NOT_FOUND))
    }
}

fn reject(reason: &'static str, message: &str) -> ServiceError {
    warn!(reason, "Booking request rejected: {}", message);
    BookingMetrics::record_rejected(reason);
    ServiceError::business(message)
}

fn validate_duration(duration: u32) -> Result<()> {
    if ALLOWED_DURATIONS.contains(&duration) {
        Ok(())
    } else {
        Err(reject("duration", "Duration must be 2 or 4 hours."))
    }
}

/// Checks run in a fixed order so the first broken rule is the one reported.
/// Returns the validated booking window.
fn validate_schedule(
    date: NaiveDate,
    start_time: NaiveTime,
    duration: u32,
    cleaner_count: u32,
) -> Result<(NaiveDateTime, NaiveDateTime)> {
    if is_friday(date) {
        return Err(reject("friday", "We do not work on Fridays."));
    }
    if start_time < work_start() {
        return Err(reject(
            "too_early",
            &format!("Cannot start before {}", work_start().format("%H:%M")),
        ));
    }
    let closing = date.and_time(work_end());
    let Some((start, end)) = window(date, start_time, duration).filter(|(_, end)| *end <= closing) else {
        return Err(reject(
            "too_late",
            &format!("Must finish before {}", work_end().format("%H:%M")),
        ));
    };
    validate_duration(duration)?;
    if !(MIN_CLEANERS..=MAX_CLEANERS).contains(&cleaner_count) {
        return Err(reject(
            "cleaner_count",
            &format!("Cleaner count must be between {MIN_CLEANERS} and {MAX_CLEANERS}."),
        ));
    }
    Ok((start, end))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Cleaner;
    use crate::storage::SqliteStorage;
    use chrono::Duration;
    use metrics_exporter_prometheus::PrometheusBuilder;

    const THURSDAY: (i32, u32, u32) = (2023, 11, 23);
    const FRIDAY: (i32, u32, u32) = (2023, 11, 24);

    fn date((y, m, d): (i32, u32, u32)) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn at(h: u32, m: u32) -> NaiveDateTime {
        date(THURSDAY).and_time(time(h, m))
    }

    /// One vehicle per entry, with that many cleaners named "<vehicle>-<n>".
    async fn service_with_fleet(team_sizes: &[usize]) -> (BookingService, Arc<SqliteStorage>, Vec<Vec<Cleaner>>) {
        let storage = Arc::new(SqliteStorage::open_in_memory().unwrap());
        let mut teams = Vec::new();
        for (v, size) in team_sizes.iter().enumerate() {
            let vehicle = storage.create_vehicle(&format!("TEST-{v}")).await.unwrap();
            let mut team = Vec::new();
            for c in 0..*size {
                team.push(storage.create_cleaner(vehicle.id, &format!("{v}-{c}")).await.unwrap());
            }
            teams.push(team);
        }
        (BookingService::new(storage.clone()), storage, teams)
    }

    async fn existing_booking(storage: &SqliteStorage, start: NaiveDateTime, hours: u32, cleaners: &[&Cleaner]) -> Booking {
        storage
            .create_booking(&NewBooking {
                start,
                end: start + Duration::hours(i64::from(hours)),
                duration_hours: hours,
                customer_name: "Conflict Holder".to_string(),
                customer_phone: None,
                cleaner_ids: cleaners.iter().map(|c| c.id).collect(),
            })
            .await
            .unwrap()
    }

    fn booking_request(start: NaiveTime, duration: u32, cleaner_count: u32) -> BookingRequest {
        BookingRequest {
            date: date(THURSDAY),
            start_time: start,
            duration,
            cleaner_count,
            customer_name: "Test Customer".to_string(),
            customer_phone: None,
        }
    }

    fn assert_business(err: ServiceError, expected: &str) {
        match err {
            ServiceError::Business(message) => assert_eq!(message, expected),
            other => panic!("expected business error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_availability_rejects_friday() {
        let (service, _, _) = service_with_fleet(&[1]).await;
        let err = service
            .check_availability(&AvailabilityRequest { date: date(FRIDAY), start_time: None, duration: None })
            .await
            .unwrap_err();
        assert_business(err, "We do not work on Fridays.");
    }

    #[tokio::test]
    async fn test_availability_rejects_invalid_duration() {
        let (service, _, _) = service_with_fleet(&[1]).await;
        let err = service
            .check_availability(&AvailabilityRequest {
                date: date(THURSDAY),
                start_time: Some(time(10, 0)),
                duration: Some(3),
            })
            .await
            .unwrap_err();
        assert_business(err, "Duration must be 2 or 4 hours.");
    }

    #[tokio::test]
    async fn test_availability_for_specific_slot() {
        let (service, _, teams) = service_with_fleet(&[1]).await;
        let result = service
            .check_availability(&AvailabilityRequest {
                date: date(THURSDAY),
                start_time: Some(time(10, 0)),
                duration: Some(2),
            })
            .await
            .unwrap();

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].cleaner_id, teams[0][0].id);
        assert_eq!(result[0].vehicle_id, teams[0][0].vehicle_id);
        assert_eq!(result[0].available_time_slots, vec!["10:00 - 12:00".to_string()]);
    }

    #[tokio::test]
    async fn test_availability_excludes_cleaner_with_conflict() {
        let (service, storage, teams) = service_with_fleet(&[1]).await;
        existing_booking(&storage, at(9, 30), 2, &[&teams[0][0]]).await;

        let result = service
            .check_availability(&AvailabilityRequest {
                date: date(THURSDAY),
                start_time: Some(time(10, 0)),
                duration: Some(2),
            })
            .await
            .unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn test_availability_lists_free_slots_per_cleaner() {
        let (service, storage, teams) = service_with_fleet(&[2]).await;
        existing_booking(&storage, at(10, 0), 2, &[&teams[0][0]]).await;

        let result = service
            .check_availability(&AvailabilityRequest { date: date(THURSDAY), start_time: None, duration: None })
            .await
            .unwrap();

        assert_eq!(result.len(), 2);
        let busy = &result[0];
        let free = &result[1];
        assert_eq!(busy.cleaner_id, teams[0][0].id);
        assert_eq!(busy.available_time_slots[0], "12:30 (2h)");
        assert_eq!(free.available_time_slots[0], "08:00 (2h)");
        assert!(busy.available_time_slots.len() < free.available_time_slots.len());
    }

    #[tokio::test]
    async fn test_availability_with_start_time_but_no_duration_lists_day() {
        let (service, _, _) = service_with_fleet(&[1]).await;
        let result = service
            .check_availability(&AvailabilityRequest {
                date: date(THURSDAY),
                start_time: Some(time(10, 0)),
                duration: None,
            })
            .await
            .unwrap();

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].available_time_slots.len(), 25 + 21);
        assert_eq!(result[0].available_time_slots[0], "08:00 (2h)");
    }

    #[tokio::test]
    async fn test_availability_on_last_representable_date() {
        let (service, _, _) = service_with_fleet(&[1]).await;
        let last = NaiveDate::MAX;
        assert!(!is_friday(last));

        let whole_day = service
            .check_availability(&AvailabilityRequest { date: last, start_time: None, duration: None })
            .await
            .unwrap();
        assert_eq!(whole_day[0].available_time_slots[0], "08:00 (2h)");

        let evening = service
            .check_availability(&AvailabilityRequest {
                date: last,
                start_time: Some(time(21, 30)),
                duration: Some(4),
            })
            .await
            .unwrap();
        assert!(evening.is_empty());
    }

    #[tokio::test]
    async fn test_create_rejects_unrepresentable_window() {
        let (service, _, _) = service_with_fleet(&[1]).await;

        let mut late = booking_request(time(21, 0), 4, 1);
        late.date = NaiveDate::MAX;
        assert_business(service.create_booking(&late).await.unwrap_err(), "Must finish before 22:00");

        let endless = booking_request(time(10, 0), u32::MAX, 1);
        assert_business(service.create_booking(&endless).await.unwrap_err(), "Must finish before 22:00");
    }

    #[tokio::test]
    async fn test_availability_ignores_other_days() {
        let (service, storage, teams) = service_with_fleet(&[1]).await;
        let wednesday = date((2023, 11, 22)).and_time(time(10, 0));
        existing_booking(&storage, wednesday, 2, &[&teams[0][0]]).await;

        let result = service
            .check_availability(&AvailabilityRequest {
                date: date(THURSDAY),
                start_time: Some(time(10, 0)),
                duration: Some(2),
            })
            .await
            .unwrap();
        assert_eq!(result.len(), 1);
    }

    #[tokio::test]
    async fn test_create_rejects_schedule_violations() {
        let (service, _, _) = service_with_fleet(&[3]).await;

        let cases = [
            (booking_request(time(7, 0), 2, 1), "Cannot start before 08:00"),
            (booking_request(time(21, 0), 2, 1), "Must finish before 22:00"),
            (booking_request(time(10, 0), 3, 1), "Duration must be 2 or 4 hours."),
            (booking_request(time(10, 0), 2, 0), "Cleaner count must be between 1 and 3."),
            (booking_request(time(10, 0), 2, 4), "Cleaner count must be between 1 and 3."),
        ];
        for (request, expected) in cases {
            assert_business(service.create_booking(&request).await.unwrap_err(), expected);
        }

        let mut friday = booking_request(time(10, 0), 2, 1);
        friday.date = date(FRIDAY);
        assert_business(service.create_booking(&friday).await.unwrap_err(), "We do not work on Fridays.");

        let mut nameless = booking_request(time(10, 0), 2, 1);
        nameless.customer_name = "   ".to_string();
        assert_business(service.create_booking(&nameless).await.unwrap_err(), "Customer name is required");
    }

    #[tokio::test]
    async fn test_create_assigns_cleaners() {
        let (service, storage, _) = service_with_fleet(&[1]).await;
        let mut request = booking_request(time(10, 0), 2, 1);
        request.customer_phone = Some("+1234567890".to_string());

        let response = service.create_booking(&request).await.unwrap();

        assert_eq!(response.cleaner_names, vec!["0-0".to_string()]);
        assert_eq!(response.start_date_time, at(10, 0));
        assert_eq!(response.end_date_time, at(12, 0));
        assert_eq!(response.duration_hours, 2);
        assert_eq!(response.customer_name, "Test Customer");

        let stored = storage.get_booking(response.id).await.unwrap().unwrap();
        assert_eq!(stored.customer_phone.as_deref(), Some("+1234567890"));
    }

    #[tokio::test]
    async fn test_create_fails_when_every_cleaner_is_busy() {
        let (service, storage, teams) = service_with_fleet(&[2]).await;
        existing_booking(&storage, at(10, 0), 2, &[&teams[0][0], &teams[0][1]]).await;

        let err = service
            .create_booking(&booking_request(time(10, 0), 2, 1))
            .await
            .unwrap_err();
        assert_business(err, NO_CLEANERS_AVAILABLE);
    }

    #[tokio::test]
    async fn test_create_respects_break_after_existing_booking() {
        let (service, storage, teams) = service_with_fleet(&[1]).await;
        existing_booking(&storage, at(10, 0), 2, &[&teams[0][0]]).await;

        assert!(service.create_booking(&booking_request(time(12, 0), 2, 1)).await.is_err());
        assert!(service.create_booking(&booking_request(time(12, 30), 2, 1)).await.is_ok());
    }

    #[tokio::test]
    async fn test_create_keeps_team_within_one_vehicle() {
        let (service, storage, teams) = service_with_fleet(&[2, 2]).await;
        existing_booking(&storage, at(10, 0), 2, &[&teams[0][0]]).await;

        // Vehicle 0 has one free cleaner and vehicle 1 has two: no mixing.
        let response = service
            .create_booking(&booking_request(time(10, 0), 2, 2))
            .await
            .unwrap();
        assert_eq!(response.cleaner_names, vec!["1-0".to_string(), "1-1".to_string()]);
    }

    #[tokio::test]
    async fn test_create_prefers_first_vehicle_with_capacity() {
        let (service, _, _) = service_with_fleet(&[2, 3]).await;

        let two = service.create_booking(&booking_request(time(10, 0), 2, 2)).await.unwrap();
        assert_eq!(two.cleaner_names, vec!["0-0".to_string(), "0-1".to_string()]);

        let three = service.create_booking(&booking_request(time(14, 0), 4, 3)).await.unwrap();
        assert_eq!(three.cleaner_names, vec!["1-0".to_string(), "1-1".to_string(), "1-2".to_string()]);
    }

    #[tokio::test]
    async fn test_update_moves_booking() {
        let (service, storage, _) = service_with_fleet(&[1]).await;
        let created = service.create_booking(&booking_request(time(10, 0), 2, 1)).await.unwrap();

        let response = service
            .update_booking(created.id, &BookingUpdateRequest { date: date(THURSDAY), start_time: time(12, 0) })
            .await
            .unwrap();

        assert_eq!(response.id, created.id);
        assert_eq!(response.start_date_time, at(12, 0));
        assert_eq!(response.end_date_time, at(14, 0));
        assert_eq!(response.cleaner_names, created.cleaner_names);

        let stored = storage.get_booking(created.id).await.unwrap().unwrap();
        assert_eq!(stored.start, at(12, 0));
    }

    #[tokio::test]
    async fn test_update_may_overlap_its_own_previous_slot() {
        let (service, _, _) = service_with_fleet(&[1]).await;
        let created = service.create_booking(&booking_request(time(10, 0), 2, 1)).await.unwrap();

        let response = service
            .update_booking(created.id, &BookingUpdateRequest { date: date(THURSDAY), start_time: time(10, 30) })
            .await
            .unwrap();
        assert_eq!(response.start_date_time, at(10, 30));
    }

    #[tokio::test]
    async fn test_update_rejects_conflict() {
        let (service, storage, teams) = service_with_fleet(&[1]).await;
        let created = service.create_booking(&booking_request(time(10, 0), 2, 1)).await.unwrap();
        existing_booking(&storage, at(15, 0), 2, &[&teams[0][0]]).await;

        let err = service
            .update_booking(created.id, &BookingUpdateRequest { date: date(THURSDAY), start_time: time(13, 0) })
            .await
            .unwrap_err();
        assert_business(err, CLEANERS_BUSY);
    }

    #[tokio::test]
    async fn test_update_validates_new_slot() {
        let (service, _, _) = service_with_fleet(&[1]).await;
        let created = service.create_booking(&booking_request(time(10, 0), 4, 1)).await.unwrap();

        let err = service
            .update_booking(created.id, &BookingUpdateRequest { date: date(THURSDAY), start_time: time(19, 0) })
            .await
            .unwrap_err();
        assert_business(err, "Must finish before 22:00");

        let err = service
            .update_booking(created.id, &BookingUpdateRequest { date: date(FRIDAY), start_time: time(10, 0) })
            .await
            .unwrap_err();
        assert_business(err, "We do not work on Fridays.");
    }

    #[tokio::test]
    async fn test_update_unknown_booking() {
        let (service, _, _) = service_with_fleet(&[1]).await;
        let err = service
            .update_booking(999, &BookingUpdateRequest { date: date(THURSDAY), start_time: time(10, 0) })
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));

        assert!(matches!(service.get_booking(999).await.unwrap_err(), ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_concurrent_creates_never_double_book() {
        let (service, _, _) = service_with_fleet(&[1]).await;
        let service = Arc::new(service);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let service = service.clone();
            handles.push(tokio::spawn(async move {
                service.create_booking(&booking_request(time(10, 0), 2, 1)).await
            }));
        }

        let mut created = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                created += 1;
            }
        }
        assert_eq!(created, 1);
    }

    #[test]
    fn test_metrics_count_created_and_rejected_bookings() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        ::metrics::with_local_recorder(&recorder, || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            runtime.block_on(async {
                let (service, _, _) = service_with_fleet(&[1]).await;
                service.create_booking(&booking_request(time(10, 0), 2, 1)).await.unwrap();

                let mut friday = booking_request(time(10, 0), 2, 1);
                friday.date = date(FRIDAY);
                assert!(service.create_booking(&friday).await.is_err());
            });
        });

        let rendered = handle.render();
        assert!(rendered.contains("cleaning_bookings_created_total 1"), "{rendered}");
        assert!(
            rendered.contains(r#"cleaning_bookings_rejected_total{reason="friday"} 1"#),
            "{rendered}"
        );
    }
}
