use tracing::info;

use crate::config::SeedConfig;
use crate::domain::NewVehicle;
use crate::error::Result;
use crate::storage::Storage;

fn licence_plate(index: u32) -> String {
    format!("DXB-{}", u64::from(index) * 1000)
}

/// Populate an empty database with the default fleet: vehicles plated
/// `DXB-1000`, `DXB-2000`, ... each carrying cleaners named `Cleaner {v}-{c}`.
///
/// The whole fleet is written in one transaction. Returns `false` without
/// touching anything when vehicles already exist.
pub async fn seed_fleet(storage: &dyn Storage, config: &SeedConfig) -> Result<bool> {
    if storage.count_vehicles().await? > 0 {
        info!("Fleet already present, skipping seed");
        return Ok(false);
    }

    let fleet: Vec<NewVehicle> = (1..=config.vehicles)
        .map(|i| NewVehicle {
            licence_plate: licence_plate(i),
            cleaner_names: (1..=config.cleaners_per_vehicle)
                .map(|j| format!("Cleaner {i}-{j}"))
                .collect(),
        })
        .collect();
    storage.create_fleet(&fleet).await?;

    info!(
        vehicles = config.vehicles,
        cleaners_per_vehicle = config.cleaners_per_vehicle,
        "Seeded cleaning fleet"
    );
    Ok(true)
}
