pub mod config;
pub mod constants;
pub mod domain;
pub mod error;
pub mod handlers;
pub mod logging;
pub mod metrics;
pub mod openapi;
pub mod schedule;
pub mod seed;
pub mod server;
pub mod service;
pub mod storage;
pub mod types;

pub use error::{Result, ServiceError};
pub use service::BookingService;
