// Source endpoints and refresh policy.
//
// TransLink (South East Queensland) open data:
// - GTFS Static: https://www.data.qld.gov.au/dataset/general-transit-feed-specification-gtfs-translink
// - GTFS-RT Vehicle Positions: https://gtfsrt.api.translink.com.au/api/realtime/SEQ/VehiclePositions/Bus
// - GTFS-RT Trip Updates: https://gtfsrt.api.translink.com.au/api/realtime/SEQ/TripUpdates/Bus

use std::path::PathBuf;
use std::time::Duration;

use chrono_tz::Tz;
use reqwest::Url;

use crate::error::ConfigError;

pub const STATIC_GTFS_URL: &str = "https://www.data.qld.gov.au/dataset/general-transit-feed-specification-gtfs-translink/resource/e43b6b9f-fc2b-4630-a7c9-86dd5483552b/download";
pub const VEHICLE_POSITIONS_URL: &str =
    "https://gtfsrt.api.translink.com.au/api/realtime/SEQ/VehiclePositions/Bus";
pub const TRIP_UPDATES_URL: &str =
    "https://gtfsrt.api.translink.com.au/api/realtime/SEQ/TripUpdates/Bus";

pub const REQUEST_TIMEOUT_SECS: u64 = 10;
/// The static archive is several megabytes; it gets its own, longer timeout.
pub const ARCHIVE_TIMEOUT_SECS: u64 = 60;
pub const REALTIME_INTERVAL_SECS: u64 = 30;

/// A trip is "Delayed" once its reported delay is strictly greater than this.
pub const DELAY_THRESHOLD_SECS: i32 = 180;

pub const SERVICE_TIMEZONE: Tz = chrono_tz::Australia::Brisbane;

#[derive(Debug, Clone)]
pub struct Config {
    pub static_url: String,
    pub vehicle_positions_url: String,
    pub trip_updates_url: String,
    pub request_timeout: Duration,
    pub archive_timeout: Duration,
    pub realtime_interval: Duration,
    pub delay_threshold_secs: i32,
    pub timezone: Tz,
    /// Directory for the raw archive cache. `None` disables the disk cache.
    pub cache_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            static_url: STATIC_GTFS_URL.into(),
            vehicle_positions_url: VEHICLE_POSITIONS_URL.into(),
            trip_updates_url: TRIP_UPDATES_URL.into(),
            request_timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
            archive_timeout: Duration::from_secs(ARCHIVE_TIMEOUT_SECS),
            realtime_interval: Duration::from_secs(REALTIME_INTERVAL_SECS),
            delay_threshold_secs: DELAY_THRESHOLD_SECS,
            timezone: SERVICE_TIMEZONE,
            cache_dir: dirs::cache_dir().map(|dir| dir.join("seq_transit")),
        }
    }
}

impl Config {
    pub fn without_disk_cache(mut self) -> Self {
        self.cache_dir = None;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_url("static archive", &self.static_url)?;
        check_url("vehicle positions", &self.vehicle_positions_url)?;
        check_url("trip updates", &self.trip_updates_url)?;

        if self.request_timeout.is_zero() {
            return Err(ConfigError::ZeroDuration("request timeout"));
        }
        if self.archive_timeout.is_zero() {
            return Err(ConfigError::ZeroDuration("archive timeout"));
        }
        if self.realtime_interval.is_zero() {
            return Err(ConfigError::ZeroDuration("realtime interval"));
        }
        Ok(())
    }
}

fn check_url(name: &'static str, url: &str) -> Result<(), ConfigError> {
    let parsed = Url::parse(url).map_err(|e| ConfigError::InvalidUrl {
        name,
        url: url.to_string(),
        reason: e.to_string(),
    })?;

    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ConfigError::InvalidUrl {
            name,
            url: url.to_string(),
            reason: format!("unsupported scheme '{}'", other),
        }),
    }
}
