use std::fmt::Display;

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

const SECONDS_PER_HOUR: u32 = 3600;
const SECONDS_PER_MINUTE: u32 = 60;

/// Scheduled time of day as seconds since midnight of the service date.
///
/// GTFS times may run past 24:00:00 for trips that continue after midnight,
/// so the value is not bounded to a single day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceTime(u32);

impl ServiceTime {
    pub const fn from_seconds(secs: u32) -> Self {
        Self(secs)
    }

    pub const fn as_seconds(&self) -> u32 {
        self.0
    }

    /// Parse GTFS `HH:MM:SS`. Hours may exceed 23, minutes and seconds may not.
    pub fn parse(time_str: &str) -> Option<Self> {
        let mut parts = time_str.trim().split(':');
        let hours: u32 = parts.next()?.parse().ok()?;
        let minutes: u32 = parts.next()?.parse().ok()?;
        let seconds: u32 = parts.next()?.parse().ok()?;
        if parts.next().is_some() || minutes >= 60 || seconds >= 60 {
            return None;
        }
        hours
            .checked_mul(SECONDS_PER_HOUR)?
            .checked_add(minutes * SECONDS_PER_MINUTE + seconds)
            .map(Self)
    }

    pub fn to_hms_string(&self) -> String {
        let h = self.0 / SECONDS_PER_HOUR;
        let m = (self.0 % SECONDS_PER_HOUR) / SECONDS_PER_MINUTE;
        let s = self.0 % SECONDS_PER_MINUTE;
        format!("{:02}:{:02}:{:02}", h, m, s)
    }

    /// Calendar instant of this time on `service_date`, counted from local midnight.
    pub fn on_service_date(&self, service_date: NaiveDate, tz: Tz) -> Option<DateTime<Utc>> {
        let midnight = service_date.and_hms_opt(0, 0, 0)?;
        let local_midnight = tz.from_local_datetime(&midnight).earliest()?;
        Some(local_midnight.with_timezone(&Utc) + Duration::seconds(i64::from(self.0)))
    }
}

impl Display for ServiceTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hms_string())
    }
}

pub fn format_timestamp(timestamp: i64, tz: Tz) -> String {
    match Utc.timestamp_opt(timestamp, 0).single() {
        Some(dt) => dt.with_timezone(&tz).format("%Y-%m-%d %H:%M:%S").to_string(),
        None => format!("Invalid timestamp: {}", timestamp),
    }
}
