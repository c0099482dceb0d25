// ============================================================================
// Data Structures
// ============================================================================

use std::fmt::Display;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::region::Region;
use crate::time::ServiceTime;

/// Display sentinel for optional realtime fields that the feed left unset.
pub const UNKNOWN: &str = "Unknown";

pub fn or_unknown<T: Display>(value: &Option<T>) -> String {
    value
        .as_ref()
        .map(|v| v.to_string())
        .unwrap_or_else(|| UNKNOWN.to_string())
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

/// One scheduled stop visit, denormalized across stop_times, trips, routes and stops.
///
/// Fields that come from a left join are `None` when the lookup failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopRecord {
    pub stop_id: String,
    pub trip_id: String,
    pub route_id: Option<String>,
    pub direction_id: Option<String>,
    pub arrival_time: Option<ServiceTime>,
    pub departure_time: Option<ServiceTime>,
    pub stop_sequence: Option<u32>,
    pub stop_name: Option<String>,
    pub stop_lat: Option<f64>,
    pub stop_lon: Option<f64>,
    pub route_short_name: Option<String>,
    /// `None` when the stop coordinates are missing or not numeric.
    pub region: Option<Region>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapePoint {
    pub shape_id: String,
    pub sequence: i64,
    pub latitude: f64,
    pub longitude: f64,
}

impl ShapePoint {
    pub fn coordinate(&self) -> Coordinate {
        Coordinate {
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }
}

/// Directed line between two consecutive points of one shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub shape_id: String,
    pub start: Coordinate,
    pub end: Coordinate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VehicleStopStatus {
    IncomingAt,
    StoppedAt,
    InTransitTo,
}

impl Display for VehicleStopStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            VehicleStopStatus::IncomingAt => "INCOMING_AT",
            VehicleStopStatus::StoppedAt => "STOPPED_AT",
            VehicleStopStatus::InTransitTo => "IN_TRANSIT_TO",
        })
    }
}

/// Decoded vehicle position. Speed is always km/h (feed m/s × 3.6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehiclePosition {
    pub vehicle_id: Option<String>,
    pub label: Option<String>,
    pub trip_id: Option<String>,
    pub route_id: Option<String>,
    pub direction_id: Option<u32>,
    pub latitude: f64,
    pub longitude: f64,
    pub speed_kmh: Option<f64>,
    pub current_stop_sequence: Option<u32>,
    pub stop_id: Option<String>,
    pub current_status: Option<VehicleStopStatus>,
    pub timestamp: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DelayStatus {
    #[serde(rename = "On Time")]
    OnTime,
    Delayed,
}

impl Display for DelayStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            DelayStatus::OnTime => "On Time",
            DelayStatus::Delayed => "Delayed",
        })
    }
}

/// Decoded trip update. `delay` comes from the first stop-time update only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripUpdate {
    pub trip_id: Option<String>,
    pub route_id: Option<String>,
    pub delay: Option<i32>,
    pub stop_id: Option<String>,
    pub stop_sequence: Option<u32>,
    pub timestamp: Option<i64>,
    pub status: DelayStatus,
}

/// Vehicle position left-joined with its trip update on (trip_id, route_id).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedVehicle {
    #[serde(flatten)]
    pub vehicle: VehiclePosition,
    pub delay: Option<i32>,
    pub status: Option<DelayStatus>,
    pub region: Option<Region>,
}

impl MergedVehicle {
    pub fn unmatched(vehicle: VehiclePosition) -> Self {
        Self {
            vehicle,
            delay: None,
            status: None,
            region: None,
        }
    }
}

/// Result of merging the two realtime feeds.
///
/// The shape depends on which side was empty: no vehicles hands the updates
/// back untouched, no updates hands the vehicles back untouched.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "records", rename_all = "snake_case")]
pub enum MergedVehicles {
    Joined(Vec<MergedVehicle>),
    VehiclesOnly(Vec<VehiclePosition>),
    UpdatesOnly(Vec<TripUpdate>),
}

impl Default for MergedVehicles {
    fn default() -> Self {
        MergedVehicles::Joined(Vec::new())
    }
}

impl MergedVehicles {
    pub fn len(&self) -> usize {
        match self {
            MergedVehicles::Joined(v) => v.len(),
            MergedVehicles::VehiclesOnly(v) => v.len(),
            MergedVehicles::UpdatesOnly(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Per-vehicle view regardless of shape; `UpdatesOnly` has no vehicles.
    pub fn vehicles(&self) -> Vec<MergedVehicle> {
        match self {
            MergedVehicles::Joined(v) => v.clone(),
            MergedVehicles::VehiclesOnly(v) => {
                v.iter().cloned().map(MergedVehicle::unmatched).collect()
            }
            MergedVehicles::UpdatesOnly(_) => Vec::new(),
        }
    }
}

/// A scheduled stop visit compared against the realtime report for its trip.
///
/// The stop record is shared with the enriched table, not copied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleDelay {
    #[serde(flatten)]
    pub stop: Arc<StopRecord>,
    pub realtime_timestamp: Option<i64>,
    /// Realtime minus scheduled arrival, in minutes.
    pub arrival_delay_minutes: Option<f64>,
}
