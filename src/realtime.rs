// GTFS-RT decoding into flat records.
//
// Every optional protobuf field is read through its Option; an unset field
// becomes None on the record, never a decode failure.

use gtfs_rt::FeedMessage;
use gtfs_rt::vehicle_position::VehicleStopStatus as FeedStopStatus;
use log::{debug, warn};
use prost::Message;

use crate::delay::classify_delay;
use crate::error::{FeedError, FetchError};
use crate::fetcher::HttpFetcher;
use crate::models::{TripUpdate, VehiclePosition, VehicleStopStatus};

const METERS_PER_SECOND_TO_KMH: f64 = 3.6;

fn decode_feed(bytes: &[u8], kind: &'static str) -> Result<FeedMessage, FeedError> {
    FeedMessage::decode(bytes).map_err(|source| FeedError::Decode { kind, source })
}

fn stop_status(raw: i32) -> Option<VehicleStopStatus> {
    match FeedStopStatus::from_i32(raw)? {
        FeedStopStatus::IncomingAt => Some(VehicleStopStatus::IncomingAt),
        FeedStopStatus::StoppedAt => Some(VehicleStopStatus::StoppedAt),
        FeedStopStatus::InTransitTo => Some(VehicleStopStatus::InTransitTo),
    }
}

/// Vehicle positions in the feed. Entities without a vehicle payload, or whose
/// vehicle has no position, contribute nothing.
pub fn decode_vehicles(bytes: &[u8]) -> Result<Vec<VehiclePosition>, FeedError> {
    let feed = decode_feed(bytes, "vehicle positions")?;

    let mut without_position = 0usize;
    let vehicles: Vec<VehiclePosition> = feed
        .entity
        .into_iter()
        .filter_map(|entity| entity.vehicle)
        .filter_map(|vehicle| {
            let Some(position) = vehicle.position.as_ref() else {
                without_position += 1;
                return None;
            };
            let trip = vehicle.trip.as_ref();
            let descriptor = vehicle.vehicle.as_ref();

            Some(VehiclePosition {
                vehicle_id: descriptor.and_then(|v| v.id.clone()),
                label: descriptor.and_then(|v| v.label.clone()),
                trip_id: trip.and_then(|t| t.trip_id.clone()),
                route_id: trip.and_then(|t| t.route_id.clone()),
                direction_id: trip.and_then(|t| t.direction_id),
                latitude: position.latitude as f64,
                longitude: position.longitude as f64,
                speed_kmh: position
                    .speed
                    .map(|mps| mps as f64 * METERS_PER_SECOND_TO_KMH),
                current_stop_sequence: vehicle.current_stop_sequence,
                stop_id: vehicle.stop_id.clone(),
                current_status: vehicle.current_status.and_then(stop_status),
                timestamp: vehicle.timestamp.map(|ts| ts as i64),
            })
        })
        .collect();

    if without_position > 0 {
        debug!("Ignored {} vehicles without a position", without_position);
    }
    Ok(vehicles)
}

/// Trip updates in the feed, classified against `threshold_secs`.
///
/// The delay is read from the first stop-time update only (arrival delay,
/// falling back to departure delay).
pub fn decode_trip_updates(bytes: &[u8], threshold_secs: i32) -> Result<Vec<TripUpdate>, FeedError> {
    let feed = decode_feed(bytes, "trip updates")?;

    let updates = feed
        .entity
        .into_iter()
        .filter_map(|entity| entity.trip_update)
        .map(|update| {
            let first = update.stop_time_update.first();
            let delay = first.and_then(|stu| {
                stu.arrival
                    .as_ref()
                    .and_then(|a| a.delay)
                    .or_else(|| stu.departure.as_ref().and_then(|d| d.delay))
            });

            TripUpdate {
                trip_id: update.trip.trip_id.clone(),
                route_id: update.trip.route_id.clone(),
                delay,
                stop_id: first.and_then(|stu| stu.stop_id.clone()),
                stop_sequence: first.and_then(|stu| stu.stop_sequence),
                timestamp: update.timestamp.map(|ts| ts as i64),
                status: classify_delay(delay, threshold_secs),
            }
        })
        .collect();

    Ok(updates)
}

/// Decode, treating an undecodable payload as an empty feed.
pub fn vehicles_or_empty(bytes: &[u8]) -> Vec<VehiclePosition> {
    decode_vehicles(bytes).unwrap_or_else(|e| {
        warn!("{}; continuing with no vehicles", e);
        Vec::new()
    })
}

pub fn trip_updates_or_empty(bytes: &[u8], threshold_secs: i32) -> Vec<TripUpdate> {
    decode_trip_updates(bytes, threshold_secs).unwrap_or_else(|e| {
        warn!("{}; continuing with no trip updates", e);
        Vec::new()
    })
}

pub fn fetch_vehicles(http: &HttpFetcher, url: &str) -> Result<Vec<VehiclePosition>, FetchError> {
    let body = http.get(url)?;
    Ok(vehicles_or_empty(&body))
}

pub fn fetch_trip_updates(
    http: &HttpFetcher,
    url: &str,
    threshold_secs: i32,
) -> Result<Vec<TripUpdate>, FetchError> {
    let body = http.get(url)?;
    Ok(trip_updates_or_empty(&body, threshold_secs))
}

pub fn vehicles_for_route<'a>(
    vehicles: &'a [VehiclePosition],
    route_id: &'a str,
) -> impl Iterator<Item = &'a VehiclePosition> + 'a {
    vehicles
        .iter()
        .filter(move |v| v.route_id.as_deref() == Some(route_id))
}
