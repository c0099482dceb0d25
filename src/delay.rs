use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use chrono_tz::Tz;
use log::debug;

use crate::models::{
    DelayStatus, MergedVehicle, MergedVehicles, ScheduleDelay, StopRecord, TripUpdate,
    VehiclePosition,
};
use crate::region::classify_region;
use crate::time::ServiceTime;

/// `Delayed` only when a delay is reported and it is strictly above the threshold.
pub fn classify_delay(delay: Option<i32>, threshold_secs: i32) -> DelayStatus {
    match delay {
        Some(d) if d > threshold_secs => DelayStatus::Delayed,
        _ => DelayStatus::OnTime,
    }
}

/// Left-join vehicles with trip updates on (trip_id, route_id).
///
/// With no vehicles the updates come back as they are; with no updates the
/// vehicles do.
pub fn merge_vehicle_updates(
    vehicles: Vec<VehiclePosition>,
    updates: Vec<TripUpdate>,
) -> MergedVehicles {
    if vehicles.is_empty() {
        return MergedVehicles::UpdatesOnly(updates);
    }
    if updates.is_empty() {
        return MergedVehicles::VehiclesOnly(vehicles);
    }

    let mut by_key: HashMap<(&str, Option<&str>), &TripUpdate> = HashMap::new();
    for update in &updates {
        if let Some(trip_id) = update.trip_id.as_deref() {
            by_key
                .entry((trip_id, update.route_id.as_deref()))
                .or_insert(update);
        }
    }

    let mut matched = 0usize;
    let merged: Vec<MergedVehicle> = vehicles
        .into_iter()
        .map(|vehicle| {
            let update = vehicle
                .trip_id
                .as_deref()
                .and_then(|trip_id| by_key.get(&(trip_id, vehicle.route_id.as_deref())))
                .copied();
            if update.is_some() {
                matched += 1;
            }
            MergedVehicle {
                delay: update.and_then(|u| u.delay),
                status: update.map(|u| u.status),
                region: None,
                vehicle,
            }
        })
        .collect();

    debug!("Matched {} of {} vehicles to trip updates", matched, merged.len());
    MergedVehicles::Joined(merged)
}

/// Region per vehicle: the region of the stop it reports, otherwise the region
/// its own position falls in.
pub fn attach_regions(merged: MergedVehicles, stops: &[Arc<StopRecord>]) -> MergedVehicles {
    let stop_regions: HashMap<&str, _> = stops
        .iter()
        .filter_map(|s| s.region.map(|r| (s.stop_id.as_str(), r)))
        .collect();

    let with_region = |mut m: MergedVehicle| {
        let from_stop = m
            .vehicle
            .stop_id
            .as_deref()
            .and_then(|id| stop_regions.get(id))
            .copied();
        m.region = Some(
            from_stop.unwrap_or_else(|| classify_region(m.vehicle.latitude, m.vehicle.longitude)),
        );
        m
    };

    match merged {
        MergedVehicles::Joined(v) => MergedVehicles::Joined(v.into_iter().map(with_region).collect()),
        MergedVehicles::VehiclesOnly(v) => MergedVehicles::Joined(
            v.into_iter()
                .map(MergedVehicle::unmatched)
                .map(with_region)
                .collect(),
        ),
        updates @ MergedVehicles::UpdatesOnly(_) => updates,
    }
}

/// Most recent realtime report per trip.
fn latest_timestamp_by_trip(vehicles: &[VehiclePosition]) -> HashMap<&str, i64> {
    let mut latest: HashMap<&str, i64> = HashMap::new();
    for v in vehicles {
        if let (Some(trip_id), Some(ts)) = (v.trip_id.as_deref(), v.timestamp) {
            latest
                .entry(trip_id)
                .and_modify(|t| *t = (*t).max(ts))
                .or_insert(ts);
        }
    }
    latest
}

/// Minutes between a realtime epoch and a scheduled service time.
///
/// The service date is not known from either side, so the schedule is anchored
/// to the report's local date and to the day before (for trips running past
/// midnight), and the smaller gap wins.
pub fn arrival_delay_minutes(realtime: i64, scheduled: ServiceTime, tz: Tz) -> Option<f64> {
    let reported = Utc.timestamp_opt(realtime, 0).single()?;
    let local_date = reported.with_timezone(&tz).date_naive();

    [local_date, local_date - Duration::days(1)]
        .into_iter()
        .filter_map(|date| scheduled.on_service_date(date, tz))
        .map(|anchored| (reported - anchored).num_seconds())
        .min_by_key(|diff| diff.abs())
        .map(|secs| secs as f64 / 60.0)
}

/// Left-join scheduled stop visits to realtime reports on trip_id.
///
/// Rows share their stop record with `stops`; only the realtime columns are new.
pub fn schedule_delays(
    stops: &[Arc<StopRecord>],
    vehicles: &[VehiclePosition],
    tz: Tz,
) -> Vec<ScheduleDelay> {
    let latest = latest_timestamp_by_trip(vehicles);

    stops
        .iter()
        .map(|stop| {
            let realtime_timestamp = latest.get(stop.trip_id.as_str()).copied();
            let arrival_delay_minutes = match (realtime_timestamp, stop.arrival_time) {
                (Some(ts), Some(scheduled)) => arrival_delay_minutes(ts, scheduled, tz),
                _ => None,
            };
            ScheduleDelay {
                stop: Arc::clone(stop),
                realtime_timestamp,
                arrival_delay_minutes,
            }
        })
        .collect()
}
