// ============================================================================
// Refresh policy and snapshot ownership
// ============================================================================
//
// Two independent timers decide, on each poll, whether the static archive or
// the realtime feeds must be fetched again. Every refresh builds a complete new
// Snapshot and swaps it in; a failed refresh leaves the previous one in place.

use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use log::{info, warn};
use serde::Serialize;

use crate::config::Config;
use crate::delay::{attach_regions, merge_vehicle_updates, schedule_delays};
use crate::enricher::enrich;
use crate::error::{ExtractError, Result};
use crate::extractor::{GtfsTables, Table, list_files, open_archive};
use crate::fetcher::{HttpSource, TransitSource};
use crate::models::{MergedVehicles, ScheduleDelay, Segment, StopRecord, VehiclePosition};
use crate::realtime::{trip_updates_or_empty, vehicles_or_empty};
use crate::shapes::resolve;
use crate::time::format_timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Freshness {
    Fresh,
    Stale,
}

/// Stale once the service-timezone calendar date moves past the last refresh.
#[derive(Debug, Clone)]
pub struct StaticTimer {
    tz: Tz,
    last_refresh: Option<DateTime<Utc>>,
    forced: bool,
}

impl StaticTimer {
    pub fn new(tz: Tz) -> Self {
        Self {
            tz,
            last_refresh: None,
            forced: false,
        }
    }

    pub fn state(&self, now: DateTime<Utc>) -> Freshness {
        match self.last_refresh {
            _ if self.forced => Freshness::Stale,
            None => Freshness::Stale,
            Some(last) => {
                let today = now.with_timezone(&self.tz).date_naive();
                let refreshed_on = last.with_timezone(&self.tz).date_naive();
                if today > refreshed_on {
                    Freshness::Stale
                } else {
                    Freshness::Fresh
                }
            }
        }
    }

    pub fn mark_refreshed(&mut self, now: DateTime<Utc>) {
        self.last_refresh = Some(now);
        self.forced = false;
    }

    pub fn force(&mut self) {
        self.forced = true;
    }

    pub fn last_refresh(&self) -> Option<DateTime<Utc>> {
        self.last_refresh
    }
}

/// Stale once `interval` has elapsed since the last refresh.
#[derive(Debug, Clone)]
pub struct RealtimeTimer {
    interval: Duration,
    last_refresh: Option<DateTime<Utc>>,
    forced: bool,
}

impl RealtimeTimer {
    pub fn new(interval: std::time::Duration) -> Self {
        Self {
            interval: Duration::milliseconds(interval.as_millis() as i64),
            last_refresh: None,
            forced: false,
        }
    }

    pub fn state(&self, now: DateTime<Utc>) -> Freshness {
        match self.last_refresh {
            _ if self.forced => Freshness::Stale,
            None => Freshness::Stale,
            Some(last) if now - last >= self.interval => Freshness::Stale,
            Some(_) => Freshness::Fresh,
        }
    }

    pub fn mark_refreshed(&mut self, now: DateTime<Utc>) {
        self.last_refresh = Some(now);
        self.forced = false;
    }

    pub fn force(&mut self) {
        self.forced = true;
    }

    pub fn last_refresh(&self) -> Option<DateTime<Utc>> {
        self.last_refresh
    }
}

/// Everything the query layer reads, as of the last completed refreshes.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub enriched_stops: Arc<Vec<Arc<StopRecord>>>,
    pub trips: Arc<Table>,
    pub shapes: Arc<Table>,
    pub vehicles: Arc<Vec<VehiclePosition>>,
    pub merged_vehicles: Arc<MergedVehicles>,
    pub schedule_delays: Arc<Vec<ScheduleDelay>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RefreshOutcome {
    Skipped,
    Refreshed { records: usize },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PollReport {
    pub static_data: RefreshOutcome,
    pub realtime: RefreshOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStats {
    pub enriched_stops: usize,
    pub trips: usize,
    pub shape_points: usize,
    pub vehicles: usize,
    pub merged_vehicles: usize,
    pub schedule_delays: usize,
    pub last_static_refresh: Option<String>,
    pub last_realtime_refresh: Option<String>,
    pub static_age_secs: Option<i64>,
    pub realtime_age_secs: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feed {
    Static,
    Realtime,
}

pub struct RefreshScheduler {
    config: Config,
    source: Box<dyn TransitSource>,
    static_timer: StaticTimer,
    realtime_timer: RealtimeTimer,
    snapshot: Arc<Snapshot>,
}

impl RefreshScheduler {
    /// Fails only on an invalid configuration.
    pub fn new(config: Config, source: Box<dyn TransitSource>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            static_timer: StaticTimer::new(config.timezone),
            realtime_timer: RealtimeTimer::new(config.realtime_interval),
            config,
            source,
            snapshot: Arc::new(Snapshot::default()),
        })
    }

    pub fn with_http(config: Config) -> Result<Self> {
        config.validate()?;
        let source = HttpSource::new(config.clone())?;
        Self::new(config, Box::new(source))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn static_state(&self, now: DateTime<Utc>) -> Freshness {
        self.static_timer.state(now)
    }

    pub fn realtime_state(&self, now: DateTime<Utc>) -> Freshness {
        self.realtime_timer.state(now)
    }

    /// Make the next poll refresh `feed` no matter how recent the last refresh was.
    pub fn force_refresh(&mut self, feed: Feed) {
        info!("Forcing {:?} refresh on next poll", feed);
        match feed {
            Feed::Static => self.static_timer.force(),
            Feed::Realtime => self.realtime_timer.force(),
        }
    }

    pub fn poll(&mut self) -> PollReport {
        self.poll_at(Utc::now())
    }

    /// Refresh whichever sources are stale at `now`, static first.
    pub fn poll_at(&mut self, now: DateTime<Utc>) -> PollReport {
        let static_data = match self.static_timer.state(now) {
            Freshness::Fresh => RefreshOutcome::Skipped,
            Freshness::Stale => match self.refresh_static(now) {
                Ok(records) => {
                    self.static_timer.mark_refreshed(now);
                    RefreshOutcome::Refreshed { records }
                }
                Err(e) => {
                    warn!("Static refresh failed, keeping previous schedule: {}", e);
                    RefreshOutcome::Failed {
                        error: e.to_string(),
                    }
                }
            },
        };

        let realtime = match self.realtime_timer.state(now) {
            Freshness::Fresh => RefreshOutcome::Skipped,
            Freshness::Stale => match self.refresh_realtime() {
                Ok(records) => {
                    self.realtime_timer.mark_refreshed(now);
                    RefreshOutcome::Refreshed { records }
                }
                Err(e) => {
                    warn!("Realtime refresh failed, keeping previous vehicles: {}", e);
                    RefreshOutcome::Failed {
                        error: e.to_string(),
                    }
                }
            },
        };

        PollReport {
            static_data,
            realtime,
        }
    }

    fn refresh_static(&mut self, now: DateTime<Utc>) -> Result<usize> {
        let service_date = now.with_timezone(&self.config.timezone).date_naive();
        info!("Refreshing static schedule for {}...", service_date);
        let bytes = self.source.fetch_archive(service_date)?;

        let rebuilt = self.rebuild_static(bytes);
        if rebuilt.is_err() {
            self.source.discard_archive(service_date);
        }
        rebuilt
    }

    fn rebuild_static(&mut self, bytes: Bytes) -> Result<usize> {
        let mut archive = open_archive(bytes)?;
        info!("Archive contains: {}", list_files(&archive).join(", "));

        let tables = GtfsTables::extract_all(&mut archive)?;
        let missing = tables.missing_for_enrichment();
        if !missing.is_empty() {
            // An incomplete archive must not replace a schedule that was complete.
            if !self.snapshot.enriched_stops.is_empty() {
                return Err(ExtractError::MissingTables(missing).into());
            }
            warn!("Archive is missing required tables: {}", missing.join(", "));
        }

        let enriched: Vec<Arc<StopRecord>> =
            enrich(&tables.stop_times, &tables.trips, &tables.routes, &tables.stops)
                .into_iter()
                .map(Arc::new)
                .collect();
        let records = enriched.len();

        let current = Arc::clone(&self.snapshot);
        let merged = attach_regions((*current.merged_vehicles).clone(), &enriched);
        let delays = schedule_delays(&enriched, &current.vehicles, self.config.timezone);

        self.snapshot = Arc::new(Snapshot {
            enriched_stops: Arc::new(enriched),
            trips: Arc::new(tables.trips),
            shapes: Arc::new(tables.shapes),
            vehicles: Arc::clone(&current.vehicles),
            merged_vehicles: Arc::new(merged),
            schedule_delays: Arc::new(delays),
        });

        info!("Static schedule refreshed: {} stop visits", records);
        Ok(records)
    }

    fn refresh_realtime(&mut self) -> Result<usize> {
        let vehicle_bytes = self.source.fetch_vehicle_positions()?;
        let update_bytes = self.source.fetch_trip_updates()?;

        let vehicles = vehicles_or_empty(&vehicle_bytes);
        let updates = trip_updates_or_empty(&update_bytes, self.config.delay_threshold_secs);
        let (vehicle_count, update_count) = (vehicles.len(), updates.len());

        let current = Arc::clone(&self.snapshot);
        let merged = attach_regions(
            merge_vehicle_updates(vehicles.clone(), updates),
            &current.enriched_stops,
        );
        let delays = schedule_delays(&current.enriched_stops, &vehicles, self.config.timezone);

        self.snapshot = Arc::new(Snapshot {
            enriched_stops: Arc::clone(&current.enriched_stops),
            trips: Arc::clone(&current.trips),
            shapes: Arc::clone(&current.shapes),
            vehicles: Arc::new(vehicles),
            merged_vehicles: Arc::new(merged),
            schedule_delays: Arc::new(delays),
        });

        info!(
            "Realtime refreshed: {} vehicles, {} trip updates",
            vehicle_count, update_count
        );
        Ok(vehicle_count)
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.snapshot)
    }

    pub fn get_enriched_stops(&self) -> Arc<Vec<Arc<StopRecord>>> {
        Arc::clone(&self.snapshot.enriched_stops)
    }

    pub fn get_route_shape(&self, route_id: &str, direction: &str) -> Vec<Segment> {
        resolve(route_id, direction, &self.snapshot.trips, &self.snapshot.shapes)
    }

    pub fn get_merged_vehicles(&self) -> Arc<MergedVehicles> {
        Arc::clone(&self.snapshot.merged_vehicles)
    }

    pub fn get_schedule_delays(&self) -> Arc<Vec<ScheduleDelay>> {
        Arc::clone(&self.snapshot.schedule_delays)
    }

    pub fn stats(&self, now: DateTime<Utc>) -> SchedulerStats {
        let tz = self.config.timezone;
        let last_static = self.static_timer.last_refresh();
        let last_realtime = self.realtime_timer.last_refresh();
        let snapshot = &self.snapshot;

        SchedulerStats {
            enriched_stops: snapshot.enriched_stops.len(),
            trips: snapshot.trips.len(),
            shape_points: snapshot.shapes.len(),
            vehicles: snapshot.vehicles.len(),
            merged_vehicles: snapshot.merged_vehicles.len(),
            schedule_delays: snapshot.schedule_delays.len(),
            last_static_refresh: last_static.map(|t| format_timestamp(t.timestamp(), tz)),
            last_realtime_refresh: last_realtime.map(|t| format_timestamp(t.timestamp(), tz)),
            static_age_secs: last_static.map(|t| (now - t).num_seconds()),
            realtime_age_secs: last_realtime.map(|t| (now - t).num_seconds()),
        }
    }
}
