#![allow(dead_code)]

use std::io::{Cursor, Write};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use chrono_tz::Australia::Brisbane;
use prost::Message;
use zip::ZipWriter;
use zip::write::FileOptions;

use seq_transit_core::Config;
use seq_transit_core::error::FetchError;
use seq_transit_core::fetcher::TransitSource;
use seq_transit_core::scheduler::RefreshScheduler;

pub const ROUTES: &str = "route_id,route_short_name,route_long_name,route_type\n\
R777,777,Broadbeach - Airport,3\n";

pub const STOPS: &str = "stop_id,stop_name,stop_lat,stop_lon\n\
S1,Broadbeach South,-28.03,153.43\n\
S2,Roma Street,-27.465,153.017\n";

pub const TRIPS: &str = "route_id,service_id,trip_id,direction_id,shape_id\n\
R777,WD,T1,0,SH1\n";

pub const STOP_TIMES: &str = "trip_id,arrival_time,departure_time,stop_id,stop_sequence\n\
T1,08:00:00,08:00:00,S1,1\n\
T1,08:30:00,08:30:00,S2,2\n";

pub const SHAPES: &str = "shape_id,shape_pt_lat,shape_pt_lon,shape_pt_sequence\n\
SH1,-27.50,153.05,3\n\
SH1,-28.03,153.43,1\n\
SH1,-27.80,153.30,2\n";

pub fn brisbane(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    let local = NaiveDate::from_ymd_opt(y, m, d)
        .unwrap()
        .and_hms_opt(h, min, 0)
        .unwrap();
    Brisbane.from_local_datetime(&local).unwrap().with_timezone(&Utc)
}

pub fn zip_of(files: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, contents) in files {
        writer.start_file(*name, FileOptions::default()).unwrap();
        writer.write_all(contents.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

pub fn full_archive() -> Vec<u8> {
    zip_of(&[
        ("agency.txt", "agency_id,agency_name\nTL,TransLink\n"),
        ("routes.txt", ROUTES),
        ("stops.txt", STOPS),
        ("trips.txt", TRIPS),
        ("stop_times.txt", STOP_TIMES),
        ("shapes.txt", SHAPES),
    ])
}

fn feed(entity: Vec<gtfs_rt::FeedEntity>) -> Vec<u8> {
    gtfs_rt::FeedMessage {
        header: gtfs_rt::FeedHeader {
            gtfs_realtime_version: "2.0".into(),
            ..Default::default()
        },
        entity,
    }
    .encode_to_vec()
}

/// One vehicle on T1 / R777, reported at stop S1.
pub fn vehicle_feed(timestamp: DateTime<Utc>) -> Vec<u8> {
    feed(vec![gtfs_rt::FeedEntity {
        id: "V1".into(),
        vehicle: Some(gtfs_rt::VehiclePosition {
            trip: Some(gtfs_rt::TripDescriptor {
                trip_id: Some("T1".into()),
                route_id: Some("R777".into()),
                ..Default::default()
            }),
            vehicle: Some(gtfs_rt::VehicleDescriptor {
                id: Some("V1".into()),
                label: Some("777 Airport".into()),
                ..Default::default()
            }),
            position: Some(gtfs_rt::Position {
                latitude: -28.03,
                longitude: 153.43,
                speed: Some(12.5),
                ..Default::default()
            }),
            stop_id: Some("S1".into()),
            timestamp: Some(timestamp.timestamp() as u64),
            ..Default::default()
        }),
        ..Default::default()
    }])
}

/// One trip update for T1 / R777 with the given first-stop arrival delay.
pub fn trip_update_feed(delay: i32) -> Vec<u8> {
    feed(vec![gtfs_rt::FeedEntity {
        id: "U1".into(),
        trip_update: Some(gtfs_rt::TripUpdate {
            trip: gtfs_rt::TripDescriptor {
                trip_id: Some("T1".into()),
                route_id: Some("R777".into()),
                ..Default::default()
            },
            stop_time_update: vec![gtfs_rt::trip_update::StopTimeUpdate {
                stop_sequence: Some(1),
                stop_id: Some("S1".into()),
                arrival: Some(gtfs_rt::trip_update::StopTimeEvent {
                    delay: Some(delay),
                    ..Default::default()
                }),
                ..Default::default()
            }],
            ..Default::default()
        }),
        ..Default::default()
    }])
}

pub fn empty_feed() -> Vec<u8> {
    feed(vec![])
}

/// Payloads served by [`FakeSource`]. `None` answers with HTTP 503.
#[derive(Debug, Default)]
pub struct Served {
    pub archive: Option<Vec<u8>>,
    pub vehicles: Option<Vec<u8>>,
    pub trip_updates: Option<Vec<u8>>,
    pub archive_calls: usize,
    pub requested_dates: Vec<NaiveDate>,
    pub discarded_dates: Vec<NaiveDate>,
    pub vehicle_calls: usize,
    pub trip_update_calls: usize,
}

#[derive(Debug, Clone, Default)]
pub struct FakeSource {
    pub served: Arc<Mutex<Served>>,
}

fn unavailable(what: &str) -> FetchError {
    FetchError::Status {
        url: format!("fake://{}", what),
        status: 503,
    }
}

impl TransitSource for FakeSource {
    fn fetch_archive(&self, service_date: NaiveDate) -> Result<Bytes, FetchError> {
        let mut served = self.served.lock().unwrap();
        served.archive_calls += 1;
        served.requested_dates.push(service_date);
        served
            .archive
            .clone()
            .map(Bytes::from)
            .ok_or_else(|| unavailable("archive"))
    }

    fn fetch_vehicle_positions(&self) -> Result<Bytes, FetchError> {
        let mut served = self.served.lock().unwrap();
        served.vehicle_calls += 1;
        served
            .vehicles
            .clone()
            .map(Bytes::from)
            .ok_or_else(|| unavailable("vehicles"))
    }

    fn fetch_trip_updates(&self) -> Result<Bytes, FetchError> {
        let mut served = self.served.lock().unwrap();
        served.trip_update_calls += 1;
        served
            .trip_updates
            .clone()
            .map(Bytes::from)
            .ok_or_else(|| unavailable("trip updates"))
    }

    fn discard_archive(&self, service_date: NaiveDate) {
        self.served.lock().unwrap().discarded_dates.push(service_date);
    }
}

/// Scheduler over a fake source already serving the full archive and one
/// delayed vehicle reported at `reported`.
pub fn scheduler_with_data(reported: DateTime<Utc>) -> (RefreshScheduler, FakeSource) {
    let source = FakeSource::default();
    {
        let mut served = source.served.lock().unwrap();
        served.archive = Some(full_archive());
        served.vehicles = Some(vehicle_feed(reported));
        served.trip_updates = Some(trip_update_feed(400));
    }
    let scheduler = RefreshScheduler::new(
        Config::default().without_disk_cache(),
        Box::new(source.clone()),
    )
    .unwrap();
    (scheduler, source)
}
