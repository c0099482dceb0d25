//! Reconciliation core for South East Queensland transit data.
//!
//! Static schedule: archive download, table extraction, enrichment into one
//! stop-visit table, and route shape resolution. Realtime: GTFS-RT vehicle
//! position and trip update decoding, merging, and delay derivation. A
//! [`RefreshScheduler`] decides when each source is fetched again and owns the
//! snapshot the query entry points read from.

pub mod config;
pub mod delay;
pub mod enricher;
pub mod error;
pub mod extractor;
pub mod fetcher;
pub mod models;
pub mod realtime;
pub mod region;
pub mod scheduler;
pub mod shapes;
pub mod time;

pub use config::Config;
pub use error::{ConfigError, Error, ExtractError, FeedError, FetchError, Result};
pub use models::{
    Coordinate, DelayStatus, MergedVehicle, MergedVehicles, ScheduleDelay, Segment, ShapePoint,
    StopRecord, TripUpdate, VehiclePosition, VehicleStopStatus,
};
pub use region::{Region, classify_region};
pub use scheduler::{Feed, Freshness, PollReport, RefreshOutcome, RefreshScheduler, Snapshot};
pub use time::ServiceTime;
