use std::collections::HashMap;

use log::{info, warn};

use crate::extractor::{Row, Table};
use crate::models::StopRecord;
use crate::region::classify_region;
use crate::time::ServiceTime;

/// First row per key value. GTFS keys are unique in trips/routes/stops, so a
/// repeated key keeps the earliest row rather than fanning out the join.
fn index_by<'a>(table: &'a Table, key: &str) -> HashMap<&'a str, Row<'a>> {
    let mut index = HashMap::with_capacity(table.len());
    for row in table.rows() {
        if let Some(k) = row.get(key) {
            index.entry(k).or_insert(row);
        }
    }
    index
}

fn parse_coordinate(value: Option<&str>) -> Option<f64> {
    value
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

fn owned(value: Option<&str>) -> Option<String> {
    value.filter(|v| !v.is_empty()).map(str::to_string)
}

/// Denormalize stop_times with trips, routes and stops.
///
/// stop_times ⟕ trips (trip_id) ⟕ routes (route_id) ⟕ stops (stop_id). Every
/// stop_times row survives; failed lookups leave the joined fields empty.
/// Returns nothing unless all four tables have rows.
pub fn enrich(stop_times: &Table, trips: &Table, routes: &Table, stops: &Table) -> Vec<StopRecord> {
    if stop_times.is_empty() || trips.is_empty() || routes.is_empty() || stops.is_empty() {
        warn!("Enrichment needs stop_times, trips, routes and stops; at least one is empty");
        return Vec::new();
    }

    let trips_by_id = index_by(trips, "trip_id");
    let routes_by_id = index_by(routes, "route_id");
    let stops_by_id = index_by(stops, "stop_id");

    let mut unclassified = 0usize;
    let records: Vec<StopRecord> = stop_times
        .rows()
        .map(|stop_time| {
            let trip_id = stop_time.get("trip_id").unwrap_or_default();
            let stop_id = stop_time.get("stop_id").unwrap_or_default();

            let trip = trips_by_id.get(trip_id);
            let route_id = trip.and_then(|t| t.value("route_id"));
            let route = route_id.and_then(|id| routes_by_id.get(id));
            let stop = stops_by_id.get(stop_id);

            let stop_lat = parse_coordinate(stop.and_then(|s| s.get("stop_lat")));
            let stop_lon = parse_coordinate(stop.and_then(|s| s.get("stop_lon")));
            let region = match (stop_lat, stop_lon) {
                (Some(lat), Some(lon)) => Some(classify_region(lat, lon)),
                _ => {
                    unclassified += 1;
                    None
                }
            };

            StopRecord {
                stop_id: stop_id.to_string(),
                trip_id: trip_id.to_string(),
                route_id: owned(route_id),
                direction_id: owned(trip.and_then(|t| t.get("direction_id"))),
                arrival_time: stop_time.get("arrival_time").and_then(ServiceTime::parse),
                departure_time: stop_time.get("departure_time").and_then(ServiceTime::parse),
                stop_sequence: stop_time
                    .get("stop_sequence")
                    .and_then(|s| s.trim().parse().ok()),
                stop_name: owned(stop.and_then(|s| s.get("stop_name"))),
                stop_lat,
                stop_lon,
                route_short_name: owned(route.and_then(|r| r.get("route_short_name"))),
                region,
            }
        })
        .collect();

    if unclassified > 0 {
        warn!(
            "{} stop visits have missing or non-numeric coordinates and no region",
            unclassified
        );
    }
    info!("Enriched {} scheduled stop visits", records.len());
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::Region;

    fn stop_times() -> Table {
        Table::from_rows(
            &["trip_id", "arrival_time", "departure_time", "stop_id", "stop_sequence"],
            &[
                &["T1", "08:00:00", "08:00:30", "S1", "1"],
                &["T1", "25:10:00", "25:10:00", "S2", "2"],
                &["T9", "09:00:00", "09:00:00", "S404", "1"],
            ],
        )
    }

    fn trips() -> Table {
        Table::from_rows(
            &["route_id", "service_id", "trip_id", "direction_id", "shape_id"],
            &[&["R1", "WD", "T1", "0", "SH1"]],
        )
    }

    fn routes() -> Table {
        Table::from_rows(&["route_id", "route_short_name"], &[&["R1", "777"]])
    }

    fn stops() -> Table {
        Table::from_rows(
            &["stop_id", "stop_name", "stop_lat", "stop_lon"],
            &[
                &["S1", "Broadbeach", "-28.0", "153.4"],
                &["S2", "Bad Coords", "north", "153.0"],
            ],
        )
    }

    #[test]
    fn single_row_example() {
        let st = Table::from_rows(
            &["trip_id", "stop_id", "arrival_time", "stop_sequence"],
            &[&["T1", "S1", "08:00:00", "1"]],
        );
        let records = enrich(&st, &trips(), &routes(), &stops());

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].route_short_name.as_deref(), Some("777"));
        assert_eq!(records[0].region, Some(Region::GoldCoast));
        assert_eq!(records[0].arrival_time, ServiceTime::parse("08:00:00"));
        assert_eq!(records[0].stop_sequence, Some(1));
    }

    #[test]
    fn left_join_keeps_every_stop_time() {
        let records = enrich(&stop_times(), &trips(), &routes(), &stops());
        assert_eq!(records.len(), 3);

        let orphan = &records[2];
        assert_eq!(orphan.trip_id, "T9");
        assert_eq!(orphan.route_id, None);
        assert_eq!(orphan.route_short_name, None);
        assert_eq!(orphan.stop_name, None);
        assert_eq!(orphan.region, None);
    }

    #[test]
    fn bad_coordinates_flag_only_that_row() {
        let records = enrich(&stop_times(), &trips(), &routes(), &stops());
        assert_eq!(records[1].stop_name.as_deref(), Some("Bad Coords"));
        assert_eq!(records[1].stop_lat, None);
        assert_eq!(records[1].region, None);
        assert_eq!(records[0].region, Some(Region::GoldCoast));
    }

    #[test]
    fn keeps_times_past_midnight() {
        let records = enrich(&stop_times(), &trips(), &routes(), &stops());
        assert_eq!(records[1].arrival_time.unwrap().as_seconds(), 25 * 3600 + 600);
    }

    #[test]
    fn any_empty_input_gives_empty_output() {
        let empty = Table::default();
        let inputs = [stop_times(), trips(), routes(), stops()];

        for mask in 0u8..16 {
            let pick = |i: usize| if mask & (1 << i) != 0 { &empty } else { &inputs[i] };
            let records = enrich(pick(0), pick(1), pick(2), pick(3));
            if mask == 0 {
                assert!(!records.is_empty());
            } else {
                assert!(records.is_empty(), "mask {:04b} should be empty", mask);
            }
        }
    }
}
