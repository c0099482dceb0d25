use std::collections::{HashMap, HashSet};

use log::debug;

use crate::extractor::Table;
use crate::models::{Segment, ShapePoint};

/// Distinct shape ids used by trips on `route_id` in `direction`, in first-seen order.
///
/// `direction` is compared as text against trips.direction_id.
pub fn shape_ids_for(route_id: &str, direction: &str, trips: &Table) -> Vec<String> {
    let mut seen = HashSet::new();
    trips
        .rows()
        .filter(|t| t.get("route_id") == Some(route_id))
        .filter(|t| t.get("direction_id").map(str::trim) == Some(direction.trim()))
        .filter_map(|t| t.value("shape_id"))
        .filter(|id| seen.insert(*id))
        .map(str::to_string)
        .collect()
}

/// Points of each requested shape, sorted by sequence. Rows whose sequence or
/// coordinates do not parse are dropped.
pub fn shape_points(shape_ids: &[String], shapes: &Table) -> HashMap<String, Vec<ShapePoint>> {
    let wanted: HashSet<&str> = shape_ids.iter().map(String::as_str).collect();
    let mut points: HashMap<String, Vec<ShapePoint>> = HashMap::new();

    for row in shapes.rows() {
        let Some(shape_id) = row.get("shape_id").filter(|id| wanted.contains(id)) else {
            continue;
        };
        let parsed = (
            row.get("shape_pt_sequence").and_then(|s| s.trim().parse::<i64>().ok()),
            row.get("shape_pt_lat").and_then(|s| s.trim().parse::<f64>().ok()),
            row.get("shape_pt_lon").and_then(|s| s.trim().parse::<f64>().ok()),
        );
        if let (Some(sequence), Some(latitude), Some(longitude)) = parsed {
            points
                .entry(shape_id.to_string())
                .or_default()
                .push(ShapePoint {
                    shape_id: shape_id.to_string(),
                    sequence,
                    latitude,
                    longitude,
                });
        }
    }

    for pts in points.values_mut() {
        pts.sort_by_key(|p| p.sequence);
    }
    points
}

/// Consecutive-pair segments of one already sorted shape.
pub fn segments_of(points: &[ShapePoint]) -> Vec<Segment> {
    points
        .windows(2)
        .map(|pair| Segment {
            shape_id: pair[0].shape_id.clone(),
            start: pair[0].coordinate(),
            end: pair[1].coordinate(),
        })
        .collect()
}

/// Polyline segments for a route and direction, shape by shape.
///
/// Segments never join the last point of one shape to the first of the next.
/// No matching shape gives an empty result.
pub fn resolve(route_id: &str, direction: &str, trips: &Table, shapes: &Table) -> Vec<Segment> {
    let shape_ids = shape_ids_for(route_id, direction, trips);
    if shape_ids.is_empty() {
        debug!("No shapes for route {} direction {}", route_id, direction);
        return Vec::new();
    }

    let points = shape_points(&shape_ids, shapes);
    let segments: Vec<Segment> = shape_ids
        .iter()
        .filter_map(|id| points.get(id))
        .flat_map(|pts| segments_of(pts))
        .collect();

    debug!(
        "Route {} direction {}: {} shapes, {} segments",
        route_id,
        direction,
        shape_ids.len(),
        segments.len()
    );
    segments
}
