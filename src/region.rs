use std::fmt::Display;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Region {
    Brisbane,
    #[serde(rename = "Gold Coast")]
    GoldCoast,
    #[serde(rename = "Sunshine Coast")]
    SunshineCoast,
    Other,
}

impl Region {
    pub fn label(&self) -> &'static str {
        match self {
            Region::Brisbane => "Brisbane",
            Region::GoldCoast => "Gold Coast",
            Region::SunshineCoast => "Sunshine Coast",
            Region::Other => "Other",
        }
    }
}

impl Display for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Latitude is half-open `[south, north)` and the latitude bands of the three
/// boxes do not overlap, so at most one box can match any point.
struct BoundingBox {
    region: Region,
    south: f64,
    north: f64,
    west: f64,
    east: f64,
}

impl BoundingBox {
    fn contains(&self, lat: f64, lon: f64) -> bool {
        lat >= self.south && lat < self.north && lon >= self.west && lon <= self.east
    }
}

const REGION_BOXES: [BoundingBox; 3] = [
    BoundingBox {
        region: Region::SunshineCoast,
        south: -26.95,
        north: -26.30,
        west: 152.75,
        east: 153.25,
    },
    BoundingBox {
        region: Region::Brisbane,
        south: -27.75,
        north: -26.95,
        west: 152.65,
        east: 153.35,
    },
    BoundingBox {
        region: Region::GoldCoast,
        south: -28.30,
        north: -27.75,
        west: 153.10,
        east: 153.60,
    },
];

/// Classify a coordinate into its region. Total: anything outside the boxes
/// (including NaN) is `Other`.
pub fn classify_region(lat: f64, lon: f64) -> Region {
    REGION_BOXES
        .iter()
        .find(|b| b.contains(lat, lon))
        .map(|b| b.region)
        .unwrap_or(Region::Other)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_known_places() {
        assert_eq!(classify_region(-27.4698, 153.0251), Region::Brisbane);
        assert_eq!(classify_region(-28.0, 153.4), Region::GoldCoast);
        assert_eq!(classify_region(-26.65, 153.07), Region::SunshineCoast);
        assert_eq!(classify_region(-33.8688, 151.2093), Region::Other);
    }

    #[test]
    fn nan_is_other() {
        assert_eq!(classify_region(f64::NAN, 153.0), Region::Other);
        assert_eq!(classify_region(-27.5, f64::NAN), Region::Other);
    }

    #[test]
    fn boxes_are_mutually_exclusive() {
        let mut lat = -28.5;
        while lat <= -26.0 {
            let mut lon = 152.5;
            while lon <= 153.8 {
                let hits = REGION_BOXES.iter().filter(|b| b.contains(lat, lon)).count();
                assert!(hits <= 1, "({}, {}) is in {} boxes", lat, lon, hits);
                lon += 0.01;
            }
            lat += 0.01;
        }
    }

    #[test]
    fn shared_latitude_edges_resolve_to_one_region() {
        assert_eq!(classify_region(-26.95, 153.0), Region::SunshineCoast);
        assert_eq!(classify_region(-27.75, 153.2), Region::Brisbane);
    }
}
