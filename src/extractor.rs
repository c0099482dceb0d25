// Tabular files out of the GTFS zip.
//
// Every cell stays a raw string; numeric conversion is the caller's job.

use std::collections::HashMap;
use std::io::{Cursor, Read};

use bytes::Bytes;
use log::{debug, info, warn};
use zip::ZipArchive;
use zip::result::ZipError;

use crate::error::ExtractError;

pub type GtfsArchive = ZipArchive<Cursor<Bytes>>;

pub const ROUTES_FILE: &str = "routes.txt";
pub const STOPS_FILE: &str = "stops.txt";
pub const TRIPS_FILE: &str = "trips.txt";
pub const STOP_TIMES_FILE: &str = "stop_times.txt";
pub const SHAPES_FILE: &str = "shapes.txt";

/// String-typed rows addressed by header name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    headers: Vec<String>,
    index: HashMap<String, usize>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new<H, S>(headers: H, rows: Vec<Vec<String>>) -> Self
    where
        H: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let headers: Vec<String> = headers.into_iter().map(Into::into).collect();
        let index = headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.clone(), i))
            .collect();
        Self {
            headers,
            index,
            rows,
        }
    }

    /// Convenience for building small tables by hand.
    pub fn from_rows(headers: &[&str], rows: &[&[&str]]) -> Self {
        Self::new(
            headers.iter().copied(),
            rows.iter()
                .map(|r| r.iter().map(|c| c.to_string()).collect())
                .collect(),
        )
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn rows(&self) -> impl Iterator<Item = Row<'_>> {
        self.rows.iter().map(move |cells| Row { table: self, cells })
    }

    pub fn row(&self, i: usize) -> Option<Row<'_>> {
        self.rows.get(i).map(|cells| Row { table: self, cells })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    table: &'a Table,
    cells: &'a [String],
}

impl<'a> Row<'a> {
    /// Cell under `column`; `None` if the column is absent or the row is short.
    pub fn get(&self, column: &str) -> Option<&'a str> {
        let i = *self.table.index.get(column)?;
        self.cells.get(i).map(String::as_str)
    }

    /// Like `get`, but an empty cell counts as missing.
    pub fn value(&self, column: &str) -> Option<&'a str> {
        self.get(column).filter(|s| !s.trim().is_empty())
    }
}

pub fn open_archive(archive: Bytes) -> Result<GtfsArchive, ExtractError> {
    Ok(ZipArchive::new(Cursor::new(archive))?)
}

pub fn list_files(archive: &GtfsArchive) -> Vec<String> {
    archive.file_names().map(str::to_string).collect()
}

/// Read `filename` into a table. A missing file yields an empty table.
pub fn extract(archive: &mut GtfsArchive, filename: &str) -> Result<Table, ExtractError> {
    let mut file = match archive.by_name(filename) {
        Ok(file) => file,
        Err(ZipError::FileNotFound) => {
            debug!("{} not present in archive", filename);
            return Ok(Table::default());
        }
        Err(e) => return Err(e.into()),
    };

    let mut contents = Vec::new();
    file.read_to_end(&mut contents)
        .map_err(|e| ExtractError::Csv {
            file: filename.to_string(),
            source: csv::Error::from(e),
        })?;
    drop(file);

    parse_csv(filename, &contents)
}

fn parse_csv(filename: &str, contents: &[u8]) -> Result<Table, ExtractError> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(contents);

    let headers: Vec<String> = rdr
        .headers()
        .map_err(|e| ExtractError::Csv {
            file: filename.to_string(),
            source: e,
        })?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
        .collect();

    let mut rows = Vec::new();
    let mut skipped = 0usize;
    for result in rdr.records() {
        match result {
            Ok(record) => rows.push(record.iter().map(str::to_string).collect()),
            Err(_) => skipped += 1,
        }
    }
    if skipped > 0 {
        warn!("Skipped {} unreadable rows in {}", skipped, filename);
    }

    Ok(Table::new(headers, rows))
}

/// The five tables the reconciliation core consumes.
#[derive(Debug, Clone, Default)]
pub struct GtfsTables {
    pub routes: Table,
    pub stops: Table,
    pub trips: Table,
    pub stop_times: Table,
    pub shapes: Table,
}

impl GtfsTables {
    pub fn extract_all(archive: &mut GtfsArchive) -> Result<Self, ExtractError> {
        let tables = Self {
            routes: extract(archive, ROUTES_FILE)?,
            stops: extract(archive, STOPS_FILE)?,
            trips: extract(archive, TRIPS_FILE)?,
            stop_times: extract(archive, STOP_TIMES_FILE)?,
            shapes: extract(archive, SHAPES_FILE)?,
        };
        info!(
            "Extracted {} routes, {} stops, {} trips, {} stop times, {} shape points",
            tables.routes.len(),
            tables.stops.len(),
            tables.trips.len(),
            tables.stop_times.len(),
            tables.shapes.len()
        );
        Ok(tables)
    }

    /// Names of the tables enrichment needs that came back empty.
    pub fn missing_for_enrichment(&self) -> Vec<&'static str> {
        [
            (STOP_TIMES_FILE, &self.stop_times),
            (TRIPS_FILE, &self.trips),
            (ROUTES_FILE, &self.routes),
            (STOPS_FILE, &self.stops),
        ]
        .into_iter()
        .filter(|(_, table)| table.is_empty())
        .map(|(name, _)| name)
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::FileOptions;

    fn archive_with(files: &[(&str, &str)]) -> GtfsArchive {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, body) in files {
            writer.start_file(*name, FileOptions::default()).unwrap();
            writer.write_all(body.as_bytes()).unwrap();
        }
        let buf = writer.finish().unwrap().into_inner();
        open_archive(Bytes::from(buf)).unwrap()
    }

    #[test]
    fn cells_stay_strings() {
        let mut archive = archive_with(&[(
            "stops.txt",
            "stop_id,stop_lat,stop_lon\n001,-27.50,153.00\n",
        )]);
        let table = extract(&mut archive, "stops.txt").unwrap();
        let row = table.row(0).unwrap();

        assert_eq!(row.get("stop_id"), Some("001"));
        assert_eq!(row.get("stop_lat"), Some("-27.50"));
    }

    #[test]
    fn missing_file_is_empty_table() {
        let mut archive = archive_with(&[("routes.txt", "route_id\nR1\n")]);
        let table = extract(&mut archive, "shapes.txt").unwrap();
        assert!(table.is_empty());
        assert!(table.headers().is_empty());
    }

    #[test]
    fn strips_byte_order_mark_from_header() {
        let mut archive = archive_with(&[("routes.txt", "\u{feff}route_id,route_short_name\nR1,777\n")]);
        let table = extract(&mut archive, "routes.txt").unwrap();
        assert!(table.has_column("route_id"));
        assert_eq!(table.row(0).unwrap().get("route_short_name"), Some("777"));
    }

    #[test]
    fn short_rows_read_as_missing_cells() {
        let mut archive = archive_with(&[("trips.txt", "trip_id,route_id,shape_id\nT1,R1\n")]);
        let table = extract(&mut archive, "trips.txt").unwrap();
        let row = table.row(0).unwrap();
        assert_eq!(row.get("route_id"), Some("R1"));
        assert_eq!(row.get("shape_id"), None);
        assert_eq!(row.get("no_such_column"), None);
    }

    #[test]
    fn lists_archive_members() {
        let archive = archive_with(&[("routes.txt", "route_id\n"), ("stops.txt", "stop_id\n")]);
        let mut files = list_files(&archive);
        files.sort();
        assert_eq!(files, vec!["routes.txt", "stops.txt"]);
    }

    #[test]
    fn non_zip_bytes_are_an_error() {
        assert!(open_archive(Bytes::from_static(b"definitely not a zip")).is_err());
    }

    #[test]
    fn reports_missing_required_tables() {
        let mut archive = archive_with(&[
            ("routes.txt", "route_id\nR1\n"),
            ("stops.txt", "stop_id\nS1\n"),
        ]);
        let tables = GtfsTables::extract_all(&mut archive).unwrap();
        assert_eq!(
            tables.missing_for_enrichment(),
            vec![STOP_TIMES_FILE, TRIPS_FILE]
        );
    }
}
