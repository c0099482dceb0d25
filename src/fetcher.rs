// ============================================================================
// Network access: static archive download and realtime feed download
// ============================================================================

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bytes::Bytes;
use chrono::NaiveDate;
use log::{debug, info, warn};
use reqwest::blocking;

use crate::config::Config;
use crate::error::FetchError;

/// Blocking HTTP GET with a bounded timeout.
pub struct HttpFetcher {
    client: blocking::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;
        Ok(Self { client })
    }

    pub fn get(&self, url: &str) -> Result<Bytes, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| translate(url, e))?;

        if !response.status().is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        response.bytes().map_err(|e| translate(url, e))
    }
}

fn translate(url: &str, e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else {
        FetchError::Transport {
            url: url.to_string(),
            reason: e.to_string(),
        }
    }
}

/// Raw archive bytes on disk, one file per service date.
///
/// A file for the requested date is considered fresh simply because it exists.
pub struct ArchiveCache {
    dir: PathBuf,
}

impl ArchiveCache {
    const PREFIX: &'static str = "gtfs_static_";

    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn path_for(&self, service_date: NaiveDate) -> PathBuf {
        self.dir
            .join(format!("{}{}.zip", Self::PREFIX, service_date.format("%Y%m%d")))
    }

    pub fn load(&self, service_date: NaiveDate) -> Option<Bytes> {
        let path = self.path_for(service_date);
        if !path.exists() {
            debug!("No cached archive at {:?}", path);
            return None;
        }

        match fs::read(&path) {
            Ok(contents) => {
                info!("Using cached GTFS archive {:?} ({} KB)", path, contents.len() / 1024);
                Some(Bytes::from(contents))
            }
            Err(e) => {
                warn!("Failed to read cached archive {:?} ({}), will download", path, e);
                None
            }
        }
    }

    /// Write the archive for `service_date` and drop archives cached for other dates.
    pub fn store(&self, service_date: NaiveDate, archive: &[u8]) -> Result<PathBuf, FetchError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(service_date);
        let tmp = path.with_extension("zip.part");
        fs::write(&tmp, archive)?;
        fs::rename(&tmp, &path)?;

        for entry in fs::read_dir(&self.dir)?.flatten() {
            let entry_path = entry.path();
            let is_old_archive = entry_path != path
                && entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| name.starts_with(Self::PREFIX) && name.ends_with(".zip"));
            if is_old_archive {
                if let Err(e) = fs::remove_file(&entry_path) {
                    warn!("Could not remove stale archive {:?}: {}", entry_path, e);
                }
            }
        }

        info!("GTFS archive cached to {:?}", path);
        Ok(path)
    }

    /// Drop the archive cached for `service_date`, if any.
    pub fn remove(&self, service_date: NaiveDate) {
        let path = self.path_for(service_date);
        match fs::remove_file(&path) {
            Ok(()) => info!("Discarded cached archive {:?}", path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Could not discard cached archive {:?}: {}", path, e),
        }
    }
}

/// Downloads the static archive, going through the disk cache when one is set.
pub struct ArchiveFetcher {
    http: HttpFetcher,
    cache: Option<ArchiveCache>,
}

impl ArchiveFetcher {
    pub fn new(http: HttpFetcher, cache: Option<ArchiveCache>) -> Self {
        Self { http, cache }
    }

    pub fn fetch(&self, url: &str, service_date: NaiveDate) -> Result<Bytes, FetchError> {
        if let Some(cache) = &self.cache {
            if let Some(archive) = cache.load(service_date) {
                return Ok(archive);
            }
        }

        info!("Downloading GTFS archive from {}", url);
        let archive = self.http.get(url)?;
        info!("Downloaded {} KB", archive.len() / 1024);

        if let Some(cache) = &self.cache {
            // A cache write failure must not throw away a good download.
            if let Err(e) = cache.store(service_date, &archive) {
                warn!("Could not save GTFS archive cache: {}", e);
            }
        }

        Ok(archive)
    }

    /// Forget the cached archive for `service_date` so the next fetch downloads again.
    pub fn discard(&self, service_date: NaiveDate) {
        if let Some(cache) = &self.cache {
            cache.remove(service_date);
        }
    }
}

/// Where the scheduler gets its raw bytes from.
pub trait TransitSource: Send {
    /// Static archive in force on `service_date` (service timezone).
    fn fetch_archive(&self, service_date: NaiveDate) -> Result<Bytes, FetchError>;
    fn fetch_vehicle_positions(&self) -> Result<Bytes, FetchError>;
    fn fetch_trip_updates(&self) -> Result<Bytes, FetchError>;

    /// Called when the archive fetched for `service_date` turned out unusable.
    fn discard_archive(&self, _service_date: NaiveDate) {}
}

/// The configured TransLink endpoints over HTTP.
pub struct HttpSource {
    config: Config,
    archive: ArchiveFetcher,
    realtime: HttpFetcher,
}

impl HttpSource {
    pub fn new(config: Config) -> Result<Self, FetchError> {
        let cache = config.cache_dir.as_ref().map(ArchiveCache::new);
        let archive = ArchiveFetcher::new(HttpFetcher::new(config.archive_timeout)?, cache);
        let realtime = HttpFetcher::new(config.request_timeout)?;
        Ok(Self {
            config,
            archive,
            realtime,
        })
    }
}

impl TransitSource for HttpSource {
    fn fetch_archive(&self, service_date: NaiveDate) -> Result<Bytes, FetchError> {
        self.archive.fetch(&self.config.static_url, service_date)
    }

    fn fetch_vehicle_positions(&self) -> Result<Bytes, FetchError> {
        self.realtime.get(&self.config.vehicle_positions_url)
    }

    fn fetch_trip_updates(&self) -> Result<Bytes, FetchError> {
        self.realtime.get(&self.config.trip_updates_url)
    }

    fn discard_archive(&self, service_date: NaiveDate) {
        self.archive.discard(service_date);
    }
}

/// Single-request HTTP responder on a loopback port.
#[cfg(test)]
pub(crate) mod local_server {
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    /// Answer the first request with `status` (e.g. "503 Service Unavailable")
    /// and `body`; returns the URL to request.
    pub fn respond_once(status: &'static str, body: Vec<u8>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let mut request = [0u8; 2048];
                let _ = stream.read(&mut request);
                let head = format!(
                    "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    status,
                    body.len()
                );
                let _ = stream.write_all(head.as_bytes());
                let _ = stream.write_all(&body);
                let _ = stream.flush();
            }
        });
        format!("http://{}/feed", addr)
    }
}
