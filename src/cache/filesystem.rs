use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

use flate2::bufread::GzDecoder;

use crate::cache::{Cache, StoragePolicy};
use crate::http::{Headers, RequestDescriptor};
use crate::io::HttpResponse;

use crate::config::ConfigProperties;

use crate::error::{self, CdaError};
use crate::Result;

use flate2::write::GzEncoder;
use flate2::Compression;

/// Disk backed response store. Each entry is a gzip compressed record named
/// after the descriptor's cache key, holding headers, status and body. The
/// store keeps itself below the configured disk budget by dropping the
/// oldest records first.
pub struct FileCache {
    config: Arc<dyn ConfigProperties>,
}

impl FileCache {
    pub fn new(config: Arc<dyn ConfigProperties>) -> Self {
        FileCache { config }
    }

    pub fn validate_cache_location(&self) -> Result<()> {
        let cache_location = self.config.cache_location().ok_or_else(|| {
            CdaError::Configuration("No cache location configured".to_string())
        })?;

        let path = Path::new(cache_location);

        if !path.exists() {
            return Err(CdaError::Configuration(format!(
                "Cache directory does not exist: {cache_location}"
            ))
            .into());
        }

        if !path.is_dir() {
            return Err(CdaError::Configuration(format!(
                "Cache location is not a directory: {cache_location}"
            ))
            .into());
        }

        // Check if we can write to the directory
        let test_file_path = path.join(".write_test_cache_file");
        match File::create(&test_file_path) {
            Ok(_) => {
                if let Err(e) = fs::remove_file(&test_file_path) {
                    return Err(CdaError::Configuration(format!(
                        "Failed to remove cache test file {}: {}",
                        test_file_path.to_string_lossy(),
                        e
                    ))
                    .into());
                }
            }
            Err(e) => {
                return Err(CdaError::Configuration(format!(
                    "No write permission for cache directory {cache_location}: {e}"
                ))
                .into());
            }
        }
        Ok(())
    }

    pub fn get_cache_file(&self, key: &RequestDescriptor) -> Result<String> {
        let cache_location = self.config.cache_location().ok_or_else(|| {
            CdaError::Configuration("No cache location configured".to_string())
        })?;
        let location = cache_location.strip_suffix('/').unwrap_or(cache_location);
        Ok(format!("{location}/{}", key.cache_key()))
    }

    fn get_cache_data(&self, mut reader: impl BufRead) -> Result<HttpResponse> {
        let decompressed_data = GzDecoder::new(&mut reader);
        let mut reader = BufReader::new(decompressed_data);
        let mut headers = String::new();
        reader.read_line(&mut headers)?;
        let mut status_code = String::new();
        reader.read_line(&mut status_code)?;
        let status_code = status_code.trim();
        let status_code = match status_code.parse::<i32>() {
            Ok(value) => value,
            Err(err) => {
                // parse error in here could be hard to find/debug. Send a
                // clear error trace over to the client.
                let trace =
                    format!("Could not parse the response status code from cache {err}");
                return Err(error::gen(trace));
            }
        };
        let mut body = Vec::new();
        reader.read_to_end(&mut body)?;
        let body = String::from_utf8(body)?.trim().to_string();
        let headers_map = serde_json::from_str::<Headers>(&headers)?;
        let response = HttpResponse::builder()
            .status(status_code)
            .body(body)
            .headers(headers_map)
            .build()?;
        Ok(response)
    }

    fn persist_cache_data(&self, value: &HttpResponse, f: BufWriter<File>) -> Result<()> {
        let headers_map = value.headers.clone().unwrap_or_default();
        let headers = serde_json::to_string(&headers_map)?;
        let status = value.status.to_string();
        let file_data = format!("{}\n{}\n{}", headers, status, value.body);
        let mut encoder = GzEncoder::new(f, Compression::default());
        encoder.write_all(file_data.as_bytes())?;
        Ok(())
    }

    /// Drops oldest records first until the store fits the disk budget.
    /// Best effort: unreadable entries are skipped, removal errors logged.
    fn enforce_disk_budget(&self) -> Result<()> {
        let cache_location = match self.config.cache_location() {
            Some(location) => location.to_string(),
            None => return Ok(()),
        };
        let budget = self.config.cache_disk_bytes();
        let mut records: Vec<(std::path::PathBuf, u64, SystemTime)> = Vec::new();
        let mut total: u64 = 0;
        for entry in fs::read_dir(&cache_location)? {
            let entry = entry?;
            let metadata = match entry.metadata() {
                Ok(metadata) if metadata.is_file() => metadata,
                _ => continue,
            };
            let mtime = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            total += metadata.len();
            records.push((entry.path(), metadata.len(), mtime));
        }
        if total <= budget {
            return Ok(());
        }
        records.sort_by_key(|(_, _, mtime)| *mtime);
        for (path, size, _) in records {
            if total <= budget {
                break;
            }
            match fs::remove_file(&path) {
                Ok(()) => {
                    total -= size;
                    debug!("disk cache evicted {}", path.to_string_lossy());
                }
                Err(err) => {
                    debug!(
                        "disk cache could not evict {}: {}",
                        path.to_string_lossy(),
                        err
                    );
                }
            }
        }
        Ok(())
    }
}

impl Cache for FileCache {
    fn lookup(&self, key: &RequestDescriptor) -> Result<Option<HttpResponse>> {
        let path = self.get_cache_file(key)?;
        if let Ok(f) = File::open(&path) {
            let mut f = BufReader::new(f);
            let response = self.get_cache_data(&mut f)?;
            return Ok(Some(response));
        }
        Ok(None)
    }

    fn store(&self, key: &RequestDescriptor, value: &HttpResponse) -> Result<()> {
        if !StoragePolicy::for_response(value).allowed() {
            return Ok(());
        }
        let path = self.get_cache_file(key)?;
        let f = File::create(path)?;
        let f = BufWriter::new(f);
        self.persist_cache_data(value, f)?;
        // Best effort. The record is already persisted, a failed budget
        // sweep must not fail the store.
        if let Err(err) = self.enforce_disk_budget() {
            debug!("disk cache budget enforcement failed: {}", err);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Method;

    struct ConfigMock;

    impl ConfigMock {
        fn new() -> Self {
            ConfigMock {}
        }
    }

    impl ConfigProperties for ConfigMock {
        fn api_key(&self) -> &str {
            "blt1234"
        }
        fn delivery_token(&self) -> &str {
            "cs1234"
        }
        fn environment(&self) -> &str {
            "production"
        }
        fn cache_location(&self) -> Option<&str> {
            // trailing slash gets stripped when building record paths
            Some("/home/user/.cache/")
        }
    }

    #[test]
    fn test_get_cache_file_under_location() {
        let config = ConfigMock::new();
        let file_cache = FileCache::new(Arc::new(config));
        let key = RequestDescriptor::new(
            Method::GET,
            "https://cdn.example.io/v3/content_types",
            Headers::new(),
        );
        let cache_file = file_cache.get_cache_file(&key).unwrap();
        assert_eq!(
            format!("/home/user/.cache/{}", key.cache_key()),
            cache_file
        );
    }

    #[test]
    fn test_get_cache_data_round_trip_format() {
        let cached_data = "{\"content-type\":\"application/json\"}\n\
            200\n\
            {\"entries\":[{\"uid\":\"blt111\",\"title\":\"first\"}]}";
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(cached_data.as_bytes()).unwrap();
        let reader = std::io::Cursor::new(enc.finish().unwrap());
        let fc = FileCache::new(Arc::new(ConfigMock::new()));
        let response = fc.get_cache_data(reader).unwrap();

        assert_eq!(200, response.status);
        assert_eq!(
            "application/json",
            response.headers.as_ref().unwrap().get("content-type").unwrap()
        );
        assert_eq!(
            "{\"entries\":[{\"uid\":\"blt111\",\"title\":\"first\"}]}",
            response.body
        );
    }

    #[test]
    fn test_get_cache_data_bad_status_line_is_error() {
        let cached_data = "{}\nnot-a-status\nbody";
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(cached_data.as_bytes()).unwrap();
        let reader = std::io::Cursor::new(enc.finish().unwrap());
        let fc = FileCache::new(Arc::new(ConfigMock::new()));
        assert!(fc.get_cache_data(reader).is_err());
    }
}
