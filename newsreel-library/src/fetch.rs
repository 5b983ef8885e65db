//! Fetching media bytes from paths and URLs

use crate::http::HttpClient;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },
    #[error("Unsupported location: {0}")]
    UnsupportedScheme(String),
}

/// Read a local path, `file://` URL, or `http(s)://` URL
pub fn fetch_bytes(location: &str, client: &HttpClient) -> Result<Vec<u8>, FetchError> {
    if location.starts_with("http://") || location.starts_with("https://") {
        let response = client.get(location)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: location.to_string(),
                status: status.as_u16(),
            });
        }
        let bytes = response.bytes()?;
        tracing::debug!(url = location, bytes = bytes.len(), "Fetched remote media");
        return Ok(bytes.to_vec());
    }

    let path = match location.strip_prefix("file://") {
        Some(path) => PathBuf::from(path),
        None if location.contains("://") => {
            return Err(FetchError::UnsupportedScheme(location.to_string()))
        }
        None => PathBuf::from(location),
    };
    std::fs::read(&path).map_err(|source| FetchError::Io { path, source })
}

/// File extension of a location, ignoring any query string
pub fn extension_of(location: &str) -> Option<&str> {
    let without_query = location.split(['?', '#']).next().unwrap_or(location);
    Path::new(without_query)
        .extension()
        .and_then(|e| e.to_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_plain_path_and_file_url() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.wav");
        std::fs::write(&path, b"abc").unwrap();

        let client = HttpClient::new().unwrap();
        let plain = fetch_bytes(path.to_str().unwrap(), &client).unwrap();
        let url = format!("file://{}", path.display());
        let via_url = fetch_bytes(&url, &client).unwrap();

        assert_eq!(plain, b"abc");
        assert_eq!(via_url, b"abc");
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let client = HttpClient::new().unwrap();
        let result = fetch_bytes("/definitely/not/here.mp3", &client);
        assert!(matches!(result, Err(FetchError::Io { .. })));
    }

    #[test]
    fn test_unknown_scheme_is_rejected() {
        let client = HttpClient::new().unwrap();
        let result = fetch_bytes("ftp://example.com/a.mp3", &client);
        assert!(matches!(result, Err(FetchError::UnsupportedScheme(_))));
    }

    #[test]
    fn test_extension_ignores_query() {
        assert_eq!(extension_of("https://cdn/x/story.mp3?token=1"), Some("mp3"));
        assert_eq!(extension_of("/tmp/a.wav"), Some("wav"));
        assert_eq!(extension_of("noext"), None);
    }
}
