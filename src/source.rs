//! Feed sources: where policy feeds come from.
//!
//! A source returns the raw feed for one reload cycle. Local files are
//! read whole on every fetch; HTTP sources send `If-None-Match` with the
//! last ETag so an unchanged upstream costs a 304 and nothing else. Both
//! accept gzip-compressed feeds.

use flate2::read::GzDecoder;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Outcome of one fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedFetch {
    /// New feed contents, already decompressed
    Data(Vec<u8>),
    /// Upstream reports no change since the last fetch
    NotModified,
}

/// FeedSource produces a feed for each reload cycle.
pub trait FeedSource: Send {
    /// Fetch the current feed.
    fn fetch(&mut self) -> Result<FeedFetch>;

    /// Human-readable location for logs.
    fn describe(&self) -> String;
}

/// Open a source for `location`: `http://` and `https://` URLs become
/// [`HttpSource`], anything else is a file path.
pub fn open_source(location: &str, timeout: Duration) -> Box<dyn FeedSource> {
    if location.starts_with("http://") || location.starts_with("https://") {
        Box::new(HttpSource::new(location).with_timeout(timeout))
    } else {
        Box::new(FileSource::new(location))
    }
}

/// Check if data is gzip compressed.
pub fn is_gzip(data: &[u8]) -> bool {
    data.len() >= 2 && data[0] == 0x1f && data[1] == 0x8b
}

/// Decompress `raw` if it carries the gzip magic, otherwise return it as is.
pub fn decode_feed(raw: Vec<u8>) -> Result<Vec<u8>> {
    if !is_gzip(&raw) {
        return Ok(raw);
    }

    let mut decoder = GzDecoder::new(&raw[..]);
    let mut data = Vec::new();
    decoder.read_to_end(&mut data)?;
    log::debug!(
        "Decompressed feed: {} bytes (compressed: {} bytes)",
        data.len(),
        raw.len()
    );
    Ok(data)
}

/// A feed stored on the local filesystem.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FeedSource for FileSource {
    fn fetch(&mut self) -> Result<FeedFetch> {
        let raw = fs::read(&self.path)?;
        Ok(FeedFetch::Data(decode_feed(raw)?))
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// A feed served over HTTP(S).
pub struct HttpSource {
    url: String,
    agent: ureq::Agent,
    /// ETag from the last successful download
    etag: Option<String>,
}

impl HttpSource {
    /// Default request timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            agent: Self::agent(Self::DEFAULT_TIMEOUT),
            etag: None,
        }
    }

    /// Set a custom request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = Self::agent(timeout);
        self
    }

    fn agent(timeout: Duration) -> ureq::Agent {
        ureq::AgentBuilder::new().timeout(timeout).build()
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Get the current ETag (if any).
    pub fn etag(&self) -> Option<&str> {
        self.etag.as_deref()
    }
}

impl FeedSource for HttpSource {
    fn fetch(&mut self) -> Result<FeedFetch> {
        let mut request = self.agent.get(&self.url);
        if let Some(ref etag) = self.etag {
            request = request.set("If-None-Match", etag);
        }

        let response = match request.call() {
            Ok(response) => response,
            Err(ureq::Error::Status(304, _)) => return Ok(FeedFetch::NotModified),
            Err(ureq::Error::Status(code, _)) => {
                return Err(Error::Download(format!("{}: HTTP error: {}", self.url, code)))
            }
            Err(ureq::Error::Transport(t)) => {
                return Err(Error::Download(format!("{}: transport error: {}", self.url, t)))
            }
        };

        if response.status() == 304 {
            log::debug!("Feed not modified (304)");
            return Ok(FeedFetch::NotModified);
        }

        let etag = response.header("ETag").map(str::to_string);

        let mut raw = Vec::new();
        response
            .into_reader()
            .read_to_end(&mut raw)
            .map_err(|e| Error::Download(format!("failed to read response: {}", e)))?;
        let data = decode_feed(raw)?;

        // Only remember the ETag once the body is safely in hand.
        if etag.is_some() {
            self.etag = etag;
        }
        log::info!("Downloaded feed from {}: {} bytes", self.url, data.len());
        Ok(FeedFetch::Data(data))
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}
