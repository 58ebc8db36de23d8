use super::range::RangeReader;
use super::retry::RetryPolicy;
use super::{extract_xml, DirectoryFetcher, DocumentFetcher, FetchError, XmlPayload};
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::io::{self, BufReader, Cursor};
use zip::result::ZipError;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// How archive bytes are pulled from the server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchMode {
    /// Download the whole ZIP before opening it.
    #[default]
    Whole,
    /// Read only the parts of the ZIP the archive reader asks for.
    Range,
}

#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub base_url: String,
    pub user_agent: String,
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub retry: RetryPolicy,
    pub fetch_mode: FetchMode,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            base_url: "http://openhelsinki.hel.fi".to_string(),
            user_agent: concat!("decisions-importer/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
            retry: RetryPolicy::default(),
            fetch_mode: FetchMode::Whole,
        }
    }
}

/// The archive server over blocking HTTP.
#[derive(Debug, Clone)]
pub struct HttpArchive {
    client: Client,
    config: HttpConfig,
}

impl HttpArchive {
    pub fn new(config: HttpConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|source| FetchError::Http {
                url: config.base_url.clone(),
                source,
            })?;
        Ok(Self { client, config })
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    pub fn url_for(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    /// GETs `url` with retries on transport failures, 429 and 5xx.
    fn get_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let start = Instant::now();
        let body = self.config.retry.run(
            || {
                let response = self.client.get(url).send().map_err(|source| FetchError::Http {
                    url: url.to_string(),
                    source,
                })?;
                let status = response.status();
                if status != StatusCode::OK {
                    return Err(FetchError::Status {
                        url: url.to_string(),
                        status: status.as_u16(),
                    });
                }
                response
                    .bytes()
                    .map(|bytes| bytes.to_vec())
                    .map_err(|source| FetchError::Http {
                        url: url.to_string(),
                        source,
                    })
            },
            |err| {
                let retry = is_transient(err);
                if retry {
                    warn!(url, error = %err, "transient fetch failure, retrying");
                }
                retry
            },
        )?;
        debug!(url, bytes = body.len(), elapsed_ms = start.elapsed().as_millis() as u64, "fetched");
        Ok(body)
    }
}

pub(super) fn is_transient(err: &FetchError) -> bool {
    match err {
        FetchError::Http { source, .. } => source.is_timeout() || source.is_connect() || source.is_request(),
        FetchError::Status { status, .. } => *status == 429 || (500..600).contains(status),
        _ => false,
    }
}

/// Takes back a `FetchError` raised inside `RangeReader` and carried out of the
/// ZIP reader as an `io::Error`.
fn surface_range_error(err: FetchError) -> FetchError {
    match err {
        FetchError::Zip {
            url,
            source: ZipError::Io(io),
        } => fetch_error_in(io).unwrap_or_else(|io| FetchError::Zip {
            url,
            source: ZipError::Io(io),
        }),
        FetchError::Io { url, source } => {
            fetch_error_in(source).unwrap_or_else(|source| FetchError::Io { url, source })
        }
        other => other,
    }
}

fn fetch_error_in(err: io::Error) -> Result<FetchError, io::Error> {
    if !err.get_ref().is_some_and(|inner| inner.is::<FetchError>()) {
        return Err(err);
    }
    let kind = err.kind();
    match err.into_inner().map(|inner| inner.downcast::<FetchError>()) {
        Some(Ok(fetch)) => Ok(*fetch),
        Some(Err(inner)) => Err(io::Error::new(kind, inner)),
        None => Err(kind.into()),
    }
}

impl DirectoryFetcher for HttpArchive {
    fn fetch_listing(&self, path: &str) -> Result<Vec<u8>, FetchError> {
        self.get_bytes(&self.url_for(path))
    }
}

impl DocumentFetcher for HttpArchive {
    fn open_remote_xml(&self, url: &str) -> Result<XmlPayload, FetchError> {
        match self.config.fetch_mode {
            FetchMode::Whole => {
                let bytes = self.get_bytes(url)?;
                extract_xml(url, Cursor::new(bytes))
            }
            FetchMode::Range => {
                let reader = RangeReader::new(self.client.clone(), url, self.config.retry.clone());
                extract_xml(url, BufReader::with_capacity(64 * 1024, reader)).map_err(surface_range_error)
            }
        }
    }
}
