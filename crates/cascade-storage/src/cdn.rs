//! Blocking CDN client
//!
//! CDN URLs follow `{scheme}://{host}/{path}/{data|config}/{ab}/{cd}/{name}`,
//! where `ab` and `cd` are the first two byte pairs of the hex name. Archive
//! indices use the archive name with an `.index` suffix.

use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::RANGE;
use std::time::Duration;
use tracing::{debug, trace, warn};

use crate::config::StorageConfig;
use crate::error::{Result, StorageError};
use crate::retry::RetryPolicy;

/// CDN directory a resource lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CdnKind {
    /// Archives, archive indices and loose files
    Data,
    /// Build and CDN configs
    Config,
}

impl CdnKind {
    /// Directory name under the CDN path
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Data => "data",
            Self::Config => "config",
        }
    }
}

/// CDN client trying hosts in order with per-host retries
#[derive(Debug, Clone)]
pub struct CdnClient {
    client: Client,
    hosts: Vec<String>,
    path: String,
    scheme: String,
    retry: RetryPolicy,
}

impl CdnClient {
    /// Create a client for the given hosts and path prefix
    pub fn new(
        hosts: Vec<String>,
        path: impl Into<String>,
        retry: RetryPolicy,
        timeout: Duration,
    ) -> Result<Self> {
        let _ = rustls::crypto::ring::default_provider().install_default();

        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            hosts,
            path: path.into().trim_matches('/').to_string(),
            scheme: "http".to_string(),
            retry,
        })
    }

    /// Create a client from storage configuration
    ///
    /// Configured hosts and path take precedence over the `.build.info` values
    /// passed in.
    pub fn from_config(
        config: &StorageConfig,
        fallback_hosts: Vec<String>,
        fallback_path: Option<&str>,
    ) -> Result<Self> {
        let hosts = if config.cdn_hosts.is_empty() {
            fallback_hosts
        } else {
            config.cdn_hosts.clone()
        };
        let path = config
            .cdn_path
            .as_deref()
            .or(fallback_path)
            .ok_or_else(|| StorageError::InvalidConfig("no CDN path configured".to_string()))?;

        Ok(Self::new(hosts, path, config.retry.clone(), config.request_timeout)?
            .with_scheme(config.cdn_scheme.clone()))
    }

    /// Set the URL scheme
    #[must_use]
    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    /// Configured hosts
    pub fn hosts(&self) -> &[String] {
        &self.hosts
    }

    /// Path of a resource relative to a host
    pub fn resource_path(&self, kind: CdnKind, name: &str) -> Result<String> {
        if name.len() < 4 || !name.as_bytes()[..4].iter().all(u8::is_ascii_hexdigit) {
            return Err(StorageError::InvalidConfig(format!(
                "invalid CDN resource name '{name}'"
            )));
        }
        Ok(format!(
            "{}/{}/{}/{}/{}",
            self.path,
            kind.as_str(),
            &name[0..2],
            &name[2..4],
            name
        ))
    }

    /// Full URL of a resource on `host`
    pub fn build_url(&self, host: &str, kind: CdnKind, name: &str) -> Result<String> {
        Ok(format!(
            "{}://{}/{}",
            self.scheme,
            host.trim_end_matches('/'),
            self.resource_path(kind, name)?
        ))
    }

    /// Download a whole resource
    pub fn fetch(&self, kind: CdnKind, name: &str) -> Result<Vec<u8>> {
        self.fetch_inner(kind, name, None)
    }

    /// Download `size` bytes starting at `offset`
    pub fn fetch_range(&self, kind: CdnKind, name: &str, offset: u64, size: u64) -> Result<Vec<u8>> {
        if size == 0 {
            return Ok(Vec::new());
        }
        self.fetch_inner(kind, name, Some((offset, size)))
    }

    fn fetch_inner(&self, kind: CdnKind, name: &str, range: Option<(u64, u64)>) -> Result<Vec<u8>> {
        let resource = self.resource_path(kind, name)?;
        let mut last_reason = "no CDN hosts configured".to_string();

        for host in &self.hosts {
            let url = self.build_url(host, kind, name)?;

            for attempt in 1..=self.retry.max_attempts.max(1) {
                if attempt > 1 {
                    let delay = self.retry.delay_for(attempt - 1);
                    if !delay.is_zero() {
                        debug!("CDN retry attempt {} after {:?} backoff", attempt, delay);
                        std::thread::sleep(delay);
                    }
                }

                let mut request = self.client.get(&url);
                if let Some((offset, size)) = range {
                    request = request.header(RANGE, format!("bytes={}-{}", offset, offset + size - 1));
                }

                trace!("CDN request to {} (attempt {})", url, attempt);
                let response = match request.send() {
                    Ok(response) => response,
                    Err(e) => {
                        warn!("request to {} failed: {}", url, e);
                        last_reason = e.to_string();
                        break;
                    }
                };

                let status = response.status();
                if RetryPolicy::is_retryable_status(status) {
                    debug!("{} returned {} (attempt {})", url, status, attempt);
                    last_reason = format!("HTTP {status} from {host}");
                    continue;
                }
                if !status.is_success() {
                    warn!("{} returned {}", url, status);
                    last_reason = format!("HTTP {status} from {host}");
                    break;
                }

                let body = match response.bytes() {
                    Ok(body) => body,
                    Err(e) => {
                        warn!("reading body from {} failed: {}", url, e);
                        last_reason = e.to_string();
                        continue;
                    }
                };

                match range_body(&body, status, range) {
                    Some(data) => return Ok(data),
                    None => {
                        warn!(
                            "{} returned {} bytes for range {:?}",
                            url,
                            body.len(),
                            range
                        );
                        last_reason = format!("short range response from {host}");
                    }
                }
            }
        }

        Err(StorageError::Unavailable {
            resource,
            reason: last_reason,
        })
    }
}

/// Extract the requested bytes from a response body
///
/// Servers that ignore `Range` answer 200 with the whole resource, which is
/// sliced locally.
fn range_body(body: &[u8], status: StatusCode, range: Option<(u64, u64)>) -> Option<Vec<u8>> {
    let Some((offset, size)) = range else {
        return Some(body.to_vec());
    };
    let size = usize::try_from(size).ok()?;

    if status == StatusCode::PARTIAL_CONTENT {
        return (body.len() == size).then(|| body.to_vec());
    }

    let start = usize::try_from(offset).ok()?;
    let end = start.checked_add(size)?;
    body.get(start..end).map(<[u8]>::to_vec)
}
