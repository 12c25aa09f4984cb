//! Remote artifact store access

use async_trait::async_trait;
use futures_util::StreamExt;
use healthsphere_core::{Error, Result};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response, Url};
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Remote storage holding model artifacts
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Lightweight existence check; never transfers the artifact body
    async fn probe_reachable(&self, url: &str) -> bool;

    /// Download the artifact at `url` into `destination`, returning bytes written
    async fn download(&self, url: &str, destination: &Path) -> Result<u64>;
}

/// Hosts that put large downloads behind an HTML confirmation page
pub const GOOGLE_DRIVE_HOSTS: &[&str] = &[
    "drive.google.com",
    "docs.google.com",
    "drive.usercontent.google.com",
];

/// HTTP(S) remote store
pub struct HttpRemoteStore {
    client: Client,
    probe_timeout: Duration,
    confirmation_hosts: Vec<String>,
}

impl HttpRemoteStore {
    pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);
    pub const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30 * 60);

    /// Create a store with default timeouts
    pub fn new() -> Result<Self> {
        Self::with_timeouts(Self::DEFAULT_PROBE_TIMEOUT, Self::DEFAULT_DOWNLOAD_TIMEOUT)
    }

    /// Create a store with explicit probe and whole-download timeouts
    pub fn with_timeouts(probe_timeout: Duration, download_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(download_timeout)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            probe_timeout,
            confirmation_hosts: GOOGLE_DRIVE_HOSTS.iter().map(|h| h.to_string()).collect(),
        })
    }

    /// Replace the hosts whose HTML answers are retried with `confirm=t`
    pub fn with_confirmation_hosts<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.confirmation_hosts = hosts.into_iter().map(Into::into).collect();
        self
    }

    fn needs_confirmation(&self, url: &Url) -> bool {
        url.host_str()
            .map_or(false, |host| self.confirmation_hosts.iter().any(|h| h == host))
    }

    async fn get(&self, url: Url) -> Result<Response> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| Error::unavailable(format!("Request to {} failed: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(Error::unavailable(format!(
                "Remote store returned {} for {}",
                response.status(),
                url
            )));
        }
        Ok(response)
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn probe_reachable(&self, url: &str) -> bool {
        match self
            .client
            .head(url)
            .timeout(self.probe_timeout)
            .send()
            .await
        {
            Ok(response) => {
                debug!("Probe {} returned {}", url, response.status());
                response.status().is_success()
            }
            Err(e) => {
                warn!("Failed to access URL {}: {}", url, e);
                false
            }
        }
    }

    async fn download(&self, url: &str, destination: &Path) -> Result<u64> {
        let parsed = Url::parse(url)
            .map_err(|e| Error::unavailable(format!("Invalid source URL {}: {}", url, e)))?;

        let mut response = self.get(parsed.clone()).await?;

        // Large Drive files answer with an HTML virus-scan interstitial first
        if is_html(&response) && self.needs_confirmation(&parsed) {
            info!("Confirming Google Drive download for {}", url);
            response = self.get(with_confirmation(parsed)).await?;
        }

        let mut file = tokio::fs::File::create(destination).await?;
        let mut written: u64 = 0;
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| {
                Error::unavailable(format!("Download of {} interrupted: {}", url, e))
            })?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }

        file.flush().await?;
        file.sync_all().await?;

        debug!("Wrote {} bytes from {} to {}", written, url, destination.display());
        Ok(written)
    }
}

fn is_html(response: &Response) -> bool {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map_or(false, |ct| ct.starts_with("text/html"))
}

fn with_confirmation(mut url: Url) -> Url {
    url.query_pairs_mut().append_pair("confirm", "t");
    url
}
