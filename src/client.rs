// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Remote distribution server access.
//!
//! Pure I/O boundary between the reconciliation engine and the distribution
//! server. Three endpoints matter:
//!
//! - `GET {base}/api/client/version` returns the full manifest as JSON.
//! - `GET {base}/api/client/version/compare?client_version=X` returns the
//!   server's verdict on whether `X` is current, plus release metadata.
//! - `GET {base}/api/client/download/{category}/{filename}` returns the raw
//!   bytes of one component.
//!
//! Every request carries a bounded timeout and fails closed. There is no
//! retry or backoff here; a caller wanting resilience re-invokes the whole
//! reconciliation. The trait seam exists so the installer can be driven by
//! an in-memory source under test.

use crate::manifest::{Category, Manifest};

use reqwest::{blocking::Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Base URL used when neither flag, environment, nor settings provide one.
pub const DEFAULT_SERVER_URL: &str = "https://updates.cadenza.dev";

/// Environment variable overriding the distribution server base URL.
pub const SERVER_URL_ENV: &str = "CADENZA_SERVER_URL";

/// Per-request timeout for explicit check and install runs.
pub const INSTALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Per-request timeout for the silent startup check. Short on purpose: a
/// slow server must not stall session start.
pub const CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Server verdict from the version-compare endpoint.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct VersionComparison {
    #[serde(default)]
    pub up_to_date: bool,

    #[serde(default)]
    pub server_version: String,

    #[serde(default)]
    pub release_name: String,

    #[serde(default)]
    pub changelog: Vec<String>,
}

/// Layer of indirection for distribution server access.
pub trait RemoteSource {
    /// Fetch the authoritative manifest.
    ///
    /// Failure here aborts a reconciliation outright; no partial manifest is
    /// usable for the diff.
    fn fetch_manifest(&self) -> Result<Manifest>;

    /// Fetch the raw bytes of one component.
    ///
    /// Failure here does not abort a run; the caller records it against the
    /// single component and moves on.
    fn fetch_component(&self, category: Category, filename: &str) -> Result<Vec<u8>>;

    /// Ask the server whether `client_version` is current.
    fn compare_version(&self, client_version: &str) -> Result<VersionComparison>;
}

/// Distribution server access over HTTP.
#[derive(Debug)]
pub struct HttpSource {
    base_url: String,
    client: Client,
}

impl HttpSource {
    /// Construct a new HTTP source against `base_url`.
    ///
    /// # Errors
    ///
    /// - Return [`ClientError::Network`] if the underlying client cannot be
    ///   built.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("cadenza/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Base URL this source talks to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn get(&self, url: &str) -> Result<reqwest::blocking::Response> {
        debug!("GET {url}");
        let response = self.client.get(url).send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::BadResponse {
                status,
                url: url.to_string(),
            });
        }

        Ok(response)
    }
}

impl RemoteSource for HttpSource {
    fn fetch_manifest(&self) -> Result<Manifest> {
        let url = format!("{}/api/client/version", self.base_url);
        let response = self.get(&url)?;
        response
            .json()
            .map_err(|source| ClientError::Malformed { url, source })
    }

    fn fetch_component(&self, category: Category, filename: &str) -> Result<Vec<u8>> {
        let url = format!(
            "{}/api/client/download/{category}/{filename}",
            self.base_url
        );

        debug!("GET {url}");
        let response = self.client.get(&url).send()?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ClientError::NotFound {
                category,
                filename: filename.to_string(),
            });
        }
        if !status.is_success() {
            return Err(ClientError::BadResponse { status, url });
        }

        Ok(response.bytes()?.to_vec())
    }

    fn compare_version(&self, client_version: &str) -> Result<VersionComparison> {
        let url = format!("{}/api/client/version/compare", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("client_version", client_version)])
            .send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::BadResponse { status, url });
        }

        response
            .json()
            .map_err(|source| ClientError::Malformed { url, source })
    }
}

/// Remote access error types.
///
/// Timeouts surface as [`ClientError::Network`]; reqwest folds them into its
/// transport error.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Server unreachable, connection dropped, or request timed out.
    #[error(transparent)]
    Network(#[from] reqwest::Error),

    /// Server answered with a non-success status.
    #[error("server returned {status} for {url}")]
    BadResponse { status: StatusCode, url: String },

    /// Component is not part of the current distribution.
    #[error("component {category}/{filename} not found on server")]
    NotFound { category: Category, filename: String },

    /// Server answered 2xx but the body does not parse.
    #[error("unparseable response from {url}")]
    Malformed {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Friendly result alias :3
type Result<T, E = ClientError> = std::result::Result<T, E>;
