//! SolarWinds Information Service (SWIS) client.
//!
//! Backs the allocation engine's inventory and record-store seams with the
//! Orion JSON API:
//!
//! - `POST {base}/Query` runs a SWQL query
//! - `GET {base}/{swis-uri}` reads one entity
//! - `POST {base}/{swis-uri}` updates entity fields
//!
//! Orion appliances commonly run self-signed certificates; setting
//! `verify_tls: false` disables certificate verification for those installs.

use std::fmt;
use std::net::IpAddr;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use oipam_allocator::{CandidateRecord, CandidateSource, RecordStore};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};

/// Default SWIS REST port.
pub const DEFAULT_SWIS_PORT: u16 = 17778;

/// Default timeout for SWIS requests.
pub const DEFAULT_SWIS_TIMEOUT: Duration = Duration::from_secs(30);

/// IPAM.IPNode status value: address is in use.
pub const STATUS_USED: i32 = 1;

/// IPAM.IPNode status value: address is available for allocation.
pub const STATUS_AVAILABLE: i32 = 2;

/// SWIS client errors.
#[derive(Debug, Error)]
pub enum SwisError {
    /// Invalid endpoint configuration.
    #[error("invalid SWIS configuration: {0}")]
    Config(String),

    /// The request could not be completed.
    #[error("SWIS request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// SWIS rejected the request.
    #[error("SWIS returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The response body did not have the expected shape.
    #[error("unexpected SWIS response shape: {0}")]
    Decode(String),
}

// ============================================================================
// Credentials
// ============================================================================

/// API password wrapper that never appears in diagnostics.
///
/// `Debug` is redacted and `Display` is deliberately not implemented; the
/// secret is only readable through [`Password::expose`].
#[derive(Clone)]
pub struct Password(String);

impl Password {
    /// Wrap a secret.
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// Read the wrapped secret.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Password(<redacted>)")
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// SWIS endpoint configuration, validated once at client construction.
#[derive(Debug, Clone)]
pub struct SwisConfig {
    /// Orion server hostname, or a scheme-qualified origin such as
    /// `https://orion.example.com:17778` (which overrides `port`).
    pub server: String,

    /// SWIS REST port, used when `server` carries no scheme.
    pub port: u16,

    /// API username.
    pub username: String,

    /// API password. Redacted in all diagnostic output.
    pub password: Password,

    /// Verify the server's TLS certificate.
    pub verify_tls: bool,

    /// Per-request timeout.
    pub timeout: Duration,
}

impl SwisConfig {
    /// Configuration with default port, timeout, and TLS verification on.
    pub fn new(
        server: impl Into<String>,
        username: impl Into<String>,
        password: Password,
    ) -> Self {
        Self {
            server: server.into(),
            port: DEFAULT_SWIS_PORT,
            username: username.into(),
            password,
            verify_tls: true,
            timeout: DEFAULT_SWIS_TIMEOUT,
        }
    }

    /// Override the SWIS port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Disable TLS certificate verification.
    pub fn insecure(mut self) -> Self {
        self.verify_tls = false;
        self
    }

    /// Override the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn base_url(&self) -> String {
        let server = self.server.trim_end_matches('/');
        if server.starts_with("http://") || server.starts_with("https://") {
            format!("{}/SolarWinds/InformationService/v3/Json", server)
        } else {
            format!(
                "https://{}:{}/SolarWinds/InformationService/v3/Json",
                server, self.port
            )
        }
    }
}

// ============================================================================
// Client
// ============================================================================

/// HTTP client for one SWIS endpoint.
pub struct SwisClient {
    http: reqwest::Client,
    base_url: String,
    username: String,
    password: Password,
}

impl SwisClient {
    /// Build a client, validating the configuration.
    pub fn new(config: &SwisConfig) -> Result<Self, SwisError> {
        if config.server.trim().is_empty() {
            return Err(SwisError::Config("server must not be empty".to_string()));
        }
        if config.username.trim().is_empty() {
            return Err(SwisError::Config("username must not be empty".to_string()));
        }

        let mut builder = reqwest::Client::builder().timeout(config.timeout);
        if !config.verify_tls {
            builder = builder.danger_accept_invalid_certs(true);
        }
        let http = builder.build()?;

        Ok(Self {
            http,
            base_url: config.base_url(),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    /// Run a SWQL query and return its result rows.
    pub async fn query(&self, swql: &str, parameters: Value) -> Result<Vec<Value>, SwisError> {
        let url = format!("{}/Query", self.base_url);
        debug!(url = %url, "SWIS query");

        let response = self
            .http
            .post(&url)
            .basic_auth(&self.username, Some(self.password.expose()))
            .json(&json!({ "query": swql, "parameters": parameters }))
            .send()
            .await?;

        let body = Self::into_body(response).await?;
        body.get("results")
            .and_then(Value::as_array)
            .cloned()
            .ok_or_else(|| SwisError::Decode("missing 'results' array".to_string()))
    }

    /// Read one entity by its SWIS URI.
    pub async fn read(&self, uri: &str) -> Result<Value, SwisError> {
        let url = format!("{}/{}", self.base_url, uri);
        debug!(url = %url, "SWIS read");

        let response = self
            .http
            .get(&url)
            .basic_auth(&self.username, Some(self.password.expose()))
            .send()
            .await?;

        Self::into_body(response).await
    }

    /// Update fields on one entity by its SWIS URI.
    pub async fn update(&self, uri: &str, fields: &Value) -> Result<(), SwisError> {
        let url = format!("{}/{}", self.base_url, uri);
        debug!(url = %url, "SWIS update");

        let response = self
            .http
            .post(&url)
            .basic_auth(&self.username, Some(self.password.expose()))
            .json(fields)
            .send()
            .await?;

        Self::into_body(response).await?;
        Ok(())
    }

    async fn into_body(response: reqwest::Response) -> Result<Value, SwisError> {
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(SwisError::Http {
                status: status.as_u16(),
                body: excerpt(&text),
            });
        }

        // Updates return an empty body.
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&text).map_err(|e| SwisError::Decode(e.to_string()))
    }
}

fn excerpt(body: &str) -> String {
    const MAX: usize = 256;
    if body.len() <= MAX {
        body.to_string()
    } else {
        let cut = body
            .char_indices()
            .take_while(|(i, _)| *i < MAX)
            .last()
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(0);
        format!("{}...", &body[..cut])
    }
}

// ============================================================================
// Collaborator implementations
// ============================================================================

fn candidate_query(limit: u32) -> String {
    format!(
        "SELECT TOP {} I.Status, I.IPAddress, I.DisplayName, I.Comments, Uri \
         FROM IPAM.IPNode I \
         WHERE I.Status = @status AND I.Subnet.DisplayName = @subnet",
        limit
    )
}

#[derive(Debug, Deserialize)]
struct IpNodeRow {
    #[serde(rename = "Status")]
    status: i32,
    #[serde(rename = "IPAddress")]
    ip_address: String,
    #[serde(rename = "DisplayName", default)]
    display_name: Option<String>,
    #[serde(rename = "Comments", default)]
    comments: Option<String>,
    #[serde(rename = "Uri")]
    uri: String,
}

impl IpNodeRow {
    fn into_candidate(self) -> Option<CandidateRecord> {
        match self.ip_address.parse::<IpAddr>() {
            Ok(address) => Some(CandidateRecord {
                address,
                reference: self.uri,
                raw_status: self.status,
                display_name: self.display_name,
                comments: self.comments,
            }),
            Err(_) => {
                warn!(
                    ip_address = %self.ip_address,
                    "inventory row has an unparseable address, dropping"
                );
                None
            }
        }
    }
}

#[async_trait]
impl CandidateSource for SwisClient {
    async fn query_candidates(&self, subnet: &str, limit: u32) -> Result<Vec<CandidateRecord>> {
        let rows = self
            .query(
                &candidate_query(limit),
                json!({ "status": STATUS_AVAILABLE, "subnet": subnet }),
            )
            .await?;

        let candidates = rows
            .into_iter()
            .filter_map(|row| match serde_json::from_value::<IpNodeRow>(row) {
                Ok(row) => row.into_candidate(),
                Err(e) => {
                    warn!(error = %e, "dropping malformed inventory row");
                    None
                }
            })
            .collect();

        Ok(candidates)
    }
}

#[async_trait]
impl RecordStore for SwisClient {
    async fn read_status(&self, reference: &str) -> Result<i32> {
        let entity = self.read(reference).await?;
        entity
            .get("Status")
            .and_then(Value::as_i64)
            .map(|status| status as i32)
            .ok_or_else(|| anyhow::anyhow!("entity has no integer Status field"))
    }

    async fn update(&self, reference: &str, fields: &Value) -> Result<()> {
        SwisClient::update(self, reference, fields).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_debug_is_redacted() {
        let password = Password::new("hunter2");
        let debug = format!("{:?}", password);
        assert!(!debug.contains("hunter2"));
        assert_eq!(password.expose(), "hunter2");
    }

    #[test]
    fn config_debug_is_redacted() {
        let config = SwisConfig::new("orion.example.com", "admin", Password::new("hunter2"));
        assert!(!format!("{:?}", config).contains("hunter2"));
    }

    #[test]
    fn base_url_from_host_and_port() {
        let config = SwisConfig::new("orion.example.com", "admin", Password::new("pw"));
        assert_eq!(
            config.base_url(),
            "https://orion.example.com:17778/SolarWinds/InformationService/v3/Json"
        );
    }

    #[test]
    fn scheme_qualified_server_overrides_port() {
        let config = SwisConfig::new("http://127.0.0.1:3999/", "admin", Password::new("pw"));
        assert_eq!(
            config.base_url(),
            "http://127.0.0.1:3999/SolarWinds/InformationService/v3/Json"
        );
    }

    #[test]
    fn candidate_query_bounds_the_window() {
        let swql = candidate_query(5);
        assert!(swql.starts_with("SELECT TOP 5 "));
        assert!(swql.contains("I.Subnet.DisplayName = @subnet"));
    }

    #[test]
    fn row_with_bad_address_is_dropped() {
        let row: IpNodeRow = serde_json::from_value(json!({
            "Status": 2,
            "IPAddress": "not-an-ip",
            "Uri": "swis://orion/Orion/IPAM.IPNode/IpNodeId=1",
        }))
        .unwrap();
        assert!(row.into_candidate().is_none());
    }

    #[test]
    fn row_maps_to_candidate() {
        let row: IpNodeRow = serde_json::from_value(json!({
            "Status": 2,
            "IPAddress": "10.0.0.12",
            "DisplayName": "10.0.0.12",
            "Comments": null,
            "Uri": "swis://orion/Orion/IPAM.IPNode/IpNodeId=12",
        }))
        .unwrap();

        let candidate = row.into_candidate().unwrap();
        assert_eq!(candidate.address, "10.0.0.12".parse::<IpAddr>().unwrap());
        assert_eq!(candidate.raw_status, 2);
        assert_eq!(
            candidate.reference,
            "swis://orion/Orion/IPAM.IPNode/IpNodeId=12"
        );
    }

    #[test]
    fn excerpt_truncates_long_bodies() {
        let body = "x".repeat(1000);
        let cut = excerpt(&body);
        assert!(cut.len() < body.len());
        assert!(cut.ends_with("..."));
    }
}
