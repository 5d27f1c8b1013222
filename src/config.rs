//! Typed service configuration.
//!
//! [`ServiceConfig`] is populated once at startup (usually from a JSON
//! document), validated with [`ServiceConfig::validate`] and treated as
//! read-only afterwards. Every field has a default so partial documents work.

use crate::{Error, Result};
use http::HeaderName;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Configuration consumed by the request-execution core.
///
/// # Examples
///
/// ```
/// use partner_client::ServiceConfig;
///
/// let config = ServiceConfig::from_json_str(r#"{
///     "baseUrl": "https://api.partner.example.com",
///     "apiVersion": "v1",
///     "maxRetryAttempts": 5,
///     "apis": { "GetCustomer": "customers/{0}" }
/// }"#).unwrap();
///
/// assert_eq!(config.max_retry_attempts, 5);
/// assert_eq!(config.api("GetCustomer").unwrap(), "customers/{0}");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServiceConfig {
    /// Root URL of the service.
    pub base_url: String,

    /// Version segment prefixed to every templated path (`v1` → `/v1/...`).
    /// Empty means no prefix; otherwise a single path segment.
    pub api_version: String,

    /// Sent in the application-name header when set.
    pub application_name: Option<String>,

    /// Sent in the subscription-key header when set.
    #[serde(skip_serializing)]
    pub subscription_key: Option<String>,

    /// Default locale for new request contexts.
    pub locale: String,

    /// Total attempts per logical call, including the first.
    pub max_retry_attempts: u32,

    /// Base delay of the exponential backoff schedule.
    pub base_retry_delay_ms: u64,

    /// Upper bound for a single backoff delay.
    pub max_retry_delay_ms: u64,

    /// HTTP statuses treated as transient.
    pub retryable_statuses: Vec<u16>,

    /// Safety buffer applied to credentials that carry none of their own.
    /// Negative values are treated as zero.
    pub credential_expiry_buffer_secs: i64,

    /// Per-attempt timeout.
    pub timeout_secs: Option<u64>,

    /// Names of the headers the core attaches.
    pub headers: HeaderNames,

    /// Named path templates, keyed by API name.
    pub apis: BTreeMap<String, String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.partnercenter.microsoft.com".to_string(),
            api_version: "v1".to_string(),
            application_name: None,
            subscription_key: None,
            locale: "en-US".to_string(),
            max_retry_attempts: 3,
            base_retry_delay_ms: 500,
            max_retry_delay_ms: 30_000,
            retryable_statuses: vec![429, 502, 503, 504],
            credential_expiry_buffer_secs: 300,
            timeout_secs: Some(100),
            headers: HeaderNames::default(),
            apis: BTreeMap::new(),
        }
    }
}

/// Header names attached by the core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HeaderNames {
    pub correlation_id: String,
    pub request_id: String,
    pub locale: String,
    pub application_name: String,
    pub subscription_key: String,
    pub continuation_token: String,
}

impl Default for HeaderNames {
    fn default() -> Self {
        Self {
            correlation_id: "MS-CorrelationId".to_string(),
            request_id: "MS-RequestId".to_string(),
            locale: "X-Locale".to_string(),
            application_name: "MS-PartnerCenter-Application".to_string(),
            subscription_key: "Ocp-Apim-Subscription-Key".to_string(),
            continuation_token: "MS-ContinuationToken".to_string(),
        }
    }
}

impl HeaderNames {
    fn all(&self) -> [&str; 6] {
        [
            &self.correlation_id,
            &self.request_id,
            &self.locale,
            &self.application_name,
            &self.subscription_key,
            &self.continuation_token,
        ]
    }
}

impl ServiceConfig {
    /// Parses a configuration document. The result is not yet validated.
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::Configuration(format!("Invalid configuration document: {}", e)))
    }

    /// Reads and parses a configuration file. The result is not yet validated.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&json)
    }

    /// Checks the configuration once, before any client is built from it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] for an unparseable or non-HTTP base URL,
    /// an API version that is not a single path segment, zero retry attempts,
    /// a zero base delay or a maximum delay below it, and a header name that
    /// is not a valid HTTP header name.
    pub fn validate(&self) -> Result<()> {
        let url = self.base_url()?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::Configuration(format!(
                "Base URL must be http(s), got {}",
                url.scheme()
            )));
        }

        let version = self.api_version.trim_matches('/');
        if version.contains(['/', '?', '#'])
            || version == "."
            || version == ".."
            || version.chars().any(char::is_whitespace)
        {
            return Err(Error::Configuration(format!(
                "apiVersion must be a single path segment, got {:?}",
                self.api_version
            )));
        }

        if self.max_retry_attempts == 0 {
            return Err(Error::Configuration(
                "maxRetryAttempts must be at least 1".to_string(),
            ));
        }

        if self.base_retry_delay_ms == 0 {
            return Err(Error::Configuration(
                "baseRetryDelayMs must be greater than zero".to_string(),
            ));
        }

        if self.max_retry_delay_ms < self.base_retry_delay_ms {
            return Err(Error::Configuration(format!(
                "maxRetryDelayMs ({}) must not be below baseRetryDelayMs ({})",
                self.max_retry_delay_ms, self.base_retry_delay_ms
            )));
        }

        for name in self.headers.all() {
            HeaderName::try_from(name).map_err(|e| {
                Error::Configuration(format!("Invalid header name {:?}: {}", name, e))
            })?;
        }

        Ok(())
    }

    /// Returns the base URL with a trailing slash, ready for joining.
    pub fn base_url(&self) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)?;
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Ok(url)
    }

    /// Looks up the path template of a named API.
    pub fn api(&self, name: &str) -> Result<&str> {
        self.apis
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| Error::Configuration(format!("No path template for API {:?}", name)))
    }

    /// The default credential expiry buffer. Negative settings clamp to zero.
    pub fn credential_expiry_buffer(&self) -> Duration {
        Duration::from_secs(self.credential_expiry_buffer_secs.max(0) as u64)
    }

    /// The per-attempt timeout, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}
