//! Per-source harvest configuration.
//!
//! Sources carry a free-form JSON blob; it is parsed once per stage into an
//! immutable [`HarvestConfig`] value that is threaded through gather, fetch
//! and import. Malformed configuration degrades to defaults rather than
//! failing the job.

use serde::Deserialize;
use tracing::warn;

pub const DEFAULT_METADATA_PREFIX: &str = "oai_dc";

/// HTTP basic credentials for protected endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Immutable per-job configuration, resolved from the source's config blob.
#[derive(Debug, Clone, PartialEq)]
pub struct HarvestConfig {
    /// Credentials, present only when both username and password are set.
    pub credentials: Option<Credentials>,
    /// Restricts the identifier listing to one set.
    pub set_spec: Option<String>,
    /// Post-listing filter: headers whose set list does not contain this
    /// value are skipped during gather.
    pub set_filter: Option<String>,
    /// Negotiated metadata schema, `"oai_dc"` by default.
    pub metadata_prefix: String,
    /// Issue GET requests with query parameters instead of POST forms.
    pub force_http_get: bool,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            credentials: None,
            set_spec: None,
            set_filter: None,
            metadata_prefix: DEFAULT_METADATA_PREFIX.to_string(),
            force_http_get: false,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    username: Option<String>,
    password: Option<String>,
    set: Option<String>,
    filter: Option<String>,
    metadata_prefix: Option<String>,
    force_http_get: Option<bool>,
}

impl HarvestConfig {
    /// Parses the raw source config blob. Unparseable JSON falls back to
    /// defaults with a warning.
    pub fn from_source(raw: &str) -> Self {
        let parsed: RawConfig = match serde_json::from_str(raw) {
            Ok(parsed) => parsed,
            Err(e) => {
                if !raw.trim().is_empty() {
                    warn!(error = %e, "unparseable source config, using defaults");
                }
                RawConfig::default()
            }
        };

        let credentials = match (parsed.username, parsed.password) {
            (Some(username), Some(password)) => Some(Credentials { username, password }),
            _ => None,
        };

        Self {
            credentials,
            set_spec: parsed.set,
            set_filter: parsed.filter,
            metadata_prefix: parsed
                .metadata_prefix
                .unwrap_or_else(|| DEFAULT_METADATA_PREFIX.to_string()),
            force_http_get: parsed.force_http_get.unwrap_or(false),
        }
    }
}
