//! Configuration types for es-reindex.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::client::common::DEFAULT_TIMEOUT;
use crate::error::{Error, Result};

/// Main reindex configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReindexConfig {
    /// Cluster documents are read from.
    #[serde(default)]
    pub source: ClusterConfig,
    /// Cluster documents are written to.
    #[serde(default)]
    pub target: ClusterConfig,
    /// Index scanned on the source cluster.
    #[serde(default)]
    pub source_index: String,
    /// Index written on the target cluster.
    #[serde(default)]
    pub target_index: String,
    /// Search body or query clause, inline or `@path`.
    #[serde(default)]
    pub query: Option<String>,
    /// Maximum number of documents to transfer.
    #[serde(default)]
    pub limit: Option<u64>,
    /// Routing key, or comma separated candidate keys.
    #[serde(default)]
    pub routing: Option<String>,
    /// Transfer options.
    #[serde(default)]
    pub options: ReindexOptions,
}

/// Connection settings for one cluster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// `http` or `https`.
    #[serde(default = "default_scheme")]
    pub scheme: String,
    /// Host name or address.
    #[serde(default = "default_host")]
    pub host: String,
    /// REST port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Optional username for Basic auth.
    #[serde(default)]
    pub username: Option<String>,
    /// Optional password for Basic auth.
    #[serde(default)]
    pub password: Option<String>,
    /// Optional API key, preferred over Basic auth.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Retries for transient transport failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            scheme: default_scheme(),
            host: default_host(),
            port: default_port(),
            username: None,
            password: None,
            api_key: None,
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

impl ClusterConfig {
    /// Base URL of the cluster REST API, without trailing slash.
    #[must_use]
    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.host, self.port)
    }

    /// Per-request timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    fn validate(&self, role: &str) -> Result<()> {
        if !matches!(self.scheme.as_str(), "http" | "https") {
            return Err(Error::Config(format!(
                "{role} scheme must be http or https, got '{}'",
                self.scheme
            )));
        }
        if self.host.trim().is_empty() {
            return Err(Error::Config(format!("{role} host cannot be empty")));
        }
        if self.port == 0 {
            return Err(Error::Config(format!("{role} port must be greater than 0")));
        }
        if self.timeout_secs == 0 {
            return Err(Error::Config(format!(
                "{role} timeout must be greater than 0"
            )));
        }
        if self.password.is_some() && self.username.is_none() {
            return Err(Error::Config(format!(
                "{role} password given without a username"
            )));
        }
        Ok(())
    }
}

/// Transfer options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReindexOptions {
    /// Bulk writer workers; 1 or less writes sequentially.
    #[serde(default = "default_num_threads")]
    pub num_threads: usize,
    /// Documents per bulk request.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Documents per scroll page.
    #[serde(default = "default_scroll_size")]
    pub scroll_size: usize,
    /// Scroll cursor lease, e.g. `5m`.
    #[serde(default = "default_scroll_keep_alive")]
    pub scroll_keep_alive: String,
    /// Create the target index and stop before scanning.
    #[serde(default)]
    pub only_metadata: bool,
    /// Scan and transform without writing.
    #[serde(default)]
    pub dry_run: bool,
    /// Field mappings (`source_field` -> `dest_field`, `_id` remaps the identifier).
    #[serde(default)]
    pub field_mappings: HashMap<String, String>,
}

impl Default for ReindexOptions {
    fn default() -> Self {
        Self {
            num_threads: default_num_threads(),
            chunk_size: default_chunk_size(),
            scroll_size: default_scroll_size(),
            scroll_keep_alive: default_scroll_keep_alive(),
            only_metadata: false,
            dry_run: false,
            field_mappings: HashMap::new(),
        }
    }
}

fn default_scheme() -> String {
    "http".to_string()
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    9200
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT.as_secs()
}

fn default_max_retries() -> u32 {
    3
}

fn default_num_threads() -> usize {
    1
}

fn default_chunk_size() -> usize {
    500
}

fn default_scroll_size() -> usize {
    1000
}

fn default_scroll_keep_alive() -> String {
    "5m".to_string()
}

impl ReindexConfig {
    /// Load configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.source_index.trim().is_empty() {
            return Err(Error::Config("source index is required".to_string()));
        }
        if self.target_index.trim().is_empty() {
            return Err(Error::Config("target index is required".to_string()));
        }
        self.source.validate("source")?;
        self.target.validate("target")?;

        if self.source.base_url() == self.target.base_url()
            && self.source_index == self.target_index
        {
            return Err(Error::Config(format!(
                "source and target are the same index '{}' on {}",
                self.source_index,
                self.source.base_url()
            )));
        }
        if self.options.chunk_size == 0 {
            return Err(Error::Config(
                "chunk size must be greater than 0".to_string(),
            ));
        }
        if self.options.scroll_size == 0 {
            return Err(Error::Config(
                "scroll size must be greater than 0".to_string(),
            ));
        }
        if !is_valid_time_value(&self.options.scroll_keep_alive) {
            return Err(Error::Config(format!(
                "scroll keep-alive '{}' is not a time value such as 30s or 5m",
                self.options.scroll_keep_alive
            )));
        }
        Ok(())
    }
}

/// Checks a cluster time value: digits followed by `d`, `h`, `m`, `s` or `ms`.
fn is_valid_time_value(value: &str) -> bool {
    let digits_end = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());
    let (amount, unit) = value.split_at(digits_end);
    !amount.is_empty() && matches!(unit, "d" | "h" | "m" | "s" | "ms")
}

/// Resolves the query argument.
///
/// A value prefixed with `@` names a file whose content is used verbatim;
/// anything else is returned unchanged.
///
/// # Errors
///
/// Returns [`Error::QueryFile`] if the file cannot be read.
pub fn resolve_query(raw: Option<&str>) -> Result<Option<String>> {
    match raw {
        Some(value) => match value.strip_prefix('@') {
            Some(path) => {
                let path = PathBuf::from(path);
                std::fs::read_to_string(&path)
                    .map(Some)
                    .map_err(|source| Error::QueryFile { path, source })
            }
            None => Ok(Some(value.to_string())),
        },
        None => Ok(None),
    }
}
