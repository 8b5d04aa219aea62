use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the ingestion pipeline.
///
/// One `IngestConfig` value describes everything the pipeline needs at
/// startup: how to identify itself to the registry, how aggressively to talk
/// to it, where artifacts and state live, and how documents are chunked.
/// Configuration-file parsing is left to the caller; this crate only consumes
/// the assembled struct.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// User agent string for HTTP requests. The SEC requires a descriptive
    /// identifier with contact information ("AppName contact@example.com").
    pub user_agent: String,
    /// Minimum interval between two consecutive outbound requests.
    pub min_request_interval: Duration,
    /// HTTP request timeout.
    pub timeout: Duration,
    /// Retry ceiling for transient failures (429/5xx/transport).
    pub max_retries: u32,
    /// Number of filings processed concurrently.
    pub worker_count: usize,
    /// Target chunk size in words.
    pub chunk_words: usize,
    /// Word overlap between consecutive chunks.
    pub chunk_overlap: usize,
    /// How raw documents are rendered to a fixed-layout derivative.
    pub render_method: RenderMethod,
    /// Base URLs for the registry services.
    pub base_urls: RegistryUrls,
    /// Which storage backend holds artifacts and pipeline state.
    pub storage: StorageConfig,
}

/// Base URLs for the registry services.
#[derive(Debug, Clone)]
pub struct RegistryUrls {
    /// Base URL for the filing archives (raw documents, filing directories).
    pub archives: String,
    /// Base URL for the structured data API (submission histories).
    pub data: String,
    /// Base URL for supporting files (ticker tables).
    pub files: String,
}

impl Default for RegistryUrls {
    fn default() -> Self {
        Self {
            archives: "https://www.sec.gov/Archives/edgar".to_string(),
            data: "https://data.sec.gov".to_string(),
            files: "https://www.sec.gov/files".to_string(),
        }
    }
}

/// Storage backend selection.
///
/// Exactly two backends exist: the local filesystem and a networked object
/// store reached over HTTP. The selection is made once at startup; the
/// factories in `state` and `store` turn this value into trait objects.
#[derive(Debug, Clone)]
pub enum StorageConfig {
    /// Everything under one root directory on the local filesystem.
    Local {
        /// Root directory for artifacts and state.
        root: PathBuf,
    },
    /// Objects under `{endpoint}/{bucket}/{prefix}/...` on an HTTP object
    /// gateway. Writes are last-writer-wins per object.
    Remote {
        /// Gateway endpoint, e.g. "http://127.0.0.1:9000".
        endpoint: String,
        /// Bucket name.
        bucket: String,
        /// Key prefix inside the bucket.
        prefix: String,
        /// Optional bearer token sent with every request.
        token: Option<String>,
    },
}

/// Renderer selection for the optional fixed-layout derivative.
#[derive(Debug, Clone, Default)]
pub enum RenderMethod {
    /// Produce no rendered output (the default).
    #[default]
    Skip,
    /// Pipe the raw document through an external command that reads markup on
    /// stdin and writes the rendered bytes to stdout.
    Command { program: String, args: Vec<String> },
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            user_agent: "filingest/0.1.0".to_string(),
            min_request_interval: Duration::from_millis(500),
            timeout: Duration::from_secs(30),
            max_retries: 5,
            worker_count: 4,
            chunk_words: 1000,
            chunk_overlap: 200,
            render_method: RenderMethod::Skip,
            base_urls: RegistryUrls::default(),
            storage: StorageConfig::Local {
                root: PathBuf::from("./filingest-data"),
            },
        }
    }
}

impl IngestConfig {
    /// Creates a configuration with the given user agent and local storage
    /// root, leaving every knob at its default.
    pub fn new(user_agent: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            user_agent: user_agent.into(),
            storage: StorageConfig::Local { root: root.into() },
            ..Self::default()
        }
    }
}
