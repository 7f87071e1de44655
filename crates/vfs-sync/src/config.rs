use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default bound on the worker readiness handshake.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(15);

/// Default timeout for fetching the manifest.
pub const DEFAULT_MANIFEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Default number of recent operation timings kept for statistics.
pub const DEFAULT_TIMING_WINDOW: usize = 100;

/// Runtime settings of a `VfsService`.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// How long a request waits for its response
    pub request_timeout: Duration,
    /// How long `initialize` waits for the worker's ready signal
    pub handshake_timeout: Duration,
    /// How long the manifest fetch may take
    pub manifest_timeout: Duration,
    /// Number of recent timings kept in the statistics
    pub timing_window: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            manifest_timeout: DEFAULT_MANIFEST_TIMEOUT,
            timing_window: DEFAULT_TIMING_WINDOW,
        }
    }
}

/// Configuration for the vfs-sync demo binary.
#[derive(Parser, Debug, Clone)]
#[command(name = "vfs-sync-demo")]
#[command(about = "Runs a synced counter store against an in-process worker")]
pub struct Config {
    /// URL of the manifest (bundle) loaded into the worker
    #[arg(
        long,
        default_value = "http://127.0.0.1:8080/manifest.json",
        env = "VFS_SYNC_MANIFEST_URL"
    )]
    pub manifest_url: String,

    /// Sync server endpoint handed to the worker (derived from the manifest if unset)
    #[arg(long, env = "VFS_SYNC_SERVER_URL")]
    pub server_url: Option<String>,

    /// File the counter state is synced to
    #[arg(long, default_value = "/counter-state.json", env = "VFS_SYNC_STATE_PATH")]
    pub state_path: String,

    /// Per-request timeout in milliseconds
    #[arg(long, default_value = "30000", env = "VFS_SYNC_REQUEST_TIMEOUT_MS")]
    pub request_timeout_ms: u64,

    /// Readiness handshake timeout in milliseconds
    #[arg(long, default_value = "15000", env = "VFS_SYNC_HANDSHAKE_TIMEOUT_MS")]
    pub handshake_timeout_ms: u64,

    /// Manifest fetch timeout in milliseconds
    #[arg(long, default_value = "10000", env = "VFS_SYNC_MANIFEST_TIMEOUT_MS")]
    pub manifest_timeout_ms: u64,

    /// Number of local increments to apply
    #[arg(long, default_value = "5")]
    pub increments: u32,

    /// Start the worker as if it had restored its state from cache
    #[arg(long)]
    pub auto_initialized: bool,

    /// Write the final store bundle to this file
    #[arg(long)]
    pub export_bundle: Option<PathBuf>,
}

impl Config {
    /// Service settings derived from the command line.
    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            request_timeout: Duration::from_millis(self.request_timeout_ms),
            handshake_timeout: Duration::from_millis(self.handshake_timeout_ms),
            manifest_timeout: Duration::from_millis(self.manifest_timeout_ms),
            timing_window: DEFAULT_TIMING_WINDOW,
        }
    }
}
