//! Configuration and settings management
//!
//! Loads settings from environment variables and defines relay constants.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Application settings loaded from environment variables
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Telegram Bot API token
    #[serde(default)]
    pub telegram_token: String,

    /// Custom Bot API server URL (a local server lifts the 50 MB upload cap)
    pub telegram_api_url: Option<String>,

    /// Channel every file is uploaded to before being copied to the requester
    #[serde(default)]
    pub backup_channel_id: i64,

    /// Bearer token expected on `/api/*` requests
    pub backend_secret: Option<String>,

    /// HTTP listen port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Maximum size of a single file, in bytes
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    /// Directory holding in-flight downloads
    #[serde(default = "default_download_dir")]
    pub download_dir: String,

    /// Cookie file handed to yt-dlp when it exists on disk
    #[serde(default = "default_cookie_file")]
    pub cookie_file: String,

    /// Comma-separated list of proxy URLs
    #[serde(rename = "proxy_list")]
    pub proxy_list_str: Option<String>,

    /// Path or name of the yt-dlp binary
    #[serde(default = "default_ytdlp_path")]
    pub ytdlp_path: String,

    /// Hard timeout of one extraction subprocess
    #[serde(default = "default_extractor_timeout_secs")]
    pub extractor_timeout_secs: u64,

    /// Timeout of the metadata probe
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,

    /// Overall timeout of a direct download
    #[serde(default = "default_direct_timeout_secs")]
    pub direct_timeout_secs: u64,

    /// HTTP timeout of Telegram requests (uploads included)
    #[serde(default = "default_transfer_timeout_secs")]
    pub transfer_timeout_secs: u64,

    /// Probe title/duration of platform URLs before downloading
    #[serde(default = "default_probe_metadata")]
    pub probe_metadata: bool,
}

const fn default_port() -> u16 {
    8080
}

const fn default_max_file_size() -> u64 {
    2 * 1024 * 1024 * 1024
}

fn default_download_dir() -> String {
    "/tmp/downloads".to_string()
}

fn default_cookie_file() -> String {
    "/app/cookies.txt".to_string()
}

fn default_ytdlp_path() -> String {
    "yt-dlp".to_string()
}

const fn default_extractor_timeout_secs() -> u64 {
    1800
}

const fn default_probe_timeout_secs() -> u64 {
    60
}

const fn default_direct_timeout_secs() -> u64 {
    3600
}

const fn default_transfer_timeout_secs() -> u64 {
    3600
}

const fn default_probe_metadata() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            telegram_token: String::new(),
            telegram_api_url: None,
            backup_channel_id: 0,
            backend_secret: None,
            port: default_port(),
            max_file_size: default_max_file_size(),
            download_dir: default_download_dir(),
            cookie_file: default_cookie_file(),
            proxy_list_str: None,
            ytdlp_path: default_ytdlp_path(),
            extractor_timeout_secs: default_extractor_timeout_secs(),
            probe_timeout_secs: default_probe_timeout_secs(),
            direct_timeout_secs: default_direct_timeout_secs(),
            transfer_timeout_secs: default_transfer_timeout_secs(),
            probe_metadata: default_probe_metadata(),
        }
    }
}

impl Settings {
    /// Create new settings by loading from environment and files
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use oxide_relay::config::Settings;
    ///
    /// let settings = Settings::new().expect("Failed to load configuration");
    /// ```
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails or a required value is missing.
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
            // Not checked into git
            .add_source(File::with_name("config/local").required(false))
            // Eg.. `APP__PORT=9000 ./target/app` would set the `port` key
            .add_source(Environment::with_prefix("APP").separator("__"))
            // Environment::default() auto-converts UPPER_SNAKE_CASE to snake_case,
            // ignore_empty treats empty env vars as unset
            .add_source(Environment::default().ignore_empty(true))
            .build()?;

        let settings: Self = s.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Check that every value the relay cannot run without is present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Message` naming the first missing value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.telegram_token.trim().is_empty() {
            return Err(ConfigError::Message("TELEGRAM_TOKEN is not set".into()));
        }
        if self.backup_channel_id == 0 {
            return Err(ConfigError::Message("BACKUP_CHANNEL_ID is not set".into()));
        }
        if self
            .backend_secret
            .as_deref()
            .is_none_or(|s| s.trim().is_empty())
        {
            return Err(ConfigError::Message("BACKEND_SECRET is not set".into()));
        }
        Ok(())
    }

    /// Returns the configured proxy pool, in declaration order
    #[must_use]
    pub fn proxies(&self) -> Vec<String> {
        self.proxy_list_str
            .as_ref()
            .map(|s| {
                s.split(|c: char| c == ',' || c == ';' || c.is_whitespace())
                    .filter(|token| !token.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Download directory as a path
    #[must_use]
    pub fn download_path(&self) -> PathBuf {
        PathBuf::from(&self.download_dir)
    }

    /// Cookie file as a path
    #[must_use]
    pub fn cookie_path(&self) -> PathBuf {
        PathBuf::from(&self.cookie_file)
    }

    /// Hard timeout of one extraction subprocess
    #[must_use]
    pub const fn extractor_timeout(&self) -> Duration {
        Duration::from_secs(self.extractor_timeout_secs)
    }

    /// Timeout of the metadata probe
    #[must_use]
    pub const fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    /// Overall timeout of a direct download
    #[must_use]
    pub const fn direct_timeout(&self) -> Duration {
        Duration::from_secs(self.direct_timeout_secs)
    }

    /// HTTP timeout of Telegram requests
    #[must_use]
    pub const fn transfer_timeout(&self) -> Duration {
        Duration::from_secs(self.transfer_timeout_secs)
    }
}

/// Service name reported by the HTTP surface
pub const SERVICE_NAME: &str = "Telegram Downloader Backend";
/// Service version reported by the HTTP surface
pub const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Uploads above this size are delivered without a notification
pub const SILENT_UPLOAD_THRESHOLD: u64 = 50 * 1024 * 1024;
/// Write buffer size of the direct downloader
pub const DIRECT_CHUNK_SIZE: usize = 1024 * 1024;
/// Minimum percentage increase between two progress edits
pub const PROGRESS_STEP_PERCENT: f64 = 5.0;
/// Idle time after which a forgotten progress entry is evicted
pub const PROGRESS_ENTRY_TTL_SECS: u64 = 6 * 3600;
/// Characters of an error shown to the requester
pub const USER_ERROR_EXCERPT_CHARS: usize = 100;
/// Characters of extractor diagnostics carried in an `ExtractionError`
pub const EXTRACTOR_DIAGNOSTIC_CHARS: usize = 200;

/// yt-dlp `--retries`
pub const EXTRACTOR_RETRIES: u32 = 5;
/// yt-dlp `--fragment-retries`
pub const EXTRACTOR_FRAGMENT_RETRIES: u32 = 5;
/// yt-dlp `--socket-timeout`, seconds
pub const EXTRACTOR_SOCKET_TIMEOUT_SECS: u64 = 30;

/// Desktop browser user agents rotated across requests
pub const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
];
