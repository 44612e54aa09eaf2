//! yt-dlp extractor - media platform downloads via the external yt-dlp tool.
//!
//! Each extraction runs as its own subprocess with a hard timeout, so a slow
//! extraction never holds up status narration of other jobs.

use super::classify::Platform;
use super::profile::{AudioExtraction, PlatformProfile};
use super::temp_path::{remove_quietly, remove_with_prefix, TempPathAllocator};
use super::{MediaExtractor, MediaInfo, RetrievalRequest, RetrievalResult, Strategy};
use crate::config::{
    Settings, EXTRACTOR_DIAGNOSTIC_CHARS, EXTRACTOR_FRAGMENT_RETRIES, EXTRACTOR_RETRIES,
    EXTRACTOR_SOCKET_TIMEOUT_SECS,
};
use crate::error::RelayError;
use crate::utils::{excerpt, format_bytes, random_proxy, random_user_agent};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, error, info, warn};

/// Options bundle handed to one yt-dlp invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractorOptions {
    /// Output template, `{base}.%(ext)s`
    pub output_template: String,
    /// Format selector
    pub format: Option<&'static str>,
    /// Merge container
    pub merge_output_format: Option<&'static str>,
    /// Audio extraction settings
    pub audio: Option<AudioExtraction>,
    /// Declared age limit
    pub age_limit: Option<u8>,
    /// Cookie file, only when present on disk
    pub cookie_file: Option<PathBuf>,
    /// Proxy for this attempt
    pub proxy: Option<String>,
    /// User agent for this attempt
    pub user_agent: String,
    /// Request retries
    pub retries: u32,
    /// Fragment retries
    pub fragment_retries: u32,
    /// Socket timeout in seconds
    pub socket_timeout_secs: u64,
}

impl ExtractorOptions {
    /// Merge global defaults, optional credentials/proxy and the platform profile
    #[must_use]
    pub fn build(
        platform: Option<Platform>,
        output_base: &Path,
        cookie_file: Option<PathBuf>,
        proxy: Option<String>,
    ) -> Self {
        let profile = platform.map(PlatformProfile::for_platform);
        Self {
            output_template: format!("{}.%(ext)s", output_base.display()),
            format: profile.map(|p| p.format),
            merge_output_format: profile.and_then(|p| p.merge_output_format),
            audio: profile.and_then(|p| p.audio),
            age_limit: profile.and_then(|p| p.age_limit),
            cookie_file,
            proxy,
            user_agent: random_user_agent().to_string(),
            retries: EXTRACTOR_RETRIES,
            fragment_retries: EXTRACTOR_FRAGMENT_RETRIES,
            socket_timeout_secs: EXTRACTOR_SOCKET_TIMEOUT_SECS,
        }
    }

    /// Render the options as yt-dlp command-line arguments
    #[must_use]
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            "-o".to_string(),
            self.output_template.clone(),
            "--restrict-filenames".to_string(),
            "--no-playlist".to_string(),
            "--retries".to_string(),
            self.retries.to_string(),
            "--fragment-retries".to_string(),
            self.fragment_retries.to_string(),
            "--socket-timeout".to_string(),
            self.socket_timeout_secs.to_string(),
            "--user-agent".to_string(),
            self.user_agent.clone(),
        ];

        if let Some(format) = self.format {
            args.extend(["-f".to_string(), format.to_string()]);
        }
        if let Some(container) = self.merge_output_format {
            args.extend(["--merge-output-format".to_string(), container.to_string()]);
        }
        if let Some(audio) = self.audio {
            args.extend([
                "-x".to_string(),
                "--audio-format".to_string(),
                audio.codec.to_string(),
                "--audio-quality".to_string(),
                audio.bitrate.to_string(),
            ]);
        }
        if let Some(age) = self.age_limit {
            args.extend(["--age-limit".to_string(), age.to_string()]);
        }
        if let Some(ref cookies) = self.cookie_file {
            args.extend(["--cookies".to_string(), cookies.display().to_string()]);
        }
        if let Some(ref proxy) = self.proxy {
            args.extend(["--proxy".to_string(), proxy.clone()]);
        }
        args
    }
}

/// Static configuration of the yt-dlp extractor
#[derive(Debug, Clone)]
pub struct YtDlpConfig {
    /// Binary name or path
    pub binary: PathBuf,
    /// Cookie file consulted when present
    pub cookie_file: PathBuf,
    /// Proxy pool
    pub proxies: Vec<String>,
    /// Hard timeout of a download
    pub timeout: Duration,
    /// Timeout of a metadata probe
    pub probe_timeout: Duration,
    /// Maximum accepted file size
    pub max_file_size: u64,
}

impl YtDlpConfig {
    /// Extract the relevant settings
    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            binary: PathBuf::from(&settings.ytdlp_path),
            cookie_file: settings.cookie_path(),
            proxies: settings.proxies(),
            timeout: settings.extractor_timeout(),
            probe_timeout: settings.probe_timeout(),
            max_file_size: settings.max_file_size,
        }
    }
}

/// Fields of `--dump-json` output the relay cares about
#[derive(Debug, Deserialize)]
struct ProbeJson {
    title: Option<String>,
    duration: Option<f64>,
    uploader: Option<String>,
}

/// Media extractor backed by the yt-dlp command-line tool
pub struct YtDlpExtractor {
    config: YtDlpConfig,
    allocator: TempPathAllocator,
}

impl YtDlpExtractor {
    /// Create an extractor
    #[must_use]
    pub const fn new(config: YtDlpConfig, allocator: TempPathAllocator) -> Self {
        Self { config, allocator }
    }

    /// Create an extractor from settings
    #[must_use]
    pub fn from_settings(settings: &Settings, allocator: TempPathAllocator) -> Self {
        Self::new(YtDlpConfig::from_settings(settings), allocator)
    }

    async fn cookie_file(&self) -> Option<PathBuf> {
        let path = &self.config.cookie_file;
        if tokio::fs::try_exists(path).await.unwrap_or(false) {
            info!(path = %path.display(), "Using cookies");
            Some(path.clone())
        } else {
            None
        }
    }

    /// Run yt-dlp with a hard timeout; the child is killed when the timeout fires
    async fn run(&self, args: &[String], timeout: Duration) -> Result<Output, RelayError> {
        let child = Command::new(&self.config.binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RelayError::Extraction(format!("Failed to start yt-dlp: {e}")))?;

        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(RelayError::Extraction(format!("yt-dlp I/O error: {e}"))),
            Err(_) => Err(RelayError::Extraction(format!(
                "yt-dlp timed out after {}s",
                timeout.as_secs()
            ))),
        }
    }

    /// Locate the produced file: the printed final path, else a prefix scan
    async fn resolve_output(&self, base: &Path, stdout: &str) -> Option<PathBuf> {
        for line in stdout.lines().rev().map(str::trim).filter(|l| !l.is_empty()) {
            let candidate = PathBuf::from(line);
            if tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
                return Some(candidate);
            }
        }

        let stem = base.file_name()?.to_str()?.to_string();
        let mut entries = tokio::fs::read_dir(base.parent()?).await.ok()?;
        let mut best: Option<(u64, PathBuf)> = None;
        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with(&stem) || name.ends_with(".part") || name.ends_with(".ytdl") {
                continue;
            }
            let size = entry.metadata().await.map(|m| m.len()).unwrap_or(0);
            if best.as_ref().is_none_or(|(s, _)| size > *s) {
                best = Some((size, entry.path()));
            }
        }
        best.map(|(_, path)| path)
    }

    fn failure(platform: Option<Platform>, output: &Output) -> RelayError {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let diagnostics = if stderr.trim().is_empty() {
            String::from_utf8_lossy(&output.stdout).trim().to_string()
        } else {
            stderr.trim().to_string()
        };
        error!(
            status = ?output.status.code(),
            diagnostics = %diagnostics,
            "yt-dlp failed"
        );
        let source = platform.map_or("platform", Platform::display_name);
        let exit = output
            .status
            .code()
            .map_or_else(|| "killed by signal".to_string(), |code| format!("exit {code}"));
        RelayError::Extraction(format!(
            "Failed to download from {source} ({exit}): {}",
            excerpt(&diagnostics, EXTRACTOR_DIAGNOSTIC_CHARS)
        ))
    }

    async fn finish(
        &self,
        platform: Option<Platform>,
        base: &Path,
        output: &Output,
    ) -> Result<RetrievalResult, RelayError> {
        if !output.status.success() {
            return Err(Self::failure(platform, output));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let path = self.resolve_output(base, &stdout).await.ok_or_else(|| {
            RelayError::Extraction(format!(
                "Downloaded file not found: {}",
                base.display()
            ))
        })?;

        let size = tokio::fs::metadata(&path).await?.len();
        if size > self.config.max_file_size {
            remove_quietly(&path).await;
            return Err(RelayError::TooLarge {
                size,
                limit: self.config.max_file_size,
            });
        }

        info!(path = %path.display(), size = %format_bytes(size), "yt-dlp success");
        Ok(RetrievalResult {
            path,
            size,
            strategy: Strategy::Extractor,
        })
    }
}

#[async_trait]
impl MediaExtractor for YtDlpExtractor {
    async fn probe(&self, url: &str) -> Option<MediaInfo> {
        Platform::detect(url)?;

        let mut args = vec![
            "--dump-json".to_string(),
            "--no-download".to_string(),
            "--no-warnings".to_string(),
            "--no-playlist".to_string(),
            "--socket-timeout".to_string(),
            EXTRACTOR_SOCKET_TIMEOUT_SECS.to_string(),
            "--user-agent".to_string(),
            random_user_agent().to_string(),
        ];
        if let Some(cookies) = self.cookie_file().await {
            args.extend(["--cookies".to_string(), cookies.display().to_string()]);
        }
        if let Some(proxy) = random_proxy(&self.config.proxies) {
            args.extend(["--proxy".to_string(), proxy]);
        }
        args.push(url.to_string());

        let output = match self.run(&args, self.config.probe_timeout).await {
            Ok(output) if output.status.success() => output,
            Ok(output) => {
                debug!(
                    stderr = %String::from_utf8_lossy(&output.stderr),
                    "Metadata probe failed"
                );
                return None;
            }
            Err(e) => {
                debug!(error = %e, "Metadata probe failed");
                return None;
            }
        };

        let line = String::from_utf8_lossy(&output.stdout);
        let json: ProbeJson = serde_json::from_str(line.lines().next()?.trim())
            .map_err(|e| debug!(error = %e, "Probe returned invalid JSON"))
            .ok()?;

        Some(MediaInfo {
            title: json.title,
            duration_secs: json.duration,
            uploader: json.uploader,
        })
    }

    async fn extract(&self, request: &RetrievalRequest) -> Result<RetrievalResult, RelayError> {
        let platform = Platform::detect(&request.url);
        let platform_id = platform.map_or("unknown", Platform::id);
        let base = self.allocator.allocate(&format!("ytdlp_{platform_id}"));

        info!(
            url = %request.url,
            platform = platform_id,
            output = %base.display(),
            file_name = ?request.file_name,
            "yt-dlp download started"
        );

        let proxy = random_proxy(&self.config.proxies);
        if let Some(ref p) = proxy {
            info!(proxy = %p, "Using proxy");
        }
        let options = ExtractorOptions::build(platform, &base, self.cookie_file().await, proxy);

        let mut args = options.to_args();
        args.extend([
            "--max-filesize".to_string(),
            self.config.max_file_size.to_string(),
            "--print".to_string(),
            "after_move:filepath".to_string(),
            request.url.clone(),
        ]);

        let result = match self.run(&args, self.config.timeout).await {
            Ok(output) => self.finish(platform, &base, &output).await,
            Err(e) => Err(e),
        };

        if let Err(ref e) = result {
            let removed = remove_with_prefix(&base).await;
            warn!(error = %e, partial_files_removed = removed, "yt-dlp extraction failed");
        }
        result
    }
}
