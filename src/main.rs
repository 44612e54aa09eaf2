use anyhow::Context;
use dotenvy::dotenv;
use oxide_relay::api::{create_router, AppState};
use oxide_relay::bot::TelegramTransfer;
use oxide_relay::config::{Settings, SERVICE_NAME, SERVICE_VERSION};
use oxide_relay::job::JobOrchestrator;
use oxide_relay::retrieval::temp_path::ensure_dir;
use regex::Regex;
use std::io::{self, Write};
use std::net::SocketAddr;
use std::sync::Arc;
use teloxide::prelude::*;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::{prelude::*, EnvFilter};

/// Regex patterns for redacting sensitive data
struct RedactionPatterns {
    token1: Regex,
    token2: Regex,
    token3: Regex,
    proxy_credentials: Regex,
}

impl RedactionPatterns {
    /// Initialize all regex patterns
    ///
    /// # Errors
    ///
    /// Returns an error if any regex pattern is invalid
    fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            token1: Regex::new(r"(https?://[^/]+/(?:file/)?bot)([0-9]+:[A-Za-z0-9_-]+)(/['\s]*)")?,
            token2: Regex::new(r"([0-9]{8,10}:[A-Za-z0-9_-]{35})")?,
            token3: Regex::new(r"(bot[0-9]{8,10}:)[A-Za-z0-9_-]+")?,
            proxy_credentials: Regex::new(r"([a-z][a-z0-9+.-]*://)[^/\s:@]+:[^/\s@]+@")?,
        })
    }

    fn redact(&self, input: &str) -> String {
        let mut output = input.to_string();
        output = self
            .token1
            .replace_all(&output, "$1[TELEGRAM_TOKEN]$3")
            .to_string();
        output = self
            .token2
            .replace_all(&output, "[TELEGRAM_TOKEN]")
            .to_string();
        output = self
            .token3
            .replace_all(&output, "$1[TELEGRAM_TOKEN]")
            .to_string();
        output = self
            .proxy_credentials
            .replace_all(&output, "$1[MASKED]@")
            .to_string();
        output
    }
}

struct RedactingWriter<W: Write> {
    inner: W,
    patterns: Arc<RedactionPatterns>,
}

impl<W: Write> RedactingWriter<W> {
    const fn new(inner: W, patterns: Arc<RedactionPatterns>) -> Self {
        Self { inner, patterns }
    }
}

impl<W: Write> Write for RedactingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let s = String::from_utf8_lossy(buf);
        let redacted = self.patterns.redact(&s);
        self.inner.write_all(redacted.as_bytes())?;
        // The caller's buffer was consumed in full even if the redacted text is shorter
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

struct RedactingMakeWriter<F> {
    make_inner: F,
    patterns: Arc<RedactionPatterns>,
}

impl<F> RedactingMakeWriter<F> {
    const fn new(make_inner: F, patterns: Arc<RedactionPatterns>) -> Self {
        Self {
            make_inner,
            patterns,
        }
    }
}

impl<'a, F, W> tracing_subscriber::fmt::MakeWriter<'a> for RedactingMakeWriter<F>
where
    F: Fn() -> W + 'static,
    W: Write,
{
    type Writer = RedactingWriter<W>;

    fn make_writer(&'a self) -> Self::Writer {
        RedactingWriter::new((self.make_inner)(), self.patterns.clone())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    // Compiled before logging so nothing unredacted is ever written
    let patterns = Arc::new(RedactionPatterns::new().map_err(|e| {
        eprintln!("Failed to compile regex patterns: {e}");
        e
    })?);
    init_logging(patterns);

    info!("Starting {SERVICE_NAME} v{SERVICE_VERSION}");

    let settings = init_settings();

    let download_dir = settings.download_path();
    ensure_dir(&download_dir)
        .await
        .with_context(|| format!("Failed to create {}", download_dir.display()))?;
    info!(download_dir = %download_dir.display(), "Download directory ready");

    let transfer = init_transfer(&settings).await;
    let orchestrator = JobOrchestrator::from_settings(&settings, transfer);

    let secret = settings.backend_secret.clone().unwrap_or_default();
    let app = create_router(AppState::new(orchestrator, secret));

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(%addr, "Server ready");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    info!("Bye!");
    Ok(())
}

fn init_logging(patterns: Arc<RedactionPatterns>) {
    let make_writer = RedactingMakeWriter::new(io::stderr, patterns);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(make_writer))
        .init();
}

fn init_settings() -> Arc<Settings> {
    match Settings::new() {
        Ok(s) => {
            info!("Configuration loaded successfully.");
            Arc::new(s)
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    }
}

async fn init_transfer(settings: &Settings) -> Arc<TelegramTransfer> {
    let transfer = match TelegramTransfer::from_settings(settings) {
        Ok(t) => t,
        Err(e) => {
            error!("Failed to initialize Telegram client: {}", e);
            std::process::exit(1);
        }
    };

    match transfer.bot().get_me().await {
        Ok(me) => info!(username = %me.username(), "Telegram bot connected"),
        Err(e) => {
            error!("Telegram getMe failed: {}", e);
            std::process::exit(1);
        }
    }
    Arc::new(transfer)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    info!("Shutting down...");
}
