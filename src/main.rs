//! Application entry point for the `signal-mapper` contributor daemon.
//!
//! This binary orchestrates the full startup sequence, including:
//! - Loading configuration from environment variables or `.env`
//! - Initializing structured logging/tracing
//! - Opening the local SQLite queue store and creating its schema
//! - Starting the push channel task and its consumer
//! - Retrying any samples queued by a previous run, then pulling the heat layer
//! - Binding the local control surface via the `routes` gateway (EMBP)
//!
//! # Environment Variables
//! - `SIGNAL_API_URL` (**required**) – backend base URL
//! - `SIGNAL_LOG_LEVEL` (optional) – log verbosity (default: `debug`)
//! - `SIGNAL_SPAN_EVENTS` (optional) – span event mode for tracing
//!
//! See `config.rs` for the remaining optional variables.
use std::{env, io::IsTerminal, sync::Arc};

use anyhow::{anyhow, Context, Result};
use axum::Router;
use dotenvy::dotenv;
use sqlx::sqlite::SqlitePoolOptions;
use tokio::sync::mpsc;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

use signal_mapper::{push, routes, schema, HttpApi, PushEvent, Session};

// ---

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    dotenv().ok();
    init_tracing();

    let cfg = signal_mapper::load_from_env()?;
    cfg.log_config();

    tracing::info!("Opening local queue store: {}", cfg.queue_db_url);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(&cfg.queue_db_url)
        .await
        .map_err(|e| anyhow!("Failed to open queue store '{}': {}", cfg.queue_db_url, e))?;

    schema::create_schema(&pool).await?;

    let api = HttpApi::new(&cfg.api_url, cfg.http_timeout).context("Failed to build HTTP client")?;

    let listen_addr = cfg.listen_addr;
    let push_url = cfg.push_url.clone();
    let push_reconnect = cfg.push_reconnect;
    let session = Arc::new(Session::new(cfg, api, pool));

    // The push task owns the socket; the consumer applies its events.
    let (push_tx, push_rx) = mpsc::channel(64);
    tokio::spawn(push::run(push_url, push_reconnect, push_tx));
    tokio::spawn(consume_push(session.clone(), push_rx));

    // Anything queued by a previous run goes out before the first pull.
    {
        let session = session.clone();
        tokio::spawn(async move { session.resync().await });
    }

    // Build app from routes gateway (EMBP)
    let app: Router = routes::router(session);

    tracing::info!("Listening on {}", listen_addr);

    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Apply push channel events to the session until the push task stops.
///
/// Every (re)connect retries the offline queue and re-pulls the heat layer,
/// since points broadcast while we were disconnected are not replayed.
async fn consume_push(session: Arc<Session<HttpApi>>, mut rx: mpsc::Receiver<PushEvent>) {
    // ---
    while let Some(event) = rx.recv().await {
        let connected = event == PushEvent::Connected;
        session.handle_push(event);
        if connected {
            let session = session.clone();
            tokio::spawn(async move { session.resync().await });
        }
    }
    tracing::warn!("Push channel task ended");
}

// ---

/// Initialize the global tracing subscriber for structured logging.
///
/// This function configures the [`tracing_subscriber`] with:
/// - Log target, file, and line number output enabled
/// - Color output controlled by TTY detection and `FORCE_COLOR` env var:
///   - `FORCE_COLOR=1|true|yes`: force colors on
///   - `FORCE_COLOR=0|false|no`: force colors off
///   - unset or other values: auto-detect TTY
/// - Span event emission mode controlled by the `SIGNAL_SPAN_EVENTS` env var:
///   - `"full"`       : emit ENTER, EXIT, and CLOSE events with timing
///   - `"enter_exit"` : emit ENTER and EXIT only
///   - unset or other values: emit CLOSE events only (default)
/// - Log level controlled by `RUST_LOG`, else the `SIGNAL_LOG_LEVEL` env var.
///   The fallback filter caps `tungstenite` and `hyper_util` at `info`: at
///   `debug` they log every push channel frame and every pooled backend
///   connection, which buries the daemon's own events.
///
/// Called once at startup, after `.env` is loaded so its log settings apply.
fn init_tracing() {
    // ---
    let span_events = match env::var("SIGNAL_SPAN_EVENTS").as_deref() {
        Ok("full") => FmtSpan::FULL,
        Ok("enter_exit") => FmtSpan::ENTER | FmtSpan::EXIT,
        _ => FmtSpan::CLOSE,
    };

    let use_color = match env::var("FORCE_COLOR").as_deref() {
        Ok("1") | Ok("true") | Ok("yes") => true,
        Ok("0") | Ok("false") | Ok("no") => false,
        _ => std::io::stdout().is_terminal(),
    };

    // Use RUST_LOG if available, otherwise fall back to SIGNAL_LOG_LEVEL
    let env_filter = if env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match env::var("SIGNAL_LOG_LEVEL").ok().as_deref() {
            Some("trace") => "trace",
            Some("debug") => "debug",
            Some("info") => "info",
            Some("warn") => "warn",
            Some("error") => "error",
            _ => "debug",
        };
        EnvFilter::new(format!(
            "{level},sqlx::query=warn,tungstenite=info,hyper_util=info"
        ))
    };

    tracing_subscriber::fmt()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(span_events)
        .with_env_filter(env_filter)
        .with_ansi(use_color)
        .compact()
        .init();
}
