// crates/server/src/main.rs
//! jobtrail server binary.

use anyhow::{Context, Result};
use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use jobtrail_server::{create_app, init_metrics, AppState, ServerConfig};

/// Console logging, plus daily-rotated files when `log_dir` is set.
///
/// The returned guard must live as long as the process or buffered file
/// output is lost.
fn init_tracing(config: &ServerConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console = fmt::layer().compact();

    match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "jobtrail.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(console)
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .try_init()?;
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(console)
                .try_init()?;
            Ok(None)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = ServerConfig::parse();
    let _log_guard = init_tracing(&config)?;

    init_metrics();

    let jobs_root = config.jobs_root()?;
    std::fs::create_dir_all(&jobs_root)
        .with_context(|| format!("creating jobs directory {}", jobs_root.display()))?;

    let state = AppState::with_options(&jobs_root, config.job_options());
    let app = create_app(state);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        %addr,
        jobs_root = %jobs_root.display(),
        "jobtrail listening"
    );

    axum::serve(listener, app).await?;

    Ok(())
}
