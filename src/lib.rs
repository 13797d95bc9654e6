pub mod config;
pub mod query;
pub mod storage;

use anyhow::Context;
use dimse::ScuBuilder;
use tracing_subscriber::{self, prelude::*, EnvFilter};

use crate::config::config::Config;
use crate::config::logging_config::LoggingConfig;
use crate::query::{ChannelReporter, DicomQuery, ProgressEvent};

pub use query::{FilterSet, FilterValue, ProgressReporter};
pub use storage::ResultIngestor;

/// Install the global tracing subscriber
pub fn init_tracing(logging: &LoggingConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.log_level));

    let stdout_appender = tracing_subscriber::fmt::layer()
        .with_file(true)
        .with_line_number(true);

    let file_appender = if logging.log_to_file {
        let file = std::fs::File::create(&logging.log_file_path)
            .with_context(|| format!("Failed to create log file {}", logging.log_file_path))?;
        Some(
            tracing_subscriber::fmt::layer()
                .with_file(true)
                .with_line_number(true)
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file)),
        )
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(file_appender)
        .with(stdout_appender)
        .try_init()
        .context("Failed to initialize logging")?;
    Ok(())
}

/// Run one query against the configured peer, printing progress to stdout.
/// Ctrl-C stops the cascade before its next series query.
pub async fn run(config: Config) -> anyhow::Result<()> {
    init_tracing(&config.logging)?;

    tracing::info!(
        "🔎 Querying {}@{}:{} as {}",
        config.query.called_ae_title,
        config.query.host,
        config.query.port,
        config.query.calling_ae_title
    );

    let ingestor = storage::create_ingestor(&config.storage)
        .map_err(|e| anyhow::anyhow!("Failed to create result store: {}", e))?;
    let scu = ScuBuilder::from_config(config.scu.clone()).build()?;
    let mut query = DicomQuery::from_config(&config.query, scu);

    let cancel = query.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, finishing current query");
            cancel.cancel();
        }
    });

    let (reporter, mut events) = ChannelReporter::channel();
    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                ProgressEvent::Message(text) => println!("{}", text),
                ProgressEvent::Percent(percent) => println!("[{:>3}%]", percent),
            }
        }
    });

    query.run_query(ingestor.as_ref(), &reporter).await;
    drop(reporter);
    printer.await?;

    tracing::info!(
        "✅ {} studies queried",
        query.study_instance_uids_queried().len()
    );
    Ok(())
}
