//! Pipeline worker binary.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vpipe_media::FfmpegMedia;
use vpipe_queue::{QueueConfig, RedisJobStore};
use vpipe_storage::RedisVideoRepository;
use vpipe_worker::{GeminiClient, Pipeline, PipelineDeps, WorkerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    dotenvy::dotenv().ok();
    init_tracing()?;

    info!("Starting vpipe-worker");

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    if let Some(port) = config.metrics_port {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("failed to install Prometheus exporter")?;
        info!("Metrics exporter listening on {}", addr);
    }

    let queue_config = QueueConfig::from_env();
    let store = RedisJobStore::new(queue_config).context("failed to create job store")?;
    let videos = RedisVideoRepository::from_env().context("failed to create video repository")?;
    let provider = GeminiClient::from_env().context("failed to create Gemini client")?;

    let pipeline = Pipeline::new(PipelineDeps {
        store: Arc::new(store),
        videos: Arc::new(videos),
        media: Arc::new(FfmpegMedia::new()),
        provider: Arc::new(provider),
        config,
    });

    pipeline.start().await;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("Received shutdown signal");

    pipeline.stop().await;
    info!("Worker shutdown complete");
    Ok(())
}

fn init_tracing() -> anyhow::Result<()> {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let mut env_filter = EnvFilter::from_default_env();
    for crate_name in ["vpipe_worker", "vpipe_queue", "vpipe_media", "vpipe_storage"] {
        env_filter = env_filter.add_directive(format!("{}=info", crate_name).parse()?);
    }

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false),
            )
            .with(env_filter)
            .init();
    }
    Ok(())
}
