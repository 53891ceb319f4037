use anyhow::Context;

use vpipe_media::{check_ffmpeg, check_ffprobe};
use vpipe_models::Stage;
use vpipe_queue::{JobStore, QueueConfig, RedisJobStore};
use vpipe_worker::{GeminiConfig, WorkerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;
    dotenvy::dotenv().ok();
    let config = WorkerConfig::from_env();

    println!(
        "worker-selfcheck: starting with concurrency process={} analyze={} strategy={}",
        config.process_concurrency, config.analyze_concurrency, config.strategy_concurrency
    );

    ensure_env_present(&["REDIS_URL", "GEMINI_API_KEY"])?;
    ensure_media_tools()?;
    GeminiConfig::from_env().context("invalid Gemini configuration")?;
    ensure_queue_reachable().await?;

    println!("worker-selfcheck: ok");
    Ok(())
}

fn ensure_media_tools() -> anyhow::Result<()> {
    let ffmpeg = check_ffmpeg().context("ffmpeg not available")?;
    let ffprobe = check_ffprobe().context("ffprobe not available")?;
    println!(
        "worker-selfcheck: ffmpeg={} ffprobe={}",
        ffmpeg.display(),
        ffprobe.display()
    );
    Ok(())
}

async fn ensure_queue_reachable() -> anyhow::Result<()> {
    let store = RedisJobStore::new(QueueConfig::from_env())?;
    store.ping().await.context("Redis did not answer PING")?;
    for stage in Stage::ALL {
        let counts = store
            .counts(stage)
            .await
            .with_context(|| format!("failed to read {} queue", stage))?;
        println!(
            "worker-selfcheck: {} waiting={} active={} delayed={} failed={}",
            stage, counts.waiting, counts.active, counts.delayed, counts.failed
        );
    }
    Ok(())
}

fn ensure_env_present(vars: &[&str]) -> anyhow::Result<()> {
    for var in vars {
        if std::env::var(var).is_err() {
            return Err(anyhow::anyhow!("missing required env var {}", var));
        }
    }
    Ok(())
}
