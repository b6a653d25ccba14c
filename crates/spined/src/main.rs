//! spined - market-data spine daemon

use clap::Parser;
use spine_config::Config;
use spined::Core;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "spined", about = "Market-data distribution spine", version)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "spine.toml")]
    config: String,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = Config::load(&args.config)?;

    init_tracing(&config);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.pipeline.publisher_lanes.max(1))
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let core = Core::start(config).await?;

        tokio::signal::ctrl_c().await?;
        tracing::info!("shutdown signal received");
        core.stop().await;
        Ok(())
    })
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone()));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if config.logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}
