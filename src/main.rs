use anyhow::Result;
use quartz::config::EngineConfig;

fn main() -> Result<()> {
    // Logs go to stderr: stdout belongs to the UCI protocol.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "quartz=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = EngineConfig::from_env();

    // A single CLI argument overrides the network path from the environment.
    if let Some(path) = std::env::args().nth(1) {
        config.net_path = Some(path);
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        tt_log2 = config.tt_log2,
        net = config.net_path.as_deref().unwrap_or("<none>"),
        "quartz starting"
    );

    quartz::uci::run(config)
}
