use anyhow::Result;
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install a stderr subscriber. `RUST_LOG` wins over `level`.
pub fn init_logging(level: Level) -> Result<()> {
    let level_str = level.as_str().to_lowercase();
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("dynwire={level_str},dynwire_client={level_str}").into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()?;
    Ok(())
}
