use tracing::{subscriber, Level};
use tracing_subscriber::FmtSubscriber;

/// Installs the global log subscriber at the configured level.
pub fn init_tracing(level: Level) -> anyhow::Result<()> {
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();

    subscriber::set_global_default(subscriber)?;
    tracing::info!("logging initialized at level {}", level);

    Ok(())
}
