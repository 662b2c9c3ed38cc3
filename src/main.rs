#![allow(clippy::result_large_err)]

use dotenvy::dotenv;
use lantern::{
    bot, config,
    di::DependencyInjectionManager,
    errors::{Error, Result},
};
use std::{env, sync::Arc};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file, non-fatal since env vars can be set externally
    dotenv().ok();
    info!("Attempted to load .env file.");

    // 3. Load settings and fix the injection switch before any container exists
    let settings = Arc::new(config::load_app_settings()?);
    if !config::set_di_enabled(settings.di_enabled()) {
        warn!("Dependency injection switch was already set; settings file value ignored");
    }

    // 4. Register dependencies shared by every command
    let data = bot::BotData::new(Arc::new(DependencyInjectionManager::new()), settings);
    bot::register_dependencies(&data)
        .inspect_err(|e| error!("Failed to register dependencies: {}", e))?;
    let di = Arc::clone(&data.di);

    // 5. Run the bot
    let token = env::var("DISCORD_BOT_TOKEN")
        .inspect_err(|e| error!("DISCORD_BOT_TOKEN not found: {}", e))
        .map_err(Error::EnvVar)?;

    let outcome = bot::run_bot(token, data)
        .await
        .map_err(Error::from);

    // 6. Release root dependencies even if the client stopped with an error
    di.close()
        .await
        .inspect(|()| info!("Dependency containers closed."))
        .inspect_err(|e| error!("Failed to close dependency containers: {}", e))?;

    outcome
}
