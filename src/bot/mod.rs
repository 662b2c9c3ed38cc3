//! Bot layer - Discord-specific interface and command handlers
//!
//! Commands run through the execution pipeline inside a command container, so their bodies
//! and hooks receive dependencies from the [`DependencyInjectionManager`].

/// Discord command implementations
pub mod commands;
/// Dependencies shared with commands
pub mod services;

use crate::{
    config::Settings,
    di::{Contexts, DependencyInjectionManager, Key, Value},
    errors::{Error, Result},
    execution::{self, ExecutionPipeline, ExecutionSteps, Invocation, Invoke},
};
use poise::serenity_prelude as serenity;
use services::{Replies, StartedAt};
use std::sync::Arc;
use tracing::{info, instrument};

/// Shared data available to all bot commands.
pub struct BotData {
    /// Registries and the root container
    pub di: Arc<DependencyInjectionManager>,
    /// Loaded application settings
    pub settings: Arc<Settings>,
    /// When the bot started
    pub started_at: StartedAt,
}

impl BotData {
    /// Creates a new `BotData` instance, starting the uptime clock now.
    #[must_use]
    pub fn new(di: Arc<DependencyInjectionManager>, settings: Arc<Settings>) -> Self {
        Self {
            di,
            settings,
            started_at: StartedAt::now(),
        }
    }
}

pub(crate) type Context<'a> = poise::Context<'a, BotData, Error>;

/// Registers the dependencies every command can rely on.
///
/// Must run before the first command is executed; registries are frozen once their
/// containers exist.
///
/// # Errors
/// Returns an error if a registry is already frozen.
pub fn register_dependencies(data: &BotData) -> Result<()> {
    let default = data.di.registry_for(&Contexts::DEFAULT);
    default.register_value(Key::<StartedAt>::new(), data.started_at, None)?;
    default.register_value(Key::<Settings>::new(), (*data.settings).clone(), None)?;
    info!("Registered default dependencies");
    Ok(())
}

/// Runs `invoke` for the current command through the execution pipeline.
///
/// Replies queued by the command are sent once the pipeline has finished.
pub(crate) async fn run_command(ctx: Context<'_>, invoke: &Invoke) -> Result<()> {
    let invocation = Invocation {
        command: ctx.command().qualified_name.clone(),
        user_id: ctx.author().id.get(),
        guild_id: ctx.guild_id().map(serenity::GuildId::get),
    };

    for reply in execute_invocation(ctx.data(), invocation, invoke).await? {
        ctx.say(reply).await?;
    }
    Ok(())
}

/// Runs `invoke` with the standard hooks and returns the replies it queued.
///
/// With dependency injection disabled no container exists, so the shared services are
/// passed to the command by name instead.
pub(crate) async fn execute_invocation(
    data: &BotData,
    invocation: Invocation,
    invoke: &Invoke,
) -> Result<Vec<String>> {
    let replies = Replies::default();
    let mut pipeline = ExecutionPipeline::new(
        invocation,
        ExecutionSteps::default_order(),
        commands::standard_hooks()?,
    );
    if !data.di.is_enabled() {
        pipeline = pipeline
            .with_argument("replies", replies.clone())
            .with_argument("started", data.started_at)
            .with_argument_value("settings", Arc::clone(&data.settings) as Value);
    }

    let sink = replies.clone();
    let run = execution::execute_with(&data.di, pipeline, invoke, move |container| {
        container.add_value(Key::<Replies>::new(), sink, None)
    });

    match data.settings.execution_timeout() {
        Some(limit) => tokio::time::timeout(limit, run)
            .await
            .map_err(|_| Error::Timeout(limit))??,
        None => run.await?,
    }
    Ok(replies.take())
}

async fn on_error(error: poise::FrameworkError<'_, BotData, Error>) {
    match error {
        poise::FrameworkError::Command { error, ctx, .. } => {
            tracing::error!("Error in command `{}`: {:?}", ctx.command().name, error);
            if let Err(e) = ctx.say(format!("An error occurred: {error}")).await {
                tracing::error!("Failed to send error message: {}", e);
            }
        }
        error => {
            if let Err(e) = poise::builtins::on_error(error).await {
                tracing::error!("Error while handling error: {}", e);
            }
        }
    }
}

/// Builds the poise framework and runs the Discord client until it stops.
///
/// # Errors
/// Returns the serenity error that stopped the client.
#[instrument(skip_all)]
pub async fn run_bot(token: String, data: BotData) -> std::result::Result<(), serenity::Error> {
    let prefix = data.settings.bot.prefix.clone();

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: vec![commands::ping(), commands::whoami(), commands::help()],
            prefix_options: poise::PrefixFrameworkOptions {
                prefix: Some(prefix),
                ..Default::default()
            },
            on_error: |error| Box::pin(on_error(error)),
            ..Default::default()
        })
        .setup(|ctx, ready, framework| {
            Box::pin(async move {
                info!("Logged in as {}", ready.user.name);
                info!("Registering commands globally...");
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;
                Ok(data)
            })
        })
        .build();

    let intents = serenity::GatewayIntents::GUILD_MESSAGES
        | serenity::GatewayIntents::DIRECT_MESSAGES
        | serenity::GatewayIntents::MESSAGE_CONTENT;

    info!("Setting up Serenity client for Poise framework...");
    let client = serenity::Client::builder(&token, intents)
        .framework(framework)
        .await;

    match client {
        Ok(mut c) => {
            info!("Starting bot client...");
            if let Err(why) = c.start().await {
                tracing::error!("Client error: {:?}", why);
                return Err(why);
            }
        }
        Err(e) => {
            tracing::error!("Error creating client: {:?}", e);
            return Err(e);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::{di::DiError, test_utils::{sample_bot_data, sample_invocation}};
    use std::time::Duration;

    #[tokio::test]
    async fn test_register_dependencies_populates_default_registry() {
        let data = sample_bot_data(true, Settings::default());
        register_dependencies(&data).unwrap();

        let default = data.di.registry_for(&Contexts::DEFAULT);
        assert!(default.contains(&Key::<StartedAt>::new()));
        assert!(default.contains(&Key::<Settings>::new()));
    }

    #[tokio::test]
    async fn test_register_dependencies_fails_once_frozen() {
        let data = sample_bot_data(true, Settings::default());
        data.di
            .enter_context(&Contexts::COMMAND, |_| async { Ok(()) })
            .await
            .unwrap();

        let result = register_dependencies(&data);
        assert!(matches!(result, Err(Error::Di(DiError::RegistryFrozen))));
        data.di.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_slow_command_times_out() {
        let mut settings = Settings::default();
        settings.bot.execution_timeout_secs = Some(0);
        let data = sample_bot_data(true, settings);
        let slow = Invoke::new(crate::di::Signature::new(), |_| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<(), crate::di::BoxError>(())
        });

        let result = execute_invocation(&data, sample_invocation("slow"), &slow).await;
        assert!(matches!(result, Err(Error::Timeout(limit)) if limit == Duration::ZERO));
        data.di.close().await.unwrap();
    }
}
