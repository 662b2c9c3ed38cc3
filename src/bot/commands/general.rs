//! General Discord commands - ping, whoami and help.
//!
//! Command bodies are [`Invoke`]s with declared signatures: the invocation arrives
//! positionally and everything else is injected from the command container, or passed by
//! name when dependency injection is disabled.

use crate::{
    bot::services::{Replies, StartedAt},
    config::Settings,
    di::{BoxError, DependencyExpression, Key, Parameter, Signature},
    execution::{Invocation, Invoke},
};
use std::sync::LazyLock;

static PING: LazyLock<Invoke> = LazyLock::new(|| {
    Invoke::new(
        Signature::new()
            .param(Parameter::positional_only("invocation"))
            .param(Parameter::new("started").annotated(Key::<StartedAt>::new()).injected())
            .param(Parameter::new("replies").annotated(Key::<Replies>::new()).injected()),
        |args| async move {
            let started = args.get::<StartedAt>("started")?;
            let replies = args.get::<Replies>("replies")?;
            replies.push(format!("Pong! Up for {}s", started.uptime().as_secs()));
            Ok::<(), BoxError>(())
        },
    )
});

static WHOAMI: LazyLock<Invoke> = LazyLock::new(|| {
    Invoke::new(
        Signature::new()
            .param(Parameter::positional_only("invocation"))
            .param(Parameter::new("replies").annotated(Key::<Replies>::new()).injected())
            .param(
                Parameter::keyword_only("settings")
                    .annotated(DependencyExpression::of(Key::<Settings>::new()).or_none())
                    .injected(),
            ),
        |args| async move {
            let invocation = args.get::<Invocation>("invocation")?;
            let replies = args.get::<Replies>("replies")?;
            let prefix = args
                .get_optional::<Settings>("settings")?
                .map_or_else(|| "!".to_string(), |s| s.bot.prefix.clone());

            let place = invocation
                .guild_id
                .map_or_else(|| "a direct message".to_string(), |id| format!("guild {id}"));
            replies.push(format!(
                "You are user {} running `{prefix}{}` in {place}",
                invocation.user_id, invocation.command
            ));
            Ok::<(), BoxError>(())
        },
    )
});

static HELP: LazyLock<Invoke> = LazyLock::new(|| {
    Invoke::new(
        Signature::new()
            .param(Parameter::positional_only("invocation"))
            .param(Parameter::new("replies").annotated(Key::<Replies>::new()).injected()),
        |args| async move {
            args.get::<Replies>("replies")?.push(
                "**Lantern Help**\n\
                • `/ping` - Checks if the bot is responsive.\n\
                • `/whoami` - Shows who invoked the command and where.\n\
                • `/help` - Shows this help message.",
            );
            Ok::<(), BoxError>(())
        },
    )
});

// Inner module to suppress missing_docs warnings for poise macro-generated code
mod inner {
    #![allow(missing_docs)]

    use crate::{
        bot::{Context, run_command},
        errors::Result,
    };

    /// Responds with "Pong!" and the bot's uptime.
    #[poise::command(slash_command, prefix_command)]
    pub async fn ping(ctx: Context<'_>) -> Result<()> {
        run_command(ctx, &super::PING).await
    }

    /// Shows who invoked the command and where.
    #[poise::command(slash_command, prefix_command)]
    pub async fn whoami(ctx: Context<'_>) -> Result<()> {
        run_command(ctx, &super::WHOAMI).await
    }

    /// Displays help information about available commands.
    #[poise::command(slash_command, prefix_command)]
    pub async fn help(ctx: Context<'_>) -> Result<()> {
        run_command(ctx, &super::HELP).await
    }
}

// Re-export all commands
pub use inner::*;
