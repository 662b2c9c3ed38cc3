use crate::{
    di::{BoxError, DiError},
    execution::HookFailure,
};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Environment variable error: {0}")]
    EnvVar(#[from] std::env::VarError),

    #[error("Dependency injection error: {0}")]
    Di(#[from] DiError),

    #[error("no dependency injection context is active")]
    NoDiContext,

    #[error("cannot enter dependency injection context {0:?} directly")]
    InvalidContext(String),

    #[error("invalid execution hook: {0}")]
    InvalidHook(String),

    #[error("Handler error: {0}")]
    Handler(#[source] BoxError),

    #[error("command execution timed out after {0:?}")]
    Timeout(Duration),

    #[error(
        "command execution failed ({} hook failure(s), invocation failed: {})",
        .hook_failures.len(),
        .invocation_failure.is_some()
    )]
    PipelineFailed {
        hook_failures: Vec<HookFailure>,
        invocation_failure: Option<Box<Error>>,
    },

    #[error("Serenity/Poise framework error: {0}")]
    #[allow(clippy::enum_variant_names)]
    FrameworkError(Box<poise::serenity_prelude::Error>),
}

impl From<poise::serenity_prelude::Error> for Error {
    fn from(value: poise::serenity_prelude::Error) -> Self {
        Error::FrameworkError(Box::new(value))
    }
}

// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
