//! Shared test utilities for `lantern`.
//!
//! Helpers for tracing output, teardown bookkeeping, sample invocations and bot data.

use crate::{
    bot::BotData,
    config::Settings,
    di::{DependencyInjectionManager, Teardown},
    execution::Invocation,
};
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

/// Routes tracing output through the test harness so it is shown for failing tests.
///
/// Safe to call from every test; only the first call installs a subscriber.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("lantern=debug")
        .try_init();
}

/// A teardown that increments `counter` each time it runs.
pub fn counting_teardown<T: Send + Sync + 'static>(counter: &Arc<AtomicUsize>) -> Teardown<T> {
    let counter = Arc::clone(counter);
    Teardown::sync(move |_: Arc<T>| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })
}

/// An invocation of `command` with sensible defaults.
///
/// # Defaults
/// * `user_id`: 42
/// * `guild_id`: `Some(7)`
pub fn sample_invocation(command: &str) -> Invocation {
    Invocation {
        command: command.to_string(),
        user_id: 42,
        guild_id: Some(7),
    }
}

/// Bot data around a fresh manager that is explicitly enabled or disabled.
pub fn sample_bot_data(di_enabled: bool, settings: Settings) -> BotData {
    BotData::new(
        Arc::new(DependencyInjectionManager::with_enabled(di_enabled)),
        Arc::new(settings),
    )
}
