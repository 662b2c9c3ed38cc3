use crate::di::lock;
use std::{
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

/// When the bot process started.
#[derive(Clone, Copy, Debug)]
pub struct StartedAt(Instant);

impl StartedAt {
    /// The current instant.
    #[must_use]
    pub fn now() -> Self {
        Self(Instant::now())
    }

    /// Time elapsed since start.
    #[must_use]
    pub fn uptime(&self) -> Duration {
        self.0.elapsed()
    }
}

/// Messages a command wants sent back to the invoking channel.
///
/// Added to each command container; the bot sends queued replies after the pipeline finishes.
#[derive(Clone, Debug, Default)]
pub struct Replies(Arc<Mutex<Vec<String>>>);

impl Replies {
    /// Queues a reply.
    pub fn push(&self, reply: impl Into<String>) {
        lock(&self.0).push(reply.into());
    }

    /// Removes and returns every queued reply, oldest first.
    #[must_use]
    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *lock(&self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replies_are_shared_between_clones() {
        let replies = Replies::default();
        let sink = replies.clone();
        sink.push("first");
        sink.push(String::from("second"));

        assert_eq!(replies.take(), ["first", "second"]);
        assert!(replies.take().is_empty());
    }
}
