//! Rate limit for blocked-access update prompts

use std::time::{Duration, Instant};

/// Lets at most one update suggestion through per cooldown window
///
/// Several jobs usually hit the same block within moments of each other; only the first
/// should prompt. A successful engine update re-arms it immediately.
#[derive(Debug)]
pub(crate) struct BlockedAccessBreaker {
    cooldown: Duration,
    last_notified: Option<Instant>,
}

impl BlockedAccessBreaker {
    pub(crate) fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_notified: None,
        }
    }

    /// Whether a suggestion should go out now; records it if so
    pub(crate) fn should_notify(&mut self) -> bool {
        self.should_notify_at(Instant::now())
    }

    fn should_notify_at(&mut self, now: Instant) -> bool {
        let open = self
            .last_notified
            .is_none_or(|last| now.saturating_duration_since(last) >= self.cooldown);
        if open {
            self.last_notified = Some(now);
        }
        open
    }

    pub(crate) fn rearm(&mut self) {
        self.last_notified = None;
    }
}
