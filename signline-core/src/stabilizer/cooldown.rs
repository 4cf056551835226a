//! Repeat suppression for announced words.
//!
//! A word may be announced again only once it has "rested" for longer than
//! the cooldown interval, unless a different word takes its place first.
//! All timing uses `Instant`, so wall-clock jumps never reopen the gate.

use std::time::{Duration, Instant};

/// The most recently announced word and when it was announced.
///
/// At most one exists per stabilizer; each announcement overwrites it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnouncedWord {
    pub word: String,
    pub at: Instant,
}

/// Pure gate decision.
///
/// Allows `candidate` iff there is no previous word, the candidate differs
/// from it, or strictly more than `interval` has elapsed since it was
/// announced.
pub fn cooldown_allows(
    candidate: &str,
    last: Option<&AnnouncedWord>,
    now: Instant,
    interval: Duration,
) -> bool {
    match last {
        None => true,
        Some(last) => {
            candidate != last.word || now.saturating_duration_since(last.at) > interval
        }
    }
}

/// Stateful wrapper around [`cooldown_allows`] holding the current word.
#[derive(Debug, Clone)]
pub struct CooldownGate {
    interval: Duration,
    last: Option<AnnouncedWord>,
}

impl CooldownGate {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn allows(&self, candidate: &str, now: Instant) -> bool {
        cooldown_allows(candidate, self.last.as_ref(), now, self.interval)
    }

    /// Overwrite the current word. Returns the stored record.
    pub fn record(&mut self, word: &str, now: Instant) -> &AnnouncedWord {
        self.last.insert(AnnouncedWord {
            word: word.to_string(),
            at: now,
        })
    }

    pub fn last(&self) -> Option<&AnnouncedWord> {
        self.last.as_ref()
    }

    /// Forget the current word so the next candidate is always allowed.
    pub fn reset(&mut self) {
        self.last = None;
    }
}
