//! Fixed-size prediction window and the majority-vote decision rule.
//!
//! ## Algorithm
//!
//! 1. Every observation is pushed, regardless of confidence.
//! 2. When the window holds exactly N entries it is closed:
//!    a. keep the confident subset (`confidence ≥ τ`, NaN never qualifies);
//!    b. tally labels in first-seen order;
//!    c. the label with the highest count wins, ties going to the label
//!       seen first;
//!    d. the winner becomes the verdict iff `count / |subset| ≥ ratio`.
//! 3. The window is cleared after closing, whatever the outcome.

use std::fmt;

use ringbuf::{
    traits::{Consumer, Observer, RingBuffer},
    HeapRb,
};

use super::Observation;

/// Bounded FIFO of the last N observations.
pub struct PredictionWindow {
    ring: HeapRb<Observation>,
}

impl PredictionWindow {
    /// # Panics
    /// Panics if `size` is zero. `StabilizerConfig::validate` rejects that.
    pub fn new(size: usize) -> Self {
        Self {
            ring: HeapRb::new(size),
        }
    }

    pub fn capacity(&self) -> usize {
        self.ring.capacity().get()
    }

    pub fn len(&self) -> usize {
        self.ring.occupied_len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.ring.is_full()
    }

    /// Append an observation, evicting the oldest one on overflow.
    pub fn push(&mut self, observation: Observation) {
        self.ring.push_overwrite(observation);
    }

    /// Oldest-first iteration.
    pub fn iter(&self) -> impl Iterator<Item = &Observation> {
        self.ring.iter()
    }

    pub fn clear(&mut self) {
        Consumer::clear(&mut self.ring);
    }
}

impl fmt::Debug for PredictionWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PredictionWindow")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .finish()
    }
}

/// Outcome of closing a full window.
#[derive(Debug, Clone, PartialEq)]
pub enum WindowVerdict {
    /// No observation met the confidence threshold.
    NoConfident,
    /// The most frequent label fell short of the majority ratio.
    NoMajority {
        label: String,
        count: usize,
        confident: usize,
    },
    /// `label` holds at least the majority ratio of the confident subset.
    Majority {
        label: String,
        count: usize,
        confident: usize,
        /// Mean confidence of the winning label's confident observations.
        mean_confidence: f32,
    },
}

impl WindowVerdict {
    pub fn label(&self) -> Option<&str> {
        match self {
            WindowVerdict::Majority { label, .. } => Some(label),
            _ => None,
        }
    }
}

/// `confidence ≥ threshold`. NaN is never confident.
pub fn is_confident(confidence: f32, threshold: f32) -> bool {
    !confidence.is_nan() && confidence >= threshold
}

struct Tally<'a> {
    label: &'a str,
    count: usize,
    confidence_sum: f32,
}

/// Run the majority vote over `observations` (oldest first).
///
/// Pure function of the sequence: only relative order matters, and only for
/// breaking ties.
pub fn majority_vote<'a, I>(observations: I, threshold: f32, majority_ratio: f32) -> WindowVerdict
where
    I: IntoIterator<Item = &'a Observation>,
{
    // Ordered tally: a Vec keeps first-seen order so ties are deterministic.
    let mut tally: Vec<Tally<'a>> = Vec::new();
    let mut confident = 0usize;

    for obs in observations {
        if !is_confident(obs.confidence, threshold) {
            continue;
        }
        confident += 1;
        match tally.iter_mut().find(|t| t.label == obs.label) {
            Some(t) => {
                t.count += 1;
                t.confidence_sum += obs.confidence;
            }
            None => tally.push(Tally {
                label: &obs.label,
                count: 1,
                confidence_sum: obs.confidence,
            }),
        }
    }

    let mut best: Option<&Tally<'a>> = None;
    for t in &tally {
        // Strictly greater: an equal later count never displaces the first.
        if best.map_or(true, |b| t.count > b.count) {
            best = Some(t);
        }
    }

    let Some(best) = best else {
        return WindowVerdict::NoConfident;
    };

    let share = best.count as f64 / confident as f64;
    if share >= f64::from(majority_ratio) {
        WindowVerdict::Majority {
            label: best.label.to_string(),
            count: best.count,
            confident,
            mean_confidence: best.confidence_sum / best.count as f32,
        }
    } else {
        WindowVerdict::NoMajority {
            label: best.label.to_string(),
            count: best.count,
            confident,
        }
    }
}
