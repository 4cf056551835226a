//! `Stabilizer`: turns per-frame classifications into announced words.
//!
//! ## Policies
//!
//! ```text
//! PerFrame:  observe ─► confidence ≥ τ ? ─► CooldownGate ─► announce
//! Windowed:  observe ─► PredictionWindow (N) ─► full? ─► majority_vote
//!                                                          │
//!                                          clear window ◄──┤
//!                                                          ▼
//!                                                    CooldownGate ─► announce
//! ```
//!
//! ## States
//!
//! `Idle` (no current word) and `Announcing` (a current word exists and may
//! be under cooldown). Only a qualifying verdict moves the machine; `clear()`
//! returns it to `Idle` and empties every buffer.
//!
//! Frames without a detected hand never reach `observe`; they leave all
//! state untouched, including the cooldown clock.

pub mod cooldown;
pub mod sentence;
pub mod window;

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Result, SignlineError};
use crate::format::{SentenceCase, SentenceFormatter};

pub use cooldown::{cooldown_allows, AnnouncedWord, CooldownGate};
pub use sentence::SentenceBuffer;
pub use window::{is_confident, majority_vote, PredictionWindow, WindowVerdict};

/// One frame's classifier output. Only produced when a hand was detected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub label: String,
    /// Probability of `label`, in [0, 1].
    pub confidence: f32,
}

impl Observation {
    pub fn new(label: impl Into<String>, confidence: f32) -> Self {
        Self {
            label: label.into(),
            confidence,
        }
    }
}

/// How verdicts are reached before cooldown gating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DecisionPolicy {
    /// Every confident observation is a verdict. Lowest latency.
    PerFrame,
    /// Majority vote over a full window of N observations.
    Windowed,
}

impl DecisionPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            DecisionPolicy::PerFrame => "per-frame",
            DecisionPolicy::Windowed => "windowed",
        }
    }

    /// Accepts `per-frame`, `per_frame`, `perframe`, `debounce`, `windowed`,
    /// `window`, `majority` (case-insensitive).
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "per-frame" | "per_frame" | "perframe" | "debounce" => Some(DecisionPolicy::PerFrame),
            "windowed" | "window" | "majority" => Some(DecisionPolicy::Windowed),
            _ => None,
        }
    }
}

/// Configuration for `Stabilizer`.
#[derive(Debug, Clone, PartialEq)]
pub struct StabilizerConfig {
    pub policy: DecisionPolicy,
    /// Observations per decision window (windowed policy only). Default: 20.
    pub window_size: usize,
    /// Minimum confidence τ for an observation to count.
    pub confidence_threshold: f32,
    /// Minimum share of the confident subset the winning label must hold.
    pub majority_ratio: f32,
    /// Minimum rest before the same word may be announced again.
    pub cooldown: Duration,
    /// Only the most recent K words are exposed in snapshots.
    pub display_limit: Option<usize>,
    /// Hard bound on stored words; oldest evicted first.
    pub sentence_capacity: Option<usize>,
}

impl StabilizerConfig {
    /// Low-latency debounce used by request/response callers.
    pub fn per_frame() -> Self {
        Self {
            policy: DecisionPolicy::PerFrame,
            window_size: 20,
            confidence_threshold: 0.60,
            majority_ratio: 0.50,
            cooldown: Duration::from_secs(2),
            display_limit: None,
            sentence_capacity: Some(20),
        }
    }

    /// Noise-robust majority vote used by the continuous loop.
    pub fn windowed() -> Self {
        Self {
            policy: DecisionPolicy::Windowed,
            window_size: 20,
            confidence_threshold: 0.45,
            majority_ratio: 0.50,
            cooldown: Duration::from_secs(2),
            display_limit: Some(10),
            sentence_capacity: None,
        }
    }

    /// Preset matching `policy`.
    pub fn for_policy(policy: DecisionPolicy) -> Self {
        match policy {
            DecisionPolicy::PerFrame => Self::per_frame(),
            DecisionPolicy::Windowed => Self::windowed(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.window_size == 0 {
            return Err(SignlineError::InvalidConfig(
                "window_size must be at least 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(SignlineError::InvalidConfig(format!(
                "confidence_threshold {} outside [0, 1]",
                self.confidence_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.majority_ratio) {
            return Err(SignlineError::InvalidConfig(format!(
                "majority_ratio {} outside [0, 1]",
                self.majority_ratio
            )));
        }
        if self.display_limit == Some(0) {
            return Err(SignlineError::InvalidConfig(
                "display_limit must be at least 1 when set".into(),
            ));
        }
        if self.sentence_capacity == Some(0) {
            return Err(SignlineError::InvalidConfig(
                "sentence_capacity must be at least 1 when set".into(),
            ));
        }
        Ok(())
    }
}

impl Default for StabilizerConfig {
    fn default() -> Self {
        Self::windowed()
    }
}

/// Coarse stabilizer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StabilizerState {
    Idle,
    Announcing,
}

/// A word that passed both the decision policy and the cooldown gate.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnouncedEvent {
    pub word: String,
    /// Observation confidence (per-frame) or mean winning confidence (windowed).
    pub confidence: f32,
    pub at: Instant,
}

/// The gesture stabilization state machine for one logical stream.
#[derive(Debug)]
pub struct Stabilizer {
    config: StabilizerConfig,
    window: Option<PredictionWindow>,
    cooldown: CooldownGate,
    sentence: SentenceBuffer,
    windows_closed: u64,
}

impl Stabilizer {
    pub fn new(config: StabilizerConfig) -> Result<Self> {
        config.validate()?;
        let window = match config.policy {
            DecisionPolicy::PerFrame => None,
            DecisionPolicy::Windowed => Some(PredictionWindow::new(config.window_size)),
        };
        Ok(Self {
            cooldown: CooldownGate::new(config.cooldown),
            sentence: SentenceBuffer::new(config.sentence_capacity, config.display_limit),
            window,
            config,
            windows_closed: 0,
        })
    }

    pub fn config(&self) -> &StabilizerConfig {
        &self.config
    }

    /// Feed one observation. Returns the announced word, if any.
    pub fn observe(&mut self, observation: &Observation, now: Instant) -> Option<AnnouncedEvent> {
        let verdict = match self.config.policy {
            DecisionPolicy::PerFrame => {
                if !is_confident(observation.confidence, self.config.confidence_threshold) {
                    return None;
                }
                (observation.label.clone(), observation.confidence)
            }
            DecisionPolicy::Windowed => self.close_window_with(observation)?,
        };
        self.announce(verdict.0, verdict.1, now)
    }

    fn close_window_with(&mut self, observation: &Observation) -> Option<(String, f32)> {
        let window = self.window.as_mut()?;
        window.push(observation.clone());
        if window.len() < window.capacity() {
            return None;
        }

        let verdict = majority_vote(
            window.iter(),
            self.config.confidence_threshold,
            self.config.majority_ratio,
        );
        window.clear();
        self.windows_closed += 1;
        debug!(?verdict, "prediction window closed");

        match verdict {
            WindowVerdict::Majority {
                label,
                mean_confidence,
                ..
            } => Some((label, mean_confidence)),
            WindowVerdict::NoConfident | WindowVerdict::NoMajority { .. } => None,
        }
    }

    fn announce(&mut self, word: String, confidence: f32, now: Instant) -> Option<AnnouncedEvent> {
        if !self.cooldown.allows(&word, now) {
            debug!(word = %word, "verdict suppressed by cooldown");
            return None;
        }
        self.cooldown.record(&word, now);
        self.sentence.append(word.clone());
        info!(word = %word, confidence, words = self.sentence.len(), "word announced");
        Some(AnnouncedEvent {
            word,
            confidence,
            at: now,
        })
    }

    /// Reset window, cooldown and sentence together; the next verdict is
    /// judged as if no word had ever been announced.
    pub fn clear(&mut self) {
        if let Some(window) = self.window.as_mut() {
            window.clear();
        }
        self.cooldown.reset();
        self.sentence.clear();
        debug!("stabilizer cleared");
    }

    pub fn state(&self) -> StabilizerState {
        if self.cooldown.last().is_some() {
            StabilizerState::Announcing
        } else {
            StabilizerState::Idle
        }
    }

    pub fn last_announced(&self) -> Option<&AnnouncedWord> {
        self.cooldown.last()
    }

    /// Sentence words, truncated to the display limit.
    pub fn snapshot(&self) -> Vec<String> {
        self.sentence.snapshot()
    }

    /// Snapshot rendered with [`SentenceCase`].
    pub fn snapshot_text(&self) -> String {
        self.snapshot_text_with(&SentenceCase)
    }

    pub fn snapshot_text_with(&self, formatter: &dyn SentenceFormatter) -> String {
        formatter.format(&self.snapshot())
    }

    pub fn sentence(&self) -> &SentenceBuffer {
        &self.sentence
    }

    /// Observations currently buffered (always 0 for the per-frame policy).
    pub fn window_len(&self) -> usize {
        self.window.as_ref().map_or(0, PredictionWindow::len)
    }

    /// Number of full windows evaluated since construction.
    pub fn windows_closed(&self) -> u64 {
        self.windows_closed
    }
}
