//! Events emitted by `SignEngine`.
//!
//! | Event | Sent when |
//! |-------|-----------|
//! | `WordEvent` | a word passes the decision policy and the cooldown gate |
//! | `SentenceEvent` | the visible sentence changes (announce or clear) |
//! | `EngineStatusEvent` | the engine changes lifecycle state |

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Word events
// ---------------------------------------------------------------------------

/// An announced word, ready to be spoken.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WordEvent {
    /// Monotonically increasing event sequence number.
    pub seq: u64,
    pub word: String,
    /// Confidence behind the verdict in [0.0, 1.0].
    pub confidence: f32,
    /// Rendered sentence after the word was appended.
    pub sentence: String,
}

// ---------------------------------------------------------------------------
// Sentence events
// ---------------------------------------------------------------------------

/// Current sentence snapshot after a change.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentenceEvent {
    pub seq: u64,
    /// Words in order, truncated to the display limit.
    pub words: Vec<String>,
    /// Formatter rendering of `words`.
    pub text: String,
    /// `true` when the change was an explicit clear.
    pub cleared: bool,
}

// ---------------------------------------------------------------------------
// Engine status events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatusEvent {
    pub status: EngineStatus,
    /// Optional human-readable detail (e.g. error message).
    pub detail: Option<String>,
}

/// Current state of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineStatus {
    /// Engine created but `start()` not yet called.
    Idle,
    /// Warming up the classifier.
    WarmingUp,
    /// Pulling frames and stabilizing.
    Running,
    /// Loop ended (stop requested or source exhausted); may be restarted.
    Stopped,
    /// Classifier or source failure; see the status event detail.
    Error,
}
