//! # signline-core
//!
//! Turns a live stream of per-frame gesture classifications into a
//! stabilized, de-duplicated running sentence.
//!
//! ## Architecture
//!
//! ```text
//! FrameSource::next_frame → GestureClassifier::classify → Stabilizer::observe
//!                                                              │
//!                                                     decision policy
//!                                              (per-frame | windowed vote)
//!                                                              │
//!                                                      CooldownGate
//!                                                              │
//!                                                     SentenceBuffer::append
//!                                                              │
//!                                     broadcast::Sender<WordEvent / SentenceEvent>
//! ```
//!
//! Two deployment shapes share the same stabilizer:
//! - [`SignEngine`] runs a continuous blocking loop over a frame source.
//! - [`SessionRegistry`] serves discrete request/response calls, one lock
//!   per session.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod classifier;
pub mod engine;
pub mod error;
pub mod format;
pub mod frames;
pub mod ipc;
pub mod session;
pub mod stabilizer;

// Convenience re-exports for downstream crates
pub use classifier::{Classification, ClassifierHandle, FeatureVector, GestureClassifier};
pub use engine::{EngineConfig, SignEngine};
pub use error::SignlineError;
pub use format::{SentenceCase, SentenceFormatter};
pub use frames::{Frame, FrameSource};
pub use ipc::events::{EngineStatus, EngineStatusEvent, SentenceEvent, WordEvent};
pub use session::{PredictOutcome, Session, SessionRegistry};
pub use stabilizer::{
    AnnouncedEvent, AnnouncedWord, DecisionPolicy, Observation, Stabilizer, StabilizerConfig,
    StabilizerState,
};
