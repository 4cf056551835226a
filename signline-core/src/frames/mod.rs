//! Pull-based frame sources.
//!
//! The loop never talks to a camera directly: anything that can hand out
//! per-frame hand features implements `FrameSource`, which keeps the
//! stabilizer testable with synthetic sequences.

pub mod jsonl;

pub use jsonl::JsonlFrameSource;

use std::collections::VecDeque;

use crate::classifier::FeatureVector;
use crate::error::Result;

/// One processed video frame, as seen by the core.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Features of the first detected hand.
    Hand(FeatureVector),
    /// No hand detected. Produces no observation.
    NoHand,
}

/// Contract for frame producers.
pub trait FrameSource: Send + 'static {
    /// Next frame, or `Ok(None)` once the stream has ended.
    ///
    /// # Errors
    /// Returns an error if the underlying source fails or yields malformed
    /// input.
    fn next_frame(&mut self) -> Result<Option<Frame>>;
}

/// In-memory frame sequence. Used by tests and dry runs.
#[derive(Debug, Default)]
pub struct VecFrameSource {
    frames: VecDeque<Result<Frame>>,
}

impl VecFrameSource {
    pub fn new(frames: impl IntoIterator<Item = Frame>) -> Self {
        Self {
            frames: frames.into_iter().map(Ok).collect(),
        }
    }

    /// Queue an error to be returned when this position is reached.
    pub fn push_error(&mut self, error: crate::error::SignlineError) {
        self.frames.push_back(Err(error));
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl FrameSource for VecFrameSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        self.frames.pop_front().transpose()
    }
}
