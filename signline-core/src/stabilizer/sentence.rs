//! Append-only log of announced words.

use std::collections::VecDeque;

/// Ordered sequence of announced words. Duplicates are legitimate.
///
/// - `capacity` bounds the stored words; the oldest word is evicted on
///   overflow. This is both state and display truncation.
/// - `display_limit` keeps every word but only exposes the most recent K in
///   [`SentenceBuffer::snapshot`].
#[derive(Debug, Clone)]
pub struct SentenceBuffer {
    words: VecDeque<String>,
    capacity: Option<usize>,
    display_limit: Option<usize>,
}

impl SentenceBuffer {
    pub fn new(capacity: Option<usize>, display_limit: Option<usize>) -> Self {
        Self {
            words: VecDeque::with_capacity(capacity.unwrap_or(16)),
            capacity,
            display_limit,
        }
    }

    pub fn append(&mut self, word: impl Into<String>) {
        if let Some(cap) = self.capacity {
            while self.words.len() >= cap {
                self.words.pop_front();
            }
        }
        self.words.push_back(word.into());
    }

    /// Words in insertion order, truncated to the display limit.
    pub fn snapshot(&self) -> Vec<String> {
        let skip = match self.display_limit {
            Some(limit) => self.words.len().saturating_sub(limit),
            None => 0,
        };
        self.words.iter().skip(skip).cloned().collect()
    }

    /// Every stored word, ignoring the display limit.
    pub fn words(&self) -> impl Iterator<Item = &str> {
        self.words.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn clear(&mut self) {
        self.words.clear();
    }
}
