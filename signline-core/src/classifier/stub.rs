//! `StubClassifier`: scripted backend without a real model.
//!
//! Replays a fixed list of `(label, confidence)` outputs in order and then
//! keeps repeating the last one. Lets the loop and the request surface be
//! exercised end-to-end without model files.

use tracing::debug;

use crate::classifier::{Classification, FeatureVector, GestureClassifier};
use crate::error::{Result, SignlineError};

pub struct StubClassifier {
    classes: Vec<String>,
    script: Vec<(String, f32)>,
    cursor: usize,
    calls: usize,
}

impl StubClassifier {
    /// Always answer `label` with `confidence`.
    pub fn fixed(label: impl Into<String>, confidence: f32) -> Self {
        Self::scripted(vec![(label.into(), confidence)])
    }

    pub fn scripted(script: Vec<(String, f32)>) -> Self {
        let mut classes: Vec<String> = Vec::new();
        for (label, _) in &script {
            if !classes.contains(label) {
                classes.push(label.clone());
            }
        }
        Self {
            classes,
            script,
            cursor: 0,
            calls: 0,
        }
    }

    /// Number of `classify` calls served so far.
    pub fn calls(&self) -> usize {
        self.calls
    }
}

impl GestureClassifier for StubClassifier {
    fn warm_up(&mut self) -> Result<()> {
        debug!("StubClassifier::warm_up: no-op");
        Ok(())
    }

    fn classes(&self) -> &[String] {
        &self.classes
    }

    fn classify(&mut self, _features: &FeatureVector) -> Result<Classification> {
        let Some((label, confidence)) = self.script.get(self.cursor).cloned() else {
            return Err(SignlineError::Classifier("stub script is empty".into()));
        };
        if self.cursor + 1 < self.script.len() {
            self.cursor += 1;
        }
        self.calls += 1;

        // Spread the remaining mass evenly over the other classes.
        let others = self.classes.len().saturating_sub(1).max(1) as f32;
        let probabilities: Vec<f32> = self
            .classes
            .iter()
            .map(|c| {
                if *c == label {
                    confidence
                } else {
                    (1.0 - confidence).max(0.0) / others
                }
            })
            .collect();

        Ok(Classification {
            distribution: self.classes.iter().cloned().zip(probabilities).collect(),
            label,
            confidence,
        })
    }
}
