//! Gesture classifier abstraction.
//!
//! The `GestureClassifier` trait decouples the stabilizer from any specific
//! model backend. The core only needs the argmax label and its confidence;
//! the full distribution is carried along for debug logging.
//!
//! `&mut self` on `classify` allows stateful backends. All access is
//! serialised through `ClassifierHandle`'s `parking_lot::Mutex`.

pub mod centroid;
pub mod stub;

pub use centroid::{CentroidClassifier, CentroidModelFile};
pub use stub::StubClassifier;

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SignlineError};
use crate::stabilizer::Observation;

/// Landmarks per detected hand.
pub const LANDMARK_COUNT: usize = 21;

/// Feature values per hand: x, y, z for each landmark.
pub const FEATURES_PER_HAND: usize = LANDMARK_COUNT * 3;

/// A validated, fixed-length feature vector for one detected hand.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector(Vec<f32>);

impl FeatureVector {
    /// # Errors
    /// - `InvalidFeatureLength` if `values.len() != expected_len`.
    /// - `NonFiniteFeature` if any value is NaN or infinite.
    pub fn new(values: Vec<f32>, expected_len: usize) -> Result<Self> {
        if values.len() != expected_len {
            return Err(SignlineError::InvalidFeatureLength {
                expected: expected_len,
                actual: values.len(),
            });
        }
        if let Some(index) = values.iter().position(|v| !v.is_finite()) {
            return Err(SignlineError::NonFiniteFeature { index });
        }
        Ok(Self(values))
    }

    /// Flatten `(x, y, z)` landmarks in order.
    pub fn from_landmarks(landmarks: &[[f32; 3]]) -> Result<Self> {
        let values = landmarks.iter().flat_map(|p| p.iter().copied()).collect();
        Self::new(values, FEATURES_PER_HAND)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Argmax label, its probability, and the full per-class distribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub label: String,
    pub confidence: f32,
    pub distribution: Vec<(String, f32)>,
}

impl Classification {
    /// Build from a class list and matching probabilities. The first maximum
    /// wins when several classes share it.
    pub fn from_distribution(classes: &[String], probabilities: &[f32]) -> Result<Self> {
        if classes.is_empty() || classes.len() != probabilities.len() {
            return Err(SignlineError::Classifier(format!(
                "{} classes but {} probabilities",
                classes.len(),
                probabilities.len()
            )));
        }
        let mut best = 0usize;
        for (i, p) in probabilities.iter().enumerate() {
            if *p > probabilities[best] {
                best = i;
            }
        }
        Ok(Self {
            label: classes[best].clone(),
            confidence: probabilities[best],
            distribution: classes
                .iter()
                .cloned()
                .zip(probabilities.iter().copied())
                .collect(),
        })
    }

    /// Check classifier output before it reaches the stabilizer.
    ///
    /// # Errors
    /// - `InvalidConfidence` if `confidence` is NaN, infinite or outside [0, 1].
    /// - `UnknownLabel` if `label` is not one of `classes`.
    pub fn validate(&self, classes: &[String]) -> Result<()> {
        if !(self.confidence.is_finite() && (0.0..=1.0).contains(&self.confidence)) {
            return Err(SignlineError::InvalidConfidence {
                label: self.label.clone(),
                confidence: self.confidence,
            });
        }
        if !classes.iter().any(|c| *c == self.label) {
            return Err(SignlineError::UnknownLabel(self.label.clone()));
        }
        Ok(())
    }

    /// The `(label, confidence)` pair the stabilizer consumes.
    pub fn observation(&self) -> Observation {
        Observation::new(self.label.clone(), self.confidence)
    }
}

/// Contract for gesture classification backends.
pub trait GestureClassifier: Send + 'static {
    /// One-time warm-up: load weights, run a dummy inference.
    ///
    /// # Errors
    /// Returns an error if the model is missing or unusable.
    fn warm_up(&mut self) -> Result<()>;

    /// Labels this classifier can produce, in distribution order.
    fn classes(&self) -> &[String];

    /// Classify one hand's features.
    fn classify(&mut self, features: &FeatureVector) -> Result<Classification>;
}

/// Thread-safe reference-counted handle to any `GestureClassifier`.
#[derive(Clone)]
pub struct ClassifierHandle(pub Arc<Mutex<dyn GestureClassifier>>);

impl ClassifierHandle {
    pub fn new<C: GestureClassifier>(classifier: C) -> Self {
        Self(Arc::new(Mutex::new(classifier)))
    }

    /// Classify and validate the result. Malformed output is returned as a
    /// rejected-input error and never reaches the stabilizer.
    pub fn classify(&self, features: &FeatureVector) -> Result<Classification> {
        let mut classifier = self.0.lock();
        let classification = classifier.classify(features)?;
        classification.validate(classifier.classes())?;
        Ok(classification)
    }
}

impl std::fmt::Debug for ClassifierHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassifierHandle").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classes(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn feature_vector_rejects_wrong_length() {
        let err = FeatureVector::new(vec![0.0; 62], FEATURES_PER_HAND).unwrap_err();
        assert!(matches!(
            err,
            SignlineError::InvalidFeatureLength {
                expected: 63,
                actual: 62
            }
        ));
        assert!(err.is_rejected_input());
    }

    #[test]
    fn feature_vector_rejects_non_finite_values() {
        let mut values = vec![0.5; 63];
        values[10] = f32::NAN;
        let err = FeatureVector::new(values, 63).unwrap_err();
        assert!(matches!(err, SignlineError::NonFiniteFeature { index: 10 }));
    }

    #[test]
    fn from_landmarks_flattens_xyz() {
        let landmarks: Vec<[f32; 3]> = (0..LANDMARK_COUNT)
            .map(|i| [i as f32, i as f32 + 0.1, i as f32 + 0.2])
            .collect();
        let fv = FeatureVector::from_landmarks(&landmarks).unwrap();
        assert_eq!(fv.len(), 63);
        assert_eq!(&fv.as_slice()[3..6], &[1.0, 1.1, 1.2]);
    }

    #[test]
    fn argmax_picks_first_maximum() {
        let c = Classification::from_distribution(
            &classes(&["hello", "yes", "no"]),
            &[0.4, 0.4, 0.2],
        )
        .unwrap();
        assert_eq!(c.label, "hello");
        assert_eq!(c.distribution.len(), 3);
        assert_eq!(c.observation(), Observation::new("hello", 0.4));
    }

    struct RogueClassifier {
        classes: Vec<String>,
        output: Classification,
    }

    impl GestureClassifier for RogueClassifier {
        fn warm_up(&mut self) -> Result<()> {
            Ok(())
        }

        fn classes(&self) -> &[String] {
            &self.classes
        }

        fn classify(&mut self, _features: &FeatureVector) -> Result<Classification> {
            Ok(self.output.clone())
        }
    }

    fn rogue(label: &str, confidence: f32) -> ClassifierHandle {
        ClassifierHandle::new(RogueClassifier {
            classes: classes(&["yes", "no"]),
            output: Classification {
                label: label.to_string(),
                confidence,
                distribution: Vec::new(),
            },
        })
    }

    #[test]
    fn handle_rejects_non_finite_or_out_of_range_confidence() {
        let fv = FeatureVector::new(vec![0.0; 63], 63).unwrap();
        for bad in [f32::NAN, f32::INFINITY, -0.1, 1.5] {
            let err = rogue("yes", bad).classify(&fv).unwrap_err();
            assert!(matches!(err, SignlineError::InvalidConfidence { .. }), "{bad}");
            assert!(err.is_rejected_input());
        }
        assert_eq!(rogue("yes", 1.0).classify(&fv).unwrap().label, "yes");
    }

    #[test]
    fn handle_rejects_label_outside_class_list() {
        let fv = FeatureVector::new(vec![0.0; 63], 63).unwrap();
        let err = rogue("maybe", 0.9).classify(&fv).unwrap_err();
        assert!(matches!(err, SignlineError::UnknownLabel(ref l) if l == "maybe"));
        assert!(err.is_rejected_input());
    }

    #[test]
    fn mismatched_distribution_is_an_error() {
        assert!(Classification::from_distribution(&classes(&["a"]), &[0.5, 0.5]).is_err());
        assert!(Classification::from_distribution(&[], &[]).is_err());
    }
}
