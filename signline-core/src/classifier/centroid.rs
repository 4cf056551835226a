//! Nearest-centroid classifier loaded from a JSON model file.
//!
//! ## Model file
//!
//! ```json
//! { "classes": ["hello", "yes"], "centroids": [[...63 floats...], [...]], "temperature": 0.1 }
//! ```
//!
//! ## Scoring
//!
//! 1. Euclidean distance from the features to every centroid.
//! 2. Logits = `-distance / temperature`.
//! 3. Softmax over logits gives the per-class distribution.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::classifier::{Classification, FeatureVector, GestureClassifier};
use crate::error::{Result, SignlineError};

fn default_temperature() -> f32 {
    0.1
}

/// On-disk shape of a centroid model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CentroidModelFile {
    pub classes: Vec<String>,
    pub centroids: Vec<Vec<f32>>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

#[derive(Debug, Clone)]
pub struct CentroidClassifier {
    classes: Vec<String>,
    centroids: Vec<Vec<f32>>,
    temperature: f32,
}

impl CentroidClassifier {
    /// Validate and build a classifier from an in-memory model.
    pub fn from_model(model: CentroidModelFile) -> Result<Self> {
        if model.classes.is_empty() {
            return Err(SignlineError::MalformedModel("model has no classes".into()));
        }
        if model.classes.len() != model.centroids.len() {
            return Err(SignlineError::MalformedModel(format!(
                "{} classes but {} centroids",
                model.classes.len(),
                model.centroids.len()
            )));
        }
        let dims = model.centroids[0].len();
        if dims == 0 || model.centroids.iter().any(|c| c.len() != dims) {
            return Err(SignlineError::MalformedModel(
                "centroids must share one non-zero dimension".into(),
            ));
        }
        if !(model.temperature.is_finite() && model.temperature > 0.0) {
            return Err(SignlineError::MalformedModel(format!(
                "temperature must be positive, got {}",
                model.temperature
            )));
        }
        Ok(Self {
            classes: model.classes,
            centroids: model.centroids,
            temperature: model.temperature,
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(SignlineError::ModelNotFound {
                path: path.to_path_buf(),
            });
        }
        let raw = fs::read_to_string(path)?;
        let model: CentroidModelFile = serde_json::from_str(&raw)
            .map_err(|e| SignlineError::MalformedModel(format!("{}: {e}", path.display())))?;
        let classifier = Self::from_model(model)?;
        info!(
            path = %path.display(),
            classes = classifier.classes.len(),
            dims = classifier.dims(),
            "centroid model loaded"
        );
        Ok(classifier)
    }

    /// Feature length the centroids were built for.
    pub fn dims(&self) -> usize {
        self.centroids[0].len()
    }
}

fn euclidean(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|l| (l - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

impl GestureClassifier for CentroidClassifier {
    fn warm_up(&mut self) -> Result<()> {
        let probe = FeatureVector::new(self.centroids[0].clone(), self.dims())?;
        let result = self.classify(&probe)?;
        debug!(label = %result.label, "CentroidClassifier::warm_up probe");
        Ok(())
    }

    fn classes(&self) -> &[String] {
        &self.classes
    }

    fn classify(&mut self, features: &FeatureVector) -> Result<Classification> {
        if features.len() != self.dims() {
            return Err(SignlineError::InvalidFeatureLength {
                expected: self.dims(),
                actual: features.len(),
            });
        }
        let logits: Vec<f32> = self
            .centroids
            .iter()
            .map(|c| -euclidean(features.as_slice(), c) / self.temperature)
            .collect();
        Classification::from_distribution(&self.classes, &softmax(&logits))
    }
}
