//! Per-session state for the request/response deployment shape.
//!
//! Each logical session owns one `Stabilizer` behind its own
//! `parking_lot::Mutex`, so concurrent calls for the same session are
//! strictly serialized while different sessions proceed independently.
//! The registry map lock is only held long enough to look up or insert a
//! session handle, never across a classifier call.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::classifier::ClassifierHandle;
use crate::error::Result;
use crate::frames::Frame;
use crate::stabilizer::{Stabilizer, StabilizerConfig};

/// Label reported for frames without a detected hand.
pub const NO_HAND_LABEL: &str = "none";

/// Reply to one predict call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictOutcome {
    /// Raw argmax label for this frame (`"none"` without a hand).
    pub label: String,
    pub confidence: f32,
    /// Word appended to the sentence by this call, if any.
    pub announced: Option<String>,
    /// Rendered sentence after this call.
    pub sentence: String,
}

pub struct Session {
    id: String,
    stabilizer: Stabilizer,
    last_seen: Instant,
    predictions: u64,
}

impl Session {
    pub fn new(id: impl Into<String>, stabilizer: Stabilizer, now: Instant) -> Self {
        Self {
            id: id.into(),
            stabilizer,
            last_seen: now,
            predictions: 0,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Classify a frame (if it holds a hand) and feed the stabilizer.
    ///
    /// # Errors
    /// Classifier failures are returned unchanged; stabilizer state is not
    /// touched in that case.
    pub fn predict(
        &mut self,
        frame: &Frame,
        classifier: &ClassifierHandle,
        now: Instant,
    ) -> Result<PredictOutcome> {
        self.last_seen = now;
        self.predictions += 1;

        let features = match frame {
            Frame::Hand(features) => features,
            Frame::NoHand => {
                debug!(session = %self.id, "no hand detected");
                return Ok(PredictOutcome {
                    label: NO_HAND_LABEL.to_string(),
                    confidence: 0.0,
                    announced: None,
                    sentence: self.stabilizer.snapshot_text(),
                });
            }
        };

        let classification = classifier.classify(features)?;
        debug!(
            session = %self.id,
            distribution = ?classification.distribution,
            "classifier distribution"
        );

        let announced = self
            .stabilizer
            .observe(&classification.observation(), now)
            .map(|event| event.word);

        Ok(PredictOutcome {
            label: classification.label,
            confidence: classification.confidence,
            announced,
            sentence: self.stabilizer.snapshot_text(),
        })
    }

    /// Reset window, cooldown and sentence together.
    pub fn clear(&mut self, now: Instant) {
        self.last_seen = now;
        self.stabilizer.clear();
        info!(session = %self.id, "sentence cleared");
    }

    pub fn sentence_text(&self) -> String {
        self.stabilizer.snapshot_text()
    }

    pub fn words(&self) -> Vec<String> {
        self.stabilizer.snapshot()
    }

    pub fn stabilizer(&self) -> &Stabilizer {
        &self.stabilizer
    }

    pub fn last_seen(&self) -> Instant {
        self.last_seen
    }

    pub fn predictions(&self) -> u64 {
        self.predictions
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("predictions", &self.predictions)
            .finish_non_exhaustive()
    }
}

/// Sessions keyed by identifier, created on first use and expired when idle.
pub struct SessionRegistry {
    config: StabilizerConfig,
    idle_ttl: Duration,
    sessions: Mutex<HashMap<String, Arc<Mutex<Session>>>>,
}

impl SessionRegistry {
    /// # Errors
    /// Returns `InvalidConfig` if `config` fails validation.
    pub fn new(config: StabilizerConfig, idle_ttl: Duration) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            idle_ttl,
            sessions: Mutex::new(HashMap::new()),
        })
    }

    /// Handle for `id`, creating the session if it does not exist yet.
    pub fn session(&self, id: &str, now: Instant) -> Result<Arc<Mutex<Session>>> {
        let mut sessions = self.sessions.lock();
        if let Some(existing) = sessions.get(id) {
            return Ok(Arc::clone(existing));
        }
        let stabilizer = Stabilizer::new(self.config.clone())?;
        let session = Arc::new(Mutex::new(Session::new(id, stabilizer, now)));
        sessions.insert(id.to_string(), Arc::clone(&session));
        info!(session = %id, policy = self.config.policy.as_str(), "session created");
        Ok(session)
    }

    fn existing(&self, id: &str) -> Option<Arc<Mutex<Session>>> {
        self.sessions.lock().get(id).cloned()
    }

    pub fn predict(
        &self,
        id: &str,
        frame: &Frame,
        classifier: &ClassifierHandle,
        now: Instant,
    ) -> Result<PredictOutcome> {
        let session = self.session(id, now)?;
        let mut guard = session.lock();
        guard.predict(frame, classifier, now)
    }

    /// Clear a session. Returns `false` if it does not exist.
    pub fn clear(&self, id: &str, now: Instant) -> bool {
        match self.existing(id) {
            Some(session) => {
                session.lock().clear(now);
                true
            }
            None => false,
        }
    }

    /// Rendered sentence for `id`, or `None` if the session does not exist.
    pub fn sentence_text(&self, id: &str) -> Option<String> {
        self.existing(id).map(|s| s.lock().sentence_text())
    }

    /// Drop sessions idle for longer than the TTL. Sessions busy in another
    /// call are kept. Returns the number removed.
    pub fn expire_idle(&self, now: Instant) -> usize {
        let mut sessions = self.sessions.lock();
        let before = sessions.len();
        sessions.retain(|id, session| match session.try_lock() {
            Some(guard) => {
                let keep = now.saturating_duration_since(guard.last_seen()) <= self.idle_ttl;
                if !keep {
                    debug!(session = %id, "session expired");
                }
                keep
            }
            None => true,
        });
        before - sessions.len()
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }

    pub fn config(&self) -> &StabilizerConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{FeatureVector, StubClassifier};
    use crate::error::SignlineError;

    fn hand() -> Frame {
        Frame::Hand(FeatureVector::new(vec![0.2; 63], 63).unwrap())
    }

    fn registry() -> SessionRegistry {
        SessionRegistry::new(StabilizerConfig::per_frame(), Duration::from_secs(60)).unwrap()
    }

    #[test]
    fn no_hand_reports_none_and_keeps_sentence() {
        let reg = registry();
        let clf = ClassifierHandle::new(StubClassifier::fixed("hello", 0.9));
        let t0 = Instant::now();

        reg.predict("a", &hand(), &clf, t0).unwrap();
        let out = reg.predict("a", &Frame::NoHand, &clf, t0).unwrap();
        assert_eq!(out.label, NO_HAND_LABEL);
        assert_eq!(out.confidence, 0.0);
        assert_eq!(out.announced, None);
        assert_eq!(out.sentence, "Hello.");
    }

    #[test]
    fn sessions_are_independent() {
        let reg = registry();
        let clf = ClassifierHandle::new(StubClassifier::fixed("yes", 0.8));
        let t0 = Instant::now();

        let a = reg.predict("a", &hand(), &clf, t0).unwrap();
        let b = reg.predict("b", &hand(), &clf, t0).unwrap();
        assert_eq!(a.announced.as_deref(), Some("yes"));
        assert_eq!(b.announced.as_deref(), Some("yes"));
        assert_eq!(reg.ids(), vec!["a", "b"]);
    }

    #[test]
    fn clear_allows_immediate_reannouncement() {
        let reg = registry();
        let clf = ClassifierHandle::new(StubClassifier::fixed("love", 0.9));
        let t0 = Instant::now();

        reg.predict("s", &hand(), &clf, t0).unwrap();
        assert!(reg.clear("s", t0));
        assert_eq!(reg.sentence_text("s").as_deref(), Some(""));

        let out = reg
            .predict("s", &hand(), &clf, t0 + Duration::from_millis(10))
            .unwrap();
        assert_eq!(out.announced.as_deref(), Some("love"));
        assert!(!reg.clear("missing", t0));
    }

    #[test]
    fn classifier_failure_is_surfaced() {
        let reg = registry();
        let clf = ClassifierHandle::new(StubClassifier::scripted(Vec::new()));
        let err = reg.predict("s", &hand(), &clf, Instant::now()).unwrap_err();
        assert!(matches!(err, SignlineError::Classifier(_)));
        assert_eq!(reg.sentence_text("s").as_deref(), Some(""));
    }

    #[test]
    fn nan_confidence_is_rejected_and_leaves_session_untouched() {
        let reg = registry();
        let clf = ClassifierHandle::new(StubClassifier::fixed("love", f32::NAN));
        let t0 = Instant::now();

        let err = reg.predict("s", &hand(), &clf, t0).unwrap_err();
        assert!(matches!(err, SignlineError::InvalidConfidence { .. }));
        assert!(err.is_rejected_input());
        assert_eq!(reg.sentence_text("s").as_deref(), Some(""));

        let handle = reg.session("s", t0).unwrap();
        let session = handle.lock();
        assert!(session.stabilizer().last_announced().is_none());
        assert_eq!(session.stabilizer().window_len(), 0);
    }

    #[test]
    fn concurrent_calls_on_one_session_are_serialized() {
        const WINDOW: usize = 5;
        const THREADS: usize = 4;
        let config = StabilizerConfig {
            window_size: WINDOW,
            ..StabilizerConfig::windowed()
        };
        let reg = Arc::new(SessionRegistry::new(config, Duration::from_secs(60)).unwrap());
        let clf = ClassifierHandle::new(StubClassifier::fixed("yes", 0.9));
        let t0 = Instant::now();

        let workers: Vec<_> = (0..THREADS)
            .map(|_| {
                let reg = Arc::clone(&reg);
                let clf = clf.clone();
                std::thread::spawn(move || {
                    for _ in 0..WINDOW {
                        reg.predict("shared", &hand(), &clf, t0).unwrap();
                    }
                })
            })
            .collect();
        reg.predict("other", &hand(), &clf, t0).unwrap();
        reg.predict("other", &hand(), &clf, t0).unwrap();
        for worker in workers {
            worker.join().unwrap();
        }

        let shared = reg.session("shared", t0).unwrap();
        let shared = shared.lock();
        assert_eq!(shared.predictions(), (THREADS * WINDOW) as u64);
        assert_eq!(shared.stabilizer().windows_closed(), THREADS as u64);
        assert_eq!(shared.stabilizer().window_len(), 0);
        // Same instant for every call, so only the first verdict passes cooldown.
        assert_eq!(shared.words(), vec!["yes"]);

        let other = reg.session("other", t0).unwrap();
        let other = other.lock();
        assert_eq!(other.predictions(), 2);
        assert_eq!(other.stabilizer().window_len(), 2);
        assert_eq!(other.stabilizer().windows_closed(), 0);
        assert!(other.words().is_empty());
    }

    #[test]
    fn idle_sessions_expire() {
        let reg = SessionRegistry::new(StabilizerConfig::per_frame(), Duration::from_secs(5))
            .unwrap();
        let clf = ClassifierHandle::new(StubClassifier::fixed("no", 0.9));
        let t0 = Instant::now();

        reg.predict("old", &hand(), &clf, t0).unwrap();
        reg.predict("fresh", &hand(), &clf, t0 + Duration::from_secs(4)).unwrap();

        assert_eq!(reg.expire_idle(t0 + Duration::from_secs(6)), 1);
        assert_eq!(reg.ids(), vec!["fresh"]);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = StabilizerConfig {
            window_size: 0,
            ..StabilizerConfig::windowed()
        };
        assert!(SessionRegistry::new(config, Duration::from_secs(1)).is_err());
    }
}
