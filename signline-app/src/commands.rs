//! Line-delimited JSON request handlers.
//!
//! One request object per line on stdin, one reply object per line on
//! stdout:
//!
//! ```text
//! {"op":"predict","session":"s1","features":[...63 floats...]}
//! {"op":"predict","session":"s1","features":null}      no hand in frame
//! {"op":"clear","session":"s1"}
//! {"op":"sentence","session":"s1"}
//! {"op":"sessions"}
//! {"op":"stats"}
//! ```
//!
//! Failures reply with `{"error": "..."}` and never end the session.

use std::sync::atomic::Ordering;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use signline_core::{FeatureVector, Frame, PredictOutcome};
use tracing::{debug, warn};

use crate::state::AppState;

const DEFAULT_SESSION: &str = "default";

fn default_session() -> String {
    DEFAULT_SESSION.to_string()
}

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum Request {
    Predict {
        #[serde(default = "default_session")]
        session: String,
        /// `null` or absent means no hand was detected.
        #[serde(default)]
        features: Option<Vec<f32>>,
    },
    Clear {
        #[serde(default = "default_session")]
        session: String,
    },
    Sentence {
        #[serde(default = "default_session")]
        session: String,
    },
    Sessions,
    Stats,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PredictReply<'a> {
    session: &'a str,
    #[serde(flatten)]
    outcome: PredictOutcome,
}

/// Handle one raw request line and return the reply line.
pub fn handle_line(state: &AppState, line: &str) -> String {
    state.requests.fetch_add(1, Ordering::Relaxed);
    let reply = match serde_json::from_str::<Request>(line) {
        Ok(request) => handle(state, request, Instant::now()),
        Err(e) => Err(format!("bad request: {e}")),
    };
    match reply {
        Ok(value) => value.to_string(),
        Err(message) => {
            state.errors.fetch_add(1, Ordering::Relaxed);
            warn!("request failed: {message}");
            json!({ "error": message }).to_string()
        }
    }
}

pub fn handle(state: &AppState, request: Request, now: Instant) -> Result<Value, String> {
    state.expire_idle(now);
    debug!(?request, "request");
    match request {
        Request::Predict { session, features } => predict(state, &session, features, now),
        Request::Clear { session } => {
            // Unknown sessions are created empty.
            let handle = state.registry.session(&session, now).map_err(|e| e.to_string())?;
            handle.lock().clear(now);
            Ok(json!({ "status": "cleared", "session": session }))
        }
        Request::Sentence { session } => {
            let sentence = state.registry.sentence_text(&session).unwrap_or_default();
            Ok(json!({ "session": session, "sentence": sentence }))
        }
        Request::Sessions => Ok(json!({ "sessions": state.registry.ids() })),
        Request::Stats => serde_json::to_value(state.stats()).map_err(|e| e.to_string()),
    }
}

fn predict(
    state: &AppState,
    session: &str,
    features: Option<Vec<f32>>,
    now: Instant,
) -> Result<Value, String> {
    let frame = match features {
        Some(values) => Frame::Hand(
            FeatureVector::new(values, state.settings.feature_len).map_err(|e| e.to_string())?,
        ),
        None => Frame::NoHand,
    };
    let outcome = state
        .registry
        .predict(session, &frame, &state.classifier, now)
        .map_err(|e| e.to_string())?;
    serde_json::to_value(PredictReply { session, outcome }).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::AppSettings;
    use signline_core::classifier::StubClassifier;
    use signline_core::ClassifierHandle;

    fn state(classifier: StubClassifier) -> AppState {
        let settings = AppSettings {
            policy: "per-frame".into(),
            ..AppSettings::default()
        };
        AppState::new(settings, ClassifierHandle::new(classifier)).unwrap()
    }

    fn features_json() -> String {
        serde_json::to_string(&vec![0.25f32; 63]).unwrap()
    }

    fn reply(state: &AppState, line: &str) -> Value {
        serde_json::from_str(&handle_line(state, line)).unwrap()
    }

    #[test]
    fn predict_announces_and_renders_sentence() {
        let st = state(StubClassifier::fixed("hello", 0.9));
        let line = format!(r#"{{"op":"predict","session":"s1","features":{}}}"#, features_json());
        let v = reply(&st, &line);
        assert_eq!(v["session"], "s1");
        assert_eq!(v["label"], "hello");
        assert_eq!(v["announced"], "hello");
        assert_eq!(v["sentence"], "Hello.");

        let again = reply(&st, &line);
        assert_eq!(again["announced"], Value::Null);
        assert_eq!(again["sentence"], "Hello.");
    }

    #[test]
    fn null_features_mean_no_hand() {
        let st = state(StubClassifier::fixed("hello", 0.9));
        let v = reply(&st, r#"{"op":"predict","features":null}"#);
        assert_eq!(v["label"], "none");
        assert_eq!(v["confidence"], 0.0);
        assert_eq!(v["session"], DEFAULT_SESSION);
        assert_eq!(v["sentence"], "");
    }

    #[test]
    fn wrong_feature_length_is_rejected() {
        let st = state(StubClassifier::fixed("hello", 0.9));
        let v = reply(&st, r#"{"op":"predict","features":[0.1,0.2]}"#);
        let msg = v["error"].as_str().unwrap();
        assert!(msg.contains("expected 63"), "{msg}");
        assert_eq!(st.stats().errors, 1);
    }

    #[test]
    fn clear_then_sentence_is_empty() {
        let st = state(StubClassifier::fixed("yes", 0.9));
        let line = format!(r#"{{"op":"predict","session":"a","features":{}}}"#, features_json());
        reply(&st, &line);

        let cleared = reply(&st, r#"{"op":"clear","session":"a"}"#);
        assert_eq!(cleared["status"], "cleared");
        let sentence = reply(&st, r#"{"op":"sentence","session":"a"}"#);
        assert_eq!(sentence["sentence"], "");

        let after = reply(&st, &line);
        assert_eq!(after["announced"], "yes");
    }

    #[test]
    fn malformed_and_unknown_requests_reply_with_error() {
        let st = state(StubClassifier::fixed("yes", 0.9));
        assert!(reply(&st, "not json")["error"].is_string());
        assert!(reply(&st, r#"{"op":"dance"}"#)["error"].is_string());
        let stats = reply(&st, r#"{"op":"stats"}"#);
        assert_eq!(stats["requests"], 3);
        assert_eq!(stats["errors"], 2);
        assert_eq!(stats["policy"], "per-frame");
    }

    #[test]
    fn sessions_lists_known_ids() {
        let st = state(StubClassifier::fixed("no", 0.9));
        reply(&st, r#"{"op":"predict","session":"b","features":null}"#);
        reply(&st, r#"{"op":"predict","session":"a","features":null}"#);
        let v = reply(&st, r#"{"op":"sessions"}"#);
        assert_eq!(v["sessions"], json!(["a", "b"]));
    }
}
