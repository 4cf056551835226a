//! Shared state for the request/response surface.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use serde::Serialize;
use signline_core::error::Result;
use signline_core::{ClassifierHandle, SessionRegistry};

use crate::settings::AppSettings;

pub struct AppState {
    pub settings: AppSettings,
    pub classifier: ClassifierHandle,
    /// One stabilizer per session id, each behind its own lock.
    pub registry: SessionRegistry,
    /// Requests answered (including error replies).
    pub requests: AtomicUsize,
    /// Requests answered with an error.
    pub errors: AtomicUsize,
    /// Sessions removed by idle expiry.
    pub expired: AtomicUsize,
}

impl AppState {
    pub fn new(settings: AppSettings, classifier: ClassifierHandle) -> Result<Self> {
        let registry =
            SessionRegistry::new(settings.stabilizer_config(), settings.session_idle_ttl())?;
        Ok(Self {
            settings,
            classifier,
            registry,
            requests: AtomicUsize::new(0),
            errors: AtomicUsize::new(0),
            expired: AtomicUsize::new(0),
        })
    }

    /// Drop idle sessions; called before each request.
    pub fn expire_idle(&self, now: Instant) {
        let removed = self.registry.expire_idle(now);
        if removed > 0 {
            self.expired.fetch_add(removed, Ordering::Relaxed);
            tracing::info!(removed, "expired idle sessions");
        }
    }

    pub fn stats(&self) -> ServeStats {
        ServeStats {
            requests: self.requests.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
            sessions: self.registry.len(),
            policy: self.settings.decision_policy().as_str(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServeStats {
    pub requests: usize,
    pub errors: usize,
    pub expired: usize,
    pub sessions: usize,
    pub policy: &'static str,
}
