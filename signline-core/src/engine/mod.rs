//! `SignEngine`: lifecycle controller for the continuous local loop.
//!
//! ## Lifecycle
//!
//! ```text
//! SignEngine::new()
//!     └─► warm_up()          → classifier ready, status = WarmingUp → Idle
//!         └─► start(source)  → loop spawned, status = Running
//!             ├─► clear()    → queued, applied before the next frame
//!             └─► stop()     → running=false, status = Stopped
//! ```
//!
//! The loop also stops on its own when the frame source is exhausted
//! (status `Stopped`) or on a classifier/source failure (status `Error`).
//!
//! ## Threading
//!
//! The loop is fully synchronous and runs in `spawn_blocking`: one frame is
//! classified and stabilized completely before the next one is pulled.
//! User clears travel over a crossbeam channel and are applied between
//! frames, so window, cooldown and sentence reset together.

pub mod pipeline;

use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::info;

use crate::{
    classifier::{ClassifierHandle, FEATURES_PER_HAND},
    error::{Result, SignlineError},
    frames::FrameSource,
    ipc::events::{EngineStatus, EngineStatusEvent, SentenceEvent, WordEvent},
    stabilizer::StabilizerConfig,
};

pub use pipeline::{ControlCommand, DiagnosticsSnapshot, PipelineDiagnostics, SentenceSnapshot};

/// Broadcast channel capacity: 256 events buffered for slow consumers.
const BROADCAST_CAP: usize = 256;

/// Configuration for `SignEngine`.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub stabilizer: StabilizerConfig,
    /// Pause after each processed frame. Default: 5 ms.
    pub frame_interval: Duration,
    /// Feature values expected per hand. Default: 63.
    pub feature_len: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stabilizer: StabilizerConfig::windowed(),
            frame_interval: Duration::from_millis(5),
            feature_len: FEATURES_PER_HAND,
        }
    }
}

/// The top-level engine handle.
///
/// `SignEngine` is `Send + Sync`; all fields use interior mutability.
pub struct SignEngine {
    config: EngineConfig,
    classifier: ClassifierHandle,
    running: Arc<AtomicBool>,
    status: Arc<Mutex<EngineStatus>>,
    word_tx: broadcast::Sender<WordEvent>,
    sentence_tx: broadcast::Sender<SentenceEvent>,
    status_tx: broadcast::Sender<EngineStatusEvent>,
    control_tx: Sender<ControlCommand>,
    control_rx: Receiver<ControlCommand>,
    /// Latest sentence published by the loop.
    sentence: Arc<Mutex<SentenceSnapshot>>,
    /// Monotonically increasing event sequence counter.
    seq: Arc<AtomicU64>,
    diagnostics: Arc<PipelineDiagnostics>,
}

impl SignEngine {
    /// Create a new engine. Does not start the loop; call `warm_up()` then `start()`.
    pub fn new(config: EngineConfig, classifier: ClassifierHandle) -> Self {
        let (word_tx, _) = broadcast::channel(BROADCAST_CAP);
        let (sentence_tx, _) = broadcast::channel(BROADCAST_CAP);
        let (status_tx, _) = broadcast::channel(BROADCAST_CAP);
        let (control_tx, control_rx) = crossbeam_channel::unbounded();

        Self {
            config,
            classifier,
            running: Arc::new(AtomicBool::new(false)),
            status: Arc::new(Mutex::new(EngineStatus::Idle)),
            word_tx,
            sentence_tx,
            status_tx,
            control_tx,
            control_rx,
            sentence: Arc::new(Mutex::new(SentenceSnapshot::default())),
            seq: Arc::new(AtomicU64::new(0)),
            diagnostics: Arc::new(PipelineDiagnostics::default()),
        }
    }

    /// Warm up the classifier. Call once before `start()`.
    pub fn warm_up(&self) -> Result<()> {
        self.set_status(EngineStatus::WarmingUp, None);
        info!("warming up gesture classifier");
        if let Err(e) = self.classifier.0.lock().warm_up() {
            self.set_status(EngineStatus::Error, Some(e.to_string()));
            return Err(e);
        }
        self.set_status(EngineStatus::Idle, None);
        info!("gesture classifier ready");
        Ok(())
    }

    /// Spawn the frame loop over `source`.
    ///
    /// Must be called from within a Tokio runtime. The returned handle
    /// resolves once the loop ends.
    ///
    /// # Errors
    /// - `SignlineError::AlreadyRunning` if already started.
    /// - `SignlineError::InvalidConfig` if the stabilizer config is invalid.
    pub fn start<S: FrameSource>(&self, source: S) -> Result<JoinHandle<()>> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SignlineError::AlreadyRunning);
        }
        if let Err(e) = self.config.stabilizer.validate() {
            self.running.store(false, Ordering::SeqCst);
            return Err(e);
        }

        // Commands queued while stopped belong to a previous run.
        while self.control_rx.try_recv().is_ok() {}

        self.diagnostics.reset();
        *self.sentence.lock() = SentenceSnapshot::default();
        self.set_status(EngineStatus::Running, None);

        let ctx = pipeline::PipelineContext {
            config: self.config.clone(),
            classifier: self.classifier.clone(),
            source: Box::new(source),
            control_rx: self.control_rx.clone(),
            running: Arc::clone(&self.running),
            word_tx: self.word_tx.clone(),
            sentence_tx: self.sentence_tx.clone(),
            status_tx: self.status_tx.clone(),
            status: Arc::clone(&self.status),
            sentence: Arc::clone(&self.sentence),
            seq: Arc::clone(&self.seq),
            diagnostics: Arc::clone(&self.diagnostics),
        };

        let handle = tokio::task::spawn_blocking(move || pipeline::run(ctx));
        info!(policy = self.config.stabilizer.policy.as_str(), "engine started");
        Ok(handle)
    }

    /// Request the loop to stop after the current frame.
    ///
    /// # Errors
    /// - `SignlineError::NotRunning` if not currently running.
    pub fn stop(&self) -> Result<()> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(SignlineError::NotRunning);
        }
        self.running.store(false, Ordering::SeqCst);
        self.set_status(EngineStatus::Stopped, None);
        info!("engine stop requested");
        Ok(())
    }

    /// Queue an atomic reset of window, cooldown and sentence.
    ///
    /// # Errors
    /// - `SignlineError::NotRunning` if the loop is not running.
    pub fn clear(&self) -> Result<()> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(SignlineError::NotRunning);
        }
        self.control_tx
            .send(ControlCommand::Clear)
            .map_err(|e| SignlineError::Other(anyhow::anyhow!("control channel closed: {e}")))
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> EngineStatus {
        *self.status.lock()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Latest rendered sentence.
    pub fn snapshot_text(&self) -> String {
        self.sentence.lock().text.clone()
    }

    pub fn sentence_snapshot(&self) -> SentenceSnapshot {
        self.sentence.lock().clone()
    }

    pub fn subscribe_words(&self) -> broadcast::Receiver<WordEvent> {
        self.word_tx.subscribe()
    }

    pub fn subscribe_sentence(&self) -> broadcast::Receiver<SentenceEvent> {
        self.sentence_tx.subscribe()
    }

    pub fn subscribe_status(&self) -> broadcast::Receiver<EngineStatusEvent> {
        self.status_tx.subscribe()
    }

    pub fn diagnostics_snapshot(&self) -> DiagnosticsSnapshot {
        self.diagnostics.snapshot()
    }

    // ── Internal helpers ─────────────────────────────────────────────────────

    fn set_status(&self, new_status: EngineStatus, detail: Option<String>) {
        *self.status.lock() = new_status;
        let _ = self.status_tx.send(EngineStatusEvent {
            status: new_status,
            detail,
        });
    }
}
