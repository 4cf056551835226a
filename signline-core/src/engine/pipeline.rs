//! Blocking frame loop.
//!
//! ## Stages (per iteration)
//!
//! ```text
//! 1. Apply queued control commands (clear)
//! 2. Pull the next frame; end of stream stops the loop
//! 3. No hand → nothing observed, state untouched
//! 4. Hand → validate features → classify → Stabilizer::observe
//! 5. On announcement broadcast WordEvent + SentenceEvent
//! 6. Sleep for the configured frame interval
//! ```
//!
//! Rejected frames (bad feature length, non-finite values) are skipped and
//! counted. Classifier and source failures stop the loop with status `Error`.

use std::sync::{
    atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    Arc,
};
use std::time::Instant;

use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::{
    classifier::ClassifierHandle,
    engine::EngineConfig,
    error::SignlineError,
    frames::{Frame, FrameSource},
    ipc::events::{EngineStatus, EngineStatusEvent, SentenceEvent, WordEvent},
    stabilizer::Stabilizer,
};

/// Commands accepted by the loop between frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    /// Reset window, cooldown and sentence together.
    Clear,
}

/// Latest sentence published by the loop.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SentenceSnapshot {
    pub words: Vec<String>,
    pub text: String,
}

#[derive(Default)]
pub struct PipelineDiagnostics {
    pub frames_in: AtomicUsize,
    pub hands_detected: AtomicUsize,
    pub frames_rejected: AtomicUsize,
    pub observations: AtomicUsize,
    pub windows_closed: AtomicUsize,
    pub words_announced: AtomicUsize,
    pub clears: AtomicUsize,
    pub classifier_errors: AtomicUsize,
}

impl PipelineDiagnostics {
    pub fn reset(&self) {
        self.frames_in.store(0, Ordering::Relaxed);
        self.hands_detected.store(0, Ordering::Relaxed);
        self.frames_rejected.store(0, Ordering::Relaxed);
        self.observations.store(0, Ordering::Relaxed);
        self.windows_closed.store(0, Ordering::Relaxed);
        self.words_announced.store(0, Ordering::Relaxed);
        self.clears.store(0, Ordering::Relaxed);
        self.classifier_errors.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            frames_in: self.frames_in.load(Ordering::Relaxed),
            hands_detected: self.hands_detected.load(Ordering::Relaxed),
            frames_rejected: self.frames_rejected.load(Ordering::Relaxed),
            observations: self.observations.load(Ordering::Relaxed),
            windows_closed: self.windows_closed.load(Ordering::Relaxed),
            words_announced: self.words_announced.load(Ordering::Relaxed),
            clears: self.clears.load(Ordering::Relaxed),
            classifier_errors: self.classifier_errors.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiagnosticsSnapshot {
    pub frames_in: usize,
    pub hands_detected: usize,
    pub frames_rejected: usize,
    pub observations: usize,
    pub windows_closed: usize,
    pub words_announced: usize,
    pub clears: usize,
    pub classifier_errors: usize,
}

/// All context the loop needs, passed as one struct so the closure stays tidy.
pub struct PipelineContext {
    pub config: EngineConfig,
    pub classifier: ClassifierHandle,
    pub source: Box<dyn FrameSource>,
    pub control_rx: Receiver<ControlCommand>,
    pub running: Arc<AtomicBool>,
    pub word_tx: broadcast::Sender<WordEvent>,
    pub sentence_tx: broadcast::Sender<SentenceEvent>,
    pub status_tx: broadcast::Sender<EngineStatusEvent>,
    pub status: Arc<Mutex<EngineStatus>>,
    pub sentence: Arc<Mutex<SentenceSnapshot>>,
    pub seq: Arc<AtomicU64>,
    pub diagnostics: Arc<PipelineDiagnostics>,
}

/// Run the blocking loop until `ctx.running` becomes false, the source ends,
/// or a fatal error occurs.
pub fn run(mut ctx: PipelineContext) {
    info!("pipeline started");

    let mut stabilizer = match Stabilizer::new(ctx.config.stabilizer.clone()) {
        Ok(s) => s,
        Err(e) => {
            fail(&ctx, &e);
            return;
        }
    };

    loop {
        // ── 0. Check running flag ─────────────────────────────────────────
        if !ctx.running.load(Ordering::Relaxed) {
            break;
        }

        // ── 1. Control commands ───────────────────────────────────────────
        while let Ok(command) = ctx.control_rx.try_recv() {
            match command {
                ControlCommand::Clear => {
                    stabilizer.clear();
                    ctx.diagnostics.clears.fetch_add(1, Ordering::Relaxed);
                    publish_sentence(&ctx, &stabilizer, true);
                    info!("sentence cleared");
                }
            }
        }

        // ── 2. Pull next frame ────────────────────────────────────────────
        let frame = match ctx.source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                info!("frame source exhausted");
                break;
            }
            Err(e) if e.is_rejected_input() => {
                ctx.diagnostics.frames_in.fetch_add(1, Ordering::Relaxed);
                ctx.diagnostics.frames_rejected.fetch_add(1, Ordering::Relaxed);
                warn!("frame rejected: {e}");
                continue;
            }
            Err(e) => {
                error!("frame source failed: {e}");
                fail(&ctx, &e);
                return;
            }
        };
        ctx.diagnostics.frames_in.fetch_add(1, Ordering::Relaxed);

        // ── 3/4. Classify + stabilize ─────────────────────────────────────
        if let Frame::Hand(features) = frame {
            ctx.diagnostics.hands_detected.fetch_add(1, Ordering::Relaxed);

            if features.len() != ctx.config.feature_len {
                ctx.diagnostics.frames_rejected.fetch_add(1, Ordering::Relaxed);
                warn!(
                    expected = ctx.config.feature_len,
                    actual = features.len(),
                    "frame rejected: wrong feature length"
                );
                continue;
            }

            let classification = match ctx.classifier.classify(&features) {
                Ok(c) => c,
                Err(e) if e.is_rejected_input() => {
                    ctx.diagnostics.frames_rejected.fetch_add(1, Ordering::Relaxed);
                    warn!("classifier rejected frame: {e}");
                    continue;
                }
                Err(e) => {
                    ctx.diagnostics
                        .classifier_errors
                        .fetch_add(1, Ordering::Relaxed);
                    error!("classifier failed: {e}");
                    fail(&ctx, &e);
                    return;
                }
            };
            debug!(
                label = %classification.label,
                confidence = classification.confidence,
                distribution = ?classification.distribution,
                "frame classified"
            );
            ctx.diagnostics.observations.fetch_add(1, Ordering::Relaxed);

            let closed_before = stabilizer.windows_closed();
            let announced = stabilizer.observe(&classification.observation(), Instant::now());
            if stabilizer.windows_closed() > closed_before {
                ctx.diagnostics.windows_closed.fetch_add(1, Ordering::Relaxed);
            }

            // ── 5. Broadcast ──────────────────────────────────────────────
            if let Some(event) = announced {
                ctx.diagnostics
                    .words_announced
                    .fetch_add(1, Ordering::Relaxed);
                let text = stabilizer.snapshot_text();
                let _ = ctx.word_tx.send(WordEvent {
                    seq: next_seq(&ctx),
                    word: event.word,
                    confidence: event.confidence,
                    sentence: text,
                });
                publish_sentence(&ctx, &stabilizer, false);
            }
        }

        // ── 6. Pace ───────────────────────────────────────────────────────
        if !ctx.config.frame_interval.is_zero() {
            std::thread::sleep(ctx.config.frame_interval);
        }
    }

    ctx.running.store(false, Ordering::SeqCst);
    set_status(&ctx, EngineStatus::Stopped, None);
    let diag = ctx.diagnostics.snapshot();
    info!(
        frames_in = diag.frames_in,
        hands_detected = diag.hands_detected,
        words_announced = diag.words_announced,
        "pipeline stopped"
    );
}

fn next_seq(ctx: &PipelineContext) -> u64 {
    ctx.seq.fetch_add(1, Ordering::Relaxed)
}

fn publish_sentence(ctx: &PipelineContext, stabilizer: &Stabilizer, cleared: bool) {
    let words = stabilizer.snapshot();
    let text = stabilizer.snapshot_text();
    *ctx.sentence.lock() = SentenceSnapshot {
        words: words.clone(),
        text: text.clone(),
    };
    let _ = ctx.sentence_tx.send(SentenceEvent {
        seq: next_seq(ctx),
        words,
        text,
        cleared,
    });
}

fn set_status(ctx: &PipelineContext, status: EngineStatus, detail: Option<String>) {
    *ctx.status.lock() = status;
    let _ = ctx.status_tx.send(EngineStatusEvent { status, detail });
}

fn fail(ctx: &PipelineContext, err: &SignlineError) {
    ctx.running.store(false, Ordering::SeqCst);
    set_status(ctx, EngineStatus::Error, Some(err.to_string()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{FeatureVector, StubClassifier};
    use crate::frames::VecFrameSource;
    use crate::stabilizer::StabilizerConfig;
    use std::time::Duration;

    struct Harness {
        ctx: PipelineContext,
        word_rx: broadcast::Receiver<WordEvent>,
        sentence_rx: broadcast::Receiver<SentenceEvent>,
        status: Arc<Mutex<EngineStatus>>,
        sentence: Arc<Mutex<SentenceSnapshot>>,
        diagnostics: Arc<PipelineDiagnostics>,
        control_tx: crossbeam_channel::Sender<ControlCommand>,
    }

    fn hand() -> Frame {
        Frame::Hand(FeatureVector::new(vec![0.3; 63], 63).unwrap())
    }

    fn harness(
        stabilizer: StabilizerConfig,
        classifier: StubClassifier,
        source: VecFrameSource,
    ) -> Harness {
        let (word_tx, word_rx) = broadcast::channel(64);
        let (sentence_tx, sentence_rx) = broadcast::channel(64);
        let (status_tx, _) = broadcast::channel(8);
        let (control_tx, control_rx) = crossbeam_channel::unbounded();
        let status = Arc::new(Mutex::new(EngineStatus::Running));
        let sentence = Arc::new(Mutex::new(SentenceSnapshot::default()));
        let diagnostics = Arc::new(PipelineDiagnostics::default());

        let ctx = PipelineContext {
            config: EngineConfig {
                stabilizer,
                frame_interval: Duration::ZERO,
                feature_len: 63,
            },
            classifier: ClassifierHandle::new(classifier),
            source: Box::new(source),
            control_rx,
            running: Arc::new(AtomicBool::new(true)),
            word_tx,
            sentence_tx,
            status_tx,
            status: Arc::clone(&status),
            sentence: Arc::clone(&sentence),
            seq: Arc::new(AtomicU64::new(0)),
            diagnostics: Arc::clone(&diagnostics),
        };
        Harness {
            ctx,
            word_rx,
            sentence_rx,
            status,
            sentence,
            diagnostics,
            control_tx,
        }
    }

    fn drain<T: Clone>(rx: &mut broadcast::Receiver<T>) -> Vec<T> {
        let mut out = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            out.push(ev);
        }
        out
    }

    #[test]
    fn run_announces_majority_and_stops_when_source_ends() {
        let config = StabilizerConfig {
            window_size: 4,
            ..StabilizerConfig::windowed()
        };
        let classifier = StubClassifier::scripted(vec![
            ("yes".into(), 0.5),
            ("yes".into(), 0.6),
            ("no".into(), 0.9),
            ("yes".into(), 0.5),
        ]);
        let source = VecFrameSource::new(vec![hand(), Frame::NoHand, hand(), hand(), hand()]);
        let mut h = harness(config, classifier, source);

        run(h.ctx);

        let words = drain(&mut h.word_rx);
        assert_eq!(words.len(), 1);
        assert_eq!(words[0].word, "yes");
        assert_eq!(words[0].sentence, "Yes.");
        assert_eq!(*h.status.lock(), EngineStatus::Stopped);
        assert_eq!(h.sentence.lock().words, vec!["yes"]);

        let diag = h.diagnostics.snapshot();
        assert_eq!(diag.frames_in, 5);
        assert_eq!(diag.hands_detected, 4);
        assert_eq!(diag.observations, 4);
        assert_eq!(diag.windows_closed, 1);
        assert_eq!(diag.words_announced, 1);
    }

    #[test]
    fn queued_clear_resets_before_first_frame() {
        let classifier = StubClassifier::fixed("hello", 0.9);
        let source = VecFrameSource::new(vec![hand()]);
        let mut h = harness(StabilizerConfig::per_frame(), classifier, source);
        h.control_tx.send(ControlCommand::Clear).unwrap();

        run(h.ctx);

        let sentences = drain(&mut h.sentence_rx);
        assert_eq!(sentences.len(), 2);
        assert!(sentences[0].cleared);
        assert_eq!(sentences[0].text, "");
        assert!(!sentences[1].cleared);
        assert_eq!(sentences[1].text, "Hello.");
        assert!(sentences[1].seq > sentences[0].seq);
        assert_eq!(h.diagnostics.snapshot().clears, 1);
    }

    #[test]
    fn rejected_frames_are_skipped() {
        let classifier = StubClassifier::fixed("love", 0.9);
        let mut source = VecFrameSource::new(vec![Frame::Hand(
            FeatureVector::new(vec![0.1; 10], 10).unwrap(),
        )]);
        source.push_error(SignlineError::InvalidFeatureLength {
            expected: 63,
            actual: 2,
        });
        let mut h = harness(StabilizerConfig::per_frame(), classifier, source);

        run(h.ctx);

        assert!(drain(&mut h.word_rx).is_empty());
        let diag = h.diagnostics.snapshot();
        assert_eq!(diag.frames_rejected, 2);
        assert_eq!(diag.observations, 0);
        assert_eq!(*h.status.lock(), EngineStatus::Stopped);
    }

    #[test]
    fn nan_classifier_output_is_skipped_not_announced() {
        let classifier = StubClassifier::scripted(vec![
            ("hello".into(), f32::NAN),
            ("yes".into(), 0.9),
        ]);
        let source = VecFrameSource::new(vec![hand(), hand()]);
        let mut h = harness(StabilizerConfig::per_frame(), classifier, source);

        run(h.ctx);

        let words: Vec<String> = drain(&mut h.word_rx).into_iter().map(|e| e.word).collect();
        assert_eq!(words, vec!["yes"]);
        let diag = h.diagnostics.snapshot();
        assert_eq!(diag.frames_rejected, 1);
        assert_eq!(diag.observations, 1);
        assert_eq!(*h.status.lock(), EngineStatus::Stopped);
    }

    #[test]
    fn classifier_failure_stops_with_error_status() {
        let classifier = StubClassifier::scripted(Vec::new());
        let source = VecFrameSource::new(vec![hand(), hand()]);
        let h = harness(StabilizerConfig::per_frame(), classifier, source);
        let running = Arc::clone(&h.ctx.running);

        run(h.ctx);

        assert_eq!(*h.status.lock(), EngineStatus::Error);
        assert!(!running.load(Ordering::SeqCst));
        assert_eq!(h.diagnostics.snapshot().classifier_errors, 1);
    }

    #[test]
    fn stopped_flag_exits_without_pulling_frames() {
        let classifier = StubClassifier::fixed("yes", 0.9);
        let source = VecFrameSource::new(vec![hand()]);
        let h = harness(StabilizerConfig::per_frame(), classifier, source);
        h.ctx.running.store(false, Ordering::SeqCst);

        run(h.ctx);

        assert_eq!(h.diagnostics.snapshot().frames_in, 0);
    }
}
