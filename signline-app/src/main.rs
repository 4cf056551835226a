//! Signline host entry point.
//!
//! ## Subcommands
//!
//! - `run`: continuous loop over a JSONL frame replay. Type `c` + Enter to
//!   clear the sentence, `q` + Enter to quit.
//! - `serve`: JSON request/response surface on stdin/stdout, one session
//!   lock per session id.
//! - `init-settings`: write the effective settings to the settings file.
//!
//! Logs go to stderr (`RUST_LOG`, default `info`); stdout carries only
//! announcements and replies.

mod commands;
mod settings;
mod state;

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use signline_core::{
    classifier::{CentroidClassifier, StubClassifier},
    format::PlainJoin,
    frames::JsonlFrameSource,
    ClassifierHandle, EngineStatus, SentenceFormatter, SignEngine,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};

use settings::{default_settings_path, load_settings, save_settings, AppSettings};
use state::AppState;

const USAGE: &str = "Usage: signline <run|serve|init-settings> [options]

Options:
  --settings <file>      settings JSON (default: platform data dir)
  --model <file>         centroid model JSON
  --stub <l:c,...>       scripted stub classifier, e.g. hello:0.9,yes:0.8
  --frames <file>        JSONL frame replay (run only)
  --policy <name>        windowed | per-frame";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Run,
    Serve,
    InitSettings,
    Help,
}

#[derive(Debug)]
struct Args {
    command: Command,
    settings_path: PathBuf,
    model: Option<PathBuf>,
    stub: Option<String>,
    frames: Option<PathBuf>,
    policy: Option<String>,
}

fn parse_args(raw: impl IntoIterator<Item = String>) -> Result<Args, String> {
    let mut it = raw.into_iter();
    let command = match it.next().as_deref() {
        Some("run") => Command::Run,
        Some("serve") => Command::Serve,
        Some("init-settings") => Command::InitSettings,
        Some("--help") | Some("-h") | Some("help") | None => Command::Help,
        Some(other) => return Err(format!("unknown command: {other}")),
    };

    let mut args = Args {
        command,
        settings_path: default_settings_path(),
        model: None,
        stub: None,
        frames: None,
        policy: None,
    };

    while let Some(arg) = it.next() {
        let mut value = |name: &str| it.next().ok_or_else(|| format!("missing value for {name}"));
        match arg.as_str() {
            "--settings" => args.settings_path = PathBuf::from(value("--settings")?),
            "--model" => args.model = Some(PathBuf::from(value("--model")?)),
            "--stub" => args.stub = Some(value("--stub")?),
            "--frames" => args.frames = Some(PathBuf::from(value("--frames")?)),
            "--policy" => args.policy = Some(value("--policy")?),
            "--help" | "-h" => args.command = Command::Help,
            other => return Err(format!("unknown argument: {other}")),
        }
    }
    Ok(args)
}

/// Parse `label:confidence` pairs separated by commas.
fn parse_stub_script(raw: &str) -> Result<Vec<(String, f32)>, String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|pair| {
            let (label, conf) = pair
                .rsplit_once(':')
                .ok_or_else(|| format!("stub entry `{pair}` is not label:confidence"))?;
            let conf: f32 = conf
                .trim()
                .parse()
                .map_err(|_| format!("invalid confidence in stub entry `{pair}`"))?;
            if !(conf.is_finite() && (0.0..=1.0).contains(&conf)) {
                return Err(format!("stub confidence must be within [0, 1] in `{pair}`"));
            }
            Ok((label.trim().to_string(), conf))
        })
        .collect()
}

fn build_classifier(settings: &AppSettings, stub: Option<&str>) -> anyhow::Result<ClassifierHandle> {
    if let Some(raw) = stub {
        let script = parse_stub_script(raw).map_err(anyhow::Error::msg)?;
        if script.is_empty() {
            bail!("--stub needs at least one label:confidence entry");
        }
        info!(entries = script.len(), "using scripted stub classifier");
        return Ok(ClassifierHandle::new(StubClassifier::scripted(script)));
    }
    let Some(path) = settings.model_path.as_deref() else {
        bail!("no classifier configured: pass --model <file> or --stub <label:conf,...>");
    };
    let classifier = CentroidClassifier::load(path)
        .with_context(|| format!("loading model {}", path.display()))?;
    if classifier.dims() != settings.feature_len {
        bail!(
            "model expects {} features but settings say {}",
            classifier.dims(),
            settings.feature_len
        );
    }
    Ok(ClassifierHandle::new(classifier))
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("signline=info,signline_core=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run().await {
        eprintln!("signline failed: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let args = parse_args(std::env::args().skip(1)).map_err(anyhow::Error::msg)?;

    let mut settings = load_settings(&args.settings_path);
    settings.apply_env_overrides();
    if let Some(policy) = &args.policy {
        settings.policy = policy.clone();
    }
    if let Some(model) = &args.model {
        settings.model_path = Some(model.clone());
    }
    settings.normalize();

    match args.command {
        Command::Help => {
            println!("{USAGE}");
            Ok(())
        }
        Command::InitSettings => {
            save_settings(&args.settings_path, &settings)
                .with_context(|| format!("writing {}", args.settings_path.display()))?;
            println!("{}", args.settings_path.display());
            Ok(())
        }
        Command::Run => {
            let frames = args
                .frames
                .clone()
                .context("run requires --frames <file.jsonl>")?;
            let classifier = build_classifier(&settings, args.stub.as_deref())?;
            run_loop(&settings, classifier, frames).await
        }
        Command::Serve => {
            let classifier = build_classifier(&settings, args.stub.as_deref())?;
            serve(settings, classifier).await
        }
    }
}

async fn run_loop(
    settings: &AppSettings,
    classifier: ClassifierHandle,
    frames: PathBuf,
) -> anyhow::Result<()> {
    let source = JsonlFrameSource::open(&frames, settings.feature_len)
        .with_context(|| format!("opening frames {}", frames.display()))?;
    let engine = Arc::new(SignEngine::new(settings.engine_config(), classifier));
    engine.warm_up()?;

    let mut words = engine.subscribe_words();
    let mut sentences = engine.subscribe_sentence();
    let mut handle = engine.start(source)?;
    spawn_keyboard_control(Arc::clone(&engine));

    loop {
        tokio::select! {
            res = &mut handle => {
                res.context("frame loop panicked")?;
                break;
            }
            Ok(ev) = words.recv() => println!("speak: {}", ev.word),
            Ok(ev) = sentences.recv() => println!("sentence: {}", ev.text),
        }
    }
    while let Ok(ev) = words.try_recv() {
        println!("speak: {}", ev.word);
    }
    while let Ok(ev) = sentences.try_recv() {
        println!("sentence: {}", ev.text);
    }

    let diag = engine.diagnostics_snapshot();
    info!(
        frames_in = diag.frames_in,
        hands_detected = diag.hands_detected,
        frames_rejected = diag.frames_rejected,
        windows_closed = diag.windows_closed,
        words_announced = diag.words_announced,
        clears = diag.clears,
        "run finished"
    );
    let snapshot = engine.sentence_snapshot();
    println!("final: {}", snapshot.text);
    println!("{}", transcript_line(&snapshot.words));

    if engine.status() == EngineStatus::Error {
        bail!("frame loop stopped on an error (see log)");
    }
    Ok(())
}

/// Raw announced words for downstream tools, without sentence casing.
fn transcript_line(words: &[String]) -> String {
    format!("transcript: {}", PlainJoin.format(words))
}

/// Read `c` / `q` commands from stdin on a plain thread so a pending read
/// never holds up runtime shutdown.
fn spawn_keyboard_control(engine: Arc<SignEngine>) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            match line.trim() {
                "c" => {
                    if let Err(e) = engine.clear() {
                        warn!("clear ignored: {e}");
                    }
                }
                "q" => {
                    if let Err(e) = engine.stop() {
                        warn!("stop ignored: {e}");
                    }
                    break;
                }
                "" => {}
                other => warn!("unknown key command: {other}"),
            }
        }
    });
}

async fn serve(settings: AppSettings, classifier: ClassifierHandle) -> anyhow::Result<()> {
    classifier.0.lock().warm_up()?;
    let state = AppState::new(settings, classifier)?;
    info!(policy = state.settings.decision_policy().as_str(), "serving on stdin/stdout");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let reply = commands::handle_line(&state, line);
        stdout.write_all(reply.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }

    let stats = state.stats();
    info!(
        requests = stats.requests,
        errors = stats.errors,
        sessions = stats.sessions,
        "input closed"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(raw: &[&str]) -> Result<Args, String> {
        parse_args(raw.iter().map(|s| s.to_string()))
    }

    #[test]
    fn parses_run_with_options() {
        let parsed = args(&["run", "--frames", "f.jsonl", "--policy", "per-frame"]).unwrap();
        assert_eq!(parsed.command, Command::Run);
        assert_eq!(parsed.frames, Some(PathBuf::from("f.jsonl")));
        assert_eq!(parsed.policy.as_deref(), Some("per-frame"));
    }

    #[test]
    fn rejects_unknown_and_incomplete_arguments() {
        assert!(args(&["dance"]).is_err());
        assert!(args(&["serve", "--model"]).is_err());
        assert!(args(&["serve", "--verbose"]).is_err());
        assert_eq!(args(&[]).unwrap().command, Command::Help);
    }

    #[test]
    fn stub_script_parses_pairs() {
        let script = parse_stub_script("hello:0.9, yes:0.8,").unwrap();
        assert_eq!(script, vec![("hello".to_string(), 0.9), ("yes".to_string(), 0.8)]);
        assert!(parse_stub_script("hello").is_err());
        assert!(parse_stub_script("hello:lots").is_err());
        assert!(parse_stub_script("hello:nan").is_err());
        assert!(parse_stub_script("hello:inf").is_err());
        assert!(parse_stub_script("hello:1.5").is_err());
    }

    #[test]
    fn transcript_keeps_words_as_announced() {
        let words = vec!["i".to_string(), "love".to_string(), "you".to_string()];
        assert_eq!(transcript_line(&words), "transcript: i love you");
        assert_eq!(transcript_line(&[]), "transcript: ");
    }

    #[test]
    fn missing_classifier_is_an_error() {
        let err = build_classifier(&AppSettings::default(), None).unwrap_err();
        assert!(err.to_string().contains("no classifier configured"));
    }
}
