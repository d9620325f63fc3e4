use crate::client::DetectionClient;
use crate::model::{BeliefSnapshot, ControlAction, SyncCommand, SyncConfig, SyncEvent};
use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Output line routing for the stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to keep terminal I/O off the
/// async tasks.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

/// One-shot control action for `--send`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SendAction {
    Start,
    Pause,
    Resume,
    Stop,
}

impl From<SendAction> for ControlAction {
    fn from(action: SendAction) -> Self {
        match action {
            SendAction::Start => ControlAction::Start,
            SendAction::Pause => ControlAction::Pause,
            SendAction::Resume => ControlAction::Resume,
            SendAction::Stop => ControlAction::Stop,
        }
    }
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "detectctl",
    version,
    about = "Control and monitor a remote video-detection service"
)]
pub struct Cli {
    /// Base URL of the detection dashboard API
    #[arg(long, default_value = "http://127.0.0.1:8000")]
    pub base_url: String,

    /// CSRF token attached to control requests
    #[arg(long)]
    pub csrf_token: Option<String>,

    /// Print the current service status as JSON and exit (no TUI)
    #[arg(long, conflicts_with_all = ["text", "send"])]
    pub json: bool,

    /// Follow status changes as plain text until Ctrl-C (no TUI)
    #[arg(long, conflicts_with = "send")]
    pub text: bool,

    /// Send a single control action and exit (no TUI)
    #[arg(long, value_enum)]
    pub send: Option<SendAction>,

    /// HTTP request timeout
    #[arg(long, default_value = "5s")]
    pub request_timeout: humantime::Duration,

    /// Poll interval while the job is starting up
    #[arg(long, default_value = "500ms")]
    pub starting_poll_interval: humantime::Duration,

    /// Poll interval while the job is running
    #[arg(long, default_value = "1s")]
    pub running_poll_interval: humantime::Duration,

    /// Poll interval while the job is paused
    #[arg(long, default_value = "2s")]
    pub paused_poll_interval: humantime::Duration,

    /// Poll interval while the terminal is unfocused
    #[arg(long, default_value = "5s")]
    pub hidden_poll_interval: humantime::Duration,
}

impl Cli {
    /// True for the modes that never enter the TUI.
    pub fn headless(&self) -> bool {
        self.json || self.text || self.send.is_some()
    }
}

/// Build a `SyncConfig` from CLI arguments.
pub fn build_config(args: &Cli) -> SyncConfig {
    SyncConfig {
        base_url: args.base_url.clone(),
        csrf_token: args.csrf_token.clone(),
        request_timeout: Duration::from(args.request_timeout),
        starting_poll_interval: Duration::from(args.starting_poll_interval),
        running_poll_interval: Duration::from(args.running_poll_interval),
        paused_poll_interval: Duration::from(args.paused_poll_interval),
        hidden_poll_interval: Duration::from(args.hidden_poll_interval),
        user_agent: format!("detectctl/{}", env!("CARGO_PKG_VERSION")),
    }
}

pub async fn run(args: Cli) -> Result<()> {
    if let Some(action) = args.send {
        return run_send(&args, action.into()).await;
    }
    if args.json {
        return run_json(&args).await;
    }
    if !args.text {
        #[cfg(feature = "tui")]
        {
            return crate::tui::run(args).await;
        }
    }

    // Headless follower; also the fallback when built without TUI support.
    run_text(args).await
}

/// Fetch the current status once and print it as JSON.
async fn run_json(args: &Cli) -> Result<()> {
    let cfg = build_config(args);
    let client = DetectionClient::new(&cfg)?;
    let report = client
        .fetch_status()
        .await
        .context("failed to fetch detection status")?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Send one control action and print its acknowledgement.
async fn run_send(args: &Cli, action: ControlAction) -> Result<()> {
    let cfg = build_config(args);
    let client = DetectionClient::new(&cfg)?;
    client
        .control(action)
        .await
        .with_context(|| format!("{} request rejected", action.as_str()))?;
    println!("{}", action.expected_ack());
    Ok(())
}

/// Run the sync controller headless and print belief changes as lines.
async fn run_text(args: Cli) -> Result<()> {
    let cfg = build_config(&args);
    let client = Arc::new(DetectionClient::new(&cfg)?);
    let (out_tx, out_handle) = spawn_output_writer();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<SyncEvent>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<SyncCommand>();

    let controller = tokio::spawn(crate::sync::run_controller(cfg, client, event_tx, cmd_rx));

    let mut last_snapshot: Option<BeliefSnapshot> = None;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                let _ = cmd_tx.send(SyncCommand::Shutdown);
                break;
            }
            ev = event_rx.recv() => {
                match ev {
                    Some(ev) => print_event(&out_tx, &mut last_snapshot, ev),
                    None => break,
                }
            }
        }
    }

    drop(out_tx);
    let _ = out_handle.await;
    controller
        .await
        .context("sync controller task failed")??;
    Ok(())
}

fn print_event(
    out_tx: &mpsc::UnboundedSender<OutputLine>,
    last_snapshot: &mut Option<BeliefSnapshot>,
    ev: SyncEvent,
) {
    match ev {
        SyncEvent::Belief(snap) => {
            // Polls re-report unchanged state; only print transitions.
            if last_snapshot.as_ref() == Some(&snap) {
                return;
            }
            *last_snapshot = Some(snap);
            let busy = if snap.processing { " (busy)" } else { "" };
            let _ = out_tx.send(OutputLine::Stdout(format!(
                "status={} suitable={} unsuitable={}{}",
                snap.status, snap.suitable_count, snap.unsuitable_count, busy
            )));
        }
        SyncEvent::ControlFailed { action, message } => {
            let _ = out_tx.send(OutputLine::Stderr(format!("{action} failed: {message}")));
        }
        SyncEvent::ServiceUnreachable { message } => {
            let _ = out_tx.send(OutputLine::Stderr(format!(
                "cannot reach detection service: {message}"
            )));
        }
        SyncEvent::Notice(msg) => {
            let _ = out_tx.send(OutputLine::Stderr(msg));
        }
    }
}
