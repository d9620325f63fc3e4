//! Sync controller for the remote detection job.
//!
//! Owns client belief, the single poll timer, and the in-flight control
//! action; emits belief snapshots for presentation layers.

use crate::client::DetectionClient;
use crate::model::{ControlAction, ServiceStatus, StatusReport, SyncCommand, SyncConfig, SyncEvent};
use crate::sync::belief::ClientBelief;
use crate::sync::poller::{PollCadence, PollTimer};
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Outcome of one spawned status fetch, tagged for the ordering guard.
struct PollOutcome {
    seq: u64,
    result: Result<StatusReport>,
}

/// The in-flight control action. Only one may exist at a time; commands
/// arriving while it is set are dropped, not queued.
struct Inflight {
    action: ControlAction,
    handle: Option<JoinHandle<Result<()>>>,
}

fn spawn_control(client: &Arc<DetectionClient>, action: ControlAction) -> Inflight {
    let client = client.clone();
    let handle = tokio::spawn(async move { client.control(action).await });
    Inflight {
        action,
        handle: Some(handle),
    }
}

fn spawn_poll(client: &Arc<DetectionClient>, seq: u64, poll_tx: &UnboundedSender<PollOutcome>) {
    let client = client.clone();
    let tx = poll_tx.clone();
    tokio::spawn(async move {
        let result = client.fetch_status().await;
        let _ = tx.send(PollOutcome { seq, result });
    });
}

/// Reconcile belief with the service once at startup, mirroring a job that
/// may already be running in the background from another session.
async fn restore_status(
    client: &DetectionClient,
    belief: &mut ClientBelief,
    timer: &mut PollTimer,
    cfg: &SyncConfig,
    event_tx: &UnboundedSender<SyncEvent>,
) {
    // Reachability check first; an unreachable service gets a visible
    // warning while the controller stays usable.
    if let Err(e) = client.fetch_status().await {
        warn!(error = %e, "detection service unreachable at startup");
        let _ = event_tx.send(SyncEvent::ServiceUnreachable {
            message: format!("{e:#}"),
        });
        return;
    }

    debug!("restoring detection status");
    match client.fetch_status().await {
        Ok(report) => {
            belief.suitable_count = report.suitable_count;
            belief.unsuitable_count = report.unsuitable_count;
            match report.status {
                ServiceStatus::Running => {
                    belief.running = true;
                    belief.paused = false;
                    belief.status = ServiceStatus::Running;
                    if report.suitable_count > 0 || report.unsuitable_count > 0 {
                        let _ = event_tx.send(SyncEvent::Notice(
                            "Detection is running in background; current counts restored."
                                .to_string(),
                        ));
                    }
                    timer.schedule(PollCadence::Running, cfg);
                }
                ServiceStatus::Paused => {
                    belief.running = true;
                    belief.paused = true;
                    belief.status = ServiceStatus::Paused;
                    // No polling until the next user action.
                    let _ = event_tx.send(SyncEvent::Notice(
                        "Detection is paused; resume to continue.".to_string(),
                    ));
                }
                ServiceStatus::Loading => {
                    belief.running = true;
                    belief.paused = false;
                    belief.status = ServiceStatus::Loading;
                    let _ = event_tx.send(SyncEvent::Notice(
                        "Detection is starting up...".to_string(),
                    ));
                    timer.schedule(PollCadence::Starting, cfg);
                }
                ServiceStatus::Stopped => {}
            }
        }
        Err(e) => {
            warn!(error = %e, "failed to restore detection status");
        }
    }
}

/// Run the sync controller until `Shutdown` arrives or the command channel
/// closes. Single task: belief, timer, and the ordering guard are never
/// shared.
pub async fn run_controller(
    cfg: SyncConfig,
    client: Arc<DetectionClient>,
    event_tx: UnboundedSender<SyncEvent>,
    mut cmd_rx: UnboundedReceiver<SyncCommand>,
) -> Result<()> {
    let mut belief = ClientBelief::default();
    let mut timer = PollTimer::new();
    let (poll_tx, mut poll_rx) = mpsc::unbounded_channel::<PollOutcome>();
    let mut inflight: Option<Inflight> = None;
    let mut hidden = false;
    // Poll ordering guard: fetches are numbered as they are issued and a
    // response no newer than the last applied (or invalidated) one is
    // dropped.
    let mut next_seq: u64 = 0;
    let mut applied_seq: u64 = 0;

    restore_status(&client, &mut belief, &mut timer, &cfg, &event_tx).await;
    let _ = event_tx.send(SyncEvent::Belief(belief.snapshot()));

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(SyncCommand::Start) => {
                        if belief.processing || belief.running {
                            debug!("start ignored: action in flight or already running");
                        } else {
                            belief.processing = true;
                            belief.status = ServiceStatus::Loading;
                            let _ = event_tx.send(SyncEvent::Belief(belief.snapshot()));
                            inflight = Some(spawn_control(&client, ControlAction::Start));
                        }
                    }
                    Some(SyncCommand::TogglePause) => {
                        if belief.processing || !belief.running {
                            debug!("pause/resume ignored: action in flight or not running");
                        } else {
                            let action = if belief.paused {
                                ControlAction::Resume
                            } else {
                                ControlAction::Pause
                            };
                            belief.processing = true;
                            let _ = event_tx.send(SyncEvent::Belief(belief.snapshot()));
                            inflight = Some(spawn_control(&client, action));
                        }
                    }
                    Some(SyncCommand::Stop) => {
                        if belief.processing || !belief.running {
                            debug!("stop ignored: action in flight or not running");
                        } else {
                            belief.processing = true;
                            let _ = event_tx.send(SyncEvent::Belief(belief.snapshot()));
                            inflight = Some(spawn_control(&client, ControlAction::Stop));
                        }
                    }
                    Some(SyncCommand::SetHidden(h)) => {
                        if h != hidden {
                            hidden = h;
                            if timer.is_active() && belief.running {
                                if hidden {
                                    debug!("terminal hidden; relaxing poll cadence");
                                    timer.schedule(PollCadence::Hidden, &cfg);
                                } else {
                                    debug!("terminal visible; restoring poll cadence");
                                    let cadence = if belief.paused {
                                        PollCadence::Paused
                                    } else {
                                        PollCadence::Running
                                    };
                                    timer.schedule(cadence, &cfg);
                                    // Resynchronize right away instead of
                                    // waiting out the first period.
                                    next_seq += 1;
                                    spawn_poll(&client, next_seq, &poll_tx);
                                }
                            }
                        }
                    }
                    Some(SyncCommand::Shutdown) | None => break,
                }
            }
            // Do not take the JoinHandle before this branch wins; otherwise it
            // can be dropped when another branch is chosen and the completion
            // is never observed.
            maybe_done = async {
                if let Some(infl) = &mut inflight {
                    if let Some(h) = infl.handle.as_mut() {
                        return Some(h.await);
                    }
                }
                futures::future::pending().await
            } => {
                if let Some(join_res) = maybe_done {
                    if let Some(infl) = inflight.take() {
                        let result = match join_res {
                            Ok(res) => res,
                            Err(e) => Err(anyhow::anyhow!("control task failed: {e}")),
                        };
                        let succeeded = result.is_ok();
                        match (infl.action, result) {
                            (ControlAction::Start, Ok(())) => {
                                belief.running = true;
                                belief.paused = false;
                                timer.schedule(PollCadence::Starting, &cfg);
                            }
                            (ControlAction::Start, Err(e)) => {
                                belief.mark_stopped();
                                timer.cancel();
                                let _ = event_tx.send(SyncEvent::ControlFailed {
                                    action: ControlAction::Start,
                                    message: format!("{e:#}"),
                                });
                            }
                            (ControlAction::Pause, Ok(())) => {
                                belief.paused = true;
                                belief.status = ServiceStatus::Paused;
                                timer.reschedule_if_active(PollCadence::Paused, &cfg);
                            }
                            (ControlAction::Resume, Ok(())) => {
                                belief.paused = false;
                                belief.status = ServiceStatus::Running;
                                timer.reschedule_if_active(PollCadence::Running, &cfg);
                            }
                            (ControlAction::Stop, Ok(())) => {
                                belief.mark_stopped();
                                belief.suitable_count = 0;
                                belief.unsuitable_count = 0;
                                timer.cancel();
                            }
                            // Pause/resume/stop failures leave state as it
                            // was; only the success paths move it.
                            (action, Err(e)) => {
                                let _ = event_tx.send(SyncEvent::ControlFailed {
                                    action,
                                    message: format!("{e:#}"),
                                });
                            }
                        }
                        if succeeded {
                            // Polls issued before the acknowledgement describe
                            // a state the action just replaced.
                            applied_seq = next_seq;
                        }
                        belief.processing = false;
                        let _ = event_tx.send(SyncEvent::Belief(belief.snapshot()));
                    }
                }
            }
            _ = timer.tick() => {
                next_seq += 1;
                spawn_poll(&client, next_seq, &poll_tx);
            }
            out = poll_rx.recv() => {
                if let Some(out) = out {
                    if out.seq <= applied_seq {
                        debug!(seq = out.seq, applied = applied_seq, "stale poll response dropped");
                    } else {
                        applied_seq = out.seq;
                        match out.result {
                            Ok(report) => {
                                let job_running = belief.apply_report(&report);
                                if job_running && !hidden {
                                    timer.reschedule_if_active(PollCadence::Running, &cfg);
                                }
                                let _ = event_tx.send(SyncEvent::Belief(belief.snapshot()));
                            }
                            Err(e) => {
                                // Fail closed: the first poll error abandons
                                // polling and assumes the service is gone.
                                warn!(error = %e, "status poll failed; abandoning polling");
                                timer.cancel();
                                belief.mark_stopped();
                                let _ = event_tx.send(SyncEvent::Belief(belief.snapshot()));
                            }
                        }
                    }
                }
            }
        }
    }

    Ok(())
}
