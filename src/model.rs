use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    pub base_url: String,
    #[serde(default)]
    pub csrf_token: Option<String>,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub starting_poll_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub running_poll_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub paused_poll_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub hidden_poll_interval: Duration,
    pub user_agent: String,
}

/// Job state as reported by the detection service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Stopped,
    Loading,
    Running,
    Paused,
}

impl ServiceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ServiceStatus::Stopped => "stopped",
            ServiceStatus::Loading => "loading",
            ServiceStatus::Running => "running",
            ServiceStatus::Paused => "paused",
        }
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One response from the status/counts endpoint. Counters the service
/// omits deserialize to zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusReport {
    pub status: ServiceStatus,
    #[serde(default)]
    pub suitable_count: u64,
    #[serde(default)]
    pub unsuitable_count: u64,
}

/// The four remote control operations and their expected acknowledgements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    Start,
    Pause,
    Resume,
    Stop,
}

impl ControlAction {
    pub fn endpoint(self) -> &'static str {
        match self {
            ControlAction::Start => "/api/detection/start/",
            ControlAction::Pause => "/api/detection/pause/",
            ControlAction::Resume => "/api/detection/resume/",
            ControlAction::Stop => "/api/detection/stop/",
        }
    }

    /// The `status` string a successful call must answer with.
    pub fn expected_ack(self) -> &'static str {
        match self {
            ControlAction::Start => "started",
            ControlAction::Pause => "paused",
            ControlAction::Resume => "resumed",
            ControlAction::Stop => "stopped",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ControlAction::Start => "start",
            ControlAction::Pause => "pause",
            ControlAction::Resume => "resume",
            ControlAction::Stop => "stop",
        }
    }
}

impl fmt::Display for ControlAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// UI-facing projection of the controller's belief. Button affordances are
/// derived from `(running, paused, processing)` and nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeliefSnapshot {
    pub running: bool,
    pub paused: bool,
    pub processing: bool,
    pub status: ServiceStatus,
    pub suitable_count: u64,
    pub unsuitable_count: u64,
}

impl Default for BeliefSnapshot {
    fn default() -> Self {
        Self {
            running: false,
            paused: false,
            processing: false,
            status: ServiceStatus::Stopped,
            suitable_count: 0,
            unsuitable_count: 0,
        }
    }
}

impl BeliefSnapshot {
    pub fn start_enabled(&self) -> bool {
        !self.running && !self.processing
    }

    pub fn pause_enabled(&self) -> bool {
        self.running && !self.processing
    }

    pub fn stop_enabled(&self) -> bool {
        self.running && !self.processing
    }

    pub fn pause_label(&self) -> &'static str {
        if self.paused {
            "Resume"
        } else {
            "Pause"
        }
    }
}

/// Events emitted by the sync controller for presentation layers.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// Belief changed; carries the full projection.
    Belief(BeliefSnapshot),
    /// A control action was rejected or failed in transit.
    ControlFailed {
        action: ControlAction,
        message: String,
    },
    /// Startup reachability check failed.
    ServiceUnreachable { message: String },
    /// Informational message from startup reconciliation.
    Notice(String),
}

/// Commands from presentation layers into the sync controller.
#[derive(Debug, Clone)]
pub enum SyncCommand {
    Start,
    /// Pause when running, resume when paused.
    TogglePause,
    Stop,
    /// Terminal focus lost (true) or regained (false).
    SetHidden(bool),
    Shutdown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_report_defaults_missing_counters() {
        let report: StatusReport =
            serde_json::from_str(r#"{"status":"loading"}"#).expect("parse report");
        assert_eq!(report.status, ServiceStatus::Loading);
        assert_eq!(report.suitable_count, 0);
        assert_eq!(report.unsuitable_count, 0);
    }

    #[test]
    fn service_status_uses_lowercase_wire_names() {
        for (status, wire) in [
            (ServiceStatus::Stopped, "\"stopped\""),
            (ServiceStatus::Loading, "\"loading\""),
            (ServiceStatus::Running, "\"running\""),
            (ServiceStatus::Paused, "\"paused\""),
        ] {
            assert_eq!(serde_json::to_string(&status).expect("serialize"), wire);
        }
    }

    #[test]
    fn affordances_derive_from_run_flags() {
        let mut snap = BeliefSnapshot::default();
        assert!(snap.start_enabled());
        assert!(!snap.pause_enabled());
        assert!(!snap.stop_enabled());

        snap.running = true;
        assert!(!snap.start_enabled());
        assert!(snap.pause_enabled());
        assert!(snap.stop_enabled());

        snap.processing = true;
        assert!(!snap.start_enabled());
        assert!(!snap.pause_enabled());
        assert!(!snap.stop_enabled());
    }

    #[test]
    fn pause_label_flips_with_paused_flag() {
        let mut snap = BeliefSnapshot::default();
        assert_eq!(snap.pause_label(), "Pause");
        snap.paused = true;
        assert_eq!(snap.pause_label(), "Resume");
    }
}
