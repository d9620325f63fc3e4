use crate::model::{BeliefSnapshot, ServiceStatus, StatusReport};

/// The client's local, possibly stale, model of remote job state.
///
/// `running` and `paused` feed the button affordances; `status` is the
/// visible indicator, which can lag belief on purpose (see `apply_report`).
#[derive(Debug, Clone)]
pub(super) struct ClientBelief {
    pub running: bool,
    pub paused: bool,
    pub processing: bool,
    pub status: ServiceStatus,
    pub suitable_count: u64,
    pub unsuitable_count: u64,
}

impl Default for ClientBelief {
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

impl ClientBelief {
    pub fn snapshot(&self) -> BeliefSnapshot {
        BeliefSnapshot {
            running: self.running,
            paused: self.paused,
            processing: self.processing,
            status: self.status,
            suitable_count: self.suitable_count,
            unsuitable_count: self.unsuitable_count,
        }
    }

    /// Fold one poll report into belief. Counters always apply verbatim.
    ///
    /// While belief is `paused`, an incoming `running` report leaves the
    /// status portion untouched: the service may not have observed a
    /// just-acknowledged pause yet, and flickering the indicator back to
    /// running would misreport the user's action.
    ///
    /// Returns true when the report shows the job actively running and was
    /// not suppressed, so the caller can relax the poll cadence.
    pub fn apply_report(&mut self, report: &StatusReport) -> bool {
        self.suitable_count = report.suitable_count;
        self.unsuitable_count = report.unsuitable_count;

        match report.status {
            ServiceStatus::Paused => {
                self.running = true;
                self.paused = true;
                self.status = ServiceStatus::Paused;
                false
            }
            ServiceStatus::Running => {
                if self.paused {
                    // Stale-transition guard.
                    return false;
                }
                self.running = true;
                self.status = ServiceStatus::Running;
                true
            }
            ServiceStatus::Loading => {
                self.status = ServiceStatus::Loading;
                false
            }
            ServiceStatus::Stopped => {
                self.running = false;
                self.paused = false;
                self.status = ServiceStatus::Stopped;
                false
            }
        }
    }

    /// Force the stopped state. Used on poll failure and after a failed
    /// start; counters are deliberately left as-is.
    pub fn mark_stopped(&mut self) {
        self.running = false;
        self.paused = false;
        self.status = ServiceStatus::Stopped;
    }
}
