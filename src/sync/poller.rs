use crate::model::SyncConfig;
use std::time::Duration;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};

/// Which poll interval is in effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum PollCadence {
    /// Job is starting up; poll fast until the service reports running.
    Starting,
    Running,
    Paused,
    /// Terminal is unfocused; poll lazily.
    Hidden,
}

impl PollCadence {
    pub fn interval(self, cfg: &SyncConfig) -> Duration {
        match self {
            PollCadence::Starting => cfg.starting_poll_interval,
            PollCadence::Running => cfg.running_poll_interval,
            PollCadence::Paused => cfg.paused_poll_interval,
            PollCadence::Hidden => cfg.hidden_poll_interval,
        }
    }
}

/// The single polling timer, owned by the sync controller.
///
/// Invariant: at most one interval is ever live. Scheduling a cadence
/// releases whatever timer came before it; there is no code path that can
/// leave two timers ticking.
pub(super) struct PollTimer {
    active: Option<(PollCadence, Interval)>,
}

impl PollTimer {
    pub fn new() -> Self {
        Self { active: None }
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn cadence(&self) -> Option<PollCadence> {
        self.active.as_ref().map(|(cadence, _)| *cadence)
    }

    /// Replace the live timer (if any) with one at the given cadence. The
    /// first tick fires one full period from now, like a fresh interval
    /// timer, not immediately.
    pub fn schedule(&mut self, cadence: PollCadence, cfg: &SyncConfig) {
        let period = cadence.interval(cfg);
        let mut interval = time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.active = Some((cadence, interval));
    }

    /// Switch cadence only when a timer is currently live. Poll-driven
    /// cadence changes never start polling on their own.
    pub fn reschedule_if_active(&mut self, cadence: PollCadence, cfg: &SyncConfig) {
        if self.is_active() && self.cadence() != Some(cadence) {
            self.schedule(cadence, cfg);
        }
    }

    pub fn cancel(&mut self) {
        self.active = None;
    }

    /// Wait for the next tick; pending forever while no timer is scheduled.
    pub async fn tick(&mut self) {
        match self.active.as_mut() {
            Some((_, interval)) => {
                interval.tick().await;
            }
            None => futures::future::pending::<()>().await,
        }
    }
}
