//! Close-apps decision sessions.
//!
//! One session runs the `Idle -> Counting -> terminal` state machine around
//! a deployment's blocking applications. Counting holds a monotonic
//! countdown while the tracker maintains the set of targets still running;
//! the session ends with exactly one terminal outcome. The deferral budget
//! is owned by the caller, a `Defer` outcome only reports the choice.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use pf_common::{Error, ProcessIdentity, Result};

use crate::track::ProcessTracker;

/// Session configuration. `countdown` must be positive.
#[derive(Debug, Clone)]
pub struct CloseAppsConfig {
    pub countdown: Duration,
    /// Hold the countdown even when nothing blocking is running.
    pub forced_countdown: bool,
    /// Resolve to `Continue` when the blocking set drains on its own.
    pub continue_on_process_closure: bool,
}

impl CloseAppsConfig {
    pub fn validate(&self) -> Result<()> {
        if self.countdown.is_zero() {
            return Err(Error::InvalidCountdown(
                "countdown must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Decision forwarded from whatever surface the operator sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserDecision {
    Close,
    Continue,
    Defer,
}

/// Terminal state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseAppsOutcome {
    /// Countdown elapsed without a decision.
    Timeout,
    Close,
    Continue,
    Defer,
    /// Session cancelled from outside; distinct from Timeout.
    Cancelled,
}

impl std::fmt::Display for CloseAppsOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CloseAppsOutcome::Timeout => write!(f, "timeout"),
            CloseAppsOutcome::Close => write!(f, "close"),
            CloseAppsOutcome::Continue => write!(f, "continue"),
            CloseAppsOutcome::Defer => write!(f, "defer"),
            CloseAppsOutcome::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloseAppsResult {
    pub outcome: CloseAppsOutcome,
    /// `Some` only for `Close`: whether every matched process was gone
    /// after the close pass.
    pub terminated_cleanly: Option<bool>,
    /// Targets still running when the session ended.
    pub blocking_at_end: Vec<ProcessIdentity>,
    pub elapsed_ms: u64,
}

/// Caller-facing side of a session: forward decisions, or cancel.
#[derive(Clone)]
pub struct SessionHandle {
    decisions: mpsc::Sender<UserDecision>,
    cancel: Arc<AtomicBool>,
}

impl SessionHandle {
    /// Forward a decision. False when the session already ended.
    pub fn decide(&self, decision: UserDecision) -> bool {
        self.decisions.send(decision).is_ok()
    }

    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }
}

/// Session-owned side, consumed by [`CloseAppsOrchestrator::run`].
pub struct SessionControls {
    decisions: mpsc::Receiver<UserDecision>,
    cancel: Arc<AtomicBool>,
}

/// Create the two halves of a session control channel.
pub fn session_pair() -> (SessionHandle, SessionControls) {
    let (tx, rx) = mpsc::channel();
    let cancel = Arc::new(AtomicBool::new(false));
    (
        SessionHandle {
            decisions: tx,
            cancel: Arc::clone(&cancel),
        },
        SessionControls {
            decisions: rx,
            cancel,
        },
    )
}

pub struct CloseAppsOrchestrator {
    tracker: Arc<ProcessTracker>,
    config: CloseAppsConfig,
}

// Manual impl: the tracker holds an `Arc<dyn SystemProbe>`, which has no
// `Debug` bound, so the derive cannot be used.
impl std::fmt::Debug for CloseAppsOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloseAppsOrchestrator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl CloseAppsOrchestrator {
    pub fn new(tracker: Arc<ProcessTracker>, config: CloseAppsConfig) -> Result<Self> {
        config.validate()?;
        Ok(CloseAppsOrchestrator { tracker, config })
    }

    /// Run one session to its terminal outcome. Blocks the caller;
    /// decisions and cancellation arrive through `controls`.
    pub fn run(
        &self,
        targets: &[ProcessIdentity],
        controls: SessionControls,
    ) -> Result<CloseAppsResult> {
        let started = Instant::now();
        let initial = self.tracker.evaluate_running_processes(targets)?;
        if initial.is_empty() && !self.config.forced_countdown {
            debug!("no blocking processes and no forced countdown");
            return Ok(self.finish(CloseAppsOutcome::Continue, None, targets, started));
        }

        // Counting. The tracker keeps the blocking set current; one
        // synchronous poll primes it before the first check.
        self.tracker.start(targets)?;
        self.tracker.poll_once();
        let deadline = started + self.config.countdown;
        let mut saw_blockers = !initial.is_empty();
        info!(
            targets = targets.len(),
            blocking = initial.len(),
            countdown_ms = self.config.countdown.as_millis() as u64,
            forced = self.config.forced_countdown,
            "close-apps countdown started"
        );

        loop {
            if controls.cancel.load(Ordering::SeqCst) {
                return Ok(self.finish(CloseAppsOutcome::Cancelled, None, targets, started));
            }
            // An elapsed countdown wins over a decision still in the queue.
            if Instant::now() >= deadline {
                return Ok(self.finish(CloseAppsOutcome::Timeout, None, targets, started));
            }

            let blocking = self.tracker.running_targets();
            if !blocking.is_empty() {
                saw_blockers = true;
            } else if saw_blockers && self.config.continue_on_process_closure {
                info!("blocking processes closed on their own");
                return Ok(self.finish(CloseAppsOutcome::Continue, None, targets, started));
            }

            // Bounded wait doubling as the decision poll cadence. A
            // disconnected handle returns immediately, so sleep the slice
            // instead of spinning.
            match controls.decisions.recv_timeout(Duration::from_millis(25)) {
                Ok(decision) => return self.resolve(decision, targets, started),
                Err(mpsc::RecvTimeoutError::Timeout) => {}
                Err(mpsc::RecvTimeoutError::Disconnected) => {
                    std::thread::sleep(Duration::from_millis(25));
                }
            }
        }
    }

    fn resolve(
        &self,
        decision: UserDecision,
        targets: &[ProcessIdentity],
        started: Instant,
    ) -> Result<CloseAppsResult> {
        match decision {
            UserDecision::Close => {
                let cleanly = self.close_all(targets)?;
                Ok(self.finish(CloseAppsOutcome::Close, Some(cleanly), targets, started))
            }
            UserDecision::Continue => {
                Ok(self.finish(CloseAppsOutcome::Continue, None, targets, started))
            }
            UserDecision::Defer => {
                Ok(self.finish(CloseAppsOutcome::Defer, None, targets, started))
            }
        }
    }

    /// Close every target still running. True when nothing survives.
    fn close_all(&self, targets: &[ProcessIdentity]) -> Result<bool> {
        let mut cleanly = true;
        for target in targets {
            match self.tracker.is_process_running(target.executable_name()) {
                Ok(false) => continue,
                Ok(true) => {
                    if !self.tracker.close_process(target.executable_name())? {
                        cleanly = false;
                    }
                }
                Err(err) => {
                    debug!(target = target.executable_name(), error = %err, "liveness check failed during close");
                    cleanly = false;
                }
            }
        }
        Ok(cleanly)
    }

    fn finish(
        &self,
        outcome: CloseAppsOutcome,
        terminated_cleanly: Option<bool>,
        targets: &[ProcessIdentity],
        started: Instant,
    ) -> CloseAppsResult {
        let blocking_at_end = self
            .tracker
            .evaluate_running_processes(targets)
            .unwrap_or_default();
        info!(?outcome, blocking = blocking_at_end.len(), "close-apps session finished");
        CloseAppsResult {
            outcome,
            terminated_cleanly,
            blocking_at_end,
            elapsed_ms: started.elapsed().as_millis() as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock_probe::MockProbe;
    use crate::sys::SharedProbe;
    use crate::track::TrackerConfig;
    use std::thread;

    fn fast_tracker(probe: SharedProbe) -> Arc<ProcessTracker> {
        Arc::new(ProcessTracker::new(
            probe,
            TrackerConfig {
                poll_interval: Duration::from_millis(10),
                close_grace: Duration::from_millis(50),
            },
        ))
    }

    fn config(countdown_ms: u64) -> CloseAppsConfig {
        CloseAppsConfig {
            countdown: Duration::from_millis(countdown_ms),
            forced_countdown: false,
            continue_on_process_closure: false,
        }
    }

    fn targets(names: &[&str]) -> Vec<ProcessIdentity> {
        names.iter().map(|n| ProcessIdentity::new(*n)).collect()
    }

    #[test]
    fn test_zero_countdown_is_config_error() {
        let tracker = fast_tracker(MockProbe::new().shared());
        let err = CloseAppsOrchestrator::new(tracker, config(0)).unwrap_err();
        assert!(matches!(err, Error::InvalidCountdown(_)));
        assert_eq!(err.code(), 12);
    }

    #[test]
    fn test_nothing_running_continues_immediately() {
        let tracker = fast_tracker(MockProbe::new().shared());
        let orchestrator = CloseAppsOrchestrator::new(tracker, config(5_000)).unwrap();
        let (_handle, controls) = session_pair();

        let result = orchestrator.run(&targets(&["notepad"]), controls).unwrap();
        assert_eq!(result.outcome, CloseAppsOutcome::Continue);
        assert!(result.terminated_cleanly.is_none());
        assert!(result.blocking_at_end.is_empty());
        assert!(result.elapsed_ms < 1_000);
    }

    #[test]
    fn test_countdown_elapses_to_timeout() {
        let probe = MockProbe::new().with_process(10, "notepad").shared();
        let orchestrator =
            CloseAppsOrchestrator::new(fast_tracker(probe), config(80)).unwrap();
        let (_handle, controls) = session_pair();

        let result = orchestrator.run(&targets(&["notepad"]), controls).unwrap();
        assert_eq!(result.outcome, CloseAppsOutcome::Timeout);
        // Never before the deadline.
        assert!(result.elapsed_ms >= 80);
        assert_eq!(result.blocking_at_end.len(), 1);
    }

    #[test]
    fn test_forced_countdown_without_blockers_times_out() {
        let probe = MockProbe::new().shared();
        let mut cfg = config(80);
        cfg.forced_countdown = true;
        // Auto-continue must not fire: the set never drained, it was
        // always empty.
        cfg.continue_on_process_closure = true;
        let orchestrator = CloseAppsOrchestrator::new(fast_tracker(probe), cfg).unwrap();
        let (_handle, controls) = session_pair();

        let result = orchestrator.run(&[], controls).unwrap();
        assert_eq!(result.outcome, CloseAppsOutcome::Timeout);
    }

    #[test]
    fn test_auto_continue_when_blockers_drain() {
        let mock = Arc::new(MockProbe::new().with_process(10, "notepad"));
        let mut cfg = config(5_000);
        cfg.continue_on_process_closure = true;
        let orchestrator =
            CloseAppsOrchestrator::new(fast_tracker(mock.clone()), cfg).unwrap();
        let (_handle, controls) = session_pair();

        let closer = {
            let mock = Arc::clone(&mock);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(60));
                mock.terminate(10);
            })
        };
        let result = orchestrator.run(&targets(&["notepad"]), controls).unwrap();
        closer.join().unwrap();

        assert_eq!(result.outcome, CloseAppsOutcome::Continue);
        assert!(result.elapsed_ms < 5_000);
        assert!(result.blocking_at_end.is_empty());
    }

    #[test]
    fn test_close_decision_closes_and_reports_clean() {
        let mock = Arc::new(MockProbe::new().with_process(10, "notepad"));
        let orchestrator =
            CloseAppsOrchestrator::new(fast_tracker(mock.clone()), config(5_000)).unwrap();
        let (handle, controls) = session_pair();

        handle.decide(UserDecision::Close);
        let result = orchestrator.run(&targets(&["notepad"]), controls).unwrap();

        assert_eq!(result.outcome, CloseAppsOutcome::Close);
        assert_eq!(result.terminated_cleanly, Some(true));
        assert!(result.blocking_at_end.is_empty());
        assert!(!mock.close_requests().is_empty());
    }

    #[test]
    fn test_close_outcome_survives_failed_termination() {
        let mock = Arc::new(MockProbe::new().with_process(10, "immortal"));
        mock.set_unkillable(10);
        let orchestrator =
            CloseAppsOrchestrator::new(fast_tracker(mock.clone()), config(5_000)).unwrap();
        let (handle, controls) = session_pair();

        handle.decide(UserDecision::Close);
        let result = orchestrator.run(&targets(&["immortal"]), controls).unwrap();

        // Still Close; the failure only shows in terminated_cleanly.
        assert_eq!(result.outcome, CloseAppsOutcome::Close);
        assert_eq!(result.terminated_cleanly, Some(false));
        assert_eq!(result.blocking_at_end.len(), 1);
    }

    #[test]
    fn test_defer_reports_without_closing() {
        let mock = Arc::new(MockProbe::new().with_process(10, "notepad"));
        let orchestrator =
            CloseAppsOrchestrator::new(fast_tracker(mock.clone()), config(5_000)).unwrap();
        let (handle, controls) = session_pair();

        handle.decide(UserDecision::Defer);
        let result = orchestrator.run(&targets(&["notepad"]), controls).unwrap();

        assert_eq!(result.outcome, CloseAppsOutcome::Defer);
        assert!(result.terminated_cleanly.is_none());
        assert!(mock.close_requests().is_empty());
        assert_eq!(result.blocking_at_end.len(), 1);
    }

    #[test]
    fn test_cancellation_is_distinct_from_timeout() {
        let probe = MockProbe::new().with_process(10, "notepad").shared();
        let orchestrator =
            CloseAppsOrchestrator::new(fast_tracker(probe), config(5_000)).unwrap();
        let (handle, controls) = session_pair();

        handle.cancel();
        let result = orchestrator.run(&targets(&["notepad"]), controls).unwrap();
        assert_eq!(result.outcome, CloseAppsOutcome::Cancelled);
        assert!(result.elapsed_ms < 5_000);
    }
}
