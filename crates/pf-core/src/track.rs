//! Target process tracking.
//!
//! Keeps a live view of which target identities are running by polling the
//! probe and diffing against the previous view. Transitions publish
//! [`ProcessEvent`]s on the tracker's event bus; steady state publishes
//! nothing. A failed enumeration never invents an exit: the view only
//! changes on a clean, fresh process list.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, info, warn};

use pf_common::{identity::names_match, Error, ProcessIdentity, Result};

use crate::events::{EventBus, ProcessEvent};
use crate::sys::{ProcessSnapshot, SharedProbe, SystemProbe};

/// Tracker timing knobs.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Delay between reconciliation polls.
    pub poll_interval: Duration,
    /// How long a gracefully closed process gets before forced termination.
    pub close_grace: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        TrackerConfig {
            poll_interval: Duration::from_secs(1),
            close_grace: Duration::from_secs(5),
        }
    }
}

#[derive(Default)]
struct TrackState {
    targets: Vec<ProcessIdentity>,
    /// Identity key -> enriched identity, for targets currently running.
    present: HashMap<String, ProcessIdentity>,
}

struct TrackerShared {
    state: Mutex<TrackState>,
    running: AtomicBool,
}

/// Live view over a set of target identities.
pub struct ProcessTracker {
    probe: SharedProbe,
    bus: Arc<EventBus>,
    shared: Arc<TrackerShared>,
    worker: Mutex<Option<JoinHandle<()>>>,
    config: TrackerConfig,
}

impl ProcessTracker {
    pub fn new(probe: SharedProbe, config: TrackerConfig) -> Self {
        ProcessTracker {
            probe,
            bus: Arc::new(EventBus::new()),
            shared: Arc::new(TrackerShared {
                state: Mutex::new(TrackState::default()),
                running: AtomicBool::new(false),
            }),
            worker: Mutex::new(None),
            config,
        }
    }

    /// Subscribe to lifecycle transitions for the tracked targets.
    pub fn subscribe(&self) -> mpsc::Receiver<ProcessEvent> {
        self.bus.subscribe()
    }

    /// Register targets and ensure the reconciliation thread runs. Calling
    /// again replaces the target set on the existing thread; a second event
    /// source is never created.
    pub fn start(&self, targets: &[ProcessIdentity]) -> Result<()> {
        {
            let mut state = self.lock_state();
            state.targets = dedup_targets(targets);
            // Forget presences that no longer have a target behind them.
            let keys: Vec<String> = state.targets.iter().map(|t| t.key()).collect();
            state.present.retain(|key, _| keys.contains(key));
        }

        let mut worker = self
            .worker
            .lock()
            .map_err(|_| Error::WorkerSpawn("tracker worker slot poisoned".to_string()))?;
        if worker.is_some() {
            debug!("tracker already running, targets replaced");
            return Ok(());
        }

        self.shared.running.store(true, Ordering::SeqCst);
        let probe = Arc::clone(&self.probe);
        let bus = Arc::clone(&self.bus);
        let shared = Arc::clone(&self.shared);
        let interval = self.config.poll_interval;
        let handle = thread::Builder::new()
            .name("preflight-tracker".to_string())
            .spawn(move || {
                while shared.running.load(Ordering::SeqCst) {
                    reconcile(probe.as_ref(), &shared.state, &bus);
                    sleep_interruptible(interval, &shared.running);
                }
            })
            .map_err(|err| Error::WorkerSpawn(err.to_string()))?;
        *worker = Some(handle);
        info!(interval_ms = interval.as_millis() as u64, "tracker started");
        Ok(())
    }

    /// Run one reconciliation pass on the caller's thread. The background
    /// loop runs exactly this.
    pub fn poll_once(&self) {
        reconcile(self.probe.as_ref(), &self.shared.state, &self.bus);
    }

    /// Signal the reconciliation thread and wait for it to finish.
    pub fn stop(&self) {
        self.shared.running.store(false, Ordering::SeqCst);
        if let Ok(mut worker) = self.worker.lock() {
            if let Some(handle) = worker.take() {
                if handle.join().is_err() {
                    warn!("tracker worker panicked");
                }
                info!("tracker stopped");
            }
        }
    }

    /// Targets currently observed running, as immutable clones.
    pub fn running_targets(&self) -> Vec<ProcessIdentity> {
        let state = self.lock_state();
        let mut running: Vec<ProcessIdentity> = state.present.values().cloned().collect();
        running.sort_by(|a, b| sort_key(a).cmp(&sort_key(b)));
        running
    }

    /// One-shot evaluation of `targets` against a fresh process list.
    /// Returns one enriched identity per target with at least one live
    /// match, ordered by display description.
    pub fn evaluate_running_processes(
        &self,
        targets: &[ProcessIdentity],
    ) -> Result<Vec<ProcessIdentity>> {
        let processes = self.probe.processes()?;
        let mut running = Vec::new();
        for target in dedup_targets(targets) {
            if let Some(snapshot) = first_match(&processes, &target) {
                running.push(enrich(self.probe.as_ref(), &target, snapshot));
            }
        }
        running.sort_by(|a, b| sort_key(a).cmp(&sort_key(b)));
        Ok(running)
    }

    /// Point-in-time liveness check against a fresh process list.
    pub fn is_process_running(&self, name: &str) -> Result<bool> {
        let processes = self.probe.processes()?;
        Ok(processes.iter().any(|p| names_match(&p.name, name)))
    }

    /// Close every process matching `name`: graceful close first, then a
    /// bounded grace wait, then forced termination of stragglers. True only
    /// when every matched process is gone at the end. No match is `false`,
    /// not an error.
    pub fn close_process(&self, name: &str) -> Result<bool> {
        let processes = self.probe.processes()?;
        let matched: Vec<_> = processes
            .iter()
            .filter(|p| names_match(&p.name, name))
            .map(|p| p.pid)
            .collect();
        if matched.is_empty() {
            debug!(name, "close requested for a process that is not running");
            return Ok(false);
        }

        for pid in &matched {
            let accepted = self.probe.request_close(*pid);
            debug!(pid = pid.0, accepted, "graceful close requested");
        }
        self.wait_until_gone(&matched, self.config.close_grace);

        let stragglers: Vec<_> = matched
            .iter()
            .copied()
            .filter(|pid| self.probe.is_alive(*pid))
            .collect();
        for pid in &stragglers {
            let killed = self.probe.kill(*pid);
            if !killed {
                warn!(pid = pid.0, "forced termination failed");
            }
        }
        if !stragglers.is_empty() {
            // Termination is asynchronous; allow a short settle.
            self.wait_until_gone(&stragglers, Duration::from_millis(500));
        }

        let all_gone = matched.iter().all(|pid| !self.probe.is_alive(*pid));
        info!(
            name,
            matched = matched.len(),
            forced = stragglers.len(),
            all_gone,
            "close_process finished"
        );
        Ok(all_gone)
    }

    fn wait_until_gone(&self, pids: &[pf_common::ProcessId], budget: Duration) {
        let deadline = Instant::now() + budget;
        loop {
            if pids.iter().all(|pid| !self.probe.is_alive(*pid)) {
                return;
            }
            if Instant::now() >= deadline {
                return;
            }
            thread::sleep(Duration::from_millis(25));
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, TrackState> {
        // A poisoned state mutex means a reconcile pass panicked; the view
        // it left behind is still internally consistent.
        match self.shared.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Drop for ProcessTracker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn dedup_targets(targets: &[ProcessIdentity]) -> Vec<ProcessIdentity> {
    let mut seen = HashMap::new();
    for target in targets {
        seen.entry(target.key()).or_insert_with(|| target.clone());
    }
    let mut deduped: Vec<ProcessIdentity> = seen.into_values().collect();
    deduped.sort_by(|a, b| sort_key(a).cmp(&sort_key(b)));
    deduped
}

fn sort_key(identity: &ProcessIdentity) -> String {
    identity.display_name().to_lowercase()
}

fn first_match<'a>(
    processes: &'a [ProcessSnapshot],
    target: &ProcessIdentity,
) -> Option<&'a ProcessSnapshot> {
    processes
        .iter()
        .find(|p| names_match(&p.name, target.executable_name()))
}

/// Description precedence: an explicit target description wins, then the
/// executable's version-resource description, then the bare name.
fn enrich(
    probe: &dyn SystemProbe,
    target: &ProcessIdentity,
    snapshot: &ProcessSnapshot,
) -> ProcessIdentity {
    let details = probe.process_details(snapshot.pid).unwrap_or_default();
    let mut identity = target.clone();
    if identity.description().is_none() {
        if let Some(description) = details.file_description {
            identity = identity.with_description(description);
        }
    }
    if identity.product_name().is_none() {
        if let Some(product) = details.product_name {
            identity = identity.with_product_name(product);
        }
    }
    if identity.publisher().is_none() {
        if let Some(company) = details.company_name {
            identity = identity.with_publisher(company);
        }
    }
    // The UI extracts its icon from the executable.
    if identity.icon_path().is_none() {
        if let Some(exe) = details.exe_path {
            identity = identity.with_icon_path(exe);
        }
    }
    identity.with_observation(Utc::now())
}

/// One poll-and-diff pass: fresh list, match targets, emit transitions.
/// An enumeration failure leaves the previous view untouched.
fn reconcile(probe: &dyn SystemProbe, state: &Mutex<TrackState>, bus: &EventBus) {
    let processes = match probe.processes() {
        Ok(processes) => processes,
        Err(err) => {
            warn!(error = %err, "process enumeration failed, keeping previous view");
            return;
        }
    };

    let mut guard = match state.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    let targets = guard.targets.clone();

    let mut now_running: HashMap<String, ProcessIdentity> = HashMap::new();
    for target in &targets {
        if let Some(snapshot) = first_match(&processes, target) {
            now_running.insert(target.key(), enrich(probe, target, snapshot));
        }
    }

    let mut events = Vec::new();
    for (key, identity) in &now_running {
        if !guard.present.contains_key(key) {
            events.push(ProcessEvent::started(identity.clone()));
        }
    }
    let gone: Vec<String> = guard
        .present
        .keys()
        .filter(|key| !now_running.contains_key(*key))
        .cloned()
        .collect();
    for key in gone {
        if let Some(identity) = guard.present.remove(&key) {
            events.push(ProcessEvent::exited(identity));
        }
    }
    for (key, identity) in now_running {
        guard.present.insert(key, identity);
    }
    drop(guard);

    for event in events {
        bus.emit(event);
    }
}

fn sleep_interruptible(total: Duration, running: &AtomicBool) {
    let mut slept = Duration::ZERO;
    while slept < total && running.load(Ordering::SeqCst) {
        let step = (total - slept).min(Duration::from_millis(25));
        thread::sleep(step);
        slept += step;
    }
}
