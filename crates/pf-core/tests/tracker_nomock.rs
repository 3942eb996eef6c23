//! Tracker and ancestry integration tests on a scripted probe.
//!
//! Covers:
//! - One-shot evaluation: enrichment, idempotence, case-insensitive matching
//! - Liveness checks for absent targets
//! - The event stream: started/exited transitions only, silence in between
//! - Enumeration failures never inventing an exit
//! - Close escalation from graceful close to forced termination
//! - Parent-chain walks stopping at self-parent roots

#![cfg(feature = "test-utils")]

use std::sync::Arc;
use std::time::Duration;

use pf_common::{ProcessId, ProcessIdentity};
use pf_core::ancestry::AncestryResolver;
use pf_core::events::ProcessEventKind;
use pf_core::mock_probe::MockProbe;
use pf_core::track::{ProcessTracker, TrackerConfig};

fn fast_config() -> TrackerConfig {
    TrackerConfig {
        poll_interval: Duration::from_millis(25),
        close_grace: Duration::from_millis(100),
    }
}

// ============================================================================
// Evaluation and liveness
// ============================================================================

#[test]
fn test_evaluate_enriches_from_version_resources() {
    let probe = MockProbe::new().with_process(101, "winword").with_details(101, |d| {
        d.file_description = Some("Microsoft Word".to_string());
        d.product_name = Some("Microsoft Office".to_string());
        d.company_name = Some("Microsoft Corporation".to_string());
    });
    let tracker = ProcessTracker::new(probe.shared(), fast_config());

    let running = tracker
        .evaluate_running_processes(&[ProcessIdentity::new("winword")])
        .expect("evaluate");

    assert_eq!(running.len(), 1);
    let identity = &running[0];
    assert_eq!(identity.description(), Some("Microsoft Word"));
    assert_eq!(identity.product_name(), Some("Microsoft Office"));
    assert_eq!(identity.publisher(), Some("Microsoft Corporation"));
    assert_eq!(identity.display_name(), "Microsoft Word");
    assert_eq!(
        identity.icon_path().and_then(|p| p.to_str()),
        Some("C:\\Program Files\\winword\\winword.exe")
    );
    assert!(identity.last_observed_at().is_some());

    eprintln!("[INFO] evaluation enriched the target from process details");
}

#[test]
fn test_evaluate_keeps_explicit_description() {
    let probe = MockProbe::new().with_process(101, "winword").with_details(101, |d| {
        d.file_description = Some("Microsoft Word".to_string());
    });
    let tracker = ProcessTracker::new(probe.shared(), fast_config());
    let target = ProcessIdentity::new("winword").with_description("Word (close before install)");

    let running = tracker
        .evaluate_running_processes(&[target])
        .expect("evaluate");
    assert_eq!(running[0].description(), Some("Word (close before install)"));

    eprintln!("[INFO] explicit description wins over version resources");
}

#[test]
fn test_evaluate_is_idempotent_without_state_change() {
    let probe = MockProbe::new()
        .with_process(11, "alpha")
        .with_process(12, "bravo");
    let tracker = ProcessTracker::new(probe.shared(), fast_config());
    let targets = [
        ProcessIdentity::new("alpha"),
        ProcessIdentity::new("bravo"),
        ProcessIdentity::new("missing"),
    ];

    let names = |identities: &[ProcessIdentity]| -> Vec<String> {
        identities
            .iter()
            .map(|i| i.executable_name().to_string())
            .collect()
    };

    let first = tracker.evaluate_running_processes(&targets).expect("first");
    let second = tracker.evaluate_running_processes(&targets).expect("second");
    assert_eq!(names(&first), names(&second));
    assert_eq!(names(&first), vec!["alpha", "bravo"]);

    eprintln!("[INFO] back-to-back evaluations agree");
}

#[test]
fn test_case_differences_do_not_hide_targets() {
    let probe = MockProbe::new().with_process(7, "notepad");
    let tracker = ProcessTracker::new(probe.shared(), fast_config());

    assert!(tracker.is_process_running("NOTEPAD").expect("liveness"));
    let running = tracker
        .evaluate_running_processes(&[ProcessIdentity::new("NotePad")])
        .expect("evaluate");
    assert_eq!(running.len(), 1);

    eprintln!("[INFO] matching ignores executable-name casing");
}

#[test]
fn test_absent_target_is_not_running() {
    let probe = MockProbe::new().with_process(7, "notepad");
    let tracker = ProcessTracker::new(probe.shared(), fast_config());

    assert!(!tracker.is_process_running("winword").expect("liveness"));
    let running = tracker
        .evaluate_running_processes(&[ProcessIdentity::new("winword")])
        .expect("evaluate");
    assert!(running.is_empty());

    eprintln!("[INFO] absent targets evaluate to nothing");
}

// ============================================================================
// Event stream
// ============================================================================

#[test]
fn test_tracker_emits_start_and_exit_transitions() {
    let mock = Arc::new(MockProbe::new().with_process(7, "notepad"));
    let tracker = ProcessTracker::new(mock.clone(), fast_config());
    let events = tracker.subscribe();

    tracker
        .start(&[ProcessIdentity::new("notepad")])
        .expect("start");

    let started = events
        .recv_timeout(Duration::from_secs(2))
        .expect("started event");
    assert_eq!(started.kind, ProcessEventKind::ProcessStarted);
    assert_eq!(started.identity.executable_name(), "notepad");

    mock.terminate(7);
    let exited = events
        .recv_timeout(Duration::from_secs(2))
        .expect("exited event");
    assert_eq!(exited.kind, ProcessEventKind::ProcessExited);
    assert_eq!(exited.identity.executable_name(), "notepad");

    // Steady state publishes nothing.
    std::thread::sleep(Duration::from_millis(100));
    assert!(events.try_recv().is_err());

    tracker.stop();
    eprintln!("[INFO] transitions only, no steady-state chatter");
}

#[test]
fn test_enumeration_failure_never_invents_an_exit() {
    let mock = Arc::new(MockProbe::new().with_process(7, "notepad"));
    let tracker = ProcessTracker::new(mock.clone(), fast_config());
    let events = tracker.subscribe();

    tracker
        .start(&[ProcessIdentity::new("notepad")])
        .expect("start");
    let started = events
        .recv_timeout(Duration::from_secs(2))
        .expect("started event");
    assert_eq!(started.kind, ProcessEventKind::ProcessStarted);
    // The rest of the test drives polls by hand.
    tracker.stop();

    mock.terminate(7);
    mock.fail_next_enumerations(2);

    tracker.poll_once();
    tracker.poll_once();
    assert!(
        events.try_recv().is_err(),
        "failed polls must not change the view"
    );

    tracker.poll_once();
    let exited = events
        .recv_timeout(Duration::from_secs(2))
        .expect("exited event after clean poll");
    assert_eq!(exited.kind, ProcessEventKind::ProcessExited);

    eprintln!("[INFO] exits only ever come from a clean enumeration");
}

// ============================================================================
// Close escalation
// ============================================================================

#[test]
fn test_close_prefers_graceful_exit() {
    let mock = Arc::new(MockProbe::new().with_process(21, "alpha"));
    let tracker = ProcessTracker::new(mock.clone(), fast_config());

    let closed = tracker.close_process("alpha").expect("close");
    assert!(closed);
    assert_eq!(mock.close_requests(), vec![ProcessId(21)]);
    assert!(mock.kill_requests().is_empty());

    eprintln!("[INFO] cooperative targets are never force-killed");
}

#[test]
fn test_close_escalates_when_close_is_ignored() {
    let mock = Arc::new(MockProbe::new().with_process(22, "bravo"));
    mock.set_ignores_close(22);
    let tracker = ProcessTracker::new(mock.clone(), fast_config());

    let closed = tracker.close_process("bravo").expect("close");
    assert!(closed);
    assert_eq!(mock.close_requests(), vec![ProcessId(22)]);
    assert_eq!(mock.kill_requests(), vec![ProcessId(22)]);

    eprintln!("[INFO] ignored close escalates to forced termination");
}

#[test]
fn test_close_reports_unkillable_stragglers() {
    let mock = Arc::new(MockProbe::new().with_process(23, "charlie"));
    mock.set_ignores_close(23);
    mock.set_unkillable(23);
    let tracker = ProcessTracker::new(mock.clone(), fast_config());

    let closed = tracker.close_process("charlie").expect("close");
    assert!(!closed);
    assert_eq!(mock.kill_requests(), vec![ProcessId(23)]);

    eprintln!("[INFO] a survivor turns the close result false");
}

#[test]
fn test_close_of_absent_target_is_false_not_error() {
    let probe = MockProbe::new();
    let tracker = ProcessTracker::new(probe.shared(), fast_config());

    let closed = tracker.close_process("ghost").expect("close");
    assert!(!closed);

    eprintln!("[INFO] closing nothing is a no-op, not a failure");
}

// ============================================================================
// Ancestry
// ============================================================================

#[test]
fn test_parent_chain_terminates_and_never_revisits() {
    // 300 reports itself as its own parent, as session roots do.
    let probe = MockProbe::new()
        .with_process(500, "leaf")
        .with_process(400, "middle")
        .with_process(300, "root")
        .with_parent(500, 400)
        .with_parent(400, 300)
        .with_parent(300, 300);
    let resolver = AncestryResolver::new(probe.shared());

    let chain = resolver.parent_chain(ProcessId(500));
    let pids: Vec<u32> = chain.iter().map(|a| a.pid.0).collect();
    assert_eq!(pids, vec![400, 300]);
    assert_eq!(chain[0].name.as_deref(), Some("middle"));
    assert_eq!(chain[1].name.as_deref(), Some("root"));
    // The origin never appears in its own chain.
    assert!(!pids.contains(&500));

    eprintln!("[INFO] self-parent roots stop the walk");
}
