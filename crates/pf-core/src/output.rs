//! Rendering of command results for each output format.
//!
//! Every command prints exactly one payload to stdout: a versioned JSON
//! envelope, a JSONL stream, markdown, or a one-line summary. Diagnostics
//! go to stderr through the logging layer, so stdout stays parseable.

use chrono::Utc;
use pf_common::{OutputFormat, ProcessIdentity, SCHEMA_VERSION};
use serde::Serialize;
use serde_json::json;

use crate::ancestry::AncestorProcess;
use crate::closeapps::CloseAppsResult;
use crate::lockscan::ScanOutcome;

/// Wrap a payload in the stable JSON envelope.
///
/// The envelope carries the schema version, the run id correlating stdout
/// with stderr log lines, and a generation timestamp.
pub fn envelope<T: Serialize>(run_id: &str, key: &str, payload: &T) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    map.insert("schema_version".to_string(), json!(SCHEMA_VERSION));
    map.insert("run_id".to_string(), json!(run_id));
    map.insert("generated_at".to_string(), json!(Utc::now().to_rfc3339()));
    map.insert(
        key.to_string(),
        serde_json::to_value(payload).unwrap_or(serde_json::Value::Null),
    );
    serde_json::Value::Object(map)
}

fn pretty(value: &serde_json::Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_default()
}

fn compact<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_default()
}

fn timestamp_or_dash(time: Option<chrono::DateTime<Utc>>) -> String {
    time.map(|t| t.to_rfc3339()).unwrap_or_else(|| "-".to_string())
}

/// Render a lock scan outcome.
pub fn render_scan(format: OutputFormat, run_id: &str, outcome: &ScanOutcome) -> String {
    match format {
        OutputFormat::Json => pretty(&envelope(run_id, "scan", outcome)),
        OutputFormat::Jsonl => {
            let mut lines: Vec<String> = outcome.records.iter().map(compact).collect();
            lines.push(compact(&json!({
                "locked_process_count": outcome.records.len(),
                "denied_processes": outcome.denied_processes,
                "skipped_handles": outcome.skipped_handles,
                "candidate_count": outcome.candidate_count,
            })));
            lines.join("\n")
        }
        OutputFormat::Md => {
            let mut out = String::new();
            out.push_str("# Lock Scan\n\n");
            out.push_str(&format!(
                "{} candidate path(s), {} locking process(es), {} denied, {} handle(s) skipped\n",
                outcome.candidate_count,
                outcome.records.len(),
                outcome.denied_processes.len(),
                outcome.skipped_handles
            ));
            if outcome.records.is_empty() {
                out.push_str("\nNo locking processes found.\n");
                return out;
            }
            out.push_str("\n| PID | Process | User | Started | Locked paths |\n");
            out.push_str("|----:|---------|------|---------|--------------|\n");
            for record in &outcome.records {
                let paths: Vec<&str> = record.locked_paths.iter().map(String::as_str).collect();
                out.push_str(&format!(
                    "| {} | {} | {} | {} | {} |\n",
                    record.pid,
                    record.process_name,
                    record.owning_user,
                    timestamp_or_dash(record.start_time),
                    paths.join("; ")
                ));
            }
            out
        }
        OutputFormat::Summary => {
            if outcome.records.is_empty() {
                format!(
                    "no locks found across {} candidate path(s)",
                    outcome.candidate_count
                )
            } else {
                format!(
                    "{} process(es) locking files across {} candidate path(s), {} denied",
                    outcome.records.len(),
                    outcome.candidate_count,
                    outcome.denied_processes.len()
                )
            }
        }
    }
}

/// Render an evaluated set of running target processes.
pub fn render_identities(
    format: OutputFormat,
    run_id: &str,
    identities: &[ProcessIdentity],
) -> String {
    match format {
        OutputFormat::Json => pretty(&envelope(run_id, "processes", &identities)),
        OutputFormat::Jsonl => identities
            .iter()
            .map(compact)
            .collect::<Vec<_>>()
            .join("\n"),
        OutputFormat::Md => {
            let mut out = String::new();
            out.push_str("# Running Targets\n\n");
            if identities.is_empty() {
                out.push_str("No targets running.\n");
                return out;
            }
            out.push_str("| Name | Executable | Product | Publisher | Last seen |\n");
            out.push_str("|------|------------|---------|-----------|----------|\n");
            for identity in identities {
                out.push_str(&format!(
                    "| {} | {} | {} | {} | {} |\n",
                    identity.display_name(),
                    identity.executable_name(),
                    identity.product_name().unwrap_or("-"),
                    identity.publisher().unwrap_or("-"),
                    timestamp_or_dash(identity.last_observed_at())
                ));
            }
            out
        }
        OutputFormat::Summary => {
            if identities.is_empty() {
                "no targets running".to_string()
            } else {
                let names: Vec<&str> = identities.iter().map(|i| i.display_name()).collect();
                format!("{} running: {}", identities.len(), names.join(", "))
            }
        }
    }
}

/// Render a liveness probe for one target name.
pub fn render_liveness(format: OutputFormat, run_id: &str, name: &str, running: bool) -> String {
    match format {
        OutputFormat::Json => pretty(&envelope(
            run_id,
            "liveness",
            &json!({ "target": name, "running": running }),
        )),
        OutputFormat::Jsonl => compact(&json!({ "target": name, "running": running })),
        OutputFormat::Md | OutputFormat::Summary => {
            if running {
                format!("{} is running", name)
            } else {
                format!("{} is not running", name)
            }
        }
    }
}

/// Render per-target close results as `(target, all_gone)` pairs.
pub fn render_close_report(
    format: OutputFormat,
    run_id: &str,
    results: &[(String, bool)],
) -> String {
    let rows: Vec<serde_json::Value> = results
        .iter()
        .map(|(target, closed)| json!({ "target": target, "closed": closed }))
        .collect();
    match format {
        OutputFormat::Json => pretty(&envelope(run_id, "closed", &rows)),
        OutputFormat::Jsonl => rows.iter().map(compact).collect::<Vec<_>>().join("\n"),
        OutputFormat::Md => {
            let mut out = String::new();
            out.push_str("# Close Requests\n\n");
            for (target, closed) in results {
                out.push_str(&format!(
                    "- {}: {}\n",
                    target,
                    if *closed { "closed" } else { "still running" }
                ));
            }
            out
        }
        OutputFormat::Summary => {
            let closed = results.iter().filter(|(_, ok)| *ok).count();
            format!("closed {}/{} target(s)", closed, results.len())
        }
    }
}

/// Render a parent chain for one pid.
pub fn render_ancestry(
    format: OutputFormat,
    run_id: &str,
    pid: u32,
    chain: &[AncestorProcess],
) -> String {
    match format {
        OutputFormat::Json => pretty(&envelope(
            run_id,
            "ancestry",
            &json!({ "pid": pid, "chain": chain }),
        )),
        OutputFormat::Jsonl => chain.iter().map(compact).collect::<Vec<_>>().join("\n"),
        OutputFormat::Md => {
            let mut out = String::new();
            out.push_str(&format!("# Ancestry of PID {}\n\n", pid));
            if chain.is_empty() {
                out.push_str("No resolvable ancestors.\n");
                return out;
            }
            for (index, ancestor) in chain.iter().enumerate() {
                out.push_str(&format!(
                    "{}. {} {} (started {})\n",
                    index + 1,
                    ancestor.pid,
                    ancestor.name.as_deref().unwrap_or("?"),
                    timestamp_or_dash(ancestor.start_time)
                ));
            }
            out
        }
        OutputFormat::Summary => {
            format!("{} ancestor(s) above pid {}", chain.len(), pid)
        }
    }
}

/// Render a finished close-apps session.
pub fn render_session(format: OutputFormat, run_id: &str, result: &CloseAppsResult) -> String {
    match format {
        OutputFormat::Json => pretty(&envelope(run_id, "session", result)),
        OutputFormat::Jsonl => compact(result),
        OutputFormat::Md => {
            let mut out = String::new();
            out.push_str("# Close Apps Session\n\n");
            out.push_str(&format!("Outcome: {}\n", result.outcome));
            out.push_str(&format!("Elapsed: {}ms\n", result.elapsed_ms));
            if let Some(clean) = result.terminated_cleanly {
                out.push_str(&format!(
                    "Terminated cleanly: {}\n",
                    if clean { "yes" } else { "no" }
                ));
            }
            if !result.blocking_at_end.is_empty() {
                out.push_str("\nStill blocking:\n");
                for identity in &result.blocking_at_end {
                    out.push_str(&format!("- {}\n", identity.display_name()));
                }
            }
            out
        }
        OutputFormat::Summary => {
            let blocking = result.blocking_at_end.len();
            match result.terminated_cleanly {
                Some(clean) => format!(
                    "{} after {}ms, clean={}, {} still blocking",
                    result.outcome, result.elapsed_ms, clean, blocking
                ),
                None => format!(
                    "{} after {}ms, {} still blocking",
                    result.outcome, result.elapsed_ms, blocking
                ),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::closeapps::CloseAppsOutcome;
    use crate::lockscan::LockedProcessRecord;
    use pf_common::ProcessId;
    use std::collections::BTreeSet;

    fn sample_outcome() -> ScanOutcome {
        let mut locked_paths = BTreeSet::new();
        locked_paths.insert("c:\\app\\report.docx".to_string());
        ScanOutcome {
            records: vec![LockedProcessRecord {
                pid: ProcessId(4312),
                process_name: "WINWORD".to_string(),
                main_window_title: "report.docx - Word".to_string(),
                executable_path: "C:\\Program Files\\Office\\WINWORD.EXE".to_string(),
                owning_user: "CONTOSO\\jdoe".to_string(),
                start_time: None,
                locked_paths,
                working_directory: None,
                command_line: None,
            }],
            denied_processes: vec![ProcessId(4)],
            skipped_handles: 2,
            candidate_count: 10,
        }
    }

    #[test]
    fn test_json_envelope_shape() {
        let rendered = render_scan(OutputFormat::Json, "run-abc", &sample_outcome());
        let value: serde_json::Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(value["schema_version"], SCHEMA_VERSION);
        assert_eq!(value["run_id"], "run-abc");
        assert!(value["generated_at"].is_string());
        assert_eq!(value["scan"]["records"][0]["pid"], 4312);
    }

    #[test]
    fn test_jsonl_one_record_per_line() {
        let rendered = render_scan(OutputFormat::Jsonl, "run-abc", &sample_outcome());
        let lines: Vec<&str> = rendered.lines().collect();
        // One record plus the trailing summary line.
        assert_eq!(lines.len(), 2);
        for line in lines {
            serde_json::from_str::<serde_json::Value>(line).unwrap();
        }
    }

    #[test]
    fn test_md_has_table() {
        let rendered = render_scan(OutputFormat::Md, "run-abc", &sample_outcome());
        assert!(rendered.starts_with("# Lock Scan"));
        assert!(rendered.contains("| 4312 | WINWORD | CONTOSO\\jdoe |"));
    }

    #[test]
    fn test_summary_is_one_line() {
        let rendered = render_scan(OutputFormat::Summary, "run-abc", &sample_outcome());
        assert_eq!(rendered.lines().count(), 1);
        assert!(rendered.contains("1 process(es)"));
    }

    #[test]
    fn test_liveness_summary() {
        assert_eq!(
            render_liveness(OutputFormat::Summary, "r", "winword", true),
            "winword is running"
        );
        assert_eq!(
            render_liveness(OutputFormat::Summary, "r", "winword", false),
            "winword is not running"
        );
    }

    #[test]
    fn test_session_summary_mentions_outcome() {
        let result = CloseAppsResult {
            outcome: CloseAppsOutcome::Close,
            terminated_cleanly: Some(true),
            blocking_at_end: vec![],
            elapsed_ms: 1520,
        };
        let rendered = render_session(OutputFormat::Summary, "r", &result);
        assert!(rendered.contains("close"));
        assert!(rendered.contains("clean=true"));
    }

    #[test]
    fn test_identities_md_lists_enrichment() {
        let identities = vec![ProcessIdentity::new("winword")
            .with_description("Microsoft Word")
            .with_publisher("Microsoft Corporation")];
        let rendered = render_identities(OutputFormat::Md, "r", &identities);
        assert!(rendered.contains("Microsoft Word"));
        assert!(rendered.contains("Microsoft Corporation"));
    }
}
