//! Parent-process ancestry walks.
//!
//! Used to answer "was this process launched by the deployment engine" style
//! questions before closing it. The walk is strictly best-effort: any pid
//! that is gone, unreadable or already seen ends the chain, and the partial
//! chain is the answer. Pid reuse can make a parent chain loop, so every
//! visited pid is remembered and a repeat stops the walk quietly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, trace};

use pf_common::ProcessId;

use crate::sys::SharedProbe;

/// One ancestor in a parent chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AncestorProcess {
    pub pid: ProcessId,
    pub name: Option<String>,
    /// Helps spot pid reuse when a chain looks wrong.
    pub start_time: Option<DateTime<Utc>>,
}

pub struct AncestryResolver {
    probe: SharedProbe,
}

impl AncestryResolver {
    pub fn new(probe: SharedProbe) -> Self {
        AncestryResolver { probe }
    }

    /// Ancestors of `pid`, immediate parent first, walking until the chain
    /// reaches the root, breaks, or loops. Never fails; an unreadable step
    /// just truncates the chain.
    pub fn parent_chain(&self, pid: ProcessId) -> Vec<AncestorProcess> {
        let mut chain = Vec::new();
        let mut visited: HashSet<ProcessId> = HashSet::new();
        visited.insert(pid);

        let mut current = pid;
        loop {
            let parent = match self.probe.parent_of(current) {
                Ok(Some(parent)) => parent,
                Ok(None) => break,
                Err(err) => {
                    trace!(pid = current.0, error = %err, "parent query failed, truncating chain");
                    break;
                }
            };
            if !visited.insert(parent) {
                debug!(
                    pid = pid.0,
                    repeated = parent.0,
                    "parent chain loops, stopping walk"
                );
                break;
            }
            let snapshot = match self.probe.process_snapshot(parent) {
                Some(snapshot) => snapshot,
                // Parent exited between the pid query and inspection.
                None => break,
            };
            chain.push(AncestorProcess {
                pid: parent,
                name: Some(snapshot.name),
                start_time: snapshot.start_time,
            });
            current = parent;
        }
        chain
    }
}
