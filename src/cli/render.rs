//! Human output for CLI commands. Pure formatting.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::core::ReplicaId;
use crate::transport::{ReplicaState, ReplicaStatus};

pub fn render_status(status: &ReplicaStatus) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "replica  {} ({})", status.replica, status.mode);
    let _ = writeln!(out, "clock    {}", status.clock);
    let _ = writeln!(out, "pending  {}", status.pending);
    let _ = writeln!(out, "applied  {}", status.applied);
    let _ = writeln!(
        out,
        "tasks    admitted={} parked={} wakeups={}",
        status.admitted, status.parked, status.wakeups
    );
    out
}

pub fn render_board(states: &BTreeMap<ReplicaId, ReplicaState>) -> String {
    if states.is_empty() {
        return "no replicas reported\n".to_string();
    }
    let mut out = String::new();
    for (replica, state) in states {
        let _ = writeln!(out, "replica {replica}: {state}");
    }
    out
}
