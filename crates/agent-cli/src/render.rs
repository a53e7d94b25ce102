//! Texto de consola para vistas y entradas del ledger.
use std::fmt::Write;

use agent_core::{LedgerEntry, StepStatus};
use agentflow_rust::FlowView;

pub fn glyph(status: StepStatus) -> &'static str {
    match status {
        StepStatus::Planned => "[ ]",
        StepStatus::Working => "[~]",
        StepStatus::Paused => "[=]",
        StepStatus::NeedsApproval => "[?]",
        StepStatus::WaitingExternalAction => "[!]",
        StepStatus::Done => "[x]",
        StepStatus::Undone => "[<]",
    }
}

/// Tablero de steps. `>` marca el foco de la vista.
pub fn board(view: &FlowView) -> String {
    let flow = &view.flow;
    let mut out = String::new();
    let state = if view.engaged { "running" } else { "stopped" };
    let _ = writeln!(out, "{} [{}] mode={} speed={}x {}", flow.title, flow.case_type, flow.mode, view.speed, state);
    for (index, step) in flow.steps.iter().enumerate() {
        let marker = if index == view.focus { ">" } else { " " };
        let _ = writeln!(out,
                         "{} {} {}. {} ({})",
                         marker,
                         glyph(step.status),
                         step.sequence_number,
                         step.title,
                         step.id);
        if index == view.focus {
            let _ = writeln!(out, "      {}", step.description);
            if let (StepStatus::Done, Some(outcome)) = (step.status, &step.outcome) {
                let _ = writeln!(out, "      -> {}", outcome);
            }
        }
    }
    match view.pending_timer {
        Some(timer) => {
            let _ = writeln!(out,
                             "next: {:?} on step {} in {:.1}s",
                             timer.spec.kind,
                             timer.spec.step_index + 1,
                             timer.remaining().as_secs_f64());
        }
        None if view.current_index.is_none() => {
            let _ = writeln!(out, "all steps done");
        }
        None => {}
    }
    out
}

pub fn entry_line(entry: &LedgerEntry) -> String {
    let step = entry.step_id.as_deref().unwrap_or("-");
    if entry.metadata.is_empty() {
        format!("#{:<3} {:<24} {}", entry.seq, entry.event.as_str(), step)
    } else {
        let meta = serde_json::to_string(&entry.metadata).unwrap_or_default();
        format!("#{:<3} {:<24} {} {}", entry.seq, entry.event.as_str(), step, meta)
    }
}
