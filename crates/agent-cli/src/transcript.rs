//! Replay de un transcript exportado contra un motor limpio.
use std::fmt;

use agent_core::{replay, CaseRegistry, LedgerExport, StepStatus};
use anyhow::{anyhow, Context};

#[derive(Debug, Clone, PartialEq)]
pub struct ReplayReport {
    pub case_type: String,
    pub replayed: Vec<(String, StepStatus)>,
    pub exported: Vec<StepStatus>,
}

impl ReplayReport {
    pub fn matches(&self) -> bool {
        self.replayed.iter().map(|(_, s)| *s).eq(self.exported.iter().copied())
    }
}

impl fmt::Display for ReplayReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "case {}", self.case_type)?;
        for (i, (id, status)) in self.replayed.iter().enumerate() {
            let exported = self.exported.get(i).map(|s| s.as_str()).unwrap_or("-");
            let flag = if exported == status.as_str() { "" } else { "  (differs)" };
            writeln!(f, "  {:<20} {:<24} export={}{}", id, status.as_str(), exported, flag)?;
        }
        write!(f, "{}", if self.matches() { "replay matches export" } else { "replay DIFFERS from export" })
    }
}

/// Caso registrado cuyos ids de step coinciden, en orden, con los del export.
pub fn detect_case<'a, R>(registry: &'a R, export: &LedgerExport) -> Option<&'a str>
    where R: CaseRegistry + ?Sized
{
    registry.case_types().into_iter().find(|case_type| {
                                         registry.definition(case_type).is_some_and(|definition| {
                                                                           definition.steps
                                                                                     .iter()
                                                                                     .map(|s| s.id.as_str())
                                                                                     .eq(export.steps
                                                                                               .iter()
                                                                                               .map(|s| s.id.as_str()))
                                                                       })
                                     })
}

pub fn replay_export<R>(registry: &R, export: &LedgerExport, case_type: Option<&str>) -> anyhow::Result<ReplayReport>
    where R: CaseRegistry + ?Sized
{
    let case_type = match case_type {
        Some(case_type) => case_type,
        None => detect_case(registry, export).ok_or_else(|| anyhow!("no registered case matches the transcript steps"))?,
    };
    let machine = replay(registry, case_type, export.replay_commands()).with_context(|| format!("replaying {case_type}"))?;
    let replayed = machine.flow().steps.iter().map(|s| (s.id.clone(), s.status)).collect();
    Ok(ReplayReport { case_type: case_type.to_string(),
                      replayed,
                      exported: export.statuses() })
}
