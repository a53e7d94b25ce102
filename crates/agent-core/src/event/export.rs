//! Export estructurado del ledger (transcript de auditoría).
//!
//! El conjunto de campos es una superficie de compatibilidad: `timestamp`,
//! `totalEvents`, `steps[{id,title,status}]` y `ledger[{timestamp,event,
//! stepId,meta}]`. `stepId` y `meta` se omiten cuando no existen.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{LedgerEvent, Metadata};
use crate::model::Flow;
use crate::step::StepStatus;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerExport {
    /// Momento del export.
    pub timestamp: DateTime<Utc>,
    pub total_events: usize,
    pub steps: Vec<ExportedStep>,
    pub ledger: Vec<ExportedEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedStep {
    pub id: String,
    pub title: String,
    pub status: StepStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedEntry {
    pub timestamp: DateTime<Utc>,
    pub event: LedgerEvent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Metadata>,
}

impl LedgerExport {
    pub fn from_flow(flow: &Flow) -> Self {
        let steps = flow.steps
                        .iter()
                        .map(|s| ExportedStep { id: s.id.clone(),
                                                title: s.title.clone(),
                                                status: s.status })
                        .collect();
        let ledger: Vec<ExportedEntry> =
            flow.ledger
                .iter()
                .map(|e| ExportedEntry { timestamp: e.timestamp,
                                         event: e.event.clone(),
                                         step_id: e.step_id.clone(),
                                         meta: (!e.metadata.is_empty()).then(|| e.metadata.clone()) })
                .collect();
        Self { timestamp: Utc::now(),
               total_events: ledger.len(),
               steps,
               ledger }
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Pares `(evento, step_id)` en orden, suficientes para `repo::replay`.
    pub fn replay_commands(&self) -> impl Iterator<Item = (LedgerEvent, Option<String>)> + '_ {
        self.ledger.iter().map(|e| (e.event.clone(), e.step_id.clone()))
    }

    /// Estados terminales registrados en el export, en orden.
    pub fn statuses(&self) -> Vec<StepStatus> {
        self.steps.iter().map(|s| s.status).collect()
    }
}
