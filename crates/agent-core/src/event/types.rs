//! Tipos de evento del ledger y estructura `LedgerEntry`.
//!
//! Rol en el flujo:
//! - Cada transición de estado de un Step y cada acción del operador produce
//!   exactamente una entrada en el ledger del `Flow`.
//! - El ledger es la única fuente de verdad histórica: el estado de los steps
//!   es una proyección que puede reconstruirse con `repo::replay`.
//! - `LedgerEvent` es el vocabulario observable del motor. Se serializa como
//!   string libre (`"step_started"`, `"approval_granted"`, ...) y los nombres
//!   desconocidos se conservan en `Other` para no perder datos al importar.
use std::fmt;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Metadatos opacos de una entrada. `IndexMap` conserva el orden de inserción
/// en el export.
pub type Metadata = IndexMap<String, Value>;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum LedgerEvent {
    /// Primer evento de un flujo creado por el trigger.
    FlowStarted,
    /// Primer evento de un flujo creado por `reset`.
    FlowReset,
    /// Todos los steps quedaron `done`.
    FlowCompleted,
    StepStarted,
    StepCompleted,
    StepPaused,
    StepResumed,
    ApprovalRequested,
    ApprovalGranted,
    ApprovalDenied,
    /// Gate externo (confirmación del comercio) abierto.
    MerchantTaskStarted,
    /// Gate externo satisfecho.
    MerchantTaskCompleted,
    /// Primera fase del undo (`done -> undone`), con rebobinado en cascada.
    StepUndone,
    /// Segunda fase del undo (`undone -> planned`).
    StepReplanned,
    AutoplayToggled,
    SpeedChanged,
    /// Snapshot corrupto descartado al restaurar.
    PersistenceRecovered,
    Other(String),
}

impl LedgerEvent {
    pub fn as_str(&self) -> &str {
        match self {
            LedgerEvent::FlowStarted => "flow_started",
            LedgerEvent::FlowReset => "flow_reset",
            LedgerEvent::FlowCompleted => "flow_completed",
            LedgerEvent::StepStarted => "step_started",
            LedgerEvent::StepCompleted => "step_completed",
            LedgerEvent::StepPaused => "step_paused",
            LedgerEvent::StepResumed => "step_resumed",
            LedgerEvent::ApprovalRequested => "approval_requested",
            LedgerEvent::ApprovalGranted => "approval_granted",
            LedgerEvent::ApprovalDenied => "approval_denied",
            LedgerEvent::MerchantTaskStarted => "merchant_task_started",
            LedgerEvent::MerchantTaskCompleted => "merchant_task_completed",
            LedgerEvent::StepUndone => "step_undone",
            LedgerEvent::StepReplanned => "step_replanned",
            LedgerEvent::AutoplayToggled => "autoplay_toggled",
            LedgerEvent::SpeedChanged => "speed_changed",
            LedgerEvent::PersistenceRecovered => "persistence_recovered",
            LedgerEvent::Other(name) => name,
        }
    }

    /// Eventos que acompañan un cambio de `StepStatus`. No pueden registrarse
    /// como simples anotaciones.
    pub fn is_transition(&self) -> bool {
        matches!(self,
                 LedgerEvent::StepStarted
                 | LedgerEvent::StepCompleted
                 | LedgerEvent::StepPaused
                 | LedgerEvent::StepResumed
                 | LedgerEvent::ApprovalRequested
                 | LedgerEvent::ApprovalGranted
                 | LedgerEvent::ApprovalDenied
                 | LedgerEvent::MerchantTaskStarted
                 | LedgerEvent::MerchantTaskCompleted
                 | LedgerEvent::StepUndone
                 | LedgerEvent::StepReplanned
                 | LedgerEvent::FlowCompleted)
    }
}

impl From<String> for LedgerEvent {
    fn from(name: String) -> Self {
        match name.as_str() {
            "flow_started" => LedgerEvent::FlowStarted,
            "flow_reset" => LedgerEvent::FlowReset,
            "flow_completed" => LedgerEvent::FlowCompleted,
            "step_started" => LedgerEvent::StepStarted,
            "step_completed" => LedgerEvent::StepCompleted,
            "step_paused" => LedgerEvent::StepPaused,
            "step_resumed" => LedgerEvent::StepResumed,
            "approval_requested" => LedgerEvent::ApprovalRequested,
            "approval_granted" => LedgerEvent::ApprovalGranted,
            "approval_denied" => LedgerEvent::ApprovalDenied,
            "merchant_task_started" => LedgerEvent::MerchantTaskStarted,
            "merchant_task_completed" => LedgerEvent::MerchantTaskCompleted,
            "step_undone" => LedgerEvent::StepUndone,
            "step_replanned" => LedgerEvent::StepReplanned,
            "autoplay_toggled" => LedgerEvent::AutoplayToggled,
            "speed_changed" => LedgerEvent::SpeedChanged,
            "persistence_recovered" => LedgerEvent::PersistenceRecovered,
            _ => LedgerEvent::Other(name),
        }
    }
}

impl From<&str> for LedgerEvent {
    fn from(name: &str) -> Self {
        LedgerEvent::from(name.to_string())
    }
}

impl From<LedgerEvent> for String {
    fn from(event: LedgerEvent) -> Self {
        match event {
            LedgerEvent::Other(name) => name,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for LedgerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Una entrada del ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Posición en el ledger (asignada por el store, empieza en 0).
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub event: LedgerEvent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub metadata: Metadata,
}
