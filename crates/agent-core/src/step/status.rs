use std::fmt;

use serde::{Deserialize, Serialize};

/// Estado de un Step en tiempo de ejecución.
///
/// Las transiciones válidas son:
/// - `Planned` -> `Working`
/// - `Working` -> `Done` (sin gate)
/// - `Working` -> `NeedsApproval` / `WaitingExternalAction` (con gate)
/// - `NeedsApproval` | `WaitingExternalAction` -> `Done`
/// - `NeedsApproval` -> `Paused` (rechazo)
/// - `Working` <-> `Paused`
/// - `Done` -> `Undone` -> `Planned` (sólo steps reversibles)
///
/// Cualquier otro salto es un `InvalidTransition`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Pendiente de ejecución.
    Planned,
    /// En ejecución automática.
    Working,
    /// Detenido por el operador o por un rechazo.
    Paused,
    /// Espera aprobación humana.
    NeedsApproval,
    /// Espera confirmación externa (comercio).
    WaitingExternalAction,
    /// Finalizado.
    Done,
    /// Revertido; vuelve a `Planned` tras el período de gracia.
    Undone,
}

impl StepStatus {
    /// Estados que ocupan la posición de "step actual".
    pub fn is_active(&self) -> bool {
        !matches!(self, StepStatus::Planned | StepStatus::Done)
    }

    /// Esperando un gate.
    pub fn is_gated(&self) -> bool {
        matches!(self, StepStatus::NeedsApproval | StepStatus::WaitingExternalAction)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Planned => "planned",
            StepStatus::Working => "working",
            StepStatus::Paused => "paused",
            StepStatus::NeedsApproval => "needs_approval",
            StepStatus::WaitingExternalAction => "waiting_external_action",
            StepStatus::Done => "done",
            StepStatus::Undone => "undone",
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
