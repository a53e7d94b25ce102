//! Vistas de observación del flujo.
use agent_core::{Flow, LedgerEntry, StepStatus};
use uuid::Uuid;

use super::timer::PendingTimer;

/// Foto del flujo y del estado del scheduler.
#[derive(Debug, Clone)]
pub struct FlowView {
    pub flow: Flow,
    /// Primer step no `done`; `None` con el flujo completo.
    pub current_index: Option<usize>,
    /// Step que la presentación muestra. Sigue al actual salvo tras `seek_to`.
    pub focus: usize,
    /// Avance automático activo (no pausado ni detenido).
    pub engaged: bool,
    pub speed: f64,
    pub pending_timer: Option<PendingTimer>,
}

impl FlowView {
    pub fn statuses(&self) -> Vec<StepStatus> {
        self.flow.statuses()
    }
}

/// Notificación enviada tras cada mutación.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub flow_id: Uuid,
    /// Entradas agregadas por la mutación (vacío para cambios de foco).
    pub entries: Vec<LedgerEntry>,
    pub statuses: Vec<StepStatus>,
    pub current_index: Option<usize>,
}
