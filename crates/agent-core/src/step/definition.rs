use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::StepStatus;

/// Confirmación requerida por un step antes de completarse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gate {
    /// Se completa sola tras su duración nominal.
    #[default]
    None,
    /// Aprobación humana explícita.
    Approval,
    /// Acción externa (p.ej. el comercio confirma el depósito en su banco).
    ExternalAction,
}

/// Step con estado dentro de un `Flow`.
///
/// `title`, `description`, `explanation` y `outcome` son texto de la capa de
/// presentación; el motor no los interpreta.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    /// Identificador estable y único dentro del Flow.
    pub id: String,
    /// Posición 1-based.
    pub sequence_number: u32,
    pub title: String,
    pub description: String,
    pub status: StepStatus,
    pub reversible: bool,
    #[serde(default)]
    pub gate: Gate,
    /// Sólo la usa el scheduler para sus timers.
    pub nominal_duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<String>,
}

impl Step {
    pub fn requires_approval(&self) -> bool {
        self.gate == Gate::Approval
    }

    pub fn requires_external_action(&self) -> bool {
        self.gate == Gate::ExternalAction
    }

    /// Sin gate: se completa automáticamente.
    pub fn is_automatic(&self) -> bool {
        self.gate == Gate::None
    }

    pub fn nominal_duration(&self) -> Duration {
        Duration::from_millis(self.nominal_duration_ms)
    }
}

/// Plantilla sin estado de un step.
///
/// Cada `instantiate` produce un `Step` nuevo e independiente; dos flujos
/// creados desde la misma definición nunca comparten steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepSpec {
    pub id: String,
    pub title: String,
    pub description: String,
    pub reversible: bool,
    pub gate: Gate,
    pub nominal_duration_ms: u64,
    pub explanation: Option<String>,
    pub outcome: Option<String>,
}

/// Duración por defecto cuando la definición no indica una.
pub const DEFAULT_NOMINAL_MS: u64 = 2000;

impl StepSpec {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self { id: id.into(),
               title: title.into(),
               description: String::new(),
               reversible: true,
               gate: Gate::None,
               nominal_duration_ms: DEFAULT_NOMINAL_MS,
               explanation: None,
               outcome: None }
    }

    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.description = text.into();
        self
    }

    pub fn irreversible(mut self) -> Self {
        self.reversible = false;
        self
    }

    pub fn requires_approval(mut self) -> Self {
        self.gate = Gate::Approval;
        self
    }

    pub fn requires_external_action(mut self) -> Self {
        self.gate = Gate::ExternalAction;
        self
    }

    pub fn nominal_ms(mut self, ms: u64) -> Self {
        self.nominal_duration_ms = ms;
        self
    }

    pub fn explain(mut self, text: impl Into<String>) -> Self {
        self.explanation = Some(text.into());
        self
    }

    pub fn outcome(mut self, text: impl Into<String>) -> Self {
        self.outcome = Some(text.into());
        self
    }

    /// Crea el step en estado `Planned` con la posición indicada (1-based).
    pub fn instantiate(&self, sequence_number: u32) -> Step {
        Step { id: self.id.clone(),
               sequence_number,
               title: self.title.clone(),
               description: self.description.clone(),
               status: StepStatus::Planned,
               reversible: self.reversible,
               gate: self.gate,
               nominal_duration_ms: self.nominal_duration_ms,
               explanation: self.explanation.clone(),
               outcome: self.outcome.clone() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gates_are_mutually_exclusive() {
        let spec = StepSpec::new("requeue", "Requeue").requires_approval().requires_external_action();
        let step = spec.instantiate(1);
        assert!(step.requires_external_action());
        assert!(!step.requires_approval());
    }

    #[test]
    fn instances_are_independent() {
        let spec = StepSpec::new("plan", "Draft plan").nominal_ms(1500);
        let mut a = spec.instantiate(1);
        let b = spec.instantiate(1);
        a.status = StepStatus::Done;
        assert_eq!(b.status, StepStatus::Planned);
        assert_eq!(b.nominal_duration(), Duration::from_millis(1500));
    }
}
