//! `Flow`: una instancia de caso con sus steps y su ledger.
//!
//! El `Flow` es la proyección mutable del ledger. Sólo `FlowMachine` lo muta
//! durante su vida; `check_invariants` permite validar un flujo restaurado
//! desde un store externo antes de confiar en él.
use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::CoreEngineError;
use crate::event::Ledger;
use crate::step::{Step, StepStatus};

/// Modo de avance del flujo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowMode {
    /// Avance dirigido por comandos del operador.
    #[default]
    Interactive,
    /// Avance por timers escalados por la velocidad.
    Autoplay,
}

impl FlowMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlowMode::Interactive => "interactive",
            FlowMode::Autoplay => "autoplay",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            FlowMode::Interactive => FlowMode::Autoplay,
            FlowMode::Autoplay => FlowMode::Interactive,
        }
    }
}

impl fmt::Display for FlowMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flow {
    pub id: Uuid,
    /// Clave del registro con la que se creó.
    pub case_type: String,
    pub title: String,
    /// Hash de la definición de caso (detecta deriva de forma al restaurar).
    pub definition_hash: String,
    /// Cantidad y orden fijos tras la creación.
    pub steps: Vec<Step>,
    pub mode: FlowMode,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub ledger: Ledger,
}

impl Flow {
    /// Índice del step actual: el primero que no está `done`. `None` cuando el
    /// flujo está completo. Se deriva siempre de los estados, nunca se guarda.
    pub fn current_index(&self) -> Option<usize> {
        self.steps.iter().position(|s| s.status != StepStatus::Done)
    }

    pub fn current_step(&self) -> Option<&Step> {
        self.current_index().map(|i| &self.steps[i])
    }

    pub fn step_index(&self, step_id: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.id == step_id)
    }

    pub fn step(&self, step_id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == step_id)
    }

    pub fn is_complete(&self) -> bool {
        self.steps.iter().all(|s| s.status == StepStatus::Done)
    }

    pub fn statuses(&self) -> Vec<StepStatus> {
        self.steps.iter().map(|s| s.status).collect()
    }

    /// Verifica los invariantes estructurales:
    /// - ids únicos y `sequence_number` 1..=n en orden;
    /// - todo lo anterior al step actual está `done` y todo lo posterior
    ///   `planned` (a lo sumo un step activo);
    /// - `undone` sólo en steps reversibles;
    /// - `completed_at` presente sii todos los steps están `done`;
    /// - ledger con seq contiguo y timestamps no decrecientes.
    pub fn check_invariants(&self) -> Result<(), CoreEngineError> {
        let violation = |msg: String| Err(CoreEngineError::InvariantViolation(msg));

        if self.steps.is_empty() {
            return violation("flow has no steps".into());
        }
        let mut seen = HashSet::new();
        for (i, step) in self.steps.iter().enumerate() {
            if !seen.insert(step.id.as_str()) {
                return violation(format!("duplicate step id '{}'", step.id));
            }
            if step.sequence_number as usize != i + 1 {
                return violation(format!("step '{}' has sequence number {} at position {}",
                                         step.id,
                                         step.sequence_number,
                                         i + 1));
            }
        }

        if let Some(current) = self.current_index() {
            let step = &self.steps[current];
            if step.status == StepStatus::Undone && !step.reversible {
                return violation(format!("irreversible step '{}' is undone", step.id));
            }
            if let Some(after) = self.steps[current + 1..].iter().find(|s| s.status != StepStatus::Planned) {
                return violation(format!("step '{}' after current step '{}' is {}", after.id, step.id, after.status));
            }
        }

        match (self.is_complete(), self.completed_at.is_some()) {
            (true, false) => return violation("all steps done but completed_at missing".into()),
            (false, true) => return violation("completed_at set on an unfinished flow".into()),
            _ => {}
        }

        self.ledger.check_integrity().map_err(CoreEngineError::InvariantViolation)
    }
}
