//! Errores específicos del core.
//!
//! Ninguno es fatal: toda operación rechazada deja el `Flow` intacto y sin
//! entradas nuevas en el ledger.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::Operation;
use crate::step::StepStatus;

#[derive(Debug, Error, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub enum CoreEngineError {
    #[error("invalid transition: cannot {op} step '{step_id}' while {status}")]
    InvalidTransition { op: Operation, step_id: String, status: StepStatus },
    #[error("step '{0}' is not reversible")]
    NotReversible(String),
    #[error("flow already completed")]
    FlowCompleted,
    #[error("unknown step: {0}")]
    UnknownStep(String),
    #[error("invalid step index {0}")]
    InvalidStepIndex(usize),
    #[error("unknown case type: {0}")]
    UnknownCaseType(String),
    #[error("duplicate step id in definition: {0}")]
    DuplicateStepId(String),
    #[error("event '{0}' is a status transition and cannot be recorded as an annotation")]
    TransitionAnnotation(String),
    #[error("invariant violated: {0}")]
    InvariantViolation(String),
}

impl CoreEngineError {
    /// Rechazos por estado: el comando no es legal ahora, pero el flujo sigue
    /// sano. La capa de presentación los muestra como aviso.
    pub fn is_invalid_transition(&self) -> bool {
        matches!(self,
                 CoreEngineError::InvalidTransition { .. }
                 | CoreEngineError::NotReversible(_)
                 | CoreEngineError::FlowCompleted)
    }

    /// Identificadores que no existen en el flujo o en el registro.
    pub fn is_unknown_identifier(&self) -> bool {
        matches!(self,
                 CoreEngineError::UnknownStep(_) | CoreEngineError::InvalidStepIndex(_) | CoreEngineError::UnknownCaseType(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_transition_message_names_step_and_status() {
        let err = CoreEngineError::InvalidTransition { op: Operation::Grant,
                                                       step_id: "requeue".into(),
                                                       status: StepStatus::Working };
        assert_eq!(err.to_string(), "invalid transition: cannot grant step 'requeue' while working");
        assert!(err.is_invalid_transition());
        assert!(!err.is_unknown_identifier());
    }

    #[test]
    fn not_reversible_counts_as_invalid_transition() {
        assert!(CoreEngineError::NotReversible("summary".into()).is_invalid_transition());
        assert!(CoreEngineError::UnknownStep("nope".into()).is_unknown_identifier());
    }
}
