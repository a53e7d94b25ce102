use agent_core::CoreEngineError;
use agent_persistence::PersistenceError;
use thiserror::Error;
use uuid::Uuid;

/// Errores de los comandos de una sesión.
///
/// Ninguno deja el flujo en un estado intermedio: un comando rechazado no
/// cancela timers ni agrega entradas al ledger.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Core(#[from] CoreEngineError),
    #[error("unknown flow: {0}")]
    UnknownFlow(Uuid),
    #[error("invalid speed multiplier: {0} (must be finite and > 0)")]
    InvalidSpeed(f64),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error("no tokio runtime available: {0}")]
    NoRuntime(String),
}

impl SessionError {
    /// Comando ilegal en el estado actual (aviso, no fallo).
    pub fn is_invalid_transition(&self) -> bool {
        matches!(self, SessionError::Core(e) if e.is_invalid_transition())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_core::{Operation, StepStatus};

    #[test]
    fn core_errors_pass_through() {
        let err: SessionError = CoreEngineError::InvalidTransition { op: Operation::Pause,
                                                                     step_id: "plan".into(),
                                                                     status: StepStatus::Planned }.into();
        assert_eq!(err.to_string(), "invalid transition: cannot pause step 'plan' while planned");
        assert!(err.is_invalid_transition());
    }

    #[test]
    fn speed_message() {
        assert_eq!(SessionError::InvalidSpeed(0.0).to_string(),
                   "invalid speed multiplier: 0 (must be finite and > 0)");
        assert!(!SessionError::UnknownFlow(Uuid::nil()).is_invalid_transition());
    }
}
