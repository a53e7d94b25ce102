//! Tipos de repositorio: definición inmutable de un caso (`CaseDefinition`)
//! y el registro que resuelve un `case_type` a su definición.
//!
//! El registro es sólo lectura: cada `create_flow` instancia steps nuevos a
//! partir de las plantillas, nunca comparte estado entre flujos.
use std::collections::HashMap;

use uuid::Uuid;

use crate::engine::CaseBuilderInit;
use crate::errors::CoreEngineError;
use crate::event::Ledger;
use crate::model::{Flow, FlowMode};
use crate::step::StepSpec;

/// Definición inmutable de un caso: plantillas de steps en orden.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseDefinition {
    pub case_type: String,
    pub title: String,
    pub steps: Vec<StepSpec>,
    pub definition_hash: String,
}

impl CaseDefinition {
    /// Punto de entrada del builder tipado.
    pub fn builder(case_type: impl Into<String>, title: impl Into<String>) -> CaseBuilderInit {
        CaseBuilderInit { case_type: case_type.into(),
                          title: title.into() }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn step(&self, step_id: &str) -> Option<&StepSpec> {
        self.steps.iter().find(|s| s.id == step_id)
    }

    /// Crea un `Flow` nuevo con todos los steps en `planned` y ledger vacío.
    pub fn instantiate(&self, mode: FlowMode) -> Flow {
        let steps = self.steps
                        .iter()
                        .enumerate()
                        .map(|(i, spec)| spec.instantiate(i as u32 + 1))
                        .collect();
        Flow { id: Uuid::new_v4(),
               case_type: self.case_type.clone(),
               title: self.title.clone(),
               definition_hash: self.definition_hash.clone(),
               steps,
               mode,
               started_at: None,
               completed_at: None,
               ledger: Ledger::new() }
    }

    /// Comprueba que un flujo restaurado tiene la forma de esta definición:
    /// mismo hash, mismos ids en el mismo orden, mismos gates y
    /// reversibilidad.
    pub fn matches_shape(&self, flow: &Flow) -> Result<(), CoreEngineError> {
        let mismatch = |msg: String| Err(CoreEngineError::InvariantViolation(msg));
        if flow.case_type != self.case_type {
            return mismatch(format!("flow case type '{}' does not match '{}'", flow.case_type, self.case_type));
        }
        if flow.definition_hash != self.definition_hash {
            return mismatch(format!("definition hash mismatch for case '{}'", self.case_type));
        }
        if flow.steps.len() != self.steps.len() {
            return mismatch(format!("flow has {} steps, definition has {}", flow.steps.len(), self.steps.len()));
        }
        for (step, spec) in flow.steps.iter().zip(&self.steps) {
            if step.id != spec.id || step.gate != spec.gate || step.reversible != spec.reversible {
                return mismatch(format!("step '{}' does not match definition step '{}'", step.id, spec.id));
            }
        }
        Ok(())
    }
}

/// Resolución `case_type -> CaseDefinition`.
pub trait CaseRegistry {
    fn definition(&self, case_type: &str) -> Option<&CaseDefinition>;

    /// Tipos de caso registrados, en orden estable.
    fn case_types(&self) -> Vec<&str>;

    fn create_flow(&self, case_type: &str, mode: FlowMode) -> Result<Flow, CoreEngineError> {
        self.definition(case_type)
            .map(|def| def.instantiate(mode))
            .ok_or_else(|| CoreEngineError::UnknownCaseType(case_type.to_string()))
    }
}

/// Registro en memoria poblado en el arranque.
#[derive(Debug, Clone, Default)]
pub struct StaticCaseRegistry {
    definitions: HashMap<String, CaseDefinition>,
}

impl StaticCaseRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registra (o reemplaza) una definición bajo su `case_type`.
    pub fn register(&mut self, definition: CaseDefinition) -> &mut Self {
        self.definitions.insert(definition.case_type.clone(), definition);
        self
    }
}

impl CaseRegistry for StaticCaseRegistry {
    fn definition(&self, case_type: &str) -> Option<&CaseDefinition> {
        self.definitions.get(case_type)
    }

    fn case_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.definitions.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::StepStatus;

    fn registry() -> StaticCaseRegistry {
        let def = CaseDefinition::builder("demo", "Demo")
            .first_step(StepSpec::new("a", "A"))
            .then(StepSpec::new("b", "B").requires_external_action())
            .build()
            .unwrap();
        let mut registry = StaticCaseRegistry::new();
        registry.register(def);
        registry
    }

    #[test]
    fn create_flow_yields_fresh_planned_steps() {
        let registry = registry();
        let first = registry.create_flow("demo", FlowMode::Autoplay).unwrap();
        let second = registry.create_flow("demo", FlowMode::Interactive).unwrap();
        assert_ne!(first.id, second.id);
        assert!(first.statuses().iter().all(|s| *s == StepStatus::Planned));
        assert_eq!(first.steps[1].sequence_number, 2);
        assert!(first.ledger.is_empty());
        assert_eq!(first.mode, FlowMode::Autoplay);
    }

    #[test]
    fn unknown_case_type_is_an_error() {
        let err = registry().create_flow("refund", FlowMode::Interactive).unwrap_err();
        assert_eq!(err, CoreEngineError::UnknownCaseType("refund".into()));
    }

    #[test]
    fn shape_check_detects_gate_drift() {
        let registry = registry();
        let def = registry.definition("demo").unwrap();
        let mut flow = registry.create_flow("demo", FlowMode::Interactive).unwrap();
        assert!(def.matches_shape(&flow).is_ok());
        flow.steps[1].gate = crate::step::Gate::Approval;
        assert!(def.matches_shape(&flow).is_err());
    }
}
