//! Builder para `CaseDefinition`.
//!
//! Patrón en dos estados: `CaseBuilderInit` obliga a declarar el primer step
//! antes de poder encadenar el resto, de modo que una definición vacía no es
//! representable. `build` valida ids únicos y calcula el `definition_hash`.
//!
//! ```ignore
//! let def = CaseDefinition::builder("missing-transfer", "Missing transfer")
//!     .first_step(StepSpec::new("plan", "Draft plan"))
//!     .then(StepSpec::new("requeue", "Requeue transfer").requires_approval())
//!     .build()?;
//! ```
use std::collections::HashSet;

use serde_json::json;

use crate::constants::ENGINE_VERSION;
use crate::errors::CoreEngineError;
use crate::hashing::hash_value;
use crate::repo::CaseDefinition;
use crate::step::StepSpec;

/// Estado inicial: sólo tipo y título del caso.
#[derive(Debug, Clone)]
pub struct CaseBuilderInit {
    pub case_type: String,
    pub title: String,
}

impl CaseBuilderInit {
    /// Define el primer step y transiciona al builder completo.
    pub fn first_step(self, step: StepSpec) -> CaseBuilder {
        CaseBuilder { case_type: self.case_type,
                      title: self.title,
                      steps: vec![step] }
    }
}

/// Builder con al menos un step.
#[derive(Debug, Clone)]
pub struct CaseBuilder {
    case_type: String,
    title: String,
    steps: Vec<StepSpec>,
}

impl CaseBuilder {
    /// Añade el siguiente step en orden.
    pub fn then(mut self, step: StepSpec) -> Self {
        self.steps.push(step);
        self
    }

    pub fn build(self) -> Result<CaseDefinition, CoreEngineError> {
        let mut seen = HashSet::new();
        for step in &self.steps {
            if !seen.insert(step.id.as_str()) {
                return Err(CoreEngineError::DuplicateStepId(step.id.clone()));
            }
        }
        let definition_hash = definition_hash(&self.case_type, &self.steps);
        Ok(CaseDefinition { case_type: self.case_type,
                            title: self.title,
                            steps: self.steps,
                            definition_hash })
    }
}

/// Hash de la forma del caso. Sólo entra lo que afecta a la semántica del
/// motor (ids, gates, reversibilidad); los textos pueden cambiar sin
/// invalidar snapshots.
fn definition_hash(case_type: &str, steps: &[StepSpec]) -> String {
    let shape: Vec<_> = steps.iter()
                             .map(|s| json!({"id": s.id, "gate": s.gate, "reversible": s.reversible}))
                             .collect();
    hash_value(&json!({"engine_version": ENGINE_VERSION, "case_type": case_type, "steps": shape}))
}
