//! agent-policies: políticas de undo y de auto-resolución de gates.
//!
//! Ambas son constantes de política, no parte del motor: el scheduler las
//! consulta para decidir cuánto esperar y qué registrar. Cada política tiene
//! un id estático y parámetros serializables cuyo hash canónico identifica
//! la configuración usada.

use std::time::Duration;

use agent_core::hashing::{hash_str, to_canonical_json};
use agent_core::{CoreEngineError, Flow, Gate, Metadata, Step, StepStatus};
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Plan de un undo validado: qué step se revierte, qué se rebobina y cuánto
/// dura el período de gracia antes de volver a `planned`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UndoPlan {
    pub index: usize,
    pub step_id: String,
    /// Steps posteriores que vuelven a `planned` en la misma mutación.
    pub rewinds: Vec<String>,
    pub grace: Duration,
}

/// Contrato de políticas de undo.
pub trait UndoPolicy: Send + Sync {
    fn id(&self) -> &'static str;

    /// Demora entre `undone` y `planned`. Puede ser cero.
    fn grace_delay(&self) -> Duration;

    /// Valida el undo de `step_id` sin mutar nada.
    ///
    /// Rechaza steps desconocidos, steps que no están `done` y cualquier
    /// cascada que pase por un step completado no reversible.
    fn plan(&self, flow: &Flow, step_id: &str) -> Result<UndoPlan, CoreEngineError> {
        let index = flow.step_index(step_id)
                        .ok_or_else(|| CoreEngineError::UnknownStep(step_id.to_string()))?;
        let step = &flow.steps[index];
        if step.status != StepStatus::Done {
            return Err(CoreEngineError::InvalidTransition { op: agent_core::Operation::Undo,
                                                            step_id: step.id.clone(),
                                                            status: step.status });
        }
        if let Some(blocker) = flow.steps[index..].iter().find(|s| s.status == StepStatus::Done && !s.reversible) {
            return Err(CoreEngineError::NotReversible(blocker.id.clone()));
        }
        let rewinds = flow.steps[index + 1..]
                          .iter()
                          .filter(|s| s.status != StepStatus::Planned)
                          .map(|s| s.id.clone())
                          .collect();
        let plan = UndoPlan { index,
                              step_id: step.id.clone(),
                              rewinds,
                              grace: self.grace_delay() };
        debug!("undo plan policy={} step={} rewinds={:?}", self.id(), plan.step_id, plan.rewinds);
        Ok(plan)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct UndoParams {
    pub grace_ms: u64,
}

impl Default for UndoParams {
    fn default() -> Self {
        Self { grace_ms: 500 }
    }
}

/// Undo con período de gracia fijo.
#[derive(Clone, Debug, Default)]
pub struct FixedGraceUndo {
    params: UndoParams,
}

impl FixedGraceUndo {
    pub fn new(params: UndoParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &UndoParams {
        &self.params
    }
}

impl UndoPolicy for FixedGraceUndo {
    fn id(&self) -> &'static str {
        "fixed_grace"
    }

    fn grace_delay(&self) -> Duration {
        Duration::from_millis(self.params.grace_ms)
    }
}

/// Contrato de auto-resolución de gates en autoplay.
pub trait AutoResolvePolicy: Send + Sync {
    fn id(&self) -> &'static str;

    /// Demora nominal (sin escalar) antes de resolver el gate del step, o
    /// `None` si el step no tiene gate.
    fn delay_for(&self, step: &Step) -> Option<Duration>;

    /// Metadata con la que se registra la resolución simulada.
    fn metadata(&self) -> Metadata {
        let mut meta = Metadata::new();
        meta.insert("simulated".into(), Value::Bool(true));
        meta
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AutoResolveParams {
    /// Espera antes de aprobar automáticamente.
    pub approval_ms: u64,
    /// Espera antes de simular la confirmación del comercio.
    pub external_action_ms: u64,
}

impl Default for AutoResolveParams {
    fn default() -> Self {
        Self { approval_ms: 1500,
               external_action_ms: 2500 }
    }
}

/// Auto-resolución simulada con demoras fijas por tipo de gate.
#[derive(Clone, Debug, Default)]
pub struct SimulatedAutoResolve {
    params: AutoResolveParams,
}

impl SimulatedAutoResolve {
    pub fn new(params: AutoResolveParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &AutoResolveParams {
        &self.params
    }
}

impl AutoResolvePolicy for SimulatedAutoResolve {
    fn id(&self) -> &'static str {
        "simulated"
    }

    fn delay_for(&self, step: &Step) -> Option<Duration> {
        match step.gate {
            Gate::None => None,
            Gate::Approval => Some(Duration::from_millis(self.params.approval_ms)),
            Gate::ExternalAction => Some(Duration::from_millis(self.params.external_action_ms)),
        }
    }
}

/// Hash canónico de parámetros de política.
pub fn params_hash<P: Serialize>(params: &P) -> Result<String, serde_json::Error> {
    let v = serde_json::to_value(params)?;
    Ok(hash_str(&to_canonical_json(&v)))
}
