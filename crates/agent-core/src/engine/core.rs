//! `FlowMachine`: transiciones de steps sobre un `Flow`.
//!
//! Reglas comunes a todas las operaciones:
//! - Se valida primero; un comando rechazado no muta el flujo ni agrega
//!   entradas al ledger.
//! - Sólo el step actual (el primero no `done`) puede cambiar de estado,
//!   salvo `undo`, que apunta a un step ya completado.
//! - La entrada del ledger se agrega en la misma llamada que muta el estado.
//!
//! No hay tiempo aquí: las duraciones y los timers son cosa del scheduler.
use chrono::Utc;
use log::debug;
use serde_json::{json, Value};

use super::Operation;
use crate::errors::CoreEngineError;
use crate::event::{EventStore, LedgerEntry, LedgerEvent, Metadata};
use crate::model::{Flow, FlowMode};
use crate::repo::CaseRegistry;
use crate::step::{Gate, Step, StepStatus};

#[derive(Debug, Clone)]
pub struct FlowMachine {
    flow: Flow,
}

impl FlowMachine {
    /// Envuelve un flujo existente (p.ej. restaurado). El llamador es
    /// responsable de haber validado sus invariantes.
    pub fn new(flow: Flow) -> Self {
        Self { flow }
    }

    /// Crea un flujo nuevo desde el registro.
    pub fn from_registry<R>(registry: &R, case_type: &str, mode: FlowMode) -> Result<Self, CoreEngineError>
        where R: CaseRegistry + ?Sized
    {
        Ok(Self::new(registry.create_flow(case_type, mode)?))
    }

    pub fn flow(&self) -> &Flow {
        &self.flow
    }

    pub fn into_flow(self) -> Flow {
        self.flow
    }

    pub fn current_index(&self) -> Option<usize> {
        self.flow.current_index()
    }

    pub fn index_of(&self, step_id: &str) -> Result<usize, CoreEngineError> {
        self.flow
            .step_index(step_id)
            .ok_or_else(|| CoreEngineError::UnknownStep(step_id.to_string()))
    }

    /// `planned -> working` del step actual.
    pub fn start(&mut self, index: usize) -> Result<(), CoreEngineError> {
        self.expect_current(Operation::Start, index, |s| s.status == StepStatus::Planned)?;
        let now = Utc::now();
        self.flow.started_at.get_or_insert(now);
        self.set_status(index, StepStatus::Working);
        self.record(LedgerEvent::StepStarted, index, Metadata::new());
        Ok(())
    }

    /// `working -> done` de un step sin gate.
    pub fn resolve_automatic(&mut self, index: usize) -> Result<(), CoreEngineError> {
        self.expect_current(Operation::ResolveAutomatic, index, |s| {
                s.status == StepStatus::Working && s.gate == Gate::None
            })?;
        self.set_status(index, StepStatus::Done);
        self.record(LedgerEvent::StepCompleted, index, Metadata::new());
        self.complete_if_finished();
        Ok(())
    }

    /// `working -> needs_approval` de un step con gate de aprobación.
    pub fn request_approval(&mut self, index: usize) -> Result<(), CoreEngineError> {
        self.expect_current(Operation::RequestApproval, index, |s| {
                s.status == StepStatus::Working && s.gate == Gate::Approval
            })?;
        self.set_status(index, StepStatus::NeedsApproval);
        self.record(LedgerEvent::ApprovalRequested, index, Metadata::new());
        Ok(())
    }

    /// `working -> waiting_external_action` de un step con gate externo.
    pub fn request_external_action(&mut self, index: usize) -> Result<(), CoreEngineError> {
        self.expect_current(Operation::RequestExternalAction, index, |s| {
                s.status == StepStatus::Working && s.gate == Gate::ExternalAction
            })?;
        self.set_status(index, StepStatus::WaitingExternalAction);
        self.record(LedgerEvent::MerchantTaskStarted, index, Metadata::new());
        Ok(())
    }

    /// Satisface el gate pendiente y completa el step.
    ///
    /// Registra dos entradas: `approval_granted` (o `merchant_task_completed`)
    /// seguida de `step_completed`, ambas con la metadata recibida.
    pub fn grant(&mut self, index: usize, metadata: Metadata) -> Result<(), CoreEngineError> {
        self.expect_current(Operation::Grant, index, |s| s.status.is_gated())?;
        let event = match self.flow.steps[index].status {
            StepStatus::WaitingExternalAction => LedgerEvent::MerchantTaskCompleted,
            _ => LedgerEvent::ApprovalGranted,
        };
        self.set_status(index, StepStatus::Done);
        self.record(event, index, metadata.clone());
        self.record(LedgerEvent::StepCompleted, index, metadata);
        self.complete_if_finished();
        Ok(())
    }

    /// `needs_approval -> paused`: el operador rechazó la aprobación.
    pub fn decline(&mut self, index: usize, metadata: Metadata) -> Result<(), CoreEngineError> {
        self.expect_current(Operation::Decline, index, |s| s.status == StepStatus::NeedsApproval)?;
        self.set_status(index, StepStatus::Paused);
        self.record(LedgerEvent::ApprovalDenied, index, metadata);
        Ok(())
    }

    pub fn pause(&mut self, index: usize, metadata: Metadata) -> Result<(), CoreEngineError> {
        self.expect_current(Operation::Pause, index, |s| s.status == StepStatus::Working)?;
        self.set_status(index, StepStatus::Paused);
        self.record(LedgerEvent::StepPaused, index, metadata);
        Ok(())
    }

    pub fn resume(&mut self, index: usize, metadata: Metadata) -> Result<(), CoreEngineError> {
        self.expect_current(Operation::Resume, index, |s| s.status == StepStatus::Paused)?;
        self.set_status(index, StepStatus::Working);
        self.record(LedgerEvent::StepResumed, index, metadata);
        Ok(())
    }

    /// Primera fase del undo: `done -> undone` y rebobinado en cascada.
    ///
    /// Todo step posterior que no esté `planned` vuelve a `planned`. Si el
    /// objetivo o algún step posterior ya completado no es reversible, el
    /// comando se rechaza entero. Devuelve los ids rebobinados, que también
    /// quedan en la metadata (`rewound`).
    pub fn undo(&mut self, index: usize, metadata: Metadata) -> Result<Vec<String>, CoreEngineError> {
        let step = self.step_at(index)?;
        if step.status != StepStatus::Done {
            return Err(CoreEngineError::InvalidTransition { op: Operation::Undo,
                                                            step_id: step.id.clone(),
                                                            status: step.status });
        }
        if let Some(blocker) = self.flow.steps[index..]
                                   .iter()
                                   .find(|s| s.status == StepStatus::Done && !s.reversible)
        {
            return Err(CoreEngineError::NotReversible(blocker.id.clone()));
        }

        let rewound: Vec<String> = self.flow.steps[index + 1..]
                                       .iter()
                                       .filter(|s| s.status != StepStatus::Planned)
                                       .map(|s| s.id.clone())
                                       .collect();
        self.set_status(index, StepStatus::Undone);
        for step in &mut self.flow.steps[index + 1..] {
            step.status = StepStatus::Planned;
        }
        self.flow.completed_at = None;

        let mut metadata = metadata;
        metadata.insert("rewound".into(), json!(rewound));
        self.record(LedgerEvent::StepUndone, index, metadata);
        Ok(rewound)
    }

    /// Segunda fase del undo: `undone -> planned`.
    pub fn replan(&mut self, index: usize) -> Result<(), CoreEngineError> {
        self.expect_current(Operation::Replan, index, |s| s.status == StepStatus::Undone)?;
        self.set_status(index, StepStatus::Planned);
        self.record(LedgerEvent::StepReplanned, index, Metadata::new());
        Ok(())
    }

    /// Cambia el modo. Devuelve `false` (sin entrada en el ledger) si ya
    /// estaba en ese modo.
    pub fn set_mode(&mut self, mode: FlowMode, metadata: Metadata) -> bool {
        if self.flow.mode == mode {
            return false;
        }
        self.flow.mode = mode;
        let mut metadata = metadata;
        metadata.insert("mode".into(), Value::String(mode.as_str().into()));
        self.flow.ledger.append(LedgerEvent::AutoplayToggled, None, metadata);
        debug!("flow {} mode -> {}", self.flow.id, mode);
        true
    }

    /// Registra un evento informativo (sin cambio de estado).
    pub fn annotate(&mut self,
                    event: LedgerEvent,
                    step_id: Option<&str>,
                    metadata: Metadata)
                    -> Result<LedgerEntry, CoreEngineError> {
        if event.is_transition() {
            return Err(CoreEngineError::TransitionAnnotation(event.to_string()));
        }
        if let Some(id) = step_id {
            self.index_of(id)?;
        }
        Ok(self.flow.ledger.append(event, step_id, metadata))
    }

    /// Descarta el flujo y crea uno nuevo del mismo caso, conservando el
    /// modo. La primera entrada del ledger nuevo es `flow_reset`.
    pub fn reset<R>(&mut self, registry: &R, metadata: Metadata) -> Result<(), CoreEngineError>
        where R: CaseRegistry + ?Sized
    {
        let mut fresh = registry.create_flow(&self.flow.case_type, self.flow.mode)?;
        let mut metadata = metadata;
        metadata.insert("previous_flow".into(), Value::String(self.flow.id.to_string()));
        fresh.ledger.append(LedgerEvent::FlowReset, None, metadata);
        self.flow = fresh;
        Ok(())
    }

    fn step_at(&self, index: usize) -> Result<&Step, CoreEngineError> {
        self.flow.steps.get(index).ok_or(CoreEngineError::InvalidStepIndex(index))
    }

    fn expect_current<P>(&self, op: Operation, index: usize, allowed: P) -> Result<(), CoreEngineError>
        where P: Fn(&Step) -> bool
    {
        let step = self.step_at(index)?;
        let current = self.flow.current_index().ok_or(CoreEngineError::FlowCompleted)?;
        if index != current || !allowed(step) {
            debug!("flow {} rejected {} on step {} ({}), current={}",
                   self.flow.id, op, step.id, step.status, current);
            return Err(CoreEngineError::InvalidTransition { op,
                                                            step_id: step.id.clone(),
                                                            status: step.status });
        }
        Ok(())
    }

    fn set_status(&mut self, index: usize, status: StepStatus) {
        self.flow.steps[index].status = status;
    }

    fn record(&mut self, event: LedgerEvent, index: usize, metadata: Metadata) {
        let step_id = self.flow.steps[index].id.clone();
        let entry = self.flow.ledger.append(event, Some(&step_id), metadata);
        debug!("flow {} #{} {} step={} -> {}",
               self.flow.id, entry.seq, entry.event, step_id, self.flow.steps[index].status);
    }

    fn complete_if_finished(&mut self) {
        if self.flow.completed_at.is_none() && self.flow.is_complete() {
            self.flow.completed_at = Some(Utc::now());
            self.flow.ledger.append(LedgerEvent::FlowCompleted, None, Metadata::new());
            debug!("flow {} completed", self.flow.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::{CaseDefinition, StaticCaseRegistry};
    use crate::step::StepSpec;

    fn registry() -> StaticCaseRegistry {
        let def = CaseDefinition::builder("t", "Test")
            .first_step(StepSpec::new("a", "A"))
            .then(StepSpec::new("b", "B").requires_approval())
            .then(StepSpec::new("c", "C").requires_external_action())
            .then(StepSpec::new("d", "D").irreversible())
            .build()
            .unwrap();
        let mut registry = StaticCaseRegistry::new();
        registry.register(def);
        registry
    }

    fn machine() -> FlowMachine {
        FlowMachine::from_registry(&registry(), "t", FlowMode::Interactive).unwrap()
    }

    fn events(m: &FlowMachine) -> Vec<String> {
        m.flow().ledger.iter().map(|e| e.event.to_string()).collect()
    }

    #[test]
    fn rejected_command_leaves_flow_untouched() {
        let mut m = machine();
        let before = m.flow().clone();
        let err = m.resolve_automatic(0).unwrap_err();
        assert!(err.is_invalid_transition());
        assert_eq!(m.flow(), &before);

        // only the current step may start
        assert!(m.start(1).is_err());
        assert_eq!(m.start(9), Err(CoreEngineError::InvalidStepIndex(9)));
        assert!(m.flow().ledger.is_empty());
    }

    #[test]
    fn gated_step_cannot_resolve_automatically() {
        let mut m = machine();
        m.start(0).unwrap();
        m.resolve_automatic(0).unwrap();
        m.start(1).unwrap();
        assert!(m.resolve_automatic(1).is_err());
        assert!(m.request_external_action(1).is_err());
        m.request_approval(1).unwrap();
        assert_eq!(m.flow().steps[1].status, StepStatus::NeedsApproval);
    }

    #[test]
    fn decline_then_resume_requests_approval_again() {
        let mut m = machine();
        m.start(0).unwrap();
        m.resolve_automatic(0).unwrap();
        m.start(1).unwrap();
        m.request_approval(1).unwrap();
        m.decline(1, Metadata::new()).unwrap();
        assert_eq!(m.flow().steps[1].status, StepStatus::Paused);
        m.resume(1, Metadata::new()).unwrap();
        m.request_approval(1).unwrap();
        m.grant(1, Metadata::new()).unwrap();
        assert_eq!(m.current_index(), Some(2));
        assert_eq!(events(&m)[4..],
                   ["approval_denied", "step_resumed", "approval_requested", "approval_granted", "step_completed"]);
    }

    #[test]
    fn external_gate_logs_merchant_events() {
        let mut m = machine();
        for i in 0..2 {
            m.start(i).unwrap();
            if i == 1 {
                m.request_approval(1).unwrap();
                m.grant(1, Metadata::new()).unwrap();
            } else {
                m.resolve_automatic(i).unwrap();
            }
        }
        m.start(2).unwrap();
        m.request_external_action(2).unwrap();
        m.grant(2, Metadata::new()).unwrap();
        let tail: Vec<String> = events(&m).into_iter().rev().take(3).collect();
        assert_eq!(tail, ["step_completed", "merchant_task_completed", "merchant_task_started"]);
    }

    #[test]
    fn undo_rewinds_later_steps() {
        let mut m = machine();
        m.start(0).unwrap();
        m.resolve_automatic(0).unwrap();
        m.start(1).unwrap();
        m.request_approval(1).unwrap();

        let rewound = m.undo(0, Metadata::new()).unwrap();
        assert_eq!(rewound, vec!["b".to_string()]);
        assert_eq!(m.flow().statuses()[..2], [StepStatus::Undone, StepStatus::Planned]);
        assert_eq!(m.current_index(), Some(0));
        let last = m.flow().ledger.last().unwrap();
        assert_eq!(last.event, LedgerEvent::StepUndone);
        assert_eq!(last.metadata["rewound"], json!(["b"]));
        m.flow().check_invariants().unwrap();

        m.replan(0).unwrap();
        assert_eq!(m.flow().steps[0].status, StepStatus::Planned);
        assert!(m.start(0).is_ok());
    }

    #[test]
    fn undo_requires_done_and_reversible() {
        let mut m = machine();
        m.start(0).unwrap();
        assert!(matches!(m.undo(0, Metadata::new()), Err(CoreEngineError::InvalidTransition { op: Operation::Undo, .. })));

        m.resolve_automatic(0).unwrap();
        m.start(1).unwrap();
        m.request_approval(1).unwrap();
        m.grant(1, Metadata::new()).unwrap();
        m.start(2).unwrap();
        m.request_external_action(2).unwrap();
        m.grant(2, Metadata::new()).unwrap();
        m.start(3).unwrap();
        m.resolve_automatic(3).unwrap();
        assert!(m.flow().is_complete());

        let len = m.flow().ledger.len();
        assert_eq!(m.undo(3, Metadata::new()), Err(CoreEngineError::NotReversible("d".into())));
        // cascading over the irreversible step is rejected too
        assert_eq!(m.undo(1, Metadata::new()), Err(CoreEngineError::NotReversible("d".into())));
        assert_eq!(m.flow().ledger.len(), len);
        assert!(m.flow().completed_at.is_some());
    }

    #[test]
    fn completed_flow_rejects_step_commands() {
        let def = CaseDefinition::builder("one", "One").first_step(StepSpec::new("only", "Only"))
                                                       .build()
                                                       .unwrap();
        let mut registry = StaticCaseRegistry::new();
        registry.register(def);
        let mut m = FlowMachine::from_registry(&registry, "one", FlowMode::Autoplay).unwrap();
        m.start(0).unwrap();
        m.resolve_automatic(0).unwrap();
        assert_eq!(m.start(0), Err(CoreEngineError::FlowCompleted));
        assert_eq!(m.pause(0, Metadata::new()), Err(CoreEngineError::FlowCompleted));
        assert_eq!(events(&m), ["step_started", "step_completed", "flow_completed"]);

        // undo reopens the flow
        m.undo(0, Metadata::new()).unwrap();
        assert!(m.flow().completed_at.is_none());
        m.flow().check_invariants().unwrap();
    }

    #[test]
    fn mode_change_is_logged_once() {
        let mut m = machine();
        assert!(!m.set_mode(FlowMode::Interactive, Metadata::new()));
        assert!(m.set_mode(FlowMode::Autoplay, Metadata::new()));
        let entry = m.flow().ledger.last().unwrap();
        assert_eq!(entry.event, LedgerEvent::AutoplayToggled);
        assert_eq!(entry.metadata["mode"], "autoplay");
        assert_eq!(m.flow().ledger.len(), 1);
    }

    #[test]
    fn annotations_cannot_fake_transitions() {
        let mut m = machine();
        assert!(matches!(m.annotate(LedgerEvent::StepCompleted, Some("a"), Metadata::new()),
                         Err(CoreEngineError::TransitionAnnotation(_))));
        assert!(matches!(m.annotate(LedgerEvent::from("note"), Some("zz"), Metadata::new()),
                         Err(CoreEngineError::UnknownStep(_))));
        let entry = m.annotate(LedgerEvent::FlowStarted, None, Metadata::new()).unwrap();
        assert_eq!(entry.seq, 0);
    }

    #[test]
    fn reset_keeps_mode_and_starts_ledger_with_flow_reset() {
        let registry = registry();
        let mut m = FlowMachine::from_registry(&registry, "t", FlowMode::Autoplay).unwrap();
        let old_id = m.flow().id;
        m.start(0).unwrap();
        m.reset(&registry, Metadata::new()).unwrap();
        assert_ne!(m.flow().id, old_id);
        assert_eq!(m.flow().mode, FlowMode::Autoplay);
        assert_eq!(events(&m), ["flow_reset"]);
        assert!(m.flow().statuses().iter().all(|s| *s == StepStatus::Planned));
    }
}
