//! `Scheduler`: dueño del flujo, de su único timer y del canal de
//! notificaciones.
//!
//! Todo el estado vive detrás de un `Mutex`; los comandos y los disparos de
//! timer lo toman, validan, mutan vía `FlowMachine` y, en la misma sección
//! crítica, persisten el snapshot y notifican. Nunca se retiene el lock a
//! través de un `.await`: las tareas de timer sólo duermen y luego llaman a
//! `fire`, que es síncrono.
//!
//! "Engaged" significa que nadie detuvo el avance: lo apagan `pause`,
//! `decline`, `reset`, el fin del flujo y la restauración de un flujo en
//! autoplay. Los comandos que empujan el flujo (`resume`, `approve`,
//! `confirm_external_action`) lo vuelven a encender, igual que un undo sobre
//! un flujo terminado.
//!
//! Reglas de avance (`drive`), aplicadas sólo con el scheduler engaged:
//! - `planned`: se inicia el step y se arma `StepRun` con su duración
//!   nominal (dividida por la velocidad en autoplay).
//! - `working` sin timer: se arma `StepRun`.
//! - gate pendiente en autoplay: se arma `GateAutoResolve` con la demora de
//!   la política, también escalada. En modo interactivo el gate espera un
//!   comando.
//! - `undone` sin timer: el período de gracia ya no corre, se replanifica.
//! - `paused`: nada.
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use agent_core::{CaseRegistry, CoreEngineError, EventStore, FlowMachine, FlowMode, Gate, LedgerEntry, LedgerEvent,
                 LedgerExport, Metadata, Operation, StepStatus};
use agent_persistence::SnapshotStore;
use agent_policies::{AutoResolvePolicy, FixedGraceUndo, SimulatedAutoResolve, UndoPolicy};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use uuid::Uuid;

use super::timer::{TimerKind, TimerSlot, TimerSpec};
use super::view::{FlowView, Notification};
use crate::config::SchedulerConfig;
use crate::errors::SessionError;

type SharedRegistry = Arc<dyn CaseRegistry + Send + Sync>;

/// Handle clonable de un scheduler. Al soltarse el último clon se cancela
/// el timer pendiente.
#[derive(Clone)]
pub struct Scheduler {
    shared: Arc<Shared>,
}

struct Shared {
    state: Mutex<DriverState>,
    notify: broadcast::Sender<Notification>,
    registry: SharedRegistry,
    undo: Arc<dyn UndoPolicy>,
    auto_resolve: Arc<dyn AutoResolvePolicy>,
    snapshots: Option<SnapshotStore>,
    runtime: Handle,
    this: Weak<Shared>,
}

struct DriverState {
    machine: FlowMachine,
    engaged: bool,
    speed: f64,
    /// Foco elegido con `seek_to`; se descarta en la siguiente transición.
    focus: Option<usize>,
    timer: TimerSlot,
}

/// Posición del ledger antes de una mutación.
struct Mark {
    flow_id: Uuid,
    ledger_len: usize,
}

impl Mark {
    fn of(state: &DriverState) -> Self {
        Self { flow_id: state.machine.flow().id,
               ledger_len: state.machine.flow().ledger.len() }
    }
}

pub struct SchedulerBuilder {
    registry: SharedRegistry,
    config: SchedulerConfig,
    undo: Option<Arc<dyn UndoPolicy>>,
    auto_resolve: Option<Arc<dyn AutoResolvePolicy>>,
    snapshots: Option<SnapshotStore>,
}

impl SchedulerBuilder {
    pub fn config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn undo_policy(mut self, policy: impl UndoPolicy + 'static) -> Self {
        self.undo = Some(Arc::new(policy));
        self
    }

    pub fn auto_resolve_policy(mut self, policy: impl AutoResolvePolicy + 'static) -> Self {
        self.auto_resolve = Some(Arc::new(policy));
        self
    }

    /// Persiste el flujo tras cada mutación.
    pub fn snapshots(mut self, store: SnapshotStore) -> Self {
        self.snapshots = Some(store);
        self
    }

    /// Crea un flujo nuevo (`flow_started`) y empieza a avanzar.
    pub fn create(self, case_type: &str) -> Result<Scheduler, SessionError> {
        let mut machine = FlowMachine::from_registry(&*self.registry, case_type, self.config.mode)?;
        machine.annotate(LedgerEvent::FlowStarted, None, case_meta(case_type))?;
        info!("flow {} created case={} mode={}", machine.flow().id, case_type, self.config.mode);
        self.launch(machine, true)
    }

    /// Restaura el snapshot si existe, es válido y es de `case_type`; si no,
    /// crea un flujo nuevo. Un flujo interactivo restaurado sigue avanzando;
    /// uno en autoplay queda detenido hasta `resume`. Un snapshot corrupto se
    /// descarta y el flujo nuevo empieza con `persistence_recovered`.
    pub fn restore_or_create(self, case_type: &str) -> Result<Scheduler, SessionError> {
        let restored = match &self.snapshots {
            Some(store) => store.load(&*self.registry),
            None => Ok(None),
        };
        match restored {
            Ok(Some(flow)) if flow.case_type != case_type => {
                info!("stored flow {} is case {}, starting {} instead", flow.id, flow.case_type, case_type);
                self.create(case_type)
            }
            Ok(Some(flow)) => {
                info!("flow {} restored case={} current={:?}", flow.id, flow.case_type, flow.current_index());
                let engaged = flow.mode == FlowMode::Interactive;
                self.launch(FlowMachine::new(flow), engaged)
            }
            Ok(None) => self.create(case_type),
            Err(err) => {
                warn!("discarding stored flow: {}", err);
                let mut machine = FlowMachine::from_registry(&*self.registry, case_type, self.config.mode)?;
                let mut meta = Metadata::new();
                meta.insert("reason".into(), Value::String(err.to_string()));
                machine.annotate(LedgerEvent::PersistenceRecovered, None, meta)?;
                machine.annotate(LedgerEvent::FlowStarted, None, case_meta(case_type))?;
                self.launch(machine, true)
            }
        }
    }

    fn launch(self, machine: FlowMachine, engaged: bool) -> Result<Scheduler, SessionError> {
        let speed = validate_speed(self.config.speed)?;
        let runtime = Handle::try_current().map_err(|e| SessionError::NoRuntime(e.to_string()))?;
        let (notify, _) = broadcast::channel(self.config.notify_capacity.max(1));
        let undo = self.undo.unwrap_or_else(|| -> Arc<dyn UndoPolicy> {
                                Arc::new(FixedGraceUndo::new(self.config.undo.clone()))
                            });
        let auto_resolve = self.auto_resolve.unwrap_or_else(|| -> Arc<dyn AutoResolvePolicy> {
                                                Arc::new(SimulatedAutoResolve::new(self.config.auto_resolve.clone()))
                                            });
        let state = DriverState { machine,
                                  engaged,
                                  speed,
                                  focus: None,
                                  timer: TimerSlot::default() };
        let shared = Arc::new_cyclic(|this| Shared { state: Mutex::new(state),
                                                     notify,
                                                     registry: self.registry,
                                                     undo,
                                                     auto_resolve,
                                                     snapshots: self.snapshots,
                                                     runtime,
                                                     this: this.clone() });
        {
            let mut state = shared.lock();
            let mark = Mark { flow_id: state.machine.flow().id,
                              ledger_len: 0 };
            shared.drive(&mut state);
            shared.commit(&mut state, mark);
        }
        Ok(Scheduler { shared })
    }
}

impl Scheduler {
    pub fn builder(registry: SharedRegistry) -> SchedulerBuilder {
        SchedulerBuilder { registry,
                           config: SchedulerConfig::default(),
                           undo: None,
                           auto_resolve: None,
                           snapshots: None }
    }

    pub fn flow_id(&self) -> Uuid {
        self.shared.lock().machine.flow().id
    }

    // --- comandos -------------------------------------------------------

    /// Concede la aprobación pendiente de `step_id`.
    pub fn approve(&self, step_id: &str) -> Result<(), SessionError> {
        self.shared.command("approve", |shared, state| {
                       let index = expect_status(state, Operation::Grant, step_id, StepStatus::NeedsApproval)?;
                       state.timer.cancel();
                       state.machine.grant(index, operator_meta())?;
                       state.engaged = true;
                       shared.drive(state);
                       Ok(())
                   })
    }

    /// Rechaza la aprobación: el step queda `paused` y el avance se detiene.
    pub fn decline(&self, step_id: &str) -> Result<(), SessionError> {
        self.shared.command("decline", |_, state| {
                       let index = expect_status(state, Operation::Decline, step_id, StepStatus::NeedsApproval)?;
                       state.timer.cancel();
                       state.machine.decline(index, operator_meta())?;
                       state.engaged = false;
                       Ok(())
                   })
    }

    /// Confirma la acción externa (comercio) pendiente de `step_id`.
    pub fn confirm_external_action(&self, step_id: &str) -> Result<(), SessionError> {
        self.shared.command("confirm_external_action", |shared, state| {
                       let index =
                           expect_status(state, Operation::Grant, step_id, StepStatus::WaitingExternalAction)?;
                       state.timer.cancel();
                       state.machine.grant(index, operator_meta())?;
                       state.engaged = true;
                       shared.drive(state);
                       Ok(())
                   })
    }

    /// Detiene el avance. Un step `working` pasa a `paused`; en cualquier
    /// otro estado sólo se cancela el timer.
    pub fn pause(&self) -> Result<(), SessionError> {
        self.shared.command("pause", |_, state| {
                       let (index, status) = current(state)?;
                       if status != StepStatus::Working && !state.engaged {
                           return Err(invalid(state, Operation::Pause, index).into());
                       }
                       state.timer.cancel();
                       state.engaged = false;
                       if status == StepStatus::Working {
                           state.machine.pause(index, operator_meta())?;
                       }
                       Ok(())
                   })
    }

    /// Reanuda el avance; un step `paused` vuelve a `working`.
    pub fn resume(&self) -> Result<(), SessionError> {
        self.shared.command("resume", |shared, state| {
                       let (index, status) = current(state)?;
                       if status != StepStatus::Paused && state.engaged {
                           return Err(invalid(state, Operation::Resume, index).into());
                       }
                       if status == StepStatus::Paused {
                           state.machine.resume(index, operator_meta())?;
                       }
                       state.engaged = true;
                       shared.drive(state);
                       Ok(())
                   })
    }

    /// Revierte `step_id` y rebobina los posteriores. El step vuelve a
    /// `planned` tras el período de gracia de la política. Devuelve los ids
    /// rebobinados.
    pub fn undo(&self, step_id: &str) -> Result<Vec<String>, SessionError> {
        self.shared.command("undo", |shared, state| {
                       let plan = shared.undo.plan(state.machine.flow(), step_id)?;
                       let was_complete = state.machine.current_index().is_none();
                       state.timer.cancel();
                       state.machine.undo(plan.index, operator_meta())?;
                       if was_complete {
                           state.engaged = true;
                       }
                       if plan.grace.is_zero() {
                           state.machine.replan(plan.index)?;
                           shared.drive(state);
                       } else {
                           shared.arm(state, TimerKind::UndoSettle, plan.index, plan.grace);
                       }
                       Ok(plan.rewinds)
                   })
    }

    /// Reemplaza el flujo por uno nuevo del mismo caso (mismo modo) y
    /// detiene el avance.
    pub fn reset(&self) -> Result<(), SessionError> {
        self.shared.command("reset", |shared, state| {
                       state.machine.reset(&*shared.registry, operator_meta())?;
                       state.timer.cancel();
                       state.engaged = false;
                       info!("flow reset, new flow {}", state.machine.flow().id);
                       Ok(())
                   })
    }

    /// Cambia el modo. Pasar a autoplay activa el avance; pasar a
    /// interactivo lo conserva y rearma el timer sin escalar. `false` si el
    /// modo no cambió.
    pub fn set_mode(&self, mode: FlowMode) -> Result<bool, SessionError> {
        self.shared.command("set_mode", |shared, state| {
                       if !state.machine.set_mode(mode, operator_meta()) {
                           return Ok(false);
                       }
                       state.timer.cancel();
                       if mode == FlowMode::Autoplay {
                           state.engaged = true;
                       }
                       shared.drive(state);
                       Ok(true)
                   })
    }

    /// Cambia la velocidad de autoplay. Sólo afecta a timers armados después.
    pub fn set_speed(&self, multiplier: f64) -> Result<(), SessionError> {
        self.shared.command("set_speed", |_, state| {
                       let speed = validate_speed(multiplier)?;
                       state.speed = speed;
                       let mut meta = operator_meta();
                       meta.insert("speed".into(), Value::from(speed));
                       state.machine.annotate(LedgerEvent::SpeedChanged, None, meta)?;
                       Ok(())
                   })
    }

    /// Mueve el foco de la vista a un step ya alcanzado (sólo interactivo).
    pub fn seek_to(&self, step_id: &str) -> Result<usize, SessionError> {
        self.shared.command("seek_to", |_, state| {
                       let index = state.machine.index_of(step_id)?;
                       let flow = state.machine.flow();
                       let reached = flow.current_index().unwrap_or(flow.steps.len() - 1);
                       if flow.mode != FlowMode::Interactive || index > reached {
                           return Err(invalid(state, Operation::Seek, index).into());
                       }
                       state.focus = Some(index);
                       Ok(index)
                   })
    }

    /// Explicación del step, si la definición trae una.
    pub fn explain(&self, step_id: &str) -> Result<Option<String>, SessionError> {
        let state = self.shared.lock();
        let step = state.machine
                        .flow()
                        .step(step_id)
                        .ok_or_else(|| CoreEngineError::UnknownStep(step_id.to_string()))?;
        Ok(step.explanation.clone())
    }

    /// Detiene el scheduler sin tocar el flujo (fin de sesión).
    pub fn shutdown(&self) {
        let mut state = self.shared.lock();
        if let Some(timer) = state.timer.cancel() {
            debug!("flow {} shutdown cancelled {:?}", state.machine.flow().id, timer.spec);
        }
        state.engaged = false;
    }

    // --- observación ------------------------------------------------------

    pub fn view(&self) -> FlowView {
        let state = self.shared.lock();
        let flow = state.machine.flow().clone();
        let current_index = flow.current_index();
        let focus = state.focus
                         .or(current_index)
                         .unwrap_or_else(|| flow.steps.len().saturating_sub(1));
        FlowView { flow,
                   current_index,
                   focus,
                   engaged: state.engaged,
                   speed: state.speed,
                   pending_timer: state.timer.pending() }
    }

    pub fn ledger(&self) -> Vec<LedgerEntry> {
        self.shared.lock().machine.flow().ledger.read_all().to_vec()
    }

    /// Entradas con timestamp posterior a `since`.
    pub fn ledger_since(&self, since: DateTime<Utc>) -> Vec<LedgerEntry> {
        self.shared.lock().machine.flow().ledger.read_since(since).to_vec()
    }

    pub fn ledger_since_seq(&self, seq: u64) -> Vec<LedgerEntry> {
        self.shared.lock().machine.flow().ledger.read_since_seq(seq).to_vec()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.shared.notify.subscribe()
    }

    pub fn export(&self) -> LedgerExport {
        LedgerExport::from_flow(self.shared.lock().machine.flow())
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, DriverState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn command<T, F>(&self, name: &str, f: F) -> Result<T, SessionError>
        where F: FnOnce(&Shared, &mut DriverState) -> Result<T, SessionError>
    {
        let mut state = self.lock();
        let mark = Mark::of(&state);
        match f(self, &mut *state) {
            Ok(value) => {
                self.commit(&mut state, mark);
                Ok(value)
            }
            Err(err) => {
                warn!("flow {} rejected {}: {}", mark.flow_id, name, err);
                Err(err)
            }
        }
    }

    fn drive(&self, state: &mut DriverState) {
        if !state.engaged {
            return;
        }
        let Some(index) = state.machine.current_index() else {
            state.engaged = false;
            return;
        };
        let step = &state.machine.flow().steps[index];
        let (status, gate, nominal) = (step.status, step.gate, step.nominal_duration());
        let idle = state.timer.pending().is_none();
        let autoplay = state.machine.flow().mode == FlowMode::Autoplay;

        match status {
            StepStatus::Planned => match state.machine.start(index) {
                Ok(()) => {
                    let delay = if autoplay { scale(nominal, state.speed) } else { nominal };
                    self.arm(state, TimerKind::StepRun, index, delay);
                }
                Err(err) => warn!("drive could not start step {}: {}", index, err),
            },
            StepStatus::Working if idle => {
                let delay = if autoplay { scale(nominal, state.speed) } else { nominal };
                self.arm(state, TimerKind::StepRun, index, delay);
            }
            StepStatus::NeedsApproval | StepStatus::WaitingExternalAction if idle && autoplay => {
                let step = &state.machine.flow().steps[index];
                if let Some(delay) = self.auto_resolve.delay_for(step) {
                    let delay = scale(delay, state.speed);
                    self.arm(state, TimerKind::GateAutoResolve, index, delay);
                }
            }
            StepStatus::Undone if idle => match state.machine.replan(index) {
                Ok(()) => self.drive(state),
                Err(err) => warn!("drive could not replan step {}: {}", index, err),
            },
            _ => {}
        }
        debug!("drive step={} status={} gate={:?}", index, status, gate);
    }

    fn arm(&self, state: &mut DriverState, kind: TimerKind, step_index: usize, delay: Duration) {
        let spec = TimerSpec { kind, step_index, delay };
        let this = self.this.clone();
        let timer = state.timer.arm(spec, |generation| {
                                   self.runtime.spawn(async move {
                                                   tokio::time::sleep(delay).await;
                                                   if let Some(shared) = this.upgrade() {
                                                       shared.fire(generation);
                                                   }
                                               })
                               });
        debug!("flow {} armed {:?} step={} delay={:?} generation={}",
               state.machine.flow().id,
               kind,
               step_index,
               delay,
               timer.generation);
    }

    fn fire(&self, generation: u64) {
        let mut state = self.lock();
        let Some(spec) = state.timer.take_if_current(generation) else {
            debug!("stale timer generation={} ignored", generation);
            return;
        };
        let mark = Mark::of(&state);
        let index = spec.step_index;
        let result = match spec.kind {
            TimerKind::StepRun => finish_working_phase(&mut state.machine, index),
            TimerKind::GateAutoResolve => state.machine.grant(index, self.auto_resolve.metadata()),
            TimerKind::UndoSettle => state.machine.replan(index),
        };
        if let Err(err) = result {
            warn!("flow {} timer {:?} on step {} failed: {}", mark.flow_id, spec.kind, index, err);
        }
        self.drive(&mut state);
        self.commit(&mut state, mark);
    }

    /// Persiste y notifica lo agregado desde `mark`.
    fn commit(&self, state: &mut DriverState, mark: Mark) {
        let flow = state.machine.flow();
        let entries = if flow.id != mark.flow_id {
            flow.ledger.read_all().to_vec()
        } else {
            flow.ledger.read_since_seq(mark.ledger_len as u64).to_vec()
        };
        if !entries.is_empty() {
            state.focus = None;
            for entry in &entries {
                debug!("flow {} #{} {} step={:?}", flow.id, entry.seq, entry.event, entry.step_id);
                if entry.event == LedgerEvent::FlowCompleted {
                    info!("flow {} completed", flow.id);
                }
            }
            if let Some(store) = &self.snapshots {
                if let Err(err) = store.save(flow) {
                    warn!("flow {} snapshot not saved: {}", flow.id, err);
                }
            }
        }
        // sin suscriptores el envío falla y no importa
        let _ = self.notify.send(Notification { flow_id: flow.id,
                                                entries,
                                                statuses: flow.statuses(),
                                                current_index: flow.current_index() });
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        state.timer.cancel();
    }
}

fn finish_working_phase(machine: &mut FlowMachine, index: usize) -> Result<(), CoreEngineError> {
    let gate = machine.flow()
                      .steps
                      .get(index)
                      .map(|s| s.gate)
                      .ok_or(CoreEngineError::InvalidStepIndex(index))?;
    match gate {
        Gate::None => machine.resolve_automatic(index),
        Gate::Approval => machine.request_approval(index),
        Gate::ExternalAction => machine.request_external_action(index),
    }
}

fn current(state: &DriverState) -> Result<(usize, StepStatus), CoreEngineError> {
    let flow = state.machine.flow();
    let index = flow.current_index().ok_or(CoreEngineError::FlowCompleted)?;
    Ok((index, flow.steps[index].status))
}

fn expect_status(state: &DriverState,
                 op: Operation,
                 step_id: &str,
                 expected: StepStatus)
                 -> Result<usize, CoreEngineError> {
    let index = state.machine.index_of(step_id)?;
    if state.machine.flow().steps[index].status != expected {
        return Err(invalid(state, op, index));
    }
    Ok(index)
}

fn invalid(state: &DriverState, op: Operation, index: usize) -> CoreEngineError {
    let step = &state.machine.flow().steps[index];
    CoreEngineError::InvalidTransition { op,
                                         step_id: step.id.clone(),
                                         status: step.status }
}

fn validate_speed(multiplier: f64) -> Result<f64, SessionError> {
    if multiplier.is_finite() && multiplier > 0.0 {
        Ok(multiplier)
    } else {
        Err(SessionError::InvalidSpeed(multiplier))
    }
}

/// `nominal / speed`, redondeado al nanosegundo.
fn scale(nominal: Duration, speed: f64) -> Duration {
    let nanos = (nominal.as_nanos() as f64 / speed).round();
    Duration::from_nanos(nanos.min(u64::MAX as f64) as u64)
}

fn operator_meta() -> Metadata {
    let mut meta = Metadata::new();
    meta.insert("source".into(), Value::String("operator".into()));
    meta
}

fn case_meta(case_type: &str) -> Metadata {
    let mut meta = Metadata::new();
    meta.insert("case_type".into(), Value::String(case_type.to_string()));
    meta
}
