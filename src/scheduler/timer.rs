//! Slot de timer único con token de generación.
//!
//! Un scheduler tiene como máximo un timer pendiente. Armar uno nuevo cancela
//! el anterior. Cada timer captura la generación vigente al armarse; al
//! dispararse sólo aplica efectos si sigue siendo la generación actual, así
//! un timer cuya cancelación llegó tarde no muta nada. La cancelación además
//! aborta la tarea.
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerKind {
    /// Fin de la fase `working` del step.
    StepRun,
    /// Resolución simulada de un gate (sólo autoplay).
    GateAutoResolve,
    /// Fin del período de gracia de un undo (`undone -> planned`).
    UndoSettle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimerSpec {
    pub kind: TimerKind,
    pub step_index: usize,
    /// Demora efectiva, ya escalada por la velocidad cuando corresponde.
    pub delay: Duration,
}

/// Timer armado, tal como se expone en la vista del flujo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingTimer {
    pub spec: TimerSpec,
    pub generation: u64,
    pub deadline: Instant,
}

impl PendingTimer {
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }
}

#[derive(Debug, Default)]
pub(crate) struct TimerSlot {
    generation: u64,
    pending: Option<(PendingTimer, JoinHandle<()>)>,
}

impl TimerSlot {
    pub(crate) fn pending(&self) -> Option<PendingTimer> {
        self.pending.as_ref().map(|(timer, _)| *timer)
    }

    /// Cancela el timer pendiente (si hay) e invalida su generación.
    pub(crate) fn cancel(&mut self) -> Option<PendingTimer> {
        self.generation += 1;
        self.pending.take().map(|(timer, handle)| {
                               handle.abort();
                               timer
                           })
    }

    /// Reemplaza el timer pendiente. `spawn` recibe la generación que la
    /// tarea debe presentar al dispararse.
    pub(crate) fn arm<F>(&mut self, spec: TimerSpec, spawn: F) -> PendingTimer
        where F: FnOnce(u64) -> JoinHandle<()>
    {
        self.cancel();
        let timer = PendingTimer { spec,
                                   generation: self.generation,
                                   deadline: Instant::now() + spec.delay };
        let handle = spawn(self.generation);
        self.pending = Some((timer, handle));
        timer
    }

    /// Consume el timer si `generation` sigue vigente. `None` para timers
    /// obsoletos.
    pub(crate) fn take_if_current(&mut self, generation: u64) -> Option<TimerSpec> {
        match &self.pending {
            Some((timer, _)) if timer.generation == generation => {
                self.pending.take().map(|(timer, _)| timer.spec)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(kind: TimerKind) -> TimerSpec {
        TimerSpec { kind,
                    step_index: 0,
                    delay: Duration::from_millis(100) }
    }

    #[tokio::test(start_paused = true)]
    async fn rearming_invalidates_previous_generation() {
        let mut slot = TimerSlot::default();
        let first = slot.arm(spec(TimerKind::StepRun), |_| tokio::spawn(async {}));
        let second = slot.arm(spec(TimerKind::UndoSettle), |_| tokio::spawn(async {}));
        assert_ne!(first.generation, second.generation);
        assert_eq!(slot.take_if_current(first.generation), None);
        assert_eq!(slot.take_if_current(second.generation).map(|s| s.kind), Some(TimerKind::UndoSettle));
        assert!(slot.pending().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_aborts_task() {
        let mut slot = TimerSlot::default();
        let armed = slot.arm(spec(TimerKind::StepRun), |_| {
                            tokio::spawn(async {
                                tokio::time::sleep(Duration::from_secs(60)).await;
                            })
                        });
        assert_eq!(slot.pending().map(|p| p.remaining()), Some(Duration::from_millis(100)));
        assert_eq!(slot.cancel(), Some(armed));
        assert_eq!(slot.take_if_current(armed.generation), None);
        assert_eq!(slot.cancel(), None);
    }
}
