//! Replay: reconstruye un flujo aplicando eventos de un ledger en orden.
//!
//! Cada evento de transición se traduce al comando de `FlowMachine` que lo
//! produjo, así que un ledger inconsistente falla con el mismo error que
//! habría dado el comando original. Los eventos informativos (modo,
//! velocidad, anotaciones) y los que no llevan step se ignoran.
use super::CaseRegistry;
use crate::engine::FlowMachine;
use crate::errors::CoreEngineError;
use crate::event::{LedgerEvent, Metadata};
use crate::model::FlowMode;
use crate::step::StepStatus;

pub fn replay<R, I>(registry: &R, case_type: &str, events: I) -> Result<FlowMachine, CoreEngineError>
    where R: CaseRegistry + ?Sized,
          I: IntoIterator<Item = (LedgerEvent, Option<String>)>
{
    let mut machine = FlowMachine::from_registry(registry, case_type, FlowMode::Interactive)?;
    for (event, step_id) in events {
        let Some(step_id) = step_id else { continue };
        let index = machine.index_of(&step_id)?;
        match event {
            LedgerEvent::StepStarted => machine.start(index)?,
            // `grant` ya completó el step en la entrada anterior
            LedgerEvent::StepCompleted if machine.flow().steps[index].status == StepStatus::Done => {}
            LedgerEvent::StepCompleted => machine.resolve_automatic(index)?,
            LedgerEvent::StepPaused => machine.pause(index, Metadata::new())?,
            LedgerEvent::StepResumed => machine.resume(index, Metadata::new())?,
            LedgerEvent::ApprovalRequested => machine.request_approval(index)?,
            LedgerEvent::MerchantTaskStarted => machine.request_external_action(index)?,
            LedgerEvent::ApprovalGranted | LedgerEvent::MerchantTaskCompleted => {
                machine.grant(index, Metadata::new())?
            }
            LedgerEvent::ApprovalDenied => machine.decline(index, Metadata::new())?,
            LedgerEvent::StepUndone => {
                machine.undo(index, Metadata::new())?;
            }
            LedgerEvent::StepReplanned => machine.replan(index)?,
            _ => {}
        }
    }
    Ok(machine)
}
