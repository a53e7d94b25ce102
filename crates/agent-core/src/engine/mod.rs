//! Máquina de estados del flujo y builder de definiciones de caso.
//!
//! `FlowMachine` es la única vía de mutación de un `Flow`: valida cada
//! comando contra el estado actual antes de tocar nada y registra en el
//! ledger la entrada correspondiente en la misma llamada.

pub mod builder;
pub mod core;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use builder::{CaseBuilder, CaseBuilderInit};
pub use core::FlowMachine;

/// Comando que intentó una transición (para mensajes de error).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Start,
    ResolveAutomatic,
    RequestApproval,
    RequestExternalAction,
    Grant,
    Decline,
    Pause,
    Resume,
    Undo,
    Replan,
    /// Cambio de foco (sólo modo interactivo).
    Seek,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let word = match self {
            Operation::Start => "start",
            Operation::ResolveAutomatic => "resolve",
            Operation::RequestApproval => "request approval for",
            Operation::RequestExternalAction => "request external action for",
            Operation::Grant => "grant",
            Operation::Decline => "decline",
            Operation::Pause => "pause",
            Operation::Resume => "resume",
            Operation::Undo => "undo",
            Operation::Replan => "replan",
            Operation::Seek => "seek to",
        };
        f.write_str(word)
    }
}
