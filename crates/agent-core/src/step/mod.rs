//! Definiciones relacionadas a Steps.
//!
//! Un Step es una unidad de trabajo dentro de un `Flow`. Este módulo define:
//! - `StepStatus`: el único campo de estado del step (reemplaza los flags
//!   sueltos tipo "awaiting X").
//! - `Gate`: confirmación requerida antes de completar (aprobación humana o
//!   acción externa del comercio). Un step tiene a lo sumo un gate.
//! - `Step`: instancia con estado dentro de un flujo.
//! - `StepSpec`: plantilla sin estado usada por las definiciones de caso.

pub mod definition;
mod status;

pub use definition::{Gate, Step, StepSpec};
pub use status::StepStatus;
