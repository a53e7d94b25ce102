//! agent-core: motor de pasos (step-flow) del agente de soporte.
//!
//! Contiene las piezas sin tiempo ni I/O del motor:
//! - `event`: ledger append-only y export estructurado del transcript.
//! - `step`: modelo de Step, estados y gates.
//! - `model`: `Flow` (instancia de un caso) y sus invariantes.
//! - `repo`: registro de definiciones de caso y replay del ledger.
//! - `engine`: máquina de estados (`FlowMachine`) y builder de definiciones.
//!
//! El scheduler (timers, autoplay) vive en el crate raíz; aquí todo es
//! síncrono y determinista salvo los timestamps del ledger.
pub mod constants;
pub mod engine;
pub mod errors;
pub mod event;
pub mod hashing;
pub mod model;
pub mod repo;
pub mod step;

pub use engine::{CaseBuilder, CaseBuilderInit, FlowMachine, Operation};
pub use errors::CoreEngineError;
pub use event::{EventStore, ExportedEntry, ExportedStep, Ledger, LedgerEntry, LedgerEvent, LedgerExport, Metadata};
pub use model::{Flow, FlowMode};
pub use repo::{replay, CaseDefinition, CaseRegistry, StaticCaseRegistry};
pub use step::{Gate, Step, StepSpec, StepStatus};
