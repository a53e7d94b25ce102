//! Scheduler/driver: timers, autoplay y comandos del operador sobre un flujo.
//!
//! `FlowMachine` decide qué transiciones son legales; el scheduler decide
//! cuándo ocurren. Es el único escritor del flujo que posee y el único dueño
//! de su timer.

mod driver;
pub mod timer;
mod view;

pub use driver::{Scheduler, SchedulerBuilder};
pub use timer::{PendingTimer, TimerKind, TimerSpec};
pub use view::{FlowView, Notification};
