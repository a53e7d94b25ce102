//! Modelo del caso en curso (`Flow`) y su modo de avance.
mod flow;

pub use flow::{Flow, FlowMode};
