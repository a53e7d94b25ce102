//! agent-adapters: definiciones concretas de casos y trigger por palabras
//! clave.
//!
//! El motor no conoce ningún caso; este crate registra los dos guiones del
//! demo de soporte ("missing transfer" en variante barra de control y en
//! variante conversacional) y expone el clasificador que decide, a partir de
//! texto libre, qué caso abrir.

pub mod cases;
pub mod trigger;

pub use cases::{default_registry, missing_transfer, missing_transfer_chat, MISSING_TRANSFER, MISSING_TRANSFER_CHAT};
pub use trigger::{KeywordClassifier, TriggerRule};
