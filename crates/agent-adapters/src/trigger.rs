//! Trigger por palabras clave.
//!
//! No es comprensión de lenguaje: una regla dispara cuando el texto menciona
//! al menos un "sujeto" (transfer, deposit, ...) y al menos un "síntoma"
//! (missing, late, ...). Las reglas se evalúan en orden y gana la primera.
use log::debug;
use serde::{Deserialize, Serialize};

use crate::cases::MISSING_TRANSFER;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerRule {
    pub case_type: String,
    pub subjects: Vec<String>,
    pub symptoms: Vec<String>,
}

impl TriggerRule {
    fn matches(&self, normalized: &str) -> bool {
        mentions(normalized, &self.subjects) && mentions(normalized, &self.symptoms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordClassifier {
    rules: Vec<TriggerRule>,
}

impl KeywordClassifier {
    pub fn new(rules: Vec<TriggerRule>) -> Self {
        Self { rules }
    }

    /// Reglas cargadas desde JSON (`[{case_type, subjects, symptoms}]`).
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        Ok(Self::new(serde_json::from_str(json)?))
    }

    /// Tipo de caso que dispara `query`, si alguno.
    pub fn classify(&self, query: &str) -> Option<&str> {
        let normalized = normalize(query);
        let hit = self.rules.iter().find(|r| r.matches(&normalized)).map(|r| r.case_type.as_str());
        debug!("trigger classify query={:?} -> {:?}", query, hit);
        hit
    }
}

impl Default for KeywordClassifier {
    fn default() -> Self {
        let words = |ws: &[&str]| -> Vec<String> { ws.iter().map(|w| w.to_string()).collect() };
        Self::new(vec![TriggerRule { case_type: MISSING_TRANSFER.to_string(),
                                     subjects: words(&["transfer", "deposit", "payout", "payment"]),
                                     symptoms: words(&["missing",
                                                       "late",
                                                       "not received",
                                                       "haven't received",
                                                       "hasn't arrived",
                                                       "didn't arrive",
                                                       "never arrived",
                                                       "where is"]) }])
    }
}

fn mentions(normalized: &str, words: &[String]) -> bool {
    words.iter().any(|w| normalized.contains(w.as_str()))
}

/// Minúsculas, apóstrofes tipográficos a ASCII y espacios colapsados.
fn normalize(query: &str) -> String {
    query.to_lowercase()
         .replace('\u{2019}', "'")
         .split_whitespace()
         .collect::<Vec<_>>()
         .join(" ")
}
