//! Caso "missing transfer", variante conversacional.
//!
//! Mismo recorrido en seis steps, cada uno con su línea de resultado.
use agent_core::{CaseDefinition, CoreEngineError, StepSpec};

pub const MISSING_TRANSFER_CHAT: &str = "missing-transfer-chat";

/// Duración de los steps con gate (no tienen una propia en el guion).
const GATED_NOMINAL_MS: u64 = 1500;

pub fn definition() -> Result<CaseDefinition, CoreEngineError> {
    CaseDefinition::builder(MISSING_TRANSFER_CHAT, "Missing transfer")
        .first_step(StepSpec::new("verify-bank", "Verify linked bank account")
            .description("Checking your bank connection health and authentication...")
            .nominal_ms(2200)
            .outcome("Bank connected • First National Bank"))
        .then(StepSpec::new("check-transfers", "Review recent transfers")
            .description("Comparing settlement queue with bank's pending deposits...")
            .nominal_ms(2800)
            .outcome("Found 3 transfers in past 7 days"))
        .then(StepSpec::new("check-processing", "Check processing windows")
            .description("Analyzing weekend, holiday, and bank-specific delays...")
            .nominal_ms(2400)
            .outcome("Weekend delay detected"))
        .then(StepSpec::new("requeue-transfer", "Requeue the transfer")
            .description("Submitting a request to attempt the transfer again...")
            .requires_approval()
            .nominal_ms(GATED_NOMINAL_MS)
            .outcome("Transfer requeue initiated"))
        .then(StepSpec::new("merchant-confirm", "Merchant bank confirmation")
            .description("Manual step required: open bank app and confirm pending deposit...")
            .requires_external_action()
            .nominal_ms(GATED_NOMINAL_MS)
            .outcome("Deposit confirmed by merchant"))
        .then(StepSpec::new("resolution", "Resolution summary")
            .description("Transfer requeued. Estimated deposit on Oct 25.")
            .nominal_ms(0)
            .outcome("Resolution complete"))
        .build()
}
