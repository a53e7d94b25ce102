//! Caso "missing transfer", variante barra de control.
//!
//! Siete steps, todos reversibles. `requeue` mueve dinero y pide aprobación;
//! `merchant-check` espera que el comercio confirme el depósito en su banco.
use agent_core::{CaseDefinition, CoreEngineError, StepSpec};

pub const MISSING_TRANSFER: &str = "missing-transfer";

pub fn definition() -> Result<CaseDefinition, CoreEngineError> {
    CaseDefinition::builder(MISSING_TRANSFER, "Troubleshoot Missing Transfer")
        .first_step(StepSpec::new("plan", "Draft plan")
            .description("I'll outline the steps to locate your missing transfer. You can pause, undo, or stop at any point.")
            .nominal_ms(1500)
            .explain("Plans are cheap; alignment is not. I want to make sure you understand what I'm about to do before I start."))
        .then(StepSpec::new("bank-link", "Verify linked bank")
            .description("Checking your bank connection health and authentication status...")
            .nominal_ms(2000)
            .explain("If the link is broken, nothing else matters. This step confirms I can see your bank account details."))
        .then(StepSpec::new("transfers", "Review recent transfers")
            .description("Comparing Square settlement queue with your bank's pending deposits...")
            .nominal_ms(2500)
            .explain("I'm looking at transfers initiated in the last 7 days to identify which one might be missing."))
        .then(StepSpec::new("processing-window", "Check processing windows")
            .description("Analyzing weekend, holiday, and bank-specific delays...")
            .nominal_ms(2000)
            .explain("Banks don't process ACH transfers on weekends or holidays. This checks if timing explains the delay."))
        .then(StepSpec::new("requeue", "Requeue transfer")
            .description("Submit a re-disbursement request for the missing transfer.")
            .requires_approval()
            .nominal_ms(1500)
            .explain("This touches money movement. I'll log the change and provide one-click undo if needed."))
        .then(StepSpec::new("merchant-check", "Merchant bank confirmation")
            .description("Please open your bank app and confirm you see a pending ACH deposit from Square.")
            .requires_external_action()
            .nominal_ms(2500)
            .explain("Human-in-the-loop confirmation. I need you to verify the deposit is showing up on your bank's end."))
        .then(StepSpec::new("summary", "Resolution summary")
            .description("Transfer located and successfully requeued. Estimated deposit by Oct 22.")
            .nominal_ms(1800)
            .explain("Final summary with outcome, next steps, and full audit log export."))
        .build()
}
