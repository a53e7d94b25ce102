use agent_adapters::{default_registry, KeywordClassifier, MISSING_TRANSFER, MISSING_TRANSFER_CHAT};
use agent_core::{CaseRegistry, FlowMode, Gate, StepStatus};

#[test]
fn registry_holds_both_variants() {
    let registry = default_registry().expect("definitions are valid");
    assert_eq!(registry.case_types(), vec![MISSING_TRANSFER, MISSING_TRANSFER_CHAT]);

    let flow = registry.create_flow(MISSING_TRANSFER, FlowMode::Interactive).unwrap();
    let ids: Vec<&str> = flow.steps.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids,
               ["plan", "bank-link", "transfers", "processing-window", "requeue", "merchant-check", "summary"]);
    assert_eq!(flow.steps[4].gate, Gate::Approval);
    assert_eq!(flow.steps[5].gate, Gate::ExternalAction);
    assert!(flow.steps.iter().all(|s| s.reversible && s.status == StepStatus::Planned));
    let timings: Vec<u64> = flow.steps.iter().map(|s| s.nominal_duration_ms).collect();
    assert_eq!(timings, [1500, 2000, 2500, 2000, 1500, 2500, 1800]);
}

#[test]
fn chat_variant_carries_outcomes() {
    let registry = default_registry().unwrap();
    let flow = registry.create_flow(MISSING_TRANSFER_CHAT, FlowMode::Autoplay).unwrap();
    assert_eq!(flow.steps.len(), 6);
    assert_eq!(flow.steps[0].outcome.as_deref(), Some("Bank connected • First National Bank"));
    assert_eq!(flow.steps[3].gate, Gate::Approval);
    assert_eq!(flow.steps[5].nominal_duration_ms, 0);
    assert!(flow.steps.iter().all(|s| s.explanation.is_none()));
}

#[test]
fn classifier_opens_a_registered_case() {
    let registry = default_registry().unwrap();
    let classifier = KeywordClassifier::default();
    let case_type = classifier.classify("my payout from friday is late").unwrap();
    assert!(registry.definition(case_type).is_some());
}
