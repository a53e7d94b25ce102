use agent_adapters::{default_registry, MISSING_TRANSFER};
use agent_core::{CaseRegistry, FlowMachine, FlowMode, Gate, LedgerEvent, Metadata, StaticCaseRegistry, StepStatus};

fn machine(registry: &StaticCaseRegistry) -> FlowMachine {
    FlowMachine::from_registry(registry, MISSING_TRANSFER, FlowMode::Interactive).expect("registered case")
}

/// Advances the current step through its working phase and gate, the way an
/// operator approving everything would.
fn run_current(m: &mut FlowMachine) {
    let index = m.current_index().expect("flow not complete");
    m.start(index).unwrap();
    match m.flow().steps[index].gate {
        Gate::None => m.resolve_automatic(index).unwrap(),
        Gate::Approval => {
            m.request_approval(index).unwrap();
            m.grant(index, Metadata::new()).unwrap();
        }
        Gate::ExternalAction => {
            m.request_external_action(index).unwrap();
            m.grant(index, Metadata::new()).unwrap();
        }
    }
}

#[test]
fn approval_scenario_ledger_sequence() {
    let registry = default_registry().unwrap();
    let mut m = machine(&registry);
    for _ in 0..4 {
        run_current(&mut m);
    }
    m.start(4).unwrap();
    m.request_approval(4).unwrap();
    assert_eq!(m.flow().steps[4].status, StepStatus::NeedsApproval);

    m.grant(4, Metadata::new()).unwrap();
    m.start(5).unwrap();

    let tail: Vec<(String, Option<String>)> = m.flow()
                                               .ledger
                                               .iter()
                                               .rev()
                                               .take(5)
                                               .map(|e| (e.event.to_string(), e.step_id.clone()))
                                               .collect::<Vec<_>>()
                                               .into_iter()
                                               .rev()
                                               .collect();
    let expected = [("step_started", "requeue"),
                    ("approval_requested", "requeue"),
                    ("approval_granted", "requeue"),
                    ("step_completed", "requeue"),
                    ("step_started", "merchant-check")];
    for ((event, step), (want_event, want_step)) in tail.iter().zip(expected) {
        assert_eq!(event, want_event);
        assert_eq!(step.as_deref(), Some(want_step));
    }
}

#[test]
fn full_run_completes_and_undo_rerun_reproduces_statuses() {
    let registry = default_registry().unwrap();
    let mut m = machine(&registry);
    while m.current_index().is_some() {
        run_current(&mut m);
    }
    let finished = m.flow().statuses();
    assert!(m.flow().completed_at.is_some());

    let rewound = m.undo(2, Metadata::new()).unwrap();
    assert_eq!(rewound, ["processing-window", "requeue", "merchant-check", "summary"]);
    assert!(m.flow().completed_at.is_none());
    m.replan(2).unwrap();
    while m.current_index().is_some() {
        run_current(&mut m);
    }
    assert_eq!(m.flow().statuses(), finished);
    m.flow().check_invariants().unwrap();

    let completions = m.flow().ledger.iter().filter(|e| e.event == LedgerEvent::FlowCompleted).count();
    assert_eq!(completions, 2);
}

#[test]
fn reset_preserves_mode() {
    let registry = default_registry().unwrap();
    let mut m = FlowMachine::from_registry(&registry, MISSING_TRANSFER, FlowMode::Autoplay).unwrap();
    run_current(&mut m);
    m.reset(&registry, Metadata::new()).unwrap();
    assert_eq!(m.flow().mode, FlowMode::Autoplay);
    assert_eq!(m.flow().ledger.len(), 1);
    assert_eq!(m.flow().ledger.read_since_seq(0)[0].event, LedgerEvent::FlowReset);
    assert_eq!(m.current_index(), Some(0));
    assert!(registry.definition(MISSING_TRANSFER).unwrap().matches_shape(m.flow()).is_ok());
}
