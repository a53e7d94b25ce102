//! Property tests: any sequence of commands keeps the flow invariants, and a
//! rejected command never mutates the flow or its ledger.

use agent_adapters::{default_registry, MISSING_TRANSFER};
use agent_core::{FlowMachine, FlowMode, Metadata, StaticCaseRegistry};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Command {
    Start,
    Resolve,
    RequestApproval,
    RequestExternal,
    Grant,
    Decline,
    Pause,
    Resume,
    Undo(usize),
    Replan,
    Reset,
}

fn arb_command() -> impl Strategy<Value = Command> {
    prop_oneof![
        3 => Just(Command::Start),
        3 => Just(Command::Resolve),
        2 => Just(Command::RequestApproval),
        2 => Just(Command::RequestExternal),
        2 => Just(Command::Grant),
        1 => Just(Command::Decline),
        1 => Just(Command::Pause),
        1 => Just(Command::Resume),
        1 => (0usize..8).prop_map(Command::Undo),
        2 => Just(Command::Replan),
        1 => Just(Command::Reset),
    ]
}

fn apply(m: &mut FlowMachine, registry: &StaticCaseRegistry, command: &Command) -> bool {
    // commands target the current step; on a finished flow index 0 exercises the rejection path
    let index = m.current_index().unwrap_or(0);
    let result = match command {
        Command::Start => m.start(index),
        Command::Resolve => m.resolve_automatic(index),
        Command::RequestApproval => m.request_approval(index),
        Command::RequestExternal => m.request_external_action(index),
        Command::Grant => m.grant(index, Metadata::new()),
        Command::Decline => m.decline(index, Metadata::new()),
        Command::Pause => m.pause(index, Metadata::new()),
        Command::Resume => m.resume(index, Metadata::new()),
        Command::Undo(target) => m.undo(*target, Metadata::new()).map(|_| ()),
        Command::Replan => m.replan(index),
        Command::Reset => m.reset(registry, Metadata::new()),
    };
    result.is_ok()
}

proptest! {
    #[test]
    fn random_commands_preserve_invariants(commands in prop::collection::vec(arb_command(), 1..120)) {
        let registry = default_registry().unwrap();
        let mut m = FlowMachine::from_registry(&registry, MISSING_TRANSFER, FlowMode::Interactive).unwrap();

        for command in &commands {
            let before = m.flow().clone();
            let applied = apply(&mut m, &registry, command);
            if !applied {
                prop_assert_eq!(m.flow(), &before);
            }
            prop_assert!(m.flow().check_invariants().is_ok(), "after {:?}: {:?}", command, m.flow().statuses());
            prop_assert_eq!(m.flow().completed_at.is_some(), m.flow().is_complete());
            let active = m.flow().statuses().iter().filter(|s| s.is_active()).count();
            prop_assert!(active <= 1);
        }
    }
}
