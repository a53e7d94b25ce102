//! REPL de comandos del operador sobre un `Scheduler`.
//!
//! Las notificaciones del scheduler se imprimen desde una tarea aparte, así
//! los avances por timer aparecen mientras se espera una línea.
use std::fs;
use std::path::PathBuf;

use agent_core::FlowMode;
use agentflow_rust::Scheduler;
use anyhow::{anyhow, bail};
use log::debug;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;

use crate::render;

pub const HELP: &str = "\
commands:
  status                  show steps
  approve <step>          grant a pending approval
  decline <step>          decline a pending approval (pauses the flow)
  confirm <step>          confirm a pending merchant action
  pause | resume
  undo <step>             revert a completed step and everything after it
  reset                   start over
  mode <interactive|autoplay>
  speed <multiplier>
  seek <step>             look back at a reached step (interactive)
  explain <step>          why the agent runs this step
  ledger                  print the full ledger
  export [file]           print or save the transcript
  quit";

#[derive(Debug, Clone, PartialEq)]
pub enum ReplCommand {
    Status,
    Approve(String),
    Decline(String),
    Confirm(String),
    Pause,
    Resume,
    Undo(String),
    Reset,
    Mode(FlowMode),
    Speed(f64),
    Seek(String),
    Explain(String),
    Ledger,
    Export(Option<PathBuf>),
    Help,
    Quit,
}

impl ReplCommand {
    /// `Ok(None)` para líneas vacías.
    pub fn parse(line: &str) -> anyhow::Result<Option<Self>> {
        let mut words = line.split_whitespace();
        let Some(head) = words.next() else {
            return Ok(None);
        };
        let arg = words.next();
        if words.next().is_some() {
            bail!("too many arguments for '{head}'");
        }
        let step = |name: &str| -> anyhow::Result<String> {
            arg.map(str::to_string).ok_or_else(|| anyhow!("usage: {name} <step>"))
        };
        let command = match head.to_ascii_lowercase().as_str() {
            "status" | "s" => Self::Status,
            "approve" => Self::Approve(step("approve")?),
            "decline" => Self::Decline(step("decline")?),
            "confirm" => Self::Confirm(step("confirm")?),
            "pause" => Self::Pause,
            "resume" => Self::Resume,
            "undo" => Self::Undo(step("undo")?),
            "reset" => Self::Reset,
            "mode" => Self::Mode(match arg {
                                     Some("interactive") => FlowMode::Interactive,
                                     Some("autoplay") => FlowMode::Autoplay,
                                     _ => bail!("usage: mode <interactive|autoplay>"),
                                 }),
            "speed" => {
                let raw = arg.ok_or_else(|| anyhow!("usage: speed <multiplier>"))?;
                Self::Speed(raw.trim_end_matches('x').parse().map_err(|_| anyhow!("not a number: {raw}"))?)
            }
            "seek" => Self::Seek(step("seek")?),
            "explain" | "why" => Self::Explain(step("explain")?),
            "ledger" | "log" => Self::Ledger,
            "export" => Self::Export(arg.map(PathBuf::from)),
            "help" | "?" => Self::Help,
            "quit" | "exit" | "q" => Self::Quit,
            other => bail!("unknown command '{other}' (try 'help')"),
        };
        Ok(Some(command))
    }
}

/// Aplica un comando. Lo devuelto se imprime; las entradas nuevas del ledger
/// llegan por las notificaciones.
pub fn execute(scheduler: &Scheduler, command: ReplCommand) -> anyhow::Result<String> {
    debug!("repl command {:?}", command);
    let out = match command {
        ReplCommand::Status => render::board(&scheduler.view()),
        ReplCommand::Approve(step) => {
            scheduler.approve(&step)?;
            String::new()
        }
        ReplCommand::Decline(step) => {
            scheduler.decline(&step)?;
            "declined; 'resume' to try again".to_string()
        }
        ReplCommand::Confirm(step) => {
            scheduler.confirm_external_action(&step)?;
            String::new()
        }
        ReplCommand::Pause => {
            scheduler.pause()?;
            "paused".to_string()
        }
        ReplCommand::Resume => {
            scheduler.resume()?;
            String::new()
        }
        ReplCommand::Undo(step) => {
            let rewound = scheduler.undo(&step)?;
            if rewound.is_empty() {
                format!("undid {step}")
            } else {
                format!("undid {step}, rewound {}", rewound.join(", "))
            }
        }
        ReplCommand::Reset => {
            scheduler.reset()?;
            "new flow ready; 'resume' to start".to_string()
        }
        ReplCommand::Mode(mode) => match scheduler.set_mode(mode)? {
            true => format!("mode {mode}"),
            false => format!("already {mode}"),
        },
        ReplCommand::Speed(multiplier) => {
            scheduler.set_speed(multiplier)?;
            format!("speed {multiplier}x")
        }
        ReplCommand::Seek(step) => {
            scheduler.seek_to(&step)?;
            render::board(&scheduler.view())
        }
        ReplCommand::Explain(step) => scheduler.explain(&step)?
                                               .unwrap_or_else(|| format!("no explanation for {step}")),
        ReplCommand::Ledger => scheduler.ledger().iter().map(render::entry_line).collect::<Vec<_>>().join("\n"),
        ReplCommand::Export(path) => {
            let json = scheduler.export().to_json_pretty()?;
            match path {
                Some(path) => {
                    fs::write(&path, json)?;
                    format!("transcript written to {}", path.display())
                }
                None => json,
            }
        }
        ReplCommand::Help => HELP.to_string(),
        ReplCommand::Quit => String::new(),
    };
    Ok(out)
}

pub async fn run(scheduler: Scheduler) -> anyhow::Result<()> {
    let mut updates = scheduler.subscribe();
    println!("{}", render::board(&scheduler.view()));
    println!("type 'help' for commands");

    let printer = tokio::spawn(async move {
        loop {
            match updates.recv().await {
                Ok(notification) => {
                    for entry in &notification.entries {
                        println!("{}", render::entry_line(entry));
                    }
                }
                Err(RecvError::Lagged(skipped)) => println!("... {skipped} updates skipped"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match ReplCommand::parse(&line) {
            Ok(None) => {}
            Ok(Some(ReplCommand::Quit)) => break,
            Ok(Some(command)) => match execute(&scheduler, command) {
                Ok(out) if out.is_empty() => {}
                Ok(out) => println!("{out}"),
                Err(err) => eprintln!("! {err}"),
            },
            Err(err) => eprintln!("? {err}"),
        }
    }

    printer.abort();
    scheduler.shutdown();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use agent_adapters::{default_registry, MISSING_TRANSFER};
    use agent_core::StepStatus;

    #[test]
    fn parses_commands_and_arguments() {
        assert_eq!(ReplCommand::parse("  ").unwrap(), None);
        assert_eq!(ReplCommand::parse("approve requeue").unwrap(), Some(ReplCommand::Approve("requeue".into())));
        assert_eq!(ReplCommand::parse("MODE autoplay").unwrap(), Some(ReplCommand::Mode(FlowMode::Autoplay)));
        assert_eq!(ReplCommand::parse("speed 2x").unwrap(), Some(ReplCommand::Speed(2.0)));
        assert_eq!(ReplCommand::parse("export").unwrap(), Some(ReplCommand::Export(None)));
        assert_eq!(ReplCommand::parse("q").unwrap(), Some(ReplCommand::Quit));
    }

    #[test]
    fn rejects_malformed_lines() {
        assert!(ReplCommand::parse("approve").is_err());
        assert!(ReplCommand::parse("undo a b").is_err());
        assert!(ReplCommand::parse("mode turbo").is_err());
        assert!(ReplCommand::parse("speed fast").is_err());
        assert!(ReplCommand::parse("dance").is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn execute_drives_scheduler() {
        let scheduler = Scheduler::builder(Arc::new(default_registry().unwrap())).create(MISSING_TRANSFER)
                                                                                 .unwrap();
        tokio::time::sleep(Duration::from_millis(1600)).await;

        let out = execute(&scheduler, ReplCommand::Undo("plan".into())).unwrap();
        assert_eq!(out, "undid plan, rewound bank-link");
        assert_eq!(scheduler.view().statuses()[0], StepStatus::Undone);

        let err = execute(&scheduler, ReplCommand::Approve("requeue".into())).unwrap_err();
        assert!(err.to_string().contains("requeue"));

        let explained = execute(&scheduler, ReplCommand::Explain("summary".into())).unwrap();
        assert!(explained.contains("audit log"));
        assert_eq!(execute(&scheduler, ReplCommand::Mode(FlowMode::Interactive)).unwrap(), "already interactive");
    }
}
