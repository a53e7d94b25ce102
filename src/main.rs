//! Demo de consola: corre el caso "missing transfer" en autoplay, resolviendo
//! los gates con la política simulada, e imprime el ledger y el export.
use std::sync::Arc;

use agent_adapters::{default_registry, MISSING_TRANSFER};
use agent_core::{FlowMode, LedgerEntry};
use agentflow_rust::{Scheduler, CONFIG};
use anyhow::Context;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env antes de leer CONFIG y RUST_LOG
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
                             .init();

    let registry = Arc::new(default_registry()?);
    let mut config = CONFIG.scheduler.clone();
    config.mode = FlowMode::Autoplay;
    let scheduler = Scheduler::builder(registry).config(config)
                                                .create(MISSING_TRANSFER)
                                                .context("creating demo flow")?;
    let mut updates = scheduler.subscribe();

    println!("flow {} ({}x)", scheduler.flow_id(), scheduler.view().speed);
    let mut printed = 0;
    print_entries(&scheduler.ledger_since_seq(0), &mut printed);
    while scheduler.view().current_index.is_some() {
        match updates.recv().await {
            Ok(notification) => print_entries(&notification.entries, &mut printed),
            Err(RecvError::Lagged(skipped)) => println!("... {skipped} notifications skipped"),
            Err(RecvError::Closed) => break,
        }
    }

    println!("{}", scheduler.export().to_json_pretty()?);
    scheduler.shutdown();
    Ok(())
}

fn print_entries(entries: &[LedgerEntry], printed: &mut u64) {
    for entry in entries {
        if entry.seq < *printed {
            continue;
        }
        println!("#{:<3} {:<24} {}", entry.seq, entry.event, entry.step_id.as_deref().unwrap_or("-"));
        *printed = entry.seq + 1;
    }
}
