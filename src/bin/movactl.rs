//! Thin demonstration binary: load one envelope file, run it, print the
//! resulting context as JSON. Not the CLI surface a real transport layer
//! would expose (§1 Non-goals) — just enough to exercise the library
//! end to end.

use std::env;
use std::sync::Arc;

use anyhow::{Context, Result};
use mova_engine::budget::BudgetManager;
use mova_engine::config::EngineConfig;
use mova_engine::executor::Envelope;
use mova_engine::WorkflowExecutor;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let path = env::args()
        .nth(1)
        .context("usage: movactl <envelope.json>")?;

    let raw = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("reading envelope file '{path}'"))?;
    let envelope: Envelope =
        serde_json::from_str(&raw).with_context(|| format!("parsing envelope file '{path}'"))?;

    let config = EngineConfig::from_env();
    let (budgets, _violations_rx) = BudgetManager::new(64);
    let executor = WorkflowExecutor::new(config, Arc::new(budgets));

    info!(workflow = %envelope.intent.name, "running envelope");
    let ctx = executor.execute(envelope, None).await;

    println!("{}", serde_json::to_string_pretty(&ctx)?);
    Ok(())
}
