use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use webhook_ledger::config::{Cli, Settings};
use webhook_ledger::gate::{GitRefMarkerStore, IdempotencyGate, LocalMarkerStore, MarkerStore};
use webhook_ledger::ledger::{
    BranchSubstrate, DetachedSubstrate, GitBranchSubstrate, LedgerAppender, LedgerWorkspace,
};
use webhook_ledger::pipeline::{Pipeline, ReportTargets, publish};
use webhook_ledger::types::ExecutionMode;

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "webhook_ledger=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "webhook processing failed");
            if std::env::var_os("GITHUB_ACTIONS").is_some() {
                // Surfaces the failure as a workflow annotation.
                println!("::error::{e:#}");
            }
            ExitCode::FAILURE
        }
    }
}

fn run() -> anyhow::Result<()> {
    let settings = Settings::from_cli(Cli::parse())?;
    let workspace = LedgerWorkspace::new(&settings.workspace);
    let local = LocalMarkerStore::new(workspace.markers_dir());

    tracing::info!(
        provider = %settings.request.provider,
        branch = %settings.request.ledger_branch,
        mode = %settings.mode,
        workspace = %settings.workspace.display(),
        "starting"
    );

    match settings.mode {
        ExecutionMode::LocalOnly => {
            let gate = IdempotencyGate::local_only(local);
            let substrate = DetachedSubstrate::new(workspace.checkout_dir());
            process(&settings, gate, substrate, workspace)
        }
        ExecutionMode::Shared => {
            let url = settings
                .resolve_remote_url()
                .context("cannot determine the shared remote")?;

            let shared: Option<Box<dyn MarkerStore>> = match GitRefMarkerStore::open(
                &workspace.marker_scratch_dir(),
                &url,
                settings.identity.clone(),
            ) {
                Ok(store) => Some(Box::new(store)),
                Err(e) => {
                    tracing::warn!(error = %e, "shared marker store unavailable");
                    None
                }
            };
            let gate = IdempotencyGate::new(ExecutionMode::Shared, shared, local);
            let substrate = GitBranchSubstrate::open(&workspace.checkout_dir(), &url)
                .context("failed to prepare ledger checkout")?;
            process(&settings, gate, substrate, workspace)
        }
    }
}

fn process<S: BranchSubstrate>(
    settings: &Settings,
    gate: IdempotencyGate,
    substrate: S,
    workspace: LedgerWorkspace,
) -> anyhow::Result<()> {
    let appender = LedgerAppender::new(substrate, workspace, settings.mode)
        .with_retry(settings.retry)
        .with_identity(settings.identity.clone());
    let mut pipeline = Pipeline::new(gate, appender);

    let receipt = pipeline.process(&settings.request)?;
    publish(&receipt, &ReportTargets::from_env()).context("failed to write step outputs")?;
    Ok(())
}
