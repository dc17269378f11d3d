//! Binary entry point for the fleet controller.

use std::process::ExitCode;

use camino::Utf8PathBuf;
use chrono::{Duration, Utc};
use clap::Parser;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use hangar::cli::{Cli, Command};
use hangar::{
    ClusterProfile, ConfigError, ControllerConfig, DirectoryError, FleetController,
    HttpAgentDirectory, OpenStackProvider, TickReport,
};

type Controller = FleetController<OpenStackProvider, HttpAgentDirectory>;

#[derive(Debug, Error)]
enum MainError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to read profile {path}: {source}")]
    ProfileRead {
        path: Utf8PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    Directory(#[from] DirectoryError),
    #[error("maintenance pass failed: {0}")]
    Tick(String),
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "controller failed");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

async fn run(cli: Cli) -> Result<(), MainError> {
    let config = ControllerConfig::load_without_cli_args()?;
    config.validate()?;
    match cli.command {
        Command::Check { profile } => {
            load_profile(&profile)?;
            tracing::info!("configuration and profile are valid");
            Ok(())
        }
        Command::Tick { profile } => {
            let policy = load_profile(&profile)?;
            let (controller, directory) = build_controller(&config, &policy);
            run_tick(&controller, &directory, &policy).await
        }
        Command::Run { profile } => {
            let policy = load_profile(&profile)?;
            let (controller, directory) = build_controller(&config, &policy);
            let period = std::time::Duration::from_secs(config.tick_interval_seconds);
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                if let Err(err) = run_tick(&controller, &directory, &policy).await {
                    tracing::warn!(error = %err, "maintenance pass failed; retrying next interval");
                }
            }
        }
    }
}

fn load_profile(path: &Utf8PathBuf) -> Result<ClusterProfile, MainError> {
    let payload = std::fs::read_to_string(path).map_err(|source| MainError::ProfileRead {
        path: path.clone(),
        source,
    })?;
    let profile = ClusterProfile::from_json(&payload)?;
    if !profile.is_configured() {
        tracing::warn!("profile has no vm_prefix; discovery and expiry will be no-ops");
    }
    Ok(profile)
}

fn build_controller(
    config: &ControllerConfig,
    profile: &ClusterProfile,
) -> (Controller, HttpAgentDirectory) {
    let provider = OpenStackProvider::new(
        config.compute_url.clone(),
        config.auth_token.clone(),
        Duration::minutes(profile.image_cache_ttl_minutes),
    );
    let directory = HttpAgentDirectory::new(config.server_url.clone());
    let controller = FleetController::new(provider, directory.clone());
    (controller, directory)
}

async fn run_tick(
    controller: &Controller,
    directory: &HttpAgentDirectory,
    profile: &ClusterProfile,
) -> Result<(), MainError> {
    let report = controller
        .tick(profile, Utc::now())
        .await
        .map_err(|err| MainError::Tick(err.to_string()))?;
    log_report(&report);
    let expired: Vec<String> = report.expired.iter().map(str::to_owned).collect();
    if !expired.is_empty() {
        directory.disable_agents(&expired).await?;
        tracing::info!(
            count = expired.len(),
            "asked the control plane to drain expired agents",
        );
    }
    // Reclaimed servers can leave stale directory records behind.
    let reclaimed: Vec<String> = report
        .terminated_abandoned
        .iter()
        .map(str::to_owned)
        .collect();
    if !reclaimed.is_empty() {
        directory.delete_agents(&reclaimed).await?;
        tracing::info!(
            count = reclaimed.len(),
            "removed directory records for reclaimed servers",
        );
    }
    Ok(())
}

fn log_report(report: &TickReport) {
    tracing::info!(
        refresh = ?report.refresh,
        sweep = ?report.sweep,
        expired = report.expired.len(),
        terminated_abandoned = report.terminated_abandoned.len(),
        "maintenance pass complete",
    );
}
