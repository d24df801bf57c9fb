//! # surge CLI
//!
//! Command-line front end for the surge load-generation harness.
//!
//! ## Usage
//!
//! ```bash
//! # Run a traffic plan
//! surge run --config plan.toml --base-url http://localhost:3000
//!
//! # Validate a plan without generating traffic
//! surge check --config plan.toml
//!
//! # Run the bundled student-API demo plan
//! surge demo --base-url http://localhost:3000 --output report.json
//! ```
//!
//! The process exits 0 iff every threshold passed.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use surge_core::{RunPlan, SurgeError};
use surge_metrics::RunReport;
use surge_runner::{student_api_plan, Runner};

#[derive(Parser)]
#[command(name = "surge")]
#[command(version = "0.1.0")]
#[command(about = "Scenario-driven HTTP load-generation harness", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a traffic plan
    Run {
        /// Plan file (TOML)
        #[arg(short, long, default_value = "plan.toml")]
        config: PathBuf,

        /// Override the plan's base URL
        #[arg(short, long, env = "BASE_URL")]
        base_url: Option<String>,

        /// Write the JSON run report here
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Validate a plan and exit without generating traffic
    Check {
        /// Plan file (TOML)
        #[arg(short, long, default_value = "plan.toml")]
        config: PathBuf,
    },

    /// Run the bundled student-API demo plan
    Demo {
        /// Target base URL
        #[arg(short, long, env = "BASE_URL", default_value = "http://localhost:3000")]
        base_url: String,

        /// Write the JSON run report here
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    match cli.command {
        Commands::Run {
            config,
            base_url,
            output,
        } => {
            let mut plan = load_plan(&config)?;
            if let Some(base_url) = base_url {
                plan.base_url = base_url;
            }
            let report = execute(plan).await?;
            finish(report, output)
        }
        Commands::Check { config } => {
            let plan = load_plan(&config)?;
            let thresholds = Runner::new(plan).validate()?;
            info!(thresholds = thresholds.len(), "plan is valid");
            Ok(())
        }
        Commands::Demo { base_url, output } => {
            let report = execute(student_api_plan(&base_url)).await?;
            finish(report, output)
        }
    }
}

fn load_plan(path: &PathBuf) -> anyhow::Result<RunPlan> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| SurgeError::PlanFile(format!("{}: {e}", path.display())))?;
    let plan = toml::from_str(&text)
        .map_err(|e| SurgeError::PlanFile(format!("{}: {e}", path.display())))?;
    Ok(plan)
}

async fn execute(plan: RunPlan) -> anyhow::Result<RunReport> {
    let runner = Runner::new(plan);

    // Ctrl-C stops schedulers and workers; partial results still report
    let ctx = runner.context().clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping run");
            ctx.cancel();
        }
    });

    Ok(runner.run().await?)
}

fn finish(report: RunReport, output: Option<PathBuf>) -> anyhow::Result<()> {
    report.print();

    if let Some(path) = output {
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(&path, json)
            .with_context(|| format!("writing report to {}", path.display()))?;
        info!("report saved to {}", path.display());
    }

    std::process::exit(report.exit_code());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_plan_failures_are_config_errors() {
        let err = load_plan(&PathBuf::from("/no/such/plan.toml")).unwrap_err();
        let surge = err.downcast_ref::<SurgeError>().unwrap();
        assert!(matches!(surge, SurgeError::PlanFile(_)));
        assert!(surge.is_config());
    }

    #[test]
    fn test_load_plan_rejects_malformed_toml() {
        let dir = std::env::temp_dir().join("surge-cli-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("broken.toml");
        std::fs::write(&path, "scenarios = not toml").unwrap();

        let err = load_plan(&path).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SurgeError>(),
            Some(SurgeError::PlanFile(_))
        ));
    }
}
