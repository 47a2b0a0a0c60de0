//! Command-line interface for the harvester.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;

use crate::config::HarvestConfig;
use crate::credentials::CommandSolver;
use crate::error::{HarvesterError, Result};
use crate::harvester::{harvest_to_csv, HarvestReport};

/// Transparencia Harvester - Download beneficiary records from the Portal da Transparência.
#[derive(Parser)]
#[command(name = "transparencia-harvester")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Harvest every year in the range into one CSV file per year.
    Harvest {
        /// First year to harvest (default: 2019)
        #[arg(long)]
        from_year: Option<i32>,

        /// Last year to harvest, inclusive (default: 2024)
        #[arg(long)]
        to_year: Option<i32>,

        /// State code to filter on (default: RJ)
        #[arg(short, long)]
        region: Option<String>,

        /// Records per page (default: 20000)
        #[arg(long)]
        page_size: Option<u64>,

        /// Attempts per offset before a year is abandoned (default: 3)
        #[arg(long)]
        max_attempts: Option<u32>,

        /// Output directory (default: downloads/)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Challenge solver command; receives the challenge URL and dwell
        /// seconds and prints the cookies as JSON. Split on whitespace with
        /// no quoting, so neither the path nor an argument may contain spaces
        #[arg(long, env = "HARVEST_SOLVER_CMD")]
        solver_cmd: String,
    },
}

/// Run the CLI and return the process exit code.
pub fn run() -> Result<i32> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Harvest {
            from_year,
            to_year,
            region,
            page_size,
            max_attempts,
            output,
            solver_cmd,
        } => {
            let mut config = HarvestConfig::from_env();
            if from_year.is_some() || to_year.is_some() {
                let from = from_year.unwrap_or(*config.years.start());
                let to = to_year.unwrap_or(*config.years.end());
                config = config.with_years(from..=to);
            }
            if let Some(region) = region {
                config = config.with_region(region);
            }
            if let Some(page_size) = page_size {
                config = config.with_page_size(page_size);
            }
            if let Some(max_attempts) = max_attempts {
                config = config.with_max_attempts(max_attempts);
            }
            if let Some(output) = output {
                config = config.with_output_dir(output);
            }
            harvest_command(config, &solver_cmd)
        }
    }
}

/// Execute the harvest command.
fn harvest_command(config: HarvestConfig, solver_cmd: &str) -> Result<i32> {
    // Validate before solving any challenge
    config.validate()?;
    let solver = CommandSolver::from_command_line(solver_cmd, config.challenge_dwell)?;

    println!(
        "{} {} for years {}-{}",
        style("Harvesting").bold(),
        style(&config.region).cyan(),
        style(config.years.start()).green(),
        style(config.years.end()).green()
    );
    println!();

    let pb = ProgressBar::new_spinner();
    #[allow(clippy::expect_used)] // Static template string that is guaranteed to be valid
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg} [{elapsed}]")
            .expect("valid template"),
    );
    pb.set_message("Harvesting (ctrl-c stops after the current request)...");
    pb.enable_steady_tick(std::time::Duration::from_millis(100));

    let runtime = tokio::runtime::Runtime::new()?;
    let result = runtime.block_on(run_until_ctrl_c(config.clone(), solver));
    pb.finish_and_clear();
    // After a forced stop the blocking harvest may still be running.
    runtime.shutdown_background();

    let report = result?;
    print_report(&report, &config);
    Ok(report.exit_code())
}

/// Run the blocking harvest, cancelling it on ctrl-c.
///
/// A second ctrl-c gives up on the in-flight request or solver run and
/// returns [`HarvesterError::Interrupted`] at once.
async fn run_until_ctrl_c(config: HarvestConfig, solver: CommandSolver) -> Result<HarvestReport> {
    let cancel = CancellationToken::new();
    let mut task = tokio::task::spawn_blocking({
        let cancel = cancel.clone();
        move || harvest_to_csv(&config, Box::new(solver), &cancel)
    });

    tokio::select! {
        result = &mut task => return result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("received SIGINT, stopping after the current request (ctrl-c again to force)");
            cancel.cancel();
        }
    }

    tokio::select! {
        result = &mut task => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("received second SIGINT, exiting without waiting");
            Err(HarvesterError::Interrupted)
        }
    }
}

fn print_report(report: &HarvestReport, config: &HarvestConfig) {
    for summary in &report.partitions {
        let reason = summary.reason.to_string();
        let reason = if summary.reason.is_normal() {
            style(reason).green()
        } else {
            style(reason).yellow().bold()
        };
        println!(
            "  {}  rows: {:>9}  offset: {:>9}  renewals: {:>3}  {}",
            style(&summary.partition).cyan(),
            summary.rows_written,
            summary.final_offset,
            summary.renewals,
            reason
        );
        println!(
            "           {}",
            style(config.output_path(&summary.partition).display()).dim()
        );
    }

    println!();
    println!(
        "{} {} rows in {}",
        style("Saved").green().bold(),
        report.total_rows(),
        config.output_dir.display()
    );
}
