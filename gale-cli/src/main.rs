use clap::Parser;
use gale_cli::output;
use gale_core::config::TestSpec;
use gale_core::runner::ExecutionController;
use gale_core::timing;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "gale")]
#[command(version, about = "HTTP load generator", long_about = None)]
struct Cli {
    /// JSON test configuration file
    config: PathBuf,

    /// Directory for result CSV files
    #[arg(default_value = "results")]
    output_dir: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(
            e.kind(),
            clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion
        ) =>
        {
            let _ = e.print();
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            eprintln!("{e}");
            eprintln!("usage: gale <config-path> [output-dir]");
            return ExitCode::FAILURE;
        }
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("Error executing test: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    std::fs::create_dir_all(&cli.output_dir)?;

    let spec = TestSpec::from_file(&cli.config)?;
    tracing::info!("Loaded test configuration: {}", spec.name);
    let test_name = spec.name.clone();
    let output_file = spec.metrics.output_file.clone();

    let controller = ExecutionController::new(spec)?;

    tracing::info!("Starting test execution...");
    let report = controller.execute()?;
    tracing::info!(
        "Test completed in {}",
        timing::format_duration(std::time::Duration::from_millis(report.duration_ms))
    );

    // Export failures are logged but never change the outcome of a test
    // that already ran to completion.
    let file_name =
        output_file.unwrap_or_else(|| output::result_file_name(&test_name, report.start_time_ms));
    let results_file = cli.output_dir.join(file_name);
    match output::export_report(&report, &results_file) {
        Ok(()) => tracing::info!("Results exported to {}", results_file.display()),
        Err(e) => tracing::error!("Failed to export results: {e:#}"),
    }

    output::print_summary(&report);
    Ok(())
}
