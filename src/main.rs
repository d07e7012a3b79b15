use clap::{Parser, Subcommand};
use roof_estimator::config::Config;
use roof_estimator::error::ErrorClass;
use roof_estimator::pdf_extract::read_report;
use roof_estimator::{ErrorOutput, EstimatePipeline};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "roof-estimator")]
#[command(about = "Extract roof measurements from aerial reports and price the job")]
struct Cli {
    /// TOML config file with [llm] and [pricing] sections
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract measurements and price the job
    Estimate {
        /// Report file (.pdf or plain text)
        report: PathBuf,
        /// Roofing category: shingle, tile or metal
        #[arg(long, default_value = "shingle")]
        category: String,
        /// Profit margin in percent
        #[arg(long, default_value_t = 20.0)]
        margin: f64,
        /// Print a priced table instead of JSON
        #[arg(long)]
        summary: bool,
    },
    /// Extract measurements only, without pricing
    Extract {
        /// Report file (.pdf or plain text)
        report: PathBuf,
    },
}

fn exit_code(class: ErrorClass) -> ExitCode {
    match class {
        ErrorClass::Client => ExitCode::from(1),
        ErrorClass::Server => ExitCode::from(2),
    }
}

fn print_json(value: &impl Serialize) -> bool {
    match serde_json::to_string_pretty(value) {
        Ok(json) => {
            println!("{json}");
            true
        }
        Err(e) => {
            error!(error = %e, "Failed to serialize output");
            false
        }
    }
}

fn fail(message: String, class: ErrorClass) -> ExitCode {
    print_json(&ErrorOutput {
        error: message,
        debug: None,
    });
    exit_code(class)
}

fn load_config(path: Option<&Path>) -> Result<Config, roof_estimator::error::ConfigError> {
    match path {
        Some(path) => {
            info!(path = %path.display(), "Loading config");
            Config::load(path)
        }
        None => Ok(Config::default()),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // init tracing; stdout is reserved for JSON output
    tracing_subscriber::fmt()
        .with_target(true)
        .with_level(true)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let pipeline = match load_config(cli.config.as_deref())
        .and_then(|cfg| EstimatePipeline::from_config(&cfg))
    {
        Ok(p) => p,
        Err(e) => {
            error!(error = %e, "Configuration error");
            return fail(e.to_string(), ErrorClass::Server);
        }
    };

    match cli.command {
        Commands::Estimate {
            report,
            category,
            margin,
            summary,
        } => {
            let text = match read_report(&report) {
                Ok(t) => t,
                Err(e) => {
                    error!(error = %e, path = %report.display(), "Cannot read report");
                    return fail(e.to_string(), ErrorClass::Client);
                }
            };

            match pipeline.estimate(&text, &category, margin).await {
                Ok(out) if summary => {
                    println!("{}", out.pricing);
                    ExitCode::SUCCESS
                }
                Ok(out) => {
                    if print_json(&out) {
                        ExitCode::SUCCESS
                    } else {
                        exit_code(ErrorClass::Server)
                    }
                }
                Err(e) => {
                    error!(error = %e, "Estimate failed");
                    print_json(&ErrorOutput::from(&e));
                    exit_code(e.class())
                }
            }
        }
        Commands::Extract { report } => {
            let text = match read_report(&report) {
                Ok(t) => t,
                Err(e) => {
                    error!(error = %e, path = %report.display(), "Cannot read report");
                    return fail(e.to_string(), ErrorClass::Client);
                }
            };

            let outcome = pipeline.extract(&text).await;
            let (filled, total) = outcome.measurements.coverage();
            info!(filled, total, is_valid = outcome.is_valid, "Extraction finished");
            if !print_json(&outcome) {
                return exit_code(ErrorClass::Server);
            }
            if outcome.is_valid {
                ExitCode::SUCCESS
            } else {
                exit_code(ErrorClass::Client)
            }
        }
    }
}
