use anyhow::Result;
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use std::path::PathBuf;
use tracing::info;

use spectral_calibration::cli::{self, FitOptions};
use spectral_calibration::config::Settings;
use spectral_calibration::monitoring::init_telemetry;
use spectral_calibration::{log_error, track_performance};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Settings file (defaults to ./spectral.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(short, long, env = "PORT")]
        port: Option<u16>,
        /// Directory holding the history file
        #[arg(long)]
        data_dir: Option<PathBuf>,
        /// Keep history in memory only
        #[arg(long)]
        ephemeral: bool,
    },
    /// Fit a calibration line to a CSV of standards
    Fit {
        /// CSV with concentration and absorbance columns
        input: PathBuf,
        /// Absorbance of an unknown sample to solve for
        #[arg(short = 'y', long)]
        unknown_y: Option<f64>,
        /// Append the fit to the history
        #[arg(short, long)]
        save: bool,
        /// Write a CSV report to this path
        #[arg(short, long)]
        report: Option<PathBuf>,
    },
    /// Solve y = m*x + b for x
    Predict {
        #[arg(short = 'm', long, allow_hyphen_values = true)]
        slope: f64,
        #[arg(short = 'b', long, allow_hyphen_values = true)]
        intercept: f64,
        #[arg(short, long, allow_hyphen_values = true)]
        y: f64,
    },
    /// Show saved analyses, newest first
    History {
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        #[arg(long)]
        json: bool,
    },
    /// Export samples or a full report as CSV
    Export {
        input: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Only the sample table, without the regression block
        #[arg(long)]
        samples_only: bool,
    },
    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenv().ok();

    let cli = Cli::parse();

    let mut settings = match &cli.config {
        Some(path) => Settings::load(path)?,
        None => Settings::new()?,
    };

    init_telemetry(&settings.telemetry());

    let result = match cli.command {
        Commands::Serve {
            host,
            port,
            data_dir,
            ephemeral,
        } => {
            if let Some(host) = host {
                settings.server.host = host;
            }
            if let Some(port) = port {
                settings.server.port = port;
            }
            if let Some(data_dir) = data_dir {
                settings.history.data_dir = data_dir;
            }
            info!("Spectral calibration server starting up...");
            cli::serve(&settings, ephemeral).await
        }
        Commands::Fit {
            input,
            unknown_y,
            save,
            report,
        } => {
            cli::fit(
                &settings,
                FitOptions {
                    input,
                    unknown_y,
                    save,
                    report,
                },
            )
            .await
        }
        Commands::Predict {
            slope,
            intercept,
            y,
        } => cli::predict(slope, intercept, y),
        Commands::History { limit, json } => {
            track_performance!("list_history");
            cli::history(&settings, limit, json).await
        }
        Commands::Export {
            input,
            output,
            samples_only,
        } => cli::export(&input, output.as_deref(), samples_only),
        Commands::Config => settings.to_toml().map(|rendered| print!("{}", rendered)),
    };

    if let Err(e) = &result {
        log_error!(&format!("{:#}", e), "Command failed");
    }
    result
}
