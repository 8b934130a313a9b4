use anyhow::{Context, Result};
use chrono::Utc;
use console::style;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::api::{APIServerConfig, CalibrationServer};
use crate::config::Settings;
use crate::core::{RegressionModel, Sample};
use crate::regression;
use crate::report;
use crate::storage::{HistoryStore, JsonFileStore, MemoryStore};

/// Options for the `fit` command
#[derive(Debug, Clone)]
pub struct FitOptions {
    pub input: PathBuf,
    pub unknown_y: Option<f64>,
    pub save: bool,
    pub report: Option<PathBuf>,
}

/// Open the history file configured in `settings`.
pub async fn open_store(settings: &Settings) -> Result<JsonFileStore> {
    let history = &settings.history;
    JsonFileStore::open(
        &history.data_dir,
        &history.file_name,
        history.capacity,
        history.retry.clone(),
    )
    .await
    .with_context(|| {
        format!(
            "Failed to open history store in {}",
            history.data_dir.display()
        )
    })
}

pub async fn serve(settings: &Settings, ephemeral: bool) -> Result<()> {
    let store: Arc<dyn HistoryStore> = if ephemeral {
        info!("Serving with an in-memory history; fits will not survive a restart");
        Arc::new(MemoryStore::new(settings.history.capacity))
    } else {
        let store = open_store(settings).await?;
        info!(path = %store.path().display(), "Using history file");
        Arc::new(store)
    };

    let server = CalibrationServer::new(APIServerConfig::from(&settings.server), store);
    server.start().await
}

/// Read calibration standards from a CSV file.
pub fn load_samples(path: &Path) -> Result<Vec<Sample>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open sample file {}", path.display()))?;
    let import = report::read_samples_csv(BufReader::new(file))
        .with_context(|| format!("Failed to read samples from {}", path.display()))?;

    if import.skipped > 0 {
        warn!(
            skipped = import.skipped,
            "Some rows had non-numeric values and were ignored"
        );
    }
    Ok(import.samples)
}

pub async fn fit(settings: &Settings, options: FitOptions) -> Result<()> {
    crate::track_performance!("cli_fit");
    let samples = load_samples(&options.input)?;
    let model = regression::fit(&samples)
        .with_context(|| format!("Cannot fit {}", options.input.display()))?;

    print!("{}", report::render_summary(&model, &samples, Utc::now()));

    if let Some(y) = options.unknown_y {
        let x = model.predict_x(y)?;
        println!(
            "\n{} y = {} -> x = {}",
            style("Unknown sample:").bold(),
            y,
            style(format!("{:.6}", x)).green()
        );
    }

    if let Some(path) = &options.report {
        let file = File::create(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        report::write_report_csv(BufWriter::new(file), &samples, &model)?;
        println!("\nReport written to {}", style(path.display()).cyan());
    }

    if options.save {
        let store = open_store(settings).await?;
        let entry = store.append(model, samples.len()).await?;
        println!(
            "\n{} (id {})",
            style("Analysis saved to history").bold().green(),
            entry.id
        );
    }

    Ok(())
}

pub fn predict(slope: f64, intercept: f64, y: f64) -> Result<()> {
    let model = RegressionModel::from_parts(slope, intercept, 0.0)?;
    let x = model.predict_x(y)?;
    println!("{:.6}", x);
    Ok(())
}

pub async fn history(settings: &Settings, limit: Option<usize>, json: bool) -> Result<()> {
    let store = open_store(settings).await?;
    let mut entries = store.list().await?;
    if let Some(limit) = limit {
        entries.truncate(limit);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("No saved analyses.");
        return Ok(());
    }

    for entry in &entries {
        println!(
            "{}  {}  m={}  n={}  {}",
            style(format!("R² = {:.4}", entry.model.r_squared())).bold(),
            style(entry.timestamp.format("%Y-%m-%d %H:%M:%S")).dim(),
            style(format!("{:.4}", entry.model.slope())).blue(),
            entry.sample_count,
            report::equation(&entry.model),
        );
    }
    Ok(())
}

/// Write a CSV export of `input` to `output`, or to stdout when no output is
/// given.
pub fn export(input: &Path, output: Option<&Path>, samples_only: bool) -> Result<()> {
    let samples = load_samples(input)?;

    let writer: Box<dyn Write> = match output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("Failed to create {}", path.display()))?,
        )),
        None => Box::new(io::stdout().lock()),
    };

    if samples_only {
        report::write_samples_csv(writer, &samples)
    } else {
        let model = regression::fit(&samples)?;
        report::write_report_csv(writer, &samples, &model)
    }
}
