//! Text and CSV renderings of calibration data and fits.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::io::{Read, Write};
use tracing::warn;

use crate::core::{CalibrationError, CalibrationResult, RegressionModel, Sample};

pub const X_HEADER: &str = "Concentration (x)";
pub const Y_HEADER: &str = "Absorbance (y)";

/// Samples read from a CSV file plus the number of rows that were skipped
/// for missing or non-numeric fields.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleImport {
    pub samples: Vec<Sample>,
    pub skipped: usize,
}

/// `y = 0.0748x + 0.0018` style rendering of a fitted line.
pub fn equation(model: &RegressionModel) -> String {
    let b = model.intercept();
    let sign = if b.is_sign_negative() && b != 0.0 { '-' } else { '+' };
    format!("y = {:.4}x {} {:.4}", model.slope(), sign, b.abs())
}

/// End points of the fitted line across the sampled concentration range,
/// for drawing it over a scatter plot.
pub fn line_endpoints(samples: &[Sample], model: &RegressionModel) -> Option<[Sample; 2]> {
    let mut xs = samples.iter().map(|s| s.x).filter(|x| x.is_finite());
    let first = xs.next()?;
    let (min_x, max_x) = xs.fold((first, first), |(lo, hi), x| (lo.min(x), hi.max(x)));

    Some([
        Sample::new(min_x, model.predict_y(min_x)),
        Sample::new(max_x, model.predict_y(max_x)),
    ])
}

/// Read `x,y` pairs from CSV. A leading header row is optional; rows with a
/// blank or non-numeric field are skipped and counted.
pub fn read_samples_csv<R: Read>(reader: R) -> CalibrationResult<SampleImport> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut samples = Vec::new();
    let mut skipped = 0;

    for (index, record) in reader.records().enumerate() {
        let record = record.map_err(|e| {
            CalibrationError::malformed(format!("unreadable CSV row {}: {}", index + 1, e))
        })?;

        let x = record.get(0).unwrap_or_default();
        let y = record.get(1).unwrap_or_default();
        if x.is_empty() || y.is_empty() {
            // Half-filled rows are expected while standards are being entered
            continue;
        }

        match Sample::from_optional(x.parse().ok(), y.parse().ok()) {
            Some(sample) => samples.push(sample),
            None if index == 0 => {}
            None => {
                warn!(row = index + 1, x, y, "Skipping non-numeric sample row");
                skipped += 1;
            }
        }
    }

    Ok(SampleImport { samples, skipped })
}

pub fn write_samples_csv<W: Write>(writer: W, samples: &[Sample]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(writer);
    writer.write_record([X_HEADER, Y_HEADER])?;
    for sample in samples {
        writer.write_record([sample.x.to_string(), sample.y.to_string()])?;
    }
    writer.flush().context("Failed to flush sample CSV")?;
    Ok(())
}

/// Sample table followed by a regression summary block, laid out the way a
/// spreadsheet export presents it.
pub fn write_report_csv<W: Write>(
    writer: W,
    samples: &[Sample],
    model: &RegressionModel,
) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .from_writer(writer);

    writer.write_record([X_HEADER, Y_HEADER])?;
    for sample in samples {
        writer.write_record([sample.x.to_string(), sample.y.to_string()])?;
    }

    writer.write_record([""])?;
    writer.write_record(["Regression Analysis"])?;
    writer.write_record(["Equation".to_string(), equation(model)])?;
    writer.write_record(["Slope (m)".to_string(), model.slope().to_string()])?;
    writer.write_record(["Intercept (b)".to_string(), model.intercept().to_string()])?;
    writer.write_record(["R-Squared".to_string(), model.r_squared().to_string()])?;
    writer.flush().context("Failed to flush report CSV")?;
    Ok(())
}

/// Plain-text report: header, model summary and the sample table.
pub fn render_summary(
    model: &RegressionModel,
    samples: &[Sample],
    generated_at: DateTime<Utc>,
) -> String {
    let mut out = String::new();
    out.push_str("Spectral Linear Regression Report\n");
    out.push_str(&format!(
        "Generated on: {}\n\n",
        generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    out.push_str("Regression Model Summary:\n");
    out.push_str(&format!("  Equation:      {}\n", equation(model)));
    out.push_str(&format!("  Slope (m):     {:.6}\n", model.slope()));
    out.push_str(&format!("  Intercept (b): {:.6}\n", model.intercept()));
    out.push_str(&format!("  R-Squared:     {:.6}\n", model.r_squared()));

    if !samples.is_empty() {
        out.push_str(&format!("\n{:>20}  {:>20}\n", X_HEADER, Y_HEADER));
        for sample in samples {
            out.push_str(&format!("{:>20}  {:>20}\n", sample.x, sample.y));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regression::fit;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn model(m: f64, b: f64) -> RegressionModel {
        RegressionModel::from_parts(m, b, 1.0).unwrap()
    }

    #[test]
    fn test_equation_signs() {
        assert_eq!(equation(&model(2.0, 0.0)), "y = 2.0000x + 0.0000");
        assert_eq!(equation(&model(0.07481, -0.0125)), "y = 0.0748x - 0.0125");
        assert_eq!(equation(&model(1.0, -0.0)), "y = 1.0000x + 0.0000");
    }

    #[test]
    fn test_line_endpoints_span_sample_range() {
        let samples = vec![Sample::new(4.0, 8.0), Sample::new(1.0, 2.0), Sample::new(9.0, 18.0)];
        let line = line_endpoints(&samples, &model(2.0, 0.0)).unwrap();

        assert_eq!(line, [Sample::new(1.0, 2.0), Sample::new(9.0, 18.0)]);
        assert_eq!(line_endpoints(&[], &model(2.0, 0.0)), None);
    }

    #[test]
    fn test_read_samples_with_header_and_gaps() {
        let input = "Concentration,Absorbance\n1,0.11\n2,\n3,0.31\nabc,0.5\n 4 , 0.42 \n";
        let import = read_samples_csv(input.as_bytes()).unwrap();

        assert_eq!(
            import.samples,
            vec![
                Sample::new(1.0, 0.11),
                Sample::new(3.0, 0.31),
                Sample::new(4.0, 0.42),
            ]
        );
        assert_eq!(import.skipped, 1);
    }

    #[test]
    fn test_read_samples_without_header() {
        let import = read_samples_csv("0.5,0.05\n1.0,0.1\n".as_bytes()).unwrap();
        assert_eq!(import.samples.len(), 2);
        assert_eq!(import.skipped, 0);
    }

    #[test]
    fn test_sample_csv_round_trip_keeps_values() {
        let samples = vec![Sample::new(0.25, 0.031), Sample::new(1.5, 0.188)];
        let mut buffer = Vec::new();
        write_samples_csv(&mut buffer, &samples).unwrap();

        let text = String::from_utf8(buffer).unwrap();
        assert!(text.starts_with("Concentration (x),Absorbance (y)\n"));
        assert_eq!(read_samples_csv(text.as_bytes()).unwrap().samples, samples);
    }

    #[test]
    fn test_report_csv_layout() {
        let samples = vec![Sample::new(1.0, 2.0), Sample::new(2.0, 4.0), Sample::new(3.0, 6.0)];
        let fitted = fit(&samples).unwrap();
        let mut buffer = Vec::new();
        write_report_csv(&mut buffer, &samples, &fitted).unwrap();

        let text = String::from_utf8(buffer).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            &lines[..4],
            &["Concentration (x),Absorbance (y)", "1,2", "2,4", "3,6"]
        );
        assert_eq!(
            &lines[5..],
            &[
                "Regression Analysis",
                "Equation,y = 2.0000x + 0.0000",
                "Slope (m),2",
                "Intercept (b),0",
                "R-Squared,1",
            ]
        );
    }

    #[test]
    fn test_render_summary() {
        let generated_at = Utc.with_ymd_and_hms(2026, 3, 14, 9, 30, 0).unwrap();
        let text = render_summary(&model(2.0, 0.5), &[Sample::new(1.0, 2.5)], generated_at);

        assert!(text.contains("Generated on: 2026-03-14 09:30:00 UTC"));
        assert!(text.contains("Equation:      y = 2.0000x + 0.5000"));
        assert!(text.contains("R-Squared:     1.000000"));
    }
}
