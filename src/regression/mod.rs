//! Closed-form ordinary least squares over calibration samples.

pub mod prediction;

pub use prediction::predict_x;

use tracing::warn;

use crate::core::{CalibrationError, CalibrationResult, RegressionModel, Sample};

/// Minimum number of samples a line can be fitted through.
pub const MIN_SAMPLES: usize = 2;

/// Slack allowed on R² before it is reported as a precision problem.
const R2_SLACK: f64 = 1e-9;

/// Centred second moments the OLS formulas are built from.
///
/// Values are shifted by the first sample before the means are taken, so a
/// large common offset (absorbance baselines, concentrations in ppb) does not
/// cancel away the spread, and identical values give exact zeros.
#[derive(Debug, Clone, Copy)]
struct Moments {
    mean_x: f64,
    mean_y: f64,
    sxx: f64,
    syy: f64,
    sxy: f64,
}

impl Moments {
    fn accumulate(anchor: Sample, samples: &[Sample]) -> Self {
        let n = samples.len() as f64;

        let (sum_dx, sum_dy) = samples.iter().fold((0.0, 0.0), |(dx, dy), s| {
            (dx + (s.x - anchor.x), dy + (s.y - anchor.y))
        });
        let mean_dx = sum_dx / n;
        let mean_dy = sum_dy / n;

        let (sxx, syy, sxy) = samples.iter().fold((0.0, 0.0, 0.0), |(xx, yy, xy), s| {
            let dx = (s.x - anchor.x) - mean_dx;
            let dy = (s.y - anchor.y) - mean_dy;
            (xx + dx * dx, yy + dy * dy, xy + dx * dy)
        });

        Self {
            mean_x: anchor.x + mean_dx,
            mean_y: anchor.y + mean_dy,
            sxx,
            syy,
            sxy,
        }
    }

    /// `Sxy² / (Sxx·Syy)`, falling back to the product of square roots when
    /// the squares leave the f64 range.
    fn r_squared(&self) -> f64 {
        if self.syy <= 0.0 {
            return 0.0;
        }
        let direct = self.sxy * self.sxy / (self.sxx * self.syy);
        if direct.is_finite() && direct > 0.0 {
            return checked_r2(direct);
        }
        let r = self.sxy / self.sxx.sqrt() / self.syy.sqrt();
        checked_r2(r * r)
    }
}

/// Fit `y = m·x + b` through `samples`.
///
/// Samples must already be filtered to finite values (see
/// [`crate::core::collect_samples`]). The result does not depend on sample
/// order beyond floating-point rounding.
///
/// # Errors
///
/// - [`CalibrationError::InsufficientData`] for fewer than two samples
/// - [`CalibrationError::DegenerateInput`] when every x is the same, or the
///   x spread is too small for the slope to be representable
/// - [`CalibrationError::MalformedRequest`] when a sample is not finite
pub fn fit(samples: &[Sample]) -> CalibrationResult<RegressionModel> {
    if samples.len() < MIN_SAMPLES {
        return Err(CalibrationError::InsufficientData {
            required: MIN_SAMPLES,
            actual: samples.len(),
        });
    }
    if let Some(bad) = samples.iter().position(|s| !s.is_valid()) {
        return Err(CalibrationError::malformed(format!(
            "sample {} has a non-finite coordinate",
            bad
        )));
    }

    // Identical x values give an exact zero spread here
    let moments = Moments::accumulate(samples[0], samples);
    if !(moments.sxx > 0.0 && moments.sxx.is_finite()) {
        return Err(CalibrationError::DegenerateInput);
    }

    let m = moments.sxy / moments.sxx;
    let b = moments.mean_y - m * moments.mean_x;
    if !(m.is_finite() && b.is_finite()) {
        return Err(CalibrationError::DegenerateInput);
    }

    Ok(RegressionModel::new(m, b, moments.r_squared()))
}

fn checked_r2(r2: f64) -> f64 {
    if !r2.is_finite() {
        warn!(r2, "coefficient of determination is not finite, reporting 0");
        return 0.0;
    }
    if r2 > 1.0 + R2_SLACK {
        warn!(r2, "coefficient of determination outside [0, 1], clamping");
    }
    r2.clamp(0.0, 1.0)
}
