//! Solving a calibration line for the unknown concentration.

use crate::core::{CalibrationError, CalibrationResult, RegressionModel};

/// Concentration `x` at which `model` predicts absorbance `y`.
///
/// # Errors
///
/// [`CalibrationError::UndefinedInverse`] when the line is flat (or so close
/// to flat that the quotient overflows), and
/// [`CalibrationError::MalformedRequest`] when `y` is not finite.
pub fn predict_x(model: &RegressionModel, y: f64) -> CalibrationResult<f64> {
    if !y.is_finite() {
        return Err(CalibrationError::malformed("measured y must be a finite number"));
    }
    if model.slope() == 0.0 {
        return Err(CalibrationError::UndefinedInverse);
    }

    let x = (y - model.intercept()) / model.slope();
    if x.is_finite() {
        Ok(x)
    } else {
        Err(CalibrationError::UndefinedInverse)
    }
}

impl RegressionModel {
    /// See [`predict_x`].
    pub fn predict_x(&self, y: f64) -> CalibrationResult<f64> {
        predict_x(self, y)
    }
}
