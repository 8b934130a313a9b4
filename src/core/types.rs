use serde::{Deserialize, Serialize};

use super::error::{CalibrationError, CalibrationResult};

/// One calibration standard: concentration `x` and measured absorbance `y`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub x: f64,
    pub y: f64,
}

impl Sample {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Build a sample from optional fields, dropping it when either side is
    /// missing or not a finite number.
    pub fn from_optional(x: Option<f64>, y: Option<f64>) -> Option<Self> {
        match (x, y) {
            (Some(x), Some(y)) => Some(Self::new(x, y)).filter(Sample::is_valid),
            _ => None,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Keep only the samples a fit can use.
pub fn collect_samples<I>(samples: I) -> Vec<Sample>
where
    I: IntoIterator<Item = Sample>,
{
    samples.into_iter().filter(Sample::is_valid).collect()
}

/// Fitted calibration line `y = m·x + b` with its coefficient of
/// determination.
///
/// Values are produced by [`crate::regression::fit`] and never change; a new
/// fit yields a new model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegressionModel {
    m: f64,
    b: f64,
    r2: f64,
}

impl RegressionModel {
    pub(crate) fn new(m: f64, b: f64, r2: f64) -> Self {
        Self { m, b, r2 }
    }

    /// Rebuild a model received from outside the process (HTTP body, CLI
    /// flags). All parts must be finite and `r2` must lie in `[0, 1]`.
    pub fn from_parts(m: f64, b: f64, r2: f64) -> CalibrationResult<Self> {
        for (name, value) in [("m", m), ("b", b), ("r2", r2)] {
            if !value.is_finite() {
                return Err(CalibrationError::malformed(format!(
                    "model.{} must be a finite number",
                    name
                )));
            }
        }
        if !(0.0..=1.0).contains(&r2) {
            return Err(CalibrationError::malformed(
                "model.r2 must lie between 0 and 1",
            ));
        }
        Ok(Self::new(m, b, r2))
    }

    pub fn slope(&self) -> f64 {
        self.m
    }

    pub fn intercept(&self) -> f64 {
        self.b
    }

    pub fn r_squared(&self) -> f64 {
        self.r2
    }

    /// Absorbance the line predicts at concentration `x`.
    pub fn predict_y(&self, x: f64) -> f64 {
        self.m * x + self.b
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_optional_drops_incomplete_rows() {
        assert_eq!(
            Sample::from_optional(Some(1.0), Some(0.25)),
            Some(Sample::new(1.0, 0.25))
        );
        assert_eq!(Sample::from_optional(None, Some(0.25)), None);
        assert_eq!(Sample::from_optional(Some(1.0), Some(f64::NAN)), None);
    }

    #[test]
    fn test_collect_samples_filters_non_finite() {
        let samples = collect_samples(vec![
            Sample::new(1.0, 2.0),
            Sample::new(f64::INFINITY, 2.0),
            Sample::new(2.0, 4.0),
        ]);
        assert_eq!(samples, vec![Sample::new(1.0, 2.0), Sample::new(2.0, 4.0)]);
    }

    #[test]
    fn test_from_parts_validation() {
        assert!(RegressionModel::from_parts(2.0, 0.5, 0.99).is_ok());
        assert!(matches!(
            RegressionModel::from_parts(f64::NAN, 0.0, 0.5),
            Err(CalibrationError::MalformedRequest(_))
        ));
        assert!(matches!(
            RegressionModel::from_parts(1.0, 0.0, 1.5),
            Err(CalibrationError::MalformedRequest(_))
        ));
    }

    #[test]
    fn test_model_serializes_with_short_field_names() {
        let model = RegressionModel::new(2.0, 0.0, 1.0);
        let json = serde_json::to_value(model).unwrap();
        assert_eq!(json, serde_json::json!({ "m": 2.0, "b": 0.0, "r2": 1.0 }));
    }
}
