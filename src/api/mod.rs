//! HTTP boundary: wire types, error mapping and the warp server.

pub mod server;

pub use server::{APIServerConfig, CalibrationServer};

use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use tracing::error;
use warp::http::StatusCode;
use warp::{Rejection, Reply};

use crate::core::{CalibrationError, CalibrationResult, RegressionModel, Sample};
use crate::storage::HistoryEntry;

/// Model as clients send it. Every field is optional so that a missing one
/// turns into a readable 400 instead of a generic body rejection.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelPayload {
    pub m: Option<f64>,
    pub b: Option<f64>,
    pub r2: Option<f64>,
}

impl ModelPayload {
    pub fn into_model(self) -> CalibrationResult<RegressionModel> {
        let field = |value: Option<f64>, name: &str| {
            value.ok_or_else(|| {
                CalibrationError::malformed(format!("missing field `model.{}`", name))
            })
        };
        RegressionModel::from_parts(field(self.m, "m")?, field(self.b, "b")?, field(self.r2, "r2")?)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveRequest {
    pub model: Option<ModelPayload>,
    pub sample_count: Option<usize>,
}

impl SaveRequest {
    pub fn validate(self) -> CalibrationResult<(RegressionModel, usize)> {
        let model = self
            .model
            .ok_or_else(|| CalibrationError::malformed("missing field `model`"))?
            .into_model()?;
        let sample_count = self
            .sample_count
            .ok_or_else(|| CalibrationError::malformed("missing field `sampleCount`"))?;
        Ok((model, sample_count))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SaveResponse {
    pub success: bool,
    pub entry: HistoryEntry,
}

/// One row of the standards table; blank cells arrive as `null` or are
/// omitted.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct SampleRow {
    pub x: Option<f64>,
    pub y: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FitRequest {
    #[serde(default)]
    pub samples: Vec<SampleRow>,
    pub unknown_y: Option<f64>,
}

impl FitRequest {
    pub fn valid_samples(&self) -> Vec<Sample> {
        self.samples
            .iter()
            .filter_map(|row| Sample::from_optional(row.x, row.y))
            .collect()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FitResponse {
    pub model: RegressionModel,
    pub equation: String,
    pub sample_count: usize,
    pub line: Option<[Sample; 2]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unknown_x: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PredictRequest {
    pub model: Option<ModelPayload>,
    pub y: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PredictResponse {
    pub x: f64,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

/// Rejection carrying a domain error through warp's filter chain.
#[derive(Debug)]
pub struct ApiError(pub CalibrationError);

impl warp::reject::Reject for ApiError {}

pub fn reject(err: CalibrationError) -> Rejection {
    warp::reject::custom(ApiError(err))
}

pub fn status_for(err: &CalibrationError) -> StatusCode {
    if err.is_domain() {
        return StatusCode::UNPROCESSABLE_ENTITY;
    }
    match err {
        CalibrationError::MalformedRequest(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_reply(status: StatusCode, message: impl Into<String>) -> warp::reply::Response {
    let body = ErrorResponse {
        success: false,
        error: message.into(),
    };
    warp::reply::with_status(warp::reply::json(&body), status).into_response()
}

/// Turn every rejection into a JSON error body.
pub async fn handle_rejection(err: Rejection) -> Result<warp::reply::Response, Infallible> {
    if let Some(ApiError(inner)) = err.find::<ApiError>() {
        let status = status_for(inner);
        if status.is_server_error() {
            error!(error = %inner, "Request failed");
            return Ok(error_reply(status, "history store unavailable"));
        }
        return Ok(error_reply(status, inner.to_string()));
    }

    if err.is_not_found() {
        Ok(error_reply(StatusCode::NOT_FOUND, "Not Found"))
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        Ok(error_reply(StatusCode::PAYLOAD_TOO_LARGE, "request body too large"))
    } else if err.find::<warp::reject::LengthRequired>().is_some() {
        // Checked before 405: the static file fallback adds a method
        // rejection to every POST that misses an API route
        Ok(error_reply(StatusCode::LENGTH_REQUIRED, "request body is required"))
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        Ok(error_reply(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed"))
    } else {
        error!(rejection = ?err, "Unhandled rejection");
        Ok(error_reply(StatusCode::INTERNAL_SERVER_ERROR, "internal error"))
    }
}
