use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use warp::hyper::body::Bytes;
use warp::{Filter, Rejection, Reply};

use super::{
    handle_rejection, reject, FitRequest, FitResponse, PredictRequest, PredictResponse,
    SaveRequest, SaveResponse,
};
use crate::config::ServerConfig;
use crate::core::CalibrationError;
use crate::regression;
use crate::report;
use crate::storage::HistoryStore;
use crate::track_performance;

/// API Server Configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct APIServerConfig {
    pub host: String,
    pub port: u16,
    pub static_dir: PathBuf,
    pub enable_cors: bool,
    pub max_body_bytes: u64,
}

impl From<&ServerConfig> for APIServerConfig {
    fn from(config: &ServerConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            static_dir: config.static_dir.clone(),
            enable_cors: config.enable_cors,
            max_body_bytes: config.max_body_bytes,
        }
    }
}

/// HTTP front end for fitting, prediction and the fit history
pub struct CalibrationServer {
    config: APIServerConfig,
    store: Arc<dyn HistoryStore>,
}

impl CalibrationServer {
    pub fn new(config: APIServerConfig, store: Arc<dyn HistoryStore>) -> Self {
        Self { config, store }
    }

    pub fn address(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.config.host, self.config.port)
            .parse()
            .context("Invalid server address")
    }

    /// Serve until Ctrl-C.
    pub async fn start(&self) -> Result<()> {
        let addr = self.address()?;
        let shutdown = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "Failed to listen for shutdown signal");
            }
        };

        if self.config.enable_cors {
            let cors = warp::cors()
                .allow_any_origin()
                .allow_methods(vec!["GET", "POST"])
                .allow_headers(vec!["Content-Type"]);
            let (bound, server) = warp::serve(self.routes().with(cors))
                .try_bind_with_graceful_shutdown(addr, shutdown)
                .context("Failed to bind server address")?;
            info!("Spectral calibration server listening on http://{}", bound);
            server.await;
        } else {
            let (bound, server) = warp::serve(self.routes())
                .try_bind_with_graceful_shutdown(addr, shutdown)
                .context("Failed to bind server address")?;
            info!("Spectral calibration server listening on http://{}", bound);
            server.await;
        }

        info!("Server stopped");
        Ok(())
    }

    /// All routes, with rejections rendered as JSON errors.
    pub fn routes(&self) -> impl Filter<Extract = impl Reply, Error = std::convert::Infallible> + Clone {
        self.history_routes()
            .or(self.calculation_routes())
            .or(warp::fs::dir(self.config.static_dir.clone()))
            .recover(handle_rejection)
            .with(warp::trace::request())
    }

    /// `GET /api/history` and `POST /api/save`, also reachable without the
    /// `/api` prefix.
    fn history_routes(&self) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
        let list = warp::path!("api" / "history")
            .or(warp::path!("history"))
            .unify()
            .and(warp::get())
            .and(with_store(Arc::clone(&self.store)))
            .and_then(list_history);

        let save = warp::path!("api" / "save")
            .or(warp::path!("save"))
            .unify()
            .and(warp::post())
            .and(json_body::<SaveRequest>(self.config.max_body_bytes))
            .and(with_store(Arc::clone(&self.store)))
            .and_then(save_entry);

        list.or(save)
    }

    /// `POST /api/fit` and `POST /api/predict`
    fn calculation_routes(&self) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
        let fit = warp::path!("api" / "fit")
            .and(warp::post())
            .and(json_body::<FitRequest>(self.config.max_body_bytes))
            .and_then(fit_samples);

        let predict = warp::path!("api" / "predict")
            .and(warp::post())
            .and(json_body::<PredictRequest>(self.config.max_body_bytes))
            .and_then(predict_concentration);

        fit.or(predict)
    }
}

fn with_store(
    store: Arc<dyn HistoryStore>,
) -> impl Filter<Extract = (Arc<dyn HistoryStore>,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || Arc::clone(&store))
}

/// Parse a JSON body ourselves so that bad input becomes a
/// `MalformedRequest` with a readable message.
fn json_body<T>(limit: u64) -> impl Filter<Extract = (T,), Error = Rejection> + Clone
where
    T: DeserializeOwned + Send + 'static,
{
    warp::body::content_length_limit(limit)
        .and(warp::body::bytes())
        .and_then(|body: Bytes| async move {
            serde_json::from_slice::<T>(&body).map_err(|e| {
                reject(CalibrationError::malformed(format!("invalid JSON body: {}", e)))
            })
        })
}

async fn list_history(store: Arc<dyn HistoryStore>) -> Result<impl Reply, Rejection> {
    track_performance!("api_list_history");
    let entries = store.list().await.map_err(reject)?;
    Ok(warp::reply::json(&entries))
}

async fn save_entry(
    request: SaveRequest,
    store: Arc<dyn HistoryStore>,
) -> Result<impl Reply, Rejection> {
    track_performance!("api_save");
    let (model, sample_count) = request.validate().map_err(reject)?;
    let entry = store.append(model, sample_count).await.map_err(reject)?;

    info!(id = entry.id, r2 = model.r_squared(), "Analysis saved to history");
    Ok(warp::reply::json(&SaveResponse {
        success: true,
        entry,
    }))
}

async fn fit_samples(request: FitRequest) -> Result<impl Reply, Rejection> {
    track_performance!("api_fit");
    let samples = request.valid_samples();
    let model = regression::fit(&samples).map_err(reject)?;
    let unknown_x = request
        .unknown_y
        .map(|y| model.predict_x(y))
        .transpose()
        .map_err(reject)?;

    Ok(warp::reply::json(&FitResponse {
        model,
        equation: report::equation(&model),
        sample_count: samples.len(),
        line: report::line_endpoints(&samples, &model),
        unknown_x,
    }))
}

async fn predict_concentration(request: PredictRequest) -> Result<impl Reply, Rejection> {
    let model = request
        .model
        .ok_or_else(|| CalibrationError::malformed("missing field `model`"))
        .and_then(|payload| payload.into_model())
        .map_err(reject)?;
    let y = request
        .y
        .ok_or_else(|| CalibrationError::malformed("missing field `y`"))
        .map_err(reject)?;

    let x = regression::predict_x(&model, y).map_err(reject)?;
    Ok(warp::reply::json(&PredictResponse { x }))
}
