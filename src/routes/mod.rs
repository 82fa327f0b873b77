mod emotion_ws;
mod health;
mod metrics;

use crate::{model_service::ModelService, server::SharedState};
use axum::{routing::get, Router};

pub use emotion_ws::emotion_ws;
pub use health::healthcheck;
pub use metrics::metrics_handler;

pub fn api_routes<M: ModelService>() -> Router<SharedState<M>> {
    Router::new()
        .route("/health", get(healthcheck))
        .route("/metrics", get(metrics_handler::<M>))
        .route("/ws/emotion", get(emotion_ws::<M>))
}
