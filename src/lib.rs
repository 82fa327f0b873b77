mod aggregation;
mod ort_service;
mod routes;

pub mod config;
pub mod frame;
pub mod labels;
pub mod messages;
pub mod model_service;
pub mod server;
pub mod session;
pub mod telemetry;

pub use aggregation::{most_common, EmotionTally, SessionHistory};
pub use ort_service::OrtModelService;
pub use server::{build_router, start_server, HttpServer, SharedState};
