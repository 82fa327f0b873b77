use crate::frame::Frame;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("ONNX Runtime error: {0}")]
    Ort(#[from] ort::Error),
    #[error("Unexpected model output: {0}")]
    Output(String),
    #[error("Session mutex poisoned: {0}")]
    Poisoned(String),
    #[error("Inference task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// A detected region: best class, its score and the box in source pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub class_index: usize,
    pub confidence: f32,
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

#[async_trait]
pub trait ModelService: Send + Sync + 'static {
    async fn predict(&self, frame: Frame) -> Result<Vec<Detection>, ModelError>;
}
