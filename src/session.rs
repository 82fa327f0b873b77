use crate::{
    aggregation::{most_common, SessionHistory},
    config::SessionConfig,
    frame::{Frame, FrameError},
    labels::{EmotionClasses, EmotionLabel},
    messages::{EmotionResponse, FrameMessage, PayloadError},
    model_service::{ModelError, ModelService},
};
use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Invalid JSON message: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid payload: {0}")]
    Payload(#[from] PayloadError),
    #[error("Invalid frame: {0}")]
    Frame(#[from] FrameError),
    #[error("Inference failed: {0}")]
    Model(#[from] ModelError),
    #[error("Session is {0:?}, expected Open")]
    NotOpen(SessionState),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Open,
    Closed,
}

/// What a clean disconnect reports about the whole session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub frames: u64,
    pub detections: u64,
    pub most_common: Option<EmotionLabel>,
}

/// State owned by a single connection, from accept to disconnect.
pub struct EmotionSession {
    state: SessionState,
    history: SessionHistory,
    classes: Arc<EmotionClasses>,
    accept_data_fallback: bool,
    last_inference: Option<Duration>,
}

impl EmotionSession {
    pub fn new(classes: Arc<EmotionClasses>, config: &SessionConfig) -> Self {
        Self {
            state: SessionState::Connecting,
            history: SessionHistory::new(config.history_capacity),
            classes,
            accept_data_fallback: config.accept_data_fallback,
            last_inference: None,
        }
    }

    pub fn open(&mut self) {
        self.state = SessionState::Open;
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn history(&self) -> &SessionHistory {
        &self.history
    }

    /// Time spent in the model for the most recent frame, decoding excluded.
    pub fn last_inference(&self) -> Option<Duration> {
        self.last_inference
    }

    /// Parses one inbound text message into a decoded frame.
    pub fn decode_message(&self, text: &str) -> Result<Frame, SessionError> {
        let message: FrameMessage = serde_json::from_str(text)?;
        let payload = message.payload(self.accept_data_fallback)?;
        Ok(Frame::from_base64(payload)?)
    }

    /// Records one frame's class indices and builds the response for it.
    pub fn record(&mut self, indices: &[usize]) -> Result<EmotionResponse, SessionError> {
        if self.state != SessionState::Open {
            return Err(SessionError::NotOpen(self.state));
        }

        self.history.record_frame(indices);

        let emotions = indices
            .iter()
            .map(|&index| self.classes.resolve(index))
            .collect();
        let most_common = most_common(indices).map(|index| self.classes.resolve(index));

        Ok(EmotionResponse {
            emotions,
            most_common,
        })
    }

    /// Full receive, infer, aggregate cycle for one text message.
    pub async fn handle_text<M: ModelService + ?Sized>(
        &mut self,
        text: &str,
        model_service: &M,
    ) -> Result<EmotionResponse, SessionError> {
        if self.state != SessionState::Open {
            return Err(SessionError::NotOpen(self.state));
        }
        self.last_inference = None;

        let frame = self.decode_message(text)?;
        let (width, height) = frame.dimensions();
        tracing::debug!("Decoded frame of {}x{}", width, height);

        let started = Instant::now();
        let detections = model_service.predict(frame).await?;
        self.last_inference = Some(started.elapsed());
        let indices: Vec<usize> = detections.iter().map(|d| d.class_index).collect();
        tracing::debug!("Predicted emotion indices: {:?}", indices);

        self.record(&indices)
    }

    /// Clean disconnect: aggregates the whole session and consumes it.
    pub fn close(mut self) -> SessionSummary {
        self.state = SessionState::Closed;
        SessionSummary {
            frames: self.history.frames(),
            detections: self.history.detections(),
            most_common: self.history.mode().map(|index| self.classes.resolve(index)),
        }
    }
}
