use crate::{
    model_service::ModelService,
    server::SharedState,
    session::{EmotionSession, SessionError},
};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tracing::instrument;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Error, Debug)]
enum ConnectionError {
    #[error("{0}")]
    Session(#[from] SessionError),
    #[error("Failed to serialize response: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("Binary messages are not supported")]
    BinaryMessage,
}

pub async fn emotion_ws<M: ModelService>(
    ws: WebSocketUpgrade,
    State(state): State<SharedState<M>>,
) -> Response {
    let connection_id = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
    ws.on_upgrade(move |socket| handle_socket(socket, state, connection_id))
}

#[instrument(skip(socket, state))]
async fn handle_socket<M: ModelService>(
    mut socket: WebSocket,
    state: SharedState<M>,
    connection_id: u64,
) {
    let mut session = EmotionSession::new(state.classes.clone(), &state.session_config);
    session.open();
    state.metrics.session_opened();
    tracing::info!("Client connected");

    match serve_session(&mut socket, &mut session, &state).await {
        Ok(()) => {
            let summary = session.close();
            match &summary.most_common {
                Some(emotion) => tracing::info!(
                    frames = summary.frames,
                    detections = summary.detections,
                    "Client disconnected. Most common emotion: {} ({})",
                    emotion.name,
                    emotion.index
                ),
                None => tracing::info!(
                    frames = summary.frames,
                    "Client disconnected without any detected emotion"
                ),
            }
            state.metrics.session_ended("closed");
        }
        Err(e) => {
            tracing::error!("Terminating connection: {}", e);
            state.metrics.session_ended("error");
        }
    }
}

/// Runs the receive, infer, send loop until the client goes away.
///
/// Returns `Ok` on a clean disconnect and `Err` when a message cannot be
/// processed, in which case the socket is dropped without a reply.
async fn serve_session<M: ModelService>(
    socket: &mut WebSocket,
    session: &mut EmotionSession,
    state: &SharedState<M>,
) -> Result<(), ConnectionError> {
    loop {
        let message = match socket.recv().await {
            Some(Ok(message)) => message,
            Some(Err(e)) => {
                tracing::warn!("Connection dropped: {}", e);
                return Ok(());
            }
            None => return Ok(()),
        };

        match message {
            Message::Text(text) => {
                tracing::debug!("Received frame message");
                let response = session
                    .handle_text(text.as_str(), state.model_service.as_ref())
                    .await?;
                let names: Vec<String> = response.emotions.iter().map(|e| e.name.clone()).collect();
                let inference_ms = session
                    .last_inference()
                    .map_or(0, |elapsed| elapsed.as_millis() as u64);
                state.metrics.record_frame(inference_ms, &names);

                let payload = serde_json::to_string(&response)?;
                if let Err(e) = socket.send(Message::Text(payload.into())).await {
                    tracing::warn!("Failed to send response: {}", e);
                    return Ok(());
                }
            }
            Message::Binary(_) => return Err(ConnectionError::BinaryMessage),
            Message::Close(_) => return Ok(()),
            Message::Ping(_) | Message::Pong(_) => {}
        }
    }
}
