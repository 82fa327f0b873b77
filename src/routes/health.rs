use axum::{response::IntoResponse, response::Json};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct Status {
    pub status: String,
    pub model_loaded: bool,
}

/// The server only starts serving once the model is loaded, so this is static.
pub async fn healthcheck() -> impl IntoResponse {
    Json(Status {
        status: "healthy".into(),
        model_loaded: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::to_bytes, http::StatusCode};

    #[tokio::test]
    async fn test_healthcheck() {
        let response = healthcheck().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let status: Status = serde_json::from_slice(&body).unwrap();

        assert_eq!(
            status,
            Status {
                status: "healthy".into(),
                model_loaded: true,
            }
        );
    }
}
