use crate::labels::EmotionLabel;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum PayloadError {
    #[error("Message has no `image` field")]
    MissingImage,
    #[error("Message has neither an `image` nor a `data` field")]
    MissingImageOrData,
    #[error("Message `image` field is null")]
    NullImage,
}

/// Inbound frame message: `{ "image": "<base64>" }`, optionally `{ "data": ... }`.
///
/// `image` keeps a present `null` apart from a missing key: only a missing
/// key falls back to `data`.
#[derive(Debug, Deserialize)]
pub struct FrameMessage {
    #[serde(default, deserialize_with = "present")]
    pub image: Option<Option<String>>,
    pub data: Option<String>,
}

fn present<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

impl FrameMessage {
    pub fn payload(&self, accept_data_fallback: bool) -> Result<&str, PayloadError> {
        match (&self.image, &self.data) {
            (Some(Some(image)), _) => Ok(image),
            (Some(None), _) => Err(PayloadError::NullImage),
            (None, Some(data)) if accept_data_fallback => Ok(data),
            (None, _) if accept_data_fallback => Err(PayloadError::MissingImageOrData),
            (None, _) => Err(PayloadError::MissingImage),
        }
    }
}

/// Per-frame response sent back over the socket.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmotionResponse {
    pub emotions: Vec<EmotionLabel>,
    pub most_common: Option<EmotionLabel>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_image_takes_precedence() {
        let msg: FrameMessage = serde_json::from_str(r#"{"image": "abc", "data": "def"}"#).unwrap();
        assert_eq!(msg.payload(true), Ok("abc"));
    }

    #[test]
    fn test_data_fallback() {
        let msg: FrameMessage = serde_json::from_str(r#"{"data": "def"}"#).unwrap();
        assert_eq!(msg.payload(true), Ok("def"));
        assert_eq!(msg.payload(false), Err(PayloadError::MissingImage));
    }

    #[test]
    fn test_null_image_does_not_fall_back() {
        let msg: FrameMessage = serde_json::from_str(r#"{"image": null, "data": "def"}"#).unwrap();
        assert_eq!(msg.payload(true), Err(PayloadError::NullImage));
    }

    #[test]
    fn test_missing_payload() {
        let msg: FrameMessage = serde_json::from_str(r#"{"type": "frame"}"#).unwrap();
        assert_eq!(msg.payload(true), Err(PayloadError::MissingImageOrData));
    }

    #[test]
    fn test_non_object_rejected() {
        assert!(serde_json::from_str::<FrameMessage>(r#""just a string""#).is_err());
        assert!(serde_json::from_str::<FrameMessage>("not json").is_err());
    }

    #[test]
    fn test_response_shape() {
        let response = EmotionResponse {
            emotions: vec![EmotionLabel {
                index: 1,
                name: "happy".into(),
            }],
            most_common: Some(EmotionLabel {
                index: 1,
                name: "happy".into(),
            }),
        };
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({
                "emotions": [{"index": 1, "name": "happy"}],
                "most_common": {"index": 1, "name": "happy"}
            })
        );

        let empty = EmotionResponse {
            emotions: vec![],
            most_common: None,
        };
        assert_eq!(
            serde_json::to_value(&empty).unwrap(),
            json!({"emotions": [], "most_common": null})
        );
    }
}
