use base64::{engine::general_purpose, Engine as _};
use image::{DynamicImage, GenericImageView};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("Invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("Error decoding image: {0}")]
    Image(#[from] image::ImageError),
    #[error("Error reading image: {0}")]
    Io(#[from] std::io::Error),
}

/// A single decoded image, alive for one inference call.
#[derive(Debug, Clone)]
pub struct Frame {
    image: DynamicImage,
}

impl Frame {
    pub fn new(image: DynamicImage) -> Self {
        Self { image }
    }

    /// Decodes an encoded image (JPEG, PNG, ...), guessing the format from its bytes.
    pub fn decode(image_data: &[u8]) -> Result<Self, FrameError> {
        let image = image::ImageReader::new(std::io::Cursor::new(image_data))
            .with_guessed_format()?
            .decode()?;
        Ok(Self { image })
    }

    /// Decodes a base64 image, with or without a `data:<mime>;base64,` prefix.
    /// Line breaks and other ASCII whitespace inside the payload are ignored.
    pub fn from_base64(payload: &str) -> Result<Self, FrameError> {
        let encoded: String = strip_data_uri(payload.trim())
            .chars()
            .filter(|c| !c.is_ascii_whitespace())
            .collect();
        let image_data = general_purpose::STANDARD.decode(encoded)?;
        Self::decode(&image_data)
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}

fn strip_data_uri(payload: &str) -> &str {
    if payload.starts_with("data:") {
        if let Some((_, encoded)) = payload.split_once(";base64,") {
            return encoded;
        }
    }
    payload
}
