//! Image description collaborator.
//!
//! The service hands the caller's language tag and base64 image to a
//! [`VisionService`] and turns the answer into one of three outcomes:
//! a structured description, a refusal, or nothing usable.

mod mime;
mod mock;
mod openai;

pub use mime::{data_url, detect_image_mime};
pub use mock::MockVisionClient;
pub use openai::OpenAiVisionClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structured description returned by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PictureDescription {
    /// The object's name
    pub name: String,
    /// A short description of the object
    pub description: String,
    /// A few funny facts about the object
    pub fun_facts: Vec<String>,
}

/// What the model made of an image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VisionOutcome {
    /// The model produced a description matching the schema
    Described(PictureDescription),
    /// The model declined to describe the image
    Refused(String),
    /// The model answered but nothing matching the schema came back
    Unidentified,
}

/// Failures while talking to the collaborator.
#[derive(Error, Debug)]
pub enum VisionError {
    /// The completion ran out of tokens, which happens with oversized images
    #[error("Image too big for the completion budget")]
    ImageTooLarge,

    /// The provider rejected the request or returned something unusable
    #[error("Vision provider error: {0}")]
    Provider(String),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type VisionResult<T> = std::result::Result<T, VisionError>;

/// An image description backend.
#[async_trait]
pub trait VisionService: Send + Sync {
    /// Describe the object in `image_base64`, answering in `lang`.
    async fn describe(&self, lang: &str, image_base64: &str) -> VisionResult<VisionOutcome>;
}
