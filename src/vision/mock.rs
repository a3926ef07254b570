use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;

use super::{PictureDescription, VisionError, VisionOutcome, VisionResult, VisionService};

#[derive(Debug, Clone)]
enum MockReply {
    Outcome(VisionOutcome),
    TooLarge,
    Failure(String),
}

/// Scripted [`VisionService`] for tests and local runs without an API key.
///
/// Replies are served in order and cycle once exhausted. With no scripted
/// replies every call returns a fixed description.
#[derive(Clone, Default)]
pub struct MockVisionClient {
    replies: Arc<Mutex<Vec<MockReply>>>,
    calls: Arc<Mutex<Vec<(String, String)>>>,
}

impl MockVisionClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_outcome(self, outcome: VisionOutcome) -> Self {
        self.replies.lock().push(MockReply::Outcome(outcome));
        self
    }

    pub fn with_image_too_large(self) -> Self {
        self.replies.lock().push(MockReply::TooLarge);
        self
    }

    pub fn with_failure(self, message: &str) -> Self {
        self.replies.lock().push(MockReply::Failure(message.to_string()));
        self
    }

    pub fn get_call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Language tags received so far, in call order.
    pub fn languages(&self) -> Vec<String> {
        self.calls.lock().iter().map(|(lang, _)| lang.clone()).collect()
    }

    pub fn sample_description() -> PictureDescription {
        PictureDescription {
            name: "Teapot".to_string(),
            description: "A pot for brewing tea".to_string(),
            fun_facts: vec![
                "Teapots were once status symbols".to_string(),
                "The Utah teapot is a famous 3D model".to_string(),
                "Some teapots hold a single cup".to_string(),
            ],
        }
    }
}

#[async_trait]
impl VisionService for MockVisionClient {
    async fn describe(&self, lang: &str, image_base64: &str) -> VisionResult<VisionOutcome> {
        let index = {
            let mut calls = self.calls.lock();
            calls.push((lang.to_string(), image_base64.to_string()));
            calls.len() - 1
        };

        let reply = {
            let replies = self.replies.lock();
            if replies.is_empty() {
                None
            } else {
                Some(replies[index % replies.len()].clone())
            }
        };

        match reply {
            None => Ok(VisionOutcome::Described(Self::sample_description())),
            Some(MockReply::Outcome(outcome)) => Ok(outcome),
            Some(MockReply::TooLarge) => Err(VisionError::ImageTooLarge),
            Some(MockReply::Failure(message)) => Err(VisionError::Provider(message)),
        }
    }
}
