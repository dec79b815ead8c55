use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::engine::RecognitionEngine;
use crate::error::OcrError;
use crate::text::clean_plate_text;
use platewatch_types::{GrayImage, RecognitionResult};

/// Offline binding that replays scripted responses.
///
/// With no script it always reports "no plate read", which makes it the safe
/// default for running the pipeline without a recognizer attached. Tests use
/// the scripted form to drive deterministic recognition outcomes.
#[derive(Debug, Default)]
pub struct StubEngine {
    scripted: Mutex<VecDeque<RecognitionResult>>,
}

impl StubEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script(responses: impl IntoIterator<Item = RecognitionResult>) -> Self {
        Self {
            scripted: Mutex::new(responses.into_iter().collect()),
        }
    }

    pub fn push(&self, response: RecognitionResult) {
        if let Ok(mut scripted) = self.scripted.lock() {
            scripted.push_back(response);
        }
    }
}

#[async_trait]
impl RecognitionEngine for StubEngine {
    fn name(&self) -> &'static str {
        "stub"
    }

    async fn recognize(&self, _crop: &GrayImage) -> Result<RecognitionResult, OcrError> {
        let next = self
            .scripted
            .lock()
            .ok()
            .and_then(|mut scripted| scripted.pop_front());
        let Some(raw) = next else {
            return Ok(RecognitionResult::empty());
        };
        let text = clean_plate_text(&raw.text);
        if text.is_empty() {
            return Ok(RecognitionResult::empty());
        }
        Ok(RecognitionResult::new(text, raw.confidence))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn crop() -> GrayImage {
        GrayImage::from_pixels(4, 4, vec![0u8; 16]).unwrap()
    }

    #[tokio::test]
    async fn unscripted_stub_reads_nothing() {
        let engine = StubEngine::new();
        assert!(engine.recognize(&crop()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn scripted_responses_replay_in_order_and_get_cleaned() {
        let engine = StubEngine::with_script([
            RecognitionResult::new("x7k cc-77", 0.9),
            RecognitionResult::new("A1", 0.8),
        ]);
        let first = engine.recognize(&crop()).await.unwrap();
        assert_eq!(first.text, "X7KCC77");
        // implausible text collapses to empty
        assert!(engine.recognize(&crop()).await.unwrap().is_empty());
        // exhausted script keeps returning empty
        assert!(engine.recognize(&crop()).await.unwrap().is_empty());
    }
}
