use async_trait::async_trait;

use crate::error::OcrError;
use platewatch_types::{GrayImage, RecognitionResult};

/// Common interface for all recognition bindings.
///
/// `recognize` returns `Ok(RecognitionResult::empty())` when the crop holds
/// no readable plate; `Err` is reserved for failures the caller should know
/// about. Remote bindings additionally downgrade transient transport errors
/// to empty results internally.
#[async_trait]
pub trait RecognitionEngine: Send + Sync {
    fn name(&self) -> &'static str;

    /// One-time readiness check before the pipeline starts.
    async fn warm_up(&self) -> Result<(), OcrError> {
        Ok(())
    }

    async fn recognize(&self, crop: &GrayImage) -> Result<RecognitionResult, OcrError>;
}
