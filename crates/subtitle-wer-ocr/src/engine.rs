use crate::error::OcrError;
use crate::request::OcrRequest;
use subtitle_wer_types::OcrResponse;

/// Common interface for all OCR engines.
///
/// Implementations are called from blocking worker threads and may take
/// arbitrarily long; callers that need a deadline wrap them in a guard.
pub trait OcrEngine: Send + Sync {
    fn name(&self) -> &'static str;

    fn warm_up(&self) -> Result<(), OcrError> {
        Ok(())
    }

    fn recognize(&self, request: &OcrRequest<'_>) -> Result<OcrResponse, OcrError>;
}

/// Engine that never finds text. Handy for timing dry runs.
#[derive(Debug, Default)]
pub struct NoopOcrEngine;

impl OcrEngine for NoopOcrEngine {
    fn name(&self) -> &'static str {
        "noop"
    }

    fn recognize(&self, _: &OcrRequest<'_>) -> Result<OcrResponse, OcrError> {
        Ok(OcrResponse::empty())
    }
}
