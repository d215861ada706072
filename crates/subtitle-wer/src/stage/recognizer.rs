use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use subtitle_wer_ocr::{LumaPlane, OcrEngine, OcrError, OcrRequest, OcrResponse};
use subtitle_wer_types::{EngineOutcome, RecognitionRegion, SampleObservation, YPlaneFrame};
use thiserror::Error;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, info, warn};

type CallHandle = JoinHandle<Result<OcrResponse, OcrError>>;

#[derive(Debug, Error)]
pub enum RecognizerError {
    #[error("{engine} engine failed to initialize: {source}")]
    WarmUp {
        engine: &'static str,
        #[source]
        source: OcrError,
    },
    #[error("{engine} engine did not become ready within {}s", .timeout.as_secs_f64())]
    WarmUpTimeout {
        engine: &'static str,
        timeout: Duration,
    },
    #[error("{engine} engine panicked during warm-up")]
    WarmUpPanicked { engine: &'static str },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecognizerOptions {
    pub timeout: Duration,
    pub confidence_threshold: f32,
    pub max_detached: usize,
}

/// Runs an [`OcrEngine`] on the blocking pool under a per-call deadline.
///
/// Only one call is awaited at a time. A call that misses its deadline is
/// reported as [`EngineOutcome::Timeout`] and left to finish in the
/// background; at most `max_detached` such calls may be running at once,
/// and once that limit is hit the caller waits for one of them (or for the
/// late call itself) before returning.
pub struct GuardedRecognizer {
    engine: Arc<dyn OcrEngine>,
    options: RecognizerOptions,
    serial: Mutex<()>,
    detached_slots: Arc<Semaphore>,
    detached: Arc<AtomicUsize>,
}

impl GuardedRecognizer {
    pub fn new(engine: Arc<dyn OcrEngine>, options: RecognizerOptions) -> Self {
        Self {
            engine,
            options,
            serial: Mutex::new(()),
            detached_slots: Arc::new(Semaphore::new(options.max_detached)),
            detached: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn engine_name(&self) -> &'static str {
        self.engine.name()
    }

    pub fn options(&self) -> &RecognizerOptions {
        &self.options
    }

    /// Abandoned calls that have not returned yet.
    pub fn detached_calls(&self) -> usize {
        self.detached.load(Ordering::Acquire)
    }

    /// Probes the engine once before sampling starts, under the same deadline
    /// as a recognition call.
    pub async fn warm_up(&self) -> Result<(), RecognizerError> {
        let engine_name = self.engine.name();
        let engine = Arc::clone(&self.engine);
        let started = Instant::now();
        let handle = tokio::task::spawn_blocking(move || engine.warm_up());
        match tokio::time::timeout(self.options.timeout, handle).await {
            Ok(Ok(Ok(()))) => {
                info!(
                    engine = engine_name,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "recognition engine ready"
                );
                Ok(())
            }
            Ok(Ok(Err(source))) => Err(RecognizerError::WarmUp {
                engine: engine_name,
                source,
            }),
            Ok(Err(_)) => Err(RecognizerError::WarmUpPanicked {
                engine: engine_name,
            }),
            Err(_) => Err(RecognizerError::WarmUpTimeout {
                engine: engine_name,
                timeout: self.options.timeout,
            }),
        }
    }

    pub async fn recognize(
        &self,
        frame: &YPlaneFrame,
        region: RecognitionRegion,
        timestamp: Duration,
    ) -> SampleObservation {
        let _serial = self.serial.lock().await;
        let started = Instant::now();

        let engine = Arc::clone(&self.engine);
        let frame = frame.clone();
        let mut handle: CallHandle = tokio::task::spawn_blocking(move || {
            let regions = [region.to_ocr_region()];
            let request = OcrRequest::new(LumaPlane::from_frame(&frame), &regions);
            engine.recognize(&request)
        });

        match tokio::time::timeout(self.options.timeout, &mut handle).await {
            Ok(joined) => self.interpret(joined, timestamp, started.elapsed()),
            Err(_) => {
                warn!(
                    timestamp = timestamp.as_secs_f64(),
                    timeout_ms = self.options.timeout.as_millis() as u64,
                    "recognition timed out; abandoning call"
                );
                self.detach(handle).await;
                SampleObservation::without_text(timestamp, EngineOutcome::Timeout)
            }
        }
    }

    fn interpret(
        &self,
        joined: Result<Result<OcrResponse, OcrError>, JoinError>,
        timestamp: Duration,
        elapsed: Duration,
    ) -> SampleObservation {
        let elapsed_ms = elapsed.as_millis() as u64;
        match joined {
            Ok(Ok(response)) => {
                let text = join_confident(&response, self.options.confidence_threshold);
                if text.is_empty() {
                    debug!(
                        timestamp = timestamp.as_secs_f64(),
                        elapsed_ms,
                        "no text above threshold"
                    );
                    SampleObservation::without_text(timestamp, EngineOutcome::EmptyResult)
                } else {
                    debug!(timestamp = timestamp.as_secs_f64(), elapsed_ms, %text, "recognized");
                    SampleObservation::success(timestamp, text)
                }
            }
            Ok(Err(err)) => {
                warn!(
                    timestamp = timestamp.as_secs_f64(),
                    error = %err,
                    "recognition engine failed"
                );
                SampleObservation::without_text(timestamp, EngineOutcome::EngineError)
            }
            Err(err) => {
                warn!(
                    timestamp = timestamp.as_secs_f64(),
                    error = %err,
                    "recognition task aborted"
                );
                SampleObservation::without_text(timestamp, EngineOutcome::EngineError)
            }
        }
    }

    async fn detach(&self, mut handle: CallHandle) {
        let permit = match Arc::clone(&self.detached_slots).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                warn!(
                    limit = self.options.max_detached,
                    "too many abandoned recognition calls; waiting for one to finish"
                );
                tokio::select! {
                    permit = Arc::clone(&self.detached_slots).acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => return,
                    },
                    _ = &mut handle => {
                        debug!("late recognition call finished while waiting for a slot");
                        return;
                    }
                }
            }
        };

        self.detached.fetch_add(1, Ordering::AcqRel);
        let detached = Arc::clone(&self.detached);
        tokio::spawn(async move {
            let _ = handle.await;
            let remaining = detached.fetch_sub(1, Ordering::AcqRel) - 1;
            drop(permit);
            debug!(remaining, "abandoned recognition call finished");
        });
    }
}

/// Joins fragments whose confidence reaches `threshold`, in detection order.
/// Fragments without a confidence score are kept.
pub fn join_confident(response: &OcrResponse, threshold: f32) -> String {
    response
        .texts
        .iter()
        .filter(|entry| entry.confidence.is_none_or(|value| value >= threshold))
        .map(|entry| entry.text.trim())
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
