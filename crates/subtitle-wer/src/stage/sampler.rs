use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use futures_util::stream::unfold;
use subtitle_wer_decoder::{DynFrameSource, FrameError, SeekOutcome, YPlaneFrame, frame_index_at};
use subtitle_wer_types::{EngineOutcome, RecognitionRegion, SampleObservation};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::StreamBundle;
use super::merge::CueCounter;
use super::recognizer::GuardedRecognizer;

const SAMPLER_CHANNEL_CAPACITY: usize = 2;
const DEFAULT_REGION_FRACTION: f32 = 0.3;

pub type SamplerResult = Result<SamplerEvent, SchedulerError>;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error(
        "aborting after {count} consecutive failed samples (last at {:.3}s)",
        .last_timestamp.as_secs_f64()
    )]
    TooManyFailures { count: u32, last_timestamp: Duration },
    #[error("frame source worker stopped unexpectedly")]
    SourceLost,
    #[error("sampling interval must be longer than zero")]
    ZeroInterval,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerOptions {
    pub interval: Duration,
    pub max_consecutive_failures: u32,
    pub progress_every: u64,
    pub reclaim_every: u64,
    pub max_samples: Option<u64>,
    pub time_limit: Option<Duration>,
}

impl Default for SamplerOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            max_consecutive_failures: 10,
            progress_every: 5,
            reclaim_every: 50,
            max_samples: None,
            time_limit: None,
        }
    }
}

/// Cooperative stop flag checked between samples.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    EndOfStream,
    Cancelled,
    TimeLimit,
    MaxSamples,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::EndOfStream => "end of stream",
            StopReason::Cancelled => "cancelled",
            StopReason::TimeLimit => "time limit reached",
            StopReason::MaxSamples => "sample limit reached",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SampleRecord {
    pub sample: u64,
    pub frame_index: u64,
    pub observation: SampleObservation,
    pub region_fallback: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSnapshot {
    pub processed: u64,
    pub total: Option<u64>,
    pub elapsed: Duration,
    pub cues: usize,
}

impl ProgressSnapshot {
    pub fn fraction(&self) -> Option<f64> {
        match self.total {
            Some(0) => Some(1.0),
            Some(total) => Some((self.processed as f64 / total as f64).min(1.0)),
            None => None,
        }
    }

    /// Linear extrapolation from the average time per processed sample.
    pub fn remaining(&self) -> Option<Duration> {
        let total = self.total?;
        if self.processed == 0 {
            return None;
        }
        let left = total.saturating_sub(self.processed);
        Some(self.elapsed.div_f64(self.processed as f64).mul_f64(left as f64))
    }
}

#[derive(Debug, Clone)]
pub enum SamplerEvent {
    Observation(SampleRecord),
    DecodeFailed {
        sample: u64,
        timestamp: Duration,
        message: String,
    },
    Progress(ProgressSnapshot),
    Finished(StopReason),
}

/// Walks a frame source at a fixed interval and recognizes one frame per
/// step.
pub struct SamplingScheduler {
    source: DynFrameSource,
    recognizer: Arc<GuardedRecognizer>,
    region: Option<RecognitionRegion>,
    options: SamplerOptions,
    cancel: CancelHandle,
    cues: CueCounter,
}

impl SamplingScheduler {
    pub fn new(
        source: DynFrameSource,
        recognizer: Arc<GuardedRecognizer>,
        options: SamplerOptions,
    ) -> Self {
        Self {
            source,
            recognizer,
            region: None,
            options,
            cancel: CancelHandle::new(),
            cues: CueCounter::default(),
        }
    }

    /// Fixed region to crop; without one the bottom band of each frame is used.
    pub fn with_region(mut self, region: Option<RecognitionRegion>) -> Self {
        self.region = region;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelHandle) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_cue_counter(mut self, cues: CueCounter) -> Self {
        self.cues = cues;
        self
    }

    pub fn attach(self) -> StreamBundle<SamplerResult> {
        let total_samples = planned_samples(
            self.source.frame_count(),
            self.source.frame_rate(),
            self.options.interval,
        )
        .map(|planned| match self.options.max_samples {
            Some(limit) => planned.min(limit),
            None => planned,
        });

        let (tx, rx) = mpsc::channel::<SamplerResult>(SAMPLER_CHANNEL_CAPACITY);

        tokio::spawn(async move {
            let mut worker = SamplerWorker::new(self, total_samples);
            worker.run(&tx).await;
        });

        let stream = Box::pin(unfold(rx, |mut receiver| async {
            receiver.recv().await.map(|item| (item, receiver))
        }));

        StreamBundle::new(stream, total_samples)
    }
}

/// Samples `t_k = k * interval` that land on an existing frame.
pub fn planned_samples(frame_count: Option<u64>, fps: f64, interval: Duration) -> Option<u64> {
    let frames = frame_count?;
    if !fps.is_finite() || fps <= 0.0 || interval.is_zero() {
        return None;
    }
    let mut count = 0u64;
    while frame_index_at(interval.mul_f64(count as f64), fps) < frames {
        count += 1;
    }
    Some(count)
}

struct SamplerWorker {
    source: Option<DynFrameSource>,
    recognizer: Arc<GuardedRecognizer>,
    region: Option<RecognitionRegion>,
    options: SamplerOptions,
    cancel: CancelHandle,
    cues: CueCounter,
    fps: f64,
    total_samples: Option<u64>,
    started: Instant,
    processed: u64,
    consecutive_failures: u32,
}

impl SamplerWorker {
    fn new(scheduler: SamplingScheduler, total_samples: Option<u64>) -> Self {
        let fps = scheduler.source.frame_rate();
        Self {
            source: Some(scheduler.source),
            recognizer: scheduler.recognizer,
            region: scheduler.region,
            options: scheduler.options,
            cancel: scheduler.cancel,
            cues: scheduler.cues,
            fps,
            total_samples,
            started: Instant::now(),
            processed: 0,
            consecutive_failures: 0,
        }
    }

    async fn run(&mut self, tx: &mpsc::Sender<SamplerResult>) {
        let reason = match self.sample_all(tx).await {
            Ok(Some(reason)) => reason,
            Ok(None) => return,
            Err(err) => {
                let _ = tx.send(Err(err)).await;
                return;
            }
        };
        info!(
            reason = reason.as_str(),
            samples = self.processed,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "sampling finished"
        );
        let _ = tx.send(Ok(SamplerEvent::Progress(self.snapshot()))).await;
        let _ = tx.send(Ok(SamplerEvent::Finished(reason))).await;
    }

    /// Returns `Ok(None)` when the consumer went away.
    async fn sample_all(
        &mut self,
        tx: &mpsc::Sender<SamplerResult>,
    ) -> Result<Option<StopReason>, SchedulerError> {
        if self.options.interval.is_zero() {
            return Err(SchedulerError::ZeroInterval);
        }
        for sample in 0u64.. {
            if let Some(reason) = self.stop_reason(sample) {
                return Ok(Some(reason));
            }

            let target = self.options.interval.mul_f64(sample as f64);
            let event = match self.seek(target).await? {
                Ok(SeekOutcome::EndOfStream) => return Ok(Some(StopReason::EndOfStream)),
                Ok(SeekOutcome::Frame(frame)) => {
                    let record = self.recognize(sample, target, frame).await;
                    if record.observation.outcome.is_failure() {
                        self.record_failure(record.observation.timestamp)?;
                    } else {
                        self.consecutive_failures = 0;
                    }
                    SamplerEvent::Observation(record)
                }
                Err(err) => {
                    warn!(
                        sample,
                        timestamp = target.as_secs_f64(),
                        error = %err,
                        "frame retrieval failed"
                    );
                    self.record_failure(target)?;
                    SamplerEvent::DecodeFailed {
                        sample,
                        timestamp: target,
                        message: err.to_string(),
                    }
                }
            };

            self.processed += 1;
            if tx.send(Ok(event)).await.is_err() {
                return Ok(None);
            }

            if self.options.progress_every > 0 && self.processed % self.options.progress_every == 0
            {
                let snapshot = self.snapshot();
                if tx.send(Ok(SamplerEvent::Progress(snapshot))).await.is_err() {
                    return Ok(None);
                }
            }

            if self.options.reclaim_every > 0 && self.processed % self.options.reclaim_every == 0 {
                debug!(samples = self.processed, "reclaiming frame source buffers");
                if let Some(source) = self.source.as_mut() {
                    source.reclaim();
                }
            }
        }
        Ok(Some(StopReason::EndOfStream))
    }

    fn stop_reason(&self, sample: u64) -> Option<StopReason> {
        if self.cancel.is_cancelled() {
            return Some(StopReason::Cancelled);
        }
        if self.options.max_samples.is_some_and(|limit| sample >= limit) {
            return Some(StopReason::MaxSamples);
        }
        if self
            .options
            .time_limit
            .is_some_and(|limit| self.started.elapsed() >= limit)
        {
            return Some(StopReason::TimeLimit);
        }
        None
    }

    fn record_failure(&mut self, timestamp: Duration) -> Result<(), SchedulerError> {
        self.consecutive_failures += 1;
        if self.consecutive_failures > self.options.max_consecutive_failures {
            return Err(SchedulerError::TooManyFailures {
                count: self.consecutive_failures,
                last_timestamp: timestamp,
            });
        }
        Ok(())
    }

    /// Seeks on the blocking pool; the source is moved out and back so the
    /// worker keeps exclusive ownership between calls.
    async fn seek(
        &mut self,
        target: Duration,
    ) -> Result<Result<SeekOutcome, FrameError>, SchedulerError> {
        let mut source = self.source.take().ok_or(SchedulerError::SourceLost)?;
        let (source, outcome) = tokio::task::spawn_blocking(move || {
            let outcome = source.seek(target);
            (source, outcome)
        })
        .await
        .map_err(|_| SchedulerError::SourceLost)?;
        self.source = Some(source);
        Ok(outcome)
    }

    async fn recognize(
        &mut self,
        sample: u64,
        target: Duration,
        frame: YPlaneFrame,
    ) -> SampleRecord {
        let frame_index = frame
            .frame_index()
            .unwrap_or_else(|| frame_index_at(target, self.fps));
        let timestamp = frame.timestamp().unwrap_or(target);

        let requested = self.region.unwrap_or_else(|| {
            RecognitionRegion::bottom_band(frame.width(), frame.height(), DEFAULT_REGION_FRACTION)
        });
        let (region, region_fallback) = if frame.contains(&requested) {
            (requested, false)
        } else {
            warn!(
                sample,
                region = %requested,
                width = frame.width(),
                height = frame.height(),
                "region outside frame; recognizing the full frame"
            );
            (frame.full_region(), true)
        };

        let observation = self.recognizer.recognize(&frame, region, timestamp).await;
        if observation.outcome == EngineOutcome::Success {
            debug!(
                sample,
                frame = frame_index,
                timestamp = timestamp.as_secs_f64(),
                outcome = %observation.outcome,
                "sample recognized"
            );
        }

        SampleRecord {
            sample,
            frame_index,
            observation,
            region_fallback,
        }
    }

    fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            processed: self.processed,
            total: self.total_samples,
            elapsed: self.started.elapsed(),
            cues: self.cues.get(),
        }
    }
}
