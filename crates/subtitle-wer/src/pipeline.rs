use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use subtitle_wer_decoder::{DynFrameSource, FrameError};
use subtitle_wer_ocr::{EngineCapabilities, OcrEngine, OcrError, build_engine};
use subtitle_wer_scoring::{ScoringError, WerResult, align, load_transcript};
use subtitle_wer_types::{EngineOutcome, SubtitleCue};
use thiserror::Error;
use tokio_stream::StreamExt;
use tracing::{info, warn};

use crate::settings::{ConfigError, EffectiveSettings, ExtractionConfig};
use crate::stage::StreamBundle;
use crate::stage::merge::{CueCounter, CueMerge};
use crate::stage::progress::Progress;
use crate::stage::recognizer::{GuardedRecognizer, RecognizerError};
use crate::stage::sampler::{CancelHandle, SamplerEvent, SamplingScheduler, StopReason};
use crate::stage::writer::{OutputFormat, SubtitleWriter, WriterError, WriterEvent, WriterStatus};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to open frame source: {0}")]
    Source(#[from] FrameError),
    #[error("recognition engine unavailable: {0}")]
    Engine(#[from] OcrError),
    #[error(transparent)]
    Recognizer(#[from] RecognizerError),
    #[error(transparent)]
    Writer(#[from] WriterError),
    #[error(transparent)]
    Scoring(#[from] ScoringError),
    #[error("{0} task stopped unexpectedly")]
    Task(&'static str),
}

/// Where and how one extraction run writes its cues.
#[derive(Debug, Clone)]
pub struct ExtractionPlan {
    pub extraction: ExtractionConfig,
    pub output: PathBuf,
    pub format: OutputFormat,
    pub show_progress: bool,
}

impl ExtractionPlan {
    pub fn from_settings(settings: &EffectiveSettings) -> Self {
        Self {
            extraction: settings.extraction.clone(),
            output: settings.output.clone(),
            format: settings.format,
            show_progress: settings.show_progress,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub samples: u64,
    pub outcomes: HashMap<EngineOutcome, u64>,
    pub decode_failures: u64,
    pub region_fallbacks: u64,
    pub detached_running: usize,
    pub elapsed: Duration,
    pub stop: Option<StopReason>,
    pub output: PathBuf,
    pub cues: Vec<SubtitleCue>,
    pub score: Option<WerResult>,
}

impl RunSummary {
    pub fn count(&self, outcome: EngineOutcome) -> u64 {
        self.outcomes.get(&outcome).copied().unwrap_or(0)
    }

    /// Cue texts joined by a space, the form transcripts are compared in.
    pub fn transcript(&self) -> String {
        self.cues
            .iter()
            .map(|cue| cue.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn observe(&mut self, event: &SamplerEvent) {
        match event {
            SamplerEvent::Observation(record) => {
                self.samples += 1;
                *self.outcomes.entry(record.observation.outcome).or_default() += 1;
                if record.region_fallback {
                    self.region_fallbacks += 1;
                }
            }
            SamplerEvent::DecodeFailed { .. } => {
                self.samples += 1;
                self.decode_failures += 1;
            }
            SamplerEvent::Progress(_) => {}
            SamplerEvent::Finished(reason) => self.stop = Some(*reason),
        }
    }
}

/// Opens the configured source and engine, extracts, and optionally scores.
///
/// The reference transcript is read before the source is opened, so an
/// unreadable reference fails the run before any frame is sampled.
pub async fn run_extraction(
    settings: EffectiveSettings,
    cancel: CancelHandle,
) -> Result<RunSummary, PipelineError> {
    let reference_text = settings
        .reference
        .as_deref()
        .map(load_transcript)
        .transpose()?;

    let source = settings.source.create_source()?;
    info!(
        backend = source.name(),
        fps = source.frame_rate(),
        frames = source.frame_count(),
        "frame source ready"
    );

    let tesseract = settings.tesseract.clone();
    let requested = settings.engine;
    let engine = tokio::task::spawn_blocking(move || {
        let capabilities = EngineCapabilities::detect(&tesseract);
        build_engine(requested, &capabilities, tesseract)
    })
    .await
    .map_err(|_| PipelineError::Task("engine probe"))??;

    let plan = ExtractionPlan::from_settings(&settings);
    let mut summary = extract(source, engine, &plan, cancel).await?;

    if let Some(reference_text) = reference_text {
        summary.score = Some(align(&reference_text, &summary.transcript()));
    }
    Ok(summary)
}

/// Runs sampler, merge, progress and writer stages over `source`.
///
/// The engine is warmed up first; a failure there ends the run before any
/// frame is sampled.
pub async fn extract(
    source: DynFrameSource,
    engine: Arc<dyn OcrEngine>,
    plan: &ExtractionPlan,
    cancel: CancelHandle,
) -> Result<RunSummary, PipelineError> {
    plan.extraction.validate()?;
    let started = Instant::now();

    let recognizer = Arc::new(GuardedRecognizer::new(
        engine,
        plan.extraction.recognizer_options(),
    ));
    recognizer.warm_up().await?;

    let cues = CueCounter::default();
    let sampler_options = plan.extraction.sampler_options();
    let sampled = SamplingScheduler::new(source, Arc::clone(&recognizer), sampler_options)
        .with_region(plan.extraction.region)
        .with_cancel(cancel)
        .with_cue_counter(cues.clone())
        .attach();
    let merged = CueMerge::new(plan.extraction.merge_options(), cues).attach(sampled);
    let reported = Progress::new("extract", plan.show_progress).attach(merged);
    let written = SubtitleWriter::new(plan.output.clone(), plan.format).attach(reported);

    let StreamBundle { mut stream, .. } = written;
    let mut summary = RunSummary::default();
    let mut completed = false;

    while let Some(event) = stream.next().await {
        match event? {
            WriterEvent {
                source: Some(event),
                ..
            } => summary.observe(&event),
            WriterEvent {
                status: WriterStatus::Completed { path, cues },
                ..
            } => {
                summary.output = path;
                summary.cues = cues;
                completed = true;
            }
            WriterEvent { .. } => {}
        }
    }

    if !completed {
        return Err(PipelineError::Task("subtitle writer"));
    }

    summary.detached_running = recognizer.detached_calls();
    summary.elapsed = started.elapsed();
    if summary.detached_running > 0 {
        warn!(
            running = summary.detached_running,
            "abandoned recognition calls are still running"
        );
    }
    info!(
        samples = summary.samples,
        cues = summary.cues.len(),
        elapsed_ms = summary.elapsed.as_millis() as u64,
        "extraction finished"
    );
    Ok(summary)
}

/// Cancels the run on the first Ctrl-C.
pub fn cancel_on_ctrl_c(cancel: CancelHandle) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; finishing the current sample");
            cancel.cancel();
        }
    });
}
