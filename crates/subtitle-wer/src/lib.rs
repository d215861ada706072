//! Hard-subtitle extraction and transcript scoring.
//!
//! Frames are sampled at a fixed interval, the subtitle region is run through
//! a guarded recognition engine, and repeated readings are merged into timed
//! cues. The same crate scores transcripts by word error rate.

pub mod backend;
pub mod cli;
pub mod pipeline;
pub mod report;
pub mod settings;
pub mod stage;
pub mod wer;

pub use pipeline::{ExtractionPlan, PipelineError, RunSummary, extract, run_extraction};
pub use settings::{ConfigError, EffectiveSettings, ExtractionConfig};
pub use stage::clean::clean_text;
pub use stage::merge::{CueMerger, MergeOptions, SimilarityMetric};
pub use stage::recognizer::{GuardedRecognizer, RecognizerError, RecognizerOptions};
pub use stage::sampler::{
    CancelHandle, SamplerOptions, SamplingScheduler, SchedulerError, StopReason,
};
pub use stage::writer::{OutputFormat, SubtitleWriter, WriterError, build_srt, format_timestamp};
