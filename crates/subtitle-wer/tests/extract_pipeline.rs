use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use subtitle_wer::pipeline::{ExtractionPlan, PipelineError, extract, run_extraction};
use subtitle_wer::settings::{EffectiveSettings, ExtractionConfig};
use subtitle_wer::stage::writer::OutputFormat;
use subtitle_wer::{CancelHandle, RecognizerError, StopReason};
use subtitle_wer_decoder::backends::mock::MockSource;
use subtitle_wer_decoder::{Backend, Configuration};
use subtitle_wer_ocr::{
    EngineKind, OcrEngine, OcrError, OcrRegion, OcrRequest, OcrResponse, OcrText, TesseractOptions,
};
use subtitle_wer_scoring::{ScoringError, parse_srt_cues};
use subtitle_wer_types::{EngineOutcome, RecognitionRegion, SubtitleCue};

/// Mock frames carry their index in the first pixel; the script maps that
/// index to what a recognizer would read on screen.
struct ScreenplayEngine;

impl OcrEngine for ScreenplayEngine {
    fn name(&self) -> &'static str {
        "screenplay"
    }

    fn recognize(&self, request: &OcrRequest<'_>) -> Result<OcrResponse, OcrError> {
        let frame_index = request.plane().data()[0];
        let text = match frame_index {
            0..=29 => "hello  world",
            30..=49 => "• • •",
            50..=59 => "第二句字幕",
            60..=69 => "第二句字幕。",
            _ => return Ok(OcrResponse::empty()),
        };
        let region = OcrRegion::new(0.0, 0.0, 1.0, 1.0);
        Ok(OcrResponse::new(vec![
            OcrText::new(region, text.to_string()).with_confidence(0.9),
            OcrText::new(region, "smudge".to_string()).with_confidence(0.05),
        ]))
    }
}

struct BrokenEngine;

impl OcrEngine for BrokenEngine {
    fn name(&self) -> &'static str {
        "broken"
    }

    fn warm_up(&self) -> Result<(), OcrError> {
        Err(OcrError::unavailable("broken", "model files missing"))
    }

    fn recognize(&self, _: &OcrRequest<'_>) -> Result<OcrResponse, OcrError> {
        Ok(OcrResponse::empty())
    }
}

fn plan(output: PathBuf) -> ExtractionPlan {
    ExtractionPlan {
        extraction: ExtractionConfig {
            interval: 1.0,
            ..ExtractionConfig::default()
        },
        output,
        format: OutputFormat::Srt,
        show_progress: false,
    }
}

fn secs(value: u64) -> Duration {
    Duration::from_secs(value)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn extracted_cues_round_trip_through_srt() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("clip.srt");
    let source = Box::new(MockSource::new(64, 40, 10.0, 100));

    let plan = plan(output.clone());
    let summary = extract(source, Arc::new(ScreenplayEngine), &plan, CancelHandle::new())
        .await
        .unwrap();

    let expected = vec![
        SubtitleCue::new(secs(0), secs(2), "hello world"),
        SubtitleCue::new(secs(5), secs(6), "第二句字幕"),
    ];
    assert_eq!(summary.cues, expected);
    assert_eq!(summary.samples, 10);
    assert_eq!(summary.count(EngineOutcome::Success), 7);
    assert_eq!(summary.count(EngineOutcome::EmptyResult), 3);
    assert_eq!(summary.decode_failures, 0);
    assert_eq!(summary.stop, Some(StopReason::EndOfStream));
    assert_eq!(summary.transcript(), "hello world 第二句字幕");

    let written = std::fs::read_to_string(&output).unwrap();
    assert_eq!(parse_srt_cues(&written).unwrap(), expected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn json_output_and_region_fallback_are_reported() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("out").join("clip.json");
    let mut plan = plan(output.clone());
    plan.format = OutputFormat::Json;
    plan.extraction.region = Some(RecognitionRegion::new(0, 0, 640, 480));
    plan.extraction.max_samples = Some(3);

    let summary = extract(
        Box::new(MockSource::new(64, 40, 10.0, 100)),
        Arc::new(ScreenplayEngine),
        &plan,
        CancelHandle::new(),
    )
    .await
    .unwrap();

    assert_eq!(summary.region_fallbacks, 3);
    assert_eq!(summary.stop, Some(StopReason::MaxSamples));
    let value: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
    assert_eq!(value[0]["text"], "hello world");
    assert_eq!(value[0]["end"], 2.0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancelled_run_still_writes_output() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("cancelled.srt");
    let cancel = CancelHandle::new();
    cancel.cancel();

    let summary = extract(
        Box::new(MockSource::new(64, 40, 10.0, 100)),
        Arc::new(ScreenplayEngine),
        &plan(output.clone()),
        cancel,
    )
    .await
    .unwrap();

    assert_eq!(summary.stop, Some(StopReason::Cancelled));
    assert!(summary.cues.is_empty());
    assert_eq!(std::fs::read_to_string(&output).unwrap(), "");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn warm_up_failure_stops_before_sampling() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("never.srt");

    let err = extract(
        Box::new(MockSource::new(64, 40, 10.0, 100)),
        Arc::new(BrokenEngine),
        &plan(output.clone()),
        CancelHandle::new(),
    )
    .await
    .unwrap_err();

    assert!(matches!(
        err,
        PipelineError::Recognizer(RecognizerError::WarmUp { engine: "broken", .. })
    ));
    assert!(!output.exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn invalid_configuration_fails_fast() {
    let dir = tempfile::tempdir().unwrap();
    let mut plan = plan(dir.path().join("never.srt"));
    plan.extraction.merge_threshold = 1.5;

    let err = extract(
        Box::new(MockSource::new(64, 40, 10.0, 100)),
        Arc::new(ScreenplayEngine),
        &plan,
        CancelHandle::new(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, PipelineError::Config(_)));
}

fn mock_settings(dir: &std::path::Path, reference: PathBuf) -> EffectiveSettings {
    EffectiveSettings {
        source: Configuration {
            backend: Backend::Mock,
            input: None,
            fps: None,
        },
        engine: EngineKind::Noop,
        tesseract: TesseractOptions::default(),
        output: dir.join("mock.srt"),
        format: OutputFormat::Srt,
        extraction: ExtractionConfig::default(),
        reference: Some(reference),
        show_progress: false,
        config_path: None,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn noop_engine_run_is_scored_against_reference() {
    let dir = tempfile::tempdir().unwrap();
    let reference = dir.path().join("reference.txt");
    std::fs::write(&reference, "nothing was read\n").unwrap();

    let settings = mock_settings(dir.path(), reference);
    let summary = run_extraction(settings, CancelHandle::new()).await.unwrap();
    assert_eq!(summary.samples, 5);
    assert_eq!(summary.count(EngineOutcome::EmptyResult), 5);
    let score = summary.score.unwrap();
    assert_eq!(score.total_reference_tokens, 3);
    assert_eq!(score.deletions, 3);
    assert_eq!(score.wer, 1.0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn missing_reference_fails_before_sampling() {
    let dir = tempfile::tempdir().unwrap();
    let settings = mock_settings(dir.path(), dir.path().join("does-not-exist.srt"));
    let output = settings.output.clone();

    let err = run_extraction(settings, CancelHandle::new()).await.unwrap_err();
    assert!(matches!(err, PipelineError::Scoring(ScoringError::Io { .. })));
    assert!(!output.exists());
}
