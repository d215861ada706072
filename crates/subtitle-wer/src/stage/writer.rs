use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::ValueEnum;
use futures_util::{StreamExt, stream::unfold};
use serde::Serialize;
use subtitle_wer_types::SubtitleCue;
use thiserror::Error;
use tokio::fs;
use tokio::sync::mpsc;
use tracing::info;

use super::StreamBundle;
use super::merge::MergeResult;
use super::sampler::{SamplerEvent, SchedulerError};

const WRITER_CHANNEL_CAPACITY: usize = 4;

pub type WriterResult = Result<WriterEvent, WriterError>;

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Srt,
    Json,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Srt => "srt",
            OutputFormat::Json => "json",
        }
    }

    pub fn render(&self, cues: &[SubtitleCue]) -> Result<String, WriterError> {
        match self {
            OutputFormat::Srt => Ok(build_srt(cues)),
            OutputFormat::Json => build_json(cues),
        }
    }
}

#[derive(Debug, Error)]
pub enum WriterError {
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
    #[error("failed to write subtitles to {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize cues: {0}")]
    Json(#[from] serde_json::Error),
}

pub struct WriterEvent {
    pub source: Option<SamplerEvent>,
    pub status: WriterStatus,
}

#[derive(Debug, Clone)]
pub enum WriterStatus {
    Pending { buffered: usize },
    Completed { path: PathBuf, cues: Vec<SubtitleCue> },
}

/// Collects closed cues and writes them once the upstream finishes cleanly.
///
/// An upstream failure is forwarded and nothing is written.
pub struct SubtitleWriter {
    output_path: PathBuf,
    format: OutputFormat,
}

impl SubtitleWriter {
    pub fn new(output_path: PathBuf, format: OutputFormat) -> Self {
        Self {
            output_path,
            format,
        }
    }

    pub fn attach(self, input: StreamBundle<MergeResult>) -> StreamBundle<WriterResult> {
        let StreamBundle {
            stream,
            total_samples,
        } = input;

        let (tx, rx) = mpsc::channel::<WriterResult>(WRITER_CHANNEL_CAPACITY);
        let output_path = self.output_path;
        let format = self.format;

        tokio::spawn(async move {
            let mut upstream = stream;
            let mut cues: Vec<SubtitleCue> = Vec::new();

            while let Some(event) = upstream.next().await {
                match event {
                    Ok(merged) => {
                        cues.extend(merged.closed);
                        let event = WriterEvent {
                            source: Some(merged.source),
                            status: WriterStatus::Pending {
                                buffered: cues.len(),
                            },
                        };
                        if tx.send(Ok(event)).await.is_err() {
                            return;
                        }
                    }
                    Err(err) => {
                        let _ = tx.send(Err(WriterError::Scheduler(err))).await;
                        return;
                    }
                }
            }

            let outcome = write_cues(&output_path, format, &cues)
                .await
                .map(|()| WriterEvent {
                    source: None,
                    status: WriterStatus::Completed {
                        path: output_path,
                        cues,
                    },
                });
            let _ = tx.send(outcome).await;
        });

        let stream = Box::pin(unfold(rx, |mut receiver| async {
            receiver.recv().await.map(|item| (item, receiver))
        }));

        StreamBundle::new(stream, total_samples)
    }
}

pub async fn write_cues(
    path: &Path,
    format: OutputFormat,
    cues: &[SubtitleCue],
) -> Result<(), WriterError> {
    let contents = format.render(cues)?;
    let io_error = |source| WriterError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await.map_err(io_error)?;
    }
    fs::write(path, contents).await.map_err(io_error)?;

    info!(
        path = %path.display(),
        cues = cues.len(),
        format = format.extension(),
        "subtitles written"
    );
    Ok(())
}

/// Numbered blocks of index, `start --> end`, text and a blank line.
pub fn build_srt(cues: &[SubtitleCue]) -> String {
    let mut output = String::new();
    for (idx, cue) in cues.iter().enumerate() {
        let _ = writeln!(&mut output, "{}", idx + 1);
        let _ = writeln!(
            &mut output,
            "{} --> {}",
            format_timestamp(cue.start),
            format_timestamp(cue.end)
        );
        let _ = writeln!(&mut output, "{}", cue.text);
        output.push('\n');
    }
    output
}

#[derive(Serialize)]
struct JsonCue<'a> {
    index: usize,
    start: f64,
    end: f64,
    text: &'a str,
}

pub fn build_json(cues: &[SubtitleCue]) -> Result<String, WriterError> {
    let entries: Vec<JsonCue<'_>> = cues
        .iter()
        .enumerate()
        .map(|(idx, cue)| JsonCue {
            index: idx + 1,
            start: cue.start.as_secs_f64(),
            end: cue.end.as_secs_f64(),
            text: &cue.text,
        })
        .collect();
    Ok(serde_json::to_string_pretty(&entries)?)
}

/// `HH:MM:SS,mmm`; sub-millisecond precision is truncated.
pub fn format_timestamp(time: Duration) -> String {
    let millis = time
        .as_secs()
        .saturating_mul(1000)
        .saturating_add(u64::from(time.subsec_millis()));
    let hours = millis / 3_600_000;
    let minutes = (millis % 3_600_000) / 60_000;
    let seconds = (millis % 60_000) / 1000;
    let remain_ms = millis % 1000;
    format!("{hours:02}:{minutes:02}:{seconds:02},{remain_ms:03}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::merge::MergeEvent;
    use crate::stage::sampler::StopReason;
    use futures_util::stream;

    fn cue(start_ms: u64, end_ms: u64, text: &str) -> SubtitleCue {
        SubtitleCue::new(
            Duration::from_millis(start_ms),
            Duration::from_millis(end_ms),
            text,
        )
    }

    #[test]
    fn timestamp_formatting_matches_srt() {
        assert_eq!(format_timestamp(Duration::from_millis(3_723_456)), "01:02:03,456");
        assert_eq!(format_timestamp(Duration::from_micros(1_999_999)), "00:00:01,999");
        assert_eq!(format_timestamp(Duration::from_secs(100 * 3600)), "100:00:00,000");
    }

    #[test]
    fn srt_blocks_are_numbered_and_separated() {
        let output = build_srt(&[cue(0, 1_000, "hello"), cue(5_000, 7_000, "world")]);
        assert_eq!(
            output,
            "1\n00:00:00,000 --> 00:00:01,000\nhello\n\n2\n00:00:05,000 --> 00:00:07,000\nworld\n\n"
        );
        assert!(build_srt(&[]).is_empty());
    }

    #[test]
    fn json_output_uses_seconds() {
        let output = build_json(&[cue(1_500, 3_250, "今天")]).unwrap();
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value[0]["index"], 1);
        assert_eq!(value[0]["start"], 1.5);
        assert_eq!(value[0]["end"], 3.25);
        assert_eq!(value[0]["text"], "今天");
    }

    #[tokio::test]
    async fn writes_file_after_upstream_completes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.srt");
        let events: Vec<MergeResult> = vec![
            Ok(MergeEvent {
                source: SamplerEvent::Finished(StopReason::EndOfStream),
                closed: vec![cue(0, 2_000, "only cue")],
            }),
        ];
        let bundle = StreamBundle::new(Box::pin(stream::iter(events)), Some(1));

        let writer = SubtitleWriter::new(path.clone(), OutputFormat::Srt);
        let results: Vec<WriterResult> = writer.attach(bundle).stream.collect().await;

        match results.last() {
            Some(Ok(WriterEvent {
                status: WriterStatus::Completed { cues, .. },
                ..
            })) => assert_eq!(cues.len(), 1),
            _ => panic!("writer did not complete"),
        }
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.starts_with("1\n00:00:00,000 --> 00:00:02,000\nonly cue\n"));
    }

    #[tokio::test]
    async fn upstream_failure_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.srt");
        let events: Vec<MergeResult> = vec![Err(SchedulerError::SourceLost)];
        let bundle = StreamBundle::new(Box::pin(stream::iter(events)), None);

        let writer = SubtitleWriter::new(path.clone(), OutputFormat::Srt);
        let results: Vec<WriterResult> = writer.attach(bundle).stream.collect().await;

        assert!(matches!(
            results.as_slice(),
            [Err(WriterError::Scheduler(SchedulerError::SourceLost))]
        ));
        assert!(!path.exists());
    }
}
