use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::{StreamExt, stream::unfold};
use subtitle_wer_types::{SampleObservation, SubtitleCue};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use super::StreamBundle;
use super::clean::clean_text;
use super::sampler::{SamplerEvent, SamplerResult, SchedulerError};

const MERGE_CHANNEL_CAPACITY: usize = 4;

pub type MergeResult = Result<MergeEvent, SchedulerError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SimilarityMetric {
    /// Size of the shared character set over the size of the union.
    #[default]
    CharacterJaccard,
    /// One minus the character edit distance over the longer length.
    NormalizedEditDistance,
}

impl SimilarityMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            SimilarityMetric::CharacterJaccard => "jaccard",
            SimilarityMetric::NormalizedEditDistance => "edit-distance",
        }
    }

    /// Score in `0.0..=1.0`; identical strings always score `1.0`.
    pub fn similarity(&self, left: &str, right: &str) -> f64 {
        if left == right {
            return 1.0;
        }
        match self {
            SimilarityMetric::CharacterJaccard => {
                let left: HashSet<char> = left.chars().collect();
                let right: HashSet<char> = right.chars().collect();
                let union = left.union(&right).count();
                if union == 0 {
                    return 0.0;
                }
                left.intersection(&right).count() as f64 / union as f64
            }
            SimilarityMetric::NormalizedEditDistance => {
                let left: Vec<char> = left.chars().collect();
                let right: Vec<char> = right.chars().collect();
                let longest = left.len().max(right.len());
                if longest == 0 {
                    return 1.0;
                }
                1.0 - char_distance(&left, &right) as f64 / longest as f64
            }
        }
    }
}

impl FromStr for SimilarityMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "jaccard" | "character-jaccard" => Ok(SimilarityMetric::CharacterJaccard),
            "edit-distance" | "levenshtein" => Ok(SimilarityMetric::NormalizedEditDistance),
            other => Err(format!("unknown similarity metric '{other}'")),
        }
    }
}

impl fmt::Display for SimilarityMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn char_distance(left: &[char], right: &[char]) -> usize {
    let mut previous: Vec<usize> = (0..=right.len()).collect();
    let mut current = vec![0; right.len() + 1];
    for (i, a) in left.iter().enumerate() {
        current[0] = i + 1;
        for (j, b) in right.iter().enumerate() {
            let substitution = previous[j] + usize::from(a != b);
            current[j + 1] = substitution.min(previous[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[right.len()]
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MergeOptions {
    pub threshold: f64,
    pub max_gap: Duration,
    pub display_duration: Duration,
    pub metric: SimilarityMetric,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            threshold: 0.8,
            max_gap: Duration::from_secs(5),
            display_duration: Duration::from_secs(2),
            metric: SimilarityMetric::CharacterJaccard,
        }
    }
}

#[derive(Debug, Clone)]
struct OpenCue {
    text: String,
    start: Duration,
    last_seen: Duration,
    observations: u32,
}

/// Folds timestamped text observations into non-overlapping cues.
///
/// At most one cue is open. A new observation continues it when the texts
/// are similar enough and the observation is no more than `max_gap` after
/// the cue was last seen; otherwise the open cue is closed and emitted. Empty
/// text leaves the state untouched so brief recognition misses do not split
/// a cue.
#[derive(Debug)]
pub struct CueMerger {
    options: MergeOptions,
    open: Option<OpenCue>,
    last_timestamp: Option<Duration>,
    emitted: usize,
}

impl CueMerger {
    pub fn new(options: MergeOptions) -> Self {
        Self {
            options,
            open: None,
            last_timestamp: None,
            emitted: 0,
        }
    }

    /// Cues emitted so far plus the one still open.
    pub fn cue_count(&self) -> usize {
        self.emitted + usize::from(self.open.is_some())
    }

    pub fn has_open_cue(&self) -> bool {
        self.open.is_some()
    }

    /// Feeds one cleaned observation; returns the cue it closed, if any.
    pub fn push(&mut self, timestamp: Duration, text: &str) -> Option<SubtitleCue> {
        if text.is_empty() {
            return None;
        }
        if self.last_timestamp.is_some_and(|last| timestamp <= last) {
            debug!(
                timestamp = timestamp.as_secs_f64(),
                "ignoring observation that does not advance time"
            );
            return None;
        }
        self.last_timestamp = Some(timestamp);

        if let Some(open) = self.open.as_mut() {
            let gap = timestamp - open.last_seen;
            let similarity = self.options.metric.similarity(text, &open.text);
            if similarity >= self.options.threshold && gap <= self.options.max_gap {
                trace!(similarity, gap_ms = gap.as_millis() as u64, "extending cue");
                open.last_seen = timestamp;
                open.observations += 1;
                return None;
            }
        }

        let closed = self.close(Some(timestamp));
        self.open = Some(OpenCue {
            text: text.to_string(),
            start: timestamp,
            last_seen: timestamp,
            observations: 1,
        });
        closed
    }

    /// Closes the open cue at end of stream.
    pub fn finish(&mut self) -> Option<SubtitleCue> {
        self.close(None)
    }

    fn close(&mut self, next_start: Option<Duration>) -> Option<SubtitleCue> {
        let open = self.open.take()?;
        let mut end = if open.observations > 1 {
            open.last_seen
        } else {
            open.last_seen + self.options.display_duration
        };
        if let Some(next_start) = next_start {
            end = end.min(next_start);
        }
        self.emitted += 1;
        Some(SubtitleCue::new(open.start, end, open.text))
    }
}

/// What the merge stage saw for one scheduler event.
pub struct MergeEvent {
    pub source: SamplerEvent,
    pub closed: Vec<SubtitleCue>,
}

/// Shared running cue count, read by the scheduler for progress reports.
#[derive(Debug, Clone, Default)]
pub struct CueCounter(Arc<AtomicUsize>);

impl CueCounter {
    pub fn get(&self) -> usize {
        self.0.load(Ordering::Relaxed)
    }

    fn set(&self, value: usize) {
        self.0.store(value, Ordering::Relaxed);
    }
}

pub struct CueMerge {
    options: MergeOptions,
    counter: CueCounter,
}

impl CueMerge {
    pub fn new(options: MergeOptions, counter: CueCounter) -> Self {
        Self { options, counter }
    }

    pub fn attach(self, input: StreamBundle<SamplerResult>) -> StreamBundle<MergeResult> {
        let StreamBundle {
            stream,
            total_samples,
        } = input;

        let (tx, rx) = mpsc::channel::<MergeResult>(MERGE_CHANNEL_CAPACITY);
        let counter = self.counter;
        let options = self.options;

        tokio::spawn(async move {
            let mut upstream = stream;
            let mut merger = CueMerger::new(options);

            while let Some(event) = upstream.next().await {
                match event {
                    Ok(event) => {
                        let closed = handle_event(&mut merger, &event);
                        counter.set(merger.cue_count());
                        if tx.send(Ok(MergeEvent { source: event, closed })).await.is_err() {
                            return;
                        }
                    }
                    Err(err) => {
                        let _ = tx.send(Err(err)).await;
                        return;
                    }
                }
            }
        });

        let stream = Box::pin(unfold(rx, |mut receiver| async {
            receiver.recv().await.map(|item| (item, receiver))
        }));

        StreamBundle::new(stream, total_samples)
    }
}

fn handle_event(merger: &mut CueMerger, event: &SamplerEvent) -> Vec<SubtitleCue> {
    match event {
        SamplerEvent::Observation(sample) => {
            let SampleObservation {
                timestamp,
                raw_text,
                ..
            } = &sample.observation;
            let cleaned = clean_text(raw_text);
            if cleaned.is_empty() && !raw_text.is_empty() {
                trace!(raw = %raw_text, "discarded noise-only text");
            }
            merger.push(*timestamp, &cleaned).into_iter().collect()
        }
        SamplerEvent::Finished(_) => merger.finish().into_iter().collect(),
        SamplerEvent::DecodeFailed { .. } | SamplerEvent::Progress(_) => Vec::new(),
    }
}
