use std::time::Duration;

use futures_util::{StreamExt, stream::unfold};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;
use tracing::info;

use super::StreamBundle;
use super::merge::MergeResult;
use super::sampler::{ProgressSnapshot, SamplerEvent, SchedulerError};

const PROGRESS_CHANNEL_CAPACITY: usize = 4;

pub struct Progress {
    label: &'static str,
    interactive: bool,
}

impl Progress {
    /// With `interactive` off the bar stays hidden and snapshots go to the log.
    pub fn new(label: &'static str, interactive: bool) -> Self {
        Self { label, interactive }
    }

    pub fn attach(self, input: StreamBundle<MergeResult>) -> StreamBundle<MergeResult> {
        let StreamBundle {
            stream,
            total_samples,
        } = input;

        let (tx, rx) = mpsc::channel::<MergeResult>(PROGRESS_CHANNEL_CAPACITY);
        let label = self.label;
        let interactive = self.interactive;

        tokio::spawn(async move {
            let mut upstream = stream;
            let mut monitor = ProgressMonitor::new(label, total_samples, interactive);

            while let Some(event) = upstream.next().await {
                monitor.observe(&event);
                if tx.send(event).await.is_err() {
                    monitor.finish_if_needed();
                    return;
                }
            }

            monitor.finish_if_needed();
        });

        let stream = Box::pin(unfold(rx, |mut receiver| async {
            receiver.recv().await.map(|item| (item, receiver))
        }));

        StreamBundle::new(stream, total_samples)
    }
}

struct ProgressMonitor {
    bar: ProgressBar,
    interactive: bool,
    total_samples: Option<u64>,
    samples_seen: u64,
    cues: usize,
    finished: bool,
}

impl ProgressMonitor {
    fn new(label: &'static str, total_samples: Option<u64>, interactive: bool) -> Self {
        let bar = if !interactive {
            ProgressBar::hidden()
        } else {
            match total_samples {
                Some(total) => {
                    let bar = ProgressBar::new(total);
                    bar.set_style(bar_style());
                    bar
                }
                None => {
                    let bar = ProgressBar::new_spinner();
                    bar.set_style(spinner_style());
                    bar
                }
            }
        };
        bar.set_prefix(label);

        Self {
            bar,
            interactive,
            total_samples,
            samples_seen: 0,
            cues: 0,
            finished: false,
        }
    }

    fn observe(&mut self, event: &MergeResult) {
        match event {
            Ok(merged) => {
                self.cues += merged.closed.len();
                match &merged.source {
                    SamplerEvent::Observation(_) | SamplerEvent::DecodeFailed { .. } => {
                        self.samples_seen = self.samples_seen.saturating_add(1);
                        self.bar.inc(1);
                    }
                    SamplerEvent::Progress(snapshot) => self.report(snapshot),
                    SamplerEvent::Finished(_) => {}
                }
            }
            Err(err) => self.fail_with_reason(err),
        }
    }

    fn report(&mut self, snapshot: &ProgressSnapshot) {
        let remaining = snapshot
            .remaining()
            .map(format_eta)
            .unwrap_or_else(|| "--".to_string());
        if self.interactive {
            self.bar
                .set_message(format!("{} cues • eta {remaining}", snapshot.cues));
            return;
        }
        match snapshot.fraction() {
            Some(fraction) => info!(
                processed = snapshot.processed,
                total = snapshot.total,
                percent = (fraction * 1000.0).round() / 10.0,
                elapsed_s = snapshot.elapsed.as_secs(),
                remaining = %remaining,
                cues = snapshot.cues,
                "progress"
            ),
            None => info!(
                processed = snapshot.processed,
                elapsed_s = snapshot.elapsed.as_secs(),
                cues = snapshot.cues,
                "progress"
            ),
        }
    }

    fn fail_with_reason(&mut self, reason: &SchedulerError) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.bar.abandon_with_message(format!(
            "failed after {} samples: {reason}",
            self.samples_seen
        ));
    }

    fn finish_if_needed(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        let processed = self.samples_seen;
        match self.total_samples {
            Some(total) => self.bar.finish_with_message(format!(
                "sampled {processed}/{total} • {} cues",
                self.cues
            )),
            None => self
                .bar
                .finish_with_message(format!("sampled {processed} • {} cues", self.cues)),
        }
    }
}

fn format_eta(remaining: Duration) -> String {
    let secs = remaining.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "{prefix:.bold} {bar:40.cyan/blue} {percent:>3.bold}% {pos:>5}/{len:<5} [{elapsed_precise:.dim}] {msg:.yellow}",
    )
    .expect("invalid sampling bar template")
    .progress_chars("█▉▊▋▌▍▎▏ ")
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "{prefix:.bold} {spinner:.cyan.bold} [{elapsed_precise:.dim}] {pos:>5} samples {msg:.yellow}",
    )
    .expect("invalid sampling spinner template")
    .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
}
