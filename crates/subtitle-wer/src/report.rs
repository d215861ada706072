use std::fmt::Write as _;

use subtitle_wer_scoring::{AlignmentOp, WerResult};
use subtitle_wer_types::EngineOutcome;

use crate::pipeline::RunSummary;

pub fn render_wer(result: &WerResult, details: bool) -> String {
    let mut output = String::new();
    let _ = writeln!(
        &mut output,
        "WER: {:.4} ({:.2}%)",
        result.wer,
        result.percent()
    );
    let _ = writeln!(&mut output, "reference tokens: {}", result.total_reference_tokens);
    let _ = writeln!(&mut output, "hypothesis tokens: {}", result.hypothesis_tokens);
    let _ = writeln!(&mut output, "correct: {}", result.correct_tokens);
    let _ = writeln!(&mut output, "substitutions: {}", result.substitutions);
    let _ = writeln!(&mut output, "deletions: {}", result.deletions);
    let _ = writeln!(&mut output, "insertions: {}", result.insertions);

    if details {
        output.push_str("\nalignment:\n");
        for op in &result.operations {
            let line = match op {
                AlignmentOp::Match { token } => format!("  = {token}"),
                AlignmentOp::Substitution {
                    reference,
                    hypothesis,
                } => format!("  ~ {reference} -> {hypothesis}"),
                AlignmentOp::Deletion { reference } => format!("  - {reference}"),
                AlignmentOp::Insertion { hypothesis } => format!("  + {hypothesis}"),
            };
            output.push_str(&line);
            output.push('\n');
        }
    }
    output
}

pub fn render_summary(summary: &RunSummary) -> String {
    let mut output = String::new();
    let stop = summary.stop.map(|reason| reason.as_str()).unwrap_or("unknown");
    let _ = writeln!(
        &mut output,
        "sampled {} frames in {:.2?} ({stop})",
        summary.samples, summary.elapsed
    );
    let _ = writeln!(
        &mut output,
        "  success {} • empty {} • timeout {} • engine error {} • decode failure {}",
        summary.count(EngineOutcome::Success),
        summary.count(EngineOutcome::EmptyResult),
        summary.count(EngineOutcome::Timeout),
        summary.count(EngineOutcome::EngineError),
        summary.decode_failures
    );
    if summary.region_fallbacks > 0 {
        let _ = writeln!(
            &mut output,
            "  region fell back to the full frame {} times",
            summary.region_fallbacks
        );
    }
    if summary.detached_running > 0 {
        let _ = writeln!(
            &mut output,
            "  {} timed-out recognition calls still running",
            summary.detached_running
        );
    }
    let _ = writeln!(
        &mut output,
        "wrote {} cues to {}",
        summary.cues.len(),
        summary.output.display()
    );
    if let Some(score) = &summary.score {
        let _ = writeln!(
            &mut output,
            "WER against reference: {:.4} ({:.2}%), {} of {} tokens correct",
            score.wer,
            score.percent(),
            score.correct_tokens,
            score.total_reference_tokens
        );
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;
    use subtitle_wer_scoring::align;
    use subtitle_wer_types::SubtitleCue;

    #[test]
    fn wer_report_lists_counts_and_alignment() {
        let result = align("the cat sat", "the dog sat");
        let text = render_wer(&result, true);
        assert!(text.starts_with("WER: 0.3333 (33.33%)\n"));
        assert!(text.contains("substitutions: 1\n"));
        assert!(text.contains("  ~ cat -> dog\n"));
        assert!(!render_wer(&result, false).contains("alignment"));
    }

    #[test]
    fn summary_mentions_outcomes_and_output() {
        let mut summary = RunSummary {
            samples: 4,
            decode_failures: 1,
            elapsed: Duration::from_millis(1_500),
            output: PathBuf::from("out.srt"),
            cues: vec![SubtitleCue::new(Duration::ZERO, Duration::from_secs(2), "hi")],
            ..RunSummary::default()
        };
        summary.outcomes.insert(EngineOutcome::Success, 2);
        summary.outcomes.insert(EngineOutcome::Timeout, 1);
        let text = render_summary(&summary);
        assert!(
            text.contains("success 2 • empty 0 • timeout 1 • engine error 0 • decode failure 1")
        );
        assert!(text.contains("wrote 1 cues to out.srt"));
    }
}
