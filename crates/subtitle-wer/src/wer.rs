use std::path::Path;

use subtitle_wer_scoring::{ScoringError, WerResult, align, load_transcript};
use tracing::debug;

use crate::cli::WerArgs;
use crate::report::render_wer;

/// Scores the two transcripts named by `args` and renders the report.
pub fn run_wer(args: &WerArgs) -> Result<String, ScoringError> {
    let reference = text_source(args.reference.as_deref(), args.reference_text.as_deref())?;
    let hypothesis = text_source(args.hypothesis.as_deref(), args.hypothesis_text.as_deref())?;
    let result = align(&reference, &hypothesis);
    debug!(
        reference_tokens = result.total_reference_tokens,
        hypothesis_tokens = result.hypothesis_tokens,
        errors = result.errors(),
        "transcripts aligned"
    );
    Ok(render(result, args.json, args.details))
}

fn text_source(path: Option<&Path>, inline: Option<&str>) -> Result<String, ScoringError> {
    match (path, inline) {
        (Some(path), _) => load_transcript(path),
        (None, Some(text)) => Ok(text.to_string()),
        (None, None) => Ok(String::new()),
    }
}

fn render(result: WerResult, json: bool, details: bool) -> String {
    let result = if details {
        result
    } else {
        result.without_operations()
    };
    if json {
        // WerResult only holds numbers and strings
        serde_json::to_string_pretty(&result).unwrap_or_default()
    } else {
        render_wer(&result, details)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn args(reference: &str, hypothesis: &str) -> WerArgs {
        WerArgs {
            reference: None,
            hypothesis: None,
            reference_text: Some(reference.into()),
            hypothesis_text: Some(hypothesis.into()),
            json: false,
            details: false,
        }
    }

    #[test]
    fn inline_texts_are_scored() {
        let report = run_wer(&args("今天天气很好", "今天天气不错")).unwrap();
        assert!(report.contains("substitutions: 2\n"));
        assert!(report.contains("reference tokens: 6\n"));
    }

    #[test]
    fn json_output_omits_alignment_unless_requested() {
        let mut request = args("the cat sat", "the dog sat");
        request.json = true;
        let value: serde_json::Value = serde_json::from_str(&run_wer(&request).unwrap()).unwrap();
        assert_eq!(value["substitutions"], 1);
        assert!(value.get("operations").is_none());

        request.details = true;
        let value: serde_json::Value = serde_json::from_str(&run_wer(&request).unwrap()).unwrap();
        assert_eq!(value["operations"][1]["op"], "substitution");
    }

    #[test]
    fn files_are_loaded_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let reference = dir.path().join("ref.txt");
        let hypothesis = dir.path().join("hyp.srt");
        fs::write(&reference, "hello world\n").unwrap();
        fs::write(&hypothesis, "1\n00:00:00,000 --> 00:00:01,000\nhello <i>word</i>\n\n").unwrap();

        let request = WerArgs {
            reference: Some(reference),
            hypothesis: Some(hypothesis),
            reference_text: None,
            hypothesis_text: None,
            json: false,
            details: false,
        };
        let report = run_wer(&request).unwrap();
        assert!(report.starts_with("WER: 0.5000 (50.00%)\n"));
    }

    #[test]
    fn missing_file_is_an_error() {
        let request = WerArgs {
            reference: Some("/nonexistent/ref.srt".into()),
            hypothesis: None,
            reference_text: None,
            hypothesis_text: Some("x".into()),
            json: false,
            details: false,
        };
        assert!(matches!(run_wer(&request), Err(ScoringError::Io { .. })));
    }
}
