//! Reading reference and hypothesis transcripts from subtitle files.

use std::fs;
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

use regex::{Captures, Regex};
use subtitle_wer_types::SubtitleCue;
use tracing::debug;

use crate::error::ScoringError;

static TIMING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(\d{2,}):(\d{2}):(\d{2})[,.](\d{3})\s*-->\s*(\d{2,}):(\d{2}):(\d{2})[,.](\d{3})",
    )
    .expect("timing pattern is valid")
});
static MARKUP_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]+>").expect("tag pattern is valid"));
static OVERRIDE_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{[^}]*\}").expect("override pattern is valid"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscriptFormat {
    Srt,
    Ass,
    PlainText,
}

impl TranscriptFormat {
    /// Guesses the format from the extension; unknown extensions are read as SRT.
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase());
        match ext.as_deref() {
            Some("ass") | Some("ssa") => TranscriptFormat::Ass,
            Some("txt") => TranscriptFormat::PlainText,
            _ => TranscriptFormat::Srt,
        }
    }
}

/// Loads a transcript as one comparison string, cue texts joined by a space.
pub fn load_transcript(path: &Path) -> Result<String, ScoringError> {
    let content = fs::read_to_string(path).map_err(|source| ScoringError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let content = strip_bom(&content);
    let format = TranscriptFormat::from_path(path);
    let text = match format {
        TranscriptFormat::Srt => parse_srt(content).join(" "),
        TranscriptFormat::Ass => parse_ass(content).join(" "),
        TranscriptFormat::PlainText => content.trim().to_string(),
    };
    debug!(path = %path.display(), ?format, chars = text.chars().count(), "loaded transcript");
    Ok(text)
}

/// Text of every non-empty SRT cue with markup removed and lines joined.
pub fn parse_srt(content: &str) -> Vec<String> {
    let blocks = scan_srt(strip_bom(content), false).unwrap_or_default();
    blocks
        .into_iter()
        .filter_map(|block| {
            let joined = block.lines.join("\n");
            let text = MARKUP_TAG.replace_all(&joined, "");
            let text = OVERRIDE_BLOCK.replace_all(&text, "");
            let text = text.trim().replace('\n', " ");
            (!text.is_empty()).then_some(text)
        })
        .collect()
}

/// Dialogue text from the `[Events]` section of an ASS/SSA script.
pub fn parse_ass(content: &str) -> Vec<String> {
    let mut texts = Vec::new();
    let mut in_events = false;
    for line in strip_bom(content).lines() {
        let line = line.trim();
        if line.starts_with("[Events]") {
            in_events = true;
            continue;
        }
        if !in_events {
            continue;
        }
        if line.starts_with('[') {
            break;
        }
        let Some(event) = line.strip_prefix("Dialogue:") else {
            continue;
        };
        // Layer,Start,End,Style,Name,MarginL,MarginR,MarginV,Effect,Text
        let Some(text) = event.splitn(10, ',').nth(9) else {
            continue;
        };
        let text = OVERRIDE_BLOCK.replace_all(text, "");
        let text = text.replace("\\N", " ").replace("\\n", " ");
        let text = text.trim();
        if !text.is_empty() {
            texts.push(text.to_string());
        }
    }
    texts
}

/// Timed cues from an SRT document, text kept verbatim with `\n` between lines.
pub fn parse_srt_cues(content: &str) -> Result<Vec<SubtitleCue>, ScoringError> {
    Ok(scan_srt(strip_bom(content), true)?
        .into_iter()
        .map(|block| SubtitleCue::new(block.start, block.end, block.lines.join("\n")))
        .collect())
}

struct SrtBlock {
    start: Duration,
    end: Duration,
    lines: Vec<String>,
}

/// A cue starts at an index line directly followed by a timing line and runs
/// until the next such pair.
fn scan_srt(content: &str, strict: bool) -> Result<Vec<SrtBlock>, ScoringError> {
    let lines: Vec<&str> = content.lines().map(|line| line.trim_end_matches('\r')).collect();
    let mut blocks = Vec::new();
    let mut current: Option<SrtBlock> = None;
    let mut index = 0;

    while index < lines.len() {
        let line = lines[index].trim();
        if is_cue_index(line) && index + 1 < lines.len() {
            let timing_line = lines[index + 1].trim();
            if let Some(captures) = TIMING.captures(timing_line) {
                blocks.extend(current.take());
                let (start, end) = timing_from(&captures);
                current = Some(SrtBlock {
                    start,
                    end,
                    lines: Vec::new(),
                });
                index += 2;
                continue;
            }
            if strict && timing_line.contains("-->") {
                return Err(ScoringError::MalformedTiming {
                    line: index + 2,
                    content: timing_line.to_string(),
                });
            }
        }
        if let Some(block) = current.as_mut() {
            if !line.is_empty() {
                block.lines.push(line.to_string());
            }
        }
        index += 1;
    }
    blocks.extend(current);
    Ok(blocks)
}

fn is_cue_index(line: &str) -> bool {
    !line.is_empty() && line.bytes().all(|byte| byte.is_ascii_digit())
}

fn timing_from(captures: &Captures<'_>) -> (Duration, Duration) {
    let field = |index: usize| -> u64 {
        captures
            .get(index)
            .and_then(|value| value.as_str().parse().ok())
            .unwrap_or(0)
    };
    let at = |offset: usize| {
        Duration::from_secs(field(offset) * 3600 + field(offset + 1) * 60 + field(offset + 2))
            + Duration::from_millis(field(offset + 3))
    };
    (at(1), at(5))
}

fn strip_bom(content: &str) -> &str {
    content.strip_prefix('\u{feff}').unwrap_or(content)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SRT: &str = "\u{feff}1\r\n00:00:01,000 --> 00:00:03,500\r\n<i>Hello</i> there\r\nfriend\r\n\r\n2\r\n00:00:04,000 --> 00:00:05,250\r\n{\\an8}Second cue\r\n\r\n3\r\n00:00:06,000 --> 00:00:07,000\r\n<b></b>\r\n";

    #[test]
    fn srt_text_strips_markup_and_joins_lines() {
        assert_eq!(parse_srt(SRT), ["Hello there friend", "Second cue"]);
    }

    #[test]
    fn srt_cues_keep_timing() {
        let cues = parse_srt_cues(SRT).unwrap();
        assert_eq!(cues.len(), 3);
        assert_eq!(cues[0].start, Duration::from_secs(1));
        assert_eq!(cues[0].end, Duration::from_millis(3500));
        assert_eq!(cues[0].text, "<i>Hello</i> there\nfriend");
        assert_eq!(cues[1].end, Duration::from_millis(5250));
    }

    #[test]
    fn numeric_dialogue_line_is_not_mistaken_for_an_index() {
        let srt = "1\n00:00:01,000 --> 00:00:02,000\n2024\n\n2\n00:00:03,000 --> 00:00:04,000\nnext\n";
        assert_eq!(parse_srt(srt), ["2024", "next"]);
    }

    #[test]
    fn strict_parse_rejects_broken_timing() {
        let srt = "1\n00:00:01 --> 00:00:02\ntext\n";
        let err = parse_srt_cues(srt).unwrap_err();
        assert!(matches!(err, ScoringError::MalformedTiming { line: 2, .. }));
        assert!(parse_srt(srt).is_empty());
    }

    #[test]
    fn ass_reads_dialogue_text_field() {
        let ass = "[Script Info]\nTitle: demo\n\n[Events]\nFormat: Layer, Start, End, Style, Name, MarginL, MarginR, MarginV, Effect, Text\nDialogue: 0,0:00:01.00,0:00:02.00,Default,,0,0,0,,{\\b1}Hello, world\\Nagain\nComment: 0,0:00:02.00,0:00:03.00,Default,,0,0,0,,skipped\nDialogue: 0,0:00:03.00,0:00:04.00,Default,,0,0,0,,{\\pos(1,2)}\n\n[Fonts]\nDialogue: 0,0:00:05.00,0:00:06.00,Default,,0,0,0,,outside\n";
        assert_eq!(parse_ass(ass), ["Hello, world again"]);
    }

    #[test]
    fn format_follows_extension() {
        assert_eq!(
            TranscriptFormat::from_path(Path::new("a.SSA")),
            TranscriptFormat::Ass
        );
        assert_eq!(
            TranscriptFormat::from_path(Path::new("a.txt")),
            TranscriptFormat::PlainText
        );
        assert_eq!(
            TranscriptFormat::from_path(Path::new("a.vtt")),
            TranscriptFormat::Srt
        );
    }
}
