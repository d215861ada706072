//! Word error rate scoring between a reference and a hypothesis transcript.
//!
//! Text is tokenized per word for alphabetic scripts and per character for
//! CJK ideographs, aligned with a unit-cost Levenshtein table, and the
//! alignment is classified into substitutions, deletions and insertions.

mod align;
mod error;
mod tokenize;
pub mod transcript;

pub use align::{AlignmentOp, WerResult, align, align_tokens};
pub use error::ScoringError;
pub use tokenize::{is_cjk_ideograph, tokenize};
pub use transcript::{load_transcript, parse_ass, parse_srt, parse_srt_cues};
