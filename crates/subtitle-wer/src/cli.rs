use std::path::PathBuf;

use clap::parser::ValueSource;
use clap::{ArgMatches, Args, CommandFactory, FromArgMatches, Parser, Subcommand, ValueEnum};
use subtitle_wer_ocr::EngineKind;
use subtitle_wer_types::RecognitionRegion;

use crate::stage::merge::SimilarityMetric;
use crate::stage::writer::OutputFormat;

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum EngineChoice {
    Auto,
    Tesseract,
    Noop,
}

impl From<EngineChoice> for EngineKind {
    fn from(choice: EngineChoice) -> Self {
        match choice {
            EngineChoice::Auto => EngineKind::Auto,
            EngineChoice::Tesseract => EngineKind::Tesseract,
            EngineChoice::Noop => EngineKind::Noop,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum SimilarityChoice {
    Jaccard,
    EditDistance,
}

impl From<SimilarityChoice> for SimilarityMetric {
    fn from(choice: SimilarityChoice) -> Self {
        match choice {
            SimilarityChoice::Jaccard => SimilarityMetric::CharacterJaccard,
            SimilarityChoice::EditDistance => SimilarityMetric::NormalizedEditDistance,
        }
    }
}

/// Which `extract` flags carry defaults and were typed on the command line.
#[derive(Debug, Default)]
pub struct CliSources {
    pub engine_from_cli: bool,
    pub format_from_cli: bool,
}

impl CliSources {
    fn from_matches(matches: &ArgMatches) -> Self {
        match matches.subcommand() {
            Some(("extract", sub)) => Self {
                engine_from_cli: value_from_cli(sub, "engine"),
                format_from_cli: value_from_cli(sub, "format"),
            },
            _ => Self::default(),
        }
    }
}

fn value_from_cli(matches: &ArgMatches, id: &str) -> bool {
    matches
        .value_source(id)
        .is_some_and(|source| matches!(source, ValueSource::CommandLine))
}

pub fn parse_cli() -> (CliArgs, CliSources) {
    let command = CliArgs::command();
    let matches = command.get_matches();
    let args = match CliArgs::from_arg_matches(&matches) {
        Ok(args) => args,
        Err(err) => err.exit(),
    };
    let sources = CliSources::from_matches(&matches);
    (args, sources)
}

#[derive(Debug, Parser)]
#[command(
    name = "subtitle-wer",
    version,
    about = "Extract hard subtitles with OCR and score transcripts by word error rate",
    disable_help_subcommand = true
)]
pub struct CliArgs {
    /// Log debug output (overridden by RUST_LOG)
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    /// Only log warnings and errors
    #[arg(short = 'q', long = "quiet", global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Sample frames, recognize burned-in text and write timed cues
    Extract(ExtractArgs),
    /// Compare a reference transcript against a hypothesis
    Wer(WerArgs),
    /// Print the available frame sources and recognition engines
    Backends,
}

#[derive(Debug, Args)]
pub struct ExtractArgs {
    /// Input frames (a directory of numbered images for the images backend)
    pub input: Option<PathBuf>,

    /// Override the configuration file path
    #[arg(long = "config")]
    pub config: Option<PathBuf>,

    /// Frame source backend
    #[arg(short = 'b', long = "backend")]
    pub backend: Option<String>,

    /// Frame rate of the input when the source cannot tell
    #[arg(long = "fps")]
    pub fps: Option<f64>,

    /// Recognition engine
    #[arg(long = "engine", value_enum, default_value_t = EngineChoice::Auto)]
    pub engine: EngineChoice,

    /// Language hint passed to the engine (e.g. chi_sim+eng)
    #[arg(long = "language", value_name = "LANG")]
    pub language: Option<String>,

    /// Path to the tesseract executable
    #[arg(long = "tesseract", value_name = "PATH")]
    pub tesseract: Option<PathBuf>,

    /// Output path; defaults to the input with the format's extension
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output format
    #[arg(long = "format", value_enum, default_value_t = OutputFormat::Srt)]
    pub format: OutputFormat,

    /// Seconds between samples
    #[arg(long = "interval")]
    pub interval: Option<f64>,

    /// Region to recognize as x,y,width,height; defaults to the bottom 30% of the frame
    #[arg(long = "region", value_name = "X,Y,W,H")]
    pub region: Option<RecognitionRegion>,

    /// Minimum confidence for a recognized fragment (0-1)
    #[arg(long = "confidence")]
    pub confidence: Option<f32>,

    /// Per-call recognition timeout in seconds
    #[arg(long = "timeout")]
    pub timeout: Option<f64>,

    /// Abandoned recognition calls allowed to run at once
    #[arg(long = "max-detached")]
    pub max_detached: Option<usize>,

    /// Consecutive failed samples tolerated before aborting
    #[arg(long = "max-failures")]
    pub max_failures: Option<u32>,

    /// Report progress every N samples
    #[arg(long = "progress-every")]
    pub progress_every: Option<u64>,

    /// Release source buffers every N samples (0 disables)
    #[arg(long = "reclaim-every")]
    pub reclaim_every: Option<u64>,

    /// Similarity needed to extend the open cue (0-1)
    #[arg(long = "merge-threshold")]
    pub merge_threshold: Option<f64>,

    /// Longest gap in seconds bridged by a cue
    #[arg(long = "merge-gap")]
    pub merge_gap: Option<f64>,

    /// Seconds a single-sample cue stays on screen
    #[arg(long = "display-duration")]
    pub display_duration: Option<f64>,

    /// Text similarity used for merging
    #[arg(long = "similarity", value_enum)]
    pub similarity: Option<SimilarityChoice>,

    /// Stop after this many samples
    #[arg(long = "max-samples")]
    pub max_samples: Option<u64>,

    /// Stop sampling after this many seconds of wall-clock time
    #[arg(long = "time-limit")]
    pub time_limit: Option<f64>,

    /// Score the extracted cues against this transcript
    #[arg(long = "reference", value_name = "FILE")]
    pub reference: Option<PathBuf>,

    /// Draw no progress bar; log progress lines instead
    #[arg(long = "no-progress")]
    pub no_progress: bool,
}

#[derive(Debug, Args)]
pub struct WerArgs {
    /// Reference transcript (.srt, .ass, .ssa or .txt)
    #[arg(
        short = 'r',
        long = "reference",
        conflicts_with = "reference_text",
        required_unless_present = "reference_text"
    )]
    pub reference: Option<PathBuf>,

    /// Hypothesis transcript (.srt, .ass, .ssa or .txt)
    #[arg(
        short = 'y',
        long = "hypothesis",
        conflicts_with = "hypothesis_text",
        required_unless_present = "hypothesis_text"
    )]
    pub hypothesis: Option<PathBuf>,

    /// Reference text given inline
    #[arg(long = "reference-text", value_name = "TEXT")]
    pub reference_text: Option<String>,

    /// Hypothesis text given inline
    #[arg(long = "hypothesis-text", value_name = "TEXT")]
    pub hypothesis_text: Option<String>,

    /// Print the result as JSON
    #[arg(long = "json")]
    pub json: bool,

    /// Include the token alignment
    #[arg(long = "details")]
    pub details: bool,
}
