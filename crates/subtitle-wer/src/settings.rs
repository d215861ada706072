use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use clap::ValueEnum;
use directories::{BaseDirs, ProjectDirs};
use serde::Deserialize;
use subtitle_wer_decoder::{Backend, Configuration, FrameError};
use subtitle_wer_ocr::{EngineKind, TesseractOptions};
use subtitle_wer_types::RecognitionRegion;
use thiserror::Error;

use crate::cli::{CliSources, ExtractArgs};
use crate::stage::merge::{MergeOptions, SimilarityMetric};
use crate::stage::recognizer::RecognizerOptions;
use crate::stage::sampler::SamplerOptions;
use crate::stage::writer::OutputFormat;

const CONFIG_FILE_NAME: &str = "subtitle-wer.toml";
const FALLBACK_OUTPUT_STEM: &str = "subtitles";
const MAX_SECONDS: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    backend: Option<String>,
    fps: Option<f64>,
    engine: Option<String>,
    language: Option<String>,
    tesseract: Option<String>,
    format: Option<String>,
    output_dir: Option<String>,
    sampling: SamplingFileConfig,
    merge: MergeFileConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SamplingFileConfig {
    interval: Option<f64>,
    region: Option<String>,
    confidence: Option<f32>,
    timeout: Option<f64>,
    max_detached: Option<usize>,
    max_failures: Option<u32>,
    progress_every: Option<u64>,
    reclaim_every: Option<u64>,
    max_samples: Option<u64>,
    time_limit: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MergeFileConfig {
    threshold: Option<f64>,
    gap: Option<f64>,
    display_duration: Option<f64>,
    similarity: Option<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid value '{value}' for '{field}'{}", describe_origin(.path.as_deref()))]
    InvalidValue {
        path: Option<PathBuf>,
        field: &'static str,
        value: String,
    },
    #[error("config file {} does not exist", .path.display())]
    NotFound { path: PathBuf },
    #[error(transparent)]
    Source(#[from] FrameError),
}

fn describe_origin(path: Option<&Path>) -> String {
    path.map(|path| format!(" in {}", path.display()))
        .unwrap_or_default()
}

impl ConfigError {
    fn invalid(field: &'static str, value: impl ToString) -> Self {
        ConfigError::InvalidValue {
            path: None,
            field,
            value: value.to_string(),
        }
    }

    fn with_path(self, origin: Option<&Path>) -> Self {
        match self {
            ConfigError::InvalidValue {
                path: None,
                field,
                value,
            } => ConfigError::InvalidValue {
                path: origin.map(Path::to_path_buf),
                field,
                value,
            },
            other => other,
        }
    }
}

/// Tunables of one extraction run, validated as a whole.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionConfig {
    pub interval: f64,
    pub region: Option<RecognitionRegion>,
    pub confidence_threshold: f32,
    pub timeout: f64,
    pub max_detached: usize,
    pub max_consecutive_failures: u32,
    pub progress_every: u64,
    pub reclaim_every: u64,
    pub merge_threshold: f64,
    pub merge_gap: f64,
    pub display_duration: f64,
    pub similarity: SimilarityMetric,
    pub max_samples: Option<u64>,
    pub time_limit: Option<f64>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            interval: 2.0,
            region: None,
            confidence_threshold: 0.2,
            timeout: 15.0,
            max_detached: 2,
            max_consecutive_failures: 10,
            progress_every: 5,
            reclaim_every: 50,
            merge_threshold: 0.8,
            merge_gap: 5.0,
            display_duration: 2.0,
            similarity: SimilarityMetric::CharacterJaccard,
            max_samples: None,
            time_limit: None,
        }
    }
}

impl ExtractionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive_seconds("interval", self.interval)?;
        positive_seconds("timeout", self.timeout)?;
        non_negative_seconds("merge_gap", self.merge_gap)?;
        non_negative_seconds("display_duration", self.display_duration)?;
        if let Some(limit) = self.time_limit {
            positive_seconds("time_limit", limit)?;
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(ConfigError::invalid("confidence", self.confidence_threshold));
        }
        if !(0.0..=1.0).contains(&self.merge_threshold) {
            return Err(ConfigError::invalid("merge_threshold", self.merge_threshold));
        }
        if self.max_detached == 0 {
            return Err(ConfigError::invalid("max_detached", 0));
        }
        if self.progress_every == 0 {
            return Err(ConfigError::invalid("progress_every", 0));
        }
        if self.max_samples == Some(0) {
            return Err(ConfigError::invalid("max_samples", 0));
        }
        if let Some(region) = self.region.filter(RecognitionRegion::is_empty) {
            return Err(ConfigError::invalid("region", region));
        }
        Ok(())
    }

    pub fn sampler_options(&self) -> SamplerOptions {
        SamplerOptions {
            interval: seconds(self.interval),
            max_consecutive_failures: self.max_consecutive_failures,
            progress_every: self.progress_every,
            reclaim_every: self.reclaim_every,
            max_samples: self.max_samples,
            time_limit: self.time_limit.map(seconds),
        }
    }

    pub fn recognizer_options(&self) -> RecognizerOptions {
        RecognizerOptions {
            timeout: seconds(self.timeout),
            confidence_threshold: self.confidence_threshold,
            max_detached: self.max_detached,
        }
    }

    pub fn merge_options(&self) -> MergeOptions {
        MergeOptions {
            threshold: self.merge_threshold,
            max_gap: seconds(self.merge_gap),
            display_duration: seconds(self.display_duration),
            metric: self.similarity,
        }
    }
}

fn positive_seconds(field: &'static str, value: f64) -> Result<(), ConfigError> {
    match Duration::try_from_secs_f64(value) {
        Ok(duration) if !duration.is_zero() && duration <= MAX_SECONDS => Ok(()),
        _ => Err(ConfigError::invalid(field, value)),
    }
}

fn non_negative_seconds(field: &'static str, value: f64) -> Result<(), ConfigError> {
    match Duration::try_from_secs_f64(value) {
        Ok(duration) if duration <= MAX_SECONDS => Ok(()),
        _ => Err(ConfigError::invalid(field, value)),
    }
}

/// Saturating conversion; out-of-range values are rejected by `validate`.
fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value)
        .map(|duration| duration.min(MAX_SECONDS))
        .unwrap_or(MAX_SECONDS)
}

#[derive(Debug, Clone)]
pub struct EffectiveSettings {
    pub source: Configuration,
    pub engine: EngineKind,
    pub tesseract: TesseractOptions,
    pub output: PathBuf,
    pub format: OutputFormat,
    pub extraction: ExtractionConfig,
    pub reference: Option<PathBuf>,
    pub show_progress: bool,
    pub config_path: Option<PathBuf>,
}

pub fn resolve_settings(
    args: &ExtractArgs,
    sources: &CliSources,
) -> Result<EffectiveSettings, ConfigError> {
    let (file, config_path) = load_config(args.config.as_deref())?;
    merge(args, sources, file, config_path)
}

fn load_config(path_override: Option<&Path>) -> Result<(FileConfig, Option<PathBuf>), ConfigError> {
    if let Some(path) = path_override {
        let path = expand_home_path(&path.to_string_lossy());
        if !path.exists() {
            return Err(ConfigError::NotFound { path });
        }
        return read_config(path);
    }

    let candidates = [project_config_path(), default_config_path()];
    for path in candidates.into_iter().flatten() {
        if path.exists() {
            return read_config(path);
        }
    }
    Ok((FileConfig::default(), None))
}

fn read_config(path: PathBuf) -> Result<(FileConfig, Option<PathBuf>), ConfigError> {
    let contents = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
        path: path.clone(),
        source,
    })?;
    let config = parse_config(&contents, &path)?;
    Ok((config, Some(path)))
}

fn parse_config(contents: &str, path: &Path) -> Result<FileConfig, ConfigError> {
    toml::from_str(contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn merge(
    args: &ExtractArgs,
    sources: &CliSources,
    file: FileConfig,
    config_path: Option<PathBuf>,
) -> Result<EffectiveSettings, ConfigError> {
    let origin = config_path.as_deref();
    let config_dir = origin.and_then(Path::parent);

    let FileConfig {
        backend: file_backend,
        fps: file_fps,
        engine: file_engine,
        language: file_language,
        tesseract: file_tesseract,
        format: file_format,
        output_dir: file_output_dir,
        sampling,
        merge,
    } = file;

    let mut source = Configuration::from_env()?;
    if let Some(name) = normalize_string(args.backend.clone()) {
        source.backend = Backend::from_str(&name)?;
    } else if let Some(name) = normalize_string(file_backend) {
        source.backend = Backend::from_str(&name)
            .map_err(|_| ConfigError::invalid("backend", &name).with_path(origin))?;
    }
    if let Some(input) = args.input.clone() {
        source.input = Some(expand_pathbuf(input));
    }
    if let Some(fps) = args.fps.or(file_fps).or(source.fps) {
        if !(fps.is_finite() && fps > 0.0) {
            let err = ConfigError::invalid("fps", fps);
            return Err(if args.fps.is_some() { err } else { err.with_path(origin) });
        }
        source.fps = Some(fps);
    }

    let mut engine: EngineKind = args.engine.into();
    if !sources.engine_from_cli {
        if let Some(name) = normalize_string(file_engine) {
            engine = EngineKind::from_str(&name)
                .map_err(|_| ConfigError::invalid("engine", &name).with_path(origin))?;
        }
    }

    let mut format = args.format;
    if !sources.format_from_cli {
        if let Some(name) = normalize_string(file_format) {
            format = OutputFormat::from_str(&name, true)
                .map_err(|_| ConfigError::invalid("format", &name).with_path(origin))?;
        }
    }

    let mut tesseract = TesseractOptions::default();
    if let Some(binary) = args.tesseract.clone() {
        tesseract.binary = expand_pathbuf(binary);
    } else if let Some(binary) =
        file_tesseract.and_then(|value| resolve_path_from_config(value, config_dir))
    {
        tesseract.binary = binary;
    }
    tesseract.language =
        normalize_string(args.language.clone()).or(normalize_string(file_language));

    let file_region = match normalize_string(sampling.region) {
        Some(value) => Some(
            RecognitionRegion::from_str(&value)
                .map_err(|_| ConfigError::invalid("region", &value).with_path(origin))?,
        ),
        None => None,
    };
    let file_similarity = match normalize_string(merge.similarity) {
        Some(value) => Some(
            SimilarityMetric::from_str(&value)
                .map_err(|_| ConfigError::invalid("similarity", &value).with_path(origin))?,
        ),
        None => None,
    };

    let defaults = ExtractionConfig::default();
    let file_layer = ExtractionConfig {
        interval: sampling.interval.unwrap_or(defaults.interval),
        region: file_region,
        confidence_threshold: sampling.confidence.unwrap_or(defaults.confidence_threshold),
        timeout: sampling.timeout.unwrap_or(defaults.timeout),
        max_detached: sampling.max_detached.unwrap_or(defaults.max_detached),
        max_consecutive_failures: sampling
            .max_failures
            .unwrap_or(defaults.max_consecutive_failures),
        progress_every: sampling.progress_every.unwrap_or(defaults.progress_every),
        reclaim_every: sampling.reclaim_every.unwrap_or(defaults.reclaim_every),
        merge_threshold: merge.threshold.unwrap_or(defaults.merge_threshold),
        merge_gap: merge.gap.unwrap_or(defaults.merge_gap),
        display_duration: merge.display_duration.unwrap_or(defaults.display_duration),
        similarity: file_similarity.unwrap_or(defaults.similarity),
        max_samples: sampling.max_samples,
        time_limit: sampling.time_limit,
    };
    file_layer.validate().map_err(|err| err.with_path(origin))?;

    let extraction = ExtractionConfig {
        interval: args.interval.unwrap_or(file_layer.interval),
        region: args.region.or(file_layer.region),
        confidence_threshold: args.confidence.unwrap_or(file_layer.confidence_threshold),
        timeout: args.timeout.unwrap_or(file_layer.timeout),
        max_detached: args.max_detached.unwrap_or(file_layer.max_detached),
        max_consecutive_failures: args
            .max_failures
            .unwrap_or(file_layer.max_consecutive_failures),
        progress_every: args.progress_every.unwrap_or(file_layer.progress_every),
        reclaim_every: args.reclaim_every.unwrap_or(file_layer.reclaim_every),
        merge_threshold: args.merge_threshold.unwrap_or(file_layer.merge_threshold),
        merge_gap: args.merge_gap.unwrap_or(file_layer.merge_gap),
        display_duration: args.display_duration.unwrap_or(file_layer.display_duration),
        similarity: args
            .similarity
            .map(SimilarityMetric::from)
            .unwrap_or(file_layer.similarity),
        max_samples: args.max_samples.or(file_layer.max_samples),
        time_limit: args.time_limit.or(file_layer.time_limit),
    };
    extraction.validate()?;

    let output_dir = file_output_dir.and_then(|v| resolve_path_from_config(v, config_dir));
    let output = match args.output.clone() {
        Some(path) => expand_pathbuf(path),
        None => default_output_path(source.input.as_deref(), output_dir.as_deref(), format),
    };

    Ok(EffectiveSettings {
        source,
        engine,
        tesseract,
        output,
        format,
        extraction,
        reference: args.reference.clone().map(expand_pathbuf),
        show_progress: !args.no_progress,
        config_path,
    })
}

/// `<input>.<ext>` next to the input, or inside `output_dir` when one is configured.
fn default_output_path(
    input: Option<&Path>,
    output_dir: Option<&Path>,
    format: OutputFormat,
) -> PathBuf {
    let file_name = input
        .and_then(Path::file_name)
        .map(|name| PathBuf::from(name).with_extension(format.extension()))
        .unwrap_or_else(|| PathBuf::from(FALLBACK_OUTPUT_STEM).with_extension(format.extension()));
    match (output_dir, input.and_then(Path::parent)) {
        (Some(dir), _) => dir.join(file_name),
        (None, Some(parent)) => parent.join(file_name),
        (None, None) => file_name,
    }
}

fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("rs", "subtitle-wer", "subtitle-wer")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

fn project_config_path() -> Option<PathBuf> {
    env::current_dir().ok().map(|dir| dir.join(CONFIG_FILE_NAME))
}

fn normalize_string(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn expand_pathbuf(path: PathBuf) -> PathBuf {
    match path.to_str() {
        Some(s) => expand_home_path(s),
        None => path,
    }
}

fn resolve_path_from_config(value: String, base: Option<&Path>) -> Option<PathBuf> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    let expanded = expand_home_path(trimmed);
    match base {
        Some(base) if !expanded.is_absolute() => Some(base.join(expanded)),
        _ => Some(expanded),
    }
}

fn expand_home_path(value: &str) -> PathBuf {
    if value == "~" {
        if let Some(base) = BaseDirs::new() {
            return base.home_dir().to_path_buf();
        }
    } else if let Some(stripped) = value.strip_prefix("~/") {
        if let Some(base) = BaseDirs::new() {
            return base.home_dir().join(stripped);
        }
    }
    PathBuf::from(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{CliArgs, Command};
    use clap::{CommandFactory, FromArgMatches};

    fn extract_args(extra: &[&str]) -> (ExtractArgs, CliSources) {
        let mut argv = vec!["subtitle-wer", "extract", "/data/clip"];
        argv.extend_from_slice(extra);
        let matches = CliArgs::command().try_get_matches_from(argv).unwrap();
        let cli = CliArgs::from_arg_matches(&matches).unwrap();
        let sources = CliSources {
            engine_from_cli: extra.contains(&"--engine"),
            format_from_cli: extra.contains(&"--format"),
        };
        match cli.command {
            Command::Extract(args) => (args, sources),
            _ => unreachable!(),
        }
    }

    fn file(contents: &str) -> FileConfig {
        parse_config(contents, Path::new("test.toml")).unwrap()
    }

    #[test]
    fn defaults_are_valid() {
        ExtractionConfig::default().validate().unwrap();
        let merge = ExtractionConfig::default().merge_options();
        assert_eq!(merge, MergeOptions::default());
        assert_eq!(ExtractionConfig::default().sampler_options(), SamplerOptions::default());
    }

    #[test]
    fn validate_rejects_out_of_range_values() {
        let cases = [
            ExtractionConfig {
                interval: 0.0,
                ..ExtractionConfig::default()
            },
            ExtractionConfig {
                confidence_threshold: 1.5,
                ..ExtractionConfig::default()
            },
            ExtractionConfig {
                merge_threshold: -0.1,
                ..ExtractionConfig::default()
            },
            ExtractionConfig {
                timeout: f64::NAN,
                ..ExtractionConfig::default()
            },
            ExtractionConfig {
                max_detached: 0,
                ..ExtractionConfig::default()
            },
            ExtractionConfig {
                region: Some(RecognitionRegion::new(0, 0, 0, 10)),
                ..ExtractionConfig::default()
            },
        ];
        for case in cases {
            assert!(
                matches!(case.validate(), Err(ConfigError::InvalidValue { .. })),
                "{case:?}"
            );
        }
    }

    #[test]
    fn durations_must_convert_to_a_usable_length() {
        let huge_timeout = ExtractionConfig {
            timeout: 1e20,
            ..ExtractionConfig::default()
        };
        let err = huge_timeout.validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { field: "timeout", .. }));
        assert_eq!(huge_timeout.recognizer_options().timeout, MAX_SECONDS);

        let vanishing_interval = ExtractionConfig {
            interval: 1e-12,
            ..ExtractionConfig::default()
        };
        let err = vanishing_interval.validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { field: "interval", .. }));

        for (field, config) in [
            (
                "merge_gap",
                ExtractionConfig {
                    merge_gap: f64::INFINITY,
                    ..ExtractionConfig::default()
                },
            ),
            (
                "time_limit",
                ExtractionConfig {
                    time_limit: Some(1e300),
                    ..ExtractionConfig::default()
                },
            ),
        ] {
            let err = config.validate().unwrap_err();
            assert!(
                matches!(err, ConfigError::InvalidValue { field: got, .. } if got == field),
                "{field}"
            );
        }

        let zero_gap = ExtractionConfig {
            merge_gap: 0.0,
            ..ExtractionConfig::default()
        };
        zero_gap.validate().unwrap();
    }

    #[test]
    fn cli_values_override_file_values() {
        let (args, sources) = extract_args(&["--interval", "0.5", "--engine", "noop"]);
        let config = file(
            r#"
            engine = "tesseract"
            format = "json"

            [sampling]
            interval = 3.0
            confidence = 0.6

            [merge]
            gap = 2.5
            similarity = "edit-distance"
            "#,
        );
        let settings = merge(&args, &sources, config, None).unwrap();
        assert_eq!(settings.extraction.interval, 0.5);
        assert_eq!(settings.extraction.confidence_threshold, 0.6);
        assert_eq!(settings.extraction.merge_gap, 2.5);
        assert_eq!(
            settings.extraction.similarity,
            SimilarityMetric::NormalizedEditDistance
        );
        assert_eq!(settings.engine, EngineKind::Noop);
        assert_eq!(settings.format, OutputFormat::Json);
        assert_eq!(settings.output, PathBuf::from("/data/clip.json"));
    }

    #[test]
    fn invalid_file_values_name_the_file() {
        let (args, sources) = extract_args(&[]);
        let config = file("[merge]\nthreshold = 2.0\n");
        let origin = Some(PathBuf::from("/etc/subwer.toml"));
        let err = merge(&args, &sources, config, origin).unwrap_err();
        match err {
            ConfigError::InvalidValue { path, field, .. } => {
                assert_eq!(field, "merge_threshold");
                assert_eq!(path, Some(PathBuf::from("/etc/subwer.toml")));
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn mistyped_sections_are_parse_errors() {
        assert!(parse_config("sampling = 3", Path::new("x.toml")).is_err());
    }

    #[test]
    fn missing_override_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        assert!(matches!(
            load_config(Some(&missing)),
            Err(ConfigError::NotFound { .. })
        ));
    }

    #[test]
    fn relative_paths_resolve_against_config_dir() {
        let base = Path::new("/etc/subwer");
        assert_eq!(
            resolve_path_from_config("out".into(), Some(base)),
            Some(PathBuf::from("/etc/subwer/out"))
        );
        assert_eq!(
            resolve_path_from_config("/abs".into(), Some(base)),
            Some(PathBuf::from("/abs"))
        );
        assert_eq!(resolve_path_from_config("  ".into(), Some(base)), None);
    }

    #[test]
    fn output_defaults_follow_the_input() {
        assert_eq!(
            default_output_path(Some(Path::new("movies/clip")), None, OutputFormat::Srt),
            PathBuf::from("movies/clip.srt")
        );
        assert_eq!(
            default_output_path(None, Some(Path::new("out")), OutputFormat::Json),
            PathBuf::from("out/subtitles.json")
        );
        assert_eq!(
            default_output_path(None, None, OutputFormat::Srt),
            PathBuf::from("subtitles.srt")
        );
    }
}
