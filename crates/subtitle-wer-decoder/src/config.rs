use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::core::{DynFrameSource, FrameError, FrameResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Mock,
    Images,
}

impl FromStr for Backend {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mock" => Ok(Backend::Mock),
            "images" | "image-sequence" => Ok(Backend::Images),
            other => Err(FrameError::configuration(format!(
                "unknown backend '{other}'"
            ))),
        }
    }
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Mock => "mock",
            Backend::Images => "images",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Backend::Mock => "synthetic frames for dry runs and tests",
            Backend::Images => "directory of numbered still frames decoded at a fixed rate",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct Configuration {
    pub backend: Backend,
    pub input: Option<PathBuf>,
    pub fps: Option<f64>,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            backend: Backend::Images,
            input: None,
            fps: None,
        }
    }
}

impl Configuration {
    pub fn from_env() -> FrameResult<Self> {
        let mut config = Configuration::default();
        if let Ok(backend) = env::var("SUBWER_BACKEND") {
            config.backend = Backend::from_str(&backend)?;
        }
        if let Ok(path) = env::var("SUBWER_INPUT") {
            config.input = Some(PathBuf::from(path));
        }
        if let Ok(fps) = env::var("SUBWER_FPS") {
            config.fps = Some(parse_fps(&fps).ok_or_else(|| {
                FrameError::configuration(format!(
                    "failed to parse SUBWER_FPS='{fps}' as a positive frame rate"
                ))
            })?);
        }
        Ok(config)
    }

    pub fn available_backends() -> Vec<Backend> {
        vec![Backend::Images, Backend::Mock]
    }

    pub fn create_source(&self) -> FrameResult<DynFrameSource> {
        if let Some(fps) = self.fps {
            if !(fps.is_finite() && fps > 0.0) {
                return Err(FrameError::configuration(format!(
                    "frame rate must be positive, got {fps}"
                )));
            }
        }

        match self.backend {
            Backend::Mock => crate::backends::mock::boxed_mock(self.fps),
            Backend::Images => {
                let path = self.input.clone().ok_or_else(|| {
                    FrameError::configuration("images backend requires an input directory")
                })?;
                crate::backends::images::boxed_images(path, self.fps)
            }
        }
    }
}

fn parse_fps(value: &str) -> Option<f64> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|fps| fps.is_finite() && *fps > 0.0)
}
