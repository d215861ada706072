use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::backends::tesseract::{TesseractEngine, TesseractOptions};
use crate::engine::{NoopOcrEngine, OcrEngine};
use crate::error::OcrError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineKind {
    Auto,
    Tesseract,
    Noop,
}

impl FromStr for EngineKind {
    type Err = OcrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(EngineKind::Auto),
            "tesseract" => Ok(EngineKind::Tesseract),
            "noop" | "none" => Ok(EngineKind::Noop),
            other => Err(OcrError::backend(format!("unknown OCR engine '{other}'"))),
        }
    }
}

impl EngineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineKind::Auto => "auto",
            EngineKind::Tesseract => "tesseract",
            EngineKind::Noop => "noop",
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which recognition engines this machine can run.
///
/// Probed once at startup and passed to whoever builds engines, so engine
/// availability is never re-checked mid-run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineCapabilities {
    pub tesseract: Option<String>,
}

impl EngineCapabilities {
    pub fn detect(options: &TesseractOptions) -> Self {
        let tesseract = TesseractEngine::new(options.clone()).probe_version().ok();
        Self { tesseract }
    }

    pub fn available(&self) -> Vec<EngineKind> {
        let mut kinds = Vec::new();
        if self.tesseract.is_some() {
            kinds.push(EngineKind::Tesseract);
        }
        kinds.push(EngineKind::Noop);
        kinds
    }

    /// Maps a requested kind to a concrete, available engine.
    pub fn resolve(&self, requested: EngineKind) -> Result<EngineKind, OcrError> {
        match requested {
            EngineKind::Noop => Ok(EngineKind::Noop),
            EngineKind::Tesseract | EngineKind::Auto => {
                if self.tesseract.is_some() {
                    Ok(EngineKind::Tesseract)
                } else {
                    Err(OcrError::unavailable(
                        "tesseract",
                        "binary not found; install tesseract or pass --engine noop",
                    ))
                }
            }
        }
    }
}

pub fn build_engine(
    requested: EngineKind,
    capabilities: &EngineCapabilities,
    options: TesseractOptions,
) -> Result<Arc<dyn OcrEngine>, OcrError> {
    match capabilities.resolve(requested)? {
        EngineKind::Tesseract => Ok(Arc::new(TesseractEngine::new(options))),
        EngineKind::Noop | EngineKind::Auto => Ok(Arc::new(NoopOcrEngine)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_engine_names() {
        assert_eq!("Tesseract".parse::<EngineKind>().unwrap(), EngineKind::Tesseract);
        assert_eq!("none".parse::<EngineKind>().unwrap(), EngineKind::Noop);
        assert!("paddle".parse::<EngineKind>().is_err());
    }

    #[test]
    fn auto_requires_a_real_engine() {
        let none = EngineCapabilities::default();
        assert_eq!(none.available(), vec![EngineKind::Noop]);
        assert!(none.resolve(EngineKind::Auto).is_err());
        assert_eq!(none.resolve(EngineKind::Noop).unwrap(), EngineKind::Noop);

        let installed = EngineCapabilities {
            tesseract: Some("tesseract 5.3.0".into()),
        };
        assert_eq!(
            installed.resolve(EngineKind::Auto).unwrap(),
            EngineKind::Tesseract
        );
    }

    #[test]
    fn build_engine_returns_requested_engine() {
        let installed = EngineCapabilities {
            tesseract: Some("tesseract 5.3.0".into()),
        };
        let engine =
            build_engine(EngineKind::Auto, &installed, TesseractOptions::default()).unwrap();
        assert_eq!(engine.name(), "tesseract");
        let engine = build_engine(
            EngineKind::Noop,
            &EngineCapabilities::default(),
            TesseractOptions::default(),
        )
        .unwrap();
        assert_eq!(engine.name(), "noop");
    }
}
