mod backends;
mod capabilities;
mod engine;
mod error;
mod plane;
mod request;

pub use backends::tesseract::{TesseractEngine, TesseractOptions, parse_tsv};
pub use capabilities::{EngineCapabilities, EngineKind, build_engine};
pub use engine::{NoopOcrEngine, OcrEngine};
pub use error::OcrError;
pub use plane::LumaPlane;
pub use request::OcrRequest;
pub use subtitle_wer_types::{OcrRegion, OcrResponse, OcrText};
