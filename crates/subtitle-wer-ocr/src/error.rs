use thiserror::Error;

#[derive(Debug, Error)]
pub enum OcrError {
    #[error("plane data length {provided} is smaller than stride * height ({required})")]
    InsufficientPlaneData { provided: usize, required: usize },
    #[error(
        "plane dimensions overflowed while validating stride * height (stride={stride}, height={height})"
    )]
    PlaneOverflow { stride: usize, height: u32 },
    #[error("region {region} lies outside the {width}x{height} plane")]
    RegionOutOfBounds {
        region: String,
        width: u32,
        height: u32,
    },
    #[error("{engine} engine is unavailable: {message}")]
    Unavailable {
        engine: &'static str,
        message: String,
    },
    #[error("backend error: {message}")]
    Backend { message: String },
}

impl OcrError {
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }

    pub fn unavailable(engine: &'static str, message: impl Into<String>) -> Self {
        Self::Unavailable {
            engine,
            message: message.into(),
        }
    }
}
