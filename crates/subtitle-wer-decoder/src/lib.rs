pub mod backends;
pub mod config;
pub mod core;

pub use config::{Backend, Configuration};
pub use core::{
    DynFrameSource, FrameError, FrameResult, FrameSource, SeekOutcome, VideoMetadata,
    YPlaneFrame, frame_index_at,
};
