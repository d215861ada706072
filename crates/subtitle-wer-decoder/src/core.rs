use std::time::Duration;

pub use subtitle_wer_types::{FrameError, FrameResult, YPlaneFrame};

pub type DynFrameSource = Box<dyn FrameSource>;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct VideoMetadata {
    pub duration: Option<Duration>,
    pub fps: Option<f64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub total_frames: Option<u64>,
}

impl VideoMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_duration_and_fps(duration: Duration, fps: f64) -> Self {
        Self {
            duration: Some(duration),
            fps: Some(fps),
            ..Default::default()
        }
    }

    pub fn calculate_total_frames(&self) -> Option<u64> {
        if let Some(total) = self.total_frames {
            return Some(total);
        }

        if let (Some(duration), Some(fps)) = (self.duration, self.fps) {
            let total = (duration.as_secs_f64() * fps).round();
            if total.is_finite() && total >= 0.0 {
                return Some(total as u64);
            }
        }

        None
    }

    pub fn calculate_duration(&self) -> Option<Duration> {
        if let Some(duration) = self.duration {
            return Some(duration);
        }
        match (self.total_frames, self.fps) {
            (Some(total), Some(fps)) if fps > 0.0 => {
                Some(Duration::from_secs_f64(total as f64 / fps))
            }
            _ => None,
        }
    }
}

/// What a source returns for a requested instant.
#[derive(Debug, Clone)]
pub enum SeekOutcome {
    Frame(YPlaneFrame),
    EndOfStream,
}

impl SeekOutcome {
    pub fn into_frame(self) -> Option<YPlaneFrame> {
        match self {
            SeekOutcome::Frame(frame) => Some(frame),
            SeekOutcome::EndOfStream => None,
        }
    }
}

/// Random-access luma frame source.
///
/// Sources are driven from a single control task and are never shared, so
/// `seek` takes `&mut self` and may block while decoding.
pub trait FrameSource: Send + 'static {
    fn name(&self) -> &'static str;

    fn metadata(&self) -> VideoMetadata;

    /// Decodes the frame nearest to `timestamp`.
    ///
    /// A failure to decode one frame is reported as an error; running past the
    /// last frame is `Ok(SeekOutcome::EndOfStream)`.
    fn seek(&mut self, timestamp: Duration) -> FrameResult<SeekOutcome>;

    fn frame_rate(&self) -> f64 {
        self.metadata().fps.unwrap_or(0.0)
    }

    fn frame_count(&self) -> Option<u64> {
        self.metadata().calculate_total_frames()
    }

    /// Hint to drop cached buffers. Called periodically by long-running samplers.
    fn reclaim(&mut self) {}
}

/// Nearest frame index for `timestamp` at `fps`.
pub fn frame_index_at(timestamp: Duration, fps: f64) -> u64 {
    if !(fps.is_finite() && fps > 0.0) {
        return 0;
    }
    let index = (timestamp.as_secs_f64() * fps).round();
    if index.is_finite() && index > 0.0 {
        index as u64
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_derives_total_frames_from_duration() {
        let metadata = VideoMetadata::with_duration_and_fps(Duration::from_secs(10), 29.97);
        assert_eq!(metadata.calculate_total_frames(), Some(300));
    }

    #[test]
    fn metadata_derives_duration_from_frames() {
        let metadata = VideoMetadata {
            total_frames: Some(50),
            fps: Some(25.0),
            ..VideoMetadata::default()
        };
        assert_eq!(metadata.calculate_duration(), Some(Duration::from_secs(2)));
    }

    #[test]
    fn frame_index_rounds_to_nearest() {
        assert_eq!(frame_index_at(Duration::from_secs(2), 29.97), 60);
        assert_eq!(frame_index_at(Duration::from_millis(1010), 10.0), 10);
        assert_eq!(frame_index_at(Duration::from_millis(1060), 10.0), 11);
        assert_eq!(frame_index_at(Duration::from_secs(3), 0.0), 0);
    }
}
