use std::time::Duration;

use crate::core::{
    DynFrameSource, FrameResult, FrameSource, SeekOutcome, VideoMetadata, YPlaneFrame,
    frame_index_at,
};

const DEFAULT_FPS: f64 = 25.0;

/// Deterministic synthetic frames, useful for dry runs of the sampling loop.
pub struct MockSource {
    width: u32,
    height: u32,
    stride: usize,
    fps: f64,
    frame_count: u64,
}

impl MockSource {
    pub fn new(width: u32, height: u32, fps: f64, frame_count: u64) -> Self {
        Self {
            width,
            height,
            stride: width as usize,
            fps,
            frame_count,
        }
    }

    fn render(&self, index: u64) -> FrameResult<YPlaneFrame> {
        let mut buffer = vec![0u8; self.stride * self.height as usize];
        for (row, chunk) in buffer.chunks_mut(self.stride).enumerate() {
            let value = ((row as u64 + index) % 256) as u8;
            chunk.fill(value);
        }
        let timestamp = Duration::from_secs_f64(index as f64 / self.fps);
        YPlaneFrame::from_owned(self.width, self.height, self.stride, Some(timestamp), buffer)
            .map(|frame| frame.with_frame_index(Some(index)))
    }
}

impl Default for MockSource {
    fn default() -> Self {
        Self::new(640, 360, DEFAULT_FPS, 250)
    }
}

impl FrameSource for MockSource {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn metadata(&self) -> VideoMetadata {
        VideoMetadata {
            duration: Some(Duration::from_secs_f64(self.frame_count as f64 / self.fps)),
            fps: Some(self.fps),
            width: Some(self.width),
            height: Some(self.height),
            total_frames: Some(self.frame_count),
        }
    }

    fn seek(&mut self, timestamp: Duration) -> FrameResult<SeekOutcome> {
        let index = frame_index_at(timestamp, self.fps);
        if index >= self.frame_count {
            return Ok(SeekOutcome::EndOfStream);
        }
        self.render(index).map(SeekOutcome::Frame)
    }
}

pub fn boxed_mock(fps: Option<f64>) -> FrameResult<DynFrameSource> {
    let mut source = MockSource::default();
    if let Some(fps) = fps {
        source.fps = fps;
    }
    Ok(Box::new(source))
}
