use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::{
    DynFrameSource, FrameError, FrameResult, FrameSource, SeekOutcome, VideoMetadata,
    YPlaneFrame, frame_index_at,
};

const BACKEND_NAME: &str = "images";
const DEFAULT_FPS: f64 = 25.0;
const EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

/// Frames stored as numbered still images in one directory.
///
/// Files are ordered by the last run of digits in their stem (`frame_2.png`
/// sorts before `frame_10.png`), falling back to the file name.
pub struct ImageSequenceSource {
    frames: Vec<PathBuf>,
    fps: f64,
    width: u32,
    height: u32,
    cached: Option<(u64, YPlaneFrame)>,
}

impl ImageSequenceSource {
    pub fn open<P: AsRef<Path>>(dir: P, fps: f64) -> FrameResult<Self> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(FrameError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("input directory {} does not exist", dir.display()),
            )));
        }

        let mut frames = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() && has_image_extension(&path) {
                frames.push(path);
            }
        }
        if frames.is_empty() {
            return Err(FrameError::configuration(format!(
                "no .png or .jpg frames found in {}",
                dir.display()
            )));
        }
        frames.sort_by_cached_key(|path| sort_key(path));

        let (width, height) = image::image_dimensions(&frames[0])
            .map_err(|err| FrameError::backend_failure(BACKEND_NAME, err.to_string()))?;

        Ok(Self {
            frames,
            fps,
            width,
            height,
            cached: None,
        })
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    fn decode(&self, index: u64, timestamp: Duration) -> FrameResult<YPlaneFrame> {
        let path = &self.frames[index as usize];
        let luma = image::open(path)
            .map_err(|err| FrameError::decode(timestamp, format!("{}: {err}", path.display())))?
            .to_luma8();
        let (width, height) = luma.dimensions();
        let frame_time = Duration::from_secs_f64(index as f64 / self.fps);
        YPlaneFrame::from_owned(width, height, width as usize, Some(frame_time), luma.into_raw())
            .map(|frame| frame.with_frame_index(Some(index)))
    }
}

impl FrameSource for ImageSequenceSource {
    fn name(&self) -> &'static str {
        BACKEND_NAME
    }

    fn metadata(&self) -> VideoMetadata {
        VideoMetadata {
            duration: Some(Duration::from_secs_f64(
                self.frames.len() as f64 / self.fps,
            )),
            fps: Some(self.fps),
            width: Some(self.width),
            height: Some(self.height),
            total_frames: Some(self.frames.len() as u64),
        }
    }

    fn seek(&mut self, timestamp: Duration) -> FrameResult<SeekOutcome> {
        let index = frame_index_at(timestamp, self.fps);
        if index >= self.frames.len() as u64 {
            return Ok(SeekOutcome::EndOfStream);
        }
        if let Some((cached_index, frame)) = &self.cached {
            if *cached_index == index {
                return Ok(SeekOutcome::Frame(frame.clone()));
            }
        }
        let frame = self.decode(index, timestamp)?;
        self.cached = Some((index, frame.clone()));
        Ok(SeekOutcome::Frame(frame))
    }

    fn reclaim(&mut self) {
        self.cached = None;
    }
}

pub fn boxed_images(path: PathBuf, fps: Option<f64>) -> FrameResult<DynFrameSource> {
    let source = ImageSequenceSource::open(path, fps.unwrap_or(DEFAULT_FPS))?;
    Ok(Box::new(source))
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

fn sort_key(path: &Path) -> (Option<u64>, String) {
    let stem = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or_default();
    let digits: String = stem
        .chars()
        .rev()
        .skip_while(|ch| !ch.is_ascii_digit())
        .take_while(|ch| ch.is_ascii_digit())
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    let number = digits.parse::<u64>().ok();
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    (number, name)
}
