use std::io::{Cursor, Write};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};

use image::{DynamicImage, GrayImage, ImageOutputFormat};
use subtitle_wer_types::{OcrRegion, OcrResponse, OcrText};
use tracing::{debug, trace};

use crate::{OcrEngine, OcrError, OcrRequest};

const ENGINE_NAME: &str = "tesseract";
/// Page segmentation mode 6: a single uniform block of text.
const DEFAULT_PSM: u8 = 6;

#[derive(Debug, Clone)]
pub struct TesseractOptions {
    pub binary: PathBuf,
    pub language: Option<String>,
    pub psm: u8,
}

impl Default for TesseractOptions {
    fn default() -> Self {
        Self {
            binary: PathBuf::from(ENGINE_NAME),
            language: None,
            psm: DEFAULT_PSM,
        }
    }
}

/// Runs the `tesseract` command line tool once per region.
///
/// The cropped region is piped to the process as PNG and the TSV report is
/// folded into one [`OcrText`] per detected line.
#[derive(Debug)]
pub struct TesseractEngine {
    options: TesseractOptions,
}

impl TesseractEngine {
    pub fn new(options: TesseractOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &TesseractOptions {
        &self.options
    }

    /// Reports the installed version, or why the binary cannot be run.
    pub fn probe_version(&self) -> Result<String, OcrError> {
        let output = Command::new(&self.options.binary)
            .arg("--version")
            .stdin(Stdio::null())
            .output()
            .map_err(|err| {
                OcrError::unavailable(
                    ENGINE_NAME,
                    format!("failed to run {}: {err}", self.options.binary.display()),
                )
            })?;
        if !output.status.success() {
            return Err(OcrError::unavailable(
                ENGINE_NAME,
                format!("--version exited with {}", output.status),
            ));
        }
        // Older releases print the banner on stderr.
        let banner = if output.stdout.is_empty() {
            output.stderr
        } else {
            output.stdout
        };
        Ok(String::from_utf8_lossy(&banner)
            .lines()
            .next()
            .unwrap_or(ENGINE_NAME)
            .trim()
            .to_string())
    }

    fn run(&self, image: &GrayImage) -> Result<String, OcrError> {
        let mut png = Cursor::new(Vec::new());
        DynamicImage::ImageLuma8(image.clone())
            .write_to(&mut png, ImageOutputFormat::Png)
            .map_err(|err| OcrError::backend(format!("failed to encode region: {err}")))?;

        let mut command = Command::new(&self.options.binary);
        command.arg("stdin").arg("stdout");
        if let Some(language) = &self.options.language {
            command.arg("-l").arg(language);
        }
        command
            .arg("--psm")
            .arg(self.options.psm.to_string())
            .arg("tsv")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command.spawn().map_err(|err| {
            OcrError::backend(format!(
                "failed to spawn {}: {err}",
                self.options.binary.display()
            ))
        })?;
        feed_stdin(&mut child, png.get_ref())?;
        let output = child
            .wait_with_output()
            .map_err(|err| OcrError::backend(format!("tesseract did not finish: {err}")))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OcrError::backend(format!(
                "tesseract exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Default for TesseractEngine {
    fn default() -> Self {
        Self::new(TesseractOptions::default())
    }
}

impl OcrEngine for TesseractEngine {
    fn name(&self) -> &'static str {
        ENGINE_NAME
    }

    fn warm_up(&self) -> Result<(), OcrError> {
        let version = self.probe_version()?;
        debug!(engine = ENGINE_NAME, %version, "engine ready");
        Ok(())
    }

    fn recognize(&self, request: &OcrRequest<'_>) -> Result<OcrResponse, OcrError> {
        let plane = request.plane();
        if request.regions().is_empty() {
            let report = self.run(&plane.to_image()?)?;
            return Ok(OcrResponse::new(parse_tsv(&report, 0.0, 0.0)));
        }

        let mut texts = Vec::new();
        for region in request.regions() {
            let image = plane.crop(region)?;
            let report = self.run(&image)?;
            let lines = parse_tsv(&report, region.x, region.y);
            trace!(lines = lines.len(), "tesseract region parsed");
            texts.extend(lines);
        }
        Ok(OcrResponse::new(texts))
    }
}

/// Writes `bytes` to the child's stdin and closes it. On failure the child is
/// killed and reaped before the error is returned.
fn feed_stdin(child: &mut Child, bytes: &[u8]) -> Result<(), OcrError> {
    let Some(mut stdin) = child.stdin.take() else {
        return Ok(());
    };
    if let Err(err) = stdin.write_all(bytes) {
        drop(stdin);
        let _ = child.kill();
        let _ = child.wait();
        return Err(OcrError::backend(format!("failed to write image: {err}")));
    }
    Ok(())
}

#[derive(Default)]
struct LineAccumulator {
    key: (u32, u32, u32, u32),
    words: Vec<String>,
    confidence_sum: f32,
    left: f32,
    top: f32,
    right: f32,
    bottom: f32,
}

impl LineAccumulator {
    fn push(&mut self, word: &str, confidence: f32, bbox: (f32, f32, f32, f32)) {
        let (left, top, width, height) = bbox;
        if self.words.is_empty() {
            self.left = left;
            self.top = top;
            self.right = left + width;
            self.bottom = top + height;
        } else {
            self.left = self.left.min(left);
            self.top = self.top.min(top);
            self.right = self.right.max(left + width);
            self.bottom = self.bottom.max(top + height);
        }
        self.words.push(word.to_string());
        self.confidence_sum += confidence;
    }

    fn finish(self, offset_x: f32, offset_y: f32) -> Option<OcrText> {
        if self.words.is_empty() {
            return None;
        }
        let confidence = self.confidence_sum / self.words.len() as f32 / 100.0;
        let region = OcrRegion::new(
            self.left + offset_x,
            self.top + offset_y,
            self.right - self.left,
            self.bottom - self.top,
        );
        Some(OcrText::new(region, self.words.join(" ")).with_confidence(confidence))
    }
}

/// Folds tesseract TSV output into one text per line, in reading order.
///
/// Word rows (level 5) with a negative confidence or blank text are skipped.
/// Confidences are averaged per line and scaled to `0.0..=1.0`; boxes are
/// shifted by the crop offset so they are expressed in frame pixels.
pub fn parse_tsv(report: &str, offset_x: f32, offset_y: f32) -> Vec<OcrText> {
    let mut texts = Vec::new();
    let mut current = LineAccumulator::default();

    for row in report.lines().skip(1) {
        let columns: Vec<&str> = row.splitn(12, '\t').collect();
        if columns.len() < 12 || columns[0] != "5" {
            continue;
        }
        let Some(numbers) = columns[..11]
            .iter()
            .map(|value| value.trim().parse::<f32>().ok())
            .collect::<Option<Vec<_>>>()
        else {
            continue;
        };
        let word = columns[11].trim();
        let confidence = numbers[10];
        if confidence < 0.0 || word.is_empty() {
            continue;
        }
        let key = (
            numbers[1] as u32,
            numbers[2] as u32,
            numbers[3] as u32,
            numbers[4] as u32,
        );
        if !current.words.is_empty() && current.key != key {
            let finished = std::mem::take(&mut current);
            texts.extend(finished.finish(offset_x, offset_y));
        }
        current.key = key;
        current.push(word, confidence, (numbers[6], numbers[7], numbers[8], numbers[9]));
    }
    texts.extend(current.finish(offset_x, offset_y));
    texts
}
