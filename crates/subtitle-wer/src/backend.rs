use std::fmt::Write as _;

use subtitle_wer_decoder::Configuration;
use subtitle_wer_ocr::{EngineCapabilities, TesseractOptions};

/// Lists frame sources and the recognition engines found on this machine.
pub fn display_available_backends(tesseract: &TesseractOptions) -> String {
    let mut output = String::new();
    let _ = writeln!(&mut output, "available backends:");
    for backend in Configuration::available_backends() {
        let _ = writeln!(&mut output, "  {:<8} {}", backend.as_str(), backend.description());
    }

    let capabilities = EngineCapabilities::detect(tesseract);
    let _ = writeln!(&mut output, "available engines:");
    for engine in capabilities.available() {
        let _ = writeln!(&mut output, "  {engine}");
    }
    match &capabilities.tesseract {
        Some(version) => {
            let _ = writeln!(&mut output, "tesseract: {version}");
        }
        None => {
            let _ = writeln!(
                &mut output,
                "tesseract: not found at '{}'",
                tesseract.binary.display()
            );
        }
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn lists_sources_and_the_noop_engine() {
        let options = TesseractOptions {
            binary: PathBuf::from("/nonexistent/tesseract-binary"),
            ..TesseractOptions::default()
        };
        let text = display_available_backends(&options);
        assert!(text.contains("  images "));
        assert!(text.contains("  mock "));
        assert!(text.contains("  noop\n"));
        assert!(text.contains("tesseract: not found at '/nonexistent/tesseract-binary'"));
    }
}
