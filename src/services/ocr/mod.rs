// OCR Service Module - word-level text recognition with bounding boxes
//
// The detector only needs tokens and their boxes, so the backend sits behind
// a small trait. The default backend drives the Tesseract CLI and reads its
// TSV output.

use image::{DynamicImage, GrayImage, ImageFormat};
use std::io::{Cursor, Write};
use std::process::{Command, Stdio};
use tracing::{debug, info};

use crate::core::errors::{DetectionError, DetectionResult};

/// One recognized word
#[derive(Debug, Clone, PartialEq)]
pub struct OcrToken {
    pub text: String,
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
    pub confidence: f32,
}

/// Word-level OCR backend
pub trait OcrEngine: Send + Sync {
    /// Recognize words in a grayscale image
    ///
    /// `language` is a backend-specific hint such as `rus+eng`.
    fn recognize(&self, image: &GrayImage, language: &str) -> DetectionResult<Vec<OcrToken>>;
}

/// Tesseract CLI backend (`tesseract stdin stdout -l <lang> tsv`)
pub struct TesseractEngine {
    command: String,
}

impl TesseractEngine {
    pub fn new(command: impl Into<String>) -> Self {
        let command = command.into();
        info!("OCR backend: {}", command);
        Self { command }
    }

    /// Reported version, or `None` when the binary cannot be run
    pub fn version(&self) -> Option<String> {
        let output = Command::new(&self.command).arg("--version").output().ok()?;
        let text = String::from_utf8_lossy(&output.stdout).to_string()
            + &String::from_utf8_lossy(&output.stderr);
        text.lines().next().map(|l| l.trim().to_string())
    }
}

impl OcrEngine for TesseractEngine {
    fn recognize(&self, image: &GrayImage, language: &str) -> DetectionResult<Vec<OcrToken>> {
        let mut png = Vec::new();
        DynamicImage::ImageLuma8(image.clone()).write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;

        let spawn_error = |source| DetectionError::SpawnFailed {
            command: self.command.clone(),
            source,
        };

        let mut child = Command::new(&self.command)
            .args(["stdin", "stdout", "-l", language, "tsv"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(spawn_error)?;

        // Feed stdin from a separate thread so a full stdout pipe cannot deadlock us
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| DetectionError::InvalidOutput("tesseract stdin unavailable".to_string()))?;
        let writer = std::thread::spawn(move || stdin.write_all(&png));

        let output = child.wait_with_output().map_err(spawn_error)?;
        if let Ok(Err(e)) = writer.join() {
            debug!("tesseract closed stdin early: {}", e);
        }

        if !output.status.success() {
            return Err(DetectionError::BackendFailed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let tokens = parse_tsv(&String::from_utf8_lossy(&output.stdout))?;
        debug!("tesseract returned {} words", tokens.len());
        Ok(tokens)
    }
}

/// Parse Tesseract TSV output into word tokens
///
/// Columns: level page_num block_num par_num line_num word_num left top width
/// height conf text. Only rows with non-empty text are kept.
pub fn parse_tsv(tsv: &str) -> DetectionResult<Vec<OcrToken>> {
    let mut tokens = Vec::new();

    for (line_no, line) in tsv.lines().enumerate() {
        if line_no == 0 && line.starts_with("level") {
            continue;
        }
        if line.trim().is_empty() {
            continue;
        }

        let columns: Vec<&str> = line.splitn(12, '\t').collect();
        if columns.len() < 12 {
            // Non-word rows may omit the text column entirely
            if columns.len() == 11 {
                continue;
            }
            return Err(DetectionError::InvalidOutput(format!(
                "line {} has {} columns",
                line_no + 1,
                columns.len()
            )));
        }

        let text = columns[11].trim();
        if text.is_empty() {
            continue;
        }

        let number = |idx: usize| -> DetectionResult<i64> {
            columns[idx].trim().parse::<i64>().map_err(|_| {
                DetectionError::InvalidOutput(format!(
                    "line {} column {} is not a number: {:?}",
                    line_no + 1,
                    idx + 1,
                    columns[idx]
                ))
            })
        };

        let confidence = columns[10].trim().parse::<f32>().unwrap_or(-1.0);

        tokens.push(OcrToken {
            text: text.to_string(),
            left: number(6)?.max(0) as u32,
            top: number(7)?.max(0) as u32,
            width: number(8)?.max(0) as u32,
            height: number(9)?.max(0) as u32,
            confidence,
        });
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext
1\t1\t0\t0\t0\t0\t0\t0\t640\t480\t-1\t
4\t1\t1\t1\t1\t0\t20\t30\t300\t24\t-1\t
5\t1\t1\t1\t1\t1\t20\t30\t60\t24\t95.5\tJoin
5\t1\t1\t1\t1\t2\t90\t31\t140\t22\t91.2\tt.me/oldchan
5\t1\t1\t1\t1\t3\t240\t30\t8\t4\t40.0\t.
";

    #[test]
    fn test_parse_tsv_keeps_words() {
        let tokens = parse_tsv(SAMPLE).unwrap();
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[1].text, "t.me/oldchan");
        assert_eq!(
            (tokens[1].left, tokens[1].top, tokens[1].width, tokens[1].height),
            (90, 31, 140, 22)
        );
        assert!((tokens[1].confidence - 91.2).abs() < 1e-3);
    }

    #[test]
    fn test_parse_tsv_rejects_garbage_numbers() {
        let bad = "5\t1\t1\t1\t1\t1\tleft\t30\t60\t24\t95\tword\n";
        assert!(matches!(parse_tsv(bad), Err(DetectionError::InvalidOutput(_))));
    }

    #[test]
    fn test_parse_empty_output() {
        assert!(parse_tsv("").unwrap().is_empty());
    }

    #[test]
    fn test_missing_binary_is_spawn_error() {
        let engine = TesseractEngine::new("/nonexistent/tesseract-binary");
        let result = engine.recognize(&GrayImage::new(4, 4), "eng");
        assert!(matches!(result, Err(DetectionError::SpawnFailed { .. })));
        assert!(engine.version().is_none());
    }
}
