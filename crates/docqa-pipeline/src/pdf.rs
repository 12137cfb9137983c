//! PDF collaborators backed by the poppler command-line tools (`pdfinfo`,
//! `pdftotext`, `pdftoppm`) and the `tesseract` OCR engine.
use anyhow::{bail, Context, Result};
use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::{debug, warn};

use docqa_core::traits::{OcrEngine, PageRasterizer, TextExtractor};
use docqa_core::types::PageImage;

fn run(cmd: &mut Command) -> Result<Vec<u8>> {
    let program = format!("{:?}", cmd.get_program());
    let out = cmd
        .output()
        .with_context(|| format!("failed to start {program} (is it installed?)"))?;
    if !out.status.success() {
        bail!(
            "{} exited with {}: {}",
            program,
            out.status,
            String::from_utf8_lossy(&out.stderr).trim()
        );
    }
    Ok(out.stdout)
}

/// Feed `input` to `cmd` on stdin and collect its stdout. The child is always
/// reaped, including when it stops reading early.
fn run_with_input(cmd: &mut Command, input: &[u8]) -> Result<Vec<u8>> {
    let program = format!("{:?}", cmd.get_program());
    let mut child = cmd
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("failed to start {program} (is it installed?)"))?;
    let written = match child.stdin.take() {
        Some(mut stdin) => stdin.write_all(input),
        None => Err(std::io::Error::other("stdin unavailable")),
    };
    if let Err(e) = written {
        if let Err(kill) = child.kill() {
            warn!("Could not kill {}: {}", program, kill);
        }
        let status = child.wait()?;
        bail!("writing to {} failed ({}): {}", program, status, e);
    }
    let out = child.wait_with_output()?;
    if !out.status.success() {
        bail!(
            "{} exited with {}: {}",
            program,
            out.status,
            String::from_utf8_lossy(&out.stderr).trim()
        );
    }
    Ok(out.stdout)
}

/// Page count from `pdfinfo`.
pub fn pdf_page_count(pdf: &Path) -> Result<usize> {
    let info = String::from_utf8_lossy(&run(Command::new("pdfinfo").arg(pdf))?).to_string();
    info.lines()
        .find_map(|line| line.strip_prefix("Pages:"))
        .and_then(|n| n.trim().parse().ok())
        .with_context(|| format!("pdfinfo reported no page count for {}", pdf.display()))
}

/// Per-page text via `pdftotext`, which terminates every page with a form feed.
#[derive(Debug, Clone, Default)]
pub struct PdfToText;

impl TextExtractor for PdfToText {
    fn extract_pages(&self, pdf: &Path) -> Result<Vec<String>> {
        let raw = run(Command::new("pdftotext")
            .args(["-enc", "UTF-8"])
            .arg(pdf)
            .arg("-"))?;
        let text = String::from_utf8_lossy(&raw);
        let mut pages: Vec<String> = text.split('\x0c').map(str::to_string).collect();
        // Text after the last form feed is empty.
        if pages.len() > 1 && pages.last().is_some_and(|p| p.trim().is_empty()) {
            pages.pop();
        }
        debug!("pdftotext: {} pages from {}", pages.len(), pdf.display());
        Ok(pages)
    }
}

/// Page rendering via `pdftoppm` into a scratch directory.
#[derive(Debug, Clone)]
pub struct PopplerRasterizer {
    dpi: u32,
}

impl PopplerRasterizer {
    pub fn new(dpi: u32) -> Self {
        Self { dpi }
    }
}

impl Default for PopplerRasterizer {
    fn default() -> Self {
        Self::new(150)
    }
}

impl PageRasterizer for PopplerRasterizer {
    fn page_count(&self, pdf: &Path) -> Result<usize> {
        pdf_page_count(pdf)
    }

    fn render_page(&self, pdf: &Path, page_index: usize) -> Result<PageImage> {
        let scratch = tempfile::tempdir()?;
        let root = scratch.path().join("page");
        let page = (page_index + 1).to_string();
        let dpi = self.dpi.to_string();
        run(Command::new("pdftoppm")
            .args(["-f", &page, "-l", &page, "-r", &dpi, "-png", "-singlefile"])
            .arg(pdf)
            .arg(&root))?;
        let png = root.with_extension("png");
        let bytes = std::fs::read(&png).with_context(|| {
            format!(
                "pdftoppm produced no image for page {} of {}",
                page_index,
                pdf.display()
            )
        })?;
        Ok(PageImage::png(bytes))
    }
}

/// OCR through the `tesseract` binary, image on stdin and text on stdout.
#[derive(Debug, Clone)]
pub struct TesseractOcr {
    lang: String,
}

impl TesseractOcr {
    pub fn new(lang: &str) -> Self {
        Self {
            lang: lang.to_string(),
        }
    }
}

impl Default for TesseractOcr {
    fn default() -> Self {
        Self::new("eng")
    }
}

impl OcrEngine for TesseractOcr {
    fn recognize(&self, page: &PageImage) -> Result<String> {
        let out = run_with_input(
            Command::new("tesseract").args(["stdin", "stdout", "-l", &self.lang]),
            &page.bytes,
        )?;
        Ok(String::from_utf8_lossy(&out).to_string())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn piped_input_reaches_the_child() {
        let out = run_with_input(&mut Command::new("cat"), b"scanned page").unwrap();
        assert_eq!(out, b"scanned page");
    }

    #[test]
    fn child_that_stops_reading_is_an_error() {
        // `true` exits without draining stdin, so a large page hits a closed pipe.
        let page = vec![0u8; 4 << 20];
        let err = run_with_input(&mut Command::new("true"), &page).unwrap_err();
        assert!(err.to_string().contains("writing to"), "{err:#}");
    }

    #[test]
    fn failing_child_reports_its_stderr() {
        let script = "cat >/dev/null; echo no language data >&2; exit 1";
        let err = run_with_input(Command::new("sh").args(["-c", script]), b"png").unwrap_err();
        assert!(err.to_string().contains("no language data"), "{err:#}");
    }
}
