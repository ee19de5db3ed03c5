//! Page rasterization and OCR capability seams.
//!
//! Both are external capabilities consumed through narrow async traits:
//! the shipped implementations drive the `pdftoppm` and `tesseract`
//! binaries through `tokio::process`, and tests substitute doubles. OCR is
//! best-effort — an unreadable page yields empty text, which the pipeline
//! tolerates.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, instrument};

use super::IngestError;

/// Renders each page of a PDF into an image file.
#[async_trait]
pub trait PageRasterizer: Send + Sync {
    /// Rasterizes `pdf_bytes` into per-page images under `scratch_dir`,
    /// returned in page order.
    async fn rasterize(
        &self,
        pdf_bytes: &[u8],
        scratch_dir: &Path,
    ) -> Result<Vec<PathBuf>, IngestError>;
}

/// Extracts text from one rasterized page image.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Runs recognition over `page` with the given script hints
    /// (e.g. `["eng", "guj"]`). May return an empty string.
    async fn recognize(&self, page: &Path, scripts: &[&str]) -> Result<String, IngestError>;
}

/// `pdftoppm`-backed rasterizer (the poppler utilities).
#[derive(Clone, Debug)]
pub struct PdftoppmRasterizer {
    dpi: u32,
    timeout: Duration,
}

impl PdftoppmRasterizer {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self { dpi: 200, timeout }
    }

    #[must_use]
    pub fn with_dpi(mut self, dpi: u32) -> Self {
        self.dpi = dpi;
        self
    }
}

#[async_trait]
impl PageRasterizer for PdftoppmRasterizer {
    #[instrument(skip(self, pdf_bytes), fields(bytes = pdf_bytes.len()), err)]
    async fn rasterize(
        &self,
        pdf_bytes: &[u8],
        scratch_dir: &Path,
    ) -> Result<Vec<PathBuf>, IngestError> {
        let input = scratch_dir.join("input.pdf");
        tokio::fs::write(&input, pdf_bytes)
            .await
            .map_err(|e| IngestError::Rasterize(format!("write scratch pdf: {e}")))?;

        let prefix = scratch_dir.join("page");
        let mut command = Command::new("pdftoppm");
        command
            .arg("-png")
            .arg("-r")
            .arg(self.dpi.to_string())
            .arg(&input)
            .arg(&prefix)
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        let output = run_with_deadline(command, self.timeout, "pdftoppm")
            .await
            .map_err(IngestError::Rasterize)?;
        if !output.status.success() {
            return Err(IngestError::Rasterize(format!(
                "pdftoppm exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let mut pages = Vec::new();
        let mut entries = tokio::fs::read_dir(scratch_dir)
            .await
            .map_err(|e| IngestError::Rasterize(format!("read scratch dir: {e}")))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| IngestError::Rasterize(format!("read scratch dir: {e}")))?
        {
            let path = entry.path();
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with("page") && name.ends_with(".png") {
                pages.push(path);
            }
        }
        // pdftoppm zero-pads page numbers, so lexicographic order is page order.
        pages.sort();
        debug!(pages = pages.len(), "rasterized document");
        Ok(pages)
    }
}

/// `tesseract`-backed OCR engine.
#[derive(Clone, Debug)]
pub struct TesseractOcr {
    timeout: Duration,
}

impl TesseractOcr {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl OcrEngine for TesseractOcr {
    #[instrument(skip(self), fields(page = %page.display()), err)]
    async fn recognize(&self, page: &Path, scripts: &[&str]) -> Result<String, IngestError> {
        let mut command = Command::new("tesseract");
        command
            .arg(page)
            .arg("stdout")
            .arg("-l")
            .arg(scripts.join("+"))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let output = run_with_deadline(command, self.timeout, "tesseract")
            .await
            .map_err(IngestError::Ocr)?;
        if !output.status.success() {
            return Err(IngestError::Ocr(format!(
                "tesseract exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

async fn run_with_deadline(
    mut command: Command,
    deadline: Duration,
    name: &str,
) -> Result<std::process::Output, String> {
    command.kill_on_drop(true);
    let future = command.output();
    match tokio::time::timeout(deadline, future).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(e)) => Err(format!("failed to run {name}: {e}")),
        Err(_) => Err(format!("{name} timed out after {}s", deadline.as_secs())),
    }
}
