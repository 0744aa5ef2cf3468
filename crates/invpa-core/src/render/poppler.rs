//! PDF rasterization through poppler's `pdftoppm`.

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, trace};

use super::{read_raster, DocumentKind, PageRenderer};
use crate::error::{RenderError, Result};
use crate::models::page::PageImage;

/// Renderer shelling out to `pdftoppm` for PDFs and reading images directly.
#[derive(Debug, Clone)]
pub struct PopplerRenderer {
    binary: PathBuf,
    dpi: u32,
}

impl Default for PopplerRenderer {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("pdftoppm"),
            dpi: 150,
        }
    }
}

impl PopplerRenderer {
    pub fn new(binary: impl Into<PathBuf>, dpi: u32) -> Self {
        Self {
            binary: binary.into(),
            dpi,
        }
    }

    fn tool_name(&self) -> String {
        self.binary.display().to_string()
    }

    fn render_pdf(&self, path: &Path) -> Result<Vec<PageImage>> {
        // Removed on drop, whichever way this function returns.
        let scratch = tempfile::Builder::new()
            .prefix("invpa-pages-")
            .tempdir()
            .map_err(RenderError::Io)?;

        debug!("Rasterizing {} at {} dpi", path.display(), self.dpi);

        let output = Command::new(&self.binary)
            .args(["-png", "-r", &self.dpi.to_string()])
            .arg(path)
            .arg(scratch.path().join("page"))
            .output()
            .map_err(|e| RenderError::ToolUnavailable {
                tool: self.tool_name(),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(RenderError::ToolFailed {
                tool: self.tool_name(),
                status: output.status.to_string(),
                output: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }
            .into());
        }

        let pages = collect_pages(scratch.path())?;
        debug!("Rendered {} pages from {}", pages.len(), path.display());
        Ok(pages)
    }
}

impl PageRenderer for PopplerRenderer {
    fn render(&self, path: &Path) -> Result<Vec<PageImage>> {
        match DocumentKind::from_path(path)? {
            DocumentKind::Raster => read_raster(path),
            DocumentKind::Pdf => self.render_pdf(path),
        }
    }
}

/// Read every PNG in `dir` as a page, ordered by page number.
///
/// `pdftoppm` names its output `page-1.png` or `page-01.png` depending on
/// the page count, so ordering uses the numeric suffix.
fn collect_pages(dir: &Path) -> Result<Vec<PageImage>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(RenderError::Io)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|e| e.eq_ignore_ascii_case("png")))
        .collect();

    files.sort_by_key(|p| (page_number(p), p.file_name().map(|n| n.to_owned())));

    if files.is_empty() {
        return Err(RenderError::NoPages.into());
    }

    files
        .iter()
        .enumerate()
        .map(|(ordinal, file)| {
            trace!("Reading page {} from {}", ordinal, file.display());
            let data = std::fs::read(file).map_err(RenderError::Io)?;
            Ok(PageImage::new(ordinal, data))
        })
        .collect()
}

fn page_number(path: &Path) -> Option<u32> {
    path.file_stem()?
        .to_str()?
        .rsplit('-')
        .next()?
        .parse()
        .ok()
}
