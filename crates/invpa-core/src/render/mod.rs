//! Turning input documents into ordered page images.

mod poppler;

pub use poppler::PopplerRenderer;

use std::path::Path;

use crate::error::{InvpaError, RenderError, Result};
use crate::models::page::PageImage;

/// File extensions the pipeline accepts (lowercase).
pub const SUPPORTED_EXTENSIONS: &[&str] = &["pdf", "png", "jpg", "jpeg"];

/// Kind of input document, decided by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    /// Multi-page PDF, rasterized page by page.
    Pdf,
    /// A single raster image, passed through untouched.
    Raster,
}

impl DocumentKind {
    /// Classify a path by its extension (case-insensitive).
    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        match extension.as_str() {
            "pdf" => Ok(DocumentKind::Pdf),
            "png" | "jpg" | "jpeg" => Ok(DocumentKind::Raster),
            _ => Err(InvpaError::UnsupportedFormat(path.display().to_string())),
        }
    }
}

/// Whether a directory entry should be picked up by a batch run.
///
/// AppleDouble companions (`._name.pdf`) are skipped.
pub fn is_supported_file(path: &Path) -> bool {
    let hidden_companion = path
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with("._"));

    !hidden_companion && path.is_file() && DocumentKind::from_path(path).is_ok()
}

/// Produces the pages of a document in reading order.
///
/// Implementations block; the pipeline runs them on the blocking pool.
pub trait PageRenderer: Send + Sync {
    /// Render `path` into at least one page, ordinals starting at zero.
    fn render(&self, path: &Path) -> Result<Vec<PageImage>>;
}

/// Read a raster file as a single page.
pub fn read_raster(path: &Path) -> Result<Vec<PageImage>> {
    let data = std::fs::read(path).map_err(RenderError::Io)?;
    if data.is_empty() {
        return Err(RenderError::NoPages.into());
    }
    Ok(vec![PageImage::new(0, data)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_document_kind_from_extension() {
        assert_eq!(
            DocumentKind::from_path(Path::new("scan.PDF")).unwrap(),
            DocumentKind::Pdf
        );
        assert_eq!(
            DocumentKind::from_path(Path::new("a/b/photo.JpEg")).unwrap(),
            DocumentKind::Raster
        );
        assert!(matches!(
            DocumentKind::from_path(Path::new("invoice.docx")),
            Err(InvpaError::UnsupportedFormat(_))
        ));
        assert!(DocumentKind::from_path(&PathBuf::from("noext")).is_err());
    }

    #[test]
    fn test_read_raster_single_page() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("receipt.png");
        std::fs::write(&path, [0x89, b'P', b'N', b'G']).unwrap();

        let pages = read_raster(&path).unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].ordinal, 0);
        assert_eq!(&pages[0].data[..], &[0x89, b'P', b'N', b'G']);
    }

    #[test]
    fn test_is_supported_file() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["a.pdf", "._a.pdf", "notes.txt"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }

        assert!(is_supported_file(&dir.path().join("a.pdf")));
        assert!(!is_supported_file(&dir.path().join("._a.pdf")));
        assert!(!is_supported_file(&dir.path().join("notes.txt")));
        assert!(!is_supported_file(&dir.path().join("missing.pdf")));
    }
}
