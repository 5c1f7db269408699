//! Upload decoding: raster images directly, PDFs through a page renderer

use crate::error::DecodeError;
use image::DynamicImage;
use tracing::debug;

/// Renders the first page of a PDF document to a raster image.
pub trait PageRenderer: Send + Sync {
    fn render_first_page(&self, pdf: &[u8]) -> anyhow::Result<DynamicImage>;
}

/// Whether an upload should be treated as a PDF document
pub fn is_pdf(filename: Option<&str>, content_type: Option<&str>) -> bool {
    let by_type = content_type
        .map(|ct| ct.trim().eq_ignore_ascii_case("application/pdf"))
        .unwrap_or(false);
    let by_name = filename
        .map(|name| name.to_ascii_lowercase().ends_with(".pdf"))
        .unwrap_or(false);
    by_type || by_name
}

/// Decode uploaded bytes into an image.
///
/// Animated formats yield their first frame.
pub fn decode_upload(
    bytes: &[u8],
    filename: Option<&str>,
    content_type: Option<&str>,
    renderer: Option<&dyn PageRenderer>,
) -> Result<DynamicImage, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::Empty);
    }

    if is_pdf(filename, content_type) {
        let renderer = renderer.ok_or(DecodeError::PdfUnsupported)?;
        let page = renderer
            .render_first_page(bytes)
            .map_err(|e| DecodeError::Pdf(e.to_string()))?;
        debug!(width = page.width(), height = page.height(), "Rendered PDF first page");
        return Ok(page);
    }

    image::load_from_memory(bytes).map_err(|e| DecodeError::Unsupported(e.to_string()))
}
