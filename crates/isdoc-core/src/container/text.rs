//! Regex sniffing over the rendered text layer and the raw bytes.

use std::panic::{self, AssertUnwindSafe};

use tracing::{debug, trace};

use super::patterns::ISDOC_TEXT;
use super::{settle, Container, ExtractionStrategy, Payload, Provenance, Result, StrategyKind};
use crate::error::ContainerError;

/// Strategy 3: search the text layer of all pages, in page order.
pub struct RenderedText;

/// Strategy 4: search the container bytes decoded as lossy UTF-8.
pub struct RawBinary;

impl ExtractionStrategy for RenderedText {
    fn kind(&self) -> StrategyKind {
        StrategyKind::RenderedText
    }

    fn attempt(&self, container: &Container) -> Option<Payload> {
        settle(self.kind(), self.search(container))
    }
}

impl RenderedText {
    fn search(&self, container: &Container) -> Result<Option<Payload>> {
        let text = rendered_text(container)?;
        trace!("Rendered text layer: {} chars", text.len());

        Ok(ISDOC_TEXT.find(&text).map(|m| {
            Payload::new(
                m.as_str().as_bytes().to_vec(),
                Provenance::extracted(self.kind(), None),
            )
        }))
    }
}

impl ExtractionStrategy for RawBinary {
    fn kind(&self) -> StrategyKind {
        StrategyKind::RawBinary
    }

    fn attempt(&self, container: &Container) -> Option<Payload> {
        let text = lossy_utf8(container.raw());
        ISDOC_TEXT.find(&text).map(|m| {
            debug!("Raw binary match at offset {}", m.start());
            Payload::new(
                m.as_str().as_bytes().to_vec(),
                Provenance::extracted(self.kind(), None),
            )
        })
    }
}

/// Text of every page concatenated in page order.
///
/// Uses lopdf's per-page extraction; when that yields nothing, falls back
/// to pdf-extract over the whole document.
pub fn rendered_text(container: &Container) -> Result<String> {
    let mut text = String::new();

    if let Ok(doc) = container.document() {
        for page in container.page_numbers() {
            match doc.extract_text(&[page]) {
                Ok(page_text) => text.push_str(&page_text),
                Err(e) => debug!("Text extraction failed on page {}: {}", page, e),
            }
        }
    }

    if text.trim().is_empty() {
        text = extract_with_pdf_extract(container.raw())?;
    }

    Ok(text)
}

fn extract_with_pdf_extract(data: &[u8]) -> Result<String> {
    // pdf-extract panics on some malformed inputs
    match panic::catch_unwind(AssertUnwindSafe(|| pdf_extract::extract_text_from_mem(data))) {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(e)) => Err(ContainerError::Decode(e.to_string())),
        Err(_) => Err(ContainerError::Decode("text extraction panicked".into())),
    }
}

/// Decode bytes as UTF-8, dropping invalid sequences.
pub(crate) fn lossy_utf8(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len());
    for chunk in data.utf8_chunks() {
        out.push_str(chunk.valid());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::testing::{invoice_xml, PdfBuilder};

    #[test]
    fn test_lossy_utf8_drops_invalid() {
        assert_eq!(lossy_utf8(b"a\xffb\xc3\xa9c\xc3"), "abéc");
    }

    #[test]
    fn test_rendered_text_concatenates_pages() {
        let pdf = PdfBuilder::new()
            .page_text("first page")
            .page_text("second page")
            .build();
        let text = rendered_text(&Container::from_bytes(pdf)).unwrap();

        let first = text.find("first page").unwrap();
        let second = text.find("second page").unwrap();
        assert!(first < second);
    }

    #[test]
    fn test_raw_binary_requires_match() {
        let container = Container::from_bytes(b"no invoice here".to_vec());
        assert!(RawBinary.attempt(&container).is_none());

        let container = Container::from_bytes(invoice_xml("RAW").into_bytes());
        let payload = RawBinary.attempt(&container).unwrap();
        assert_eq!(payload.provenance.strategy(), Some(StrategyKind::RawBinary));
    }

    #[test]
    fn test_rendered_text_without_text_layer() {
        let pdf = PdfBuilder::new().blank_page().build();
        assert!(RenderedText.attempt(&Container::from_bytes(pdf)).is_none());
    }
}
