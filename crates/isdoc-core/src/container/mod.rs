//! Locating an embedded ISDOC payload inside a PDF container.
//!
//! The scanner runs a fixed, prioritized list of strategies. Cheap and
//! reliable lookups (attachments) come first, brute-force searches
//! (regex over text, raw bytes and decoded streams) come last. The first
//! strategy that yields well-formed XML wins.

mod attachments;
mod object_tree;
mod patterns;
mod source;
mod text;
mod xref;

#[cfg(test)]
pub(crate) mod testing;

pub use attachments::{GlobalAttachments, PageAttachments};
pub use object_tree::ObjectTreeWalk;
pub use patterns::{is_isdoc_name, ISDOC_BYTES, ISDOC_TEXT};
pub use source::Container;
pub use text::{RawBinary, RenderedText};
pub use xref::XrefStreams;

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::ContainerError;
use crate::models::config::ScannerConfig;
use crate::xml::DocumentTree;

/// Result type for container operations.
pub type Result<T> = std::result::Result<T, ContainerError>;

/// Identifies one extraction strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Document-level embedded files (catalog name tree).
    GlobalAttachment,
    /// File attachment annotations on pages.
    PageAttachment,
    /// Regex over the rendered text layer.
    RenderedText,
    /// Regex over the raw container bytes.
    RawBinary,
    /// Regex over every decoded stream object.
    XrefStream,
    /// Low-level walk over the object graph reloaded from disk.
    ObjectTree,
}

impl StrategyKind {
    /// All strategies in priority order.
    pub const ALL: [StrategyKind; 6] = [
        StrategyKind::GlobalAttachment,
        StrategyKind::PageAttachment,
        StrategyKind::RenderedText,
        StrategyKind::RawBinary,
        StrategyKind::XrefStream,
        StrategyKind::ObjectTree,
    ];

    /// Human-readable label used in provenance messages.
    pub fn label(&self) -> &'static str {
        match self {
            StrategyKind::GlobalAttachment => "global attachment",
            StrategyKind::PageAttachment => "page attachment",
            StrategyKind::RenderedText => "text layer",
            StrategyKind::RawBinary => "raw binary",
            StrategyKind::XrefStream => "xref stream",
            StrategyKind::ObjectTree => "object tree",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Where a payload came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum Provenance {
    /// The input was already an XML file.
    Direct,
    /// Extracted from a container by a strategy.
    Extracted {
        strategy: StrategyKind,
        #[serde(skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
}

impl Provenance {
    pub fn extracted(strategy: StrategyKind, detail: impl Into<Option<String>>) -> Self {
        Provenance::Extracted {
            strategy,
            detail: detail.into(),
        }
    }

    /// The strategy that produced the payload, `None` for direct input.
    pub fn strategy(&self) -> Option<StrategyKind> {
        match self {
            Provenance::Direct => None,
            Provenance::Extracted { strategy, .. } => Some(*strategy),
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provenance::Direct => f.write_str("direct file"),
            Provenance::Extracted {
                strategy,
                detail: Some(detail),
            } => write!(f, "{}: {}", strategy, detail),
            Provenance::Extracted {
                strategy,
                detail: None,
            } => write!(f, "{}", strategy),
        }
    }
}

/// Bytes believed to be an ISDOC document, with their origin.
#[derive(Debug, Clone)]
pub struct Payload {
    pub bytes: Vec<u8>,
    pub provenance: Provenance,
}

impl Payload {
    pub fn new(bytes: Vec<u8>, provenance: Provenance) -> Self {
        Self { bytes, provenance }
    }

    /// A payload that did not come out of a container.
    pub fn direct(bytes: Vec<u8>) -> Self {
        Self::new(bytes, Provenance::Direct)
    }
}

/// One way of finding a payload in a container.
///
/// Implementations never fail past this boundary: any internal error means
/// "not found here".
pub trait ExtractionStrategy {
    /// Which strategy this is.
    fn kind(&self) -> StrategyKind;

    /// Try to locate a payload.
    fn attempt(&self, container: &Container) -> Option<Payload>;
}

/// Turn a strategy-internal result into the `attempt` contract.
pub(crate) fn settle(kind: StrategyKind, result: Result<Option<Payload>>) -> Option<Payload> {
    match result {
        Ok(found) => found,
        Err(e) => {
            debug!("Strategy '{}' failed: {}", kind, e);
            None
        }
    }
}

/// Runs extraction strategies in priority order.
pub struct ContainerScanner {
    strategies: Vec<Box<dyn ExtractionStrategy>>,
}

impl ContainerScanner {
    /// Scanner with every strategy enabled.
    pub fn new() -> Self {
        Self::with_strategies(StrategyKind::ALL.iter().map(|kind| strategy_for(*kind)).collect())
    }

    /// Scanner honoring `skip_strategies`; the order of the rest is unchanged.
    pub fn from_config(config: &ScannerConfig) -> Self {
        Self::with_strategies(
            StrategyKind::ALL
                .iter()
                .filter(|kind| !config.skip_strategies.contains(kind))
                .map(|kind| strategy_for(*kind))
                .collect(),
        )
    }

    /// Scanner over an explicit strategy list, tried in the given order.
    pub fn with_strategies(strategies: Vec<Box<dyn ExtractionStrategy>>) -> Self {
        Self { strategies }
    }

    /// Kinds of the configured strategies, in order.
    pub fn strategies(&self) -> Vec<StrategyKind> {
        self.strategies.iter().map(|s| s.kind()).collect()
    }

    /// Find the payload, or [`ContainerError::NotFound`] once every strategy
    /// has been tried.
    pub fn scan(&self, container: &Container) -> Result<Payload> {
        for strategy in &self.strategies {
            let kind = strategy.kind();
            debug!("Trying strategy '{}'", kind);

            let Some(payload) = strategy.attempt(container) else {
                debug!("Strategy '{}' found nothing", kind);
                continue;
            };

            if !DocumentTree::is_well_formed(&payload.bytes) {
                debug!(
                    "Strategy '{}' produced {} bytes that are not well-formed XML, continuing",
                    kind,
                    payload.bytes.len()
                );
                continue;
            }

            info!("ISDOC payload extracted via {}", payload.provenance);
            return Ok(payload);
        }

        Err(ContainerError::NotFound)
    }
}

impl Default for ContainerScanner {
    fn default() -> Self {
        Self::new()
    }
}

fn strategy_for(kind: StrategyKind) -> Box<dyn ExtractionStrategy> {
    match kind {
        StrategyKind::GlobalAttachment => Box::new(GlobalAttachments),
        StrategyKind::PageAttachment => Box::new(PageAttachments),
        StrategyKind::RenderedText => Box::new(RenderedText),
        StrategyKind::RawBinary => Box::new(RawBinary),
        StrategyKind::XrefStream => Box::new(XrefStreams),
        StrategyKind::ObjectTree => Box::new(ObjectTreeWalk),
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{invoice_xml, PdfBuilder};
    use super::*;

    fn scan(data: Vec<u8>) -> Result<Payload> {
        ContainerScanner::new().scan(&Container::from_bytes(data))
    }

    #[test]
    fn test_global_attachment_wins_over_page_isdoc() {
        let pdf = PdfBuilder::new()
            .blank_page()
            .page_attachment("alternative.isdoc", invoice_xml("PAGE").as_bytes())
            .global_attachment("invoice.xml", invoice_xml("GLOBAL").as_bytes())
            .build();

        let payload = scan(pdf).unwrap();
        assert_eq!(payload.provenance.strategy(), Some(StrategyKind::GlobalAttachment));
        assert_eq!(payload.provenance.to_string(), "global attachment: invoice.xml");
        assert_eq!(payload.bytes, invoice_xml("GLOBAL").into_bytes());
    }

    #[test]
    fn test_attachment_name_filter_is_case_insensitive() {
        let pdf = PdfBuilder::new()
            .blank_page()
            .global_attachment("readme.txt", b"not an invoice")
            .global_attachment("FAKTURA.ISDOC", invoice_xml("UPPER").as_bytes())
            .build();

        let payload = scan(pdf).unwrap();
        assert_eq!(payload.provenance.to_string(), "global attachment: FAKTURA.ISDOC");
    }

    #[test]
    fn test_page_attachment_when_no_global() {
        let pdf = PdfBuilder::new()
            .blank_page()
            .page_attachment("invoice.isdoc", invoice_xml("PAGE").as_bytes())
            .build();

        let payload = scan(pdf).unwrap();
        assert_eq!(payload.provenance.strategy(), Some(StrategyKind::PageAttachment));
        assert_eq!(payload.bytes, invoice_xml("PAGE").into_bytes());
    }

    #[test]
    fn test_text_layer_fallthrough() {
        let pdf = PdfBuilder::new()
            .page_text(&invoice_xml("TEXT"))
            .build();

        let payload = scan(pdf).unwrap();
        assert_eq!(payload.provenance.strategy(), Some(StrategyKind::RenderedText));
        let text = std::str::from_utf8(&payload.bytes).unwrap();
        let tree = DocumentTree::parse(text).unwrap();
        assert_eq!(tree.root().tag_name().name(), "Invoice");
    }

    #[test]
    fn test_raw_binary_on_non_pdf_bytes() {
        let mut data = b"\x00\x01garbage\xff\xfe".to_vec();
        data.extend_from_slice(invoice_xml("RAW").as_bytes());
        data.extend_from_slice(b"\xc3trailing");

        let payload = scan(data).unwrap();
        assert_eq!(payload.provenance.strategy(), Some(StrategyKind::RawBinary));
        assert_eq!(payload.bytes, invoice_xml("RAW").into_bytes());
    }

    #[test]
    fn test_compressed_stream_found_by_xref_scan() {
        let pdf = PdfBuilder::new()
            .blank_page()
            .compressed_stream(invoice_xml("XREF").as_bytes())
            .build();

        let container = Container::from_bytes(pdf);
        assert!(RawBinary.attempt(&container).is_none());

        let payload = ContainerScanner::new().scan(&container).unwrap();
        assert_eq!(payload.provenance.strategy(), Some(StrategyKind::XrefStream));
        assert_eq!(payload.bytes, invoice_xml("XREF").into_bytes());
    }

    #[test]
    fn test_orphan_filespec_found_by_object_tree() {
        // single-quoted xmlns defeats every regex strategy
        let xml = "<Invoice xmlns='http://isdoc.cz/namespace/2013'><ID>ORPHAN</ID></Invoice>";
        let pdf = PdfBuilder::new()
            .blank_page()
            .orphan_filespec("orphan.xml", xml.as_bytes())
            .build();

        let payload = scan(pdf).unwrap();
        assert_eq!(payload.provenance.strategy(), Some(StrategyKind::ObjectTree));
        assert_eq!(payload.bytes, xml.as_bytes());
    }

    #[test]
    fn test_malformed_attachment_falls_through() {
        let pdf = PdfBuilder::new()
            .blank_page()
            .global_attachment("broken.xml", b"<Invoice><ID>1</Invoice>")
            .compressed_stream(invoice_xml("BACKUP").as_bytes())
            .build();

        let container = Container::from_bytes(pdf);
        assert!(RawBinary.attempt(&container).is_none());

        let payload = ContainerScanner::new().scan(&container).unwrap();
        assert_eq!(payload.provenance.strategy(), Some(StrategyKind::XrefStream));
        assert_eq!(payload.bytes, invoice_xml("BACKUP").into_bytes());
    }

    #[test]
    fn test_windows_1250_attachment_kept_verbatim() {
        let xml = b"<?xml version=\"1.0\" encoding=\"windows-1250\"?>\
<Invoice xmlns=\"http://isdoc.cz/namespace/2013\"><ID>CP</ID><Note>Odb\xecratel</Note></Invoice>";
        let pdf = PdfBuilder::new()
            .blank_page()
            .global_attachment("invoice.isdoc", xml)
            .build();

        let payload = scan(pdf).unwrap();
        assert_eq!(payload.provenance.to_string(), "global attachment: invoice.isdoc");
        assert_eq!(payload.bytes, xml.to_vec());
    }

    #[test]
    fn test_utf16_attachment() {
        let xml = r#"<?xml version="1.0" encoding="UTF-16"?><Invoice xmlns="http://isdoc.cz/namespace/2013"><ID>W</ID></Invoice>"#;
        let mut data = vec![0xFF, 0xFE];
        data.extend(xml.encode_utf16().flat_map(u16::to_le_bytes));
        let pdf = PdfBuilder::new()
            .blank_page()
            .global_attachment("invoice.xml", &data)
            .build();

        let payload = scan(pdf).unwrap();
        assert_eq!(payload.provenance.strategy(), Some(StrategyKind::GlobalAttachment));
        assert_eq!(payload.bytes, data);
    }

    #[test]
    fn test_encrypted_with_empty_password() {
        let pdf = PdfBuilder::new()
            .blank_page()
            .global_attachment("invoice.isdoc", invoice_xml("LOCKED").as_bytes())
            .build_encrypted("");
        let container = Container::from_bytes(pdf);
        // ciphertext on disk
        assert!(RawBinary.attempt(&container).is_none());

        let payload = ContainerScanner::new().scan(&container).unwrap();
        assert_eq!(payload.provenance.strategy(), Some(StrategyKind::GlobalAttachment));
        assert_eq!(payload.bytes, invoice_xml("LOCKED").into_bytes());
    }

    #[test]
    fn test_encrypted_with_user_password_leaves_byte_strategies() {
        let mut pdf = PdfBuilder::new()
            .blank_page()
            .global_attachment("invoice.isdoc", invoice_xml("LOCKED").as_bytes())
            .build_encrypted("tajne");
        let container = Container::from_bytes(pdf.clone());
        assert!(GlobalAttachments.attempt(&container).is_none());
        assert!(XrefStreams.attempt(&container).is_none());
        assert!(ObjectTreeWalk.attempt(&container).is_none());
        assert!(matches!(ContainerScanner::new().scan(&container), Err(ContainerError::NotFound)));

        // a plaintext copy after the end marker is still reachable
        pdf.extend_from_slice(invoice_xml("TRAILING").as_bytes());
        let payload = scan(pdf).unwrap();
        assert_eq!(payload.provenance.strategy(), Some(StrategyKind::RawBinary));
        assert_eq!(payload.bytes, invoice_xml("TRAILING").into_bytes());
    }

    #[test]
    fn test_not_found() {
        let pdf = PdfBuilder::new().blank_page().build();
        assert!(matches!(scan(pdf), Err(ContainerError::NotFound)));
        assert!(matches!(scan(Vec::new()), Err(ContainerError::NotFound)));
    }

    #[test]
    fn test_skip_strategies_keeps_order() {
        let config = ScannerConfig {
            skip_strategies: vec![StrategyKind::GlobalAttachment, StrategyKind::RawBinary],
            ..ScannerConfig::default()
        };
        let scanner = ContainerScanner::from_config(&config);
        assert_eq!(
            scanner.strategies(),
            vec![
                StrategyKind::PageAttachment,
                StrategyKind::RenderedText,
                StrategyKind::XrefStream,
                StrategyKind::ObjectTree,
            ]
        );
    }

    #[test]
    fn test_skipped_global_attachment_falls_to_page() {
        let pdf = PdfBuilder::new()
            .blank_page()
            .page_attachment("page.isdoc", invoice_xml("PAGE").as_bytes())
            .global_attachment("invoice.xml", invoice_xml("GLOBAL").as_bytes())
            .build();
        let config = ScannerConfig {
            skip_strategies: vec![StrategyKind::GlobalAttachment],
            ..ScannerConfig::default()
        };

        let payload = ContainerScanner::from_config(&config)
            .scan(&Container::from_bytes(pdf))
            .unwrap();
        assert_eq!(payload.provenance.strategy(), Some(StrategyKind::PageAttachment));
    }

    #[test]
    fn test_provenance_display() {
        assert_eq!(Provenance::Direct.to_string(), "direct file");
        assert_eq!(
            Provenance::extracted(StrategyKind::XrefStream, Some("object 12 0".to_string())).to_string(),
            "xref stream: object 12 0"
        );
        assert_eq!(Provenance::extracted(StrategyKind::RawBinary, None).to_string(), "raw binary");
    }
}
