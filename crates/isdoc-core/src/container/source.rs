//! The PDF container under inspection.

use std::io::Write;
use std::path::Path;

use lopdf::Document;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use super::Result;
use crate::error::ContainerError;

/// Raw container bytes plus the views strategies need.
///
/// Loading never fails: when the bytes are not a PDF the object graph is
/// simply unavailable and only byte-level strategies can succeed. The
/// spool file is a per-container copy on disk, deleted on drop.
pub struct Container {
    raw: Vec<u8>,
    document: Result<Document>,
    spool: std::result::Result<NamedTempFile, String>,
}

impl Container {
    /// Load a container, spooling it to the system temp directory.
    pub fn from_bytes(data: impl Into<Vec<u8>>) -> Self {
        Self::load(data.into(), None)
    }

    /// Load a container, spooling it into `spool_dir` when given.
    pub fn load(raw: Vec<u8>, spool_dir: Option<&Path>) -> Self {
        let document = open_document(&raw).inspect_err(|e| {
            debug!("Container object graph unavailable: {}", e);
        });

        let spool = spool_copy(&raw, spool_dir).map_err(|e| {
            warn!("Could not spool container to disk: {}", e);
            e.to_string()
        });

        Self {
            raw,
            document,
            spool,
        }
    }

    /// The bytes as received.
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// The parsed object graph.
    pub fn document(&self) -> Result<&Document> {
        self.document.as_ref().map_err(ContainerError::clone)
    }

    /// Path of the on-disk copy.
    pub fn spool_path(&self) -> Result<&Path> {
        self.spool
            .as_ref()
            .map(|file| file.path())
            .map_err(|e| ContainerError::Spool(e.clone()))
    }

    /// Re-read the object graph from the on-disk copy.
    pub fn reload_from_spool(&self) -> Result<Document> {
        let path = self.spool_path()?;
        let doc = Document::load(path).map_err(|e| ContainerError::Parse(e.to_string()))?;
        decrypt_if_needed(doc)
    }

    /// Page numbers (1-based) in order; empty when the graph is unavailable.
    pub fn page_numbers(&self) -> Vec<u32> {
        self.document
            .as_ref()
            .map(|doc| doc.get_pages().keys().copied().collect())
            .unwrap_or_default()
    }
}

/// Parse a PDF from memory, opening empty-password encryption.
pub(crate) fn open_document(data: &[u8]) -> Result<Document> {
    let doc = Document::load_mem(data).map_err(|e| ContainerError::Parse(e.to_string()))?;
    decrypt_if_needed(doc)
}

fn decrypt_if_needed(mut doc: Document) -> Result<Document> {
    if doc.is_encrypted() {
        if doc.decrypt("").is_err() {
            return Err(ContainerError::Encrypted);
        }
        debug!("Decrypted PDF with empty password");
    }
    Ok(doc)
}

fn spool_copy(data: &[u8], dir: Option<&Path>) -> std::io::Result<NamedTempFile> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("isdoc-").suffix(".pdf");

    let mut file = match dir {
        Some(dir) => builder.tempfile_in(dir)?,
        None => builder.tempfile()?,
    };
    file.write_all(data)?;
    file.flush()?;

    debug!("Spooled {} bytes to {}", data.len(), file.path().display());
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::testing::{invoice_xml, PdfBuilder};

    #[test]
    fn test_non_pdf_still_loads() {
        let container = Container::from_bytes(b"plain text".to_vec());
        assert_eq!(container.raw(), b"plain text");
        assert!(container.document().is_err());
        assert!(container.page_numbers().is_empty());
        assert!(container.spool_path().is_ok());
    }

    #[test]
    fn test_spool_matches_raw_and_is_removed() {
        let pdf = PdfBuilder::new().blank_page().blank_page().build();
        let container = Container::from_bytes(pdf.clone());
        let path = container.spool_path().unwrap().to_path_buf();

        assert_eq!(std::fs::read(&path).unwrap(), pdf);
        assert_eq!(container.page_numbers(), vec![1, 2]);
        assert_eq!(container.reload_from_spool().unwrap().get_pages().len(), 2);

        drop(container);
        assert!(!path.exists());
    }

    #[test]
    fn test_empty_user_password_is_opened() {
        let pdf = PdfBuilder::new()
            .blank_page()
            .global_attachment("invoice.isdoc", invoice_xml("LOCKED").as_bytes())
            .build_encrypted("");
        let container = Container::from_bytes(pdf);

        let doc = container.document().unwrap();
        assert!(!doc.is_encrypted());
        assert!(container.reload_from_spool().is_ok());
    }

    #[test]
    fn test_user_password_leaves_graph_closed() {
        let pdf = PdfBuilder::new()
            .blank_page()
            .global_attachment("invoice.isdoc", invoice_xml("LOCKED").as_bytes())
            .build_encrypted("tajne");
        let container = Container::from_bytes(pdf);

        assert!(matches!(container.document(), Err(ContainerError::Encrypted)));
        assert!(matches!(container.reload_from_spool(), Err(ContainerError::Encrypted)));
        assert!(container.page_numbers().is_empty());
    }

    #[test]
    fn test_spool_dir_is_honored() {
        let dir = tempfile::tempdir().unwrap();
        let container = Container::load(b"%PDF-".to_vec(), Some(dir.path()));
        assert!(container.spool_path().unwrap().starts_with(dir.path()));
    }
}
