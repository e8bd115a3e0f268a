//! Embedded-file lookups: the catalog name tree and page annotations.

use std::collections::HashSet;

use lopdf::{Dictionary, Document, Object, ObjectId};
use tracing::trace;

use super::patterns::is_isdoc_name;
use super::{settle, Container, ExtractionStrategy, Payload, Provenance, Result, StrategyKind};
use crate::error::ContainerError;

/// Strategy 1: document-level embedded files from `/Names/EmbeddedFiles`.
pub struct GlobalAttachments;

/// Strategy 2: `/FileAttachment` annotations, page by page.
pub struct PageAttachments;

impl ExtractionStrategy for GlobalAttachments {
    fn kind(&self) -> StrategyKind {
        StrategyKind::GlobalAttachment
    }

    fn attempt(&self, container: &Container) -> Option<Payload> {
        settle(self.kind(), self.search(container))
    }
}

impl GlobalAttachments {
    fn search(&self, container: &Container) -> Result<Option<Payload>> {
        let doc = container.document()?;

        for (name, spec) in name_tree_entries(doc)? {
            trace!("Global attachment candidate: {}", name);
            if !is_isdoc_name(&name) {
                continue;
            }
            let bytes = filespec_content(doc, &spec)?;
            return Ok(Some(Payload::new(
                bytes,
                Provenance::extracted(self.kind(), Some(name)),
            )));
        }

        Ok(None)
    }
}

impl ExtractionStrategy for PageAttachments {
    fn kind(&self) -> StrategyKind {
        StrategyKind::PageAttachment
    }

    fn attempt(&self, container: &Container) -> Option<Payload> {
        settle(self.kind(), self.search(container))
    }
}

impl PageAttachments {
    fn search(&self, container: &Container) -> Result<Option<Payload>> {
        let doc = container.document()?;

        for (page_num, page_id) in doc.get_pages() {
            for (name, spec) in page_file_attachments(doc, page_id) {
                trace!("Page {} attachment candidate: {}", page_num, name);
                if !is_isdoc_name(&name) {
                    continue;
                }
                let bytes = filespec_content(doc, &spec)?;
                return Ok(Some(Payload::new(
                    bytes,
                    Provenance::extracted(self.kind(), Some(name)),
                )));
            }
        }

        Ok(None)
    }
}

/// Collect `(name, file spec)` pairs from the catalog's embedded-files
/// name tree, in tree order. Inline and referenced nodes are both accepted.
pub(crate) fn name_tree_entries(doc: &Document) -> Result<Vec<(String, Object)>> {
    let catalog = doc
        .catalog()
        .map_err(|e| ContainerError::MissingKey(format!("catalog: {}", e)))?;

    let Some(names) = catalog.get(b"Names").ok().and_then(|o| resolve_dict(doc, o)) else {
        return Ok(Vec::new());
    };
    let Ok(embedded) = names.get(b"EmbeddedFiles") else {
        return Ok(Vec::new());
    };

    let mut entries = Vec::new();
    let mut visited = HashSet::new();
    walk_name_node(doc, embedded, &mut visited, &mut entries);
    Ok(entries)
}

fn walk_name_node(
    doc: &Document,
    node: &Object,
    visited: &mut HashSet<ObjectId>,
    out: &mut Vec<(String, Object)>,
) {
    if let Object::Reference(id) = node {
        if !visited.insert(*id) {
            return;
        }
    }
    let Some(dict) = resolve_dict(doc, node) else {
        return;
    };

    // Leaf: [key, value, key, value, ...]
    if let Some(pairs) = dict.get(b"Names").ok().and_then(|o| resolve_array(doc, o)) {
        for pair in pairs.chunks(2) {
            if let [key, spec] = pair {
                if let Some(name) = resolve_string(doc, key) {
                    out.push((name, spec.clone()));
                }
            }
        }
    }

    // Intermediate node
    if let Some(kids) = dict.get(b"Kids").ok().and_then(|o| resolve_array(doc, o)) {
        for kid in kids {
            walk_name_node(doc, kid, visited, out);
        }
    }
}

/// `(name, file spec)` pairs of the file attachment annotations on a page.
pub(crate) fn page_file_attachments(doc: &Document, page_id: ObjectId) -> Vec<(String, Object)> {
    let mut out = Vec::new();

    let Ok(page) = doc.get_dictionary(page_id) else {
        return out;
    };
    let Some(annots) = page.get(b"Annots").ok().and_then(|o| resolve_array(doc, o)) else {
        return out;
    };

    for annot in annots {
        let Some(dict) = resolve_dict(doc, annot) else {
            continue;
        };
        let is_attachment = dict
            .get(b"Subtype")
            .and_then(Object::as_name)
            .map(|n| n == b"FileAttachment")
            .unwrap_or(false);
        if !is_attachment {
            continue;
        }
        let Ok(spec) = dict.get(b"FS") else {
            continue;
        };

        let name = resolve_dict(doc, spec)
            .and_then(filespec_name)
            .or_else(|| annotation_name(dict))
            .unwrap_or_else(|| "attachment".to_string());
        out.push((name, spec.clone()));
    }

    out
}

/// Read the embedded stream of a file specification.
///
/// `/EF` is normally an inline dictionary, but some producers store it as a
/// reference; both are handled. `/F` is preferred over `/UF`.
pub(crate) fn filespec_content(doc: &Document, spec: &Object) -> Result<Vec<u8>> {
    let spec = resolve_dict(doc, spec)
        .ok_or_else(|| ContainerError::MissingKey("file spec is not a dictionary".into()))?;
    let ef = spec
        .get(b"EF")
        .ok()
        .and_then(|o| resolve_dict(doc, o))
        .ok_or_else(|| ContainerError::MissingKey("/EF".into()))?;
    let stream_ref = ef
        .get(b"F")
        .or_else(|_| ef.get(b"UF"))
        .map_err(|_| ContainerError::MissingKey("/EF has neither /F nor /UF".into()))?;

    let (_, stream_obj) = doc
        .dereference(stream_ref)
        .map_err(|e| ContainerError::MissingKey(format!("embedded stream: {}", e)))?;
    let stream = stream_obj
        .as_stream()
        .map_err(|_| ContainerError::Decode("embedded file is not a stream".into()))?;

    Ok(stream_bytes(stream))
}

/// Decoded stream content, or the raw content when it cannot be decoded.
pub(crate) fn stream_bytes(stream: &lopdf::Stream) -> Vec<u8> {
    match stream.decompressed_content() {
        Ok(data) => data,
        Err(_) => stream.content.clone(),
    }
}

/// Filename declared by a file spec: Unicode (`/UF`) first, then `/F`.
pub(crate) fn filespec_name(spec: &Dictionary) -> Option<String> {
    [b"UF" as &[u8], b"F"]
        .iter()
        .filter_map(|key| spec.get(key).ok())
        .filter_map(|v| v.as_str().ok())
        .map(decode_pdf_string)
        .find(|name| !name.is_empty())
}

fn annotation_name(annot: &Dictionary) -> Option<String> {
    [b"Contents" as &[u8], b"T"]
        .iter()
        .filter_map(|key| annot.get(key).ok())
        .filter_map(|v| v.as_str().ok())
        .map(decode_pdf_string)
        .find(|name| !name.is_empty())
}

pub(crate) fn resolve_dict<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Dictionary> {
    match doc.dereference(obj).ok()?.1 {
        Object::Dictionary(dict) => Some(dict),
        Object::Stream(stream) => Some(&stream.dict),
        _ => None,
    }
}

pub(crate) fn resolve_array<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Vec<Object>> {
    doc.dereference(obj).ok()?.1.as_array().ok()
}

fn resolve_string(doc: &Document, obj: &Object) -> Option<String> {
    doc.dereference(obj)
        .ok()?
        .1
        .as_str()
        .ok()
        .map(decode_pdf_string)
}

/// Decode a PDF text string: UTF-16BE with BOM, otherwise byte-wise.
pub(crate) fn decode_pdf_string(bytes: &[u8]) -> String {
    if let Some(body) = bytes.strip_prefix(b"\xFE\xFF") {
        let units: Vec<u16> = body
            .chunks_exact(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    String::from_utf8_lossy(bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::source::open_document;
    use crate::container::testing::{invoice_xml, PdfBuilder};

    #[test]
    fn test_name_tree_entries_in_order() {
        let pdf = PdfBuilder::new()
            .blank_page()
            .global_attachment("a.txt", b"A")
            .global_attachment("b.xml", b"B")
            .build();
        let doc = open_document(&pdf).unwrap();

        let names: Vec<String> = name_tree_entries(&doc)
            .unwrap()
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names, vec!["a.txt".to_string(), "b.xml".to_string()]);
    }

    #[test]
    fn test_name_tree_with_kids() {
        let pdf = PdfBuilder::new()
            .blank_page()
            .global_attachment("first.txt", b"1")
            .global_attachment("second.isdoc", invoice_xml("KIDS").as_bytes())
            .name_tree_kids()
            .build();
        let doc = open_document(&pdf).unwrap();

        let entries = name_tree_entries(&doc).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].0, "second.isdoc");
        assert_eq!(
            filespec_content(&doc, &entries[1].1).unwrap(),
            invoice_xml("KIDS").into_bytes()
        );
    }

    #[test]
    fn test_page_attachments_named_from_filespec() {
        let pdf = PdfBuilder::new()
            .blank_page()
            .page_attachment("invoice.isdoc", b"<x/>")
            .build();
        let doc = open_document(&pdf).unwrap();
        let page_id = *doc.get_pages().get(&1).unwrap();

        let found = page_file_attachments(&doc, page_id);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].0, "invoice.isdoc");
        assert_eq!(filespec_content(&doc, &found[0].1).unwrap(), b"<x/>");
    }

    #[test]
    fn test_no_names_dictionary() {
        let pdf = PdfBuilder::new().blank_page().build();
        let doc = open_document(&pdf).unwrap();
        assert!(name_tree_entries(&doc).unwrap().is_empty());
    }

    #[test]
    fn test_decode_pdf_string_utf16() {
        let bytes = b"\xFE\xFF\x00f\x00.\x00x\x00m\x00l";
        assert_eq!(decode_pdf_string(bytes), "f.xml");
        assert_eq!(decode_pdf_string(b"plain.isdoc"), "plain.isdoc");
    }
}
