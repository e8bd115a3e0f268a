//! Low-level embedded-file walks over a second reading of the container.
//!
//! The object graph is reloaded from the on-disk spool copy and walked in
//! two structurally different ways, because producers disagree on how they
//! wire embedded files:
//!
//! 1. the literal `/Root/Names/EmbeddedFiles/Names` pair array;
//! 2. a sweep over every file specification in the object table, whether
//!    or not any name tree reaches it.

use lopdf::{Document, Object};
use tracing::{debug, trace};

use super::attachments::{
    decode_pdf_string, filespec_content, filespec_name, resolve_array, resolve_dict,
};
use super::patterns::is_isdoc_name;
use super::{settle, Container, ExtractionStrategy, Payload, Provenance, Result, StrategyKind};
use crate::error::ContainerError;

/// Strategy 6: name-array walk, then file-spec sweep.
pub struct ObjectTreeWalk;

impl ExtractionStrategy for ObjectTreeWalk {
    fn kind(&self) -> StrategyKind {
        StrategyKind::ObjectTree
    }

    fn attempt(&self, container: &Container) -> Option<Payload> {
        settle(self.kind(), self.search(container))
    }
}

impl ObjectTreeWalk {
    fn search(&self, container: &Container) -> Result<Option<Payload>> {
        let doc = container.reload_from_spool()?;

        match names_array_walk(&doc) {
            Ok(Some((name, bytes))) => return Ok(Some(self.payload(bytes, "names", name))),
            Ok(None) => {}
            Err(e) => debug!("Names array walk failed: {}", e),
        }

        Ok(filespec_sweep(&doc).map(|(name, bytes)| self.payload(bytes, "filespec", name)))
    }

    fn payload(&self, bytes: Vec<u8>, walker: &str, name: String) -> Payload {
        Payload::new(
            bytes,
            Provenance::extracted(self.kind(), Some(format!("{} {}", walker, name))),
        )
    }
}

/// Follow `/Root/Names/EmbeddedFiles/Names` and read the first matching
/// entry's `/EF` stream.
fn names_array_walk(doc: &Document) -> Result<Option<(String, Vec<u8>)>> {
    let root = doc
        .trailer
        .get(b"Root")
        .ok()
        .and_then(|o| resolve_dict(doc, o))
        .ok_or_else(|| ContainerError::MissingKey("/Root".into()))?;
    let names = root
        .get(b"Names")
        .ok()
        .and_then(|o| resolve_dict(doc, o))
        .ok_or_else(|| ContainerError::MissingKey("/Names".into()))?;
    let embedded = names
        .get(b"EmbeddedFiles")
        .ok()
        .and_then(|o| resolve_dict(doc, o))
        .ok_or_else(|| ContainerError::MissingKey("/EmbeddedFiles".into()))?;
    let pairs = embedded
        .get(b"Names")
        .ok()
        .and_then(|o| resolve_array(doc, o))
        .ok_or_else(|| ContainerError::MissingKey("/EmbeddedFiles/Names".into()))?;

    for pair in pairs.chunks(2) {
        let [key, spec] = pair else {
            continue;
        };
        let Ok(raw_name) = key.as_str() else {
            continue;
        };
        let name = decode_pdf_string(raw_name);
        trace!("Names array entry: {}", name);

        if is_isdoc_name(&name) {
            let bytes = filespec_content(doc, spec)?;
            return Ok(Some((name, bytes)));
        }
    }

    Ok(None)
}

/// First file specification anywhere in the object table whose declared
/// name matches, in object-id order.
fn filespec_sweep(doc: &Document) -> Option<(String, Vec<u8>)> {
    for (id, object) in doc.objects.iter() {
        let Object::Dictionary(dict) = object else {
            continue;
        };
        if dict.get(b"EF").is_err() {
            continue;
        }
        let Some(name) = filespec_name(dict) else {
            continue;
        };
        if !is_isdoc_name(&name) {
            continue;
        }

        match filespec_content(doc, &Object::Reference(*id)) {
            Ok(bytes) => return Some((name, bytes)),
            Err(e) => debug!("File spec {} {} unreadable: {}", id.0, id.1, e),
        }
    }
    None
}
