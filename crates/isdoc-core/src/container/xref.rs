//! Brute-force scan over every decoded stream in the object table.

use lopdf::Object;
use tracing::trace;

use super::attachments::stream_bytes;
use super::patterns::ISDOC_BYTES;
use super::{settle, Container, ExtractionStrategy, Payload, Provenance, Result, StrategyKind};

/// Strategy 5: decode each indirect stream object and apply the byte regex.
pub struct XrefStreams;

impl ExtractionStrategy for XrefStreams {
    fn kind(&self) -> StrategyKind {
        StrategyKind::XrefStream
    }

    fn attempt(&self, container: &Container) -> Option<Payload> {
        settle(self.kind(), self.search(container))
    }
}

impl XrefStreams {
    fn search(&self, container: &Container) -> Result<Option<Payload>> {
        let doc = container.document()?;

        for (id, object) in doc.objects.iter() {
            let Object::Stream(stream) = object else {
                continue;
            };

            let data = stream_bytes(stream);
            trace!("Scanning object {} {} ({} bytes)", id.0, id.1, data.len());

            if let Some(m) = ISDOC_BYTES.find(&data) {
                return Ok(Some(Payload::new(
                    m.as_bytes().to_vec(),
                    Provenance::extracted(self.kind(), Some(format!("object {} {}", id.0, id.1))),
                )));
            }
        }

        Ok(None)
    }
}
