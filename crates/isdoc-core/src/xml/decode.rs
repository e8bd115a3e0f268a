//! Character decoding of raw payload bytes.
//!
//! The encoding is taken from a byte order mark first, then from the XML
//! declaration, and defaults to UTF-8. Decoding never substitutes
//! replacement characters: bytes invalid in the chosen encoding are an error.

use std::borrow::Cow;

use encoding_rs::{Encoding, UTF_16BE, UTF_16LE, UTF_8};
use lazy_static::lazy_static;
use regex::bytes::Regex;
use tracing::trace;

use crate::error::{IsdocError, Result};

lazy_static! {
    static ref DECLARED_ENCODING: Regex =
        Regex::new(r#"(?-u)\A\s*<\?xml[^>]*?\sencoding\s*=\s*["']([A-Za-z0-9._:-]+)["']"#).unwrap();
}

/// Decode payload bytes into text for parsing.
pub fn decode_payload(bytes: &[u8]) -> Result<Cow<'_, str>> {
    let (encoding, body) = match Encoding::for_bom(bytes) {
        Some((encoding, bom_len)) => (encoding, &bytes[bom_len..]),
        None => (sniff_encoding(bytes), bytes),
    };
    trace!("Decoding {} payload bytes as {}", body.len(), encoding.name());

    encoding
        .decode_without_bom_handling_and_without_replacement(body)
        .ok_or_else(|| IsdocError::Xml(format!("payload is not valid {}", encoding.name())))
}

/// Encoding of a document without a byte order mark.
fn sniff_encoding(bytes: &[u8]) -> &'static Encoding {
    // `<?` in UTF-16 without a BOM
    if bytes.starts_with(b"<\0?\0") {
        return UTF_16LE;
    }
    if bytes.starts_with(b"\0<\0?") {
        return UTF_16BE;
    }

    DECLARED_ENCODING
        .captures(bytes)
        .and_then(|caps| caps.get(1))
        .and_then(|label| Encoding::for_label_no_replacement(label.as_bytes()))
        // an ASCII-readable declaration cannot be UTF-16
        .map(Encoding::output_encoding)
        .unwrap_or(UTF_8)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utf16le(text: &str, bom: bool) -> Vec<u8> {
        let mut bytes = if bom { vec![0xFF, 0xFE] } else { Vec::new() };
        bytes.extend(text.encode_utf16().flat_map(u16::to_le_bytes));
        bytes
    }

    #[test]
    fn test_utf8_is_borrowed() {
        let text = decode_payload(b"<a>x</a>").unwrap();
        assert!(matches!(text, Cow::Borrowed("<a>x</a>")));
        assert_eq!(decode_payload(b"\xEF\xBB\xBF<a/>").unwrap(), "<a/>");
    }

    #[test]
    fn test_declared_windows_1250() {
        let bytes = b"<?xml version=\"1.0\" encoding=\"windows-1250\"?><a>Odb\xecratel</a>";
        let text = decode_payload(bytes).unwrap();
        assert!(text.ends_with("<a>Odběratel</a>"));

        let single = b"<?xml version='1.0' encoding='CP1250'?><a>\x9a</a>";
        assert!(decode_payload(single).unwrap().ends_with("<a>š</a>"));
    }

    #[test]
    fn test_utf16_with_and_without_bom() {
        let xml = "<?xml version=\"1.0\" encoding=\"UTF-16\"?><a>Žluťoučký</a>";
        assert_eq!(decode_payload(&utf16le(xml, true)).unwrap(), xml);
        assert_eq!(decode_payload(&utf16le(xml, false)).unwrap(), xml);

        let mut be = vec![0xFE, 0xFF];
        be.extend("<a/>".encode_utf16().flat_map(u16::to_be_bytes));
        assert_eq!(decode_payload(&be).unwrap(), "<a/>");
    }

    #[test]
    fn test_utf16_label_on_ascii_bytes_means_utf8() {
        let xml = "<?xml version=\"1.0\" encoding=\"UTF-16\"?><a>ě</a>";
        assert_eq!(decode_payload(xml.as_bytes()).unwrap(), xml);
    }

    #[test]
    fn test_invalid_bytes_are_rejected() {
        let err = decode_payload(b"<a>\xff</a>").unwrap_err();
        assert!(err.to_string().contains("not valid UTF-8"));
        assert!(decode_payload(b"<?xml version='1.0' encoding='x-unknown'?><a>\xff</a>").is_err());
    }
}
