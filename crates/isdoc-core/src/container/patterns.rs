//! Patterns for sniffing ISDOC invoices in text and bytes.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // Root element declaring the ISDOC 6 default namespace, up to the first
    // closing tag. Dot matches newlines.
    pub static ref ISDOC_TEXT: Regex = Regex::new(
        r#"(?s)<Invoice[^>]+xmlns="http://isdoc\.cz/namespace/2013"[^>]*>.*?</Invoice>"#
    ).unwrap();

    // Same pattern over arbitrary bytes (non-UTF-8 input allowed).
    pub static ref ISDOC_BYTES: regex::bytes::Regex = regex::bytes::Regex::new(
        r#"(?s-u)<Invoice[^>]+xmlns="http://isdoc\.cz/namespace/2013"[^>]*>.*?</Invoice>"#
    ).unwrap();
}

/// Attachment names that may carry an ISDOC payload (`.xml`, `.isdoc`).
pub fn is_isdoc_name(name: &str) -> bool {
    let lower = name.trim().to_lowercase();
    lower.ends_with(".xml") || lower.ends_with(".isdoc")
}
