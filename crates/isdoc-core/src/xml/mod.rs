//! Namespace-aware document tree over an ISDOC payload.

mod decode;
mod path;

pub use decode::decode_payload;
pub use path::FieldPath;

use roxmltree::{Document, Node};

use crate::error::{IsdocError, Result};

/// Default namespace of ISDOC 6 invoices.
pub const ISDOC_NAMESPACE: &str = "http://isdoc.cz/namespace/2013";

/// A parsed XML payload with a single default namespace.
///
/// Field paths are resolved against the root element's default namespace,
/// so `Header/Currency` means `//ns:Header/ns:Currency`.
pub struct DocumentTree<'input> {
    document: Document<'input>,
    namespace: Option<String>,
}

impl<'input> DocumentTree<'input> {
    /// Parse XML text.
    pub fn parse(text: &'input str) -> Result<Self> {
        let document = Document::parse(text).map_err(|e| IsdocError::Xml(e.to_string()))?;
        let namespace = document
            .root_element()
            .lookup_namespace_uri(None)
            .map(str::to_string);
        Ok(Self {
            document,
            namespace,
        })
    }

    /// Check that bytes decode and form a well-formed document.
    pub fn is_well_formed(bytes: &[u8]) -> bool {
        decode_payload(bytes).is_ok_and(|text| DocumentTree::parse(&text).is_ok())
    }

    /// The root element.
    pub fn root(&self) -> Node<'_, 'input> {
        self.document.root_element()
    }

    /// Default namespace of the root element, if declared.
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn document(&self) -> &Document<'input> {
        &self.document
    }

    /// All elements matching `path`, in document order.
    ///
    /// A node matches when its name equals the last segment and its parent
    /// chain matches the preceding segments; the first segment may sit at
    /// any depth (descendant-or-self of the document).
    pub fn resolve_all<'a>(&'a self, path: &'a FieldPath) -> impl Iterator<Item = Node<'a, 'input>> + 'a {
        self.document
            .descendants()
            .filter(move |node| !path.is_empty() && self.matches_path(*node, path))
    }

    /// First element matching `path` in document order.
    pub fn resolve(&self, path: &FieldPath) -> Option<Node<'_, 'input>> {
        if path.is_empty() {
            return None;
        }
        self.document
            .descendants()
            .find(|node| self.matches_path(*node, path))
    }

    /// Trimmed text of the first match, `None` when nothing matches.
    pub fn resolve_text(&self, path: &FieldPath) -> Option<String> {
        self.resolve(path).map(element_text)
    }

    /// Field path of an element: ancestors below the root, root-to-leaf.
    pub fn field_path_of(&self, node: Node<'_, 'input>) -> FieldPath {
        let root = self.root();
        let mut segments: Vec<&str> = node
            .ancestors()
            .filter(|n| n.is_element() && *n != root)
            .map(|n| n.tag_name().name())
            .collect();
        segments.reverse();
        FieldPath::from_segments(segments)
    }

    /// Every element with non-empty text as `(local name, text)`, document order.
    pub fn text_fields(&self) -> Vec<(String, String)> {
        self.root()
            .descendants()
            .filter(|n| n.is_element())
            .filter_map(|n| {
                let text = element_text(n);
                (!text.is_empty()).then(|| (n.tag_name().name().to_string(), text))
            })
            .collect()
    }

    fn matches_segment(&self, node: Node<'_, 'input>, segment: &str) -> bool {
        node.is_element()
            && node.tag_name().name() == segment
            && node.tag_name().namespace() == self.namespace.as_deref()
    }

    fn matches_path(&self, node: Node<'_, 'input>, path: &FieldPath) -> bool {
        let mut current = Some(node);
        for segment in path.segments().iter().rev() {
            match current {
                Some(n) if self.matches_segment(n, segment) => current = n.parent(),
                _ => return false,
            }
        }
        true
    }
}

/// Trimmed direct text of an element (text before its first child).
pub fn element_text(node: Node<'_, '_>) -> String {
    node.text().map(str::trim).unwrap_or_default().to_string()
}

/// Whether an element has no element children.
pub fn is_leaf(node: Node<'_, '_>) -> bool {
    !node.children().any(|c| c.is_element())
}
