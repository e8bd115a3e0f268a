//! Deriving a rule set from an existing document.

use tracing::{debug, info};

use crate::models::rules::RuleSet;
use crate::xml::{element_text, is_leaf, DocumentTree};

/// Record every leaf element with text as an expected value.
///
/// A path is recorded only when it resolves to the very leaf it was
/// computed from, so the inferred rules validate their source document
/// without errors. Later leaves sharing a path, and leaves whose path is
/// shadowed by an earlier element elsewhere in the tree, are skipped.
pub fn infer_rules(tree: &DocumentTree<'_>) -> RuleSet {
    let mut rules = RuleSet::new();
    let mut skipped = 0usize;

    for node in tree.root().descendants().skip(1) {
        if !node.is_element() || !is_leaf(node) {
            continue;
        }
        let text = element_text(node);
        if text.is_empty() {
            continue;
        }

        let path = tree.field_path_of(node);
        let key = path.to_string();
        if rules.expected_values.contains_key(&key) {
            debug!("Skipping repeated field {}", key);
            skipped += 1;
            continue;
        }
        if tree.resolve(&path) != Some(node) {
            debug!("Skipping field {}: an earlier element answers that path", key);
            skipped += 1;
            continue;
        }

        rules.expected_values.insert(key, text);
    }

    info!(
        "Inferred {} expected values ({} leaves skipped)",
        rules.expected_values.len(),
        skipped
    );
    rules
}
