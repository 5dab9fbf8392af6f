use crate::candidate::{RenameTable, migrate_candidate};
use crate::scanner::{class_spans, class_tokens, is_valid_candidate};
use std::ops::Range;

/// Rewrites legacy utility tokens inside the class lists of a template,
/// markup or script file. `ext` is the lowercase file extension. Returns
/// `None` when nothing changed.
pub fn rewrite(text: &str, ext: Option<&str>, renames: &RenameTable) -> Option<String> {
    let mut edits: Vec<(Range<usize>, String)> = Vec::new();
    for span in class_spans(text, ext) {
        for token in class_tokens(text, span) {
            let raw = &text[token.clone()];
            if !is_valid_candidate(raw) {
                continue;
            }
            if let Some(migrated) = migrate_candidate(raw, renames) {
                edits.push((token, migrated));
            }
        }
    }
    if edits.is_empty() {
        return None;
    }

    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for (range, replacement) in edits {
        out.push_str(&text[cursor..range.start]);
        out.push_str(&replacement);
        cursor = range.end;
    }
    out.push_str(&text[cursor..]);
    Some(out)
}
