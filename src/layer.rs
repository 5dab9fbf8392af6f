use crate::error::Warning;
use crate::stylesheet::{Node, Stylesheet};
use crate::utility::UtilityBlocks;
use tracing::debug;

/// Layers whose class rules become `@utility` blocks.
pub fn is_utility_layer(name: &str) -> bool {
    matches!(name.trim(), "utilities" | "components")
}

/// Converts the class rules inside top-level `@layer utilities` and
/// `@layer components` blocks into `@utility` blocks. Anything else stays
/// inside the `@layer`, which is dropped once nothing else is left in it.
pub fn migrate(sheet: &mut Stylesheet, warnings: &mut Vec<Warning>) -> bool {
    let mut changed = false;
    let mut out = Vec::with_capacity(sheet.nodes.len());

    for node in std::mem::take(&mut sheet.nodes) {
        let Node::AtRule(mut at_rule) = node else {
            out.push(node);
            continue;
        };
        if !at_rule.is_named("layer") || !is_utility_layer(&at_rule.params) {
            out.push(Node::AtRule(at_rule));
            continue;
        }
        let Some(children) = at_rule.nodes.take() else {
            out.push(Node::AtRule(at_rule));
            continue;
        };

        let mut blocks = UtilityBlocks::new();
        let mut remaining = Vec::new();
        for child in children {
            if let Err(child) = blocks.absorb(child) {
                remaining.push(child);
            }
        }

        if blocks.is_empty() {
            at_rule.nodes = Some(remaining);
            out.push(Node::AtRule(at_rule));
            continue;
        }

        changed = true;
        let original_before = at_rule.raws.before.clone();
        let mut emitted = Vec::new();
        let (comments, content): (Vec<Node>, Vec<Node>) =
            remaining.into_iter().partition(Node::is_comment);

        if content.is_empty() {
            emitted.extend(comments);
        } else {
            warnings.extend(content.iter().filter_map(|node| match node {
                Node::Rule(rule) if rule.selector.trim_start().starts_with('.') => Some(Warning {
                    path: sheet.path.clone(),
                    message: format!(
                        "`{}` in @layer {} is not a single class rule; left in the layer",
                        rule.selector, at_rule.params
                    ),
                }),
                _ => None,
            }));
            let mut kept: Vec<Node> = comments;
            kept.extend(content);
            at_rule.nodes = Some(kept);
            let mut layer = Node::AtRule(at_rule);
            layer.reindent(0);
            emitted.push(layer);
        }
        emitted.extend(blocks.to_nodes());

        for (idx, mut node) in emitted.into_iter().enumerate() {
            if idx == 0 {
                node.raws_mut().before = original_before.clone();
            } else {
                node.raws_mut().before = "\n\n".to_string();
            }
            out.push(node);
        }
    }

    sheet.nodes = out;
    if changed {
        debug!(path = %sheet.path.display(), "migrated @layer utilities/components");
    }
    changed
}
