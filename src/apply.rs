use crate::candidate::{Candidate, RenameTable};
use crate::stylesheet::{Node, Stylesheet};
use std::ops::Range;
use tracing::debug;

/// Normalizes every `@apply` in the stylesheet: legacy `!` prefixes and a
/// trailing `!important` become a single trailing `!` per argument, and
/// renamed utilities are replaced.
pub fn migrate(sheet: &mut Stylesheet, renames: &RenameTable) -> bool {
    let changed = migrate_nodes(&mut sheet.nodes, renames);
    if changed {
        debug!(path = %sheet.path.display(), "migrated @apply arguments");
    }
    changed
}

fn migrate_nodes(nodes: &mut [Node], renames: &RenameTable) -> bool {
    let mut changed = false;
    for node in nodes {
        match node {
            Node::Rule(rule) => changed |= migrate_nodes(&mut rule.nodes, renames),
            Node::AtRule(at_rule) => {
                if at_rule.is_named("apply") {
                    if let Some(params) = migrate_params(&at_rule.params, renames) {
                        at_rule.params = params;
                        changed = true;
                    }
                }
                if let Some(children) = &mut at_rule.nodes {
                    changed |= migrate_nodes(children, renames);
                }
            }
            Node::Declaration(_) | Node::Comment(_) => {}
        }
    }
    changed
}

/// Rewrites one `@apply` argument list. The whitespace between arguments is
/// kept as written. Returns `None` when no argument changed.
pub fn migrate_params(params: &str, renames: &RenameTable) -> Option<String> {
    let mut args = arg_ranges(params);
    let important_all = args
        .last()
        .is_some_and(|range| &params[range.clone()] == "!important");
    // The marker goes together with the whitespace in front of it.
    let tail = match important_all.then(|| args.pop()).flatten() {
        Some(marker) => {
            let start = args.last().map_or(marker.start, |range| range.end);
            start..marker.end
        }
        None => params.len()..params.len(),
    };

    let mut out = String::with_capacity(params.len() + args.len());
    let mut cursor = 0;
    let mut changed = important_all;
    for range in args {
        let arg = &params[range.clone()];
        let migrated = migrate_arg(arg, important_all, renames);
        changed |= migrated != arg;
        out.push_str(&params[cursor..range.start]);
        out.push_str(&migrated);
        cursor = range.end;
    }
    out.push_str(&params[cursor..tail.start]);
    out.push_str(&params[tail.end..]);

    changed.then_some(out)
}

fn arg_ranges(params: &str) -> Vec<Range<usize>> {
    let mut ranges = Vec::new();
    let mut start = None;
    for (idx, ch) in params.char_indices() {
        match (ch.is_whitespace(), start) {
            (true, Some(begin)) => {
                ranges.push(begin..idx);
                start = None;
            }
            (false, None) => start = Some(idx),
            _ => {}
        }
    }
    if let Some(begin) = start {
        ranges.push(begin..params.len());
    }
    ranges
}

fn migrate_arg(arg: &str, important: bool, renames: &RenameTable) -> String {
    let Some(mut candidate) = Candidate::parse(arg) else {
        if important && !arg.ends_with('!') {
            return format!("{}!", arg);
        }
        return arg.to_string();
    };
    candidate.important |= important;
    match renames.lookup(candidate.base) {
        Some(renamed) => candidate.render(&renamed),
        None => candidate.render(candidate.base),
    }
}
