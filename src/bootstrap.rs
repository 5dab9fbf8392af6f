//! Carries the legacy config into the stylesheet that hosts the framework,
//! either as an inline `@theme` block or as an `@config` pointer.

use crate::graph::import_params;
use crate::stylesheet::{Node, Stylesheet};
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Legacy theme keys and the variable namespace that replaced them.
const THEME_NAMESPACES: [(&str, &str); 10] = [
    ("colors", "color"),
    ("spacing", "spacing"),
    ("fontFamily", "font"),
    ("fontSize", "text"),
    ("fontWeight", "font-weight"),
    ("borderRadius", "radius"),
    ("boxShadow", "shadow"),
    ("screens", "breakpoint"),
    ("letterSpacing", "tracking"),
    ("lineHeight", "leading"),
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bootstrap {
    /// Flattened `(dotted.key, value)` theme entries.
    pub theme: Vec<(String, String)>,
    /// Location of the legacy config, resolved against the project root.
    pub legacy_config: Option<PathBuf>,
}

impl Bootstrap {
    pub fn is_empty(&self) -> bool {
        self.theme.is_empty() && self.legacy_config.is_none()
    }
}

pub fn migrate(sheet: &mut Stylesheet, bootstrap: &Bootstrap) -> bool {
    let Some(anchor) = last_framework_node(&sheet.nodes) else {
        return false;
    };
    if sheet
        .nodes
        .iter()
        .any(|node| node.is_at_rule("theme") || node.is_at_rule("config"))
    {
        return false;
    }

    let node = if !bootstrap.theme.is_empty() {
        let declarations = bootstrap
            .theme
            .iter()
            .map(|(key, value)| Node::declaration(theme_variable(key), value.clone()))
            .collect();
        let mut block = Node::block_at_rule("theme", "", declarations);
        block.reindent(0);
        block.raws_mut().before = "\n\n".to_string();
        block
    } else if let Some(config) = &bootstrap.legacy_config {
        let base = sheet.path.parent().unwrap_or_else(|| Path::new(""));
        let relative = relative_path(base, config);
        let mut statement = Node::at_rule("config", format!("'{}'", relative));
        statement.raws_mut().before = "\n".to_string();
        statement
    } else {
        return false;
    };

    sheet.nodes.insert(anchor + 1, node);
    debug!(path = %sheet.path.display(), "inserted legacy config bootstrap");
    true
}

/// Index of the last top-level `@tailwind` directive or framework import.
fn last_framework_node(nodes: &[Node]) -> Option<usize> {
    nodes.iter().rposition(|node| {
        node.is_at_rule("tailwind") || import_params(node).is_some_and(|params| params.is_framework())
    })
}

/// `colors.brand.DEFAULT` becomes `--color-brand`.
pub fn theme_variable(key: &str) -> String {
    let mut segments = key.split('.');
    let head = segments.next().unwrap_or_default();
    let namespace = THEME_NAMESPACES
        .iter()
        .find(|(legacy, _)| *legacy == head)
        .map(|(_, namespace)| namespace.to_string())
        .unwrap_or_else(|| kebab_case(head));

    let mut name = format!("--{}", namespace);
    for segment in segments.filter(|segment| *segment != "DEFAULT") {
        name.push('-');
        name.push_str(&kebab_case(segment));
    }
    name
}

fn kebab_case(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + 4);
    for ch in input.chars() {
        if ch.is_ascii_uppercase() {
            if !out.is_empty() {
                out.push('-');
            }
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

/// Path of `target` relative to the directory `base`, always starting with
/// `./` or `../`.
pub fn relative_path(base: &Path, target: &Path) -> String {
    let base: Vec<Component> = base.components().filter(|c| *c != Component::CurDir).collect();
    let target: Vec<Component> = target
        .components()
        .filter(|c| *c != Component::CurDir)
        .collect();
    let shared = base
        .iter()
        .zip(target.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut parts: Vec<String> = Vec::new();
    for _ in shared..base.len() {
        parts.push("..".to_string());
    }
    for component in &target[shared..] {
        parts.push(component.as_os_str().to_string_lossy().to_string());
    }
    let joined = parts.join("/");
    if joined.starts_with("..") {
        joined
    } else {
        format!("./{}", joined)
    }
}
