//! Import graph resolution and splitting.
//!
//! Every stylesheet imported under `layer(utilities)` or `layer(components)`
//! is walked depth-first, children before the importing file. Utility
//! candidates found along the way are pulled out into `@utility` blocks and
//! land either in place of the file's old content (when nothing else is
//! left and the file has a single importer) or in a `<stem>.<layer>.css`
//! sibling imported right after the original `@import`.

use crate::error::{Result, UpgradeError, Warning};
use crate::layer::is_utility_layer;
use crate::stylesheet::{Node, Stylesheet};
use crate::utility::UtilityBlocks;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};

pub type Sheets = BTreeMap<PathBuf, Stylesheet>;

/// Framework entry points that only make sense inside a specific layer.
const FRAMEWORK_SUB_IMPORTS: [(&str, &str); 3] = [
    ("tailwindcss/utilities", "utilities"),
    ("tailwindcss/preflight", "base"),
    ("tailwindcss/theme", "theme"),
];

/// The parameters of an `@import` statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportParams {
    /// The URL exactly as written, quotes or `url()` included.
    pub url: String,
    pub specifier: String,
    /// `Some("")` for an anonymous `layer`.
    pub layer: Option<String>,
    /// Trailing `supports()` and media conditions.
    pub conditions: String,
}

impl ImportParams {
    pub fn parse(params: &str) -> Option<Self> {
        let params = params.trim();
        let (url_len, specifier) = match params.chars().next() {
            Some(quote @ ('"' | '\'')) => {
                let end = params[1..].find(quote)? + 1;
                (end + 1, params[1..end].to_string())
            }
            _ if params
                .get(..4)
                .is_some_and(|prefix| prefix.eq_ignore_ascii_case("url(")) =>
            {
                let close = params.find(')')?;
                let inside = params[4..close].trim();
                let unquoted = inside
                    .strip_prefix('"')
                    .and_then(|raw| raw.strip_suffix('"'))
                    .or_else(|| {
                        inside
                            .strip_prefix('\'')
                            .and_then(|raw| raw.strip_suffix('\''))
                    })
                    .unwrap_or(inside);
                (close + 1, unquoted.to_string())
            }
            _ => return None,
        };

        let rest = params[url_len..].trim_start();
        let (layer, conditions) = if let Some(after) = rest.strip_prefix("layer(") {
            let close = after.find(')')?;
            (Some(after[..close].trim().to_string()), after[close + 1..].trim())
        } else if rest == "layer" {
            (Some(String::new()), "")
        } else if let Some(after) = rest.strip_prefix("layer ") {
            (Some(String::new()), after.trim())
        } else {
            (None, rest)
        };

        Some(Self {
            url: params[..url_len].to_string(),
            specifier,
            layer,
            conditions: conditions.to_string(),
        })
    }

    pub fn render(&self) -> String {
        let mut out = self.url.clone();
        match self.layer.as_deref() {
            Some("") => out.push_str(" layer"),
            Some(name) => {
                out.push_str(" layer(");
                out.push_str(name);
                out.push(')');
            }
            None => {}
        }
        if !self.conditions.is_empty() {
            out.push(' ');
            out.push_str(&self.conditions);
        }
        out
    }

    /// `tailwindcss` itself or one of its sub-entry points.
    pub fn is_framework(&self) -> bool {
        self.specifier == "tailwindcss" || self.specifier.starts_with("tailwindcss/")
    }

    fn quote(&self) -> char {
        if self.url.starts_with('"') { '"' } else { '\'' }
    }
}

/// Parameters of a top-level `@import` statement node.
pub fn import_params(node: &Node) -> Option<ImportParams> {
    let at_rule = node.as_at_rule()?;
    if !at_rule.is_named("import") || at_rule.nodes.is_some() {
        return None;
    }
    ImportParams::parse(&at_rule.params)
}

/// Resolves an import specifier against the importing file. Package names,
/// remote URLs and framework entry points resolve to `None`.
pub fn resolve_import(importer: &Path, specifier: &str) -> Option<PathBuf> {
    if specifier.is_empty()
        || specifier.contains("://")
        || specifier.starts_with("data:")
        || specifier == "tailwindcss"
        || specifier.starts_with("tailwindcss/")
    {
        return None;
    }
    let local = specifier.starts_with("./")
        || specifier.starts_with("../")
        || specifier.starts_with('/')
        || specifier.ends_with(".css");
    if !local {
        return None;
    }
    let base = importer.parent().unwrap_or_else(|| Path::new(""));
    let mut path = normalize_path(&base.join(specifier));
    if path.extension().is_none() {
        path.set_extension("css");
    }
    Some(path)
}

/// Local files imported by the top level of `sheet`, in source order.
pub fn local_imports(sheet: &Stylesheet) -> Vec<PathBuf> {
    sheet
        .nodes
        .iter()
        .filter_map(import_params)
        .filter_map(|params| resolve_import(&sheet.path, &params.specifier))
        .collect()
}

/// Lexically removes `.` and `..` components.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if matches!(out.components().next_back(), Some(Component::Normal(_))) {
                    out.pop();
                } else {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Stylesheets that no other loaded stylesheet imports.
pub fn entry_points(sheets: &Sheets) -> Vec<PathBuf> {
    let imported: HashSet<PathBuf> = sheets.values().flat_map(local_imports).collect();
    sheets
        .keys()
        .filter(|path| !imported.contains(*path))
        .cloned()
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ImportEdge {
    target: PathBuf,
    layer: Option<String>,
}

/// `@import` edges between loaded stylesheets. Building one rejects cycles.
#[derive(Debug, Clone)]
pub struct ImportGraph {
    entries: Vec<PathBuf>,
    edges: BTreeMap<PathBuf, Vec<ImportEdge>>,
}

impl ImportGraph {
    pub fn build(entries: &[PathBuf], sheets: &Sheets) -> Result<Self> {
        let mut edges = BTreeMap::new();
        for (path, sheet) in sheets {
            let list = sheet
                .nodes
                .iter()
                .filter_map(import_params)
                .filter_map(|params| {
                    let target = resolve_import(path, &params.specifier)?;
                    sheets.contains_key(&target).then_some(ImportEdge {
                        target,
                        layer: params.layer,
                    })
                })
                .collect();
            edges.insert(path.clone(), list);
        }
        let graph = Self {
            entries: entries.to_vec(),
            edges,
        };
        graph.check_cycles()?;
        Ok(graph)
    }

    fn edges_from(&self, path: &Path) -> &[ImportEdge] {
        self.edges.get(path).map(Vec::as_slice).unwrap_or(&[])
    }

    fn check_cycles(&self) -> Result<()> {
        let mut done = HashSet::new();
        let mut stack = Vec::new();
        for path in self.edges.keys() {
            self.visit_for_cycles(path, &mut stack, &mut done)?;
        }
        Ok(())
    }

    fn visit_for_cycles(
        &self,
        path: &Path,
        stack: &mut Vec<PathBuf>,
        done: &mut HashSet<PathBuf>,
    ) -> Result<()> {
        if let Some(start) = stack.iter().position(|entry| entry == path) {
            let mut cycle = stack[start..].to_vec();
            cycle.push(path.to_path_buf());
            return Err(UpgradeError::GraphCycle { cycle });
        }
        if done.contains(path) {
            return Ok(());
        }
        stack.push(path.to_path_buf());
        for edge in self.edges_from(path) {
            self.visit_for_cycles(&edge.target, stack, done)?;
        }
        stack.pop();
        done.insert(path.to_path_buf());
        Ok(())
    }

    /// Every layer each file is reached under. An unannotated import inherits
    /// the importer's layer.
    fn contexts(&self) -> HashMap<PathBuf, BTreeSet<Option<String>>> {
        let mut contexts: HashMap<PathBuf, BTreeSet<Option<String>>> = HashMap::new();
        let mut pending: Vec<(PathBuf, Option<String>)> = self
            .entries
            .iter()
            .rev()
            .map(|entry| (entry.clone(), None))
            .collect();
        while let Some((path, context)) = pending.pop() {
            if !contexts.entry(path.clone()).or_default().insert(context.clone()) {
                continue;
            }
            for edge in self.edges_from(&path).iter().rev() {
                let child = edge.layer.clone().or_else(|| context.clone());
                pending.push((edge.target.clone(), child));
            }
        }
        contexts
    }

    fn importer_counts(&self) -> HashMap<PathBuf, usize> {
        let mut counts = HashMap::new();
        for edge in self.edges.values().flatten() {
            *counts.entry(edge.target.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// Reachable files in depth-first pre-order from the entries.
    fn walk_order(&self) -> Vec<PathBuf> {
        let mut order = Vec::new();
        let mut seen = HashSet::new();
        let mut pending: Vec<PathBuf> = self.entries.iter().rev().cloned().collect();
        while let Some(path) = pending.pop() {
            if !seen.insert(path.clone()) {
                continue;
            }
            pending.extend(self.edges_from(&path).iter().rev().map(|edge| edge.target.clone()));
            order.push(path);
        }
        order
    }
}

/// Framework sub-imports without a layer get the one they implicitly assert.
pub fn annotate_framework_imports(sheet: &mut Stylesheet) -> bool {
    let mut changed = false;
    for node in &mut sheet.nodes {
        let Some(mut params) = import_params(node) else {
            continue;
        };
        if params.layer.is_some() {
            continue;
        }
        let specifier = params.specifier.trim_end_matches(".css");
        let Some((_, layer)) = FRAMEWORK_SUB_IMPORTS
            .iter()
            .find(|(entry, _)| *entry == specifier)
        else {
            continue;
        };
        params.layer = Some(layer.to_string());
        if let Node::AtRule(at_rule) = node {
            at_rule.params = params.render();
            changed = true;
        }
    }
    if changed {
        debug!(path = %sheet.path.display(), "annotated framework imports with their layer");
    }
    changed
}

/// Splits utility content out of every stylesheet imported under a utility
/// layer. `exists` reports files already present on disk. Returns the paths
/// of the stylesheets it created, which are also inserted into `sheets`.
pub fn migrate(
    entries: &[PathBuf],
    sheets: &mut Sheets,
    exists: impl Fn(&Path) -> bool,
    warnings: &mut Vec<Warning>,
) -> Result<Vec<PathBuf>> {
    let graph = ImportGraph::build(entries, sheets)?;
    for sheet in sheets.values_mut() {
        annotate_framework_imports(sheet);
    }

    let contexts = graph.contexts();
    for path in graph.walk_order() {
        let Some(layers) = contexts.get(&path) else {
            continue;
        };
        let utility = layers
            .iter()
            .any(|layer| layer.as_deref().is_some_and(is_utility_layer));
        let other = layers
            .iter()
            .any(|layer| !layer.as_deref().is_some_and(is_utility_layer));
        if utility && other {
            warnings.push(Warning {
                path: path.clone(),
                message: "imported both inside and outside a utility layer; left untouched"
                    .to_string(),
            });
        }
    }

    let mut splitter = Splitter {
        graph: &graph,
        importers: graph.importer_counts(),
        contexts,
        sheets,
        visited: HashSet::new(),
        emptied: HashSet::new(),
        created: Vec::new(),
    };

    let mut stranded: Vec<(PathBuf, PathBuf)> = Vec::new();
    for importer in graph.walk_order() {
        let mixed = splitter.in_utility_layer(&importer) && !splitter.extractable(&importer);
        if splitter.in_utility_layer(&importer) && !mixed {
            continue;
        }
        for edge in graph.edges_from(&importer) {
            let Some(layer) = edge.layer.as_deref().filter(|layer| is_utility_layer(layer)) else {
                continue;
            };
            if mixed {
                stranded.push((importer.clone(), edge.target.clone()));
            } else {
                splitter.split(&importer, &edge.target, layer, &exists)?;
            }
        }
    }

    // Utility-layer imports of a file that is itself left untouched.
    for (importer, target) in stranded {
        if splitter.visited.contains(&target) {
            continue;
        }
        warnings.push(Warning {
            path: target,
            message: format!(
                "imported under a utility layer from {}, which is left untouched; not split",
                importer.display()
            ),
        });
    }

    Ok(splitter.created)
}

struct Splitter<'a> {
    graph: &'a ImportGraph,
    importers: HashMap<PathBuf, usize>,
    contexts: HashMap<PathBuf, BTreeSet<Option<String>>>,
    sheets: &'a mut Sheets,
    visited: HashSet<PathBuf>,
    emptied: HashSet<PathBuf>,
    created: Vec<PathBuf>,
}

impl Splitter<'_> {
    fn in_utility_layer(&self, path: &Path) -> bool {
        self.contexts.get(path).is_some_and(|layers| {
            layers
                .iter()
                .any(|layer| layer.as_deref().is_some_and(is_utility_layer))
        })
    }

    fn extractable(&self, path: &Path) -> bool {
        self.contexts.get(path).is_some_and(|layers| {
            !layers.is_empty()
                && layers
                    .iter()
                    .all(|layer| layer.as_deref().is_some_and(is_utility_layer))
        })
    }

    fn importer_count(&self, path: &Path) -> usize {
        self.importers.get(path).copied().unwrap_or(0)
    }

    fn split(
        &mut self,
        importer: &Path,
        target: &Path,
        layer: &str,
        exists: &impl Fn(&Path) -> bool,
    ) -> Result<()> {
        let blocks = self.collect(target);
        if blocks.is_empty() {
            return Ok(());
        }

        let single_context = self.importer_count(target) == 1
            && self.contexts.get(target).is_some_and(|layers| layers.len() == 1);
        let Some(sheet) = self.sheets.get_mut(target) else {
            return Ok(());
        };

        if single_context && !sheet.has_content() {
            let mut nodes = std::mem::take(&mut sheet.nodes);
            nodes.extend(blocks.to_nodes());
            Stylesheet::normalize_top_level_spacing(&mut nodes);
            sheet.nodes = nodes;
            sheet.after = "\n".to_string();
            self.rewrite_import(importer, target, |params| {
                params.layer = None;
                None
            });
            info!(
                path = %target.display(),
                utilities = blocks.len(),
                "replaced stylesheet with its @utility blocks"
            );
            return Ok(());
        }

        let generated = sibling_path(target, layer);
        if self.sheets.contains_key(&generated) || exists(&generated) {
            return Err(UpgradeError::NameConflict {
                original: target.to_path_buf(),
                generated,
            });
        }

        let mut nodes = blocks.to_nodes();
        Stylesheet::normalize_top_level_spacing(&mut nodes);
        self.sheets.insert(
            generated.clone(),
            Stylesheet {
                path: generated.clone(),
                nodes,
                after: "\n".to_string(),
            },
        );
        self.rewrite_import(importer, target, |params| {
            let specifier = params.specifier.strip_suffix(".css").unwrap_or(&params.specifier);
            let quote = params.quote();
            Some(Node::at_rule(
                "import",
                format!("{quote}{specifier}.{layer}.css{quote}"),
            ))
        });
        info!(
            path = %generated.display(),
            utilities = blocks.len(),
            "created stylesheet for extracted @utility blocks"
        );
        self.created.push(generated);
        Ok(())
    }

    /// Depth-first, children before the file itself. Each file gives up its
    /// blocks on the first visit only.
    fn collect(&mut self, path: &Path) -> UtilityBlocks {
        let mut blocks = UtilityBlocks::new();
        if !self.extractable(path) || !self.visited.insert(path.to_path_buf()) {
            return blocks;
        }

        let graph = self.graph;
        let mut dropped = HashSet::new();
        for edge in graph.edges_from(path) {
            blocks.extend(self.collect(&edge.target));
            if self.emptied.contains(&edge.target) && self.importer_count(&edge.target) == 1 {
                dropped.insert(edge.target.clone());
            }
        }

        let Some(sheet) = self.sheets.get_mut(path) else {
            return blocks;
        };
        let leading = sheet.nodes.first().map(|node| node.raws().before.clone());
        let mut kept = Vec::with_capacity(sheet.nodes.len());
        let mut changed = false;
        for node in std::mem::take(&mut sheet.nodes) {
            if let Some(params) = import_params(&node) {
                let target = resolve_import(&sheet.path, &params.specifier);
                if target.is_some_and(|target| dropped.contains(&target)) {
                    changed = true;
                } else {
                    kept.push(node);
                }
                continue;
            }
            match blocks.absorb(node) {
                Ok(()) => changed = true,
                Err(node) => kept.push(node),
            }
        }
        if let (Some(first), Some(leading)) = (kept.first_mut(), leading) {
            first.raws_mut().before = leading;
        }
        sheet.nodes = kept;

        if changed {
            debug!(path = %path.display(), utilities = blocks.len(), "extracted utilities");
            if !sheet.has_content() {
                if sheet.nodes.is_empty() {
                    sheet.after.clear();
                }
                self.emptied.insert(path.to_path_buf());
            }
        }
        blocks
    }

    /// Applies `edit` to the importer's `@import` of `target`. When `edit`
    /// returns a node, it is inserted right after that import.
    fn rewrite_import(
        &mut self,
        importer: &Path,
        target: &Path,
        edit: impl FnOnce(&mut ImportParams) -> Option<Node>,
    ) {
        let Some(sheet) = self.sheets.get_mut(importer) else {
            return;
        };
        let position = sheet.nodes.iter().position(|node| {
            import_params(node).is_some_and(|params| {
                resolve_import(&sheet.path, &params.specifier).as_deref() == Some(target)
            })
        });
        let Some(position) = position else {
            return;
        };
        let Some(mut params) = import_params(&sheet.nodes[position]) else {
            return;
        };
        let inserted = edit(&mut params);
        if let Node::AtRule(at_rule) = &mut sheet.nodes[position] {
            at_rule.params = params.render();
        }
        if let Some(mut node) = inserted {
            node.raws_mut().before = "\n".to_string();
            sheet.nodes.insert(position + 1, node);
        }
    }
}

/// `<dir>/<stem>.<layer>.css` next to `path`.
pub fn sibling_path(path: &Path, layer: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_default();
    path.with_file_name(format!("{}.{}.css", stem, layer))
}
