//! Locates the files selected by content globs and the byte ranges inside
//! them that hold class lists.

use globset::{Glob, GlobSet};
use ignore::WalkBuilder;
use std::collections::HashSet;
use std::ops::Range;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanError {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanGlobOptions {
    pub base_path: PathBuf,
    pub respect_gitignore: bool,
    pub include_node_modules: bool,
    pub include_binary_files: bool,
    pub include_css_files: bool,
    pub include_lock_files: bool,
}

impl Default for ScanGlobOptions {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("."),
            respect_gitignore: true,
            include_node_modules: false,
            include_binary_files: false,
            include_css_files: false,
            include_lock_files: false,
        }
    }
}

/// Files under `options.base_path` matching any of `patterns` and none of
/// `ignore_patterns`, in walk order.
pub fn scan_globs_with_options(
    patterns: &[String],
    ignore_patterns: &[String],
    options: &ScanGlobOptions,
) -> Result<Vec<PathBuf>, ScanError> {
    if patterns.is_empty() {
        return Ok(Vec::new());
    }

    let patterns: Vec<String> = patterns
        .iter()
        .map(|pattern| pattern.trim_start_matches("./").to_string())
        .collect();
    let globset = build_globset(&patterns)?;
    let ignore_set = build_globset(ignore_patterns)?;
    let mut paths = Vec::new();
    let mut seen = HashSet::new();

    let mut builder = WalkBuilder::new(&options.base_path);
    builder
        .hidden(false)
        .git_ignore(options.respect_gitignore)
        .git_global(options.respect_gitignore)
        .git_exclude(options.respect_gitignore);
    let walker = builder.build();

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(_) => continue,
        };
        if !entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
            continue;
        }
        let path = entry.path();
        let relative_path = path.strip_prefix(&options.base_path).unwrap_or(path);
        if !globset.is_match(relative_path) && !globset.is_match(path) {
            continue;
        }
        if ignore_set.is_match(relative_path) || ignore_set.is_match(path) {
            continue;
        }
        if should_skip_file(path, options) {
            continue;
        }
        if seen.insert(path.to_path_buf()) {
            paths.push(path.to_path_buf());
        }
    }

    Ok(paths)
}

/// Every stylesheet in the project, for runs without explicit entries.
pub fn discover_stylesheets(
    base_path: &Path,
    ignore_patterns: &[String],
) -> Result<Vec<PathBuf>, ScanError> {
    let options = ScanGlobOptions {
        base_path: base_path.to_path_buf(),
        include_css_files: true,
        ..ScanGlobOptions::default()
    };
    let mut paths = scan_globs_with_options(&["**/*.css".to_string()], ignore_patterns, &options)?;
    paths.sort();
    Ok(paths)
}

fn should_skip_file(path: &Path, options: &ScanGlobOptions) -> bool {
    if !options.include_node_modules
        && path
            .components()
            .any(|component| component.as_os_str() == "node_modules")
    {
        return true;
    }

    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("");
    if !options.include_lock_files && is_common_lock_file(file_name) {
        return true;
    }

    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase());
    if let Some(ext) = ext.as_deref() {
        if !options.include_css_files && is_css_extension(ext) {
            return true;
        }
        if !options.include_binary_files && is_binary_extension(ext) {
            return true;
        }
    }

    false
}

fn is_css_extension(ext: &str) -> bool {
    matches!(ext, "css" | "scss" | "sass" | "less" | "styl" | "pcss")
}

fn is_binary_extension(ext: &str) -> bool {
    matches!(
        ext,
        "png"
            | "jpg"
            | "jpeg"
            | "gif"
            | "webp"
            | "ico"
            | "bmp"
            | "avif"
            | "mp4"
            | "webm"
            | "mp3"
            | "wav"
            | "zip"
            | "gz"
            | "pdf"
            | "woff"
            | "woff2"
            | "ttf"
            | "otf"
            | "eot"
    )
}

fn is_common_lock_file(file_name: &str) -> bool {
    matches!(
        file_name,
        "package-lock.json"
            | "pnpm-lock.yaml"
            | "yarn.lock"
            | "bun.lockb"
            | "bun.lock"
            | "npm-shrinkwrap.json"
            | "Cargo.lock"
            | "composer.lock"
            | "Gemfile.lock"
    )
}

fn build_globset(patterns: &[String]) -> Result<GlobSet, ScanError> {
    let mut builder = globset::GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|err| ScanError {
            message: format!("invalid glob pattern '{}': {}", pattern, err),
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|err| ScanError {
        message: format!("failed to build glob set: {}", err),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Extractor {
    Markup,
    Script,
}

impl Extractor {
    fn for_extension(ext: Option<&str>) -> Self {
        match ext {
            Some("js" | "jsx" | "ts" | "tsx" | "mjs" | "cjs") => Self::Script,
            _ => Self::Markup,
        }
    }
}

/// Byte ranges of `text` holding class lists: class attribute values and,
/// in scripts, the string parts of class helper calls. Sorted and disjoint.
pub fn class_spans(text: &str, ext: Option<&str>) -> Vec<Range<usize>> {
    let mut spans = class_attribute_spans(text);
    if Extractor::for_extension(ext) == Extractor::Script {
        spans.extend(class_helper_spans(text));
    }
    spans.retain(|span| !span.is_empty());
    spans.sort_by_key(|span| (span.start, span.end));
    spans.dedup();
    let mut disjoint: Vec<Range<usize>> = Vec::with_capacity(spans.len());
    for span in spans {
        match disjoint.last() {
            Some(last) if span.start < last.end => {}
            _ => disjoint.push(span),
        }
    }
    disjoint
}

/// Whitespace-separated tokens inside `span`, keeping bracketed and
/// parenthesized groups whole.
pub fn class_tokens(text: &str, span: Range<usize>) -> Vec<Range<usize>> {
    let mut tokens = Vec::new();
    let mut start: Option<usize> = None;
    let mut bracket_depth: usize = 0;
    let mut paren_depth: usize = 0;
    let mut idx = span.start;

    while idx < span.end {
        let Some((ch, size)) = next_char(text, idx) else {
            break;
        };
        match ch {
            '[' => bracket_depth += 1,
            ']' => bracket_depth = bracket_depth.saturating_sub(1),
            '(' => paren_depth += 1,
            ')' => paren_depth = paren_depth.saturating_sub(1),
            _ => {}
        }
        if ch.is_whitespace() && bracket_depth == 0 && paren_depth == 0 {
            if let Some(begin) = start.take() {
                tokens.push(begin..idx);
            }
        } else if start.is_none() {
            start = Some(idx);
        }
        idx += size;
    }
    if let Some(begin) = start {
        tokens.push(begin..span.end);
    }
    tokens
}

/// Whether `token` has the shape of a utility class, legacy or current.
pub fn is_valid_candidate(token: &str) -> bool {
    if token.is_empty() || token.starts_with('.') || token.starts_with('/') {
        return false;
    }

    let mut has_letter_or_bracket = false;
    let mut bracket_depth = 0usize;
    let mut paren_depth = 0usize;
    let mut previous: Option<char> = None;
    let last_idx = token.chars().count().saturating_sub(1);

    for (idx, ch) in token.chars().enumerate() {
        if ch.is_ascii_alphabetic() || ch == '[' {
            has_letter_or_bracket = true;
        }
        if !is_allowed_char(ch) {
            return false;
        }
        let nested = bracket_depth > 0 || paren_depth > 0;
        match ch {
            '[' => bracket_depth += 1,
            ']' => {
                if bracket_depth == 0 {
                    return false;
                }
                bracket_depth -= 1;
            }
            '(' => paren_depth += 1,
            ')' => {
                if paren_depth == 0 {
                    return false;
                }
                paren_depth -= 1;
            }
            '\'' | '"' | '>' | '&' | ',' if !nested => return false,
            '!' if !nested => {
                let leading = idx == 0 || previous == Some(':') || previous == Some('!');
                if !leading && idx != last_idx {
                    return false;
                }
            }
            _ => {}
        }
        previous = Some(ch);
    }

    if bracket_depth != 0 || paren_depth != 0 {
        return false;
    }
    if token.ends_with(':') || token.ends_with('\\') {
        return false;
    }

    has_letter_or_bracket
}

fn is_allowed_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric()
        || matches!(
            ch,
            '-' | '_'
                | '/'
                | ':'
                | '.'
                | '%'
                | '#'
                | '['
                | ']'
                | '('
                | ')'
                | '!'
                | '&'
                | '>'
                | '+'
                | ','
                | '\''
                | '"'
                | '*'
                | '@'
                | '='
        )
}

fn class_attribute_spans(text: &str) -> Vec<Range<usize>> {
    const PLAIN_ATTRS: [&str; 2] = ["class", "className"];
    const BOUND_ATTRS: [&str; 3] = ["class:list", ":class", "v-bind:class"];
    let mut out = Vec::new();

    for attr in PLAIN_ATTRS.into_iter().chain(BOUND_ATTRS) {
        let bound = BOUND_ATTRS.contains(&attr);
        for (idx, _) in text.match_indices(attr) {
            if !is_attr_boundary(text, idx, attr.len()) {
                continue;
            }
            let mut pos = skip_whitespace(text, idx + attr.len());
            if !text[pos..].starts_with('=') {
                continue;
            }
            pos = skip_whitespace(text, pos + 1);
            let Some((ch, size)) = next_char(text, pos) else {
                continue;
            };
            match ch {
                '"' | '\'' => {
                    let (value, _) = string_literal(text, pos + size, ch);
                    if bound {
                        out.extend(string_literal_spans(text, value));
                    } else {
                        out.push(value);
                    }
                }
                '{' => {
                    let (body, _) = delimited(text, pos, '{', '}');
                    out.extend(string_literal_spans(text, body));
                }
                _ if !bound => out.push(unquoted_value(text, pos)),
                _ => {}
            }
        }
    }

    out
}

fn class_helper_spans(text: &str) -> Vec<Range<usize>> {
    const HELPERS: [&str; 4] = ["clsx", "classnames", "tw", "cva"];
    let mut out = Vec::new();

    for helper in HELPERS {
        for (idx, _) in text.match_indices(helper) {
            if !is_identifier_boundary(text, idx, helper.len()) {
                continue;
            }
            let pos = skip_whitespace(text, idx + helper.len());
            if pos >= text.len() || !text[pos..].starts_with('(') {
                continue;
            }
            let (args, _) = delimited(text, pos, '(', ')');
            out.extend(string_literal_spans(text, args));
        }
    }

    out
}

fn is_attr_boundary(text: &str, idx: usize, len: usize) -> bool {
    let prev = text[..idx].chars().last();
    let next = text[idx + len..].chars().next();

    let prev_ok = prev.is_none_or(|c| is_boundary_char(c) && c != ':');
    let next_ok = next.is_none_or(|c| c.is_whitespace() || c == '=');

    prev_ok && next_ok
}

fn is_identifier_boundary(text: &str, idx: usize, len: usize) -> bool {
    let prev = text[..idx].chars().last();
    let next = text[idx + len..].chars().next();

    let prev_ok = prev.is_none_or(|c| !is_identifier_char(c) && c != '.');
    let next_ok = next.is_none_or(|c| !is_identifier_char(c));

    prev_ok && next_ok
}

fn is_boundary_char(c: char) -> bool {
    !(c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn is_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

fn skip_whitespace(text: &str, mut idx: usize) -> usize {
    while let Some((ch, size)) = next_char(text, idx) {
        if !ch.is_whitespace() {
            break;
        }
        idx += size;
    }
    idx
}

/// The range between the `open` at `idx` and its matching `close`, plus the
/// position after the close. Strings are skipped.
fn delimited(text: &str, idx: usize, open: char, close: char) -> (Range<usize>, usize) {
    let mut depth: usize = 0;
    let mut pos = idx;
    let mut start = None;

    while let Some((ch, size)) = next_char(text, pos) {
        match ch {
            '"' | '\'' => {
                let (_, new_pos) = string_literal(text, pos + size, ch);
                pos = new_pos;
            }
            '`' => {
                let (_, new_pos) = template_literal(text, pos + size);
                pos = new_pos;
            }
            _ if ch == open => {
                depth += 1;
                if depth == 1 {
                    start = Some(pos + size);
                }
                pos += size;
            }
            _ if ch == close => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    let begin = start.unwrap_or(pos);
                    return (begin..pos, pos + size);
                }
                pos += size;
            }
            _ => pos += size,
        }
    }

    let begin = start.unwrap_or(text.len()).min(text.len());
    (begin..text.len(), text.len())
}

fn unquoted_value(text: &str, mut idx: usize) -> Range<usize> {
    let start = idx;
    while let Some((ch, size)) = next_char(text, idx) {
        if ch.is_whitespace() || ch == '>' {
            break;
        }
        idx += size;
    }
    start..idx
}

/// Contents of every string and template-literal static part in `range`.
fn string_literal_spans(text: &str, range: Range<usize>) -> Vec<Range<usize>> {
    let mut out = Vec::new();
    let mut idx = range.start;
    while idx < range.end {
        let Some((ch, size)) = next_char(text, idx) else {
            break;
        };
        match ch {
            '"' | '\'' => {
                let (value, new_idx) = string_literal(text, idx + size, ch);
                out.push(value);
                idx = new_idx;
            }
            '`' => {
                let (parts, new_idx) = template_literal(text, idx + size);
                out.extend(parts);
                idx = new_idx;
            }
            _ => idx += size,
        }
    }
    out.retain(|span| span.end <= range.end);
    out
}

/// Contents of a string whose opening quote ends just before `idx`, and the
/// position after the closing quote.
fn string_literal(text: &str, mut idx: usize, quote: char) -> (Range<usize>, usize) {
    let start = idx;
    while let Some((ch, size)) = next_char(text, idx) {
        if ch == '\\' {
            idx += size;
            if let Some((_, next_size)) = next_char(text, idx) {
                idx += next_size;
            }
            continue;
        }
        if ch == quote {
            return (start..idx, idx + size);
        }
        idx += size;
    }
    (start..idx, idx)
}

fn template_literal(text: &str, mut idx: usize) -> (Vec<Range<usize>>, usize) {
    let mut parts = Vec::new();
    let mut start = idx;

    while let Some((ch, size)) = next_char(text, idx) {
        if ch == '`' {
            parts.push(start..idx);
            return (parts, idx + size);
        }
        if ch == '\\' {
            idx += size;
            if let Some((_, next_size)) = next_char(text, idx) {
                idx += next_size;
            }
            continue;
        }
        if ch == '$' && text[idx + size..].starts_with('{') {
            parts.push(start..idx);
            idx = skip_braced_expression(text, idx + size + 1);
            start = idx;
            continue;
        }
        idx += size;
    }

    parts.push(start..idx);
    (parts, idx)
}

fn skip_braced_expression(text: &str, mut idx: usize) -> usize {
    let mut depth = 1;
    while depth > 0 {
        let Some((ch, size)) = next_char(text, idx) else {
            break;
        };
        if ch == '{' {
            depth += 1;
        } else if ch == '}' {
            depth -= 1;
        }
        idx += size;
    }
    idx
}

fn next_char(text: &str, idx: usize) -> Option<(char, usize)> {
    text.get(idx..)?.chars().next().map(|ch| (ch, ch.len_utf8()))
}

#[cfg(test)]
mod tests {
    use super::{
        ScanGlobOptions, class_spans, class_tokens, discover_stylesheets, is_valid_candidate,
        scan_globs_with_options,
    };
    use std::fs;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn spans<'a>(text: &'a str, ext: &str) -> Vec<&'a str> {
        class_spans(text, Some(ext))
            .into_iter()
            .map(|span| &text[span])
            .collect()
    }

    #[test]
    fn finds_class_attribute_values() {
        let html = r#"<h1>🤠👋</h1>
<div class="!flex sm:!block bg-gradient-to-t" id="x"></div>
<p className='text-sm'>hello</p>"#;
        assert_eq!(
            spans(html, "html"),
            vec!["!flex sm:!block bg-gradient-to-t", "text-sm"]
        );
    }

    #[test]
    fn finds_strings_in_bound_attributes() {
        let vue = r#"<div :class="['flex-grow', active ? '!block' : '']"></div>"#;
        assert_eq!(spans(vue, "vue"), vec!["flex-grow", "!block"]);
    }

    #[test]
    fn finds_strings_in_class_helpers() {
        let source = r#"
            const cls = clsx("p-2 !flex", { 'bg-red-500': ok }, `ring ${size}`);
            const plain = "flex-grow";
            const jsx = <div className={cn ? "flex-shrink" : "x"} />;
        "#;
        assert_eq!(
            spans(source, "tsx"),
            vec!["p-2 !flex", "bg-red-500", "ring ", "", "flex-shrink", "x"]
                .into_iter()
                .filter(|span| !span.is_empty())
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn ignores_helpers_in_markup() {
        assert!(spans(r#"<p>clsx("flex-grow")</p>"#, "html").is_empty());
    }

    #[test]
    fn splits_tokens_but_keeps_arbitrary_values_whole() {
        let text = "  p-2  bg-[url('a b')] grid-cols-[repeat(2,minmax(0, 1fr))]";
        let tokens: Vec<&str> = class_tokens(text, 0..text.len())
            .into_iter()
            .map(|span| &text[span])
            .collect();
        assert_eq!(
            tokens,
            vec!["p-2", "bg-[url('a b')]", "grid-cols-[repeat(2,minmax(0, 1fr))]"]
        );
    }

    #[test]
    fn validates_candidate_shapes() {
        assert!(is_valid_candidate("!flex"));
        assert!(is_valid_candidate("sm:!block"));
        assert!(is_valid_candidate("flex!"));
        assert!(is_valid_candidate("bg-[color:var(--brand)]"));
        assert!(!is_valid_candidate("fl!ex"));
        assert!(!is_valid_candidate("a,b"));
        assert!(!is_valid_candidate("hover:"));
        assert!(!is_valid_candidate("123"));
    }

    #[test]
    fn scans_glob_patterns() {
        let base = temp_dir("scanner_glob");
        let nested = base.join("nested");
        let _ = fs::create_dir_all(&nested);
        let _ = fs::write(nested.join("example.html"), r#"<div class="p-2"></div>"#);
        let _ = fs::write(nested.join("skip.html"), r#"<div class="p-2"></div>"#);
        let _ = fs::write(nested.join("styles.css"), ".a {}");

        let options = ScanGlobOptions {
            base_path: base.clone(),
            ..ScanGlobOptions::default()
        };
        let files = scan_globs_with_options(
            &["./**/*.{html,css}".to_string()],
            &["**/skip.html".to_string()],
            &options,
        )
        .expect("scan should succeed");
        assert_eq!(files, vec![nested.join("example.html")]);

        let stylesheets = discover_stylesheets(&base, &[]).expect("discovery should succeed");
        assert_eq!(stylesheets, vec![nested.join("styles.css")]);

        let _ = fs::remove_dir_all(&base);
    }

    #[test]
    fn rejects_invalid_globs() {
        let err = scan_globs_with_options(&["[".to_string()], &[], &ScanGlobOptions::default())
            .unwrap_err();
        assert!(err.message.starts_with("invalid glob pattern"));
    }

    fn temp_dir(prefix: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        std::env::temp_dir().join(format!("{}_{}", prefix, nanos))
    }
}
