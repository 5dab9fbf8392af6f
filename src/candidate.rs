//! Utility class token grammar shared by the `@apply` and template passes.
//!
//! A candidate is `variant:variant:base` where any segment may carry the
//! legacy leading `!` and the base may carry the trailing `!`.

use std::collections::BTreeMap;

/// Renamed utilities, looked up by base name with variants, sign and
/// importance marker stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameTable {
    exact: BTreeMap<String, String>,
    prefixes: Vec<(String, String)>,
}

const LEGACY_RENAMES: [(&str, &str); 9] = [
    ("flex-shrink", "shrink"),
    ("flex-shrink-0", "shrink-0"),
    ("flex-grow", "grow"),
    ("flex-grow-0", "grow-0"),
    ("overflow-ellipsis", "text-ellipsis"),
    ("decoration-slice", "box-decoration-slice"),
    ("decoration-clone", "box-decoration-clone"),
    ("outline-none", "outline-hidden"),
    ("ring", "ring-3"),
];

const LEGACY_PREFIX_RENAMES: [(&str, &str); 1] = [("bg-gradient-to-", "bg-linear-to-")];

impl RenameTable {
    pub fn empty() -> Self {
        Self {
            exact: BTreeMap::new(),
            prefixes: Vec::new(),
        }
    }

    /// The v3 to v4 renames that are safe to apply more than once.
    pub fn legacy() -> Self {
        let mut table = Self::empty();
        for (from, to) in LEGACY_RENAMES {
            table.insert(from, to);
        }
        for (from, to) in LEGACY_PREFIX_RENAMES {
            table.insert_prefix(from, to);
        }
        table
    }

    pub fn insert(&mut self, from: &str, to: &str) {
        self.exact.insert(from.to_string(), to.to_string());
    }

    pub fn insert_prefix(&mut self, from: &str, to: &str) {
        self.prefixes.push((from.to_string(), to.to_string()));
    }

    pub fn lookup(&self, base: &str) -> Option<String> {
        if let Some(renamed) = self.exact.get(base) {
            return Some(renamed.clone());
        }
        self.prefixes.iter().find_map(|(from, to)| {
            base.strip_prefix(from.as_str())
                .filter(|rest| !rest.is_empty())
                .map(|rest| format!("{}{}", to, rest))
        })
    }
}

impl Default for RenameTable {
    fn default() -> Self {
        Self::legacy()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate<'a> {
    pub variants: Vec<&'a str>,
    pub negative: bool,
    pub base: &'a str,
    pub important: bool,
}

impl<'a> Candidate<'a> {
    pub fn parse(token: &'a str) -> Option<Self> {
        let mut segments = split_variants(token);
        let mut important = false;

        let raw_base = segments.pop()?;
        let mut variants = Vec::with_capacity(segments.len());
        for (idx, segment) in segments.into_iter().enumerate() {
            if idx == 0 && segment.starts_with('!') {
                important = true;
                variants.push(segment.trim_start_matches('!'));
            } else {
                variants.push(segment);
            }
        }
        if variants.iter().any(|variant| variant.is_empty()) {
            return None;
        }

        let mut base = raw_base;
        if let Some(stripped) = base.strip_prefix('!') {
            important = true;
            base = stripped.trim_start_matches('!');
        }
        if base.ends_with('!') {
            important = true;
            base = base.trim_end_matches('!');
        }
        let (negative, base) = match base.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, base),
        };
        if base.is_empty() || base.starts_with('!') {
            return None;
        }

        Some(Self {
            variants,
            negative,
            base,
            important,
        })
    }

    pub fn render(&self, base: &str) -> String {
        let mut out = String::new();
        for variant in &self.variants {
            out.push_str(variant);
            out.push(':');
        }
        if self.negative {
            out.push('-');
        }
        out.push_str(base);
        if self.important {
            out.push('!');
        }
        out
    }
}

/// Rewrites a single class token to the current syntax. Returns `None` when
/// the token is already current or is not a candidate.
pub fn migrate_candidate(token: &str, renames: &RenameTable) -> Option<String> {
    let candidate = Candidate::parse(token)?;
    let migrated = match renames.lookup(candidate.base) {
        Some(renamed) => candidate.render(&renamed),
        None => candidate.render(candidate.base),
    };
    (migrated != token).then_some(migrated)
}

/// Splits on `:` outside of brackets and parentheses.
pub fn split_variants(token: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut bracket_depth = 0usize;
    let mut paren_depth = 0usize;
    let mut start = 0;

    for (idx, ch) in token.char_indices() {
        match ch {
            '[' => bracket_depth += 1,
            ']' => bracket_depth = bracket_depth.saturating_sub(1),
            '(' => paren_depth += 1,
            ')' => paren_depth = paren_depth.saturating_sub(1),
            ':' if bracket_depth == 0 && paren_depth == 0 => {
                segments.push(&token[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    segments.push(&token[start..]);
    segments
}
