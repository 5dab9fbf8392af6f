//! Editable CSS tree.
//!
//! The parser keeps every byte of whitespace it skips in the `raws` of the
//! surrounding nodes, so a tree that no pass touched serializes back to the
//! exact input. Passes that build or move nodes call [`Node::reindent`] to
//! give them canonical two-space formatting.

use crate::error::{Result, UpgradeError};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Rule(Rule),
    AtRule(AtRule),
    Declaration(Declaration),
    Comment(Comment),
}

/// Whitespace and punctuation that sits between the semantic parts of a node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Raws {
    /// Text before the node, inside its parent.
    pub before: String,
    /// Rule: between selector and `{`. At-rule: between params and `{`/`;`.
    /// Declaration: the `:` together with its surrounding whitespace.
    pub between: String,
    /// Blocks: text before the closing `}`. Declarations: text before `;`.
    pub after: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub selector: String,
    pub nodes: Vec<Node>,
    pub raws: Raws,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtRule {
    pub name: String,
    pub params: String,
    /// `None` for statement at-rules such as `@import`.
    pub nodes: Option<Vec<Node>>,
    pub semicolon: bool,
    pub after_name: String,
    pub raws: Raws,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub property: String,
    pub value: String,
    pub semicolon: bool,
    pub raws: Raws,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    pub text: String,
    pub raws: Raws,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stylesheet {
    pub path: PathBuf,
    pub nodes: Vec<Node>,
    /// Trailing text after the last node.
    pub after: String,
}

impl Node {
    pub fn rule(selector: impl Into<String>, nodes: Vec<Node>) -> Self {
        Node::Rule(Rule {
            selector: selector.into(),
            nodes,
            raws: Raws {
                between: " ".to_string(),
                ..Raws::default()
            },
        })
    }

    pub fn at_rule(name: impl Into<String>, params: impl Into<String>) -> Self {
        let params = params.into();
        Node::AtRule(AtRule {
            after_name: if params.is_empty() {
                String::new()
            } else {
                " ".to_string()
            },
            name: name.into(),
            params,
            nodes: None,
            semicolon: true,
            raws: Raws::default(),
        })
    }

    pub fn block_at_rule(
        name: impl Into<String>,
        params: impl Into<String>,
        nodes: Vec<Node>,
    ) -> Self {
        let mut node = Self::at_rule(name, params);
        if let Node::AtRule(at_rule) = &mut node {
            at_rule.nodes = Some(nodes);
            at_rule.semicolon = false;
            at_rule.raws.between = " ".to_string();
        }
        node
    }

    pub fn declaration(property: impl Into<String>, value: impl Into<String>) -> Self {
        Node::Declaration(Declaration {
            property: property.into(),
            value: value.into(),
            semicolon: true,
            raws: Raws {
                between: ": ".to_string(),
                ..Raws::default()
            },
        })
    }

    pub fn raws(&self) -> &Raws {
        match self {
            Node::Rule(rule) => &rule.raws,
            Node::AtRule(at_rule) => &at_rule.raws,
            Node::Declaration(decl) => &decl.raws,
            Node::Comment(comment) => &comment.raws,
        }
    }

    pub fn raws_mut(&mut self) -> &mut Raws {
        match self {
            Node::Rule(rule) => &mut rule.raws,
            Node::AtRule(at_rule) => &mut at_rule.raws,
            Node::Declaration(decl) => &mut decl.raws,
            Node::Comment(comment) => &mut comment.raws,
        }
    }

    pub fn is_comment(&self) -> bool {
        matches!(self, Node::Comment(_))
    }

    pub fn as_at_rule(&self) -> Option<&AtRule> {
        match self {
            Node::AtRule(at_rule) => Some(at_rule),
            _ => None,
        }
    }

    /// Whether this is an at-rule named `name` (ASCII case-insensitive).
    pub fn is_at_rule(&self, name: &str) -> bool {
        self.as_at_rule()
            .is_some_and(|at_rule| at_rule.name.eq_ignore_ascii_case(name))
    }

    /// Rewrites the formatting raws of this node and its descendants to
    /// two-space indentation starting at `depth`.
    pub fn reindent(&mut self, depth: usize) {
        let indent = "  ".repeat(depth);
        let before = if depth == 0 {
            String::new()
        } else {
            format!("\n{}", indent)
        };
        match self {
            Node::Rule(rule) => {
                rule.raws.before = before;
                rule.raws.between = " ".to_string();
                rule.raws.after = format!("\n{}", indent);
                for child in &mut rule.nodes {
                    child.reindent(depth + 1);
                }
            }
            Node::AtRule(at_rule) => {
                at_rule.raws.before = before;
                at_rule.after_name = if at_rule.params.is_empty() {
                    String::new()
                } else {
                    " ".to_string()
                };
                match &mut at_rule.nodes {
                    Some(nodes) => {
                        at_rule.raws.between = " ".to_string();
                        at_rule.raws.after = format!("\n{}", indent);
                        for child in nodes {
                            child.reindent(depth + 1);
                        }
                    }
                    None => {
                        at_rule.raws.between = String::new();
                        at_rule.semicolon = true;
                    }
                }
            }
            Node::Declaration(decl) => {
                decl.raws.before = before;
                decl.raws.after = String::new();
                decl.semicolon = true;
            }
            Node::Comment(comment) => {
                comment.raws.before = before;
            }
        }
    }
}

impl AtRule {
    pub fn is_named(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

impl Stylesheet {
    pub fn parse(path: impl Into<PathBuf>, text: &str) -> Result<Self> {
        let path = path.into();
        let mut parser = Parser {
            text,
            bytes: text.as_bytes(),
            pos: 0,
            path: &path,
        };
        let (nodes, after) = parser.parse_block(0)?;
        Ok(Self { path, nodes, after })
    }

    pub fn to_css(&self) -> String {
        let mut out = String::new();
        write_nodes(&self.nodes, &mut out);
        out.push_str(&self.after);
        out
    }

    /// False when the stylesheet holds nothing but comments.
    pub fn has_content(&self) -> bool {
        self.nodes.iter().any(|node| !node.is_comment())
    }

    /// Lays out top-level nodes with a blank line between blocks and a
    /// single newline between consecutive statements.
    pub fn normalize_top_level_spacing(nodes: &mut [Node]) {
        let mut previous_is_statement = false;
        for (idx, node) in nodes.iter_mut().enumerate() {
            let is_statement = match node {
                Node::AtRule(at_rule) => at_rule.nodes.is_none(),
                Node::Declaration(_) => true,
                _ => false,
            };
            let before = if idx == 0 {
                ""
            } else if is_statement && previous_is_statement {
                "\n"
            } else {
                "\n\n"
            };
            node.raws_mut().before = before.to_string();
            previous_is_statement = is_statement;
        }
    }
}

fn write_nodes(nodes: &[Node], out: &mut String) {
    for node in nodes {
        write_node(node, out);
    }
}

fn write_node(node: &Node, out: &mut String) {
    match node {
        Node::Rule(rule) => {
            out.push_str(&rule.raws.before);
            out.push_str(&rule.selector);
            out.push_str(&rule.raws.between);
            out.push('{');
            write_nodes(&rule.nodes, out);
            out.push_str(&rule.raws.after);
            out.push('}');
        }
        Node::AtRule(at_rule) => {
            out.push_str(&at_rule.raws.before);
            out.push('@');
            out.push_str(&at_rule.name);
            out.push_str(&at_rule.after_name);
            out.push_str(&at_rule.params);
            out.push_str(&at_rule.raws.between);
            if let Some(nodes) = &at_rule.nodes {
                out.push('{');
                write_nodes(nodes, out);
                out.push_str(&at_rule.raws.after);
                out.push('}');
            } else if at_rule.semicolon {
                out.push(';');
            }
        }
        Node::Declaration(decl) => {
            out.push_str(&decl.raws.before);
            out.push_str(&decl.property);
            out.push_str(&decl.raws.between);
            out.push_str(&decl.value);
            out.push_str(&decl.raws.after);
            if decl.semicolon {
                out.push(';');
            }
        }
        Node::Comment(comment) => {
            out.push_str(&comment.raws.before);
            out.push_str("/*");
            out.push_str(&comment.text);
            out.push_str("*/");
        }
    }
}

pub fn to_css(nodes: &[Node]) -> String {
    let mut out = String::new();
    write_nodes(nodes, &mut out);
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Terminator {
    OpenBrace,
    Semicolon,
    CloseBrace,
    Eof,
}

struct Parser<'a> {
    text: &'a str,
    bytes: &'a [u8],
    pos: usize,
    path: &'a Path,
}

impl Parser<'_> {
    fn parse_block(&mut self, depth: usize) -> Result<(Vec<Node>, String)> {
        let mut nodes = Vec::new();
        let block_start = self.pos;

        loop {
            let before_start = self.pos;
            self.skip_whitespace_and_semicolons();
            let before = self.text[before_start..self.pos].to_string();

            let Some(&byte) = self.bytes.get(self.pos) else {
                if depth > 0 {
                    return Err(self.error_at(block_start.saturating_sub(1), "unterminated block"));
                }
                return Ok((nodes, before));
            };

            match byte {
                b'}' => {
                    if depth == 0 {
                        return Err(self.error_at(self.pos, "unexpected '}'"));
                    }
                    self.pos += 1;
                    return Ok((nodes, before));
                }
                b'/' if self.bytes.get(self.pos + 1) == Some(&b'*') => {
                    let comment = self.parse_comment(before)?;
                    nodes.push(comment);
                }
                b'@' => {
                    let at_rule = self.parse_at_rule(before, depth)?;
                    nodes.push(at_rule);
                }
                _ => {
                    let node = self.parse_rule_or_declaration(before, depth)?;
                    nodes.push(node);
                }
            }
        }
    }

    fn skip_whitespace_and_semicolons(&mut self) {
        while let Some(&byte) = self.bytes.get(self.pos) {
            if byte.is_ascii_whitespace() || byte == b';' {
                self.pos += 1;
            } else {
                break;
            }
        }
    }

    fn parse_comment(&mut self, before: String) -> Result<Node> {
        let start = self.pos;
        let Some(rel_end) = self.text[start + 2..].find("*/") else {
            return Err(self.error_at(start, "unterminated comment"));
        };
        let end = start + 2 + rel_end;
        self.pos = end + 2;
        Ok(Node::Comment(Comment {
            text: self.text[start + 2..end].to_string(),
            raws: Raws {
                before,
                ..Raws::default()
            },
        }))
    }

    fn parse_at_rule(&mut self, before: String, depth: usize) -> Result<Node> {
        let name_start = self.pos + 1;
        let mut name_end = name_start;
        while let Some(&byte) = self.bytes.get(name_end) {
            if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
                name_end += 1;
            } else {
                break;
            }
        }
        if name_end == name_start {
            return Err(self.error_at(self.pos, "expected at-rule name after '@'"));
        }
        let name = self.text[name_start..name_end].to_string();

        let (prelude_end, terminator) = self.scan_prelude(name_end)?;
        let prelude = &self.text[name_end..prelude_end];
        let params_start = prelude.len() - prelude.trim_start().len();
        let after_name = prelude[..params_start].to_string();
        let params = prelude.trim();
        let between = prelude[params_start + params.len()..].to_string();
        let params = params.to_string();

        let mut at_rule = AtRule {
            name,
            params,
            nodes: None,
            semicolon: false,
            after_name,
            raws: Raws {
                before,
                between,
                after: String::new(),
            },
        };

        match terminator {
            Terminator::OpenBrace => {
                self.pos = prelude_end + 1;
                let (nodes, after) = self.parse_block(depth + 1)?;
                at_rule.nodes = Some(nodes);
                at_rule.raws.after = after;
            }
            Terminator::Semicolon => {
                at_rule.semicolon = true;
                self.pos = prelude_end + 1;
            }
            Terminator::CloseBrace | Terminator::Eof => {
                self.pos = prelude_end;
            }
        }

        Ok(Node::AtRule(at_rule))
    }

    fn parse_rule_or_declaration(&mut self, before: String, depth: usize) -> Result<Node> {
        let start = self.pos;
        let (end, terminator) = self.scan_prelude(start)?;
        let raw = &self.text[start..end];

        if terminator == Terminator::OpenBrace {
            let selector = raw.trim_end();
            let between = raw[selector.len()..].to_string();
            let selector = selector.to_string();
            self.pos = end + 1;
            let (nodes, after) = self.parse_block(depth + 1)?;
            return Ok(Node::Rule(Rule {
                selector,
                nodes,
                raws: Raws {
                    before,
                    between,
                    after,
                },
            }));
        }

        let Some(colon) = find_top_level(raw, b':') else {
            return Err(self.error_at(start, "expected ':' in declaration or '{' after selector"));
        };
        let property = raw[..colon].trim_end();
        let rest = &raw[colon + 1..];
        let value_start = rest.len() - rest.trim_start().len();
        let value = rest.trim();
        let between = raw[property.len()..colon + 1 + value_start].to_string();
        let after = rest[value_start + value.len()..].to_string();

        let semicolon = terminator == Terminator::Semicolon;
        self.pos = if semicolon { end + 1 } else { end };

        Ok(Node::Declaration(Declaration {
            property: property.to_string(),
            value: value.to_string(),
            semicolon,
            raws: Raws {
                before,
                between,
                after,
            },
        }))
    }

    /// Finds the end of a selector or prelude, skipping strings, comments
    /// and parenthesized groups.
    fn scan_prelude(&self, start: usize) -> Result<(usize, Terminator)> {
        let mut idx = start;
        let mut paren_depth = 0usize;

        while let Some(&byte) = self.bytes.get(idx) {
            match byte {
                b'"' | b'\'' => {
                    idx = self.skip_string(idx)?;
                    continue;
                }
                b'\\' => {
                    idx += 2;
                    continue;
                }
                b'/' if self.bytes.get(idx + 1) == Some(&b'*') => {
                    let Some(rel_end) = self.text[idx + 2..].find("*/") else {
                        return Err(self.error_at(idx, "unterminated comment"));
                    };
                    idx += 2 + rel_end + 2;
                    continue;
                }
                b'(' => paren_depth += 1,
                b')' => paren_depth = paren_depth.saturating_sub(1),
                b'{' if paren_depth == 0 => return Ok((idx, Terminator::OpenBrace)),
                b';' if paren_depth == 0 => return Ok((idx, Terminator::Semicolon)),
                b'}' if paren_depth == 0 => return Ok((idx, Terminator::CloseBrace)),
                _ => {}
            }
            idx += 1;
        }

        if paren_depth > 0 {
            return Err(self.error_at(start, "unterminated parenthesis"));
        }
        Ok((self.bytes.len(), Terminator::Eof))
    }

    fn skip_string(&self, open: usize) -> Result<usize> {
        let quote = self.bytes[open];
        let mut idx = open + 1;
        while let Some(&byte) = self.bytes.get(idx) {
            if byte == b'\\' {
                idx += 2;
                continue;
            }
            if byte == quote {
                return Ok(idx + 1);
            }
            idx += 1;
        }
        Err(self.error_at(open, "unterminated string"))
    }

    fn error_at(&self, offset: usize, message: &str) -> UpgradeError {
        let (line, column) = line_column(self.text, offset);
        UpgradeError::Parse {
            path: self.path.to_path_buf(),
            line,
            column,
            message: message.to_string(),
        }
    }
}

fn line_column(text: &str, offset: usize) -> (usize, usize) {
    let offset = offset.min(text.len());
    let mut line = 1;
    let mut column = 1;
    for (idx, ch) in text.char_indices() {
        if idx >= offset {
            break;
        }
        if ch == '\n' {
            line += 1;
            column = 1;
        } else {
            column += 1;
        }
    }
    (line, column)
}

/// Byte offset of the first `target` outside strings and parentheses.
pub(crate) fn find_top_level(text: &str, target: u8) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut idx = 0;
    let mut paren_depth = 0usize;
    let mut quote: Option<u8> = None;

    while idx < bytes.len() {
        let byte = bytes[idx];
        if let Some(active) = quote {
            if byte == b'\\' {
                idx += 2;
                continue;
            }
            if byte == active {
                quote = None;
            }
            idx += 1;
            continue;
        }
        match byte {
            b'"' | b'\'' => quote = Some(byte),
            b'\\' => {
                idx += 2;
                continue;
            }
            b'(' => paren_depth += 1,
            b')' => paren_depth = paren_depth.saturating_sub(1),
            _ if byte == target && paren_depth == 0 => return Some(idx),
            _ => {}
        }
        idx += 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::{Node, Stylesheet};
    use crate::error::UpgradeError;

    fn parse(css: &str) -> Stylesheet {
        Stylesheet::parse("test.css", css).expect("css should parse")
    }

    #[test]
    fn round_trips_untouched_source() {
        let css = "@charset \"utf-8\";\n\n/* header */\n@import './a.css' layer(utilities);\n\n.a, .b > .c {\n  color: red;\n  background: url(\"data:image/svg+xml;utf8,<svg/>\") ;\n}\n\n@media (min-width: 640px) {\n    .a { color : blue }\n}\n";
        assert_eq!(parse(css).to_css(), css);
    }

    #[test]
    fn round_trips_compact_source() {
        let css = "html{color:#333}.btn{color:red}@tailwind utilities;";
        assert_eq!(parse(css).to_css(), css);
    }

    #[test]
    fn round_trips_stray_semicolons_and_missing_final_semicolon() {
        let css = ";.a { color: red; ; };\n@import 'x.css'";
        assert_eq!(parse(css).to_css(), css);
    }

    #[test]
    fn builds_tree_shapes() {
        let sheet = parse("@import 'a.css' layer(base);\n.a::before { content: ';' }\n");
        assert_eq!(sheet.nodes.len(), 2);
        let Node::AtRule(import) = &sheet.nodes[0] else {
            panic!("expected at-rule");
        };
        assert_eq!(import.name, "import");
        assert_eq!(import.params, "'a.css' layer(base)");
        assert!(import.nodes.is_none());
        let Node::Rule(rule) = &sheet.nodes[1] else {
            panic!("expected rule");
        };
        assert_eq!(rule.selector, ".a::before");
        let Node::Declaration(decl) = &rule.nodes[0] else {
            panic!("expected declaration");
        };
        assert_eq!(decl.property, "content");
        assert_eq!(decl.value, "';'");
        assert!(!decl.semicolon);
    }

    #[test]
    fn parses_pseudo_class_selectors_as_rules() {
        let sheet = parse("a:hover{color:red}");
        assert!(matches!(&sheet.nodes[0], Node::Rule(rule) if rule.selector == "a:hover"));
    }

    #[test]
    fn rejects_unterminated_block() {
        let err = Stylesheet::parse("broken.css", ".a {\n  color: red;\n").unwrap_err();
        assert!(matches!(err, UpgradeError::Parse { line: 1, .. }));
    }

    #[test]
    fn rejects_unterminated_string() {
        let err = Stylesheet::parse("broken.css", ".a { content: \"oops }").unwrap_err();
        match err {
            UpgradeError::Parse { message, .. } => assert_eq!(message, "unterminated string"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn rejects_unexpected_close_brace() {
        assert!(Stylesheet::parse("broken.css", ".a {} }").is_err());
    }

    #[test]
    fn reindent_formats_new_blocks() {
        let mut node = Node::block_at_rule(
            "utility",
            "btn",
            vec![
                Node::declaration("color", "red"),
                Node::rule("&::before", vec![Node::declaration("content", "''")]),
            ],
        );
        node.reindent(0);
        assert_eq!(
            super::to_css(&[node]),
            "@utility btn {\n  color: red;\n  &::before {\n    content: '';\n  }\n}"
        );
    }
}
