use crate::classify::{Classification, classify_node};
use crate::stylesheet::Node;
use std::collections::HashMap;

/// The body of one `@utility <name>` block, gathered from every rule that
/// targets the class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UtilityBlock {
    pub name: String,
    pub nodes: Vec<Node>,
}

impl UtilityBlock {
    pub fn to_node(&self) -> Node {
        let mut node = Node::block_at_rule("utility", self.name.clone(), self.nodes.clone());
        node.reindent(0);
        node
    }
}

/// Utility blocks keyed by class name, kept in first-appearance order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UtilityBlocks {
    blocks: Vec<UtilityBlock>,
    index: HashMap<String, usize>,
}

impl UtilityBlocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &UtilityBlock> {
        self.blocks.iter()
    }

    /// Takes `node` if it is a utility candidate or an existing `@utility`
    /// block; hands it back otherwise.
    pub fn absorb(&mut self, node: Node) -> Result<(), Node> {
        let node = match node {
            Node::AtRule(at_rule) if at_rule.is_named("utility") && at_rule.nodes.is_some() => {
                self.push(at_rule.params.trim(), at_rule.nodes.unwrap_or_default());
                return Ok(());
            }
            other => other,
        };

        let Classification::UtilityCandidate { name, pseudo } = classify_node(&node) else {
            return Err(node);
        };
        let Node::Rule(rule) = node else {
            return Err(node);
        };
        match pseudo {
            None => self.push(&name, rule.nodes),
            Some(pseudo) => {
                let nested = Node::rule(format!("&{}", pseudo), rule.nodes);
                self.push(&name, vec![nested]);
            }
        }
        Ok(())
    }

    pub fn extend(&mut self, other: UtilityBlocks) {
        for block in other.blocks {
            self.push(&block.name, block.nodes);
        }
    }

    pub fn to_nodes(&self) -> Vec<Node> {
        self.blocks.iter().map(UtilityBlock::to_node).collect()
    }

    fn push(&mut self, name: &str, nodes: Vec<Node>) {
        match self.index.get(name) {
            Some(&idx) => self.blocks[idx].nodes.extend(nodes),
            None => {
                self.index.insert(name.to_string(), self.blocks.len());
                self.blocks.push(UtilityBlock {
                    name: name.to_string(),
                    nodes,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::UtilityBlocks;
    use crate::stylesheet::{Stylesheet, to_css};

    fn absorb_all(css: &str) -> (UtilityBlocks, Vec<String>) {
        let sheet = Stylesheet::parse("test.css", css).expect("css should parse");
        let mut blocks = UtilityBlocks::new();
        let mut rejected = Vec::new();
        for node in sheet.nodes {
            if let Err(node) = blocks.absorb(node) {
                rejected.push(to_css(&[node]).trim().to_string());
            }
        }
        (blocks, rejected)
    }

    #[test]
    fn merges_rules_for_the_same_class_in_appearance_order() {
        let (blocks, rejected) = absorb_all(
            ".no-scrollbar::-webkit-scrollbar { display: none; }\n.no-scrollbar { -ms-overflow-style: none; scrollbar-width: none; }",
        );
        assert!(rejected.is_empty());
        assert_eq!(blocks.len(), 1);
        assert_eq!(
            to_css(&blocks.to_nodes()),
            "@utility no-scrollbar {\n  &::-webkit-scrollbar {\n    display: none;\n  }\n  -ms-overflow-style: none;\n  scrollbar-width: none;\n}"
        );
    }

    #[test]
    fn hands_back_other_content() {
        let (blocks, rejected) = absorb_all("#foo { --keep: me; }\n.a:hover { color: red; }\n.b { color: blue }");
        assert_eq!(blocks.len(), 1);
        assert_eq!(rejected, vec!["#foo { --keep: me; }", ".a:hover { color: red; }"]);
    }

    #[test]
    fn absorbs_existing_utility_blocks() {
        let (mut blocks, _) = absorb_all("@utility btn { color: red; }");
        let (more, _) = absorb_all(".btn { padding: 0; }\n.card { margin: 0; }");
        blocks.extend(more);
        let names: Vec<_> = blocks.iter().map(|block| block.name.as_str()).collect();
        assert_eq!(names, vec!["btn", "card"]);
        assert_eq!(
            to_css(&blocks.to_nodes()[..1]),
            "@utility btn {\n  color: red;\n  padding: 0;\n}"
        );
    }
}
