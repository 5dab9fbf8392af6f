//! `@tailwind base; @tailwind components; @tailwind utilities;` becomes a
//! single `@import 'tailwindcss';`, with custom CSS that used to sit between
//! the directives wrapped in the matching `@layer`.

use crate::error::Warning;
use crate::stylesheet::{Node, Stylesheet};
use tracing::debug;

pub const FRAMEWORK_IMPORT: &str = "'tailwindcss'";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Directive {
    Base,
    Components,
    Utilities,
}

impl Directive {
    fn parse(params: &str) -> Option<Self> {
        match params.trim() {
            "base" => Some(Self::Base),
            "components" => Some(Self::Components),
            "utilities" => Some(Self::Utilities),
            _ => None,
        }
    }

    fn layer(self) -> Option<&'static str> {
        match self {
            Self::Base => Some("base"),
            Self::Components => Some("components"),
            Self::Utilities => None,
        }
    }
}

enum Section {
    Layer(&'static str, Vec<Node>),
    Kept(Node),
}

pub fn migrate(sheet: &mut Stylesheet, warnings: &mut Vec<Warning>) -> bool {
    let mut group: Vec<(usize, Directive)> = Vec::new();
    let mut unsupported = Vec::new();

    for (idx, node) in sheet.nodes.iter().enumerate() {
        let Some(at_rule) = node.as_at_rule().filter(|at_rule| at_rule.is_named("tailwind")) else {
            continue;
        };
        match Directive::parse(&at_rule.params) {
            Some(directive) if group.iter().all(|(_, seen)| *seen < directive) => {
                group.push((idx, directive));
            }
            Some(_) => unsupported.push(format!(
                "`@tailwind {}` repeated or out of order; left untouched",
                at_rule.params
            )),
            None => unsupported.push(format!(
                "`@tailwind {}` has no v4 equivalent; left untouched",
                at_rule.params
            )),
        }
    }

    for message in unsupported {
        warnings.push(Warning {
            path: sheet.path.clone(),
            message,
        });
    }

    let (Some(&(first, _)), Some(&(last, _))) = (group.first(), group.last()) else {
        return false;
    };

    let import_before = sheet.nodes[first].raws().before.clone();
    let mut tail = sheet.nodes.split_off(last + 1);
    let region = sheet.nodes.split_off(first);

    // Directives without a v4 equivalent stay between the layer blocks at
    // their original position.
    let mut sections: Vec<Section> = Vec::new();
    let mut current: Option<Directive> = None;
    for (offset, node) in region.into_iter().enumerate() {
        if let Some((_, directive)) = group.iter().find(|(idx, _)| *idx == first + offset) {
            current = Some(*directive);
            continue;
        }
        let layer = if node.is_at_rule("tailwind") {
            None
        } else {
            current.and_then(Directive::layer)
        };
        let Some(layer) = layer else {
            sections.push(Section::Kept(node));
            continue;
        };
        match sections.last_mut() {
            Some(Section::Layer(name, nodes)) if *name == layer => nodes.push(node),
            _ => sections.push(Section::Layer(layer, vec![node])),
        }
    }

    let mut import = Node::at_rule("import", FRAMEWORK_IMPORT);
    import.raws_mut().before = import_before;
    sheet.nodes.push(import);

    for section in sections {
        match section {
            Section::Layer(layer, nodes) => {
                let mut block = Node::block_at_rule("layer", layer, nodes);
                block.reindent(0);
                block.raws_mut().before = "\n\n".to_string();
                sheet.nodes.push(block);
            }
            Section::Kept(mut node) => {
                node.raws_mut().before = "\n".to_string();
                sheet.nodes.push(node);
            }
        }
    }
    sheet.nodes.append(&mut tail);

    debug!(path = %sheet.path.display(), "migrated @tailwind directives");
    true
}

#[cfg(test)]
mod tests {
    use super::migrate;
    use crate::stylesheet::Stylesheet;

    fn run(css: &str) -> (String, usize) {
        let mut sheet = Stylesheet::parse("index.css", css).expect("css should parse");
        let mut warnings = Vec::new();
        migrate(&mut sheet, &mut warnings);
        (sheet.to_css(), warnings.len())
    }

    #[test]
    fn replaces_directive_trio_with_single_import() {
        let (css, warnings) = run("@tailwind base;\n@tailwind components;\n@tailwind utilities;\n");
        assert_eq!(css, "@import 'tailwindcss';\n");
        assert_eq!(warnings, 0);
    }

    #[test]
    fn wraps_interleaved_rules_in_layers() {
        let (css, _) = run(
            "@tailwind base;\n\nhtml {\n  color: #333;\n}\n\n@tailwind components;\n\n.btn {\n  color: red;\n}\n\n@tailwind utilities;\n",
        );
        assert_eq!(
            css,
            "@import 'tailwindcss';\n\n@layer base {\n  html {\n    color: #333;\n  }\n}\n\n@layer components {\n  .btn {\n    color: red;\n  }\n}\n"
        );
    }

    #[test]
    fn compact_input_produces_same_structure() {
        let (css, _) =
            run("@tailwind base; html{color:#333} @tailwind components; .btn{color:red} @tailwind utilities;");
        assert_eq!(
            css,
            "@import 'tailwindcss';\n\n@layer base {\n  html {\n    color:#333;\n  }\n}\n\n@layer components {\n  .btn {\n    color:red;\n  }\n}"
        );
    }

    #[test]
    fn keeps_surrounding_content_in_place() {
        let (css, _) = run(
            "@import './fonts.css';\n@tailwind base;\n@tailwind utilities;\n\n.after {\n  color: red;\n}\n",
        );
        assert_eq!(
            css,
            "@import './fonts.css';\n@import 'tailwindcss';\n\n.after {\n  color: red;\n}\n"
        );
    }

    #[test]
    fn single_directive_degrades_gracefully() {
        let (css, _) = run("@tailwind utilities;\n");
        assert_eq!(css, "@import 'tailwindcss';\n");
    }

    #[test]
    fn warns_about_unsupported_directives() {
        let (css, warnings) = run("@tailwind base;\n@tailwind utilities;\n@tailwind variants;\n");
        assert_eq!(css, "@import 'tailwindcss';\n@tailwind variants;\n");
        assert_eq!(warnings, 1);
    }

    #[test]
    fn unsupported_directive_keeps_its_position_between_layers() {
        let (css, warnings) = run(
            "@tailwind base;\n\nhtml {\n  color: #333;\n}\n\n@tailwind screens;\n\n@tailwind components;\n\n.btn {\n  color: red;\n}\n\n@tailwind utilities;\n",
        );
        assert_eq!(
            css,
            "@import 'tailwindcss';\n\n@layer base {\n  html {\n    color: #333;\n  }\n}\n@tailwind screens;\n\n@layer components {\n  .btn {\n    color: red;\n  }\n}\n"
        );
        assert_eq!(warnings, 1);
    }

    #[test]
    fn leaves_sheets_without_directives_untouched() {
        let css = "@import 'tailwindcss';\n.a { color: red; }\n";
        assert_eq!(run(css).0, css);
    }
}
