use crate::stylesheet::Node;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// `.name` or `.name::pseudo-element`.
    UtilityCandidate {
        name: String,
        pseudo: Option<String>,
    },
    OtherContent,
}

pub fn classify_node(node: &Node) -> Classification {
    match node {
        Node::Rule(rule) => classify(&rule.selector),
        _ => Classification::OtherContent,
    }
}

pub fn classify(selector: &str) -> Classification {
    let selector = selector.trim();
    let Some(rest) = selector.strip_prefix('.') else {
        return Classification::OtherContent;
    };
    let Some((name, consumed)) = read_class_name(rest) else {
        return Classification::OtherContent;
    };
    let suffix = &rest[consumed..];

    if suffix.is_empty() {
        return Classification::UtilityCandidate { name, pseudo: None };
    }

    if is_pseudo_element(suffix) {
        return Classification::UtilityCandidate {
            name,
            pseudo: Some(suffix.to_string()),
        };
    }

    Classification::OtherContent
}

/// Reads an escaped CSS identifier and returns it unescaped together with
/// the number of bytes consumed.
fn read_class_name(input: &str) -> Option<(String, usize)> {
    let mut name = String::new();
    let mut chars = input.char_indices().peekable();
    let mut consumed = 0;

    while let Some((idx, ch)) = chars.next() {
        if ch == '\\' {
            let (next_idx, next) = chars.next()?;
            name.push(next);
            consumed = next_idx + next.len_utf8();
            continue;
        }
        if !is_name_char(ch) {
            break;
        }
        name.push(ch);
        consumed = idx + ch.len_utf8();
    }

    if name.is_empty() || name.starts_with(|ch: char| ch.is_ascii_digit()) {
        return None;
    }
    Some((name, consumed))
}

fn is_pseudo_element(suffix: &str) -> bool {
    let Some(name) = suffix.strip_prefix("::") else {
        return false;
    };
    let (ident, args) = match name.find('(') {
        Some(open) => (&name[..open], Some(&name[open..])),
        None => (name, None),
    };
    if ident.is_empty() || !ident.chars().all(is_name_char) {
        return false;
    }
    match args {
        None => true,
        Some(args) => args.ends_with(')') && !args[1..args.len() - 1].contains(['(', ')']),
    }
}

fn is_name_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' || !ch.is_ascii()
}

#[cfg(test)]
mod tests {
    use super::{Classification, classify};

    fn candidate(name: &str, pseudo: Option<&str>) -> Classification {
        Classification::UtilityCandidate {
            name: name.to_string(),
            pseudo: pseudo.map(str::to_string),
        }
    }

    #[test]
    fn accepts_bare_class_selectors() {
        assert_eq!(classify(".no-scrollbar"), candidate("no-scrollbar", None));
        assert_eq!(classify("  .btn  "), candidate("btn", None));
    }

    #[test]
    fn accepts_pseudo_element_suffixes() {
        assert_eq!(
            classify(".no-scrollbar::-webkit-scrollbar"),
            candidate("no-scrollbar", Some("::-webkit-scrollbar"))
        );
        assert_eq!(
            classify(".card::part(label)"),
            candidate("card", Some("::part(label)"))
        );
    }

    #[test]
    fn unescapes_class_names() {
        assert_eq!(classify(".w-1\\/2"), candidate("w-1/2", None));
    }

    #[test]
    fn leaves_compound_and_complex_selectors_alone() {
        for selector in [
            ".btn:hover",
            ".a.b",
            ".a .b",
            ".a > .b",
            ".a, .b",
            "#foo",
            "html",
            "[data-x]",
            ".a[data-x]",
            ".a::before:hover",
            ".",
            ".1up",
        ] {
            assert_eq!(classify(selector), Classification::OtherContent, "{selector}");
        }
    }
}
