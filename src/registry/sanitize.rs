//! Content sanitization at ingestion
//!
//! The model sometimes emits styling as `<style>#id { ... }</style>` markup
//! inside text instead of calling a styling tool. Every piece of text or
//! HTML a handler accepts passes through [`extract_style_blocks`] exactly
//! once: the blocks are cut out of the content and their per-id rules are
//! returned for the registry to merge into style overrides.

use super::StyleMap;
use once_cell::sync::Lazy;
use regex::Regex;

static STYLE_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<style[^>]*>(.*?)</style\s*>").expect("valid regex"));

static ID_RULE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"#([a-zA-Z0-9\-_]+)\s*\{([^}]*)\}").expect("valid regex"));

static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));

/// Content with style blocks removed, plus the rules they carried
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Sanitized {
    pub content: String,
    /// `(element id, declarations)` in source order
    pub rules: Vec<(String, StyleMap)>,
}

impl Sanitized {
    pub fn has_rules(&self) -> bool {
        !self.rules.is_empty()
    }
}

/// Strip `<style>` blocks from content and collect their `#id` rules
pub fn extract_style_blocks(content: &str) -> Sanitized {
    if !STYLE_BLOCK.is_match(content) {
        return Sanitized {
            content: content.to_string(),
            rules: Vec::new(),
        };
    }

    let mut rules = Vec::new();
    for block in STYLE_BLOCK.captures_iter(content) {
        for rule in ID_RULE.captures_iter(&block[1]) {
            let declarations = parse_declarations(&rule[2]);
            if !declarations.is_empty() {
                rules.push((rule[1].to_string(), declarations));
            }
        }
    }

    Sanitized {
        content: STYLE_BLOCK.replace_all(content, "").trim().to_string(),
        rules,
    }
}

/// Parse `prop: value; prop: value` into a style map with kebab-case keys
pub fn parse_declarations(text: &str) -> StyleMap {
    text.split(';')
        .filter_map(|declaration| {
            let (key, value) = declaration.split_once(':')?;
            let (key, value) = (key.trim(), value.trim());
            if key.is_empty() || value.is_empty() {
                None
            } else {
                Some((kebab_case(key), value.to_string()))
            }
        })
        .collect()
}

/// `backgroundColor` -> `background-color`; kebab-case input is unchanged
pub fn kebab_case(property: &str) -> String {
    let mut out = String::with_capacity(property.len() + 4);
    for c in property.chars() {
        if c.is_ascii_uppercase() {
            out.push('-');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Remove all markup, leaving the text
pub fn strip_tags(html: &str) -> String {
    TAG.replace_all(html, "").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_content_untouched() {
        let sanitized = extract_style_blocks("hello world");
        assert_eq!(sanitized.content, "hello world");
        assert!(!sanitized.has_rules());
    }

    #[test]
    fn test_style_block_extracted() {
        let sanitized = extract_style_blocks(
            "Intro<style>#title { color: red; font-size: 2em } .x { color: blue }</style>",
        );
        assert_eq!(sanitized.content, "Intro");
        assert_eq!(sanitized.rules.len(), 1);
        let (id, styles) = &sanitized.rules[0];
        assert_eq!(id, "title");
        assert_eq!(styles.get("color").map(String::as_str), Some("red"));
        assert_eq!(styles.get("font-size").map(String::as_str), Some("2em"));
    }

    #[test]
    fn test_multiple_blocks_and_case() {
        let sanitized =
            extract_style_blocks("<STYLE>#a{margin:0}</STYLE>text<style>#b{padding:1px;}</style>");
        assert_eq!(sanitized.content, "text");
        let ids: Vec<&str> = sanitized.rules.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_kebab_case() {
        assert_eq!(kebab_case("backgroundColor"), "background-color");
        assert_eq!(kebab_case("font-size"), "font-size");
        assert_eq!(kebab_case("color"), "color");
    }

    #[test]
    fn test_parse_declarations_skips_empty() {
        let styles = parse_declarations(" color : red ;; width: ; height:10px");
        assert_eq!(styles.len(), 2);
        assert_eq!(styles["height"], "10px");
    }

    #[test]
    fn test_strip_tags() {
        assert_eq!(strip_tags("<strong>hel</strong>lo"), "hello");
    }
}
