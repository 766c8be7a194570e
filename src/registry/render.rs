//! HTML projection of the registry
//!
//! Read-only: renders the element tree, style overrides and generated
//! stylesheets into a standalone document.

use super::element::Element;
use super::store::ElementRegistry;
use super::StyleMap;
use html_escape::{encode_double_quoted_attribute, encode_text};

/// Render the whole page
pub fn render_page(registry: &ElementRegistry) -> String {
    let mut html = String::from("<!DOCTYPE html>\n<html>\n<head>\n");
    for sheet in registry.stylesheets() {
        html.push_str(&format!(
            "<style id=\"{}\">{}</style>\n",
            encode_double_quoted_attribute(&sheet.id),
            sheet.css
        ));
    }
    html.push_str("</head>\n");

    let body_style = inline_style(registry.page_style());
    if body_style.is_empty() {
        html.push_str("<body>\n");
    } else {
        html.push_str(&format!(
            "<body style=\"{}\">\n",
            encode_double_quoted_attribute(&body_style)
        ));
    }

    html.push_str("<div class=\"content\">");
    for element in registry.children(None) {
        render_element(registry, element, &mut html);
    }
    html.push_str("</div>\n</body>\n</html>\n");
    html
}

/// Render one element and its subtree
pub fn render_element(registry: &ElementRegistry, element: &Element, out: &mut String) {
    let tag = element.tag();
    out.push('<');
    out.push_str(tag);
    push_attr(out, "id", &element.id);
    if let Some(class_name) = &element.class_name {
        push_attr(out, "class", class_name);
    }
    let style = inline_style(&registry.style(&element.id));
    if !style.is_empty() {
        push_attr(out, "style", &style);
    }
    if let Some(input_type) = &element.input_type {
        push_attr(out, "type", input_type);
    }
    if let Some(placeholder) = &element.placeholder {
        push_attr(out, "placeholder", placeholder);
    }
    if let Some(src) = &element.src {
        push_attr(out, "src", src);
    }
    if let Some(alt) = &element.alt {
        push_attr(out, "alt", alt);
    }
    if let Some(layout) = &element.layout {
        push_attr(out, "data-layout-type", &layout.kind.to_string());
    }

    if element.kind.is_void() {
        out.push_str(" />");
        return;
    }
    out.push('>');

    for option in &element.options {
        out.push_str("<option");
        push_attr(out, "value", &option.value);
        out.push('>');
        out.push_str(&encode_text(&option.text));
        out.push_str("</option>");
    }

    if let Some(content) = &element.content {
        if element.content_is_html {
            out.push_str(content);
        } else {
            out.push_str(&encode_text(content));
        }
    }

    for child in registry.children(Some(&element.id)) {
        render_element(registry, child, out);
    }

    out.push_str("</");
    out.push_str(tag);
    out.push('>');
}

/// `key: value; key: value`
pub fn inline_style(styles: &StyleMap) -> String {
    styles
        .iter()
        .map(|(key, value)| format!("{}: {}", key, value))
        .collect::<Vec<_>>()
        .join("; ")
}

fn push_attr(out: &mut String, name: &str, value: &str) {
    out.push(' ');
    out.push_str(name);
    out.push_str("=\"");
    out.push_str(&encode_double_quoted_attribute(value));
    out.push('"');
}
