//! Styling tools
//!
//! `formatTextContent` has two modes. Whole-element tokens (`align-*`,
//! `color-*`, `size-*`) always apply. Inline markup (`bold`, `italic`,
//! `underline`) wraps a `[start, end)` character range of the element's
//! text and needs a valid selection.

use super::set::{Handler, ToolContext, ToolSet};
use super::{style_map, ToolOutput};
use crate::registry::StyleMap;
use crate::{Result, VoxError};
use html_escape::encode_text;
use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextStyleArgs {
    pub element_id: String,
    pub styles: Map<String, Value>,
}

#[derive(Clone, Copy, Debug, Deserialize)]
pub struct Selection {
    pub start: i64,
    pub end: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormatArgs {
    pub element_id: String,
    pub format: String,
    pub selection: Option<Selection>,
}

/// Parsed `format` token
#[derive(Debug, PartialEq, Eq)]
enum Format<'a> {
    Align(&'a str),
    Color(&'a str),
    Size(&'a str),
    Inline(&'static str),
}

impl<'a> Format<'a> {
    fn parse(token: &'a str) -> Result<Self> {
        if let Some(alignment) = token.strip_prefix("align-") {
            return match alignment {
                "left" | "center" | "right" | "justify" => Ok(Format::Align(alignment)),
                other => Err(VoxError::Validation(format!(
                    "Unsupported alignment: {}",
                    other
                ))),
            };
        }
        if let Some(color) = token.strip_prefix("color-") {
            return non_empty(color, token).map(Format::Color);
        }
        if let Some(size) = token.strip_prefix("size-") {
            return non_empty(size, token).map(Format::Size);
        }
        match token {
            "bold" => Ok(Format::Inline("strong")),
            "italic" => Ok(Format::Inline("em")),
            "underline" => Ok(Format::Inline("u")),
            other => Err(VoxError::Validation(format!(
                "Unsupported format type: {}",
                other
            ))),
        }
    }
}

fn non_empty<'a>(value: &'a str, token: &str) -> Result<&'a str> {
    if value.is_empty() {
        Err(VoxError::Validation(format!("Format {} needs a value", token)))
    } else {
        Ok(value)
    }
}

pub fn register(set: &mut ToolSet) -> Result<()> {
    set.register("changeTextStyle", Handler::sync(change_text_style))?;
    set.register("formatTextContent", Handler::sync(format_text_content))?;
    Ok(())
}

fn change_text_style(ctx: &ToolContext, args: TextStyleArgs) -> Result<ToolOutput> {
    let styles = style_map(&args.styles)?;
    ctx.registry.lock().update_style(&args.element_id, styles)?;
    Ok(ToolOutput::success()
        .with("elementId", args.element_id)
        .with("appliedStyles", Value::Object(args.styles)))
}

fn format_text_content(ctx: &ToolContext, args: FormatArgs) -> Result<ToolOutput> {
    let format = Format::parse(&args.format)?;
    let mut registry = ctx.registry.lock();
    if !registry.contains(&args.element_id) {
        return Err(VoxError::not_found(args.element_id));
    }

    let whole = |property: &str, value: &str| -> StyleMap {
        [(property.to_string(), value.to_string())].into()
    };
    let output = ToolOutput::success()
        .with("elementId", args.element_id.clone())
        .with("format", args.format.clone());

    match format {
        Format::Align(alignment) => {
            registry.update_style(&args.element_id, whole("text-align", alignment))?;
            Ok(output)
        }
        Format::Color(color) => {
            registry.update_style(&args.element_id, whole("color", color))?;
            Ok(output)
        }
        Format::Size(size) => {
            registry.update_style(&args.element_id, whole("font-size", size))?;
            Ok(output)
        }
        Format::Inline(tag) => {
            let element = registry
                .get_mut(&args.element_id)
                .ok_or_else(|| VoxError::not_found(args.element_id.clone()))?;
            let text = element.text();
            let html = wrap_selection(&text, args.selection, tag)?;
            element.content = Some(html.clone());
            element.content_is_html = true;
            Ok(output.with("content", html))
        }
    }
}

/// Wrap `[start, end)` (in characters) of plain text in `<tag>`
fn wrap_selection(text: &str, selection: Option<Selection>, tag: &str) -> Result<String> {
    let invalid = || VoxError::Validation("Invalid selection range".to_string());
    let selection = selection.ok_or_else(invalid)?;
    let len = text.chars().count() as i64;
    if selection.start < 0 || selection.start >= selection.end || selection.end > len {
        return Err(invalid());
    }

    let (start, end) = (selection.start as usize, selection.end as usize);
    let before: String = text.chars().take(start).collect();
    let selected: String = text.chars().skip(start).take(end - start).collect();
    let after: String = text.chars().skip(end).collect();
    Ok(format!(
        "{}<{tag}>{}</{tag}>{}",
        encode_text(&before),
        encode_text(&selected),
        encode_text(&after),
        tag = tag
    ))
}
