//! Layout tools
//!
//! Containers remember their layout kind (and the generated column class)
//! in [`LayoutMeta`], so later placements pick grid or flex positioning
//! from the container itself.

use super::set::{Handler, ToolContext, ToolSet};
use super::{apply_ingested, css_value, ingest, resolve_parent, style_map, ToolOutput};
use crate::registry::sanitize::{kebab_case, Sanitized};
use crate::registry::{
    generate_id, Element, ElementKind, ElementRegistry, LayoutKind, LayoutMeta, RelativePosition,
    StyleMap,
};
use crate::{Result, VoxError};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

const DEFAULT_COLUMNS: u32 = 3;
const DEFAULT_GAP_PX: u32 = 20;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerArgs {
    pub container_id: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    pub element_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Breakpoint {
    pub max_width: String,
    pub columns: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnArgs {
    pub container_id: String,
    pub columns: Option<u32>,
    pub gap: Option<String>,
    #[serde(default)]
    pub breakpoints: Vec<Breakpoint>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridArgs {
    pub container_id: String,
    pub rows: Option<Value>,
    pub columns: Option<Value>,
    #[serde(default)]
    pub areas: Vec<String>,
    pub gap: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutElement {
    #[serde(rename = "type")]
    pub kind: String,
    pub content: Option<String>,
    pub id: Option<String>,
    pub class_name: Option<String>,
    #[serde(default)]
    pub styles: Map<String, Value>,
    pub level: Option<u8>,
    pub src: Option<String>,
    pub alt: Option<String>,
    pub tag_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Placement {
    pub row: Option<Value>,
    pub column: Option<Value>,
    pub area: Option<String>,
    pub order: Option<Value>,
    pub grow: Option<Value>,
    pub shrink: Option<Value>,
    pub basis: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddToLayoutArgs {
    pub element: LayoutElement,
    pub container_id: String,
    #[serde(default)]
    pub position: Placement,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponsiveRule {
    pub max_width: Option<String>,
    pub min_width: Option<String>,
    pub media: Option<String>,
    #[serde(default)]
    pub styles: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponsiveArgs {
    pub element_id: String,
    #[serde(default)]
    pub rules: Vec<ResponsiveRule>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridCellArgs {
    pub element_id: String,
    pub container_id: String,
    pub row: Option<Value>,
    pub column: Option<Value>,
    pub area: Option<String>,
}

pub fn register(set: &mut ToolSet) -> Result<()> {
    set.register("createLayoutContainer", Handler::sync(create_layout_container))?;
    set.register("createColumnLayout", Handler::sync(create_column_layout))?;
    set.register("createGridLayout", Handler::sync(create_grid_layout))?;
    set.register("addElementToLayout", Handler::sync(add_element_to_layout))?;
    set.register("setResponsiveRules", Handler::sync(set_responsive_rules))?;
    set.register("placeInGridCell", Handler::sync(place_in_grid_cell))?;
    Ok(())
}

fn styles(pairs: &[(&str, String)]) -> StyleMap {
    pairs
        .iter()
        .map(|(key, value)| (key.to_string(), value.clone()))
        .collect()
}

fn require(registry: &ElementRegistry, id: &str) -> Result<()> {
    if registry.contains(id) {
        Ok(())
    } else {
        Err(VoxError::not_found(id))
    }
}

fn set_layout(registry: &mut ElementRegistry, id: &str, meta: LayoutMeta) -> Result<()> {
    let container = registry
        .get_mut(id)
        .ok_or_else(|| VoxError::not_found(id))?;
    container.layout = Some(meta);
    Ok(())
}

fn create_layout_container(ctx: &ToolContext, args: ContainerArgs) -> Result<ToolOutput> {
    let (kind, display) = match args.kind.as_str() {
        "flex" => (LayoutKind::Flex, "flex"),
        "grid" => (LayoutKind::Grid, "grid"),
        other => {
            return Err(VoxError::Validation(format!(
                "Unsupported layout type {}; use \"grid\" or \"flex\"",
                other
            )))
        }
    };

    let mut registry = ctx.registry.lock();
    let parent = resolve_parent(&registry, args.element_id)?;
    let mut container = Element::div().with_id(args.container_id).with_parent(parent);
    if container.id.is_empty() {
        container.id = generate_id(&format!("{}-container", args.kind));
    }
    container.layout = Some(LayoutMeta {
        kind,
        class_name: None,
    });
    let id = registry.add(container)?;

    let mut container_style = styles(&[
        ("display", display.to_string()),
        ("width", "100%".to_string()),
    ]);
    if kind == LayoutKind::Flex {
        container_style.insert("flex-wrap".to_string(), "wrap".to_string());
    }
    registry.update_style(&id, container_style)?;

    Ok(ToolOutput::success()
        .with("containerId", id)
        .with("type", args.kind))
}

/// `20px` -> 20; anything without leading digits uses the default
fn gap_px(gap: Option<&str>) -> u32 {
    gap.map(|g| g.trim().chars().take_while(char::is_ascii_digit).collect::<String>())
        .and_then(|digits| digits.parse().ok())
        .unwrap_or(DEFAULT_GAP_PX)
}

fn column_basis(columns: u32, gap: u32) -> Result<String> {
    if columns <= 1 {
        return Ok("100%".to_string());
    }
    let gutters = (columns - 1).checked_mul(gap).ok_or_else(|| {
        VoxError::Validation(format!("{} columns with a {}px gap is too wide", columns, gap))
    })?;
    Ok(format!("calc((100% - {}px) / {})", gutters, columns))
}

fn create_column_layout(ctx: &ToolContext, args: ColumnArgs) -> Result<ToolOutput> {
    let columns = args.columns.unwrap_or(DEFAULT_COLUMNS);
    if columns == 0 {
        return Err(VoxError::Validation("columns must be at least 1".to_string()));
    }
    let gap = gap_px(args.gap.as_deref());
    let class_name = format!("column-{}", args.container_id);

    let mut css = format!(
        ".{} {{ flex: 1 1 {}; box-sizing: border-box; }}",
        class_name,
        column_basis(columns, gap)?
    );
    for breakpoint in &args.breakpoints {
        css.push_str(&format!(
            "\n@media (max-width: {}) {{ .{} {{ flex-basis: {}; }} }}",
            breakpoint.max_width,
            class_name,
            column_basis(breakpoint.columns.max(1), gap)?
        ));
    }

    let mut registry = ctx.registry.lock();
    require(&registry, &args.container_id)?;
    registry.update_style(
        &args.container_id,
        styles(&[
            ("display", "flex".to_string()),
            ("flex-wrap", "wrap".to_string()),
            ("gap", format!("{}px", gap)),
            ("width", "100%".to_string()),
        ]),
    )?;
    registry.set_stylesheet(&args.container_id, format!("columns-{}", args.container_id), css)?;
    set_layout(
        &mut registry,
        &args.container_id,
        LayoutMeta {
            kind: LayoutKind::Columns,
            class_name: Some(class_name.clone()),
        },
    )?;
    debug!("Column layout {} with {} columns", args.container_id, columns);

    Ok(ToolOutput::success()
        .with("containerId", args.container_id)
        .with("columnClassName", class_name)
        .with("numberOfColumns", columns))
}

/// Track list from a count, a list of sizes, or a literal template
fn track_template(value: &Value, counted: &str) -> Result<String> {
    match value {
        Value::Number(n) => match n.as_u64() {
            Some(count) if count > 0 => Ok(format!("repeat({}, {})", count, counted)),
            _ => Err(VoxError::Validation(format!("Invalid track count {}", n))),
        },
        Value::String(s) => match s.trim().parse::<u64>() {
            Ok(count) if count > 0 => Ok(format!("repeat({}, {})", count, counted)),
            _ => Ok(s.clone()),
        },
        Value::Array(items) => Ok(items
            .iter()
            .map(|item| css_value("track", item))
            .collect::<Result<Vec<_>>>()?
            .join(" ")),
        other => Err(VoxError::Validation(format!("Invalid track list {}", other))),
    }
}

fn create_grid_layout(ctx: &ToolContext, args: GridArgs) -> Result<ToolOutput> {
    let columns = args
        .columns
        .as_ref()
        .map(|c| track_template(c, "1fr"))
        .transpose()?
        .unwrap_or_else(|| "1fr".to_string());
    let rows = args
        .rows
        .as_ref()
        .map(|r| track_template(r, "auto"))
        .transpose()?
        .unwrap_or_else(|| "auto".to_string());
    let areas = args
        .areas
        .iter()
        .map(|row| format!("\"{}\"", row))
        .collect::<Vec<_>>()
        .join(" ");

    let mut grid_style = styles(&[
        ("display", "grid".to_string()),
        ("grid-template-columns", columns.clone()),
        ("grid-template-rows", rows.clone()),
        ("gap", args.gap.unwrap_or_else(|| format!("{}px", DEFAULT_GAP_PX))),
        ("width", "100%".to_string()),
    ]);
    if !areas.is_empty() {
        grid_style.insert("grid-template-areas".to_string(), areas.clone());
    }

    let mut registry = ctx.registry.lock();
    require(&registry, &args.container_id)?;
    registry.update_style(&args.container_id, grid_style)?;
    set_layout(
        &mut registry,
        &args.container_id,
        LayoutMeta {
            kind: LayoutKind::Grid,
            class_name: None,
        },
    )?;

    Ok(ToolOutput::success()
        .with("containerId", args.container_id)
        .with("gridColumns", columns)
        .with("gridRows", rows)
        .with("gridAreas", areas))
}

fn build_layout_element(item: LayoutElement) -> Result<(Element, Sanitized)> {
    let sanitized = ingest(item.content.as_deref().unwrap_or_default());
    let mut element = match item.kind.as_str() {
        "text" => Element::paragraph(sanitized.content.clone()),
        "heading" => Element::new(ElementKind::heading(item.level.unwrap_or(2)))
            .with_content(sanitized.content.clone()),
        "button" => Element::button(sanitized.content.clone()),
        "image" => {
            let src = item
                .src
                .filter(|src| !src.is_empty())
                .ok_or_else(|| VoxError::Validation("image elements need a src".to_string()))?;
            Element::image(src, item.alt.unwrap_or_default())
        }
        "custom" => {
            let mut custom = Element::new(ElementKind::Custom).with_content(sanitized.content.clone());
            custom.content_is_html = true;
            custom.tag_name = item.tag_name;
            custom
        }
        _ => Element::div().with_content(sanitized.content.clone()),
    };
    if element.content.as_deref() == Some("") {
        element.content = None;
    }
    Ok((element.with_id(item.id).with_class(item.class_name), sanitized))
}

fn add_element_to_layout(ctx: &ToolContext, args: AddToLayoutArgs) -> Result<ToolOutput> {
    let mut element_style = style_map(&args.element.styles)?;
    let (element, sanitized) = build_layout_element(args.element)?;

    let mut registry = ctx.registry.lock();
    let layout = registry
        .get(&args.container_id)
        .ok_or_else(|| VoxError::not_found(args.container_id.clone()))?
        .layout
        .clone();

    let mut element = element.with_parent(Some(args.container_id.clone()));
    if let Some(class_name) = layout.as_ref().and_then(|meta| meta.class_name.as_deref()) {
        element.add_class(class_name);
    }

    let position = &args.position;
    let placement: Vec<(&str, Option<String>)> = match layout.map(|meta| meta.kind) {
        Some(LayoutKind::Grid) => vec![
            ("grid-row", position.row.as_ref().map(|v| css_value("row", v)).transpose()?),
            ("grid-column", position.column.as_ref().map(|v| css_value("column", v)).transpose()?),
            ("grid-area", position.area.clone()),
        ],
        _ => vec![
            ("order", position.order.as_ref().map(|v| css_value("order", v)).transpose()?),
            ("flex-grow", position.grow.as_ref().map(|v| css_value("grow", v)).transpose()?),
            ("flex-shrink", position.shrink.as_ref().map(|v| css_value("shrink", v)).transpose()?),
            ("flex-basis", position.basis.clone()),
        ],
    };
    for (property, value) in placement {
        if let Some(value) = value {
            element_style.insert(property.to_string(), value);
        }
    }

    let id = registry.add(element)?;
    if !element_style.is_empty() {
        registry.update_style(&id, element_style)?;
    }

    let output = ToolOutput::success()
        .with("elementId", id)
        .with("containerId", args.container_id);
    Ok(apply_ingested(&mut registry, &sanitized, output))
}

fn media_condition(rule: &ResponsiveRule) -> Option<String> {
    if let Some(media) = rule.media.as_ref().filter(|m| !m.trim().is_empty()) {
        let media = media.trim();
        return Some(media.strip_prefix("@media").unwrap_or(media).trim().to_string());
    }
    match (&rule.max_width, &rule.min_width) {
        (Some(max), Some(min)) => Some(format!("(min-width: {}) and (max-width: {})", min, max)),
        (Some(max), None) => Some(format!("(max-width: {})", max)),
        (None, Some(min)) => Some(format!("(min-width: {})", min)),
        (None, None) => None,
    }
}

fn set_responsive_rules(ctx: &ToolContext, args: ResponsiveArgs) -> Result<ToolOutput> {
    let mut blocks = Vec::new();
    for rule in &args.rules {
        let Some(condition) = media_condition(rule) else {
            continue;
        };
        if rule.styles.is_empty() {
            continue;
        }
        let declarations = rule
            .styles
            .iter()
            .map(|(key, value)| Ok(format!("{}: {};", kebab_case(key), css_value(key, value)?)))
            .collect::<Result<Vec<_>>>()?
            .join(" ");
        blocks.push(format!(
            "@media {} {{ #{} {{ {} }} }}",
            condition, args.element_id, declarations
        ));
    }
    if blocks.is_empty() {
        return Err(VoxError::Validation(
            "No valid responsive rules provided".to_string(),
        ));
    }

    let style_id = format!(
        "responsive-{}-{}",
        args.element_id,
        Utc::now().timestamp_millis()
    );
    let mut registry = ctx.registry.lock();
    require(&registry, &args.element_id)?;
    registry.set_stylesheet(&args.element_id, style_id.clone(), blocks.join("\n"))?;

    Ok(ToolOutput::success()
        .with("elementId", args.element_id)
        .with("styleId", style_id)
        .with("rulesApplied", blocks.len()))
}

fn place_in_grid_cell(ctx: &ToolContext, args: GridCellArgs) -> Result<ToolOutput> {
    let mut cell = StyleMap::new();
    if let Some(row) = &args.row {
        cell.insert("grid-row".to_string(), css_value("row", row)?);
    }
    if let Some(column) = &args.column {
        cell.insert("grid-column".to_string(), css_value("column", column)?);
    }
    if let Some(area) = args.area.as_ref().filter(|a| !a.is_empty()) {
        cell.insert("grid-area".to_string(), area.clone());
    }
    if cell.is_empty() {
        return Err(VoxError::Validation(
            "placeInGridCell needs a row, column or area".to_string(),
        ));
    }

    let mut registry = ctx.registry.lock();
    let is_grid = registry
        .get(&args.container_id)
        .ok_or_else(|| VoxError::not_found(args.container_id.clone()))?
        .layout
        .as_ref()
        .is_some_and(|meta| meta.kind == LayoutKind::Grid);
    if !is_grid {
        return Err(VoxError::Validation(format!(
            "Element {} is not a grid layout",
            args.container_id
        )));
    }

    let already_inside = registry
        .get(&args.element_id)
        .ok_or_else(|| VoxError::not_found(args.element_id.clone()))?
        .parent
        .as_deref()
        == Some(args.container_id.as_str());
    if !already_inside {
        registry.move_relative(&args.element_id, &args.container_id, RelativePosition::Append)?;
    }
    let applied = registry.update_style(&args.element_id, cell)?;

    Ok(ToolOutput::success()
        .with("elementId", args.element_id)
        .with("containerId", args.container_id)
        .with(
            "gridArea",
            applied.get("grid-area").cloned().unwrap_or_default(),
        ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::{call, context};
    use serde_json::json;

    #[tokio::test]
    async fn test_flex_container() {
        let ctx = context();
        let output = call(&ctx, "createLayoutContainer", json!({"type": "flex"})).await;
        let id = output.get_str("containerId").unwrap().to_string();
        assert!(id.starts_with("flex-container-"));
        let registry = ctx.registry.lock();
        assert_eq!(registry.get(&id).unwrap().layout.as_ref().unwrap().kind, LayoutKind::Flex);
        assert_eq!(registry.style(&id)["flex-wrap"], "wrap");
    }

    #[tokio::test]
    async fn test_unknown_container_type() {
        let output = call(&context(), "createLayoutContainer", json!({"type": "table"})).await;
        assert!(!output.is_success());
    }

    #[tokio::test]
    async fn test_column_layout_class_applied_to_children() {
        let ctx = context();
        call(&ctx, "createLayoutContainer", json!({"type": "flex", "containerId": "cols"})).await;
        let output = call(
            &ctx,
            "createColumnLayout",
            json!({"containerId": "cols", "columns": 3, "gap": "10px", "breakpoints": [{"maxWidth": "600px", "columns": 1}]}),
        )
        .await;
        assert_eq!(output.get_str("columnClassName"), Some("column-cols"));
        assert_eq!(output.get("numberOfColumns"), Some(&json!(3)));

        let child = call(
            &ctx,
            "addElementToLayout",
            json!({"element": {"type": "text", "content": "A"}, "containerId": "cols", "position": {"order": 2}}),
        )
        .await;
        let child_id = child.get_str("elementId").unwrap().to_string();

        let registry = ctx.registry.lock();
        let sheet = &registry.stylesheets()[0];
        assert!(sheet.css.contains("flex: 1 1 calc((100% - 20px) / 3)"));
        assert!(sheet.css.contains("@media (max-width: 600px) { .column-cols { flex-basis: 100%; } }"));
        let element = registry.get(&child_id).unwrap();
        assert_eq!(element.class_name.as_deref(), Some("column-cols"));
        assert_eq!(registry.style(&child_id)["order"], "2");
    }

    #[tokio::test]
    async fn test_column_layout_rejects_overflowing_width() {
        let ctx = context();
        call(&ctx, "createLayoutContainer", json!({"type": "flex", "containerId": "wide"})).await;
        let output = call(
            &ctx,
            "createColumnLayout",
            json!({"containerId": "wide", "columns": 100000, "gap": "100000px"}),
        )
        .await;
        assert!(!output.is_success());
        assert!(output.error().unwrap().starts_with("Validation error"));
        assert!(ctx.registry.lock().stylesheets().is_empty());
    }

    #[tokio::test]
    async fn test_grid_layout_templates() {
        let ctx = context();
        call(&ctx, "createLayoutContainer", json!({"type": "grid", "containerId": "g"})).await;
        let output = call(
            &ctx,
            "createGridLayout",
            json!({"containerId": "g", "columns": 3, "rows": ["100px", "auto"], "areas": ["head head", "side main"]}),
        )
        .await;
        assert_eq!(output.get_str("gridColumns"), Some("repeat(3, 1fr)"));
        assert_eq!(output.get_str("gridRows"), Some("100px auto"));
        assert_eq!(output.get_str("gridAreas"), Some("\"head head\" \"side main\""));
    }

    #[tokio::test]
    async fn test_grid_child_positioning() {
        let ctx = context();
        call(&ctx, "createLayoutContainer", json!({"type": "grid", "containerId": "g"})).await;
        call(&ctx, "createGridLayout", json!({"containerId": "g", "columns": "1fr 2fr"})).await;
        let output = call(
            &ctx,
            "addElementToLayout",
            json!({"element": {"type": "heading", "content": "Title", "level": 1, "id": "h"}, "containerId": "g", "position": {"row": 1, "column": "1 / 3", "order": 5}}),
        )
        .await;
        assert_eq!(output.get_str("elementId"), Some("h"));

        let registry = ctx.registry.lock();
        let style = registry.style("h");
        assert_eq!(style["grid-row"], "1");
        assert_eq!(style["grid-column"], "1 / 3");
        assert!(!style.contains_key("order"));
        assert_eq!(registry.get("h").unwrap().kind, ElementKind::Heading1);
    }

    #[tokio::test]
    async fn test_add_to_missing_container() {
        let output = call(
            &context(),
            "addElementToLayout",
            json!({"element": {"type": "div"}, "containerId": "none"}),
        )
        .await;
        assert_eq!(output.error(), Some("Element with ID none not found"));
    }

    #[tokio::test]
    async fn test_responsive_rules() {
        let ctx = context();
        call(&ctx, "addText", json!({"text": "x"})).await;
        let id = ctx.registry.lock().list()[0].id.clone();
        let output = call(
            &ctx,
            "setResponsiveRules",
            json!({"elementId": id, "rules": [
                {"maxWidth": "600px", "styles": {"fontSize": "12px"}},
                {"styles": {"color": "red"}},
                {"media": "(orientation: landscape)", "styles": {"display": "none"}}
            ]}),
        )
        .await;
        assert_eq!(output.get("rulesApplied"), Some(&json!(2)));
        assert!(output.get_str("styleId").unwrap().starts_with(&format!("responsive-{}-", id)));

        let registry = ctx.registry.lock();
        let css = &registry.stylesheets()[0].css;
        assert!(css.contains(&format!("@media (max-width: 600px) {{ #{} {{ font-size: 12px; }} }}", id)));
        assert!(css.contains("(orientation: landscape)"));
    }

    #[tokio::test]
    async fn test_responsive_rules_empty() {
        let ctx = context();
        call(&ctx, "addText", json!({"text": "x"})).await;
        let id = ctx.registry.lock().list()[0].id.clone();
        let output = call(&ctx, "setResponsiveRules", json!({"elementId": id, "rules": []})).await;
        assert_eq!(
            output.error(),
            Some("Validation error: No valid responsive rules provided")
        );
    }

    #[tokio::test]
    async fn test_place_in_grid_cell() {
        let ctx = context();
        call(&ctx, "createLayoutContainer", json!({"type": "grid", "containerId": "g"})).await;
        call(&ctx, "addButton", json!({"text": "Go", "buttonId": "b"})).await;
        let output = call(
            &ctx,
            "placeInGridCell",
            json!({"elementId": "b", "containerId": "g", "area": "main"}),
        )
        .await;
        assert!(output.is_success());

        let registry = ctx.registry.lock();
        assert_eq!(registry.get("b").unwrap().parent.as_deref(), Some("g"));
        assert_eq!(registry.style("b")["grid-area"], "main");
    }

    #[tokio::test]
    async fn test_place_in_non_grid_rejected() {
        let ctx = context();
        call(&ctx, "createLayoutContainer", json!({"type": "flex", "containerId": "f"})).await;
        call(&ctx, "addButton", json!({"text": "Go", "buttonId": "b"})).await;
        let output = call(
            &ctx,
            "placeInGridCell",
            json!({"elementId": "b", "containerId": "f", "row": 1}),
        )
        .await;
        assert!(!output.is_success());
        assert_eq!(ctx.registry.lock().get("b").unwrap().parent, None);
    }

    #[test]
    fn test_gap_parsing() {
        assert_eq!(gap_px(Some("16px")), 16);
        assert_eq!(gap_px(Some("1rem")), 1);
        assert_eq!(gap_px(Some("wide")), DEFAULT_GAP_PX);
        assert_eq!(gap_px(None), DEFAULT_GAP_PX);
    }
}
