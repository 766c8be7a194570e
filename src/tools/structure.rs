//! Structure tools: ordering, insertion, moves, deletion and lookups

use super::set::{Handler, NoArgs, ToolContext, ToolSet};
use super::{apply_ingested, ingest, ToolOutput};
use crate::registry::sanitize::Sanitized;
use crate::registry::{Element, ElementKind, RelativePosition};
use crate::{Result, VoxError};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderArgs {
    pub element_ids: Vec<String>,
}

/// Element description accepted by the insert tools
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewElement {
    #[serde(rename = "type")]
    pub kind: String,
    pub content: Option<String>,
    pub id: Option<String>,
    pub class_name: Option<String>,
    pub input_type: Option<String>,
    pub placeholder: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertArgs {
    pub new_element: NewElement,
    pub target_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveArgs {
    pub element_id: String,
    pub target_id: String,
    pub position: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementArgs {
    pub element_id: String,
}

pub fn register(set: &mut ToolSet) -> Result<()> {
    set.register("changeElementOrder", Handler::sync(change_element_order))?;
    set.register(
        "insertElementBefore",
        Handler::sync(|ctx: &ToolContext, args: InsertArgs| {
            insert_element(ctx, args, RelativePosition::Before)
        }),
    )?;
    set.register(
        "insertElementAfter",
        Handler::sync(|ctx: &ToolContext, args: InsertArgs| {
            insert_element(ctx, args, RelativePosition::After)
        }),
    )?;
    set.register("moveElement", Handler::sync(move_element))?;
    set.register("deleteElement", Handler::sync(delete_element))?;
    set.register("listPageElements", Handler::sync(list_page_elements))?;
    set.register("getElementInfo", Handler::sync(get_element_info))?;
    Ok(())
}

fn change_element_order(ctx: &ToolContext, args: OrderArgs) -> Result<ToolOutput> {
    ctx.registry.lock().reorder(&args.element_ids)?;
    Ok(ToolOutput::success().with("newOrder", args.element_ids))
}

/// Build an insertable element; only text, button and input are supported
fn build_insertable(item: NewElement) -> Result<(Element, Sanitized)> {
    let sanitized = ingest(item.content.as_deref().unwrap_or_default());
    let element = match item.kind.as_str() {
        "text" => Element::paragraph(sanitized.content.clone()),
        "button" => Element::button(sanitized.content.clone()),
        "input" => {
            let mut input = Element::input(item.input_type.unwrap_or_else(|| "text".to_string()));
            input.placeholder = item.placeholder;
            input
        }
        other => return Err(VoxError::UnsupportedElementType(other.to_string())),
    };
    Ok((element.with_id(item.id).with_class(item.class_name), sanitized))
}

fn insert_element(
    ctx: &ToolContext,
    args: InsertArgs,
    position: RelativePosition,
) -> Result<ToolOutput> {
    let (element, sanitized) = build_insertable(args.new_element)?;
    let mut registry = ctx.registry.lock();
    let id = registry.insert_relative(element, &args.target_id, position)?;
    debug!("Inserted {} {} {}", id, position, args.target_id);

    let output = ToolOutput::success().with("insertedElementId", id);
    Ok(apply_ingested(&mut registry, &sanitized, output))
}

fn move_element(ctx: &ToolContext, args: MoveArgs) -> Result<ToolOutput> {
    let position: RelativePosition = args.position.parse()?;
    ctx.registry
        .lock()
        .move_relative(&args.element_id, &args.target_id, position)?;
    Ok(ToolOutput::success()
        .with("movedElementId", args.element_id)
        .with("position", position.to_string()))
}

fn delete_element(ctx: &ToolContext, args: ElementArgs) -> Result<ToolOutput> {
    let removed = ctx.registry.lock().delete(&args.element_id)?;
    Ok(ToolOutput::success()
        .with("deletedElementId", args.element_id)
        .with("removedCount", removed.len()))
}

fn list_page_elements(ctx: &ToolContext, _args: NoArgs) -> Result<ToolOutput> {
    let registry = ctx.registry.lock();
    let elements: Vec<Value> = registry
        .list()
        .iter()
        .map(|element| {
            json!({
                "id": element.id,
                "tagName": element.tag().to_uppercase(),
                "text": element.text_preview(),
                "visible": true,
                "parentId": element.parent,
            })
        })
        .collect();
    let count = elements.len();
    Ok(ToolOutput::success()
        .with("elements", elements)
        .with("count", count))
}

fn get_element_info(ctx: &ToolContext, args: ElementArgs) -> Result<ToolOutput> {
    let registry = ctx.registry.lock();
    let (element, exact) = match registry.get(&args.element_id) {
        Some(element) => (element, true),
        None => match registry.find_case_insensitive(&args.element_id) {
            Some(element) => (element, false),
            None => {
                return Ok(
                    ToolOutput::from(VoxError::not_found(args.element_id.clone())).with("found", false),
                )
            }
        },
    };

    let mut info = json!({
        "id": element.id,
        "tagName": element.tag().to_uppercase(),
        "text": element.text(),
        "parentId": element.parent,
    });
    if element.kind == ElementKind::Select {
        info["options"] = json!(element.options);
    }
    Ok(ToolOutput::success()
        .with("found", true)
        .with("exactMatch", exact)
        .with("element", info))
}

#[cfg(test)]
mod tests {
    use crate::tools::testing::{call, context};
    use crate::tools::ToolContext;
    use serde_json::json;

    fn order(ctx: &ToolContext) -> Vec<String> {
        ctx.registry.lock().list().iter().map(|e| e.id.clone()).collect()
    }

    async fn seed(ctx: &ToolContext, ids: &[&str]) {
        for id in ids {
            call(ctx, "addButton", json!({"text": id, "buttonId": id})).await;
        }
    }

    #[tokio::test]
    async fn test_add_delete_lookup_scenario() {
        let ctx = context();
        let added = call(&ctx, "addButton", json!({"text": "Go", "buttonId": "b1"})).await;
        assert_eq!(added.to_value(), json!({"success": true, "buttonId": "b1"}));

        let deleted = call(&ctx, "deleteElement", json!({"elementId": "b1"})).await;
        assert!(deleted.is_success());
        assert_eq!(deleted.get_str("deletedElementId"), Some("b1"));

        let info = call(&ctx, "getElementInfo", json!({"elementId": "b1"})).await;
        assert!(!info.is_success());
        assert_eq!(info.get("found"), Some(&json!(false)));
    }

    #[tokio::test]
    async fn test_reorder_names_missing_and_keeps_order() {
        let ctx = context();
        seed(&ctx, &["x"]).await;
        let output = call(&ctx, "changeElementOrder", json!({"elementIds": ["x", "y"]})).await;
        assert!(!output.is_success());
        assert_eq!(output.get("missingIds"), Some(&json!(["y"])));
        assert!(output.error().unwrap().contains('y'));
        assert_eq!(order(&ctx), vec!["x"]);
    }

    #[tokio::test]
    async fn test_reorder_success() {
        let ctx = context();
        seed(&ctx, &["a", "b", "c"]).await;
        let output = call(&ctx, "changeElementOrder", json!({"elementIds": ["c", "a"]})).await;
        assert_eq!(output.get("newOrder"), Some(&json!(["c", "a"])));
        assert_eq!(order(&ctx), vec!["c", "a", "b"]);
    }

    #[tokio::test]
    async fn test_insert_before_and_after() {
        let ctx = context();
        seed(&ctx, &["mid"]).await;
        let before = call(
            &ctx,
            "insertElementBefore",
            json!({"newElement": {"type": "text", "content": "first", "id": "t0"}, "targetId": "mid"}),
        )
        .await;
        assert_eq!(before.get_str("insertedElementId"), Some("t0"));
        call(
            &ctx,
            "insertElementAfter",
            json!({"newElement": {"type": "input", "id": "i9", "placeholder": "Email"}, "targetId": "mid"}),
        )
        .await;
        assert_eq!(order(&ctx), vec!["t0", "mid", "i9"]);
    }

    #[tokio::test]
    async fn test_insert_unsupported_type() {
        let ctx = context();
        seed(&ctx, &["mid"]).await;
        let output = call(
            &ctx,
            "insertElementAfter",
            json!({"newElement": {"type": "video"}, "targetId": "mid"}),
        )
        .await;
        assert_eq!(output.error(), Some("Unsupported element type: video"));
    }

    #[tokio::test]
    async fn test_move_invalid_position() {
        let ctx = context();
        seed(&ctx, &["a", "b"]).await;
        let output = call(
            &ctx,
            "moveElement",
            json!({"elementId": "a", "targetId": "b", "position": "inside"}),
        )
        .await;
        assert!(output.error().unwrap().starts_with("Invalid position"));
        assert_eq!(order(&ctx), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_move_after() {
        let ctx = context();
        seed(&ctx, &["a", "b"]).await;
        let output = call(
            &ctx,
            "moveElement",
            json!({"elementId": "a", "targetId": "b", "position": "after"}),
        )
        .await;
        assert_eq!(output.get_str("position"), Some("after"));
        assert_eq!(order(&ctx), vec!["b", "a"]);
    }

    #[tokio::test]
    async fn test_list_page_elements() {
        let ctx = context();
        call(&ctx, "addText", json!({"text": "y".repeat(80)})).await;
        let output = call(&ctx, "listPageElements", json!({})).await;
        assert_eq!(output.get("count"), Some(&json!(1)));
        let text = output.get("elements").unwrap()[0]["text"].as_str().unwrap();
        assert_eq!(text.len(), 53);
        assert_eq!(output.get("elements").unwrap()[0]["tagName"], "P");
    }

    #[tokio::test]
    async fn test_element_info_case_insensitive() {
        let ctx = context();
        seed(&ctx, &["SubmitBtn"]).await;
        let output = call(&ctx, "getElementInfo", json!({"elementId": "submitbtn"})).await;
        assert_eq!(output.get("found"), Some(&json!(true)));
        assert_eq!(output.get("exactMatch"), Some(&json!(false)));
        assert_eq!(output.get("element").unwrap()["id"], "SubmitBtn");
    }
}
