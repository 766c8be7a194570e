//! Content tools: text, buttons, inputs and dropdowns

use super::set::{Handler, ToolContext, ToolSet};
use super::{apply_ingested, ingest, resolve_parent, ToolOutput};
use crate::registry::{Element, ElementKind, SelectOption};
use crate::{Result, VoxError};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddTextArgs {
    pub text: String,
    pub element_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddButtonArgs {
    pub text: String,
    pub button_id: Option<String>,
    pub class_name: Option<String>,
    pub element_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddInputArgs {
    pub placeholder: Option<String>,
    #[serde(rename = "type")]
    pub input_type: Option<String>,
    pub input_id: Option<String>,
    pub class_name: Option<String>,
    pub element_id: Option<String>,
}

/// Dropdown option; either half may be omitted and is copied from the other
#[derive(Debug, Deserialize)]
pub struct OptionArg {
    pub value: Option<String>,
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddDropdownArgs {
    pub options: Vec<OptionArg>,
    pub select_id: Option<String>,
    pub class_name: Option<String>,
    pub element_id: Option<String>,
}

pub fn register(set: &mut ToolSet) -> Result<()> {
    set.register("addText", Handler::sync(add_text))?;
    set.register("addButton", Handler::sync(add_button))?;
    set.register("addInputField", Handler::sync(add_input_field))?;
    set.register("addDropdownMenu", Handler::sync(add_dropdown_menu))?;
    Ok(())
}

fn add_text(ctx: &ToolContext, args: AddTextArgs) -> Result<ToolOutput> {
    let sanitized = ingest(&args.text);
    let mut registry = ctx.registry.lock();
    let parent = resolve_parent(&registry, args.element_id.clone())?;
    let id = registry.add(Element::paragraph(sanitized.content.clone()).with_parent(parent))?;

    let output = ToolOutput::success()
        .with("text", sanitized.content.clone())
        .with("elementId", args.element_id)
        .with("createdElementId", id);
    Ok(apply_ingested(&mut registry, &sanitized, output))
}

fn add_button(ctx: &ToolContext, args: AddButtonArgs) -> Result<ToolOutput> {
    let sanitized = ingest(&args.text);
    let mut registry = ctx.registry.lock();
    let parent = resolve_parent(&registry, args.element_id)?;
    let element = Element::button(sanitized.content.clone())
        .with_id(args.button_id)
        .with_class(args.class_name)
        .with_parent(parent);
    let id = registry.add(element)?;

    let output = ToolOutput::success().with("buttonId", id);
    Ok(apply_ingested(&mut registry, &sanitized, output))
}

fn add_input_field(ctx: &ToolContext, args: AddInputArgs) -> Result<ToolOutput> {
    let mut registry = ctx.registry.lock();
    let parent = resolve_parent(&registry, args.element_id)?;
    let mut element = Element::input(args.input_type.unwrap_or_else(|| "text".to_string()))
        .with_id(args.input_id)
        .with_class(args.class_name)
        .with_parent(parent);
    element.placeholder = args.placeholder;
    let id = registry.add(element)?;
    Ok(ToolOutput::success().with("inputId", id))
}

fn add_dropdown_menu(ctx: &ToolContext, args: AddDropdownArgs) -> Result<ToolOutput> {
    let options = args
        .options
        .into_iter()
        .map(|option| match (option.value, option.text) {
            (Some(value), Some(text)) => Ok(SelectOption { value, text }),
            (Some(value), None) => Ok(SelectOption {
                text: value.clone(),
                value,
            }),
            (None, Some(text)) => Ok(SelectOption {
                value: text.clone(),
                text,
            }),
            (None, None) => Err(VoxError::Validation(
                "Each option needs a value or text".to_string(),
            )),
        })
        .collect::<Result<Vec<_>>>()?;

    let mut registry = ctx.registry.lock();
    let parent = resolve_parent(&registry, args.element_id)?;
    let mut element = Element::new(ElementKind::Select)
        .with_id(args.select_id)
        .with_class(args.class_name)
        .with_parent(parent);
    element.options = options;
    let id = registry.add(element)?;
    Ok(ToolOutput::success().with("selectId", id))
}

#[cfg(test)]
mod tests {
    use crate::tools::testing::{call, context};
    use serde_json::json;

    #[tokio::test]
    async fn test_add_button_with_id() {
        let ctx = context();
        let output = call(&ctx, "addButton", json!({"text": "Go", "buttonId": "b1"})).await;
        assert!(output.is_success());
        assert_eq!(output.get_str("buttonId"), Some("b1"));
        assert_eq!(ctx.registry.lock().get("b1").unwrap().text(), "Go");
    }

    #[tokio::test]
    async fn test_add_button_duplicate_id() {
        let ctx = context();
        call(&ctx, "addButton", json!({"text": "Go", "buttonId": "b1"})).await;
        let output = call(&ctx, "addButton", json!({"text": "Again", "buttonId": "b1"})).await;
        assert!(!output.is_success());
        assert_eq!(output.error(), Some("Element with ID b1 already exists"));
    }

    #[tokio::test]
    async fn test_add_text_generates_id() {
        let ctx = context();
        let output = call(&ctx, "addText", json!({"text": "Hello"})).await;
        let id = output.get_str("createdElementId").unwrap();
        assert!(id.starts_with("text-"));
        assert_eq!(output.get_str("text"), Some("Hello"));
    }

    #[tokio::test]
    async fn test_add_text_into_container() {
        let ctx = context();
        call(&ctx, "createLayoutContainer", json!({"containerId": "row", "type": "flex"})).await;
        let output = call(&ctx, "addText", json!({"text": "in", "elementId": "row"})).await;
        let id = output.get_str("createdElementId").unwrap().to_string();
        assert_eq!(ctx.registry.lock().get(&id).unwrap().parent.as_deref(), Some("row"));
    }

    #[tokio::test]
    async fn test_add_text_unknown_container() {
        let output = call(&context(), "addText", json!({"text": "x", "elementId": "ghost"})).await;
        assert_eq!(output.error(), Some("Element with ID ghost not found"));
    }

    #[tokio::test]
    async fn test_add_text_extracts_style_block() {
        let ctx = context();
        call(&ctx, "addButton", json!({"text": "Go", "buttonId": "cta"})).await;
        let output = call(
            &ctx,
            "addText",
            json!({"text": "Welcome<style>#cta { backgroundColor: green }</style>"}),
        )
        .await;
        assert_eq!(output.get_str("text"), Some("Welcome"));
        assert_eq!(output.get("styledElements"), Some(&json!(["cta"])));
        assert_eq!(ctx.registry.lock().style("cta")["background-color"], "green");
    }

    #[tokio::test]
    async fn test_add_input_defaults_to_text() {
        let ctx = context();
        let output = call(&ctx, "addInputField", json!({"placeholder": "Name"})).await;
        let id = output.get_str("inputId").unwrap().to_string();
        let registry = ctx.registry.lock();
        let input = registry.get(&id).unwrap();
        assert_eq!(input.input_type.as_deref(), Some("text"));
        assert_eq!(input.placeholder.as_deref(), Some("Name"));
    }

    #[tokio::test]
    async fn test_dropdown_options() {
        let ctx = context();
        let output = call(
            &ctx,
            "addDropdownMenu",
            json!({"options": [{"value": "1", "text": "One"}, {"text": "Two"}], "selectId": "s"}),
        )
        .await;
        assert_eq!(output.get_str("selectId"), Some("s"));
        let registry = ctx.registry.lock();
        let options = &registry.get("s").unwrap().options;
        assert_eq!(options[1].value, "Two");
    }

    #[tokio::test]
    async fn test_dropdown_empty_option_rejected() {
        let output = call(&context(), "addDropdownMenu", json!({"options": [{}]})).await;
        assert!(!output.is_success());
    }
}
