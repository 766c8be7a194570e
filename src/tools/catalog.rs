//! Tool schema catalog
//!
//! The function definitions advertised to the realtime model in every
//! `session.update`. Must list exactly the tools [`ToolSet::standard`]
//! registers; [`ToolSet::verify_catalog`] checks it.
//!
//! [`ToolSet::standard`]: super::ToolSet::standard
//! [`ToolSet::verify_catalog`]: super::ToolSet::verify_catalog

use once_cell::sync::Lazy;
use serde::Serialize;
use serde_json::{json, Value};

/// One advertised function
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ToolSchema {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

impl ToolSchema {
    pub fn new(name: &'static str, description: &'static str, parameters: Option<Value>) -> Self {
        Self {
            kind: "function",
            name,
            description,
            parameters,
        }
    }
}

fn object(properties: Value, required: &[&str]) -> Option<Value> {
    Some(json!({
        "type": "object",
        "properties": properties,
        "required": required,
    }))
}

fn string(description: &str) -> Value {
    json!({"type": "string", "description": description})
}

fn parent_id() -> Value {
    string("Optional ID of the container to add into; defaults to the page")
}

fn new_element() -> Value {
    json!({
        "type": "object",
        "properties": {
            "type": {"type": "string", "enum": ["text", "button", "input"]},
            "content": string("Text content"),
            "id": string("Optional element ID"),
            "className": string("Optional CSS class"),
            "inputType": string("Input type for input elements"),
            "placeholder": string("Placeholder for input elements"),
        },
        "required": ["type"],
    })
}

static CATALOG: Lazy<Vec<ToolSchema>> = Lazy::new(build_catalog);

/// The standard catalog
pub fn catalog() -> &'static [ToolSchema] {
    &CATALOG
}

/// Catalog as the `tools` array of a session configuration
pub fn tool_definitions() -> Value {
    json!(catalog())
}

fn build_catalog() -> Vec<ToolSchema> {
    vec![
        // Page
        ToolSchema::new("getPageHTML", "Gets the HTML for the current page", None),
        ToolSchema::new(
            "changeBackgroundColor",
            "Changes the background color of the page",
            object(json!({"color": string("A CSS color value")}), &["color"]),
        ),
        ToolSchema::new(
            "changeTextColor",
            "Changes the default text color of the page",
            object(json!({"color": string("A CSS color value")}), &["color"]),
        ),
        // Content
        ToolSchema::new(
            "addText",
            "Adds a paragraph of text to the page or to a container",
            object(
                json!({"text": string("The text to add"), "elementId": parent_id()}),
                &["text"],
            ),
        ),
        ToolSchema::new(
            "addButton",
            "Adds a button to the page",
            object(
                json!({
                    "text": string("Button label"),
                    "buttonId": string("Optional button ID"),
                    "className": string("Optional CSS class"),
                    "elementId": parent_id(),
                }),
                &["text"],
            ),
        ),
        ToolSchema::new(
            "addInputField",
            "Adds an input field to the page",
            object(
                json!({
                    "placeholder": string("Placeholder text"),
                    "type": string("Input type such as text, email or number"),
                    "inputId": string("Optional input ID"),
                    "className": string("Optional CSS class"),
                    "elementId": parent_id(),
                }),
                &[],
            ),
        ),
        ToolSchema::new(
            "addDropdownMenu",
            "Adds a dropdown menu with the given options",
            object(
                json!({
                    "options": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "value": {"type": "string"},
                                "text": {"type": "string"},
                            },
                        },
                    },
                    "selectId": string("Optional select ID"),
                    "className": string("Optional CSS class"),
                    "elementId": parent_id(),
                }),
                &["options"],
            ),
        ),
        // Structure
        ToolSchema::new(
            "changeElementOrder",
            "Reorders elements; unlisted elements keep their order after the listed ones",
            object(
                json!({"elementIds": {"type": "array", "items": {"type": "string"}}}),
                &["elementIds"],
            ),
        ),
        ToolSchema::new(
            "insertElementBefore",
            "Inserts a new element before a target element",
            object(
                json!({"newElement": new_element(), "targetId": string("ID of the target element")}),
                &["newElement", "targetId"],
            ),
        ),
        ToolSchema::new(
            "insertElementAfter",
            "Inserts a new element after a target element",
            object(
                json!({"newElement": new_element(), "targetId": string("ID of the target element")}),
                &["newElement", "targetId"],
            ),
        ),
        ToolSchema::new(
            "moveElement",
            "Moves an element relative to a target element",
            object(
                json!({
                    "elementId": string("ID of the element to move"),
                    "targetId": string("ID of the target element"),
                    "position": {"type": "string", "enum": ["before", "after", "prepend", "append"]},
                }),
                &["elementId", "targetId", "position"],
            ),
        ),
        ToolSchema::new(
            "deleteElement",
            "Deletes an element and everything inside it",
            object(json!({"elementId": string("ID of the element")}), &["elementId"]),
        ),
        ToolSchema::new(
            "listPageElements",
            "Lists every element on the page with a short text preview",
            None,
        ),
        ToolSchema::new(
            "getElementInfo",
            "Looks up one element, falling back to a case-insensitive match",
            object(json!({"elementId": string("ID of the element")}), &["elementId"]),
        ),
        // Style
        ToolSchema::new(
            "changeTextStyle",
            "Applies CSS properties to an element",
            object(
                json!({
                    "elementId": string("ID of the element"),
                    "styles": {"type": "object", "description": "CSS properties in camelCase or kebab-case"},
                }),
                &["elementId", "styles"],
            ),
        ),
        ToolSchema::new(
            "formatTextContent",
            "Formats text: align-*, color-* and size-* apply to the whole element; bold, italic and underline need a selection",
            object(
                json!({
                    "elementId": string("ID of the element"),
                    "format": string("align-left|align-center|align-right|align-justify|color-<css>|size-<css>|bold|italic|underline"),
                    "selection": {
                        "type": "object",
                        "properties": {
                            "start": {"type": "integer"},
                            "end": {"type": "integer"},
                        },
                    },
                }),
                &["elementId", "format"],
            ),
        ),
        // Layout
        ToolSchema::new(
            "createLayoutContainer",
            "Creates a flex or grid container",
            object(
                json!({
                    "containerId": string("Optional container ID"),
                    "type": {"type": "string", "enum": ["flex", "grid"]},
                    "elementId": parent_id(),
                }),
                &["type"],
            ),
        ),
        ToolSchema::new(
            "createColumnLayout",
            "Turns a container into a responsive column layout",
            object(
                json!({
                    "containerId": string("ID of the container"),
                    "columns": {"type": "integer", "description": "Number of columns"},
                    "gap": string("Gap between columns, e.g. 20px"),
                    "breakpoints": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "maxWidth": {"type": "string"},
                                "columns": {"type": "integer"},
                            },
                        },
                    },
                }),
                &["containerId"],
            ),
        ),
        ToolSchema::new(
            "createGridLayout",
            "Turns a container into a CSS grid",
            object(
                json!({
                    "containerId": string("ID of the container"),
                    "rows": {"description": "Row count, list of track sizes or template string"},
                    "columns": {"description": "Column count, list of track sizes or template string"},
                    "areas": {"type": "array", "items": {"type": "string"}},
                    "gap": string("Gap between cells"),
                }),
                &["containerId"],
            ),
        ),
        ToolSchema::new(
            "addElementToLayout",
            "Adds a new element to a layout container with layout positioning",
            object(
                json!({
                    "element": {
                        "type": "object",
                        "properties": {
                            "type": {"type": "string", "enum": ["text", "div", "heading", "button", "image", "custom"]},
                            "content": {"type": "string"},
                            "id": {"type": "string"},
                            "className": {"type": "string"},
                            "styles": {"type": "object"},
                            "level": {"type": "integer"},
                            "src": {"type": "string"},
                            "alt": {"type": "string"},
                            "tagName": {"type": "string"},
                        },
                        "required": ["type"],
                    },
                    "containerId": string("ID of the layout container"),
                    "position": {
                        "type": "object",
                        "properties": {
                            "row": {"type": "string"},
                            "column": {"type": "string"},
                            "area": {"type": "string"},
                            "order": {"type": "integer"},
                            "grow": {"type": "number"},
                            "shrink": {"type": "number"},
                            "basis": {"type": "string"},
                        },
                    },
                }),
                &["element", "containerId"],
            ),
        ),
        ToolSchema::new(
            "setResponsiveRules",
            "Applies styles to an element under media conditions",
            object(
                json!({
                    "elementId": string("ID of the element"),
                    "rules": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "maxWidth": {"type": "string"},
                                "minWidth": {"type": "string"},
                                "media": {"type": "string"},
                                "styles": {"type": "object"},
                            },
                        },
                    },
                }),
                &["elementId", "rules"],
            ),
        ),
        ToolSchema::new(
            "placeInGridCell",
            "Moves an existing element into a grid container cell",
            object(
                json!({
                    "elementId": string("ID of the element to place"),
                    "containerId": string("ID of the grid container"),
                    "row": string("grid-row value"),
                    "column": string("grid-column value"),
                    "area": string("Named grid area"),
                }),
                &["elementId", "containerId"],
            ),
        ),
        // Images
        ToolSchema::new(
            "generateImage",
            "Generates an image from a prompt and adds it to the page",
            object(
                json!({
                    "prompt": string("Description of the image"),
                    "size": {"type": "string", "enum": ["1024x1024", "1792x1024", "1024x1792"]},
                    "quality": {"type": "string", "enum": ["standard", "hd"]},
                    "style": {"type": "string", "enum": ["vivid", "natural"]},
                    "elementId": parent_id(),
                }),
                &["prompt"],
            ),
        ),
        ToolSchema::new(
            "createImagePlaceholder",
            "Adds a grey placeholder box for an image",
            object(
                json!({
                    "text": string("Placeholder label"),
                    "width": string("CSS width, default 300px"),
                    "height": string("CSS height, default 200px"),
                    "elementId": parent_id(),
                }),
                &[],
            ),
        ),
        ToolSchema::new(
            "resizeImage",
            "Resizes an image or image placeholder",
            object(
                json!({
                    "elementId": string("ID of the image"),
                    "width": string("CSS width"),
                    "height": string("CSS height"),
                }),
                &["elementId"],
            ),
        ),
        ToolSchema::new(
            "alignImage",
            "Aligns an image horizontally",
            object(
                json!({
                    "elementId": string("ID of the image"),
                    "alignment": {"type": "string", "enum": ["left", "center", "right"]},
                }),
                &["elementId", "alignment"],
            ),
        ),
        ToolSchema::new(
            "deleteImage",
            "Deletes an image, placeholder or generated image container",
            object(json!({"elementId": string("ID of the image")}), &["elementId"]),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_definitions_are_functions() {
        let tools = tool_definitions();
        let tools = tools.as_array().unwrap();
        assert_eq!(tools.len(), catalog().len());
        assert!(tools.iter().all(|t| t["type"] == "function"));
    }

    #[test]
    fn test_parameterless_tool_omits_parameters() {
        let list = catalog().iter().find(|s| s.name == "listPageElements").unwrap();
        let value = serde_json::to_value(list).unwrap();
        assert!(value.get("parameters").is_none());
    }

    #[test]
    fn test_required_fields_exist_in_properties() {
        for schema in catalog() {
            let Some(parameters) = &schema.parameters else { continue };
            for required in parameters["required"].as_array().unwrap() {
                let key = required.as_str().unwrap();
                assert!(
                    parameters["properties"].get(key).is_some(),
                    "{} requires unknown property {}",
                    schema.name,
                    key
                );
            }
        }
    }
}
