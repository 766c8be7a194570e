//! Element model
//!
//! One addressable unit of page content. Elements are owned by the
//! [`ElementRegistry`](super::ElementRegistry); everything else reads them.

use serde::{Deserialize, Serialize};

/// Kind of page element
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    Heading1,
    Heading2,
    Heading3,
    Paragraph,
    Button,
    Input,
    Select,
    Div,
    Image,
    Custom,
}

impl ElementKind {
    /// Heading for a level, clamped to 1..=3
    pub fn heading(level: u8) -> Self {
        match level {
            0 | 1 => ElementKind::Heading1,
            2 => ElementKind::Heading2,
            _ => ElementKind::Heading3,
        }
    }

    /// Prefix used when generating ids for this kind
    pub fn id_prefix(&self) -> &'static str {
        match self {
            ElementKind::Heading1 | ElementKind::Heading2 | ElementKind::Heading3 => "heading",
            ElementKind::Paragraph => "text",
            ElementKind::Button => "button",
            ElementKind::Input => "input",
            ElementKind::Select => "select",
            ElementKind::Div => "div",
            ElementKind::Image => "image",
            ElementKind::Custom => "custom",
        }
    }

    /// Default HTML tag
    pub fn tag_name(&self) -> &'static str {
        match self {
            ElementKind::Heading1 => "h1",
            ElementKind::Heading2 => "h2",
            ElementKind::Heading3 => "h3",
            ElementKind::Paragraph => "p",
            ElementKind::Button => "button",
            ElementKind::Input => "input",
            ElementKind::Select => "select",
            ElementKind::Div | ElementKind::Custom => "div",
            ElementKind::Image => "img",
        }
    }

    /// Elements that never have content or children
    pub fn is_void(&self) -> bool {
        matches!(self, ElementKind::Input | ElementKind::Image)
    }
}

impl std::fmt::Display for ElementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.tag_name())
    }
}

/// One `<option>` of a select element
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectOption {
    pub value: String,
    pub text: String,
}

/// Layout flavour of a container
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutKind {
    Flex,
    Grid,
    Columns,
}

impl std::fmt::Display for LayoutKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LayoutKind::Flex => write!(f, "flex"),
            LayoutKind::Grid => write!(f, "grid"),
            LayoutKind::Columns => write!(f, "columns"),
        }
    }
}

/// Layout metadata persisted on a container so later placements know
/// how to position children
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutMeta {
    pub kind: LayoutKind,
    /// Class applied to every child of a column layout
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
}

/// Image role of an element: a static placeholder, or a generated
/// image container and its resolution state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageStatus {
    Placeholder,
    Pending,
    Ready,
    Failed,
}

/// A page element
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Element {
    /// Unique id; an empty id is replaced by a generated one on insertion
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ElementKind,
    /// Text, or inner HTML when `content_is_html` is set
    pub content: Option<String>,
    #[serde(default)]
    pub content_is_html: bool,
    pub class_name: Option<String>,
    pub placeholder: Option<String>,
    pub input_type: Option<String>,
    #[serde(default)]
    pub options: Vec<SelectOption>,
    pub src: Option<String>,
    pub alt: Option<String>,
    pub tag_name: Option<String>,
    /// Containing element; `None` is the page root
    pub parent: Option<String>,
    pub layout: Option<LayoutMeta>,
    pub image_status: Option<ImageStatus>,
}

impl Element {
    pub fn new(kind: ElementKind) -> Self {
        Self {
            id: String::new(),
            kind,
            content: None,
            content_is_html: false,
            class_name: None,
            placeholder: None,
            input_type: None,
            options: Vec::new(),
            src: None,
            alt: None,
            tag_name: None,
            parent: None,
            layout: None,
            image_status: None,
        }
    }

    pub fn paragraph(text: impl Into<String>) -> Self {
        Self::new(ElementKind::Paragraph).with_content(text)
    }

    pub fn button(text: impl Into<String>) -> Self {
        Self::new(ElementKind::Button).with_content(text)
    }

    pub fn input(input_type: impl Into<String>) -> Self {
        let mut element = Self::new(ElementKind::Input);
        element.input_type = Some(input_type.into());
        element
    }

    pub fn div() -> Self {
        Self::new(ElementKind::Div)
    }

    pub fn image(src: impl Into<String>, alt: impl Into<String>) -> Self {
        let mut element = Self::new(ElementKind::Image);
        element.src = Some(src.into());
        element.alt = Some(alt.into());
        element
    }

    /// Set the id; `None` keeps the current one
    pub fn with_id(mut self, id: Option<String>) -> Self {
        if let Some(id) = id.filter(|id| !id.is_empty()) {
            self.id = id;
        }
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn with_class(mut self, class_name: Option<String>) -> Self {
        self.class_name = class_name.filter(|c| !c.is_empty());
        self
    }

    pub fn with_parent(mut self, parent: Option<String>) -> Self {
        self.parent = parent;
        self
    }

    /// Add a class, keeping any existing ones
    pub fn add_class(&mut self, class_name: &str) {
        match &mut self.class_name {
            Some(existing) if existing.split_whitespace().any(|c| c == class_name) => {}
            Some(existing) => {
                existing.push(' ');
                existing.push_str(class_name);
            }
            None => self.class_name = Some(class_name.to_string()),
        }
    }

    /// Images, placeholders and generated image containers
    pub fn is_image_like(&self) -> bool {
        self.kind == ElementKind::Image || self.image_status.is_some()
    }

    /// Tag used when rendering
    pub fn tag(&self) -> &str {
        match (&self.kind, &self.tag_name) {
            (ElementKind::Custom, Some(tag)) if !tag.is_empty() => tag,
            _ => self.kind.tag_name(),
        }
    }

    /// Visible text with markup removed
    pub fn text(&self) -> String {
        match &self.content {
            Some(content) if self.content_is_html => super::sanitize::strip_tags(content),
            Some(content) => content.clone(),
            None => String::new(),
        }
    }

    /// Text preview capped at 50 characters
    pub fn text_preview(&self) -> String {
        let text = self.text();
        if text.chars().count() > 50 {
            let head: String = text.chars().take(50).collect();
            format!("{}...", head)
        } else {
            text
        }
    }
}
