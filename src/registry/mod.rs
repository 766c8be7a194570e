//! Element registry
//!
//! Owns page elements, their identity and structural position, and their
//! per-element style overrides. Tool handlers are the only writers.

pub mod element;
pub mod ids;
pub mod render;
pub mod sanitize;
pub mod store;

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

pub use element::{Element, ElementKind, ImageStatus, LayoutKind, LayoutMeta, SelectOption};
pub use ids::generate_id;
pub use store::{ElementRegistry, RelativePosition, Stylesheet};

/// CSS property -> value, kebab-case keys
pub type StyleMap = BTreeMap<String, String>;

/// Registry shared between concurrently running handlers.
///
/// Locks are short and never held across an await point.
pub type SharedRegistry = Arc<Mutex<ElementRegistry>>;

pub fn shared_registry() -> SharedRegistry {
    Arc::new(Mutex::new(ElementRegistry::new()))
}
