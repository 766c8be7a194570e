//! Element registry
//!
//! The ordered collection of page elements plus their style overrides.
//! Elements live in one flat vector in document order; each carries its
//! parent id, so sibling order is the vector order filtered by parent.

use super::element::Element;
use super::ids::generate_id;
use super::sanitize::{kebab_case, Sanitized};
use super::StyleMap;
use crate::{Result, VoxError};
use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use tracing::debug;

/// Placement relative to a target element
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelativePosition {
    /// Sibling immediately before the target
    Before,
    /// Sibling immediately after the target
    After,
    /// First child of the target
    Prepend,
    /// Last child of the target
    Append,
}

impl FromStr for RelativePosition {
    type Err = VoxError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "before" => Ok(RelativePosition::Before),
            "after" => Ok(RelativePosition::After),
            "prepend" => Ok(RelativePosition::Prepend),
            "append" => Ok(RelativePosition::Append),
            other => Err(VoxError::InvalidPosition(other.to_string())),
        }
    }
}

impl std::fmt::Display for RelativePosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RelativePosition::Before => write!(f, "before"),
            RelativePosition::After => write!(f, "after"),
            RelativePosition::Prepend => write!(f, "prepend"),
            RelativePosition::Append => write!(f, "append"),
        }
    }
}

/// Generated CSS owned by an element (column classes, media queries)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Stylesheet {
    pub id: String,
    pub owner: String,
    pub css: String,
}

/// The canonical store of page elements
#[derive(Debug, Default)]
pub struct ElementRegistry {
    elements: Vec<Element>,
    styles: HashMap<String, StyleMap>,
    stylesheets: Vec<Stylesheet>,
    page_style: StyleMap,
}

impl ElementRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an element, generating an id when it has none.
    ///
    /// Returns the element's id.
    pub fn add(&mut self, element: Element) -> Result<String> {
        let element = self.prepare(element)?;
        let id = element.id.clone();
        debug!("Adding {} element {}", element.kind, id);
        self.elements.push(element);
        Ok(id)
    }

    /// Remove an element, its descendants, and every style record they own.
    ///
    /// Returns the removed ids, the requested one first.
    pub fn delete(&mut self, id: &str) -> Result<Vec<String>> {
        if !self.contains(id) {
            return Err(VoxError::not_found(id));
        }

        let removed = self.subtree_ids(id);
        self.elements.retain(|e| !removed.contains(&e.id));
        for gone in &removed {
            self.styles.remove(gone);
        }
        self.stylesheets.retain(|s| !removed.contains(&s.owner));

        let mut ordered: Vec<String> = vec![id.to_string()];
        ordered.extend(removed.into_iter().filter(|r| r != id));
        debug!("Deleted {} element(s) rooted at {}", ordered.len(), id);
        Ok(ordered)
    }

    /// Put the named elements first, in the given order.
    ///
    /// Elements not named keep their relative order after them. Fails
    /// without mutating when any id is unknown.
    pub fn reorder(&mut self, ids: &[String]) -> Result<()> {
        let mut missing = Vec::new();
        for id in ids {
            if !self.contains(id) && !missing.contains(id) {
                missing.push(id.clone());
            }
        }
        if !missing.is_empty() {
            return Err(VoxError::NotFound(missing));
        }

        let mut seen = HashSet::new();
        let mut remaining = std::mem::take(&mut self.elements);
        let mut ordered = Vec::with_capacity(remaining.len());
        for id in ids {
            if !seen.insert(id.as_str()) {
                continue;
            }
            if let Some(pos) = remaining.iter().position(|e| &e.id == id) {
                ordered.push(remaining.remove(pos));
            }
        }
        ordered.extend(remaining);
        self.elements = ordered;
        Ok(())
    }

    /// Insert a new element as a sibling before or after `target_id`
    pub fn insert_relative(
        &mut self,
        element: Element,
        target_id: &str,
        position: RelativePosition,
    ) -> Result<String> {
        if !matches!(position, RelativePosition::Before | RelativePosition::After) {
            return Err(VoxError::InvalidPosition(position.to_string()));
        }
        let target_index = self
            .index_of(target_id)
            .ok_or_else(|| VoxError::not_found(target_id))?;

        let mut element = element;
        element.parent = self.elements[target_index].parent.clone();
        let element = self.prepare(element)?;
        let id = element.id.clone();

        let index = match position {
            RelativePosition::Before => target_index,
            _ => target_index + 1,
        };
        self.elements.insert(index, element);
        Ok(id)
    }

    /// Move an existing element relative to `target_id`
    pub fn move_relative(
        &mut self,
        id: &str,
        target_id: &str,
        position: RelativePosition,
    ) -> Result<()> {
        let missing: Vec<String> = [id, target_id]
            .iter()
            .filter(|candidate| !self.contains(candidate))
            .map(|candidate| candidate.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(VoxError::NotFound(missing));
        }
        if id == target_id {
            return Err(VoxError::Validation(format!(
                "Cannot move element {} relative to itself",
                id
            )));
        }
        if self.is_descendant(target_id, id) {
            return Err(VoxError::Validation(format!(
                "Cannot move element {} into its own descendant {}",
                id, target_id
            )));
        }

        let from = self.index_of(id).ok_or_else(|| VoxError::not_found(id))?;
        let mut element = self.elements.remove(from);
        let target_index = self
            .index_of(target_id)
            .ok_or_else(|| VoxError::not_found(target_id))?;

        let index = match position {
            RelativePosition::Before => {
                element.parent = self.elements[target_index].parent.clone();
                target_index
            }
            RelativePosition::After => {
                element.parent = self.elements[target_index].parent.clone();
                target_index + 1
            }
            RelativePosition::Prepend => {
                element.parent = Some(target_id.to_string());
                self.child_indices(target_id)
                    .first()
                    .copied()
                    .unwrap_or(target_index + 1)
            }
            RelativePosition::Append => {
                element.parent = Some(target_id.to_string());
                self.child_indices(target_id)
                    .last()
                    .map(|last| last + 1)
                    .unwrap_or(target_index + 1)
            }
        };
        self.elements.insert(index, element);
        Ok(())
    }

    /// Shallow-merge style properties into an element's override.
    ///
    /// Keys are normalized to kebab-case; later writes win. Returns the
    /// merged override.
    pub fn update_style(&mut self, id: &str, partial: StyleMap) -> Result<StyleMap> {
        if !self.contains(id) {
            return Err(VoxError::not_found(id));
        }
        let entry = self.styles.entry(id.to_string()).or_default();
        for (key, value) in partial {
            entry.insert(kebab_case(&key), value);
        }
        Ok(entry.clone())
    }

    /// Style override for an element; empty when none was set
    pub fn style(&self, id: &str) -> StyleMap {
        self.styles.get(id).cloned().unwrap_or_default()
    }

    /// Whether any style record is keyed by `id`
    pub fn has_style_record(&self, id: &str) -> bool {
        self.styles.contains_key(id) || self.stylesheets.iter().any(|s| s.owner == id)
    }

    /// Merge rules pulled out of ingested content. Rules for unknown ids
    /// are ignored. Returns the ids that received styles.
    pub fn apply_extracted_styles(&mut self, sanitized: &Sanitized) -> Vec<String> {
        let mut applied = Vec::new();
        for (id, styles) in &sanitized.rules {
            if self.update_style(id, styles.clone()).is_ok() && !applied.contains(id) {
                applied.push(id.clone());
            }
        }
        applied
    }

    /// Register (or replace) a stylesheet owned by an element
    pub fn set_stylesheet(
        &mut self,
        owner: &str,
        sheet_id: impl Into<String>,
        css: impl Into<String>,
    ) -> Result<()> {
        if !self.contains(owner) {
            return Err(VoxError::not_found(owner));
        }
        let sheet = Stylesheet {
            id: sheet_id.into(),
            owner: owner.to_string(),
            css: css.into(),
        };
        self.stylesheets.retain(|s| s.id != sheet.id);
        self.stylesheets.push(sheet);
        Ok(())
    }

    pub fn stylesheets(&self) -> &[Stylesheet] {
        &self.stylesheets
    }

    /// Styles of the page body
    pub fn page_style(&self) -> &StyleMap {
        &self.page_style
    }

    pub fn update_page_style(&mut self, key: &str, value: impl Into<String>) {
        self.page_style.insert(kebab_case(key), value.into());
    }

    /// All elements in document order
    pub fn list(&self) -> &[Element] {
        &self.elements
    }

    pub fn get(&self, id: &str) -> Option<&Element> {
        self.elements.iter().find(|e| e.id == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Element> {
        self.elements.iter_mut().find(|e| e.id == id)
    }

    /// Case-insensitive lookup, used as a fallback for exact misses
    pub fn find_case_insensitive(&self, id: &str) -> Option<&Element> {
        let wanted = id.to_lowercase();
        self.elements.iter().find(|e| e.id.to_lowercase() == wanted)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index_of(id).is_some()
    }

    /// Direct children of `parent` (`None` = page root) in order
    pub fn children<'a>(&'a self, parent: Option<&'a str>) -> impl Iterator<Item = &'a Element> {
        self.elements
            .iter()
            .filter(move |e| e.parent.as_deref() == parent)
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn clear(&mut self) {
        self.elements.clear();
        self.styles.clear();
        self.stylesheets.clear();
        self.page_style.clear();
    }

    /// Assign an id if needed and check identity and parent constraints
    fn prepare(&self, mut element: Element) -> Result<Element> {
        if element.id.is_empty() {
            element.id = loop {
                let candidate = generate_id(element.kind.id_prefix());
                if !self.contains(&candidate) {
                    break candidate;
                }
            };
        } else if self.contains(&element.id) {
            return Err(VoxError::DuplicateId(element.id));
        }
        if let Some(parent) = &element.parent {
            if !self.contains(parent) {
                return Err(VoxError::not_found(parent.clone()));
            }
        }
        Ok(element)
    }

    fn index_of(&self, id: &str) -> Option<usize> {
        self.elements.iter().position(|e| e.id == id)
    }

    fn child_indices(&self, parent: &str) -> Vec<usize> {
        self.elements
            .iter()
            .enumerate()
            .filter(|(_, e)| e.parent.as_deref() == Some(parent))
            .map(|(i, _)| i)
            .collect()
    }

    /// Whether `id` sits somewhere below `ancestor`
    fn is_descendant(&self, id: &str, ancestor: &str) -> bool {
        let mut current = self.get(id).and_then(|e| e.parent.clone());
        while let Some(parent) = current {
            if parent == ancestor {
                return true;
            }
            current = self.get(&parent).and_then(|e| e.parent.clone());
        }
        false
    }

    fn subtree_ids(&self, root: &str) -> HashSet<String> {
        let mut removed = HashSet::from([root.to_string()]);
        loop {
            let before = removed.len();
            for element in &self.elements {
                if let Some(parent) = &element.parent {
                    if removed.contains(parent) {
                        removed.insert(element.id.clone());
                    }
                }
            }
            if removed.len() == before {
                return removed;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::element::ElementKind;

    fn ids(registry: &ElementRegistry) -> Vec<&str> {
        registry.list().iter().map(|e| e.id.as_str()).collect()
    }

    fn registry_with(names: &[&str]) -> ElementRegistry {
        let mut registry = ElementRegistry::new();
        for name in names {
            registry
                .add(Element::paragraph(*name).with_id(Some(name.to_string())))
                .unwrap();
        }
        registry
    }

    fn style(pairs: &[(&str, &str)]) -> StyleMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_add_generates_prefixed_id() {
        let mut registry = ElementRegistry::new();
        let id = registry.add(Element::new(ElementKind::Button)).unwrap();
        assert!(id.starts_with("button-"));
        assert!(registry.get(&id).is_some());
    }

    #[test]
    fn test_add_duplicate_rejected() {
        let mut registry = registry_with(&["a"]);
        let err = registry
            .add(Element::button("x").with_id(Some("a".into())))
            .unwrap_err();
        assert_eq!(err, VoxError::DuplicateId("a".into()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_add_unknown_parent_rejected() {
        let mut registry = ElementRegistry::new();
        let err = registry
            .add(Element::paragraph("x").with_parent(Some("nope".into())))
            .unwrap_err();
        assert_eq!(err, VoxError::not_found("nope"));
    }

    #[test]
    fn test_delete_removes_styles_and_subtree() {
        let mut registry = registry_with(&["box"]);
        registry
            .add(Element::paragraph("inner").with_id(Some("inner".into())).with_parent(Some("box".into())))
            .unwrap();
        registry.update_style("box", style(&[("color", "red")])).unwrap();
        registry.update_style("inner", style(&[("color", "blue")])).unwrap();
        registry.set_stylesheet("box", "sheet-box", ".x{}").unwrap();

        let removed = registry.delete("box").unwrap();
        assert_eq!(removed, vec!["box".to_string(), "inner".to_string()]);
        assert!(registry.is_empty());
        assert!(!registry.has_style_record("box"));
        assert!(!registry.has_style_record("inner"));
        assert!(registry.stylesheets().is_empty());
    }

    #[test]
    fn test_delete_missing_is_not_found() {
        let mut registry = ElementRegistry::new();
        assert_eq!(registry.delete("ghost").unwrap_err(), VoxError::not_found("ghost"));
    }

    #[test]
    fn test_style_does_not_leak_across_id_reuse() {
        let mut registry = registry_with(&["p1"]);
        registry.update_style("p1", style(&[("color", "red")])).unwrap();
        registry.delete("p1").unwrap();
        registry
            .add(Element::paragraph("again").with_id(Some("p1".into())))
            .unwrap();

        assert!(registry.style("p1").is_empty());
        let merged = registry.update_style("p1", style(&[("margin", "0")])).unwrap();
        assert_eq!(merged, style(&[("margin", "0")]));
    }

    #[test]
    fn test_reorder_appends_unmentioned_in_original_order() {
        let mut registry = registry_with(&["a", "b", "c", "d"]);
        registry.reorder(&["c".into(), "a".into()]).unwrap();
        assert_eq!(ids(&registry), vec!["c", "a", "b", "d"]);
    }

    #[test]
    fn test_reorder_duplicates_in_request_ignored() {
        let mut registry = registry_with(&["a", "b"]);
        registry.reorder(&["b".into(), "b".into()]).unwrap();
        assert_eq!(ids(&registry), vec!["b", "a"]);
    }

    #[test]
    fn test_reorder_missing_is_all_or_nothing() {
        let mut registry = registry_with(&["x", "z"]);
        let err = registry
            .reorder(&["z".into(), "y".into(), "w".into()])
            .unwrap_err();
        assert_eq!(err, VoxError::NotFound(vec!["y".into(), "w".into()]));
        assert_eq!(ids(&registry), vec!["x", "z"]);
    }

    #[test]
    fn test_insert_relative() {
        let mut registry = registry_with(&["a", "b"]);
        registry
            .insert_relative(Element::button("go").with_id(Some("before-b".into())), "b", RelativePosition::Before)
            .unwrap();
        registry
            .insert_relative(Element::button("go").with_id(Some("after-b".into())), "b", RelativePosition::After)
            .unwrap();
        assert_eq!(ids(&registry), vec!["a", "before-b", "b", "after-b"]);
    }

    #[test]
    fn test_insert_relative_rejects_child_positions() {
        let mut registry = registry_with(&["a"]);
        let err = registry
            .insert_relative(Element::button("go"), "a", RelativePosition::Append)
            .unwrap_err();
        assert!(matches!(err, VoxError::InvalidPosition(_)));
    }

    #[test]
    fn test_insert_relative_missing_target() {
        let mut registry = ElementRegistry::new();
        let err = registry
            .insert_relative(Element::button("go"), "nope", RelativePosition::Before)
            .unwrap_err();
        assert_eq!(err, VoxError::not_found("nope"));
    }

    #[test]
    fn test_move_before_and_after() {
        let mut registry = registry_with(&["a", "b", "c"]);
        registry.move_relative("c", "a", RelativePosition::Before).unwrap();
        assert_eq!(ids(&registry), vec!["c", "a", "b"]);
        registry.move_relative("c", "b", RelativePosition::After).unwrap();
        assert_eq!(ids(&registry), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_move_prepend_and_append_reparent() {
        let mut registry = registry_with(&["box", "a", "b"]);
        registry.move_relative("a", "box", RelativePosition::Append).unwrap();
        registry.move_relative("b", "box", RelativePosition::Prepend).unwrap();

        let children: Vec<&str> = registry
            .children(Some("box"))
            .map(|e| e.id.as_str())
            .collect();
        assert_eq!(children, vec!["b", "a"]);
        assert_eq!(registry.children(None).count(), 1);
    }

    #[test]
    fn test_move_into_own_descendant_rejected() {
        let mut registry = registry_with(&["outer"]);
        registry
            .add(Element::div().with_id(Some("inner".into())).with_parent(Some("outer".into())))
            .unwrap();
        let err = registry
            .move_relative("outer", "inner", RelativePosition::Append)
            .unwrap_err();
        assert!(matches!(err, VoxError::Validation(_)));
    }

    #[test]
    fn test_move_reports_both_missing() {
        let mut registry = ElementRegistry::new();
        let err = registry
            .move_relative("a", "b", RelativePosition::Before)
            .unwrap_err();
        assert_eq!(err, VoxError::NotFound(vec!["a".into(), "b".into()]));
    }

    #[test]
    fn test_position_parsing() {
        assert_eq!("prepend".parse::<RelativePosition>().unwrap(), RelativePosition::Prepend);
        assert_eq!(
            "inside".parse::<RelativePosition>().unwrap_err(),
            VoxError::InvalidPosition("inside".into())
        );
    }

    #[test]
    fn test_update_style_merges_and_normalizes() {
        let mut registry = registry_with(&["a"]);
        registry
            .update_style("a", style(&[("fontSize", "12px"), ("color", "red")]))
            .unwrap();
        let merged = registry
            .update_style("a", style(&[("color", "blue")]))
            .unwrap();
        assert_eq!(merged, style(&[("color", "blue"), ("font-size", "12px")]));
    }

    #[test]
    fn test_update_style_missing_element() {
        let mut registry = ElementRegistry::new();
        assert!(registry.update_style("x", StyleMap::new()).is_err());
        assert!(registry.style("x").is_empty());
    }

    #[test]
    fn test_case_insensitive_lookup() {
        let registry = registry_with(&["Header"]);
        assert!(registry.get("header").is_none());
        assert_eq!(registry.find_case_insensitive("header").unwrap().id, "Header");
    }
}
