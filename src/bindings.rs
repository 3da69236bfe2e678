//! Binding placeholders - references from template fields to caller data.
//!
//! Three single-key object forms exist:
//! - `{"$bind": "inputs.name"}` binds to an input value
//! - `{"$bindAsset": "uploads.photo"}` binds to an uploaded asset
//! - `{"$bindColor": "inputs.brand"}` binds to an input color

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

use crate::diagnostics::IssuePath;

pub const BIND_KEY: &str = "$bind";
pub const BIND_ASSET_KEY: &str = "$bindAsset";
pub const BIND_COLOR_KEY: &str = "$bindColor";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindInput {
    #[serde(rename = "$bind")]
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindAsset {
    #[serde(rename = "$bindAsset")]
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindColor {
    #[serde(rename = "$bindColor")]
    pub path: String,
}

/// A template field that is either a concrete value or a placeholder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Bindable<P, T> {
    Placeholder(P),
    Literal(T),
}

impl<P, T> Bindable<P, T> {
    pub fn literal(&self) -> Option<&T> {
        match self {
            Bindable::Literal(value) => Some(value),
            Bindable::Placeholder(_) => None,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, Bindable::Placeholder(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PlaceholderKind {
    Bind,
    BindAsset,
    BindColor,
}

impl PlaceholderKind {
    /// Detection order. Kinds are checked in this sequence.
    pub const ALL: [PlaceholderKind; 3] = [
        PlaceholderKind::Bind,
        PlaceholderKind::BindAsset,
        PlaceholderKind::BindColor,
    ];

    pub fn key(self) -> &'static str {
        match self {
            PlaceholderKind::Bind => BIND_KEY,
            PlaceholderKind::BindAsset => BIND_ASSET_KEY,
            PlaceholderKind::BindColor => BIND_COLOR_KEY,
        }
    }

    /// Scope token stripped from the front of a binding path before lookup.
    pub fn scope_prefix(self) -> &'static str {
        match self {
            PlaceholderKind::Bind | PlaceholderKind::BindColor => "inputs.",
            PlaceholderKind::BindAsset => "uploads.",
        }
    }
}

/// A placeholder found in an untyped template tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placeholder<'a> {
    pub kind: PlaceholderKind,
    pub path: &'a str,
}

impl<'a> Placeholder<'a> {
    /// Recognize a single-key placeholder object whose value is a string.
    pub fn detect(value: &'a Value) -> Option<Self> {
        let map = value.as_object()?;
        if map.len() != 1 {
            return None;
        }
        PlaceholderKind::ALL.into_iter().find_map(|kind| {
            map.get(kind.key())
                .and_then(Value::as_str)
                .map(|path| Placeholder { kind, path })
        })
    }

    /// Binding path with the kind's scope prefix removed.
    pub fn lookup_path(&self) -> &'a str {
        self.path
            .strip_prefix(self.kind.scope_prefix())
            .unwrap_or(self.path)
    }
}

/// One bindable field discovered in a template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BindingField {
    pub kind: PlaceholderKind,
    pub binding_path: String,
    pub location_path: String,
}

/// List every placeholder in `template`, keeping the first location seen for
/// each `(kind, binding path)` pair.
pub fn discover_bindings(template: &Value, root: &str) -> Vec<BindingField> {
    let mut seen = BTreeSet::new();
    let mut out = Vec::new();
    walk(template, &IssuePath::root(root), &mut seen, &mut out);
    out
}

fn walk(
    value: &Value,
    location: &IssuePath,
    seen: &mut BTreeSet<(PlaceholderKind, String)>,
    out: &mut Vec<BindingField>,
) {
    if let Some(placeholder) = Placeholder::detect(value) {
        if seen.insert((placeholder.kind, placeholder.path.to_string())) {
            out.push(BindingField {
                kind: placeholder.kind,
                binding_path: placeholder.path.to_string(),
                location_path: location.to_string(),
            });
        }
        return;
    }

    match value {
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                walk(item, &location.index(index), seen, out);
            }
        }
        Value::Object(map) => {
            for (key, item) in map {
                walk(item, &location.field(key), seen, out);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_detect_requires_single_string_key() {
        let bound = json!({"$bind": "inputs.name"});
        let placeholder = Placeholder::detect(&bound).unwrap();
        assert_eq!(placeholder.kind, PlaceholderKind::Bind);
        assert_eq!(placeholder.lookup_path(), "name");

        assert!(Placeholder::detect(&json!({"$bind": "a", "x": 1})).is_none());
        assert!(Placeholder::detect(&json!({"$bind": 3})).is_none());
        assert!(Placeholder::detect(&json!("inputs.name")).is_none());
    }

    #[test]
    fn test_asset_scope_prefix() {
        let bound = json!({"$bindAsset": "uploads.photo"});
        assert_eq!(Placeholder::detect(&bound).unwrap().lookup_path(), "photo");

        // Only the kind's own scope is stripped.
        let bound = json!({"$bindAsset": "inputs.photo"});
        assert_eq!(
            Placeholder::detect(&bound).unwrap().lookup_path(),
            "inputs.photo"
        );
    }

    #[test]
    fn test_bindable_untagged() {
        let literal: Bindable<BindInput, String> = serde_json::from_value(json!("Hello")).unwrap();
        assert_eq!(literal.literal().map(String::as_str), Some("Hello"));

        let bound: Bindable<BindInput, String> =
            serde_json::from_value(json!({"$bind": "inputs.name"})).unwrap();
        assert!(bound.is_placeholder());
    }

    #[test]
    fn test_discovery_dedups_by_kind_and_path() {
        let template = json!({
            "nodes": {
                "a": {"text": {"body": {"$bind": "inputs.name"}, "color": {"$bindColor": "inputs.brand"}}},
                "b": {"text": {"body": {"$bind": "inputs.name"}}},
                "c": {"image": {"assetRef": {"$bindAsset": "uploads.photo"}}}
            },
            "list": [{"$bind": "inputs.name"}, {"$bindColor": "inputs.name"}]
        });

        let fields = discover_bindings(&template, "design");
        let summary: Vec<_> = fields
            .iter()
            .map(|f| (f.kind, f.binding_path.as_str(), f.location_path.as_str()))
            .collect();

        assert_eq!(
            summary,
            vec![
                (PlaceholderKind::Bind, "inputs.name", "design.list[0]"),
                (PlaceholderKind::BindColor, "inputs.name", "design.list[1]"),
                (PlaceholderKind::BindColor, "inputs.brand", "design.nodes.a.text.color"),
                (PlaceholderKind::BindAsset, "uploads.photo", "design.nodes.c.image.assetRef"),
            ]
        );
    }
}
