//! Structural Schema - strict shape checks over untyped JSON
//!
//! Every violation is reported with its path; checking never stops at the
//! first problem. The same walk runs under two policies: authored templates
//! may carry binding placeholders in bindable fields, resolved templates may
//! not.

use serde_json::{Map, Value};

use crate::bindings::PlaceholderKind;
use crate::diagnostics::{IssuePath, ValidationIssue};
use crate::templates::{
    Anchor, Unit, DESIGN_SPEC_ID, EFFECTS_SPEC_ID, EFFECT_REF_PREFIX, NODE_REF_PREFIX, NODE_TYPES,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingPolicy {
    /// Bindable fields accept their placeholder form.
    Template,
    /// Bindable fields must be concrete.
    Resolved,
}

const DESIGN_KEYS: &[&str] = &["spec", "templateId", "templateVersion", "assets", "scenes", "nodes"];
const ASSETS_KEYS: &[&str] = &["fonts", "images"];
const ASSET_ENTRY_KEYS: &[&str] = &["id", "src", "metadata"];
const SCENE_KEYS: &[&str] = &[
    "sceneId",
    "group",
    "canvas",
    "background",
    "overlay",
    "design",
    "designOverlay",
];
const CANVAS_KEYS: &[&str] = &["size", "dpi"];
const SIZE_KEYS: &[&str] = &["w", "h", "unit"];
const RECT_KEYS: &[&str] = &["x", "y", "w", "h", "unit"];
const POINT_KEYS: &[&str] = &["x", "y", "unit"];
const SCALE_KEYS: &[&str] = &["x", "y"];
const TRANSFORM_KEYS: &[&str] = &["translate", "scale", "rotate", "freeTransform"];
const LOCKS_KEYS: &[&str] = &["locked", "gravityLocked", "rotateLocked"];
const NODE_BASE_KEYS: &[&str] = &[
    "id",
    "type",
    "rect",
    "anchor",
    "opacity",
    "blendMode",
    "backgroundColor",
    "transform",
    "locks",
    "effects",
];
const IMAGE_KEYS: &[&str] = &["assetRef"];
const TEXT_KEYS: &[&str] = &[
    "body",
    "fontRef",
    "size",
    "color",
    "stroke",
    "shadow",
    "align",
    "maxLength",
    "autoFit",
];
const REF_KEYS: &[&str] = &["$ref"];
const EFFECTS_KEYS: &[&str] = &["spec", "templateId", "templateVersion", "chains"];
const CHAIN_KEYS: &[&str] = &["chainId", "name", "steps"];
const STEP_KEYS: &[&str] = &["operation", "params", "enabled", "opacity", "ui"];
const STEP_UI_KEYS: &[&str] = &[
    "label",
    "controlType",
    "min",
    "max",
    "minLength",
    "maxLength",
    "group",
];

/// `#RRGGBB` or `#RRGGBBAA`, hex digits in either case.
pub fn is_color(value: &str) -> bool {
    match value.strip_prefix('#') {
        Some(hex) => (hex.len() == 6 || hex.len() == 8) && hex.chars().all(|c| c.is_ascii_hexdigit()),
        None => false,
    }
}

/// Effect operations live in the reserved `core.` namespace.
pub fn is_operation_name(value: &str) -> bool {
    match value.strip_prefix("core.") {
        Some(rest) => {
            !rest.is_empty()
                && rest
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        }
        None => false,
    }
}

/// Check a design template rooted at `design`.
pub fn check_design_template(value: &Value, policy: BindingPolicy) -> Vec<ValidationIssue> {
    let mut checker = Checker::new(policy);
    checker.design_template(value, &IssuePath::root("design"));
    checker.issues
}

/// Check an effects template rooted at `effects`.
pub fn check_effects_template(value: &Value) -> Vec<ValidationIssue> {
    let mut checker = Checker::new(BindingPolicy::Template);
    checker.effects_template(value, &IssuePath::root("effects"));
    checker.issues
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn quoted_list(names: &[&str]) -> String {
    names
        .iter()
        .map(|name| format!("'{name}'"))
        .collect::<Vec<_>>()
        .join(" | ")
}

struct Checker {
    policy: BindingPolicy,
    issues: Vec<ValidationIssue>,
}

type Check = fn(&mut Checker, &Value, &IssuePath);

impl Checker {
    fn new(policy: BindingPolicy) -> Self {
        Self {
            policy,
            issues: Vec::new(),
        }
    }

    fn push(&mut self, path: &IssuePath, message: impl Into<String>) {
        self.issues.push(path.issue(message));
    }

    fn mismatch(&mut self, expected: &str, value: &Value, path: &IssuePath) {
        self.push(
            path,
            format!("Expected {expected}, received {}", type_name(value)),
        );
    }

    // --- primitives ---

    fn object<'v>(
        &mut self,
        value: &'v Value,
        path: &IssuePath,
        allowed: &[&str],
    ) -> Option<&'v Map<String, Value>> {
        let Some(map) = value.as_object() else {
            self.mismatch("object", value, path);
            return None;
        };
        let unknown: Vec<String> = map
            .keys()
            .filter(|key| !allowed.contains(&key.as_str()))
            .map(|key| format!("'{key}'"))
            .collect();
        if !unknown.is_empty() {
            self.push(
                path,
                format!("Unrecognized key(s) in object: {}", unknown.join(", ")),
            );
        }
        Some(map)
    }

    fn required(&mut self, map: &Map<String, Value>, key: &str, path: &IssuePath, check: Check) {
        let field_path = path.field(key);
        match map.get(key) {
            Some(value) => check(self, value, &field_path),
            None => self.push(&field_path, "Required"),
        }
    }

    fn optional(&mut self, map: &Map<String, Value>, key: &str, path: &IssuePath, check: Check) {
        if let Some(value) = map.get(key) {
            check(self, value, &path.field(key));
        }
    }

    fn string<'v>(&mut self, value: &'v Value, path: &IssuePath) -> Option<&'v str> {
        let text = value.as_str();
        if text.is_none() {
            self.mismatch("string", value, path);
        }
        text
    }

    fn any_string(&mut self, value: &Value, path: &IssuePath) {
        self.string(value, path);
    }

    fn non_empty_string(&mut self, value: &Value, path: &IssuePath) {
        if let Some(text) = self.string(value, path) {
            if text.is_empty() {
                self.push(path, "String must contain at least 1 character(s)");
            }
        }
    }

    fn number(&mut self, value: &Value, path: &IssuePath) -> Option<f64> {
        let number = value.as_f64();
        if number.is_none() {
            self.mismatch("number", value, path);
        }
        number
    }

    fn any_number(&mut self, value: &Value, path: &IssuePath) {
        self.number(value, path);
    }

    fn percent(&mut self, value: &Value, path: &IssuePath) {
        if let Some(number) = self.number(value, path) {
            if number < 0.0 {
                self.push(path, "Number must be greater than or equal to 0");
            } else if number > 100.0 {
                self.push(path, "Number must be less than or equal to 100");
            }
        }
    }

    fn boolean(&mut self, value: &Value, path: &IssuePath) {
        if !value.is_boolean() {
            self.mismatch("boolean", value, path);
        }
    }

    fn record(&mut self, value: &Value, path: &IssuePath) {
        if !value.is_object() {
            self.mismatch("object", value, path);
        }
    }

    fn literal(&mut self, value: &Value, path: &IssuePath, expected: &str) {
        if value.as_str() != Some(expected) {
            self.push(path, format!("Invalid literal value, expected \"{expected}\""));
        }
    }

    fn one_of(&mut self, value: &Value, path: &IssuePath, names: &[&str]) {
        if let Some(text) = self.string(value, path) {
            if !names.contains(&text) {
                self.push(
                    path,
                    format!(
                        "Invalid enum value. Expected {}, received '{text}'",
                        quoted_list(names)
                    ),
                );
            }
        }
    }

    fn unit(&mut self, value: &Value, path: &IssuePath) {
        self.one_of(value, path, &Unit::NAMES);
    }

    fn anchor(&mut self, value: &Value, path: &IssuePath) {
        self.one_of(value, path, &Anchor::NAMES);
    }

    fn semver(&mut self, value: &Value, path: &IssuePath) {
        if let Some(text) = self.string(value, path) {
            if semver::Version::parse(text).is_err() {
                self.push(path, "Invalid semver");
            }
        }
    }

    fn color(&mut self, value: &Value, path: &IssuePath) {
        if let Some(text) = self.string(value, path) {
            if !is_color(text) {
                self.push(path, "Invalid color hex format");
            }
        }
    }

    fn array(&mut self, value: &Value, path: &IssuePath, min: usize, item: Check) {
        let Some(items) = value.as_array() else {
            self.mismatch("array", value, path);
            return;
        };
        if items.len() < min {
            self.push(path, format!("Array must contain at least {min} element(s)"));
        }
        for (index, entry) in items.iter().enumerate() {
            item(self, entry, &path.index(index));
        }
    }

    fn reference(&mut self, value: &Value, path: &IssuePath, prefix: &str) {
        let Some(map) = self.object(value, path, REF_KEYS) else {
            return;
        };
        let ref_path = path.field("$ref");
        let Some(raw) = map.get("$ref") else {
            self.push(&ref_path, "Required");
            return;
        };
        if let Some(text) = self.string(raw, &ref_path) {
            let valid = text
                .strip_prefix(prefix)
                .is_some_and(|id| !id.is_empty() && !id.contains(':'));
            if !valid {
                self.push(&ref_path, format!("Expected {prefix}<id>"));
            }
        }
    }

    fn node_ref(&mut self, value: &Value, path: &IssuePath) {
        self.reference(value, path, NODE_REF_PREFIX);
    }

    fn node_refs(&mut self, value: &Value, path: &IssuePath) {
        self.array(value, path, 0, Self::node_ref);
    }

    fn effect_ref(&mut self, value: &Value, path: &IssuePath) {
        self.reference(value, path, EFFECT_REF_PREFIX);
    }

    // --- bindable fields ---

    /// Placeholder form of a bindable field. Returns true when `value` was
    /// an object and has been handled here.
    fn placeholder(&mut self, value: &Value, path: &IssuePath, kind: PlaceholderKind) -> bool {
        if !value.is_object() {
            return false;
        }
        if self.policy == BindingPolicy::Resolved {
            self.mismatch("string", value, path);
            return true;
        }
        if let Some(map) = self.object(value, path, &[kind.key()]) {
            self.required(map, kind.key(), path, Self::non_empty_string);
        }
        true
    }

    fn text_body(&mut self, value: &Value, path: &IssuePath) {
        if !self.placeholder(value, path, PlaceholderKind::Bind) {
            self.any_string(value, path);
        }
    }

    fn asset_ref(&mut self, value: &Value, path: &IssuePath) {
        if !self.placeholder(value, path, PlaceholderKind::BindAsset) {
            self.non_empty_string(value, path);
        }
    }

    fn color_value(&mut self, value: &Value, path: &IssuePath) {
        if !self.placeholder(value, path, PlaceholderKind::BindColor) {
            self.color(value, path);
        }
    }

    // --- design ---

    fn design_template(&mut self, value: &Value, path: &IssuePath) {
        let Some(map) = self.object(value, path, DESIGN_KEYS) else {
            return;
        };
        self.required(map, "spec", path, |c, v, p| c.literal(v, p, DESIGN_SPEC_ID));
        self.required(map, "templateId", path, Self::non_empty_string);
        self.required(map, "templateVersion", path, Self::semver);
        self.optional(map, "assets", path, Self::assets);
        self.required(map, "scenes", path, |c, v, p| c.array(v, p, 1, Self::scene));
        self.required(map, "nodes", path, Self::nodes);
    }

    fn assets(&mut self, value: &Value, path: &IssuePath) {
        if let Some(map) = self.object(value, path, ASSETS_KEYS) {
            self.optional(map, "fonts", path, |c, v, p| c.array(v, p, 0, Self::asset_entry));
            self.optional(map, "images", path, |c, v, p| c.array(v, p, 0, Self::asset_entry));
        }
    }

    fn asset_entry(&mut self, value: &Value, path: &IssuePath) {
        if let Some(map) = self.object(value, path, ASSET_ENTRY_KEYS) {
            self.required(map, "id", path, Self::non_empty_string);
            self.required(map, "src", path, Self::non_empty_string);
            self.optional(map, "metadata", path, Self::record);
        }
    }

    fn scene(&mut self, value: &Value, path: &IssuePath) {
        let Some(map) = self.object(value, path, SCENE_KEYS) else {
            return;
        };
        self.required(map, "sceneId", path, Self::non_empty_string);
        self.required(map, "group", path, Self::non_empty_string);
        self.required(map, "canvas", path, Self::canvas);
        self.required(map, "background", path, Self::node_refs);
        self.required(map, "overlay", path, Self::node_refs);
        self.required(map, "design", path, Self::node_ref);
        self.required(map, "designOverlay", path, Self::node_refs);
    }

    fn canvas(&mut self, value: &Value, path: &IssuePath) {
        if let Some(map) = self.object(value, path, CANVAS_KEYS) {
            self.required(map, "size", path, Self::canvas_size);
            self.optional(map, "dpi", path, Self::any_number);
        }
    }

    fn canvas_size(&mut self, value: &Value, path: &IssuePath) {
        if let Some(map) = self.object(value, path, SIZE_KEYS) {
            self.required(map, "w", path, Self::any_number);
            self.required(map, "h", path, Self::any_number);
            self.required(map, "unit", path, Self::unit);
        }
    }

    fn nodes(&mut self, value: &Value, path: &IssuePath) {
        let Some(map) = value.as_object() else {
            self.mismatch("object", value, path);
            return;
        };
        for (key, node) in map {
            let node_path = path.field(key);
            if key.is_empty() {
                self.push(&node_path, "String must contain at least 1 character(s)");
            }
            self.node(node, &node_path);
        }
    }

    fn node(&mut self, value: &Value, path: &IssuePath) {
        let Some(map) = value.as_object() else {
            self.mismatch("object", value, path);
            return;
        };

        let node_type = map
            .get("type")
            .and_then(Value::as_str)
            .filter(|name| NODE_TYPES.contains(name));
        let Some(node_type) = node_type else {
            self.push(
                &path.field("type"),
                format!(
                    "Invalid discriminator value. Expected {}",
                    quoted_list(&NODE_TYPES)
                ),
            );
            return;
        };

        let variant_keys: &[&str] = match node_type {
            "container" => &["children", "clipToBounds"],
            "image" => &["image"],
            "text" => &["text"],
            "fill" => &["fill"],
            _ => &["shape"],
        };
        let allowed: Vec<&str> = NODE_BASE_KEYS.iter().chain(variant_keys).copied().collect();
        let Some(map) = self.object(value, path, &allowed) else {
            return;
        };

        self.required(map, "id", path, Self::non_empty_string);
        self.required(map, "rect", path, Self::rect);
        self.optional(map, "anchor", path, Self::anchor);
        self.optional(map, "opacity", path, Self::percent);
        self.optional(map, "blendMode", path, Self::non_empty_string);
        self.optional(map, "backgroundColor", path, Self::color_value);
        self.optional(map, "transform", path, Self::transform);
        self.optional(map, "locks", path, Self::locks);
        self.optional(map, "effects", path, Self::effect_ref);

        match node_type {
            "container" => {
                self.required(map, "children", path, Self::node_refs);
                self.optional(map, "clipToBounds", path, Self::boolean);
            }
            "image" => self.required(map, "image", path, Self::image_content),
            "text" => self.required(map, "text", path, Self::text_content),
            "fill" => self.optional(map, "fill", path, Self::record),
            _ => self.optional(map, "shape", path, Self::record),
        }
    }

    fn rect(&mut self, value: &Value, path: &IssuePath) {
        if let Some(map) = self.object(value, path, RECT_KEYS) {
            for key in ["x", "y", "w", "h"] {
                self.required(map, key, path, Self::any_number);
            }
            self.required(map, "unit", path, Self::unit);
        }
    }

    fn transform(&mut self, value: &Value, path: &IssuePath) {
        let Some(map) = self.object(value, path, TRANSFORM_KEYS) else {
            return;
        };
        self.optional(map, "translate", path, |c, v, p| {
            if let Some(point) = c.object(v, p, POINT_KEYS) {
                c.required(point, "x", p, Self::any_number);
                c.required(point, "y", p, Self::any_number);
                c.required(point, "unit", p, Self::unit);
            }
        });
        self.optional(map, "scale", path, |c, v, p| {
            if let Some(scale) = c.object(v, p, SCALE_KEYS) {
                c.required(scale, "x", p, Self::any_number);
                c.required(scale, "y", p, Self::any_number);
            }
        });
        self.optional(map, "rotate", path, Self::any_number);
        self.optional(map, "freeTransform", path, Self::record);
    }

    fn locks(&mut self, value: &Value, path: &IssuePath) {
        if let Some(map) = self.object(value, path, LOCKS_KEYS) {
            for key in LOCKS_KEYS {
                self.optional(map, key, path, Self::boolean);
            }
        }
    }

    fn image_content(&mut self, value: &Value, path: &IssuePath) {
        if let Some(map) = self.object(value, path, IMAGE_KEYS) {
            self.required(map, "assetRef", path, Self::asset_ref);
        }
    }

    fn text_content(&mut self, value: &Value, path: &IssuePath) {
        let Some(map) = self.object(value, path, TEXT_KEYS) else {
            return;
        };
        self.required(map, "body", path, Self::text_body);
        self.required(map, "fontRef", path, Self::non_empty_string);
        self.required(map, "size", path, Self::any_number);
        self.required(map, "color", path, Self::color_value);
        self.optional(map, "stroke", path, Self::record);
        self.optional(map, "shadow", path, Self::record);
        self.optional(map, "align", path, Self::any_string);
        self.optional(map, "maxLength", path, Self::any_number);
        self.optional(map, "autoFit", path, Self::boolean);
    }

    // --- effects ---

    fn effects_template(&mut self, value: &Value, path: &IssuePath) {
        let Some(map) = self.object(value, path, EFFECTS_KEYS) else {
            return;
        };
        self.required(map, "spec", path, |c, v, p| c.literal(v, p, EFFECTS_SPEC_ID));
        self.required(map, "templateId", path, Self::non_empty_string);
        self.required(map, "templateVersion", path, Self::semver);
        self.required(map, "chains", path, |c, v, p| c.array(v, p, 0, Self::chain));
    }

    fn chain(&mut self, value: &Value, path: &IssuePath) {
        if let Some(map) = self.object(value, path, CHAIN_KEYS) {
            self.required(map, "chainId", path, Self::non_empty_string);
            self.optional(map, "name", path, Self::any_string);
            self.required(map, "steps", path, |c, v, p| c.array(v, p, 0, Self::step));
        }
    }

    fn step(&mut self, value: &Value, path: &IssuePath) {
        let Some(map) = self.object(value, path, STEP_KEYS) else {
            return;
        };
        self.required(map, "operation", path, |c, v, p| {
            if let Some(text) = c.string(v, p) {
                if !is_operation_name(text) {
                    c.push(p, "Operation must use the core.* namespace");
                }
            }
        });
        self.required(map, "params", path, Self::record);
        self.optional(map, "enabled", path, Self::boolean);
        self.optional(map, "opacity", path, Self::percent);
        self.optional(map, "ui", path, |c, v, p| {
            if let Some(ui) = c.object(v, p, STEP_UI_KEYS) {
                for key in ["label", "controlType", "group"] {
                    c.optional(ui, key, p, Self::any_string);
                }
                for key in ["min", "max", "minLength", "maxLength"] {
                    c.optional(ui, key, p, Self::any_number);
                }
            }
        });
    }
}
