//! Binding Resolution - placeholders in, concrete render model out
//!
//! Inputs and uploads are normalized once up front. The template walk then
//! substitutes every placeholder, collecting one issue per failed binding
//! instead of stopping at the first.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::bindings::{Placeholder, PlaceholderKind};
use crate::canonical::CanonicalError;
use crate::diagnostics::{Diagnostics, IssuePath, ValidationIssue};
use crate::hashing::{compute_render_key, RenderKeyInput};
use crate::normalize::{normalize_map, normalize_value};
use crate::schema::{check_design_template, check_effects_template, is_color, BindingPolicy};
use crate::templates::{DesignTemplate, EffectsTemplate, ResolvedDesignTemplate, Scene};
use crate::validation::ValidatedTemplates;

/// Caller-supplied data that placeholders resolve against.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BindingSources {
    #[serde(default)]
    pub inputs: Map<String, Value>,
    #[serde(default)]
    pub uploads: Map<String, Value>,
}

impl BindingSources {
    pub fn new(inputs: Map<String, Value>, uploads: Map<String, Value>) -> Self {
        Self { inputs, uploads }
    }

    pub fn from_inputs(inputs: Map<String, Value>) -> Self {
        Self {
            inputs,
            uploads: Map::new(),
        }
    }
}

/// Fully resolved templates plus the normalized data that produced them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderModel {
    pub template_id: String,
    pub template_version: String,
    /// Primary scene: the first one declared.
    pub scene_id: String,
    pub design_template: ResolvedDesignTemplate,
    pub effects_template: EffectsTemplate,
    pub resolved_inputs: Map<String, Value>,
    pub resolved_uploads: Map<String, Value>,
}

/// How a renderer picks the scene to draw.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SceneSelector {
    #[default]
    First,
    Id(String),
    Group(String),
    /// Scene id, then group label, then the first scene.
    Named(String),
}

impl RenderModel {
    pub fn scene(&self, selector: &SceneSelector) -> Option<&Scene> {
        let scenes = &self.design_template.scenes;
        match selector {
            SceneSelector::First => scenes.first(),
            SceneSelector::Id(id) => scenes.iter().find(|scene| &scene.scene_id == id),
            SceneSelector::Group(group) => scenes.iter().find(|scene| &scene.group == group),
            SceneSelector::Named(name) => scenes
                .iter()
                .find(|scene| &scene.scene_id == name)
                .or_else(|| scenes.iter().find(|scene| &scene.group == name))
                .or_else(|| scenes.first()),
        }
    }

    pub fn render_key_input(
        &self,
        scene_id: &str,
        asset_content_hashes: &BTreeMap<String, String>,
    ) -> RenderKeyInput {
        RenderKeyInput {
            template_id: self.template_id.clone(),
            template_version: self.template_version.clone(),
            scene_id: scene_id.to_string(),
            resolved_inputs: self.resolved_inputs.clone(),
            asset_content_hashes: asset_content_hashes.clone(),
        }
    }

    /// Render key of the primary scene.
    pub fn render_key(
        &self,
        asset_content_hashes: &BTreeMap<String, String>,
    ) -> Result<String, CanonicalError> {
        compute_render_key(&self.render_key_input(&self.scene_id, asset_content_hashes))
    }
}

impl ValidatedTemplates {
    pub fn resolve(&self, sources: &BindingSources) -> Result<RenderModel, Diagnostics> {
        resolve_bindings(&self.design_template, &self.effects_template, sources)
    }
}

/// Resolve every placeholder of already validated templates.
#[tracing::instrument(skip_all, fields(template_id = %design_template.template_id))]
pub fn resolve_bindings(
    design_template: &DesignTemplate,
    effects_template: &EffectsTemplate,
    sources: &BindingSources,
) -> Result<RenderModel, Diagnostics> {
    let resolved_inputs = normalize_map(&sources.inputs);
    let resolved_uploads = normalize_map(&sources.uploads);

    let mut resolver = Resolver {
        inputs: &resolved_inputs,
        uploads: &resolved_uploads,
        issues: Vec::new(),
    };
    let design_value = resolver.template(design_template, "design");
    let effects_value = resolver.template(effects_template, "effects");

    let mut issues = resolver.issues;
    if !issues.is_empty() {
        tracing::debug!(issues = issues.len(), "binding resolution failed");
        return Err(Diagnostics::new(issues));
    }

    // Substituted values are taken as-is, so the concrete shape is checked again.
    issues.extend(check_design_template(&design_value, BindingPolicy::Resolved));
    issues.extend(check_effects_template(&effects_value));
    Diagnostics::check(issues)?;

    let design_template: ResolvedDesignTemplate = typed(design_value, "design")?;
    let effects_template: EffectsTemplate = typed(effects_value, "effects")?;
    let scene_id = design_template
        .primary_scene()
        .map(|scene| scene.scene_id.clone())
        .unwrap_or_default();

    tracing::debug!(scene_id = %scene_id, "bindings resolved");

    Ok(RenderModel {
        template_id: design_template.template_id.clone(),
        template_version: design_template.template_version.clone(),
        scene_id,
        design_template,
        effects_template,
        resolved_inputs,
        resolved_uploads,
    })
}

fn typed<T: serde::de::DeserializeOwned>(value: Value, root: &str) -> Result<T, Diagnostics> {
    serde_json::from_value(value)
        .map_err(|e| Diagnostics::new(vec![ValidationIssue::new(root, e.to_string())]))
}

/// Dotted lookup. Empty segments are skipped; an empty path finds nothing.
pub fn lookup_path<'v>(source: &'v Map<String, Value>, path: &str) -> Option<&'v Value> {
    let mut segments = path.split('.').filter(|segment| !segment.is_empty());
    let mut current = source.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

struct Resolver<'s> {
    inputs: &'s Map<String, Value>,
    uploads: &'s Map<String, Value>,
    issues: Vec<ValidationIssue>,
}

impl Resolver<'_> {
    fn template<T: Serialize>(&mut self, template: &T, root: &str) -> Value {
        match serde_json::to_value(template) {
            Ok(tree) => self.value(&tree, &IssuePath::root(root)),
            Err(e) => {
                self.issues.push(ValidationIssue::new(root, e.to_string()));
                Value::Null
            }
        }
    }

    fn value(&mut self, value: &Value, path: &IssuePath) -> Value {
        if let Some(placeholder) = Placeholder::detect(value) {
            return self.substitute(placeholder, path);
        }
        match value {
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .enumerate()
                    .map(|(index, item)| self.value(item, &path.index(index)))
                    .collect(),
            ),
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(key, item)| (key.clone(), self.value(item, &path.field(key))))
                    .collect(),
            ),
            scalar => normalize_value(scalar),
        }
    }

    fn substitute(&mut self, placeholder: Placeholder<'_>, path: &IssuePath) -> Value {
        let raw = placeholder.path;
        match placeholder.kind {
            PlaceholderKind::Bind => match lookup_path(self.inputs, placeholder.lookup_path()) {
                Some(found) => found.clone(),
                None => self.fail(path, format!("Missing binding value for '{raw}'")),
            },
            PlaceholderKind::BindAsset => match lookup_path(self.uploads, placeholder.lookup_path()) {
                Some(Value::String(asset)) if !asset.is_empty() => Value::String(asset.clone()),
                _ => self.fail(path, format!("Missing asset binding value for '{raw}'")),
            },
            PlaceholderKind::BindColor => match lookup_path(self.inputs, placeholder.lookup_path()) {
                Some(Value::String(color)) if is_color(color) => Value::String(color.clone()),
                _ => self.fail(
                    path,
                    format!("Binding '{raw}' must resolve to a color in #RRGGBB or #RRGGBBAA format"),
                ),
            },
        }
    }

    fn fail(&mut self, path: &IssuePath, message: String) -> Value {
        self.issues.push(path.issue(message));
        Value::Null
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::validate_templates;
    use serde_json::json;

    fn validated() -> ValidatedTemplates {
        let design = json!({
            "spec": "personalizer.design.v1",
            "templateId": "mug",
            "templateVersion": "1.0.0",
            "scenes": [
                {
                    "sceneId": "thumb",
                    "group": "Thumb",
                    "canvas": {"size": {"w": 256, "h": 256, "unit": "px"}},
                    "background": [],
                    "overlay": [],
                    "design": {"$ref": "node:name"},
                    "designOverlay": [{"$ref": "node:photo"}]
                },
                {
                    "sceneId": "print",
                    "group": "Print",
                    "canvas": {"size": {"w": 2048, "h": 2048, "unit": "px"}},
                    "background": [],
                    "overlay": [],
                    "design": {"$ref": "node:name"},
                    "designOverlay": []
                }
            ],
            "nodes": {
                "name": {
                    "id": "name",
                    "type": "text",
                    "rect": {"x": 0, "y": 0, "w": 100, "h": 10, "unit": "pct"},
                    "text": {
                        "body": {"$bind": "inputs.name"},
                        "fontRef": "main",
                        "size": 24,
                        "color": {"$bindColor": "inputs.brand"}
                    }
                },
                "photo": {
                    "id": "photo",
                    "type": "image",
                    "rect": {"x": 0, "y": 0, "w": 50, "h": 50, "unit": "pct"},
                    "image": {"assetRef": {"$bindAsset": "uploads.photo"}}
                }
            }
        });
        let effects = json!({
            "spec": "personalizer.effects.v1",
            "templateId": "mug",
            "templateVersion": "1.0.0",
            "chains": [{
                "chainId": "tint",
                "steps": [{"operation": "core.tint", "params": {"color": {"$bindColor": "brand"}}}]
            }]
        });
        validate_templates(&design, &effects).unwrap()
    }

    fn sources(inputs: Value, uploads: Value) -> BindingSources {
        BindingSources::new(
            inputs.as_object().cloned().unwrap_or_default(),
            uploads.as_object().cloned().unwrap_or_default(),
        )
    }

    #[test]
    fn test_lookup_path() {
        let source = json!({"a": {"b": {"c": 1}}, "flat": "x"});
        let source = source.as_object().unwrap();
        assert_eq!(lookup_path(source, "a.b.c"), Some(&json!(1)));
        assert_eq!(lookup_path(source, "a..b.c"), Some(&json!(1)));
        assert_eq!(lookup_path(source, "flat"), Some(&json!("x")));
        assert_eq!(lookup_path(source, "flat.deeper"), None);
        assert_eq!(lookup_path(source, "a.missing"), None);
        assert_eq!(lookup_path(source, ""), None);
    }

    #[test]
    fn test_resolves_all_placeholders() {
        let model = validated()
            .resolve(&sources(
                json!({"name": "Kero\r\n", "brand": "#aabbcc"}),
                json!({"photo": "https://cdn.example.com/p.png"}),
            ))
            .unwrap();

        assert_eq!(model.scene_id, "thumb");
        assert_eq!(model.resolved_inputs["name"], json!("Kero\n"));

        let rendered = serde_json::to_value(&model).unwrap();
        assert_eq!(rendered["designTemplate"]["nodes"]["name"]["text"]["body"], "Kero\n");
        assert_eq!(rendered["designTemplate"]["nodes"]["name"]["text"]["color"], "#aabbcc");
        assert_eq!(
            rendered["designTemplate"]["nodes"]["photo"]["image"]["assetRef"],
            "https://cdn.example.com/p.png"
        );
        assert_eq!(
            rendered["effectsTemplate"]["chains"][0]["steps"][0]["params"]["color"],
            "#aabbcc"
        );
        assert!(crate::bindings::discover_bindings(&rendered, "model").is_empty());
        assert_eq!(rendered["designTemplate"]["nodes"]["name"]["text"]["size"], json!(24));
        assert_eq!(
            rendered["designTemplate"]["scenes"][0]["canvas"]["size"],
            json!({"w": 256, "h": 256, "unit": "px"})
        );
    }

    #[test]
    fn test_failures_accumulate_across_templates() {
        let err = validated()
            .resolve(&sources(json!({"brand": "not-a-color"}), json!({"photo": ""})))
            .unwrap_err();
        let found: Vec<_> = err
            .iter()
            .map(|issue| (issue.path.as_str(), issue.message.as_str()))
            .collect();
        assert_eq!(
            found,
            vec![
                (
                    "design.nodes.name.text.body",
                    "Missing binding value for 'inputs.name'"
                ),
                (
                    "design.nodes.name.text.color",
                    "Binding 'inputs.brand' must resolve to a color in #RRGGBB or #RRGGBBAA format"
                ),
                (
                    "design.nodes.photo.image.assetRef",
                    "Missing asset binding value for 'uploads.photo'"
                ),
                (
                    "effects.chains[0].steps[0].params.color",
                    "Binding 'brand' must resolve to a color in #RRGGBB or #RRGGBBAA format"
                ),
            ]
        );
    }

    #[test]
    fn test_bound_value_with_wrong_type_is_reported() {
        let err = validated()
            .resolve(&sources(
                json!({"name": 42, "brand": "#AABBCC"}),
                json!({"photo": "p.png"}),
            ))
            .unwrap_err();
        assert_eq!(err.len(), 1);
        assert_eq!(err.issues()[0].path, "design.nodes.name.text.body");
        assert_eq!(err.issues()[0].message, "Expected string, received number");
    }

    #[test]
    fn test_scene_selection() {
        let model = validated()
            .resolve(&sources(
                json!({"name": "Kero", "brand": "#AABBCC"}),
                json!({"photo": "p.png"}),
            ))
            .unwrap();

        let pick = |selector: SceneSelector| model.scene(&selector).map(|s| s.scene_id.as_str());
        assert_eq!(pick(SceneSelector::First), Some("thumb"));
        assert_eq!(pick(SceneSelector::Id("print".into())), Some("print"));
        assert_eq!(pick(SceneSelector::Group("Print".into())), Some("print"));
        assert_eq!(pick(SceneSelector::Id("cart".into())), None);
        assert_eq!(pick(SceneSelector::Named("Print".into())), Some("print"));
        assert_eq!(pick(SceneSelector::Named("cart".into())), Some("thumb"));
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let templates = validated();
        let src = sources(
            json!({"name": " Kero ", "brand": "#AABBCC", "extra": {"z": 1, "a": [1, 2]}}),
            json!({"photo": "p.png"}),
        );
        let a = serde_json::to_string(&templates.resolve(&src).unwrap()).unwrap();
        let b = serde_json::to_string(&templates.resolve(&src).unwrap()).unwrap();
        assert_eq!(a, b);
    }
}
