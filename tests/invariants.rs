//! Contract Invariant Tests
//!
//! These tests verify the non-negotiable guarantees.

use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

use personalizer_core::{
    canonical_json, canonicalize, compute_render_key, discover_bindings, load_json_file,
    validate_templates, BindingSources, PipelineError, PlaceholderKind, RenderKeyInput,
    RenderPipeline,
};

fn design_template() -> Value {
    json!({
        "spec": "personalizer.design.v1",
        "templateId": "mug",
        "templateVersion": "1.0.0",
        "assets": {
            "fonts": [{"id": "main", "src": "fonts/main.woff2"}]
        },
        "scenes": [
            {
                "sceneId": "thumb",
                "group": "Thumb",
                "canvas": {"size": {"w": 512, "h": 512, "unit": "px"}, "dpi": 72},
                "background": [{"$ref": "node:bg"}],
                "overlay": [],
                "design": {"$ref": "node:root"},
                "designOverlay": []
            },
            {
                "sceneId": "print",
                "group": "Print",
                "canvas": {"size": {"w": 100, "h": 100, "unit": "pct"}, "dpi": 300},
                "background": [],
                "overlay": [],
                "design": {"$ref": "node:root"},
                "designOverlay": []
            }
        ],
        "nodes": {
            "bg": {
                "id": "bg",
                "type": "fill",
                "rect": {"x": 0, "y": 0, "w": 100, "h": 100, "unit": "pct"},
                "backgroundColor": {"$bindColor": "inputs.background"}
            },
            "root": {
                "id": "root",
                "type": "container",
                "rect": {"x": 0, "y": 0, "w": 100, "h": 100, "unit": "pct"},
                "children": [{"$ref": "node:name"}, {"$ref": "node:photo"}]
            },
            "name": {
                "id": "name",
                "type": "text",
                "rect": {"x": 10, "y": 70, "w": 80, "h": 20, "unit": "pct"},
                "anchor": "Bottom",
                "effects": {"$ref": "effect:glow"},
                "text": {
                    "body": {"$bind": "inputs.name"},
                    "fontRef": "main",
                    "size": 48,
                    "color": {"$bindColor": "inputs.ink"}
                }
            },
            "photo": {
                "id": "photo",
                "type": "image",
                "rect": {"x": 25, "y": 10, "w": 50, "h": 50, "unit": "pct"},
                "image": {"assetRef": {"$bindAsset": "uploads.photo"}}
            }
        }
    })
}

fn effects_template() -> Value {
    json!({
        "spec": "personalizer.effects.v1",
        "templateId": "mug",
        "templateVersion": "1.0.0",
        "chains": [
            {
                "chainId": "glow",
                "name": "Soft glow",
                "steps": [
                    {"operation": "core.blur", "params": {"radius": 4}},
                    {"operation": "core.tint", "params": {"color": {"$bindColor": "inputs.ink"}}, "opacity": 50}
                ]
            }
        ]
    })
}

fn object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

fn sources() -> BindingSources {
    BindingSources::new(
        object(json!({"name": "Kero", "ink": "#112233", "background": "#FFFFFFFF"})),
        object(json!({"photo": "https://cdn.example.com/u/42.png"})),
    )
}

#[test]
fn invariant_valid_templates_pass() {
    let templates = validate_templates(&design_template(), &effects_template()).unwrap();
    assert!(templates.node("name").is_some());
    assert!(templates.chain("glow").is_some());
    assert_eq!(templates.effect_chain_index.get("glow"), Some(&0));
}

#[test]
fn invariant_missing_node_reference_rejected() {
    let mut design = design_template();
    design["scenes"][0]["design"] = json!({"$ref": "node:not-found"});

    let err = validate_templates(&design, &effects_template()).unwrap_err();
    assert!(err.mentions("Referenced node 'not-found'"));
    assert_eq!(err.issues()[0].path, "design.scenes[0].design");
}

#[test]
fn invariant_missing_background_reference_rejected() {
    let mut design = design_template();
    design["scenes"][0]["background"] = json!([{"$ref": "node:not-found"}]);

    let err = validate_templates(&design, &effects_template()).unwrap_err();
    assert_eq!(err.len(), 1);
    assert!(err.mentions("Referenced node 'not-found'"));
    assert_eq!(err.issues()[0].path, "design.scenes[0].background[0]");
}

#[test]
fn invariant_missing_effect_chain_rejected() {
    let mut design = design_template();
    design["nodes"]["name"]["effects"] = json!({"$ref": "effect:not-found"});

    let err = validate_templates(&design, &effects_template()).unwrap_err();
    assert!(err.mentions("Referenced effect chain 'not-found'"));
    assert_eq!(err.issues()[0].path, "design.nodes.name.effects.$ref");
}

#[test]
fn invariant_structural_issues_accumulate() {
    let mut design = design_template();
    design["templateVersion"] = json!("one");
    design["nodes"]["name"]["text"]["color"] = json!("red");
    design["nodes"]["photo"]["surprise"] = json!(true);

    let err = validate_templates(&design, &effects_template()).unwrap_err();
    assert_eq!(err.len(), 3);
    assert!(err.mentions("Invalid semver"));
    assert!(err.mentions("Invalid color hex format"));
    assert!(err.mentions("Unrecognized key(s) in object: 'surprise'"));
}

#[test]
fn invariant_resolution_always_validates() {
    let mut design = design_template();
    design["templateId"] = json!("tumbler");

    let err = RenderPipeline::new()
        .resolve(&design, &effects_template(), &sources())
        .unwrap_err();
    match err {
        PipelineError::Validation(diagnostics) => {
            assert!(diagnostics.mentions("design.templateId 'tumbler' must match effects.templateId 'mug'"));
        }
        other => panic!("expected validation failure, got {other}"),
    }
}

#[cfg(feature = "test-hooks")]
#[test]
fn invariant_resolve_counts_a_validation() {
    use personalizer_core::pipeline::get_validation_call_count;

    let before = get_validation_call_count();
    RenderPipeline::new()
        .resolve(&design_template(), &effects_template(), &sources())
        .unwrap();
    assert!(get_validation_call_count() > before);
}

#[test]
fn invariant_no_placeholder_survives_resolution() {
    let model = RenderPipeline::new()
        .resolve(&design_template(), &effects_template(), &sources())
        .unwrap();
    let rendered = serde_json::to_value(&model).unwrap();

    assert!(discover_bindings(&rendered, "model").is_empty());
    assert_eq!(rendered["designTemplate"]["nodes"]["name"]["text"]["body"], "Kero");
    assert_eq!(rendered["designTemplate"]["nodes"]["bg"]["backgroundColor"], "#FFFFFFFF");
    assert_eq!(
        rendered["effectsTemplate"]["chains"][0]["steps"][1]["params"]["color"],
        "#112233"
    );
}

#[test]
fn invariant_text_inputs_are_normalized() {
    let mut src = sources();
    src.inputs.insert("name".into(), json!("\tKero\r\nMug  "));

    let model = RenderPipeline::new()
        .resolve(&design_template(), &effects_template(), &src)
        .unwrap();
    assert_eq!(model.resolved_inputs["name"], json!("Kero\nMug"));

    // Decomposed e + combining acute becomes the composed form.
    src.inputs.insert("name".into(), json!("Caf\u{0065}\u{0301}"));
    let model = RenderPipeline::new()
        .resolve(&design_template(), &effects_template(), &src)
        .unwrap();
    assert_eq!(model.resolved_inputs["name"], json!("Caf\u{00e9}"));
}

#[test]
fn invariant_binding_failures_accumulate() {
    let src = BindingSources::new(object(json!({"ink": "blue"})), Map::new());

    let err = RenderPipeline::new()
        .resolve(&design_template(), &effects_template(), &src)
        .unwrap_err();
    let diagnostics = match err {
        PipelineError::Resolution(diagnostics) => diagnostics,
        other => panic!("expected resolution failure, got {other}"),
    };

    assert!(diagnostics.mentions("Missing binding value for 'inputs.name'"));
    assert!(diagnostics.mentions("Missing asset binding value for 'uploads.photo'"));
    assert!(diagnostics.mentions("Binding 'inputs.background' must resolve to a color"));
    assert!(diagnostics.mentions("Binding 'inputs.ink' must resolve to a color"));
    // ink is bound in the design and in the effects chain
    assert_eq!(diagnostics.len(), 5);
}

#[test]
fn invariant_render_key_stable() {
    let pipeline = RenderPipeline::new();
    let hashes: BTreeMap<String, String> =
        [("photo".to_string(), "abc123".to_string())].into_iter().collect();

    let (_, first) = pipeline
        .render_plan(&design_template(), &effects_template(), &sources(), &hashes)
        .unwrap();

    let mut reordered = sources();
    reordered.inputs = object(json!({"background": "#FFFFFFFF", "ink": "#112233", "name": "Kero"}));
    let (_, second) = pipeline
        .render_plan(&design_template(), &effects_template(), &reordered, &hashes)
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(first.scenes.len(), 2);
    assert_ne!(first.scenes[0].render_key, first.scenes[1].render_key);

    let (_, changed) = pipeline
        .render_plan(&design_template(), &effects_template(), &sources(), &BTreeMap::new())
        .unwrap();
    assert_ne!(first.scenes[0].render_key, changed.scenes[0].render_key);
}

#[test]
fn invariant_render_key_golden() {
    let input = RenderKeyInput {
        template_id: "mug".to_string(),
        template_version: "1.0.0".to_string(),
        scene_id: "thumb".to_string(),
        resolved_inputs: object(json!({"name": "Kero\n"})),
        asset_content_hashes: [("a", "aaa"), ("b", "bbb")]
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    };
    assert_eq!(
        compute_render_key(&input).unwrap(),
        "4aab152e63cad39d3b123b7c6c6a2f2bbb942ff6f0b18ca068a118557d197aa2"
    );
}

#[test]
fn invariant_canonical_json_deterministic() {
    let obj1 = json!({"z": 1, "a": 2, "m": {"b": 1, "a": 2}});
    let obj2 = json!({"a": 2, "m": {"a": 2, "b": 1}, "z": 1});

    let c1 = canonical_json(&obj1).unwrap();
    let c2 = canonicalize(&obj2).unwrap();

    // Must be identical despite different input ordering
    assert_eq!(c1, c2);
    assert_eq!(c1, r#"{"a":2,"m":{"a":2,"b":1},"z":1}"#);
}

#[test]
fn invariant_non_finite_numbers_rejected() {
    let mut payload = BTreeMap::new();
    payload.insert("ratio", f64::NAN);
    assert!(canonical_json(&payload).is_err());
}

#[test]
fn invariant_binding_discovery_lists_each_path_once() {
    let fields = discover_bindings(&design_template(), "design");
    let listed: Vec<_> = fields
        .iter()
        .map(|f| (f.kind, f.binding_path.as_str()))
        .collect();

    assert_eq!(listed.len(), 4);
    assert!(listed.contains(&(PlaceholderKind::Bind, "inputs.name")));
    assert!(listed.contains(&(PlaceholderKind::BindAsset, "uploads.photo")));
    assert!(listed.contains(&(PlaceholderKind::BindColor, "inputs.ink")));
    assert!(listed.contains(&(PlaceholderKind::BindColor, "inputs.background")));
}

#[test]
fn invariant_templates_load_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let design_path = dir.path().join("design.json");
    let effects_path = dir.path().join("effects.json");
    std::fs::write(&design_path, design_template().to_string()).unwrap();
    std::fs::write(&effects_path, effects_template().to_string()).unwrap();

    let design = load_json_file(&design_path).unwrap();
    let effects = load_json_file(&effects_path).unwrap();
    let report = RenderPipeline::new().report(&design, &effects);

    assert!(report.valid);
    assert_eq!(report.template_id.as_deref(), Some("mug"));
    assert_eq!(report.template_version.as_deref(), Some("1.0.0"));
}
