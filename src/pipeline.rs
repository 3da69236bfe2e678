//! Render Pipeline - Single Entry Point
//!
//! CRITICAL: resolve MUST call validate internally. No bypass.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::canonical::CanonicalError;
use crate::diagnostics::Diagnostics;
use crate::hashing::compute_render_key;
use crate::resolve::{BindingSources, RenderModel, SceneSelector};
use crate::validation::{ValidatedTemplates, ValidationReport, Validator};

#[cfg(feature = "test-hooks")]
use std::sync::atomic::{AtomicU32, Ordering};

#[cfg(feature = "test-hooks")]
static VALIDATION_CALL_COUNT: AtomicU32 = AtomicU32::new(0);

#[cfg(feature = "test-hooks")]
pub fn get_validation_call_count() -> u32 {
    VALIDATION_CALL_COUNT.load(Ordering::SeqCst)
}

#[cfg(feature = "test-hooks")]
pub fn reset_validation_call_count() {
    VALIDATION_CALL_COUNT.store(0, Ordering::SeqCst);
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Validation failed:\n{0}")]
    Validation(Diagnostics),

    #[error("Binding resolution failed:\n{0}")]
    Resolution(Diagnostics),

    #[error(transparent)]
    Canonical(#[from] CanonicalError),

    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl PipelineError {
    /// Accumulated issues, when the failure came from the templates or bindings.
    pub fn diagnostics(&self) -> Option<&Diagnostics> {
        match self {
            PipelineError::Validation(d) | PipelineError::Resolution(d) => Some(d),
            _ => None,
        }
    }
}

/// Render keys for every scene of one resolved model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderPlan {
    pub template_id: String,
    pub template_version: String,
    pub resolved_inputs: Map<String, Value>,
    pub asset_content_hashes: BTreeMap<String, String>,
    pub scenes: Vec<RenderPlanScene>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderPlanScene {
    pub scene_id: String,
    pub render_key: String,
}

impl RenderPlan {
    pub fn render_key(&self, scene_id: &str) -> Option<&str> {
        self.scenes
            .iter()
            .find(|scene| scene.scene_id == scene_id)
            .map(|scene| scene.render_key.as_str())
    }
}

/// One render key per scene, in scene order.
pub fn compile_render_plan(
    model: &RenderModel,
    asset_content_hashes: &BTreeMap<String, String>,
) -> Result<RenderPlan, CanonicalError> {
    let scenes = model
        .design_template
        .scenes
        .iter()
        .map(|scene| {
            let input = model.render_key_input(&scene.scene_id, asset_content_hashes);
            Ok(RenderPlanScene {
                scene_id: scene.scene_id.clone(),
                render_key: compute_render_key(&input)?,
            })
        })
        .collect::<Result<Vec<_>, CanonicalError>>()?;

    Ok(RenderPlan {
        template_id: model.template_id.clone(),
        template_version: model.template_version.clone(),
        resolved_inputs: model.resolved_inputs.clone(),
        asset_content_hashes: asset_content_hashes.clone(),
        scenes,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderFormat {
    Png,
    Bitmap,
}

impl RenderFormat {
    pub fn mime_type(self) -> &'static str {
        match self {
            RenderFormat::Png => "image/png",
            RenderFormat::Bitmap => "image/bmp",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderTarget {
    pub scene: SceneSelector,
    pub format: RenderFormat,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderOutput {
    pub scene_id: String,
    pub format: RenderFormat,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Scene not found: {0:?}")]
    SceneNotFound(SceneSelector),

    #[error("Asset unavailable: {0}")]
    AssetUnavailable(String),

    #[error("Render failed: {0}")]
    Backend(String),
}

/// Rasterizer seam. Implementations draw one scene of a resolved model.
pub trait Renderer: Send + Sync {
    fn render(
        &self,
        model: &RenderModel,
        plan: &RenderPlan,
        target: &RenderTarget,
    ) -> Result<RenderOutput, RenderError>;
}

/// The render pipeline - single entry point for template operations
pub struct RenderPipeline {
    validator: Validator,
}

impl RenderPipeline {
    pub fn new() -> Self {
        Self::with_validator(Validator::new())
    }

    pub fn with_validator(validator: Validator) -> Self {
        Self { validator }
    }

    /// Validate a design/effects template pair
    ///
    /// This is the ONLY validation entry point.
    pub fn validate(&self, design: &Value, effects: &Value) -> Result<ValidatedTemplates, PipelineError> {
        self.run_validator(design, effects)
            .map_err(PipelineError::Validation)
    }

    /// Validation outcome in its serializable form.
    pub fn report(&self, design: &Value, effects: &Value) -> ValidationReport {
        ValidationReport::from_result(&self.run_validator(design, effects))
    }

    fn run_validator(&self, design: &Value, effects: &Value) -> Result<ValidatedTemplates, Diagnostics> {
        #[cfg(feature = "test-hooks")]
        VALIDATION_CALL_COUNT.fetch_add(1, Ordering::SeqCst);

        self.validator.validate(design, effects)
    }

    /// Resolve bindings
    ///
    /// CRITICAL: This ALWAYS calls validate internally. No bypass possible.
    #[tracing::instrument(skip_all)]
    pub fn resolve(
        &self,
        design: &Value,
        effects: &Value,
        sources: &BindingSources,
    ) -> Result<RenderModel, PipelineError> {
        // MANDATORY: Validation is always called.
        let templates = self.validate(design, effects)?;
        templates.resolve(sources).map_err(PipelineError::Resolution)
    }

    /// Validate, resolve and key every scene.
    pub fn render_plan(
        &self,
        design: &Value,
        effects: &Value,
        sources: &BindingSources,
        asset_content_hashes: &BTreeMap<String, String>,
    ) -> Result<(RenderModel, RenderPlan), PipelineError> {
        let model = self.resolve(design, effects, sources)?;
        let plan = compile_render_plan(&model, asset_content_hashes)?;
        tracing::debug!(scenes = plan.scenes.len(), "render plan compiled");
        Ok((model, plan))
    }

    /// Full path through a renderer.
    pub fn render(
        &self,
        renderer: &dyn Renderer,
        design: &Value,
        effects: &Value,
        sources: &BindingSources,
        asset_content_hashes: &BTreeMap<String, String>,
        target: &RenderTarget,
    ) -> Result<RenderOutput, RenderPipelineFailure> {
        let (model, plan) = self.render_plan(design, effects, sources, asset_content_hashes)?;
        Ok(renderer.render(&model, &plan, target)?)
    }
}

impl Default for RenderPipeline {
    fn default() -> Self {
        Self::new()
    }
}

/// Either stage of [`RenderPipeline::render`] can fail.
#[derive(Debug, Error)]
pub enum RenderPipelineFailure {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Render(#[from] RenderError),
}

/// Read and parse a JSON document.
pub fn load_json_file(path: impl AsRef<Path>) -> Result<Value, PipelineError> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).map_err(|source| PipelineError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| PipelineError::Json {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn design() -> Value {
        json!({
            "spec": "personalizer.design.v1",
            "templateId": "card",
            "templateVersion": "2.0.0",
            "scenes": [
                {
                    "sceneId": "front",
                    "group": "Front",
                    "canvas": {"size": {"w": 600, "h": 400, "unit": "px"}},
                    "background": [],
                    "overlay": [],
                    "design": {"$ref": "node:title"},
                    "designOverlay": []
                },
                {
                    "sceneId": "back",
                    "group": "Back",
                    "canvas": {"size": {"w": 600, "h": 400, "unit": "px"}},
                    "background": [],
                    "overlay": [],
                    "design": {"$ref": "node:title"},
                    "designOverlay": []
                }
            ],
            "nodes": {
                "title": {
                    "id": "title",
                    "type": "text",
                    "rect": {"x": 10, "y": 10, "w": 80, "h": 20, "unit": "pct"},
                    "text": {"body": {"$bind": "inputs.title"}, "fontRef": "serif", "size": 32, "color": "#000000"}
                }
            }
        })
    }

    fn effects() -> Value {
        json!({
            "spec": "personalizer.effects.v1",
            "templateId": "card",
            "templateVersion": "2.0.0",
            "chains": []
        })
    }

    fn sources() -> BindingSources {
        BindingSources::from_inputs(json!({"title": "Hello"}).as_object().cloned().unwrap())
    }

    struct EchoRenderer;

    impl Renderer for EchoRenderer {
        fn render(
            &self,
            model: &RenderModel,
            plan: &RenderPlan,
            target: &RenderTarget,
        ) -> Result<RenderOutput, RenderError> {
            let scene = model
                .scene(&target.scene)
                .ok_or_else(|| RenderError::SceneNotFound(target.scene.clone()))?;
            let key = plan
                .render_key(&scene.scene_id)
                .ok_or_else(|| RenderError::Backend("missing key".into()))?;
            Ok(RenderOutput {
                scene_id: scene.scene_id.clone(),
                format: target.format,
                mime_type: target.format.mime_type().to_string(),
                bytes: key.as_bytes().to_vec(),
            })
        }
    }

    #[test]
    fn test_render_plan_keys_every_scene() {
        let pipeline = RenderPipeline::new();
        let (model, plan) = pipeline
            .render_plan(&design(), &effects(), &sources(), &BTreeMap::new())
            .unwrap();

        assert_eq!(plan.scenes.len(), 2);
        assert_eq!(plan.scenes[0].scene_id, "front");
        assert_eq!(plan.scenes[1].scene_id, "back");
        assert_ne!(plan.scenes[0].render_key, plan.scenes[1].render_key);
        assert_eq!(
            plan.render_key("front"),
            Some(model.render_key(&BTreeMap::new()).unwrap().as_str())
        );
    }

    #[test]
    fn test_validation_failure_blocks_resolution() {
        let mut broken = design();
        broken["scenes"][0]["design"] = json!({"$ref": "node:missing"});
        let err = RenderPipeline::new()
            .resolve(&broken, &effects(), &sources())
            .unwrap_err();
        assert!(matches!(err, PipelineError::Validation(_)));
        assert!(err.diagnostics().unwrap().mentions("Referenced node 'missing'"));
    }

    #[test]
    fn test_resolution_failure_is_distinct() {
        let err = RenderPipeline::new()
            .resolve(&design(), &effects(), &BindingSources::default())
            .unwrap_err();
        assert!(matches!(err, PipelineError::Resolution(_)));
        assert!(err.diagnostics().unwrap().mentions("Missing binding value for 'inputs.title'"));
    }

    #[test]
    fn test_report_shapes() {
        let pipeline = RenderPipeline::default();
        let ok = pipeline.report(&design(), &effects());
        assert!(ok.valid);
        assert_eq!(ok.template_id.as_deref(), Some("card"));

        let bad = pipeline.report(&json!({}), &effects());
        assert!(!bad.valid);
        assert!(!bad.diagnostics.is_empty());
    }

    #[test]
    fn test_render_through_renderer() {
        let output = RenderPipeline::new()
            .render(
                &EchoRenderer,
                &design(),
                &effects(),
                &sources(),
                &BTreeMap::new(),
                &RenderTarget {
                    scene: SceneSelector::Group("Back".into()),
                    format: RenderFormat::Png,
                },
            )
            .unwrap();
        assert_eq!(output.scene_id, "back");
        assert_eq!(output.mime_type, "image/png");
        assert_eq!(output.bytes.len(), 64);

        let err = RenderPipeline::new()
            .render(
                &EchoRenderer,
                &design(),
                &effects(),
                &sources(),
                &BTreeMap::new(),
                &RenderTarget {
                    scene: SceneSelector::Id("inside".into()),
                    format: RenderFormat::Bitmap,
                },
            )
            .unwrap_err();
        assert!(matches!(err, RenderPipelineFailure::Render(RenderError::SceneNotFound(_))));
    }

    #[test]
    fn test_load_json_file_errors_carry_path() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        assert!(matches!(load_json_file(&missing), Err(PipelineError::Io { .. })));

        let garbled = dir.path().join("garbled.json");
        std::fs::write(&garbled, "{not json").unwrap();
        let err = load_json_file(&garbled).unwrap_err();
        assert!(matches!(err, PipelineError::Json { .. }));
        assert!(err.to_string().contains("garbled.json"));
    }
}
