//! Personalizer Core - Template Validation and Render Keys
//!
//! # The Rules (Non-Negotiable)
//! 1. Templates Are Contracts: every issue is reported, with its path
//! 2. Validation Is Mandatory: nothing resolves without it
//! 3. Resolved Means Concrete: no placeholder survives resolution
//! 4. Deterministic Output: same inputs, same render key, everywhere

pub mod bindings;
pub mod canonical;
pub mod diagnostics;
pub mod hashing;
pub mod normalize;
pub mod pipeline;
pub mod resolve;
pub mod schema;
pub mod templates;
pub mod validation;

pub use bindings::{discover_bindings, BindingField, PlaceholderKind};
pub use canonical::{canonical_json, canonicalize, CanonicalError};
pub use diagnostics::{Diagnostics, ValidationIssue};
pub use hashing::{compute_render_key, sha256_hex, RenderKeyInput};
pub use pipeline::{
    compile_render_plan, load_json_file, PipelineError, RenderError, RenderFormat, RenderOutput,
    RenderPipeline, RenderPlan, RenderPlanScene, RenderTarget, Renderer,
};
pub use resolve::{resolve_bindings, BindingSources, RenderModel, SceneSelector};
pub use templates::{
    DesignTemplate, EffectsTemplate, ResolvedDesignTemplate, DESIGN_SPEC_ID, EFFECTS_SPEC_ID,
};
pub use validation::{validate_templates, ValidatedTemplates, ValidationReport, Validator};

pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
