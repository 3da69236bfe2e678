//! Template System - Design and Effects Contracts
//!
//! Templates are generic over a [`BindingStage`]. An `Unresolved` template may
//! hold binding placeholders in its bindable fields; a `Resolved` template
//! holds concrete values only.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;
use std::fmt;

use crate::bindings::{BindAsset, BindColor, BindInput, Bindable};

pub const DESIGN_SPEC_ID: &str = "personalizer.design.v1";
pub const EFFECTS_SPEC_ID: &str = "personalizer.effects.v1";

pub const NODE_REF_PREFIX: &str = "node:";
pub const EFFECT_REF_PREFIX: &str = "effect:";

pub type TemplateId = String;
pub type NodeId = String;

/// Selects the representation of bindable fields.
pub trait BindingStage: Clone + fmt::Debug + PartialEq + Send + Sync + 'static {
    type Text: Clone + fmt::Debug + PartialEq + Send + Sync + Serialize + DeserializeOwned;
    type Asset: Clone + fmt::Debug + PartialEq + Send + Sync + Serialize + DeserializeOwned;
    type Color: Clone + fmt::Debug + PartialEq + Send + Sync + Serialize + DeserializeOwned;
}

/// Template as authored: bindable fields may be placeholders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Unresolved;

/// Template after binding resolution: every bindable field is concrete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Resolved;

impl BindingStage for Unresolved {
    type Text = Bindable<BindInput, String>;
    type Asset = Bindable<BindAsset, String>;
    type Color = Bindable<BindColor, String>;
}

impl BindingStage for Resolved {
    type Text = String;
    type Asset = String;
    type Color = String;
}

pub type DesignTemplate = DesignTemplateOf<Unresolved>;
pub type ResolvedDesignTemplate = DesignTemplateOf<Resolved>;
pub type Node = NodeOf<Unresolved>;
pub type ResolvedNode = NodeOf<Resolved>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", bound = "")]
pub struct DesignTemplateOf<S: BindingStage> {
    pub spec: String,
    pub template_id: TemplateId,
    pub template_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assets: Option<AssetManifest>,
    pub scenes: Vec<Scene>,
    pub nodes: BTreeMap<NodeId, NodeOf<S>>,
}

impl<S: BindingStage> DesignTemplateOf<S> {
    pub fn node(&self, id: &str) -> Option<&NodeOf<S>> {
        self.nodes.get(id)
    }

    pub fn resolve_node_ref(&self, node_ref: &NodeRef) -> Option<&NodeOf<S>> {
        node_ref.node_id().and_then(|id| self.nodes.get(id))
    }

    pub fn primary_scene(&self) -> Option<&Scene> {
        self.scenes.first()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssetManifest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fonts: Option<Vec<AssetEntry>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<AssetEntry>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetEntry {
    pub id: String,
    pub src: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scene {
    pub scene_id: String,
    pub group: String,
    pub canvas: Canvas,
    pub background: Vec<NodeRef>,
    pub overlay: Vec<NodeRef>,
    pub design: NodeRef,
    pub design_overlay: Vec<NodeRef>,
}

impl Scene {
    /// Every node reference of the scene in paint order.
    pub fn node_refs(&self) -> impl Iterator<Item = &NodeRef> {
        self.background
            .iter()
            .chain(self.overlay.iter())
            .chain(std::iter::once(&self.design))
            .chain(self.design_overlay.iter())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Canvas {
    pub size: CanvasSize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dpi: Option<Number>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanvasSize {
    pub w: Number,
    pub h: Number,
    pub unit: Unit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    /// Absolute pixels.
    Px,
    /// Percent of the parent box.
    Pct,
}

impl Unit {
    pub const NAMES: [&'static str; 2] = ["px", "pct"];
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeRef {
    #[serde(rename = "$ref")]
    pub reference: String,
}

impl NodeRef {
    pub fn to(id: &str) -> Self {
        Self {
            reference: format!("{NODE_REF_PREFIX}{id}"),
        }
    }

    pub fn node_id(&self) -> Option<&str> {
        self.reference.strip_prefix(NODE_REF_PREFIX)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EffectRef {
    #[serde(rename = "$ref")]
    pub reference: String,
}

impl EffectRef {
    pub fn to(chain_id: &str) -> Self {
        Self {
            reference: format!("{EFFECT_REF_PREFIX}{chain_id}"),
        }
    }

    pub fn chain_id(&self) -> Option<&str> {
        self.reference.strip_prefix(EFFECT_REF_PREFIX)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: Number,
    pub y: Number,
    pub w: Number,
    pub h: Number,
    pub unit: Unit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Anchor {
    TopLeft,
    Top,
    TopRight,
    Left,
    #[default]
    Center,
    Right,
    BottomLeft,
    Bottom,
    BottomRight,
}

impl Anchor {
    pub const NAMES: [&'static str; 9] = [
        "TopLeft",
        "Top",
        "TopRight",
        "Left",
        "Center",
        "Right",
        "BottomLeft",
        "Bottom",
        "BottomRight",
    ];
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: Number,
    pub y: Number,
    pub unit: Unit,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scale {
    pub x: Number,
    pub y: Number,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transform {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translate: Option<Point>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<Scale>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotate: Option<Number>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub free_transform: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Locks {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gravity_locked: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotate_locked: Option<bool>,
}

/// One visual element. Base geometry and paint fields are shared; the
/// variant payload lives in `kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", bound = "")]
pub struct NodeOf<S: BindingStage> {
    pub id: NodeId,
    pub rect: Rect,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor: Option<Anchor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opacity: Option<Number>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blend_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_color: Option<S::Color>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<Transform>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locks: Option<Locks>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effects: Option<EffectRef>,
    #[serde(flatten)]
    pub kind: NodeKind<S>,
}

impl<S: BindingStage> NodeOf<S> {
    pub fn anchor(&self) -> Anchor {
        self.anchor.unwrap_or_default()
    }

    pub fn type_name(&self) -> &'static str {
        self.kind.type_name()
    }

    /// Child references for containers; empty for every other variant.
    pub fn children(&self) -> &[NodeRef] {
        match &self.kind {
            NodeKind::Container { children, .. } => children,
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", bound = "")]
pub enum NodeKind<S: BindingStage> {
    #[serde(rename_all = "camelCase")]
    Container {
        children: Vec<NodeRef>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        clip_to_bounds: Option<bool>,
    },
    Image {
        image: ImageContent<S>,
    },
    Text {
        text: TextContent<S>,
    },
    Fill {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fill: Option<Map<String, Value>>,
    },
    Shape {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        shape: Option<Map<String, Value>>,
    },
}

/// Discriminator values of [`NodeKind`].
pub const NODE_TYPES: [&str; 5] = ["container", "image", "text", "fill", "shape"];

impl<S: BindingStage> NodeKind<S> {
    pub fn type_name(&self) -> &'static str {
        match self {
            NodeKind::Container { .. } => "container",
            NodeKind::Image { .. } => "image",
            NodeKind::Text { .. } => "text",
            NodeKind::Fill { .. } => "fill",
            NodeKind::Shape { .. } => "shape",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", bound = "")]
pub struct ImageContent<S: BindingStage> {
    pub asset_ref: S::Asset,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", bound = "")]
pub struct TextContent<S: BindingStage> {
    pub body: S::Text,
    pub font_ref: String,
    pub size: Number,
    pub color: S::Color,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shadow: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub align: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<Number>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_fit: Option<bool>,
}

// --- Effects ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectsTemplate {
    pub spec: String,
    pub template_id: TemplateId,
    pub template_version: String,
    pub chains: Vec<EffectChain>,
}

impl EffectsTemplate {
    /// First chain registered under `chain_id`.
    pub fn chain(&self, chain_id: &str) -> Option<&EffectChain> {
        self.chains.iter().find(|chain| chain.chain_id == chain_id)
    }

    pub fn resolve_effect_ref(&self, effect_ref: &EffectRef) -> Option<&EffectChain> {
        effect_ref.chain_id().and_then(|id| self.chain(id))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectChain {
    pub chain_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub steps: Vec<EffectStep>,
}

/// A named, opaque operation. Executing it is the renderer's concern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectStep {
    pub operation: String,
    pub params: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opacity: Option<Number>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ui: Option<EffectStepUi>,
}

impl EffectStep {
    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectStepUi {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<Number>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<Number>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<Number>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<Number>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
}
