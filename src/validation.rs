//! Validation System - Structure First, Then Integrity
//!
//! Both templates are checked structurally before anything else. Integrity
//! rules only run on typed data and each produces its own issues; the
//! validator accumulates them all.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

use crate::diagnostics::{Diagnostics, IssuePath, ValidationIssue};
use crate::schema::{check_design_template, check_effects_template, BindingPolicy};
use crate::templates::{DesignTemplate, EffectChain, EffectRef, EffectsTemplate, Node, NodeRef};

/// Templates that passed every check, with lookup indices.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedTemplates {
    pub design_template: DesignTemplate,
    pub effects_template: EffectsTemplate,
    /// chainId -> position in `effects_template.chains` (first registration).
    pub effect_chain_index: BTreeMap<String, usize>,
}

impl ValidatedTemplates {
    /// The design template's `nodes` map doubles as the node index.
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.design_template.node(id)
    }

    pub fn chain(&self, chain_id: &str) -> Option<&EffectChain> {
        self.effect_chain_index
            .get(chain_id)
            .and_then(|position| self.effects_template.chains.get(*position))
    }

    pub fn resolve_node_ref(&self, node_ref: &NodeRef) -> Option<&Node> {
        self.design_template.resolve_node_ref(node_ref)
    }

    pub fn resolve_effect_ref(&self, effect_ref: &EffectRef) -> Option<&EffectChain> {
        effect_ref.chain_id().and_then(|id| self.chain(id))
    }
}

/// Serializable outcome for front ends.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_version: Option<String>,
    pub diagnostics: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn success(templates: &ValidatedTemplates) -> Self {
        Self {
            valid: true,
            template_id: Some(templates.design_template.template_id.clone()),
            template_version: Some(templates.design_template.template_version.clone()),
            diagnostics: vec![],
        }
    }

    pub fn failure(diagnostics: &Diagnostics) -> Self {
        Self {
            valid: false,
            template_id: None,
            template_version: None,
            diagnostics: diagnostics.issues().to_vec(),
        }
    }

    pub fn from_result(result: &Result<ValidatedTemplates, Diagnostics>) -> Self {
        match result {
            Ok(templates) => Self::success(templates),
            Err(diagnostics) => Self::failure(diagnostics),
        }
    }
}

/// Integrity rule trait - produces issues for typed templates
pub trait IntegrityRule: Send + Sync {
    fn name(&self) -> &'static str;
    fn check(&self, design: &DesignTemplate, effects: &EffectsTemplate) -> Vec<ValidationIssue>;
}

fn design_root() -> IssuePath {
    IssuePath::root("design")
}

fn node_path(key: &str) -> IssuePath {
    design_root().field("nodes").field(key)
}

fn missing_node(design: &DesignTemplate, node_ref: &NodeRef, path: IssuePath) -> Option<ValidationIssue> {
    let node_id = node_ref.node_id().unwrap_or(&node_ref.reference);
    if design.nodes.contains_key(node_id) {
        None
    } else {
        Some(path.issue(format!("Referenced node '{node_id}' does not exist")))
    }
}

fn check_refs(
    design: &DesignTemplate,
    refs: &[NodeRef],
    path: &IssuePath,
    issues: &mut Vec<ValidationIssue>,
) {
    for (index, node_ref) in refs.iter().enumerate() {
        issues.extend(missing_node(design, node_ref, path.index(index)));
    }
}

// --- Concrete Rules ---

pub struct TemplateIdentityRule;

impl IntegrityRule for TemplateIdentityRule {
    fn name(&self) -> &'static str { "template_identity" }

    fn check(&self, design: &DesignTemplate, effects: &EffectsTemplate) -> Vec<ValidationIssue> {
        let mut issues = vec![];
        if design.template_id != effects.template_id {
            issues.push(design_root().field("templateId").issue(format!(
                "design.templateId '{}' must match effects.templateId '{}'",
                design.template_id, effects.template_id
            )));
        }
        if design.template_version != effects.template_version {
            issues.push(design_root().field("templateVersion").issue(format!(
                "design.templateVersion '{}' must match effects.templateVersion '{}'",
                design.template_version, effects.template_version
            )));
        }
        issues
    }
}

pub struct SceneReferenceRule;

impl IntegrityRule for SceneReferenceRule {
    fn name(&self) -> &'static str { "scene_references" }

    fn check(&self, design: &DesignTemplate, _effects: &EffectsTemplate) -> Vec<ValidationIssue> {
        let mut issues = vec![];
        for (scene_index, scene) in design.scenes.iter().enumerate() {
            let scene_path = design_root().field("scenes").index(scene_index);
            check_refs(design, &scene.background, &scene_path.field("background"), &mut issues);
            check_refs(design, &scene.overlay, &scene_path.field("overlay"), &mut issues);
            issues.extend(missing_node(design, &scene.design, scene_path.field("design")));
            check_refs(design, &scene.design_overlay, &scene_path.field("designOverlay"), &mut issues);
        }
        issues
    }
}

pub struct NodeIdRule;

impl IntegrityRule for NodeIdRule {
    fn name(&self) -> &'static str { "node_ids" }

    fn check(&self, design: &DesignTemplate, _effects: &EffectsTemplate) -> Vec<ValidationIssue> {
        design
            .nodes
            .iter()
            .filter(|(key, node)| key.as_str() != node.id)
            .map(|(key, node)| {
                node_path(key).field("id").issue(format!(
                    "Node id '{}' must match nodes map key '{}'",
                    node.id, key
                ))
            })
            .collect()
    }
}

pub struct ContainerChildrenRule;

impl IntegrityRule for ContainerChildrenRule {
    fn name(&self) -> &'static str { "container_children" }

    fn check(&self, design: &DesignTemplate, _effects: &EffectsTemplate) -> Vec<ValidationIssue> {
        let mut issues = vec![];
        for (key, node) in &design.nodes {
            check_refs(design, node.children(), &node_path(key).field("children"), &mut issues);
        }
        issues
    }
}

/// Containers must not contain themselves, directly or through descendants.
/// Each distinct cycle is reported once, at its smallest node id.
pub struct ContainerCycleRule;

/// Same cycle, same members: start the walk at the smallest id.
fn rotate_to_min(mut cycle: Vec<&str>) -> Vec<&str> {
    if let Some(start) = cycle.iter().enumerate().min_by_key(|(_, id)| **id).map(|(i, _)| i) {
        cycle.rotate_left(start);
    }
    cycle
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Visit {
    Active,
    Done,
}

impl IntegrityRule for ContainerCycleRule {
    fn name(&self) -> &'static str { "container_cycles" }

    fn check(&self, design: &DesignTemplate, _effects: &EffectsTemplate) -> Vec<ValidationIssue> {
        let mut visits: BTreeMap<&str, Visit> = BTreeMap::new();
        let mut reported: BTreeSet<Vec<&str>> = BTreeSet::new();
        let mut issues = vec![];

        for start in design.nodes.keys() {
            if visits.contains_key(start.as_str()) {
                continue;
            }
            visits.insert(start, Visit::Active);
            let mut stack: Vec<(&str, usize)> = vec![(start.as_str(), 0)];

            while let Some(&(current, next_child)) = stack.last() {
                let children = design.node(current).map(|node| node.children()).unwrap_or(&[]);
                if next_child >= children.len() {
                    visits.insert(current, Visit::Done);
                    stack.pop();
                    continue;
                }
                if let Some(top) = stack.last_mut() {
                    top.1 += 1;
                }

                let Some((child, _)) = children[next_child]
                    .node_id()
                    .and_then(|id| design.nodes.get_key_value(id))
                else {
                    continue;
                };
                let child = child.as_str();

                match visits.get(child) {
                    None => {
                        visits.insert(child, Visit::Active);
                        stack.push((child, 0));
                    }
                    Some(Visit::Active) => {
                        let entry = stack.iter().position(|(id, _)| *id == child).unwrap_or(0);
                        let cycle = rotate_to_min(stack[entry..].iter().map(|(id, _)| *id).collect());
                        let Some(&first) = cycle.first() else {
                            continue;
                        };
                        let trail = cycle
                            .iter()
                            .chain(std::iter::once(&first))
                            .copied()
                            .collect::<Vec<_>>()
                            .join(" -> ");
                        if reported.insert(cycle) {
                            issues.push(node_path(first).field("children").issue(format!(
                                "Node '{first}' is part of a container cycle ({trail})"
                            )));
                        }
                    }
                    Some(Visit::Done) => {}
                }
            }
        }
        issues
    }
}

pub struct DuplicateChainRule;

impl IntegrityRule for DuplicateChainRule {
    fn name(&self) -> &'static str { "duplicate_chains" }

    fn check(&self, _design: &DesignTemplate, effects: &EffectsTemplate) -> Vec<ValidationIssue> {
        let mut seen = BTreeSet::new();
        let mut issues = vec![];
        for (chain_index, chain) in effects.chains.iter().enumerate() {
            if !seen.insert(chain.chain_id.as_str()) {
                issues.push(
                    IssuePath::root("effects")
                        .field("chains")
                        .index(chain_index)
                        .field("chainId")
                        .issue(format!("Duplicate chainId '{}'", chain.chain_id)),
                );
            }
        }
        issues
    }
}

pub struct EffectReferenceRule;

impl IntegrityRule for EffectReferenceRule {
    fn name(&self) -> &'static str { "effect_references" }

    fn check(&self, design: &DesignTemplate, effects: &EffectsTemplate) -> Vec<ValidationIssue> {
        let chain_ids: BTreeSet<&str> = effects.chains.iter().map(|c| c.chain_id.as_str()).collect();
        let mut issues = vec![];
        for (key, node) in &design.nodes {
            let Some(effect_ref) = &node.effects else {
                continue;
            };
            let chain_id = effect_ref.chain_id().unwrap_or(&effect_ref.reference);
            if !chain_ids.contains(chain_id) {
                issues.push(node_path(key).field("effects").field("$ref").issue(format!(
                    "Referenced effect chain '{chain_id}' does not exist"
                )));
            }
        }
        issues
    }
}

/// Validator runs the structural schema, then every integrity rule
pub struct Validator {
    rules: Vec<Box<dyn IntegrityRule>>,
}

impl Validator {
    pub fn new() -> Self {
        Self {
            rules: vec![
                Box::new(TemplateIdentityRule),
                Box::new(SceneReferenceRule),
                Box::new(NodeIdRule),
                Box::new(ContainerChildrenRule),
                Box::new(ContainerCycleRule),
                Box::new(DuplicateChainRule),
                Box::new(EffectReferenceRule),
            ],
        }
    }

    #[tracing::instrument(skip_all)]
    pub fn validate(
        &self,
        design_input: &Value,
        effects_input: &Value,
    ) -> Result<ValidatedTemplates, Diagnostics> {
        let mut issues = check_design_template(design_input, BindingPolicy::Template);
        issues.extend(check_effects_template(effects_input));
        if !issues.is_empty() {
            tracing::debug!(issues = issues.len(), "structural validation failed");
            return Err(Diagnostics::new(issues));
        }

        let design: Option<DesignTemplate> = typed(design_input, "design", &mut issues);
        let effects: Option<EffectsTemplate> = typed(effects_input, "effects", &mut issues);
        let (Some(design_template), Some(effects_template)) = (design, effects) else {
            return Err(Diagnostics::new(issues));
        };

        for rule in &self.rules {
            let found = rule.check(&design_template, &effects_template);
            if !found.is_empty() {
                tracing::debug!(rule = rule.name(), issues = found.len(), "integrity rule failed");
            }
            issues.extend(found);
        }
        Diagnostics::check(issues)?;

        let mut effect_chain_index = BTreeMap::new();
        for (position, chain) in effects_template.chains.iter().enumerate() {
            effect_chain_index.entry(chain.chain_id.clone()).or_insert(position);
        }

        tracing::debug!(
            template_id = %design_template.template_id,
            nodes = design_template.nodes.len(),
            chains = effect_chain_index.len(),
            "templates validated"
        );

        Ok(ValidatedTemplates {
            design_template,
            effects_template,
            effect_chain_index,
        })
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

/// Validate a design/effects pair with the default rule set.
pub fn validate_templates(
    design_input: &Value,
    effects_input: &Value,
) -> Result<ValidatedTemplates, Diagnostics> {
    Validator::new().validate(design_input, effects_input)
}

fn typed<T: serde::de::DeserializeOwned>(
    value: &Value,
    root: &str,
    issues: &mut Vec<ValidationIssue>,
) -> Option<T> {
    match serde_json::from_value(value.clone()) {
        Ok(typed) => Some(typed),
        Err(e) => {
            issues.push(IssuePath::root(root).issue(e.to_string()));
            None
        }
    }
}
