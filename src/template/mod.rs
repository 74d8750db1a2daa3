//! # Package Template Store
//!
//! Named, versioned, reusable workflow definitions. A template is an
//! ordered list of step declarations; validation happens at publish time so
//! an unsatisfiable dependency graph is rejected before any execution can
//! be created from it. Published templates are immutable — updating a
//! workflow means publishing a new template id, and in-flight executions
//! keep referencing their original snapshot.

use crate::registry::ProducerRegistry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("template '{name}' declares no steps")]
    EmptyTemplate { name: String },

    #[error(
        "step '{step_type}' requires tag '{tag}' which no earlier step produces"
    )]
    UnsatisfiableDependency { step_type: String, tag: String },

    #[error("tag '{tag}' is produced by more than one step")]
    DuplicateProduces { tag: String },

    #[error("step type '{step_type}' has no registered producer")]
    UnknownStepType { step_type: String },

    #[error("template {0} not found")]
    NotFound(Uuid),
}

/// A single step declaration within a template: which producer runs, what
/// it consumes and what it contributes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDeclaration {
    pub step_type: String,
    pub requires: Vec<String>,
    pub produces: String,
    pub skippable: bool,
    pub max_retries: u32,
    pub estimated_duration_secs: u64,
}

impl StepDeclaration {
    pub fn new(step_type: impl Into<String>, requires: &[&str], produces: impl Into<String>) -> Self {
        Self {
            step_type: step_type.into(),
            requires: requires.iter().map(|tag| (*tag).to_string()).collect(),
            produces: produces.into(),
            skippable: false,
            max_retries: crate::constants::defaults::MAX_RETRIES,
            estimated_duration_secs: 60,
        }
    }

    pub fn with_skippable(mut self, skippable: bool) -> Self {
        self.skippable = skippable;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_estimated_duration_secs(mut self, secs: u64) -> Self {
        self.estimated_duration_secs = secs;
        self
    }
}

/// An immutable, published workflow definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageTemplate {
    pub id: Uuid,
    pub name: String,
    pub summary: String,
    pub steps: Vec<StepDeclaration>,
}

/// In-memory registry of published templates.
///
/// Validation consults the producer registry so a template can never name a
/// step type nothing knows how to execute.
pub struct TemplateStore {
    registry: Arc<ProducerRegistry>,
    templates: DashMap<Uuid, Arc<PackageTemplate>>,
}

impl TemplateStore {
    pub fn new(registry: Arc<ProducerRegistry>) -> Self {
        Self {
            registry,
            templates: DashMap::new(),
        }
    }

    /// Validate and publish a template, returning its immutable id.
    pub fn publish(
        &self,
        name: impl Into<String>,
        summary: impl Into<String>,
        steps: Vec<StepDeclaration>,
    ) -> Result<Uuid, TemplateError> {
        let name = name.into();
        Self::validate(&name, &steps, &self.registry)?;

        let template = PackageTemplate {
            id: Uuid::new_v4(),
            name: name.clone(),
            summary: summary.into(),
            steps,
        };
        let id = template.id;
        let step_count = template.steps.len();
        self.templates.insert(id, Arc::new(template));

        info!(template_id = %id, name = %name, steps = step_count, "Published package template");
        Ok(id)
    }

    /// Resolve a published template by id.
    pub fn resolve(&self, id: Uuid) -> Result<Arc<PackageTemplate>, TemplateError> {
        self.templates
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or(TemplateError::NotFound(id))
    }

    pub fn list(&self) -> Vec<Arc<PackageTemplate>> {
        self.templates
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Publish-time graph validation: every `requires` tag must be produced
    /// by an earlier declaration, no tag may be produced twice, and every
    /// step type must have a registered producer.
    fn validate(
        name: &str,
        steps: &[StepDeclaration],
        registry: &ProducerRegistry,
    ) -> Result<(), TemplateError> {
        if steps.is_empty() {
            return Err(TemplateError::EmptyTemplate {
                name: name.to_string(),
            });
        }

        let mut produced: HashSet<&str> = HashSet::new();
        for declaration in steps {
            if !registry.contains(&declaration.step_type) {
                return Err(TemplateError::UnknownStepType {
                    step_type: declaration.step_type.clone(),
                });
            }

            for tag in &declaration.requires {
                if !produced.contains(tag.as_str()) {
                    debug!(
                        template = name,
                        step_type = %declaration.step_type,
                        tag = %tag,
                        "Rejecting template with unsatisfiable dependency"
                    );
                    return Err(TemplateError::UnsatisfiableDependency {
                        step_type: declaration.step_type.clone(),
                        tag: tag.clone(),
                    });
                }
            }

            if !produced.insert(declaration.produces.as_str()) {
                return Err(TemplateError::DuplicateProduces {
                    tag: declaration.produces.clone(),
                });
            }
        }

        Ok(())
    }
}
