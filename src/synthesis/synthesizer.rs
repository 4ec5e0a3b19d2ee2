use crate::error::{ForgeError, ForgeResult};
use crate::synthesis::templates::{self, Rendered};
use crate::synthesis::types::{
    HookPhase, ResourceCategory, ResourceRequirement, SynthesizedResource, ToolKind,
};
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};
use uuid::Uuid;

/// Turns requirements into executable resource specifications
#[derive(Debug, Default)]
pub struct ResourceSynthesizer {
    tools_created: AtomicU64,
    hooks_created: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SynthesisCounts {
    pub tools: u64,
    pub hooks: u64,
}

impl ResourceSynthesizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn synthesize(&self, requirement: &ResourceRequirement) -> ForgeResult<SynthesizedResource> {
        let category = requirement.category;
        let invalid = || {
            ForgeError::invalid_resource_kind(&requirement.kind, category.as_str(), category.valid_kinds())
                .with_context("resource", &requirement.name)
        };

        let rendered: Rendered = match category {
            ResourceCategory::Tool => match requirement.kind.parse::<ToolKind>().map_err(|_| invalid())? {
                ToolKind::Command => templates::command_wrapper(requirement)?,
                ToolKind::Api => templates::api_wrapper(requirement)?,
                ToolKind::Library => templates::library_wrapper(requirement)?,
                ToolKind::Service => templates::service_wrapper(requirement)?,
            },
            ResourceCategory::Hook => {
                let phase = requirement.kind.parse::<HookPhase>().map_err(|_| invalid())?;
                templates::hook(requirement, phase)?
            }
        };

        let resource = SynthesizedResource {
            id: format!("{}-{}", category.as_str(), Uuid::new_v4()),
            name: requirement.name.clone(),
            category,
            kind: requirement.kind.clone(),
            description: requirement.description.clone(),
            shape: rendered.shape,
            payload: rendered.payload,
            parameters: requirement.parameters.clone(),
            source: rendered.source,
            input_schema: rendered.input_schema,
            output_schema: rendered.output_schema,
            dependencies: rendered.dependencies,
            created_at: Utc::now(),
        };

        match category {
            ResourceCategory::Tool => self.tools_created.fetch_add(1, Ordering::Relaxed),
            ResourceCategory::Hook => self.hooks_created.fetch_add(1, Ordering::Relaxed),
        };

        info!(
            "Synthesized {} {} ({}) as {} [{}]",
            category, resource.name, resource.kind, resource.shape, resource.id
        );
        debug!("Resource {} depends on {:?}", resource.id, resource.dependencies);

        Ok(resource)
    }

    pub fn counts(&self) -> SynthesisCounts {
        SynthesisCounts {
            tools: self.tools_created.load(Ordering::Relaxed),
            hooks: self.hooks_created.load(Ordering::Relaxed),
        }
    }
}
