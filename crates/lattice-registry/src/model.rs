//! Domain model of the registry: projects, targets, actions, versions and
//! the schema union.
//!
//! Behaviour differences between project kinds live in the capability table
//! on [`ProjectKind`] and in the orchestrator variants, never in
//! inheritance.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use lattice_core::id::{ActionId, OrganizationId, ProjectId, TargetId, VersionId};
use lattice_schema::{ExternalComposition, OrchestratorConfig, SchemaInput};

/// The composition mode of a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProjectKind {
    /// One schema per target, no composition.
    Single,
    /// In-process schema stitching.
    Stitching,
    /// Federation composed by the external composition service.
    Federation,
    /// Tenant-supplied composition hooks.
    Custom,
}

impl ProjectKind {
    /// True for project kinds with per-service schema sets.
    #[must_use]
    pub fn is_composite(self) -> bool {
        matches!(self, Self::Stitching | Self::Federation)
    }

    /// True when schema metadata is published to the CDN.
    #[must_use]
    pub fn supports_metadata(self) -> bool {
        !matches!(self, Self::Custom)
    }

    /// True when a base-schema preamble participates in validation.
    /// Federation has no base-schema affordance.
    #[must_use]
    pub fn supports_base_schema(self) -> bool {
        matches!(self, Self::Single | Self::Stitching)
    }

    /// True when a supergraph artifact exists.
    #[must_use]
    pub fn supports_supergraph(self) -> bool {
        matches!(self, Self::Federation)
    }

    /// True when every publish must name its service.
    #[must_use]
    pub fn requires_service_name(self) -> bool {
        self.is_composite()
    }

    /// True when every publish must carry a service URL.
    #[must_use]
    pub fn requires_service_url(self) -> bool {
        matches!(self, Self::Federation)
    }
}

/// A project: fixes composition mode and registry model for its targets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    /// Project id.
    pub id: ProjectId,
    /// Owning organization.
    pub organization_id: OrganizationId,
    /// Project name.
    pub name: String,
    /// Composition mode.
    pub kind: ProjectKind,
    /// True for projects still on the legacy registry model.
    pub is_using_legacy_registry_model: bool,
    /// External composition settings (federation only).
    pub external_composition: Option<ExternalComposition>,
    /// Linked git repository, when configured.
    pub git_repository: Option<String>,
    /// Validation hook URL (custom only).
    pub validation_url: Option<String>,
    /// Build hook URL (custom only).
    pub build_url: Option<String>,
}

impl Project {
    /// Maps project settings onto the orchestrator configuration.
    #[must_use]
    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            external: self.external_composition.clone(),
            validation_url: self.validation_url.clone(),
            build_url: self.build_url.clone(),
            strip_federation_machinery: self.kind == ProjectKind::Federation
                && !self.is_using_legacy_registry_model,
        }
    }
}

/// A target: the append point of a project's schema history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Target {
    /// Target id.
    pub id: TargetId,
    /// Owning project.
    pub project_id: ProjectId,
    /// Owning organization.
    pub organization_id: OrganizationId,
    /// Target name.
    pub name: String,
    /// Preamble concatenated ahead of SDL during validation.
    pub base_schema: Option<String>,
}

/// An organization, loaded for authorization context only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organization {
    /// Organization id.
    pub id: OrganizationId,
    /// Organization name.
    pub name: String,
}

/// What a single action did to the target's schema set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionKind {
    /// A new service entered the set.
    Add,
    /// An existing service was replaced.
    Modify,
    /// A service left the set.
    Delete,
    /// Single/custom projects have no per-service actions.
    NotApplicable,
}

/// One immutable publish or delete event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    /// Action id.
    pub id: ActionId,
    /// Who published.
    pub author: String,
    /// When the action was recorded.
    pub created_at: DateTime<Utc>,
    /// Client-supplied revision tag.
    pub commit: String,
    /// What the action did.
    pub kind: ActionKind,
    /// Service name; required for composite projects.
    pub service_name: Option<String>,
    /// Service URL, for federation subgraphs.
    pub service_url: Option<String>,
    /// The published SDL; `None` exactly for deletes.
    pub sdl: Option<String>,
    /// Arbitrary JSON metadata string.
    pub metadata: Option<String>,
}

/// An edge naming one live action of a version.
///
/// The service name is denormalized onto the edge so the next version's
/// live set can be computed without re-reading every action record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveEdge {
    /// The live action.
    pub action_id: ActionId,
    /// The action's service name, when it has one.
    pub service_name: Option<String>,
}

/// A snapshot tying an action to the complete live service set after it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Version {
    /// Version id; sorts by creation time.
    pub id: VersionId,
    /// The target this version belongs to.
    pub target_id: TargetId,
    /// When the version was recorded.
    pub created_at: DateTime<Utc>,
    /// The composed schema passed composition rules at write time.
    /// Flippable afterwards on the legacy registry model only.
    pub is_composable: bool,
    /// Base schema in effect when the version was created.
    pub base_schema: Option<String>,
    /// The action that produced this version.
    pub action_id: ActionId,
    /// The version this one was derived from.
    pub previous_version_id: Option<VersionId>,
    /// The complete set of live actions after this version's action.
    ///
    /// Stored explicitly, never recomputed by walking history: a delete
    /// must hide prior actions without rewriting them.
    pub live_edges: Vec<LiveEdge>,
}

/// A version's member schema, projected from its action.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Schema {
    /// The one schema of a single/custom target.
    Single {
        /// Producing action.
        action_id: ActionId,
        /// The SDL.
        sdl: String,
        /// Metadata JSON string.
        metadata: Option<String>,
        /// Publication date.
        date: DateTime<Utc>,
    },
    /// A service newly added to the composite set.
    AddedComposite {
        /// Producing action.
        action_id: ActionId,
        /// Service name.
        service_name: String,
        /// Service URL.
        service_url: Option<String>,
        /// The SDL.
        sdl: String,
        /// Metadata JSON string.
        metadata: Option<String>,
        /// Publication date.
        date: DateTime<Utc>,
    },
    /// A service replacing its previous revision.
    ModifiedComposite {
        /// Producing action.
        action_id: ActionId,
        /// Service name.
        service_name: String,
        /// Service URL.
        service_url: Option<String>,
        /// The SDL.
        sdl: String,
        /// Metadata JSON string.
        metadata: Option<String>,
        /// Publication date.
        date: DateTime<Utc>,
    },
    /// A service removed from the composite set.
    DeletedComposite {
        /// Producing action.
        action_id: ActionId,
        /// Service name.
        service_name: String,
        /// Deletion date.
        date: DateTime<Utc>,
    },
}

impl Schema {
    /// Projects an action into the schema union.
    #[must_use]
    pub fn from_action(action: &Action) -> Self {
        match action.kind {
            ActionKind::NotApplicable => Self::Single {
                action_id: action.id,
                sdl: action.sdl.clone().unwrap_or_default(),
                metadata: action.metadata.clone(),
                date: action.created_at,
            },
            ActionKind::Add => Self::AddedComposite {
                action_id: action.id,
                service_name: action.service_name.clone().unwrap_or_default(),
                service_url: action.service_url.clone(),
                sdl: action.sdl.clone().unwrap_or_default(),
                metadata: action.metadata.clone(),
                date: action.created_at,
            },
            ActionKind::Modify => Self::ModifiedComposite {
                action_id: action.id,
                service_name: action.service_name.clone().unwrap_or_default(),
                service_url: action.service_url.clone(),
                sdl: action.sdl.clone().unwrap_or_default(),
                metadata: action.metadata.clone(),
                date: action.created_at,
            },
            ActionKind::Delete => Self::DeletedComposite {
                action_id: action.id,
                service_name: action.service_name.clone().unwrap_or_default(),
                date: action.created_at,
            },
        }
    }

    /// The producing action id.
    #[must_use]
    pub fn action_id(&self) -> ActionId {
        match self {
            Self::Single { action_id, .. }
            | Self::AddedComposite { action_id, .. }
            | Self::ModifiedComposite { action_id, .. }
            | Self::DeletedComposite { action_id, .. } => *action_id,
        }
    }

    /// The service name, for composite members.
    #[must_use]
    pub fn service_name(&self) -> Option<&str> {
        match self {
            Self::Single { .. } => None,
            Self::AddedComposite { service_name, .. }
            | Self::ModifiedComposite { service_name, .. }
            | Self::DeletedComposite { service_name, .. } => Some(service_name),
        }
    }

    /// The service URL, when one exists.
    #[must_use]
    pub fn service_url(&self) -> Option<&str> {
        match self {
            Self::AddedComposite { service_url, .. }
            | Self::ModifiedComposite { service_url, .. } => service_url.as_deref(),
            _ => None,
        }
    }

    /// The SDL, absent only for deleted members.
    #[must_use]
    pub fn sdl(&self) -> Option<&str> {
        match self {
            Self::Single { sdl, .. }
            | Self::AddedComposite { sdl, .. }
            | Self::ModifiedComposite { sdl, .. } => Some(sdl),
            Self::DeletedComposite { .. } => None,
        }
    }

    /// The metadata JSON string, when one exists.
    #[must_use]
    pub fn metadata(&self) -> Option<&str> {
        match self {
            Self::Single { metadata, .. }
            | Self::AddedComposite { metadata, .. }
            | Self::ModifiedComposite { metadata, .. } => metadata.as_deref(),
            Self::DeletedComposite { .. } => None,
        }
    }

    /// The publication date.
    #[must_use]
    pub fn date(&self) -> DateTime<Utc> {
        match self {
            Self::Single { date, .. }
            | Self::AddedComposite { date, .. }
            | Self::ModifiedComposite { date, .. }
            | Self::DeletedComposite { date, .. } => *date,
        }
    }

    /// Converts a live schema into an orchestrator input.
    ///
    /// Returns `None` for deleted members, which carry no SDL.
    #[must_use]
    pub fn to_input(&self) -> Option<SchemaInput> {
        let sdl = self.sdl()?;
        let source = self
            .service_name()
            .unwrap_or("single")
            .to_string();
        let mut input = SchemaInput::new(sdl, source);
        input.url = self.service_url().map(ToString::to_string);
        Some(input)
    }
}

/// Converts a live schema set into orchestrator inputs, skipping deleted
/// members.
#[must_use]
pub fn schema_inputs(schemas: &[Schema]) -> Vec<SchemaInput> {
    schemas.iter().filter_map(Schema::to_input).collect()
}
