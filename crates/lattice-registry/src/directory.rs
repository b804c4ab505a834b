//! Resolution of projects, targets and organizations.
//!
//! Entity management is outside the registry; the coordinator only ever
//! reads these records, so the boundary is a small read-only trait. The
//! in-memory implementation backs tests and local development.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

use lattice_core::id::{OrganizationId, ProjectId, TargetId};
use lattice_core::{Error, Result};

use crate::model::{Organization, Project, Target};

/// Read-only access to the entities that own schema history.
#[async_trait]
pub trait RegistryDirectory: Send + Sync {
    /// Resolves a project.
    ///
    /// # Errors
    ///
    /// Returns `Error::ResourceNotFound` for unknown ids.
    async fn project(&self, id: ProjectId) -> Result<Project>;

    /// Resolves a target.
    ///
    /// # Errors
    ///
    /// Returns `Error::ResourceNotFound` for unknown ids.
    async fn target(&self, id: TargetId) -> Result<Target>;

    /// Resolves an organization.
    ///
    /// # Errors
    ///
    /// Returns `Error::ResourceNotFound` for unknown ids.
    async fn organization(&self, id: OrganizationId) -> Result<Organization>;
}

/// In-memory directory for tests and local development.
#[derive(Debug, Default)]
pub struct MemoryDirectory {
    projects: RwLock<HashMap<ProjectId, Project>>,
    targets: RwLock<HashMap<TargetId, Target>>,
    organizations: RwLock<HashMap<OrganizationId, Organization>>,
}

impl MemoryDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a project.
    pub fn insert_project(&self, project: Project) {
        self.projects
            .write()
            .expect("directory lock")
            .insert(project.id, project);
    }

    /// Registers a target.
    pub fn insert_target(&self, target: Target) {
        self.targets
            .write()
            .expect("directory lock")
            .insert(target.id, target);
    }

    /// Registers an organization.
    pub fn insert_organization(&self, organization: Organization) {
        self.organizations
            .write()
            .expect("directory lock")
            .insert(organization.id, organization);
    }
}

#[async_trait]
impl RegistryDirectory for MemoryDirectory {
    async fn project(&self, id: ProjectId) -> Result<Project> {
        self.projects
            .read()
            .expect("directory lock")
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::resource_not_found("project", id))
    }

    async fn target(&self, id: TargetId) -> Result<Target> {
        self.targets
            .read()
            .expect("directory lock")
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::resource_not_found("target", id))
    }

    async fn organization(&self, id: OrganizationId) -> Result<Organization> {
        self.organizations
            .read()
            .expect("directory lock")
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::resource_not_found("organization", id))
    }
}
