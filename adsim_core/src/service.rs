//! Orchestrates a resource mutation: validate, normalise, resolve parents,
//! persist.

use serde_json::{Map, Value};
use tracing::{debug, instrument};

use crate::error::{ApiError, Constraint, ValidationError};
use crate::pagination::Page;
use crate::platform::{PlatformAdapter, adapter};
use crate::resource::repository::{ListQuery, ResourceRepository};
use crate::resource::types::{Resource, ResourceType};
use crate::validation::{self, Mode, Reference};

/// Platform-agnostic resource operations. Platform specifics come from the
/// adapter picked by the resource type.
#[derive(Clone)]
pub struct AdService {
    repository: ResourceRepository,
}

impl AdService {
    pub fn new(repository: ResourceRepository) -> Self {
        AdService { repository }
    }

    pub fn repository(&self) -> &ResourceRepository {
        &self.repository
    }

    #[instrument(skip(self, fields), level = "debug")]
    pub async fn create(
        &self,
        resource_type: ResourceType,
        scope: &str,
        mut fields: Map<String, Value>,
    ) -> Result<Resource, ApiError> {
        let adapter = adapter(resource_type.platform());
        let references = validation::check(adapter, resource_type, Mode::Create, &fields, None)
            .map_err(ApiError::Validation)?;
        adapter.normalize(resource_type, Mode::Create, &mut fields);
        self.resolve(adapter, scope, &references).await?;
        self.repository.create(resource_type, scope, fields).await
    }

    /// Validates `patch` against the stored record and merges it.
    #[instrument(skip(self, patch), level = "debug")]
    pub async fn update(
        &self,
        resource_type: ResourceType,
        scope: Option<&str>,
        id: &str,
        mut patch: Map<String, Value>,
    ) -> Result<Resource, ApiError> {
        let existing = self.get(resource_type, scope, id).await?;
        let adapter = adapter(resource_type.platform());
        let references = validation::check(adapter, resource_type, Mode::Update, &patch, Some(&existing.fields))
            .map_err(ApiError::Validation)?;
        adapter.normalize(resource_type, Mode::Update, &mut patch);
        self.resolve(adapter, &existing.scope, &references).await?;
        self.repository.update(resource_type, id, patch).await
    }

    /// Fetches a record. With a scope, records of other scopes are reported
    /// as missing.
    pub async fn get(&self, resource_type: ResourceType, scope: Option<&str>, id: &str) -> Result<Resource, ApiError> {
        let resource = self.repository.get(resource_type, id).await?;
        match scope {
            Some(scope) if scope != resource.scope => Err(ApiError::not_found(resource_type, id)),
            _ => Ok(resource),
        }
    }

    /// Tries each type in order and returns the first hit.
    pub async fn find_any(&self, candidates: &[ResourceType], id: &str) -> Result<Resource, ApiError> {
        for &resource_type in candidates {
            if let Some(resource) = self.repository.find(resource_type, id).await? {
                return Ok(resource);
            }
        }
        let first = candidates
            .first()
            .copied()
            .ok_or_else(|| ApiError::internal("typed lookup without candidates"))?;
        Err(ApiError::not_found(first, id))
    }

    pub async fn list(
        &self,
        resource_type: ResourceType,
        scope: &str,
        query: &ListQuery,
    ) -> Result<Page<Resource>, ApiError> {
        self.repository.list(resource_type, scope, query).await
    }

    /// Applies the platform's delete transition. Records are never removed.
    #[instrument(skip(self), level = "debug")]
    pub async fn delete(&self, resource_type: ResourceType, scope: Option<&str>, id: &str) -> Result<Resource, ApiError> {
        let existing = self.get(resource_type, scope, id).await?;
        let patch = adapter(resource_type.platform()).delete_patch(&existing)?;
        self.repository.update(resource_type, id, patch).await
    }

    pub async fn reset(&self) -> Result<(), ApiError> {
        self.repository.reset().await
    }

    /// Every reference must name an existing parent in the same scope.
    async fn resolve(
        &self,
        adapter: &dyn PlatformAdapter,
        scope: &str,
        references: &[Reference],
    ) -> Result<(), ApiError> {
        for reference in references {
            let violation = |constraint: Constraint| {
                let code = adapter.violation_code(&constraint);
                ApiError::Validation(ValidationError::new(reference.field, constraint, code))
            };
            let id = adapter
                .reference_id(reference.target, &reference.raw)
                .ok_or_else(|| violation(Constraint::Format(reference.target.name())))?;
            match self.repository.find(reference.target, &id).await? {
                Some(parent) if parent.scope == scope => {
                    debug!(field = reference.field, parent = %id, "reference resolved");
                }
                _ => return Err(violation(Constraint::Reference(reference.target))),
            }
        }
        Ok(())
    }
}
