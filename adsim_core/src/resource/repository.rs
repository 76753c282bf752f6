//! Uniform create/get/update/list over an injected [`ResourceStore`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Duration, Utc};
use serde_json::{Map, Value};
use tracing::{debug, instrument};

use super::store::ResourceStore;
use super::types::{Resource, ResourceType};
use crate::error::ApiError;
use crate::pagination::{Page, PageRequest, paginate};
use crate::platform::{Platform, adapter};

/// How a filter compares the stored value.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterOp {
    /// Equal to any of the listed values.
    In(Vec<Value>),
    /// Case-insensitive substring of a string field.
    Contains(String),
}

/// A predicate on one dotted field path.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldFilter {
    pub path: String,
    pub op: FilterOp,
}

impl FieldFilter {
    pub fn equals(path: impl Into<String>, value: impl Into<Value>) -> Self {
        FieldFilter { path: path.into(), op: FilterOp::In(vec![value.into()]) }
    }

    pub fn any_of(path: impl Into<String>, values: Vec<Value>) -> Self {
        FieldFilter { path: path.into(), op: FilterOp::In(values) }
    }

    pub fn contains(path: impl Into<String>, needle: impl Into<String>) -> Self {
        FieldFilter { path: path.into(), op: FilterOp::Contains(needle.into()) }
    }

    pub fn matches(&self, resource: &Resource) -> bool {
        let Some(actual) = resource.field(&self.path) else {
            return false;
        };
        match &self.op {
            FilterOp::In(values) => values.iter().any(|expected| loosely_equal(&actual, expected)),
            FilterOp::Contains(needle) => actual
                .as_str()
                .is_some_and(|s| s.to_lowercase().contains(&needle.to_lowercase())),
        }
    }
}

/// Strings and numbers compare by their textual form, so `"42"` matches
/// `42`.
fn loosely_equal(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::String(a), Value::Number(b)) | (Value::Number(b), Value::String(a)) => *a == b.to_string(),
        _ => actual == expected,
    }
}

/// Filters, window and projection for a listing.
#[derive(Debug, Clone, PartialEq)]
pub struct ListQuery {
    pub filters: Vec<FieldFilter>,
    /// Top-level keys to keep. The identifier is always kept.
    pub fields: Option<Vec<String>>,
    pub page: PageRequest,
}

impl ListQuery {
    pub fn new(page: PageRequest) -> Self {
        ListQuery { filters: Vec::new(), fields: None, page }
    }

    pub fn filter(mut self, filter: FieldFilter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn project(mut self, fields: Option<Vec<String>>) -> Self {
        self.fields = fields.filter(|f| !f.is_empty());
        self
    }
}

/// Allocates identifiers and stamps timestamps; everything else is the
/// store's business.
#[derive(Clone)]
pub struct ResourceRepository {
    store: Arc<dyn ResourceStore>,
    /// One allocator per platform, indexed by [`Platform::index`]. Never
    /// reset, so identifiers are never reused.
    counters: Arc<[AtomicU64; 6]>,
}

impl ResourceRepository {
    pub fn new(store: Arc<dyn ResourceStore>) -> Self {
        ResourceRepository { store, counters: Arc::new(Default::default()) }
    }

    fn next_seq(&self, platform: Platform) -> u64 {
        self.counters[platform.index()].fetch_add(1, Ordering::Relaxed) + 1
    }

    #[instrument(skip(self, fields), level = "debug")]
    pub async fn create(
        &self,
        resource_type: ResourceType,
        scope: &str,
        fields: Map<String, Value>,
    ) -> Result<Resource, ApiError> {
        let platform = resource_type.platform();
        let seq = self.next_seq(platform);
        let now = Utc::now();
        let resource = Resource {
            id: adapter(platform).format_id(resource_type, seq),
            resource_type,
            scope: scope.to_string(),
            fields,
            seq,
            created_at: now,
            updated_at: now,
        };
        self.store.create(resource.clone()).await?;
        debug!(id = %resource.id, "resource created");
        Ok(resource)
    }

    pub async fn find(&self, resource_type: ResourceType, id: &str) -> Result<Option<Resource>, ApiError> {
        Ok(self.store.find(resource_type, id).await?)
    }

    pub async fn get(&self, resource_type: ResourceType, id: &str) -> Result<Resource, ApiError> {
        self.find(resource_type, id)
            .await?
            .ok_or_else(|| ApiError::not_found(resource_type, id))
    }

    /// Shallow merge of `patch` over the stored fields.
    #[instrument(skip(self, patch), level = "debug")]
    pub async fn update(
        &self,
        resource_type: ResourceType,
        id: &str,
        patch: Map<String, Value>,
    ) -> Result<Resource, ApiError> {
        let updated = self
            .store
            .update(
                resource_type,
                id,
                Box::new(move |resource: &mut Resource| {
                    for (key, value) in patch {
                        resource.fields.insert(key, value);
                    }
                    resource.updated_at = later_than(resource.updated_at);
                }),
            )
            .await?;
        updated.ok_or_else(|| ApiError::not_found(resource_type, id))
    }

    /// Filters, orders by creation, paginates and projects.
    pub async fn list(
        &self,
        resource_type: ResourceType,
        scope: &str,
        query: &ListQuery,
    ) -> Result<Page<Resource>, ApiError> {
        let matching: Vec<Resource> = self
            .store
            .list(resource_type, scope)
            .await?
            .into_iter()
            .filter(|resource| query.filters.iter().all(|filter| filter.matches(resource)))
            .collect();
        let page = paginate(matching, query.page);
        Ok(match &query.fields {
            Some(fields) => page.map(|resource| project(resource, fields)),
            None => page,
        })
    }

    /// Number of records in a scope, ignoring any filter.
    pub async fn count(&self, resource_type: ResourceType, scope: &str) -> Result<usize, ApiError> {
        Ok(self.store.list(resource_type, scope).await?.len())
    }

    /// Drops every record. Identifier allocators keep counting.
    pub async fn reset(&self) -> Result<(), ApiError> {
        self.store.clear().await?;
        Ok(())
    }
}

/// A modification time strictly after `previous`, even when the clock has
/// not moved.
fn later_than(previous: DateTime<Utc>) -> DateTime<Utc> {
    let now = Utc::now();
    if now > previous { now } else { previous + Duration::microseconds(1) }
}

fn project(mut resource: Resource, fields: &[String]) -> Resource {
    resource.fields.retain(|key, _| {
        fields
            .iter()
            .any(|wanted| wanted.split('.').next() == Some(key.as_str()))
    });
    resource
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::resource::store::InMemoryResourceStore;

    fn repository() -> ResourceRepository {
        ResourceRepository::new(Arc::new(InMemoryResourceStore::new()))
    }

    fn fields(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn update_merges_and_bumps_the_clock() {
        let repo = repository();
        let created = repo
            .create(ResourceType::TikTokCampaign, "adv1", fields(json!({"campaign_name": "A", "budget": 100})))
            .await
            .unwrap();
        let updated = repo
            .update(ResourceType::TikTokCampaign, &created.id, fields(json!({"budget": 200})))
            .await
            .unwrap();
        assert_eq!(updated.id, created.id);
        assert_eq!(updated.created_at, created.created_at);
        assert!(updated.updated_at > created.updated_at);
        assert_eq!(updated.fields["campaign_name"], "A");
        assert_eq!(updated.fields["budget"], 200);
    }

    #[tokio::test]
    async fn missing_records_are_not_found() {
        let repo = repository();
        let err = repo.get(ResourceType::MetaAd, "nope").await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound { .. }));
        let err = repo
            .update(ResourceType::MetaAd, "nope", Map::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound { .. }));
    }

    #[tokio::test]
    async fn identifiers_survive_reset() {
        let repo = repository();
        let first = repo.create(ResourceType::Dv360Campaign, "a", Map::new()).await.unwrap();
        repo.reset().await.unwrap();
        let second = repo.create(ResourceType::Dv360Campaign, "a", Map::new()).await.unwrap();
        assert_ne!(first.id, second.id);
        assert!(repo.get(ResourceType::Dv360Campaign, &first.id).await.is_err());
    }

    #[tokio::test]
    async fn list_filters_scopes_and_projects() {
        let repo = repository();
        for (scope, status) in [("s1", "ACTIVE"), ("s1", "PAUSED"), ("s2", "ACTIVE"), ("s1", "ACTIVE")] {
            repo.create(
                ResourceType::MetaCampaign,
                scope,
                fields(json!({"name": format!("{}-{}", scope, status), "status": status})),
            )
            .await
            .unwrap();
        }
        let query = ListQuery::new(PageRequest { offset: 0, page_size: 10 })
            .filter(FieldFilter::equals("status", "ACTIVE"))
            .project(Some(vec!["status".to_string()]));
        let page = repo.list(ResourceType::MetaCampaign, "s1", &query).await.unwrap();
        assert_eq!(page.total, 2);
        assert!(page.items.iter().all(|r| r.fields.get("name").is_none()));
        assert!(page.items[0].seq < page.items[1].seq);
        assert_eq!(repo.count(ResourceType::MetaCampaign, "s1").await.unwrap(), 3);
    }

    #[test]
    fn numbers_match_numeric_strings() {
        assert!(loosely_equal(&json!("42"), &json!(42)));
        assert!(loosely_equal(&json!(42), &json!("42")));
        assert!(!loosely_equal(&json!("42"), &json!("43")));
    }
}
