//! In-memory DAO
//!
//! Backs fixtures, tests and the demo host. The store is shared between DAO
//! instances so that every factory call sees the same data.

use super::{BaseDao, Dao, Operation, Page, PaginatedDao, RequestContext};
use crate::error::{DaoError, Result};
use crate::resource::{raw_json, Resource};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug)]
struct StoreInner<T> {
    items: Vec<T>,
    in_use: HashMap<String, String>,
}

/// Shared backing store of a [`MemoryDao`]
#[derive(Debug)]
pub struct MemoryStore<T> {
    inner: Arc<RwLock<StoreInner<T>>>,
}

impl<T> Clone for MemoryStore<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Resource + Clone> MemoryStore<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(StoreInner {
                items,
                in_use: HashMap::new(),
            })),
        }
    }

    pub async fn insert(&self, item: T) {
        self.inner.write().await.items.push(item);
    }

    /// Make deletes of `id` fail with [`DaoError::InUse`]
    pub async fn mark_in_use(&self, id: &str, reason: &str) {
        self.inner
            .write()
            .await
            .in_use
            .insert(id.to_string(), reason.to_string());
    }

    /// Apply `f` to the item with `id`; false when absent
    pub async fn update<F>(&self, id: &str, f: F) -> bool
    where
        F: FnOnce(&mut T),
    {
        let mut inner = self.inner.write().await;
        match inner.items.iter_mut().find(|item| item.id() == id) {
            Some(item) => {
                f(item);
                true
            }
            None => false,
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.items.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.inner.read().await.items.iter().any(|item| item.id() == id)
    }
}

/// DAO over a [`MemoryStore`]
pub struct MemoryDao<T> {
    base: BaseDao,
    store: MemoryStore<T>,
    capabilities: Vec<Operation>,
}

impl<T: Resource + Clone> MemoryDao<T> {
    pub fn new(service: &str, resource_type: &str, store: MemoryStore<T>) -> Self {
        Self {
            base: BaseDao::new(service, resource_type),
            store,
            capabilities: Operation::ALL
                .into_iter()
                .filter(|op| super::default_supports(*op))
                .collect(),
        }
    }

    /// Drop the delete capability
    pub fn read_only(mut self) -> Self {
        self.capabilities.retain(|op| *op != Operation::Delete);
        self
    }

    pub fn store(&self) -> &MemoryStore<T> {
        &self.store
    }

    async fn matching(&self, ctx: &RequestContext) -> Vec<T> {
        let inner = self.store.inner.read().await;
        inner
            .items
            .iter()
            .filter(|item| matches_filters(*item, ctx))
            .cloned()
            .collect()
    }
}

/// True when `resource` satisfies every filter in `ctx`.
///
/// A filter matches a top-level field of the JSON payload (strings, numbers
/// and booleans compared by their text) or, failing that, a tag.
pub fn matches_filters(resource: &dyn Resource, ctx: &RequestContext) -> bool {
    ctx.filters().all(|(key, expected)| {
        let field = raw_json(resource).and_then(|raw| raw.get(key.as_str()));
        match field {
            Some(Value::String(s)) => s == expected,
            Some(Value::Number(n)) => n.to_string() == expected,
            Some(Value::Bool(b)) => b.to_string() == expected,
            _ => resource
                .tags()
                .get(key.as_str())
                .is_some_and(|v| v == expected),
        }
    })
}

fn parse_page_token(token: &str) -> Result<usize> {
    if token.is_empty() {
        return Ok(0);
    }
    token
        .parse()
        .map_err(|_| DaoError::invalid_argument(format!("invalid page token: {}", token)))
}

#[async_trait]
impl<T: Resource + Clone> Dao for MemoryDao<T> {
    fn service_name(&self) -> &str {
        self.base.service_name()
    }

    fn resource_type(&self) -> &str {
        self.base.resource_type()
    }

    async fn list(&self, ctx: &RequestContext) -> Result<Vec<Box<dyn Resource>>> {
        ctx.check()?;
        Ok(self
            .matching(ctx)
            .await
            .into_iter()
            .map(|item| Box::new(item) as Box<dyn Resource>)
            .collect())
    }

    async fn get(&self, ctx: &RequestContext, id: &str) -> Result<Box<dyn Resource>> {
        ctx.check()?;
        let inner = self.store.inner.read().await;
        inner
            .items
            .iter()
            .find(|item| item.id() == id)
            .map(|item| Box::new(item.clone()) as Box<dyn Resource>)
            .ok_or_else(|| self.base.not_found(id))
    }

    async fn delete(&self, ctx: &RequestContext, id: &str) -> Result<()> {
        ctx.check()?;
        let mut inner = self.store.inner.write().await;
        let Some(index) = inner.items.iter().position(|item| item.id() == id) else {
            tracing::debug!("delete {} {}: not present", self.base.resource_type(), id);
            return Ok(());
        };
        if let Some(reason) = inner.in_use.get(id) {
            return Err(self.base.in_use(id, reason));
        }
        inner.items.remove(index);
        Ok(())
    }

    fn supports(&self, op: Operation) -> bool {
        self.capabilities.contains(&op)
    }

    fn as_paginated(&self) -> Option<&dyn PaginatedDao> {
        Some(self)
    }
}

#[async_trait]
impl<T: Resource + Clone> PaginatedDao for MemoryDao<T> {
    async fn list_page(&self, ctx: &RequestContext, page_size: usize, page_token: &str) -> Result<Page> {
        ctx.check()?;
        let offset = parse_page_token(page_token)?;
        let matching = self.matching(ctx).await;

        let total = matching.len();
        let start = offset.min(total);
        let end = offset.saturating_add(page_size).min(total);
        let items = matching
            .into_iter()
            .skip(start)
            .take(end - start)
            .map(|item| Box::new(item) as Box<dyn Resource>)
            .collect();
        let next_token = if end < total {
            end.to_string()
        } else {
            String::new()
        };

        Ok(Page { items, next_token })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::{delete_resource, list_all_pages, list_resources};
    use crate::resource::BaseResource;
    use serde_json::json;

    fn subnet(id: &str, vpc: &str) -> BaseResource {
        BaseResource::new(id, id).with_raw(json!({ "SubnetId": id, "VpcId": vpc }))
    }

    fn store() -> MemoryStore<BaseResource> {
        MemoryStore::new(vec![
            subnet("s-1", "vpc-a"),
            subnet("s-2", "vpc-b"),
            subnet("s-3", "vpc-a"),
            subnet("s-4", "vpc-a"),
            subnet("s-5", "vpc-b"),
        ])
    }

    fn ids(items: &[Box<dyn Resource>]) -> Vec<String> {
        items.iter().map(|r| r.id()).collect()
    }

    #[tokio::test]
    async fn test_list_applies_filter() {
        let dao = MemoryDao::new("ec2", "subnets", store());
        let ctx = RequestContext::new().with_filter("VpcId", "vpc-a");
        let items = list_resources(&dao, &ctx).await.unwrap();
        assert_eq!(ids(&items), vec!["s-1", "s-3", "s-4"]);
    }

    #[tokio::test]
    async fn test_filter_falls_back_to_tags() {
        let dao = MemoryDao::new(
            "s3",
            "buckets",
            MemoryStore::new(vec![
                BaseResource::new("logs", "logs").with_tag("team", "core"),
                BaseResource::new("media", "media").with_tag("team", "web"),
            ]),
        );
        let ctx = RequestContext::new().with_filter("team", "web");
        let items = list_resources(&dao, &ctx).await.unwrap();
        assert_eq!(ids(&items), vec!["media"]);
    }

    #[tokio::test]
    async fn test_pages_resume_without_gaps_or_duplicates() {
        let dao = MemoryDao::new("ec2", "subnets", store());
        let ctx = RequestContext::new();

        let first = dao.list_page(&ctx, 2, "").await.unwrap();
        assert_eq!(ids(&first.items), vec!["s-1", "s-2"]);
        assert!(first.has_more());

        let second = dao.list_page(&ctx, 2, &first.next_token).await.unwrap();
        assert_eq!(ids(&second.items), vec!["s-3", "s-4"]);

        let third = dao.list_page(&ctx, 2, &second.next_token).await.unwrap();
        assert_eq!(ids(&third.items), vec!["s-5"]);
        assert_eq!(third.next_token, "");
    }

    #[tokio::test]
    async fn test_list_all_pages_matches_list() {
        let dao = MemoryDao::new("ec2", "subnets", store());
        let ctx = RequestContext::new().with_filter("VpcId", "vpc-a");
        let paged = list_all_pages(&dao, &ctx, 2).await.unwrap();
        let full = list_resources(&dao, &ctx).await.unwrap();
        assert_eq!(ids(&paged), ids(&full));
    }

    #[tokio::test]
    async fn test_invalid_page_token() {
        let dao = MemoryDao::new("ec2", "subnets", store());
        let err = dao
            .list_page(&RequestContext::new(), 2, "not-a-token")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("invalid page token"));
    }

    #[tokio::test]
    async fn test_delete_absent_id_succeeds() {
        let dao = MemoryDao::new("ec2", "subnets", store());
        dao.delete(&RequestContext::new(), "s-404").await.unwrap();
        assert_eq!(dao.store().len().await, 5);
    }

    #[tokio::test]
    async fn test_delete_in_use_is_distinguishable() {
        let dao = MemoryDao::new("ec2", "subnets", store());
        dao.store().mark_in_use("s-1", "has network interfaces").await;

        let err = delete_resource(&dao, &RequestContext::new(), "s-1")
            .await
            .unwrap_err();
        assert!(err.is_in_use());
        assert!(dao.store().contains("s-1").await);
    }

    #[tokio::test]
    async fn test_delete_absent_id_ignores_in_use_marker() {
        let dao = MemoryDao::new("ec2", "subnets", store());
        dao.store().mark_in_use("s-9", "has dependents").await;

        delete_resource(&dao, &RequestContext::new(), "s-9").await.unwrap();
        assert_eq!(dao.store().len().await, 5);
    }

    #[tokio::test]
    async fn test_empty_filter_value_does_not_narrow() {
        let dao = MemoryDao::new("ec2", "subnets", store());
        let ctx = RequestContext::new().with_filter("VpcId", "");
        assert_eq!(ctx.filter("VpcId"), "");

        let items = list_resources(&dao, &ctx).await.unwrap();
        assert_eq!(items.len(), 5);
    }

    #[tokio::test]
    async fn test_list_all_pages_checks_capability_first() {
        struct NoList(MemoryDao<BaseResource>);

        #[async_trait]
        impl Dao for NoList {
            fn service_name(&self) -> &str {
                self.0.service_name()
            }
            fn resource_type(&self) -> &str {
                self.0.resource_type()
            }
            async fn list(&self, ctx: &RequestContext) -> Result<Vec<Box<dyn Resource>>> {
                self.0.list(ctx).await
            }
            async fn get(&self, ctx: &RequestContext, id: &str) -> Result<Box<dyn Resource>> {
                self.0.get(ctx, id).await
            }
            async fn delete(&self, ctx: &RequestContext, id: &str) -> Result<()> {
                self.0.delete(ctx, id).await
            }
            fn supports(&self, op: Operation) -> bool {
                op != Operation::List
            }
            fn as_paginated(&self) -> Option<&dyn PaginatedDao> {
                Some(&self.0)
            }
        }

        let dao = NoList(MemoryDao::new("ec2", "subnets", store()));
        let err = list_all_pages(&dao, &RequestContext::new(), 2).await.unwrap_err();
        assert!(matches!(err, DaoError::Unsupported { operation: Operation::List }));
    }

    #[tokio::test]
    async fn test_zero_page_size_is_invalid_argument() {
        let dao = MemoryDao::new("ec2", "subnets", store());
        let err = list_all_pages(&dao, &RequestContext::new(), 0).await.unwrap_err();
        assert!(matches!(err, DaoError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_delete_removes_item() {
        let dao = MemoryDao::new("ec2", "subnets", store());
        delete_resource(&dao, &RequestContext::new(), "s-2").await.unwrap();
        assert!(!dao.store().contains("s-2").await);
    }

    #[tokio::test]
    async fn test_read_only_dao() {
        let dao = MemoryDao::new("ec2", "subnets", store()).read_only();
        assert!(!dao.supports(Operation::Delete));
        assert!(dao.supports(Operation::List));
    }
}
