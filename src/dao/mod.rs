//! Data-access layer
//!
//! One [`Dao`] per (service, resource kind). The module is split as:
//!
//! - [`context`] - request-scoped cancellation, region and filter overlay
//! - [`pagination`] - the optional page-by-page extension
//! - [`memory`] - an in-memory DAO used for fixtures and tests
//!
//! Hosts call the free functions [`list_resources`], [`get_resource`] and
//! [`delete_resource`] rather than the trait methods directly: they check
//! capabilities, race the call against cancellation and apply the
//! idempotent-delete convention.

mod context;
pub mod memory;
mod pagination;

pub use context::{FilterKey, RequestContext};
pub use memory::MemoryDao;
pub use pagination::{list_all_pages, Page, PaginatedDao};

use crate::error::{DaoError, Result};
use crate::resource::Resource;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Capabilities a DAO can be asked about. Never used as a dispatch key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    List,
    Get,
    Create,
    Delete,
    Update,
}

impl Operation {
    pub const ALL: [Operation; 5] = [
        Operation::List,
        Operation::Get,
        Operation::Create,
        Operation::Delete,
        Operation::Update,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::List => "list",
            Self::Get => "get",
            Self::Create => "create",
            Self::Delete => "delete",
            Self::Update => "update",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = DaoError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|op| op.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| DaoError::unknown_operation(s))
    }
}

/// Standard capability set: list, get and delete
pub fn default_supports(op: Operation) -> bool {
    matches!(op, Operation::List | Operation::Get | Operation::Delete)
}

/// Uniform data-access contract for one (service, resource kind)
///
/// Implementations own at most a client handle and are created per logical
/// operation through the registry factory.
#[async_trait]
pub trait Dao: Send + Sync {
    fn service_name(&self) -> &str;
    fn resource_type(&self) -> &str;

    /// Every resource of this kind. May use an active filter in `ctx` to
    /// narrow the upstream query; the result must match an unfiltered
    /// fetch-then-filter.
    async fn list(&self, ctx: &RequestContext) -> Result<Vec<Box<dyn Resource>>>;

    /// Fails with [`DaoError::NotFound`] when `id` does not resolve.
    async fn get(&self, ctx: &RequestContext, id: &str) -> Result<Box<dyn Resource>>;

    /// Deleting an absent id succeeds. A resource with dependents fails with
    /// [`DaoError::InUse`].
    async fn delete(&self, ctx: &RequestContext, id: &str) -> Result<()>;

    fn supports(&self, op: Operation) -> bool {
        default_supports(op)
    }

    /// Paginated face of this DAO, if it has one
    fn as_paginated(&self) -> Option<&dyn PaginatedDao> {
        None
    }
}

/// Name bookkeeping shared by DAO implementations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseDao {
    service: String,
    resource_type: String,
}

impl BaseDao {
    pub fn new(service: &str, resource_type: &str) -> Self {
        Self {
            service: service.to_string(),
            resource_type: resource_type.to_string(),
        }
    }

    pub fn service_name(&self) -> &str {
        &self.service
    }

    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    pub fn supports(&self, op: Operation) -> bool {
        default_supports(op)
    }

    pub fn not_found(&self, id: &str) -> DaoError {
        DaoError::not_found(&self.resource_type, id)
    }

    pub fn in_use(&self, id: &str, reason: &str) -> DaoError {
        DaoError::in_use(&self.resource_type, id, reason)
    }

    /// Upstream failure of `operation` on `id`, labelled with this kind
    pub fn upstream(&self, operation: Operation, id: &str, source: impl Into<anyhow::Error>) -> DaoError {
        DaoError::upstream(
            format!("{} {}", operation, self.resource_type),
            id,
            source,
        )
    }
}

/// Collapse NotFound into success for deletes
pub fn idempotent_delete(result: Result<()>) -> Result<()> {
    match result {
        Err(DaoError::NotFound { kind, id }) => {
            tracing::debug!("delete {} {}: already absent", kind, id);
            Ok(())
        }
        other => other,
    }
}

/// List through a DAO, honoring cancellation
pub async fn list_resources(dao: &dyn Dao, ctx: &RequestContext) -> Result<Vec<Box<dyn Resource>>> {
    if !dao.supports(Operation::List) {
        return Err(DaoError::Unsupported {
            operation: Operation::List,
        });
    }
    tracing::debug!(
        "list: service={}, type={}, region={}, filters={}",
        dao.service_name(),
        dao.resource_type(),
        ctx.region(),
        ctx.filters().count()
    );
    let items = ctx.run(dao.list(ctx)).await?;
    tracing::debug!("list: {} {} returned {} items", dao.service_name(), dao.resource_type(), items.len());
    Ok(items)
}

/// Fetch a single resource, honoring cancellation
pub async fn get_resource(dao: &dyn Dao, ctx: &RequestContext, id: &str) -> Result<Box<dyn Resource>> {
    if !dao.supports(Operation::Get) {
        return Err(DaoError::Unsupported {
            operation: Operation::Get,
        });
    }
    tracing::debug!("get: service={}, type={}, id={}", dao.service_name(), dao.resource_type(), id);
    ctx.run(dao.get(ctx, id)).await
}

/// Delete a resource; an absent id is a no-op
pub async fn delete_resource(dao: &dyn Dao, ctx: &RequestContext, id: &str) -> Result<()> {
    if !dao.supports(Operation::Delete) {
        return Err(DaoError::Unsupported {
            operation: Operation::Delete,
        });
    }
    tracing::info!("delete: service={}, type={}, id={}", dao.service_name(), dao.resource_type(), id);
    idempotent_delete(ctx.run(dao.delete(ctx, id)).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::BaseResource;

    struct ReadOnlyDao {
        base: BaseDao,
    }

    #[async_trait]
    impl Dao for ReadOnlyDao {
        fn service_name(&self) -> &str {
            self.base.service_name()
        }

        fn resource_type(&self) -> &str {
            self.base.resource_type()
        }

        async fn list(&self, _ctx: &RequestContext) -> Result<Vec<Box<dyn Resource>>> {
            Ok(vec![Box::new(BaseResource::new("r-1", "one"))])
        }

        async fn get(&self, _ctx: &RequestContext, id: &str) -> Result<Box<dyn Resource>> {
            Err(self.base.not_found(id))
        }

        async fn delete(&self, _ctx: &RequestContext, _id: &str) -> Result<()> {
            panic!("delete must not be called on a DAO that does not support it");
        }

        fn supports(&self, op: Operation) -> bool {
            op != Operation::Delete && self.base.supports(op)
        }
    }

    fn read_only() -> ReadOnlyDao {
        ReadOnlyDao {
            base: BaseDao::new("iam", "policies"),
        }
    }

    #[test]
    fn test_default_supports() {
        let base = BaseDao::new("ec2", "instances");
        assert!(base.supports(Operation::List));
        assert!(base.supports(Operation::Get));
        assert!(base.supports(Operation::Delete));
        assert!(!base.supports(Operation::Create));
        assert!(!base.supports(Operation::Update));
    }

    #[test]
    fn test_unrecognized_operation_does_not_parse() {
        assert_eq!("DELETE".parse::<Operation>().unwrap(), Operation::Delete);
        let err = "frobnicate".parse::<Operation>().unwrap_err();
        assert!(matches!(err, DaoError::UnknownOperation { .. }));
    }

    #[test]
    fn test_idempotent_delete() {
        assert!(idempotent_delete(Err(DaoError::not_found("vpc", "vpc-1"))).is_ok());
        assert!(idempotent_delete(Err(DaoError::in_use("vpc", "vpc-1", "subnets"))).is_err());
    }

    #[tokio::test]
    async fn test_delete_refused_when_unsupported() {
        let dao = read_only();
        let err = delete_resource(&dao, &RequestContext::new(), "p-1")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DaoError::Unsupported {
                operation: Operation::Delete
            }
        ));
    }

    #[tokio::test]
    async fn test_get_surfaces_not_found() {
        let dao = read_only();
        let err = get_resource(&dao, &RequestContext::new(), "missing")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "policies missing not found");
    }

    #[tokio::test]
    async fn test_list_on_cancelled_context() {
        let dao = read_only();
        let ctx = RequestContext::new();
        ctx.cancel();
        let err = list_resources(&dao, &ctx).await.unwrap_err();
        assert!(matches!(err, DaoError::Cancelled));
    }
}
