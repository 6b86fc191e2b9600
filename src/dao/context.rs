//! Request Context
//!
//! Carried alongside one logical request. Holds the cancellation token, an
//! optional deadline, the region the call targets and a copy-on-extend filter
//! overlay used to scope a List call (e.g. "only subnets of vpc-1").

use crate::error::{DaoError, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Scoping key of a filter
///
/// The well-known keys are listed so adapters can match on them; anything else
/// travels as `Custom`. Strings convert with `From`, so `"VpcId".into()` and
/// `FilterKey::VpcId` are the same key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FilterKey {
    VpcId,
    ParentId,
    ApiId,
    ClusterName,
    BucketName,
    Custom(String),
}

impl FilterKey {
    pub fn as_str(&self) -> &str {
        match self {
            Self::VpcId => "VpcId",
            Self::ParentId => "ParentId",
            Self::ApiId => "ApiId",
            Self::ClusterName => "ClusterName",
            Self::BucketName => "BucketName",
            Self::Custom(key) => key,
        }
    }
}

impl From<&str> for FilterKey {
    fn from(key: &str) -> Self {
        match key {
            "VpcId" => Self::VpcId,
            "ParentId" => Self::ParentId,
            "ApiId" => Self::ApiId,
            "ClusterName" => Self::ClusterName,
            "BucketName" => Self::BucketName,
            other => Self::Custom(other.to_string()),
        }
    }
}

impl From<String> for FilterKey {
    fn from(key: String) -> Self {
        Self::from(key.as_str())
    }
}

impl fmt::Display for FilterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request-scoped context passed to every DAO and executor call
///
/// Cloning is cheap; clones share the cancellation token. Extending methods
/// (`with_*`) return a new context and leave the receiver untouched.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
    region: Option<String>,
    filters: Arc<BTreeMap<FilterKey, String>>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context that shares `token` for cancellation
    pub fn with_cancellation(token: CancellationToken) -> Self {
        Self {
            cancel: token,
            ..Self::default()
        }
    }

    /// Child context: cancelling the parent cancels it, not the other way round
    pub fn child(&self) -> Self {
        Self {
            cancel: self.cancel.child_token(),
            ..self.clone()
        }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// New context whose deadline is `timeout` from now (never later than an
    /// existing deadline)
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let deadline = Instant::now() + timeout;
        let mut next = self.clone();
        next.deadline = Some(match self.deadline {
            Some(existing) if existing < deadline => existing,
            _ => deadline,
        });
        next
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn with_region(&self, region: &str) -> Self {
        let mut next = self.clone();
        next.region = Some(region.to_string());
        next
    }

    /// Region the call targets, or `""` when unset
    pub fn region(&self) -> &str {
        self.region.as_deref().unwrap_or("")
    }

    /// New context carrying `key = value`; a later value for the same key wins.
    ///
    /// An empty value clears the key, since `""` already reads as "not set".
    pub fn with_filter(&self, key: impl Into<FilterKey>, value: &str) -> Self {
        let mut filters = (*self.filters).clone();
        if value.is_empty() {
            filters.remove(&key.into());
        } else {
            filters.insert(key.into(), value.to_string());
        }
        Self {
            filters: Arc::new(filters),
            ..self.clone()
        }
    }

    /// Filter value for `key`, or `""` when never set
    pub fn filter(&self, key: impl Into<FilterKey>) -> &str {
        self.filters
            .get(&key.into())
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn has_filters(&self) -> bool {
        !self.filters.is_empty()
    }

    /// Active filters in key order
    pub fn filters(&self) -> impl Iterator<Item = (&FilterKey, &str)> {
        self.filters.iter().map(|(k, v)| (k, v.as_str()))
    }

    /// Fail fast when the context is already cancelled or past its deadline
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(DaoError::Cancelled);
        }
        if matches!(self.deadline, Some(deadline) if Instant::now() >= deadline) {
            return Err(DaoError::DeadlineExceeded);
        }
        Ok(())
    }

    /// Drive `fut` unless the context is cancelled or its deadline passes first.
    ///
    /// The future is dropped on cancellation, so an upstream call in flight is
    /// abandoned rather than awaited.
    pub async fn run<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.check()?;

        let deadline = self.deadline;
        let timer = async move {
            match deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            _ = self.cancel.cancelled() => Err(DaoError::Cancelled),
            _ = timer => Err(DaoError::DeadlineExceeded),
            result = fut => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_filter_is_empty() {
        let ctx = RequestContext::new();
        assert_eq!(ctx.filter("VpcId"), "");
        assert!(!ctx.has_filters());
    }

    #[test]
    fn test_with_filter_does_not_mutate_parent() {
        let parent = RequestContext::new().with_filter("VpcId", "vpc-1");
        let child = parent.with_filter(FilterKey::ApiId, "api-9");

        assert_eq!(parent.filter(FilterKey::ApiId), "");
        assert_eq!(child.filter("ApiId"), "api-9");
        assert_eq!(child.filter("VpcId"), "vpc-1");
    }

    #[test]
    fn test_last_write_wins() {
        let ctx = RequestContext::new()
            .with_filter("VpcId", "vpc-1")
            .with_filter(FilterKey::VpcId, "vpc-2");
        assert_eq!(ctx.filter("VpcId"), "vpc-2");
        assert_eq!(ctx.filters().count(), 1);
    }

    #[test]
    fn test_empty_value_clears_filter() {
        let ctx = RequestContext::new().with_filter("VpcId", "");
        assert!(!ctx.has_filters());

        let cleared = RequestContext::new()
            .with_filter("VpcId", "vpc-1")
            .with_filter("VpcId", "");
        assert_eq!(cleared.filter("VpcId"), "");
        assert_eq!(cleared.filters().count(), 0);
    }

    #[test]
    fn test_with_cancellation_shares_token() {
        let token = CancellationToken::new();
        let ctx = RequestContext::with_cancellation(token.clone());
        assert!(!ctx.cancellation_token().is_cancelled());
        token.cancel();
        assert!(ctx.is_cancelled());
        assert!(ctx.child().cancellation_token().is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_never_extends_deadline() {
        let short = RequestContext::new().with_timeout(Duration::from_millis(50));
        let longer = short.with_timeout(Duration::from_secs(10));
        assert_eq!(longer.deadline(), short.deadline());
        assert!(RequestContext::new().deadline().is_none());
    }

    #[test]
    fn test_custom_keys_round_trip() {
        let ctx = RequestContext::new().with_filter("LoadBalancerArn", "arn:lb");
        assert_eq!(ctx.filter(FilterKey::Custom("LoadBalancerArn".into())), "arn:lb");
        assert_eq!(FilterKey::from("LoadBalancerArn").to_string(), "LoadBalancerArn");
    }

    #[test]
    fn test_region_and_filters_survive_child() {
        let ctx = RequestContext::new()
            .with_region("eu-west-1")
            .with_filter("ParentId", "p");
        let child = ctx.child();
        assert_eq!(child.region(), "eu-west-1");
        assert_eq!(child.filter("ParentId"), "p");
    }

    #[test]
    fn test_cancelling_parent_cancels_child() {
        let parent = RequestContext::new();
        let child = parent.child();
        parent.cancel();
        assert!(child.is_cancelled());
        assert!(matches!(child.check(), Err(DaoError::Cancelled)));
    }

    #[tokio::test]
    async fn test_run_returns_cancelled_promptly() {
        let ctx = RequestContext::new();
        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceller.cancel();
        });

        let result: Result<()> = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(DaoError::Cancelled)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_honors_deadline() {
        let ctx = RequestContext::new().with_timeout(Duration::from_millis(50));
        let result: Result<()> = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(DaoError::DeadlineExceeded)));
    }

    #[tokio::test]
    async fn test_run_passes_through_result() {
        let ctx = RequestContext::new();
        let value = ctx.run(async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);
    }
}
