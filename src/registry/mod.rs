//! Plugin Registry
//!
//! Maps (service, resource kind) to the factories an adapter provides and to
//! its declared actions. Adapters register into a [`RegistryBuilder`] during
//! start-up; [`RegistryBuilder::build`] freezes the table into a [`Registry`]
//! that is shared read-only (usually behind an `Arc`) for the rest of the
//! process.

pub mod render;

pub use render::{extract_json_value, ColumnDef, JsonRenderer, Renderer};

use crate::action::{Action, ActionExecutor, ActionSet, OperationHandler, Typed};
use crate::dao::{Dao, FilterKey, RequestContext};
use crate::error::{DaoError, Result};
use crate::resource::{raw_json, unwrap_all_ref, Resource};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

/// Registry key
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceKey {
    pub service: String,
    pub kind: String,
}

impl ResourceKey {
    pub fn new(service: &str, kind: &str) -> Self {
        Self {
            service: service.to_string(),
            kind: kind.to_string(),
        }
    }

    /// Parse `service/kind`
    pub fn parse(key: &str) -> Option<Self> {
        let (service, kind) = key.split_once('/')?;
        if service.is_empty() || kind.is_empty() {
            return None;
        }
        Some(Self::new(service, kind))
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.service, self.kind)
    }
}

pub type DaoFactory = Arc<dyn Fn(&RequestContext) -> Result<Box<dyn Dao>> + Send + Sync>;
pub type RendererFactory = Arc<dyn Fn() -> Box<dyn Renderer> + Send + Sync>;

/// Child listing reachable from a parent resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubResourceDef {
    pub resource: ResourceKey,
    pub display_name: String,
    pub shortcut: char,
    /// JSON path on the parent holding the scoping value; `$id` uses the
    /// parent's (unqualified) id
    pub parent_id_field: String,
    pub filter_key: FilterKey,
}

/// Factories an adapter registers for one key
#[derive(Clone)]
pub struct RegistryEntry {
    pub display_name: String,
    dao_factory: DaoFactory,
    renderer_factory: RendererFactory,
    sub_resources: Vec<SubResourceDef>,
}

impl RegistryEntry {
    pub fn new<D, R>(display_name: &str, dao_factory: D, renderer_factory: R) -> Self
    where
        D: Fn(&RequestContext) -> Result<Box<dyn Dao>> + Send + Sync + 'static,
        R: Fn() -> Box<dyn Renderer> + Send + Sync + 'static,
    {
        Self {
            display_name: display_name.to_string(),
            dao_factory: Arc::new(dao_factory),
            renderer_factory: Arc::new(renderer_factory),
            sub_resources: Vec::new(),
        }
    }

    pub fn with_sub_resource(mut self, sub: SubResourceDef) -> Self {
        self.sub_resources.push(sub);
        self
    }

    /// A fresh DAO for one logical operation
    pub fn create_dao(&self, ctx: &RequestContext) -> Result<Box<dyn Dao>> {
        (self.dao_factory)(ctx)
    }

    pub fn create_renderer(&self) -> Box<dyn Renderer> {
        (self.renderer_factory)()
    }

    pub fn sub_resources(&self) -> &[SubResourceDef] {
        &self.sub_resources
    }
}

impl fmt::Debug for RegistryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryEntry")
            .field("display_name", &self.display_name)
            .field("sub_resources", &self.sub_resources)
            .finish_non_exhaustive()
    }
}

/// Write phase of the registry
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    entries: HashMap<ResourceKey, RegistryEntry>,
    actions: HashMap<ResourceKey, ActionSet>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the entry for (service, kind); the last
    /// registration for a key wins.
    pub fn register_custom(&mut self, service: &str, kind: &str, entry: RegistryEntry) -> &mut Self {
        let key = ResourceKey::new(service, kind);
        if self.entries.contains_key(&key) {
            tracing::warn!("registry: overwriting entry for {}", key);
        } else {
            tracing::debug!("registry: registered {}", key);
        }
        self.entries.insert(key, entry);
        self
    }

    /// Register the action list and executor for (service, kind)
    pub fn register_actions(
        &mut self,
        service: &str,
        kind: &str,
        actions: Vec<Action>,
        executor: Arc<dyn ActionExecutor>,
    ) -> &mut Self {
        let key = ResourceKey::new(service, kind);
        if self.actions.contains_key(&key) {
            tracing::warn!("registry: overwriting actions for {}", key);
        }
        self.actions.insert(key, ActionSet::new(actions, executor));
        self
    }

    /// Register actions backed by a typed handler.
    ///
    /// Every declared operation must parse into the handler's operation type,
    /// so a typo surfaces here rather than as an unknown operation at dispatch.
    pub fn register_typed_actions<H: OperationHandler>(
        &mut self,
        service: &str,
        kind: &str,
        actions: Vec<Action>,
        handler: H,
    ) -> Result<&mut Self> {
        if let Some(bad) = actions
            .iter()
            .find(|a| <H::Op as crate::action::ActionOperation>::parse(&a.operation).is_none())
        {
            return Err(DaoError::Registration(format!(
                "{}/{}: action '{}' declares unknown operation '{}'",
                service, kind, bad.name, bad.operation
            )));
        }
        Ok(self.register_actions(service, kind, actions, Arc::new(Typed(handler))))
    }

    /// Freeze the table
    pub fn build(self) -> Registry {
        tracing::info!(
            "registry: {} resource kinds, {} action sets",
            self.entries.len(),
            self.actions.len()
        );
        Registry {
            entries: self.entries,
            actions: self.actions,
        }
    }
}

/// Read-only registry
#[derive(Debug, Default)]
pub struct Registry {
    entries: HashMap<ResourceKey, RegistryEntry>,
    actions: HashMap<ResourceKey, ActionSet>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    pub fn get(&self, service: &str, kind: &str) -> Option<&RegistryEntry> {
        self.entries.get(&ResourceKey::new(service, kind))
    }

    pub fn get_by_key(&self, key: &ResourceKey) -> Option<&RegistryEntry> {
        self.entries.get(key)
    }

    pub fn contains(&self, service: &str, kind: &str) -> bool {
        self.get(service, kind).is_some()
    }

    /// All keys, sorted (for autocomplete)
    pub fn keys(&self) -> Vec<&ResourceKey> {
        let mut keys: Vec<&ResourceKey> = self.entries.keys().collect();
        keys.sort();
        keys
    }

    pub fn services(&self) -> Vec<&str> {
        self.entries
            .keys()
            .map(|k| k.service.as_str())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// A fresh DAO for (service, kind)
    pub fn create_dao(&self, key: &ResourceKey, ctx: &RequestContext) -> Result<Box<dyn Dao>> {
        let entry = self
            .get_by_key(key)
            .ok_or_else(|| DaoError::Registration(format!("no adapter registered for {}", key)))?;
        entry.create_dao(ctx)
    }

    pub fn action_set(&self, key: &ResourceKey) -> Option<&ActionSet> {
        self.actions.get(key)
    }

    /// Declared actions for (service, kind); empty when none are registered
    pub fn actions_for(&self, service: &str, kind: &str) -> &[Action] {
        self.action_set(&ResourceKey::new(service, kind))
            .map(ActionSet::actions)
            .unwrap_or(&[])
    }

    pub fn find_action_by_shortcut(&self, key: &ResourceKey, shortcut: char) -> Option<&Action> {
        self.action_set(key)?.find_by_shortcut(shortcut)
    }

    /// Context for listing `sub_key` beneath `parent`, a resource of `parent_key`
    pub fn sub_resource_context(
        &self,
        parent_key: &ResourceKey,
        sub_key: &ResourceKey,
        parent: &dyn Resource,
        ctx: &RequestContext,
    ) -> Result<RequestContext> {
        let entry = self.get_by_key(parent_key).ok_or_else(|| {
            DaoError::Registration(format!("no adapter registered for {}", parent_key))
        })?;
        let sub = entry
            .sub_resources()
            .iter()
            .find(|s| &s.resource == sub_key)
            .ok_or_else(|| {
                DaoError::Registration(format!("{} is not a sub-resource of {}", sub_key, parent_key))
            })?;

        let parent = unwrap_all_ref(parent);
        let value = if sub.parent_id_field == "$id" {
            parent.id()
        } else {
            raw_json(parent)
                .map(|raw| extract_json_value(raw, &sub.parent_id_field))
                .unwrap_or_else(|| "-".to_string())
        };
        if value == "-" || value.is_empty() {
            return Err(DaoError::Registration(format!(
                "{} {} has no value at '{}'",
                parent_key,
                parent.id(),
                sub.parent_id_field
            )));
        }

        Ok(ctx.with_filter(sub.filter_key.clone(), &value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::{MemoryDao, memory::MemoryStore};
    use crate::resource::{wrap_with_region, BaseResource};
    use serde_json::json;

    fn entry(name: &str) -> RegistryEntry {
        let store = MemoryStore::new(vec![BaseResource::new("x", "x")]);
        RegistryEntry::new(
            name,
            move |_ctx| Ok(Box::new(MemoryDao::new("ec2", "vpcs", store.clone())) as Box<dyn Dao>),
            || Box::new(JsonRenderer::default()),
        )
    }

    #[test]
    fn test_last_registration_wins() {
        let mut builder = Registry::builder();
        builder.register_custom("ec2", "vpcs", entry("first"));
        builder.register_custom("ec2", "vpcs", entry("second"));
        let registry = builder.build();

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("ec2", "vpcs").unwrap().display_name, "second");
    }

    #[test]
    fn test_absent_key() {
        let registry = Registry::builder().build();
        assert!(registry.get("ec2", "vpcs").is_none());
        assert!(registry.actions_for("ec2", "vpcs").is_empty());
        let err = registry
            .create_dao(&ResourceKey::new("ec2", "vpcs"), &RequestContext::new())
            .err()
            .unwrap();
        assert!(matches!(err, DaoError::Registration(_)));
    }

    #[test]
    fn test_keys_sorted_and_services_deduplicated() {
        let mut builder = Registry::builder();
        builder
            .register_custom("s3", "buckets", entry("b"))
            .register_custom("ec2", "vpcs", entry("v"))
            .register_custom("ec2", "instances", entry("i"));
        let registry = builder.build();

        let keys: Vec<String> = registry.keys().iter().map(|k| k.to_string()).collect();
        assert_eq!(keys, vec!["ec2/instances", "ec2/vpcs", "s3/buckets"]);
        assert_eq!(registry.services(), vec!["ec2", "s3"]);
    }

    #[test]
    fn test_resource_key_parse() {
        assert_eq!(ResourceKey::parse("ec2/vpcs"), Some(ResourceKey::new("ec2", "vpcs")));
        assert_eq!(ResourceKey::parse("ec2"), None);
        assert_eq!(ResourceKey::parse("/vpcs"), None);
    }

    #[test]
    fn test_sub_resource_context() {
        let vpcs = ResourceKey::new("ec2", "vpcs");
        let subnets = ResourceKey::new("ec2", "subnets");
        let mut builder = Registry::builder();
        builder.register_custom(
            "ec2",
            "vpcs",
            entry("VPCs").with_sub_resource(SubResourceDef {
                resource: subnets.clone(),
                display_name: "Subnets".to_string(),
                shortcut: 's',
                parent_id_field: "VpcId".to_string(),
                filter_key: FilterKey::VpcId,
            }),
        );
        let registry = builder.build();

        let vpc = BaseResource::new("vpc-1", "main").with_raw(json!({"VpcId": "vpc-1"}));
        let wrapped = wrap_with_region(Box::new(vpc), "us-east-1");
        let ctx = registry
            .sub_resource_context(&vpcs, &subnets, wrapped.as_ref(), &RequestContext::new())
            .unwrap();
        assert_eq!(ctx.filter(FilterKey::VpcId), "vpc-1");

        let unknown = ResourceKey::new("ec2", "routes");
        assert!(registry
            .sub_resource_context(&vpcs, &unknown, wrapped.as_ref(), &RequestContext::new())
            .is_err());
    }
}
