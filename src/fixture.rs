//! Fixture adapters
//!
//! Loads resource listings from a JSON or YAML file and registers one
//! in-memory adapter per `service/kind`, so the host can be driven without a
//! cloud account.
//!
//! ```yaml
//! resources:
//!   ec2/instances:
//!     display_name: EC2 Instances
//!     id_field: InstanceId
//!     name_field: Name
//!     columns:
//!       - { header: ID, json_path: $id, width: 20 }
//!       - { header: State, json_path: State, width: 10 }
//!     actions:
//!       - { name: Stop, shortcut: s, operation: stop, confirm: simple }
//!     regions:
//!       us-east-1:
//!         - { InstanceId: i-1, Name: web, State: running }
//! ```

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use tcloud::action::{Action, ActionOperation, ActionResult, OperationHandler};
use tcloud::dao::memory::MemoryStore;
use tcloud::dao::{delete_resource, Dao, FilterKey, MemoryDao, RequestContext};
use tcloud::registry::{
    ColumnDef, JsonRenderer, Registry, RegistryEntry, Renderer, ResourceKey, SubResourceDef,
};
use tcloud::resource::{BaseResource, Resource};

#[derive(Debug, Deserialize)]
struct FixtureFile {
    #[serde(default)]
    resources: HashMap<String, FixtureResource>,
}

#[derive(Debug, Deserialize)]
struct FixtureResource {
    display_name: String,
    id_field: String,
    #[serde(default = "default_name_field")]
    name_field: String,
    #[serde(default)]
    columns: Vec<ColumnDef>,
    #[serde(default)]
    read_only: bool,
    #[serde(default)]
    actions: Vec<Action>,
    #[serde(default)]
    sub_resources: Vec<FixtureSubResource>,
    /// region -> items
    #[serde(default)]
    regions: HashMap<String, Vec<Value>>,
    /// id -> reason; deletes of these ids fail as in use
    #[serde(default)]
    in_use: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct FixtureSubResource {
    resource: String,
    display_name: String,
    shortcut: char,
    parent_id_field: String,
    filter_key: String,
}

fn default_name_field() -> String {
    "Name".to_string()
}

type Stores = HashMap<String, MemoryStore<BaseResource>>;

/// Operations the fixture executor understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FixtureOp {
    Start,
    Stop,
    Reboot,
    Delete,
}

impl ActionOperation for FixtureOp {
    fn parse(operation: &str) -> Option<Self> {
        match operation {
            "start" => Some(Self::Start),
            "stop" => Some(Self::Stop),
            "reboot" => Some(Self::Reboot),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Reboot => "reboot",
            Self::Delete => "delete",
        }
    }
}

struct FixtureHandler {
    key: ResourceKey,
    stores: Stores,
}

impl FixtureHandler {
    fn store(&self, region: &str) -> Option<&MemoryStore<BaseResource>> {
        self.stores.get(region)
    }

    async fn set_state(&self, ctx: &RequestContext, id: &str, state: &str) -> ActionResult {
        let Some(store) = self.store(ctx.region()) else {
            return ActionResult::failure(tcloud::DaoError::not_found(&self.key.kind, id));
        };
        let found = store
            .update(id, |item| {
                if let Value::Object(map) = &mut item.raw {
                    map.insert("State".to_string(), Value::String(state.to_string()));
                }
            })
            .await;
        if found {
            ActionResult::success(format!("{} is now {}", id, state))
        } else {
            ActionResult::failure_with_context(
                tcloud::DaoError::not_found(&self.key.kind, id),
                format!("set state of {}", id),
            )
        }
    }
}

#[async_trait]
impl OperationHandler for FixtureHandler {
    type Op = FixtureOp;

    async fn handle(&self, ctx: &RequestContext, op: FixtureOp, resource: &dyn Resource) -> ActionResult {
        let id = resource.id();
        match op {
            FixtureOp::Start => self.set_state(ctx, &id, "running").await,
            FixtureOp::Stop => self.set_state(ctx, &id, "stopped").await,
            FixtureOp::Reboot => ActionResult::success(format!("{} rebooted", id)),
            FixtureOp::Delete => {
                let store = self
                    .store(ctx.region())
                    .cloned()
                    .unwrap_or_else(|| MemoryStore::new(Vec::new()));
                let dao = MemoryDao::new(&self.key.service, &self.key.kind, store);
                ActionResult::from_result(
                    delete_resource(&dao, ctx, &id)
                        .await
                        .map(|_| format!("{} deleted", id)),
                    format!("delete {} {}", self.key.kind, id),
                )
            }
        }
    }
}

/// Build a registry from a fixture file (`.json`, `.yaml` or `.yml`)
pub async fn load_registry(path: &Path) -> Result<Registry> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read fixture {:?}", path))?;
    let file: FixtureFile = match path.extension().and_then(|e| e.to_str()) {
        Some("yaml") | Some("yml") => serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse fixture YAML {:?}", path))?,
        _ => serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse fixture JSON {:?}", path))?,
    };

    let mut builder = Registry::builder();
    for (key, resource) in file.resources {
        let key = ResourceKey::parse(&key)
            .with_context(|| format!("Invalid resource key '{}', expected service/kind", key))?;
        register_resource(&mut builder, key, resource).await?;
    }

    Ok(builder.build())
}

async fn register_resource(
    builder: &mut tcloud::registry::RegistryBuilder,
    key: ResourceKey,
    resource: FixtureResource,
) -> Result<()> {
    let mut stores: Stores = HashMap::new();
    for (region, items) in resource.regions {
        let parsed: Vec<BaseResource> = items
            .into_iter()
            .filter_map(|item| BaseResource::from_json(item, &resource.id_field, &resource.name_field))
            .collect();
        tracing::debug!("fixture: {} {} items in {}", key, parsed.len(), region);
        let store = MemoryStore::new(parsed);
        for (id, reason) in &resource.in_use {
            store.mark_in_use(id, reason).await;
        }
        stores.insert(region, store);
    }

    let dao_stores = stores.clone();
    let dao_key = key.clone();
    let read_only = resource.read_only;
    let columns = resource.columns;

    let mut entry = RegistryEntry::new(
        &resource.display_name,
        move |ctx: &RequestContext| {
            let store = dao_stores
                .get(ctx.region())
                .cloned()
                .unwrap_or_else(|| MemoryStore::new(Vec::new()));
            let dao = MemoryDao::new(&dao_key.service, &dao_key.kind, store);
            let dao = if read_only { dao.read_only() } else { dao };
            Ok(Box::new(dao) as Box<dyn Dao>)
        },
        move || Box::new(JsonRenderer::new(columns.clone())) as Box<dyn Renderer>,
    );

    for sub in resource.sub_resources {
        let sub_key = ResourceKey::parse(&sub.resource)
            .with_context(|| format!("Invalid sub-resource key '{}'", sub.resource))?;
        entry = entry.with_sub_resource(SubResourceDef {
            resource: sub_key,
            display_name: sub.display_name,
            shortcut: sub.shortcut,
            parent_id_field: sub.parent_id_field,
            filter_key: FilterKey::from(sub.filter_key),
        });
    }

    builder.register_custom(&key.service, &key.kind, entry);

    if !resource.actions.is_empty() {
        let handler = FixtureHandler {
            key: key.clone(),
            stores,
        };
        builder.register_typed_actions(&key.service, &key.kind, resource.actions, handler)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tcloud::action::{ActionDispatcher, PendingAction};
    use tcloud::dao::list_resources;
    use tcloud::resource::wrap_with_region;

    const FIXTURE: &str = r#"
resources:
  ec2/instances:
    display_name: EC2 Instances
    id_field: InstanceId
    columns:
      - { header: ID, json_path: $id, width: 12 }
      - { header: State, json_path: State, width: 10 }
    actions:
      - { name: Stop, shortcut: s, operation: stop }
    regions:
      us-east-1:
        - { InstanceId: i-1, Name: web, State: running }
        - { InstanceId: i-2, Name: db, State: running }
"#;

    fn write_fixture(content: &str, ext: &str) -> tempfile::TempPath {
        let file = tempfile::Builder::new().suffix(ext).tempfile().unwrap();
        std::fs::write(file.path(), content).unwrap();
        file.into_temp_path()
    }

    #[tokio::test]
    async fn test_load_yaml_fixture() {
        let path = write_fixture(FIXTURE, ".yaml");
        let registry = load_registry(&path).await.unwrap();
        let key = ResourceKey::new("ec2", "instances");

        let ctx = RequestContext::new().with_region("us-east-1");
        let dao = registry.create_dao(&key, &ctx).unwrap();
        assert_eq!(list_resources(dao.as_ref(), &ctx).await.unwrap().len(), 2);

        let other = RequestContext::new().with_region("eu-west-1");
        let dao = registry.create_dao(&key, &other).unwrap();
        assert!(list_resources(dao.as_ref(), &other).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fixture_action_changes_state() {
        let path = write_fixture(FIXTURE, ".yaml");
        let registry = std::sync::Arc::new(load_registry(&path).await.unwrap());
        let key = ResourceKey::new("ec2", "instances");
        let action = registry.actions_for("ec2", "instances")[0].clone();

        let resource = wrap_with_region(
            Box::new(BaseResource::new("i-1", "web")),
            "us-east-1",
        );
        let dispatcher = ActionDispatcher::new(registry.clone());
        let outcome = dispatcher
            .dispatch(&RequestContext::new(), PendingAction::new(key.clone(), action, resource))
            .await;
        assert!(outcome.report().unwrap().is_success());

        let ctx = RequestContext::new().with_region("us-east-1");
        let dao = registry.create_dao(&key, &ctx).unwrap();
        let vm = dao.get(&ctx, "i-1").await.unwrap();
        let row = registry.get("ec2", "instances").unwrap().create_renderer().row(vm.as_ref());
        assert_eq!(row, vec!["i-1", "stopped"]);
    }

    #[tokio::test]
    async fn test_unknown_fixture_operation_rejected_at_load() {
        let bad = FIXTURE.replace("operation: stop", "operation: hibernate");
        let path = write_fixture(&bad, ".yml");
        let err = load_registry(&path).await.unwrap_err();
        assert!(err.to_string().contains("hibernate"));
    }
}
