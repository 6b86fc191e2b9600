//! Resource Model
//!
//! The vocabulary every adapter speaks: identity, display name, global
//! identifier, tags and the untyped upstream payload.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;

/// Object-safe access to `Any` for every `'static` type.
///
/// Implemented automatically; adapters never write this by hand.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

/// One cloud object as seen by the core.
///
/// `id` is unique within a single (service, resource kind, region) scope only.
/// Values returned by the accessors are not validated or normalized.
pub trait Resource: AsAny + fmt::Debug + Send + Sync + 'static {
    fn id(&self) -> String;
    fn name(&self) -> &str;
    fn arn(&self) -> &str;
    fn tags(&self) -> &HashMap<String, String>;

    /// Untyped upstream payload
    fn raw(&self) -> &dyn Any;
}

impl dyn Resource {
    /// True if the concrete type behind this resource is `T`
    pub fn is<T: Resource>(&self) -> bool {
        self.as_any().is::<T>()
    }

    /// Recover the concrete adapter type.
    ///
    /// Returns `None` for a region-wrapped value; unwrap it first with
    /// [`unwrap_ref`](super::unwrap_ref).
    pub fn downcast_ref<T: Resource>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}

/// Payload of a resource whose `raw()` is a JSON document
pub fn raw_json(resource: &dyn Resource) -> Option<&Value> {
    resource.raw().downcast_ref::<Value>()
}

/// Default resource implementation most adapters embed
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BaseResource {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub arn: String,
    #[serde(default)]
    pub tags: HashMap<String, String>,
    #[serde(default)]
    pub raw: Value,
}

impl BaseResource {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn with_arn(mut self, arn: &str) -> Self {
        self.arn = arn.to_string();
        self
    }

    pub fn with_tag(mut self, key: &str, value: &str) -> Self {
        self.tags.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_raw(mut self, raw: Value) -> Self {
        self.raw = raw;
        self
    }

    /// Build from an upstream JSON item using the given id/name fields.
    ///
    /// The name falls back to the id when the item has no name field. Tags are
    /// read from a `tags`/`labels` object of string values when present.
    pub fn from_json(item: Value, id_field: &str, name_field: &str) -> Option<Self> {
        let id = item.get(id_field)?.as_str()?.to_string();
        let name = item
            .get(name_field)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .unwrap_or(&id)
            .to_string();
        let arn = ["arn", "selfLink"]
            .iter()
            .find_map(|f| item.get(*f).and_then(|v| v.as_str()))
            .unwrap_or_default()
            .to_string();
        let tags: HashMap<String, String> = ["tags", "labels"]
            .iter()
            .find_map(|f| item.get(*f).and_then(|v| v.as_object()))
            .map(|obj| {
                obj.iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect()
            })
            .unwrap_or_default();

        Some(Self {
            id,
            name,
            arn,
            tags,
            raw: item,
        })
    }
}

impl Resource for BaseResource {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn arn(&self) -> &str {
        &self.arn
    }

    fn tags(&self) -> &HashMap<String, String> {
        &self.tags
    }

    fn raw(&self) -> &dyn Any {
        &self.raw
    }
}
