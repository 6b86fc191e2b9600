//! Region Decorator
//!
//! Tags a resource with the region it was listed from. The decorator owns the
//! wrapped value and keeps its concrete type, so a single [`unwrap_resource`]
//! gives back something `downcast_ref` recognizes.
//!
//! Wrapping an already wrapped value nests decorators; one unwrap then yields
//! the inner [`RegionResource`], not the adapter type. Use [`unwrap_all`] when
//! the number of layers is unknown.

use super::model::Resource;
use std::any::Any;
use std::collections::HashMap;

/// A resource qualified by its origin region
#[derive(Debug)]
pub struct RegionResource {
    region: String,
    inner: Box<dyn Resource>,
}

impl RegionResource {
    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn inner(&self) -> &dyn Resource {
        self.inner.as_ref()
    }

    pub fn into_inner(self) -> Box<dyn Resource> {
        self.inner
    }
}

impl Resource for RegionResource {
    /// `<region>:<inner id>`, unique across regions
    fn id(&self) -> String {
        format!("{}:{}", self.region, self.inner.id())
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    fn arn(&self) -> &str {
        self.inner.arn()
    }

    fn tags(&self) -> &HashMap<String, String> {
        self.inner.tags()
    }

    fn raw(&self) -> &dyn Any {
        self.inner.raw()
    }
}

/// Wrap a resource with its region. Never fails.
///
/// The concrete decorator is returned so callers can reach
/// [`RegionResource::region`]; it coerces to `Box<dyn Resource>`.
pub fn wrap_with_region(resource: Box<dyn Resource>, region: &str) -> Box<RegionResource> {
    Box::new(RegionResource {
        region: region.to_string(),
        inner: resource,
    })
}

/// Wrap every resource of one region's listing
pub fn wrap_all_with_region(resources: Vec<Box<dyn Resource>>, region: &str) -> Vec<Box<dyn Resource>> {
    resources
        .into_iter()
        .map(|r| wrap_with_region(r, region) as Box<dyn Resource>)
        .collect()
}

/// Remove one region layer; non-wrapped input is returned unchanged.
pub fn unwrap_resource(resource: Box<dyn Resource>) -> Box<dyn Resource> {
    if !resource.is::<RegionResource>() {
        return resource;
    }
    match resource.into_any().downcast::<RegionResource>() {
        Ok(wrapped) => wrapped.into_inner(),
        Err(_) => unreachable!("checked by is::<RegionResource>()"),
    }
}

/// Borrowing counterpart of [`unwrap_resource`]
pub fn unwrap_ref(resource: &dyn Resource) -> &dyn Resource {
    match resource.downcast_ref::<RegionResource>() {
        Some(wrapped) => wrapped.inner(),
        None => resource,
    }
}

/// Remove every region layer
pub fn unwrap_all(mut resource: Box<dyn Resource>) -> Box<dyn Resource> {
    while resource.is::<RegionResource>() {
        resource = unwrap_resource(resource);
    }
    resource
}

/// Borrowing counterpart of [`unwrap_all`]
pub fn unwrap_all_ref(mut resource: &dyn Resource) -> &dyn Resource {
    while let Some(wrapped) = resource.downcast_ref::<RegionResource>() {
        resource = wrapped.inner();
    }
    resource
}

/// Region of the outermost layer, or `""` when the resource is not wrapped
pub fn resource_region(resource: &dyn Resource) -> &str {
    resource
        .downcast_ref::<RegionResource>()
        .map(RegionResource::region)
        .unwrap_or("")
}

/// Number of region layers around the adapter value
pub fn region_depth(mut resource: &dyn Resource) -> usize {
    let mut depth = 0;
    while let Some(wrapped) = resource.downcast_ref::<RegionResource>() {
        depth += 1;
        resource = wrapped.inner();
    }
    depth
}
