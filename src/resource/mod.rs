//! Resource abstraction layer
//!
//! - [`model`] - the [`Resource`] contract and the [`BaseResource`] default
//! - [`region`] - the region-qualifying decorator used when listings from
//!   several regions are merged
//!
//! # Example
//!
//! ```
//! use tcloud::resource::{unwrap_resource, wrap_with_region, BaseResource, Resource};
//!
//! let vm: Box<dyn Resource> = Box::new(BaseResource::new("i-1", "web"));
//! let wrapped = wrap_with_region(vm, "us-west-2");
//! assert_eq!(wrapped.id(), "us-west-2:i-1");
//!
//! let vm = unwrap_resource(wrapped);
//! assert!(vm.downcast_ref::<BaseResource>().is_some());
//! ```

mod model;
mod region;

pub use model::{raw_json, AsAny, BaseResource, Resource};
pub use region::{
    region_depth, resource_region, unwrap_all, unwrap_all_ref, unwrap_ref, unwrap_resource,
    wrap_all_with_region, wrap_with_region, RegionResource,
};
