//! tcloud - core of a terminal cloud resource browser
//!
//! Adapters (one per service and resource kind) plug into this crate through
//! two contracts: a [`Dao`](dao::Dao) for data access and a
//! [`Renderer`](registry::Renderer) for presentation. The host looks both up in
//! the [`Registry`](registry::Registry), lists resources (optionally paginated
//! and filtered), and dispatches user actions through the
//! [`ActionDispatcher`](action::ActionDispatcher).
//!
//! # Module Structure
//!
//! - [`resource`] - resource model and region decorator
//! - [`dao`] - data-access contract, pagination, request context
//! - [`registry`] - plugin registry and rendering contract
//! - [`action`] - declarative actions, confirmation and dispatch
//! - [`config`] - persisted user configuration
//! - [`error`] - error taxonomy

pub mod action;
pub mod config;
pub mod dao;
pub mod error;
pub mod registry;
pub mod resource;

pub use error::{DaoError, Result};

/// Version injected at compile time via TCLOUD_VERSION env var (set by CI/CD),
/// or "dev" for local builds.
pub const VERSION: &str = match option_env!("TCLOUD_VERSION") {
    Some(v) => v,
    None => "dev",
};
