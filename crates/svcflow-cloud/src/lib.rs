//! svcflow Cloud Abstraction
//!
//! This crate provides the provider-independent view of what a deployer
//! created on a cloud service provider (CSP), and the plumbing each CSP
//! plugin uses to describe its own resource schema.
//!
//! # Supported Providers
//!
//! - **Huawei Cloud** (`svcflow-cloud-huaweicloud`)
//! - **FlexibleEngine** (`svcflow-cloud-flexibleengine`)
//! - **OpenStack / SCS** (`svcflow-cloud-openstack`)
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │              svcflow-lifecycle                   │
//! │        (ReconciliationCoordinator)               │
//! └─────────────────┬───────────────────────────────┘
//!                   │ raw state document
//! ┌─────────────────▼───────────────────────────────┐
//! │                svcflow-cloud                     │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │  PluginRegistry (csp -> CspPlugin)        │   │
//! │  └──────────────────────────────────────────┘   │
//! │  ┌──────────────┐  ┌──────────────────────┐     │
//! │  │ MappingTable │  │     StateParser      │     │
//! │  └──────────────┘  └──────────────────────┘     │
//! └───────┬─────────────────┬───────────────────────┘
//!         │                 │
//! ┌───────▼───────┐ ┌───────▼───────┐
//! │  huaweicloud  │ │   openstack   │  ...
//! │    plugin     │ │    plugin     │
//! └───────────────┘ └───────────────┘
//! ```

pub mod error;
pub mod mapping;
pub mod parser;
pub mod plugin;
pub mod registry;
pub mod resource;

// Re-exports
pub use error::{CloudError, Result};
pub use mapping::{Mapping, MappingRule, MappingTable};
pub use parser::{ParsedState, StateParser};
pub use plugin::{Csp, CspPlugin, DeployerKind};
pub use registry::{PluginRegistry, PluginRegistryBuilder};
pub use resource::{CanonicalResource, ResourceKind, count_by_kind};
