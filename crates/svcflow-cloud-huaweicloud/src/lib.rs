//! Huawei Cloud plugin for svcflow
//!
//! Maps the resource types of the `huaweicloud/huaweicloud` terraform
//! provider onto svcflow's canonical resource kinds.
//!
//! # Example
//!
//! ```ignore
//! use svcflow_cloud::PluginRegistry;
//! use svcflow_cloud_huaweicloud::HuaweiCloudPlugin;
//!
//! let registry = PluginRegistry::builder()
//!     .register(HuaweiCloudPlugin::new()?)?
//!     .build();
//! ```

pub mod plugin;

pub use plugin::HuaweiCloudPlugin;
