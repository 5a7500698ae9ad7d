//! FlexibleEngine plugin for svcflow
//!
//! Maps the `FlexibleEngineCloud/flexibleengine` provider's `_v1`/`_v2`
//! resource types onto canonical resource kinds.

pub mod plugin;

pub use plugin::FlexibleEnginePlugin;
