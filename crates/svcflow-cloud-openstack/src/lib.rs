//! OpenStack plugins for svcflow
//!
//! Both plain OpenStack clouds and Sovereign Cloud Stack (SCS) deployments
//! are driven through the `terraform-provider-openstack` resource types; SCS
//! additionally exposes the network MTU.

pub mod plugin;

pub use plugin::{OpenstackPlugin, ScsPlugin};
