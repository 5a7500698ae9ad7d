//! Immutable CSP plugin registry

use crate::error::{CloudError, Result};
use crate::mapping::Mapping;
use crate::plugin::{Csp, CspPlugin, DeployerKind};
use std::collections::HashMap;

/// Builder used once at process start
#[derive(Default)]
pub struct PluginRegistryBuilder {
    plugins: HashMap<Csp, Box<dyn CspPlugin>>,
}

impl PluginRegistryBuilder {
    pub fn register(mut self, plugin: impl CspPlugin + 'static) -> Result<Self> {
        let csp = plugin.csp();
        if self.plugins.contains_key(&csp) {
            return Err(CloudError::DuplicatePlugin(csp));
        }
        tracing::debug!(
            csp = %csp,
            rules = plugin.mapping_table().len(),
            "Registered CSP plugin"
        );
        self.plugins.insert(csp, Box::new(plugin));
        Ok(self)
    }

    pub fn build(self) -> PluginRegistry {
        PluginRegistry {
            plugins: self.plugins,
        }
    }
}

/// Registry mapping each CSP to its plugin
///
/// Built once and shared read-only (`Arc<PluginRegistry>`); there is no way to
/// mutate it after [`PluginRegistryBuilder::build`], so lookups need no locking.
pub struct PluginRegistry {
    plugins: HashMap<Csp, Box<dyn CspPlugin>>,
}

impl PluginRegistry {
    pub fn builder() -> PluginRegistryBuilder {
        PluginRegistryBuilder::default()
    }

    /// Resolve the plugin of a CSP
    pub fn resolve(&self, csp: Csp) -> Result<&dyn CspPlugin> {
        self.plugins
            .get(&csp)
            .map(|p| p.as_ref())
            .ok_or(CloudError::PluginNotFound(csp))
    }

    /// Resolve the plugin of a CSP and check it supports the deployer kind
    pub fn resolve_for(&self, csp: Csp, deployer: DeployerKind) -> Result<&dyn CspPlugin> {
        let plugin = self.resolve(csp)?;
        if !plugin.supports(deployer) {
            return Err(CloudError::DeployerNotSupported { csp, deployer });
        }
        Ok(plugin)
    }

    /// Mapping for a provider resource type; `UNKNOWN` if the CSP or type has no rule
    pub fn lookup(&self, csp: Csp, provider_type: &str) -> Mapping<'_> {
        match self.plugins.get(&csp) {
            Some(plugin) => plugin.mapping_table().lookup(provider_type),
            None => Mapping::unknown(),
        }
    }

    /// Registered CSPs, sorted
    pub fn csps(&self) -> Vec<Csp> {
        let mut csps: Vec<Csp> = self.plugins.keys().copied().collect();
        csps.sort();
        csps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::{MappingRule, MappingTable};
    use crate::resource::ResourceKind;

    struct TestPlugin {
        table: MappingTable,
    }

    impl TestPlugin {
        fn new() -> Self {
            Self {
                table: MappingTable::new(
                    Csp::Scs,
                    [MappingRule::new("openstack_compute_instance_v2", ResourceKind::Vm)],
                )
                .unwrap(),
            }
        }
    }

    impl CspPlugin for TestPlugin {
        fn csp(&self) -> Csp {
            Csp::Scs
        }

        fn display_name(&self) -> &str {
            "Test"
        }

        fn mapping_table(&self) -> &MappingTable {
            &self.table
        }

        fn supported_deployers(&self) -> &[DeployerKind] {
            &[DeployerKind::Terraform]
        }
    }

    #[test]
    fn test_resolve_registered_plugin() {
        let registry = PluginRegistry::builder()
            .register(TestPlugin::new())
            .unwrap()
            .build();
        assert_eq!(registry.resolve(Csp::Scs).unwrap().display_name(), "Test");
        assert!(matches!(
            registry.resolve(Csp::HuaweiCloud),
            Err(CloudError::PluginNotFound(Csp::HuaweiCloud))
        ));
    }

    #[test]
    fn test_resolve_for_unsupported_deployer() {
        let registry = PluginRegistry::builder()
            .register(TestPlugin::new())
            .unwrap()
            .build();
        assert!(registry.resolve_for(Csp::Scs, DeployerKind::Terraform).is_ok());
        assert!(matches!(
            registry.resolve_for(Csp::Scs, DeployerKind::OpenTofu),
            Err(CloudError::DeployerNotSupported { .. })
        ));
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let result = PluginRegistry::builder()
            .register(TestPlugin::new())
            .unwrap()
            .register(TestPlugin::new());
        assert!(matches!(result, Err(CloudError::DuplicatePlugin(Csp::Scs))));
    }

    #[test]
    fn test_lookup_never_fails() {
        let registry = PluginRegistry::builder()
            .register(TestPlugin::new())
            .unwrap()
            .build();
        assert_eq!(
            registry.lookup(Csp::Scs, "openstack_compute_instance_v2").kind,
            ResourceKind::Vm
        );
        assert!(registry.lookup(Csp::Scs, "nope").is_unknown());
        // CSP without plugin still yields UNKNOWN
        assert!(registry.lookup(Csp::FlexibleEngine, "anything").is_unknown());
    }
}
