//! Resource mapping tables
//!
//! A mapping table turns a provider resource type (as it appears in the
//! deployer state, e.g. `huaweicloud_vpc_eip`) into a canonical
//! [`ResourceKind`] plus a field-rename table that selects provider
//! attributes and stores them under canonical property names.

use crate::error::{CloudError, Result};
use crate::plugin::Csp;
use crate::resource::ResourceKind;
use std::collections::{BTreeMap, HashMap};

static NO_FIELDS: BTreeMap<String, String> = BTreeMap::new();

/// Single mapping rule for one provider resource type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingRule {
    provider_type: String,
    kind: ResourceKind,
    /// canonical property name -> provider attribute name
    fields: BTreeMap<String, String>,
}

impl MappingRule {
    pub fn new(provider_type: impl Into<String>, kind: ResourceKind) -> Self {
        Self {
            provider_type: provider_type.into(),
            kind,
            fields: BTreeMap::new(),
        }
    }

    /// Copy provider attribute `provider_attr` into canonical property `canonical`
    pub fn field(mut self, canonical: impl Into<String>, provider_attr: impl Into<String>) -> Self {
        self.fields.insert(canonical.into(), provider_attr.into());
        self
    }

    pub fn provider_type(&self) -> &str {
        &self.provider_type
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }
}

/// Result of a lookup: kind plus rename table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mapping<'a> {
    pub kind: ResourceKind,
    pub fields: &'a BTreeMap<String, String>,
}

impl Mapping<'static> {
    /// Fallback for provider types without a rule
    pub fn unknown() -> Self {
        Self {
            kind: ResourceKind::Unknown,
            fields: &NO_FIELDS,
        }
    }
}

impl Mapping<'_> {
    pub fn is_unknown(&self) -> bool {
        self.kind == ResourceKind::Unknown
    }
}

/// Immutable set of mapping rules for one CSP
#[derive(Debug, Clone)]
pub struct MappingTable {
    csp: Csp,
    rules: HashMap<String, MappingRule>,
}

impl MappingTable {
    /// Build a table; at most one rule may match a provider type
    pub fn new(csp: Csp, rules: impl IntoIterator<Item = MappingRule>) -> Result<Self> {
        let mut by_type = HashMap::new();
        for rule in rules {
            if by_type.contains_key(rule.provider_type()) {
                return Err(CloudError::DuplicateMapping {
                    csp,
                    provider_type: rule.provider_type,
                });
            }
            by_type.insert(rule.provider_type.clone(), rule);
        }
        Ok(Self {
            csp,
            rules: by_type,
        })
    }

    pub fn csp(&self) -> Csp {
        self.csp
    }

    /// Look up a provider resource type. Never fails: unmapped types are `UNKNOWN`.
    pub fn lookup(&self, provider_type: &str) -> Mapping<'_> {
        match self.rules.get(provider_type) {
            Some(rule) => Mapping {
                kind: rule.kind,
                fields: &rule.fields,
            },
            None => Mapping::unknown(),
        }
    }

    /// Provider resource types with a rule, sorted
    pub fn supported_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.rules.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    /// Rules sorted by provider type
    pub fn rules(&self) -> Vec<&MappingRule> {
        let mut rules: Vec<&MappingRule> = self.rules.values().collect();
        rules.sort_by(|a, b| a.provider_type.cmp(&b.provider_type));
        rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
