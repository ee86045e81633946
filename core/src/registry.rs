//! # Module Registry
//!
//! Holds the probing modules available to a run and answers which of
//! them can execute against a target, given the capabilities the target
//! has accumulated so far.

use std::collections::BTreeSet;
use std::sync::Arc;

use sondr_common::error::EngineError;
use sondr_common::module::ReconModule;

#[derive(Default)]
pub struct ModuleRegistry {
    modules: Vec<Arc<dyn ReconModule>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a module. Identities are unique per registry.
    pub fn register(&mut self, module: Arc<dyn ReconModule>) -> Result<(), EngineError> {
        let id = &module.descriptor().id;
        if self.modules.iter().any(|m| &m.descriptor().id == id) {
            return Err(EngineError::DuplicateModule(id.clone()));
        }
        self.modules.push(module);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn ReconModule>> {
        self.modules.iter()
    }

    /// Modules whose requirements are satisfied by `caps`, lazily.
    ///
    /// Callers re-invoke this whenever a target gains capabilities, so
    /// dependent modules become applicable as their prerequisites merge.
    pub fn applicable<'a>(
        &'a self,
        caps: &'a BTreeSet<String>,
    ) -> impl Iterator<Item = &'a Arc<dyn ReconModule>> {
        self.modules
            .iter()
            .filter(move |module| module.descriptor().requires.iter().all(|req| caps.contains(req)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::StubModule;
    use sondr_common::module::ModuleDescriptor;

    fn stub(id: &str, requires: &[&str]) -> Arc<dyn ReconModule> {
        let mut descriptor = ModuleDescriptor::new(id);
        for req in requires {
            descriptor = descriptor.requires(req);
        }
        Arc::new(StubModule::with_descriptor(descriptor, |_, _| {
            Ok(Default::default())
        }))
    }

    fn caps(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn duplicate_identity_is_rejected() {
        let mut registry = ModuleRegistry::new();
        registry.register(stub("resolve", &[])).unwrap();

        let err = registry.register(stub("resolve", &["addr"])).unwrap_err();
        assert!(matches!(err, EngineError::DuplicateModule(id) if id == "resolve"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn applicability_follows_capability_growth() {
        let mut registry = ModuleRegistry::new();
        registry.register(stub("resolve", &["hostname"])).unwrap();
        registry.register(stub("ports", &["addr"])).unwrap();
        registry.register(stub("banner", &["addr", "open_ports"])).unwrap();

        let ids = |caps: &BTreeSet<String>| -> Vec<String> {
            registry
                .applicable(caps)
                .map(|m| m.descriptor().id.clone())
                .collect()
        };

        assert_eq!(ids(&caps(&["hostname"])), ["resolve"]);
        assert_eq!(ids(&caps(&["hostname", "addr"])), ["resolve", "ports"]);
        assert_eq!(
            ids(&caps(&["hostname", "addr", "open_ports"])),
            ["resolve", "ports", "banner"]
        );
        assert!(ids(&caps(&[])).is_empty());
    }
}
