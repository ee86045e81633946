//! Hostname resolution.

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::lookup_host;
use tracing::debug;

use sondr_common::error::ModuleError;
use sondr_common::module::{
    FieldValue, ModuleDescriptor, ModuleOutput, ReconModule, TargetView, caps,
};

/// Resolves a named target to its address set via the system resolver.
pub struct ResolveModule {
    descriptor: ModuleDescriptor,
}

impl ResolveModule {
    pub fn new() -> Self {
        Self {
            descriptor: ModuleDescriptor::new("resolve")
                .requires(caps::HOSTNAME)
                .produces(caps::ADDR)
                .timeout(Duration::from_secs(5)),
        }
    }
}

impl Default for ResolveModule {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReconModule for ResolveModule {
    fn descriptor(&self) -> &ModuleDescriptor {
        &self.descriptor
    }

    async fn execute(&self, view: &TargetView) -> Result<ModuleOutput, ModuleError> {
        let Some(host) = view.hostname() else {
            return Err(ModuleError::Fatal("target has no hostname".into()));
        };

        // Port 0 keeps this a pure name lookup.
        let mut addrs: Vec<IpAddr> = lookup_host((host, 0u16))
            .await
            .map_err(|e| ModuleError::Transient(format!("lookup of '{host}' failed: {e}")))?
            .map(|sock| sock.ip())
            .collect();
        addrs.dedup();

        if addrs.is_empty() {
            return Err(ModuleError::Fatal(format!("'{host}' has no addresses")));
        }
        debug!("resolved {host} to {} address(es)", addrs.len());

        let mut out = ModuleOutput::new();
        out.insert(caps::ADDR.to_string(), FieldValue::Addrs(addrs));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sondr_common::network::target::Target;
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn address_target_is_rejected() {
        let module = ResolveModule::new();
        let target = Target::from_addr("192.0.2.1".parse().unwrap());
        let view = TargetView::new(target, BTreeMap::new());

        let err = module.execute(&view).await.unwrap_err();
        assert!(matches!(err, ModuleError::Fatal(_)));
    }

    #[tokio::test]
    #[ignore]
    async fn resolves_a_public_hostname() {
        let module = ResolveModule::new();
        let target = Target::from_hostname("one.one.one.one".into());
        let view = TargetView::new(target, BTreeMap::new());

        let out = module.execute(&view).await.unwrap();
        assert!(matches!(
            out.get(caps::ADDR),
            Some(FieldValue::Addrs(addrs)) if !addrs.is_empty()
        ));
    }
}
