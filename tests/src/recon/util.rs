#![cfg(test)]
use std::sync::atomic::AtomicU32;
use std::time::Duration;

use async_trait::async_trait;

use sondr_common::error::ModuleError;
use sondr_common::module::{
    FieldValue, ModuleDescriptor, ModuleOutput, ReconModule, TargetView,
};

type Behavior = dyn Fn(&TargetView) -> Result<ModuleOutput, ModuleError> + Send + Sync;
type DelayFor = dyn Fn(&TargetView) -> Duration + Send + Sync;

/// A scripted module for end-to-end runs: waits a per-target delay,
/// then answers from the behavior closure.
pub struct ScriptedModule {
    descriptor: ModuleDescriptor,
    delay_for: Box<DelayFor>,
    behavior: Box<Behavior>,
    pub calls: AtomicU32,
}

impl ScriptedModule {
    pub fn new(
        descriptor: ModuleDescriptor,
        behavior: impl Fn(&TargetView) -> Result<ModuleOutput, ModuleError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            descriptor,
            delay_for: Box::new(|_| Duration::ZERO),
            behavior: Box::new(behavior),
            calls: AtomicU32::new(0),
        }
    }

    pub fn with_delay_for(
        mut self,
        delay_for: impl Fn(&TargetView) -> Duration + Send + Sync + 'static,
    ) -> Self {
        self.delay_for = Box::new(delay_for);
        self
    }
}

#[async_trait]
impl ReconModule for ScriptedModule {
    fn descriptor(&self) -> &ModuleDescriptor {
        &self.descriptor
    }

    async fn execute(&self, view: &TargetView) -> Result<ModuleOutput, ModuleError> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let delay = (self.delay_for)(view);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        (self.behavior)(view)
    }
}

/// One-field module output.
pub fn field(name: &str, value: FieldValue) -> ModuleOutput {
    let mut out = ModuleOutput::new();
    out.insert(name.to_string(), value);
    out
}
