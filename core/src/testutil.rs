//! Stub modules for engine tests.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use sondr_common::error::ModuleError;
use sondr_common::module::{
    FieldValue, ModuleDescriptor, ModuleOutput, ReconModule, TargetView,
};

type Behavior = dyn Fn(u32, &TargetView) -> Result<ModuleOutput, ModuleError> + Send + Sync;

/// A scriptable module: sleeps `delay`, then answers with whatever the
/// behavior closure returns for the current call number. Tracks call
/// counts and the concurrency high-water mark.
pub struct StubModule {
    descriptor: ModuleDescriptor,
    delay: Duration,
    behavior: Box<Behavior>,
    pub calls: AtomicU32,
    running: AtomicUsize,
    pub peak_running: AtomicUsize,
}

impl StubModule {
    pub fn new(
        id: &str,
        behavior: impl Fn(u32, &TargetView) -> Result<ModuleOutput, ModuleError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        Self::with_descriptor(ModuleDescriptor::new(id), behavior)
    }

    pub fn with_descriptor(
        descriptor: ModuleDescriptor,
        behavior: impl Fn(u32, &TargetView) -> Result<ModuleOutput, ModuleError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        Self {
            descriptor,
            delay: Duration::ZERO,
            behavior: Box::new(behavior),
            calls: AtomicU32::new(0),
            running: AtomicUsize::new(0),
            peak_running: AtomicUsize::new(0),
        }
    }

    pub fn with_requires(mut self, capability: &str) -> Self {
        self.descriptor.requires.insert(capability.to_string());
        self
    }

    pub fn with_weight(mut self, weight: usize) -> Self {
        self.descriptor.weight = weight;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl ReconModule for StubModule {
    fn descriptor(&self) -> &ModuleDescriptor {
        &self.descriptor
    }

    async fn execute(&self, view: &TargetView) -> Result<ModuleOutput, ModuleError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_running.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let result = (self.behavior)(call, view);
        self.running.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// One-field module output.
pub fn fields(name: &str, value: FieldValue) -> ModuleOutput {
    let mut out = ModuleOutput::new();
    out.insert(name.to_string(), value);
    out
}
