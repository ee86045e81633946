//! The module contract.
//!
//! A probing module is data-described: its descriptor names the
//! capabilities a target must already have and the fields a successful
//! execution emits. The scheduler matches `requires` against a target's
//! current capability set, so module dependencies form a DAG without any
//! explicit graph structure.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::net::IpAddr;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;

use crate::error::ModuleError;
use crate::network::target::Target;

/// Well-known capability and field names shared between modules.
pub mod caps {
    pub const ADDR: &str = "addr";
    pub const HOSTNAME: &str = "hostname";
    pub const OPEN_PORTS: &str = "open_ports";
    pub const BANNERS: &str = "banners";
}

/// A single discovered value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Addrs(Vec<IpAddr>),
    Ports(Vec<u16>),
    List(Vec<String>),
    Count(u64),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Addrs(addrs) => {
                let joined: Vec<String> = addrs.iter().map(|a| a.to_string()).collect();
                f.write_str(&joined.join(", "))
            }
            Self::Ports(ports) => {
                let joined: Vec<String> = ports.iter().map(|p| p.to_string()).collect();
                f.write_str(&joined.join(", "))
            }
            Self::List(items) => f.write_str(&items.join(", ")),
            Self::Count(n) => write!(f, "{n}"),
        }
    }
}

/// Field map emitted by one successful module execution.
pub type ModuleOutput = BTreeMap<String, FieldValue>;

/// Static description of a probing module.
#[derive(Debug, Clone)]
pub struct ModuleDescriptor {
    pub id: String,
    /// Capabilities the target must already have.
    pub requires: BTreeSet<String>,
    /// Field names a successful execution emits.
    pub produces: BTreeSet<String>,
    /// Deadline for one execution.
    pub timeout: Duration,
    /// Max concurrent executions of this module; 0 means no cap beyond
    /// the global concurrency limit.
    pub weight: usize,
    /// Retry budget override; `None` defers to the run configuration.
    pub max_retries: Option<u32>,
}

impl ModuleDescriptor {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            requires: BTreeSet::new(),
            produces: BTreeSet::new(),
            timeout: Duration::from_secs(10),
            weight: 0,
            max_retries: None,
        }
    }

    pub fn requires(mut self, capability: &str) -> Self {
        self.requires.insert(capability.to_string());
        self
    }

    pub fn produces(mut self, field: &str) -> Self {
        self.produces.insert(field.to_string());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn weight(mut self, weight: usize) -> Self {
        self.weight = weight;
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }
}

/// What a module execution gets to see: the immutable target plus a
/// snapshot of the fields merged for it so far. Dependent modules read
/// their prerequisites' output from here.
#[derive(Debug, Clone)]
pub struct TargetView {
    target: Target,
    fields: BTreeMap<String, Vec<FieldValue>>,
}

impl TargetView {
    pub fn new(target: Target, fields: BTreeMap<String, Vec<FieldValue>>) -> Self {
        Self { target, fields }
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn hostname(&self) -> Option<&str> {
        self.target.host.as_deref()
    }

    pub fn field(&self, name: &str) -> Option<&[FieldValue]> {
        self.fields.get(name).map(Vec::as_slice)
    }

    /// The target's known addresses: its own literal plus everything a
    /// resolver merged, deduplicated in discovery order.
    pub fn addrs(&self) -> Vec<IpAddr> {
        let mut addrs: Vec<IpAddr> = Vec::new();
        if let Some(addr) = self.target.addr {
            addrs.push(addr);
        }
        if let Some(values) = self.fields.get(caps::ADDR) {
            for value in values {
                if let FieldValue::Addrs(list) = value {
                    for addr in list {
                        if !addrs.contains(addr) {
                            addrs.push(*addr);
                        }
                    }
                }
            }
        }
        addrs
    }

    /// Open ports reported for the target, sorted and deduplicated.
    pub fn ports(&self) -> Vec<u16> {
        let mut ports: Vec<u16> = Vec::new();
        if let Some(values) = self.fields.get(caps::OPEN_PORTS) {
            for value in values {
                if let FieldValue::Ports(list) = value {
                    ports.extend(list.iter().copied());
                }
            }
        }
        ports.sort_unstable();
        ports.dedup();
        ports
    }
}

/// Raw output of one successful module execution, with provenance.
#[derive(Debug, Clone)]
pub struct ModuleResult {
    pub module: String,
    pub recorded_at: SystemTime,
    pub fields: ModuleOutput,
}

impl ModuleResult {
    pub fn new(module: &str, fields: ModuleOutput) -> Self {
        Self {
            module: module.to_string(),
            recorded_at: SystemTime::now(),
            fields,
        }
    }
}

/// A pluggable probing unit. Implementations live outside the engine;
/// the scheduler only relies on this contract.
#[async_trait]
pub trait ReconModule: Send + Sync {
    fn descriptor(&self) -> &ModuleDescriptor;

    /// Probes one target. The scheduler enforces the descriptor's
    /// deadline around this call, so implementations may block on I/O
    /// freely.
    async fn execute(&self, view: &TargetView) -> Result<ModuleOutput, ModuleError>;
}
