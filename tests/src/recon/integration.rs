#![cfg(test)]
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use sondr_common::config::RunConfig;
use sondr_common::error::ModuleError;
use sondr_common::module::{FieldValue, ModuleDescriptor, caps};
use sondr_common::record::{FailureKind, RecordOutcome};
use sondr_core::registry::ModuleRegistry;

use crate::recon::util::{ScriptedModule, field};

fn resolve_stub() -> Arc<ScriptedModule> {
    Arc::new(ScriptedModule::new(
        ModuleDescriptor::new("resolve")
            .requires(caps::HOSTNAME)
            .produces(caps::ADDR),
        |_| {
            Ok(field(
                caps::ADDR,
                FieldValue::Addrs(vec!["10.0.0.5".parse().unwrap()]),
            ))
        },
    ))
}

fn ports_stub() -> Arc<ScriptedModule> {
    Arc::new(ScriptedModule::new(
        ModuleDescriptor::new("tcp-ports")
            .requires(caps::ADDR)
            .produces(caps::OPEN_PORTS),
        |view| {
            if view.addrs().is_empty() {
                return Err(ModuleError::Fatal("no address in view".into()));
            }
            Ok(field(caps::OPEN_PORTS, FieldValue::Ports(vec![22])))
        },
    ))
}

fn registry(modules: Vec<Arc<ScriptedModule>>) -> Arc<ModuleRegistry> {
    let mut registry = ModuleRegistry::new();
    for module in modules {
        registry.register(module).unwrap();
    }
    Arc::new(registry)
}

/// Two hostname targets flow through a two-module dependency chain;
/// every record ends Completed with both fields merged.
#[tokio::test]
async fn full_run_with_dependency_chain() {
    let registry = registry(vec![resolve_stub(), ports_stub()]);
    let inputs = vec!["alpha.example.com".to_string(), "beta.example.com".to_string()];

    let handle = sondr_core::start(registry, inputs, RunConfig::default()).unwrap();
    let report = handle.wait().await.unwrap();

    assert_eq!(report.records.len(), 2);
    assert_eq!(report.stats.units, 4);
    assert_eq!(report.stats.succeeded, 4);
    assert_eq!(report.stats.failed, 0);
    for record in &report.records {
        assert_eq!(record.outcome, RecordOutcome::Completed);
        assert!(record.fields.contains_key(caps::ADDR));
        assert!(record.fields.contains_key(caps::OPEN_PORTS));
        assert!(record.failures.is_empty());
    }
}

/// A module that always fails transiently is attempted exactly
/// 1 + max_retries times and the target still gets a record.
#[tokio::test]
async fn retry_exhaustion_end_to_end() {
    let flaky = Arc::new(ScriptedModule::new(
        ModuleDescriptor::new("flaky").requires(caps::ADDR),
        |_| Err(ModuleError::Transient("connection reset".into())),
    ));
    let config = RunConfig {
        max_retries: 2,
        backoff_base: Duration::from_millis(5),
        backoff_cap: Duration::from_millis(20),
        ..RunConfig::default()
    };

    let handle = sondr_core::start(
        registry(vec![flaky.clone()]),
        vec!["192.0.2.1".to_string()],
        config,
    )
    .unwrap();
    let report = handle.wait().await.unwrap();

    assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
    assert_eq!(report.stats.retries, 2);
    assert_eq!(report.stats.failed, 1);
    let record = &report.records[0];
    assert!(record.is_empty());
    assert_eq!(record.failures[0].kind, FailureKind::Transient);
    assert_eq!(record.failures[0].attempts, 3);
}

/// Cancelling after the first target settles leaves that target with a
/// full record; the rest are Cancelled and carry no partial fields.
#[tokio::test]
async fn cancellation_keeps_completed_records_only() {
    let probe = Arc::new(
        ScriptedModule::new(
            ModuleDescriptor::new("probe")
                .requires(caps::ADDR)
                .produces("probed"),
            |_| Ok(field("probed", FieldValue::Count(1))),
        )
        .with_delay_for(|view| {
            if view.target().identity == "10.0.0.1" {
                Duration::ZERO
            } else {
                Duration::from_secs(30)
            }
        }),
    );

    let inputs = (1..=5).map(|n| format!("10.0.0.{n}")).collect();
    let handle = sondr_core::start(registry(vec![probe]), inputs, RunConfig::default()).unwrap();

    let mut progress = handle.progress();
    while progress.changed().await.is_ok() {
        if progress.borrow().targets_done >= 1 {
            break;
        }
    }
    handle.cancel();
    let report = handle.wait().await.unwrap();

    assert_eq!(report.records.len(), 5);
    let completed: Vec<_> = report
        .records
        .iter()
        .filter(|r| r.outcome == RecordOutcome::Completed)
        .collect();
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].target.identity, "10.0.0.1");
    assert!(completed[0].fields.contains_key("probed"));

    for record in report.records.iter().filter(|r| r.outcome == RecordOutcome::Cancelled) {
        assert!(record.is_empty(), "cancelled targets must hold no partial fields");
    }
    assert_eq!(report.stats.cancelled, 4);
}

/// Failure isolation: one module failing fatally never stops the other
/// module or the other targets, and every unit settles.
#[tokio::test]
async fn per_unit_failure_isolation() {
    let broken = Arc::new(ScriptedModule::new(
        ModuleDescriptor::new("broken").requires(caps::ADDR),
        |_| Err(ModuleError::Fatal("unsupported target".into())),
    ));
    let steady = Arc::new(ScriptedModule::new(
        ModuleDescriptor::new("steady")
            .requires(caps::ADDR)
            .produces("seen"),
        |_| Ok(field("seen", FieldValue::Count(1))),
    ));

    let handle = sondr_core::start(
        registry(vec![broken, steady]),
        vec!["192.0.2.0/30".to_string()],
        RunConfig::default(),
    )
    .unwrap();
    let report = handle.wait().await.unwrap();

    assert_eq!(report.records.len(), 4);
    assert_eq!(report.stats.units, 8);
    assert_eq!(
        report.stats.succeeded + report.stats.failed + report.stats.cancelled,
        report.stats.units,
        "every unit reaches a terminal state"
    );
    for record in &report.records {
        assert_eq!(record.outcome, RecordOutcome::Completed);
        assert!(record.fields.contains_key("seen"));
        assert_eq!(record.failures.len(), 1);
        assert_eq!(record.failures[0].kind, FailureKind::Fatal);
    }
}

/// The built-in tcp-ports module through the whole engine, against a
/// local listener.
#[tokio::test]
async fn builtin_port_probe_against_loopback() {
    use tokio::net::TcpListener;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let mut registry = ModuleRegistry::new();
    registry
        .register(Arc::new(sondr_modules::ports::TcpPortModule::new(vec![port])))
        .unwrap();

    let handle = sondr_core::start(
        Arc::new(registry),
        vec!["127.0.0.1".to_string()],
        RunConfig::default(),
    )
    .unwrap();
    let report = handle.wait().await.unwrap();

    assert_eq!(report.stats.succeeded, 1);
    let record = &report.records[0];
    let contributions = &record.fields[caps::OPEN_PORTS];
    assert_eq!(contributions[0].value, FieldValue::Ports(vec![port]));
}
