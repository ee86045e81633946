use std::sync::Arc;

use anyhow;
use tracing::info_span;

use sondr_common::config::{RateLimit, RunConfig};
use sondr_core::registry::ModuleRegistry;
use sondr_core::run;

use crate::commands::ScanArgs;
use crate::terminal::{input, print, spinner};

pub async fn scan(args: ScanArgs) -> anyhow::Result<()> {
    let mut registry = ModuleRegistry::new();
    let ports = if args.ports.is_empty() {
        sondr_modules::DEFAULT_PORTS.to_vec()
    } else {
        args.ports.clone()
    };
    for module in sondr_modules::builtin_modules(ports) {
        registry.register(module)?;
    }

    let config = build_config(&args, &registry);
    let handle = run::start(Arc::new(registry), args.targets.clone(), config)?;

    let cancel = handle.cancel_token();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        }
    });
    if !args.no_input {
        input::listen_for_cancel(cancel);
    }

    let span = info_span!("recon", indicatif.pb_show = true);
    let guard = span.enter();
    let spinner_handle = spinner::track_progress(span.clone(), handle.progress());

    let report = handle.wait().await?;

    let _ = spinner_handle.await;
    drop(guard);

    print::report(&report, args.quiet);
    Ok(())
}

fn build_config(args: &ScanArgs, registry: &ModuleRegistry) -> RunConfig {
    let mut config = RunConfig {
        concurrency: args.concurrency,
        max_retries: args.max_retries,
        range_ceiling: args.range_ceiling,
        strip_network_edges: args.strip_edges,
        quiet: args.quiet,
        ..RunConfig::default()
    };
    if let Some(rate) = args.rate {
        for module in registry.iter() {
            config.rate_limits.insert(
                module.descriptor().id.clone(),
                RateLimit {
                    rate,
                    burst: args.burst,
                },
            );
        }
    }
    config
}
