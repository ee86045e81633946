//! Built-in probing modules.
//!
//! These are intentionally thin: the engine depends only on the module
//! contract, and these implementations exist so a default install can
//! sweep targets out of the box. They chain through capabilities:
//! `resolve` turns hostnames into addresses, `tcp-ports` needs an
//! address, `banner` needs open ports.

pub mod banner;
pub mod ports;
pub mod resolve;

use std::sync::Arc;

use sondr_common::module::ReconModule;

/// Ports probed when the user does not pass a list.
pub const DEFAULT_PORTS: &[u16] = &[
    21, 22, 23, 25, 53, 80, 110, 143, 443, 445, 993, 995, 3306, 3389, 5432, 8080, 8443,
];

/// The default module set: resolve, then tcp-ports, then banner.
pub fn builtin_modules(ports: Vec<u16>) -> Vec<Arc<dyn ReconModule>> {
    vec![
        Arc::new(resolve::ResolveModule::new()),
        Arc::new(ports::TcpPortModule::new(ports)),
        Arc::new(banner::BannerModule::new()),
    ]
}
