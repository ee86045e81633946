//! Print-style logging macros shared across the workspace.
//!
//! These forward to `tracing` events; the CLI installs a formatter that
//! renders the level as a status symbol (`[+]`, `[*]`, `[-]`).

#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => { ::tracing::info!($($arg)*) };
}

#[macro_export]
macro_rules! success {
    ($($arg:tt)*) => { ::tracing::info!($($arg)*) };
}

#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => { ::tracing::warn!($($arg)*) };
}

#[macro_export]
macro_rules! fail {
    ($($arg:tt)*) => { ::tracing::error!($($arg)*) };
}
