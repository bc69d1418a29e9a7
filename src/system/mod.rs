//! System module: privileged shell execution and typed command construction

pub mod command;
pub mod shell;

pub use command::{is_valid_module_id, shell_quote, ShellCommand, ShellScript};
pub use shell::{JobResult, RootShell, ShellConfig, ShellJob};

/// Logging macros for convenient access
/// Now use the log crate directly for target-aware routing
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {{
        let msg = format!($($arg)*);
        log::info!("{}", msg);
    }}
}

#[macro_export]
macro_rules! log_parsed {
    ($($arg:tt)*) => {{
        let msg = format!($($arg)*);
        // Use target="parsed" for high-level events
        log::info!(target: "parsed", "{}", msg);
    }}
}
