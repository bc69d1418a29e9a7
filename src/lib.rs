//! rootmod core
//!
//! Manages root modules (system overlay packages) on a rooted Android device:
//! discovering installed modules, deriving their lifecycle state from marker
//! files, and running enable / disable / remove / install through a persistent
//! privileged shell against either Magisk or KernelSU.
//!
//! The system is organized into functional modules:
//! - **error**: Unified error type hierarchy
//! - **models**: Module record and operation outcome types
//! - **backend**: Magisk / KernelSU command and marker conventions
//! - **system**: Privileged shell executor and typed shell commands
//! - **modules**: Module repository (discovery, state, lifecycle)
//! - **config**: Settings file management
//! - **log_collector**: Logging pipeline

// Core foundational modules
pub mod error;
pub mod models;

pub mod backend;
pub mod config;
pub mod log_collector;
pub mod modules;
pub mod system;

// Re-export the log crate for macro usage
pub use log;

pub use backend::{Backend, BackendKind, Verb};
pub use config::{Settings, SettingsManager};
pub use error::{ConfigError, ModuleError, Result, ShellError};
pub use log_collector::{LogCollector, LogLine};
pub use models::{InstallOutcome, ModuleRecord, ModuleState, OperationResult, OutputLine};
pub use modules::{InstallCallback, InstallJob, LifecycleCallback, ModuleManager, ModuleRepository};
pub use system::{RootShell, ShellCommand, ShellConfig, ShellScript};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_constant() {
        assert_eq!(VERSION, "0.1.0");
    }

    #[test]
    fn test_root_reexports_match_modules() {
        assert_eq!(ModuleState::default(), models::ModuleState::Enable);
        assert_eq!(BackendKind::default(), backend::BackendKind::Auto);
        assert_eq!(
            OperationResult::success("a"),
            models::OperationResult::Success { id: "a".to_string() }
        );
    }
}
