//! Module repository: discovery, state derivation and lifecycle operations
//!
//! - `props`: `module.prop` parsing and record construction
//! - `state`: marker-file state, last-updated time, marker edits
//! - `manager`: `ModuleManager`, the orchestrating repository
//!
//! External collaborators (UI, CLI) talk to the repository through
//! [`ModuleRepository`] or through the callback traits below.

pub mod manager;
pub mod props;
pub mod state;

use crate::models::{InstallOutcome, ModuleRecord, OperationResult, OutputLine};
use futures::future::BoxFuture;
use std::path::Path;
use tokio::sync::{mpsc, oneshot};

pub use manager::ModuleManager;

/// Receives the outcome of enable / disable / remove.
pub trait LifecycleCallback: Send + Sync + 'static {
    fn on_success(&self, id: &str);
    fn on_failure(&self, id: &str, message: Option<&str>);
}

/// Receives streamed install output, then exactly one terminal call.
pub trait InstallCallback: Send + Sync + 'static {
    fn on_stdout(&self, line: &str);
    fn on_stderr(&self, line: &str);
    fn on_success(&self, id: &str);
    fn on_failure(&self);
}

impl OperationResult {
    pub fn notify(&self, callback: &dyn LifecycleCallback) {
        match self {
            OperationResult::Success { id } => callback.on_success(id),
            OperationResult::Failure { id, message } => callback.on_failure(id, message.as_deref()),
        }
    }
}

/// A running install. `lines` closes before `outcome` resolves.
pub struct InstallJob {
    pub lines: mpsc::UnboundedReceiver<OutputLine>,
    pub outcome: oneshot::Receiver<InstallOutcome>,
}

impl InstallJob {
    /// Feed every line, then the outcome, to `callback`.
    pub async fn drive(mut self, callback: &dyn InstallCallback) -> InstallOutcome {
        while let Some(line) = self.lines.recv().await {
            match &line {
                OutputLine::Stdout(text) => callback.on_stdout(text),
                OutputLine::Stderr(text) => callback.on_stderr(text),
            }
        }
        let outcome = self.outcome.await.unwrap_or(InstallOutcome::Failure);
        match &outcome {
            InstallOutcome::Success { id } => callback.on_success(id),
            InstallOutcome::Failure => callback.on_failure(),
        }
        outcome
    }

    /// Collect all output and the outcome.
    pub async fn wait(mut self) -> (Vec<OutputLine>, InstallOutcome) {
        let mut lines = Vec::new();
        while let Some(line) = self.lines.recv().await {
            lines.push(line);
        }
        let outcome = self.outcome.await.unwrap_or(InstallOutcome::Failure);
        (lines, outcome)
    }
}

/// Narrow interface the rest of an application uses to reach the core.
pub trait ModuleRepository: Send + Sync {
    fn get_modules(&self) -> Vec<ModuleRecord>;
    fn get_module_by_id(&self, id: &str) -> Option<ModuleRecord>;
    fn enable(&self, id: &str) -> BoxFuture<'static, OperationResult>;
    fn disable(&self, id: &str) -> BoxFuture<'static, OperationResult>;
    fn remove(&self, id: &str) -> BoxFuture<'static, OperationResult>;
    fn install(&self, archive: &Path) -> InstallJob;
    fn backend_version(&self) -> BoxFuture<'static, String>;
    fn backend_version_code(&self) -> BoxFuture<'static, i64>;
}
