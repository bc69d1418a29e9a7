/// Module Manager: the orchestrating repository
///
/// This module handles:
/// - Scanning the module root and rebuilding every record from disk
/// - Enable / disable / remove through the active backend
/// - Installing archives with streamed output and id resolution
/// - Backend version queries
///
/// Records are never cached. Marker edits are applied synchronously before an
/// operation reports, so a caller always observes its own writes.

use crate::backend::{Backend, LifecyclePlan, Verb};
use crate::config::Settings;
use crate::error::ModuleError;
use crate::log_info;
use crate::log_parsed;
use crate::models::{InstallOutcome, ModuleRecord, OperationResult, UNKNOWN, UNKNOWN_CODE};
use crate::modules::props::{self, PROP_FILE};
use crate::modules::state::{apply_marker_ops, read_last_updated, read_state};
use crate::modules::{InstallCallback, InstallJob, LifecycleCallback, ModuleRepository};
use crate::system::command::is_valid_module_id;
use crate::system::shell::{RootShell, ShellConfig};
use futures::future::BoxFuture;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

#[derive(Clone)]
pub struct ModuleManager {
    module_root: PathBuf,
    scratch_dir: PathBuf,
    backend: Backend,
    shell: RootShell,
}

impl ModuleManager {
    pub fn new(module_root: PathBuf, scratch_dir: PathBuf, backend: Backend, shell: RootShell) -> Self {
        log_info!(
            "[ModuleManager] Using backend {} with module root {}",
            backend,
            module_root.display()
        );
        ModuleManager {
            module_root,
            scratch_dir,
            backend,
            shell,
        }
    }

    /// Detect the backend and start the shared shell. Must be called from
    /// within a tokio runtime.
    pub fn from_settings(settings: &Settings) -> Self {
        let backend = Backend::select(
            settings.backend,
            &settings.adb_root,
            &settings.magisk_binary,
            &settings.ksud_binary,
        );
        let shell = RootShell::start(ShellConfig {
            program: settings.shell_program.clone(),
            args: settings.shell_args.clone(),
            require_root: settings.require_root,
        });
        Self::new(
            settings.module_root.clone(),
            settings.scratch_dir.clone(),
            backend,
            shell,
        )
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    pub fn module_root(&self) -> &Path {
        &self.module_root
    }

    /// Build a record from one module directory. `None` when the directory
    /// has no readable `module.prop`.
    pub fn read_props_and_state(module_dir: &Path) -> Option<ModuleRecord> {
        let content = fs::read_to_string(module_dir.join(PROP_FILE)).ok()?;
        let props = props::parse_props(&content);
        Some(props::record_from_props(
            &props,
            read_state(module_dir),
            read_last_updated(module_dir),
        ))
    }

    /// Every valid module under the root, in directory listing order.
    pub fn get_modules(&self) -> Vec<ModuleRecord> {
        let entries = match fs::read_dir(&self.module_root) {
            Ok(entries) => entries,
            Err(e) => {
                log_info!(
                    "[ModuleManager] Cannot read module root {}: {}",
                    self.module_root.display(),
                    e
                );
                return vec![];
            }
        };

        let modules: Vec<ModuleRecord> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.is_dir())
            .filter_map(|path| Self::read_props_and_state(&path))
            .collect();

        log::debug!("[ModuleManager] Scan complete: {} modules", modules.len());
        modules
    }

    pub fn get_module_by_id(&self, id: &str) -> Option<ModuleRecord> {
        if !is_valid_module_id(id) {
            return None;
        }
        let dir = self.module_root.join(id);
        if !dir.is_dir() {
            return None;
        }
        Self::read_props_and_state(&dir)
    }

    pub async fn enable(&self, id: &str) -> OperationResult {
        self.apply(Verb::Enable, id).await
    }

    pub async fn disable(&self, id: &str) -> OperationResult {
        self.apply(Verb::Disable, id).await
    }

    pub async fn remove(&self, id: &str) -> OperationResult {
        self.apply(Verb::Remove, id).await
    }

    async fn apply(&self, verb: Verb, id: &str) -> OperationResult {
        let module_dir = match self.checked_module_dir(id) {
            Ok(dir) => dir,
            Err(ModuleError::InvalidId(_)) => {
                log_info!("[ModuleManager] [{}] Rejected invalid module id {:?}", verb, id);
                return OperationResult::failure(id, Some("invalid module id".to_string()));
            }
            Err(e) => {
                log_info!("[ModuleManager] [{}] {}", verb, e);
                return OperationResult::failure(id, None);
            }
        };

        let result = match self.backend.plan(verb, id) {
            LifecyclePlan::Markers(ops) => match apply_marker_ops(&module_dir, &ops) {
                Ok(()) => OperationResult::success(id),
                Err(e) => OperationResult::failure(id, Some(ModuleError::Io(e).to_string())),
            },
            LifecyclePlan::Command(command) => {
                log_info!("[ModuleManager] [{}] Running: {}", verb, command);
                let job = self.shell.run(command).await;
                if job.success {
                    OperationResult::success(id)
                } else {
                    OperationResult::failure(id, job.diagnostic())
                }
            }
        };

        match &result {
            OperationResult::Success { .. } => log_parsed!(
                "MODULE {}: {} succeeded, state now {}",
                verb,
                id,
                read_state(&module_dir)
            ),
            OperationResult::Failure { message, .. } => log_parsed!(
                "MODULE {}: {} failed: {}",
                verb,
                id,
                message.as_deref().unwrap_or("no diagnostic")
            ),
        }
        result
    }

    fn checked_module_dir(&self, id: &str) -> Result<PathBuf, ModuleError> {
        if !is_valid_module_id(id) {
            return Err(ModuleError::InvalidId(id.to_string()));
        }
        let dir = self.module_root.join(id);
        if !dir.is_dir() {
            return Err(ModuleError::DirectoryMissing(dir.display().to_string()));
        }
        Ok(dir)
    }

    /// Submit an install and return immediately. Output lines stream on the
    /// returned job; on success the module id is read from the archive.
    pub fn install(&self, archive: &Path) -> InstallJob {
        let (line_tx, lines) = mpsc::unbounded_channel();
        let (outcome_tx, outcome) = oneshot::channel();

        let archive = match archive.canonicalize() {
            Ok(path) => path,
            Err(e) => {
                let err = ModuleError::InvalidPath(format!("{}: {}", archive.display(), e));
                log_parsed!("MODULE INSTALL: {}", err);
                drop(line_tx);
                let _ = outcome_tx.send(InstallOutcome::Failure);
                return InstallJob { lines, outcome };
            }
        };

        log_parsed!(
            "MODULE INSTALL: Installing {} via {}",
            archive.display(),
            self.backend.name()
        );
        let result = self
            .shell
            .submit(self.backend.install_command(&archive), Some(line_tx));
        let scratch_dir = self.scratch_dir.clone();

        tokio::spawn(async move {
            let succeeded = matches!(result.await, Ok(job) if job.success);
            let outcome = if succeeded {
                let id = tokio::task::spawn_blocking(move || resolve_archive_id(&archive, &scratch_dir))
                    .await
                    .unwrap_or_else(|_| UNKNOWN.to_string());
                log_parsed!("MODULE INSTALL: Installed {}", id);
                InstallOutcome::Success { id }
            } else {
                log_parsed!("MODULE INSTALL: Installer reported failure");
                InstallOutcome::Failure
            };
            let _ = outcome_tx.send(outcome);
        });

        InstallJob { lines, outcome }
    }

    /// Backend version string, `"unknown"` when it cannot be queried.
    pub async fn backend_version(&self) -> String {
        let raw = self.shell.run_quick(self.backend.version_command()).await;
        if raw == UNKNOWN {
            return raw;
        }
        self.backend.parse_version(&raw)
    }

    /// Backend version code, `-1` when it cannot be queried.
    pub async fn backend_version_code(&self) -> i64 {
        self.shell
            .run_quick(self.backend.version_code_command())
            .await
            .parse()
            .unwrap_or(UNKNOWN_CODE)
    }

    /// Fire-and-forget lifecycle operation; the callback runs on a worker task.
    pub fn spawn_lifecycle(
        &self,
        verb: Verb,
        id: &str,
        callback: impl LifecycleCallback,
    ) -> JoinHandle<()> {
        let this = self.clone();
        let id = id.to_string();
        tokio::spawn(async move {
            this.apply(verb, &id).await.notify(&callback);
        })
    }

    pub fn spawn_enable(&self, id: &str, callback: impl LifecycleCallback) -> JoinHandle<()> {
        self.spawn_lifecycle(Verb::Enable, id, callback)
    }

    pub fn spawn_disable(&self, id: &str, callback: impl LifecycleCallback) -> JoinHandle<()> {
        self.spawn_lifecycle(Verb::Disable, id, callback)
    }

    pub fn spawn_remove(&self, id: &str, callback: impl LifecycleCallback) -> JoinHandle<()> {
        self.spawn_lifecycle(Verb::Remove, id, callback)
    }

    /// Fire-and-forget install; the callback runs on a worker task.
    pub fn spawn_install(&self, archive: &Path, callback: impl InstallCallback) -> JoinHandle<()> {
        let job = self.install(archive);
        tokio::spawn(async move {
            job.drive(&callback).await;
        })
    }
}

/// Copy `module.prop` out of the archive into a scratch directory, read the
/// id from it and remove the copy. Any failure resolves to `"unknown"`.
fn resolve_archive_id(archive: &Path, scratch_dir: &Path) -> String {
    match extract_prop_file(archive, scratch_dir) {
        Ok(content) => props::extract_id(&content).unwrap_or_else(|| UNKNOWN.to_string()),
        Err(e) => {
            log_info!(
                "[ModuleManager] Could not read {} from {}: {}",
                PROP_FILE,
                archive.display(),
                e
            );
            UNKNOWN.to_string()
        }
    }
}

fn extract_prop_file(archive: &Path, scratch_dir: &Path) -> Result<String, ModuleError> {
    let scratch = tempfile::Builder::new()
        .prefix("rootmod-install-")
        .tempdir_in(scratch_dir)?;
    let unpacked = scratch.path().join(PROP_FILE);

    let mut zip = zip::ZipArchive::new(fs::File::open(archive)?)?;
    {
        let mut entry = zip.by_name(PROP_FILE)?;
        let mut out = fs::File::create(&unpacked)?;
        io::copy(&mut entry, &mut out)?;
    }

    let mut content = String::new();
    fs::File::open(&unpacked)?.read_to_string(&mut content)?;
    fs::remove_file(&unpacked)?;
    Ok(content)
}

impl ModuleRepository for ModuleManager {
    fn get_modules(&self) -> Vec<ModuleRecord> {
        ModuleManager::get_modules(self)
    }

    fn get_module_by_id(&self, id: &str) -> Option<ModuleRecord> {
        ModuleManager::get_module_by_id(self, id)
    }

    fn enable(&self, id: &str) -> BoxFuture<'static, OperationResult> {
        let this = self.clone();
        let id = id.to_string();
        Box::pin(async move { this.apply(Verb::Enable, &id).await })
    }

    fn disable(&self, id: &str) -> BoxFuture<'static, OperationResult> {
        let this = self.clone();
        let id = id.to_string();
        Box::pin(async move { this.apply(Verb::Disable, &id).await })
    }

    fn remove(&self, id: &str) -> BoxFuture<'static, OperationResult> {
        let this = self.clone();
        let id = id.to_string();
        Box::pin(async move { this.apply(Verb::Remove, &id).await })
    }

    fn install(&self, archive: &Path) -> InstallJob {
        ModuleManager::install(self, archive)
    }

    fn backend_version(&self) -> BoxFuture<'static, String> {
        let this = self.clone();
        Box::pin(async move { ModuleManager::backend_version(&this).await })
    }

    fn backend_version_code(&self) -> BoxFuture<'static, i64> {
        let this = self.clone();
        Box::pin(async move { ModuleManager::backend_version_code(&this).await })
    }
}
