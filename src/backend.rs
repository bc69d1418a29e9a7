//! Root-manager backends.
//!
//! Magisk keeps module state purely in marker files, so its lifecycle verbs
//! are plain file manipulation. KernelSU owns its state behind `ksud`, so its
//! verbs are commands whose exit status is the outcome. Both install through
//! the manager binary. The backend is picked once at startup and carries no
//! other state.

use crate::system::command::ShellCommand;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Zero-byte files inside a module directory that encode lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Marker {
    Remove,
    Disable,
    Update,
}

impl Marker {
    pub fn file_name(self) -> &'static str {
        match self {
            Marker::Remove => "remove",
            Marker::Disable => "disable",
            Marker::Update => "update",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerOp {
    Create(Marker),
    Delete(Marker),
}

/// Lifecycle verbs that act on an installed module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Enable,
    Disable,
    Remove,
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verb::Enable => write!(f, "ENABLE"),
            Verb::Disable => write!(f, "DISABLE"),
            Verb::Remove => write!(f, "REMOVE"),
        }
    }
}

/// What the manager has to do to carry out a verb.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecyclePlan {
    /// Apply in order, directly on the module directory.
    Markers(Vec<MarkerOp>),
    /// Run in the privileged shell; exit status decides the outcome.
    Command(ShellCommand),
}

/// Which backend to use; `Auto` probes the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Auto,
    Magisk,
    KernelSu,
}

impl std::str::FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(BackendKind::Auto),
            "magisk" => Ok(BackendKind::Magisk),
            "kernelsu" | "ksu" => Ok(BackendKind::KernelSu),
            _ => Err(format!("Unknown backend: {}", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    Magisk { binary: String },
    KernelSu { binary: String },
}

impl Backend {
    /// Resolve the active backend. KernelSU leaves `ksu/` (or the `ksud`
    /// binary) under the adb root; anything else is treated as Magisk.
    pub fn select(kind: BackendKind, adb_root: &Path, magisk_bin: &str, ksud_bin: &str) -> Self {
        let magisk = || Backend::Magisk {
            binary: magisk_bin.to_string(),
        };
        let ksu = || Backend::KernelSu {
            binary: ksud_bin.to_string(),
        };
        match kind {
            BackendKind::Magisk => magisk(),
            BackendKind::KernelSu => ksu(),
            BackendKind::Auto => {
                if adb_root.join("ksu").is_dir() || adb_root.join("ksud").exists() {
                    ksu()
                } else {
                    magisk()
                }
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Backend::Magisk { .. } => "Magisk",
            Backend::KernelSu { .. } => "KernelSU",
        }
    }

    pub fn binary(&self) -> &str {
        match self {
            Backend::Magisk { binary } | Backend::KernelSu { binary } => binary,
        }
    }

    /// Translate a verb for module `id`. The id must already be validated.
    pub fn plan(&self, verb: Verb, id: &str) -> LifecyclePlan {
        match self {
            Backend::Magisk { .. } => LifecyclePlan::Markers(match verb {
                Verb::Enable => vec![
                    MarkerOp::Delete(Marker::Remove),
                    MarkerOp::Delete(Marker::Disable),
                ],
                Verb::Disable => vec![
                    MarkerOp::Delete(Marker::Remove),
                    MarkerOp::Create(Marker::Disable),
                ],
                Verb::Remove => vec![
                    MarkerOp::Delete(Marker::Disable),
                    MarkerOp::Create(Marker::Remove),
                ],
            }),
            Backend::KernelSu { binary } => {
                let action = match verb {
                    Verb::Enable => "enable",
                    Verb::Disable => "disable",
                    Verb::Remove => "uninstall",
                };
                LifecyclePlan::Command(
                    ShellCommand::new(binary.as_str())
                        .arg("module")
                        .arg(action)
                        .arg(id),
                )
            }
        }
    }

    pub fn install_command(&self, archive: &Path) -> ShellCommand {
        ShellCommand::new(self.binary())
            .arg("--install-module")
            .path_arg(archive)
    }

    pub fn version_command(&self) -> ShellCommand {
        match self {
            Backend::Magisk { binary } => ShellCommand::new(binary.as_str()).arg("-v"),
            Backend::KernelSu { binary } => ShellCommand::new(binary.as_str()).arg("--version"),
        }
    }

    pub fn version_code_command(&self) -> ShellCommand {
        ShellCommand::new(self.binary()).arg("-V")
    }

    /// Normalize version output. `ksud --version` prints `ksud <version>`.
    pub fn parse_version(&self, output: &str) -> String {
        let output = output.trim();
        match self {
            Backend::Magisk { .. } => output.to_string(),
            Backend::KernelSu { .. } => output
                .split_whitespace()
                .last()
                .unwrap_or(output)
                .to_string(),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.binary())
    }
}
