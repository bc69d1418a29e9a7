//! Lifecycle state and timestamps derived from a module directory.

use crate::backend::{Marker, MarkerOp};
use crate::models::ModuleState;
use chrono::{DateTime, Utc};
use std::fs::{self, File};
use std::io;
use std::path::Path;

/// Files consulted, in order, for a module's last-updated time.
pub const MODULE_FILES: [&str; 6] = [
    "post-fs-data.sh",
    "service.sh",
    "uninstall.sh",
    "system",
    "system.prop",
    "module.prop",
];

/// First match wins: remove, then disable, then update.
pub fn read_state(module_dir: &Path) -> ModuleState {
    let has = |marker: Marker| module_dir.join(marker.file_name()).exists();
    if has(Marker::Remove) {
        ModuleState::Remove
    } else if has(Marker::Disable) {
        ModuleState::Disable
    } else if has(Marker::Update) {
        ModuleState::Update
    } else {
        ModuleState::Enable
    }
}

/// Modification time (epoch millis) of the first entry of [`MODULE_FILES`]
/// that exists, `0` if none do.
pub fn read_last_updated(module_dir: &Path) -> i64 {
    MODULE_FILES
        .iter()
        .map(|name| module_dir.join(name))
        .find(|path| path.exists())
        .and_then(|path| fs::metadata(path).ok())
        .and_then(|meta| meta.modified().ok())
        .map(|modified| DateTime::<Utc>::from(modified).timestamp_millis())
        .unwrap_or(0)
}

/// Apply marker edits in order. Creating an existing marker or deleting a
/// missing one is not an error.
pub fn apply_marker_ops(module_dir: &Path, ops: &[MarkerOp]) -> io::Result<()> {
    for op in ops {
        match *op {
            MarkerOp::Create(marker) => {
                File::create(module_dir.join(marker.file_name()))?;
            }
            MarkerOp::Delete(marker) => match fs::remove_file(module_dir.join(marker.file_name())) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            },
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::time::{Duration, SystemTime};

    fn touch(dir: &Path, name: &str) {
        File::create(dir.join(name)).unwrap();
    }

    fn set_mtime(path: &Path, at: SystemTime) {
        File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(at)
            .unwrap();
    }

    #[test]
    fn test_no_markers_is_enable() {
        let tmp = tempfile::TempDir::new().unwrap();
        assert_eq!(read_state(tmp.path()), ModuleState::Enable);
    }

    #[test]
    fn test_disable_only() {
        let tmp = tempfile::TempDir::new().unwrap();
        touch(tmp.path(), "disable");
        assert_eq!(read_state(tmp.path()), ModuleState::Disable);
    }

    #[test]
    fn test_update_loses_to_disable() {
        let tmp = tempfile::TempDir::new().unwrap();
        touch(tmp.path(), "update");
        assert_eq!(read_state(tmp.path()), ModuleState::Update);
        touch(tmp.path(), "disable");
        assert_eq!(read_state(tmp.path()), ModuleState::Disable);
    }

    #[test]
    fn test_last_updated_uses_list_order_not_newest() {
        let tmp = tempfile::TempDir::new().unwrap();
        let t_service = SystemTime::UNIX_EPOCH + Duration::from_secs(1_600_000_000);
        let t_prop = t_service + Duration::from_secs(3600);

        touch(tmp.path(), "service.sh");
        touch(tmp.path(), "module.prop");
        set_mtime(&tmp.path().join("service.sh"), t_service);
        set_mtime(&tmp.path().join("module.prop"), t_prop);

        assert_eq!(read_last_updated(tmp.path()), 1_600_000_000_000);
    }

    #[test]
    fn test_last_updated_without_known_files() {
        let tmp = tempfile::TempDir::new().unwrap();
        touch(tmp.path(), "customize.sh");
        assert_eq!(read_last_updated(tmp.path()), 0);
    }

    #[test]
    fn test_marker_ops_are_idempotent() {
        let tmp = tempfile::TempDir::new().unwrap();
        let ops = [MarkerOp::Delete(Marker::Remove), MarkerOp::Create(Marker::Disable)];
        apply_marker_ops(tmp.path(), &ops).unwrap();
        apply_marker_ops(tmp.path(), &ops).unwrap();
        let markers: Vec<_> = fs::read_dir(tmp.path())
            .unwrap()
            .flatten()
            .map(|e| e.file_name())
            .collect();
        assert_eq!(markers, vec![std::ffi::OsString::from("disable")]);
        assert_eq!(fs::metadata(tmp.path().join("disable")).unwrap().len(), 0);
    }

    proptest! {
        #[test]
        fn prop_remove_marker_always_wins(disable: bool, update: bool) {
            let tmp = tempfile::TempDir::new().unwrap();
            if disable {
                touch(tmp.path(), "disable");
            }
            if update {
                touch(tmp.path(), "update");
            }
            touch(tmp.path(), "remove");
            prop_assert_eq!(read_state(tmp.path()), ModuleState::Remove);
        }
    }
}
