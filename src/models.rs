//! Core data types for rootmod.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// Sentinel used for string fields that could not be resolved.
pub const UNKNOWN: &str = "unknown";

/// Sentinel used for integer fields that could not be resolved.
pub const UNKNOWN_CODE: i64 = -1;

/// Lifecycle state of an installed module, derived from marker files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ModuleState {
    #[default]
    Enable,
    Disable,
    Update,
    Remove,
}

impl fmt::Display for ModuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleState::Enable => write!(f, "ENABLE"),
            ModuleState::Disable => write!(f, "DISABLE"),
            ModuleState::Update => write!(f, "UPDATE"),
            ModuleState::Remove => write!(f, "REMOVE"),
        }
    }
}

impl FromStr for ModuleState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "enable" => Ok(ModuleState::Enable),
            "disable" => Ok(ModuleState::Disable),
            "update" => Ok(ModuleState::Update),
            "remove" => Ok(ModuleState::Remove),
            _ => Err(format!("Unknown module state: {}", s)),
        }
    }
}

/// Anything that can be correlated with an installed module by id alone,
/// e.g. an entry of an online catalog.
pub trait ModuleIdentity {
    fn module_id(&self) -> &str;
}

/// A discovered module. Built fresh on every query, never cached.
///
/// Equality and hashing consider `id` only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleRecord {
    pub id: String,
    pub name: String,
    pub version: String,
    pub version_code: i64,
    pub author: String,
    pub description: String,
    pub state: ModuleState,
    /// Epoch millis of the first well-known module file found, `0` if none.
    pub last_updated: i64,
}

impl ModuleRecord {
    /// True when `other` refers to the same module.
    pub fn matches(&self, other: &impl ModuleIdentity) -> bool {
        self.id == other.module_id()
    }

    pub fn display_name(&self) -> String {
        if self.name.is_empty() {
            self.id.clone()
        } else {
            format!("{} ({})", self.name, self.version)
        }
    }
}

impl ModuleIdentity for ModuleRecord {
    fn module_id(&self) -> &str {
        &self.id
    }
}

impl PartialEq for ModuleRecord {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ModuleRecord {}

impl Hash for ModuleRecord {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Outcome of enable / disable / remove.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "lowercase")]
pub enum OperationResult {
    Success { id: String },
    Failure { id: String, message: Option<String> },
}

impl OperationResult {
    pub fn success(id: impl Into<String>) -> Self {
        OperationResult::Success { id: id.into() }
    }

    pub fn failure(id: impl Into<String>, message: Option<String>) -> Self {
        OperationResult::Failure {
            id: id.into(),
            message,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            OperationResult::Success { id } | OperationResult::Failure { id, .. } => id,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, OperationResult::Success { .. })
    }
}

/// Terminal result of an install job. Failure carries no payload: the
/// streamed output already holds the detail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "lowercase")]
pub enum InstallOutcome {
    Success { id: String },
    Failure,
}

/// One line of output from a streamed shell job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputLine {
    Stdout(String),
    Stderr(String),
}

impl OutputLine {
    pub fn text(&self) -> &str {
        match self {
            OutputLine::Stdout(line) | OutputLine::Stderr(line) => line,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn record(id: &str, name: &str) -> ModuleRecord {
        ModuleRecord {
            id: id.to_string(),
            name: name.to_string(),
            version: "v1".to_string(),
            version_code: 1,
            author: String::new(),
            description: String::new(),
            state: ModuleState::Enable,
            last_updated: 0,
        }
    }

    struct CatalogEntry {
        id: String,
    }

    impl ModuleIdentity for CatalogEntry {
        fn module_id(&self) -> &str {
            &self.id
        }
    }

    #[test]
    fn test_equality_by_id_only() {
        let a = record("foo", "Foo");
        let mut b = record("foo", "Other");
        b.state = ModuleState::Remove;
        assert_eq!(a, b);
        assert_ne!(a, record("bar", "Foo"));

        let set: HashSet<ModuleRecord> = [a, b].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_matches_catalog_entry() {
        let entry = CatalogEntry { id: "foo".to_string() };
        assert!(record("foo", "Foo").matches(&entry));
        assert!(!record("bar", "Foo").matches(&entry));
    }

    #[test]
    fn test_display_name_falls_back_to_id() {
        assert_eq!(record("foo", "Foo").display_name(), "Foo (v1)");
        assert_eq!(record("foo", "").display_name(), "foo");
        assert_eq!(ModuleState::default(), ModuleState::Enable);
    }

    #[test]
    fn test_state_round_trip_through_str() {
        for state in [
            ModuleState::Enable,
            ModuleState::Disable,
            ModuleState::Update,
            ModuleState::Remove,
        ] {
            assert_eq!(state.to_string().parse::<ModuleState>(), Ok(state));
        }
        assert!("bogus".parse::<ModuleState>().is_err());
    }

    #[test]
    fn test_record_serializes_camel_case() {
        let json = serde_json::to_value(record("foo", "Foo")).unwrap();
        assert_eq!(json["versionCode"], 1);
        assert_eq!(json["state"], "ENABLE");
        assert_eq!(json["lastUpdated"], 0);
    }

    #[test]
    fn test_operation_result_accessors() {
        let ok = OperationResult::success("x");
        let err = OperationResult::failure("y", Some("boom".to_string()));
        assert!(ok.is_success());
        assert!(!err.is_success());
        assert_eq!(ok.id(), "x");
        assert_eq!(err.id(), "y");
    }
}
