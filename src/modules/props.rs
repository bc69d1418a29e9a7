//! `module.prop` parsing.
//!
//! Lines are `key=value`, split on the first `=`, both sides trimmed. A line
//! without `=` becomes an empty key with an empty value, which no lookup asks
//! for. Later occurrences of a key replace earlier ones.

use crate::models::{ModuleRecord, ModuleState, UNKNOWN, UNKNOWN_CODE};
use std::collections::HashMap;

pub const PROP_FILE: &str = "module.prop";

pub fn parse_line(line: &str) -> (String, String) {
    match line.split_once('=') {
        Some((key, value)) => (key.trim().to_string(), value.trim().to_string()),
        None => (String::new(), String::new()),
    }
}

pub fn parse_props(content: &str) -> HashMap<String, String> {
    content.lines().map(parse_line).collect()
}

/// Build a record from parsed properties, filling documented defaults.
pub fn record_from_props(
    props: &HashMap<String, String>,
    state: ModuleState,
    last_updated: i64,
) -> ModuleRecord {
    let text = |key: &str| props.get(key).cloned().unwrap_or_default();

    let id = props
        .get("id")
        .filter(|id| !id.is_empty())
        .cloned()
        .unwrap_or_else(|| UNKNOWN.to_string());

    let version_code = props
        .get("versionCode")
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(UNKNOWN_CODE);

    ModuleRecord {
        id,
        name: text("name"),
        version: text("version"),
        version_code,
        author: text("author"),
        description: text("description"),
        state,
        last_updated,
    }
}

/// Pull `id` out of raw `module.prop` text: the first line starting with
/// `id`, value after the first `=`.
pub fn extract_id(content: &str) -> Option<String> {
    content
        .lines()
        .map(str::trim_start)
        .filter(|line| line.starts_with("id"))
        .find_map(|line| line.split_once('='))
        .map(|(_, value)| value.trim().to_string())
        .filter(|id| !id.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_round_trip_with_defaults() {
        let props = parse_props("id=foo\nname=Bar\nversionCode=7\n");
        let record = record_from_props(&props, ModuleState::Enable, 0);
        assert_eq!(record.id, "foo");
        assert_eq!(record.name, "Bar");
        assert_eq!(record.version_code, 7);
        assert_eq!(record.version, "");
        assert_eq!(record.author, "");
        assert_eq!(record.description, "");
    }

    #[test]
    fn test_first_equals_is_the_delimiter() {
        assert_eq!(
            parse_line("  description = a=b c  "),
            ("description".to_string(), "a=b c".to_string())
        );
    }

    #[test]
    fn test_malformed_lines_are_discarded() {
        let props = parse_props("id=foo\njust some text\n\nversionCode=abc\n");
        let record = record_from_props(&props, ModuleState::Disable, 5);
        assert_eq!(record.id, "foo");
        assert_eq!(record.version_code, UNKNOWN_CODE);
        assert_eq!(record.state, ModuleState::Disable);
        assert_eq!(record.last_updated, 5);
    }

    #[test]
    fn test_missing_id_uses_sentinel() {
        let record = record_from_props(&parse_props("name=Nameless\n"), ModuleState::Enable, 0);
        assert_eq!(record.id, UNKNOWN);
        let record = record_from_props(&parse_props("id=\n"), ModuleState::Enable, 0);
        assert_eq!(record.id, UNKNOWN);
    }

    #[test]
    fn test_extract_id() {
        assert_eq!(extract_id("name=X\nid = shamiko \n"), Some("shamiko".to_string()));
        assert_eq!(extract_id("name=X\n"), None);
        assert_eq!(extract_id("id\nid=second\n"), Some("second".to_string()));
        assert_eq!(extract_id("id=\n"), None);
    }

    proptest! {
        #[test]
        fn prop_last_write_wins(first in "[a-z]{1,8}", second in "[a-z]{1,8}") {
            let content = format!("id=mod\nname={}\nauthor=x\nname={}\n", first, second);
            let props = parse_props(&content);
            prop_assert_eq!(props.get("name"), Some(&second));
        }

        #[test]
        fn prop_version_code_never_panics(raw in "\\PC*") {
            let content = format!("id=mod\nversionCode={}\n", raw);
            let record = record_from_props(&parse_props(&content), ModuleState::Enable, 0);
            match raw.trim().parse::<i64>() {
                Ok(v) => prop_assert_eq!(record.version_code, v),
                Err(_) => prop_assert_eq!(record.version_code, UNKNOWN_CODE),
            }
        }
    }
}
