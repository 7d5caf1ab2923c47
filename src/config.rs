// src/config.rs
use crate::error::XformError;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

/// Run settings read from a JSON file.
///
/// ```json
/// {
///   "forward_compatible": false,
///   "max_depth": 100000,
///   "initial_mode": "summary",
///   "params": { "title": "Report", "{urn:x}lang": "en" }
/// }
/// ```
///
/// Parameter and mode names are either plain local names or Clark notation
/// (`{namespace}local`). Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransformConfig {
    pub forward_compatible: Option<bool>,
    pub max_depth: Option<usize>,
    pub initial_mode: Option<String>,
    pub params: BTreeMap<String, String>,
}

impl TransformConfig {
    pub fn from_json(text: &str) -> Result<Self, XformError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, XformError> {
        let path_ref = path.as_ref();
        let text = fs::read_to_string(path_ref).map_err(|e| {
            XformError::Io(io::Error::new(
                e.kind(),
                format!("Failed to read config from '{}': {}", path_ref.display(), e),
            ))
        })?;
        Self::from_json(&text)
    }

    /// Applies `other` on top of this configuration: its set fields win and
    /// its parameters are added.
    pub fn merge(&mut self, other: TransformConfig) {
        if other.forward_compatible.is_some() {
            self.forward_compatible = other.forward_compatible;
        }
        if other.max_depth.is_some() {
            self.max_depth = other.max_depth;
        }
        if other.initial_mode.is_some() {
            self.initial_mode = other.initial_mode;
        }
        self.params.extend(other.params);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_object_is_default() {
        assert_eq!(TransformConfig::from_json("{}").unwrap(), TransformConfig::default());
    }

    #[test]
    fn test_full_config() {
        let config = TransformConfig::from_json(
            r#"{"forward_compatible": true, "max_depth": 64, "initial_mode": "m", "params": {"a": "1"}}"#,
        )
        .unwrap();
        assert_eq!(config.forward_compatible, Some(true));
        assert_eq!(config.max_depth, Some(64));
        assert_eq!(config.initial_mode.as_deref(), Some("m"));
        assert_eq!(config.params.get("a").map(String::as_str), Some("1"));
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        assert!(matches!(
            TransformConfig::from_json(r#"{"depth": 3}"#),
            Err(XformError::Config(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"params": {{"x": "y"}}}}"#).unwrap();
        let config = TransformConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.params.len(), 1);
        assert!(matches!(
            TransformConfig::from_json_file("/nonexistent/xform.json"),
            Err(XformError::Io(_))
        ));
    }

    #[test]
    fn test_merge_prefers_later_values() {
        let mut base = TransformConfig::from_json(r#"{"max_depth": 10, "params": {"a": "1", "b": "2"}}"#).unwrap();
        base.merge(TransformConfig::from_json(r#"{"initial_mode": "m", "params": {"b": "3"}}"#).unwrap());
        assert_eq!(base.max_depth, Some(10));
        assert_eq!(base.initial_mode.as_deref(), Some("m"));
        assert_eq!(base.params.get("b").map(String::as_str), Some("3"));
        assert_eq!(base.params.len(), 2);
    }
}
