//! Engine configuration

use crate::{ReportError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Options supplied once at process start
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ReportOptions {
    /// Root directory holding the templates
    pub template_root: PathBuf,

    /// Subdirectory of the root for Word templates
    pub word_subdirectory: String,

    /// Subdirectory of the root for Excel templates
    pub excel_subdirectory: String,

    /// Keep loaded template bytes in a shared read-only cache
    pub cache_templates: bool,

    /// Turn `\n` in Word field values into line breaks
    pub line_breaks: bool,

    /// Ask Excel to recalculate formulas when a rendered workbook is opened
    pub recalculate_on_load: bool,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            template_root: PathBuf::from("templates"),
            word_subdirectory: "word".to_string(),
            excel_subdirectory: "excel".to_string(),
            cache_templates: false,
            line_breaks: true,
            recalculate_on_load: true,
        }
    }
}

/// appsettings-style section names the options may be wrapped in
const WRAPPER_KEYS: &[&str] = &["reportOptions", "mustacheReportOptions", "MustacheReportOptions"];

impl ReportOptions {
    /// Options rooted at the given template directory
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            template_root: root.into(),
            ..Default::default()
        }
    }

    /// Parse options from JSON, either bare or wrapped in a section such as
    /// `reportOptions` or `MustacheReportOptions`
    pub fn from_json(json: &str) -> Result<Self> {
        let mut value: serde_json::Value =
            serde_json::from_str(json).map_err(|e| ReportError::Options(e.to_string()))?;

        let section = WRAPPER_KEYS
            .iter()
            .find_map(|key| value.as_object_mut().and_then(|map| map.remove(*key)));
        serde_json::from_value::<ReportOptions>(section.unwrap_or(value))
            .map_err(|e| ReportError::Options(e.to_string()))
    }

    /// Read options from a JSON file
    ///
    /// A relative `templateRoot` is resolved against the file's directory.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            ReportError::Options(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let mut options = Self::from_json(&json)?;
        if options.template_root.is_relative() {
            if let Some(dir) = path.parent() {
                options.template_root = dir.join(&options.template_root);
            }
        }
        Ok(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let options = ReportOptions::from_json("{}").unwrap();
        assert_eq!(options, ReportOptions::default());
        assert!(options.line_breaks);
        assert!(!options.cache_templates);
    }

    #[test]
    fn test_bare_options() {
        let options = ReportOptions::from_json(
            r#"{ "templateRoot": "/srv/templates", "cacheTemplates": true }"#,
        )
        .unwrap();
        assert_eq!(options.template_root, PathBuf::from("/srv/templates"));
        assert!(options.cache_templates);
        assert_eq!(options.excel_subdirectory, "excel");
    }

    #[test]
    fn test_wrapped_options() {
        let options = ReportOptions::from_json(
            r#"{ "reportOptions": { "templateRoot": "reports", "lineBreaks": false } }"#,
        )
        .unwrap();
        assert_eq!(options.template_root, PathBuf::from("reports"));
        assert!(!options.line_breaks);
    }

    #[test]
    fn test_mustache_section_name() {
        for key in ["MustacheReportOptions", "mustacheReportOptions"] {
            let json = format!(
                r#"{{ "Logging": {{}}, "{key}": {{ "templateRoot": "shared/reports", "cacheTemplates": true }} }}"#
            );
            let options = ReportOptions::from_json(&json).unwrap();
            assert_eq!(options.template_root, PathBuf::from("shared/reports"));
            assert!(options.cache_templates);
        }
    }

    #[test]
    fn test_invalid_options() {
        let err = ReportOptions::from_json(r#"{ "cacheTemplates": "yes" }"#).unwrap_err();
        assert!(matches!(err, ReportError::Options(_)));
    }

    #[test]
    fn test_from_file_resolves_relative_root() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("options.json");
        std::fs::write(&path, r#"{ "templateRoot": "templates" }"#).unwrap();

        let options = ReportOptions::from_file(&path).unwrap();
        assert_eq!(options.template_root, dir.path().join("templates"));
    }
}
