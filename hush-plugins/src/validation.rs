//! Plugin metadata validation, run before a plugin is loaded.

use crate::PluginMetadata;

/// Result of metadata validation.
#[derive(Debug)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

/// Validates plugin metadata.
#[derive(Debug, Default)]
pub struct PluginValidator;

impl PluginValidator {
    pub fn new() -> Self {
        Self
    }

    /// Validate plugin metadata.
    pub fn validate(&self, metadata: &PluginMetadata) -> ValidationResult {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if metadata.name.is_empty() {
            errors.push("Plugin name cannot be empty".into());
        }

        // The name prefixes scheduled event names as `<name>:<event>`.
        if metadata.name.contains(':') || metadata.name.chars().any(char::is_whitespace) {
            errors.push(format!(
                "Plugin name '{}' may not contain ':' or whitespace",
                metadata.name
            ));
        }

        if metadata.version.is_empty() {
            errors.push("Plugin version cannot be empty".into());
        }

        if metadata.description.trim().is_empty() {
            warnings.push("Plugin has no description".into());
        }

        let is_valid = errors.is_empty();
        ValidationResult {
            is_valid,
            warnings,
            errors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_metadata(name: &str) -> PluginMetadata {
        PluginMetadata {
            name: name.into(),
            version: "1.0.0".into(),
            description: "Test".into(),
            author: None,
        }
    }

    #[test]
    fn test_validate_clean_plugin() {
        let result = PluginValidator::new().validate(&make_metadata("quiet_hours"));
        assert!(result.is_valid);
        assert!(result.errors.is_empty());
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_validate_missing_version() {
        let mut meta = make_metadata("quiet_hours");
        meta.version = String::new();
        let result = PluginValidator::new().validate(&meta);
        assert!(!result.is_valid);
        assert_eq!(result.errors, vec!["Plugin version cannot be empty".to_string()]);
    }

    #[test]
    fn test_validate_empty_name() {
        assert!(!PluginValidator::new().validate(&make_metadata("")).is_valid);
    }

    #[test]
    fn test_validate_namespace_separator() {
        let validator = PluginValidator::new();
        assert!(!validator.validate(&make_metadata("quiet:hours")).is_valid);
        assert!(!validator.validate(&make_metadata("quiet hours")).is_valid);
    }

    #[test]
    fn test_validate_missing_description_warns() {
        let mut meta = make_metadata("terse");
        meta.description = String::new();
        let result = PluginValidator::new().validate(&meta);
        assert!(result.is_valid);
        assert_eq!(result.warnings.len(), 1);
    }
}
