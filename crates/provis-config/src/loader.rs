//! Configuration loading with environment expansion.

use std::path::{Path, PathBuf};

use regex::Regex;

use crate::error::ConfigError;
use crate::schema::Config;

/// Loads and validates configuration files.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let content = std::fs::read_to_string(path)?;
        Self::load_str(&content)
    }

    /// Load configuration from a TOML string.
    pub fn load_str(content: &str) -> Result<Config, ConfigError> {
        let expanded = Self::expand_env_vars(content)?;
        let config: Config = toml::from_str(&expanded)?;
        Self::validate(&config)?;
        Ok(config)
    }

    /// Replace `${VAR}` references with environment variable values.
    fn expand_env_vars(content: &str) -> Result<String, ConfigError> {
        let re = Regex::new(r"\$\{([^}]+)\}")
            .map_err(|err| ConfigError::InvalidFormat(err.to_string()))?;

        let mut result = content.to_string();
        for caps in re.captures_iter(content) {
            let var_name = &caps[1];
            match std::env::var(var_name) {
                Ok(value) => {
                    result = result.replace(&caps[0], &value);
                }
                Err(_) => return Err(ConfigError::EnvVarNotSet(var_name.to_string())),
            }
        }
        Ok(result)
    }

    fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.portal.origin.is_empty() {
            return Err(ConfigError::MissingField("portal.origin".to_string()));
        }
        if config.portal.signin_url.is_empty() {
            return Err(ConfigError::MissingField("portal.signin_url".to_string()));
        }
        if config.portal.users_url.is_empty() {
            return Err(ConfigError::MissingField("portal.users_url".to_string()));
        }
        if config.chain.enabled && config.chain.signup_url.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "chain.signup_url".to_string(),
                message: "must be set when the chain is enabled".to_string(),
            });
        }
        // Row deletion indexes into the row set, which only works in XPath.
        let rows = &config.capacity.rows;
        if !(rows.starts_with("//") || rows.starts_with('(') || rows.starts_with("xpath:")) {
            return Err(ConfigError::InvalidValue {
                field: "capacity.rows".to_string(),
                message: "must be an XPath expression".to_string(),
            });
        }
        // The delete control is appended to the indexed row path, so it must
        // continue that XPath from the row node.
        if !config.capacity.delete_control.starts_with('/') {
            return Err(ConfigError::InvalidValue {
                field: "capacity.delete_control".to_string(),
                message: "must be an XPath fragment starting with '/'".to_string(),
            });
        }
        Ok(())
    }

    /// Expand a leading tilde to the user's home directory.
    pub fn expand_path(path: &str) -> PathBuf {
        PathBuf::from(shellexpand::tilde(path).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_missing_file() {
        let err = ConfigLoader::load(Path::new("/nonexistent/provis.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [browser]
            headless = true
            debug_port = 9444
            "#
        )
        .unwrap();

        let config = ConfigLoader::load(file.path()).unwrap();
        assert!(config.browser.headless);
        assert_eq!(config.browser.debug_port, 9444);
    }

    #[test]
    fn test_load_str_invalid_toml() {
        let err = ConfigLoader::load_str("this is [not toml").unwrap_err();
        assert!(matches!(err, ConfigError::TomlParse(_)));
    }

    #[test]
    fn test_env_expansion() {
        unsafe {
            std::env::set_var("PROVIS_TEST_PORTAL", "https://portal.test.example");
        }
        let config = ConfigLoader::load_str(
            r#"
            [portal]
            origin = "${PROVIS_TEST_PORTAL}"
            "#,
        )
        .unwrap();
        assert_eq!(config.portal.origin, "https://portal.test.example");
        unsafe {
            std::env::remove_var("PROVIS_TEST_PORTAL");
        }
    }

    #[test]
    fn test_env_expansion_missing_var() {
        let err = ConfigLoader::load_str(
            r#"
            [credentials]
            email = "a@b.c"
            password = "${PROVIS_TEST_SURELY_UNSET}"
            "#,
        )
        .unwrap_err();
        match err {
            ConfigError::EnvVarNotSet(name) => assert_eq!(name, "PROVIS_TEST_SURELY_UNSET"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_validate_rejects_empty_portal_urls() {
        let err = ConfigLoader::load_str(
            r#"
            [portal]
            origin = ""
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::MissingField(_)));
    }

    #[test]
    fn test_validate_rejects_css_rows() {
        let err = ConfigLoader::load_str(
            r#"
            [capacity]
            rows = "tr.user-row"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_validate_rejects_relative_delete_control() {
        let err = ConfigLoader::load_str(
            r#"
            [capacity]
            delete_control = ".//button[contains(@class, 'trash')]"
            "#,
        )
        .unwrap_err();
        match err {
            ConfigError::InvalidValue { field, .. } => {
                assert_eq!(field, "capacity.delete_control");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_validate_rejects_enabled_chain_without_url() {
        let err = ConfigLoader::load_str(
            r#"
            [chain]
            enabled = true
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_expand_path_tilde() {
        let expanded = ConfigLoader::expand_path("~/.provis/session.json");
        assert!(!expanded.to_string_lossy().starts_with('~'));
        assert!(expanded.to_string_lossy().ends_with(".provis/session.json"));
    }

    #[test]
    fn test_expand_path_absolute_untouched() {
        let expanded = ConfigLoader::expand_path("/var/lib/provis/session.json");
        assert_eq!(expanded, PathBuf::from("/var/lib/provis/session.json"));
    }
}
