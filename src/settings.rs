use miette::{IntoDiagnostic, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    pub policy: PolicySettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicySettings {
    /// Load `policy_file` at start-up. When false the store starts empty and
    /// denies everything until a policy is pushed.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// KDL or JSON policy document. Default: pathz_policy.kdl
    pub policy_file: PathBuf,
    /// JSON file recording the installed policy version
    pub metadata_file: Option<PathBuf>,
}

fn default_enabled() -> bool {
    true
}

impl Default for PolicySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            policy_file: PathBuf::from("pathz_policy.kdl"),
            metadata_file: None,
        }
    }
}

impl Settings {
    pub fn load(path: &str) -> Result<Self> {
        let mut builder = config::Config::builder()
            .set_default("policy.enabled", PolicySettings::default().enabled)
            .into_diagnostic()?
            .set_default(
                "policy.policy_file",
                PolicySettings::default()
                    .policy_file
                    .to_string_lossy()
                    .to_string(),
            )
            .into_diagnostic()?;

        // Optional file
        if Path::new(path).exists() {
            builder = builder.add_source(config::File::with_name(path));
        }

        // Environment overrides: PATHZ__POLICY__POLICY_FILE=/etc/pathz.kdl, etc.
        builder = builder.add_source(config::Environment::with_prefix("PATHZ").separator("__"));

        let cfg = builder.build().into_diagnostic()?;
        let mut s: Settings = cfg.try_deserialize().into_diagnostic()?;

        let cwd = std::env::current_dir().into_diagnostic()?;
        if s.policy.policy_file.is_relative() {
            s.policy.policy_file = cwd.join(&s.policy.policy_file);
        }
        if let Some(meta) = s.policy.metadata_file.as_mut() {
            if meta.is_relative() {
                *meta = cwd.join(&*meta);
            }
        }

        Ok(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    #[serial]
    fn test_settings_load_defaults() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("nonexistent.toml");

        let settings = Settings::load(config_path.to_str().unwrap())
            .expect("Failed to load settings");

        assert!(settings.policy.enabled);
        assert!(settings.policy.policy_file.ends_with("pathz_policy.kdl"));
        assert!(settings.policy.metadata_file.is_none());
    }

    #[test]
    #[serial]
    fn test_settings_load_from_file() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("test_config.toml");

        let config_content = r#"
[policy]
enabled = false
policy_file = "/etc/pathz/policy.json"
metadata_file = "/etc/pathz/meta.json"
"#;
        fs::write(&config_path, config_content).expect("Failed to write config");

        let settings = Settings::load(config_path.to_str().unwrap())
            .expect("Failed to load settings");

        assert!(!settings.policy.enabled);
        assert_eq!(
            settings.policy.policy_file,
            PathBuf::from("/etc/pathz/policy.json")
        );
        assert_eq!(
            settings.policy.metadata_file,
            Some(PathBuf::from("/etc/pathz/meta.json"))
        );
    }

    #[test]
    #[serial]
    fn test_settings_env_override() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("test_config.toml");

        let config_content = r#"
[policy]
policy_file = "/etc/pathz/policy.kdl"
"#;
        fs::write(&config_path, config_content).expect("Failed to write config");

        env::set_var("PATHZ__POLICY__POLICY_FILE", "/srv/pathz/override.kdl");

        let settings = Settings::load(config_path.to_str().unwrap())
            .expect("Failed to load settings");

        assert_eq!(
            settings.policy.policy_file,
            PathBuf::from("/srv/pathz/override.kdl")
        );

        env::remove_var("PATHZ__POLICY__POLICY_FILE");
    }

    #[test]
    #[serial]
    fn test_settings_path_normalization() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("test_config.toml");

        let config_content = r#"
[policy]
policy_file = "relative/policy.kdl"
metadata_file = "relative/meta.json"
"#;
        fs::write(&config_path, config_content).expect("Failed to write config");

        let settings = Settings::load(config_path.to_str().unwrap())
            .expect("Failed to load settings");

        assert!(settings.policy.policy_file.is_absolute());
        assert!(settings.policy.policy_file.ends_with("relative/policy.kdl"));
        let meta = settings.policy.metadata_file.unwrap();
        assert!(meta.is_absolute());
        assert!(meta.ends_with("relative/meta.json"));
    }
}
