//! Run configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::dialect::validate_identifier;
use crate::error::Result;

fn default_ledger_table() -> String {
    "schemaflow_changelog".to_string()
}

fn default_lock_name() -> String {
    "schemaflow_run".to_string()
}

fn default_transactional() -> bool {
    true
}

/// Configuration for one migration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Dialect name to use. When absent, the dialect is selected by
    /// probing the connection's product identity.
    #[serde(default)]
    pub dialect: Option<String>,

    /// Name of the ledger bookkeeping table inside the target database.
    #[serde(default = "default_ledger_table")]
    pub ledger_table: String,

    /// Name of the exclusive run lock.
    #[serde(default = "default_lock_name")]
    pub lock_name: String,

    /// Plan and translate without executing or recording anything.
    #[serde(default)]
    pub dry_run: bool,

    /// Wrap each change set in its own transaction. Only effective when
    /// the active dialect supports transactional DDL.
    #[serde(default = "default_transactional")]
    pub transactional: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            dialect: None,
            ledger_table: default_ledger_table(),
            lock_name: default_lock_name(),
            dry_run: false,
            transactional: true,
        }
    }
}

impl RunConfig {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: RunConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// The ledger table and lock name are interpolated into statements and
    /// lock keys, so both must be valid identifiers.
    pub fn validate(&self) -> Result<()> {
        validate_identifier(&self.ledger_table)?;
        validate_identifier(&self.lock_name)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RunConfig::default();
        assert_eq!(config.ledger_table, "schemaflow_changelog");
        assert_eq!(config.lock_name, "schemaflow_run");
        assert!(config.dialect.is_none());
        assert!(!config.dry_run);
        assert!(config.transactional);
    }

    #[test]
    fn test_from_yaml_with_overrides() {
        let config = RunConfig::from_yaml(
            "dialect: postgres\nledger_table: my_changelog\ndry_run: true\n",
        )
        .unwrap();
        assert_eq!(config.dialect.as_deref(), Some("postgres"));
        assert_eq!(config.ledger_table, "my_changelog");
        assert!(config.dry_run);
        assert_eq!(config.lock_name, "schemaflow_run");
    }

    #[test]
    fn test_empty_yaml_uses_defaults() {
        let config = RunConfig::from_yaml("{}").unwrap();
        assert_eq!(config.ledger_table, "schemaflow_changelog");
    }

    #[test]
    fn test_invalid_ledger_table_rejected() {
        let result = RunConfig::from_yaml("ledger_table: \"\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_load_from_file() {
        use std::io::Write;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "lock_name: custom_lock").unwrap();
        let config = RunConfig::load(file.path()).unwrap();
        assert_eq!(config.lock_name, "custom_lock");
    }
}
