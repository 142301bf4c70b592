//! Sync configuration
//!
//! Options consumed by the sync engine. Configuration can be built in code
//! with the `with_*` methods or loaded from a versioned YAML file:
//!
//! ```yaml
//! version: 1
//! concurrency: 10
//! active_folder: Automation Test
//! obsolete_folder: Obsolete
//! custom_fields:
//!   Test Type: Automated
//!   Test Case Platform: [Android, iOS]
//! ```

use crate::error::{Result, SyncError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const DEFAULT_CONCURRENCY: usize = 30;
pub const DEFAULT_QUERY_PAGE_LIMIT: usize = 100;
pub const DEFAULT_ACTIVE_FOLDER: &str = "Automation Test";
pub const DEFAULT_OBSOLETE_FOLDER: &str = "Obsolete";

const SUPPORTED_VERSIONS: &[u32] = &[1];

/// Value of a configured custom field: one option or a set of options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CustomFieldValue {
    Single(String),
    Multi(Vec<String>),
}

impl From<&str> for CustomFieldValue {
    fn from(value: &str) -> Self {
        CustomFieldValue::Single(value.to_string())
    }
}

impl From<String> for CustomFieldValue {
    fn from(value: String) -> Self {
        CustomFieldValue::Single(value)
    }
}

impl From<Vec<String>> for CustomFieldValue {
    fn from(values: Vec<String>) -> Self {
        CustomFieldValue::Multi(values)
    }
}

impl From<Vec<&str>> for CustomFieldValue {
    fn from(values: Vec<&str>) -> Self {
        CustomFieldValue::Multi(values.into_iter().map(str::to_string).collect())
    }
}

/// How the differ treats two records sharing a matching key
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateKeyPolicy {
    /// Fail the run with `SyncError::DuplicateMatchingKey`
    #[default]
    Reject,
    /// Silently pair with the first candidate encountered
    FirstMatch,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Maximum work items in flight within one phase
    pub concurrency: usize,
    /// Page size hint for inventory queries
    pub query_page_limit: usize,
    pub active_folder: String,
    pub obsolete_folder: String,
    /// Applied to every created or reconciled record, and used as inventory filters
    pub custom_fields: BTreeMap<String, CustomFieldValue>,
    pub duplicate_key_policy: DuplicateKeyPolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            query_page_limit: DEFAULT_QUERY_PAGE_LIMIT,
            active_folder: DEFAULT_ACTIVE_FOLDER.to_string(),
            obsolete_folder: DEFAULT_OBSOLETE_FOLDER.to_string(),
            custom_fields: BTreeMap::new(),
            duplicate_key_policy: DuplicateKeyPolicy::default(),
        }
    }
}

impl SyncConfig {
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_query_page_limit(mut self, limit: usize) -> Self {
        self.query_page_limit = limit;
        self
    }

    pub fn with_active_folder(mut self, name: impl Into<String>) -> Self {
        self.active_folder = name.into();
        self
    }

    pub fn with_obsolete_folder(mut self, name: impl Into<String>) -> Self {
        self.obsolete_folder = name.into();
        self
    }

    pub fn with_custom_field(
        mut self,
        name: impl Into<String>,
        value: impl Into<CustomFieldValue>,
    ) -> Self {
        self.custom_fields.insert(name.into(), value.into());
        self
    }

    pub fn with_duplicate_key_policy(mut self, policy: DuplicateKeyPolicy) -> Self {
        self.duplicate_key_policy = policy;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(SyncError::config("concurrency must be at least 1"));
        }
        if self.query_page_limit == 0 {
            return Err(SyncError::config("query_page_limit must be at least 1"));
        }
        if self.active_folder.trim().is_empty() || self.obsolete_folder.trim().is_empty() {
            return Err(SyncError::config("folder names must not be empty"));
        }
        if self.active_folder == self.obsolete_folder {
            return Err(SyncError::config(format!(
                "active and obsolete folders must differ (both '{}')",
                self.active_folder
            )));
        }
        Ok(())
    }

    /// Load and validate a YAML configuration file
    pub fn from_yaml(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let file: ConfigFileV1 = serde_yaml::from_str(content)?;

        let version = file.version.ok_or_else(|| {
            SyncError::config(
                "Missing 'version' field in configuration file. Add 'version: 1' to the top of your YAML file.",
            )
        })?;
        if !SUPPORTED_VERSIONS.contains(&version) {
            return Err(SyncError::config(format!(
                "Unsupported configuration version {}. Supported versions: {:?}",
                version, SUPPORTED_VERSIONS
            )));
        }

        let mut config = Self::default();
        if let Some(concurrency) = file.concurrency {
            config.concurrency = concurrency;
        }
        if let Some(limit) = file.query_page_limit {
            config.query_page_limit = limit;
        }
        if let Some(folder) = file.active_folder {
            config.active_folder = folder;
        }
        if let Some(folder) = file.obsolete_folder {
            config.obsolete_folder = folder;
        }
        if let Some(fields) = file.custom_fields {
            config.custom_fields = fields;
        }
        if let Some(policy) = file.duplicate_key_policy {
            config.duplicate_key_policy = policy;
        }

        config.validate()?;
        Ok(config)
    }
}

/// YAML schema v1
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFileV1 {
    version: Option<u32>,
    concurrency: Option<usize>,
    query_page_limit: Option<usize>,
    active_folder: Option<String>,
    obsolete_folder: Option<String>,
    custom_fields: Option<BTreeMap<String, CustomFieldValue>>,
    duplicate_key_policy: Option<DuplicateKeyPolicy>,
}
