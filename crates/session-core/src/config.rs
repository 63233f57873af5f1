use crate::error::Result;
use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// SyncConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Upper bound on concurrent manifest reads during onboarding.
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Enqueue a sync job after phase, checkpoint and status changes.
    #[serde(default = "default_true")]
    pub trigger_on_key_transitions: bool,
}

fn default_max_parallel() -> usize {
    8
}

fn default_queue_capacity() -> usize {
    256
}

fn default_true() -> bool {
    true
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_parallel: default_max_parallel(),
            queue_capacity: default_queue_capacity(),
            trigger_on_key_transitions: default_true(),
        }
    }
}

// ---------------------------------------------------------------------------
// VerificationPolicy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationPolicy {
    #[serde(default)]
    pub require_plan: bool,
    #[serde(default = "default_true")]
    pub require_tasks_complete: bool,
}

impl Default for VerificationPolicy {
    fn default() -> Self {
        Self {
            require_plan: false,
            require_tasks_complete: true,
        }
    }
}

// ---------------------------------------------------------------------------
// IndexConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Relative paths resolve against the project root.
    #[serde(default = "default_index_path")]
    pub path: String,
}

fn default_index_path() -> String {
    paths::DEFAULT_INDEX_DB.to_string()
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            path: default_index_path(),
        }
    }
}

impl IndexConfig {
    pub fn resolve(&self, root: &Path) -> PathBuf {
        let p = Path::new(&self.path);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            root.join(p)
        }
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub project: ProjectConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub verification: VerificationPolicy,
    #[serde(default)]
    pub index: IndexConfig,
}

fn default_version() -> u32 {
    1
}

impl Default for Config {
    fn default() -> Self {
        Self::new("")
    }
}

impl Config {
    pub fn new(project_name: impl Into<String>) -> Self {
        Self {
            version: default_version(),
            project: ProjectConfig {
                name: project_name.into(),
            },
            sync: SyncConfig::default(),
            verification: VerificationPolicy::default(),
            index: IndexConfig::default(),
        }
    }

    /// Load `agents/config.yaml`, falling back to defaults when absent.
    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(&path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    pub fn index_path(&self, root: &Path) -> PathBuf {
        self.index.resolve(root)
    }

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if self.version != default_version() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!("unknown config version {}", self.version),
            });
        }

        if self.sync.max_parallel == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "sync.max_parallel must be at least 1".to_string(),
            });
        } else if self.sync.max_parallel > 64 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "sync.max_parallel={} (>64 is unusual for file reads)",
                    self.sync.max_parallel
                ),
            });
        }

        if self.sync.queue_capacity == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "sync.queue_capacity must be at least 1".to_string(),
            });
        }

        if self.index.path.trim().is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "index.path is empty".to_string(),
            });
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let cfg = Config::load(dir.path()).unwrap();
        assert_eq!(cfg.sync.max_parallel, 8);
        assert!(cfg.sync.trigger_on_key_transitions);
        assert!(!cfg.verification.require_plan);
        assert!(cfg.verification.require_tasks_complete);
        assert_eq!(cfg.index.path, "agents/index.db");
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let mut cfg = Config::new("demo");
        cfg.sync.max_parallel = 2;
        cfg.verification.require_plan = true;
        cfg.save(dir.path()).unwrap();

        let loaded = Config::load(dir.path()).unwrap();
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let yaml = "project:\n  name: demo\nverification:\n  require_plan: true\n";
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.version, 1);
        assert!(cfg.verification.require_plan);
        assert!(cfg.verification.require_tasks_complete);
        assert_eq!(cfg.sync.queue_capacity, 256);
    }

    #[test]
    fn index_path_resolution() {
        let root = Path::new("/proj");
        let mut cfg = Config::default();
        assert_eq!(cfg.index_path(root), PathBuf::from("/proj/agents/index.db"));
        cfg.index.path = "/var/lib/sessions.db".to_string();
        assert_eq!(cfg.index_path(root), PathBuf::from("/var/lib/sessions.db"));
    }

    #[test]
    fn validate_default_has_no_warnings() {
        assert!(Config::default().validate().is_empty());
    }

    #[test]
    fn validate_zero_parallelism_is_error() {
        let mut cfg = Config::default();
        cfg.sync.max_parallel = 0;
        let warnings = cfg.validate();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].level, WarnLevel::Error);
    }

    #[test]
    fn validate_high_parallelism_is_warning() {
        let mut cfg = Config::default();
        cfg.sync.max_parallel = 100;
        let warnings = cfg.validate();
        assert_eq!(warnings[0].level, WarnLevel::Warning);
        assert!(warnings[0].message.contains("max_parallel"));
    }
}
