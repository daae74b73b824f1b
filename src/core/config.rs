//! Workspace configuration.
//!
//! Loaded from `.dthread/config.toml` (or an explicit `--config` path), then
//! overridden from the environment. Missing config is not an error.

use crate::core::error::ThreadError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const WORKSPACE_DIR: &str = ".dthread";
pub const CONFIG_FILE: &str = "config.toml";

pub const ENV_DB: &str = "DTHREAD_DB";
pub const ENV_ACTOR: &str = "DTHREAD_ACTOR";
pub const ENV_AUDIT_LOG: &str = "DTHREAD_AUDIT_LOG";

/// How the duplicated `AC` entry of the keyword table is resolved.
#[derive(clap::ValueEnum, Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum KeywordPolicy {
    /// Both `AC` keyword lists apply.
    #[default]
    Merge,
    /// Later definitions replace earlier ones for the same family.
    LastWins,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreadConfig {
    pub db_path: PathBuf,
    pub audit_log: PathBuf,
    pub actor: String,
    pub default_max_depth: u32,
    pub keyword_policy: KeywordPolicy,
    pub banner: String,
}

impl Default for ThreadConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(WORKSPACE_DIR).join("thread.db"),
            audit_log: PathBuf::from(WORKSPACE_DIR).join("audit.events.jsonl"),
            actor: "dthread".to_string(),
            default_max_depth: 10,
            keyword_policy: KeywordPolicy::Merge,
            banner: "CUI // SP-CTI".to_string(),
        }
    }
}

impl ThreadConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ThreadError> {
        toml::from_str(content).map_err(|e| ThreadError::Config(e.to_string()))
    }

    /// Resolve config for a workspace rooted at `root`.
    ///
    /// `explicit` wins over `<root>/.dthread/config.toml`; relative paths in the
    /// result are anchored at `root`.
    pub fn load(root: &Path, explicit: Option<&Path>) -> Result<Self, ThreadError> {
        let candidate = match explicit {
            Some(p) => {
                if !p.exists() {
                    return Err(ThreadError::Config(format!(
                        "config file '{}' does not exist",
                        p.display()
                    )));
                }
                Some(p.to_path_buf())
            }
            None => {
                let p = root.join(WORKSPACE_DIR).join(CONFIG_FILE);
                p.exists().then_some(p)
            }
        };

        let mut config = match candidate {
            Some(path) => {
                let content = fs::read_to_string(&path)?;
                Self::from_toml_str(&content)?
            }
            None => Self::default(),
        };

        config.apply_env(|key| std::env::var(key).ok());
        config.anchor(root);
        Ok(config)
    }

    /// Apply `DTHREAD_*` overrides using `lookup` as the environment.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(db) = lookup(ENV_DB).filter(|v| !v.is_empty()) {
            self.db_path = PathBuf::from(db);
        }
        if let Some(actor) = lookup(ENV_ACTOR).filter(|v| !v.is_empty()) {
            self.actor = actor;
        }
        if let Some(log) = lookup(ENV_AUDIT_LOG).filter(|v| !v.is_empty()) {
            self.audit_log = PathBuf::from(log);
        }
    }

    fn anchor(&mut self, root: &Path) {
        if self.db_path.is_relative() {
            self.db_path = root.join(&self.db_path);
        }
        if self.audit_log.is_relative() {
            self.audit_log = root.join(&self.audit_log);
        }
    }
}

/// Walk up from `start` looking for a `.dthread/` directory; fall back to `start`.
pub fn find_workspace_root(start: &Path) -> PathBuf {
    let mut current = start;
    loop {
        if current.join(WORKSPACE_DIR).is_dir() {
            return current.to_path_buf();
        }
        match current.parent() {
            Some(parent) => current = parent,
            None => return start.to_path_buf(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let cfg = ThreadConfig::from_toml_str(
            r#"
            actor = "ci-bot"
            keyword_policy = "last_wins"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.actor, "ci-bot");
        assert_eq!(cfg.keyword_policy, KeywordPolicy::LastWins);
        assert_eq!(cfg.default_max_depth, 10);
        assert_eq!(cfg.banner, "CUI // SP-CTI");
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = ThreadConfig::from_toml_str("default_max_depth = \"deep\"").unwrap_err();
        assert!(matches!(err, ThreadError::Config(_)));
    }

    #[test]
    fn test_env_overrides() {
        let mut cfg = ThreadConfig::default();
        cfg.apply_env(|key| match key {
            ENV_DB => Some("/tmp/other.db".to_string()),
            ENV_ACTOR => Some(String::new()),
            _ => None,
        });
        assert_eq!(cfg.db_path, PathBuf::from("/tmp/other.db"));
        assert_eq!(cfg.actor, "dthread");
    }

    #[test]
    fn test_load_anchors_relative_paths() {
        let tmp = tempdir().unwrap();
        let dir = tmp.path().join(WORKSPACE_DIR);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(CONFIG_FILE), "db_path = \"data/links.db\"\n").unwrap();

        let cfg = ThreadConfig::load(tmp.path(), None).unwrap();
        if std::env::var(ENV_DB).is_err() {
            assert_eq!(cfg.db_path, tmp.path().join("data/links.db"));
        }
        assert!(cfg.audit_log.starts_with(tmp.path()) || std::env::var(ENV_AUDIT_LOG).is_ok());
    }

    #[test]
    fn test_find_workspace_root_walks_up() {
        let tmp = tempdir().unwrap();
        fs::create_dir_all(tmp.path().join(WORKSPACE_DIR)).unwrap();
        let nested = tmp.path().join("a").join("b");
        fs::create_dir_all(&nested).unwrap();
        assert_eq!(find_workspace_root(&nested), tmp.path().to_path_buf());
    }
}
