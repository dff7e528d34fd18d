//! Persisted exit plans
//! Lets the break-even monitor keep working across restarts

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use crate::trading::exit_plan::ExitPlan;

/// Exit plans and the last handled signal, per symbol
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct PlanStore {
    #[serde(default)]
    plans: HashMap<String, ExitPlan>,
    /// `generated_at` of the last signal acted on
    #[serde(default)]
    processed_signals: HashMap<String, DateTime<Utc>>,
    #[serde(skip)]
    path: Option<PathBuf>,
}

impl PlanStore {
    /// In-memory store, never written to disk
    pub fn new() -> Self {
        Self::default()
    }

    /// Default location under the user data directory
    pub fn default_path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("futures-ladder")
            .join("exit_plans.json")
    }

    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut store: PlanStore = serde_json::from_str(&content)?;
        store.path = Some(path.to_path_buf());
        Ok(store)
    }

    /// Load plans or start empty; later saves go to `path`. An unreadable
    /// file is moved aside so the next save doesn't destroy it.
    pub fn load_or_new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        if path.exists() {
            match Self::load_from_file(&path) {
                Ok(store) => {
                    info!("📂 Loaded {} exit plans from {}", store.plans.len(), path.display());
                    return store;
                }
                Err(e) => {
                    warn!("⚠️ Failed to read exit plans from {}: {}", path.display(), e);
                    Self::quarantine(&path);
                }
            }
        }

        info!("Creating new plan store at {}", path.display());
        Self {
            path: Some(path),
            ..Self::default()
        }
    }

    /// Rename a bad state file to `<name>.corrupt-<unix secs>`
    fn quarantine(path: &Path) {
        let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            return;
        };
        let aside = path.with_file_name(format!("{}.corrupt-{}", name, Utc::now().timestamp()));
        match std::fs::rename(path, &aside) {
            Ok(()) => warn!("📦 Moved unreadable exit plans to {}", aside.display()),
            Err(e) => error!("❌ Failed to move {} aside: {}", path.display(), e),
        }
    }

    /// Save with owner-only permissions
    pub fn save_to_file(&self) -> anyhow::Result<()> {
        let Some(filepath) = self.path.as_ref() else {
            return Ok(());
        };

        if let Some(parent) = filepath.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(filepath, content)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut permissions = std::fs::metadata(filepath)?.permissions();
            permissions.set_mode(0o600);
            std::fs::set_permissions(filepath, permissions)?;
        }

        Ok(())
    }

    /// Save, logging instead of failing
    pub fn persist(&self) {
        if let Err(e) = self.save_to_file() {
            error!("❌ Failed to save exit plans: {}", e);
        }
    }

    pub fn get(&self, symbol: &str) -> Option<&ExitPlan> {
        self.plans.get(symbol)
    }

    pub fn get_mut(&mut self, symbol: &str) -> Option<&mut ExitPlan> {
        self.plans.get_mut(symbol)
    }

    pub fn insert(&mut self, plan: ExitPlan) {
        self.plans.insert(plan.symbol.clone(), plan);
    }

    pub fn remove(&mut self, symbol: &str) -> Option<ExitPlan> {
        self.plans.remove(symbol)
    }

    pub fn len(&self) -> usize {
        self.plans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }

    pub fn last_signal(&self, symbol: &str) -> Option<DateTime<Utc>> {
        self.processed_signals.get(symbol).copied()
    }

    pub fn mark_signal(&mut self, symbol: &str, generated_at: DateTime<Utc>) {
        self.processed_signals.insert(symbol.to_string(), generated_at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trading::exit_plan::ExitLadderConfig;
    use crate::trading::position::PositionSide;
    use crate::trading::rules::ExchangeRules;
    use pretty_assertions::assert_eq;

    fn plan(symbol: &str) -> ExitPlan {
        ExitPlan::build(
            symbol,
            PositionSide::Long,
            100.0,
            9.0,
            &ExitLadderConfig::default(),
            &ExchangeRules::default(),
        )
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("plans.json");

        let mut store = PlanStore::load_or_new(&path);
        assert!(store.is_empty());
        store.insert(plan("BTCUSDT"));
        let at = Utc::now();
        store.mark_signal("BTCUSDT", at);
        store.save_to_file().unwrap();

        let reloaded = PlanStore::load_or_new(&path);
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded.get("BTCUSDT"), store.get("BTCUSDT"));
        assert_eq!(reloaded.last_signal("BTCUSDT"), Some(at));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn test_in_memory_store_skips_disk() {
        let mut store = PlanStore::new();
        store.insert(plan("ETHUSDT"));
        store.save_to_file().unwrap();
        assert!(store.remove("ETHUSDT").is_some());
        assert!(store.get("ETHUSDT").is_none());
    }

    #[test]
    fn test_corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plans.json");
        std::fs::write(&path, "not json").unwrap();

        let store = PlanStore::load_or_new(&path);
        assert!(store.is_empty());
        assert!(!path.exists());

        let aside: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with("plans.json.corrupt-"))
            .collect();
        assert_eq!(aside.len(), 1);
        assert_eq!(
            std::fs::read_to_string(dir.path().join(&aside[0])).unwrap(),
            "not json"
        );

        store.persist();
        assert!(path.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
    }
}
