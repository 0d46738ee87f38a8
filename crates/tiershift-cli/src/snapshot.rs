//! Fleet snapshot file
//!
//! The CLI drives an in-memory fleet loaded from a JSON file and writes it
//! back after mutating commands, so pending modifications survive between
//! invocations until `settle`.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tiershift_core::{InMemoryFleet, VolumeDescriptor};

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct FleetSnapshot {
    #[serde(default)]
    pub(crate) volumes: Vec<VolumeDescriptor>,
}

impl FleetSnapshot {
    pub(crate) async fn load(path: &Path) -> anyhow::Result<Self> {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading fleet snapshot {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("parsing fleet snapshot {}", path.display()))
    }

    /// Written to a sibling temp file, then renamed over `path`
    pub(crate) async fn save(&self, path: &Path) -> anyhow::Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, text)
            .await
            .with_context(|| format!("writing {}", tmp.display()))?;
        tokio::fs::rename(&tmp, path)
            .await
            .with_context(|| format!("replacing fleet snapshot {}", path.display()))?;
        Ok(())
    }

    pub(crate) fn into_fleet(self) -> InMemoryFleet {
        InMemoryFleet::with_volumes(self.volumes)
    }

    pub(crate) fn from_fleet(fleet: &InMemoryFleet) -> Self {
        Self {
            volumes: fleet.snapshot(),
        }
    }
}
