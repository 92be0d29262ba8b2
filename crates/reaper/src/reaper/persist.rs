//! State file persistence
//!
//! One `region,id,STAGE|since|until` line per registry entry. The file is
//! rewritten whole after every cycle and read once at startup.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::resource::Resource;
use crate::state::ReaperState;

/// States restored from a state file, keyed by `(region, id)`
#[derive(Debug, Clone, Default)]
pub struct SavedStates(HashMap<(String, String), ReaperState>);

impl SavedStates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, region: impl Into<String>, id: impl Into<String>, state: ReaperState) {
        self.0.insert((region.into(), id.into()), state);
    }

    pub fn get(&self, region: &str, id: &str) -> Option<ReaperState> {
        self.0.get(&(region.to_string(), id.to_string())).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Entries sorted by `(region, id)`
    pub fn sorted(&self) -> Vec<(&str, &str, ReaperState)> {
        let mut entries: Vec<_> = self
            .0
            .iter()
            .map(|((region, id), state)| (region.as_str(), id.as_str(), *state))
            .collect();
        entries.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));
        entries
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parse state file content, skipping malformed lines with a warning
    pub fn parse(content: &str) -> Self {
        let mut states = Self::new();
        for (number, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split(',').collect();
            let [region, id, state] = fields.as_slice() else {
                warn!(line = number + 1, content = line, "Skipping malformed saved state line");
                continue;
            };
            match state.parse::<ReaperState>() {
                Ok(state) => states.insert(*region, *id, state),
                Err(e) => {
                    warn!(line = number + 1, error = %e, "Skipping saved state line with bad state");
                }
            }
        }
        states
    }
}

/// Read a state file written by [`save_state_file`]
pub async fn load_state_file(path: &Path) -> Result<SavedStates> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read state file: {}", path.display()))?;
    let states = SavedStates::parse(&content);
    info!(path = %path.display(), count = states.len(), "States loaded");
    Ok(states)
}

/// Render registry entries as state file lines
pub fn render_state_lines(entries: &[Arc<Resource>]) -> String {
    entries
        .iter()
        .map(|r| format!("{},{},{}\n", r.region, r.id, r.reaper_state))
        .collect()
}

/// Overwrite `path` with one line per entry
pub async fn save_state_file(path: &Path, entries: &[Arc<Resource>]) -> Result<()> {
    tokio::fs::write(path, render_state_lines(entries))
        .await
        .with_context(|| format!("Failed to write state file: {}", path.display()))?;
    info!(path = %path.display(), count = entries.len(), "States saved");
    Ok(())
}
