use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::compactor;
use crate::engine::Engine;
use crate::limits::*;
use crate::notify::NotifyHub;

/// One engine per team, opened on first use. The team is the database name
/// a client connects to; its WAL lives at `<data_dir>/<team>.wal`.
pub struct TeamRegistry {
    engines: DashMap<String, Arc<Engine>>,
    data_dir: PathBuf,
    compact_threshold: u64,
}

/// Team names double as WAL file names, so only ASCII alphanumerics,
/// `_` and `-` are accepted. Anything else is rejected, never rewritten,
/// so two distinct names cannot share a log.
fn validate_team_name(team: &str) -> io::Result<()> {
    if team.is_empty() {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "empty team name"));
    }
    if team.len() > MAX_TEAM_NAME_LEN {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "team name too long"));
    }
    if !team
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "team name may only contain letters, digits, '_' and '-'",
        ));
    }
    Ok(())
}

impl TeamRegistry {
    pub fn new(data_dir: PathBuf, compact_threshold: u64) -> Self {
        Self {
            engines: DashMap::new(),
            data_dir,
            compact_threshold,
        }
    }

    pub fn team_count(&self) -> usize {
        self.engines.len()
    }

    pub fn get_or_create(&self, team: &str) -> io::Result<Arc<Engine>> {
        validate_team_name(team)?;
        if let Some(engine) = self.engines.get(team) {
            return Ok(engine.value().clone());
        }
        if self.engines.len() >= MAX_TEAMS {
            return Err(io::Error::other("too many teams"));
        }

        // The entry lock keeps two first connections from opening the same WAL twice.
        match self.engines.entry(team.to_string()) {
            Entry::Occupied(e) => Ok(e.get().clone()),
            Entry::Vacant(slot) => {
                let wal_path = self.data_dir.join(format!("{}.wal", slot.key()));
                let engine = Arc::new(Engine::new(wal_path, Arc::new(NotifyHub::new()))?);
                tokio::spawn(compactor::run_compactor(
                    engine.clone(),
                    self.compact_threshold,
                ));
                tracing::info!("opened team {}", slot.key());
                slot.insert(engine.clone());
                metrics::gauge!(crate::observability::TEAMS_ACTIVE).increment(1.0);
                Ok(engine)
            }
        }
    }
}
