//! Short-lived cache of ledger tallies.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};

use crate::{ledger::LedgerTally, model::ids::ElectionId};

/// A ledger tally and when it was read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedTally {
    pub tally: LedgerTally,
    pub captured_at: DateTime<Utc>,
}

/// Ledger tallies per election, each valid for a fixed time-to-live.
///
/// The cache is advisory: entries are not invalidated when votes are
/// written, so a read may lag the ledger by up to one TTL. Expired entries
/// are dropped when they are next looked up.
pub struct ResultCache {
    ttl: Duration,
    entries: Mutex<HashMap<ElectionId, CachedTally>>,
}

impl ResultCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<ElectionId, CachedTally>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, election_id: ElectionId) -> Option<CachedTally> {
        self.get_at(election_id, Utc::now())
    }

    fn get_at(&self, election_id: ElectionId, now: DateTime<Utc>) -> Option<CachedTally> {
        let mut entries = self.entries();
        match entries.get(&election_id) {
            Some(entry) if now - entry.captured_at < self.ttl => Some(entry.clone()),
            Some(_) => {
                trace!("Cached tally for election {election_id} expired");
                entries.remove(&election_id);
                None
            }
            None => None,
        }
    }

    /// Store a tally, replacing any previous one, timestamped now.
    pub fn put(&self, election_id: ElectionId, tally: LedgerTally) -> CachedTally {
        self.put_at(election_id, tally, Utc::now())
    }

    fn put_at(
        &self,
        election_id: ElectionId,
        tally: LedgerTally,
        captured_at: DateTime<Utc>,
    ) -> CachedTally {
        let entry = CachedTally { tally, captured_at };
        self.entries().insert(election_id, entry.clone());
        entry
    }

    pub fn invalidate(&self, election_id: ElectionId) {
        self.entries().remove(&election_id);
    }
}
