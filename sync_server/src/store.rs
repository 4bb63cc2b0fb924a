//! In-memory position store.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sync_shared::{
    math::Position,
    net::{EntityId, PositionUpdate},
};

/// Which delivery path produced a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UpdateSource {
    Request,
    Beacon,
}

/// Stored record for one entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredPosition {
    pub position: Position,
    /// Timestamp the client stamped on the update.
    pub client_timestamp: DateTime<Utc>,
    /// When the server stored it.
    pub last_seen: DateTime<Utc>,
    pub source: UpdateSource,
    /// Number of writes received for this entity.
    pub writes: u64,
}

#[derive(Debug, Default)]
pub struct PositionStore {
    records: HashMap<EntityId, StoredPosition>,
}

impl PositionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrites the entity's position with `update`. No ordering check:
    /// whatever arrives last wins.
    pub fn upsert(
        &mut self,
        entity: &EntityId,
        update: &PositionUpdate,
        source: UpdateSource,
    ) -> &StoredPosition {
        let now = Utc::now();
        let writes = self.records.get(entity).map_or(0, |r| r.writes) + 1;
        let record = StoredPosition {
            position: update.position,
            client_timestamp: update.timestamp,
            last_seen: now,
            source,
            writes,
        };
        self.records.insert(entity.clone(), record);
        &self.records[entity]
    }

    pub fn get(&self, entity: &EntityId) -> Option<&StoredPosition> {
        self.records.get(entity)
    }

    pub fn position(&self, entity: &EntityId) -> Option<Position> {
        self.get(entity).map(|r| r.position)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
