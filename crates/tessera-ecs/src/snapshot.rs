//! Raw buffer snapshot and restore.
//!
//! A [`WorldSnapshot`] is the component buffer copied byte for byte, tagged
//! with the capacity and version of the world that produced it. Restoring
//! replaces property values only; entity liveness, archetype membership and
//! sparse slot assignments are left as they are in the receiving world.

use serde::{Deserialize, Serialize};

use crate::world::World;
use crate::EcsError;

/// Serializable copy of a world's component buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub buffer: Vec<u8>,
    pub capacity: usize,
    pub version: String,
}

impl WorldSnapshot {
    pub fn to_json(&self) -> Result<String, EcsError> {
        serde_json::to_string(self).map_err(|e| EcsError::InvalidConfig {
            reason: format!("snapshot encode: {e}"),
        })
    }

    pub fn from_json(json: &str) -> Result<Self, EcsError> {
        serde_json::from_str(json).map_err(|e| EcsError::InvalidConfig {
            reason: format!("snapshot decode: {e}"),
        })
    }
}

impl World {
    /// Copy the component buffer.
    pub fn save(&self) -> WorldSnapshot {
        WorldSnapshot {
            buffer: self.storage.buffer().to_vec(),
            capacity: self.config.capacity,
            version: self.config.version.clone(),
        }
    }

    /// Replace the component buffer with the one in `snapshot`.
    ///
    /// # Errors
    ///
    /// [`EcsError::CapacityMismatch`], [`EcsError::VersionMismatch`] or
    /// [`EcsError::BufferSizeMismatch`]; the live buffer is untouched on
    /// error.
    pub fn load(&mut self, snapshot: &WorldSnapshot) -> Result<(), EcsError> {
        if snapshot.capacity != self.config.capacity {
            tracing::warn!(
                expected = self.config.capacity,
                actual = snapshot.capacity,
                "snapshot rejected: capacity mismatch"
            );
            return Err(EcsError::CapacityMismatch {
                expected: self.config.capacity,
                actual: snapshot.capacity,
            });
        }
        if snapshot.version != self.config.version {
            tracing::warn!(
                expected = %self.config.version,
                actual = %snapshot.version,
                "snapshot rejected: version mismatch"
            );
            return Err(EcsError::VersionMismatch {
                expected: self.config.version.clone(),
                actual: snapshot.version.clone(),
            });
        }
        self.storage.set_buffer(&snapshot.buffer).inspect_err(|e| {
            tracing::warn!(error = %e, "snapshot rejected");
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
