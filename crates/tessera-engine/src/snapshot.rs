//! Frame-level snapshots with a BLAKE3 content hash.
//!
//! A [`FrameSnapshot`] wraps the world's raw [`WorldSnapshot`] together with
//! the frame counter and timestep, and seals the lot with a BLAKE3 digest so
//! a corrupted or hand-edited save is caught before it reaches
//! [`World::load`](tessera_ecs::world::World::load).

use serde::{Deserialize, Serialize};
use tessera_ecs::snapshot::WorldSnapshot;

use crate::frame::FrameLoop;
use crate::EngineError;

/// Everything needed to resume a [`FrameLoop`] at a given frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameSnapshot {
    pub world: WorldSnapshot,
    pub frame_counter: u64,
    pub fixed_dt: f64,
    /// Hex BLAKE3 digest of the fields above.
    pub hash: String,
}

/// The hashed subset of a [`FrameSnapshot`].
#[derive(Serialize)]
struct HashableState<'a> {
    world: &'a WorldSnapshot,
    frame_counter: u64,
    fixed_dt: f64,
}

fn compute_hash(
    world: &WorldSnapshot,
    frame_counter: u64,
    fixed_dt: f64,
) -> Result<String, EngineError> {
    let bytes = serde_json::to_vec(&HashableState {
        world,
        frame_counter,
        fixed_dt,
    })?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}

impl FrameSnapshot {
    /// Recompute the digest and compare it with the recorded one.
    pub fn verify(&self) -> Result<(), EngineError> {
        let computed = compute_hash(&self.world, self.frame_counter, self.fixed_dt)?;
        if computed != self.hash {
            return Err(EngineError::HashMismatch {
                recorded: self.hash.clone(),
                computed,
            });
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String, EngineError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        Ok(serde_json::from_str(json)?)
    }
}

impl FrameLoop {
    /// Capture the component buffer and frame position.
    pub fn capture_snapshot(&self) -> Result<FrameSnapshot, EngineError> {
        let world = self.world().save();
        let frame_counter = self.frame_count();
        let fixed_dt = self.fixed_dt();
        let hash = compute_hash(&world, frame_counter, fixed_dt)?;
        Ok(FrameSnapshot {
            world,
            frame_counter,
            fixed_dt,
            hash,
        })
    }

    /// Restore property values and the frame counter from `snapshot`.
    ///
    /// # Errors
    ///
    /// - [`EngineError::InvalidConfig`] when the snapshot was taken at a
    ///   different timestep.
    /// - [`EngineError::HashMismatch`] when the digest does not match.
    /// - [`EngineError::Ecs`] when the world rejects the buffer.
    ///
    /// Nothing is changed on error.
    pub fn restore_from_snapshot(&mut self, snapshot: &FrameSnapshot) -> Result<(), EngineError> {
        if snapshot.fixed_dt != self.fixed_dt() {
            return Err(EngineError::InvalidConfig {
                reason: format!(
                    "snapshot fixed_dt {} does not match loop fixed_dt {}",
                    snapshot.fixed_dt,
                    self.fixed_dt()
                ),
            });
        }
        snapshot.verify().inspect_err(|e| {
            tracing::warn!(error = %e, frame = snapshot.frame_counter, "snapshot rejected");
        })?;
        self.world_mut().load(&snapshot.world)?;
        self.set_frame_counter(snapshot.frame_counter);
        tracing::debug!(frame = snapshot.frame_counter, "snapshot restored");
        Ok(())
    }

    /// Digest of the live state, comparable with [`FrameSnapshot::hash`].
    pub fn state_hash(&self) -> Result<String, EngineError> {
        compute_hash(&self.world().save(), self.frame_count(), self.fixed_dt())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
