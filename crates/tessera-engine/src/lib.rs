//! Tessera Engine -- fixed-timestep frame driver for a tessera world.
//!
//! This crate builds on [`tessera_ecs`] to provide the outer loop: a
//! [`FrameLoop`](frame::FrameLoop) that runs named systems in a fixed order,
//! refreshes the world once per frame, and can capture and restore
//! hash-sealed [`FrameSnapshot`](snapshot::FrameSnapshot)s.
//!
//! # Quick Start
//!
//! ```
//! use tessera_engine::prelude::*;
//!
//! fn advance(world: &mut World, dt: f64) -> Result<(), EcsError> {
//!     let _ = (world, dt);
//!     Ok(())
//! }
//!
//! let world = World::new(
//!     [Component::with_schema("position", Schema::new().with("x", NumericType::F32))],
//!     WorldConfig::with_capacity(64),
//! )
//! .unwrap();
//!
//! let mut frames = FrameLoop::new(world, FrameConfig::default()).unwrap();
//! frames.add_system("advance", advance).unwrap();
//! frames.run_frames(100).unwrap();
//! assert_eq!(frames.frame_count(), 100);
//! ```

#![deny(unsafe_code)]

pub mod frame;
pub mod snapshot;

/// Re-export the ECS crate for convenience.
pub use tessera_ecs;

use tessera_ecs::EcsError;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by the frame driver.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Ecs(#[from] EcsError),

    /// A system returned an error; the frame was abandoned before refresh.
    #[error("system '{name}' failed: {source}")]
    System {
        name: String,
        #[source]
        source: EcsError,
    },

    /// A snapshot's recorded digest does not match its contents.
    #[error("snapshot hash mismatch: recorded {recorded}, computed {computed}")]
    HashMismatch { recorded: String, computed: String },

    /// System registration would leave no valid execution order.
    #[error("invalid system order: {reason}")]
    SystemOrder { reason: String },

    #[error("invalid frame configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("snapshot encoding: {0}")]
    Encoding(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common engine usage.
pub mod prelude {
    pub use tessera_ecs::prelude::*;

    pub use crate::frame::{FrameConfig, FrameDiagnostics, FrameLoop, SystemFn};
    pub use crate::snapshot::FrameSnapshot;
    pub use crate::EngineError;
}
