//! Fixed-timestep frame loop.
//!
//! The [`FrameLoop`] owns a [`World`] and an ordered list of named systems.
//! Each call to [`tick`](FrameLoop::tick):
//!
//! 1. Runs every system in registration order, passing `&mut World` and the
//!    fixed timestep.
//! 2. Calls [`World::refresh`] exactly once, which clears the entered/exited
//!    diffs and recycles destroyed entity indices.
//! 3. Advances the frame counter.
//!
//! Systems are plain function pointers. A system may declare that it runs
//! after other systems. Dependencies must already be registered, so the
//! registration order is always a valid execution order and a cycle cannot
//! be expressed.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tessera_ecs::world::World;
use tessera_ecs::EcsError;

use crate::EngineError;

// ---------------------------------------------------------------------------
// FrameConfig
// ---------------------------------------------------------------------------

/// Configuration for the frame loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameConfig {
    /// Seconds per frame. Must be positive and finite.
    pub fixed_dt: f64,
    /// Systems slower than this are reported with a `warn!` event.
    pub slow_system_threshold: Duration,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            fixed_dt: 1.0 / 60.0,
            slow_system_threshold: Duration::from_millis(4),
        }
    }
}

impl FrameConfig {
    fn validate(&self) -> Result<(), EngineError> {
        if !(self.fixed_dt.is_finite() && self.fixed_dt > 0.0) {
            return Err(EngineError::InvalidConfig {
                reason: format!("fixed_dt must be positive and finite, got {}", self.fixed_dt),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Systems
// ---------------------------------------------------------------------------

/// A system: mutate the world for one frame of `dt` seconds.
pub type SystemFn = fn(&mut World, f64) -> Result<(), EcsError>;

struct RegisteredSystem {
    name: String,
    func: SystemFn,
}

/// Timing breakdown of the most recent frame.
#[derive(Debug, Clone, Default)]
pub struct FrameDiagnostics {
    /// Wall time of each system, in execution order.
    pub system_times: Vec<(String, Duration)>,
    /// Wall time of the end-of-frame refresh.
    pub refresh_time: Duration,
    pub total_time: Duration,
}

// ---------------------------------------------------------------------------
// FrameLoop
// ---------------------------------------------------------------------------

/// Drives a [`World`] forward one fixed frame at a time.
pub struct FrameLoop {
    world: World,
    systems: Vec<RegisteredSystem>,
    config: FrameConfig,
    frame_counter: u64,
    last_diagnostics: FrameDiagnostics,
}

impl FrameLoop {
    /// Wrap `world` in a frame loop.
    ///
    /// # Errors
    ///
    /// [`EngineError::InvalidConfig`] when `fixed_dt` is zero, negative or
    /// not finite.
    pub fn new(world: World, config: FrameConfig) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self {
            world,
            systems: Vec::new(),
            config,
            frame_counter: 0,
            last_diagnostics: FrameDiagnostics::default(),
        })
    }

    /// Register a system with no ordering constraints.
    pub fn add_system(&mut self, name: &str, func: SystemFn) -> Result<(), EngineError> {
        self.add_system_after(name, &[], func)
    }

    /// Register a system that must run after each system named in `after`.
    ///
    /// # Errors
    ///
    /// [`EngineError::SystemOrder`] when the name is taken or a dependency is
    /// not registered yet. The loop is left unchanged on error.
    pub fn add_system_after(
        &mut self,
        name: &str,
        after: &[&str],
        func: SystemFn,
    ) -> Result<(), EngineError> {
        if self.systems.iter().any(|s| s.name == name) {
            return Err(EngineError::SystemOrder {
                reason: format!("duplicate system name '{name}'"),
            });
        }
        for dep in after {
            if !self.systems.iter().any(|s| s.name == *dep) {
                return Err(EngineError::SystemOrder {
                    reason: format!("system '{name}' depends on '{dep}', which is not registered"),
                });
            }
        }

        self.systems.push(RegisteredSystem {
            name: name.to_owned(),
            func,
        });
        tracing::debug!(system = name, after = ?after, "system registered");
        Ok(())
    }

    /// Run one frame.
    ///
    /// # Errors
    ///
    /// [`EngineError::System`] when a system fails. Later systems do not
    /// run, the world is not refreshed and the frame counter stays put, so
    /// the entered/exited diffs of the failed frame remain observable.
    pub fn tick(&mut self) -> Result<(), EngineError> {
        let span = tracing::debug_span!("frame", frame = self.frame_counter);
        let _enter = span.enter();

        let frame_start = Instant::now();
        let dt = self.config.fixed_dt;
        let threshold = self.config.slow_system_threshold;
        let mut system_times = Vec::with_capacity(self.systems.len());

        for system in &self.systems {
            let start = Instant::now();
            let outcome = (system.func)(&mut self.world, dt);
            let elapsed = start.elapsed();
            if elapsed > threshold {
                tracing::warn!(
                    system = %system.name,
                    elapsed_us = elapsed.as_micros() as u64,
                    "slow system"
                );
            }
            system_times.push((system.name.clone(), elapsed));
            if let Err(source) = outcome {
                tracing::warn!(system = %system.name, error = %source, "system failed");
                self.last_diagnostics = FrameDiagnostics {
                    system_times,
                    refresh_time: Duration::ZERO,
                    total_time: frame_start.elapsed(),
                };
                return Err(EngineError::System {
                    name: system.name.clone(),
                    source,
                });
            }
        }

        let refresh_start = Instant::now();
        self.world.refresh();
        let refresh_time = refresh_start.elapsed();

        self.frame_counter += 1;
        self.last_diagnostics = FrameDiagnostics {
            system_times,
            refresh_time,
            total_time: frame_start.elapsed(),
        };
        Ok(())
    }

    /// Run `n` frames, stopping at the first failing one.
    pub fn run_frames(&mut self, n: u64) -> Result<(), EngineError> {
        for _ in 0..n {
            self.tick()?;
        }
        Ok(())
    }

    /// Number of completed frames.
    pub fn frame_count(&self) -> u64 {
        self.frame_counter
    }

    /// Simulated seconds: `frame_count * fixed_dt`.
    pub fn sim_time(&self) -> f64 {
        self.frame_counter as f64 * self.config.fixed_dt
    }

    pub fn fixed_dt(&self) -> f64 {
        self.config.fixed_dt
    }

    pub fn config(&self) -> &FrameConfig {
        &self.config
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    /// Mutable world access between frames (spawning, registering queries).
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    /// Give the world back, dropping the systems.
    pub fn into_world(self) -> World {
        self.world
    }

    pub fn system_count(&self) -> usize {
        self.systems.len()
    }

    /// System names in execution order.
    pub fn system_names(&self) -> Vec<&str> {
        self.systems.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn last_diagnostics(&self) -> &FrameDiagnostics {
        &self.last_diagnostics
    }

    pub(crate) fn set_frame_counter(&mut self, frame: u64) {
        self.frame_counter = frame;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
