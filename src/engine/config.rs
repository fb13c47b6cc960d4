//! Bridge configuration.
//!
//! [`BridgeConfig`] holds the tunables of one [`SurfaceRegistry`](crate::SurfaceRegistry) and
//! its pump thread: input admission caps, pump cadence, paint rate limiting and a few limits.
//! Sensible defaults are available through [`Default`], and [`BridgeConfig::builder()`] offers a
//! fluent, validating way to customize them.
//!
//! # Examples
//!
//! ```rust
//! use std::time::Duration;
//! use surface_bridge::BridgeConfig;
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let cfg = BridgeConfig::builder()
//!     .max_surfaces(4)
//!     .motion_soft_cap(100)
//!     .hard_cap(300)
//!     .tick_interval(Duration::from_millis(2))
//!     .build()?;
//! assert_eq!(cfg.queue_policy.motion_soft_cap, 100);
//! # Ok(()) }
//! ```
//!
//! The queue caps are tuning knobs. Nothing in the bridge depends on their exact values, only on
//! the ordering `motion_soft_cap <= hard_cap`.

use std::fmt;
use std::time::Duration;

use crate::engine::DEFAULT_CHANNEL_CAPACITY;

/// Opaque white, used to fill a frame before the engine has painted anything.
pub const DEFAULT_BACKGROUND: u32 = 0xFFFF_FFFF;

/// Admission and drain limits applied to every surface's input queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueuePolicy {
    /// Backlog size at which pointer-motion events are silently rejected.
    pub motion_soft_cap: usize,
    /// Backlog size at which every event is rejected (loudly).
    pub hard_cap: usize,
    /// Maximum number of events drained from one queue per pump tick.
    pub drain_total: usize,
    /// Maximum number of pointer-motion events drained from one queue per pump tick.
    pub drain_motion: usize,
}

impl Default for QueuePolicy {
    fn default() -> Self {
        Self {
            motion_soft_cap: 200,
            hard_cap: 500,
            drain_total: 200,
            drain_motion: 150,
        }
    }
}

/// Main bridge configuration.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Input admission and drain limits
    pub queue_policy: QueuePolicy,
    /// Delay between two pump ticks
    pub tick_interval: Duration,
    /// Minimum time between two accepted paints of the same surface
    pub min_paint_interval: Duration,
    /// Packed ARGB color used for fresh frames
    pub background_color: u32,
    /// Maximum number of live surfaces
    pub max_surfaces: usize,
    /// How long a caller waits for the pump thread to answer a synchronous request
    pub request_timeout: Duration,
    /// Ticks taking longer than this are logged
    pub slow_tick_threshold: Duration,
    /// Try to raise the scheduling priority of the pump thread
    pub elevated_priority: bool,
    /// Capacity of the surface event broadcast channel
    pub event_channel_capacity: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            queue_policy: QueuePolicy::default(),
            tick_interval: Duration::from_millis(1),
            min_paint_interval: Duration::from_millis(16),
            background_color: DEFAULT_BACKGROUND,
            max_surfaces: 16,
            request_timeout: Duration::from_secs(5),
            slow_tick_threshold: Duration::from_millis(50),
            elevated_priority: true,
            event_channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl BridgeConfig {
    pub fn builder() -> BridgeConfigBuilder {
        BridgeConfigBuilder::default()
    }

    /// Checks the invariants between the individual fields.
    pub fn validate(&self) -> Result<(), BridgeConfigError> {
        validate(self)
    }
}

/// Builder for [`BridgeConfig`].
#[derive(Debug, Clone, Default)]
pub struct BridgeConfigBuilder {
    inner: BridgeConfig,
}

impl BridgeConfigBuilder {
    #[inline]
    fn map(mut self, f: impl FnOnce(&mut BridgeConfig)) -> Self {
        f(&mut self.inner);
        self
    }

    pub fn queue_policy(self, policy: QueuePolicy) -> Self { self.map(|c| c.queue_policy = policy) }
    pub fn motion_soft_cap(self, n: usize) -> Self { self.map(|c| c.queue_policy.motion_soft_cap = n) }
    pub fn hard_cap(self, n: usize) -> Self { self.map(|c| c.queue_policy.hard_cap = n) }
    pub fn drain_total(self, n: usize) -> Self { self.map(|c| c.queue_policy.drain_total = n) }
    pub fn drain_motion(self, n: usize) -> Self { self.map(|c| c.queue_policy.drain_motion = n) }
    pub fn tick_interval(self, d: Duration) -> Self { self.map(|c| c.tick_interval = d) }
    pub fn min_paint_interval(self, d: Duration) -> Self { self.map(|c| c.min_paint_interval = d) }
    pub fn background_color(self, argb: u32) -> Self { self.map(|c| c.background_color = argb) }
    pub fn max_surfaces(self, n: usize) -> Self { self.map(|c| c.max_surfaces = n) }
    pub fn request_timeout(self, d: Duration) -> Self { self.map(|c| c.request_timeout = d) }
    pub fn slow_tick_threshold(self, d: Duration) -> Self { self.map(|c| c.slow_tick_threshold = d) }
    pub fn elevated_priority(self, on: bool) -> Self { self.map(|c| c.elevated_priority = on) }
    pub fn event_channel_capacity(self, n: usize) -> Self { self.map(|c| c.event_channel_capacity = n) }

    /// Apply multiple changes in one go.
    pub fn with(self, f: impl FnOnce(&mut BridgeConfig)) -> Self { self.map(f) }

    /// Validate and build the final config.
    pub fn build(self) -> Result<BridgeConfig, BridgeConfigError> {
        validate(&self.inner)?;
        Ok(self.inner)
    }
}

// ---------- Validation ----------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeConfigError {
    ZeroSoftCap,
    SoftCapAboveHardCap { soft: usize, hard: usize },
    ZeroDrain,
    MotionDrainAboveTotal { motion: usize, total: usize },
    ZeroSurfaces,
    ZeroRequestTimeout,
    ZeroChannelCapacity,
}

impl fmt::Display for BridgeConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeConfigError::ZeroSoftCap =>
                write!(f, "motion_soft_cap must be at least 1"),
            BridgeConfigError::SoftCapAboveHardCap { soft, hard } =>
                write!(f, "motion_soft_cap ({soft}) > hard_cap ({hard})"),
            BridgeConfigError::ZeroDrain =>
                write!(f, "drain_total and drain_motion must be at least 1"),
            BridgeConfigError::MotionDrainAboveTotal { motion, total } =>
                write!(f, "drain_motion ({motion}) > drain_total ({total})"),
            BridgeConfigError::ZeroSurfaces =>
                write!(f, "max_surfaces must be at least 1"),
            BridgeConfigError::ZeroRequestTimeout =>
                write!(f, "request_timeout must not be zero"),
            BridgeConfigError::ZeroChannelCapacity =>
                write!(f, "event_channel_capacity must be at least 1"),
        }
    }
}
impl std::error::Error for BridgeConfigError {}

fn validate(c: &BridgeConfig) -> Result<(), BridgeConfigError> {
    let q = &c.queue_policy;
    if q.motion_soft_cap == 0 {
        return Err(BridgeConfigError::ZeroSoftCap);
    }
    if q.motion_soft_cap > q.hard_cap {
        return Err(BridgeConfigError::SoftCapAboveHardCap {
            soft: q.motion_soft_cap,
            hard: q.hard_cap,
        });
    }
    if q.drain_total == 0 || q.drain_motion == 0 {
        return Err(BridgeConfigError::ZeroDrain);
    }
    if q.drain_motion > q.drain_total {
        return Err(BridgeConfigError::MotionDrainAboveTotal {
            motion: q.drain_motion,
            total: q.drain_total,
        });
    }
    if c.max_surfaces == 0 {
        return Err(BridgeConfigError::ZeroSurfaces);
    }
    if c.request_timeout.is_zero() {
        return Err(BridgeConfigError::ZeroRequestTimeout);
    }
    if c.event_channel_capacity == 0 {
        return Err(BridgeConfigError::ZeroChannelCapacity);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = BridgeConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.queue_policy.motion_soft_cap, 200);
        assert_eq!(cfg.queue_policy.hard_cap, 500);
        assert_eq!(cfg.queue_policy.drain_total, 200);
        assert_eq!(cfg.queue_policy.drain_motion, 150);
        assert_eq!(cfg.min_paint_interval, Duration::from_millis(16));
        assert_eq!(cfg.tick_interval, Duration::from_millis(1));
        assert_eq!(cfg.background_color, DEFAULT_BACKGROUND);
    }

    #[test]
    fn builder_overrides_fields() {
        let cfg = BridgeConfig::builder()
            .max_surfaces(3)
            .motion_soft_cap(10)
            .hard_cap(20)
            .drain_total(8)
            .drain_motion(4)
            .background_color(0xFF00_0000)
            .elevated_priority(false)
            .build()
            .unwrap();

        assert_eq!(cfg.max_surfaces, 3);
        assert_eq!(cfg.queue_policy, QueuePolicy { motion_soft_cap: 10, hard_cap: 20, drain_total: 8, drain_motion: 4 });
        assert_eq!(cfg.background_color, 0xFF00_0000);
        assert!(!cfg.elevated_priority);
    }

    #[test]
    fn soft_cap_above_hard_cap_is_rejected() {
        let err = BridgeConfig::builder().motion_soft_cap(600).build().unwrap_err();
        assert_eq!(err, BridgeConfigError::SoftCapAboveHardCap { soft: 600, hard: 500 });
        assert_eq!(err.to_string(), "motion_soft_cap (600) > hard_cap (500)");
    }

    #[test]
    fn zero_values_are_rejected() {
        assert_eq!(BridgeConfig::builder().motion_soft_cap(0).build().unwrap_err(), BridgeConfigError::ZeroSoftCap);
        assert_eq!(BridgeConfig::builder().drain_total(0).build().unwrap_err(), BridgeConfigError::ZeroDrain);
        assert_eq!(BridgeConfig::builder().max_surfaces(0).build().unwrap_err(), BridgeConfigError::ZeroSurfaces);
        assert_eq!(
            BridgeConfig::builder().request_timeout(Duration::ZERO).build().unwrap_err(),
            BridgeConfigError::ZeroRequestTimeout
        );
        assert_eq!(
            BridgeConfig::builder().event_channel_capacity(0).build().unwrap_err(),
            BridgeConfigError::ZeroChannelCapacity
        );
    }

    #[test]
    fn motion_drain_cannot_exceed_total() {
        let err = BridgeConfig::builder().drain_total(100).drain_motion(150).build().unwrap_err();
        assert_eq!(err, BridgeConfigError::MotionDrainAboveTotal { motion: 150, total: 100 });
    }
}
