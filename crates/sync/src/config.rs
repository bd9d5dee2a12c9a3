use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Minimum seconds between periodic snapshots per binding.
    pub send_interval: f32,
    /// Positional change (world units) below which a field is not resent.
    pub position_threshold: f32,
    /// Rotational change (radians) below which a field is not resent.
    pub rotation_threshold: f32,
    /// Scale change below which a field is not resent.
    pub scale_threshold: f32,
    /// Animation phase change below which the channel is not resent.
    pub animation_phase_threshold: f32,
    /// Playback runs this many seconds behind the newest data to absorb
    /// delivery jitter.
    pub interpolation_delay: f32,
    /// Seconds of velocity extrapolation allowed past the newest snapshot
    /// before the pose freezes.
    pub extrapolation_limit: f32,
    /// Per-binding cap on buffered snapshots.
    pub max_buffered_snapshots: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            send_interval: 0.05,
            position_threshold: 0.001,
            rotation_threshold: 0.001,
            scale_threshold: 0.001,
            animation_phase_threshold: 0.05,
            interpolation_delay: 0.1,
            extrapolation_limit: 0.25,
            max_buffered_snapshots: 64,
        }
    }
}
