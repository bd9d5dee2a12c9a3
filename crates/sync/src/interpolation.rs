use std::collections::VecDeque;

use glam::{Quat, Vec3};

use crate::config::SyncConfig;
use crate::protocol::{AnimationState, FieldMask, Snapshot};

/// Fully-resolved transform state applied to a game object.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Pose {
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    pub fn new(position: Vec3, rotation: Quat, scale: Vec3) -> Self {
        Self {
            position,
            rotation,
            scale,
        }
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::IDENTITY
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Queued for playback.
    Buffered,
    /// Teleport snapshot: applied immediately, older entries discarded.
    Snapped,
    /// Sequence at or below the last applied one.
    Stale,
    /// Sequence already buffered.
    Duplicate,
}

#[derive(Debug, Clone, Copy)]
struct Baseline {
    timestamp: f32,
    mask: FieldMask,
}

/// Receive-side playback buffer for one binding. Snapshots go in gated by
/// sequence; `sample` walks playback time through them, interpolating
/// between the last applied snapshot and the next pending one, and
/// extrapolating briefly when the buffer runs dry.
#[derive(Debug)]
pub struct InterpolationBuffer {
    pending: VecDeque<Snapshot>,
    capacity: usize,
    last_applied_sequence: u32,
    baseline: Option<Baseline>,
    resolved: Pose,
    resolved_animation: Option<AnimationState>,
    current_animation: Option<AnimationState>,
    velocity: Vec3,
    latest_position: Option<(f32, Vec3)>,
    frozen: bool,
}

impl InterpolationBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            pending: VecDeque::with_capacity(capacity.min(16)),
            capacity: capacity.max(1),
            last_applied_sequence: 0,
            baseline: None,
            resolved: Pose::IDENTITY,
            resolved_animation: None,
            current_animation: None,
            velocity: Vec3::ZERO,
            latest_position: None,
            frozen: false,
        }
    }

    pub fn insert(&mut self, snapshot: Snapshot) -> InsertOutcome {
        if snapshot.sequence <= self.last_applied_sequence {
            return InsertOutcome::Stale;
        }
        if self.pending.iter().any(|s| s.sequence == snapshot.sequence) {
            return InsertOutcome::Duplicate;
        }

        if snapshot.teleport {
            self.snap_to(&snapshot);
            return InsertOutcome::Snapped;
        }

        self.track_velocity(&snapshot);

        let at = self
            .pending
            .iter()
            .position(|s| s.sequence > snapshot.sequence)
            .unwrap_or(self.pending.len());
        self.pending.insert(at, snapshot);

        while self.pending.len() > self.capacity {
            if let Some(evicted) = self.pending.pop_front() {
                self.consume(&evicted);
            }
        }
        InsertOutcome::Buffered
    }

    /// One playback step. `None` until the first snapshot has been applied.
    pub fn sample(&mut self, render_time: f32, config: &SyncConfig) -> Option<Pose> {
        if self.baseline.is_none() {
            // Startup: the first snapshot becomes the pose outright; there
            // is nothing earlier to interpolate from.
            let first = self.pending.pop_front()?;
            self.consume(&first);
        }

        let playback = render_time - config.interpolation_delay;
        while let Some(front) = self.pending.front() {
            if front.timestamp > playback {
                break;
            }
            let applied = self.pending.pop_front();
            if let Some(applied) = applied {
                self.consume(&applied);
            }
        }

        let Some(baseline) = self.baseline else {
            return None;
        };

        let pose = if let Some(next) = self.pending.front() {
            self.frozen = false;
            let span = next.timestamp - baseline.timestamp;
            let t = if span > f32::EPSILON {
                ((playback - baseline.timestamp) / span).clamp(0.0, 1.0)
            } else {
                1.0
            };

            let mut pose = self.resolved;
            if let Some(position) = next.position {
                if baseline.mask.contains(FieldMask::POSITION) {
                    pose.position = self.resolved.position.lerp(position, t);
                }
            }
            if let Some(rotation) = next.rotation {
                if baseline.mask.contains(FieldMask::ROTATION) {
                    pose.rotation = slerp_shortest(self.resolved.rotation, rotation, t);
                }
            }
            if let Some(scale) = next.scale {
                if baseline.mask.contains(FieldMask::SCALE) {
                    pose.scale = self.resolved.scale.lerp(scale, t);
                }
            }
            self.current_animation = match (self.resolved_animation, next.animation) {
                (Some(from), Some(to)) if baseline.mask.contains(FieldMask::ANIMATION) => {
                    Some(blend_animation(from, to, t))
                }
                _ => self.resolved_animation,
            };
            pose
        } else {
            // Buffer underrun: ride the implied velocity for the grace
            // period, then hold the last pose.
            let elapsed = (playback - baseline.timestamp).max(0.0);
            let clamped = elapsed.min(config.extrapolation_limit);
            self.frozen = elapsed > config.extrapolation_limit;
            self.current_animation = self.resolved_animation;

            let mut pose = self.resolved;
            pose.position += self.velocity * clamped;
            pose
        };
        Some(pose)
    }

    pub fn animation(&self) -> Option<AnimationState> {
        self.current_animation
    }

    pub fn last_applied_sequence(&self) -> u32 {
        self.last_applied_sequence
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    fn snap_to(&mut self, snapshot: &Snapshot) {
        self.pending.retain(|s| s.sequence > snapshot.sequence);
        self.consume(snapshot);
        self.current_animation = self.resolved_animation;
        self.velocity = Vec3::ZERO;
        self.latest_position = snapshot.position.map(|p| (snapshot.timestamp, p));
        self.frozen = false;
    }

    fn consume(&mut self, snapshot: &Snapshot) {
        if let Some(position) = snapshot.position {
            self.resolved.position = position;
        }
        if let Some(rotation) = snapshot.rotation {
            self.resolved.rotation = rotation;
        }
        if let Some(scale) = snapshot.scale {
            self.resolved.scale = scale;
        }
        if let Some(animation) = snapshot.animation {
            self.resolved_animation = Some(animation);
        }
        if snapshot.sequence > self.last_applied_sequence {
            self.last_applied_sequence = snapshot.sequence;
        }
        self.baseline = Some(Baseline {
            timestamp: snapshot.timestamp,
            mask: snapshot.field_mask(),
        });
    }

    fn track_velocity(&mut self, snapshot: &Snapshot) {
        let Some(position) = snapshot.position else {
            return;
        };
        match self.latest_position {
            Some((prev_time, prev_position)) if snapshot.timestamp > prev_time => {
                let dt = snapshot.timestamp - prev_time;
                self.velocity = (position - prev_position) / dt;
                self.latest_position = Some((snapshot.timestamp, position));
            }
            None => self.latest_position = Some((snapshot.timestamp, position)),
            _ => {}
        }
    }
}

fn slerp_shortest(from: Quat, to: Quat, t: f32) -> Quat {
    if from.dot(to) < 0.0 {
        from.slerp(-to, t)
    } else {
        from.slerp(to, t)
    }
}

fn blend_animation(from: AnimationState, to: AnimationState, t: f32) -> AnimationState {
    let state = if t < 0.5 { from.state } else { to.state };
    let phase = if from.state == to.state {
        lerp_wrapped(from.phase, to.phase, t)
    } else if t < 0.5 {
        from.phase
    } else {
        to.phase
    };
    AnimationState { state, phase }
}

/// Lerp on the unit circle of animation phases, crossing the 1.0 -> 0.0
/// wrap when that is the shorter way around.
fn lerp_wrapped(from: f32, to: f32, t: f32) -> f32 {
    if (to - from).abs() > 0.5 {
        if to < from {
            (from + (to + 1.0 - from) * t) % 1.0
        } else {
            (from + 1.0 + (to - from - 1.0) * t) % 1.0
        }
    } else {
        from + (to - from) * t
    }
}
