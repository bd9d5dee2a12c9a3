use glam::{Quat, Vec3};

use crate::config::SyncConfig;
use crate::interpolation::Pose;
use crate::protocol::{AnimationState, Snapshot};

#[derive(Debug, Clone, Copy)]
struct SentState {
    position: Vec3,
    rotation: Quat,
    scale: Vec3,
    animation: Option<AnimationState>,
}

/// Send-side evaluator for one binding. Once per tick it compares the
/// current pose against the last values actually sent, per field, and
/// produces a snapshot only when something moved past its threshold and
/// the rate limiter allows it. Sequence numbers advance only on emission.
#[derive(Debug)]
pub struct TransformSender {
    next_sequence: u32,
    last_sent: Option<SentState>,
    last_send_time: Option<f32>,
}

impl Default for TransformSender {
    fn default() -> Self {
        Self::new()
    }
}

impl TransformSender {
    pub fn new() -> Self {
        Self {
            next_sequence: 1,
            last_sent: None,
            last_send_time: None,
        }
    }

    pub fn next_sequence(&self) -> u32 {
        self.next_sequence
    }

    /// After gaining authority, continue numbering above what the receive
    /// side already applied so post-transfer snapshots win the monotonic
    /// gate on every observer.
    pub(crate) fn seed_sequence(&mut self, floor: u32) {
        if self.next_sequence <= floor {
            self.next_sequence = floor + 1;
        }
    }

    pub fn evaluate(
        &mut self,
        now: f32,
        pose: &Pose,
        animation: Option<AnimationState>,
        config: &SyncConfig,
    ) -> Option<Snapshot> {
        let Some(last) = self.last_sent else {
            // Nothing sent yet: the receiver needs a full baseline.
            return Some(self.emit_full(now, pose, animation, false));
        };

        if let Some(sent_at) = self.last_send_time {
            if now - sent_at < config.send_interval {
                // Deferred, not dropped; the next eligible tick compares
                // against last_sent and picks up everything that moved.
                return None;
            }
        }

        let mut snapshot = Snapshot::new(0, now);
        if pose.position.distance_squared(last.position)
            > config.position_threshold * config.position_threshold
        {
            snapshot.position = Some(pose.position);
        }
        if last.rotation.angle_between(pose.rotation) > config.rotation_threshold {
            snapshot.rotation = Some(pose.rotation);
        }
        if pose.scale.distance_squared(last.scale)
            > config.scale_threshold * config.scale_threshold
        {
            snapshot.scale = Some(pose.scale);
        }
        if let Some(current) = animation {
            if animation_changed(last.animation, current, config.animation_phase_threshold) {
                snapshot.animation = Some(current);
            }
        }

        if snapshot.is_empty() {
            return None;
        }

        self.stamp(&mut snapshot, now);
        self.record_sent(&snapshot, last);
        Some(snapshot)
    }

    /// Out-of-band snapshot for discrete events: bypasses the rate limiter
    /// and thresholds, carries every field, and tells receivers to hard-snap.
    pub fn force(
        &mut self,
        now: f32,
        pose: &Pose,
        animation: Option<AnimationState>,
    ) -> Snapshot {
        self.emit_full(now, pose, animation, true)
    }

    fn emit_full(
        &mut self,
        now: f32,
        pose: &Pose,
        animation: Option<AnimationState>,
        teleport: bool,
    ) -> Snapshot {
        let mut snapshot = Snapshot::new(0, now);
        snapshot.position = Some(pose.position);
        snapshot.rotation = Some(pose.rotation);
        snapshot.scale = Some(pose.scale);
        snapshot.animation = animation;
        snapshot.teleport = teleport;

        self.stamp(&mut snapshot, now);
        self.last_sent = Some(SentState {
            position: pose.position,
            rotation: pose.rotation,
            scale: pose.scale,
            animation,
        });
        snapshot
    }

    fn stamp(&mut self, snapshot: &mut Snapshot, now: f32) {
        snapshot.sequence = self.next_sequence;
        self.next_sequence += 1;
        self.last_send_time = Some(now);
    }

    fn record_sent(&mut self, snapshot: &Snapshot, previous: SentState) {
        self.last_sent = Some(SentState {
            position: snapshot.position.unwrap_or(previous.position),
            rotation: snapshot.rotation.unwrap_or(previous.rotation),
            scale: snapshot.scale.unwrap_or(previous.scale),
            animation: snapshot.animation.or(previous.animation),
        });
    }
}

fn animation_changed(
    last: Option<AnimationState>,
    current: AnimationState,
    phase_threshold: f32,
) -> bool {
    let Some(last) = last else {
        return true;
    };
    if last.state != current.state {
        return true;
    }
    let delta = (current.phase - last.phase).abs();
    delta.min(1.0 - delta) > phase_threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pose_at(x: f32) -> Pose {
        Pose {
            position: Vec3::new(x, 0.0, 0.0),
            ..Pose::IDENTITY
        }
    }

    #[test]
    fn first_evaluation_sends_full_baseline() {
        let mut sender = TransformSender::new();
        let config = SyncConfig::default();

        let snapshot = sender.evaluate(0.0, &pose_at(1.0), None, &config).unwrap();
        assert_eq!(snapshot.sequence, 1);
        assert!(snapshot.position.is_some());
        assert!(snapshot.rotation.is_some());
        assert!(snapshot.scale.is_some());
        assert!(!snapshot.teleport);
    }

    #[test]
    fn unchanged_pose_is_suppressed_without_sequence_bump() {
        let mut sender = TransformSender::new();
        let config = SyncConfig::default();
        let pose = pose_at(1.0);

        sender.evaluate(0.0, &pose, None, &config).unwrap();
        assert!(sender.evaluate(1.0, &pose, None, &config).is_none());
        assert!(sender.evaluate(2.0, &pose, None, &config).is_none());
        assert_eq!(sender.next_sequence(), 2);
    }

    #[test]
    fn change_within_interval_defers_and_sends_latest() {
        let mut sender = TransformSender::new();
        let config = SyncConfig {
            send_interval: 0.1,
            ..SyncConfig::default()
        };

        sender.evaluate(0.0, &pose_at(0.0), None, &config).unwrap();
        // Moves during the rate window are withheld...
        assert!(sender.evaluate(0.02, &pose_at(5.0), None, &config).is_none());
        assert!(sender.evaluate(0.05, &pose_at(7.0), None, &config).is_none());

        // ...and the next eligible tick carries the newest value, not a
        // stale intermediate one.
        let snapshot = sender.evaluate(0.12, &pose_at(9.0), None, &config).unwrap();
        assert_eq!(snapshot.position.unwrap().x, 9.0);
        assert_eq!(snapshot.sequence, 2);
    }

    #[test]
    fn only_changed_fields_are_included() {
        let mut sender = TransformSender::new();
        let config = SyncConfig::default();

        sender.evaluate(0.0, &pose_at(0.0), None, &config).unwrap();
        let snapshot = sender.evaluate(1.0, &pose_at(3.0), None, &config).unwrap();

        assert!(snapshot.position.is_some());
        assert!(snapshot.rotation.is_none());
        assert!(snapshot.scale.is_none());
    }

    #[test]
    fn slow_drift_accumulates_against_last_sent() {
        let mut sender = TransformSender::new();
        let config = SyncConfig {
            position_threshold: 0.5,
            ..SyncConfig::default()
        };

        sender.evaluate(0.0, &pose_at(0.0), None, &config).unwrap();
        // Each step is under the threshold relative to the previous tick,
        // but drift relative to the last *sent* value keeps accumulating.
        assert!(sender.evaluate(1.0, &pose_at(0.2), None, &config).is_none());
        assert!(sender.evaluate(2.0, &pose_at(0.4), None, &config).is_none());
        let snapshot = sender.evaluate(3.0, &pose_at(0.6), None, &config).unwrap();
        assert_eq!(snapshot.position.unwrap().x, 0.6);
    }

    #[test]
    fn forced_send_bypasses_rate_limit_and_carries_all_fields() {
        let mut sender = TransformSender::new();
        let config = SyncConfig::default();
        let pose = pose_at(1.0);

        sender.evaluate(0.0, &pose, None, &config).unwrap();
        // Well inside the rate window and with nothing changed.
        let snapshot = sender.force(0.001, &pose, None);

        assert!(snapshot.teleport);
        assert!(snapshot.position.is_some());
        assert!(snapshot.rotation.is_some());
        assert!(snapshot.scale.is_some());
        assert_eq!(snapshot.sequence, 2);
    }

    #[test]
    fn rotation_change_detected_by_angle() {
        let mut sender = TransformSender::new();
        let config = SyncConfig::default();

        let mut pose = pose_at(0.0);
        sender.evaluate(0.0, &pose, None, &config).unwrap();

        pose.rotation = Quat::from_rotation_y(0.2);
        let snapshot = sender.evaluate(1.0, &pose, None, &config).unwrap();
        assert!(snapshot.rotation.is_some());
        assert!(snapshot.position.is_none());
    }

    #[test]
    fn animation_state_flip_is_sent() {
        let mut sender = TransformSender::new();
        let config = SyncConfig::default();
        let pose = pose_at(0.0);
        let idle = AnimationState {
            state: 0,
            phase: 0.1,
        };
        let running = AnimationState {
            state: 1,
            phase: 0.1,
        };

        sender.evaluate(0.0, &pose, Some(idle), &config).unwrap();
        assert!(sender.evaluate(1.0, &pose, Some(idle), &config).is_none());

        let snapshot = sender.evaluate(2.0, &pose, Some(running), &config).unwrap();
        assert_eq!(snapshot.animation.unwrap().state, 1);
    }

    #[test]
    fn seeded_sequence_never_moves_backwards() {
        let mut sender = TransformSender::new();
        sender.seed_sequence(41);
        assert_eq!(sender.next_sequence(), 42);
        sender.seed_sequence(10);
        assert_eq!(sender.next_sequence(), 42);
    }
}
