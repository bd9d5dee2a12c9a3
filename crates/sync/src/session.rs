use crate::authority::AuthoritySide;
use crate::binding::{Binding, BindingError, BindingRegistry, TargetId};
use crate::config::SyncConfig;
use crate::interpolation::{InsertOutcome, Pose};
use crate::protocol::{self, AnimationState, Snapshot};
use crate::stats::SyncStats;

/// Unreliable outgoing channel. Fire-and-forget: the core never retries,
/// and delivery order is not assumed.
pub trait Transport {
    fn send(&mut self, target: TargetId, datagram: &[u8]);
}

/// Host-side accessor for the transforms being synchronized. `None` means
/// the object is gone (despawn race); the tick for that binding is skipped.
pub trait TransformSource {
    fn local_pose(&self, target: TargetId) -> Option<Pose>;

    fn local_animation(&self, _target: TargetId) -> Option<AnimationState> {
        None
    }
}

/// One side of a synchronization session. Owns the binding registry and all
/// per-binding send/receive state; its lifetime is the scene's lifetime.
///
/// Single-threaded by design: drive `tick` from the fixed update loop,
/// `on_message` from transport delivery, and `sample` from the render loop,
/// all on the same thread (or behind one lock).
#[derive(Debug)]
pub struct SyncSession {
    local_side: AuthoritySide,
    config: SyncConfig,
    registry: BindingRegistry,
    stats: SyncStats,
}

impl SyncSession {
    pub fn new(local_side: AuthoritySide, config: SyncConfig) -> Self {
        Self {
            local_side,
            config,
            registry: BindingRegistry::new(),
            stats: SyncStats::default(),
        }
    }

    pub fn local_side(&self) -> AuthoritySide {
        self.local_side
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn stats(&self) -> &SyncStats {
        &self.stats
    }

    pub fn attach(&mut self, target: TargetId) -> Result<(), BindingError> {
        self.attach_with_authority(target, AuthoritySide::Server)
    }

    pub fn attach_with_authority(
        &mut self,
        target: TargetId,
        owner: AuthoritySide,
    ) -> Result<(), BindingError> {
        self.registry
            .attach(target, owner, self.config.max_buffered_snapshots)?;
        Ok(())
    }

    /// Removes the binding and its playback buffer. Messages still in
    /// flight for it will route to nothing and be dropped.
    pub fn detach(&mut self, target: TargetId) -> Result<(), BindingError> {
        self.registry.detach(target).map(|_| ())
    }

    pub fn authority(&self, target: TargetId) -> Option<AuthoritySide> {
        self.registry.get(target).map(|binding| binding.authority())
    }

    pub fn is_locally_owned(&self, target: TargetId) -> bool {
        self.authority(target) == Some(self.local_side)
    }

    pub fn transfer_authority(
        &mut self,
        target: TargetId,
        side: AuthoritySide,
    ) -> Result<(), BindingError> {
        let binding = self
            .registry
            .route(target)
            .ok_or(BindingError::NotFound(target))?;
        if binding.authority() == side {
            return Ok(());
        }
        binding.set_authority(side);
        if side == self.local_side {
            // Continue numbering above everything already applied here so
            // our first post-transfer snapshot beats the old owner's
            // in-flight ones on every receiver.
            let floor = binding.buffer.last_applied_sequence();
            binding.sender.seed_sequence(floor);
        }
        log::debug!("authority for {:?} transferred to {:?}", target, side);
        Ok(())
    }

    /// One send-evaluation pass over every locally-owned binding.
    pub fn tick<S, T>(&mut self, now: f32, source: &S, transport: &mut T)
    where
        S: TransformSource,
        T: Transport,
    {
        for binding in self.registry.iter_mut() {
            if binding.authority() != self.local_side {
                continue;
            }
            let target = binding.target();
            let Some(pose) = source.local_pose(target) else {
                continue;
            };
            let animation = source.local_animation(target);

            match binding.sender.evaluate(now, &pose, animation, &self.config) {
                Some(snapshot) => {
                    Self::emit(&mut self.stats, target, &snapshot, transport);
                }
                None => self.stats.ticks_suppressed += 1,
            }
        }
    }

    /// Emits an out-of-band full snapshot for a discrete event (snap,
    /// teleport), bypassing the rate limiter and change thresholds.
    pub fn force_send<S, T>(
        &mut self,
        target: TargetId,
        now: f32,
        source: &S,
        transport: &mut T,
    ) -> Result<(), BindingError>
    where
        S: TransformSource,
        T: Transport,
    {
        let binding = self
            .registry
            .route(target)
            .ok_or(BindingError::NotFound(target))?;
        if binding.authority() != self.local_side {
            return Err(BindingError::NotAuthoritative(target));
        }
        let Some(pose) = source.local_pose(target) else {
            log::warn!("forced send for {:?} skipped: no local pose", target);
            return Ok(());
        };
        let animation = source.local_animation(target);

        let snapshot = binding.sender.force(now, &pose, animation);
        Self::emit(&mut self.stats, target, &snapshot, transport);
        self.stats.forced_sends += 1;
        Ok(())
    }

    /// Routes one delivered datagram to its binding's playback buffer.
    /// Every failure path drops the message; none of them are fatal.
    pub fn on_message(&mut self, datagram: &[u8]) {
        self.stats.messages_received += 1;

        let (target, payload) = match protocol::decode_frame(datagram) {
            Ok(frame) => frame,
            Err(err) => {
                self.stats.decode_errors += 1;
                log::warn!("dropping undecodable message: {}", err);
                return;
            }
        };

        let Some(binding) = self.registry.route(target) else {
            self.stats.unroutable_drops += 1;
            log::debug!("dropping message for unknown binding {:?}", target);
            return;
        };
        if binding.authority() == self.local_side {
            // We are authoritative here; remote state for this binding is
            // at best a leftover from before an authority transfer.
            self.stats.authority_rejects += 1;
            log::debug!("ignoring remote snapshot for locally owned {:?}", target);
            return;
        }

        let snapshot = match Snapshot::decode(payload) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                self.stats.decode_errors += 1;
                log::warn!("dropping undecodable snapshot for {:?}: {}", target, err);
                return;
            }
        };

        match binding.buffer.insert(snapshot) {
            InsertOutcome::Buffered => {}
            InsertOutcome::Snapped => self.stats.teleport_snaps += 1,
            InsertOutcome::Stale => self.stats.stale_drops += 1,
            InsertOutcome::Duplicate => self.stats.duplicate_drops += 1,
        }
    }

    /// Playback pose for one binding at the given render time; `None`
    /// until the first snapshot has been applied (or for unknown targets).
    pub fn sample(&mut self, target: TargetId, render_time: f32) -> Option<Pose> {
        let binding = self.registry.route(target)?;
        let was_frozen = binding.buffer.is_frozen();
        let pose = binding.buffer.sample(render_time, &self.config);
        if binding.buffer.is_frozen() && !was_frozen {
            self.stats.extrapolation_freezes += 1;
            log::debug!("extrapolation for {:?} hit its grace period", target);
        }
        pose
    }

    /// Animation channel as of the last `sample` call for the binding.
    pub fn sample_animation(&self, target: TargetId) -> Option<AnimationState> {
        self.registry.get(target)?.buffer.animation()
    }

    pub fn last_applied_sequence(&self, target: TargetId) -> Option<u32> {
        self.registry
            .get(target)
            .map(|binding| binding.last_applied_sequence())
    }

    pub fn bindings(&self) -> impl Iterator<Item = &Binding> {
        self.registry.iter()
    }

    fn emit<T: Transport>(
        stats: &mut SyncStats,
        target: TargetId,
        snapshot: &Snapshot,
        transport: &mut T,
    ) {
        match protocol::encode_message(target, snapshot) {
            Ok(datagram) => {
                transport.send(target, &datagram);
                stats.snapshots_sent += 1;
            }
            Err(err) => {
                log::warn!("failed to encode snapshot for {:?}: {}", target, err);
            }
        }
    }
}
