use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::authority::AuthoritySide;
use crate::interpolation::InterpolationBuffer;
use crate::sender::TransformSender;

pub const ROOT_COMPONENT: i8 = -1;

/// Address of one synchronized transform: a network object plus the
/// component instance on it (-1 = the root transform, >= 0 = a child).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetId {
    pub object_id: u32,
    pub component_index: i8,
}

impl TargetId {
    pub fn new(object_id: u32, component_index: i8) -> Self {
        Self {
            object_id,
            component_index,
        }
    }

    pub fn root(object_id: u32) -> Self {
        Self::new(object_id, ROOT_COMPONENT)
    }

    pub fn child(object_id: u32, component_index: i8) -> Self {
        Self::new(object_id, component_index)
    }

    pub fn is_root(&self) -> bool {
        self.component_index == ROOT_COMPONENT
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BindingError {
    #[error("binding already attached for {0:?}")]
    DuplicateBinding(TargetId),
    #[error("no binding attached for {0:?}")]
    NotFound(TargetId),
    #[error("local side does not own {0:?}")]
    NotAuthoritative(TargetId),
}

/// Per-binding synchronization state: the owning side, the send evaluator
/// used while this side owns it, and the playback buffer used while it
/// does not.
#[derive(Debug)]
pub struct Binding {
    target: TargetId,
    authority: AuthoritySide,
    pub(crate) sender: TransformSender,
    pub(crate) buffer: InterpolationBuffer,
}

impl Binding {
    fn new(target: TargetId, authority: AuthoritySide, buffer_capacity: usize) -> Self {
        Self {
            target,
            authority,
            sender: TransformSender::new(),
            buffer: InterpolationBuffer::new(buffer_capacity),
        }
    }

    pub fn target(&self) -> TargetId {
        self.target
    }

    pub fn authority(&self) -> AuthoritySide {
        self.authority
    }

    pub(crate) fn set_authority(&mut self, side: AuthoritySide) {
        self.authority = side;
    }

    pub fn last_applied_sequence(&self) -> u32 {
        self.buffer.last_applied_sequence()
    }
}

#[derive(Debug, Default)]
pub struct BindingRegistry {
    bindings: HashMap<TargetId, Binding>,
}

impl BindingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(
        &mut self,
        target: TargetId,
        authority: AuthoritySide,
        buffer_capacity: usize,
    ) -> Result<&mut Binding, BindingError> {
        if self.bindings.contains_key(&target) {
            return Err(BindingError::DuplicateBinding(target));
        }
        Ok(self
            .bindings
            .entry(target)
            .or_insert(Binding::new(target, authority, buffer_capacity)))
    }

    pub fn detach(&mut self, target: TargetId) -> Result<Binding, BindingError> {
        self.bindings
            .remove(&target)
            .ok_or(BindingError::NotFound(target))
    }

    /// Resolves the binding a wire message concerns; `None` means the
    /// object despawned or never spawned here and the message is dropped.
    pub fn route(&mut self, target: TargetId) -> Option<&mut Binding> {
        self.bindings.get_mut(&target)
    }

    pub fn get(&self, target: TargetId) -> Option<&Binding> {
        self.bindings.get(&target)
    }

    pub fn contains(&self, target: TargetId) -> bool {
        self.bindings.contains_key(&target)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Binding> {
        self.bindings.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Binding> {
        self.bindings.values_mut()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_attach_fails() {
        let mut registry = BindingRegistry::new();
        let target = TargetId::root(7);

        registry.attach(target, AuthoritySide::Server, 8).unwrap();
        assert_eq!(
            registry
                .attach(target, AuthoritySide::Server, 8)
                .err()
                .unwrap(),
            BindingError::DuplicateBinding(target)
        );
    }

    #[test]
    fn children_share_object_but_not_index() {
        let mut registry = BindingRegistry::new();

        registry
            .attach(TargetId::root(3), AuthoritySide::Server, 8)
            .unwrap();
        registry
            .attach(TargetId::child(3, 0), AuthoritySide::Server, 8)
            .unwrap();
        registry
            .attach(TargetId::child(3, 1), AuthoritySide::Server, 8)
            .unwrap();

        assert_eq!(registry.len(), 3);
        assert!(
            registry
                .attach(TargetId::child(3, 1), AuthoritySide::Server, 8)
                .is_err()
        );
    }

    #[test]
    fn detach_makes_target_unroutable() {
        let mut registry = BindingRegistry::new();
        let target = TargetId::child(9, 2);

        registry.attach(target, AuthoritySide::Client, 8).unwrap();
        assert!(registry.route(target).is_some());

        registry.detach(target).unwrap();
        assert!(registry.route(target).is_none());
        assert_eq!(
            registry.detach(target).err().unwrap(),
            BindingError::NotFound(target)
        );
    }

    #[test]
    fn reattach_after_detach_starts_fresh() {
        let mut registry = BindingRegistry::new();
        let target = TargetId::root(1);

        registry.attach(target, AuthoritySide::Server, 8).unwrap();
        registry.detach(target).unwrap();
        let binding = registry.attach(target, AuthoritySide::Client, 8).unwrap();

        assert_eq!(binding.authority(), AuthoritySide::Client);
        assert_eq!(binding.last_applied_sequence(), 0);
    }
}
