//! The action envelope.
//!
//! Every command a member issues is wrapped into an [`Action`] by the command
//! layer (external) and written to the matching dispatcher. The envelope is
//! immutable once built and is consumed exactly once.

use std::sync::Arc;
use std::time::Instant;

use warden_core::{Identity, LockScope, Responder, RoleId, WorkItem};

use crate::dispatch::Routable;

/// A per-domain command kind, carrying its payload.
pub trait ActionKind: Send + Sync + 'static {
    /// Short operation name used in logs and failure reports.
    fn name(&self) -> &'static str;

    /// The lock this kind needs, given who asked and who is affected.
    fn lock_scope(&self, actor: Identity, target: Identity) -> LockScope;
}

/// A role given either by id or by the name a member typed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleRef {
    /// A resolved role id.
    Id(RoleId),
    /// Raw role name input, resolved by the service.
    Name(String),
}

impl From<RoleId> for RoleRef {
    fn from(id: RoleId) -> Self {
        Self::Id(id)
    }
}

impl From<&str> for RoleRef {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

/// One requested operation against a domain entity.
#[derive(Debug, Clone)]
pub struct Action<K> {
    kind: K,
    actor: Identity,
    target: Identity,
    responder: Arc<dyn Responder>,
    accepted_at: Instant,
}

impl<K> Action<K> {
    /// Creates an action acting on the actor themself.
    pub fn new(actor: Identity, kind: K, responder: Arc<dyn Responder>) -> Self {
        Self {
            kind,
            actor,
            target: actor,
            responder,
            accepted_at: Instant::now(),
        }
    }

    /// Makes the action operate on `target` instead of the actor.
    pub fn on_behalf_of(mut self, target: Identity) -> Self {
        self.target = target;
        self
    }

    /// Returns the requested operation.
    pub fn kind(&self) -> &K {
        &self.kind
    }

    /// Returns who initiated the action.
    pub fn actor(&self) -> Identity {
        self.actor
    }

    /// Returns who the action operates on.
    pub fn target(&self) -> Identity {
        self.target
    }

    /// Returns the reply capability.
    pub fn responder(&self) -> &Arc<dyn Responder> {
        &self.responder
    }

    /// Returns when the command was accepted.
    pub fn accepted_at(&self) -> Instant {
        self.accepted_at
    }
}

impl<K: ActionKind> WorkItem for Action<K> {
    fn kind(&self) -> &'static str {
        self.kind.name()
    }

    fn actor(&self) -> Option<Identity> {
        Some(self.actor)
    }

    fn responder(&self) -> Option<Arc<dyn Responder>> {
        Some(Arc::clone(&self.responder))
    }
}

impl<K: ActionKind> Routable for Action<K> {
    fn lock_scope(&self) -> LockScope {
        self.kind.lock_scope(self.actor, self.target)
    }

    fn accepted_at(&self) -> Option<Instant> {
        Some(self.accepted_at)
    }
}


#[cfg(test)]
mod tests {
    use super::testing::CapturingResponder;
    use super::*;
    use warden_core::{LockKey, PetId};

    use crate::pets::PetCommand;

    #[test]
    fn test_target_defaults_to_actor() {
        let actor = Identity::new(1, 2);
        let action = Action::new(actor, PetCommand::View, Arc::new(CapturingResponder::default()));
        assert_eq!(action.target(), actor);
        assert_eq!(WorkItem::actor(&action), Some(actor));
    }

    #[test]
    fn test_on_behalf_of_changes_lock_target() {
        let admin = Identity::new(1, 2);
        let member = Identity::new(1, 3);
        let action = Action::new(
            admin,
            PetCommand::Treat { pet: PetId(5) },
            Arc::new(CapturingResponder::default()),
        )
        .on_behalf_of(member);

        assert_eq!(action.actor(), admin);
        assert_eq!(action.target(), member);
        assert_eq!(action.lock_scope(), LockScope::Write(LockKey::from(member)));
        assert_eq!(WorkItem::kind(&action), "pet_treat");
    }

    #[test]
    fn test_role_ref_conversions() {
        assert_eq!(RoleRef::from(RoleId(4)), RoleRef::Id(RoleId(4)));
        assert_eq!(RoleRef::from("Gamer"), RoleRef::Name("Gamer".into()));
    }
}
