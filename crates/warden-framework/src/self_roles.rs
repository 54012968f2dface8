//! Self roles: roles members may join and leave on their own.

use std::sync::Arc;

use async_trait::async_trait;
use warden_core::{GuildId, Identity, LockKey, LockScope, Responder, ServiceResult};

use crate::action::{Action, ActionKind, RoleRef};
use crate::dispatch::Router;

/// Operations on a guild's self-assignable roles.
///
/// `Add`/`Remove` change the guild's list; `Join`/`Leave` change one member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelfRoleCommand {
    Add { role: RoleRef },
    Remove { role: RoleRef },
    Join { role: RoleRef },
    Leave { role: RoleRef },
    View,
}

impl ActionKind for SelfRoleCommand {
    fn name(&self) -> &'static str {
        match self {
            Self::Add { .. } => "self_role_add",
            Self::Remove { .. } => "self_role_remove",
            Self::Join { .. } => "self_role_join",
            Self::Leave { .. } => "self_role_leave",
            Self::View => "self_role_view",
        }
    }

    fn lock_scope(&self, actor: Identity, target: Identity) -> LockScope {
        match self {
            Self::Add { .. } | Self::Remove { .. } => {
                LockScope::Write(LockKey::Guild(actor.guild))
            }
            Self::Join { .. } | Self::Leave { .. } => LockScope::Write(target.into()),
            Self::View => LockScope::Read(LockKey::Guild(actor.guild)),
        }
    }
}

pub type SelfRoleAction = Action<SelfRoleCommand>;

/// Self role configuration and membership.
#[async_trait]
pub trait SelfRoleService: Send + Sync + 'static {
    async fn add(
        &self,
        guild: GuildId,
        role: &RoleRef,
        responder: &dyn Responder,
    ) -> ServiceResult<()>;

    async fn remove(
        &self,
        guild: GuildId,
        role: &RoleRef,
        responder: &dyn Responder,
    ) -> ServiceResult<()>;

    async fn join(
        &self,
        target: Identity,
        role: &RoleRef,
        responder: &dyn Responder,
    ) -> ServiceResult<()>;

    async fn leave(
        &self,
        target: Identity,
        role: &RoleRef,
        responder: &dyn Responder,
    ) -> ServiceResult<()>;

    async fn view(&self, guild: GuildId, responder: &dyn Responder) -> ServiceResult<()>;
}

/// Routes [`SelfRoleAction`]s to a [`SelfRoleService`].
#[derive(Clone)]
pub struct SelfRoleRouter {
    service: Arc<dyn SelfRoleService>,
}

impl SelfRoleRouter {
    pub fn new(service: Arc<dyn SelfRoleService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Router<SelfRoleAction> for SelfRoleRouter {
    async fn route(&self, action: SelfRoleAction) -> ServiceResult<()> {
        let guild = action.actor().guild;
        let target = action.target();
        let responder = action.responder().as_ref();
        match action.kind() {
            SelfRoleCommand::Add { role } => self.service.add(guild, role, responder).await,
            SelfRoleCommand::Remove { role } => self.service.remove(guild, role, responder).await,
            SelfRoleCommand::Join { role } => self.service.join(target, role, responder).await,
            SelfRoleCommand::Leave { role } => self.service.leave(target, role, responder).await,
            SelfRoleCommand::View => self.service.view(guild, responder).await,
        }
    }
}
