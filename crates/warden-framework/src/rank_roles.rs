//! Rank roles: roles granted automatically once a member reaches a rank.
//!
//! Creating or deleting a rank role can change the roles of every member in
//! the guild, so both take the all-users write lock.

use std::sync::Arc;

use async_trait::async_trait;
use warden_core::{GuildId, Identity, LockKey, LockScope, Responder, ServiceResult};

use crate::action::{Action, ActionKind, RoleRef};
use crate::dispatch::Router;

/// Operations on a guild's rank roles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RankRoleCommand {
    Create { role: RoleRef, required_rank: u32 },
    Delete { role: RoleRef },
    View,
}

impl ActionKind for RankRoleCommand {
    fn name(&self) -> &'static str {
        match self {
            Self::Create { .. } => "rank_role_create",
            Self::Delete { .. } => "rank_role_delete",
            Self::View => "rank_role_view",
        }
    }

    fn lock_scope(&self, actor: Identity, _target: Identity) -> LockScope {
        match self {
            Self::Create { .. } | Self::Delete { .. } => LockScope::WriteAllUsers(actor.guild),
            Self::View => LockScope::Read(LockKey::Guild(actor.guild)),
        }
    }
}

pub type RankRoleAction = Action<RankRoleCommand>;

/// Rank role configuration and member role syncing.
#[async_trait]
pub trait RankRoleService: Send + Sync + 'static {
    async fn create(
        &self,
        guild: GuildId,
        role: &RoleRef,
        required_rank: u32,
        responder: &dyn Responder,
    ) -> ServiceResult<()>;

    async fn delete(
        &self,
        guild: GuildId,
        role: &RoleRef,
        responder: &dyn Responder,
    ) -> ServiceResult<()>;

    async fn view(&self, guild: GuildId, responder: &dyn Responder) -> ServiceResult<()>;
}

/// Routes [`RankRoleAction`]s to a [`RankRoleService`].
#[derive(Clone)]
pub struct RankRoleRouter {
    service: Arc<dyn RankRoleService>,
}

impl RankRoleRouter {
    pub fn new(service: Arc<dyn RankRoleService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Router<RankRoleAction> for RankRoleRouter {
    async fn route(&self, action: RankRoleAction) -> ServiceResult<()> {
        let guild = action.actor().guild;
        let responder = action.responder().as_ref();
        match action.kind() {
            RankRoleCommand::Create { role, required_rank } => {
                self.service
                    .create(guild, role, *required_rank, responder)
                    .await
            }
            RankRoleCommand::Delete { role } => self.service.delete(guild, role, responder).await,
            RankRoleCommand::View => self.service.view(guild, responder).await,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::action::testing::{CallLog, CapturingResponder};
    use warden_core::{RoleId, ServiceError};

    #[derive(Default)]
    pub(crate) struct FakeRankRoles {
        pub calls: CallLog,
    }

    #[async_trait]
    impl RankRoleService for FakeRankRoles {
        async fn create(
            &self,
            guild: GuildId,
            role: &RoleRef,
            required_rank: u32,
            _responder: &dyn Responder,
        ) -> ServiceResult<()> {
            self.calls.push(format!("create {guild} {role:?} {required_rank}"));
            Ok(())
        }

        async fn delete(
            &self,
            guild: GuildId,
            role: &RoleRef,
            _responder: &dyn Responder,
        ) -> ServiceResult<()> {
            self.calls.push(format!("delete {guild} {role:?}"));
            match role {
                RoleRef::Name(name) => Err(ServiceError::missing(name.clone())),
                RoleRef::Id(_) => Ok(()),
            }
        }

        async fn view(&self, guild: GuildId, _responder: &dyn Responder) -> ServiceResult<()> {
            self.calls.push(format!("view {guild}"));
            Ok(())
        }
    }

    #[test]
    fn test_lock_scopes() {
        let actor = Identity::new(5, 2);
        let create = RankRoleCommand::Create {
            role: RoleRef::Id(RoleId(1)),
            required_rank: 10,
        };
        let delete = RankRoleCommand::Delete { role: "Veteran".into() };

        assert_eq!(create.lock_scope(actor, actor), LockScope::WriteAllUsers(GuildId(5)));
        assert_eq!(delete.lock_scope(actor, actor), LockScope::WriteAllUsers(GuildId(5)));
        assert_eq!(
            RankRoleCommand::View.lock_scope(actor, actor),
            LockScope::Read(LockKey::Guild(GuildId(5)))
        );
    }

    #[tokio::test]
    async fn test_router_propagates_service_errors() {
        let service = Arc::new(FakeRankRoles::default());
        let router = RankRoleRouter::new(Arc::clone(&service) as Arc<dyn RankRoleService>);
        let responder = Arc::new(CapturingResponder::default());

        let result = router
            .route(Action::new(
                Identity::new(5, 2),
                RankRoleCommand::Delete { role: "Veteran".into() },
                responder as _,
            ))
            .await;

        assert!(matches!(result, Err(ServiceError::Missing { .. })));
        assert_eq!(service.calls.take(), vec![r#"delete 5 Name("Veteran")"#]);
    }
}
