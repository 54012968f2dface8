//! Member statistics and the guild leaderboard.

use std::sync::Arc;

use async_trait::async_trait;
use warden_core::{GuildId, Identity, LockScope, Responder, ServiceResult};

use crate::action::{Action, ActionKind};
use crate::dispatch::Router;

/// Operations on member statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatsCommand {
    /// Show the target's stats.
    View,
    /// Show one page of the guild ranking. Pages start at 1.
    Leaderboard { page: u32 },
    /// Wipe the target's stats.
    Reset,
}

impl ActionKind for StatsCommand {
    fn name(&self) -> &'static str {
        match self {
            Self::View => "stats_view",
            Self::Leaderboard { .. } => "stats_leaderboard",
            Self::Reset => "stats_reset",
        }
    }

    fn lock_scope(&self, actor: Identity, target: Identity) -> LockScope {
        match self {
            Self::View => LockScope::Read(target.into()),
            // The ranking must not see half-applied member updates.
            Self::Leaderboard { .. } => LockScope::ReadAllUsers(actor.guild),
            Self::Reset => LockScope::Write(target.into()),
        }
    }
}

pub type StatsAction = Action<StatsCommand>;

/// Statistics queries and resets.
#[async_trait]
pub trait StatsService: Send + Sync + 'static {
    async fn view(&self, target: Identity, responder: &dyn Responder) -> ServiceResult<()>;

    async fn leaderboard(
        &self,
        guild: GuildId,
        page: u32,
        responder: &dyn Responder,
    ) -> ServiceResult<()>;

    async fn reset(&self, target: Identity, responder: &dyn Responder) -> ServiceResult<()>;
}

/// Routes [`StatsAction`]s to a [`StatsService`].
#[derive(Clone)]
pub struct StatsRouter {
    service: Arc<dyn StatsService>,
}

impl StatsRouter {
    pub fn new(service: Arc<dyn StatsService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Router<StatsAction> for StatsRouter {
    async fn route(&self, action: StatsAction) -> ServiceResult<()> {
        let target = action.target();
        let responder = action.responder().as_ref();
        match action.kind() {
            StatsCommand::View => self.service.view(target, responder).await,
            StatsCommand::Leaderboard { page } => {
                self.service
                    .leaderboard(action.actor().guild, *page, responder)
                    .await
            }
            StatsCommand::Reset => self.service.reset(target, responder).await,
        }
    }
}
