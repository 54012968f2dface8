//! Daily puzzle: viewing, answering and asking for hints.
//!
//! Puzzle progress is always the actor's own, so every kind locks the actor
//! rather than the target.

use std::sync::Arc;

use async_trait::async_trait;
use warden_core::{Identity, LockScope, Responder, ServiceResult};

use crate::action::{Action, ActionKind};
use crate::dispatch::Router;

/// Operations on a member's puzzle progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PuzzleCommand {
    View,
    Answer { given_answer: String },
    Hint,
}

impl ActionKind for PuzzleCommand {
    fn name(&self) -> &'static str {
        match self {
            Self::View => "puzzle_view",
            Self::Answer { .. } => "puzzle_answer",
            Self::Hint => "puzzle_hint",
        }
    }

    fn lock_scope(&self, actor: Identity, _target: Identity) -> LockScope {
        match self {
            Self::View | Self::Hint => LockScope::Read(actor.into()),
            Self::Answer { .. } => LockScope::Write(actor.into()),
        }
    }
}

pub type PuzzleAction = Action<PuzzleCommand>;

/// Puzzle state and replies.
#[async_trait]
pub trait PuzzleService: Send + Sync + 'static {
    async fn view(&self, actor: Identity, responder: &dyn Responder) -> ServiceResult<()>;

    /// Checks an answer. A wrong answer is a normal reply, not an error.
    async fn answer(
        &self,
        actor: Identity,
        given_answer: &str,
        responder: &dyn Responder,
    ) -> ServiceResult<()>;

    async fn hint(&self, actor: Identity, responder: &dyn Responder) -> ServiceResult<()>;
}

/// Routes [`PuzzleAction`]s to a [`PuzzleService`].
#[derive(Clone)]
pub struct PuzzleRouter {
    service: Arc<dyn PuzzleService>,
}

impl PuzzleRouter {
    pub fn new(service: Arc<dyn PuzzleService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Router<PuzzleAction> for PuzzleRouter {
    async fn route(&self, action: PuzzleAction) -> ServiceResult<()> {
        let actor = action.actor();
        let responder = action.responder().as_ref();
        match action.kind() {
            PuzzleCommand::View => self.service.view(actor, responder).await,
            PuzzleCommand::Answer { given_answer } => {
                self.service.answer(actor, given_answer, responder).await
            }
            PuzzleCommand::Hint => self.service.hint(actor, responder).await,
        }
    }
}
