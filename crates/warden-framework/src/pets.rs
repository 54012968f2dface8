//! Pets: adopting, treating, renaming and releasing a member's pets.

use std::sync::Arc;

use async_trait::async_trait;
use warden_core::{Identity, LockScope, PetId, Responder, ServiceResult};

use crate::action::{Action, ActionKind};
use crate::dispatch::Router;

/// Operations on a member's pets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PetCommand {
    /// Show the target's pets.
    View,
    /// Adopt a new pet.
    Adopt,
    /// Give one pet a treat.
    Treat { pet: PetId },
    /// Open the management view for one pet.
    ManageOne { pet: PetId },
    /// Give one pet a new name.
    Rename { pet: PetId, name: String },
    /// Let one pet go.
    Release { pet: PetId },
}

impl ActionKind for PetCommand {
    fn name(&self) -> &'static str {
        match self {
            Self::View => "pet_view",
            Self::Adopt => "pet_adopt",
            Self::Treat { .. } => "pet_treat",
            Self::ManageOne { .. } => "pet_manage_one",
            Self::Rename { .. } => "pet_rename",
            Self::Release { .. } => "pet_release",
        }
    }

    fn lock_scope(&self, _actor: Identity, target: Identity) -> LockScope {
        match self {
            Self::View => LockScope::Read(target.into()),
            _ => LockScope::Write(target.into()),
        }
    }
}

/// A pet command in its envelope.
pub type PetAction = Action<PetCommand>;

/// Pet storage and replies. Called with the member lock already held.
#[async_trait]
pub trait PetService: Send + Sync + 'static {
    async fn view(&self, target: Identity, responder: &dyn Responder) -> ServiceResult<()>;

    async fn adopt(&self, target: Identity, responder: &dyn Responder) -> ServiceResult<()>;

    async fn treat(
        &self,
        target: Identity,
        pet: PetId,
        responder: &dyn Responder,
    ) -> ServiceResult<()>;

    async fn manage_one(
        &self,
        target: Identity,
        pet: PetId,
        responder: &dyn Responder,
    ) -> ServiceResult<()>;

    async fn rename(
        &self,
        target: Identity,
        pet: PetId,
        name: &str,
        responder: &dyn Responder,
    ) -> ServiceResult<()>;

    async fn release(
        &self,
        target: Identity,
        pet: PetId,
        responder: &dyn Responder,
    ) -> ServiceResult<()>;
}

/// Routes [`PetAction`]s to a [`PetService`].
#[derive(Clone)]
pub struct PetRouter {
    service: Arc<dyn PetService>,
}

impl PetRouter {
    pub fn new(service: Arc<dyn PetService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Router<PetAction> for PetRouter {
    async fn route(&self, action: PetAction) -> ServiceResult<()> {
        let target = action.target();
        let responder = action.responder().as_ref();
        match action.kind() {
            PetCommand::View => self.service.view(target, responder).await,
            PetCommand::Adopt => self.service.adopt(target, responder).await,
            PetCommand::Treat { pet } => self.service.treat(target, *pet, responder).await,
            PetCommand::ManageOne { pet } => {
                self.service.manage_one(target, *pet, responder).await
            }
            PetCommand::Rename { pet, name } => {
                self.service.rename(target, *pet, name, responder).await
            }
            PetCommand::Release { pet } => self.service.release(target, *pet, responder).await,
        }
    }
}
