//! # Warden
//!
//! The command-dispatch core of a Discord community bot.
//!
//! ## Overview
//!
//! Every member command and gateway event becomes a message on the work
//! channel of its entity category. Each channel has exactly one consumer,
//! which takes the member or guild lock the message needs and then calls a
//! stateless domain service. Two updates to the same member never
//! interleave, even when they arrive through different channels.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     ┌──────────────────────┐     ┌───────────┐     ┌──────────────┐
//! │ command layer│────▶│ Dispatcher "pets"    │────▶│           │────▶│ PetService   │
//! │ gateway      │────▶│ Dispatcher "messages"│────▶│ KeyedLock │────▶│ XpService    │
//! │              │────▶│ Dispatcher ...       │────▶│ (shared)  │────▶│ ...          │
//! └──────────────┘     └──────────────────────┘     └───────────┘     └──────────────┘
//!                         bounded, one consumer        guild/member       replies via
//!                                                      reader-writer      Responder
//! ```
//!
//! - **Core**: work channels, keyed locks, responders, error sinks
//! - **Framework**: actions, per-domain commands, services and routers
//! - **Runtime**: configuration, logging and lifecycle
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use warden::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runtime = WardenRuntime::builder().services(my_services()).build()?;
//!     let dispatchers = runtime.dispatchers().clone();
//!     let token = runtime.token();
//!
//!     tokio::spawn(async move {
//!         let treat = Action::new(actor, PetCommand::Treat { pet }, responder);
//!         dispatchers.pets.write(treat, &token).await
//!     });
//!
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config`: TOML configuration files (default)
//! - `yaml-config`: YAML configuration files
//! - `json-log`: JSON log output

pub use warden_core as core;
pub use warden_framework as framework;
pub use warden_runtime as runtime;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use warden::prelude::*;
/// ```
pub mod prelude {
    // Runtime - main entry point
    pub use warden_runtime::{WardenConfig, WardenRuntime};

    // Identities and replies
    pub use warden_core::{
        CancellationToken, ChannelId, GuildId, Identity, InteractionResponder, PetId, Reply,
        Responder, RoleId, ServiceError, ServiceResult, TextCommandResponder, UserId,
        reply_channel,
    };

    // Dispatch
    pub use warden_core::{ErrorSink, FailureReport};
    pub use warden_framework::{Action, Dispatchers, RoleRef, Services};

    // Domain commands and services
    pub use warden_framework::{
        MessageEvent, PetCommand, PetService, PuzzleCommand, PuzzleService, RankRoleCommand,
        RankRoleService, SelfRoleCommand, SelfRoleService, StatsCommand, StatsService,
        VoiceStateEvent, XpService,
    };
}
