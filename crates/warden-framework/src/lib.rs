//! # Warden Framework
//!
//! Domain dispatch for the Warden bot.
//!
//! This layer provides:
//! - The [`Action`] envelope every command travels in
//! - One command enum, service trait and router per domain (pets, puzzle,
//!   rank roles, self roles, stats, xp)
//! - The generic locking [`Dispatcher`], the only place entity locks are taken
//! - The [`Dispatchers`] bundle wiring every domain to one shared lock table
//!
//! Domain services are implemented elsewhere; they are called one message
//! at a time per channel, with the right member or guild lock already held.

pub mod action;
pub mod dispatch;
pub mod dispatchers;
pub mod pets;
pub mod puzzle;
pub mod rank_roles;
pub mod self_roles;
pub mod stats;
pub mod xp;

pub use action::{Action, ActionKind, RoleRef};
pub use dispatch::{Dispatcher, Routable, Router};
pub use dispatchers::{DispatcherOptions, Dispatchers, LABELS, Services};
pub use pets::{PetAction, PetCommand, PetRouter, PetService};
pub use puzzle::{PuzzleAction, PuzzleCommand, PuzzleRouter, PuzzleService};
pub use rank_roles::{RankRoleAction, RankRoleCommand, RankRoleRouter, RankRoleService};
pub use self_roles::{SelfRoleAction, SelfRoleCommand, SelfRoleRouter, SelfRoleService};
pub use stats::{StatsAction, StatsCommand, StatsRouter, StatsService};
pub use xp::{MessageEvent, MessageRouter, VoiceStateEvent, VoiceStateRouter, XpService};
