//! The full set of per-category dispatchers.
//!
//! [`Dispatchers`] wires every domain router to its own channel, all of them
//! sharing one [`KeyedLock`]. Sharing the lock table is what serializes two
//! commands for the same member that arrive on different channels.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};
use warden_core::{BoxedErrorSink, CancellationToken, DEFAULT_CAPACITY, KeyedLock};

use crate::dispatch::Dispatcher;
use crate::pets::{PetAction, PetRouter, PetService};
use crate::puzzle::{PuzzleAction, PuzzleRouter, PuzzleService};
use crate::rank_roles::{RankRoleAction, RankRoleRouter, RankRoleService};
use crate::self_roles::{SelfRoleAction, SelfRoleRouter, SelfRoleService};
use crate::stats::{StatsAction, StatsRouter, StatsService};
use crate::xp::{MessageEvent, MessageRouter, VoiceStateEvent, VoiceStateRouter, XpService};

/// Channel labels, in the order channels are started.
pub const LABELS: [&str; 7] = [
    "messages",
    "voice_states",
    "pets",
    "puzzles",
    "rank_roles",
    "self_roles",
    "stats",
];

/// The domain services every dispatcher routes to.
#[derive(Clone)]
pub struct Services {
    pub xp: Arc<dyn XpService>,
    pub pets: Arc<dyn PetService>,
    pub puzzles: Arc<dyn PuzzleService>,
    pub rank_roles: Arc<dyn RankRoleService>,
    pub self_roles: Arc<dyn SelfRoleService>,
    pub stats: Arc<dyn StatsService>,
}

/// Channel sizing.
#[derive(Debug, Clone)]
pub struct DispatcherOptions {
    /// Capacity used by every channel without an override.
    pub default_capacity: usize,
    /// Per-label capacity overrides.
    pub capacities: HashMap<String, usize>,
}

impl Default for DispatcherOptions {
    fn default() -> Self {
        Self {
            default_capacity: DEFAULT_CAPACITY,
            capacities: HashMap::new(),
        }
    }
}

impl DispatcherOptions {
    /// Overrides the capacity of one channel.
    pub fn with_capacity(mut self, label: impl Into<String>, capacity: usize) -> Self {
        self.capacities.insert(label.into(), capacity);
        self
    }

    /// Returns the capacity for `label`, never less than one.
    pub fn capacity_for(&self, label: &str) -> usize {
        let capacity = self
            .capacities
            .get(label)
            .copied()
            .unwrap_or(self.default_capacity);
        if capacity == 0 {
            warn!(channel = label, "Zero channel capacity requested, using 1");
        }
        capacity.max(1)
    }
}

/// Producers' entry points, one dispatcher per entity category.
pub struct Dispatchers {
    pub messages: Dispatcher<MessageEvent>,
    pub voice_states: Dispatcher<VoiceStateEvent>,
    pub pets: Dispatcher<PetAction>,
    pub puzzles: Dispatcher<PuzzleAction>,
    pub rank_roles: Dispatcher<RankRoleAction>,
    pub self_roles: Dispatcher<SelfRoleAction>,
    pub stats: Dispatcher<StatsAction>,
    locks: Arc<KeyedLock>,
}

impl Dispatchers {
    /// Builds every dispatcher around a fresh lock table.
    pub fn new(services: Services, options: &DispatcherOptions, sink: BoxedErrorSink) -> Self {
        Self::with_locks(services, options, sink, Arc::new(KeyedLock::new()))
    }

    /// Builds every dispatcher around an existing lock table.
    pub fn with_locks(
        services: Services,
        options: &DispatcherOptions,
        sink: BoxedErrorSink,
        locks: Arc<KeyedLock>,
    ) -> Self {
        macro_rules! dispatcher {
            ($label:literal, $router:expr) => {
                Dispatcher::new(
                    $label,
                    options.capacity_for($label),
                    $router,
                    Arc::clone(&locks),
                    Arc::clone(&sink),
                )
            };
        }

        let dispatchers = Self {
            messages: dispatcher!("messages", MessageRouter::new(Arc::clone(&services.xp))),
            voice_states: dispatcher!("voice_states", VoiceStateRouter::new(services.xp)),
            pets: dispatcher!("pets", PetRouter::new(services.pets)),
            puzzles: dispatcher!("puzzles", PuzzleRouter::new(services.puzzles)),
            rank_roles: dispatcher!("rank_roles", RankRoleRouter::new(services.rank_roles)),
            self_roles: dispatcher!("self_roles", SelfRoleRouter::new(services.self_roles)),
            stats: dispatcher!("stats", StatsRouter::new(services.stats)),
            locks,
        };
        debug!(channels = LABELS.len(), "Dispatchers built");
        dispatchers
    }

    /// Starts every consumer with a clone of `token`. Returns how many were
    /// started by this call; already running consumers are left alone.
    pub fn start_all(&self, token: &CancellationToken) -> usize {
        let started = [
            self.messages.start(token.clone()),
            self.voice_states.start(token.clone()),
            self.pets.start(token.clone()),
            self.puzzles.start(token.clone()),
            self.rank_roles.start(token.clone()),
            self.self_roles.start(token.clone()),
            self.stats.start(token.clone()),
        ]
        .into_iter()
        .filter(|started| *started)
        .count();

        info!(started, "Dispatchers started");
        started
    }

    /// Stops accepting writes on every channel. Queued work still drains.
    pub fn close_all(&self) {
        self.messages.close();
        self.voice_states.close();
        self.pets.close();
        self.puzzles.close();
        self.rank_roles.close();
        self.self_roles.close();
        self.stats.close();
    }

    /// Waits for every consumer to exit.
    pub async fn join_all(&self) {
        tokio::join!(
            self.messages.join(),
            self.voice_states.join(),
            self.pets.join(),
            self.puzzles.join(),
            self.rank_roles.join(),
            self.self_roles.join(),
            self.stats.join(),
        );
    }

    /// Number of queued, not yet consumed messages across all channels.
    pub fn pending(&self) -> usize {
        self.messages.channel().len()
            + self.voice_states.channel().len()
            + self.pets.channel().len()
            + self.puzzles.channel().len()
            + self.rank_roles.channel().len()
            + self.self_roles.channel().len()
            + self.stats.channel().len()
    }

    /// Returns the shared lock table.
    pub fn locks(&self) -> &Arc<KeyedLock> {
        &self.locks
    }
}

impl fmt::Debug for Dispatchers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatchers")
            .field("messages", &self.messages)
            .field("voice_states", &self.voice_states)
            .field("pets", &self.pets)
            .field("puzzles", &self.puzzles)
            .field("rank_roles", &self.rank_roles)
            .field("self_roles", &self.self_roles)
            .field("stats", &self.stats)
            .finish()
    }
}
