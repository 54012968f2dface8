//! Runtime orchestration: configuration, dispatchers and lifecycle.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use warden_runtime::WardenRuntime;
//!
//! let runtime = WardenRuntime::builder()
//!     .profile("production")
//!     .services(services)
//!     .build()?;
//!
//! // Hand `runtime.dispatchers()` to the gateway and command layers, then:
//! runtime.run().await?;
//! ```

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::signal;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use warden_core::{
    BoxedErrorSink, CancellationToken, ErrorSink, ReplyingErrorSink, TracingErrorSink,
};
use warden_framework::{
    Dispatchers, PetService, PuzzleService, RankRoleService, SelfRoleService, Services,
    StatsService, XpService,
};

use crate::config::{ConfigLoader, WardenConfig, validate_config};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging;

/// Owns the dispatchers and the process-wide cancellation token.
pub struct WardenRuntime {
    config: WardenConfig,
    dispatchers: Arc<Dispatchers>,
    token: CancellationToken,
    running: AtomicBool,
}

impl WardenRuntime {
    /// Creates a runtime builder.
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Creates a runtime from an already validated configuration.
    ///
    /// Without a custom sink, failures are logged and the requester gets a
    /// generic error reply.
    pub fn from_config(
        config: WardenConfig,
        services: Services,
        sink: Option<BoxedErrorSink>,
    ) -> Self {
        let sink = sink.unwrap_or_else(|| Arc::new(ReplyingErrorSink::new(TracingErrorSink)));
        let dispatchers = Dispatchers::new(services, &config.channels.to_options(), sink);

        info!(
            log_level = %config.logging.level,
            capacity = config.channels.capacity,
            grace_period_ms = config.shutdown.grace_period_ms,
            prune_interval_ms = config.locks.prune_interval_ms,
            "Runtime initialized from configuration"
        );

        Self {
            config,
            dispatchers: Arc::new(dispatchers),
            token: CancellationToken::new(),
            running: AtomicBool::new(false),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &WardenConfig {
        &self.config
    }

    /// Returns the producers' entry points.
    pub fn dispatchers(&self) -> &Arc<Dispatchers> {
        &self.dispatchers
    }

    /// Returns a token that fires when the runtime is cancelled.
    ///
    /// Producers pass it to `write` so they stop waiting on a full channel
    /// once shutdown gives up draining.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Returns whether the runtime is currently running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Starts every channel consumer. Calling it again has no effect.
    pub fn start(&self) {
        if self.running.swap(true, Ordering::AcqRel) {
            warn!("Runtime is already running");
            return;
        }

        info!("Starting Warden runtime");
        let started = self.dispatchers.start_all(&self.token);
        self.spawn_lock_pruner();
        debug!(started, "Runtime started");
    }

    /// Periodically drops lock entries of members and guilds nobody holds,
    /// until the runtime token fires.
    fn spawn_lock_pruner(&self) {
        let locks = Arc::clone(self.dispatchers.locks());
        let token = self.token.clone();
        let period = self.config.locks.prune_interval();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    biased;
                    () = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let removed = locks.prune_idle();
                        if removed > 0 {
                            debug!(removed, guilds = locks.guild_count(), "Pruned idle lock entries");
                        }
                    }
                }
            }
            debug!("Lock pruner stopped");
        });
    }

    /// Stops accepting work, lets queued work drain for the configured
    /// grace period, then cancels whatever is left and waits for every
    /// consumer to exit.
    pub async fn shutdown(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            debug!("Runtime is not running");
        }

        info!("Stopping Warden runtime");
        self.dispatchers.close_all();

        let grace = self.config.shutdown.grace_period();
        if tokio::time::timeout(grace, self.dispatchers.join_all())
            .await
            .is_err()
        {
            warn!(
                grace_period_ms = self.config.shutdown.grace_period_ms,
                abandoned = self.dispatchers.pending(),
                "Grace period elapsed, cancelling remaining work"
            );
            self.token.cancel();
            self.dispatchers.join_all().await;
        }

        self.token.cancel();
        info!("Runtime stopped");
    }

    /// Runs the runtime until Ctrl+C or SIGTERM.
    pub async fn run(&self) -> RuntimeResult<()> {
        self.start();

        info!("Warden runtime is now running. Press Ctrl+C to stop.");
        let result = wait_for_shutdown().await;

        self.shutdown().await;
        result
    }

    /// Runs the runtime until `shutdown` completes.
    pub async fn run_until<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        self.start();
        shutdown.await;
        self.shutdown().await;
    }
}

impl std::fmt::Debug for WardenRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WardenRuntime")
            .field("running", &self.is_running())
            .field("dispatchers", &self.dispatchers)
            .finish()
    }
}

/// Waits for shutdown signals (Ctrl+C or SIGTERM).
async fn wait_for_shutdown() -> RuntimeResult<()> {
    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;

        tokio::select! {
            result = signal::ctrl_c() => {
                result?;
                info!("Received Ctrl+C, shutting down");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await?;
        info!("Received Ctrl+C, shutting down");
    }

    Ok(())
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for creating a [`WardenRuntime`].
///
/// All six domain services are required. Configuration is loaded through a
/// [`ConfigLoader`] unless one is supplied with [`config`](Self::config).
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
    config: Option<WardenConfig>,
    xp: Option<Arc<dyn XpService>>,
    pets: Option<Arc<dyn PetService>>,
    puzzles: Option<Arc<dyn PuzzleService>>,
    rank_roles: Option<Arc<dyn RankRoleService>>,
    self_roles: Option<Arc<dyn SelfRoleService>>,
    stats: Option<Arc<dyn StatsService>>,
    sink: Option<BoxedErrorSink>,
    init_logging: bool,
}

impl RuntimeBuilder {
    /// Creates a new runtime builder.
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new().with_current_dir().with_user_config_dir(),
            config: None,
            xp: None,
            pets: None,
            puzzles: None,
            rank_roles: None,
            self_roles: None,
            stats: None,
            sink: None,
            init_logging: true,
        }
    }

    /// Sets a specific configuration file to load.
    pub fn config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    /// Sets the configuration profile (e.g., "development", "production").
    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    /// Adds a search path for configuration files.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    /// Enables loading environment variables (enabled by default).
    pub fn with_env(mut self) -> Self {
        self.config_loader = self.config_loader.with_env();
        self
    }

    /// Disables loading environment variables.
    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    /// Merges additional configuration programmatically.
    pub fn merge(mut self, config: WardenConfig) -> Self {
        self.config_loader = self.config_loader.merge(config);
        self
    }

    /// Uses `config` as is, skipping every configuration source.
    pub fn config(mut self, config: WardenConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Leaves global logging setup to the caller.
    pub fn without_logging(mut self) -> Self {
        self.init_logging = false;
        self
    }

    /// Sets every domain service at once.
    pub fn services(mut self, services: Services) -> Self {
        self.xp = Some(services.xp);
        self.pets = Some(services.pets);
        self.puzzles = Some(services.puzzles);
        self.rank_roles = Some(services.rank_roles);
        self.self_roles = Some(services.self_roles);
        self.stats = Some(services.stats);
        self
    }

    pub fn xp(mut self, service: impl XpService) -> Self {
        self.xp = Some(Arc::new(service));
        self
    }

    pub fn pets(mut self, service: impl PetService) -> Self {
        self.pets = Some(Arc::new(service));
        self
    }

    pub fn puzzles(mut self, service: impl PuzzleService) -> Self {
        self.puzzles = Some(Arc::new(service));
        self
    }

    pub fn rank_roles(mut self, service: impl RankRoleService) -> Self {
        self.rank_roles = Some(Arc::new(service));
        self
    }

    pub fn self_roles(mut self, service: impl SelfRoleService) -> Self {
        self.self_roles = Some(Arc::new(service));
        self
    }

    pub fn stats(mut self, service: impl StatsService) -> Self {
        self.stats = Some(Arc::new(service));
        self
    }

    /// Replaces the default error sink.
    pub fn error_sink(mut self, sink: impl ErrorSink) -> Self {
        self.sink = Some(Arc::new(sink));
        self
    }

    /// Loads configuration, initializes logging and builds the runtime.
    pub fn build(self) -> RuntimeResult<WardenRuntime> {
        let config = match self.config {
            Some(config) => {
                validate_config(&config)?;
                config
            }
            None => self.config_loader.load()?,
        };

        if self.init_logging {
            logging::init_from_config(&config.logging);
        }

        let services = Services {
            xp: self.xp.ok_or(RuntimeError::MissingService("xp"))?,
            pets: self.pets.ok_or(RuntimeError::MissingService("pets"))?,
            puzzles: self.puzzles.ok_or(RuntimeError::MissingService("puzzles"))?,
            rank_roles: self
                .rank_roles
                .ok_or(RuntimeError::MissingService("rank_roles"))?,
            self_roles: self
                .self_roles
                .ok_or(RuntimeError::MissingService("self_roles"))?,
            stats: self.stats.ok_or(RuntimeError::MissingService("stats"))?,
        };

        Ok(WardenRuntime::from_config(config, services, self.sink))
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
