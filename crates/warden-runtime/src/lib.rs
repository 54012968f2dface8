//! Warden Runtime - Orchestration layer for the Warden bot.
//!
//! This crate provides:
//! - Layered configuration loading and validation (`config`)
//! - Logging setup driven by that configuration (`logging`)
//! - The process lifecycle (`WardenRuntime`): building every dispatcher,
//!   starting consumers, draining and cancelling on shutdown
//!
//! ```ignore
//! use warden_runtime::WardenRuntime;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runtime = WardenRuntime::builder()
//!         .xp(MyXp::new())
//!         .pets(MyPets::new())
//!         .puzzles(MyPuzzles::new())
//!         .rank_roles(MyRankRoles::new())
//!         .self_roles(MySelfRoles::new())
//!         .stats(MyStats::new())
//!         .build()?;
//!
//!     gateway::spawn(runtime.dispatchers().clone(), runtime.token());
//!
//!     // Run until Ctrl+C
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;

// Re-exports
pub use config::{ConfigError, ConfigLoader, ConfigResult, Profile, WardenConfig};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use runtime::{RuntimeBuilder, WardenRuntime};

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Prelude module for convenient imports.
///
/// This provides all the commonly used logging macros:
/// - `trace!`, `debug!`, `info!`, `warn!`, `error!`
/// - `span`, `event`
/// - `instrument` attribute
/// - `Level` for span creation
pub mod prelude {
    pub use tracing::{Level, debug, error, event, info, instrument, span, trace, warn};
}
