//! # Arena Core
//!
//! Match-instance orchestration for plugin authors building minigames on a
//! multiplayer game server. The crate turns a raw host server into managed
//! match arenas: admission under capacity and permission rules, a countdown
//! into the live match, watchdog containment of everyone inside the region,
//! world protection, and a teardown path that restores every participant and
//! releases disposable worlds.
//!
//! ## Architecture
//!
//! - [`MatchOrchestrator`] owns all process-wide state (instances,
//!   participants, protection) and is the integration surface for the host's
//!   event pipeline.
//! - [`MatchInstance`] is one live arena walking the
//!   `Waiting -> Starting -> Ongoing -> Completed*` lifecycle exactly once.
//! - [`MatchPlayer`] is one player's membership and the restoration record
//!   used when they leave.
//! - [`ProtectionRegistry`] filters environment and damage events against the
//!   protected-world sets.
//!
//! The host side of the seam lives in [`arena_event_system`]: the
//! [`HostServer`](arena_event_system::HostServer) trait, shared ID and
//! location types, and the cancellable notice bus.
//!
//! ## Quick Start
//!
//! ```no_run
//! use arena_core::{MatchConfiguration, MatchOrchestrator, RegionBinding};
//! use arena_event_system::{HostServer, Location, PlayerId, RegionBounds, WorldId};
//! use std::sync::Arc;
//!
//! # async fn example(host: Arc<dyn HostServer>, world: WorldId, player: PlayerId) {
//! let orchestrator = MatchOrchestrator::new(host);
//! let config = MatchConfiguration::builder()
//!     .min_players(2)
//!     .max_players(8)
//!     .start_location(Location::new(world, 0.0, 64.0, 0.0))
//!     .build();
//! let bounds = RegionBounds::new(-64.0, 0.0, -64.0, 64.0, 128.0, 64.0);
//! let arena = orchestrator.create_match(config, RegionBinding::Bounds { world, bounds });
//! arena.start().await;
//! arena.add_new_player(player).await.ok();
//! # }
//! ```

pub mod config;
pub mod error;
pub mod instance;
pub mod logging;
pub mod orchestrator;
pub mod player;
pub mod protection;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::{MatchConfiguration, MatchConfigurationBuilder, MatchMessages};
pub use error::AdmissionError;
pub use instance::{InstanceState, MatchInstance, RegionBinding};
pub use logging::{setup_logging, setup_logging_with_format};
pub use orchestrator::MatchOrchestrator;
pub use player::{MatchPlayer, ParticipantKind, ParticipantRegistry};
pub use protection::{
    DamageEvent, DamageSource, EnvironmentAction, EnvironmentEvent, ProtectionRegistry,
};

pub use arena_event_system;
