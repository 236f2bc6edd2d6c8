//! # Host Server Interface
//!
//! The single seam between the orchestration library and the actual game
//! server. The orchestrator never talks to the host directly; everything it
//! needs - player operations, world lifecycle, shutdown status - goes through
//! [`HostServer`], handed around as `Arc<dyn HostServer>`.
//!
//! Implementations are expected to be cheap to call from the tick loop.
//! The only intentionally blocking operation is [`HostServer::delete_world_storage`],
//! which the orchestrator dispatches to a blocking worker except during
//! shutdown.

use crate::types::{GameMode, Location, PlayerId, TeleportReason, WorldId};
use async_trait::async_trait;
use std::path::Path;

/// Errors surfaced by host operations.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    /// The target player is not connected.
    #[error("Player {0} is offline")]
    PlayerOffline(PlayerId),
    /// The target world is not loaded.
    #[error("World {0} is not loaded")]
    WorldNotLoaded(WorldId),
    /// Filesystem failure during world storage management.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Any other backend-specific failure.
    #[error("Host backend error: {0}")]
    Backend(String),
}

/// Capabilities the orchestrator consumes from the host game server.
///
/// # Design Principles
///
/// - **Minimal Interface**: only what match orchestration actually needs
/// - **Async Support**: every potentially remote operation is async
/// - **Tagged Teleports**: teleports carry a [`TeleportReason`] so the host's
///   teleport review can distinguish orchestrator-issued moves from player
///   ones without shared mutable flags
#[async_trait]
pub trait HostServer: Send + Sync {
    /// Whether the host process is currently shutting down.
    ///
    /// While this returns `true`, background scheduling is unavailable and
    /// world teardown must run synchronously.
    fn is_shutting_down(&self) -> bool;

    /// Whether the player is currently connected.
    async fn is_online(&self, player: PlayerId) -> bool;

    /// Whether the player holds elevated operator privilege.
    async fn is_operator(&self, player: PlayerId) -> bool;

    /// Whether the player holds the named permission.
    async fn has_permission(&self, player: PlayerId, permission: &str) -> bool;

    /// All currently connected players, server-wide.
    async fn online_players(&self) -> Vec<PlayerId>;

    /// The player's current location, if connected.
    async fn player_location(&self, player: PlayerId) -> Option<Location>;

    /// Moves the player, tagging the request with why it is happening.
    async fn teleport(
        &self,
        player: PlayerId,
        location: Location,
        reason: TeleportReason,
    ) -> Result<(), HostError>;

    /// The player's current game mode, if connected.
    async fn game_mode(&self, player: PlayerId) -> Option<GameMode>;

    async fn set_game_mode(&self, player: PlayerId, mode: GameMode) -> Result<(), HostError>;

    /// The player's current health, if connected.
    async fn health(&self, player: PlayerId) -> Option<f64>;

    /// The player's configured maximum health.
    async fn max_health(&self, player: PlayerId) -> f64;

    async fn set_health(&self, player: PlayerId, health: f64) -> Result<(), HostError>;

    /// Sends a plain chat message to the player.
    async fn send_message(&self, player: PlayerId, message: &str);

    /// Sends a title/subtitle overlay with fade timings in ticks.
    async fn send_title(
        &self,
        player: PlayerId,
        title: &str,
        subtitle: &str,
        fade_in: u32,
        stay: u32,
        fade_out: u32,
    );

    /// Creates and loads a world from the named generator specification.
    async fn create_world(&self, name: &str, generator: &str) -> Result<WorldId, HostError>;

    /// Whether the world is currently loaded.
    async fn world_exists(&self, world: WorldId) -> bool;

    /// Unloads a world, optionally saving it first.
    async fn unload_world(&self, world: WorldId, save: bool) -> Result<(), HostError>;

    /// Permanently deletes a world's backing storage. Blocking; only call
    /// after [`HostServer::unload_world`] has succeeded for that world.
    fn delete_world_storage(&self, path: &Path) -> Result<(), HostError>;
}
