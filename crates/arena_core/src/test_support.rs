//! In-memory [`HostServer`] used by the crate's tests.
//!
//! Backed by `DashMap`s for queryable state and recording vectors for side
//! effects, so tests can both script the world and assert exactly what the
//! orchestrator asked the host to do.

use arena_event_system::{GameMode, HostError, HostServer, Location, PlayerId, TeleportReason, WorldId};
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

pub(crate) struct TestHost {
    shutting_down: AtomicBool,
    online: DashSet<PlayerId>,
    operators: DashSet<PlayerId>,
    permissions: DashMap<PlayerId, Vec<String>>,
    locations: DashMap<PlayerId, Location>,
    game_modes: DashMap<PlayerId, GameMode>,
    healths: DashMap<PlayerId, f64>,
    worlds: DashSet<WorldId>,
    teleports: Mutex<Vec<(PlayerId, Location, TeleportReason)>>,
    messages: Mutex<Vec<(PlayerId, String)>>,
    titles: Mutex<Vec<(PlayerId, String, String)>>,
    unloaded_worlds: Mutex<Vec<WorldId>>,
    deleted_paths: Mutex<Vec<PathBuf>>,
}

impl TestHost {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            shutting_down: AtomicBool::new(false),
            online: DashSet::new(),
            operators: DashSet::new(),
            permissions: DashMap::new(),
            locations: DashMap::new(),
            game_modes: DashMap::new(),
            healths: DashMap::new(),
            worlds: DashSet::new(),
            teleports: Mutex::new(Vec::new()),
            messages: Mutex::new(Vec::new()),
            titles: Mutex::new(Vec::new()),
            unloaded_worlds: Mutex::new(Vec::new()),
            deleted_paths: Mutex::new(Vec::new()),
        })
    }

    /// Connects a player at the given location in survival mode at full
    /// health.
    pub(crate) fn connect(&self, player: PlayerId, location: Location) {
        self.online.insert(player);
        self.locations.insert(player, location);
        self.game_modes.insert(player, GameMode::Survival);
        self.healths.insert(player, 20.0);
    }

    pub(crate) fn disconnect(&self, player: PlayerId) {
        self.online.remove(&player);
        self.locations.remove(&player);
    }

    pub(crate) fn make_operator(&self, player: PlayerId) {
        self.operators.insert(player);
    }

    pub(crate) fn grant(&self, player: PlayerId, permission: &str) {
        self.permissions
            .entry(player)
            .or_default()
            .push(permission.to_string());
    }

    pub(crate) fn place(&self, player: PlayerId, location: Location) {
        self.locations.insert(player, location);
    }

    pub(crate) fn add_world(&self, world: WorldId) {
        self.worlds.insert(world);
    }

    pub(crate) fn begin_shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
    }

    pub(crate) fn recorded_game_mode(&self, player: PlayerId) -> Option<GameMode> {
        self.game_modes.get(&player).map(|mode| *mode)
    }

    pub(crate) fn recorded_teleports(&self, player: PlayerId) -> Vec<(Location, TeleportReason)> {
        self.teleports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(who, _, _)| *who == player)
            .map(|(_, location, reason)| (*location, *reason))
            .collect()
    }

    pub(crate) fn recorded_messages(&self, player: PlayerId) -> Vec<String> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(who, _)| *who == player)
            .map(|(_, message)| message.clone())
            .collect()
    }

    pub(crate) fn recorded_titles(&self, player: PlayerId) -> Vec<(String, String)> {
        self.titles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(who, _, _)| *who == player)
            .map(|(_, title, subtitle)| (title.clone(), subtitle.clone()))
            .collect()
    }

    pub(crate) fn recorded_unloads(&self) -> Vec<WorldId> {
        self.unloaded_worlds
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn recorded_deletions(&self) -> Vec<PathBuf> {
        self.deleted_paths
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl HostServer for TestHost {
    fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    async fn is_online(&self, player: PlayerId) -> bool {
        self.online.contains(&player)
    }

    async fn is_operator(&self, player: PlayerId) -> bool {
        self.operators.contains(&player)
    }

    async fn has_permission(&self, player: PlayerId, permission: &str) -> bool {
        self.permissions
            .get(&player)
            .map(|held| held.iter().any(|p| p == permission))
            .unwrap_or(false)
    }

    async fn online_players(&self) -> Vec<PlayerId> {
        self.online.iter().map(|entry| *entry).collect()
    }

    async fn player_location(&self, player: PlayerId) -> Option<Location> {
        self.locations.get(&player).map(|location| *location)
    }

    async fn teleport(
        &self,
        player: PlayerId,
        location: Location,
        reason: TeleportReason,
    ) -> Result<(), HostError> {
        if !self.online.contains(&player) {
            return Err(HostError::PlayerOffline(player));
        }
        self.locations.insert(player, location);
        self.teleports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((player, location, reason));
        Ok(())
    }

    async fn game_mode(&self, player: PlayerId) -> Option<GameMode> {
        self.game_modes.get(&player).map(|mode| *mode)
    }

    async fn set_game_mode(&self, player: PlayerId, mode: GameMode) -> Result<(), HostError> {
        if !self.online.contains(&player) {
            return Err(HostError::PlayerOffline(player));
        }
        self.game_modes.insert(player, mode);
        Ok(())
    }

    async fn health(&self, player: PlayerId) -> Option<f64> {
        if !self.online.contains(&player) {
            return None;
        }
        self.healths.get(&player).map(|health| *health)
    }

    async fn max_health(&self, _player: PlayerId) -> f64 {
        20.0
    }

    async fn set_health(&self, player: PlayerId, health: f64) -> Result<(), HostError> {
        if !self.online.contains(&player) {
            return Err(HostError::PlayerOffline(player));
        }
        self.healths.insert(player, health);
        Ok(())
    }

    async fn send_message(&self, player: PlayerId, message: &str) {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((player, message.to_string()));
    }

    async fn send_title(
        &self,
        player: PlayerId,
        title: &str,
        subtitle: &str,
        _fade_in: u32,
        _stay: u32,
        _fade_out: u32,
    ) {
        self.titles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((player, title.to_string(), subtitle.to_string()));
    }

    async fn create_world(&self, _name: &str, _generator: &str) -> Result<WorldId, HostError> {
        let world = WorldId::new();
        self.worlds.insert(world);
        Ok(world)
    }

    async fn world_exists(&self, world: WorldId) -> bool {
        self.worlds.contains(&world)
    }

    async fn unload_world(&self, world: WorldId, _save: bool) -> Result<(), HostError> {
        self.worlds.remove(&world);
        self.unloaded_worlds
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(world);
        Ok(())
    }

    fn delete_world_storage(&self, path: &Path) -> Result<(), HostError> {
        if path.exists() {
            std::fs::remove_dir_all(path)?;
        }
        self.deleted_paths
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(path.to_path_buf());
        Ok(())
    }
}
