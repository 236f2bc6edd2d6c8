//! # Match Players
//!
//! One [`MatchPlayer`] represents one player's participation in one match:
//! what to restore when they leave (location, game mode, health), how many
//! lives they have left, and whether they are playing or spectating.
//!
//! [`MatchPlayer::remove`] is the single exit path for every way of leaving
//! a match - voluntary leave, disconnect cleanup, death with no lives left,
//! and teardown eviction all funnel through it. It is idempotent: the second
//! call finds the player in neither membership set and does nothing.

use crate::instance::MatchInstance;
use arena_event_system::{
    GameMode, InstanceId, Location, MatchLeaveNotice, PlayerId, TeleportReason,
};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};
use tracing::debug;

/// Whether a participant is an active player or a spectator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParticipantKind {
    Player,
    Spectator,
}

/// One player's membership in one match instance.
pub struct MatchPlayer {
    player_id: PlayerId,
    previous_location: Option<Location>,
    fallback_location: Option<Location>,
    previous_game_mode: Option<GameMode>,
    lives: AtomicU32,
    kind: RwLock<ParticipantKind>,
    death_location: RwLock<Option<Location>>,
    instance: Weak<MatchInstance>,
}

impl std::fmt::Debug for MatchPlayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatchPlayer")
            .field("player_id", &self.player_id)
            .field("lives", &self.lives())
            .field("kind", &self.kind())
            .finish()
    }
}

impl MatchPlayer {
    pub(crate) fn new(
        player_id: PlayerId,
        previous_location: Option<Location>,
        fallback_location: Option<Location>,
        previous_game_mode: Option<GameMode>,
        lives: u32,
        kind: ParticipantKind,
        instance: &Arc<MatchInstance>,
    ) -> Arc<Self> {
        Arc::new(Self {
            player_id,
            previous_location,
            fallback_location,
            previous_game_mode,
            lives: AtomicU32::new(lives),
            kind: RwLock::new(kind),
            death_location: RwLock::new(None),
            instance: Arc::downgrade(instance),
        })
    }

    pub fn player_id(&self) -> PlayerId {
        self.player_id
    }

    pub fn previous_location(&self) -> Option<Location> {
        self.previous_location
    }

    pub fn lives(&self) -> u32 {
        self.lives.load(Ordering::SeqCst)
    }

    /// Decrements the remaining lives, saturating at zero, and returns the
    /// new count.
    pub(crate) fn take_life(&self) -> u32 {
        let previous = self
            .lives
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |lives| {
                Some(lives.saturating_sub(1))
            })
            .unwrap_or(0);
        previous.saturating_sub(1)
    }

    pub fn kind(&self) -> ParticipantKind {
        *self.kind.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn set_kind(&self, kind: ParticipantKind) {
        *self.kind.write().unwrap_or_else(PoisonError::into_inner) = kind;
    }

    pub fn death_location(&self) -> Option<Location> {
        *self
            .death_location
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// The instance this player belongs to, while it is still alive.
    pub fn instance(&self) -> Option<Arc<MatchInstance>> {
        self.instance.upgrade()
    }

    pub fn instance_id(&self) -> Option<InstanceId> {
        self.instance().map(|instance| instance.id())
    }

    /// Sends a chat message to this player through the host.
    pub async fn send_message(&self, message: &str) {
        let Some(instance) = self.instance() else {
            return;
        };
        instance
            .orchestrator()
            .host()
            .send_message(self.player_id, message)
            .await;
    }

    /// Sends a title overlay to this player through the host.
    pub async fn send_title(
        &self,
        title: &str,
        subtitle: &str,
        fade_in: u32,
        stay: u32,
        fade_out: u32,
    ) {
        let Some(instance) = self.instance() else {
            return;
        };
        instance
            .orchestrator()
            .host()
            .send_title(self.player_id, title, subtitle, fade_in, stay, fade_out)
            .await;
    }

    /// Marks this player as downed at their current location and switches
    /// them into spectator mode.
    ///
    /// This is the minimal downed-state primitive; the full lives/revival
    /// flow is a deliberate extension point on top of it.
    pub async fn create_death_location(&self) {
        let Some(instance) = self.instance() else {
            return;
        };
        let host = instance.orchestrator().host();
        let Some(location) = host.player_location(self.player_id).await else {
            return;
        };
        *self
            .death_location
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(location);
        if let Err(error) = host.set_game_mode(self.player_id, GameMode::Spectator).await {
            debug!(player = %self.player_id, %error, "failed to apply spectator mode");
        }
    }

    /// Revives a downed player: teleports them back to their death marker,
    /// clears the marker, and restores survival mode.
    pub async fn revive(&self) {
        let Some(instance) = self.instance() else {
            return;
        };
        let marker = self
            .death_location
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(location) = marker else {
            return;
        };
        let host = instance.orchestrator().host();
        if let Err(error) = host
            .teleport(self.player_id, location, TeleportReason::System)
            .await
        {
            debug!(player = %self.player_id, %error, "revival teleport failed");
        }
        if let Err(error) = host.set_game_mode(self.player_id, GameMode::Survival).await {
            debug!(player = %self.player_id, %error, "failed to restore survival mode");
        }
    }

    /// Removes this player from their match, restoring their pre-join state.
    ///
    /// Restores the previous game mode (or the configured leave mode),
    /// restores health to the host-reported maximum, teleports them out with
    /// a system-tagged teleport - preferring the exit location, then the
    /// pre-join location if its world still exists, then the fallback - and
    /// dispatches a leave notice before running the post-removal check on the
    /// owning instance.
    ///
    /// Safe to call more than once; only the first call has side effects.
    pub async fn remove(self: &Arc<Self>) {
        let Some(instance) = self.instance() else {
            return;
        };

        let was_player = instance.players.remove(&self.player_id).is_some();
        let was_spectator = instance.spectators.remove(&self.player_id).is_some();
        if !was_player && !was_spectator {
            return;
        }

        let orchestrator = instance.orchestrator();
        let host = orchestrator.host();
        let config = instance.configuration();

        let restored_mode = self.previous_game_mode.unwrap_or(config.leave_game_mode);
        if let Err(error) = host.set_game_mode(self.player_id, restored_mode).await {
            debug!(player = %self.player_id, %error, "failed to restore game mode");
        }
        let max_health = host.max_health(self.player_id).await;
        if let Err(error) = host.set_health(self.player_id, max_health).await {
            debug!(player = %self.player_id, %error, "failed to restore health");
        }

        let destination = self.exit_destination(&instance).await;
        if let Some(destination) = destination {
            if let Err(error) = host
                .teleport(self.player_id, destination, TeleportReason::System)
                .await
            {
                debug!(player = %self.player_id, %error, "exit teleport failed");
            }
        }

        let template = if was_player {
            &config.messages.leave_as_player
        } else {
            &config.messages.leave_as_spectator
        };
        host.send_message(
            self.player_id,
            &template.replace("$player", &self.player_id.to_string()),
        )
        .await;

        let mut notice = MatchLeaveNotice::new(instance.id(), self.player_id);
        orchestrator.notices().dispatch(&mut notice);

        orchestrator.participants().remove(self.player_id);
        debug!(player = %self.player_id, instance = %instance.id(), "participant removed");

        instance.post_player_removal_check().await;
    }

    /// Exit teleport target, in priority order: configured exit, pre-join
    /// location while its world still exists, configured fallback.
    async fn exit_destination(&self, instance: &Arc<MatchInstance>) -> Option<Location> {
        let config = instance.configuration();
        if let Some(exit) = config.exit_location {
            return Some(exit);
        }
        if let Some(previous) = self.previous_location {
            if instance
                .orchestrator()
                .host()
                .world_exists(previous.world)
                .await
            {
                return Some(previous);
            }
        }
        self.fallback_location.or(config.fallback_location)
    }
}

// ============================================================================
// Participant Registry
// ============================================================================

/// Process-wide mapping from player identity to current match membership.
///
/// A player appears here while, and only while, they are bound to exactly one
/// live match instance. Admission consults this map to enforce membership
/// exclusivity; removal is the only thing that clears an entry.
#[derive(Debug, Default)]
pub struct ParticipantRegistry {
    entries: DashMap<PlayerId, Arc<MatchPlayer>>,
}

impl ParticipantRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&self, match_player: Arc<MatchPlayer>) {
        self.entries.insert(match_player.player_id(), match_player);
    }

    pub(crate) fn remove(&self, player: PlayerId) {
        self.entries.remove(&player);
    }

    /// The player's current match membership, if any.
    pub fn get(&self, player: PlayerId) -> Option<Arc<MatchPlayer>> {
        self.entries.get(&player).map(|entry| entry.clone())
    }

    pub fn contains(&self, player: PlayerId) -> bool {
        self.entries.contains_key(&player)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
