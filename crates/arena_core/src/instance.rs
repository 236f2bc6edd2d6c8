//! # Match Instances
//!
//! The state machine and membership container at the heart of the
//! orchestrator. One [`MatchInstance`] is one live arena: it owns its player
//! and spectator sets, a recurring watchdog tick, and a transient countdown
//! task, and it walks the lifecycle
//! `Waiting -> Starting -> Ongoing -> Completed*` exactly once.
//!
//! Instances are single-use. Teardown resets the state field to `Waiting`
//! for bookkeeping, but a destroyed instance is discarded; callers construct
//! a new one for a new match.
//!
//! Region membership is a construction-time capability ([`RegionBinding`]),
//! not a subclassing point: world-backed arenas treat the whole bound world
//! as the region and delete its storage on teardown, bounds-backed arenas
//! use an axis-aligned box inside a shared world.

use crate::config::MatchConfiguration;
use crate::error::AdmissionError;
use crate::orchestrator::MatchOrchestrator;
use crate::player::{MatchPlayer, ParticipantKind};
use arena_event_system::{
    InstanceId, Location, MatchDestroyNotice, MatchInstantiateNotice, MatchJoinNotice, PlayerId,
    RegionBounds, TeleportReason, WorldId,
};
use dashmap::DashMap;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// One host tick at 20 TPS; the watchdog period and the join-teleport delay.
const TICK: Duration = Duration::from_millis(50);
/// Period between countdown broadcasts.
const COUNTDOWN_PERIOD: Duration = Duration::from_secs(1);
/// Countdown length before the match starts.
const COUNTDOWN_TICKS: u32 = 3;

/// Lifecycle state of a match instance.
///
/// All three `Completed*` states are terminal and immediately trigger
/// teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    /// Accepting players; the countdown has not begun.
    Waiting,
    /// Countdown running; late joiners are blocked but the match has not
    /// started.
    Starting,
    /// The match is live.
    Ongoing,
    /// Ended without a specific outcome (abort, everyone left).
    Completed,
    CompletedVictory,
    CompletedDefeat,
}

/// How an instance decides region membership, chosen at construction.
#[derive(Debug, Clone)]
pub enum RegionBinding {
    /// The whole bound world is the match region; its backing storage is
    /// permanently deleted on teardown.
    World { world: WorldId, storage: PathBuf },
    /// An axis-aligned box inside a shared world. No storage is owned.
    Bounds { world: WorldId, bounds: RegionBounds },
}

impl RegionBinding {
    pub fn world(&self) -> WorldId {
        match self {
            Self::World { world, .. } | Self::Bounds { world, .. } => *world,
        }
    }

    pub fn contains(&self, location: &Location) -> bool {
        match self {
            Self::World { world, .. } => location.world == *world,
            Self::Bounds { world, bounds } => {
                location.world == *world && bounds.contains(location)
            }
        }
    }
}

/// One live arena with its own membership and state.
pub struct MatchInstance {
    id: InstanceId,
    orchestrator: Arc<MatchOrchestrator>,
    configuration: Arc<MatchConfiguration>,
    region: RegionBinding,
    state: RwLock<InstanceState>,
    pub(crate) players: DashMap<PlayerId, Arc<MatchPlayer>>,
    pub(crate) spectators: DashMap<PlayerId, Arc<MatchPlayer>>,
    tick_task: Mutex<Option<JoinHandle<()>>>,
    countdown_task: Mutex<Option<JoinHandle<()>>>,
    countdown_ticks: AtomicU32,
    destroying: AtomicBool,
    outcome: OnceLock<InstanceState>,
}

impl std::fmt::Debug for MatchInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatchInstance")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("players", &self.players.len())
            .field("spectators", &self.spectators.len())
            .finish()
    }
}

impl MatchInstance {
    pub(crate) fn new(
        orchestrator: Arc<MatchOrchestrator>,
        configuration: Arc<MatchConfiguration>,
        region: RegionBinding,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: InstanceId::new(),
            orchestrator,
            configuration,
            region,
            state: RwLock::new(InstanceState::Waiting),
            players: DashMap::new(),
            spectators: DashMap::new(),
            tick_task: Mutex::new(None),
            countdown_task: Mutex::new(None),
            countdown_ticks: AtomicU32::new(0),
            destroying: AtomicBool::new(false),
            outcome: OnceLock::new(),
        })
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn configuration(&self) -> Arc<MatchConfiguration> {
        Arc::clone(&self.configuration)
    }

    pub fn region(&self) -> &RegionBinding {
        &self.region
    }

    pub(crate) fn orchestrator(&self) -> Arc<MatchOrchestrator> {
        Arc::clone(&self.orchestrator)
    }

    pub fn state(&self) -> InstanceState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: InstanceState) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// The terminal state this match ended in, once it has ended.
    ///
    /// Unlike [`MatchInstance::state`], this survives the bookkeeping reset
    /// performed by teardown.
    pub fn outcome(&self) -> Option<InstanceState> {
        self.outcome.get().copied()
    }

    pub fn destroyed(&self) -> bool {
        self.destroying.load(Ordering::SeqCst)
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn spectator_count(&self) -> usize {
        self.spectators.len()
    }

    pub fn is_player(&self, player: PlayerId) -> bool {
        self.players.contains_key(&player)
    }

    pub fn is_spectator(&self, player: PlayerId) -> bool {
        self.spectators.contains_key(&player)
    }

    /// Whether the location lies inside this match's region.
    pub fn is_in_region(&self, location: &Location) -> bool {
        self.region.contains(location)
    }

    /// Snapshot of every participant, players first.
    pub fn participants(&self) -> Vec<Arc<MatchPlayer>> {
        self.players
            .iter()
            .chain(self.spectators.iter())
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Starts this instance: dispatches a cancellable instantiate notice,
    /// and unless vetoed, spawns the recurring watchdog tick and arms the
    /// countdown.
    ///
    /// The notice is returned either way so the caller can inspect a veto.
    /// A vetoed start has no side effects.
    pub async fn start(self: &Arc<Self>) -> MatchInstantiateNotice {
        let mut notice = MatchInstantiateNotice::new(self.id);
        self.orchestrator.notices().dispatch(&mut notice);
        if notice.is_cancelled() {
            debug!(instance = %self.id, "instantiate vetoed");
            return notice;
        }

        let instance = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = interval(TICK);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if instance.destroyed() {
                    break;
                }
                instance.run_watchdogs().await;
            }
        });
        *self
            .tick_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(handle);

        self.countdown_match().await;
        notice
    }

    /// Begins the pre-start countdown if enough players are present.
    ///
    /// With fewer than `min_players` present, an announcement is made and the
    /// instance stays in `Waiting`.
    pub async fn countdown_match(self: &Arc<Self>) {
        if self.state() != InstanceState::Waiting {
            return;
        }
        let config = &self.configuration;
        if (self.players.len() as u32) < config.min_players {
            let message = config
                .messages
                .failed_not_enough_players
                .replace("$amount", &config.min_players.to_string());
            self.announce_chat(&message).await;
            return;
        }

        self.set_state(InstanceState::Starting);
        self.countdown_ticks.store(0, Ordering::SeqCst);
        info!(instance = %self.id, "countdown started");

        let instance = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = interval(COUNTDOWN_PERIOD);
            loop {
                ticker.tick().await;
                if instance.destroyed() || instance.countdown_tick().await {
                    break;
                }
            }
        });
        *self
            .countdown_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(handle);
    }

    /// One countdown beat. Returns `true` when the countdown is finished,
    /// either because the match started or because it was aborted.
    pub(crate) async fn countdown_tick(self: &Arc<Self>) -> bool {
        let config = &self.configuration;
        if (self.players.len() as u32) < config.min_players {
            debug!(instance = %self.id, "countdown aborted, membership below minimum");
            self.end_match().await;
            return true;
        }

        let elapsed = self.countdown_ticks.fetch_add(1, Ordering::SeqCst) + 1;
        let remaining = COUNTDOWN_TICKS.saturating_sub(elapsed).to_string();
        let title = config.messages.starting_title.replace("$count", &remaining);
        let subtitle = config
            .messages
            .starting_subtitle
            .replace("$count", &remaining);
        self.announce_title(&title, &subtitle, 0, 20, 0).await;

        if elapsed >= COUNTDOWN_TICKS {
            self.start_match().await;
            return true;
        }
        false
    }

    /// Transitions to `Ongoing` and places every player at the start
    /// location.
    async fn start_match(self: &Arc<Self>) {
        self.set_state(InstanceState::Ongoing);
        info!(instance = %self.id, players = self.players.len(), "match started");
        let Some(start) = self.configuration.start_location else {
            return;
        };
        let host = self.orchestrator.host();
        for entry in self.players.iter() {
            let player = *entry.key();
            if let Err(error) = host.teleport(player, start, TeleportReason::System).await {
                warn!(instance = %self.id, %player, %error, "start teleport failed");
            }
        }
    }

    pub async fn victory(self: &Arc<Self>) {
        self.set_state(InstanceState::CompletedVictory);
        self.end_match().await;
    }

    pub async fn defeat(self: &Arc<Self>) {
        self.set_state(InstanceState::CompletedDefeat);
        self.end_match().await;
    }

    /// Ends the match: records a generic `Completed` outcome unless a
    /// specific completion state was already set, then tears the instance
    /// down.
    pub async fn end_match(self: &Arc<Self>) {
        {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            if !matches!(
                *state,
                InstanceState::CompletedVictory | InstanceState::CompletedDefeat
            ) {
                *state = InstanceState::Completed;
            }
        }
        let outcome = self.state();
        let _ = self.outcome.set(outcome);
        debug!(instance = %self.id, ?outcome, "match ended");
        self.destroy_match().await;
    }

    /// Terminal teardown: evicts every participant, cancels the tick and
    /// countdown tasks, unregisters protection, removes the instance from
    /// the orchestrator registry, emits the destroy notice, and releases the
    /// bound world for world-backed arenas.
    ///
    /// Safe against being invoked twice; only the first call acts.
    pub async fn destroy_match(self: &Arc<Self>) {
        if self.destroying.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(instance = %self.id, "destroying match instance");

        // Bookkeeping reset only; the instance is discarded, never reused.
        self.set_state(InstanceState::Waiting);

        for match_player in self.participants() {
            match_player.remove().await;
        }
        self.players.clear();
        self.spectators.clear();

        let tick = self
            .tick_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = tick {
            abort_if_not_current(handle);
        }
        let countdown = self
            .countdown_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = countdown {
            abort_if_not_current(handle);
        }

        if let RegionBinding::World { world, .. } = &self.region {
            let protection = self.orchestrator.protection();
            let config = &self.configuration;
            if config.protected {
                protection.remove_protected_world(*world);
            }
            if config.pvp_prevented {
                protection.remove_pvp_prevented_world(*world);
            }
            if config.redstone_prevented {
                protection.remove_redstone_prevented_world(*world);
            }
        }

        self.orchestrator.remove_instance(self.id);

        let mut notice = MatchDestroyNotice::new(self.id);
        self.orchestrator.notices().dispatch(&mut notice);

        if let RegionBinding::World { world, storage } = &self.region {
            self.teardown_world(*world, storage.clone()).await;
        }
    }

    /// Unloads the bound world and deletes its backing storage.
    ///
    /// Runs on a background task with the deletion on a blocking worker,
    /// except during host shutdown where background scheduling is
    /// unavailable and the whole sequence blocks instead. Failures are
    /// logged and never abort teardown.
    async fn teardown_world(&self, world: WorldId, storage: PathBuf) {
        let host = self.orchestrator.host();

        if host.is_shutting_down() {
            if let Err(error) = host.unload_world(world, false).await {
                warn!(%world, %error, "world unload failed during shutdown");
            }
            if let Err(error) = host.delete_world_storage(&storage) {
                warn!(%world, %error, "world storage deletion failed during shutdown");
            } else {
                debug!(%world, "world storage deleted synchronously");
            }
            return;
        }

        tokio::spawn(async move {
            if let Err(error) = host.unload_world(world, false).await {
                warn!(%world, %error, "world unload failed");
            }
            let delete_host = Arc::clone(&host);
            let result =
                tokio::task::spawn_blocking(move || delete_host.delete_world_storage(&storage))
                    .await;
            match result {
                Ok(Ok(())) => debug!(%world, "world storage deleted"),
                Ok(Err(error)) => warn!(%world, %error, "world storage deletion failed"),
                Err(error) => warn!(%world, %error, "world storage deletion task failed"),
            }
        });
    }

    // ========================================================================
    // Admission
    // ========================================================================

    /// Admits a new player.
    ///
    /// Admission is gated, in order, on: the join notice not being vetoed,
    /// the configured permission, membership exclusivity, the instance still
    /// `Waiting`, and capacity. Every rejection sends the player the
    /// corresponding message and leaves membership untouched.
    ///
    /// On success the player's pre-join location and game mode are captured
    /// for restoration, the configured match game mode is applied, and a
    /// one-tick-deferred teleport to the lobby (or start) location is
    /// scheduled.
    pub async fn add_new_player(
        self: &Arc<Self>,
        player: PlayerId,
    ) -> Result<Arc<MatchPlayer>, AdmissionError> {
        let host = self.orchestrator.host();
        let config = &self.configuration;
        let messages = &config.messages;

        let mut notice = MatchJoinNotice::new(self.id, player);
        self.orchestrator.notices().dispatch(&mut notice);
        if notice.is_cancelled() {
            return Err(AdmissionError::Vetoed);
        }

        if let Some(permission) = &config.permission {
            if !host.has_permission(player, permission).await {
                host.send_message(player, &messages.failed_no_permission).await;
                return Err(AdmissionError::MissingPermission(player));
            }
        }
        if self.orchestrator.participants().contains(player) {
            host.send_message(player, &messages.failed_already_in_match).await;
            return Err(AdmissionError::AlreadyInMatch(player));
        }
        if self.state() != InstanceState::Waiting {
            host.send_message(player, &messages.failed_already_started).await;
            return Err(AdmissionError::AlreadyStarted);
        }
        if self.players.len() as u32 + 1 > config.max_players {
            host.send_message(player, &messages.failed_full).await;
            return Err(AdmissionError::Full);
        }

        let previous_location = host.player_location(player).await;
        let previous_game_mode = host.game_mode(player).await;
        if let Some(mode) = config.match_game_mode {
            if let Err(error) = host.set_game_mode(player, mode).await {
                warn!(instance = %self.id, %player, %error, "failed to apply match game mode");
            }
        }

        let match_player = MatchPlayer::new(
            player,
            previous_location,
            config.fallback_location,
            previous_game_mode,
            config.lives,
            ParticipantKind::Player,
            self,
        );
        self.players.insert(player, Arc::clone(&match_player));
        self.orchestrator
            .participants()
            .insert(Arc::clone(&match_player));

        let count = config.min_players.to_string();
        host.send_message(
            player,
            &messages
                .join_as_player
                .replace("$player", &player.to_string())
                .replace("$count", &count),
        )
        .await;
        host.send_title(
            player,
            &messages.join_as_player_title,
            &messages.join_as_player_subtitle.replace("$count", &count),
            60,
            180,
            60,
        )
        .await;

        self.schedule_join_teleport(player);
        info!(instance = %self.id, %player, "player admitted");
        Ok(match_player)
    }

    /// Admits a new spectator.
    ///
    /// Requires the configuration to allow spectating; otherwise gated the
    /// same way as players minus the state and capacity checks.
    pub async fn add_new_spectator(
        self: &Arc<Self>,
        player: PlayerId,
    ) -> Result<Arc<MatchPlayer>, AdmissionError> {
        let host = self.orchestrator.host();
        let config = &self.configuration;
        let messages = &config.messages;

        if !config.spectatable {
            host.send_message(player, &messages.failed_spectating_disabled)
                .await;
            return Err(AdmissionError::SpectatingDisabled);
        }

        let mut notice = MatchJoinNotice::new(self.id, player);
        self.orchestrator.notices().dispatch(&mut notice);
        if notice.is_cancelled() {
            return Err(AdmissionError::Vetoed);
        }

        if let Some(permission) = &config.permission {
            if !host.has_permission(player, permission).await {
                host.send_message(player, &messages.failed_no_permission).await;
                return Err(AdmissionError::MissingPermission(player));
            }
        }
        if self.orchestrator.participants().contains(player) {
            host.send_message(player, &messages.failed_already_in_match).await;
            return Err(AdmissionError::AlreadyInMatch(player));
        }

        let previous_location = host.player_location(player).await;
        let previous_game_mode = host.game_mode(player).await;

        let match_player = MatchPlayer::new(
            player,
            previous_location,
            config.fallback_location,
            previous_game_mode,
            config.lives,
            ParticipantKind::Spectator,
            self,
        );
        self.spectators.insert(player, Arc::clone(&match_player));
        self.orchestrator
            .participants()
            .insert(Arc::clone(&match_player));

        host.send_message(
            player,
            &messages
                .join_as_spectator
                .replace("$player", &player.to_string()),
        )
        .await;
        host.send_title(
            player,
            &messages.join_as_spectator_title,
            &messages.join_as_spectator_subtitle,
            60,
            180,
            60,
        )
        .await;

        self.schedule_join_teleport(player);
        info!(instance = %self.id, %player, "spectator admitted");
        Ok(match_player)
    }

    /// One-tick-deferred placement so the join completes before the player
    /// is moved: lobby while still waiting, start location otherwise.
    fn schedule_join_teleport(self: &Arc<Self>, player: PlayerId) {
        let instance = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(TICK).await;
            let config = &instance.configuration;
            let target = if instance.state() == InstanceState::Waiting
                && config.lobby_location.is_some()
            {
                config.lobby_location
            } else {
                config.start_location
            };
            let Some(target) = target else {
                return;
            };
            if let Err(error) = instance
                .orchestrator
                .host()
                .teleport(player, target, TeleportReason::System)
                .await
            {
                warn!(instance = %instance.id, %player, %error, "join teleport failed");
            }
        });
    }

    // ========================================================================
    // Membership transitions
    // ========================================================================

    /// Handles one player death: decrements lives, removing the player once
    /// none remain.
    pub async fn player_death(&self, match_player: &Arc<MatchPlayer>) {
        let remaining = match_player.take_life();
        if remaining > 0 {
            // TODO: revival flow on top of create_death_location/revive;
            // respawn rules are still undecided upstream.
            debug!(
                player = %match_player.player_id(),
                remaining,
                "player downed with lives remaining"
            );
        } else {
            match_player.remove().await;
        }
    }

    /// Moves a player into the spectator set. No teleport side effect.
    pub async fn make_spectator(&self, match_player: &Arc<MatchPlayer>) {
        if !self.configuration.spectatable {
            return;
        }
        if let Some((player, moved)) = self.players.remove(&match_player.player_id()) {
            moved.set_kind(ParticipantKind::Spectator);
            self.spectators.insert(player, moved);
        }
    }

    /// Removes a spectator through the common exit path.
    pub async fn remove_spectator(&self, match_player: &Arc<MatchPlayer>) {
        match_player.remove().await;
    }

    /// Invoked after every removal: a match with no active players left must
    /// not linger, so it is ended.
    ///
    /// Returns a boxed future to break the remove -> check -> end -> destroy
    /// -> remove future cycle at this boundary.
    pub fn post_player_removal_check(
        self: &Arc<Self>,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            if self.destroyed() {
                return;
            }
            if self.players.is_empty() {
                self.end_match().await;
            }
        })
    }

    // ========================================================================
    // Announcements
    // ========================================================================

    /// Sends a chat message to every participant.
    pub async fn announce_chat(&self, message: &str) {
        let participants = self.participants();
        futures::future::join_all(
            participants
                .iter()
                .map(|match_player| match_player.send_message(message)),
        )
        .await;
    }

    /// Sends a title overlay to every participant.
    pub async fn announce_title(
        &self,
        title: &str,
        subtitle: &str,
        fade_in: u32,
        stay: u32,
        fade_out: u32,
    ) {
        let participants = self.participants();
        futures::future::join_all(participants.iter().map(|match_player| {
            match_player.send_title(title, subtitle, fade_in, stay, fade_out)
        }))
        .await;
    }

    // ========================================================================
    // Watchdogs
    // ========================================================================

    /// One watchdog pass: player containment, spectator containment, and
    /// intruder ejection. Runs every tick while the instance exists.
    pub async fn run_watchdogs(self: &Arc<Self>) {
        self.player_watchdog().await;
        self.spectator_watchdog().await;
        self.intruder_watchdog().await;
    }

    async fn player_watchdog(self: &Arc<Self>) {
        let snapshot: Vec<_> = self
            .players
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        for match_player in snapshot {
            self.contain_participant(&match_player).await;
        }
    }

    async fn spectator_watchdog(self: &Arc<Self>) {
        let snapshot: Vec<_> = self
            .spectators
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        for match_player in snapshot {
            self.contain_participant(&match_player).await;
        }
    }

    /// Removes a disconnected participant, or snaps an escaped one back to
    /// the start location with a system teleport.
    async fn contain_participant(&self, match_player: &Arc<MatchPlayer>) {
        let host = self.orchestrator.host();
        let player = match_player.player_id();
        if !host.is_online(player).await {
            match_player.remove().await;
            return;
        }
        let Some(location) = host.player_location(player).await else {
            return;
        };
        if self.is_in_region(&location) {
            return;
        }
        let Some(start) = self.configuration.start_location else {
            return;
        };
        if let Err(error) = host.teleport(player, start, TeleportReason::System).await {
            warn!(instance = %self.id, %player, %error, "containment teleport failed");
        }
    }

    /// Ejects actors who are inside the region but not part of this match.
    /// Only runs while the match is ongoing. Operators are warned instead of
    /// ejected.
    async fn intruder_watchdog(self: &Arc<Self>) {
        if self.state() != InstanceState::Ongoing {
            return;
        }
        let host = self.orchestrator.host();
        for player in host.online_players().await {
            let membership = self.orchestrator.participants().get(player);
            if membership
                .as_ref()
                .and_then(|match_player| match_player.instance_id())
                == Some(self.id)
            {
                continue;
            }
            let Some(location) = host.player_location(player).await else {
                continue;
            };
            if self.is_in_region(&location) {
                self.eject_intruder(player, membership).await;
            }
        }
    }

    async fn eject_intruder(&self, player: PlayerId, membership: Option<Arc<MatchPlayer>>) {
        let host = self.orchestrator.host();
        if host.is_operator(player).await {
            host.send_message(
                player,
                &self.configuration.messages.operator_intruder_warning,
            )
            .await;
            return;
        }
        if let Some(match_player) = membership {
            match_player.remove().await;
            return;
        }
        // Unaffiliated intruder: move them out so containment holds.
        let target = self
            .configuration
            .exit_location
            .or(self.configuration.fallback_location);
        let Some(target) = target else {
            warn!(instance = %self.id, %player, "no ejection target configured for intruder");
            return;
        };
        if let Err(error) = host.teleport(player, target, TeleportReason::System).await {
            warn!(instance = %self.id, %player, %error, "intruder ejection failed");
        }
    }
}

/// Aborts a task handle unless it belongs to the task we are running on;
/// teardown may be executing inside the tick or countdown task itself, and
/// aborting the current task would cut teardown short.
fn abort_if_not_current(handle: JoinHandle<()>) {
    if tokio::task::try_id() != Some(handle.id()) {
        handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MatchConfiguration, MatchConfigurationBuilder};
    use crate::error::AdmissionError;
    use crate::test_support::TestHost;
    use arena_event_system::{
        GameMode, MatchInstantiateNotice, MatchJoinNotice, RegionBounds,
    };
    use std::sync::atomic::AtomicUsize;

    struct Arena {
        host: Arc<TestHost>,
        orchestrator: Arc<MatchOrchestrator>,
        world: WorldId,
        lobby_world: WorldId,
    }

    fn arena() -> Arena {
        let host = TestHost::new();
        let world = WorldId::new();
        let lobby_world = WorldId::new();
        host.add_world(world);
        host.add_world(lobby_world);
        let orchestrator = MatchOrchestrator::new(host.clone());
        Arena {
            host,
            orchestrator,
            world,
            lobby_world,
        }
    }

    fn spot(world: WorldId, x: f64) -> Location {
        Location::new(world, x, 64.0, 0.0)
    }

    fn bounds_region(world: WorldId) -> RegionBinding {
        RegionBinding::Bounds {
            world,
            bounds: RegionBounds::new(-100.0, 0.0, -100.0, 100.0, 256.0, 100.0),
        }
    }

    fn base_config(arena: &Arena) -> MatchConfigurationBuilder {
        MatchConfiguration::builder()
            .lobby_location(spot(arena.world, 10.0))
            .start_location(spot(arena.world, 0.0))
            .exit_location(spot(arena.lobby_world, 0.0))
    }

    fn connect(arena: &Arena, count: usize) -> Vec<PlayerId> {
        (0..count)
            .map(|_| {
                let player = PlayerId::new();
                arena.host.connect(player, spot(arena.lobby_world, 5.0));
                player
            })
            .collect()
    }

    #[tokio::test]
    async fn player_capacity_is_enforced() {
        let arena = arena();
        let config = base_config(&arena).max_players(2).build();
        let instance = arena
            .orchestrator
            .create_match(config, bounds_region(arena.world));
        let players = connect(&arena, 3);

        assert!(instance.add_new_player(players[0]).await.is_ok());
        assert!(instance.add_new_player(players[1]).await.is_ok());
        let third = instance.add_new_player(players[2]).await;
        assert!(matches!(third, Err(AdmissionError::Full)));
        assert_eq!(instance.player_count(), 2);
        assert!(arena
            .host
            .recorded_messages(players[2])
            .contains(&instance.configuration().messages.failed_full));
    }

    #[tokio::test(start_paused = true)]
    async fn admission_is_gated_on_waiting_state() {
        let arena = arena();
        let config = base_config(&arena).min_players(2).max_players(8).build();
        let instance = arena
            .orchestrator
            .create_match(config, bounds_region(arena.world));
        let players = connect(&arena, 3);

        instance.add_new_player(players[0]).await.expect("first");
        instance.add_new_player(players[1]).await.expect("second");
        instance.countdown_match().await;
        assert_eq!(instance.state(), InstanceState::Starting);

        let late = instance.add_new_player(players[2]).await;
        assert!(matches!(late, Err(AdmissionError::AlreadyStarted)));
        assert_eq!(instance.player_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn countdown_reaches_ongoing_and_places_players() {
        let arena = arena();
        let config = base_config(&arena).min_players(2).max_players(8).build();
        let instance = arena
            .orchestrator
            .create_match(config, bounds_region(arena.world));
        let players = connect(&arena, 2);
        for player in &players {
            instance.add_new_player(*player).await.expect("admitted");
        }

        instance.countdown_match().await;
        tokio::time::sleep(Duration::from_secs(4)).await;

        assert_eq!(instance.state(), InstanceState::Ongoing);
        let start = instance.configuration().start_location.expect("start");
        for player in &players {
            let teleports = arena.host.recorded_teleports(*player);
            assert!(teleports.contains(&(start, TeleportReason::System)));
            let titles = arena.host.recorded_titles(*player);
            assert!(titles.contains(&("Match starting!".to_string(), "in 2...".to_string())));
            assert!(titles.contains(&("Match starting!".to_string(), "in 0...".to_string())));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn countdown_aborts_when_membership_drops_below_minimum() {
        let arena = arena();
        let config = base_config(&arena).min_players(2).max_players(8).build();
        let instance = arena
            .orchestrator
            .create_match(config, bounds_region(arena.world));
        let players = connect(&arena, 2);
        instance.add_new_player(players[0]).await.expect("first");
        let leaver = instance.add_new_player(players[1]).await.expect("second");

        instance.countdown_match().await;
        assert_eq!(instance.state(), InstanceState::Starting);
        leaver.remove().await;
        tokio::time::sleep(Duration::from_secs(3)).await;

        assert_eq!(instance.outcome(), Some(InstanceState::Completed));
        assert!(instance.destroyed());
        assert!(arena.orchestrator.instances().is_empty());
        assert!(arena.orchestrator.participants().is_empty());
    }

    #[tokio::test]
    async fn vetoed_instantiate_has_no_side_effects() {
        let arena = arena();
        arena
            .orchestrator
            .notices()
            .on::<MatchInstantiateNotice, _>(|notice| notice.cancel());
        let instance = arena
            .orchestrator
            .create_match(base_config(&arena).build(), bounds_region(arena.world));

        let notice = instance.start().await;
        assert!(notice.is_cancelled());
        assert_eq!(instance.state(), InstanceState::Waiting);
        assert!(!instance.destroyed());
    }

    #[tokio::test]
    async fn vetoed_join_leaves_membership_untouched() {
        let arena = arena();
        arena
            .orchestrator
            .notices()
            .on::<MatchJoinNotice, _>(|notice| notice.cancel());
        let instance = arena
            .orchestrator
            .create_match(base_config(&arena).build(), bounds_region(arena.world));
        let players = connect(&arena, 1);

        let rejected = instance.add_new_player(players[0]).await;
        assert!(matches!(rejected, Err(AdmissionError::Vetoed)));
        assert_eq!(instance.player_count(), 0);
        assert!(arena.orchestrator.participants().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn join_teleport_is_deferred_one_tick() {
        let arena = arena();
        let instance = arena
            .orchestrator
            .create_match(base_config(&arena).build(), bounds_region(arena.world));
        let players = connect(&arena, 1);

        instance.add_new_player(players[0]).await.expect("admitted");
        assert!(arena.host.recorded_teleports(players[0]).is_empty());

        tokio::time::sleep(Duration::from_millis(100)).await;
        let lobby = instance.configuration().lobby_location.expect("lobby");
        assert_eq!(
            arena.host.recorded_teleports(players[0]),
            vec![(lobby, TeleportReason::System)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn remove_restores_state_and_is_idempotent() {
        let arena = arena();
        let config = base_config(&arena)
            .match_game_mode(GameMode::Adventure)
            .build();
        let instance = arena
            .orchestrator
            .create_match(config, bounds_region(arena.world));
        let players = connect(&arena, 1);

        let match_player = instance.add_new_player(players[0]).await.expect("admitted");
        assert_eq!(
            arena.host.recorded_game_mode(players[0]),
            Some(GameMode::Adventure)
        );

        match_player.remove().await;
        assert_eq!(
            arena.host.recorded_game_mode(players[0]),
            Some(GameMode::Survival)
        );
        let exit = instance.configuration().exit_location.expect("exit");
        let teleports = arena.host.recorded_teleports(players[0]);
        assert!(teleports.contains(&(exit, TeleportReason::System)));
        // The last active player left, so the match wound itself down.
        assert!(instance.destroyed());
        assert_eq!(instance.outcome(), Some(InstanceState::Completed));

        let teleports_before = arena.host.recorded_teleports(players[0]).len();
        let messages_before = arena.host.recorded_messages(players[0]).len();
        match_player.remove().await;
        assert_eq!(
            arena.host.recorded_teleports(players[0]).len(),
            teleports_before
        );
        assert_eq!(
            arena.host.recorded_messages(players[0]).len(),
            messages_before
        );
    }

    #[tokio::test(start_paused = true)]
    async fn membership_is_exclusive_across_instances() {
        let arena = arena();
        let first = arena
            .orchestrator
            .create_match(base_config(&arena).max_players(8).build(), bounds_region(arena.world));
        let second = arena.orchestrator.create_match(
            base_config(&arena).max_players(8).build(),
            bounds_region(arena.lobby_world),
        );
        let players = connect(&arena, 1);

        first.add_new_player(players[0]).await.expect("admitted");
        let rejected = second.add_new_player(players[0]).await;
        assert!(matches!(rejected, Err(AdmissionError::AlreadyInMatch(_))));

        assert!(first.is_player(players[0]));
        assert_eq!(second.player_count(), 0);
        assert!(arena
            .host
            .recorded_messages(players[0])
            .contains(&second.configuration().messages.failed_already_in_match));
    }

    #[tokio::test(start_paused = true)]
    async fn permission_gate_blocks_ungranted_players() {
        let arena = arena();
        let config = base_config(&arena)
            .max_players(8)
            .permission("arena.join")
            .build();
        let instance = arena
            .orchestrator
            .create_match(config, bounds_region(arena.world));
        let players = connect(&arena, 2);

        let rejected = instance.add_new_player(players[0]).await;
        assert!(matches!(
            rejected,
            Err(AdmissionError::MissingPermission(player)) if player == players[0]
        ));
        assert_eq!(instance.player_count(), 0);
        assert!(arena
            .host
            .recorded_messages(players[0])
            .contains(&instance.configuration().messages.failed_no_permission));

        arena.host.grant(players[1], "arena.join");
        assert!(instance.add_new_player(players[1]).await.is_ok());
        assert!(instance.is_player(players[1]));
    }

    #[tokio::test(start_paused = true)]
    async fn offline_cleanup_of_last_player_ends_the_match() {
        let arena = arena();
        let instance = arena
            .orchestrator
            .create_match(base_config(&arena).build(), bounds_region(arena.world));
        let players = connect(&arena, 1);
        instance.add_new_player(players[0]).await.expect("admitted");

        // The watchdog's removal cascades all the way through teardown.
        arena.host.disconnect(players[0]);
        instance.run_watchdogs().await;

        assert_eq!(instance.player_count(), 0);
        assert_eq!(instance.outcome(), Some(InstanceState::Completed));
        assert!(instance.destroyed());
        assert!(arena.orchestrator.instances().is_empty());
        assert!(arena.orchestrator.participants().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn watchdog_removes_offline_and_snaps_back_escapees() {
        let arena = arena();
        let config = base_config(&arena).max_players(8).build();
        let instance = arena
            .orchestrator
            .create_match(config, bounds_region(arena.world));
        let players = connect(&arena, 2);
        instance.add_new_player(players[0]).await.expect("first");
        instance.add_new_player(players[1]).await.expect("second");

        arena.host.disconnect(players[1]);
        // Escaped beyond the arena bounds inside the same world.
        arena.host.place(players[0], spot(arena.world, 500.0));
        instance.run_watchdogs().await;

        assert!(!instance.is_player(players[1]));
        assert_eq!(instance.player_count(), 1);
        let start = instance.configuration().start_location.expect("start");
        assert!(arena
            .host
            .recorded_teleports(players[0])
            .contains(&(start, TeleportReason::System)));
    }

    #[tokio::test(start_paused = true)]
    async fn intruders_are_ejected_only_while_ongoing() {
        let arena = arena();
        let config = base_config(&arena).min_players(1).max_players(8).build();
        let storage = PathBuf::from("unused");
        let instance = arena.orchestrator.create_match(
            config,
            RegionBinding::World {
                world: arena.world,
                storage,
            },
        );
        let member = PlayerId::new();
        arena.host.connect(member, spot(arena.world, 0.0));
        instance.add_new_player(member).await.expect("member");

        let intruder = PlayerId::new();
        arena.host.connect(intruder, spot(arena.world, 30.0));
        let operator = PlayerId::new();
        arena.host.connect(operator, spot(arena.world, 40.0));
        arena.host.make_operator(operator);

        // Not ongoing yet: nobody is touched.
        instance.run_watchdogs().await;
        assert!(arena.host.recorded_teleports(intruder).is_empty());

        instance.countdown_match().await;
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(instance.state(), InstanceState::Ongoing);

        instance.run_watchdogs().await;
        let exit = instance.configuration().exit_location.expect("exit");
        assert!(arena
            .host
            .recorded_teleports(intruder)
            .contains(&(exit, TeleportReason::System)));
        assert!(arena.host.recorded_teleports(operator).is_empty());
        assert!(arena.host.recorded_messages(operator).contains(
            &instance
                .configuration()
                .messages
                .operator_intruder_warning
        ));
        // The member stays put.
        assert!(instance.is_player(member));
    }

    #[tokio::test]
    async fn world_teardown_deletes_storage_in_background() {
        let arena = arena();
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = dir.path().join("arena-world");
        std::fs::create_dir_all(&storage).expect("storage dir");

        let destroys = Arc::new(AtomicUsize::new(0));
        let destroys_seen = Arc::clone(&destroys);
        arena
            .orchestrator
            .notices()
            .on::<MatchDestroyNotice, _>(move |_| {
                destroys_seen.fetch_add(1, Ordering::SeqCst);
            });

        let instance = arena.orchestrator.create_match(
            base_config(&arena).build(),
            RegionBinding::World {
                world: arena.world,
                storage: storage.clone(),
            },
        );
        assert!(arena.orchestrator.protection().is_protected(arena.world));

        instance.destroy_match().await;
        // Second call must be inert.
        instance.destroy_match().await;

        for _ in 0..200 {
            if !arena.host.recorded_deletions().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(arena.host.recorded_deletions(), vec![storage.clone()]);
        assert!(!storage.exists());
        assert_eq!(arena.host.recorded_unloads(), vec![arena.world]);
        assert!(!arena.orchestrator.protection().is_protected(arena.world));
        assert!(arena.orchestrator.instances().is_empty());
        assert_eq!(destroys.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn world_teardown_is_synchronous_during_shutdown() {
        let arena = arena();
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = dir.path().join("arena-world");
        std::fs::create_dir_all(&storage).expect("storage dir");

        let instance = arena.orchestrator.create_match(
            base_config(&arena).build(),
            RegionBinding::World {
                world: arena.world,
                storage: storage.clone(),
            },
        );

        arena.host.begin_shutdown();
        instance.destroy_match().await;

        // No polling: the deletion happened before destroy returned.
        assert_eq!(arena.host.recorded_deletions(), vec![storage.clone()]);
        assert!(!storage.exists());
        assert_eq!(arena.host.recorded_unloads(), vec![arena.world]);
    }

    #[tokio::test(start_paused = true)]
    async fn full_lifecycle_restores_everyone() {
        let arena = arena();
        let config = base_config(&arena)
            .min_players(2)
            .max_players(2)
            .spectatable(true)
            .match_game_mode(GameMode::Adventure)
            .build();
        let instance = arena
            .orchestrator
            .create_match(config, bounds_region(arena.world));

        let players = connect(&arena, 2);
        let spectator = PlayerId::new();
        arena.host.connect(spectator, spot(arena.lobby_world, 5.0));

        // Below the minimum at start time, so this arms only the watchdogs.
        let notice = instance.start().await;
        assert!(!notice.is_cancelled());
        assert_eq!(instance.state(), InstanceState::Waiting);

        let downed = instance.add_new_player(players[0]).await.expect("first");
        instance.add_new_player(players[1]).await.expect("second");
        instance.add_new_spectator(spectator).await.expect("spectator");
        assert_eq!(instance.spectator_count(), 1);

        instance.countdown_match().await;
        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(instance.state(), InstanceState::Ongoing);

        // One life by default: a death is an elimination.
        instance.player_death(&downed).await;
        assert!(!instance.is_player(players[0]));
        assert_eq!(instance.player_count(), 1);

        instance.victory().await;
        assert_eq!(instance.outcome(), Some(InstanceState::CompletedVictory));
        assert!(instance.destroyed());
        assert!(arena.orchestrator.instances().is_empty());
        assert!(arena.orchestrator.participants().is_empty());
        for player in players.iter().chain(std::iter::once(&spectator)) {
            assert_eq!(
                arena.host.recorded_game_mode(*player),
                Some(GameMode::Survival)
            );
            let exit = instance.configuration().exit_location.expect("exit");
            assert!(arena
                .host
                .recorded_teleports(*player)
                .contains(&(exit, TeleportReason::System)));
        }
    }
}
