//! # Match Configuration
//!
//! Immutable description of one match arena: capacity bounds, lives, the four
//! named locations, protection flags, an optional gating permission, and the
//! full set of user-facing message templates. Built once by the caller
//! through [`MatchConfigurationBuilder`], then shared by reference with the
//! instance it configures and never mutated.
//!
//! Message templates support `$count`, `$amount`, and `$player` placeholders,
//! substituted at send time.

use arena_event_system::{GameMode, Location};
use serde::{Deserialize, Serialize};

/// Immutable configuration for one match instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchConfiguration {
    /// Minimum players required before the countdown may begin.
    pub min_players: u32,
    /// Hard cap on the player set; admission beyond this fails.
    pub max_players: u32,
    /// Lives granted to each player at join time.
    pub lives: u32,
    /// Where admitted players wait before the match starts.
    pub lobby_location: Option<Location>,
    /// Where players are placed when the match begins.
    pub start_location: Option<Location>,
    /// Preferred destination when leaving the match.
    pub exit_location: Option<Location>,
    /// Last-resort destination when neither the exit nor the player's
    /// pre-join location is usable.
    pub fallback_location: Option<Location>,
    pub spectatable: bool,
    pub respawnable: bool,
    /// Register the bound world against environment mutation.
    pub protected: bool,
    /// Register the bound world against player-vs-player damage.
    pub pvp_prevented: bool,
    /// Register the bound world against redstone-triggered interaction.
    pub redstone_prevented: bool,
    /// Whether this configuration is meant for a world-backed arena.
    pub world_based: bool,
    /// Permission required to join or spectate, if any.
    pub permission: Option<String>,
    /// Game mode applied to participants on admission, if any.
    pub match_game_mode: Option<GameMode>,
    /// Game mode restored on exit when the player's pre-join mode is unknown.
    pub leave_game_mode: GameMode,
    pub messages: MatchMessages,
}

impl MatchConfiguration {
    /// Starts building a configuration with the documented defaults.
    pub fn builder() -> MatchConfigurationBuilder {
        MatchConfigurationBuilder::default()
    }
}

impl Default for MatchConfiguration {
    fn default() -> Self {
        MatchConfigurationBuilder::default().build()
    }
}

/// User-facing message templates for one match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchMessages {
    pub join_as_player: String,
    pub join_as_player_title: String,
    pub join_as_player_subtitle: String,
    pub join_as_spectator: String,
    pub join_as_spectator_title: String,
    pub join_as_spectator_subtitle: String,
    pub leave_as_player: String,
    pub leave_as_spectator: String,
    pub failed_already_started: String,
    pub failed_full: String,
    pub failed_no_permission: String,
    pub failed_spectating_disabled: String,
    pub failed_already_in_match: String,
    pub failed_not_enough_players: String,
    pub starting_title: String,
    pub starting_subtitle: String,
    pub prevent_teleport_in: String,
    pub prevent_teleport_out: String,
    pub operator_intruder_warning: String,
}

impl Default for MatchMessages {
    fn default() -> Self {
        Self {
            join_as_player: "Welcome to the match, $player!".to_string(),
            join_as_player_title: "Match joined".to_string(),
            join_as_player_subtitle: "Waiting for $count players".to_string(),
            join_as_spectator: "You are now spectating this match!".to_string(),
            join_as_spectator_title: "Spectating".to_string(),
            join_as_spectator_subtitle: "The match will start soon".to_string(),
            leave_as_player: "You have left the match, $player!".to_string(),
            leave_as_spectator: "You are no longer spectating the match!".to_string(),
            failed_already_started: "Can't join this match - it has already started!".to_string(),
            failed_full: "Can't join this match - the instance is already full!".to_string(),
            failed_no_permission: "Can't join this match - you don't have the permission!"
                .to_string(),
            failed_spectating_disabled: "Can't join this match - spectators are not allowed!"
                .to_string(),
            failed_already_in_match: "Can't join this match - you are already in one!".to_string(),
            failed_not_enough_players:
                "This match requires $amount players before starting - can't start yet!"
                    .to_string(),
            starting_title: "Match starting!".to_string(),
            starting_subtitle: "in $count...".to_string(),
            prevent_teleport_in:
                "You have attempted to teleport into an ongoing match - you can't do that!"
                    .to_string(),
            prevent_teleport_out:
                "You have attempted to teleport from an ongoing match - you can't do that!"
                    .to_string(),
            operator_intruder_warning:
                "You are intruding on a match, but won't get kicked because you're an operator!"
                    .to_string(),
        }
    }
}

/// Builder for [`MatchConfiguration`].
///
/// Defaults: `max_players = 1`, `lives = 1`, `protected = true`,
/// `redstone_prevented = true`; everything else off or unset.
#[derive(Debug, Clone)]
pub struct MatchConfigurationBuilder {
    config: MatchConfiguration,
}

impl Default for MatchConfigurationBuilder {
    fn default() -> Self {
        Self {
            config: MatchConfiguration {
                min_players: 0,
                max_players: 1,
                lives: 1,
                lobby_location: None,
                start_location: None,
                exit_location: None,
                fallback_location: None,
                spectatable: false,
                respawnable: false,
                protected: true,
                pvp_prevented: false,
                redstone_prevented: true,
                world_based: false,
                permission: None,
                match_game_mode: None,
                leave_game_mode: GameMode::Survival,
                messages: MatchMessages::default(),
            },
        }
    }
}

impl MatchConfigurationBuilder {
    pub fn min_players(mut self, min_players: u32) -> Self {
        self.config.min_players = min_players;
        self
    }

    pub fn max_players(mut self, max_players: u32) -> Self {
        self.config.max_players = max_players;
        self
    }

    pub fn lives(mut self, lives: u32) -> Self {
        self.config.lives = lives;
        self
    }

    pub fn lobby_location(mut self, location: Location) -> Self {
        self.config.lobby_location = Some(location);
        self
    }

    pub fn start_location(mut self, location: Location) -> Self {
        self.config.start_location = Some(location);
        self
    }

    pub fn exit_location(mut self, location: Location) -> Self {
        self.config.exit_location = Some(location);
        self
    }

    pub fn fallback_location(mut self, location: Location) -> Self {
        self.config.fallback_location = Some(location);
        self
    }

    pub fn spectatable(mut self, spectatable: bool) -> Self {
        self.config.spectatable = spectatable;
        self
    }

    pub fn respawnable(mut self, respawnable: bool) -> Self {
        self.config.respawnable = respawnable;
        self
    }

    pub fn protected(mut self, protected: bool) -> Self {
        self.config.protected = protected;
        self
    }

    pub fn pvp_prevented(mut self, pvp_prevented: bool) -> Self {
        self.config.pvp_prevented = pvp_prevented;
        self
    }

    pub fn redstone_prevented(mut self, redstone_prevented: bool) -> Self {
        self.config.redstone_prevented = redstone_prevented;
        self
    }

    pub fn world_based(mut self, world_based: bool) -> Self {
        self.config.world_based = world_based;
        self
    }

    pub fn permission(mut self, permission: impl Into<String>) -> Self {
        self.config.permission = Some(permission.into());
        self
    }

    pub fn match_game_mode(mut self, mode: GameMode) -> Self {
        self.config.match_game_mode = Some(mode);
        self
    }

    pub fn leave_game_mode(mut self, mode: GameMode) -> Self {
        self.config.leave_game_mode = mode;
        self
    }

    pub fn messages(mut self, messages: MatchMessages) -> Self {
        self.config.messages = messages;
        self
    }

    pub fn build(self) -> MatchConfiguration {
        self.config
    }
}
