//! Error types for match orchestration.
//!
//! Admission failures are the interesting taxonomy here: all of them are
//! non-fatal, the rejected player has already been told why, and no match
//! state was mutated. Teardown failures never surface as errors at all; they
//! are logged and the teardown sequence continues, because a stale world
//! directory is recoverable while a stuck instance registry entry is not.

use arena_event_system::PlayerId;

/// Why a player or spectator was not admitted to a match.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AdmissionError {
    /// An external listener cancelled the join notice.
    #[error("Join vetoed by an external listener")]
    Vetoed,
    /// The match requires a permission the player does not hold.
    #[error("Player {0} lacks the required permission")]
    MissingPermission(PlayerId),
    /// New players cannot join once the match has left the waiting state.
    #[error("Match has already started")]
    AlreadyStarted,
    /// Admitting the player would exceed the configured maximum.
    #[error("Match is full")]
    Full,
    /// The configuration does not allow spectators.
    #[error("Match is not spectatable")]
    SpectatingDisabled,
    /// The player is already a participant of a live match.
    #[error("Player {0} is already in a match")]
    AlreadyInMatch(PlayerId),
}
