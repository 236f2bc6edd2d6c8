//! # Core Type Definitions
//!
//! Fundamental types used throughout the Arena match orchestration system.
//! These provide the building blocks for identifying players, worlds, and
//! match instances, and for describing positions and arena boundaries.
//!
//! ## Key Types
//!
//! - [`PlayerId`] / [`WorldId`] / [`InstanceId`] - Unique identifiers
//! - [`Location`] - A world-qualified 3D position
//! - [`RegionBounds`] - Axis-aligned spatial boundary for an arena
//! - [`TeleportReason`] - Per-request tag distinguishing system-initiated
//!   teleports from player-initiated ones

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Identifier Newtypes
// ============================================================================

/// Unique identifier for a player.
///
/// Wrapper around UUID that provides type safety and ensures player IDs
/// cannot be confused with world or instance IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlayerId(pub Uuid);

impl PlayerId {
    /// Creates a new random player ID using UUID v4.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::str::FromStr for PlayerId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl Default for PlayerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PlayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a loaded world.
///
/// Worlds are the coarse unit of region binding for world-backed match
/// instances: the whole world is the match region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorldId(pub Uuid);

impl WorldId {
    /// Creates a new random world ID using UUID v4.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for WorldId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for WorldId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for one match instance.
///
/// An instance is single-use: a new match gets a new ID, and a destroyed ID
/// is never reissued to a live instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceId(pub Uuid);

impl InstanceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for InstanceId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for InstanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Spatial Types
// ============================================================================

/// A world-qualified position.
///
/// Unlike a bare coordinate triple, a `Location` always knows which world it
/// belongs to, which is what the containment watchdogs and teleport review
/// actually care about.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub world: WorldId,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Location {
    pub fn new(world: WorldId, x: f64, y: f64, z: f64) -> Self {
        Self { world, x, y, z }
    }
}

/// Axis-aligned bounding box delimiting an arena inside a world.
///
/// Used by bounds-backed match instances to answer region membership when the
/// arena does not own a whole dedicated world.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegionBounds {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
    pub min_z: f64,
    pub max_z: f64,
}

impl RegionBounds {
    pub fn new(min_x: f64, min_y: f64, min_z: f64, max_x: f64, max_y: f64, max_z: f64) -> Self {
        Self {
            min_x,
            max_x,
            min_y,
            max_y,
            min_z,
            max_z,
        }
    }

    /// Whether the coordinates of `location` fall inside this box.
    ///
    /// World identity is not checked here; callers pair bounds with the world
    /// they apply to.
    pub fn contains(&self, location: &Location) -> bool {
        location.x >= self.min_x
            && location.x <= self.max_x
            && location.y >= self.min_y
            && location.y <= self.max_y
            && location.z >= self.min_z
            && location.z <= self.max_z
    }
}

// ============================================================================
// Player-Facing Modes and Teleport Tagging
// ============================================================================

/// Player game mode as understood by the host server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameMode {
    Survival,
    Creative,
    Adventure,
    Spectator,
}

/// Why a teleport is happening.
///
/// Every teleport request carries its reason. `System` marks teleports issued
/// by the orchestrator itself (join placement, containment snap-back,
/// eviction) which must pass teleport review unconditionally. This replaces
/// the one-shot shared bypass flag of older designs: the tag is consumed with
/// the request it belongs to, so back-to-back system teleports cannot race.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TeleportReason {
    /// Initiated by the player (commands, portals, third-party plugins).
    Player,
    /// Initiated by the orchestrator; exempt from teleport review.
    System,
}

/// Outcome of reviewing a teleport request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TeleportVerdict {
    /// Let the teleport proceed.
    Allow,
    /// Cancel the teleport; `message` is shown to the player.
    Deny { message: String },
}

impl TeleportVerdict {
    pub fn is_allowed(&self) -> bool {
        matches!(self, TeleportVerdict::Allow)
    }
}
