//! # Protection Registry
//!
//! Tracks which worlds are under match protection, PvP prevention, and
//! redstone prevention, and filters environment-mutation events against those
//! sets. Players on the bypass list are exempt from the checks that have an
//! acting player; purely environmental effects (fire spread, liquid flow,
//! decay) are blocked outright in protected worlds.
//!
//! The registry never mutates anything but the event it is handed: it flips
//! the cancelled flag or clears the effect list, nothing else.

use arena_event_system::{Location, PlayerId, WorldId};
use dashmap::DashSet;
use tracing::debug;

// ============================================================================
// Environment Events
// ============================================================================

/// A mutation-capable event reported by the host, normalized to the fields
/// protection filtering cares about.
#[derive(Debug, Clone)]
pub enum EnvironmentAction {
    BlockBreak { world: WorldId, actor: PlayerId },
    BlockPlace { world: WorldId, actor: PlayerId },
    BlockBurn { world: WorldId },
    BlockIgnite { world: WorldId },
    /// An explosion with its list of affected blocks; protection clears the
    /// list instead of cancelling so the visual effect survives.
    Explosion {
        world: WorldId,
        affected_blocks: Vec<Location>,
    },
    LiquidFlow { world: WorldId },
    SignEdit { world: WorldId, actor: PlayerId },
    DoorInteract { world: WorldId, actor: PlayerId },
    RedstoneTrigger { world: WorldId, actor: PlayerId },
    BucketEmpty { world: WorldId, actor: PlayerId },
    LeafDecay { world: WorldId },
    CreatureSpawn { world: WorldId, custom: bool },
    EntityChangeBlock { world: WorldId },
}

impl EnvironmentAction {
    fn world(&self) -> WorldId {
        match self {
            Self::BlockBreak { world, .. }
            | Self::BlockPlace { world, .. }
            | Self::BlockBurn { world }
            | Self::BlockIgnite { world }
            | Self::Explosion { world, .. }
            | Self::LiquidFlow { world }
            | Self::SignEdit { world, .. }
            | Self::DoorInteract { world, .. }
            | Self::RedstoneTrigger { world, .. }
            | Self::BucketEmpty { world, .. }
            | Self::LeafDecay { world }
            | Self::CreatureSpawn { world, .. }
            | Self::EntityChangeBlock { world } => *world,
        }
    }

    fn actor(&self) -> Option<PlayerId> {
        match self {
            Self::BlockBreak { actor, .. }
            | Self::BlockPlace { actor, .. }
            | Self::SignEdit { actor, .. }
            | Self::DoorInteract { actor, .. }
            | Self::RedstoneTrigger { actor, .. }
            | Self::BucketEmpty { actor, .. } => Some(*actor),
            _ => None,
        }
    }
}

/// Cancellable wrapper around an [`EnvironmentAction`].
#[derive(Debug, Clone)]
pub struct EnvironmentEvent {
    pub action: EnvironmentAction,
    cancelled: bool,
}

impl EnvironmentEvent {
    pub fn new(action: EnvironmentAction) -> Self {
        Self {
            action,
            cancelled: false,
        }
    }

    pub fn cancel(&mut self) {
        self.cancelled = true;
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }
}

/// Where damage to a player came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DamageSource {
    /// Direct melee damage from another player.
    Player(PlayerId),
    /// A projectile shot by another player.
    PlayerProjectile(PlayerId),
    /// A hostile or neutral entity.
    Entity,
    /// Fall damage, fire, drowning, and other world hazards.
    Environment,
}

/// Cancellable damage event against a player.
#[derive(Debug, Clone)]
pub struct DamageEvent {
    pub victim: PlayerId,
    pub world: WorldId,
    pub source: DamageSource,
    /// Final damage after armor and resistances.
    pub damage: f64,
    cancelled: bool,
}

impl DamageEvent {
    pub fn new(victim: PlayerId, world: WorldId, source: DamageSource, damage: f64) -> Self {
        Self {
            victim,
            world,
            source,
            damage,
            cancelled: false,
        }
    }

    pub fn cancel(&mut self) {
        self.cancelled = true;
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }
}

// ============================================================================
// Protection Registry
// ============================================================================

/// Membership sets driving environment and PvP filtering.
///
/// Owned by the orchestrator; all mutation goes through the explicit add and
/// remove calls below plus [`ProtectionRegistry::on_world_unloaded`], which
/// keeps the sets from leaking entries for destroyed worlds.
#[derive(Debug, Default)]
pub struct ProtectionRegistry {
    protected: DashSet<WorldId>,
    pvp_prevented: DashSet<WorldId>,
    redstone_prevented: DashSet<WorldId>,
    bypassing: DashSet<PlayerId>,
}

impl ProtectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_protected_world(&self, world: WorldId) {
        self.protected.insert(world);
    }

    pub fn remove_protected_world(&self, world: WorldId) {
        self.protected.remove(&world);
    }

    pub fn is_protected(&self, world: WorldId) -> bool {
        self.protected.contains(&world)
    }

    pub fn add_pvp_prevented_world(&self, world: WorldId) {
        self.pvp_prevented.insert(world);
    }

    pub fn remove_pvp_prevented_world(&self, world: WorldId) {
        self.pvp_prevented.remove(&world);
    }

    pub fn is_pvp_prevented(&self, world: WorldId) -> bool {
        self.pvp_prevented.contains(&world)
    }

    pub fn add_redstone_prevented_world(&self, world: WorldId) {
        self.redstone_prevented.insert(world);
    }

    pub fn remove_redstone_prevented_world(&self, world: WorldId) {
        self.redstone_prevented.remove(&world);
    }

    pub fn is_redstone_prevented(&self, world: WorldId) -> bool {
        self.redstone_prevented.contains(&world)
    }

    /// Flips bypass status for a player and returns the new status.
    ///
    /// Bypassing players are exempt from protection checks, which lets
    /// administrators enter and build inside protected arenas without
    /// relaxing protection for everyone.
    pub fn toggle_bypass(&self, player: PlayerId) -> bool {
        if self.bypassing.remove(&player).is_some() {
            false
        } else {
            self.bypassing.insert(player);
            true
        }
    }

    pub fn is_bypassing(&self, player: PlayerId) -> bool {
        self.bypassing.contains(&player)
    }

    /// Filters one environment event against the protection sets.
    pub fn apply(&self, event: &mut EnvironmentEvent) {
        let world = event.action.world();

        // Redstone prevention is its own set, checked regardless of general
        // protection status.
        if let EnvironmentAction::RedstoneTrigger { actor, .. } = event.action {
            if self.is_redstone_prevented(world) && !self.is_bypassing(actor) {
                event.cancel();
            }
            return;
        }

        if !self.is_protected(world) {
            return;
        }

        if let Some(actor) = event.action.actor() {
            if self.is_bypassing(actor) {
                return;
            }
        }

        match &mut event.action {
            EnvironmentAction::Explosion {
                affected_blocks, ..
            } => {
                affected_blocks.clear();
            }
            EnvironmentAction::CreatureSpawn { custom, .. } => {
                if !*custom {
                    event.cancel();
                }
            }
            _ => event.cancel(),
        }
    }

    /// Cancels player-inflicted damage to players in PvP-prevented worlds.
    pub fn apply_damage(&self, event: &mut DamageEvent) {
        if !self.is_pvp_prevented(event.world) {
            return;
        }
        if matches!(
            event.source,
            DamageSource::Player(_) | DamageSource::PlayerProjectile(_)
        ) {
            event.cancel();
        }
    }

    /// Drops the world from every set. Invoked on world-unload notifications
    /// so destroyed regions never linger in the registries.
    pub fn on_world_unloaded(&self, world: WorldId) {
        self.protected.remove(&world);
        self.pvp_prevented.remove(&world);
        self.redstone_prevented.remove(&world);
        debug!(%world, "protection entries dropped for unloaded world");
    }

    /// Clears every set. Shutdown only.
    pub fn clear(&self) {
        self.protected.clear();
        self.pvp_prevented.clear();
        self.redstone_prevented.clear();
        self.bypassing.clear();
    }
}
