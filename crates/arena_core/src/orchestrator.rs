//! # Match Orchestrator
//!
//! The process-wide service that owns every registry the library needs: the
//! host handle, the notice bus, live instances, participant membership, and
//! world protection. All state lives on the orchestrator instance itself, so
//! several orchestrators can coexist in one process and tests get a fresh
//! world each time.
//!
//! The `handle_*` methods are the integration surface for the host's event
//! pipeline: the embedding server forwards its teleport, damage, environment,
//! quit, and world-unload notifications here and honors the returned
//! verdicts.

use crate::config::MatchConfiguration;
use crate::instance::{InstanceState, MatchInstance, RegionBinding};
use crate::player::{MatchPlayer, ParticipantRegistry};
use crate::protection::{DamageEvent, EnvironmentEvent, ProtectionRegistry};
use arena_event_system::{
    create_notice_bus, HostError, HostServer, InstanceId, Location, NoticeBus, PlayerId,
    TeleportReason, TeleportVerdict, WorldId,
};
use dashmap::DashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Owner of all match-orchestration state for one host process.
pub struct MatchOrchestrator {
    host: Arc<dyn HostServer>,
    notices: Arc<NoticeBus>,
    instances: DashMap<InstanceId, Arc<MatchInstance>>,
    participants: ParticipantRegistry,
    protection: ProtectionRegistry,
}

impl std::fmt::Debug for MatchOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatchOrchestrator")
            .field("instances", &self.instances.len())
            .field("participants", &self.participants.len())
            .finish()
    }
}

impl MatchOrchestrator {
    pub fn new(host: Arc<dyn HostServer>) -> Arc<Self> {
        Arc::new(Self {
            host,
            notices: create_notice_bus(),
            instances: DashMap::new(),
            participants: ParticipantRegistry::new(),
            protection: ProtectionRegistry::new(),
        })
    }

    pub fn host(&self) -> Arc<dyn HostServer> {
        Arc::clone(&self.host)
    }

    pub fn notices(&self) -> &NoticeBus {
        &self.notices
    }

    pub fn participants(&self) -> &ParticipantRegistry {
        &self.participants
    }

    pub fn protection(&self) -> &ProtectionRegistry {
        &self.protection
    }

    /// The player's current match membership, if any.
    pub fn participant(&self, player: PlayerId) -> Option<Arc<MatchPlayer>> {
        self.participants.get(player)
    }

    pub fn instance(&self, id: InstanceId) -> Option<Arc<MatchInstance>> {
        self.instances.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    /// Snapshot of every live instance.
    pub fn instances(&self) -> Vec<Arc<MatchInstance>> {
        self.instances
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    // ========================================================================
    // Instance lifecycle
    // ========================================================================

    /// Creates and registers a new match instance over the given region.
    ///
    /// World bindings are enrolled in the protection sets according to the
    /// configuration flags; bounds bindings share their world and are never
    /// enrolled. The instance is inert until [`MatchInstance::start`] is
    /// called on it.
    pub fn create_match(
        self: &Arc<Self>,
        configuration: MatchConfiguration,
        region: RegionBinding,
    ) -> Arc<MatchInstance> {
        let configuration = Arc::new(configuration);
        if let RegionBinding::World { world, .. } = &region {
            if configuration.protected {
                self.protection.add_protected_world(*world);
            }
            if configuration.pvp_prevented {
                self.protection.add_pvp_prevented_world(*world);
            }
            if configuration.redstone_prevented {
                self.protection.add_redstone_prevented_world(*world);
            }
        }
        let instance = MatchInstance::new(Arc::clone(self), configuration, region);
        self.instances.insert(instance.id(), Arc::clone(&instance));
        info!(instance = %instance.id(), total = self.instances.len(), "match registered");
        instance
    }

    /// Creates a fresh disposable world from the generator and binds a new
    /// match to it. The world is named by a random UUID under `storage_root`
    /// and is deleted outright when the match is destroyed.
    pub async fn create_world_match(
        self: &Arc<Self>,
        configuration: MatchConfiguration,
        generator: &str,
        storage_root: &Path,
    ) -> Result<Arc<MatchInstance>, HostError> {
        let name = Uuid::new_v4().to_string();
        let world = self.host.create_world(&name, generator).await?;
        let storage = storage_root.join(&name);
        debug!(%world, name, "disposable match world created");
        Ok(self.create_match(
            configuration,
            RegionBinding::World { world, storage },
        ))
    }

    pub(crate) fn remove_instance(&self, id: InstanceId) {
        self.instances.remove(&id);
    }

    // ========================================================================
    // Host event surface
    // ========================================================================

    /// Reviews a player teleport request against match containment.
    ///
    /// System-tagged teleports always pass; they are the orchestrator's own
    /// moves. Participants of a match that has left `Waiting` may not
    /// teleport at all. Cross-world teleports into or out of a world bound
    /// to a match are denied for everyone except that match's own
    /// participants during `Waiting`.
    pub async fn review_teleport(
        &self,
        player: PlayerId,
        from: &Location,
        to: &Location,
        reason: TeleportReason,
    ) -> TeleportVerdict {
        if reason == TeleportReason::System {
            return TeleportVerdict::Allow;
        }

        let membership = self.participants.get(player);
        if let Some(match_player) = &membership {
            if let Some(instance) = match_player.instance() {
                if instance.state() != InstanceState::Waiting {
                    return TeleportVerdict::Deny {
                        message: instance.configuration().messages.prevent_teleport_out.clone(),
                    };
                }
            }
        }

        if from.world == to.world {
            return TeleportVerdict::Allow;
        }

        let member_of = membership
            .as_ref()
            .and_then(|match_player| match_player.instance_id());
        for entry in self.instances.iter() {
            let instance = entry.value();
            let RegionBinding::World { world, .. } = instance.region() else {
                continue;
            };
            if member_of == Some(instance.id()) {
                // Their own match, still waiting; both directions are fine.
                continue;
            }
            let messages = &instance.configuration().messages;
            if to.world == *world {
                return TeleportVerdict::Deny {
                    message: messages.prevent_teleport_in.clone(),
                };
            }
            if from.world == *world {
                return TeleportVerdict::Deny {
                    message: messages.prevent_teleport_out.clone(),
                };
            }
        }

        TeleportVerdict::Allow
    }

    /// Disconnect cleanup: a quitting participant leaves their match through
    /// the normal exit path.
    pub async fn handle_player_quit(&self, player: PlayerId) {
        if let Some(match_player) = self.participants.get(player) {
            debug!(%player, "participant disconnected, removing from match");
            match_player.remove().await;
        }
    }

    /// Filters a damage event: PvP prevention first, then lethal-damage
    /// interception for participants.
    ///
    /// A participant never dies a real death inside a match. Damage that
    /// would kill them is cancelled; in an ongoing match it is routed through
    /// the lives flow, in any other state the participant is simply removed.
    pub async fn handle_damage(&self, event: &mut DamageEvent) {
        self.protection.apply_damage(event);
        if event.is_cancelled() {
            return;
        }

        let Some(match_player) = self.participants.get(event.victim) else {
            return;
        };
        let Some(instance) = match_player.instance() else {
            return;
        };
        let Some(health) = self.host.health(event.victim).await else {
            return;
        };
        if event.damage < health {
            return;
        }

        event.cancel();
        if instance.state() == InstanceState::Ongoing {
            instance.player_death(&match_player).await;
        } else {
            match_player.remove().await;
        }
    }

    /// Filters an environment event against the protection sets.
    pub fn handle_environment(&self, event: &mut EnvironmentEvent) {
        self.protection.apply(event);
    }

    /// World-unload notification; drops stale protection entries.
    pub fn on_world_unloaded(&self, world: WorldId) {
        self.protection.on_world_unloaded(world);
    }

    /// Process-wide shutdown hook: destroys every live instance and clears
    /// protection.
    ///
    /// When the host reports shutdown in progress, each instance tears its
    /// world down synchronously before this returns.
    pub async fn shutdown(&self) {
        info!(instances = self.instances.len(), "match orchestrator shutting down");
        let live: Vec<_> = self
            .instances
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        for instance in live {
            instance.destroy_match().await;
        }
        self.instances.clear();
        self.protection.clear();
    }
}
