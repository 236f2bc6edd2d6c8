//! # Arena Event System
//!
//! Shared foundation for the Arena Core match orchestration library. This
//! crate carries the pieces both the orchestrator and host integrations need:
//!
//! - [`types`] - Identifier newtypes, locations, region bounds, and the
//!   teleport-reason tagging that replaces global bypass flags
//! - [`notices`] - Typed, optionally-cancellable notices dispatched
//!   synchronously to external listeners before match lifecycle actions
//! - [`host`] - The [`HostServer`] trait, the single seam through which the
//!   orchestrator talks to the actual game server
//!
//! ## Design Principles
//!
//! - **Type Safety**: Wrapper types prevent ID confusion (PlayerId vs WorldId)
//! - **No Hidden Globals**: teleport intent travels with each request as a
//!   [`TeleportReason`] instead of a shared mutable flag
//! - **Veto Before Mutation**: notices are dispatched and checked for
//!   cancellation before the triggering operation touches any state

pub mod host;
pub mod notices;
pub mod types;

pub use host::{HostError, HostServer};
pub use notices::{
    MatchDestroyNotice, MatchInstantiateNotice, MatchJoinNotice, MatchLeaveNotice, Notice,
    NoticeBus,
};
pub use types::{
    GameMode, InstanceId, Location, PlayerId, RegionBounds, TeleportReason, TeleportVerdict,
    WorldId,
};

use std::sync::Arc;

/// Creates a new notice bus ready for handler registration.
///
/// This is the primary factory function for the notice bus. It returns an
/// `Arc<NoticeBus>` that can be shared between the orchestrator and any
/// external listeners that want to observe or veto match lifecycle actions.
pub fn create_notice_bus() -> Arc<NoticeBus> {
    Arc::new(NoticeBus::new())
}
