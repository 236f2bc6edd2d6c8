//! # Match Lifecycle Notices
//!
//! Typed, optionally-cancellable decision objects dispatched to external
//! listeners around match lifecycle actions. The orchestrator constructs a
//! notice, hands it synchronously to every registered handler, then inspects
//! its cancelled flag before mutating any state.
//!
//! Handlers run sequentially in registration order on the caller's thread.
//! A handler that panics is the host's bug, not isolated here; handlers are
//! expected to be cheap veto/bookkeeping callbacks.
//!
//! Instantiate and join notices are enforced vetoes: a cancelled notice
//! aborts the triggering operation before any side effect. Leave and destroy
//! notices are informational; their cancelled flag is never consulted.

use crate::types::{InstanceId, PlayerId};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use tracing::debug;

// ============================================================================
// Notice Trait
// ============================================================================

/// Core trait implemented by every lifecycle notice.
///
/// Notices must be `Send + Sync` so a bus shared across tasks stays usable,
/// and `Any` so the bus can route them by concrete type.
pub trait Notice: Any + Send + Sync + std::fmt::Debug {
    /// Stable name for logging and diagnostics.
    fn notice_name(&self) -> &'static str;

    /// Mutable `Any` access for handler downcasting.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

macro_rules! impl_notice {
    ($ty:ty, $name:literal) => {
        impl Notice for $ty {
            fn notice_name(&self) -> &'static str {
                $name
            }

            fn as_any_mut(&mut self) -> &mut dyn Any {
                self
            }
        }
    };
}

// ============================================================================
// Concrete Notices
// ============================================================================

/// Dispatched by `MatchInstance::start()` before any scheduling happens.
///
/// Cancelling aborts the start: no tick task is spawned and the countdown is
/// never armed.
#[derive(Debug)]
pub struct MatchInstantiateNotice {
    pub instance_id: InstanceId,
    cancelled: bool,
}

impl MatchInstantiateNotice {
    pub fn new(instance_id: InstanceId) -> Self {
        Self {
            instance_id,
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

impl_notice!(MatchInstantiateNotice, "match_instantiate");

/// Dispatched before a player or spectator is admitted to a match.
///
/// Cancelling rejects the admission with no membership change.
#[derive(Debug)]
pub struct MatchJoinNotice {
    pub instance_id: InstanceId,
    pub player_id: PlayerId,
    cancelled: bool,
}

impl MatchJoinNotice {
    pub fn new(instance_id: InstanceId, player_id: PlayerId) -> Self {
        Self {
            instance_id,
            player_id,
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

impl_notice!(MatchJoinNotice, "match_join");

/// Dispatched when a participant leaves a match, after their game mode,
/// health, and location have been restored. Informational.
#[derive(Debug)]
pub struct MatchLeaveNotice {
    pub instance_id: InstanceId,
    pub player_id: PlayerId,
}

impl MatchLeaveNotice {
    pub fn new(instance_id: InstanceId, player_id: PlayerId) -> Self {
        Self {
            instance_id,
            player_id,
        }
    }
}

impl_notice!(MatchLeaveNotice, "match_leave");

/// Dispatched once per instance at the end of teardown. Informational.
#[derive(Debug)]
pub struct MatchDestroyNotice {
    pub instance_id: InstanceId,
}

impl MatchDestroyNotice {
    pub fn new(instance_id: InstanceId) -> Self {
        Self { instance_id }
    }
}

impl_notice!(MatchDestroyNotice, "match_destroy");

// ============================================================================
// Notice Bus
// ============================================================================

type BoxedHandler = Box<dyn Fn(&mut dyn Notice) + Send + Sync>;

/// Synchronous publish/subscribe hub for lifecycle notices.
///
/// Registration and dispatch are keyed by concrete notice type. Dispatch
/// holds only a read lock, so handlers may not register further handlers
/// from inside a dispatch.
#[derive(Default)]
pub struct NoticeBus {
    handlers: RwLock<HashMap<TypeId, Vec<BoxedHandler>>>,
}

impl NoticeBus {
    /// Creates a bus with no registered handlers.
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a handler for notices of type `T`.
    ///
    /// Handlers receive the notice mutably and may cancel it where the notice
    /// supports cancellation.
    pub fn on<T, F>(&self, handler: F)
    where
        T: Notice,
        F: Fn(&mut T) + Send + Sync + 'static,
    {
        let wrapped: BoxedHandler = Box::new(move |notice| {
            if let Some(typed) = notice.as_any_mut().downcast_mut::<T>() {
                handler(typed);
            }
        });
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(TypeId::of::<T>())
            .or_default()
            .push(wrapped);
    }

    /// Dispatches `notice` to every handler registered for its type, in
    /// registration order. The caller inspects the notice afterwards.
    pub fn dispatch<T: Notice>(&self, notice: &mut T) {
        let guard = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(handlers) = guard.get(&TypeId::of::<T>()) {
            debug!(
                notice = notice.notice_name(),
                handlers = handlers.len(),
                "dispatching notice"
            );
            for handler in handlers {
                handler(notice);
            }
        }
    }

    /// Number of handlers registered across all notice types.
    pub fn handler_count(&self) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(Vec::len)
            .sum()
    }
}

impl std::fmt::Debug for NoticeBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NoticeBus")
            .field("handlers", &self.handler_count())
            .finish()
    }
}
