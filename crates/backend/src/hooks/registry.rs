//! Registry of hook handlers.
//!
//! Handlers are grouped by [`HookType`] in a `DashMap`, and returned in
//! registration order. Identifiers come from a per-registry counter and are
//! never reused. Lifecycle changes are published on a broadcast channel;
//! publishing never blocks and a missing or lagging subscriber only loses
//! notifications.

use std::{
  sync::{
    Arc,
    atomic::{AtomicU8, AtomicU64, Ordering},
  },
  time::Duration,
};

use dashmap::DashMap;
use hookwise_core::{HandlerId, HookType};
use tokio::sync::broadcast;
use tracing::{debug, trace};

use super::{HandlerConfig, HookHandler};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// `Registered -> Active -> Unregistered`; `Unregistered` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerState {
  /// Registered but not yet picked up by an execution
  Registered,
  /// Included in at least one execution snapshot
  Active,
  Unregistered,
}

impl HandlerState {
  fn from_u8(v: u8) -> Self {
    match v {
      0 => Self::Registered,
      1 => Self::Active,
      _ => Self::Unregistered,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
  Registered {
    id: HandlerId,
    hook_type: HookType,
    name: String,
  },
  Unregistered {
    id: HandlerId,
    hook_type: HookType,
    name: String,
  },
}

/// A handler as held by the registry. Never mutated after registration,
/// apart from its lifecycle state.
pub struct RegisteredHandler {
  pub id: HandlerId,
  pub hook_type: HookType,
  pub handler: Arc<dyn HookHandler>,
  pub config: HandlerConfig,
  state: AtomicU8,
}

impl RegisteredHandler {
  pub fn name(&self) -> &str {
    self.handler.name()
  }

  pub fn state(&self) -> HandlerState {
    HandlerState::from_u8(self.state.load(Ordering::Acquire))
  }

  /// Registered -> Active. No-op in any other state.
  pub(crate) fn mark_active(&self) {
    let _ = self.state.compare_exchange(0, 1, Ordering::AcqRel, Ordering::Acquire);
  }

  fn mark_unregistered(&self) {
    self.state.store(2, Ordering::Release);
  }

  /// Registration override, then the handler's own timeout.
  pub fn timeout_override(&self) -> Option<Duration> {
    self.config.timeout.or_else(|| self.handler.timeout())
  }
}

impl std::fmt::Debug for RegisteredHandler {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("RegisteredHandler")
      .field("id", &self.id)
      .field("hook_type", &self.hook_type)
      .field("name", &self.name())
      .field("state", &self.state())
      .finish()
  }
}

pub struct HookRegistry {
  handlers: DashMap<HookType, Vec<Arc<RegisteredHandler>>>,
  next_id: AtomicU64,
  events: broadcast::Sender<RegistryEvent>,
}

impl HookRegistry {
  pub fn new() -> Self {
    let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
    Self {
      handlers: DashMap::new(),
      next_id: AtomicU64::new(1),
      events,
    }
  }

  pub fn register(
    &self,
    hook_type: HookType,
    handler: Arc<dyn HookHandler>,
    config: Option<HandlerConfig>,
  ) -> HandlerId {
    let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
    let name = handler.name().to_string();
    let entry = Arc::new(RegisteredHandler {
      id,
      hook_type: hook_type.clone(),
      handler,
      config: config.unwrap_or_default(),
      state: AtomicU8::new(0),
    });

    self.handlers.entry(hook_type.clone()).or_default().push(entry);
    debug!(hook = %hook_type, handler = %name, id = %id, "Registered hook handler");

    self.publish(RegistryEvent::Registered { id, hook_type, name });
    id
  }

  /// Returns `false` if `id` is not registered for `hook_type`.
  pub fn unregister(&self, hook_type: &HookType, id: HandlerId) -> bool {
    let removed = {
      let Some(mut handlers) = self.handlers.get_mut(hook_type) else {
        return false;
      };
      let Some(pos) = handlers.iter().position(|h| h.id == id) else {
        return false;
      };
      handlers.remove(pos)
    };
    self.handlers.remove_if(hook_type, |_, handlers| handlers.is_empty());

    removed.mark_unregistered();
    debug!(hook = %hook_type, handler = %removed.name(), id = %id, "Unregistered hook handler");

    self.publish(RegistryEvent::Unregistered {
      id,
      hook_type: hook_type.clone(),
      name: removed.name().to_string(),
    });
    true
  }

  /// Current handlers for `hook_type`, in registration order.
  pub fn handlers(&self, hook_type: &HookType) -> Vec<Arc<RegisteredHandler>> {
    self.handlers.get(hook_type).map(|h| h.clone()).unwrap_or_default()
  }

  pub fn hook_types(&self) -> Vec<HookType> {
    let mut types: Vec<HookType> = self.handlers.iter().map(|e| e.key().clone()).collect();
    types.sort();
    types
  }

  pub fn len(&self) -> usize {
    self.handlers.iter().map(|e| e.value().len()).sum()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
    self.events.subscribe()
  }

  fn publish(&self, event: RegistryEvent) {
    if self.events.send(event).is_err() {
      trace!("No registry subscribers");
    }
  }
}

impl Default for HookRegistry {
  fn default() -> Self {
    Self::new()
  }
}
