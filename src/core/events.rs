//! Events emitted after successful requests

use crate::core::error::Result;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Actions that change bucket contents
pub const WRITE_ACTIONS: [&str; 3] = ["mfs::PutObject", "mfs::PutObjectACL", "mfs::DeleteObject"];

/// What happened, to what, and by whom
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Authenticated subject; absent for public operations
    pub username: Option<String>,
    /// Permission of the operation, e.g. `mfs::PutObject`
    pub action: String,
    pub resource: String,
}

impl Event {
    pub fn is_write(&self) -> bool {
        WRITE_ACTIONS.contains(&self.action.as_str())
    }
}

/// Destination for events
///
/// Publishing must not block the request; failures are reported to the
/// caller, which logs and drops them.
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: &Event) -> Result<()>;
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NullPublisher;

impl EventPublisher for NullPublisher {
    fn publish(&self, event: &Event) -> Result<()> {
        debug!("Dropping event {} on {}", event.action, event.resource);
        Ok(())
    }
}

/// Keeps events in memory, for embedding and tests
#[derive(Debug, Default)]
pub struct MemoryPublisher {
    events: Mutex<Vec<Event>>,
}

impl MemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything published so far
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventPublisher for MemoryPublisher {
    fn publish(&self, event: &Event) -> Result<()> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}
