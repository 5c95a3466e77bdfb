//! Event handler registry for manager event frames

use crate::protocol::ManagerFrame;
use std::collections::HashMap;
use tracing::trace;

/// Registry key matching any event without a dedicated handler.
pub const WILDCARD_EVENT: &str = "*";

/// Event callback: `(event_name, frame, server, port) -> T`.
///
/// `event_name` is the lower-cased `Event` header. Plain `fn` items and
/// closures both fit.
pub type EventHandler<T = ()> = Box<dyn FnMut(&str, &ManagerFrame, &str, u16) -> T + Send>;

/// Maps lower-cased event names to handlers.
///
/// At most one handler per name; registering an occupied name fails instead of
/// replacing it. Frames whose event has no handler fall back to
/// [`WILDCARD_EVENT`].
///
/// ```
/// use asterisk_agi_tokio::{EventRegistry, ManagerFrame};
///
/// let mut registry: EventRegistry<String> = EventRegistry::new();
/// assert!(registry.register("Hangup", |name, frame, _server, _port| {
///     format!("{} on {}", name, frame.header("Channel").unwrap_or("?"))
/// }));
/// assert!(!registry.register("hangup", |_, _, _, _| String::new()));
///
/// let frame = ManagerFrame::parse("Event: Hangup\r\nChannel: SIP/100-0001");
/// assert_eq!(
///     registry.dispatch(&frame, "localhost", 5038).as_deref(),
///     Some("hangup on SIP/100-0001")
/// );
/// ```
pub struct EventRegistry<T = ()> {
    handlers: HashMap<String, EventHandler<T>>,
}

impl<T> std::fmt::Debug for EventRegistry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&str> = self
            .handlers
            .keys()
            .map(String::as_str)
            .collect();
        names.sort_unstable();
        f.debug_struct("EventRegistry")
            .field("handlers", &names)
            .finish()
    }
}

impl<T> Default for EventRegistry<T> {
    fn default() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }
}

impl<T> EventRegistry<T> {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `event` (case-insensitive). Returns `false`
    /// without touching the registry if a handler already exists.
    pub fn register<F>(&mut self, event: &str, handler: F) -> bool
    where
        F: FnMut(&str, &ManagerFrame, &str, u16) -> T + Send + 'static,
    {
        let key = event.to_lowercase();
        if self
            .handlers
            .contains_key(&key)
        {
            return false;
        }
        self.handlers
            .insert(key, Box::new(handler));
        true
    }

    /// Remove the handler for `event`. Returns whether one was removed.
    pub fn unregister(&mut self, event: &str) -> bool {
        self.handlers
            .remove(&event.to_lowercase())
            .is_some()
    }

    /// Whether a handler exists for `event`.
    pub fn contains(&self, event: &str) -> bool {
        self.handlers
            .contains_key(&event.to_lowercase())
    }

    /// Number of registered handlers, wildcard included.
    pub fn len(&self) -> usize {
        self.handlers
            .len()
    }

    /// `true` if no handler is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers
            .is_empty()
    }

    /// Run the handler for the frame's `Event` header, or the wildcard
    /// handler. `None` if neither exists.
    pub fn dispatch(&mut self, frame: &ManagerFrame, server: &str, port: u16) -> Option<T> {
        let name = frame
            .event_name()
            .unwrap_or("")
            .to_lowercase();

        let key = if self
            .handlers
            .contains_key(&name)
        {
            name.as_str()
        } else {
            WILDCARD_EVENT
        };
        let handler = self
            .handlers
            .get_mut(key)?;
        trace!("[AMI] Dispatching event '{}'", name);
        Some(handler(&name, frame, server, port))
    }
}
