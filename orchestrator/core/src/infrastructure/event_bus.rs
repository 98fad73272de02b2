// Event Bus Implementation - Tag-based Pub/Sub
//
// Provides in-memory event streaming using tokio broadcast channels.
// Every listener sees every event; subscription patterns are tracked in a
// registry so the bus can report which tags have interested parties.
//
// In-memory only: events published while nobody listens are lost.

use crate::domain::bus::{tag_matches, BusEvent, EventBus, EventReceiver};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

#[derive(Default)]
struct PatternRegistry {
    patterns: HashMap<String, usize>,
    subscribe_calls: u64,
    unsubscribe_calls: u64,
}

/// Event bus backed by a tokio broadcast channel
#[derive(Clone)]
pub struct InMemoryEventBus {
    sender: Arc<broadcast::Sender<BusEvent>>,
    registry: Arc<Mutex<PatternRegistry>>,
}

impl InMemoryEventBus {
    /// Create a new event bus with specified channel capacity
    /// Capacity determines how many events can be buffered before dropping old ones
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
            registry: Arc::new(Mutex::new(PatternRegistry::default())),
        }
    }

    /// Create event bus with default capacity (1000)
    pub fn with_default_capacity() -> Self {
        Self::new(1000)
    }

    /// Number of open listeners
    pub fn listener_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Currently registered patterns, sorted
    pub fn patterns(&self) -> Vec<String> {
        let mut patterns: Vec<String> = self.registry.lock().patterns.keys().cloned().collect();
        patterns.sort();
        patterns
    }

    pub fn is_subscribed(&self, pattern: &str) -> bool {
        self.registry.lock().patterns.contains_key(pattern)
    }

    /// Whether any registered pattern matches `tag`
    pub fn has_interest(&self, tag: &str) -> bool {
        self.registry
            .lock()
            .patterns
            .keys()
            .any(|pattern| tag_matches(pattern, tag))
    }

    /// Total `(subscribe, unsubscribe)` calls that changed the registry
    pub fn call_counts(&self) -> (u64, u64) {
        let registry = self.registry.lock();
        (registry.subscribe_calls, registry.unsubscribe_calls)
    }
}

impl EventBus for InMemoryEventBus {
    fn subscribe(&self, pattern: &str) {
        let mut registry = self.registry.lock();
        *registry.patterns.entry(pattern.to_string()).or_insert(0) += 1;
        registry.subscribe_calls += 1;
        debug!(pattern, "Subscribed to event pattern");
    }

    fn unsubscribe(&self, pattern: &str) -> bool {
        let mut registry = self.registry.lock();
        let Some(count) = registry.patterns.get_mut(pattern) else {
            debug!(pattern, "Unsubscribe for unknown pattern ignored");
            return false;
        };
        *count -= 1;
        if *count == 0 {
            registry.patterns.remove(pattern);
        }
        registry.unsubscribe_calls += 1;
        debug!(pattern, "Unsubscribed from event pattern");
        true
    }

    fn fire_event(&self, tag: &str, data: serde_json::Value) {
        debug!(tag, "Publishing event");

        // send() only fails when there are no receivers
        let receiver_count = self
            .sender
            .send(BusEvent {
                tag: tag.to_string(),
                data,
            })
            .unwrap_or(0);

        if receiver_count == 0 {
            debug!(tag, "No listeners for event");
        }
    }

    fn listen(&self) -> EventReceiver {
        EventReceiver::new(self.sender.subscribe())
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}
