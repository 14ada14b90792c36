//! # Event Bus System
//!
//! Change notifications for the Virtual Tourist core using `tokio::sync::broadcast`.
//!
//! ## Overview
//!
//! Every committed mutation of the pin/photo store is followed by exactly one
//! event on this bus. Hosts subscribe once and re-render the affected view
//! (the map for [`LibraryEvent::PinsChanged`], the album of a single pin for
//! [`LibraryEvent::PhotosChanged`]). Fetch lifecycle events let a host toggle
//! loading indicators or show the "no images" label without polling.
//!
//! ```text
//! ┌────────────────┐     emit      ┌───────────┐    subscribe   ┌────────────┐
//! │ PinPhotoService├──────────────>│ EventBus  ├───────────────>│ Map view   │
//! └────────────────┘               │ (broadcast│                └────────────┘
//!                                  │  channel) │    subscribe   ┌────────────┐
//!                                  │           ├───────────────>│ Album view │
//!                                  └───────────┘                └────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, LibraryEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let event_bus = EventBus::new(16);
//! let mut stream = event_bus.subscribe();
//!
//! event_bus.emit(CoreEvent::Library(LibraryEvent::PinsChanged)).ok();
//!
//! let event = stream.recv().await.unwrap();
//! assert_eq!(event, CoreEvent::Library(LibraryEvent::PinsChanged));
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: Subscriber was too slow and missed `n` events.
//!   A lagging album view should simply reload from the repository.
//! - **`RecvError::Closed`**: All senders have been dropped. This indicates shutdown.
//!
//! `emit` fails when nobody is subscribed; publishers ignore that with `.ok()`.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum published through the event bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Pin/photo store changes
    Library(LibraryEvent),
    /// Photo search lifecycle
    Fetch(FetchEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Library(e) => e.description(),
            CoreEvent::Fetch(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Fetch(FetchEvent::Failed {
                no_results: true, ..
            }) => EventSeverity::Warning,
            CoreEvent::Fetch(FetchEvent::Failed { .. }) => EventSeverity::Error,
            CoreEvent::Fetch(FetchEvent::Completed { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }

    /// Pin the event concerns, when it concerns a single pin.
    pub fn pin_id(&self) -> Option<&str> {
        match self {
            CoreEvent::Library(LibraryEvent::PinsChanged) => None,
            CoreEvent::Library(LibraryEvent::PhotosChanged { pin_id }) => Some(pin_id),
            CoreEvent::Fetch(FetchEvent::Started { pin_id })
            | CoreEvent::Fetch(FetchEvent::Completed { pin_id, .. })
            | CoreEvent::Fetch(FetchEvent::Failed { pin_id, .. }) => Some(pin_id),
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Library Events
// ============================================================================

/// Committed changes to the pin/photo store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum LibraryEvent {
    /// A pin was created or deleted.
    PinsChanged,
    /// The photo set of a pin changed: photos inserted, deleted, or bytes stored.
    PhotosChanged {
        /// The affected pin.
        pin_id: String,
    },
}

impl LibraryEvent {
    fn description(&self) -> &str {
        match self {
            LibraryEvent::PinsChanged => "Pins changed",
            LibraryEvent::PhotosChanged { .. } => "Photos of pin changed",
        }
    }
}

// ============================================================================
// Fetch Events
// ============================================================================

/// Lifecycle of a network photo search for a pin.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum FetchEvent {
    /// A search for the pin started.
    Started { pin_id: String },
    /// The search finished and its photos were persisted.
    Completed {
        pin_id: String,
        /// Number of photo records created.
        photo_count: usize,
    },
    /// The search failed; nothing was persisted.
    Failed {
        pin_id: String,
        /// Human-readable error message.
        message: String,
        /// The search succeeded but the page held no usable photos.
        no_results: bool,
    },
}

impl FetchEvent {
    fn description(&self) -> &str {
        match self {
            FetchEvent::Started { .. } => "Photo search started",
            FetchEvent::Completed { .. } => "Photo search completed",
            FetchEvent::Failed {
                no_results: true, ..
            } => "No images found",
            FetchEvent::Failed { .. } => "Photo search failed",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to events.
///
/// Cloning the bus yields another handle to the same channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    ///
    /// Subscribers that fall behind by more than `capacity` events
    /// receive `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Creates a new event bus with the default buffer size.
    #[allow(clippy::should_implement_trait)]
    pub fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an error
    /// if there are no active subscribers.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A wrapper around `broadcast::Receiver` with optional filtering.
///
/// ```rust
/// use core_runtime::events::{EventBus, EventStream};
///
/// let event_bus = EventBus::new(16);
/// let album_stream = EventStream::new(event_bus.subscribe())
///     .filter(|event| event.pin_id() == Some("some-pin"));
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events that match the predicate will be returned by `recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    /// Receives the next event that passes the filter (if any).
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Lagged(n)` if the subscriber fell behind by `n` events.
    /// Returns `RecvError::Closed` if all senders have been dropped.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;

            let Some(filter) = &self.filter else {
                return Ok(event);
            };

            if filter(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive an event without waiting.
    ///
    /// Returns `None` if no matching events are currently available.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    let Some(filter) = &self.filter else {
                        return Some(Ok(event));
                    };

                    if filter(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn photos_changed(pin: &str) -> CoreEvent {
        CoreEvent::Library(LibraryEvent::PhotosChanged {
            pin_id: pin.to_string(),
        })
    }

    #[tokio::test]
    async fn test_event_bus_creation() {
        let bus = EventBus::new(10);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_event_bus_subscription() {
        let bus = EventBus::new(10);
        let _sub1 = bus.subscribe();
        let _sub2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[tokio::test]
    async fn test_event_emission_no_subscribers() {
        let bus = EventBus::new(10);
        assert!(bus.emit(CoreEvent::Library(LibraryEvent::PinsChanged)).is_err());
    }

    #[tokio::test]
    async fn test_multiple_subscribers_receive_same_event() {
        let bus = EventBus::new(10);
        let mut sub1 = bus.subscribe();
        let mut sub2 = bus.subscribe();

        let event = CoreEvent::Fetch(FetchEvent::Started {
            pin_id: "pin-1".to_string(),
        });

        assert_eq!(bus.emit(event.clone()).unwrap(), 2);
        assert_eq!(sub1.recv().await.unwrap(), event);
        assert_eq!(sub2.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn test_event_stream_filters_by_pin() {
        let bus = EventBus::new(10);
        let mut stream =
            EventStream::new(bus.subscribe()).filter(|event| event.pin_id() == Some("pin-2"));

        bus.emit(CoreEvent::Library(LibraryEvent::PinsChanged)).ok();
        bus.emit(photos_changed("pin-1")).ok();
        bus.emit(photos_changed("pin-2")).ok();

        assert_eq!(stream.recv().await.unwrap(), photos_changed("pin-2"));
        assert!(stream.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_lagged_subscriber() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe();

        for i in 0..5 {
            bus.emit(photos_changed(&format!("pin-{i}"))).ok();
        }

        let result = sub.recv().await;
        assert!(matches!(result, Err(RecvError::Lagged(_))));
    }

    #[test]
    fn test_event_severity() {
        let failed = CoreEvent::Fetch(FetchEvent::Failed {
            pin_id: "pin-1".to_string(),
            message: "Invalid API Key".to_string(),
            no_results: false,
        });
        assert_eq!(failed.severity(), EventSeverity::Error);

        let empty = CoreEvent::Fetch(FetchEvent::Failed {
            pin_id: "pin-1".to_string(),
            message: "no photos".to_string(),
            no_results: true,
        });
        assert_eq!(empty.severity(), EventSeverity::Warning);
        assert_eq!(empty.description(), "No images found");

        let completed = CoreEvent::Fetch(FetchEvent::Completed {
            pin_id: "pin-1".to_string(),
            photo_count: 12,
        });
        assert_eq!(completed.severity(), EventSeverity::Info);

        assert_eq!(
            CoreEvent::Library(LibraryEvent::PinsChanged).severity(),
            EventSeverity::Debug
        );
    }

    #[tokio::test]
    async fn test_concurrent_publishers() {
        let bus = EventBus::new(100);
        let mut sub = bus.subscribe();

        let bus1 = bus.clone();
        let bus2 = bus.clone();

        let handle1 = tokio::spawn(async move {
            for _ in 0..10 {
                bus1.emit(CoreEvent::Library(LibraryEvent::PinsChanged)).ok();
            }
        });
        let handle2 = tokio::spawn(async move {
            for i in 0..10 {
                bus2.emit(photos_changed(&format!("pin-{i}"))).ok();
            }
        });

        handle1.await.ok();
        handle2.await.ok();

        let mut count = 0;
        while sub.try_recv().is_ok() {
            count += 1;
        }
        assert_eq!(count, 20);
    }

    #[test]
    fn test_event_serialization() {
        let event = CoreEvent::Fetch(FetchEvent::Completed {
            pin_id: "pin-123".to_string(),
            photo_count: 7,
        });

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("pin-123"));
        assert!(json.contains("\"type\":\"Fetch\""));

        let deserialized: CoreEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, event);
    }
}
