use crate::models::EventRecord;
use tokio::sync::broadcast;
use tracing::trace;

/// High-throughput fan-out of lifecycle events to live subscribers.
///
/// Delivery is best-effort and at-least-once per subscriber connection.
/// Durability lives in the state store, not here: a reconnecting
/// subscriber resynchronizes via the status query interface instead of
/// asking for replay.
///
/// # Examples
///
/// ```rust
/// use maestro_core::events::EventPublisher;
/// use maestro_core::models::EventRecord;
/// use uuid::Uuid;
///
/// # tokio_test::block_on(async {
/// let publisher = EventPublisher::new(64);
/// let mut subscriber = publisher.subscribe();
///
/// let record = EventRecord::new(Uuid::new_v4(), "execution.created", serde_json::json!({}));
/// publisher.publish(record).unwrap();
///
/// let received = subscriber.recv().await.unwrap();
/// assert_eq!(received.event_type, "execution.created");
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct EventPublisher {
    sender: broadcast::Sender<EventRecord>,
}

impl EventPublisher {
    /// Create a new event publisher with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Broadcast an event to all current subscribers.
    pub fn publish(&self, event: EventRecord) -> Result<(), PublishError> {
        trace!(
            execution_id = %event.execution_id,
            event_type = %event.event_type,
            "Broadcasting event"
        );
        // A send error only means there are no subscribers right now, which
        // is acceptable: the durable record already exists in the store.
        let _ = self.sender.send(event);
        Ok(())
    }

    /// Subscribe to all events across every execution.
    pub fn subscribe(&self) -> broadcast::Receiver<EventRecord> {
        self.sender.subscribe()
    }

    /// Subscribe to a single execution's events.
    pub fn subscribe_execution(&self, execution_id: uuid::Uuid) -> ExecutionSubscription {
        ExecutionSubscription {
            execution_id,
            receiver: self.sender.subscribe(),
        }
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(crate::constants::defaults::EVENT_CHANNEL_CAPACITY)
    }
}

/// Error types for event publishing
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Event channel is closed")]
    ChannelClosed,
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A filtered view over the broadcast channel for one execution id.
pub struct ExecutionSubscription {
    execution_id: uuid::Uuid,
    receiver: broadcast::Receiver<EventRecord>,
}

impl ExecutionSubscription {
    /// Next event for the subscribed execution. Returns `None` once the
    /// publisher is dropped. A lagged subscriber skips ahead rather than
    /// erroring — missed events are recoverable from the status query
    /// interface.
    pub async fn next(&mut self) -> Option<EventRecord> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if event.execution_id == self.execution_id => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
