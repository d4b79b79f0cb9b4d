//! Host event bus carrying typed JSON messages broadcast to every subscriber.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::broadcast;
use tracing::trace;
use uuid::Uuid;

/// Default number of messages a slow subscriber may fall behind by.
pub const DEFAULT_BUS_CAPACITY: usize = 64;

/// A message on the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusMessage {
    pub id: Uuid,
    /// Message type, e.g. `quiet_hours.query`.
    #[serde(rename = "type")]
    pub msg_type: String,
    #[serde(default)]
    pub data: Value,
    /// Routing context carried over to responses.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub context: Map<String, Value>,
    /// Id of the message this one answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<Uuid>,
}

impl BusMessage {
    pub fn new(msg_type: impl Into<String>, data: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            msg_type: msg_type.into(),
            data,
            context: Map::new(),
            reply_to: None,
        }
    }

    /// Attach a routing context entry.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Build the reply: type `<type>.response`, same context, addressed to this id.
    pub fn response(&self, data: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            msg_type: format!("{}.response", self.msg_type),
            data,
            context: self.context.clone(),
            reply_to: Some(self.id),
        }
    }

    pub fn is_response_to(&self, other: &BusMessage) -> bool {
        self.reply_to == Some(other.id)
    }
}

/// Broadcast bus shared by the host and its skills. Clones share the channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<BusMessage>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BusMessage> {
        self.tx.subscribe()
    }

    /// Publish a message. Returns how many subscribers will see it.
    pub fn emit(&self, message: BusMessage) -> usize {
        trace!("bus <- {} ({})", message.msg_type, message.id);
        self.tx.send(message).unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_response_addresses_original() {
        let query = BusMessage::new("quiet_hours.query", Value::Null).with_context("source", "cli");
        let reply = query.response(json!({"quiet_hours_on": true}));
        assert_eq!(reply.msg_type, "quiet_hours.query.response");
        assert!(reply.is_response_to(&query));
        assert_ne!(reply.id, query.id);
        assert_eq!(reply.context.get("source"), Some(&json!("cli")));
        assert_eq!(reply.data["quiet_hours_on"], json!(true));
    }

    #[test]
    fn test_message_serde_shape() {
        let msg = BusMessage::new("quiet_hours.query", json!({}));
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], json!("quiet_hours.query"));
        assert!(value.get("reply_to").is_none());
        assert!(value.get("context").is_none());

        let restored: BusMessage = serde_json::from_value(value).unwrap();
        assert_eq!(restored, msg);
    }

    #[test]
    fn test_emit_without_subscribers() {
        let bus = EventBus::default();
        assert_eq!(bus.emit(BusMessage::new("nobody.listens", Value::Null)), 0);
    }

    #[tokio::test]
    async fn test_emit_reaches_all_subscribers() {
        let bus = EventBus::new(8);
        let mut a = bus.subscribe();
        let mut b = bus.clone().subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        let sent = bus.emit(BusMessage::new("quiet_hours.query", Value::Null));
        assert_eq!(sent, 2);
        assert_eq!(a.recv().await.unwrap().msg_type, "quiet_hours.query");
        assert_eq!(b.recv().await.unwrap().msg_type, "quiet_hours.query");
    }
}
