use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::event::Event;

/// A published event plus the stream metadata consumers need to order and
/// de-duplicate it.
///
/// `sequence_number` is the aggregate version the event produced, so it is
/// strictly increasing within one `stream_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,
    stream_type: String,
    stream_id: Uuid,
    sequence_number: u64,
    occurred_at: DateTime<Utc>,
    payload: E,
}

impl<E: Event> EventEnvelope<E> {
    /// Seal `payload` as entry `sequence_number` of its stream under a fresh v7 id.
    pub fn seal(sequence_number: u64, payload: E) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            stream_type: E::STREAM_TYPE.to_string(),
            stream_id: payload.stream_id(),
            sequence_number,
            occurred_at: payload.occurred_at(),
            payload,
        }
    }

    pub fn event_type(&self) -> &'static str {
        self.payload.event_type()
    }
}

impl<E> EventEnvelope<E> {
    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn stream_type(&self) -> &str {
        &self.stream_type
    }

    pub fn stream_id(&self) -> Uuid {
        self.stream_id
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    struct Ping {
        stream: Uuid,
        at: DateTime<Utc>,
    }

    impl Event for Ping {
        const STREAM_TYPE: &'static str = "test.ping";

        fn event_type(&self) -> &'static str {
            "test.ping.sent"
        }

        fn stream_id(&self) -> Uuid {
            self.stream
        }

        fn occurred_at(&self) -> DateTime<Utc> {
            self.at
        }
    }

    #[test]
    fn seal_copies_stream_metadata_from_the_payload() {
        let ping = Ping {
            stream: Uuid::now_v7(),
            at: Utc.with_ymd_and_hms(2030, 5, 1, 8, 0, 0).unwrap(),
        };
        let a = EventEnvelope::seal(3, ping.clone());
        let b = EventEnvelope::seal(3, ping.clone());

        assert_eq!(a.stream_id(), ping.stream);
        assert_eq!(a.stream_type(), "test.ping");
        assert_eq!(a.event_type(), "test.ping.sent");
        assert_eq!(a.sequence_number(), 3);
        assert_eq!(a.occurred_at(), ping.at);
        assert_ne!(a.event_id(), b.event_id());
    }
}
