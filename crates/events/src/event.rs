use chrono::{DateTime, Utc};
use uuid::Uuid;

/// An immutable fact about a committed state change, addressed to one stream.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Kind of stream these events belong to (e.g. "lending.borrow_request").
    const STREAM_TYPE: &'static str;

    /// Dotted event name, e.g. "lending.request.approved".
    fn event_type(&self) -> &'static str;

    /// Identity of the stream (aggregate) this event belongs to.
    fn stream_id(&self) -> Uuid;

    /// Business time of the change.
    fn occurred_at(&self) -> DateTime<Utc>;

    fn schema_version(&self) -> u32 {
        1
    }
}
