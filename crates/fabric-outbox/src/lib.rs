//! Transactional outbox: a durable FIFO of write-intents that decouples
//! a committed L3 write from the work of propagating it into L1/L2. A write-intent
//! is enqueued atomically with its L3 commit (see [`insert_entry`]) and later drained
//! by the coordinator's worker pool with at-least-once delivery semantics.

pub mod payload;
pub mod schema;
pub mod store;

pub use payload::{WriteIntent, WriteIntentKind};
pub use schema::initialize as initialize_schema;
pub use store::{insert_entry, OutboxEntry, OutboxState, OutboxStatistics, OutboxStore};
