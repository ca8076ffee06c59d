//! The partitioned event log: the sink trait, the Kafka client, and an
//! in-memory log for tests.

pub mod kafka;
pub mod memory;
pub mod traits;

pub use kafka::KafkaEventSink;
pub use memory::MemoryLog;
pub use traits::{EventSink, LogError};
