//! Per-session message log, ordering, and live transcript subscriptions.

pub mod log;
pub mod merge;
pub mod model;

pub use log::{MessageLog, TranscriptSubscription};
pub use model::{ChatMessage, MessageSource};
