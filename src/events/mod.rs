//! # Run Events
//!
//! Typed lifecycle events for runs, pages and documents, broadcast to any
//! number of in-process listeners. Publishing never blocks the run and
//! having no listener is not an error.

pub mod lifecycle;
pub mod publisher;

pub use lifecycle::IndexingEvent;
pub use publisher::{EventPublisher, PublishedEvent, RunEvents};
